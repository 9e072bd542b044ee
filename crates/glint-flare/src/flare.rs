//! Flare records, the registry that holds them, and per-frame screen projection.

use glam::{Mat4, Vec3, Vec4};

use crate::camera::CameraFrame;

/// Screen position assigned to flares that sit behind the camera.
///
/// Its depth lies outside `[0, 1]`, so the flare shader drops it.
pub const BEHIND_CAMERA: Vec3 = Vec3::new(-1.0, -1.0, -1.0);

/// World position of a freshly created flare.
pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 20.0, 0.0);

/// One point light rendered as a screen-space lens flare.
#[derive(Debug, Clone, PartialEq)]
pub struct Flare {
    /// World-space position of the light.
    pub position: Vec3,
    pub enabled: bool,
    pub visible: bool,
    /// Overall contribution weight in `[0, 1]`.
    pub opacity: f32,
    /// Linear RGB tint multiplied into the procedural field.
    pub color_gain: Vec3,
    /// Angular period of the glare ripple and the blade count.
    pub star_points: f32,
    pub glare_size: f32,
    pub flare_size: f32,
    /// Hue rotation speed of the blade gradient.
    pub flare_speed: f32,
    /// Blade sharpness multiplier.
    pub flare_shape: f32,
    /// Radius scale of the circular halo rings.
    pub halo_scale: f32,
    /// Size of the hexagonal ghosts.
    pub ghost_scale: f32,
    /// Collapse the glare ripple to one lobe and stretch the blades horizontally.
    pub anamorphic: bool,
    pub secondary_ghosts: bool,
    pub additional_streaks: bool,
    pub star_burst: bool,
    /// Advance the blade hue with frame time.
    pub animated: bool,
    screen_position: Vec3,
}

impl Flare {
    /// Create an enabled, visible flare with default appearance at `position`.
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            enabled: true,
            visible: true,
            opacity: 0.8,
            color_gain: Vec3::new(1.0, 0.1, 0.1),
            star_points: 5.0,
            glare_size: 0.55,
            flare_size: 0.004,
            flare_speed: 0.4,
            flare_shape: 1.2,
            halo_scale: 0.5,
            ghost_scale: 0.3,
            anamorphic: false,
            secondary_ghosts: true,
            additional_streaks: true,
            star_burst: true,
            animated: true,
            screen_position: BEHIND_CAMERA,
        }
    }

    /// Inert flare used to pad the last batch of a frame.
    pub const fn placeholder() -> Self {
        Self {
            position: Vec3::ZERO,
            enabled: false,
            visible: false,
            opacity: 0.0,
            color_gain: Vec3::ZERO,
            star_points: 0.0,
            glare_size: 0.0,
            flare_size: 0.0,
            flare_speed: 0.0,
            flare_shape: 0.0,
            halo_scale: 0.0,
            ghost_scale: 0.0,
            anamorphic: false,
            secondary_ghosts: false,
            additional_streaks: false,
            star_burst: false,
            animated: false,
            screen_position: BEHIND_CAMERA,
        }
    }

    pub fn with_color_gain(mut self, color_gain: Vec3) -> Self {
        self.color_gain = color_gain;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    /// Whether this flare takes part in the current frame.
    ///
    /// NaN opacity is treated as inactive.
    pub fn is_active(&self) -> bool {
        self.enabled && self.visible && self.opacity > 0.0
    }

    /// Screen position from the most recent projection.
    ///
    /// `x`/`y` are texture coordinates (origin top-left), `z` is device depth.
    pub fn screen_position(&self) -> Vec3 {
        self.screen_position
    }

    /// Whether the projected depth lies inside the view volume.
    pub fn is_within_depth_range(&self) -> bool {
        (0.0..=1.0).contains(&self.screen_position.z)
    }

    /// Recompute [`screen_position`](Self::screen_position) for `camera`.
    pub fn project(&mut self, camera: &CameraFrame) {
        self.screen_position = project_to_screen(camera.view_projection, self.position);
    }
}

impl Default for Flare {
    fn default() -> Self {
        Self::new(DEFAULT_POSITION)
    }
}

/// Project a world point to texture-space screen coordinates plus device depth.
///
/// Points at or behind the camera plane return [`BEHIND_CAMERA`].
pub fn project_to_screen(view_projection: Mat4, world: Vec3) -> Vec3 {
    let clip = view_projection * Vec4::new(world.x, world.y, world.z, 1.0);
    if clip.w <= f32::EPSILON {
        return BEHIND_CAMERA;
    }
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z)
}

/// Ordered collection of flares owned by the application.
///
/// The registry owns no rendering resources. Renderers only write the derived
/// screen position, through [`project`](Self::project).
#[derive(Debug, Clone, Default)]
pub struct FlareRegistry {
    flares: Vec<Flare>,
}

impl FlareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flares: Vec::with_capacity(capacity),
        }
    }

    /// Append a flare and return its index.
    pub fn push(&mut self, flare: Flare) -> usize {
        self.flares.push(flare);
        self.flares.len() - 1
    }

    /// Remove the flare at `index`, preserving the order of the rest.
    pub fn remove(&mut self, index: usize) -> Option<Flare> {
        (index < self.flares.len()).then(|| self.flares.remove(index))
    }

    pub fn retain(&mut self, keep: impl FnMut(&Flare) -> bool) {
        self.flares.retain(keep);
    }

    pub fn clear(&mut self) {
        self.flares.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Flare> {
        self.flares.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Flare> {
        self.flares.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Flare> {
        self.flares.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Flare> {
        self.flares.iter_mut()
    }

    pub fn as_slice(&self) -> &[Flare] {
        &self.flares
    }

    pub fn len(&self) -> usize {
        self.flares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flares.is_empty()
    }

    /// Number of flares passing the activity filter.
    pub fn active_count(&self) -> usize {
        self.flares.iter().filter(|f| f.is_active()).count()
    }

    /// Project every flare for this frame's camera.
    pub fn project(&mut self, camera: &CameraFrame) {
        for flare in &mut self.flares {
            flare.project(camera);
        }
    }
}

impl FromIterator<Flare> for FlareRegistry {
    fn from_iter<I: IntoIterator<Item = Flare>>(iter: I) -> Self {
        Self {
            flares: iter.into_iter().collect(),
        }
    }
}

impl Extend<Flare> for FlareRegistry {
    fn extend<I: IntoIterator<Item = Flare>>(&mut self, iter: I) {
        self.flares.extend(iter);
    }
}

impl<'a> IntoIterator for &'a FlareRegistry {
    type Item = &'a Flare;
    type IntoIter = std::slice::Iter<'a, Flare>;

    fn into_iter(self) -> Self::IntoIter {
        self.flares.iter()
    }
}
