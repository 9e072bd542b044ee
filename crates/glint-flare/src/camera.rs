//! Camera model and depth conventions shared by projection and occlusion.

use glam::{Mat4, Quat, Vec3, Vec4Swizzles};

/// Which end of the `[0, 1]` depth range faces the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthConvention {
    /// Near plane maps to 0.0, far plane to 1.0.
    #[default]
    Standard,
    /// Near plane maps to 1.0, far plane to 0.0.
    Reverse,
}

impl DepthConvention {
    /// Depth value of an empty (cleared) depth buffer.
    pub fn far_value(self) -> f32 {
        match self {
            DepthConvention::Standard => 1.0,
            DepthConvention::Reverse => 0.0,
        }
    }

    /// Whether `depth` lies strictly nearer to the viewer than `reference`.
    pub fn is_nearer(self, depth: f32, reference: f32) -> bool {
        match self {
            DepthConvention::Standard => depth < reference,
            DepthConvention::Reverse => depth > reference,
        }
    }

    /// Moves `depth` by `epsilon` away from the viewer.
    pub fn push_farther(self, depth: f32, epsilon: f32) -> f32 {
        match self {
            DepthConvention::Standard => depth + epsilon,
            DepthConvention::Reverse => depth - epsilon,
        }
    }
}

/// A camera that generates view and projection matrices.
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Projection parameters.
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
    /// Depth range orientation of the projection matrix.
    pub depth: DepthConvention,
}

/// Projection type for the camera.
#[derive(Debug, Clone)]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half-width of the view volume in world units.
        half_width: f32,
        /// Half-height of the view volume in world units.
        half_height: f32,
    },
}

impl Camera {
    /// Build a perspective camera at `eye` looking towards `target`.
    pub fn looking_at(eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, aspect_ratio: f32) -> Self {
        let view = Mat4::look_at_rh(eye, target, up);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        Self {
            position: eye,
            rotation,
            projection: Projection::Perspective {
                fov_y,
                aspect_ratio,
            },
            ..Self::default()
        }
    }

    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.up())
    }

    /// Compute the projection matrix for the configured depth convention.
    pub fn projection_matrix(&self) -> Mat4 {
        // Reverse-Z swaps the near and far planes.
        let (z_near, z_far) = match self.depth {
            DepthConvention::Standard => (self.near, self.far),
            DepthConvention::Reverse => (self.far, self.near),
        };
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => Mat4::perspective_rh(*fov_y, *aspect_ratio, z_near, z_far),
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                z_near,
                z_far,
            ),
        }
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// The right direction vector (+X in camera space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Update the aspect ratio for perspective projection.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if let Projection::Perspective { aspect_ratio, .. } = &mut self.projection {
            *aspect_ratio = width / height.max(1.0);
        }
    }

    /// Snapshot the matrices consumed by one frame of flare rendering.
    pub fn frame(&self) -> CameraFrame {
        CameraFrame::from_matrices(self.view_matrix(), self.projection_matrix(), self.depth)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
                aspect_ratio: 16.0 / 9.0,
            },
            near: 0.1,
            far: 1000.0,
            depth: DepthConvention::Standard,
        }
    }
}

/// Per-frame camera state: matrices plus world position and view direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub position: Vec3,
    pub forward: Vec3,
    pub depth: DepthConvention,
}

impl CameraFrame {
    /// Build a frame from host-supplied matrices.
    pub fn from_matrices(view: Mat4, projection: Mat4, depth: DepthConvention) -> Self {
        let camera_to_world = view.inverse();
        let view_projection = projection * view;
        Self {
            view,
            projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            position: camera_to_world.w_axis.xyz(),
            forward: (-camera_to_world.z_axis.xyz()).normalize_or_zero(),
            depth,
        }
    }
}
