//! Fixed-width grouping of active flares.
//!
//! Each batch carries exactly [`BATCH_WIDTH`] flare references, one per channel
//! of the RGBA occlusion readout. The last batch of a frame is padded with
//! [`Flare::placeholder`] references.

use std::iter::FusedIterator;

use crate::flare::Flare;

/// Flares per batch. Tied to the four channels of the occlusion readout.
pub const BATCH_WIDTH: usize = 4;

static PLACEHOLDER: Flare = Flare::placeholder();

/// Number of batches needed for `active` flares.
pub fn batch_count(active: usize) -> usize {
    active.div_ceil(BATCH_WIDTH)
}

/// Up to four active flares evaluated together.
#[derive(Debug, Clone, Copy)]
pub struct FlareBatch<'a> {
    index: usize,
    slots: [&'a Flare; BATCH_WIDTH],
    live: usize,
}

impl<'a> FlareBatch<'a> {
    /// Position of this batch within the frame.
    pub fn index(&self) -> usize {
        self.index
    }

    /// All four slots, padding included.
    pub fn slots(&self) -> &[&'a Flare; BATCH_WIDTH] {
        &self.slots
    }

    /// Number of slots holding a real flare.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Whether `slot` holds a padding placeholder.
    pub fn is_padding(&self, slot: usize) -> bool {
        slot >= self.live
    }

    /// The real flares of this batch, in registry order.
    pub fn live(&self) -> impl Iterator<Item = &'a Flare> + '_ {
        self.slots[..self.live].iter().copied()
    }
}

/// Lazy sequence of batches over a flare slice.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    source: std::slice::Iter<'a, Flare>,
    index: usize,
}

/// Partition the active flares of `flares` into batches, preserving order.
pub fn batches(flares: &[Flare]) -> Batches<'_> {
    Batches {
        source: flares.iter(),
        index: 0,
    }
}

impl<'a> Iterator for Batches<'a> {
    type Item = FlareBatch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut slots = [&PLACEHOLDER; BATCH_WIDTH];
        let mut live = 0;
        for flare in self.source.by_ref().filter(|f| f.is_active()) {
            slots[live] = flare;
            live += 1;
            if live == BATCH_WIDTH {
                break;
            }
        }
        if live == 0 {
            return None;
        }

        let batch = FlareBatch {
            index: self.index,
            slots,
            live,
        };
        self.index += 1;
        Some(batch)
    }
}

impl FusedIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn numbered(count: usize) -> Vec<Flare> {
        (0..count)
            .map(|i| Flare::new(Vec3::new(i as f32, 0.0, 0.0)))
            .collect()
    }

    #[test]
    fn test_ten_flares_make_three_batches() {
        let flares = numbered(10);
        let all: Vec<_> = batches(&flares).collect();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|b| b.live_count()).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert!(all.iter().all(|b| b.slots().len() == BATCH_WIDTH));

        let last = &all[2];
        assert!(!last.is_padding(1));
        assert!(last.is_padding(2) && last.is_padding(3));
        for slot in 2..BATCH_WIDTH {
            let pad = last.slots()[slot];
            assert_eq!(pad.opacity, 0.0, "padding must be inert");
            assert!(!pad.is_active());
        }
    }

    #[test]
    fn test_batches_preserve_registry_order() {
        let flares = numbered(6);
        let order: Vec<f32> = batches(&flares)
            .flat_map(|b| b.live().map(|f| f.position.x).collect::<Vec<_>>())
            .collect();
        assert_eq!(order, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_inactive_flares_are_skipped() {
        let mut flares = numbered(5);
        flares[1].visible = false;
        flares[3].opacity = 0.0;
        let all: Vec<_> = batches(&flares).collect();
        assert_eq!(all.len(), 1);
        let xs: Vec<f32> = all[0].live().map(|f| f.position.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        assert_eq!(batches(&[]).count(), 0);
        let mut hidden = numbered(3);
        hidden.iter_mut().for_each(|f| f.enabled = false);
        assert_eq!(batches(&hidden).count(), 0);
    }

    #[test]
    fn test_batch_indices_are_sequential() {
        let flares = numbered(9);
        let indices: Vec<usize> = batches(&flares).map(|b| b.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(0), 0);
        assert_eq!(batch_count(1), 1);
        assert_eq!(batch_count(4), 1);
        assert_eq!(batch_count(5), 2);
        assert_eq!(batch_count(10), 3);
    }
}
