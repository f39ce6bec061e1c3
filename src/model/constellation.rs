use glam::Vec2;
use rand::Rng;
use tracing::{debug, trace};

use crate::error::KoiError;
use crate::model::{BodyInstance, Fish, WaterPlane};
use crate::view::{Atlas, Systems};

/// Fish further than this outside the pond are released on resize.
/// Covers fish still swimming in from the edge.
const RELEASE_MARGIN: f32 = 1.0;

/// Every fish swimming in the pond.
///
/// Each fish holds one atlas slot from spawn until it leaves the pond, also
/// while it is lifted out of the water by the mover, so the population can
/// never outgrow the atlas.
pub struct Constellation {
    width: f32,
    height: f32,
    capacity: usize,
    fishes: Vec<Fish>,
    free_slots: Vec<usize>,
    /// Slots whose pattern still has to be written to the atlas
    pending: Vec<usize>,
}

impl Constellation {
    /// Create an empty constellation of `width` by `height` simulation units
    pub fn new(width: f32, height: f32, capacity: usize) -> Self {
        Self {
            width,
            height,
            capacity,
            fishes: Vec::with_capacity(capacity),
            free_slots: (0..capacity).rev().collect(),
            pending: Vec::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn bounds(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fish currently in the water
    pub fn len(&self) -> usize {
        self.fishes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fishes.is_empty()
    }

    /// Fish holding a slot, including any that are lifted out of the water
    pub fn population(&self) -> usize {
        self.capacity - self.free_slots.len()
    }

    pub fn fishes(&self) -> &[Fish] {
        &self.fishes
    }

    /// Add a fish built around a freshly allocated atlas slot.
    /// Returns false when every slot is taken.
    pub fn spawn(&mut self, build: impl FnOnce(usize) -> Fish) -> bool {
        let Some(slot) = self.free_slots.pop() else {
            return false;
        };

        let fish = build(slot);
        debug_assert_eq!(fish.slot(), slot);
        trace!(slot, position = %fish.position(), "spawned fish");

        self.pending.push(slot);
        self.fishes.push(fish);
        true
    }

    /// Put a fish that was taken out with [`Constellation::pick`] back into the water
    pub fn insert(&mut self, fish: Fish) {
        debug_assert!(!self.free_slots.contains(&fish.slot()));
        self.fishes.push(fish);
    }

    /// Take the topmost fish under `(x, y)` out of the water
    pub fn pick(&mut self, x: f32, y: f32) -> Option<Fish> {
        let point = Vec2::new(x, y);
        let index = self.fishes.iter().rposition(|fish| fish.contains(point))?;

        Some(self.fishes.remove(index))
    }

    /// Advance every fish in the water by one step
    pub fn update<A: Atlas>(&mut self, atlas: &mut A, water: &mut WaterPlane, rng: &mut impl Rng) {
        for slot in self.pending.drain(..) {
            if let Some(fish) = self.fishes.iter().find(|fish| fish.slot() == slot) {
                atlas.write(slot, fish.pattern());
            }
        }

        let bounds = self.bounds();
        for fish in &mut self.fishes {
            fish.update(bounds, water, rng);
        }
    }

    /// Change the pond size. Fish left well outside the new bounds are
    /// released from `atlas`, which is still the atlas they were written to.
    pub fn resize<A: Atlas>(&mut self, width: f32, height: f32, atlas: &mut A) {
        self.width = width;
        self.height = height;

        let mut released = Vec::new();
        self.fishes.retain(|fish| {
            let p = fish.position();
            let inside = p.x >= -RELEASE_MARGIN
                && p.y >= -RELEASE_MARGIN
                && p.x <= width + RELEASE_MARGIN
                && p.y <= height + RELEASE_MARGIN;
            if !inside {
                released.push(fish.slot());
            }
            inside
        });

        for &slot in &released {
            atlas.clear(slot);
        }
        self.pending.retain(|slot| !released.contains(slot));
        self.free_slots.extend(released.iter().copied());

        debug!(width, height, released = released.len(), "resized constellation");
    }

    /// Write every pattern into a freshly created atlas
    pub fn update_atlas<A: Atlas>(&mut self, atlas: &mut A) {
        for fish in &self.fishes {
            atlas.write(fish.slot(), fish.pattern());
        }
        self.pending.clear();
    }

    pub fn make_mesh<S: Systems>(&self, systems: &mut S) -> Result<S::Mesh, KoiError> {
        systems.create_mesh(self.capacity)
    }

    /// Bodies in drawing order, interpolated by `time_factor`
    pub fn instances(&self, time_factor: f32) -> Vec<BodyInstance> {
        self.fishes.iter().map(|fish| fish.interpolate(time_factor)).collect()
    }

    /// Draw every fish and refresh the mesh the water shading reads
    pub fn render<S: Systems>(
        &self,
        systems: &mut S,
        atlas: &S::Atlas,
        mesh: &mut S::Mesh,
        scale: f32,
        time_factor: f32,
    ) {
        let bodies = self.instances(time_factor);

        systems.update_mesh(mesh, &bodies);
        systems.render_bodies(atlas, &bodies, scale);
    }
}
