use glam::Vec2;
use rand::Rng;
use tracing::debug;

use crate::model::{Constellation, Fish, WaterPlane};
use crate::view::{Atlas, Systems};

/// Fraction of the distance to the pointer covered per step
const FOLLOW: f32 = 0.6;
/// Lift gained per step while held
const LIFT_RATE: f32 = 0.34;
/// Splash radius relative to body length
const SPLASH_RADIUS: f32 = 0.6;
const SPLASH_DEPTH_MIN: f32 = 0.6;
const SPLASH_DEPTH_MAX: f32 = 0.9;
/// Largest heading change when a fish is put back
const DROP_JITTER: f32 = 0.8;

enum State {
    Idle,
    Holding {
        fish: Fish,
        /// Pointer in simulation units
        pointer: Vec2,
        /// From the pointer to where the fish was grabbed
        offset: Vec2,
    },
}

/// Lets the user lift a fish out of the pond and put it back elsewhere
pub struct Mover {
    state: State,
}

impl Default for Mover {
    fn default() -> Self {
        Self { state: State::Idle }
    }
}

impl Mover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.state, State::Holding { .. })
    }

    pub fn held(&self) -> Option<&Fish> {
        match &self.state {
            State::Holding { fish, .. } => Some(fish),
            State::Idle => None,
        }
    }

    /// Take `fish`, already removed from the constellation, out of the water
    /// at pointer `(x, y)`. A fish offered while another is held is handed back.
    pub fn pick_up(&mut self, fish: Fish, x: f32, y: f32, water: &mut WaterPlane, rng: &mut impl Rng) -> Result<(), Fish> {
        if self.is_holding() {
            return Err(fish);
        }

        let pointer = Vec2::new(x, y);
        splash(&fish, water, rng);
        debug!(slot = fish.slot(), %pointer, "picked up fish");

        self.state = State::Holding {
            offset: fish.position() - pointer,
            fish,
            pointer,
        };
        Ok(())
    }

    pub fn touch_move(&mut self, x: f32, y: f32) {
        if let State::Holding { pointer, .. } = &mut self.state {
            *pointer = Vec2::new(x, y);
        }
    }

    /// Put the held fish back into the water. Returns false when idle.
    pub fn release(&mut self, constellation: &mut Constellation, water: &mut WaterPlane, rng: &mut impl Rng) -> bool {
        let State::Holding { mut fish, .. } = std::mem::replace(&mut self.state, State::Idle) else {
            return false;
        };

        fish.jitter(DROP_JITTER, rng);
        splash(&fish, water, rng);
        debug!(slot = fish.slot(), position = %fish.position(), "dropped fish");

        constellation.insert(fish);
        true
    }

    /// Move the held fish one step towards the pointer
    pub fn update(&mut self) {
        if let State::Holding { fish, pointer, offset } = &mut self.state {
            fish.carry(*pointer + *offset, FOLLOW, LIFT_RATE);
        }
    }

    /// Rewrite the held fish's pattern into a freshly created atlas
    pub fn update_atlas<A: Atlas>(&self, atlas: &mut A) {
        if let State::Holding { fish, .. } = &self.state {
            atlas.write(fish.slot(), fish.pattern());
        }
    }

    /// Draw the held fish above the water
    pub fn render<S: Systems>(&self, systems: &mut S, atlas: &S::Atlas, scale: f32, time_factor: f32) {
        if let State::Holding { fish, .. } = &self.state {
            systems.render_bodies(atlas, &[fish.interpolate(time_factor)], scale);
        }
    }
}

fn splash(fish: &Fish, water: &mut WaterPlane, rng: &mut impl Rng) {
    let depth = rng.random_range(SPLASH_DEPTH_MIN..=SPLASH_DEPTH_MAX);
    water.add_flare(fish.position(), fish.size() * SPLASH_RADIUS, -depth);
}
