use crate::model::{Constellation, WaterPlane};

/// Energy kept per step
pub const DAMPING: f32 = 0.985;
/// Surface pushed down by a swimming fish, per unit of speed
const WAKE_DEPTH: f32 = 0.6;
/// Wake radius relative to body length
const WAKE_RADIUS: f32 = 0.35;

/// Lets swimming fish disturb the water and moves the surface along
pub struct Waves {
    damping: f32,
}

impl Waves {
    pub fn new(damping: f32) -> Self {
        Self { damping }
    }

    /// Paint the wake of every fish in the water, then advance the surface one step
    pub fn propagate(&self, water: &mut WaterPlane, constellation: &Constellation) {
        for fish in constellation.fishes() {
            water.add_flare(fish.position(), fish.size() * WAKE_RADIUS, -fish.speed() * WAKE_DEPTH);
        }

        water.step(self.damping);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fish, Pattern};
    use approx::assert_relative_eq;
    use glam::Vec2;

    #[test]
    fn still_pond_stays_still() {
        let mut water = WaterPlane::new(6.0, 6.0);
        let constellation = Constellation::new(6.0, 6.0, 4);

        for _ in 0..10 {
            Waves::new(DAMPING).propagate(&mut water, &constellation);
        }
        assert_relative_eq!(water.energy(), 0.0);
    }

    #[test]
    fn swimming_fish_leave_a_wake() {
        let mut water = WaterPlane::new(6.0, 6.0);
        let mut constellation = Constellation::new(6.0, 6.0, 4);
        let pattern = Pattern { base: [0, 0, 0], spots: [1, 1, 1], spot_count: 0, seed: 0 };
        constellation.spawn(|slot| Fish::new(Vec2::new(3.0, 3.0), Vec2::X, 0.1, 1.0, pattern, slot));

        Waves::new(DAMPING).propagate(&mut water, &constellation);
        assert!(water.energy() > 0.0);
    }

    #[test]
    fn damping_scales_the_next_step() {
        let constellation = Constellation::new(6.0, 6.0, 4);
        let mut full = WaterPlane::new(6.0, 6.0);
        let mut half = WaterPlane::new(6.0, 6.0);
        for water in [&mut full, &mut half] {
            water.add_flare(Vec2::new(3.0, 3.0), 0.5, 1.0);
        }

        Waves::new(1.0).propagate(&mut full, &constellation);
        Waves::new(0.5).propagate(&mut half, &constellation);

        assert!(full.energy() > 0.0);
        assert_relative_eq!(half.energy(), full.energy() * 0.5, epsilon = 1e-5);
    }
}
