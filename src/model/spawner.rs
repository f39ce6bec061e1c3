use std::f32::consts::PI;

use glam::Vec2;
use rand::Rng;

use crate::model::{Constellation, Fish, Pattern};
use crate::view::Atlas;

/// Cruising speed range in units per step
const CRUISE_MIN: f32 = 0.05;
const CRUISE_MAX: f32 = 0.11;
/// Body length range in units
const SIZE_MIN: f32 = 0.7;
const SIZE_MAX: f32 = 1.2;
/// How far outside the pond new fish appear
const ENTRY_MARGIN: f32 = 0.4;
/// Spread of the entry heading around the inward normal
const ENTRY_SPREAD: f32 = PI / 3.0;

/// Keeps the pond stocked by letting fish swim in from the edges
pub struct Spawner {
    interval: f32,
    population: usize,
    timer: f32,
}

impl Spawner {
    pub fn new(interval: f32, population: usize) -> Self {
        Self {
            interval,
            population,
            timer: 0.0,
        }
    }

    pub fn population(&self) -> usize {
        self.population
    }

    /// Advance the spawn timer by `rate` seconds, adding fish while below
    /// the target population. Patterns reach `atlas` on the next
    /// constellation update.
    pub fn update<A: Atlas>(
        &mut self,
        rate: f32,
        constellation: &mut Constellation,
        atlas: &A,
        rng: &mut impl Rng,
    ) {
        self.timer += rate;

        let target = self.population.min(atlas.capacity());
        while self.timer >= self.interval {
            self.timer -= self.interval;

            if constellation.population() >= target {
                continue;
            }

            let (position, inward) = Self::entry(constellation.bounds(), rng);
            let direction = Vec2::from_angle(rng.random_range(-ENTRY_SPREAD..=ENTRY_SPREAD)).rotate(inward);
            let cruise = rng.random_range(CRUISE_MIN..=CRUISE_MAX);
            let size = rng.random_range(SIZE_MIN..=SIZE_MAX);
            let pattern = Pattern::random(rng);

            constellation.spawn(|slot| Fish::new(position, direction, cruise, size, pattern, slot));
        }
    }

    /// A point just outside a random edge, with the inward normal of that edge
    fn entry(bounds: Vec2, rng: &mut impl Rng) -> (Vec2, Vec2) {
        let along = rng.random_range(0.0..=1.0f32);

        match rng.random_range(0..4) {
            0 => (Vec2::new(along * bounds.x, -ENTRY_MARGIN), Vec2::Y),
            1 => (Vec2::new(along * bounds.x, bounds.y + ENTRY_MARGIN), Vec2::NEG_Y),
            2 => (Vec2::new(-ENTRY_MARGIN, along * bounds.y), Vec2::X),
            _ => (Vec2::new(bounds.x + ENTRY_MARGIN, along * bounds.y), Vec2::NEG_X),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::recording::RecordingAtlas;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn spawns_once_per_interval() {
        let mut rng = StdRng::seed_from_u64(8);
        let atlas = RecordingAtlas::new(16);
        let mut constellation = Constellation::new(10.0, 10.0, 16);
        let mut spawner = Spawner::new(1.0, 10);

        spawner.update(0.5, &mut constellation, &atlas, &mut rng);
        assert_eq!(constellation.len(), 0);
        spawner.update(0.5, &mut constellation, &atlas, &mut rng);
        assert_eq!(constellation.len(), 1);
        spawner.update(3.0, &mut constellation, &atlas, &mut rng);
        assert_eq!(constellation.len(), 4);
    }

    #[test]
    fn population_is_never_exceeded() {
        let mut rng = StdRng::seed_from_u64(9);
        let atlas = RecordingAtlas::new(16);
        let mut constellation = Constellation::new(10.0, 10.0, 16);
        let mut spawner = Spawner::new(0.1, 5);

        for _ in 0..100 {
            spawner.update(1.0 / 14.0, &mut constellation, &atlas, &mut rng);
        }
        assert_eq!(constellation.population(), 5);
    }

    #[test]
    fn held_fish_count_towards_the_population() {
        let mut rng = StdRng::seed_from_u64(10);
        let atlas = RecordingAtlas::new(8);
        let mut constellation = Constellation::new(10.0, 10.0, 8);
        let mut spawner = Spawner::new(0.25, 2);
        spawner.update(0.5, &mut constellation, &atlas, &mut rng);

        let position = constellation.fishes()[0].position();
        let held = constellation.pick(position.x, position.y);
        assert!(held.is_some());

        spawner.update(1.0, &mut constellation, &atlas, &mut rng);
        assert_eq!(constellation.len(), 1);
        assert_eq!(constellation.population(), 2);
    }

    #[test]
    fn fish_enter_from_outside_heading_inwards() {
        let mut rng = StdRng::seed_from_u64(12);
        let atlas = RecordingAtlas::new(32);
        let mut constellation = Constellation::new(10.0, 6.0, 32);
        let mut spawner = Spawner::new(0.25, 32);
        spawner.update(8.0, &mut constellation, &atlas, &mut rng);

        for fish in constellation.fishes() {
            let (p, d) = (fish.position(), fish.direction());
            if p.x < 0.0 {
                assert!(d.x > 0.0);
            } else if p.x > 10.0 {
                assert!(d.x < 0.0);
            } else if p.y < 0.0 {
                assert!(d.y > 0.0);
            } else {
                assert!(p.y > 6.0, "fish spawned inside the pond at {p}");
                assert!(d.y < 0.0);
            }
        }
    }
}
