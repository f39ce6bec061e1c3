use glam::Vec2;
use rand::Rng;

use crate::model::{Pattern, WaterPlane};

/// Largest heading change per step in radians
const TURN_MAX: f32 = 0.25;
/// Distance from the pond edge at which fish start turning back
const EDGE: f32 = 1.0;
/// Heading change per step towards the pond center near an edge
const EDGE_TURN: f32 = 0.4;
/// Headings this close to the center direction need no correction
const EDGE_ALIGNED: f32 = 0.8;
/// Water displacement that makes a fish dart away
const STARTLE_HEIGHT: f32 = 0.35;
const STARTLE_BOOST: f32 = 2.5;
/// Fraction of the gap to cruising speed closed per step
const SPEED_RECOVERY: f32 = 0.1;
/// Lift lost per step once a fish is back in the water
const LIFT_FALL: f32 = 0.25;
/// Picking tolerance relative to the body outline
const PICK_MARGIN: f32 = 1.25;

/// One body as the render surface draws it, interpolated between steps
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BodyInstance {
    pub position: [f32; 2],
    pub direction: [f32; 2],
    pub size: f32,
    pub slot: u32,
    pub lift: f32,
    pub _pad: f32,
}

#[derive(Debug, Clone)]
pub struct Fish {
    position: Vec2,
    previous: Vec2,
    direction: Vec2,
    previous_direction: Vec2,
    speed: f32,
    cruise: f32,
    size: f32,
    lift: f32,
    previous_lift: f32,
    pattern: Pattern,
    slot: usize,
}

impl Fish {
    /// Create a fish. `slot` is the atlas slot its pattern lives in.
    pub fn new(position: Vec2, direction: Vec2, cruise: f32, size: f32, pattern: Pattern, slot: usize) -> Self {
        let direction = direction.try_normalize().unwrap_or(Vec2::X);

        Self {
            position,
            previous: position,
            direction,
            previous_direction: direction,
            speed: cruise,
            cruise,
            size,
            lift: 0.0,
            previous_lift: 0.0,
            pattern,
            slot,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn lift(&self) -> f32 {
        self.lift
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Remember the current state as the one to interpolate from
    fn store_previous(&mut self) {
        self.previous = self.position;
        self.previous_direction = self.direction;
        self.previous_lift = self.lift;
    }

    /// Swim one step inside a pond of `bounds` simulation units
    pub fn update(&mut self, bounds: Vec2, water: &WaterPlane, rng: &mut impl Rng) {
        self.store_previous();
        self.lift = (self.lift - LIFT_FALL).max(0.0);

        let turn = rng.random_range(-TURN_MAX..=TURN_MAX);
        let mut direction = Vec2::from_angle(turn).rotate(self.direction);

        let p = self.position;
        if p.x < EDGE || p.y < EDGE || p.x > bounds.x - EDGE || p.y > bounds.y - EDGE {
            let to_center = (bounds * 0.5 - p).normalize_or_zero();
            if direction.dot(to_center) < EDGE_ALIGNED {
                let turn = if direction.perp_dot(to_center) >= 0.0 { EDGE_TURN } else { -EDGE_TURN };
                direction = Vec2::from_angle(turn).rotate(direction);
            }
        }
        self.direction = direction.try_normalize().unwrap_or(self.direction);

        if water.height_at(p).abs() > STARTLE_HEIGHT {
            self.speed = (self.speed * STARTLE_BOOST).min(self.cruise * STARTLE_BOOST);
        }
        self.speed += (self.cruise - self.speed) * SPEED_RECOVERY;

        self.position += self.direction * self.speed;
    }

    /// Move towards `target` while out of the water, raising the fish
    pub fn carry(&mut self, target: Vec2, follow: f32, lift_rate: f32) {
        self.store_previous();
        self.lift = (self.lift + lift_rate).min(1.0);

        let delta = target - self.position;
        if let Some(heading) = delta.try_normalize() {
            if delta.length() > self.size * 0.1 {
                self.direction = self.direction.lerp(heading, follow).try_normalize().unwrap_or(heading);
            }
        }
        self.position += delta * follow;
    }

    /// Turn by a random angle of at most `jitter` radians
    pub fn jitter(&mut self, jitter: f32, rng: &mut impl Rng) {
        let turn = rng.random_range(-jitter..=jitter);
        self.direction = Vec2::from_angle(turn).rotate(self.direction);
    }

    /// Whether `point` lies on the body, with a little tolerance
    pub fn contains(&self, point: Vec2) -> bool {
        let offset = point - self.position;
        let along = offset.dot(self.direction) / (self.size * 0.5 * PICK_MARGIN);
        let across = offset.perp_dot(self.direction) / (self.size * 0.25 * PICK_MARGIN);

        along * along + across * across <= 1.0
    }

    pub fn interpolate(&self, time_factor: f32) -> BodyInstance {
        let position = self.previous.lerp(self.position, time_factor);
        let direction = self
            .previous_direction
            .lerp(self.direction, time_factor)
            .try_normalize()
            .unwrap_or(self.direction);

        BodyInstance {
            position: position.into(),
            direction: direction.into(),
            size: self.size,
            slot: self.slot as u32,
            lift: self.previous_lift + (self.lift - self.previous_lift) * time_factor,
            _pad: 0.0,
        }
    }
}
