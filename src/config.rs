use crate::error::KoiError;
use crate::model::waves::DAMPING;

/// Linear RGB color, components in `0..=1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

/// Tuning for the pond. Immutable once handed to `Koi::new`.
#[derive(Debug, Clone)]
pub struct KoiConfig {
    /// Pixels per simulation unit on roomy viewports
    pub preferred_scale: f32,
    /// The shorter viewport side spans at least this many units
    pub size_min: f32,
    /// The shorter viewport side spans at most this many units
    pub size_max: f32,
    /// Length of one simulation step in seconds
    pub update_rate: f64,
    /// Longest frame delta that is fed into the simulation
    pub frame_time_max: f64,
    pub background_color: Color,
    /// Number of atlas slots, and thereby the most fish that can exist
    pub capacity: usize,
    /// Number of fish the spawner keeps in the pond
    pub population: usize,
    /// Seconds between two spawns
    pub spawn_interval: f32,
    /// Share of the wave height kept per step, in `(0, 1]`
    pub wave_damping: f32,
    /// Steps hosts run through `Koi::warm_up` before the first frame
    pub warm_up_steps: usize,
    /// Fixed seed for the pond's randomness, `None` seeds from the clock
    pub seed: Option<u64>,
}

impl Default for KoiConfig {
    fn default() -> Self {
        Self {
            preferred_scale: 95.0,
            size_min: 8.0,
            size_max: 13.0,
            update_rate: 1.0 / 14.0,
            frame_time_max: 1.0,
            background_color: Color::new(0.26, 0.49, 0.14),
            capacity: 48,
            population: 24,
            spawn_interval: 1.5,
            wave_damping: DAMPING,
            warm_up_steps: 1500,
            seed: None,
        }
    }
}

impl KoiConfig {
    pub fn validate(&self) -> Result<(), KoiError> {
        if !(self.preferred_scale > 0.0) {
            return Err(KoiError::Config(format!(
                "preferred_scale must be positive, got {}",
                self.preferred_scale
            )));
        }
        if !(self.size_min > 0.0) || !(self.size_max > self.size_min) {
            return Err(KoiError::Config(format!(
                "expected 0 < size_min < size_max, got {} and {}",
                self.size_min, self.size_max
            )));
        }
        if !(self.update_rate > 0.0) || !(self.frame_time_max > 0.0) {
            return Err(KoiError::Config(format!(
                "update_rate and frame_time_max must be positive, got {} and {}",
                self.update_rate, self.frame_time_max
            )));
        }
        if !(self.spawn_interval > 0.0) {
            return Err(KoiError::Config(format!(
                "spawn_interval must be positive, got {}",
                self.spawn_interval
            )));
        }
        if !(self.wave_damping > 0.0 && self.wave_damping <= 1.0) {
            return Err(KoiError::Config(format!(
                "wave_damping must lie in (0, 1], got {}",
                self.wave_damping
            )));
        }
        if self.capacity == 0 || self.population > self.capacity {
            return Err(KoiError::Capacity {
                population: self.population,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}
