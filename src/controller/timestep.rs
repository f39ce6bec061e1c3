use tracing::warn;

/// Turns variable frame deltas into a whole number of fixed steps plus a
/// leftover fraction for interpolation
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    rate: f64,
    frame_time_max: f64,
    time: f64,
}

impl FixedTimestep {
    pub fn new(rate: f64, frame_time_max: f64) -> Self {
        Self {
            rate,
            frame_time_max,
            time: 0.0,
        }
    }

    /// Add a frame delta in seconds. Negative or non-finite deltas count as
    /// nothing, long ones are cut to `frame_time_max`.
    pub fn accumulate(&mut self, delta: f64) {
        let delta = if delta.is_finite() && delta > 0.0 { delta } else { 0.0 };

        if delta > self.frame_time_max {
            warn!(delta, max = self.frame_time_max, "clamping frame delta");
            self.time += self.frame_time_max;
        } else {
            self.time += delta;
        }
    }

    /// Consume one step if a whole one has accumulated
    pub fn step(&mut self) -> bool {
        if self.time >= self.rate {
            self.time -= self.rate;
            true
        } else {
            false
        }
    }

    /// Leftover time as a fraction of one step, in `[0, 1)` once every step is consumed
    pub fn time_factor(&self) -> f32 {
        ((self.time / self.rate) as f32).min(1.0 - f32::EPSILON)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn steps(timestep: &mut FixedTimestep, delta: f64) -> usize {
        timestep.accumulate(delta);
        std::iter::from_fn(|| timestep.step().then_some(())).count()
    }

    #[test]
    fn whole_steps_are_consumed_and_the_rest_kept() {
        let mut timestep = FixedTimestep::new(0.1, 1.0);

        assert_eq!(steps(&mut timestep, 0.25), 2);
        assert!(timestep.time() < timestep.rate());
        assert_relative_eq!(timestep.time_factor(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn long_frames_are_clamped() {
        let mut timestep = FixedTimestep::new(0.1, 1.0);
        assert_eq!(steps(&mut timestep, 60.0), 10);
    }

    #[test]
    fn bad_deltas_add_nothing() {
        let mut timestep = FixedTimestep::new(0.1, 1.0);

        for delta in [-1.0, 0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(steps(&mut timestep, delta), 0);
            assert_relative_eq!(timestep.time(), 0.0);
        }
    }

    #[test]
    fn time_factor_never_reaches_one() {
        for parts in [8, 15, 16, 21, 26] {
            let mut timestep = FixedTimestep::new(1.0 / 14.0, 1.0);
            for _ in 0..parts {
                timestep.accumulate(timestep.rate() / parts as f64);
            }
            while timestep.step() {}

            let factor = timestep.time_factor();
            assert!((0.0..1.0).contains(&factor), "{parts} parts gave {factor}");
        }
    }

    #[test]
    fn total_steps_track_total_time() {
        let mut timestep = FixedTimestep::new(1.0 / 14.0, 1.0);
        let total: usize = (0..100).map(|_| steps(&mut timestep, 0.016)).sum();

        // 1.6 s of frames at 14 steps per second
        assert_eq!(total, 22);
        assert!(timestep.time_factor() >= 0.0 && timestep.time_factor() < 1.0);
    }
}
