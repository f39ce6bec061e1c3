use rand::rngs::StdRng;
use tracing::{debug, info, trace};

use crate::config::KoiConfig;
use crate::controller::{FixedTimestep, Mover};
use crate::error::KoiError;
use crate::model::{compute_scale, Constellation, Spawner, WaterPlane, Waves};
use crate::view::Systems;

/// Everything the pond allocates on the render surface, sized for one viewport
pub struct Renderables<S: Systems> {
    pub atlas: S::Atlas,
    pub background: S::Background,
    pub underwater: S::Target,
    pub water: WaterPlane,
    pub mesh: S::Mesh,
}

impl<S: Systems> Renderables<S> {
    fn new(systems: &mut S, constellation: &Constellation, scale: f32) -> Result<Self, KoiError> {
        let (width, height) = (systems.width(), systems.height());

        Ok(Self {
            atlas: systems.create_atlas(constellation.capacity())?,
            background: systems.create_background(width, height, scale)?,
            underwater: systems.create_target(width, height)?,
            water: WaterPlane::new(constellation.width(), constellation.height()),
            mesh: constellation.make_mesh(systems)?,
        })
    }
}

/// The pond: owns the simulation, steps it at a fixed rate and draws it
/// through `S` once per frame
pub struct Koi<S: Systems> {
    systems: S,
    config: KoiConfig,
    rng: StdRng,
    scale: f32,
    timestep: FixedTimestep,
    steps: u64,
    constellation: Constellation,
    spawner: Spawner,
    mover: Mover,
    waves: Waves,
    renderables: Option<Renderables<S>>,
}

fn viewport<S: Systems>(systems: &S) -> Result<(u32, u32), KoiError> {
    let (width, height) = (systems.width(), systems.height());
    if width == 0 || height == 0 {
        return Err(KoiError::EmptyViewport { width, height });
    }
    Ok((width, height))
}

impl<S: Systems> Koi<S> {
    /// Set up an empty pond filling the viewport of `systems`.
    /// The pond starts unsettled, hosts usually [`Koi::warm_up`] it first.
    pub fn new(mut systems: S, config: KoiConfig, rng: StdRng) -> Result<Self, KoiError> {
        config.validate()?;
        let (width, height) = viewport(&systems)?;

        let scale = compute_scale(width, height, &config);
        let constellation = Constellation::new(width as f32 / scale, height as f32 / scale, config.capacity);
        let renderables = Renderables::new(&mut systems, &constellation, scale)?;

        info!(
            width,
            height,
            scale,
            capacity = config.capacity,
            population = config.population,
            "created pond"
        );

        Ok(Self {
            timestep: FixedTimestep::new(config.update_rate, config.frame_time_max),
            spawner: Spawner::new(config.spawn_interval, config.population),
            mover: Mover::new(),
            waves: Waves::new(config.wave_damping),
            renderables: Some(renderables),
            steps: 0,
            systems,
            config,
            rng,
            scale,
            constellation,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn config(&self) -> &KoiConfig {
        &self.config
    }

    pub fn constellation(&self) -> &Constellation {
        &self.constellation
    }

    pub fn mover(&self) -> &Mover {
        &self.mover
    }

    pub fn renderables(&self) -> Option<&Renderables<S>> {
        self.renderables.as_ref()
    }

    pub fn systems(&self) -> &S {
        &self.systems
    }

    pub fn systems_mut(&mut self) -> &mut S {
        &mut self.systems
    }

    /// Fixed steps taken since creation
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn timestep(&self) -> &FixedTimestep {
        &self.timestep
    }

    /// Advance the simulation by one fixed step
    pub fn update(&mut self) -> Result<(), KoiError> {
        let renderables = self.renderables.as_mut().ok_or(KoiError::Freed)?;

        self.spawner.update(
            self.config.update_rate as f32,
            &mut self.constellation,
            &renderables.atlas,
            &mut self.rng,
        );
        self.constellation.update(&mut renderables.atlas, &mut renderables.water, &mut self.rng);
        self.mover.update();
        self.waves.propagate(&mut renderables.water, &self.constellation);

        self.steps += 1;
        Ok(())
    }

    /// Run `steps` updates without drawing, so the pond looks lived in
    pub fn warm_up(&mut self, steps: usize) -> Result<(), KoiError> {
        for _ in 0..steps {
            self.update()?;
        }
        debug!(steps, fish = self.constellation.len(), "warmed up pond");
        Ok(())
    }

    /// Catch the simulation up with `delta_time` seconds and draw one frame
    pub fn render(&mut self, delta_time: f64) -> Result<(), KoiError> {
        self.timestep.accumulate(delta_time);

        let mut steps = 0;
        while self.timestep.step() {
            self.update()?;
            steps += 1;
        }
        trace!(steps, fish = self.constellation.len(), "advanced pond");

        let time_factor = self.timestep.time_factor();
        let scale = self.scale;
        let renderables = self.renderables.as_mut().ok_or(KoiError::Freed)?;

        self.systems.target(&renderables.underwater);
        self.systems.render_background(&renderables.background);
        self.constellation.render(
            &mut self.systems,
            &renderables.atlas,
            &mut renderables.mesh,
            scale,
            time_factor,
        );

        self.systems.target_main()?;
        self.systems.clear(self.config.background_color);
        self.systems.render_waves(
            &renderables.underwater,
            &renderables.mesh,
            &renderables.water,
            scale,
            time_factor,
        );
        self.mover.render(&mut self.systems, &renderables.atlas, scale, time_factor);

        self.systems.present(&renderables.atlas)
    }

    /// Follow a change of the viewport size. Every renderable is recreated,
    /// fish and the held fish keep their positions in simulation units.
    pub fn resize(&mut self) -> Result<(), KoiError> {
        let (width, height) = viewport(&self.systems)?;

        self.scale = compute_scale(width, height, &self.config);
        let (units_x, units_y) = (width as f32 / self.scale, height as f32 / self.scale);

        let old = self.renderables.take();
        if let Some(mut old) = old {
            self.constellation.resize(units_x, units_y, &mut old.atlas);
            drop(old);
        }

        debug!("recreating renderables");
        let mut renderables = Renderables::new(&mut self.systems, &self.constellation, self.scale)?;
        if self.constellation.width() != units_x || self.constellation.height() != units_y {
            // Nothing was allocated before, so no slot has been written yet
            self.constellation.resize(units_x, units_y, &mut renderables.atlas);
            renderables.water = WaterPlane::new(units_x, units_y);
        }
        self.constellation.update_atlas(&mut renderables.atlas);
        self.mover.update_atlas(&mut renderables.atlas);
        self.renderables = Some(renderables);

        info!(width, height, scale = self.scale, fish = self.constellation.len(), "resized pond");
        Ok(())
    }

    /// Pick up the topmost fish under pixel `(x, y)`, if any
    pub fn touch_start(&mut self, x: f32, y: f32) {
        if self.mover.is_holding() {
            return;
        }
        let (x, y) = (x / self.scale, y / self.scale);
        let Some(renderables) = self.renderables.as_mut() else {
            return;
        };

        if let Some(fish) = self.constellation.pick(x, y) {
            if let Err(fish) = self.mover.pick_up(fish, x, y, &mut renderables.water, &mut self.rng) {
                self.constellation.insert(fish);
            }
        }
    }

    pub fn touch_move(&mut self, x: f32, y: f32) {
        self.mover.touch_move(x / self.scale, y / self.scale);
    }

    pub fn touch_end(&mut self) {
        if let Some(renderables) = self.renderables.as_mut() {
            self.mover
                .release(&mut self.constellation, &mut renderables.water, &mut self.rng);
        }
    }

    /// Release everything allocated on the render surface and hand it back
    pub fn free(mut self) -> S {
        self.renderables = None;
        debug!("freed pond");
        self.systems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::recording::{Call, RecordingSystems};
    use crate::view::Atlas;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn pond(width: u32, height: u32) -> Koi<RecordingSystems> {
        Koi::new(
            RecordingSystems::new(width, height),
            KoiConfig::default(),
            StdRng::seed_from_u64(7),
        )
        .expect("valid pond")
    }

    fn frees(calls: &[Call]) -> usize {
        calls.iter().filter(|call| matches!(call, Call::Free(_))).count()
    }

    fn creates(calls: &[Call]) -> usize {
        calls
            .iter()
            .filter(|call| {
                matches!(
                    call,
                    Call::CreateAtlas { .. }
                        | Call::CreateBackground { .. }
                        | Call::CreateTarget { .. }
                        | Call::CreateMesh { .. }
                )
            })
            .count()
    }

    /// Warm up until fish swam in, then return a pixel on the first one
    fn settled(koi: &mut Koi<RecordingSystems>) -> (f32, f32) {
        koi.warm_up(300).expect("warm up");
        let fish = &koi.constellation().fishes()[0];
        let p = fish.position() * koi.scale();
        (p.x, p.y)
    }

    #[test]
    fn construction_allocates_each_renderable_once() {
        let koi = pond(950, 950);

        assert_relative_eq!(koi.scale(), 95.0);
        assert_relative_eq!(koi.constellation().width(), 10.0);
        assert_eq!(
            koi.systems().calls(),
            vec![
                Call::CreateAtlas { id: 1, capacity: 48 },
                Call::CreateBackground { id: 2, width: 950, height: 950 },
                Call::CreateTarget { id: 3, width: 950, height: 950 },
                Call::CreateMesh { id: 4, capacity: 48 },
            ]
        );
        assert_eq!(koi.steps(), 0);
    }

    #[test]
    fn population_above_capacity_is_rejected() {
        let config = KoiConfig { population: 49, ..KoiConfig::default() };
        let result = Koi::new(RecordingSystems::new(800, 600), config, StdRng::seed_from_u64(1));

        assert!(matches!(result, Err(KoiError::Capacity { population: 49, capacity: 48 })));
    }

    #[test]
    fn empty_viewport_is_rejected() {
        let result = Koi::new(RecordingSystems::new(0, 600), KoiConfig::default(), StdRng::seed_from_u64(1));
        assert!(matches!(result, Err(KoiError::EmptyViewport { width: 0, height: 600 })));

        let mut koi = pond(800, 600);
        koi.systems_mut().set_size(800, 0);
        assert!(matches!(koi.resize(), Err(KoiError::EmptyViewport { .. })));
    }

    #[test]
    fn frame_draws_underwater_then_surface() {
        let mut koi = pond(950, 950);
        koi.systems_mut().clear_calls();

        koi.render(0.0).expect("frame");

        let background = koi.config().background_color;
        assert_eq!(
            koi.systems().calls(),
            vec![
                Call::Target(3),
                Call::RenderBackground(2),
                Call::UpdateMesh { mesh: 4, count: 0 },
                Call::RenderBodies { atlas: 1, count: 0 },
                Call::TargetMain,
                Call::Clear(background),
                Call::RenderWaves { underwater: 3, mesh: 4 },
                Call::Present(1),
            ]
        );
    }

    #[test]
    fn held_fish_is_drawn_above_the_water() {
        let mut koi = pond(950, 950);
        let (x, y) = settled(&mut koi);
        koi.touch_start(x, y);
        assert!(koi.mover().is_holding());
        koi.systems_mut().clear_calls();

        koi.render(0.0).expect("frame");

        let calls = koi.systems().calls();
        let waves = calls.iter().position(|call| matches!(call, Call::RenderWaves { .. }));
        let held = calls.iter().rposition(|call| matches!(call, Call::RenderBodies { count: 1, .. }));
        assert!(waves < held, "{calls:?}");
        assert!(matches!(calls.last(), Some(Call::Present(1))));
    }

    #[test]
    fn updates_follow_elapsed_time() {
        let mut koi = pond(800, 600);
        for _ in 0..21 {
            koi.render(0.05).expect("frame");
        }
        assert_eq!(koi.steps(), 14);
        assert!(koi.timestep().time() < koi.config().update_rate);

        let mut koi = pond(800, 600);
        for _ in 0..20 {
            koi.render(0.05).expect("frame");
        }
        assert!((13..=14).contains(&koi.steps()));
    }

    #[test]
    fn time_factor_stays_below_one() {
        let mut koi = pond(800, 600);
        for delta in [0.016, 0.5, 0.033, 2.0, 0.071, 0.0] {
            koi.render(delta).expect("frame");
            let factor = koi.timestep().time_factor();
            assert!((0.0..1.0).contains(&factor), "{factor}");
        }
    }

    #[test]
    fn bad_deltas_still_draw_without_stepping() {
        let mut koi = pond(800, 600);
        koi.systems_mut().clear_calls();

        for delta in [-0.5, f64::NAN, f64::INFINITY] {
            koi.render(delta).expect("frame");
        }

        assert_eq!(koi.steps(), 0);
        let presents = koi.systems().calls().iter().filter(|call| matches!(call, Call::Present(_))).count();
        assert_eq!(presents, 3);
    }

    #[test]
    fn irregular_frames_step_by_total_time() {
        let mut koi = pond(800, 600);
        let deltas = [0.016, 0.5, 0.033, 2.0, 0.071, 0.0, -0.2, 0.2, 0.009];

        for delta in deltas {
            koi.render(delta).expect("frame");
        }

        let rate = koi.config().update_rate;
        let total: f64 = deltas.iter().map(|&delta| delta.clamp(0.0, koi.config().frame_time_max)).sum();
        assert_eq!(koi.steps(), (total / rate).floor() as u64);
        assert_relative_eq!(koi.timestep().time(), total - koi.steps() as f64 * rate, epsilon = 1e-9);
    }

    #[test]
    fn skipped_frames_leave_nothing_behind() {
        let mut koi = pond(950, 950);
        koi.warm_up(300).expect("warm up");
        koi.systems_mut().fail_frames(2);

        for _ in 0..2 {
            assert!(matches!(koi.render(0.05), Err(KoiError::Frame(_))));
        }
        koi.systems_mut().clear_calls();
        koi.render(0.0).expect("frame");

        let calls = koi.systems().calls();
        assert_eq!(calls.first(), Some(&Call::Target(3)));
        assert_eq!(calls.iter().filter(|call| matches!(call, Call::Target(_))).count(), 1);
        assert!(matches!(calls.last(), Some(Call::Present(1))));
    }

    #[test]
    fn long_frames_are_capped() {
        let mut koi = pond(800, 600);
        koi.render(30.0).expect("frame");
        assert!((13..=14).contains(&koi.steps()));
    }

    #[test]
    fn warm_up_runs_the_requested_steps() {
        let mut koi = pond(800, 600);
        koi.warm_up(100).expect("warm up");

        assert_eq!(koi.steps(), 100);
        assert!(!koi.constellation().is_empty());
    }

    #[test]
    fn resize_frees_before_recreating() {
        let mut koi = pond(800, 600);
        koi.systems_mut().clear_calls();

        koi.resize().expect("resize");

        let calls = koi.systems().calls();
        assert_eq!(frees(&calls), 4);
        assert_eq!(creates(&calls), 4);
        let last_free = calls.iter().rposition(|call| matches!(call, Call::Free(_)));
        let first_create = calls.iter().position(|call| matches!(call, Call::CreateAtlas { .. }));
        assert!(last_free < first_create);
    }

    #[test]
    fn resize_to_the_same_size_changes_nothing_but_the_allocations() {
        let mut koi = pond(800, 600);
        koi.warm_up(200).expect("warm up");
        let scale = koi.scale();
        let fish = koi.constellation().len();
        let positions: Vec<_> = koi.constellation().fishes().iter().map(|fish| fish.position()).collect();

        koi.resize().expect("resize");
        koi.resize().expect("resize");

        assert_relative_eq!(koi.scale(), scale);
        assert_eq!(koi.constellation().len(), fish);
        let after: Vec<_> = koi.constellation().fishes().iter().map(|fish| fish.position()).collect();
        assert_eq!(positions, after);

        let calls = koi.systems().calls();
        assert_eq!(creates(&calls) - frees(&calls), 4);
    }

    #[test]
    fn resized_atlas_holds_every_pattern() {
        let mut koi = pond(950, 950);
        let (x, y) = settled(&mut koi);
        koi.touch_start(x, y);
        let held = koi.mover().held().map(|fish| fish.slot()).expect("holding");

        koi.systems_mut().set_size(1900, 950);
        koi.resize().expect("resize");

        let atlas = &koi.renderables().expect("allocated").atlas;
        assert_eq!(atlas.capacity(), 48);
        assert!(atlas.written(held).is_some());
        for fish in koi.constellation().fishes() {
            assert!(atlas.written(fish.slot()).is_some());
        }
        assert!(koi.mover().is_holding());
    }

    #[test]
    fn shrinking_keeps_the_population_bounded() {
        let mut koi = pond(1300, 1300);
        koi.warm_up(600).expect("warm up");

        koi.systems_mut().set_size(400, 400);
        koi.resize().expect("resize");
        koi.warm_up(600).expect("warm up");

        assert!(koi.constellation().population() <= koi.config().population);
        for fish in koi.constellation().fishes() {
            let atlas = &koi.renderables().expect("allocated").atlas;
            assert!(atlas.written(fish.slot()).is_some());
        }
    }

    #[test]
    fn drag_keeps_the_fish_count() {
        let mut koi = pond(950, 950);
        let (x, y) = settled(&mut koi);
        let fish = koi.constellation().len();
        let population = koi.constellation().population();

        koi.touch_start(x, y);
        assert_eq!(koi.constellation().len(), fish - 1);
        assert_eq!(koi.constellation().population(), population);

        koi.touch_move(x + 50.0, y + 20.0);
        for _ in 0..5 {
            koi.render(1.0 / 30.0).expect("frame");
        }
        koi.touch_end();

        assert!(!koi.mover().is_holding());
        let arrived = koi.constellation().len() - fish;
        assert_eq!(koi.constellation().population(), population + arrived);
    }

    #[test]
    fn quick_tap_puts_the_fish_back() {
        let mut koi = pond(950, 950);
        let (x, y) = settled(&mut koi);
        let fish = koi.constellation().len();
        let population = koi.constellation().population();

        koi.touch_start(x, y);
        assert!(koi.mover().is_holding());
        koi.touch_end();

        assert!(!koi.mover().is_holding());
        assert_eq!(koi.constellation().len(), fish);
        assert_eq!(koi.constellation().population(), population);
    }

    #[test]
    fn second_touch_while_holding_is_ignored() {
        let mut koi = pond(950, 950);
        let (x, y) = settled(&mut koi);
        koi.touch_start(x, y);
        let held = koi.mover().held().map(|fish| fish.slot());
        let fish = koi.constellation().len();

        let other = koi.constellation().fishes().first().map(|fish| fish.position() * koi.scale());
        if let Some(other) = other {
            koi.touch_start(other.x, other.y);
        }

        assert_eq!(koi.constellation().len(), fish);
        assert_eq!(koi.mover().held().map(|fish| fish.slot()), held);
    }

    #[test]
    fn touching_open_water_does_nothing() {
        let mut koi = pond(950, 950);

        koi.touch_start(400.0, 400.0);
        koi.touch_move(500.0, 500.0);
        koi.touch_end();

        assert!(!koi.mover().is_holding());
        assert!(koi.constellation().is_empty());
    }

    #[test]
    fn free_releases_every_renderable() {
        let mut koi = pond(800, 600);
        koi.systems_mut().clear_calls();

        let systems = koi.free();

        assert_eq!(frees(&systems.calls()), 4);
    }
}
