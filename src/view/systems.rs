use crate::config::Color;
use crate::error::KoiError;
use crate::model::{BodyInstance, Pattern, WaterPlane};

/// Texture holding one rasterised pattern per fish
pub trait Atlas {
    /// Number of slots, which bounds the number of fish alive at once
    fn capacity(&self) -> usize;

    fn write(&mut self, slot: usize, pattern: &Pattern);

    /// Forget the pattern in `slot` so it can be handed to a new fish
    fn clear(&mut self, slot: usize);
}

/// The render surface the pond draws through.
///
/// Drawing calls go to the current target, which is either an offscreen
/// target made with [`Systems::create_target`] or the main surface. Sizes are
/// in pixels, body positions in simulation units multiplied by `scale`.
pub trait Systems {
    type Atlas: Atlas;
    type Background;
    type Target;
    type Mesh;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn create_atlas(&mut self, capacity: usize) -> Result<Self::Atlas, KoiError>;
    fn create_background(&mut self, width: u32, height: u32, scale: f32) -> Result<Self::Background, KoiError>;
    fn create_target(&mut self, width: u32, height: u32) -> Result<Self::Target, KoiError>;
    /// Instance storage for up to `capacity` bodies, read when shading the water
    fn create_mesh(&mut self, capacity: usize) -> Result<Self::Mesh, KoiError>;

    /// Send the following drawing calls to `target`
    fn target(&mut self, target: &Self::Target);
    /// Send the following drawing calls to the screen
    fn target_main(&mut self) -> Result<(), KoiError>;
    fn clear(&mut self, color: Color);

    fn render_background(&mut self, background: &Self::Background);
    fn render_bodies(&mut self, atlas: &Self::Atlas, bodies: &[BodyInstance], scale: f32);
    fn update_mesh(&mut self, mesh: &mut Self::Mesh, bodies: &[BodyInstance]);
    /// Draw the water surface over `underwater`, refracted by the height field
    /// and shadowed by the bodies in `mesh`
    fn render_waves(
        &mut self,
        underwater: &Self::Target,
        mesh: &Self::Mesh,
        water: &WaterPlane,
        scale: f32,
        time_factor: f32,
    );

    /// Finish the frame. `atlas` stays bound afterwards for anything drawing
    /// fish outside the pond.
    fn present(&mut self, atlas: &Self::Atlas) -> Result<(), KoiError>;
}
