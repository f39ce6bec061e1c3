// CONTROLLER: Input, interaction and the update loop
pub mod input;
pub mod koi;
pub mod mover;
pub mod timestep;

pub use input::{dispatch, PointerEvent};
pub use koi::{Koi, Renderables};
pub use mover::Mover;
pub use timestep::FixedTimestep;
