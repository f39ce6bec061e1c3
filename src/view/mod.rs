// VIEW: Render surface and rendering
pub mod gpu_init;
#[cfg(test)]
pub mod recording;
pub mod render;
pub mod systems;

pub use gpu_init::GpuContext;
pub use render::{WgpuAtlas, WgpuBackground, WgpuMesh, WgpuSystems, WgpuTarget};
pub use systems::{Atlas, Systems};
