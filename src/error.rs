use thiserror::Error;

/// Errors surfaced to the host. None of these are recoverable mid-frame;
/// the host is expected to log them and stop the pond.
#[derive(Debug, Error)]
pub enum KoiError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("population of {population} fish exceeds atlas capacity of {capacity}")]
    Capacity { population: usize, capacity: usize },

    #[error("viewport has no area ({width}x{height})")]
    EmptyViewport { width: u32, height: u32 },

    #[error("renderables are not allocated")]
    Freed,

    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to request device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("failed to acquire frame: {0}")]
    Frame(#[from] wgpu::SurfaceError),
}
