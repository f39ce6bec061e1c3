use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};
use winit::{event::*, event_loop::EventLoop, window::Window};

use koi::controller::input::{native, PointerState};
use koi::controller::{dispatch, Koi, PointerEvent};
use koi::view::{GpuContext, WgpuSystems};
use koi::{logging, KoiConfig, KoiError};

struct App {
    window: Arc<Window>,
    koi: Koi<WgpuSystems>,
    pointer: PointerState,
    last_frame_time: Instant,
}

impl App {
    async fn new(window: Arc<Window>, config: KoiConfig) -> Result<Self, KoiError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let gpu = GpuContext::new_native(&instance, surface, size.width, size.height).await?;

        let seed = config.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default()
        });
        let warm_up = config.warm_up_steps;

        let mut koi = Koi::new(WgpuSystems::new(gpu), config, StdRng::seed_from_u64(seed))?;
        koi.warm_up(warm_up)?;
        info!(seed, scale = koi.scale(), "pond ready");

        Ok(Self {
            window,
            koi,
            pointer: PointerState::new(),
            last_frame_time: Instant::now(),
        })
    }

    fn apply(&mut self, event: PointerEvent) {
        if let Err(e) = dispatch(&mut self.koi, event) {
            error!(?event, "pointer event failed: {e}");
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.koi.systems_mut().resize_surface(width, height);
        self.apply(PointerEvent::Resized);
    }

    /// Render one frame. `false` means the pond cannot continue.
    fn redraw(&mut self) -> bool {
        let now = Instant::now();
        let delta = (now - self.last_frame_time).as_secs_f64();
        self.last_frame_time = now;

        match self.koi.render(delta) {
            Ok(()) => true,
            Err(KoiError::Frame(wgpu::SurfaceError::OutOfMemory)) => {
                error!("out of memory while acquiring a frame");
                false
            }
            Err(KoiError::Frame(e)) => {
                warn!("skipped frame: {e}");
                true
            }
            Err(e) => {
                error!("frame failed: {e}");
                false
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let event_loop = EventLoop::new()?;
    let window_attributes = Window::default_attributes()
        .with_title("Koi")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
    let window = Arc::new(event_loop.create_window(window_attributes)?);

    let mut app = pollster::block_on(App::new(window.clone(), KoiConfig::default()))?;

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { ref event, window_id } if window_id == app.window.id() => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => app.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                if !app.redraw() {
                    elwt.exit();
                }
            }
            other => {
                if let Some(pointer_event) = native::window_event_to_pointer(&mut app.pointer, other) {
                    app.apply(pointer_event);
                }
            }
        },
        Event::AboutToWait => app.window.request_redraw(),
        _ => {}
    })?;

    Ok(())
}
