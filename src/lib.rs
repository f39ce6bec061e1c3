pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// MVC Architecture
pub mod controller;
pub mod model;
pub mod view;

pub use config::KoiConfig;
pub use controller::Koi;
pub use error::KoiError;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tracing::{error, info};
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{prelude::wasm_bindgen, JsCast, JsValue};
    use web_sys::{Event, HtmlCanvasElement, MouseEvent, TouchEvent, Window};

    use crate::config::KoiConfig;
    use crate::controller::input::{self, PointerState};
    use crate::controller::{dispatch, Koi, PointerEvent};
    use crate::view::{GpuContext, WgpuSystems};

    type Pond = Rc<RefCell<Koi<WgpuSystems>>>;
    type Pointer = Rc<RefCell<PointerState>>;

    #[wasm_bindgen(start)]
    pub async fn start() -> Result<(), JsValue> {
        crate::logging::init();
        let (window, canvas) = init_canvas()?;
        setup_app(&window, &canvas).await
    }

    /// Main application setup for WASM
    async fn setup_app(window: &Window, canvas: &HtmlCanvasElement) -> Result<(), JsValue> {
        let gpu = GpuContext::new(canvas, canvas.width(), canvas.height())
            .await
            .map_err(|e| js_error(format!("GPU init failed: {e}")))?;

        let config = KoiConfig::default();
        let seed = config.seed.unwrap_or_else(|| js_sys::Date::now() as u64);
        let warm_up = config.warm_up_steps;

        let mut koi = Koi::new(WgpuSystems::new(gpu), config, StdRng::seed_from_u64(seed))
            .map_err(|e| js_error(e.to_string()))?;
        koi.warm_up(warm_up).map_err(|e| js_error(e.to_string()))?;
        info!(seed, scale = koi.scale(), "pond ready");

        let koi: Pond = Rc::new(RefCell::new(koi));
        let pointer: Pointer = Rc::new(RefCell::new(PointerState::new()));
        setup_input_listeners(window, canvas, &koi, &pointer)?;

        let last_time = Rc::new(RefCell::new(now(window)));
        let f = RcCellCallback::new(window.clone(), {
            let window = window.clone();
            move || {
                let time = now(&window);
                let delta = (time - last_time.replace(time)) / 1000.0;
                if let Err(e) = koi.borrow_mut().render(delta) {
                    error!("frame failed: {e}");
                }
            }
        });
        f.start();

        Ok(())
    }

    fn now(window: &Window) -> f64 {
        window.performance().map(|p| p.now()).unwrap_or(0.0)
    }

    /// Feed translated pointer events to the pond
    fn apply(koi: &Pond, events: impl IntoIterator<Item = PointerEvent>) {
        let mut koi = koi.borrow_mut();
        for event in events {
            if let Err(e) = dispatch(&mut koi, event) {
                error!(?event, "pointer event failed: {e}");
            }
        }
    }

    /// Canvas pixel size for the current window size
    fn canvas_size(window: &Window) -> (u32, u32) {
        let ratio = window.device_pixel_ratio();
        let width = window.inner_width().ok().and_then(|w| w.as_f64()).unwrap_or(800.0);
        let height = window.inner_height().ok().and_then(|h| h.as_f64()).unwrap_or(600.0);
        ((width * ratio).round() as u32, (height * ratio).round() as u32)
    }

    /// Setup all input event listeners
    fn setup_input_listeners(
        window: &Window,
        canvas: &HtmlCanvasElement,
        koi: &Pond,
        pointer: &Pointer,
    ) -> Result<(), JsValue> {
        // Mouse down on the canvas
        {
            let (koi, pointer, target) = (koi.clone(), pointer.clone(), canvas.clone());
            let closure = Closure::wrap(Box::new(move |e: MouseEvent| {
                let event = input::wasm::mouse_down(&mut pointer.borrow_mut(), &target, &e);
                apply(&koi, event);
            }) as Box<dyn FnMut(MouseEvent)>);
            canvas.add_event_listener_with_callback("mousedown", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        // Mouse move and up on the window so drags may leave the canvas
        {
            let (koi, pointer, target) = (koi.clone(), pointer.clone(), canvas.clone());
            let closure = Closure::wrap(Box::new(move |e: MouseEvent| {
                let event = input::wasm::mouse_move(&mut pointer.borrow_mut(), &target, &e);
                apply(&koi, event);
            }) as Box<dyn FnMut(MouseEvent)>);
            window.add_event_listener_with_callback("mousemove", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }
        {
            let (koi, pointer) = (koi.clone(), pointer.clone());
            let closure = Closure::wrap(Box::new(move |_e: MouseEvent| {
                let event = input::wasm::mouse_up(&mut pointer.borrow_mut());
                apply(&koi, event);
            }) as Box<dyn FnMut(MouseEvent)>);
            window.add_event_listener_with_callback("mouseup", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        // Touch
        {
            let (koi, pointer, target) = (koi.clone(), pointer.clone(), canvas.clone());
            let closure = Closure::wrap(Box::new(move |e: TouchEvent| {
                e.prevent_default();
                let events = input::wasm::touch_start(&mut pointer.borrow_mut(), &target, &e);
                apply(&koi, events);
            }) as Box<dyn FnMut(TouchEvent)>);
            canvas.add_event_listener_with_callback("touchstart", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }
        {
            let (koi, pointer, target) = (koi.clone(), pointer.clone(), canvas.clone());
            let closure = Closure::wrap(Box::new(move |e: TouchEvent| {
                e.prevent_default();
                let events = input::wasm::touch_move(&mut pointer.borrow_mut(), &target, &e);
                apply(&koi, events);
            }) as Box<dyn FnMut(TouchEvent)>);
            canvas.add_event_listener_with_callback("touchmove", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }
        for name in ["touchend", "touchcancel"] {
            let (koi, pointer) = (koi.clone(), pointer.clone());
            let closure = Closure::wrap(Box::new(move |e: TouchEvent| {
                e.prevent_default();
                let events = input::wasm::touch_end(&mut pointer.borrow_mut(), &e);
                apply(&koi, events);
            }) as Box<dyn FnMut(TouchEvent)>);
            canvas.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        // Losing focus ends a drag
        {
            let (koi, pointer) = (koi.clone(), pointer.clone());
            let closure = Closure::wrap(Box::new(move |_e: Event| {
                let event = pointer.borrow_mut().cancel();
                apply(&koi, event);
            }) as Box<dyn FnMut(Event)>);
            window.add_event_listener_with_callback("blur", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        // Resize
        {
            let (koi, target, window_for_size) = (koi.clone(), canvas.clone(), window.clone());
            let closure = Closure::wrap(Box::new(move |_e: Event| {
                let (width, height) = canvas_size(&window_for_size);
                if width == 0 || height == 0 {
                    return;
                }
                target.set_width(width);
                target.set_height(height);
                koi.borrow_mut().systems_mut().resize_surface(width, height);
                apply(&koi, [PointerEvent::Resized]);
            }) as Box<dyn FnMut(Event)>);
            window.add_event_listener_with_callback("resize", closure.as_ref().unchecked_ref())?;
            closure.forget();
        }

        Ok(())
    }

    /// Create a full window canvas sized in device pixels
    fn init_canvas() -> Result<(Window, HtmlCanvasElement), JsValue> {
        let window = web_sys::window().ok_or(js_error("no global `window`"))?;
        let document = window.document().ok_or(js_error("no document on window"))?;
        let body = document.body().ok_or(js_error("no body on document"))?;
        let canvas_el = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| js_error("failed to create canvas"))?;

        let style = canvas_el.style();
        style.set_property("position", "fixed")?;
        style.set_property("inset", "0")?;
        style.set_property("width", "100vw")?;
        style.set_property("height", "100vh")?;
        style.set_property("touch-action", "none")?;

        let (width, height) = canvas_size(&window);
        canvas_el.set_width(width.max(1));
        canvas_el.set_height(height.max(1));
        body.append_child(&canvas_el)?;
        Ok((window, canvas_el))
    }

    fn js_error<E: Into<String>>(msg: E) -> JsValue {
        JsValue::from_str(&msg.into())
    }

    /// Self-scheduling requestAnimationFrame loop
    struct RcCellCallback {
        inner: Rc<RefCell<Box<dyn FnMut()>>>,
        window: Window,
    }

    impl RcCellCallback {
        fn new(window: Window, f: impl FnMut() + 'static) -> Self {
            Self {
                inner: Rc::new(RefCell::new(Box::new(f))),
                window,
            }
        }

        fn start(self) {
            let inner = self.inner.clone();
            let window = self.window.clone();

            let callback = Rc::new(RefCell::new(None::<Closure<dyn FnMut()>>));
            let callback_clone = callback.clone();

            *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
                inner.borrow_mut().as_mut()();

                // Recursively schedule next frame
                if let Some(cb) = callback_clone.borrow().as_ref() {
                    if let Err(e) = window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                        error!(?e, "requestAnimationFrame failed");
                    }
                }
            }) as Box<dyn FnMut()>));

            if let Some(cb) = callback.borrow().as_ref() {
                if let Err(e) = self.window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                    error!(?e, "requestAnimationFrame failed");
                }
            }
        }
    }
}
