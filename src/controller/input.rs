/// Platform-agnostic pointer handling
use crate::controller::Koi;
use crate::error::KoiError;
use crate::view::Systems;

/// Pointer id used for the mouse, touches use their own identifiers
pub const MOUSE: i64 = -1;

/// Platform-independent pointer events, positions in surface pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up,
    /// The render surface already has its new size
    Resized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn from_web_button(button: i16) -> Self {
        match button {
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }
}

/// Follows one pointer at a time, so a second finger cannot steal the fish
#[derive(Debug, Default)]
pub struct PointerState {
    active: Option<i64>,
    position: (f32, f32),
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known position of any pointer
    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    pub fn press(&mut self, id: i64, x: f32, y: f32) -> Option<PointerEvent> {
        self.position = (x, y);
        if self.active.is_some() {
            return None;
        }
        self.active = Some(id);
        Some(PointerEvent::Down { x, y })
    }

    pub fn motion(&mut self, id: i64, x: f32, y: f32) -> Option<PointerEvent> {
        self.position = (x, y);
        (self.active == Some(id)).then_some(PointerEvent::Move { x, y })
    }

    pub fn release(&mut self, id: i64) -> Option<PointerEvent> {
        if self.active != Some(id) {
            return None;
        }
        self.active = None;
        Some(PointerEvent::Up)
    }

    /// Forget the active pointer, e.g. when focus is lost
    pub fn cancel(&mut self) -> Option<PointerEvent> {
        self.active.take().map(|_| PointerEvent::Up)
    }
}

/// Apply one pointer event to the pond
pub fn dispatch<S: Systems>(koi: &mut Koi<S>, event: PointerEvent) -> Result<(), KoiError> {
    match event {
        PointerEvent::Down { x, y } => koi.touch_start(x, y),
        PointerEvent::Move { x, y } => koi.touch_move(x, y),
        PointerEvent::Up => koi.touch_end(),
        PointerEvent::Resized => koi.resize()?,
    }
    Ok(())
}

#[cfg(target_arch = "wasm32")]
pub mod wasm {
    use super::*;
    use web_sys::{HtmlCanvasElement, MouseEvent, Touch, TouchEvent};

    /// Client coordinates to canvas pixels
    fn canvas_position(canvas: &HtmlCanvasElement, client_x: i32, client_y: i32) -> (f32, f32) {
        let rect = canvas.get_bounding_client_rect();
        let scale_x = canvas.width() as f64 / rect.width().max(1.0);
        let scale_y = canvas.height() as f64 / rect.height().max(1.0);
        (
            ((client_x as f64 - rect.left()) * scale_x) as f32,
            ((client_y as f64 - rect.top()) * scale_y) as f32,
        )
    }

    fn touches(e: &TouchEvent) -> impl Iterator<Item = Touch> {
        let list = e.changed_touches();
        (0..list.length()).filter_map(move |i| list.item(i))
    }

    pub fn mouse_down(state: &mut PointerState, canvas: &HtmlCanvasElement, e: &MouseEvent) -> Option<PointerEvent> {
        if MouseButton::from_web_button(e.button()) != MouseButton::Left {
            return None;
        }
        let (x, y) = canvas_position(canvas, e.client_x(), e.client_y());
        state.press(MOUSE, x, y)
    }

    pub fn mouse_move(state: &mut PointerState, canvas: &HtmlCanvasElement, e: &MouseEvent) -> Option<PointerEvent> {
        let (x, y) = canvas_position(canvas, e.client_x(), e.client_y());
        state.motion(MOUSE, x, y)
    }

    pub fn mouse_up(state: &mut PointerState) -> Option<PointerEvent> {
        state.release(MOUSE)
    }

    pub fn touch_start(state: &mut PointerState, canvas: &HtmlCanvasElement, e: &TouchEvent) -> Vec<PointerEvent> {
        touches(e)
            .filter_map(|touch| {
                let (x, y) = canvas_position(canvas, touch.client_x(), touch.client_y());
                state.press(touch.identifier() as i64, x, y)
            })
            .collect()
    }

    pub fn touch_move(state: &mut PointerState, canvas: &HtmlCanvasElement, e: &TouchEvent) -> Vec<PointerEvent> {
        touches(e)
            .filter_map(|touch| {
                let (x, y) = canvas_position(canvas, touch.client_x(), touch.client_y());
                state.motion(touch.identifier() as i64, x, y)
            })
            .collect()
    }

    pub fn touch_end(state: &mut PointerState, e: &TouchEvent) -> Vec<PointerEvent> {
        touches(e)
            .filter_map(|touch| state.release(touch.identifier() as i64))
            .collect()
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub mod native {
    use super::*;
    use winit::event::{ElementState, MouseButton as WinitButton, TouchPhase, WindowEvent};

    /// Translate a window event, `None` for anything that is not pointer input
    pub fn window_event_to_pointer(state: &mut PointerState, event: &WindowEvent) -> Option<PointerEvent> {
        match event {
            WindowEvent::CursorMoved { position, .. } => state.motion(MOUSE, position.x as f32, position.y as f32),
            WindowEvent::MouseInput { state: pressed, button: WinitButton::Left, .. } => {
                let (x, y) = state.position();
                match pressed {
                    ElementState::Pressed => state.press(MOUSE, x, y),
                    ElementState::Released => state.release(MOUSE),
                }
            }
            WindowEvent::Touch(touch) => {
                let id = touch.id as i64;
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                match touch.phase {
                    TouchPhase::Started => state.press(id, x, y),
                    TouchPhase::Moved => state.motion(id, x, y),
                    TouchPhase::Ended | TouchPhase::Cancelled => state.release(id),
                }
            }
            WindowEvent::Focused(false) | WindowEvent::CursorLeft { .. } => state.cancel(),
            _ => None,
        }
    }
}
