//! A render surface without a GPU that records what it is asked to do

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Color;
use crate::error::KoiError;
use crate::model::{BodyInstance, Pattern, WaterPlane};
use crate::view::{Atlas, Systems};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateAtlas { id: usize, capacity: usize },
    CreateBackground { id: usize, width: u32, height: u32 },
    CreateTarget { id: usize, width: u32, height: u32 },
    CreateMesh { id: usize, capacity: usize },
    Free(usize),
    Target(usize),
    TargetMain,
    Clear(Color),
    RenderBackground(usize),
    RenderBodies { atlas: usize, count: usize },
    UpdateMesh { mesh: usize, count: usize },
    RenderWaves { underwater: usize, mesh: usize },
    Present(usize),
}

type Log = Rc<RefCell<Vec<Call>>>;

/// Any resource other than the atlas. Dropping it is logged as [`Call::Free`].
#[derive(Debug)]
pub struct Handle {
    pub id: usize,
    log: Log,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.log.borrow_mut().push(Call::Free(self.id));
    }
}

#[derive(Debug)]
pub struct RecordingAtlas {
    pub id: usize,
    slots: Vec<Option<Pattern>>,
    log: Option<Log>,
}

impl RecordingAtlas {
    /// An atlas not tied to any surface
    pub fn new(capacity: usize) -> Self {
        Self { id: 0, slots: vec![None; capacity], log: None }
    }

    pub fn written(&self, slot: usize) -> Option<&Pattern> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn written_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

impl Atlas for RecordingAtlas {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn write(&mut self, slot: usize, pattern: &Pattern) {
        self.slots[slot] = Some(pattern.clone());
    }

    fn clear(&mut self, slot: usize) {
        self.slots[slot] = None;
    }
}

impl Drop for RecordingAtlas {
    fn drop(&mut self) {
        if let Some(log) = &self.log {
            log.borrow_mut().push(Call::Free(self.id));
        }
    }
}

pub struct RecordingSystems {
    width: u32,
    height: u32,
    next_id: usize,
    failing_frames: usize,
    log: Log,
}

impl RecordingSystems {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, next_id: 1, failing_frames: 0, log: Rc::default() }
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Let the next `frames` surface acquisitions time out
    pub fn fail_frames(&mut self, frames: usize) {
        self.failing_frames = frames;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&mut self) {
        self.log.borrow_mut().clear();
    }

    fn record(&self, call: Call) {
        self.log.borrow_mut().push(call);
    }

    fn handle(&mut self) -> Handle {
        let id = self.next_id;
        self.next_id += 1;
        Handle { id, log: Rc::clone(&self.log) }
    }
}

impl Systems for RecordingSystems {
    type Atlas = RecordingAtlas;
    type Background = Handle;
    type Target = Handle;
    type Mesh = Handle;

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn create_atlas(&mut self, capacity: usize) -> Result<RecordingAtlas, KoiError> {
        let id = self.next_id;
        self.next_id += 1;
        self.record(Call::CreateAtlas { id, capacity });
        Ok(RecordingAtlas { id, slots: vec![None; capacity], log: Some(Rc::clone(&self.log)) })
    }

    fn create_background(&mut self, width: u32, height: u32, _scale: f32) -> Result<Handle, KoiError> {
        let handle = self.handle();
        self.record(Call::CreateBackground { id: handle.id, width, height });
        Ok(handle)
    }

    fn create_target(&mut self, width: u32, height: u32) -> Result<Handle, KoiError> {
        let handle = self.handle();
        self.record(Call::CreateTarget { id: handle.id, width, height });
        Ok(handle)
    }

    fn create_mesh(&mut self, capacity: usize) -> Result<Handle, KoiError> {
        let handle = self.handle();
        self.record(Call::CreateMesh { id: handle.id, capacity });
        Ok(handle)
    }

    fn target(&mut self, target: &Handle) {
        self.record(Call::Target(target.id));
    }

    fn target_main(&mut self) -> Result<(), KoiError> {
        self.record(Call::TargetMain);
        if self.failing_frames > 0 {
            self.failing_frames -= 1;
            return Err(KoiError::Frame(wgpu::SurfaceError::Timeout));
        }
        Ok(())
    }

    fn clear(&mut self, color: Color) {
        self.record(Call::Clear(color));
    }

    fn render_background(&mut self, background: &Handle) {
        self.record(Call::RenderBackground(background.id));
    }

    fn render_bodies(&mut self, atlas: &RecordingAtlas, bodies: &[BodyInstance], _scale: f32) {
        self.record(Call::RenderBodies { atlas: atlas.id, count: bodies.len() });
    }

    fn update_mesh(&mut self, mesh: &mut Handle, bodies: &[BodyInstance]) {
        self.record(Call::UpdateMesh { mesh: mesh.id, count: bodies.len() });
    }

    fn render_waves(&mut self, underwater: &Handle, mesh: &Handle, _water: &WaterPlane, _scale: f32, _time_factor: f32) {
        self.record(Call::RenderWaves { underwater: underwater.id, mesh: mesh.id });
    }

    fn present(&mut self, atlas: &RecordingAtlas) -> Result<(), KoiError> {
        self.record(Call::Present(atlas.id));
        Ok(())
    }
}
