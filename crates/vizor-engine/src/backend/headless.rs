//! Deterministic simulated GPU.
//!
//! Nothing is rendered. Every call is appended to an ordered [`LogEntry`] log and
//! checked against the rules a real driver's validation layer enforces: binary
//! signals must alternate raise/consume, ring slots must not be re-recorded while
//! their last submission is pending, and nothing may be destroyed while
//! submitted work is outstanding. Breaches are collected in
//! [`HeadlessBackend::violations`] instead of panicking, so tests can assert on
//! them.

use std::collections::{HashMap, VecDeque};

use winit::dpi::PhysicalSize;

use super::{
    Acquisition, AttachmentSpec, Backend, CompositeOp, PresentStatus, SurfaceDesc, SurfaceRequest,
};
use crate::error::{EngineError, EngineResult};
use crate::surface::{ImageLayout, choose_present_mode, choose_surface_format, clamp_extent};

/// Command recorded into a [`HeadlessRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    PushGroup(String),
    PopGroup,
    Transition { from: ImageLayout, to: ImageLayout },
    Composite { src: String, op: CompositeOp },
    BeginLoadPass(String),
    EndPass,
    Draw(String),
    Dispatch(String),
}

/// One backend call, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    ConfigureSurface {
        size: PhysicalSize<u32>,
        format: wgpu::TextureFormat,
        image_count: u32,
    },
    ReleaseSurface,
    CreateSignal { id: u32, label: String },
    DestroySignal { id: u32 },
    CreateAttachment {
        id: u32,
        label: String,
        size: PhysicalSize<u32>,
    },
    DestroyAttachment { id: u32, label: String },
    BeginRecording { slot: usize, completed: u64 },
    Acquire { index: u32 },
    AcquireStale,
    Submit {
        slot: usize,
        value: u64,
        ops: Vec<RecordedOp>,
    },
    Present { index: u32, stale: bool },
    Wait { value: u64 },
    WaitIdle,
}

#[derive(Debug)]
pub struct HeadlessSignal {
    id: u32,
}

#[derive(Debug)]
pub struct HeadlessImage {
    index: u32,
    generation: u64,
}

impl HeadlessImage {
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[derive(Debug)]
pub struct HeadlessAttachment {
    id: u32,
    label: String,
    format: wgpu::TextureFormat,
    size: PhysicalSize<u32>,
}

impl HeadlessAttachment {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }
}

#[derive(Debug)]
pub struct HeadlessRecorder {
    slot: usize,
    ops: Vec<RecordedOp>,
}

impl HeadlessRecorder {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn draw(&mut self, label: impl Into<String>) {
        self.ops.push(RecordedOp::Draw(label.into()));
    }

    pub fn dispatch(&mut self, label: impl Into<String>) {
        self.ops.push(RecordedOp::Dispatch(label.into()));
    }

    pub fn transition(&mut self, from: ImageLayout, to: ImageLayout) {
        self.ops.push(RecordedOp::Transition { from, to });
    }

    pub fn ops(&self) -> &[RecordedOp] {
        &self.ops
    }
}

/// Load-preserving pass opened by [`Backend::record_load_pass`].
pub struct HeadlessPass<'p> {
    ops: &'p mut Vec<RecordedOp>,
}

impl HeadlessPass<'_> {
    pub fn draw(&mut self, label: impl Into<String>) {
        self.ops.push(RecordedOp::Draw(label.into()));
    }
}

#[derive(Debug)]
struct SurfaceState {
    size: PhysicalSize<u32>,
    image_count: u32,
    next_image: u32,
    outstanding: u32,
}

pub struct HeadlessBackend {
    window: PhysicalSize<u32>,
    formats: Vec<wgpu::TextureFormat>,
    present_modes: Vec<wgpu::PresentMode>,
    image_count: u32,

    surface: Option<SurfaceState>,
    generation: u64,

    next_id: u32,
    signals: HashMap<u32, bool>,
    attachments: HashMap<u32, String>,

    submitted: u64,
    completed: u64,
    pending: VecDeque<u64>,
    gpu_lag: Option<usize>,
    slot_values: HashMap<usize, u64>,

    stale_acquires: u32,
    stale_presents: u32,
    device_lost: bool,
    failing_attachment: Option<String>,

    violations: Vec<String>,
    log: Vec<LogEntry>,
}

impl HeadlessBackend {
    /// Simulated device with a window of `window` physical pixels.
    ///
    /// Defaults: three presentable images, FIFO only, GPU one submission behind.
    pub fn new(window: PhysicalSize<u32>) -> Self {
        Self {
            window,
            formats: vec![
                wgpu::TextureFormat::Bgra8UnormSrgb,
                wgpu::TextureFormat::Bgra8Unorm,
            ],
            present_modes: vec![wgpu::PresentMode::Fifo],
            image_count: 3,
            surface: None,
            generation: 0,
            next_id: 1,
            signals: HashMap::new(),
            attachments: HashMap::new(),
            submitted: 0,
            completed: 0,
            pending: VecDeque::new(),
            gpu_lag: Some(1),
            slot_values: HashMap::new(),
            stale_acquires: 0,
            stale_presents: 0,
            device_lost: false,
            failing_attachment: None,
            violations: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Maximum number of submissions the GPU leaves pending after each submit.
    /// `None` means work only completes when waited on or advanced manually.
    pub fn with_gpu_lag(mut self, lag: Option<usize>) -> Self {
        self.gpu_lag = lag;
        self
    }

    pub fn with_image_count(mut self, count: u32) -> Self {
        self.image_count = count;
        self
    }

    pub fn with_formats(mut self, formats: Vec<wgpu::TextureFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_present_modes(mut self, modes: Vec<wgpu::PresentMode>) -> Self {
        self.present_modes = modes;
        self
    }

    pub fn resize_window(&mut self, size: PhysicalSize<u32>) {
        self.window = size;
    }

    /// The next `n` acquisitions report a stale surface.
    pub fn inject_stale_acquire(&mut self, n: u32) {
        self.stale_acquires += n;
    }

    /// The next `n` presents report a stale surface.
    pub fn inject_stale_present(&mut self, n: u32) {
        self.stale_presents += n;
    }

    /// Every subsequent wait, submit and acquisition fails.
    pub fn lose_device(&mut self) {
        self.device_lost = true;
    }

    /// Makes creation of the attachment labelled `label` fail.
    pub fn fail_attachment(&mut self, label: impl Into<String>) {
        self.failing_attachment = Some(label.into());
    }

    /// Completes up to `n` of the oldest pending submissions.
    pub fn advance_gpu(&mut self, n: usize) {
        for _ in 0..n {
            match self.pending.pop_front() {
                Some(v) => self.completed = self.completed.max(v),
                None => break,
            }
        }
    }

    pub fn complete_all(&mut self) {
        self.pending.clear();
        self.completed = self.submitted;
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn live_signals(&self) -> usize {
        self.signals.len()
    }

    pub fn live_attachments(&self) -> usize {
        self.attachments.len()
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn submitted_value(&self) -> u64 {
        self.submitted
    }

    pub fn pending_submissions(&self) -> usize {
        self.pending.len()
    }

    pub fn present_count(&self) -> usize {
        self.log
            .iter()
            .filter(|e| matches!(e, LogEntry::Present { .. }))
            .count()
    }

    /// `(slot, value, ops)` for every logged submission.
    pub fn submissions(&self) -> impl Iterator<Item = (usize, u64, &[RecordedOp])> {
        self.log.iter().filter_map(|e| match e {
            LogEntry::Submit { slot, value, ops } => Some((*slot, *value, ops.as_slice())),
            _ => None,
        })
    }

    fn violation(&mut self, msg: String) {
        log::warn!("headless validation: {msg}");
        self.violations.push(msg);
    }

    fn check_idle(&mut self, what: &str) {
        if self.completed < self.submitted {
            let pending = self.submitted - self.completed;
            self.violation(format!(
                "{what} destroyed while {pending} submission(s) pending"
            ));
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn raise(&mut self, signal: &HeadlessSignal, context: &str) {
        match self.signals.get_mut(&signal.id) {
            Some(raised) if *raised => {
                self.violation(format!("{context}: signal {} raised twice", signal.id));
            }
            Some(raised) => *raised = true,
            None => self.violation(format!("{context}: signal {} used after destroy", signal.id)),
        }
    }

    fn consume(&mut self, signal: &HeadlessSignal, context: &str) {
        match self.signals.get_mut(&signal.id) {
            Some(raised) if *raised => *raised = false,
            Some(_) => {
                self.violation(format!("{context}: waits on unraised signal {}", signal.id));
            }
            None => self.violation(format!("{context}: signal {} used after destroy", signal.id)),
        }
    }

    fn check_image(&mut self, image: &HeadlessImage, context: &str) {
        if image.generation != self.generation || self.surface.is_none() {
            self.violation(format!(
                "{context}: image {} belongs to a released surface",
                image.index
            ));
        }
    }

    fn lost(&self) -> bool {
        self.device_lost
    }
}

impl Backend for HeadlessBackend {
    type Recorder = HeadlessRecorder;
    type Signal = HeadlessSignal;
    type Image = HeadlessImage;
    type Attachment = HeadlessAttachment;
    type Pass<'p> = HeadlessPass<'p>;
    type Event = String;

    fn name(&self) -> &str {
        "headless"
    }

    fn window_size(&self) -> PhysicalSize<u32> {
        self.window
    }

    fn configure_surface(&mut self, request: &SurfaceRequest) -> EngineResult<SurfaceDesc> {
        if self.lost() {
            return Err(EngineError::SurfaceConfiguration("device lost".into()));
        }
        if self.surface.is_some() {
            self.check_idle("surface");
        }

        let format = choose_surface_format(&self.formats, request.prefer_srgb)
            .ok_or_else(|| EngineError::SurfaceConfiguration("no supported formats".into()))?;
        let present_mode = choose_present_mode(&self.present_modes, request.present_mode);
        let size = clamp_extent(request.size);

        self.generation += 1;
        self.surface = Some(SurfaceState {
            size,
            image_count: self.image_count,
            next_image: 0,
            outstanding: 0,
        });
        self.log.push(LogEntry::ConfigureSurface {
            size,
            format,
            image_count: self.image_count,
        });

        Ok(SurfaceDesc {
            format,
            size,
            present_mode,
            usage: request.usage | wgpu::TextureUsages::COPY_DST,
            image_count: self.image_count,
        })
    }

    fn release_surface(&mut self) {
        if self.surface.take().is_some() {
            self.check_idle("surface");
            self.log.push(LogEntry::ReleaseSurface);
        }
    }

    fn acquire_image(&mut self, acquired: &HeadlessSignal) -> EngineResult<Acquisition<HeadlessImage>> {
        if self.lost() {
            return Err(EngineError::Acquire("device lost".into()));
        }
        let window = clamp_extent(self.window);
        let generation = self.generation;
        let Some(surface) = self.surface.as_mut() else {
            return Err(EngineError::Acquire("no surface configured".into()));
        };

        if self.stale_acquires > 0 || surface.size != window {
            self.stale_acquires = self.stale_acquires.saturating_sub(1);
            self.log.push(LogEntry::AcquireStale);
            return Ok(Acquisition::Stale);
        }

        let over_acquired = surface.outstanding >= surface.image_count;
        let index = surface.next_image;
        surface.next_image = (surface.next_image + 1) % surface.image_count;
        surface.outstanding += 1;

        if over_acquired {
            self.violation(format!("acquired image {index} with every image outstanding"));
        }
        self.raise(acquired, "acquire");
        self.log.push(LogEntry::Acquire { index });

        Ok(Acquisition::Ready {
            image: HeadlessImage { index, generation },
            index,
        })
    }

    fn present(&mut self, image: HeadlessImage, wait: &HeadlessSignal) -> EngineResult<PresentStatus> {
        if self.lost() {
            return Err(EngineError::Present("device lost".into()));
        }
        self.check_image(&image, "present");
        self.consume(wait, "present");

        let window = clamp_extent(self.window);
        let stale = match self.surface.as_mut() {
            Some(surface) => {
                surface.outstanding = surface.outstanding.saturating_sub(1);
                surface.size != window
            }
            None => true,
        } || self.stale_presents > 0;
        self.stale_presents = self.stale_presents.saturating_sub(1);

        self.log.push(LogEntry::Present {
            index: image.index,
            stale,
        });
        Ok(if stale {
            PresentStatus::Stale
        } else {
            PresentStatus::Presented
        })
    }

    fn create_signal(&mut self, label: &str) -> EngineResult<HeadlessSignal> {
        let id = self.alloc_id();
        self.signals.insert(id, false);
        self.log.push(LogEntry::CreateSignal {
            id,
            label: label.to_owned(),
        });
        Ok(HeadlessSignal { id })
    }

    fn destroy_signal(&mut self, signal: HeadlessSignal) {
        self.check_idle("signal");
        if self.signals.remove(&signal.id).is_none() {
            self.violation(format!("signal {} destroyed twice", signal.id));
        }
        self.log.push(LogEntry::DestroySignal { id: signal.id });
    }

    fn create_attachment(&mut self, spec: &AttachmentSpec) -> EngineResult<HeadlessAttachment> {
        if self.failing_attachment.as_deref() == Some(spec.label.as_str()) {
            return Err(EngineError::resource(&spec.label, "injected allocation failure"));
        }
        let id = self.alloc_id();
        self.attachments.insert(id, spec.label.clone());
        self.log.push(LogEntry::CreateAttachment {
            id,
            label: spec.label.clone(),
            size: spec.size,
        });
        Ok(HeadlessAttachment {
            id,
            label: spec.label.clone(),
            format: spec.format,
            size: spec.size,
        })
    }

    fn destroy_attachment(&mut self, attachment: HeadlessAttachment) {
        self.check_idle(&format!("attachment `{}`", attachment.label));
        if self.attachments.remove(&attachment.id).is_none() {
            self.violation(format!("attachment `{}` destroyed twice", attachment.label));
        }
        self.log.push(LogEntry::DestroyAttachment {
            id: attachment.id,
            label: attachment.label,
        });
    }

    fn begin_recording(&mut self, slot: usize) -> EngineResult<HeadlessRecorder> {
        if self.lost() {
            return Err(EngineError::Submit("device lost".into()));
        }
        if let Some(&value) = self.slot_values.get(&slot) {
            if value > self.completed {
                self.violation(format!(
                    "slot {slot} re-recorded while value {value} pending (completed {})",
                    self.completed
                ));
            }
        }
        self.log.push(LogEntry::BeginRecording {
            slot,
            completed: self.completed,
        });
        Ok(HeadlessRecorder {
            slot,
            ops: Vec::new(),
        })
    }

    fn push_debug_group(&self, recorder: &mut HeadlessRecorder, label: &str) {
        recorder.ops.push(RecordedOp::PushGroup(label.to_owned()));
    }

    fn pop_debug_group(&self, recorder: &mut HeadlessRecorder) {
        recorder.ops.push(RecordedOp::PopGroup);
    }

    fn transition(
        &self,
        recorder: &mut HeadlessRecorder,
        _image: &HeadlessImage,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        recorder.transition(from, to);
    }

    fn composite(
        &mut self,
        recorder: &mut HeadlessRecorder,
        src: &HeadlessAttachment,
        dst: &HeadlessImage,
        op: CompositeOp,
    ) -> EngineResult<()> {
        self.check_image(dst, "composite");
        if !self.attachments.contains_key(&src.id) {
            self.violation(format!("composite reads destroyed attachment `{}`", src.label));
        }
        recorder.ops.push(RecordedOp::Composite {
            src: src.label.clone(),
            op,
        });
        Ok(())
    }

    fn record_load_pass(
        &self,
        recorder: &mut HeadlessRecorder,
        _target: &HeadlessImage,
        label: &str,
        draw: &mut dyn FnMut(&mut HeadlessPass<'_>),
    ) {
        recorder.ops.push(RecordedOp::BeginLoadPass(label.to_owned()));
        draw(&mut HeadlessPass {
            ops: &mut recorder.ops,
        });
        recorder.ops.push(RecordedOp::EndPass);
    }

    fn submit(
        &mut self,
        recorder: HeadlessRecorder,
        wait: &HeadlessSignal,
        signal: &HeadlessSignal,
        value: u64,
    ) -> EngineResult<()> {
        if self.lost() {
            return Err(EngineError::Submit("device lost".into()));
        }
        if value <= self.submitted {
            self.violation(format!(
                "submission value {value} does not advance past {}",
                self.submitted
            ));
        }
        self.consume(wait, "submit");
        self.raise(signal, "submit");

        self.submitted = value;
        self.slot_values.insert(recorder.slot, value);
        self.pending.push_back(value);
        self.log.push(LogEntry::Submit {
            slot: recorder.slot,
            value,
            ops: recorder.ops,
        });

        if let Some(lag) = self.gpu_lag {
            while self.pending.len() > lag {
                self.advance_gpu(1);
            }
        }
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        self.completed
    }

    fn wait_for_value(&mut self, value: u64) -> EngineResult<()> {
        self.log.push(LogEntry::Wait { value });
        if self.lost() {
            return Err(EngineError::DeviceLost {
                value,
                reason: "device lost".into(),
            });
        }
        if value > self.submitted {
            return Err(EngineError::DeviceLost {
                value,
                reason: format!("value never submitted (last {})", self.submitted),
            });
        }
        self.completed = self.completed.max(value);
        self.pending.retain(|&v| v > value);
        Ok(())
    }

    fn wait_idle(&mut self) -> EngineResult<()> {
        self.log.push(LogEntry::WaitIdle);
        if self.lost() {
            return Err(EngineError::DeviceLost {
                value: self.submitted,
                reason: "device lost".into(),
            });
        }
        self.complete_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size: PhysicalSize<u32>) -> SurfaceRequest {
        SurfaceRequest {
            size,
            present_mode: wgpu::PresentMode::Mailbox,
            prefer_srgb: true,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            desired_maximum_frame_latency: 2,
        }
    }

    #[test]
    fn configure_negotiates_format_and_mode() {
        let mut b = HeadlessBackend::new(PhysicalSize::new(100, 50));
        let desc = b.configure_surface(&request(PhysicalSize::new(100, 50))).unwrap();
        assert_eq!(desc.format, wgpu::TextureFormat::Bgra8UnormSrgb);
        assert_eq!(desc.present_mode, wgpu::PresentMode::Fifo);
        assert_eq!(desc.image_count, 3);
    }

    #[test]
    fn signal_misuse_is_reported() {
        let mut b = HeadlessBackend::new(PhysicalSize::new(8, 8));
        b.configure_surface(&request(PhysicalSize::new(8, 8))).unwrap();
        let acquired = b.create_signal("a").unwrap();
        let done = b.create_signal("d").unwrap();

        let rec = b.begin_recording(0).unwrap();
        b.submit(rec, &acquired, &done, 1).unwrap();
        assert_eq!(b.violations().len(), 1, "waited on an unraised signal");
    }

    #[test]
    fn destroy_with_pending_work_is_reported() {
        let mut b = HeadlessBackend::new(PhysicalSize::new(8, 8)).with_gpu_lag(None);
        b.configure_surface(&request(PhysicalSize::new(8, 8))).unwrap();
        let acquired = b.create_signal("a").unwrap();
        let done = b.create_signal("d").unwrap();
        let Acquisition::Ready { image, .. } = b.acquire_image(&acquired).unwrap() else {
            panic!("expected an image");
        };
        let rec = b.begin_recording(0).unwrap();
        b.submit(rec, &acquired, &done, 1).unwrap();
        b.present(image, &done).unwrap();
        assert!(b.violations().is_empty());

        b.destroy_signal(acquired);
        assert_eq!(b.violations().len(), 1);

        b.wait_idle().unwrap();
        b.destroy_signal(done);
        assert_eq!(b.violations().len(), 1);
    }

    #[test]
    fn waiting_on_an_unsubmitted_value_is_device_loss() {
        let mut b = HeadlessBackend::new(PhysicalSize::new(8, 8));
        assert!(matches!(
            b.wait_for_value(3),
            Err(EngineError::DeviceLost { value: 3, .. })
        ));
    }

    #[test]
    fn gpu_lag_bounds_pending_work() {
        let mut b = HeadlessBackend::new(PhysicalSize::new(8, 8)).with_gpu_lag(Some(1));
        b.configure_surface(&request(PhysicalSize::new(8, 8))).unwrap();
        let acquired = b.create_signal("a").unwrap();
        let done = b.create_signal("d").unwrap();

        for value in 1..=3 {
            let Acquisition::Ready { image, .. } = b.acquire_image(&acquired).unwrap() else {
                panic!("expected an image");
            };
            let rec = b.begin_recording(0).unwrap();
            b.submit(rec, &acquired, &done, value).unwrap();
            b.present(image, &done).unwrap();
        }
        assert_eq!(b.pending_submissions(), 1);
        assert_eq!(b.completed_value(), 2);
        // slot 0 was re-recorded while its previous value was pending.
        assert_eq!(b.violations().len(), 2);
    }
}
