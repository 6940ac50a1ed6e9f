// SPDX-License-Identifier: GPL-3.0-only

//! Instrumented fakes for the platform seams
//!
//! Every fake shares its state through an `Arc<Mutex<..>>` so a test can keep
//! a probe after handing the fake itself to the session.

#![allow(dead_code)]

use capture_preview::backends::audio::{
    AudioDeviceInfo, AudioPlatform, CaptureDevice, DeviceHandle, Direction, PcmFormat, PcmReader,
    PcmWriter, PlaybackDevice,
};
use capture_preview::backends::camera::{
    CapabilityList, Codec, FormatStrategy, FrameSink, PreviewFormat, Resolution, SurfaceRef,
    UvcBackend, UvcCamera,
};
use capture_preview::backends::usb::{
    ControlHandle, DeviceId, HostEventSender, UsbDevice, UsbHost, UsbHostEvent,
};
use capture_preview::errors::{
    AudioError, AudioResult, CameraError, CameraResult, Permission, UsbError, UsbResult,
};
use capture_preview::session::dispatcher::pump_pending;
use capture_preview::session::{
    DispatchEvent, PermissionBroker, PipController, SessionFacade, SessionOptions, SessionParts,
    SessionStatus,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Lock that survives a panicked test thread
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn usb_device(id: &str) -> UsbDevice {
    UsbDevice {
        id: DeviceId::new(id),
        name: format!("Capture card {}", id),
        path: PathBuf::from(format!("/dev/fake-{}", id)),
        vendor_id: 0x534d,
        product_id: 0x2109,
    }
}

pub fn sizes(list: &[(u32, u32)]) -> CapabilityList {
    list.iter().map(|&(w, h)| Resolution::new(w, h)).collect()
}

// --- USB host -------------------------------------------------------------

#[derive(Default)]
pub struct HostState {
    pub devices: Vec<UsbDevice>,
    pub sender: Option<HostEventSender>,
    pub started: usize,
    pub stopped: usize,
    pub permission_requests: Vec<DeviceId>,
    /// Answer permission requests immediately with this result
    pub auto_answer: Option<bool>,
    pub fail_open_control: bool,
    pub controls_opened: usize,
}

#[derive(Clone, Default)]
pub struct FakeHost {
    pub state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn with_devices(devices: Vec<UsbDevice>) -> Self {
        let host = Self::default();
        {
            let mut state = lock(&host.state);
            state.devices = devices;
            state.auto_answer = Some(true);
        }
        host
    }

    /// Deliver a raw notification the way the platform thread would
    pub fn emit(&self, event: UsbHostEvent) {
        let state = lock(&self.state);
        if let Some(sender) = state.sender.as_ref() {
            sender(event);
        }
    }

    pub fn plug(&self, device: UsbDevice) {
        lock(&self.state).devices.push(device.clone());
        self.emit(UsbHostEvent::Attached(device));
    }

    pub fn unplug(&self, id: &str) {
        let id = DeviceId::new(id);
        lock(&self.state).devices.retain(|d| d.id != id);
        self.emit(UsbHostEvent::Detached(id));
    }
}

impl UsbHost for FakeHost {
    fn start(&mut self, events: HostEventSender) -> UsbResult<()> {
        let mut state = lock(&self.state);
        state.sender = Some(events);
        state.started += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        state.sender = None;
        state.stopped += 1;
    }

    fn attached_devices(&self) -> Vec<UsbDevice> {
        lock(&self.state).devices.clone()
    }

    fn request_permission(&mut self, device: &UsbDevice) -> UsbResult<()> {
        let mut state = lock(&self.state);
        state.permission_requests.push(device.id.clone());
        if let (Some(granted), Some(sender)) = (state.auto_answer, state.sender.as_ref()) {
            sender(UsbHostEvent::PermissionResult {
                device: device.id.clone(),
                granted,
            });
        }
        Ok(())
    }

    fn open_control(&mut self, device: &UsbDevice) -> UsbResult<ControlHandle> {
        let mut state = lock(&self.state);
        if state.fail_open_control {
            return Err(UsbError::OpenFailed(device.id.to_string()));
        }
        state.controls_opened += 1;
        Ok(ControlHandle::detached(device.id.clone(), device.path.clone()))
    }
}

// --- UVC decoder ----------------------------------------------------------

#[derive(Default)]
pub struct CameraState {
    pub capabilities: HashMap<Codec, CapabilityList>,
    pub opens: usize,
    pub closes: usize,
    pub capability_queries: usize,
    pub streams_started: usize,
    pub streams_stopped: usize,
    pub applied: Vec<(PreviewFormat, FormatStrategy)>,
    /// Strategies that fail for every format
    pub rejected_strategies: Vec<FormatStrategy>,
    /// Sizes no strategy accepts
    pub rejected_sizes: HashSet<Resolution>,
    pub fail_open: bool,
    pub fail_start: bool,
    /// `stop_streaming` errors, as on a device that vanished
    pub fail_stop: bool,
    pub fail_close: bool,
    pub surfaces_bound: usize,
    /// Decoder lifecycle calls in order
    pub calls: Vec<&'static str>,
}

impl CameraState {
    pub fn open_cameras(&self) -> isize {
        self.opens as isize - self.closes as isize
    }
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    pub state: Arc<Mutex<CameraState>>,
}

impl FakeBackend {
    pub fn with_capabilities(preferred: &[(u32, u32)], fallback: &[(u32, u32)]) -> Self {
        let backend = Self::default();
        {
            let mut state = lock(&backend.state);
            if !preferred.is_empty() {
                state.capabilities.insert(Codec::Mjpeg, sizes(preferred));
            }
            if !fallback.is_empty() {
                state.capabilities.insert(Codec::Yuyv, sizes(fallback));
            }
        }
        backend
    }
}

impl UvcBackend for FakeBackend {
    fn open(&mut self, _control: ControlHandle) -> CameraResult<Box<dyn UvcCamera>> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(CameraError::OpenFailed("fake open failure".into()));
        }
        state.opens += 1;
        state.calls.push("open");
        Ok(Box::new(FakeCamera {
            state: self.state.clone(),
            closed: false,
            streaming: false,
        }))
    }
}

pub struct FakeCamera {
    state: Arc<Mutex<CameraState>>,
    closed: bool,
    streaming: bool,
}

impl UvcCamera for FakeCamera {
    fn capabilities(&self, codec: Codec) -> Option<CapabilityList> {
        let mut state = lock(&self.state);
        state.capability_queries += 1;
        state.capabilities.get(&codec).cloned()
    }

    fn set_format(&mut self, format: &PreviewFormat, strategy: FormatStrategy) -> CameraResult<()> {
        let mut state = lock(&self.state);
        if state.rejected_strategies.contains(&strategy)
            || state.rejected_sizes.contains(&format.resolution)
        {
            return Err(CameraError::FormatRejected(format.to_string()));
        }
        state.applied.push((*format, strategy));
        Ok(())
    }

    fn bind_surface(&mut self, _surface: &SurfaceRef) -> CameraResult<()> {
        lock(&self.state).surfaces_bound += 1;
        Ok(())
    }

    fn start_streaming(&mut self) -> CameraResult<()> {
        let mut state = lock(&self.state);
        if state.fail_start {
            return Err(CameraError::StreamFailed("fake start failure".into()));
        }
        state.streams_started += 1;
        state.calls.push("start_streaming");
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) -> CameraResult<()> {
        let mut state = lock(&self.state);
        if self.streaming {
            state.streams_stopped += 1;
            state.calls.push("stop_streaming");
            self.streaming = false;
        }
        if state.fail_stop {
            return Err(CameraError::StreamFailed("fake device gone".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> CameraResult<()> {
        let mut state = lock(&self.state);
        if !self.closed {
            self.closed = true;
            state.closes += 1;
            state.calls.push("close");
        }
        if state.fail_close {
            return Err(CameraError::OpenFailed("fake close failure".into()));
        }
        Ok(())
    }
}

pub struct NullSink;

impl FrameSink for NullSink {
    fn on_frame(&self, _data: &[u8], _format: &PreviewFormat) {}
}

pub fn surface() -> SurfaceRef {
    SurfaceRef::new(Arc::new(NullSink))
}

// --- Audio ------------------------------------------------------------------

pub struct AudioState {
    pub min_capture: Option<usize>,
    pub min_playback: Option<usize>,
    pub routing: bool,
    pub inputs: Vec<AudioDeviceInfo>,
    pub outputs: Vec<AudioDeviceInfo>,
    pub captures_opened: usize,
    pub playbacks_opened: usize,
    pub started: usize,
    pub stopped: usize,
    pub released: usize,
    pub fail_playback: bool,
    pub uninitialized_capture: bool,
    pub buffer_bytes: Option<usize>,
    pub capture_route: Option<String>,
    pub playback_route: Option<String>,
    pub samples_written: usize,
    pub fail_read: bool,
    pub fail_stop: bool,
    /// Directions whose handle fails to release
    pub fail_release: HashSet<Direction>,
    /// Every release call in order, failed ones included
    pub release_attempts: Vec<Direction>,
}

impl Default for AudioState {
    fn default() -> Self {
        Self {
            min_capture: Some(3840),
            min_playback: Some(7680),
            routing: true,
            inputs: Vec::new(),
            outputs: Vec::new(),
            captures_opened: 0,
            playbacks_opened: 0,
            started: 0,
            stopped: 0,
            released: 0,
            fail_playback: false,
            uninitialized_capture: false,
            buffer_bytes: None,
            capture_route: None,
            playback_route: None,
            samples_written: 0,
            fail_read: false,
            fail_stop: false,
            fail_release: HashSet::new(),
            release_attempts: Vec::new(),
        }
    }
}

impl AudioState {
    pub fn open_handles(&self) -> isize {
        (self.captures_opened + self.playbacks_opened) as isize - self.released as isize
    }
}

#[derive(Clone, Default)]
pub struct FakeAudio {
    pub state: Arc<Mutex<AudioState>>,
}

struct FakeAudioHandle {
    state: Arc<Mutex<AudioState>>,
    direction: Direction,
    initialized: bool,
    released: bool,
}

impl DeviceHandle for FakeAudioHandle {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn start(&mut self) -> AudioResult<()> {
        lock(&self.state).started += 1;
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        let mut state = lock(&self.state);
        state.stopped += 1;
        if state.fail_stop {
            return Err(AudioError::Stream("fake stop failure".into()));
        }
        Ok(())
    }

    fn release(&mut self) -> AudioResult<()> {
        let mut state = lock(&self.state);
        state.release_attempts.push(self.direction);
        if state.fail_release.contains(&self.direction) {
            return Err(AudioError::Stream("fake release failure".into()));
        }
        if !self.released {
            self.released = true;
            state.released += 1;
        }
        Ok(())
    }
}

struct SilentReader {
    state: Arc<Mutex<AudioState>>,
}

impl PcmReader for SilentReader {
    fn read(&mut self, buf: &mut [i16]) -> AudioResult<usize> {
        std::thread::sleep(Duration::from_millis(2));
        if lock(&self.state).fail_read {
            return Err(AudioError::Stream("fake capture unplugged".into()));
        }
        buf.fill(0);
        Ok(buf.len())
    }
}

struct CountingWriter {
    state: Arc<Mutex<AudioState>>,
}

impl PcmWriter for CountingWriter {
    fn write(&mut self, buf: &[i16]) -> AudioResult<usize> {
        lock(&self.state).samples_written += buf.len();
        Ok(buf.len())
    }
}

impl AudioPlatform for FakeAudio {
    fn min_buffer_size(&self, direction: Direction, _format: &PcmFormat) -> Option<usize> {
        let state = lock(&self.state);
        match direction {
            Direction::Input => state.min_capture,
            Direction::Output => state.min_playback,
        }
    }

    fn supports_routing(&self) -> bool {
        lock(&self.state).routing
    }

    fn devices(&self, direction: Direction) -> Vec<AudioDeviceInfo> {
        let state = lock(&self.state);
        match direction {
            Direction::Input => state.inputs.clone(),
            Direction::Output => state.outputs.clone(),
        }
    }

    fn open_capture(
        &mut self,
        _format: &PcmFormat,
        buffer_bytes: usize,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<CaptureDevice> {
        let mut state = lock(&self.state);
        state.captures_opened += 1;
        state.buffer_bytes = Some(buffer_bytes);
        state.capture_route = route.map(|d| d.id.clone());
        Ok(CaptureDevice {
            handle: Box::new(FakeAudioHandle {
                state: self.state.clone(),
                direction: Direction::Input,
                initialized: !state.uninitialized_capture,
                released: false,
            }),
            reader: Box::new(SilentReader {
                state: self.state.clone(),
            }),
        })
    }

    fn open_playback(
        &mut self,
        _format: &PcmFormat,
        _buffer_bytes: usize,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<PlaybackDevice> {
        let mut state = lock(&self.state);
        if state.fail_playback {
            return Err(AudioError::DeviceUnavailable("fake playback".into()));
        }
        state.playbacks_opened += 1;
        state.playback_route = route.map(|d| d.id.clone());
        Ok(PlaybackDevice {
            handle: Box::new(FakeAudioHandle {
                state: self.state.clone(),
                direction: Direction::Output,
                initialized: true,
                released: false,
            }),
            writer: Box::new(CountingWriter {
                state: self.state.clone(),
            }),
        })
    }
}

// --- Permissions --------------------------------------------------------------

#[derive(Default)]
pub struct PermissionState {
    pub granted: HashSet<Permission>,
    pub requests: Vec<Permission>,
}

#[derive(Clone, Default)]
pub struct FakePermissions {
    pub state: Arc<Mutex<PermissionState>>,
}

impl FakePermissions {
    pub fn all_granted() -> Self {
        let permissions = Self::default();
        {
            let mut state = lock(&permissions.state);
            state.granted.insert(Permission::Camera);
            state.granted.insert(Permission::RecordAudio);
        }
        permissions
    }

    pub fn grant(&self, permission: Permission) {
        lock(&self.state).granted.insert(permission);
    }
}

impl PermissionBroker for FakePermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        lock(&self.state).granted.contains(&permission)
    }

    fn request(&mut self, permission: Permission) {
        lock(&self.state).requests.push(permission);
    }
}

// --- Picture-in-picture ---------------------------------------------------------

#[derive(Default)]
pub struct PipState {
    pub running: bool,
    pub starts: usize,
    pub stops: usize,
    pub fail_start: bool,
}

#[derive(Clone, Default)]
pub struct FakePip {
    pub state: Arc<Mutex<PipState>>,
}

impl PipController for FakePip {
    fn start(&mut self) -> CameraResult<PreviewFormat> {
        let mut state = lock(&self.state);
        if state.fail_start {
            return Err(CameraError::NotAvailable("fake overlay".into()));
        }
        state.starts += 1;
        state.running = true;
        Ok(PreviewFormat::new(640, 480, Codec::Mjpeg))
    }

    fn stop(&mut self) {
        let mut state = lock(&self.state);
        if state.running {
            state.running = false;
            state.stops += 1;
        }
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

// --- Harness ----------------------------------------------------------------------

/// A facade wired to fakes, driven synchronously
pub struct Harness {
    pub facade: SessionFacade,
    pub events: UnboundedReceiver<DispatchEvent>,
    pub statuses: UnboundedReceiver<SessionStatus>,
    pub dispatch: UnboundedSender<DispatchEvent>,
    pub host: FakeHost,
    pub camera: FakeBackend,
    pub audio: FakeAudio,
    pub permissions: FakePermissions,
    pub pip: FakePip,
}

impl Harness {
    pub fn new(
        host: FakeHost,
        camera: FakeBackend,
        permissions: FakePermissions,
        options: SessionOptions,
    ) -> Self {
        let audio = FakeAudio::default();
        let pip = FakePip::default();
        let (dispatch_tx, events) = unbounded_channel();
        let (status_tx, statuses) = unbounded_channel();
        let parts = SessionParts {
            host: Box::new(host.clone()),
            backend: Box::new(camera.clone()),
            audio: Box::new(audio.clone()),
            permissions: Box::new(permissions.clone()),
            pip: Some(Box::new(pip.clone())),
        };
        let facade = SessionFacade::new(parts, options, status_tx, dispatch_tx.clone());
        Self {
            facade,
            events,
            statuses,
            dispatch: dispatch_tx,
            host,
            camera,
            audio,
            permissions,
            pip,
        }
    }

    /// Start the facade with a surface queued first, then drain the queue
    pub fn start(&mut self) -> Vec<SessionStatus> {
        self.send(capture_preview::session::Command::SurfaceAvailable(surface()).into());
        self.facade.start().unwrap();
        self.drain()
    }

    /// Handle one event directly, as if it were next in the queue
    pub fn send(&mut self, event: DispatchEvent) {
        self.facade.dispatch(event);
    }

    /// Dispatch everything queued and return the statuses emitted so far
    pub fn drain(&mut self) -> Vec<SessionStatus> {
        pump_pending(&mut self.facade, &mut self.events);
        let mut statuses = Vec::new();
        while let Ok(status) = self.statuses.try_recv() {
            statuses.push(status);
        }
        statuses
    }
}
