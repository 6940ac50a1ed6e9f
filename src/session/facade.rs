// SPDX-License-Identifier: GPL-3.0-only

//! Session facade
//!
//! The boundary the UI talks to. Every [`DispatchEvent`] lands here on the
//! dispatch thread; the facade turns it into capture session, audio loop
//! and picture-in-picture calls and reports the result as [`SessionStatus`].

use super::capture::{CaptureSession, OpenTicket, SessionState};
use super::events::{Command, DeviceEvent, DispatchEvent, SessionStatus};
use super::loopback::AudioLoopback;
use super::negotiator::FormatNegotiator;
use super::pending::PendingIntent;
use super::permissions::PermissionBroker;
use super::pip::PipController;
use super::transform::PreviewTransform;
use super::watcher::DeviceWatcher;
use crate::backends::audio::AudioPlatform;
use crate::backends::camera::{PreviewFormat, Resolution, SurfaceRef, UvcBackend};
use crate::backends::usb::{DeviceId, HostEventSender, UsbHost};
use crate::config::Config;
use crate::errors::{AppResult, Permission, SessionError};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Platform collaborators the facade drives
pub struct SessionParts {
    pub host: Box<dyn UsbHost>,
    pub backend: Box<dyn UvcBackend>,
    pub audio: Box<dyn AudioPlatform>,
    pub permissions: Box<dyn PermissionBroker>,
    pub pip: Option<Box<dyn PipController>>,
}

/// Behaviour switches taken from the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Open a device as soon as it attaches while idle
    pub auto_open: bool,
    /// Start the audio loop whenever the preview starts
    pub audio_loopback: bool,
    /// Picture-in-picture requested at startup
    pub pip_enabled: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_open: true,
            audio_loopback: true,
            pip_enabled: false,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            auto_open: config.auto_open,
            audio_loopback: config.audio_loopback,
            pip_enabled: config.pip_enabled,
        }
    }
}

pub struct SessionFacade {
    watcher: DeviceWatcher,
    capture: CaptureSession,
    audio: AudioLoopback,
    permissions: Box<dyn PermissionBroker>,
    pip: Option<Box<dyn PipController>>,
    pending: PendingIntent,
    options: SessionOptions,
    pip_enabled: bool,
    /// Device the user is working with, kept across permission round trips
    current_device: Option<DeviceId>,
    view_size: Option<(u32, u32)>,
    status: UnboundedSender<SessionStatus>,
    dispatch: UnboundedSender<DispatchEvent>,
}

impl SessionFacade {
    pub fn new(
        parts: SessionParts,
        options: SessionOptions,
        status: UnboundedSender<SessionStatus>,
        dispatch: UnboundedSender<DispatchEvent>,
    ) -> Self {
        Self {
            watcher: DeviceWatcher::new(parts.host),
            capture: CaptureSession::new(parts.backend, FormatNegotiator::default()),
            audio: AudioLoopback::new(parts.audio),
            permissions: parts.permissions,
            pip: parts.pip,
            pending: PendingIntent::None,
            pip_enabled: options.pip_enabled,
            options,
            current_device: None,
            view_size: None,
            status,
            dispatch,
        }
    }

    /// Size to prefer on the next negotiation
    pub fn set_preferred_resolution(&mut self, resolution: Option<Resolution>) {
        self.capture.set_selected_resolution(resolution);
    }

    pub fn state(&self) -> SessionState {
        self.capture.state()
    }

    pub fn format(&self) -> Option<PreviewFormat> {
        self.capture.format()
    }

    pub fn pending(&self) -> PendingIntent {
        self.pending
    }

    pub fn pip_enabled(&self) -> bool {
        self.pip_enabled
    }

    pub fn audio_running(&self) -> bool {
        self.audio.is_running()
    }

    /// Last size the user picked, for persisting
    pub fn preferred_resolution(&self) -> Option<Resolution> {
        self.capture.selected_resolution()
    }

    /// Register for device notifications and replay devices already present
    pub fn start(&mut self) -> AppResult<()> {
        let dispatch = self.dispatch.clone();
        let sender: HostEventSender = Box::new(move |event| {
            if dispatch.send(DispatchEvent::Host(event)).is_err() {
                debug!("Dispatch queue closed, host event dropped");
            }
        });

        let initial = self.watcher.register(sender)?;
        if initial.is_empty() {
            self.emit(SessionStatus::WaitingForDevice);
        }
        for event in initial {
            self.on_device_event(event);
        }

        if self.pip_enabled {
            self.start_pip();
        }
        info!("Session started");
        Ok(())
    }

    /// Stop everything and release every handle
    pub fn shutdown(&mut self) {
        self.audio.stop();
        if self.capture.stop() {
            self.emit(SessionStatus::PreviewStopped);
        }
        if let Some(pip) = self.pip.as_mut() {
            pip.stop();
        }
        self.pending = PendingIntent::None;
        self.watcher.unregister();
        info!("Session shut down");
    }

    /// Handle one event from the dispatch queue
    pub fn dispatch(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Host(raw) => {
                if let Some(event) = self.watcher.translate(raw) {
                    self.on_device_event(event);
                }
            }
            DispatchEvent::Command(command) => self.on_command(command),
            DispatchEvent::PermissionResult {
                permission,
                granted,
            } => self.on_permission_result(permission, granted),
            DispatchEvent::ContinueOpen(ticket) => self.continue_open(ticket),
            DispatchEvent::Shutdown => self.shutdown(),
        }
    }

    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Attach(device) => {
                self.emit(SessionStatus::DeviceAttached(device.id.clone()));
                if self.options.auto_open && self.capture.state() == SessionState::Idle {
                    self.current_device = Some(device.id);
                    self.request_open();
                }
            }
            DeviceEvent::Detach(id) | DeviceEvent::Disconnect(id) => self.on_device_gone(&id),
            DeviceEvent::Connect(id, control) => {
                self.audio.stop();
                self.current_device = Some(id.clone());
                match self.capture.on_connect(id, control) {
                    Ok(ticket) => {
                        let options = self
                            .capture
                            .options()
                            .iter()
                            .map(|o| o.resolution)
                            .collect();
                        self.emit(SessionStatus::ResolutionOptions(options));
                        self.post(DispatchEvent::ContinueOpen(ticket));
                    }
                    Err(e) => self.emit(SessionStatus::CameraOpenFailed(e)),
                }
            }
            DeviceEvent::PermissionCancelled(id) => {
                self.capture.cancel_permission();
                self.emit(SessionStatus::UsbPermissionDenied(id));
            }
        }
    }

    fn on_device_gone(&mut self, id: &DeviceId) {
        let owns = self.capture.device().is_none_or(|own| own == id);
        if !owns {
            debug!(device = %id, "Another device went away");
            return;
        }

        let was_active = self.capture.state() != SessionState::Idle;
        self.audio.stop();
        self.capture.on_detach(id);
        if self.current_device.as_ref() == Some(id) {
            self.current_device = None;
        }
        if was_active {
            info!(device = %id, error = %SessionError::UnexpectedDetach, "Preview torn down");
        }
        self.emit(SessionStatus::WaitingForDevice);
    }

    fn continue_open(&mut self, ticket: OpenTicket) {
        match self.capture.finish_open(&ticket) {
            Ok(Some(format)) => {
                self.emit(SessionStatus::PreviewRunning(format));
                self.emit_transform(format);
                self.start_audio_if_permitted();
            }
            Ok(None) => {}
            Err(e) => self.emit(SessionStatus::CameraOpenFailed(e)),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Open => self.request_open(),
            Command::Close => self.request_close(),
            Command::SetPip(enabled) => self.set_pip(enabled),
            Command::SelectResolution(resolution) => self.select_resolution(resolution),
            Command::SurfaceAvailable(surface) => self.surface_available(surface),
            Command::ViewResized { width, height } => {
                self.view_size = Some((width, height));
                if let Some(format) = self.capture.format()
                    && self.capture.is_streaming()
                {
                    self.emit_transform(format);
                }
            }
        }
    }

    /// Open the current (or first attached) device, asking for whatever
    /// permission is still missing
    pub fn request_open(&mut self) {
        match self.capture.state() {
            SessionState::Streaming => {
                if let Some(format) = self.capture.format() {
                    self.emit(SessionStatus::PreviewRunning(format));
                }
                return;
            }
            SessionState::AwaitingPermission | SessionState::Opening => {
                debug!(state = %self.capture.state(), "Open already in progress");
                return;
            }
            SessionState::Idle | SessionState::Error => {}
        }

        if !self.permissions.is_granted(Permission::Camera) {
            self.pending = self.pending.with_open();
            self.capture.begin_permission(None);
            self.permissions.request(Permission::Camera);
            return;
        }

        let target = self
            .current_device
            .clone()
            .filter(|id| self.watcher.device(id).is_some())
            .or_else(|| self.watcher.devices().first().map(|d| d.id.clone()));
        let Some(target) = target else {
            info!(error = %SessionError::NoDeviceFound, "Nothing to open");
            self.emit(SessionStatus::WaitingForDevice);
            return;
        };

        self.current_device = Some(target.clone());
        self.capture.begin_permission(Some(target.clone()));
        if let Err(e) = self.watcher.request_permission(&target) {
            warn!(device = %target, error = %e, "USB permission request failed");
            self.capture.cancel_permission();
            self.emit(SessionStatus::CameraOpenFailed(SessionError::DeviceOpenFailed(
                e.to_string(),
            )));
        }
    }

    /// Stop audio and preview, keep the device attached
    pub fn request_close(&mut self) {
        self.audio.stop();
        self.capture.stop();
        self.emit(SessionStatus::PreviewStopped);
    }

    fn set_pip(&mut self, enabled: bool) {
        if !enabled {
            self.pip_enabled = false;
            if let Some(pip) = self.pip.as_mut() {
                pip.stop();
            }
            return;
        }
        self.pip_enabled = true;
        self.start_pip();
    }

    fn start_pip(&mut self) {
        let Some(pip) = self.pip.as_mut() else {
            self.pip_enabled = false;
            self.emit(SessionStatus::PipStartFailed("no overlay camera configured".into()));
            return;
        };
        if pip.is_running() {
            return;
        }

        if !self.permissions.is_granted(Permission::Camera) {
            self.pending = self.pending.with_pip();
            self.permissions.request(Permission::Camera);
            return;
        }

        if let Err(e) = pip.start() {
            warn!(error = %e, "Picture-in-picture start failed");
            self.pip_enabled = false;
            self.emit(SessionStatus::PipStartFailed(e.to_string()));
        }
    }

    fn select_resolution(&mut self, resolution: Resolution) {
        match self.capture.select_resolution(resolution) {
            Ok(Some(format)) => {
                self.emit(SessionStatus::PreviewRunning(format));
                self.emit_transform(format);
            }
            Ok(None) => {}
            Err(e) => {
                if !self.capture.is_streaming() {
                    self.audio.stop();
                }
                self.emit(SessionStatus::CameraOpenFailed(e));
            }
        }
    }

    fn surface_available(&mut self, surface: SurfaceRef) {
        match self.capture.set_surface(surface) {
            Ok(Some(format)) => self.emit(SessionStatus::PreviewRunning(format)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Rebinding preview surface failed");
                self.audio.stop();
                self.capture.stop();
                self.emit(SessionStatus::CameraOpenFailed(e));
            }
        }
    }

    fn on_permission_result(&mut self, permission: Permission, granted: bool) {
        info!(%permission, granted, "Permission result");
        match (permission, granted) {
            (Permission::RecordAudio, false) => {
                self.emit(SessionStatus::AudioPermissionDenied);
            }
            (Permission::RecordAudio, true) => {
                if self.capture.is_streaming() && self.options.audio_loopback {
                    self.start_audio();
                }
            }
            (Permission::Camera, false) => {
                let intent = self.pending.take();
                if intent.resumes_pip() {
                    self.pip_enabled = false;
                }
                if intent.resumes_open() {
                    self.capture.cancel_permission();
                }
                self.emit(SessionStatus::CameraOpenFailed(SessionError::PermissionDenied(
                    Permission::Camera,
                )));
            }
            (Permission::Camera, true) => {
                let intent = self.pending.take();
                if intent.resumes_open() {
                    self.capture.cancel_permission();
                    self.request_open();
                }
                if intent.resumes_pip() || self.pip_enabled {
                    self.start_pip();
                }
            }
        }
    }

    fn start_audio_if_permitted(&mut self) {
        if !self.options.audio_loopback {
            return;
        }
        if !self.permissions.is_granted(Permission::RecordAudio) {
            self.permissions.request(Permission::RecordAudio);
            return;
        }
        self.start_audio();
    }

    fn start_audio(&mut self) {
        if let Err(e) = self.audio.start() {
            warn!(error = %e, "Audio loopback failed, video keeps running");
            self.emit(SessionStatus::AudioStartFailed(e));
        }
    }

    fn emit_transform(&mut self, format: PreviewFormat) {
        let Some((width, height)) = self.view_size else {
            return;
        };
        if let Some(transform) = PreviewTransform::fit(format.resolution, width, height) {
            self.emit(SessionStatus::PreviewTransform(transform));
        }
    }

    fn emit(&self, status: SessionStatus) {
        debug!(?status, "Session status");
        if self.status.send(status).is_err() {
            debug!("Status receiver gone");
        }
    }

    fn post(&self, event: DispatchEvent) {
        if self.dispatch.send(event).is_err() {
            warn!("Dispatch queue closed, event dropped");
        }
    }
}

impl Drop for SessionFacade {
    fn drop(&mut self) {
        self.audio.stop();
        if let Some(pip) = self.pip.as_mut() {
            pip.stop();
        }
    }
}
