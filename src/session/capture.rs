// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine
//!
//! ```text
//!   Idle ──request──▶ AwaitingPermission ──connect──▶ Opening ──▶ Streaming
//!    ▲                        │                         │            │
//!    └────────cancel──────────┘      Error ◀──failure───┘            │
//!    ▲                                 │                             │
//!    └──────────automatic──────────────┴───────stop / detach─────────┘
//! ```
//!
//! Opening happens in two halves. [`CaptureSession::on_connect`] opens the
//! decoder and applies the negotiated format, then hands back an
//! [`OpenTicket`]. The caller posts the ticket to the dispatch queue and
//! [`CaptureSession::finish_open`] binds the surface and starts streaming.
//! Any teardown in between invalidates the ticket, so a queued detach always
//! wins over an in-flight open.

use super::negotiator::FormatNegotiator;
use crate::backends::camera::{
    FormatStrategy, PreviewFormat, Resolution, SurfaceRef, UvcBackend, UvcCamera, apply_format,
};
use crate::backends::usb::{ControlHandle, DeviceId};
use crate::errors::{CameraError, SessionError};
use std::fmt;
use tracing::{debug, info, warn};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingPermission,
    Opening,
    Streaming,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingPermission => "awaiting-permission",
            SessionState::Opening => "opening",
            SessionState::Streaming => "streaming",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Proof that the first half of an open completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTicket {
    generation: u64,
    device: DeviceId,
}

impl OpenTicket {
    pub fn device(&self) -> &DeviceId {
        &self.device
    }
}

/// Owns the open decoder and its streaming state
pub struct CaptureSession {
    backend: Box<dyn UvcBackend>,
    negotiator: FormatNegotiator,
    strategies: Vec<FormatStrategy>,
    state: SessionState,
    device: Option<DeviceId>,
    camera: Option<Box<dyn UvcCamera>>,
    format: Option<PreviewFormat>,
    options: Vec<PreviewFormat>,
    selected: Option<Resolution>,
    surface: Option<SurfaceRef>,
    generation: u64,
}

impl CaptureSession {
    pub fn new(backend: Box<dyn UvcBackend>, negotiator: FormatNegotiator) -> Self {
        Self {
            backend,
            negotiator,
            strategies: FormatStrategy::default_order(),
            state: SessionState::Idle,
            device: None,
            camera: None,
            format: None,
            options: Vec::new(),
            selected: None,
            surface: None,
            generation: 0,
        }
    }

    /// Replace the format strategy try-order
    pub fn with_strategies(mut self, strategies: Vec<FormatStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// Device the session is waiting for or running on
    pub fn device(&self) -> Option<&DeviceId> {
        self.device.as_ref()
    }

    /// Format of the current streaming session
    pub fn format(&self) -> Option<PreviewFormat> {
        self.format
    }

    /// Sizes offered by the open device, best first
    pub fn options(&self) -> &[PreviewFormat] {
        &self.options
    }

    pub fn selected_resolution(&self) -> Option<Resolution> {
        self.selected
    }

    /// Remember a size to prefer on the next negotiation
    pub fn set_selected_resolution(&mut self, resolution: Option<Resolution>) {
        self.selected = resolution;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Session state change");
            self.state = state;
        }
    }

    /// Idle → AwaitingPermission. Returns false from any other state.
    pub fn begin_permission(&mut self, device: Option<DeviceId>) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        if device.is_some() {
            self.device = device;
        }
        self.set_state(SessionState::AwaitingPermission);
        true
    }

    /// AwaitingPermission → Idle. No-op in any other state.
    pub fn cancel_permission(&mut self) {
        if self.state == SessionState::AwaitingPermission {
            self.set_state(SessionState::Idle);
        }
    }

    /// First half of an open: decoder, capabilities, negotiation, format.
    pub fn on_connect(
        &mut self,
        device: DeviceId,
        control: ControlHandle,
    ) -> Result<OpenTicket, SessionError> {
        if self.camera.is_some() {
            debug!(device = %device, "Connect while a device is open, tearing down first");
            self.release_device();
        }

        self.generation += 1;
        self.device = Some(device.clone());
        self.set_state(SessionState::Opening);

        let mut camera = match self.backend.open(control) {
            Ok(camera) => camera,
            Err(e) => return Err(self.fail(e.into())),
        };

        let preferred = camera.capabilities(self.negotiator.preferred_codec());
        let fallback = camera.capabilities(self.negotiator.fallback_codec());
        info!(
            device = %device,
            preferred = %preferred.clone().unwrap_or_default(),
            fallback = %fallback.clone().unwrap_or_default(),
            "Device capabilities"
        );

        self.options = self
            .negotiator
            .resolution_options(preferred.as_ref(), fallback.as_ref());

        let format = match self.negotiator.negotiate_with_selection(
            preferred.as_ref(),
            fallback.as_ref(),
            self.selected,
        ) {
            Ok(format) => format,
            Err(e) => {
                self.camera = Some(camera);
                return Err(self.fail(e));
            }
        };

        let applied = apply_format(camera.as_mut(), &format, &self.strategies);
        self.camera = Some(camera);
        if let Err(e) = applied {
            return Err(self.fail(e.into()));
        }
        self.format = Some(format);

        Ok(OpenTicket {
            generation: self.generation,
            device,
        })
    }

    /// Second half of an open: surface and streaming.
    ///
    /// Returns `Ok(None)` for a ticket invalidated by a teardown since it was issued.
    pub fn finish_open(&mut self, ticket: &OpenTicket) -> Result<Option<PreviewFormat>, SessionError> {
        if self.state != SessionState::Opening || ticket.generation != self.generation {
            debug!(device = %ticket.device, "Stale open ticket ignored");
            return Ok(None);
        }

        let format = match (self.camera.is_some(), self.format) {
            (true, Some(format)) => format,
            _ => {
                return Err(self.fail(CameraError::OpenFailed("decoder missing".into()).into()));
            }
        };

        let started = match (self.camera.as_mut(), self.surface.as_ref()) {
            (Some(camera), Some(surface)) => camera
                .bind_surface(surface)
                .and_then(|()| camera.start_streaming()),
            _ => Err(CameraError::SurfaceNotReady),
        };
        if let Err(e) = started {
            return Err(self.fail(e.into()));
        }

        self.set_state(SessionState::Streaming);
        info!(device = %ticket.device, format = %format, "Preview running");
        Ok(Some(format))
    }

    /// Explicit stop: release everything and return to Idle.
    ///
    /// Returns whether anything was active. Safe to call in any state.
    pub fn stop(&mut self) -> bool {
        let active = self.state != SessionState::Idle || self.camera.is_some();
        self.release_device();
        self.set_state(SessionState::Idle);
        active
    }

    /// Detach or disconnect of `device`.
    ///
    /// Tears down when it is this session's device or the session has none.
    pub fn on_detach(&mut self, device: &DeviceId) -> bool {
        match &self.device {
            Some(own) if own != device => {
                debug!(device = %device, session = %own, "Detach of another device ignored");
                false
            }
            _ => {
                self.stop();
                self.device = None;
                true
            }
        }
    }

    /// Store the surface and rebind a running preview to it
    pub fn set_surface(&mut self, surface: SurfaceRef) -> Result<Option<PreviewFormat>, SessionError> {
        self.surface = Some(surface);
        if !self.is_streaming() {
            return Ok(None);
        }
        self.restart_with(None).map(Some)
    }

    /// Switch a running preview to another offered size.
    ///
    /// While idle the size is only remembered for the next open. A running
    /// preview remembers it once the switch succeeds. Returns `Ok(None)` when
    /// nothing was running or the size is not offered.
    pub fn select_resolution(
        &mut self,
        resolution: Resolution,
    ) -> Result<Option<PreviewFormat>, SessionError> {
        if !self.is_streaming() {
            self.selected = Some(resolution);
            return Ok(None);
        }

        let Some(option) = self
            .options
            .iter()
            .find(|o| o.resolution == resolution)
            .copied()
        else {
            warn!(resolution = %resolution, "Size not offered by device");
            return Ok(None);
        };

        if self.format == Some(option) {
            self.selected = Some(resolution);
            return Ok(Some(option));
        }

        let previous = self.format;
        match self.restart_with(Some(option)) {
            Ok(format) => {
                self.selected = Some(resolution);
                Ok(Some(format))
            }
            Err(e) => {
                warn!(format = %option, error = %e, "Resolution switch failed");
                if let Some(previous) = previous
                    && self.restart_with(Some(previous)).is_ok()
                {
                    return Err(e);
                }
                self.stop();
                Err(e)
            }
        }
    }

    /// Stop output, optionally apply a new format, rebind and restart
    fn restart_with(&mut self, format: Option<PreviewFormat>) -> Result<PreviewFormat, SessionError> {
        let surface = self.surface.clone().ok_or(CameraError::SurfaceNotReady)?;
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| CameraError::OpenFailed("decoder missing".into()))?;

        if let Err(e) = camera.stop_streaming() {
            warn!(error = %e, "Stopping preview output failed");
        }

        if let Some(format) = format {
            apply_format(camera.as_mut(), &format, &self.strategies)?;
            self.format = Some(format);
        }

        camera.bind_surface(&surface)?;
        camera.start_streaming()?;

        let format = self
            .format
            .ok_or_else(|| CameraError::StreamFailed("no format applied".into()))?;
        info!(format = %format, "Preview restarted");
        Ok(format)
    }

    /// Surface a failure: Error, release, Idle
    fn fail(&mut self, error: SessionError) -> SessionError {
        self.set_state(SessionState::Error);
        warn!(error = %error, "Capture session failed");
        self.release_device();
        self.set_state(SessionState::Idle);
        error
    }

    /// Stop output before releasing the handle. Errors are logged, never raised.
    fn release_device(&mut self) {
        self.generation += 1;
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_streaming() {
                warn!(error = %e, "Stopping decoder output failed");
            }
            if let Err(e) = camera.close() {
                warn!(error = %e, "Closing decoder failed");
            }
            info!("Capture device released");
        }
        self.format = None;
        self.options.clear();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.release_device();
    }
}
