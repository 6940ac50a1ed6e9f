// SPDX-License-Identifier: GPL-3.0-only

//! Picture-in-picture camera
//!
//! A second, independent camera streamed next to the capture card. It uses
//! the same decoder seam and negotiation as the main preview but has its own
//! lifecycle and never touches the capture session.

use super::negotiator::FormatNegotiator;
use crate::backends::camera::{
    FormatStrategy, PreviewFormat, SurfaceRef, UvcBackend, UvcCamera, apply_format,
};
use crate::backends::usb::{ControlHandle, DeviceId};
use crate::errors::{CameraError, CameraResult};
use std::path::PathBuf;
use tracing::{info, warn};

/// Starts and stops the overlay camera
pub trait PipController {
    fn start(&mut self) -> CameraResult<PreviewFormat>;

    /// Safe to call when not running
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Overlay from a V4L2 node, e.g. a laptop's front camera
pub struct DevicePip {
    path: PathBuf,
    backend: Box<dyn UvcBackend>,
    negotiator: FormatNegotiator,
    surface: SurfaceRef,
    camera: Option<Box<dyn UvcCamera>>,
}

impl DevicePip {
    pub fn new(
        path: impl Into<PathBuf>,
        backend: Box<dyn UvcBackend>,
        negotiator: FormatNegotiator,
        surface: SurfaceRef,
    ) -> Self {
        Self {
            path: path.into(),
            backend,
            negotiator,
            surface,
            camera: None,
        }
    }

    fn open(&mut self) -> CameraResult<(Box<dyn UvcCamera>, PreviewFormat)> {
        let control = ControlHandle::open(DeviceId::new("pip"), &self.path)
            .map_err(|e| CameraError::OpenFailed(format!("{}: {}", self.path.display(), e)))?;
        let mut camera = self.backend.open(control)?;

        let preferred = camera.capabilities(self.negotiator.preferred_codec());
        let fallback = camera.capabilities(self.negotiator.fallback_codec());
        let streamed = self
            .negotiator
            .negotiate(preferred.as_ref(), fallback.as_ref())
            .map_err(|e| CameraError::FormatRejected(e.to_string()))
            .and_then(|format| {
                apply_format(camera.as_mut(), &format, &FormatStrategy::default_order())?;
                camera.bind_surface(&self.surface)?;
                camera.start_streaming()?;
                Ok(format)
            });

        match streamed {
            Ok(format) => Ok((camera, format)),
            Err(e) => {
                if let Err(close_err) = camera.close() {
                    warn!(error = %close_err, "Closing overlay camera failed");
                }
                Err(e)
            }
        }
    }
}

impl PipController for DevicePip {
    fn start(&mut self) -> CameraResult<PreviewFormat> {
        self.stop();
        let (camera, format) = self.open()?;
        self.camera = Some(camera);
        info!(path = %self.path.display(), format = %format, "Picture-in-picture started");
        Ok(format)
    }

    fn stop(&mut self) {
        let Some(mut camera) = self.camera.take() else {
            return;
        };
        if let Err(e) = camera.stop_streaming() {
            warn!(error = %e, "Stopping overlay camera failed");
        }
        if let Err(e) = camera.close() {
            warn!(error = %e, "Closing overlay camera failed");
        }
        info!(path = %self.path.display(), "Picture-in-picture stopped");
    }

    fn is_running(&self) -> bool {
        self.camera.is_some()
    }
}

impl Drop for DevicePip {
    fn drop(&mut self) {
        self.stop();
    }
}
