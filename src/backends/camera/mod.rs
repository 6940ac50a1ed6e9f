// SPDX-License-Identifier: GPL-3.0-only

//! UVC decoder abstraction
//!
//! The capture session talks to the frame decoder through two traits:
//!
//! ```text
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← state machine, owns the open camera
//! └──────────┬──────────┘
//!            │ open(ControlHandle)
//!            ▼
//! ┌─────────────────────┐
//! │  UvcBackend trait   │  ← opens control handles
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  UvcCamera trait    │  ← capabilities, format, surface, streaming
//! └──────────┬──────────┘
//!            ▼
//!        ┌──────┐
//!        │ V4L2 │  ← Concrete implementation
//!        └──────┘
//! ```

pub mod types;
pub mod v4l2;
pub mod v4l2_utils;

pub use types::*;

use crate::backends::usb::ControlHandle;
use crate::constants::video;
use crate::errors::{CameraError, CameraResult};
use tracing::{debug, info, warn};

/// Opens decoders on control handles granted by the USB host
pub trait UvcBackend {
    /// Open the decoder on a control handle.
    ///
    /// The handle is consumed: it is released when the returned camera is
    /// closed or dropped.
    fn open(&mut self, control: ControlHandle) -> CameraResult<Box<dyn UvcCamera>>;
}

/// An open UVC decoder (the session's Device Handle)
pub trait UvcCamera {
    /// Sizes advertised for one codec. `None` when the device reports nothing.
    fn capabilities(&self, codec: Codec) -> Option<CapabilityList>;

    /// Apply a preview format using one calling convention
    fn set_format(&mut self, format: &PreviewFormat, strategy: FormatStrategy) -> CameraResult<()>;

    /// Bind the rendering surface frames are delivered to
    fn bind_surface(&mut self, surface: &SurfaceRef) -> CameraResult<()>;

    /// Start decoder output
    fn start_streaming(&mut self) -> CameraResult<()>;

    /// Stop decoder output. Safe to call when not streaming.
    fn stop_streaming(&mut self) -> CameraResult<()>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self) -> CameraResult<()>;
}

/// One calling convention for applying a preview format.
///
/// Device firmware differs in which variant it accepts; the session tries
/// them in order and keeps the first that succeeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormatStrategy {
    /// Size and codec only
    Exact,
    /// Size and codec with a bus bandwidth factor
    Bandwidth { factor: f32 },
    /// Size and codec with an explicit frame-rate range and bandwidth factor
    FrameRange {
        min_fps: u32,
        max_fps: u32,
        factor: f32,
    },
}

impl FormatStrategy {
    /// Default try-order
    pub fn default_order() -> Vec<FormatStrategy> {
        vec![
            FormatStrategy::Exact,
            FormatStrategy::Bandwidth {
                factor: video::BANDWIDTH_FACTOR,
            },
            FormatStrategy::FrameRange {
                min_fps: video::MIN_FPS,
                max_fps: video::MAX_FPS,
                factor: video::BANDWIDTH_FACTOR,
            },
        ]
    }
}

/// Apply `format` by trying each strategy in order.
///
/// Returns the strategy that succeeded, or the error from the last attempt.
pub fn apply_format(
    camera: &mut dyn UvcCamera,
    format: &PreviewFormat,
    strategies: &[FormatStrategy],
) -> CameraResult<FormatStrategy> {
    let mut last_error =
        CameraError::FormatRejected(format!("no format strategy configured for {}", format));

    for strategy in strategies {
        match camera.set_format(format, *strategy) {
            Ok(()) => {
                info!(format = %format, ?strategy, "Preview format applied");
                return Ok(*strategy);
            }
            Err(e) => {
                debug!(format = %format, ?strategy, error = %e, "Format strategy rejected");
                last_error = e;
            }
        }
    }

    warn!(format = %format, error = %last_error, "All format strategies rejected");
    Err(last_error)
}
