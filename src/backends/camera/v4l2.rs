// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 implementation of the UVC decoder seam
//!
//! Format negotiation runs on the caller's thread against an open
//! [`Device`]. Frames are dequeued by a dedicated pump thread that opens its
//! own handle to the node and mmaps the capture buffers there, handing each
//! frame to the bound surface.

use super::types::{CapabilityList, Codec, PreviewFormat, Resolution, SurfaceRef};
use super::{FormatStrategy, UvcBackend, UvcCamera};
use crate::backends::usb::ControlHandle;
use crate::backends::worker_loop::{LoopAction, WorkerLoop};
use crate::constants::{RESOLUTION_LADDER, timing, video};
use crate::errors::{CameraError, CameraResult};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// How long start_streaming waits for the pump to map its buffers
const PUMP_READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive dequeue errors tolerated before the pump gives up
const MAX_CONSECUTIVE_ERRORS: u32 = 30;

/// Opens V4L2 capture nodes on granted control handles
#[derive(Debug, Default)]
pub struct V4l2Backend;

impl V4l2Backend {
    pub fn new() -> Self {
        Self
    }
}

impl UvcBackend for V4l2Backend {
    fn open(&mut self, control: ControlHandle) -> CameraResult<Box<dyn UvcCamera>> {
        let path = control.path().to_path_buf();
        let device = Device::with_path(&path)
            .map_err(|e| CameraError::OpenFailed(format!("{}: {}", path.display(), e)))?;

        info!(device = %control.device(), path = %path.display(), "V4L2 device opened");

        Ok(Box::new(V4l2Camera {
            path,
            device: Some(device),
            control: Some(control),
            format: None,
            surface: None,
            pump: None,
        }))
    }
}

/// An open V4L2 capture node
pub struct V4l2Camera {
    path: PathBuf,
    device: Option<Device>,
    control: Option<ControlHandle>,
    format: Option<PreviewFormat>,
    surface: Option<SurfaceRef>,
    pump: Option<WorkerLoop>,
}

impl V4l2Camera {
    fn device(&self) -> CameraResult<&Device> {
        self.device
            .as_ref()
            .ok_or_else(|| CameraError::OpenFailed("device is closed".to_string()))
    }

    fn request_format(&self, format: &PreviewFormat) -> CameraResult<Format> {
        let fourcc = FourCC::new(format.codec.fourcc());
        let requested = Format::new(format.width(), format.height(), fourcc);
        let actual = self
            .device()?
            .set_format(&requested)
            .map_err(|e| CameraError::FormatRejected(format!("{}: {}", format, e)))?;

        if actual.fourcc != fourcc {
            return Err(CameraError::FormatRejected(format!(
                "{}: driver switched codec to {}",
                format, actual.fourcc
            )));
        }
        Ok(actual)
    }
}

/// Map one enumerated frame size onto concrete resolutions
fn expand_frame_size(size: &FrameSizeEnum) -> Vec<Resolution> {
    match size {
        FrameSizeEnum::Discrete(discrete) => {
            vec![Resolution::new(discrete.width, discrete.height)]
        }
        FrameSizeEnum::Stepwise(step) => RESOLUTION_LADDER
            .iter()
            .filter(|r| {
                r.width >= step.min_width
                    && r.width <= step.max_width
                    && r.height >= step.min_height
                    && r.height <= step.max_height
            })
            .copied()
            .collect(),
    }
}

impl UvcCamera for V4l2Camera {
    fn capabilities(&self, codec: Codec) -> Option<CapabilityList> {
        let device = self.device.as_ref()?;
        let sizes = match device.enum_framesizes(FourCC::new(codec.fourcc())) {
            Ok(sizes) => sizes,
            Err(e) => {
                debug!(codec = %codec, error = %e, "No frame sizes for codec");
                return None;
            }
        };

        let mut list: Vec<Resolution> = Vec::new();
        for size in &sizes {
            for resolution in expand_frame_size(&size.size) {
                if !list.contains(&resolution) {
                    list.push(resolution);
                }
            }
        }

        debug!(codec = %codec, count = list.len(), "Enumerated frame sizes");
        Some(CapabilityList::new(list))
    }

    fn set_format(&mut self, format: &PreviewFormat, strategy: FormatStrategy) -> CameraResult<()> {
        match strategy {
            FormatStrategy::Exact => {
                let actual = self.request_format(format)?;
                if actual.width != format.width() || actual.height != format.height() {
                    return Err(CameraError::FormatRejected(format!(
                        "{}: driver adjusted size to {}x{}",
                        format, actual.width, actual.height
                    )));
                }
            }
            FormatStrategy::Bandwidth { factor } => {
                let actual = self.request_format(format)?;
                // uvcvideo reserves isochronous bandwidth itself
                debug!(
                    factor,
                    width = actual.width,
                    height = actual.height,
                    "Format accepted with driver bandwidth selection"
                );
            }
            FormatStrategy::FrameRange {
                min_fps, max_fps, ..
            } => {
                self.request_format(format)?;
                match self.device()?.set_params(&Parameters::with_fps(max_fps)) {
                    Ok(params) => debug!(
                        min_fps,
                        max_fps,
                        interval = ?params.interval,
                        "Frame interval applied"
                    ),
                    Err(e) => warn!(max_fps, error = %e, "Frame rate not adjustable, keeping driver default"),
                }
            }
        }

        self.format = Some(*format);
        Ok(())
    }

    fn bind_surface(&mut self, surface: &SurfaceRef) -> CameraResult<()> {
        self.device()?;
        self.surface = Some(surface.clone());
        Ok(())
    }

    fn start_streaming(&mut self) -> CameraResult<()> {
        if self.pump.as_ref().is_some_and(WorkerLoop::is_running) {
            debug!("Frame pump already running");
            return Ok(());
        }
        self.device()?;
        let surface = self.surface.clone().ok_or(CameraError::SurfaceNotReady)?;
        let format = self
            .format
            .ok_or_else(|| CameraError::StreamFailed("no format applied".to_string()))?;

        let path = self.path.clone();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        let init = move || {
            let opened = Device::with_path(&path)
                .and_then(|dev| {
                    let mut stream = MmapStream::with_buffers(
                        &dev,
                        Type::VideoCapture,
                        video::STREAM_BUFFER_COUNT,
                    )?;
                    stream.set_timeout(timing::FRAME_DEQUEUE_TIMEOUT);
                    Ok((dev, stream))
                })
                .map_err(|e| format!("{}: {}", path.display(), e));
            let _ = ready_tx.send(opened.as_ref().map(|_| ()).map_err(Clone::clone));
            opened.map(|(dev, stream)| (dev, stream, 0u32))
        };

        let pump_body = move |(_dev, stream, errors): &mut (Device, MmapStream<'static>, u32)| {
            match stream.next() {
                Ok((buf, _meta)) => {
                    *errors = 0;
                    surface.sink().on_frame(buf, &format);
                    LoopAction::Continue
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => LoopAction::Continue,
                Err(e) => {
                    *errors += 1;
                    if *errors >= MAX_CONSECUTIVE_ERRORS {
                        warn!(error = %e, "Frame dequeue keeps failing, stopping pump");
                        LoopAction::Stop
                    } else {
                        debug!(error = %e, "Frame dequeue failed");
                        LoopAction::Continue
                    }
                }
            }
        };

        let mut pump = WorkerLoop::spawn_with_init("uvc-frame-pump", init, pump_body)
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        match ready_rx.recv_timeout(PUMP_READY_TIMEOUT) {
            Ok(Ok(())) => {
                info!(format = %format, "Streaming started");
                self.pump = Some(pump);
                Ok(())
            }
            Ok(Err(e)) => {
                pump.stop(timing::FRAME_PUMP_JOIN_TIMEOUT);
                Err(CameraError::StreamFailed(e))
            }
            Err(_) => {
                pump.stop(timing::FRAME_PUMP_JOIN_TIMEOUT);
                Err(CameraError::StreamFailed(
                    "capture buffers not ready in time".to_string(),
                ))
            }
        }
    }

    fn stop_streaming(&mut self) -> CameraResult<()> {
        if let Some(mut pump) = self.pump.take() {
            pump.stop(timing::FRAME_PUMP_JOIN_TIMEOUT);
            info!(path = %self.path.display(), "Streaming stopped");
        }
        Ok(())
    }

    fn close(&mut self) -> CameraResult<()> {
        self.stop_streaming()?;
        self.surface = None;
        self.format = None;
        if self.device.take().is_some() {
            info!(path = %self.path.display(), "V4L2 device closed");
        }
        self.control = None;
        Ok(())
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
