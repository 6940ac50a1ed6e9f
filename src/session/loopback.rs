// SPDX-License-Identifier: GPL-3.0-only

//! Audio duplex loop
//!
//! Captures from the (preferably USB) input and writes every buffer straight
//! to the preferred output on one worker thread. The worker's only link to
//! the dispatch thread is the stop flag inside [`WorkerLoop`].

use crate::backends::audio::{
    AudioDeviceInfo, AudioPlatform, DeviceHandle, Direction, PcmFormat, PcmReader, PcmWriter,
    pick_capture_route, pick_playback_route,
};
use crate::backends::worker_loop::{LoopAction, WorkerLoop};
use crate::constants::audio::{BYTES_PER_SAMPLE, WORKER_NAME};
use crate::constants::timing::AUDIO_JOIN_TIMEOUT;
use crate::errors::{AudioError, SessionError};
use tracing::{debug, info, warn};

/// Worker-owned half of the loop
struct Passthrough {
    reader: Box<dyn PcmReader>,
    writer: Box<dyn PcmWriter>,
    buffer: Vec<i16>,
}

impl Passthrough {
    fn pump(&mut self) -> LoopAction {
        let read = match self.reader.read(&mut self.buffer) {
            Ok(read) => read,
            Err(e) => {
                warn!(error = %e, "Audio capture read failed, stopping loopback");
                return LoopAction::Stop;
            }
        };
        if read > 0
            && let Err(e) = self.writer.write(&self.buffer[..read])
        {
            warn!(error = %e, "Audio playback write failed, stopping loopback");
            return LoopAction::Stop;
        }
        LoopAction::Continue
    }
}

/// Capture → playback passthrough with device routing
pub struct AudioLoopback {
    platform: Box<dyn AudioPlatform>,
    format: PcmFormat,
    capture: Option<Box<dyn DeviceHandle>>,
    playback: Option<Box<dyn DeviceHandle>>,
    worker: Option<WorkerLoop>,
}

impl AudioLoopback {
    pub fn new(platform: Box<dyn AudioPlatform>) -> Self {
        Self {
            platform,
            format: PcmFormat::LOOPBACK,
            capture: None,
            playback: None,
            worker: None,
        }
    }

    /// Whether the worker is alive. A worker that stopped itself on a
    /// device error counts as not running.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(WorkerLoop::is_running)
    }

    /// Shared buffer size: twice the larger platform minimum
    fn buffer_bytes(&self) -> Result<usize, AudioError> {
        let capture = self.platform.min_buffer_size(Direction::Input, &self.format);
        let playback = self.platform.min_buffer_size(Direction::Output, &self.format);
        let size = capture.unwrap_or(0).max(playback.unwrap_or(0)) * 2;
        debug!(?capture, ?playback, size, "Audio buffer sizing");
        if size == 0 {
            return Err(AudioError::InvalidBufferSize);
        }
        Ok(size)
    }

    fn routes(&self) -> (Option<AudioDeviceInfo>, Option<AudioDeviceInfo>) {
        if !self.platform.supports_routing() {
            return (None, None);
        }

        let inputs = self.platform.devices(Direction::Input);
        let outputs = self.platform.devices(Direction::Output);
        let input = pick_capture_route(&inputs).cloned();
        let output = pick_playback_route(&outputs).cloned();

        match &output {
            Some(device) => info!(device = %device.name, kind = %device.kind, "Audio output routed"),
            None => warn!("No preferred output device found, using system default route"),
        }
        if let Some(device) = &input {
            info!(device = %device.name, kind = %device.kind, "Audio input routed");
        }
        (input, output)
    }

    /// Start the loop. Succeeds immediately when already running.
    ///
    /// Fails closed: anything opened before a failure is released again.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.is_running() {
            debug!("Audio loopback already running");
            return Ok(());
        }
        if self.worker.is_some() {
            debug!("Audio worker exited on its own, releasing stale devices");
            self.stop();
        }

        let buffer_bytes = self.buffer_bytes()?;
        let (input_route, output_route) = self.routes();

        let capture = self
            .platform
            .open_capture(&self.format, buffer_bytes, input_route.as_ref())?;
        self.capture = Some(capture.handle);

        let playback = match self
            .platform
            .open_playback(&self.format, buffer_bytes, output_route.as_ref())
        {
            Ok(playback) => playback,
            Err(e) => {
                self.release_devices();
                return Err(e.into());
            }
        };
        self.playback = Some(playback.handle);

        let initialized = self.capture.as_ref().is_some_and(|h| h.is_initialized())
            && self.playback.as_ref().is_some_and(|h| h.is_initialized());
        if !initialized {
            self.release_devices();
            return Err(AudioError::NotInitialized("capture or playback device".into()).into());
        }

        if let Err(e) = self.start_devices() {
            self.release_devices();
            return Err(e.into());
        }

        let state = Passthrough {
            reader: capture.reader,
            writer: playback.writer,
            buffer: vec![0; (buffer_bytes / 2 / BYTES_PER_SAMPLE).max(1)],
        };
        match WorkerLoop::spawn(WORKER_NAME, state, Passthrough::pump) {
            Ok(worker) => {
                self.worker = Some(worker);
                info!(buffer_bytes, format = %self.format, "Audio loopback started");
                Ok(())
            }
            Err(e) => {
                self.release_devices();
                Err(AudioError::Io(e.to_string()).into())
            }
        }
    }

    fn start_devices(&mut self) -> Result<(), AudioError> {
        if let Some(capture) = self.capture.as_mut() {
            capture.start()?;
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.start()?;
        }
        Ok(())
    }

    /// Stop the loop and release both devices. Safe to call any number of times.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop(AUDIO_JOIN_TIMEOUT);
            info!("Audio loopback stopped");
        }
        self.release_devices();
    }

    /// Stop and release each device, each independently of the other
    fn release_devices(&mut self) {
        for (name, handle) in [("capture", self.capture.take()), ("playback", self.playback.take())] {
            let Some(mut handle) = handle else { continue };
            if let Err(e) = handle.stop() {
                debug!(device = name, error = %e, "Stopping audio device failed");
            }
            if let Err(e) = handle.release() {
                warn!(device = name, error = %e, "Releasing audio device failed");
            }
        }
    }
}

impl Drop for AudioLoopback {
    fn drop(&mut self) {
        self.stop();
    }
}
