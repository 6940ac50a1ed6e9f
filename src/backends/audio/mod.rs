// SPDX-License-Identifier: GPL-3.0-only

//! Platform audio seam for the duplex loopback
//!
//! An opened device comes in two halves: a [`DeviceHandle`] that controls the
//! stream and stays on the dispatch thread, and a PCM reader or writer that
//! moves into the loopback worker. Reads and writes block for at most about
//! one buffer period.

pub mod cpal_host;
pub mod routing;

pub use routing::{AudioDeviceKind, pick_capture_route, pick_playback_route};

use crate::constants::audio;
use crate::errors::AudioResult;
use std::fmt;
use std::time::Duration;

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Interleaved signed 16-bit PCM format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFormat {
    /// 48 kHz mono, used for both ends of the loopback
    pub const LOOPBACK: PcmFormat = PcmFormat {
        sample_rate: audio::SAMPLE_RATE,
        channels: audio::CHANNELS,
    };

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * audio::BYTES_PER_SAMPLE
    }

    /// Playback duration of `bytes` of audio in this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = bytes / self.bytes_per_frame().max(1);
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz, {} ch, s16", self.sample_rate, self.channels)
    }
}

/// An audio endpoint the platform can route a stream to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    /// Platform identifier used to open the device
    pub id: String,
    pub name: String,
    pub kind: AudioDeviceKind,
}

/// Controls one opened stream. Never leaves the dispatch thread.
pub trait DeviceHandle {
    /// Whether the device reached its initialized state
    fn is_initialized(&self) -> bool;

    fn start(&mut self) -> AudioResult<()>;

    fn stop(&mut self) -> AudioResult<()>;

    /// Free the platform stream. Safe to call more than once.
    fn release(&mut self) -> AudioResult<()>;
}

/// Blocking capture side
pub trait PcmReader: Send {
    /// Read up to `buf.len()` samples, returning how many were read.
    ///
    /// Returns `Ok(0)` when no audio arrived within one buffer period.
    fn read(&mut self, buf: &mut [i16]) -> AudioResult<usize>;
}

/// Blocking playback side
pub trait PcmWriter: Send {
    /// Queue samples for playback, returning how many were accepted
    fn write(&mut self, buf: &[i16]) -> AudioResult<usize>;
}

/// An opened capture stream
pub struct CaptureDevice {
    pub handle: Box<dyn DeviceHandle>,
    pub reader: Box<dyn PcmReader>,
}

/// An opened playback stream
pub struct PlaybackDevice {
    pub handle: Box<dyn DeviceHandle>,
    pub writer: Box<dyn PcmWriter>,
}

/// Platform audio subsystem
pub trait AudioPlatform {
    /// Minimum stream buffer in bytes for `format`.
    ///
    /// `None` when the platform cannot report a usable size.
    fn min_buffer_size(&self, direction: Direction, format: &PcmFormat) -> Option<usize>;

    /// Whether streams can be pinned to a specific device
    fn supports_routing(&self) -> bool;

    /// Endpoints available for `direction`, in platform order
    fn devices(&self, direction: Direction) -> Vec<AudioDeviceInfo>;

    /// Open a capture stream. `route` of `None` uses the platform default.
    fn open_capture(
        &mut self,
        format: &PcmFormat,
        buffer_bytes: usize,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<CaptureDevice>;

    /// Open a playback stream in streaming mode. `route` of `None` uses the platform default.
    fn open_playback(
        &mut self,
        format: &PcmFormat,
        buffer_bytes: usize,
        route: Option<&AudioDeviceInfo>,
    ) -> AudioResult<PlaybackDevice>;
}
