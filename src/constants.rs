// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use crate::backends::camera::types::{Codec, Resolution};
use std::time::Duration;

/// Descending-preference preview size ladder.
///
/// Negotiation walks this ladder once per codec, preferred codec first, so a
/// rung in the preferred codec always beats a larger rung in the fallback codec.
pub const RESOLUTION_LADDER: [Resolution; 5] = [
    Resolution::new(1920, 1080),
    Resolution::new(1280, 720),
    Resolution::new(720, 576),
    Resolution::new(720, 480),
    Resolution::new(640, 480),
];

/// Codec whose capability list is searched first
pub const PREFERRED_CODEC: Codec = Codec::Mjpeg;

/// Codec searched only after the whole ladder missed in the preferred codec
pub const FALLBACK_CODEC: Codec = Codec::Yuyv;

/// Video format constants
pub mod video {
    /// Bandwidth factor passed to devices that accept one (fraction of the bus)
    pub const BANDWIDTH_FACTOR: f32 = 0.5;

    /// Minimum frame rate requested by the frame-range format strategy
    pub const MIN_FPS: u32 = 1;

    /// Maximum frame rate requested by the frame-range format strategy
    pub const MAX_FPS: u32 = 30;

    /// Number of mmap buffers queued on a V4L2 capture stream
    pub const STREAM_BUFFER_COUNT: u32 = 4;
}

/// Audio loopback constants
pub mod audio {
    /// Fixed loopback sample rate in Hz
    pub const SAMPLE_RATE: u32 = 48_000;

    /// Mono in, mono out
    pub const CHANNELS: u16 = 1;

    /// 16-bit PCM
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Period assumed when a device does not report its buffer range (20 ms)
    pub const DEFAULT_PERIOD_FRAMES: usize = 960;

    /// Worker thread name
    pub const WORKER_NAME: &str = "usb-audio-loopback";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Upper bound on joining the audio worker during stop
    pub const AUDIO_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

    /// Upper bound on joining a V4L2 frame pump during stop
    pub const FRAME_PUMP_JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

    /// Poll interval used while waiting for a worker to finish
    pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// How long a blocked V4L2 dequeue waits before re-checking the stop flag
    pub const FRAME_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

    /// Hotplug poll interval for the sysfs USB host
    pub const HOTPLUG_POLL_INTERVAL: Duration = Duration::from_millis(1000);
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Application directory name used under the user config dir
    pub const CONFIG_DIR_NAME: &str = "capture-preview";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.json";
}
