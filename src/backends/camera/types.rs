// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the UVC decoder abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Frame codecs a capture card can stream that this crate accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    /// Motion JPEG - frame-by-frame JPEG compression
    Mjpeg,
    /// YUYV/YUY2 4:2:2 packed raw frames
    Yuyv,
}

impl Codec {
    /// V4L2 FourCC bytes for this codec
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            Self::Mjpeg => b"MJPG",
            Self::Yuyv => b"YUYV",
        }
    }

    /// Check if frames are uncompressed
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Yuyv)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mjpeg => write!(f, "MJPEG"),
            Self::Yuyv => write!(f, "YUY2"),
        }
    }
}

/// A frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid width '{}': {}", w, e))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid height '{}': {}", h, e))?;
        if width == 0 || height == 0 {
            return Err(format!("resolution must be non-zero, got '{}'", s));
        }
        Ok(Self::new(width, height))
    }
}

/// Ordered frame sizes a device advertises for one codec
///
/// Fetched once per open; a device that reports nothing for a codec yields an
/// empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityList {
    sizes: Vec<Resolution>,
}

impl CapabilityList {
    pub fn new(sizes: Vec<Resolution>) -> Self {
        Self { sizes }
    }

    pub fn contains(&self, resolution: &Resolution) -> bool {
        self.sizes.contains(resolution)
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resolution> {
        self.sizes.iter()
    }
}

impl FromIterator<Resolution> for CapabilityList {
    fn from_iter<I: IntoIterator<Item = Resolution>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<String> = self.sizes.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", sizes.join(", "))
    }
}

/// The (width, height, codec) triple a streaming session runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreviewFormat {
    pub resolution: Resolution,
    pub codec: Codec,
}

impl PreviewFormat {
    pub fn new(width: u32, height: u32, codec: Codec) -> Self {
        Self {
            resolution: Resolution::new(width, height),
            codec,
        }
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }
}

impl fmt::Display for PreviewFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resolution, self.codec)
    }
}

/// Receiver of decoded preview frames (the rendering surface)
pub trait FrameSink: Send + Sync {
    /// Called from the backend's frame pump for every dequeued frame
    fn on_frame(&self, data: &[u8], format: &PreviewFormat);
}

/// Shared reference to a rendering surface
#[derive(Clone)]
pub struct SurfaceRef(Arc<dyn FrameSink>);

impl SurfaceRef {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self(sink)
    }

    pub fn sink(&self) -> &Arc<dyn FrameSink> {
        &self.0
    }
}

impl fmt::Debug for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceRef({:p})", Arc::as_ptr(&self.0))
    }
}
