// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture session and its backends

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for decoder/camera backend operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Result type for platform audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Result type for USB host operations
pub type UsbResult<T> = Result<T, UsbError>;

/// Runtime permission a session operation can be gated on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Access to camera devices (capture card and front camera)
    Camera,
    /// Access to audio capture devices
    RecordAudio,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Camera => write!(f, "camera"),
            Permission::RecordAudio => write!(f, "record-audio"),
        }
    }
}

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture session errors
    Session(SessionError),
    /// Decoder/camera backend errors
    Camera(CameraError),
    /// Audio backend errors
    Audio(AudioError),
    /// USB host errors
    Usb(UsbError),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Session-level failures surfaced to the UI as statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Camera or audio-record permission refused by the user
    PermissionDenied(Permission),
    /// No capture device is attached
    NoDeviceFound,
    /// Neither capability list contains a supported size
    NegotiationFailed,
    /// Control-handle open or decoder start failed
    DeviceOpenFailed(String),
    /// Audio duplex loop could not be initialized
    AudioInitFailed(String),
    /// Device vanished while a session was active
    UnexpectedDetach,
}

/// Decoder/camera backend errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Device could not be opened
    OpenFailed(String),
    /// Device rejected the requested format
    FormatRejected(String),
    /// No rendering surface is bound
    SurfaceNotReady,
    /// Streaming could not be started or stopped
    StreamFailed(String),
    /// Underlying I/O failure
    Io(String),
}

/// Platform audio errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Platform reported a non-positive minimum buffer size
    InvalidBufferSize,
    /// No matching device could be opened
    DeviceUnavailable(String),
    /// Device opened but did not reach the initialized state
    NotInitialized(String),
    /// Stream start/stop/read/write failed
    Stream(String),
    /// Underlying I/O failure
    Io(String),
}

/// USB host errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbError {
    /// Device is not (or no longer) attached
    NotAttached(String),
    /// Control channel could not be opened
    OpenFailed(String),
    /// Host monitoring could not be started
    MonitorFailed(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Session(e) => write!(f, "Session error: {}", e),
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Audio(e) => write!(f, "Audio error: {}", e),
            AppError::Usb(e) => write!(f, "USB error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied(p) => write!(f, "Permission denied: {}", p),
            SessionError::NoDeviceFound => write!(f, "No capture device found"),
            SessionError::NegotiationFailed => write!(f, "No supported preview format"),
            SessionError::DeviceOpenFailed(msg) => write!(f, "Device open failed: {}", msg),
            SessionError::AudioInitFailed(msg) => write!(f, "Audio init failed: {}", msg),
            SessionError::UnexpectedDetach => write!(f, "Device detached"),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            CameraError::OpenFailed(msg) => write!(f, "Open failed: {}", msg),
            CameraError::FormatRejected(msg) => write!(f, "Format rejected: {}", msg),
            CameraError::SurfaceNotReady => write!(f, "Preview surface is not ready"),
            CameraError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
            CameraError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::InvalidBufferSize => write!(f, "Invalid audio buffer size"),
            AudioError::DeviceUnavailable(msg) => write!(f, "Audio device unavailable: {}", msg),
            AudioError::NotInitialized(msg) => write!(f, "Audio device not initialized: {}", msg),
            AudioError::Stream(msg) => write!(f, "Audio stream error: {}", msg),
            AudioError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::NotAttached(id) => write!(f, "Device not attached: {}", id),
            UsbError::OpenFailed(msg) => write!(f, "Control channel open failed: {}", msg),
            UsbError::MonitorFailed(msg) => write!(f, "Hotplug monitor failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for SessionError {}
impl std::error::Error for CameraError {}
impl std::error::Error for AudioError {}
impl std::error::Error for UsbError {}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        AppError::Audio(err)
    }
}

impl From<UsbError> for AppError {
    fn from(err: UsbError) -> Self {
        AppError::Usb(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Io(err.to_string())
    }
}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::Io(err.to_string())
    }
}

// Open-path failures of the decoder all collapse into one session failure
impl From<CameraError> for SessionError {
    fn from(err: CameraError) -> Self {
        SessionError::DeviceOpenFailed(err.to_string())
    }
}

impl From<AudioError> for SessionError {
    fn from(err: AudioError) -> Self {
        SessionError::AudioInitFailed(err.to_string())
    }
}
