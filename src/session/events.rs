// SPDX-License-Identifier: GPL-3.0-only

//! Messages flowing into and out of the dispatch thread

use super::capture::OpenTicket;
use super::transform::PreviewTransform;
use crate::backends::camera::{PreviewFormat, Resolution, SurfaceRef};
use crate::backends::usb::{ControlHandle, DeviceId, UsbDevice, UsbHostEvent};
use crate::errors::{Permission, SessionError};

/// Typed device events produced by the watcher
#[derive(Debug)]
pub enum DeviceEvent {
    /// A capture device is present
    Attach(UsbDevice),
    /// A capture device was unplugged
    Detach(DeviceId),
    /// Permission was granted and the control channel is open
    Connect(DeviceId, ControlHandle),
    /// The control channel was lost without a detach
    Disconnect(DeviceId),
    /// The user refused USB access to the device
    PermissionCancelled(DeviceId),
}

/// User intents from the UI
#[derive(Debug, Clone)]
pub enum Command {
    Open,
    Close,
    SetPip(bool),
    SelectResolution(Resolution),
    SurfaceAvailable(SurfaceRef),
    ViewResized { width: u32, height: u32 },
}

/// Everything the dispatch thread processes, in arrival order
#[derive(Debug)]
pub enum DispatchEvent {
    /// Raw notification from the USB host, marshalled from its thread
    Host(UsbHostEvent),
    Command(Command),
    /// Answer to a runtime permission request
    PermissionResult { permission: Permission, granted: bool },
    /// Second half of an open, posted by the session itself
    ContinueOpen(OpenTicket),
    /// Stop the session and leave the dispatch loop
    Shutdown,
}

impl From<Command> for DispatchEvent {
    fn from(command: Command) -> Self {
        DispatchEvent::Command(command)
    }
}

/// Status transitions rendered by the UI
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    DeviceAttached(DeviceId),
    WaitingForDevice,
    PreviewRunning(PreviewFormat),
    PreviewStopped,
    CameraOpenFailed(SessionError),
    AudioPermissionDenied,
    UsbPermissionDenied(DeviceId),
    AudioStartFailed(SessionError),
    PipStartFailed(String),
    /// Sizes the user can switch between, best first
    ResolutionOptions(Vec<Resolution>),
    PreviewTransform(PreviewTransform),
}
