// SPDX-License-Identifier: GPL-3.0-only

//! USB capture-device host abstraction
//!
//! The host reports raw hotplug and permission notifications for capture
//! devices. It may deliver them from any thread; callers marshal them onto
//! the single dispatch thread through [`HostEventSender`].

pub mod sysfs;

use crate::errors::UsbResult;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Stable identifier of an attached capture device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An attached USB capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDevice {
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Device node the decoder opens
    pub path: PathBuf,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x}, {})",
            self.name,
            self.vendor_id,
            self.product_id,
            self.path.display()
        )
    }
}

/// Exclusively-owned control channel to a device, issued after a permission grant.
///
/// Not `Clone`: exactly one owner releases it, by dropping it.
#[derive(Debug)]
pub struct ControlHandle {
    device: DeviceId,
    path: PathBuf,
    _file: Option<File>,
}

impl ControlHandle {
    /// Control handle backed by an open device node
    pub fn open(device: DeviceId, path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            device,
            path: path.to_path_buf(),
            _file: Some(file),
        })
    }

    /// Control handle that holds no OS resource (for hosts without one)
    pub fn detached(device: DeviceId, path: impl Into<PathBuf>) -> Self {
        Self {
            device,
            path: path.into(),
            _file: None,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Raw notifications from the platform USB subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbHostEvent {
    /// A capture device appeared
    Attached(UsbDevice),
    /// A capture device disappeared
    Detached(DeviceId),
    /// The control channel of a connected device was lost
    ControlLost(DeviceId),
    /// Result of a permission request for a device
    PermissionResult { device: DeviceId, granted: bool },
}

/// Callback the host uses to deliver notifications, from any thread
pub type HostEventSender = Box<dyn Fn(UsbHostEvent) + Send + Sync>;

/// Platform USB subsystem
pub trait UsbHost {
    /// Start delivering notifications through `events`
    fn start(&mut self, events: HostEventSender) -> UsbResult<()>;

    /// Stop delivering notifications. Safe to call when not started.
    fn stop(&mut self);

    /// Devices attached right now
    fn attached_devices(&self) -> Vec<UsbDevice>;

    /// Ask for permission to open a device.
    ///
    /// The answer arrives later as [`UsbHostEvent::PermissionResult`].
    fn request_permission(&mut self, device: &UsbDevice) -> UsbResult<()>;

    /// Open the control channel of a device whose permission was granted
    fn open_control(&mut self, device: &UsbDevice) -> UsbResult<ControlHandle>;
}
