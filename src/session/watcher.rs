// SPDX-License-Identifier: GPL-3.0-only

//! Device watcher
//!
//! Turns raw host notifications into [`DeviceEvent`]s, one per hardware
//! transition. Holds no media state: only the set of attached devices and
//! the devices with an outstanding permission request.

use super::events::DeviceEvent;
use crate::backends::usb::{DeviceId, HostEventSender, UsbDevice, UsbHost, UsbHostEvent};
use crate::errors::{UsbError, UsbResult};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

pub struct DeviceWatcher {
    host: Box<dyn UsbHost>,
    attached: BTreeMap<DeviceId, UsbDevice>,
    /// Attach order, so "first device" is stable
    order: Vec<DeviceId>,
    awaiting_permission: HashSet<DeviceId>,
    registered: bool,
}

impl DeviceWatcher {
    pub fn new(host: Box<dyn UsbHost>) -> Self {
        Self {
            host,
            attached: BTreeMap::new(),
            order: Vec::new(),
            awaiting_permission: HashSet::new(),
            registered: false,
        }
    }

    /// Start host notifications.
    ///
    /// Returns one synthesized [`DeviceEvent::Attach`] per device already
    /// present, so startup looks like a normal hotplug.
    pub fn register(&mut self, events: HostEventSender) -> UsbResult<Vec<DeviceEvent>> {
        if self.registered {
            debug!("Device watcher already registered");
            return Ok(Vec::new());
        }
        self.host.start(events)?;
        self.registered = true;

        let synthesized = self
            .host
            .attached_devices()
            .into_iter()
            .filter_map(|device| self.record_attach(device))
            .collect::<Vec<_>>();

        info!(devices = synthesized.len(), "Device watcher registered");
        Ok(synthesized)
    }

    pub fn unregister(&mut self) {
        if !self.registered {
            return;
        }
        self.host.stop();
        self.registered = false;
        self.awaiting_permission.clear();
        info!("Device watcher unregistered");
    }

    /// Attached devices in attach order
    pub fn devices(&self) -> Vec<UsbDevice> {
        self.order
            .iter()
            .filter_map(|id| self.attached.get(id))
            .cloned()
            .collect()
    }

    pub fn device(&self, id: &DeviceId) -> Option<&UsbDevice> {
        self.attached.get(id)
    }

    /// Ask the host for access to a device. The answer comes back as a host event.
    pub fn request_permission(&mut self, id: &DeviceId) -> UsbResult<()> {
        let device = self
            .attached
            .get(id)
            .cloned()
            .ok_or_else(|| UsbError::NotAttached(id.to_string()))?;

        self.awaiting_permission.insert(id.clone());
        if let Err(e) = self.host.request_permission(&device) {
            self.awaiting_permission.remove(id);
            return Err(e);
        }
        debug!(device = %id, "USB permission requested");
        Ok(())
    }

    /// Map one raw host notification onto at most one device event
    pub fn translate(&mut self, event: UsbHostEvent) -> Option<DeviceEvent> {
        match event {
            UsbHostEvent::Attached(device) => self.record_attach(device),
            UsbHostEvent::Detached(id) => {
                if self.attached.remove(&id).is_none() {
                    debug!(device = %id, "Detach for unknown device ignored");
                    return None;
                }
                self.order.retain(|known| *known != id);
                self.awaiting_permission.remove(&id);
                info!(device = %id, "Device detached");
                Some(DeviceEvent::Detach(id))
            }
            UsbHostEvent::ControlLost(id) => {
                if !self.attached.contains_key(&id) {
                    return None;
                }
                info!(device = %id, "Device control channel lost");
                Some(DeviceEvent::Disconnect(id))
            }
            UsbHostEvent::PermissionResult { device, granted } => {
                self.permission_result(device, granted)
            }
        }
    }

    fn record_attach(&mut self, device: UsbDevice) -> Option<DeviceEvent> {
        if self.attached.contains_key(&device.id) {
            debug!(device = %device.id, "Duplicate attach ignored");
            return None;
        }
        info!(device = %device, "Device attached");
        self.order.push(device.id.clone());
        self.attached.insert(device.id.clone(), device.clone());
        Some(DeviceEvent::Attach(device))
    }

    fn permission_result(&mut self, id: DeviceId, granted: bool) -> Option<DeviceEvent> {
        if !self.awaiting_permission.remove(&id) {
            debug!(device = %id, granted, "Unsolicited permission result ignored");
            return None;
        }

        if !granted {
            info!(device = %id, "USB permission denied");
            return Some(DeviceEvent::PermissionCancelled(id));
        }

        let Some(device) = self.attached.get(&id).cloned() else {
            debug!(device = %id, "Permission granted for a device that is gone");
            return None;
        };

        match self.host.open_control(&device) {
            Ok(control) => {
                info!(device = %id, "Device connected");
                Some(DeviceEvent::Connect(id, control))
            }
            Err(e) => {
                warn!(device = %id, error = %e, "Opening control channel failed");
                Some(DeviceEvent::Disconnect(id))
            }
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.unregister();
    }
}
