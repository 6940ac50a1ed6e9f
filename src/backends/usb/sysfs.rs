// SPDX-License-Identifier: GPL-3.0-only

//! Linux USB host backed by sysfs polling
//!
//! Capture cards show up as UVC nodes under `/sys/class/video4linux`. The
//! host rescans that directory on a worker thread and reports differences as
//! attach/detach events. Permission is the device node's read/write access
//! for the current user.

use super::{ControlHandle, DeviceId, HostEventSender, UsbDevice, UsbHost, UsbHostEvent};
use crate::backends::camera::v4l2_utils;
use crate::backends::worker_loop::{LoopAction, WorkerLoop};
use crate::constants::timing::{FRAME_PUMP_JOIN_TIMEOUT, HOTPLUG_POLL_INTERVAL};
use crate::errors::{UsbError, UsbResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of the poller's sleep, so a stop request is seen quickly
const POLL_TICK: Duration = Duration::from_millis(50);

type DeviceMap = BTreeMap<DeviceId, UsbDevice>;

/// Scan sysfs for USB-backed video capture nodes
pub fn scan_capture_devices() -> Vec<UsbDevice> {
    v4l2_utils::list_video_nodes()
        .into_iter()
        .filter_map(|node| probe_node(&node))
        .collect()
}

fn probe_node(node: &str) -> Option<UsbDevice> {
    let (vendor_id, product_id) = v4l2_utils::usb_ids_for_node(node)?;
    let path = v4l2_utils::dev_path(node);

    let name = match v4l2_utils::query_capture_node(&path) {
        Some(info) => {
            debug!(node, driver = %info.driver, bus = %info.bus_info, "Capture node found");
            info.card
        }
        None if v4l2_utils::has_rw_access(&path) => {
            // Readable but not a capture node (UVC metadata node)
            return None;
        }
        None => {
            // Without access QUERYCAP is impossible; UVC puts the capture
            // node at index 0 of each interface
            if sysfs_attr(node, "index").as_deref() != Some("0") {
                return None;
            }
            sysfs_attr(node, "name").unwrap_or_else(|| node.to_string())
        }
    };

    Some(UsbDevice {
        id: DeviceId::new(node),
        name,
        path,
        vendor_id,
        product_id,
    })
}

fn sysfs_attr(node: &str, attr: &str) -> Option<String> {
    let path = Path::new(v4l2_utils::SYSFS_VIDEO4LINUX).join(node).join(attr);
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
}

/// Poller state owned by the hotplug worker
struct PollState {
    known: Arc<Mutex<DeviceMap>>,
    events: Arc<HostEventSender>,
    last_scan: Instant,
}

impl PollState {
    fn tick(&mut self) -> LoopAction {
        std::thread::sleep(POLL_TICK);
        if self.last_scan.elapsed() < HOTPLUG_POLL_INTERVAL {
            return LoopAction::Continue;
        }
        self.last_scan = Instant::now();

        let current: DeviceMap = scan_capture_devices()
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        let (added, removed) = {
            let Ok(mut known) = self.known.lock() else {
                warn!("Hotplug device table poisoned, stopping poller");
                return LoopAction::Stop;
            };
            let added: Vec<UsbDevice> = current
                .values()
                .filter(|d| !known.contains_key(&d.id))
                .cloned()
                .collect();
            let removed: Vec<DeviceId> = known
                .keys()
                .filter(|id| !current.contains_key(*id))
                .cloned()
                .collect();
            *known = current;
            (added, removed)
        };

        for id in removed {
            info!(device = %id, "Capture device detached");
            (self.events)(UsbHostEvent::Detached(id));
        }
        for device in added {
            info!(device = %device, "Capture device attached");
            (self.events)(UsbHostEvent::Attached(device));
        }

        LoopAction::Continue
    }
}

/// USB host that polls `/sys/class/video4linux`
pub struct SysfsUsbHost {
    known: Arc<Mutex<DeviceMap>>,
    events: Option<Arc<HostEventSender>>,
    poller: Option<WorkerLoop>,
}

impl SysfsUsbHost {
    pub fn new() -> Self {
        Self {
            known: Arc::new(Mutex::new(DeviceMap::new())),
            events: None,
            poller: None,
        }
    }

    fn lookup(&self, id: &DeviceId) -> Option<UsbDevice> {
        self.known.lock().ok()?.get(id).cloned()
    }
}

impl Default for SysfsUsbHost {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbHost for SysfsUsbHost {
    fn start(&mut self, events: HostEventSender) -> UsbResult<()> {
        if self.poller.is_some() {
            debug!("Hotplug poller already running");
            return Ok(());
        }

        // Devices present now are reported through attached_devices(), not as
        // events, so the first poll only reports later changes
        let initial: DeviceMap = scan_capture_devices()
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        if let Ok(mut known) = self.known.lock() {
            *known = initial;
        }

        let events = Arc::new(events);
        let state = PollState {
            known: Arc::clone(&self.known),
            events: Arc::clone(&events),
            last_scan: Instant::now(),
        };

        let poller = WorkerLoop::spawn("usb-hotplug", state, PollState::tick)
            .map_err(|e| UsbError::MonitorFailed(e.to_string()))?;

        self.events = Some(events);
        self.poller = Some(poller);
        info!("USB hotplug monitoring started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop(FRAME_PUMP_JOIN_TIMEOUT);
            info!("USB hotplug monitoring stopped");
        }
        self.events = None;
    }

    fn attached_devices(&self) -> Vec<UsbDevice> {
        if self.poller.is_some()
            && let Ok(known) = self.known.lock()
        {
            return known.values().cloned().collect();
        }
        scan_capture_devices()
    }

    fn request_permission(&mut self, device: &UsbDevice) -> UsbResult<()> {
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| UsbError::MonitorFailed("host not started".to_string()))?;

        let granted = v4l2_utils::has_rw_access(&device.path);
        debug!(device = %device.id, granted, "Device node access checked");
        events(UsbHostEvent::PermissionResult {
            device: device.id.clone(),
            granted,
        });
        Ok(())
    }

    fn open_control(&mut self, device: &UsbDevice) -> UsbResult<ControlHandle> {
        if self.poller.is_some() && self.lookup(&device.id).is_none() {
            return Err(UsbError::NotAttached(device.id.to_string()));
        }
        ControlHandle::open(device.id.clone(), &device.path)
            .map_err(|e| UsbError::OpenFailed(format!("{}: {}", device.path.display(), e)))
    }
}

impl Drop for SysfsUsbHost {
    fn drop(&mut self) {
        self.stop();
    }
}
