// SPDX-License-Identifier: GPL-3.0-only

//! Shared V4L2 utility functions
//!
//! Raw `VIDIOC_QUERYCAP` and sysfs helpers used by both the USB hotplug host
//! (to find UVC capture nodes) and the V4L2 decoder backend.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use tracing::debug;

/// VIDIOC_QUERYCAP ioctl number
const VIDIOC_QUERYCAP: libc::c_ulong = 0x80685600;

/// V4L2 capability flag for single-planar video capture
const V4L2_CAP_VIDEO_CAPTURE: u32 = 0x0000_0001;

/// sysfs directory listing every V4L2 node
pub const SYSFS_VIDEO4LINUX: &str = "/sys/class/video4linux";

/// V4L2 capability structure for VIDIOC_QUERYCAP ioctl
#[repr(C)]
struct V4l2Capability {
    driver: [u8; 16],
    card: [u8; 32],
    bus_info: [u8; 32],
    version: u32,
    capabilities: u32,
    device_caps: u32,
    reserved: [u32; 3],
}

/// Identity of a V4L2 capture node as reported by QUERYCAP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureNodeInfo {
    /// Card name (what the device calls itself)
    pub card: String,
    /// Kernel driver (`uvcvideo` for capture cards)
    pub driver: String,
    /// Bus location (e.g. `usb-0000:00:14.0-2`)
    pub bus_info: String,
}

/// Query V4L2 capabilities for an open file descriptor.
fn query_v4l2_cap(fd: RawFd) -> Option<V4l2Capability> {
    let mut cap: V4l2Capability = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCAP as _, &mut cap as *mut V4l2Capability) };
    if result < 0 { None } else { Some(cap) }
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).to_string()
}

/// Query a node and return its identity if it is a video capture node.
///
/// Metadata nodes that UVC drivers create next to each capture node are
/// filtered out by the device capability bits.
pub fn query_capture_node(device_path: &Path) -> Option<CaptureNodeInfo> {
    let file = std::fs::File::open(device_path).ok()?;
    let cap = query_v4l2_cap(file.as_raw_fd())?;

    let caps = if cap.device_caps != 0 {
        cap.device_caps
    } else {
        cap.capabilities
    };
    if caps & V4L2_CAP_VIDEO_CAPTURE == 0 {
        return None;
    }

    Some(CaptureNodeInfo {
        card: c_string(&cap.card),
        driver: c_string(&cap.driver),
        bus_info: c_string(&cap.bus_info),
    })
}

/// Find USB vendor/product ids for a `videoN` node by walking up its sysfs device tree.
///
/// Returns `None` for nodes that are not backed by a USB device.
pub fn usb_ids_for_node(node_name: &str) -> Option<(u16, u16)> {
    let device_link = Path::new(SYSFS_VIDEO4LINUX).join(node_name).join("device");
    let mut path = std::fs::canonicalize(&device_link).ok()?;

    for _ in 0..5 {
        let vendor_file = path.join("idVendor");
        let product_file = path.join("idProduct");
        if vendor_file.exists() && product_file.exists() {
            let vendor = std::fs::read_to_string(&vendor_file).ok()?;
            let product = std::fs::read_to_string(&product_file).ok()?;
            let vid = u16::from_str_radix(vendor.trim(), 16).ok()?;
            let pid = u16::from_str_radix(product.trim(), 16).ok()?;
            debug!(node = node_name, vid = format!("{:04x}", vid), pid = format!("{:04x}", pid), "Resolved USB ids");
            return Some((vid, pid));
        }
        if !path.pop() {
            break;
        }
    }

    None
}

/// List `videoN` node names under sysfs, sorted by index
pub fn list_video_nodes() -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(SYSFS_VIDEO4LINUX) else {
        return Vec::new();
    };

    let mut nodes: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("video"))
        .collect();

    nodes.sort_by_key(|name| {
        name.trim_start_matches("video")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    nodes
}

/// Device node path for a `videoN` node name
pub fn dev_path(node_name: &str) -> PathBuf {
    Path::new("/dev").join(node_name)
}

/// Check whether the current process may open `path` for read and write
pub fn has_rw_access(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}
