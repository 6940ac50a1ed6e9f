// SPDX-License-Identifier: GPL-3.0-only

//! Runtime permissions
//!
//! On Linux there is no prompt: camera and microphone access is decided by
//! the device nodes' file permissions (usually `video` and `audio` group
//! membership). Results are still delivered asynchronously through the
//! dispatch queue, so the session handles them like any other answer.

use super::events::DispatchEvent;
use crate::backends::camera::v4l2_utils;
use crate::errors::Permission;
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Grants or refuses runtime permissions
pub trait PermissionBroker {
    /// Whether `permission` is already held
    fn is_granted(&self, permission: Permission) -> bool;

    /// Ask for `permission`.
    ///
    /// The answer arrives later as [`DispatchEvent::PermissionResult`].
    fn request(&mut self, permission: Permission);
}

/// Device-node access checks
pub struct SystemPermissions {
    dispatch: UnboundedSender<DispatchEvent>,
}

impl SystemPermissions {
    pub fn new(dispatch: UnboundedSender<DispatchEvent>) -> Self {
        Self { dispatch }
    }
}

/// Access to every node in `dir` whose name starts with `prefix`.
///
/// A missing directory or no matching node grants access: nothing is
/// being withheld and the device layer reports absence on its own.
fn nodes_accessible(dir: &Path, prefix: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return true;
    };
    entries
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .all(|e| v4l2_utils::has_rw_access(&e.path()))
}

impl PermissionBroker for SystemPermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        match permission {
            Permission::Camera => nodes_accessible(Path::new("/dev"), "video"),
            Permission::RecordAudio => nodes_accessible(Path::new("/dev/snd"), "pcmC"),
        }
    }

    fn request(&mut self, permission: Permission) {
        let granted = self.is_granted(permission);
        debug!(%permission, granted, "Permission checked");
        if self
            .dispatch
            .send(DispatchEvent::PermissionResult {
                permission,
                granted,
            })
            .is_err()
        {
            warn!(%permission, "Dispatch queue closed, permission result dropped");
        }
    }
}
