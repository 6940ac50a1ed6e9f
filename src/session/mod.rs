// SPDX-License-Identifier: GPL-3.0-only

//! Capture session coordination
//!
//! Everything in here runs on the single dispatch thread, except the audio
//! worker owned by [`loopback::AudioLoopback`].

pub mod capture;
pub mod dispatcher;
pub mod events;
pub mod facade;
pub mod loopback;
pub mod negotiator;
pub mod pending;
pub mod permissions;
pub mod pip;
pub mod transform;
pub mod watcher;

pub use capture::{CaptureSession, OpenTicket, SessionState};
pub use events::{Command, DeviceEvent, DispatchEvent, SessionStatus};
pub use facade::{SessionFacade, SessionOptions, SessionParts};
pub use negotiator::FormatNegotiator;
pub use pending::PendingIntent;
pub use permissions::{PermissionBroker, SystemPermissions};
pub use pip::{DevicePip, PipController};
pub use transform::PreviewTransform;
