// SPDX-License-Identifier: GPL-3.0-only

//! Platform backends
//!
//! Everything that touches hardware sits behind a trait here, so the session
//! layer can be driven by fakes in tests:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Session Layer                 │
//! └──────┬──────────────┬──────────────┬────────┘
//!        │              │              │
//! ┌──────┴─────┐ ┌──────┴─────┐ ┌──────┴──────┐
//! │    USB     │ │   Camera   │ │    Audio    │
//! │  (sysfs)   │ │   (V4L2)   │ │ (cpal/ring) │
//! └────────────┘ └────────────┘ └─────────────┘
//! ```
//!
//! - [`usb`]: hotplug and device permission host
//! - [`camera`]: UVC decoder seam and format strategies
//! - [`audio`]: capture/playback devices and output routing
//! - [`worker_loop`]: stoppable worker thread with a bounded join

pub mod audio;
pub mod camera;
pub mod usb;
pub mod worker_loop;
