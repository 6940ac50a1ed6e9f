// SPDX-License-Identifier: GPL-3.0-only

//! Capture Preview - live preview for USB capture cards
//!
//! Shows a UVC capture card's video with its USB audio looped back to the
//! best available output, plus an optional picture-in-picture camera.
//!
//! # Architecture
//!
//! - [`backends`]: USB hotplug, V4L2 camera and audio device access
//! - [`session`]: device watcher, format negotiation, capture state machine,
//!   audio loop and the facade the UI drives
//! - [`config`]: user configuration handling

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use errors::{AppError, AppResult, SessionError};
pub use session::{Command, DispatchEvent, SessionFacade, SessionState, SessionStatus};
