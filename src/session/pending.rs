// SPDX-License-Identifier: GPL-3.0-only

//! Why a camera permission request is outstanding

/// Operations to resume once the camera permission result arrives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PendingIntent {
    #[default]
    None,
    ResumeOpen,
    ResumePip,
    ResumeBoth,
}

impl PendingIntent {
    /// Add a pending device open
    pub fn with_open(self) -> Self {
        match self {
            Self::None | Self::ResumeOpen => Self::ResumeOpen,
            Self::ResumePip | Self::ResumeBoth => Self::ResumeBoth,
        }
    }

    /// Add a pending picture-in-picture start
    pub fn with_pip(self) -> Self {
        match self {
            Self::None | Self::ResumePip => Self::ResumePip,
            Self::ResumeOpen | Self::ResumeBoth => Self::ResumeBoth,
        }
    }

    pub fn resumes_open(self) -> bool {
        matches!(self, Self::ResumeOpen | Self::ResumeBoth)
    }

    pub fn resumes_pip(self) -> bool {
        matches!(self, Self::ResumePip | Self::ResumeBoth)
    }

    pub fn is_none(self) -> bool {
        self == Self::None
    }

    /// Consume the intent, leaving `None` behind
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}
