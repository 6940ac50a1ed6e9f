// SPDX-License-Identifier: GPL-3.0-only

//! Preview format negotiation
//!
//! Codec quality outranks resolution: the whole ladder is searched in the
//! preferred codec before the fallback codec is looked at.

use crate::backends::camera::{CapabilityList, Codec, PreviewFormat, Resolution};
use crate::constants::{FALLBACK_CODEC, PREFERRED_CODEC, RESOLUTION_LADDER};
use crate::errors::SessionError;
use std::collections::HashSet;
use tracing::{debug, info};

/// Picks a preview format from a device's capability lists
#[derive(Debug, Clone)]
pub struct FormatNegotiator {
    ladder: Vec<Resolution>,
    preferred: Codec,
    fallback: Codec,
}

impl Default for FormatNegotiator {
    fn default() -> Self {
        Self::new(RESOLUTION_LADDER.to_vec(), PREFERRED_CODEC, FALLBACK_CODEC)
    }
}

impl FormatNegotiator {
    pub fn new(ladder: Vec<Resolution>, preferred: Codec, fallback: Codec) -> Self {
        Self {
            ladder,
            preferred,
            fallback,
        }
    }

    pub fn preferred_codec(&self) -> Codec {
        self.preferred
    }

    pub fn fallback_codec(&self) -> Codec {
        self.fallback
    }

    /// Best ladder rung, preferred codec first. Missing lists count as empty.
    pub fn negotiate(
        &self,
        preferred: Option<&CapabilityList>,
        fallback: Option<&CapabilityList>,
    ) -> Result<PreviewFormat, SessionError> {
        let phases = [(preferred, self.preferred), (fallback, self.fallback)];

        for (list, codec) in phases {
            let Some(list) = list else { continue };
            if let Some(rung) = self.ladder.iter().find(|r| list.contains(r)) {
                let format = PreviewFormat {
                    resolution: *rung,
                    codec,
                };
                info!(format = %format, "Negotiated preview format");
                return Ok(format);
            }
        }

        debug!(
            preferred = %preferred.cloned().unwrap_or_default(),
            fallback = %fallback.cloned().unwrap_or_default(),
            "No ladder rung in either capability list"
        );
        Err(SessionError::NegotiationFailed)
    }

    /// Like [`negotiate`](Self::negotiate), but a user-selected size wins
    /// when the device offers it in either codec.
    pub fn negotiate_with_selection(
        &self,
        preferred: Option<&CapabilityList>,
        fallback: Option<&CapabilityList>,
        selected: Option<Resolution>,
    ) -> Result<PreviewFormat, SessionError> {
        if let Some(selected) = selected {
            let options = self.resolution_options(preferred, fallback);
            if let Some(format) = options.into_iter().find(|f| f.resolution == selected) {
                info!(format = %format, "Using selected preview format");
                return Ok(format);
            }
            debug!(selected = %selected, "Selected size not offered, using ladder");
        }
        self.negotiate(preferred, fallback)
    }

    /// Every size the device offers in either codec, best first.
    ///
    /// A size offered in both codecs is listed once, with the preferred codec.
    pub fn resolution_options(
        &self,
        preferred: Option<&CapabilityList>,
        fallback: Option<&CapabilityList>,
    ) -> Vec<PreviewFormat> {
        let mut seen = HashSet::new();
        let mut options: Vec<PreviewFormat> = Vec::new();

        for (list, codec) in [(preferred, self.preferred), (fallback, self.fallback)] {
            for size in list.into_iter().flat_map(CapabilityList::iter) {
                if seen.insert(*size) {
                    options.push(PreviewFormat {
                        resolution: *size,
                        codec,
                    });
                }
            }
        }

        options.sort_by(|a, b| {
            b.resolution
                .pixels()
                .cmp(&a.resolution.pixels())
                .then(b.resolution.width.cmp(&a.resolution.width))
        });
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(sizes: &[(u32, u32)]) -> CapabilityList {
        sizes.iter().map(|&(w, h)| Resolution::new(w, h)).collect()
    }

    #[test]
    fn test_preferred_codec_beats_higher_fallback_rung() {
        let negotiator = FormatNegotiator::default();
        let mjpeg = list(&[(640, 480)]);
        let yuyv = list(&[(1920, 1080), (1280, 720)]);
        let format = negotiator.negotiate(Some(&mjpeg), Some(&yuyv)).unwrap();
        assert_eq!(format, PreviewFormat::new(640, 480, Codec::Mjpeg));
    }

    #[test]
    fn test_missing_lists_count_as_empty() {
        let negotiator = FormatNegotiator::default();
        let yuyv = list(&[(720, 480)]);
        assert_eq!(
            negotiator.negotiate(None, Some(&yuyv)),
            Ok(PreviewFormat::new(720, 480, Codec::Yuyv))
        );
        assert_eq!(
            negotiator.negotiate(None, None),
            Err(SessionError::NegotiationFailed)
        );
    }

    #[test]
    fn test_off_ladder_sizes_do_not_match() {
        let negotiator = FormatNegotiator::default();
        let mjpeg = list(&[(800, 600), (320, 240)]);
        assert_eq!(
            negotiator.negotiate(Some(&mjpeg), None),
            Err(SessionError::NegotiationFailed)
        );
    }

    #[test]
    fn test_selection_wins_when_offered() {
        let negotiator = FormatNegotiator::default();
        let mjpeg = list(&[(1920, 1080), (1280, 720)]);
        let yuyv = list(&[(800, 600)]);

        let picked = negotiator
            .negotiate_with_selection(Some(&mjpeg), Some(&yuyv), Some(Resolution::new(800, 600)))
            .unwrap();
        assert_eq!(picked, PreviewFormat::new(800, 600, Codec::Yuyv));

        let picked = negotiator
            .negotiate_with_selection(Some(&mjpeg), Some(&yuyv), Some(Resolution::new(320, 240)))
            .unwrap();
        assert_eq!(picked, PreviewFormat::new(1920, 1080, Codec::Mjpeg));
    }

    #[test]
    fn test_options_dedup_and_order() {
        let negotiator = FormatNegotiator::default();
        let mjpeg = list(&[(640, 480), (1280, 720)]);
        let yuyv = list(&[(1280, 720), (720, 576), (768, 480)]);
        let options = negotiator.resolution_options(Some(&mjpeg), Some(&yuyv));
        assert_eq!(
            options,
            vec![
                PreviewFormat::new(1280, 720, Codec::Mjpeg),
                PreviewFormat::new(720, 576, Codec::Yuyv),
                PreviewFormat::new(768, 480, Codec::Yuyv),
                PreviewFormat::new(640, 480, Codec::Mjpeg),
            ]
        );
    }
}
