// SPDX-License-Identifier: GPL-3.0-only

//! Aspect-fit scaling of the preview inside its view

use crate::backends::camera::Resolution;

/// Scale factors applied around the view centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewTransform {
    pub scale_x: f32,
    pub scale_y: f32,
}

impl PreviewTransform {
    pub const IDENTITY: PreviewTransform = PreviewTransform {
        scale_x: 1.0,
        scale_y: 1.0,
    };

    /// Letterbox or pillarbox `source` into a `view_width` x `view_height` view.
    ///
    /// `None` while either size is still unknown (zero).
    pub fn fit(source: Resolution, view_width: u32, view_height: u32) -> Option<Self> {
        if source.width == 0 || source.height == 0 || view_width == 0 || view_height == 0 {
            return None;
        }

        let source_ratio = source.width as f32 / source.height as f32;
        let view_ratio = view_width as f32 / view_height as f32;

        let mut transform = Self::IDENTITY;
        if view_ratio > source_ratio {
            transform.scale_x = source_ratio / view_ratio;
        } else {
            transform.scale_y = view_ratio / source_ratio;
        }
        Some(transform)
    }
}
