//! Region mapping: page-unit rectangles → pixel crops of a scaled render.
//!
//! Regions are drawn by annotators on a scale-1 preview, so their
//! coordinates are page units. To crop them from a render at scale `s` every
//! edge goes through [`pixel_extent`] with that same `s`.
//!
//! Nothing is clamped. A box that leaves the image is a [`RegionError`];
//! a silently trimmed crop would pair the transcript with the wrong pixels.

use crate::config::Scale;
use crate::pipeline::render::pixel_extent;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A labelled rectangle in unscaled page coordinates, as stored by the
/// image annotation view. Fields other than the geometry pass through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[f64; 2]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
}

impl Region {
    /// A plain rectangle with no annotation-tool extras.
    pub fn rect(label: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: None,
            label: label.into(),
            x,
            y,
            width,
            height,
            color: None,
            kind: None,
            points: None,
            center: None,
        }
    }

    /// Identifier for error messages and logs.
    pub fn display_id(&self) -> String {
        match &self.id {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "<unnamed>".to_string(),
        }
    }

    /// Pixel box of this region on an image rendered at `scale`.
    pub fn pixel_box(&self, scale: Scale) -> Result<PixelBox, RegionError> {
        let pbox = self.mapped_box(scale)?;
        if pbox.is_empty() {
            return Err(RegionError::Empty(pbox));
        }
        Ok(pbox)
    }

    /// Geometry checks and edge mapping, without the emptiness test. Edges
    /// saturate at `u32::MAX`.
    fn mapped_box(&self, scale: Scale) -> Result<PixelBox, RegionError> {
        let coords = [self.x, self.y, self.width, self.height];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(RegionError::InvalidGeometry(format!(
                "non-finite coordinate in ({}, {}, {}, {})",
                self.x, self.y, self.width, self.height
            )));
        }
        if self.x < 0.0 || self.y < 0.0 {
            return Err(RegionError::InvalidGeometry(format!(
                "origin ({}, {}) lies left of or above the page",
                self.x, self.y
            )));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(RegionError::InvalidGeometry(format!(
                "negative size {}x{}",
                self.width, self.height
            )));
        }

        Ok(PixelBox {
            left: pixel_extent(self.x, scale),
            top: pixel_extent(self.y, scale),
            right: pixel_extent(self.x + self.width, scale),
            bottom: pixel_extent(self.y + self.height, scale),
        })
    }
}

/// Pixel rectangle; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }
}

/// Why a region could not be cropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("invalid region geometry: {0}")]
    InvalidGeometry(String),

    #[error("region maps to an empty pixel box {0:?}")]
    Empty(PixelBox),

    #[error(
        "pixel box ({}, {})–({}, {}) exceeds the {image_width}x{image_height} image",
        pbox.left, pbox.top, pbox.right, pbox.bottom
    )]
    OutOfBounds {
        pbox: PixelBox,
        image_width: u32,
        image_height: u32,
    },
}

/// Crop `region` from `page`, which must have been rendered at `scale`.
///
/// Bounds are checked before emptiness, so a box pushed past the image by
/// huge coordinates is out of bounds rather than empty.
pub fn crop(page: &DynamicImage, region: &Region, scale: Scale) -> Result<DynamicImage, RegionError> {
    let pbox = region.mapped_box(scale)?;
    let (image_width, image_height) = page.dimensions();
    if !pbox.fits_within(image_width, image_height) {
        return Err(RegionError::OutOfBounds {
            pbox,
            image_width,
            image_height,
        });
    }
    if pbox.is_empty() {
        return Err(RegionError::Empty(pbox));
    }
    Ok(page.crop_imm(pbox.left, pbox.top, pbox.width(), pbox.height()))
}
