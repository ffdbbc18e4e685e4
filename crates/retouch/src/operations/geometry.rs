use image::imageops;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ProcessingErrorKind, Result, RetouchError},
    traits::ImageOperation,
    types::Image,
};

/// Cut out the rectangle starting at (`x`, `y`).
///
/// The rectangle is only checked against the image when applied; the
/// resolver has no image to compare with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Crop {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    fn fits(&self, image: &Image) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= image.width() && b <= image.height())
    }
}

impl ImageOperation for Crop {
    fn apply(&self, image: &Image) -> Result<Image> {
        if self.width == 0 || self.height == 0 {
            return Err(RetouchError::processing(
                self.name(),
                ProcessingErrorKind::InvalidDimensions,
                "crop rectangle is empty",
            ));
        }
        if !self.fits(image) {
            return Err(RetouchError::processing(
                self.name(),
                ProcessingErrorKind::OutOfBounds,
                format!(
                    "rectangle exceeds {}x{} image",
                    image.width(),
                    image.height()
                ),
            ));
        }

        Ok(imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image())
    }

    fn name(&self) -> String {
        format!("Crop[{},{},{},{}]", self.x, self.y, self.width, self.height)
    }
}

/// Clockwise quarter turns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RightAngle {
    #[default]
    #[serde(rename = "90")]
    Deg90,
    #[serde(rename = "180")]
    Deg180,
    #[serde(rename = "270")]
    Deg270,
}

impl RightAngle {
    pub fn degrees(self) -> u32 {
        match self {
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Parse the textual form used by callers: "90", "180" or "270".
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "90" => Some(Self::Deg90),
            "180" => Some(Self::Deg180),
            "270" => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Snap an arbitrary angle to the nearest quarter turn.
    ///
    /// Returns `None` when the nearest quarter turn is no rotation at all.
    pub fn nearest(degrees: f64) -> Option<Self> {
        if !degrees.is_finite() {
            return None;
        }
        let normalized = degrees.rem_euclid(360.0);
        match ((normalized / 90.0).round() as u32) % 4 {
            1 => Some(Self::Deg90),
            2 => Some(Self::Deg180),
            3 => Some(Self::Deg270),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Rotate {
    pub angle: RightAngle,
}

impl Rotate {
    pub fn deg90() -> Self {
        Self { angle: RightAngle::Deg90 }
    }

    pub fn deg180() -> Self {
        Self { angle: RightAngle::Deg180 }
    }

    pub fn deg270() -> Self {
        Self { angle: RightAngle::Deg270 }
    }
}

impl ImageOperation for Rotate {
    fn apply(&self, image: &Image) -> Result<Image> {
        Ok(match self.angle {
            RightAngle::Deg90 => imageops::rotate90(image),
            RightAngle::Deg180 => imageops::rotate180(image),
            RightAngle::Deg270 => imageops::rotate270(image),
        })
    }

    fn name(&self) -> String {
        format!("Rotate {}°", self.angle.degrees())
    }
}
