use image::imageops;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{error::Result, traits::ImageOperation, types::Image};

/// Direction of a brightness change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BrightnessMode {
    #[default]
    Increase,
    Decrease,
}

/// Shift every colour channel up or down by a fixed amount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Brightness {
    pub mode: BrightnessMode,
    pub intensity: u32,
}

impl Brightness {
    pub fn increase(intensity: u32) -> Self {
        Self { mode: BrightnessMode::Increase, intensity }
    }

    pub fn decrease(intensity: u32) -> Self {
        Self { mode: BrightnessMode::Decrease, intensity }
    }

    /// Signed channel offset handed to the pixel kernel. Channels are 8-bit,
    /// so anything past 255 saturates anyway.
    fn offset(&self) -> i32 {
        let magnitude = self.intensity.min(u8::MAX as u32) as i32;
        match self.mode {
            BrightnessMode::Increase => magnitude,
            BrightnessMode::Decrease => -magnitude,
        }
    }
}

impl ImageOperation for Brightness {
    fn apply(&self, image: &Image) -> Result<Image> {
        Ok(imageops::brighten(image, self.offset()))
    }

    fn name(&self) -> String {
        match self.mode {
            BrightnessMode::Increase => format!("Brightness +{}", self.intensity),
            BrightnessMode::Decrease => format!("Brightness -{}", self.intensity),
        }
    }
}

/// Scale contrast around mid-grey. Positive factors increase contrast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Contrast {
    pub factor: f32,
}

impl ImageOperation for Contrast {
    fn apply(&self, image: &Image) -> Result<Image> {
        Ok(imageops::contrast(image, self.factor))
    }

    fn name(&self) -> String {
        format!("Contrast {}", self.factor)
    }
}
