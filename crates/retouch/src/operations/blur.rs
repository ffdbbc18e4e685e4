use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    error::{ProcessingErrorKind, Result, RetouchError},
    traits::ImageOperation,
    types::Image,
};

/// Named blur strengths.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BlurIntensity {
    Light,
    #[default]
    Medium,
    Strong,
}

impl BlurIntensity {
    /// Bucket a 0-based integer scale into one of the three bands.
    pub fn from_scale(scale: u64) -> Self {
        match scale {
            0..=3 => Self::Light,
            4..=6 => Self::Medium,
            _ => Self::Strong,
        }
    }

    /// Gaussian sigma for this strength.
    pub fn sigma(self) -> f32 {
        match self {
            Self::Light => 1.0,
            Self::Medium => 2.5,
            Self::Strong => 5.0,
        }
    }
}

/// Gaussian blur
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Blur {
    pub intensity: BlurIntensity,
}

impl ImageOperation for Blur {
    fn apply(&self, image: &Image) -> Result<Image> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RetouchError::processing(
                self.name(),
                ProcessingErrorKind::InvalidDimensions,
                "cannot blur an empty image",
            ));
        }
        Ok(imageproc::filter::gaussian_blur_f32(image, self.intensity.sigma()))
    }

    fn name(&self) -> String {
        format!("Blur ({})", self.intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_scale_bands() {
        assert_eq!(BlurIntensity::from_scale(0), BlurIntensity::Light);
        assert_eq!(BlurIntensity::from_scale(3), BlurIntensity::Light);
        assert_eq!(BlurIntensity::from_scale(4), BlurIntensity::Medium);
        assert_eq!(BlurIntensity::from_scale(6), BlurIntensity::Medium);
        assert_eq!(BlurIntensity::from_scale(7), BlurIntensity::Strong);
        assert_eq!(BlurIntensity::from_scale(100), BlurIntensity::Strong);
    }

    #[test]
    fn test_named_levels_parse() {
        assert_eq!("light".parse::<BlurIntensity>().ok(), Some(BlurIntensity::Light));
        assert_eq!("STRONG".parse::<BlurIntensity>().ok(), Some(BlurIntensity::Strong));
        assert!("heavy".parse::<BlurIntensity>().is_err());
    }

    #[test]
    fn test_blur_spreads_a_bright_pixel() {
        let mut image = Image::from_pixel(21, 21, Rgba([0, 0, 0, 255]));
        image.put_pixel(10, 10, Rgba([255, 255, 255, 255]));

        let blurred = Blur { intensity: BlurIntensity::Light }
            .apply(&image)
            .expect("Should blur");
        assert_eq!(blurred.dimensions(), (21, 21));
        assert!(blurred.get_pixel(10, 10)[0] < 255);
        assert!(blurred.get_pixel(11, 10)[0] > 0);
    }

    #[test]
    fn test_blur_empty_image() {
        let err = Blur::default().apply(&Image::new(0, 0)).unwrap_err();
        assert!(matches!(
            err,
            RetouchError::Processing { kind: ProcessingErrorKind::InvalidDimensions, .. }
        ));
    }

    #[test]
    fn test_blur_name() {
        assert_eq!(Blur { intensity: BlurIntensity::Medium }.name(), "Blur (medium)");
    }
}
