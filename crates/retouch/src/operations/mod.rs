pub mod adjustments;
pub mod blur;
pub mod geometry;

pub use adjustments::*;
pub use blur::*;
pub use geometry::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr, VariantNames};

use crate::{
    error::Result,
    resolver::OperationKind,
    traits::ImageOperation,
    types::Image,
};

/// A validated, ready-to-run transformation.
#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Raise or lower brightness
    Brightness(Brightness),
    /// Scale contrast
    Contrast(Contrast),
    /// Cut out a rectangle
    Crop(Crop),
    /// Rotate clockwise by a quarter turn multiple
    Rotate(Rotate),
    /// Gaussian blur
    Blur(Blur),
}

impl Operation {
    /// Get the JSON schema for typed operations
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(Operation)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Brightness(_) => OperationKind::Brightness,
            Self::Contrast(_) => OperationKind::Contrast,
            Self::Crop(_) => OperationKind::Crop,
            Self::Rotate(_) => OperationKind::Rotate,
            Self::Blur(_) => OperationKind::Blur,
        }
    }

    fn inner(&self) -> &dyn ImageOperation {
        match self {
            Self::Brightness(op) => op,
            Self::Contrast(op) => op,
            Self::Crop(op) => op,
            Self::Rotate(op) => op,
            Self::Blur(op) => op,
        }
    }
}

impl ImageOperation for Operation {
    fn apply(&self, image: &Image) -> Result<Image> {
        self.inner().apply(image)
    }

    fn name(&self) -> String {
        self.inner().name()
    }
}

impl From<Brightness> for Operation {
    fn from(op: Brightness) -> Self {
        Self::Brightness(op)
    }
}

impl From<Contrast> for Operation {
    fn from(op: Contrast) -> Self {
        Self::Contrast(op)
    }
}

impl From<Crop> for Operation {
    fn from(op: Crop) -> Self {
        Self::Crop(op)
    }
}

impl From<Rotate> for Operation {
    fn from(op: Rotate) -> Self {
        Self::Rotate(op)
    }
}

impl From<Blur> for Operation {
    fn from(op: Blur) -> Self {
        Self::Blur(op)
    }
}
