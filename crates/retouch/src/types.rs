use std::{fmt, sync::Arc};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// The raster every operation consumes and produces.
pub type Image = RgbaImage;

/// A snapshot of an image. History entries share pixel buffers instead of
/// deep-copying them; an `Image` is never mutated once it is shared.
pub type SharedImage = Arc<Image>;

/// Loosely typed parameters supplied before an operation exists.
pub type ParameterBag = serde_json::Map<String, serde_json::Value>;

/// Identifies one editing session inside a harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Build a parameter bag from a JSON object literal.
///
/// Anything other than an object yields an empty bag.
pub fn bag(value: serde_json::Value) -> ParameterBag {
    match value {
        serde_json::Value::Object(map) => map,
        _ => ParameterBag::new(),
    }
}
