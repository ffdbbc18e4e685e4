use crate::{error::Result, types::Image};

/// A pure image transformation.
///
/// Implementations must not mutate the input and must not hold shared
/// mutable state, so the same value can be applied from several threads.
pub trait ImageOperation: Send + Sync {
    /// Produce a new image from `image`, or explain why it cannot be done.
    fn apply(&self, image: &Image) -> Result<Image>;

    /// Human readable label used for history display, e.g. `Rotate 90°`.
    fn name(&self) -> String;
}
