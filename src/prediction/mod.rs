mod http;
pub mod types;

pub use http::{HttpPredictionClient, DEFAULT_BASE_URL};
pub use types::PredictionResult;

use crate::asset::ImageAsset;
use crate::error::DetectError;

/// Something that can classify an image.
///
/// One call is one attempt: implementations never retry.
pub trait PredictionClient: Send + Sync {
    fn predict(&self, asset: &ImageAsset) -> Result<PredictionResult, DetectError>;
}
