//! Vision backends and the fallback chain that composes them.

pub mod detect_labels;
pub mod error;
pub mod fakes;
pub mod fallback;
pub mod fetch;
pub mod gemini;
pub mod provider;

pub use detect_labels::DetectLabelsProvider;
pub use error::{BoxError, ProviderFailure, VisionError, VisionResult};
pub use fallback::{ChainStats, FallbackVisionProvider};
pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use provider::{
    AnalysisRequest, StorageLocator, VisionAnalysisResult, VisionLabel, VisionProvider,
    DEFAULT_MAX_LABELS, DEFAULT_MIN_CONFIDENCE,
};
