pub mod engine;
pub mod pipeline;
pub mod routing;
pub mod stats;
pub mod validate;

pub use engine::{OcrEngine, TesseractEngine};
pub use pipeline::{OcrJob, OcrOutcome, OcrPipeline};
pub use routing::{OcrChannelConfig, OcrChannelConfigStore, RouteDecision};
pub use stats::{OcrStats, OcrStatsSnapshot};
pub use validate::{attachment_passes_cheap_checks, check_dimensions, first_url, AttachmentCandidate};
