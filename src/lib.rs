pub mod batching;
pub mod cache;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod simplify;
pub mod types;

pub use batching::{BatchReport, SimpleBatcher, TexturePacker};
pub use cache::{AssetStore, FileAssetStore, SimplifiedCache};
pub use config::{BatcherConfig, ChannelDescriptor, PackingType, PipelineConfig};
pub use error::{HlodError, Result};
pub use pipeline::{Pipeline, PipelineOutcome, ProcessingResult};
pub use simplify::{CancelToken, Simplifier, Step};
