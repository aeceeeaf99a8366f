//! Thumbnail previews: generation, caching, and cancellation.
//!
//! - [`supersession`] tracks which batch of preview jobs is current.
//! - [`store`] persists generated previews keyed by path.
//! - [`pipeline`] turns image bytes into a base64 thumbnail.
//! - [`orchestrator`] drives one file through cache, pipeline, and store.
//! - [`consistency`] moves or drops cache records when files change.

pub mod consistency;
pub mod orchestrator;
pub mod pipeline;
pub mod store;
pub mod supersession;

pub use consistency::CacheCoordinator;
pub use orchestrator::PreviewService;
pub use pipeline::{PipelineSettings, PreviewFormat};
pub use store::{CacheLookup, JsonPreviewStore, MemoryPreviewStore, PreviewRecord, PreviewStore};
pub use supersession::{BatchToken, JobSupervisor};
