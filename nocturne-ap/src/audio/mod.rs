//! Audio subsystem
//!
//! - `graph`: the AudioGraph (context, master gain, cache, active source)
//! - `param`: sample-accurate gain automation
//! - `render`: render graph shared with the output callback
//! - `context` / `output`: headless and cpal output contexts
//! - `cache` / `loader` / `fetch` / `decode` / `resampler`: buffer loading

pub mod cache;
pub mod context;
pub mod decode;
pub mod fetch;
pub mod graph;
pub mod loader;
pub mod output;
pub mod param;
pub mod render;
pub mod resampler;
pub mod types;

pub use context::{AudioBackend, AudioContext, ContextState, HeadlessBackend, UnsupportedBackend};
pub use fetch::{FsFetcher, HttpFetcher, SourceFetcher};
pub use graph::{AudioGraph, SourceHandle};
pub use loader::{BufferLoader, FetchDecodeLoader};
pub use output::CpalBackend;
pub use param::{GainEvent, GainParam};
pub use types::{AudioFrame, DecodedBuffer, NodeId};
