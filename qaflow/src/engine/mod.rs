//! Pipeline engine: run driver and fallback templates.

mod fallback;
mod pipeline;

pub use pipeline::PipelineEngine;
