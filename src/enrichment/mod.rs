//! Enrichment router and pipeline.

pub mod pipeline;
pub mod router;

pub use pipeline::{classify_quality, process_batch, process_span, HttpLlmAdapter, LlmAdapter};
pub use router::select_chain;
