//! Loudness moderation: thresholds and the per-stream decision pipeline

pub mod pipeline;
pub mod threshold;

pub use pipeline::{judge, StreamEnd, StreamPipeline, Verdict};
pub use threshold::{JsonThresholdStore, MemoryThresholdStore, Threshold, ThresholdStore};
