//! Acquisition, filtering and rendering.
pub mod iir_filter;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod window;

pub use pipeline::CapturePipeline;
pub use window::{FilteredWindow, SampleWindow, Snapshot, CHANNEL_COUNT};
