pub mod config;
pub mod load;
pub mod metrics_export;
pub mod nem12;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
