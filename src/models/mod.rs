//! Domain and wire types for the task pipeline.

pub mod style;
pub mod task;

pub use style::Style;
pub use task::{
    Feature, ImageMetadata, JobStatus, ProcessOptions, TaskResult, TaskStatusResponse,
};
