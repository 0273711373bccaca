//! Schema inference: turn a sample of tabular data into an ordered, typed
//! column list.

pub mod inference;
pub mod sampler;
pub mod types;

pub use sampler::{ConnectionDescriptor, InferenceOptions, SampleInput, infer_schema};
pub use types::{Column, ColumnType, Schema};
