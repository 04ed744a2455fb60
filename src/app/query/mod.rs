//! Query block language
//!
//! Turns a text block into a [`QueryDefinition`]: settings line, optional title
//! directive, time range and the opaque query body.

#![warn(clippy::all, rust_2018_idioms)]

pub mod block;
pub mod definition;
pub mod fields;
pub mod time_range;

pub use block::focused_block;
pub use definition::QueryDefinition;
pub use fields::{FieldAnnotations, FieldSource};
pub use time_range::TimeRange;
