pub mod document;
pub mod segment;

pub use document::*;
pub use segment::{Element, Segment};
