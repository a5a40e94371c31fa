// Stream-side model: tuples, sources and wrapper delivery.

pub mod element;
pub mod source;
pub mod wrapper;

pub use element::{DataField, FieldType, FieldValue, StreamElement};
pub use source::StreamSource;
pub use wrapper::{StreamDispatcher, Wrapper};
