//! # sluice
//!
//! Windowed sensor-stream middleware: live measurement tuples from physical
//! data sources ("wrappers") are continuously appended to per-source tables,
//! and downstream virtual sensors read *windowed* views of that data: the
//! last N tuples, or all tuples in the last T seconds, optionally
//! re-evaluated only every slide interval rather than on every arrival.
//!
//! ## Features
//!
//! - **Window Specification Parsing**: textual `<n>` / `<n>s` window and
//!   slide strings classified into a closed set of window types
//! - **Query Rewriting**: logical stream aliases transparently resolved to
//!   UID-qualified physical names, with windowed sources read through
//!   idempotent, always-current SQL views
//! - **Persisted Slide State**: one `window_state` row per source gating
//!   when a time-based slide may advance
//! - **Atomic Ingest**: raw insert and state advance committed as one unit,
//!   so readers never observe a torn window
//! - **Embedded Storage**: an in-memory backend executing the emitted
//!   statement dialect; external databases plug in behind the same trait
//!
//! ## Quick Start
//!
//! ```rust
//! use sluice::{MemoryStorage, StorageBackend, StreamDispatcher, StreamElement, StreamSource};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), sluice::SluiceError> {
//! let storage: sluice::StorageHandle = Arc::new(MemoryStorage::new());
//!
//! // Last 3 seconds of data, window advancing every 2 seconds.
//! let mut source = StreamSource::new("mystream", "select * from wrapper")
//!     .with_raw_history_size("3s")
//!     .with_raw_slide_value("2s");
//! source.validate()?;
//! let trigger = source.attach(Arc::clone(&storage), &[])?;
//!
//! let mut dispatcher = StreamDispatcher::new();
//! dispatcher.add_listener(trigger);
//! dispatcher.post_stream_element(&StreamElement::new(1_000));
//!
//! // The owning query reads through the window without knowing the
//! // physical naming scheme.
//! let view_query = source.rewrite("select * from mystream")?;
//! let rows = storage.execute_query(&view_query)?;
//! assert_eq!(rows.count(), 0); // slide interval not yet elapsed
//! # Ok(())
//! # }
//! ```

pub mod sluice;

// Re-export the main API at the crate root for easy access
pub use sluice::config::{SluiceConfig, SourceSpec};
pub use sluice::error::{SluiceError, SluiceResult};
pub use sluice::storage::{
    DataEnumerator, MemoryStorage, ResultSet, StorageBackend, StorageError, StorageHandle,
};
pub use sluice::stream::{
    DataField, FieldType, FieldValue, StreamDispatcher, StreamElement, StreamSource, Wrapper,
};
pub use sluice::window::{
    IngestTrigger, PlainRewriter, QueryRewriter, SqlViewRewriter, WindowSpec, WindowStateStore,
    WindowType, WindowValue,
};
