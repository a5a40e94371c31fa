// Windowing subsystem: specification parsing, query rewriting, persisted
// trigger state and the ingest trigger that ties them together.

pub mod ingest;
pub mod rewriter;
pub mod spec;
pub mod state;

pub use ingest::IngestTrigger;
pub use rewriter::{PlainRewriter, QueryRewriter, SqlViewRewriter};
pub use spec::{WindowSpec, WindowType, WindowValue};
pub use state::{WindowStateStore, NEVER_TRIGGERED, WINDOW_STATE_TABLE};
