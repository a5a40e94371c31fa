/*!
# Stream Source

A [`StreamSource`] is one configured, windowed binding between a virtual
sensor and one upstream tuple producer: the logical alias used in the owning
query, the underlying select query, the textual window strings, and, once
validated, the derived window type, a process-unique UID and the bound
query rewriter.

`validate()` is the gate: it parses and classifies the window specification
and builds the rewriter, so a bad configuration never reaches the ingest
path. The window type is computed deterministically from the textual forms
and never changes after activation; the UID is unique per running
configuration even when alias and addressing collide.
*/

use crate::sluice::error::{SluiceError, SluiceResult};
use crate::sluice::storage::{StorageBackend, StorageHandle};
use crate::sluice::stream::element::DataField;
use crate::sluice::window::ingest::IngestTrigger;
use crate::sluice::window::rewriter::{QueryRewriter, SqlViewRewriter};
use crate::sluice::window::spec::{WindowSpec, WindowType};
use crate::sluice::window::state::WindowStateStore;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

fn next_uid() -> String {
    format!("ss_{}", NEXT_UID.fetch_add(1, Ordering::Relaxed))
}

/// A configured, windowed input binding of a virtual sensor.
pub struct StreamSource {
    alias: String,
    sql_query: String,
    raw_history_size: Option<String>,
    raw_slide_value: Option<String>,
    sampling_rate: f64,
    wrapper_name: Option<String>,
    uid: Option<String>,
    spec: Option<WindowSpec>,
    rewriter: Option<Arc<SqlViewRewriter>>,
}

impl StreamSource {
    pub fn new(alias: impl Into<String>, sql_query: impl Into<String>) -> Self {
        StreamSource {
            alias: alias.into(),
            sql_query: sql_query.into(),
            raw_history_size: None,
            raw_slide_value: None,
            sampling_rate: 1.0,
            wrapper_name: None,
            uid: None,
            spec: None,
            rewriter: None,
        }
    }

    pub fn with_raw_history_size(mut self, history: impl Into<String>) -> Self {
        self.raw_history_size = Some(history.into());
        self
    }

    pub fn with_raw_slide_value(mut self, slide: impl Into<String>) -> Self {
        self.raw_slide_value = Some(slide.into());
        self
    }

    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate;
        self
    }

    pub fn with_wrapper(mut self, wrapper: impl Into<String>) -> Self {
        self.wrapper_name = Some(wrapper.into());
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn sql_query(&self) -> &str {
        &self.sql_query
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn wrapper_name(&self) -> Option<&str> {
        self.wrapper_name.as_deref()
    }

    /// The process-unique identifier, assigned on first successful
    /// `validate()`.
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// The derived window type, available after `validate()`.
    pub fn windowing_type(&self) -> Option<WindowType> {
        self.spec.map(|s| s.window_type)
    }

    pub fn window_spec(&self) -> Option<&WindowSpec> {
        self.spec.as_ref()
    }

    /// The bound query rewriter, available after `validate()`.
    pub fn query_rewriter(&self) -> Option<&SqlViewRewriter> {
        self.rewriter.as_deref()
    }

    /// Structural and window-spec correctness check.
    ///
    /// Parses the window strings, classifies the window type, assigns the
    /// UID (first call only) and binds the rewriter. Re-validation on a
    /// configuration reload re-parses the same textual forms, so the window
    /// type cannot change while the source is running.
    pub fn validate(&mut self) -> SluiceResult<()> {
        if self.alias.trim().is_empty() {
            return Err(SluiceError::configuration(
                "alias must not be empty",
                Some("alias".to_string()),
            ));
        }
        let spec = WindowSpec::parse(
            self.raw_history_size.as_deref(),
            self.raw_slide_value.as_deref(),
        )?;
        if !(0.0..=1.0).contains(&self.sampling_rate) {
            return Err(SluiceError::configuration(
                "sampling-rate must lie in [0, 1]",
                Some("sampling-rate".to_string()),
            ));
        }
        let uid = self.uid.get_or_insert_with(next_uid).clone();
        self.spec = Some(spec);
        self.rewriter = Some(Arc::new(SqlViewRewriter::new(&self.alias, uid, spec)));
        Ok(())
    }

    /// Rewrite an owning query through the bound rewriter.
    pub fn rewrite(&self, query: &str) -> SluiceResult<String> {
        let rewriter = self.rewriter.as_ref().ok_or_else(|| {
            SluiceError::configuration(
                "source must be validated before rewriting",
                Some("alias".to_string()),
            )
        })?;
        rewriter.rewrite(query)
    }

    /// Attach the validated source to a storage backend: create the raw
    /// table from the wrapper's output format, register the window-state
    /// row and create the window view. Returns the ingest trigger bound to
    /// this source.
    pub fn attach(
        &self,
        storage: StorageHandle,
        output_format: &[DataField],
    ) -> SluiceResult<IngestTrigger> {
        let rewriter = self.rewriter.as_ref().ok_or_else(|| {
            SluiceError::configuration(
                "source must be validated before attaching",
                Some("alias".to_string()),
            )
        })?;
        let spec = self.spec.expect("spec set by validate");
        let uid = rewriter.physical_name().to_string();
        let raw_table = rewriter.raw_table();

        if !storage.table_exists(&raw_table) {
            storage.create_table(&raw_table, output_format)?;
        }
        WindowStateStore::new(Arc::clone(&storage)).register(&uid)?;
        storage.execute_update(&rewriter.create_view_sql())?;
        info!(
            "source '{}' attached as {} ({})",
            self.alias, uid, spec.window_type
        );

        Ok(IngestTrigger::new(
            uid,
            raw_table,
            spec,
            self.sampling_rate,
            storage,
        ))
    }

    /// Tear the source down: drop the window view, the raw table and the
    /// window-state row. This is the explicit cleanup counterpart of
    /// listener removal, which keeps all three.
    pub fn teardown(&self, storage: StorageHandle) -> SluiceResult<()> {
        let rewriter = self.rewriter.as_ref().ok_or_else(|| {
            SluiceError::configuration(
                "source must be validated before teardown",
                Some("alias".to_string()),
            )
        })?;
        storage.execute_update(&rewriter.drop_view_sql())?;
        storage.drop_table(&rewriter.raw_table())?;
        WindowStateStore::new(storage).remove(rewriter.physical_name())?;
        info!("source '{}' torn down", self.alias);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_assigns_uid_once() {
        let mut source = StreamSource::new("mystream", "select * from wrapper")
            .with_raw_history_size("2s");
        source.validate().unwrap();
        let uid = source.uid().unwrap().to_string();
        source.validate().unwrap();
        assert_eq!(source.uid().unwrap(), uid);
    }

    #[test]
    fn test_identical_aliases_get_distinct_uids() {
        let mut a = StreamSource::new("mystream", "select * from wrapper")
            .with_raw_history_size("2s");
        let mut b = StreamSource::new("mystream", "select * from wrapper")
            .with_raw_history_size("2s");
        a.validate().unwrap();
        b.validate().unwrap();
        assert_ne!(a.uid().unwrap(), b.uid().unwrap());
    }

    #[test]
    fn test_missing_history_blocks_validation() {
        let mut source = StreamSource::new("mystream", "select * from wrapper");
        let err = source.validate().unwrap_err();
        assert!(matches!(err, SluiceError::Configuration { .. }));
        assert!(source.windowing_type().is_none());
    }

    #[test]
    fn test_rewrite_before_validate_is_an_error() {
        let source = StreamSource::new("mystream", "select * from wrapper");
        assert!(source.rewrite("select * from mystream").is_err());
    }

    #[test]
    fn test_sampling_rate_bounds_checked() {
        let mut source = StreamSource::new("mystream", "select * from wrapper")
            .with_raw_history_size("2s")
            .with_sampling_rate(1.5);
        assert!(source.validate().is_err());
    }
}
