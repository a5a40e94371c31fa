/*!
# Query Rewriter

Rewrites an owning virtual-sensor query so it transparently reads through a
window without knowing the physical naming scheme: every occurrence of the
source's logical alias is replaced with its UID-qualified physical name.

Two variants implement [`QueryRewriter`]:

- [`PlainRewriter`]: substitution only, for collaborators that read a
  physical table directly (export, delivery).
- [`SqlViewRewriter`]: substitution plus an idempotent create-or-replace
  view statement bounding the rows visible through the window.

The rewrite is total: a result still containing the alias is a defect and is
surfaced as [`SluiceError::Rewrite`], never returned.

## View contract

Rows come back most-recent-first (`ORDER BY timed DESC`); downstream
consumers rely on that for latest-wins semantics. Window membership is always
timestamp- or recency-ordered, and the generated statement never uses a
modulo-based row-sampling expression for any window type other than a plain
tuple-count sample.
*/

use crate::sluice::error::{SluiceError, SluiceResult};
use crate::sluice::window::spec::{WindowSpec, WindowType};
use crate::sluice::window::state::WINDOW_STATE_TABLE;
use regex::Regex;

/// Capability of substituting a logical stream alias with the physical
/// per-source identifier in a query.
pub trait QueryRewriter: Send + Sync {
    /// Replace every occurrence of the alias token with the physical name.
    /// Total: never returns a string in which the alias remains unresolved.
    fn rewrite(&self, query: &str) -> SluiceResult<String>;

    /// The physical name the alias resolves to.
    fn physical_name(&self) -> &str;
}

fn alias_pattern(alias: &str) -> SluiceResult<Regex> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(alias))).map_err(|e| {
        SluiceError::configuration(format!("invalid alias: {}", e), Some("alias".to_string()))
    })
}

fn substitute(alias: &str, physical: &str, query: &str) -> SluiceResult<String> {
    let pattern = alias_pattern(alias)?;
    let rewritten = pattern.replace_all(query, physical).into_owned();
    // The physical name never contains the alias, so a surviving match means
    // the substitution failed to cover an occurrence.
    if pattern.is_match(&rewritten) {
        return Err(SluiceError::rewrite(alias, query));
    }
    Ok(rewritten)
}

/// Plain substitution variant: alias straight to a physical table name.
pub struct PlainRewriter {
    alias: String,
    physical: String,
}

impl PlainRewriter {
    pub fn new(alias: impl Into<String>, physical: impl Into<String>) -> Self {
        PlainRewriter {
            alias: alias.into(),
            physical: physical.into(),
        }
    }
}

impl QueryRewriter for PlainRewriter {
    fn rewrite(&self, query: &str) -> SluiceResult<String> {
        substitute(&self.alias, &self.physical, query)
    }

    fn physical_name(&self) -> &str {
        &self.physical
    }
}

/// SQL-view-backed variant for windowed sources.
///
/// The alias resolves to a view named by the source's UID, defined over the
/// per-source raw table (`<uid>_raw`). For state-gated window types the view
/// bounds visible rows with scalar subqueries against the window-state
/// table, so the view text is static and the state row drives visibility.
pub struct SqlViewRewriter {
    alias: String,
    uid: String,
    spec: WindowSpec,
}

impl SqlViewRewriter {
    pub fn new(alias: impl Into<String>, uid: impl Into<String>, spec: WindowSpec) -> Self {
        SqlViewRewriter {
            alias: alias.into(),
            uid: uid.into(),
            spec,
        }
    }

    /// Name of the window view: the UID itself.
    pub fn view_name(&self) -> &str {
        &self.uid
    }

    /// Name of the per-source raw table, derived from the UID.
    pub fn raw_table(&self) -> String {
        format!("{}_raw", self.uid)
    }

    fn state_boundary(&self) -> String {
        format!(
            "(SELECT timed FROM {} WHERE uid = '{}')",
            WINDOW_STATE_TABLE, self.uid
        )
    }

    /// The idempotent create-or-replace statement for the window view.
    ///
    /// Calling this twice with no configuration change yields textually
    /// identical statements.
    pub fn create_view_sql(&self) -> String {
        let head = format!(
            "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
            self.view_name(),
            self.raw_table()
        );
        match self.spec.window_type {
            WindowType::TimeBasedSlideOnEachTuple | WindowType::TimeBased => {
                let boundary = self.state_boundary();
                let history_ms = self.spec.history_ms().expect("time-bounded window");
                format!(
                    "{} WHERE timed <= {} AND timed >= {} - {} ORDER BY timed DESC",
                    head, boundary, boundary, history_ms
                )
            }
            WindowType::TupleBasedWinTimeBasedSlide => {
                let count = self.spec.history_tuples().expect("count-bounded window");
                format!(
                    "{} WHERE timed <= {} ORDER BY timed DESC LIMIT {}",
                    head,
                    self.state_boundary(),
                    count
                )
            }
            WindowType::TupleBased => {
                let count = self.spec.history_tuples().expect("count-bounded window");
                format!("{} ORDER BY timed DESC LIMIT {}", head, count)
            }
        }
    }

    /// The statement dropping the window view at teardown.
    pub fn drop_view_sql(&self) -> String {
        format!("DROP VIEW IF EXISTS {}", self.view_name())
    }
}

impl QueryRewriter for SqlViewRewriter {
    fn rewrite(&self, query: &str) -> SluiceResult<String> {
        substitute(&self.alias, &self.uid, query)
    }

    fn physical_name(&self) -> &str {
        &self.uid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(history: &str, slide: Option<&str>) -> WindowSpec {
        WindowSpec::parse(Some(history), slide).unwrap()
    }

    #[test]
    fn test_rewrite_replaces_every_occurrence() {
        let rewriter = SqlViewRewriter::new("mystream", "ss_1", spec("2s", None));
        let rewritten = rewriter
            .rewrite("select * from mystream where mystream.temp > 20")
            .unwrap();
        assert!(rewritten.contains("ss_1"));
        assert!(!rewritten.to_lowercase().contains("mystream"));
    }

    #[test]
    fn test_rewrite_is_case_insensitive_and_word_bounded() {
        let rewriter = PlainRewriter::new("temps", "ss_2_raw");
        let rewritten = rewriter.rewrite("SELECT * FROM Temps, temps2").unwrap();
        assert_eq!(rewritten, "SELECT * FROM ss_2_raw, temps2");
    }

    #[test]
    fn test_substitution_leaving_the_alias_is_an_error() {
        // A physical name that still reads as the alias token means the
        // rewrite cannot be total; the defect must surface, not pass through.
        let rewriter = PlainRewriter::new("mystream", "mystream");
        let err = rewriter.rewrite("select * from mystream").unwrap_err();
        assert!(matches!(err, SluiceError::Rewrite { .. }));

        let rewriter = PlainRewriter::new("temps", "archived temps");
        assert!(rewriter.rewrite("select * from temps").is_err());
    }

    #[test]
    fn test_view_sql_is_idempotent() {
        let rewriter = SqlViewRewriter::new("mystream", "ss_3", spec("3s", Some("2s")));
        assert_eq!(rewriter.create_view_sql(), rewriter.create_view_sql());
    }

    #[test]
    fn test_view_sql_never_samples_by_modulo() {
        for spec in [spec("2s", None), spec("3s", Some("2s")), spec("2", Some("2s"))] {
            let rewriter = SqlViewRewriter::new("mystream", "ss_4", spec);
            let sql = rewriter.create_view_sql().to_lowercase();
            assert!(!sql.contains("mod"), "window must not be modulo-sampled: {}", sql);
        }
    }

    #[test]
    fn test_view_sql_orders_most_recent_first() {
        let rewriter = SqlViewRewriter::new("mystream", "ss_5", spec("2", None));
        assert!(rewriter.create_view_sql().contains("ORDER BY timed DESC"));
    }

    #[test]
    fn test_tuple_window_with_time_slide_bounds_by_state_and_count() {
        let rewriter = SqlViewRewriter::new("mystream", "ss_6", spec("2", Some("2s")));
        let sql = rewriter.create_view_sql();
        assert!(sql.contains("timed <= (SELECT timed FROM window_state WHERE uid = 'ss_6')"));
        assert!(sql.ends_with("LIMIT 2"));
    }
}
