/*!
# Window Specification Parser & Classifier

Parses the textual window-size and slide-value strings of a stream source and
classifies the pair into one of the closed set of [`WindowType`]s.

## Grammar

Bit-exact, per value:

- `^\d+$`: tuple count (e.g. `"20"` keeps the last 20 tuples)
- `^\d+s$`: seconds (e.g. `"30s"` keeps the last 30 seconds)

The slide value is optional. Counts and durations must be positive; zero is
rejected.

## Classification

| history     | slide               | WindowType                  |
|-------------|---------------------|-----------------------------|
| time-based  | absent              | TimeBasedSlideOnEachTuple   |
| time-based  | time-based          | TimeBased                   |
| tuple-based | time-based          | TupleBasedWinTimeBasedSlide |
| tuple-based | absent/tuple-based  | TupleBased                  |

The classification is deterministic from the textual forms and is frozen for
the lifetime of the running source once `validate()` has accepted it.
*/

use crate::sluice::error::{SluiceError, SluiceResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn tuple_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

fn seconds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)s$").unwrap())
}

/// Closed classification of trigger/bound semantics for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowType {
    /// Time-bounded window re-evaluated on every arriving tuple; the view is
    /// always "last history duration ending at the newest tuple".
    TimeBasedSlideOnEachTuple,
    /// Time-bounded window whose boundary only advances when the slide
    /// interval has elapsed since the previous trigger.
    TimeBased,
    /// Tuple-count-bounded window with a time-gated slide: trigger gating and
    /// row bounding are orthogonal.
    TupleBasedWinTimeBasedSlide,
    /// Tuple-count-bounded window re-evaluated per tuple, bound by count only.
    TupleBased,
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WindowType::TimeBasedSlideOnEachTuple => "TIME_BASED_SLIDE_ON_EACH_TUPLE",
            WindowType::TimeBased => "TIME_BASED",
            WindowType::TupleBasedWinTimeBasedSlide => "TUPLE_BASED_WIN_TIME_BASED_SLIDE",
            WindowType::TupleBased => "TUPLE_BASED",
        };
        write!(f, "{}", name)
    }
}

/// One parsed window value: either a tuple count or a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowValue {
    /// Keep the most recent N tuples
    Tuples(u64),
    /// Keep tuples from the trailing duration, in milliseconds
    DurationMs(i64),
}

impl WindowValue {
    /// Parse a textual window value against the grammar.
    ///
    /// `parameter` names the configuration field for error reporting
    /// (`history-size` or `slide-value`).
    pub fn parse(text: &str, parameter: &str) -> SluiceResult<Self> {
        let text = text.trim();
        if let Some(caps) = seconds_re().captures(text) {
            let secs: i64 = caps[1].parse().map_err(|_| {
                SluiceError::configuration(
                    format!("duration '{}' out of range", text),
                    Some(parameter.to_string()),
                )
            })?;
            if secs == 0 {
                return Err(SluiceError::configuration(
                    "duration must be positive",
                    Some(parameter.to_string()),
                ));
            }
            // Grammar-valid durations can still exceed the millisecond range.
            let ms = secs.checked_mul(1000).ok_or_else(|| {
                SluiceError::configuration(
                    format!("duration '{}' out of range", text),
                    Some(parameter.to_string()),
                )
            })?;
            return Ok(WindowValue::DurationMs(ms));
        }
        if tuple_count_re().is_match(text) {
            let count: u64 = text.parse().map_err(|_| {
                SluiceError::configuration(
                    format!("tuple count '{}' out of range", text),
                    Some(parameter.to_string()),
                )
            })?;
            if count == 0 {
                return Err(SluiceError::configuration(
                    "tuple count must be positive",
                    Some(parameter.to_string()),
                ));
            }
            return Ok(WindowValue::Tuples(count));
        }
        Err(SluiceError::configuration(
            format!("'{}' matches neither <n> (tuples) nor <n>s (seconds)", text),
            Some(parameter.to_string()),
        ))
    }

    pub fn is_time_based(&self) -> bool {
        matches!(self, WindowValue::DurationMs(_))
    }
}

/// A validated window specification: parsed history bound, optional parsed
/// slide, and the derived [`WindowType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub history: WindowValue,
    pub slide: Option<WindowValue>,
    pub window_type: WindowType,
}

impl WindowSpec {
    /// Parse and classify a history-size / slide-value pair.
    ///
    /// A missing history size is a configuration error; the slide value is
    /// optional. Classification follows the module-level table.
    pub fn parse(history_size: Option<&str>, slide_value: Option<&str>) -> SluiceResult<Self> {
        let history_text = history_size.ok_or_else(|| {
            SluiceError::configuration(
                "history-size is required",
                Some("history-size".to_string()),
            )
        })?;
        let history = WindowValue::parse(history_text, "history-size")?;
        let slide = slide_value
            .map(|s| WindowValue::parse(s, "slide-value"))
            .transpose()?;

        let window_type = match (history.is_time_based(), slide.map(|s| s.is_time_based())) {
            (true, None) => WindowType::TimeBasedSlideOnEachTuple,
            (true, Some(true)) => WindowType::TimeBased,
            (false, Some(true)) => WindowType::TupleBasedWinTimeBasedSlide,
            // Tuple-count history with an absent or tuple-based slide: the
            // window is re-evaluated per tuple, bound by count only.
            (false, Some(false)) | (false, None) => WindowType::TupleBased,
            // Time-based history with a tuple-based slide has no defined
            // semantics; reject it at validation time.
            (true, Some(false)) => {
                return Err(SluiceError::configuration(
                    "a time-based history cannot take a tuple-based slide",
                    Some("slide-value".to_string()),
                ))
            }
        };

        Ok(WindowSpec {
            history,
            slide,
            window_type,
        })
    }

    /// The history bound in milliseconds, for time-bounded window types.
    pub fn history_ms(&self) -> Option<i64> {
        match self.history {
            WindowValue::DurationMs(ms) => Some(ms),
            WindowValue::Tuples(_) => None,
        }
    }

    /// The history bound as a tuple count, for count-bounded window types.
    pub fn history_tuples(&self) -> Option<u64> {
        match self.history {
            WindowValue::Tuples(n) => Some(n),
            WindowValue::DurationMs(_) => None,
        }
    }

    /// The slide interval in milliseconds, when the slide is time-based.
    pub fn slide_ms(&self) -> Option<i64> {
        match self.slide {
            Some(WindowValue::DurationMs(ms)) => Some(ms),
            _ => None,
        }
    }
}
