/*!
# Stream Ingest Trigger

The integration point where a newly arrived tuple is persisted, evaluated
against the slide rule, and (if triggered) causes the window state to
advance. The raw insert and the state update execute as one atomic unit, so
a reader never observes a state row that has advanced without the
corresponding raw row being visible, nor vice versa.
*/

use crate::sluice::error::SluiceResult;
use crate::sluice::storage::{StorageBackend, StorageHandle};
use crate::sluice::stream::element::StreamElement;
use crate::sluice::window::spec::{WindowSpec, WindowType};
use crate::sluice::window::state::WindowStateStore;
use log::trace;

/// Per-source ingest trigger.
///
/// Holds the unpersisted slide pivot: for time-gated window types the pivot
/// is the timestamp of the previous trigger, seeded (without triggering) by
/// the first accepted tuple. Exactly one trigger exists per source and
/// tuples arrive sequentially from its wrapper, so the pivot needs no
/// synchronization.
pub struct IngestTrigger {
    uid: String,
    raw_table: String,
    spec: WindowSpec,
    storage: StorageHandle,
    pivot: Option<i64>,
    sampling_rate: f64,
    sampling_credit: f64,
}

impl IngestTrigger {
    pub fn new(
        uid: impl Into<String>,
        raw_table: impl Into<String>,
        spec: WindowSpec,
        sampling_rate: f64,
        storage: StorageHandle,
    ) -> Self {
        IngestTrigger {
            uid: uid.into(),
            raw_table: raw_table.into(),
            spec,
            storage,
            pivot: None,
            sampling_rate: sampling_rate.clamp(0.0, 1.0),
            sampling_credit: 0.0,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Persist one arrived tuple and apply the slide rule for this source's
    /// window type. Returns whether the tuple was accepted.
    ///
    /// Storage failures propagate to the caller; the pivot only moves after
    /// the atomic unit has committed, so a failed write leaves the slide
    /// gating exactly where it was.
    pub fn on_element(&mut self, element: &StreamElement) -> SluiceResult<bool> {
        if !self.sample() {
            trace!("source '{}' dropped tuple at {} by sampling", self.uid, element.timestamp);
            return Ok(false);
        }

        let decision = self.slide_decision(element.timestamp);

        let mut statements = vec![self.insert_statement(element)];
        if decision.trigger {
            statements.push(WindowStateStore::advance_statement(
                &self.uid,
                element.timestamp,
            ));
        }
        self.storage.execute_atomically(&statements)?;

        self.pivot = decision.pivot;
        if decision.trigger {
            trace!("source '{}' slid to {}", self.uid, element.timestamp);
        }
        Ok(true)
    }

    /// Deterministic sampling: accept a `sampling_rate` share of tuples by
    /// accumulating fractional credit per arrival.
    fn sample(&mut self) -> bool {
        self.sampling_credit += self.sampling_rate;
        if self.sampling_credit >= 1.0 {
            self.sampling_credit -= 1.0;
            true
        } else {
            false
        }
    }

    fn slide_decision(&self, timestamp: i64) -> SlideDecision {
        match self.spec.window_type {
            // State tracks the newest tuple unconditionally; the window is
            // re-evaluated on every arrival.
            WindowType::TimeBasedSlideOnEachTuple | WindowType::TupleBased => SlideDecision {
                trigger: true,
                pivot: Some(timestamp),
            },
            WindowType::TimeBased | WindowType::TupleBasedWinTimeBasedSlide => {
                let slide_ms = self.spec.slide_ms().unwrap_or(0);
                match self.pivot {
                    // First accepted tuple seeds the pivot; the first trigger
                    // still requires the slide interval to elapse from here.
                    None => SlideDecision {
                        trigger: false,
                        pivot: Some(timestamp),
                    },
                    Some(pivot) if timestamp - pivot >= slide_ms => SlideDecision {
                        trigger: true,
                        pivot: Some(timestamp),
                    },
                    Some(pivot) => SlideDecision {
                        trigger: false,
                        pivot: Some(pivot),
                    },
                }
            }
        }
    }

    fn insert_statement(&self, element: &StreamElement) -> String {
        let mut columns = vec!["timed".to_string()];
        let mut literals = vec![element.timestamp.to_string()];
        // Field order is made deterministic so duplicate deliveries produce
        // identical statements.
        let mut names: Vec<&String> = element.fields.keys().collect();
        names.sort();
        for name in names {
            columns.push(name.clone());
            literals.push(element.fields[name].to_sql_literal());
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.raw_table,
            columns.join(", "),
            literals.join(", ")
        )
    }
}

struct SlideDecision {
    trigger: bool,
    pivot: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sluice::storage::{MemoryStorage, StorageBackend};
    use crate::sluice::stream::element::FieldValue;
    use std::sync::Arc;

    fn trigger(history: &str, slide: Option<&str>, rate: f64) -> IngestTrigger {
        let storage: StorageHandle = Arc::new(MemoryStorage::new());
        storage.create_table("ss_9_raw", &[]).unwrap();
        let state = WindowStateStore::new(Arc::clone(&storage));
        state.register("ss_9").unwrap();
        let spec = WindowSpec::parse(Some(history), slide).unwrap();
        IngestTrigger::new("ss_9", "ss_9_raw", spec, rate, storage)
    }

    fn state_of(trigger: &IngestTrigger) -> i64 {
        WindowStateStore::new(Arc::clone(&trigger.storage))
            .last_trigger("ss_9")
            .unwrap()
    }

    #[test]
    fn test_slide_on_each_tuple_tracks_every_timestamp() {
        let mut trigger = trigger("2s", None, 1.0);
        for t in [1000, 2500, 2600] {
            assert!(trigger.on_element(&StreamElement::new(t)).unwrap());
            assert_eq!(state_of(&trigger), t);
        }
    }

    #[test]
    fn test_time_gated_slide_seeds_then_gates() {
        let mut trigger = trigger("3s", Some("2s"), 1.0);
        trigger.on_element(&StreamElement::new(10_000)).unwrap();
        assert_eq!(state_of(&trigger), -1);
        trigger.on_element(&StreamElement::new(11_500)).unwrap();
        assert_eq!(state_of(&trigger), -1);
        trigger.on_element(&StreamElement::new(13_800)).unwrap();
        assert_eq!(state_of(&trigger), 13_800);
        trigger.on_element(&StreamElement::new(14_200)).unwrap();
        assert_eq!(state_of(&trigger), 13_800);
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let mut trigger = trigger("3s", Some("2s"), 1.0);
        trigger.on_element(&StreamElement::new(10_000)).unwrap();
        trigger.on_element(&StreamElement::new(13_000)).unwrap();
        assert_eq!(state_of(&trigger), 13_000);
        trigger.on_element(&StreamElement::new(13_000)).unwrap();
        assert_eq!(state_of(&trigger), 13_000);
    }

    #[test]
    fn test_sampling_rate_drops_share_of_tuples() {
        let mut trigger = trigger("2s", None, 0.5);
        let mut accepted = 0;
        for t in 0..10 {
            if trigger.on_element(&StreamElement::new(t * 1000)).unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 5);
    }

    #[test]
    fn test_raw_row_and_state_written_together() {
        let mut trigger = trigger("2s", None, 1.0);
        trigger
            .on_element(&StreamElement::new(5000).field("temp", FieldValue::Float(20.5)))
            .unwrap();
        let rs = trigger
            .storage
            .execute_query_with_result_set("SELECT * FROM ss_9_raw")
            .unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(state_of(&trigger), 5000);
    }
}
