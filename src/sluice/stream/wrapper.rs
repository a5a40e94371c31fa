/*!
# Wrappers & Delivery

A [`Wrapper`] adapts one physical data source into raw measurement tuples.
The middleware consumes the capability only: initialization, an output
format describing the produced fields, and a name for diagnostics.

[`StreamDispatcher`] is the delivery fan-out on the wrapper side: it owns
the ingest triggers of every stream source listening to a wrapper and posts
each arrived tuple to all of them. An ingest failure for one source is
logged and must not block delivery to the other listeners.
*/

use crate::sluice::stream::element::{DataField, StreamElement};
use crate::sluice::window::ingest::IngestTrigger;
use log::{error, warn};

/// Adapter producing raw measurement tuples for stream sources.
pub trait Wrapper: Send {
    /// Prepare the wrapper; a `false` return keeps it out of service.
    fn initialize(&mut self) -> bool;

    /// The fields this wrapper produces, excluding the implicit `timed`
    /// timestamp column.
    fn output_format(&self) -> Vec<DataField>;

    /// Wrapper name for diagnostics.
    fn name(&self) -> &str;

    /// Whether tuple timestamps come from the device rather than the local
    /// clock at arrival.
    fn uses_remote_timestamp(&self) -> bool {
        false
    }
}

struct Listener {
    uid: String,
    trigger: IngestTrigger,
}

/// Fan-out from one wrapper to its listening stream sources.
#[derive(Default)]
pub struct StreamDispatcher {
    listeners: Vec<Listener>,
}

impl StreamDispatcher {
    pub fn new() -> Self {
        StreamDispatcher {
            listeners: Vec::new(),
        }
    }

    /// Register a source's ingest trigger for delivery.
    pub fn add_listener(&mut self, trigger: IngestTrigger) {
        self.listeners.push(Listener {
            uid: trigger.uid().to_string(),
            trigger,
        });
    }

    /// Stop future deliveries to a source. The source's window-state row and
    /// raw table are kept; dropping them is the explicit responsibility of
    /// whoever tears the virtual sensor down.
    pub fn remove_listener(&mut self, uid: &str) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.uid != uid);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver one tuple to every listener. Returns `true` when at least one
    /// listener accepted it. A storage failure for one source is logged and
    /// the tuple is dropped for that source only.
    pub fn post_stream_element(&mut self, element: &StreamElement) -> bool {
        if self.listeners.is_empty() {
            warn!("tuple at {} posted with no listeners", element.timestamp);
            return false;
        }
        let mut accepted = false;
        for listener in &mut self.listeners {
            match listener.trigger.on_element(element) {
                Ok(true) => accepted = true,
                Ok(false) => {}
                Err(err) => {
                    error!(
                        "dropping tuple at {} for source '{}': {}",
                        element.timestamp, listener.uid, err
                    );
                }
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sluice::storage::{MemoryStorage, StorageBackend, StorageHandle};
    use crate::sluice::stream::source::StreamSource;
    use std::sync::Arc;

    fn attached_source(storage: &StorageHandle, history: &str) -> (StreamSource, IngestTrigger) {
        let mut source =
            StreamSource::new("mystream", "select * from wrapper").with_raw_history_size(history);
        source.validate().unwrap();
        let trigger = source.attach(Arc::clone(storage), &[]).unwrap();
        (source, trigger)
    }

    #[test]
    fn test_delivery_reaches_every_listener() {
        let storage: StorageHandle = Arc::new(MemoryStorage::new());
        let (a, trigger_a) = attached_source(&storage, "2s");
        let (b, trigger_b) = attached_source(&storage, "2s");
        let mut dispatcher = StreamDispatcher::new();
        dispatcher.add_listener(trigger_a);
        dispatcher.add_listener(trigger_b);

        assert!(dispatcher.post_stream_element(&StreamElement::new(1000)));
        for source in [&a, &b] {
            let view = source.rewrite("select * from mystream").unwrap();
            let rs = storage.execute_query_with_result_set(&view).unwrap();
            assert_eq!(rs.len(), 1);
        }
    }

    #[test]
    fn test_failed_listener_does_not_block_others() {
        let storage: StorageHandle = Arc::new(MemoryStorage::new());
        let (healthy, trigger_healthy) = attached_source(&storage, "2s");

        // A trigger pointing at a missing raw table fails on every insert.
        let spec = crate::sluice::window::spec::WindowSpec::parse(Some("2s"), None).unwrap();
        let broken = IngestTrigger::new("ss_broken", "missing_raw", spec, 1.0, Arc::clone(&storage));

        let mut dispatcher = StreamDispatcher::new();
        dispatcher.add_listener(broken);
        dispatcher.add_listener(trigger_healthy);

        assert!(dispatcher.post_stream_element(&StreamElement::new(2000)));
        let view = healthy.rewrite("select * from mystream").unwrap();
        let rs = storage.execute_query_with_result_set(&view).unwrap();
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn test_remove_listener_stops_delivery_but_keeps_state() {
        let storage: StorageHandle = Arc::new(MemoryStorage::new());
        let (source, trigger) = attached_source(&storage, "2s");
        let uid = source.uid().unwrap().to_string();

        let mut dispatcher = StreamDispatcher::new();
        dispatcher.add_listener(trigger);
        dispatcher.post_stream_element(&StreamElement::new(3000));
        assert!(dispatcher.remove_listener(&uid));
        assert!(!dispatcher.post_stream_element(&StreamElement::new(4000)));

        // State row survives removal at its last value.
        let state = crate::sluice::window::state::WindowStateStore::new(Arc::clone(&storage));
        assert_eq!(state.last_trigger(&uid).unwrap(), 3000);
        assert!(storage.table_exists(&format!("{}_raw", uid)));
    }
}
