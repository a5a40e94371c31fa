/*!
# Source Lifecycle Tests

Covers the configuration-to-teardown path: YAML load, validation failures
blocking startup, UID uniqueness across colliding aliases, and the explicit
two-level cleanup policy (listener removal keeps persisted window state;
teardown prunes it).
*/

use sluice::{
    MemoryStorage, SluiceConfig, SluiceError, StorageBackend, StorageHandle, StreamDispatcher,
    StreamElement, StreamSource, WindowStateStore,
};
use std::sync::Arc;

fn validated(history: &str) -> StreamSource {
    let mut source =
        StreamSource::new("mystream", "select * from wrapper").with_raw_history_size(history);
    source.validate().unwrap();
    source
}

#[test]
fn test_colliding_aliases_have_independent_state() {
    let storage: StorageHandle = Arc::new(MemoryStorage::new());
    let a = validated("2s");
    let b = validated("2s");
    assert_ne!(a.uid(), b.uid());

    let mut trigger_a = a.attach(Arc::clone(&storage), &[]).unwrap();
    let _trigger_b = b.attach(Arc::clone(&storage), &[]).unwrap();

    // Mutating one source's state never affects the other's row.
    trigger_a.on_element(&StreamElement::new(7000)).unwrap();
    let state = WindowStateStore::new(Arc::clone(&storage));
    assert_eq!(state.last_trigger(a.uid().unwrap()).unwrap(), 7000);
    assert_eq!(state.last_trigger(b.uid().unwrap()).unwrap(), -1);
}

#[test]
fn test_removal_keeps_state_teardown_prunes_it() {
    let storage: StorageHandle = Arc::new(MemoryStorage::new());
    let source = validated("2s");
    let uid = source.uid().unwrap().to_string();
    let raw_table = format!("{}_raw", uid);

    let trigger = source.attach(Arc::clone(&storage), &[]).unwrap();
    let mut dispatcher = StreamDispatcher::new();
    dispatcher.add_listener(trigger);
    dispatcher.post_stream_element(&StreamElement::new(9000));

    // Listener removal: deliveries stop, persisted state and table stay.
    assert!(dispatcher.remove_listener(&uid));
    let state = WindowStateStore::new(Arc::clone(&storage));
    assert_eq!(state.last_trigger(&uid).unwrap(), 9000);
    assert!(storage.table_exists(&raw_table));

    // Explicit teardown: view, raw table and state row all go.
    source.teardown(Arc::clone(&storage)).unwrap();
    assert!(!storage.table_exists(&raw_table));
    assert!(state.last_trigger(&uid).is_err());
    assert!(
        storage.execute_query(&format!("SELECT * FROM {}", uid)).is_err(),
        "the window view must be gone after teardown"
    );
}

#[test]
fn test_configuration_errors_block_startup() {
    let mut source = StreamSource::new("mystream", "select * from wrapper")
        .with_raw_history_size("not-a-window");
    let err = source.validate().unwrap_err();
    match err {
        SluiceError::Configuration { message, parameter } => {
            assert_eq!(parameter.as_deref(), Some("history-size"));
            assert!(message.contains("not-a-window"));
        }
        other => panic!("expected a configuration error, got {}", other),
    }
    // A source that failed validation cannot be attached.
    let storage: StorageHandle = Arc::new(MemoryStorage::new());
    assert!(source.attach(storage, &[]).is_err());
}

#[test]
fn test_yaml_config_end_to_end() {
    let yaml = r#"
sources:
  - alias: thermo
    query: select * from wrapper
    history-size: 3s
    slide-value: 2s
    wrapper: thermo-probe
"#;
    let storage: StorageHandle = Arc::new(MemoryStorage::new());
    let sources = SluiceConfig::from_yaml_str(yaml)
        .unwrap()
        .into_sources()
        .unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].wrapper_name(), Some("thermo-probe"));

    let mut trigger = sources[0].attach(Arc::clone(&storage), &[]).unwrap();
    trigger.on_element(&StreamElement::new(1000)).unwrap();
    let view_query = sources[0].rewrite("select avg(temp) from thermo").unwrap();
    assert!(view_query.contains(sources[0].uid().unwrap()));
    assert!(!view_query.contains("thermo"));
}
