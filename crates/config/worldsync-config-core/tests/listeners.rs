use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use worldsync_config_core::{ConfigError, ConfigService};
use worldsync_element_core::{Element, MapType};

type Seen = Arc<Mutex<Vec<(String, String, Element)>>>;

fn recorder() -> (Seen, impl Fn(&str, &str, &Element) + Send + Sync + 'static) {
    let seen: Seen = Arc::default();
    let sink = seen.clone();
    (seen, move |section: &str, key: &str, value: &Element| {
        sink.lock()
            .push((section.to_string(), key.to_string(), value.clone()))
    })
}

#[test]
fn fires_only_for_the_watched_item() {
    let config = ConfigService::new();
    let (seen, on_changed) = recorder();
    let _listener = config.register("graphics", "fov", on_changed);

    config.set_value("graphics", "fov", 90);
    config.set_value("graphics", "vsync", 1);
    config.set_value("audio", "fov", 3);

    assert_eq!(
        *seen.lock(),
        vec![("graphics".into(), "fov".into(), Element::Int(90))]
    );
}

#[test]
fn dropping_the_listener_unsubscribes() {
    let config = ConfigService::new();
    let (seen, on_changed) = recorder();
    let listener = config.register("graphics", "fov", on_changed);
    assert_eq!(config.listener_count(), 1);

    config.set_value("graphics", "fov", 60);
    drop(listener);
    config.set_value("graphics", "fov", 75);

    assert_eq!(seen.lock().len(), 1);
    assert_eq!(config.listener_count(), 0);
}

#[test]
fn evaluate_fires_only_when_the_item_exists() {
    let config = ConfigService::new();
    let (seen, on_changed) = recorder();
    let listener = config.register("net", "host", on_changed);

    assert!(!listener.evaluate());
    assert!(seen.lock().is_empty());

    config.set_value("net", "host", "example.org");
    seen.lock().clear();
    assert!(listener.evaluate());
    assert_eq!(seen.lock()[0].2, Element::from("example.org"));
}

#[test]
fn listener_outliving_the_service_is_inert() {
    let (seen, on_changed) = recorder();
    let listener = {
        let config = ConfigService::new();
        config.set_value("a", "b", 1);
        config.register("a", "b", on_changed)
    };
    assert!(!listener.evaluate());
    drop(listener);
    assert!(seen.lock().is_empty());
}

#[test]
fn callbacks_may_write_back() {
    let config = ConfigService::new();
    let mirror = config.clone();
    let _listener = config.register("ui", "scale", move |_, _, value| {
        mirror.set_value("ui", "scale_copy", value.clone());
    });
    config.set_value("ui", "scale", 2.0);
    assert_eq!(config.get_value("ui", "scale_copy"), Some(Element::Float(2.0)));
}

#[test]
fn apply_sets_and_notifies_each_item() {
    let config = ConfigService::new();
    let (seen, on_changed) = recorder();
    let _listener = config.register("audio", "volume", on_changed);

    let mut audio = MapType::new();
    audio.insert("volume".into(), Element::Float(0.25));
    audio.insert("muted".into(), Element::Int(0));
    let mut values = MapType::new();
    values.insert("audio".into(), audio.into());
    values.insert("broken".into(), Element::Int(1));

    assert_eq!(config.apply(&values), 2);
    assert_eq!(config.get_value("audio", "muted"), Some(Element::Int(0)));
    assert!(!config.has_section("broken"));
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn loads_json_and_tagged_files() {
    let dir = tempfile::tempdir().unwrap();
    let json = dir.path().join("settings.json");
    fs::write(&json, r#"{"net": {"host": "localhost", "port": 6767}}"#).unwrap();
    let tagged = dir.path().join("settings.conf");
    fs::write(
        &tagged,
        r#"<atlas><map><map name="net"><int name="port">7000</int></map></map></atlas>"#,
    )
    .unwrap();

    let config = ConfigService::new();
    assert_eq!(config.load_file(&json).unwrap(), 2);
    assert_eq!(config.get_value("net", "port"), Some(Element::Int(6767)));
    assert_eq!(config.load_file(&tagged).unwrap(), 1);
    assert_eq!(config.get_value("net", "port"), Some(Element::Int(7000)));
    assert_eq!(config.get_value("net", "host"), Some(Element::from("localhost")));

    let list = dir.path().join("list.json");
    fs::write(&list, "[1, 2]").unwrap();
    assert!(matches!(
        config.load_file(&list),
        Err(ConfigError::NotAMap { found: "list" })
    ));
    assert!(matches!(
        config.load_file(dir.path().join("missing.json")),
        Err(ConfigError::Io { .. })
    ));
}
