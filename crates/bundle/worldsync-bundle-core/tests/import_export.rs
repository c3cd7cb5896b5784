use std::sync::Arc;

use parking_lot::Mutex;
use worldsync_bundle_core::{
    load_from_file, save_to_file, EntityExporter, EntityImporter, ExportConfig, ImportConfig,
    ImportStats,
};
use worldsync_element_core::{query, Element, ListType, MapType};
use worldsync_ops_core::{Correlator, OpKind, SerialNumberGenerator};
use worldsync_test_fixtures::world::WORLD_ID;
use worldsync_test_fixtures::{bundles, FakeWorld};

type Conn = Arc<Correlator<Arc<FakeWorld>>>;

fn connect() -> (Arc<FakeWorld>, Conn) {
    let world = Arc::new(FakeWorld::new());
    let correlator = Arc::new(Correlator::with_serials(
        world.clone(),
        SerialNumberGenerator::new(),
    ));
    (world, correlator)
}

fn with_account() -> ImportConfig {
    ImportConfig {
        account_id: Some("acc1".into()),
        ..ImportConfig::default()
    }
}

fn created_names(world: &FakeWorld) -> Vec<String> {
    world
        .received()
        .iter()
        .filter(|op| op.kind == OpKind::Create)
        .filter_map(|op| op.first_arg())
        .filter_map(|arg| query::get::<&str>(arg, "name").map(str::to_string))
        .collect()
}

fn attr_str(entity: &MapType, key: &str) -> String {
    query::get::<&str>(entity, key).unwrap_or_default().to_string()
}

#[test]
fn children_wait_for_their_parent() {
    let (world, c) = connect();
    let importer =
        EntityImporter::from_file(&c, bundles::path("castle").unwrap(), with_account()).unwrap();
    importer.start();
    assert_eq!(created_names(&world), vec!["keep"]);

    assert!(world.deliver_one(&c));
    assert_eq!(created_names(&world), vec!["keep", "tower", "yard"]);

    world.deliver(&c);
    assert_eq!(created_names(&world), vec!["keep", "tower", "yard", "bell"]);
    assert!(importer.is_complete());

    let keep = world.entity_named("keep").unwrap();
    let tower = world.entity_named("tower").unwrap();
    let bell = world.entity_named("bell").unwrap();
    assert_eq!(attr_str(&keep, "loc"), WORLD_ID);
    assert_eq!(attr_str(&tower, "loc"), attr_str(&keep, "id"));
    assert_eq!(attr_str(&bell, "loc"), attr_str(&tower, "id"));
    assert_eq!(bell.get("mass"), Some(&Element::Float(120.5)));
    assert_eq!(importer.server_id("bell"), Some(attr_str(&bell, "id")));
}

#[test]
fn creates_never_carry_bundle_ids_or_containment() {
    let (world, c) = connect();
    let importer =
        EntityImporter::from_file(&c, bundles::path("castle").unwrap(), with_account()).unwrap();
    importer.start();
    world.deliver(&c);

    for op in world.received().iter().filter(|op| op.kind == OpKind::Create) {
        let arg = op.first_arg().unwrap();
        assert!(!arg.contains_key("id"));
        assert!(!arg.contains_key("contains"));
        assert!(!arg.contains_key("gate"), "references go out after creation");
    }
}

#[test]
fn references_minds_and_rules_follow_creation() {
    let (world, c) = connect();
    let progress = Arc::new(Mutex::new(Vec::<ImportStats>::new()));
    let done = Arc::new(Mutex::new(0));
    let (p, d) = (progress.clone(), done.clone());
    let importer =
        EntityImporter::from_file(&c, bundles::path("castle").unwrap(), with_account())
            .unwrap()
            .on_progress(move |stats| p.lock().push(stats.clone()))
            .on_complete(move |_| *d.lock() += 1);
    importer.start();
    world.deliver(&c);

    let tower = world.entity_named("tower").unwrap();
    let bell = world.entity_named("bell").unwrap();
    let yard = world.entity_named("yard").unwrap();
    assert_eq!(attr_str(&yard, "gate"), attr_str(&tower, "id"));
    assert_eq!(attr_str(&yard, "goal"), "keep watch");
    assert_eq!(attr_str(&yard, "post"), attr_str(&bell, "id"));

    let updates = world.account_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "acc1");
    assert_eq!(attr_str(&updates[0].1, "id"), "castle_guard");

    let stats = importer.stats();
    assert_eq!(stats.entities_total, 4);
    assert_eq!(stats.entities_created, 4);
    assert_eq!(stats.references_resolved, 1);
    assert_eq!((stats.rules_done, stats.minds_done), (1, 1));
    assert_eq!(stats.failures(), 0);

    // keep, rule, tower, yard, bell, references, mind
    assert_eq!(progress.lock().len(), 7);
    assert_eq!(progress.lock().last(), Some(&stats));
    assert_eq!(*done.lock(), 1);
    assert_eq!(c.pending_count(), 0, "answered requests are released");
}

#[test]
fn rejected_entity_skips_its_subtree() {
    let (world, c) = connect();
    world.reject_entities_named("tower");
    let done = Arc::new(Mutex::new(None));
    let d = done.clone();
    let importer =
        EntityImporter::from_file(&c, bundles::path("castle").unwrap(), with_account())
            .unwrap()
            .on_complete(move |stats| *d.lock() = Some(stats.clone()));
    importer.start();
    world.deliver(&c);

    assert!(world.entity_named("yard").is_some());
    assert!(world.entity_named("bell").is_none());
    assert!(!created_names(&world).contains(&"bell".to_string()));

    let stats = done.lock().clone().expect("import completes despite failures");
    assert_eq!(stats.entities_created, 2);
    assert_eq!(stats.entities_failed, 1);
    assert_eq!(stats.entities_skipped, 1);
    // yard.gate points at the tower, the yard's mind at the bell.
    assert_eq!(stats.references_failed, 1);
    assert_eq!(stats.minds_failed, 1);
    assert_eq!(stats.rules_done, 1);
}

#[test]
fn cyclic_and_unplaceable_entities_are_reported() {
    let (world, c) = connect();
    let importer = EntityImporter::from_file(
        &c,
        bundles::path("orphans").unwrap(),
        ImportConfig::default(),
    )
    .unwrap();
    importer.start();
    world.deliver(&c);

    let stats = importer.stats();
    assert!(importer.is_complete());
    assert_eq!(stats.entities_created, 0);
    assert_eq!(stats.entities_failed, 1, "c's location does not exist");
    assert_eq!(stats.entities_skipped, 2, "a and b wait on each other");
}

#[test]
fn root_location_overrides_bundle_parents() {
    let (world, c) = connect();
    let room = world.insert_entity(WORLD_ID, {
        let mut attrs = MapType::new();
        attrs.insert("name".into(), "room".into());
        attrs
    });
    let importer = EntityImporter::from_file(
        &c,
        bundles::path("orphans").unwrap(),
        ImportConfig {
            root_location: Some(room.clone()),
            ..ImportConfig::default()
        },
    )
    .unwrap();
    importer.start();
    world.deliver(&c);

    assert_eq!(importer.stats().entities_created, 1);
    assert_eq!(world.children(&room).len(), 1);
}

#[test]
fn rules_need_an_account() {
    let (world, c) = connect();
    let bundle = bundles::load("castle").unwrap();
    let importer = EntityImporter::new(&c, &bundle, ImportConfig::default()).unwrap();
    importer.start();
    world.deliver(&c);
    assert!(world.account_updates().is_empty());
    assert_eq!(importer.stats().rules_failed, 1);
    assert_eq!(importer.stats().entities_created, 4);
}

#[test]
fn integer_ids_from_json_bundles() {
    let (world, c) = connect();
    let importer =
        EntityImporter::from_file(&c, bundles::path("village").unwrap(), ImportConfig::default())
            .unwrap();
    importer.start();
    world.deliver(&c);

    let square = world.entity_named("square").unwrap();
    assert_eq!(world.children(&attr_str(&square, "id")).len(), 3);
    assert_eq!(importer.stats().entities_created, 4);
}

#[test]
fn failed_sends_count_as_failures() {
    let (world, c) = connect();
    world.set_offline(true);
    let done = Arc::new(Mutex::new(false));
    let d = done.clone();
    let importer =
        EntityImporter::from_file(&c, bundles::path("castle").unwrap(), with_account())
            .unwrap()
            .on_complete(move |_| *d.lock() = true);
    importer.start();

    assert!(*done.lock());
    let stats = importer.stats();
    assert_eq!(stats.entities_failed, 1);
    assert_eq!(stats.entities_skipped, 3);
    assert_eq!(stats.rules_failed, 1);
    assert_eq!(c.pending_count(), 0);
}

#[test]
fn second_start_is_ignored() {
    let (world, c) = connect();
    let importer =
        EntityImporter::from_file(&c, bundles::path("village").unwrap(), ImportConfig::default())
            .unwrap();
    importer.start();
    importer.start();
    assert_eq!(created_names(&world), vec!["square"]);
}

#[test]
fn non_map_bundles_are_refused() {
    let (_world, c) = connect();
    assert!(EntityImporter::new(&c, &Element::list(), ImportConfig::default()).is_err());
    assert!(EntityImporter::new(&c, &Element::map(), ImportConfig::default()).is_err());
}

fn seed_house(world: &FakeWorld) -> String {
    let named = |name: &str| {
        let mut attrs = MapType::new();
        attrs.insert("name".into(), name.into());
        attrs
    };
    let house = world.insert_entity(WORLD_ID, named("house"));
    let kitchen = world.insert_entity(&house, named("kitchen"));
    world.insert_entity(&kitchen, named("stove"));
    world.insert_entity(&house, named("porch"));
    house
}

#[test]
fn exporter_collects_the_whole_tree() {
    let (world, c) = connect();
    let house = seed_house(&world);
    let finished = Arc::new(Mutex::new(None));
    let f = finished.clone();
    let exporter = EntityExporter::new(
        &c,
        ExportConfig {
            name: "House".into(),
            description: Some("seeded".into()),
        },
    )
    .on_complete(move |bundle| *f.lock() = Some(bundle.clone()));
    exporter.start(house.clone());
    assert!(!exporter.is_complete());
    world.deliver(&c);

    let bundle = exporter.bundle().expect("export finished");
    assert_eq!(finished.lock().as_ref(), Some(&bundle));
    let root = bundle.as_map().unwrap();
    let meta = query::get::<&MapType>(root, "meta").unwrap();
    assert_eq!(query::get::<&str>(meta, "name"), Some("House"));
    assert_eq!(query::get::<&str>(meta, "description"), Some("seeded"));
    assert!(query::get::<i64>(meta, "timestamp").unwrap() > 0);
    assert_eq!(query::get::<&str>(meta, "id").unwrap().len(), 36);

    let entities = query::get::<&ListType>(root, "entities").unwrap();
    let names: Vec<String> = entities
        .iter()
        .filter_map(Element::as_map)
        .map(|e| attr_str(e, "name"))
        .collect();
    assert_eq!(names, vec!["house", "kitchen", "porch", "stove"]);
    assert!(entities
        .iter()
        .filter_map(Element::as_map)
        .all(|e| !e.contains_key("contains")));
    assert_eq!(exporter.stats().entities, 4);
    assert_eq!(exporter.stats().failed, 0);
}

#[test]
fn exported_bundle_reimports_into_a_fresh_world() {
    let (source, c) = connect();
    let house = seed_house(&source);
    let exporter = EntityExporter::new(&c, ExportConfig::default());
    exporter.start(house);
    source.deliver(&c);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("house.xml");
    save_to_file(&path, &exporter.bundle().unwrap()).unwrap();
    let bundle = load_from_file(&path).unwrap();

    let (target, c2) = connect();
    let importer = EntityImporter::new(&c2, &bundle, ImportConfig::default()).unwrap();
    importer.start();
    target.deliver(&c2);

    assert_eq!(importer.stats().entities_created, 4);
    let house = target.entity_named("house").unwrap();
    let kitchen = target.entity_named("kitchen").unwrap();
    let stove = target.entity_named("stove").unwrap();
    assert_eq!(attr_str(&house, "loc"), WORLD_ID);
    assert_eq!(attr_str(&kitchen, "loc"), attr_str(&house, "id"));
    assert_eq!(attr_str(&stove, "loc"), attr_str(&kitchen, "id"));
    assert_eq!(target.children(&attr_str(&house, "id")).len(), 2);
}

#[test]
fn exporting_a_missing_entity_finishes_empty() {
    let (world, c) = connect();
    let exporter = EntityExporter::new(&c, ExportConfig::default());
    exporter.start("404");
    world.deliver(&c);

    let bundle = exporter.bundle().unwrap();
    let entities = bundle.attr("entities").and_then(Element::as_list).unwrap();
    assert!(entities.is_empty());
    assert_eq!(exporter.stats().failed, 1);
}
