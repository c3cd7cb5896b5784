use std::fs;

use worldsync_bundle_core::{index_directory, BundleError, IndexConfig};
use worldsync_test_fixtures::libraries;

fn names(infos: &[worldsync_bundle_core::ShortInfo]) -> Vec<&str> {
    infos.iter().map(|i| i.name.as_str()).collect()
}

#[test]
fn sorts_by_name_and_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("1.xml"),
        r#"<atlas><map><map name="meta"><string name="name">Banana</string></map></map></atlas>"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("2.xml"),
        r#"<atlas><map><map name="meta"><string name="name">Apple</string></map></map></atlas>"#,
    )
    .unwrap();
    fs::write(dir.path().join("3.xml"), "<atlas><map><int name=\"x\">").unwrap();
    fs::write(
        dir.path().join("4.xml"),
        r#"<atlas><map><int name="x">1</int></map></atlas>"#,
    )
    .unwrap();

    let infos = index_directory(dir.path(), &IndexConfig::default()).unwrap();
    assert_eq!(names(&infos), vec!["Apple", "Banana"]);
    assert!(infos[0].filename.is_absolute());
    assert!(infos[0].filename.ends_with("2.xml"));
}

#[test]
fn nameless_meta_falls_back_to_file_name() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("castle.bundle"),
        r#"<atlas><map><map name="meta"><string name="description">Ruin</string></map></map></atlas>"#,
    )
    .unwrap();
    let infos = index_directory(dir.path(), &IndexConfig::default()).unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].name, "castle.bundle");
    assert_eq!(infos[0].description.as_deref(), Some("Ruin"));
}

#[test]
fn mixed_library_fixture() {
    let infos = index_directory(libraries::path("mixed").unwrap(), &IndexConfig::default()).unwrap();
    assert_eq!(names(&infos), vec!["Apple", "Banana", "castle.bundle"]);

    let apple = &infos[0];
    assert_eq!(apple.description.as_deref(), Some("Orchard"));
    assert_eq!((apple.entity_count, apple.rules_count, apple.minds_count), (2, 0, 1));
    assert_eq!(infos[2].rules_count, 1);
}

#[test]
fn metaless_bundles_are_listed_on_request() {
    let cfg = IndexConfig {
        include_metaless: true,
        ..IndexConfig::default()
    };
    let infos = index_directory(libraries::path("mixed").unwrap(), &cfg).unwrap();
    assert_eq!(names(&infos), vec!["Apple", "Banana", "castle.bundle", "loose.xml"]);
}

#[test]
fn extension_filter_limits_the_scan() {
    let cfg = IndexConfig {
        extensions: Some(vec!["json".into()]),
        ..IndexConfig::default()
    };
    let infos = index_directory(libraries::path("mixed").unwrap(), &cfg).unwrap();
    assert_eq!(names(&infos), vec!["Apple"]);
}

#[test]
fn subdirectories_are_not_descended() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("nested");
    fs::create_dir(&nested).unwrap();
    libraries::copy_into("mixed", &nested).unwrap();
    assert!(index_directory(dir.path(), &IndexConfig::default())
        .unwrap()
        .is_empty());
}

#[test]
fn equal_names_keep_file_order() {
    let dir = tempfile::tempdir().unwrap();
    for file in ["b.xml", "a.xml"] {
        fs::write(
            dir.path().join(file),
            r#"<atlas><map><map name="meta"><string name="name">Same</string></map></map></atlas>"#,
        )
        .unwrap();
    }
    let infos = index_directory(dir.path(), &IndexConfig::default()).unwrap();
    assert!(infos[0].filename.ends_with("a.xml"));
    assert!(infos[1].filename.ends_with("b.xml"));
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = index_directory(dir.path().join("gone"), &IndexConfig::default()).unwrap_err();
    assert!(matches!(err, BundleError::Io { .. }));
}
