//! Shared fixtures for worldsync tests: bundle files listed in
//! `fixtures/manifest.json` and an in-memory world that answers operations.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

pub mod world;

pub use world::FakeWorld;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    bundles: HashMap<String, String>,
    libraries: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn lookup<'a>(map: &'a HashMap<String, String>, kind: &str, name: &str) -> Result<&'a str> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

/// Single bundle files.
pub mod bundles {
    use super::*;
    use worldsync_element_core::{codec, json, Element};

    pub fn keys() -> Vec<String> {
        MANIFEST.bundles.keys().cloned().collect()
    }

    pub fn text(name: &str) -> Result<String> {
        read_to_string(lookup(&MANIFEST.bundles, "bundle", name)?)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        Ok(resolve_path(lookup(&MANIFEST.bundles, "bundle", name)?))
    }

    /// Decode the bundle, picking the format from its extension.
    pub fn load(name: &str) -> Result<Element> {
        let rel = lookup(&MANIFEST.bundles, "bundle", name)?;
        let text = read_to_string(rel)?;
        if rel.ends_with(".json") {
            return json::parse_str(&text).with_context(|| format!("bundle fixture {rel}"));
        }
        codec::decode(&text)
            .with_context(|| format!("bundle fixture {rel}"))?
            .ok_or_else(|| anyhow!("bundle fixture {rel} holds no object"))
    }
}

/// Directories of bundles, some of them deliberately broken.
pub mod libraries {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.libraries.keys().cloned().collect()
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        Ok(resolve_path(lookup(&MANIFEST.libraries, "library", name)?))
    }

    /// Copy the library into `dest`, returning the copied file names.
    pub fn copy_into(name: &str, dest: &Path) -> Result<Vec<String>> {
        let src = path(name)?;
        let mut copied = Vec::new();
        for entry in fs::read_dir(&src).with_context(|| format!("listing {}", src.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::copy(entry.path(), dest.join(entry.file_name()))?;
                copied.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        copied.sort();
        Ok(copied)
    }
}
