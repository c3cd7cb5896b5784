//! Directory scan producing a name-sorted list of bundle summaries.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use walkdir::WalkDir;
use worldsync_element_core::{query, Element, ListType, MapType};

use crate::{load_from_file, BundleError, IndexConfig, ShortInfo};

/// Summarise every bundle directly inside `dir`.
///
/// Only failing to open `dir` itself is an error. Files that do not decode,
/// hold no object or are not bundles are logged and skipped. The result is
/// sorted by name; bundles sharing a name keep file name order.
pub fn index_directory(
    dir: impl AsRef<Path>,
    config: &IndexConfig,
) -> Result<Vec<ShortInfo>, BundleError> {
    let dir = dir.as_ref();
    let root = fs::canonicalize(dir).map_err(|e| BundleError::io(dir, e))?;
    fs::read_dir(&root).map_err(|e| BundleError::io(&root, e))?;

    let mut infos = Vec::new();
    let entries = WalkDir::new(&root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry in {}: {err}", root.display());
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !config.accepts(path) {
            continue;
        }
        match load_from_file(path) {
            Ok(bundle) => match short_info(path, &bundle, config) {
                Some(info) => infos.push(info),
                None => debug!("{} is not a bundle with metadata, skipping", path.display()),
            },
            Err(err) => warn!("failed to read bundle info from {}: {err}", path.display()),
        }
    }
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(infos)
}

/// Summarise an already decoded bundle stored at `path`.
///
/// Returns `None` when `bundle` is not a non-empty map, or has no `meta` map
/// and `config.include_metaless` is off.
pub fn short_info(path: &Path, bundle: &Element, config: &IndexConfig) -> Option<ShortInfo> {
    let root = bundle.as_map().filter(|m| !m.is_empty())?;
    let empty = MapType::new();
    let meta = match query::get::<&MapType>(root, "meta") {
        Some(meta) => meta,
        None if config.include_metaless => &empty,
        None => return None,
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = query::get::<&str>(meta, "name")
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or(filename);
    let count = |key: &str| query::get::<&ListType>(root, key).map_or(0, Vec::len);

    Some(ShortInfo {
        filename: path.to_path_buf(),
        name,
        description: query::get::<&str>(meta, "description").map(str::to_string),
        entity_count: count("entities"),
        rules_count: count("rules"),
        minds_count: count("minds"),
    })
}
