//! Bundle files: a single map element holding `meta`, `entities`, `rules`
//! and `minds`, stored either in the tagged text format or as JSON.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use worldsync_element_core::{codec, json, CodecError, Element};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("invalid JSON bundle {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: json::JsonError,
    },
    #[error("{path} contains no object")]
    NoObject { path: PathBuf },
    #[error("bundle root must be a non-empty map, found {found}")]
    NotABundle { found: &'static str },
}

impl BundleError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        BundleError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk encoding, chosen from the file extension.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BundleFormat {
    Atlas,
    Json,
}

impl BundleFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => BundleFormat::Json,
            _ => BundleFormat::Atlas,
        }
    }
}

/// Decode the last object stored in `path`.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Element, BundleError> {
    let path = path.as_ref();
    let element = match BundleFormat::from_path(path) {
        BundleFormat::Atlas => {
            let file = File::open(path).map_err(|e| BundleError::io(path, e))?;
            codec::decode_reader(BufReader::new(file)).map_err(|source| BundleError::Codec {
                path: path.to_path_buf(),
                source,
            })?
        }
        BundleFormat::Json => {
            let text = fs::read_to_string(path).map_err(|e| BundleError::io(path, e))?;
            Some(json::parse_str(&text).map_err(|source| BundleError::Json {
                path: path.to_path_buf(),
                source,
            })?)
        }
    };
    match element {
        Some(Element::None) | None => Err(BundleError::NoObject {
            path: path.to_path_buf(),
        }),
        Some(element) => Ok(element),
    }
}

pub fn save_to_file(path: impl AsRef<Path>, element: &Element) -> Result<(), BundleError> {
    let path = path.as_ref();
    let text = match BundleFormat::from_path(path) {
        BundleFormat::Atlas => codec::encode_pretty(element),
        BundleFormat::Json => {
            json::to_string_pretty(element).map_err(|source| BundleError::Json {
                path: path.to_path_buf(),
                source,
            })?
        }
    };
    fs::write(path, text).map_err(|e| BundleError::io(path, e))
}

/// Summary of one bundle file, as listed by a directory index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortInfo {
    pub filename: PathBuf,
    pub name: String,
    pub description: Option<String>,
    pub entity_count: usize,
    pub rules_count: usize,
    pub minds_count: usize,
}
