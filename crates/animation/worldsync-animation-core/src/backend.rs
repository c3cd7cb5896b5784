//! Backend trait and errors.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::MotionConfig;

#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("cannot load animation assets from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("behavior set {0:?} must be set up before retargeting")]
    NotSetUp(String),
    #[error("{kind} {name:?} is not loaded")]
    MissingAsset { kind: &'static str, name: String },
    #[error("animation backend error: {0}")]
    Backend(String),
    #[error("invalid behavior description: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Asset store and motion controller that behavior sets drive.
/// Adapters wrapping a concrete animation system implement this.
pub trait AnimationBackend {
    /// Load every skeleton and motion found under `path`.
    /// Returns how many assets were loaded.
    fn load_assets_from_path(&mut self, path: &Path) -> Result<usize, BehaviorError>;

    fn skeleton_exists(&self, name: &str) -> bool;

    fn motion_exists(&self, name: &str) -> bool;

    /// Bind a loaded motion to `skeleton` and apply its parameters.
    fn configure_motion(&mut self, motion: &MotionConfig, skeleton: &str)
        -> Result<(), BehaviorError>;

    /// Map motions authored for `source_skeleton` onto `target_skeleton`.
    fn retarget(&mut self, source_skeleton: &str, target_skeleton: &str)
        -> Result<(), BehaviorError>;
}
