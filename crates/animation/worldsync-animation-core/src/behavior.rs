//! Behavior sets: motions bound to a reference skeleton.

use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{AnimationBackend, BehaviorError};

/// Parameters applied to one motion when its behavior set is set up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    pub name: String,
    #[serde(default)]
    pub looping: bool,
    /// Playback speed multiplier.
    #[serde(default = "default_speed")]
    pub speed: f32,
}

fn default_speed() -> f32 {
    1.0
}

impl MotionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            looping: false,
            speed: default_speed(),
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }
}

/// Serializable description of a behavior set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSetConfig {
    pub name: String,
    /// Directory holding the set's skeleton and motion assets.
    pub motion_path: PathBuf,
    /// Skeleton the motions were authored for.
    pub skeleton: String,
    pub motions: Vec<MotionConfig>,
}

/// Parse a behavior set description from JSON.
pub fn parse_behavior_json(json: &str) -> Result<BehaviorSetConfig, BehaviorError> {
    Ok(serde_json::from_str(json)?)
}

#[derive(Debug)]
pub struct BehaviorSet {
    config: BehaviorSetConfig,
    setup: bool,
}

impl BehaviorSet {
    /// Load the set's assets into `backend`.
    pub fn load(
        config: BehaviorSetConfig,
        backend: &mut dyn AnimationBackend,
    ) -> Result<Self, BehaviorError> {
        let loaded = backend.load_assets_from_path(&config.motion_path)?;
        debug!(
            "behavior set {}: {loaded} assets loaded from {}",
            config.name,
            config.motion_path.display()
        );
        Ok(Self {
            config,
            setup: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn skeleton(&self) -> &str {
        &self.config.skeleton
    }

    pub fn motions(&self) -> &[MotionConfig] {
        &self.config.motions
    }

    pub fn is_setup(&self) -> bool {
        self.setup
    }

    /// Configure every motion for the reference skeleton, once.
    ///
    /// With `check`, nothing is configured unless the skeleton and all
    /// motions are loaded. Returns whether the set is set up afterwards.
    pub fn setup(
        &mut self,
        backend: &mut dyn AnimationBackend,
        check: bool,
    ) -> Result<bool, BehaviorError> {
        if self.setup {
            return Ok(true);
        }
        if check {
            if let Some(missing) = self.missing_asset(backend) {
                debug!("behavior set {} not set up: {missing}", self.config.name);
                return Ok(false);
            }
        }
        for motion in &self.config.motions {
            backend.configure_motion(motion, &self.config.skeleton)?;
        }
        self.setup = true;
        info!(
            "behavior set {} ready with {} motions",
            self.config.name,
            self.config.motions.len()
        );
        Ok(true)
    }

    /// First asset the set needs that `backend` does not have.
    pub fn missing_asset(&self, backend: &dyn AnimationBackend) -> Option<BehaviorError> {
        if !backend.skeleton_exists(&self.config.skeleton) {
            return Some(BehaviorError::MissingAsset {
                kind: "skeleton",
                name: self.config.skeleton.clone(),
            });
        }
        self.config
            .motions
            .iter()
            .find(|m| !backend.motion_exists(&m.name))
            .map(|m| BehaviorError::MissingAsset {
                kind: "motion",
                name: m.name.clone(),
            })
    }

    pub fn assets_exist(&self, backend: &dyn AnimationBackend) -> bool {
        self.missing_asset(backend).is_none()
    }

    /// Retarget the set's motions onto `target_skeleton`.
    pub fn retarget(
        &self,
        backend: &mut dyn AnimationBackend,
        target_skeleton: &str,
    ) -> Result<(), BehaviorError> {
        if !self.setup {
            return Err(BehaviorError::NotSetUp(self.config.name.clone()));
        }
        backend.retarget(&self.config.skeleton, target_skeleton)
    }
}
