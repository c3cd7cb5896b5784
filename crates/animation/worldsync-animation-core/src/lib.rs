//! Worldsync Animation Core (backend-agnostic)
//!
//! A [`BehaviorSet`] names the motions that make up one behavior (idle,
//! locomotion, ...) and the reference skeleton they were authored for.
//! Asset storage, motion configuration and retargeting are delegated to an
//! [`AnimationBackend`] that adapters implement.

pub mod backend;
pub mod behavior;

pub use backend::{AnimationBackend, BehaviorError};
pub use behavior::{parse_behavior_json, BehaviorSet, BehaviorSetConfig, MotionConfig};
