//! Configuration values grouped by section, with listeners that follow a
//! single `section.key` item.
//!
//! A [`ConfigService`] is a cheap handle; clones share the same values and
//! listeners. [`ConfigService::register`] returns a [`ConfigListener`] that
//! stays subscribed for as long as it is alive.

mod service;

pub use service::{ConfigError, ConfigListener, ConfigService, SettingChanged};
