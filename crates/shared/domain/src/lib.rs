//! # Domain Models
//!
//! Pure composition types shared by every Weave crate, with minimal dependencies
//! (`serde`, `serde_json`). Keep it lean: no I/O, no async, no registries.
//!
//! * [`capabilities`]: shared handle types for well-known capability keys.
//! * [`fassets`]: resolved capability values and the read-only capability map.
//! * [`intent`]: the immutable event type driving reducers and effect rules.
//! * [`config`]: serde models for composition, dispatch and logging settings.

pub mod capabilities;
pub mod config;
pub mod fassets;
pub mod intent;
pub mod pattern;
