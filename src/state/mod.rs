// src/state/mod.rs
//
// Declarative state layer.
//
// Structures here describe *what* a session is (presets, bands, config) and
// *what the UI sees* (engine snapshots). They are plain, serializable values;
// the engine reads them but never hands out mutable access.

mod band;
mod catalog;
mod config;
mod preset;
mod snapshot;

pub use band::*;
pub use catalog::*;
pub use config::*;
pub use preset::*;
pub use snapshot::*;
