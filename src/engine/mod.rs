//! Entry points: generate containers from a map, import translated
//! containers into an output folder, verify a map round-trips.

pub mod config;
pub mod generate;
pub mod merge;
pub mod reconcile;
pub mod verify;

pub use config::{init_default_config, EngineConfig, MergeOptions};
pub use generate::{generate, GenerateReport};
pub use merge::{import, import_bitext, MergeReport};
pub use verify::{verify_roundtrip, VerifyReport};
