//! Round-trip localization of DITA maps through XLIFF 1.2.
//!
//! [`engine::generate`] cuts a map and everything it references into
//! translation units; [`engine::import`] rebuilds the documents from a
//! translated container and folds the map into whatever an earlier merge
//! left in the same output folder.

pub mod config;
pub mod dita;
pub mod engine;
pub mod errors;
pub mod ir;
pub mod progress;
pub mod project;
pub mod sentinels;
pub mod textutil;
pub mod xliff;
