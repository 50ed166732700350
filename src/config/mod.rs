//! Task-source parsing and target resolution
//!
//! Two grammar front-ends (the compact line grammar in `loader`, the full
//! grammar in `grammar`) normalize into the one statement model in `types`;
//! `hosts` resolves environment names and host specs into targets.

pub mod grammar;
pub mod hosts;
pub mod loader;
pub mod types;

// Re-export main types
pub use grammar::*;
pub use hosts::*;
pub use loader::*;
pub use types::*;
