//! Task execution engine
//!
//! This module handles running tasks against targets: variable scoping and
//! interpolation, condition evaluation, verb dispatch, per-target task
//! execution, and the parallel multi-target dispatcher.

pub mod condition;
pub mod context;
pub mod dispatch;
pub mod interpolate;
pub mod scope;
pub mod task;
pub mod transport;
pub mod verb;

// Re-export main types
pub use condition::*;
pub use context::*;
pub use dispatch::*;
pub use interpolate::*;
pub use scope::*;
pub use task::*;
pub use transport::*;
