//! Shader compilation orchestration.
//!
//! [`ShaderManager`] ties the backend selector to the two-tier cache, runs
//! asynchronous compiles on a thread pool, polls watched files for hot
//! reload and keeps running statistics. [`Shader`] is the stateful handle a
//! rendering layer holds on to.

#![warn(missing_docs)]

pub mod error;
pub mod manager;
pub mod precompile;
pub mod shader;
pub mod stats;
pub mod task;
pub mod watcher;

pub use error::ManagerError;
pub use manager::ShaderManager;
pub use precompile::{infer_stage, PrecompileReport};
pub use shader::{BindTarget, PipelineStage, Shader, ShaderState};
pub use stats::Statistics;
pub use task::CompileTask;
pub use watcher::{FileWatcher, WatchId};
