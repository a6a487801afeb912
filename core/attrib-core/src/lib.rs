//! # attrib-core
//!
//! Attributes editor changes to a human or an AI agent and records checkpoints
//! with the external `git-ai` tool.
//!
//! ## Design Principles
//!
//! - **Explicit construction**: one [`Coordinator`] owns all engine state; the
//!   producers receive a handle to it. No global lookups.
//! - **Synchronous**: std threads and channels, no async runtime.
//! - **Never fatal**: sink failures are logged and dropped; malformed input
//!   is ignored.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use attrib_core::{AttribConfig, Coordinator, GitAiSink, SignalDetector};
//! use std::sync::Arc;
//!
//! let config = AttribConfig::default();
//! let coordinator = Coordinator::spawn(
//!     config.timing,
//!     Box::new(GitAiSink::from_config(&config)),
//!     Vec::new(),
//! )?;
//! let detector = SignalDetector::new(config.detector.clone(), Arc::new(coordinator.handle()));
//! detector.observe("ToolUseEvent fsWrite {\"path\": \"/repo/a.rs\"}");
//! ```

pub mod config;
pub mod coordinator;
pub mod correlator;
pub mod detector;
pub mod error;
pub mod observers;
pub mod process;
pub mod sink;
pub mod stats;
pub mod types;

pub use config::{load_config, AttribConfig, TimingConfig};
pub use coordinator::{ActivityInput, Coordinator, CoordinatorHandle};
pub use correlator::Correlator;
pub use detector::SignalDetector;
pub use error::{AttribError, Result};
pub use observers::{CommandObserver, FileChangeObserver};
pub use sink::{CheckpointObserver, CheckpointSink, GitAiSink};
pub use stats::{CommitStats, RecentStats, StatsQuery};
pub use types::*;
