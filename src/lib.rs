//! fatbin - package a directory into a single self-extracting executable
//!
//! fatbin turns a directory tree (a program plus its supporting files) into
//! one archive. The archive can stand alone or be appended to a copy of the
//! fatbin executable itself, producing a binary that unpacks into a
//! temporary directory and runs the packaged program.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │  fatbin CLI (build, run, self-extraction)       │
//! ├─────────────────────────────────────────────────┤
//! │  RunSession + Launcher (temp root, child)       │
//! ├─────────────────────────────────────────────────┤
//! │  fatbin-pack (tree, codec, packer, extractor,   │
//! │  locator)                                       │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use fatbin::{build, BuildConfig, HostMode};
//!
//! let mut config = BuildConfig::new("dist", "app");
//! config.output = "app.fbin".into();
//! config.host = HostMode::None;
//!
//! let info = build(&config).unwrap();
//! println!("wrote {} files", info.files);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod build;
pub mod config;
pub mod error;
pub mod launcher;
pub mod run;
pub mod session;

// Re-export main types for convenience
pub use build::build;
pub use config::{BuildConfig, HostMode, RunConfig};
pub use error::{Error, Result};
pub use launcher::{exit_code, launch};
pub use run::{inspect, run, run_located};
pub use session::RunSession;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
