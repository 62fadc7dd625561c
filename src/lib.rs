//! Deterministic test-script synthesis and transcript grading for
//! repository-replay task instances.
//!
//! The pipeline takes a task instance (repository, version, base commit and a
//! unified diff of its test files), decides which test commands the target
//! repository needs for exactly the files that diff touches, and wraps them in
//! three bash stages for clone, system setup and evaluation. After execution
//! the transcript comes back through [`log_parser`] and is graded into
//! per-test verdicts.
//!
//! Everything in this crate is pure with respect to its inputs: the same
//! instance and registry always produce byte-identical scripts, and the same
//! transcript always grades to the same verdicts.
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod instance;
pub mod log_parser;
pub mod script;
mod spec_catalog;
pub mod specs;
pub mod synthesis;
pub mod version;

pub use error::{Error, Result};
pub use instance::{TaskInstance, TestAsset};
pub use log_parser::{LogParserKind, TestReport, TestStatus, TranscriptCoverage, parse_transcript};
pub use script::{ScriptBuilder, ScriptPipeline};
pub use specs::{RepoSpec, SpecRegistry, TestCmd};
pub use synthesis::CommandSynthesizer;
