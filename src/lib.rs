//! autopkg-runner - drive AutoPkg recipe runs with a download metadata cache
//!
//! Runs recipes one at a time, replays cached etag/last-modified metadata
//! as placeholder files so unchanged downloads are skipped, records fresh
//! metadata afterwards and reports new builds to Slack.

pub mod attrs;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod notify;
pub mod recipe;
pub mod report;

pub use error::{RunnerError, RunnerResult};
