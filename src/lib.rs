//! Waits for the CircleCI workflows of a commit to reach a terminal state.
//!
//! The [`providers::circleci`] module holds the API client and its paged list
//! iterators; [`wait`] holds the polling state machine; [`plugin`] validates
//! the plugin settings and dispatches the configured action.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod plugin;
pub mod providers;
pub mod wait;

pub use error::{CiWaitError, ErrorKind, Result};
