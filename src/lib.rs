//! permsync - directory group to console organization role reconciliation
//!
//! The library holds the reconciliation engine and its providers; the binary
//! wires them to configuration, the config watcher and the admin API.

pub mod console;
pub mod errors;
pub mod executor;
pub mod groups;
pub mod limiter;
pub mod matcher;
pub mod plan;
pub mod role;
pub mod rules;
pub mod settings;
pub mod sync;
pub mod watcher;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;
