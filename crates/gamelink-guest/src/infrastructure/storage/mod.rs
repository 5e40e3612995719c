//! Storage infrastructure: the guest's configuration file.
//!
//! The guest only reads its configuration; there is no state to persist
//! between runs.

pub mod config;
