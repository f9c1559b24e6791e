//! Blocklist aggregation: fetch hosted domain lists, merge them into one set
//! in a shared cache, swap it in atomically and announce the change.

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod init;
pub mod mirror;
pub mod notify;
pub mod source;
pub mod stats;
pub mod trigger;
