//! Waffly post client.
//!
//! Image attachment reconciliation and presigned upload orchestration for
//! creating and editing board posts.

pub mod config;
pub mod posts;

pub use config::Config;
