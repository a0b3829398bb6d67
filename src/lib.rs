//! `mergemail` — command-line mail merge.
//!
//! This crate provides the core library: template rendering against CSV
//! records, compilation into multi-part transportable messages, and
//! rate-limited SMTP delivery.

pub mod config;
pub mod database;
pub mod deliver;
pub mod error;
pub mod message;
pub mod output;
pub mod sample;
pub mod template;
