//! CLI module for floodex
//!
//! Batch commands (`extent`, `layers`) walk the event catalog and keep a
//! resumable ledger; `index`, `status` and `config` are read-only helpers.

pub mod config;
pub mod context;
pub mod extent;
pub mod index;
pub mod layers;
pub mod output;
pub mod status;
