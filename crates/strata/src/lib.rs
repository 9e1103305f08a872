//! Strata - Tiered memory store for LLM applications
//!
//! Records live in one of three tiers (core, warm, cold) chosen by category,
//! size and observed access patterns. A background scheduler migrates records
//! between tiers, and a fusion search layer combines lexical and vector
//! engines into one ranked list.

pub mod admin;
pub mod config;
pub mod error;
pub mod memory;
pub mod search;
pub mod storage;
pub mod testing;

pub use error::StrataError;
