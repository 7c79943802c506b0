//! Core library for the flashops operator console.
//!
//! This crate holds everything that is not a thin I/O wrapper: the durable
//! operation ledger, the typed record model, the materialized configuration
//! views derived from ledger history, and the recovery engine that restores a
//! redeployed protocol instance from that history.
//!
//! # Architecture
//!
//! ```text
//! ChainClient (trait) ----+
//!                         |
//! LedgerStore --> OperationRecorder --> LedgerDocument (operations.json)
//!                         |                    |
//!                         +--> RecoveryEngine <+-- view (latest-wins replay set)
//! ```
//!
//! The store exclusively owns the on-disk document; every other component
//! works on an in-memory copy and writes it back through [`store::LedgerStore::save`].

pub mod chain;
pub mod config;
pub mod recorder;
pub mod records;
pub mod recovery;
pub mod retry;
pub mod store;
pub mod view;
