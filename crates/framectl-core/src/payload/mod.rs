//! Payload handling module.
//!
//! Provides block padding and chunking for framed images.

pub mod blocks;

pub use blocks::{BlockIterator, TransferPlan, chunks};
