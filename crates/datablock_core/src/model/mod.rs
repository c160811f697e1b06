//! Data block domain model.
//!
//! # Responsibility
//! - Define the three independently stored sections of a data block.
//! - Define the client input schema validated at the request boundary.
//!
//! # Invariants
//! - Owner fields exist only in `PreservedSection` and are never parsed
//!   from client input.

pub mod data_block;
