//! Shared error definitions and helpers used across all vkbridge crates.

pub mod error;

pub use error::{Error, FromMessage, Result};
