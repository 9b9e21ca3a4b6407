//! Cortex Core - Types, traits, and error handling shared by every persona crate

pub mod error;
pub mod memory;
pub mod tier;
pub mod types;

pub use error::{Error, Result};
pub use memory::*;
pub use tier::*;
pub use types::*;
