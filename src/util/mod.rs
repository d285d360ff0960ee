//! Utility functions and helpers

pub mod buffer;
pub mod time;
pub mod verification;
