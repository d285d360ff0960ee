//! Report output
//!
//! Text for terminals, JSON for scripts. Both render the same `F1Report`.

pub mod json;
pub mod text;
