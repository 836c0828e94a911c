//! Embedding crate
//!
//! Token lookup tables with a tied transposed readout, and the sinusoidal
//! positional signal added to embedded sequences.

pub mod positional;
pub mod token;

pub use positional::*;
pub use token::*;
