//! Positional encodings.

pub mod sinusoidal;

pub use sinusoidal::{add_positional_encoding, sinusoidal_signal, MAX_TIMESCALE};
