//! Portable, exact implementation of scaled dot-product attention.
//!
//! This path favours clarity over absolute performance.

pub mod exact;

pub use exact::ExactAttention;
