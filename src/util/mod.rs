//! Utility types shared across the crate.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`BBox3d`] / [`Ray`] - Math types built on glam
//! - [`TimeCode`] - Ordered evaluation time

mod error;
mod math;
mod time_code;

pub use error::*;
pub use math::*;
pub use time_code::*;
