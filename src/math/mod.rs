//! Mathematical utilities and data structures

pub mod rect;
pub mod polyline;

pub use rect::NormRect;
pub use polyline::{Polyline, PolylineHit};
