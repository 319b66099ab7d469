//! Mapscape - heightmap terrain composition and object placement from map analysis

pub mod core;
pub mod math;
pub mod terrain;
pub mod placement;
pub mod analysis;
pub mod composition;
