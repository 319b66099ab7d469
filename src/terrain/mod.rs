//! Heightmap terrain: noise, grids, modifications and compositing

pub mod noise_field;
pub use noise_field::{NoiseField, NoiseParams};

pub mod grid;
pub use grid::HeightGrid;

pub mod modification;
pub use modification::{BlendMode, ModificationKind, ModificationShape, TerrainModification};

pub mod blender;
pub use blender::HeightmapBlender;

pub mod query;
pub use query::{GridTerrain, TerrainQuery};
