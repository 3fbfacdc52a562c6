pub mod colour;
pub mod noise;
pub mod tiles;
pub mod landscape;
pub mod shapes;
pub mod model;
pub mod merge;
pub mod objects;
pub mod region_model;

pub use landscape::Landscape;

pub use model::Model;

pub use objects::{ObjectPlacer, PlacedObject};

pub use region_model::{CacheData, Region, RegionModel};
