pub mod blending;
pub mod neighbors;
pub mod rasterizer;
pub mod terrain;
pub mod terrain_editing;
pub mod tile_locator;
pub mod tiles;
