//! Procedural roads swept along Catmull-Rom control points and carved into
//! heightfield terrain tiles.

pub mod config;
pub mod errors;
pub mod helpers;
pub mod renderer;
pub mod world;
