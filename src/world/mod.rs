pub mod noise;
pub mod roads;
pub mod terrain;
