pub mod path_sampler;
pub mod road_mesh_manager;
pub mod road_persistence;
pub mod road_structs;
pub mod road_subsystem;
pub mod spline;
