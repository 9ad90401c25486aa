pub mod gpu_carve;
