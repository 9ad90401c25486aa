//! wgpu compute backend for the terrain carver. One dispatch over the canvas, one
//! blocking read-back; the host then runs the shared stylize/feather/weight stages.

use crate::config::TerrainConfig;
use crate::errors::CarveError;
use crate::world::roads::road_mesh_manager::RoadGeometry;
use crate::world::terrain::rasterizer::{CanvasGrid, CellRecord};
use bytemuck::{Pod, Zeroable};
use std::sync::mpsc;
use std::time::Duration;
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::wgt::PollType;
use wgpu::{
    Backends, BindGroupLayout, Buffer, BufferUsages, ComputePipeline, Device, DeviceDescriptor,
    ExperimentalFeatures, Features, Instance, InstanceDescriptor, Limits, MapMode, MemoryHints,
    PowerPreference, Queue, RequestAdapterOptions, Trace,
};

const WORKGROUP: u32 = 8;
const READBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CarveParams {
    origin: [f32; 2],
    cell: [f32; 2],
    width: u32,
    depth: u32,
    sample_count: u32,
    layer_count: u32,
    lowered: f32,
    strength: f32,
    _pad: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuSample {
    position: [f32; 4],
    right: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuSpan {
    inner_left: f32,
    outer_left: f32,
    inner_right: f32,
    outer_right: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GpuLayer {
    vertical_offset: f32,
    blend_strength: f32,
    _pad: [f32; 2],
}

pub struct GpuCarver {
    device: Device,
    queue: Queue,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    adapter_name: String,
}

impl GpuCarver {
    /// Headless device with the carve pipeline compiled. No adapter, no device.
    pub fn new() -> Result<Self, CarveError> {
        let instance = Instance::new(&InstanceDescriptor {
            backends: Backends::all(),
            flags: Default::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| CarveError::backend(format!("no suitable adapter: {e}")))?;
        let adapter_name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("road_carve_device"),
            required_features: Features::empty(),
            required_limits: Limits::default(),
            experimental_features: ExperimentalFeatures::disabled(),
            memory_hints: MemoryHints::default(),
            trace: Trace::Off,
        }))
        .map_err(|e| CarveError::backend(format!("device request failed: {e}")))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("road_carve.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/road_carve.wgsl").into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("road_carve_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(1, true),
                storage(2, true),
                storage(3, true),
                storage(4, true),
                storage(5, false),
                storage(6, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("road_carve_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("road_carve_pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        log::info!("gpu carver ready on '{adapter_name}'");
        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            adapter_name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Fill `grid.records` and blend `grid.heights` on the GPU.
    pub fn carve(
        &mut self,
        grid: &mut CanvasGrid,
        geometry: &RoadGeometry,
        terrain: &TerrainConfig,
    ) -> Result<(), CarveError> {
        let cells = grid.canvas.len();
        if cells == 0 {
            return Ok(());
        }

        let params = CarveParams {
            origin: grid.canvas.origin.to_array(),
            cell: grid.canvas.cell.to_array(),
            width: grid.canvas.width as u32,
            depth: grid.canvas.depth as u32,
            sample_count: geometry.path.len() as u32,
            layer_count: geometry.layers.len() as u32,
            // path samples carry no preview lift, so only the flatten offset applies
            lowered: terrain.flatten_offset,
            strength: terrain.flatten_strength.clamp(0.0, 1.0),
            _pad: [0.0; 2],
        };

        let samples: Vec<GpuSample> = geometry
            .path
            .iter()
            .map(|p| GpuSample {
                position: p.position.extend(p.arc_length).to_array(),
                right: p.right.extend(0.0).to_array(),
            })
            .collect();
        let spans: Vec<GpuSpan> = geometry
            .spans
            .iter()
            .map(|s| GpuSpan {
                inner_left: s.inner_left,
                outer_left: s.outer_left,
                inner_right: s.inner_right,
                outer_right: s.outer_right,
            })
            .collect();
        let layers: Vec<GpuLayer> = geometry
            .layers
            .iter()
            .map(|l| GpuLayer {
                vertical_offset: l.vertical_offset,
                blend_strength: l.blend_strength,
                _pad: [0.0; 2],
            })
            .collect();

        let params_buf = self.init_buffer(
            "carve_params",
            bytemuck::bytes_of(&params),
            BufferUsages::UNIFORM,
        );
        let samples_buf = self.storage_input("carve_samples", &samples);
        let spans_buf = self.storage_input("carve_spans", &spans);
        let layers_buf = self.storage_input("carve_layers", &layers);
        let heights_in = self.storage_input("carve_heights_in", &grid.heights);

        let records_size = (cells * size_of::<CellRecord>()) as u64;
        let heights_size = (cells * size_of::<f32>()) as u64;
        let records_out = self.output_buffer("carve_records", records_size);
        let heights_out = self.output_buffer("carve_heights_out", heights_size);
        let records_read = self.readback_buffer("carve_records_read", records_size);
        let heights_read = self.readback_buffer("carve_heights_read", heights_size);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("road_carve_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                entry(0, &params_buf),
                entry(1, &samples_buf),
                entry(2, &spans_buf),
                entry(3, &layers_buf),
                entry(4, &heights_in),
                entry(5, &records_out),
                entry(6, &heights_out),
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("road_carve_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("road_carve_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                params.width.div_ceil(WORKGROUP),
                params.depth.div_ceil(WORKGROUP),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&records_out, 0, &records_read, 0, records_size);
        encoder.copy_buffer_to_buffer(&heights_out, 0, &heights_read, 0, heights_size);
        self.queue.submit(Some(encoder.finish()));

        grid.records = self.read_back::<CellRecord>(&records_read)?;
        grid.heights = self.read_back::<f32>(&heights_read)?;
        if grid.records.len() != cells || grid.heights.len() != cells {
            return Err(CarveError::readback(format!(
                "expected {cells} cells, got {} records and {} heights",
                grid.records.len(),
                grid.heights.len()
            )));
        }

        log::debug!("gpu carve: {} cells, {} set", cells, grid.set_count());
        Ok(())
    }

    fn init_buffer(&self, label: &str, contents: &[u8], usage: BufferUsages) -> Buffer {
        self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }

    /// Empty inputs still get one zeroed element; zero-sized bindings are invalid.
    fn storage_input<T: Pod>(&self, label: &str, data: &[T]) -> Buffer {
        let zero = [T::zeroed()];
        let data = if data.is_empty() { &zero[..] } else { data };
        self.init_buffer(label, bytemuck::cast_slice(data), BufferUsages::STORAGE)
    }

    fn output_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    fn readback_buffer(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn read_back<T: Pod>(&self, buffer: &Buffer) -> Result<Vec<T>, CarveError> {
        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(MapMode::Read, move |res| {
            let _ = tx.send(res);
        });

        self.device
            .poll(PollType::Wait {
                submission_index: None,
                timeout: Some(READBACK_TIMEOUT),
            })
            .map_err(|e| CarveError::readback(format!("device poll: {e:?}")))?;

        rx.recv()
            .map_err(|_| CarveError::readback("map callback dropped"))?
            .map_err(|e| CarveError::readback(format!("buffer map: {e}")))?;

        let data = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, T>(&view).to_vec()
        };
        buffer.unmap();
        Ok(data)
    }
}

fn entry(binding: u32, buffer: &Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoadConfig;
    use crate::world::roads::road_mesh_manager::build_road_geometry;
    use crate::world::roads::road_structs::{ControlPoint, LayerProfile};
    use crate::world::terrain::tile_locator::VirtualCanvas;
    use glam::{Mat4, Vec2, Vec3};

    #[test]
    fn gpu_matches_cpu_on_a_straight_road() {
        let mut gpu = match GpuCarver::new() {
            Ok(gpu) => gpu,
            Err(e) => {
                eprintln!("skipping gpu test: {e}");
                return;
            }
        };

        let points = vec![
            ControlPoint::new(Vec3::new(2.0, 10.0, 16.0)),
            ControlPoint::new(Vec3::new(30.0, 10.0, 16.0)),
        ];
        let mut layers = vec![
            LayerProfile::new("asphalt", 2.0, "asphalt"),
            LayerProfile::new("gravel", 2.0, "gravel"),
        ];
        layers[0].vertical_offset = 0.3;
        let road = RoadConfig {
            resolution: 16,
            preview_height_offset: 0.5,
            ..Default::default()
        };
        let terrain = TerrainConfig {
            feather_width: 0.0,
            ..Default::default()
        };
        let geometry = build_road_geometry(&points, &layers, &road, Mat4::IDENTITY, None);
        let canvas = VirtualCanvas {
            origin: Vec2::ZERO,
            cell: Vec2::ONE,
            width: 33,
            depth: 33,
        };

        let mut cpu_grid = CanvasGrid::empty(canvas);
        cpu_grid.heights.fill(30.0);
        cpu_grid.covered.fill(true);
        let mut gpu_grid = cpu_grid.clone();

        cpu_grid.rasterize(&geometry, &road, &terrain);
        cpu_grid.flatten(terrain.flatten_strength);
        gpu.carve(&mut gpu_grid, &geometry, &terrain).unwrap();

        // centerline and well inside the gravel band agree
        for (x, z, layer) in [(16, 16, 0), (10, 15, 0), (20, 19, 1), (8, 13, 1)] {
            let i = canvas.index(x, z);
            assert!(gpu_grid.records[i].is_set(), "gpu missed ({x}, {z})");
            assert_eq!(gpu_grid.records[i].layer, cpu_grid.records[i].layer);
            assert_eq!(gpu_grid.records[i].layer, layer);
            assert!((gpu_grid.records[i].height - cpu_grid.records[i].height).abs() < 1e-3);
            assert!((gpu_grid.heights[i] - cpu_grid.heights[i]).abs() < 1e-3);
        }
        // the preview lift never reaches the terrain
        let center = canvas.index(16, 16);
        let expected = 10.0 + 0.3 - terrain.flatten_offset;
        assert!((gpu_grid.records[center].height - expected).abs() < 1e-3);
        // far from the road nothing changes
        let far = canvas.index(16, 2);
        assert!(!gpu_grid.records[far].is_set());
        assert_eq!(gpu_grid.heights[far], 30.0);
    }
}
