// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::conversions::IntoWgpu;
use super::params::{DrawParameters, ParameterTable, TextureSource, TEXTURE_UNITS};
use anyhow::{anyhow, Result};
use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::api::*;
use lumen_core::renderer::{
    GraphicsBackend, PipelineError, RenderError, ResourceError, ShaderError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wgpu::util::DeviceExt;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Bytes per vertex: one `vec3<f32>` position at location 0.
const VERTEX_STRIDE: wgpu::BufferAddress = 12;
const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x3,
    offset: 0,
    shader_location: 0,
}];

/// Number of blocks a uniform ring holds before it grows.
const INITIAL_UNIFORM_SLOTS: u64 = 64;
/// Number of matrices the palette buffer holds before it grows.
const INITIAL_PALETTE_MATRICES: u64 = 256;
const MATRIX_SIZE: u64 = std::mem::size_of::<Mat4>() as u64;

#[derive(Debug)]
struct ShaderStageEntry {
    module: wgpu::ShaderModule,
    entry_point: String,
}

#[derive(Debug)]
struct GeometryEntry {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

#[derive(Debug)]
struct TextureEntry {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// A pipeline state compiled for one raster state and one depth bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VariantKey {
    pipeline: PipelineStateId,
    raster: RasterState,
    /// `(slope factor bits, constant units)`, or `None` without depth bias.
    depth_bias: Option<(u32, i32)>,
}

#[derive(Debug)]
struct RecordedDraw {
    variant: VariantKey,
    vertex_buffer: VertexBufferId,
    indices: std::ops::Range<u32>,
    uniform_offset: u32,
    parameters_offset: u32,
    textures: [TextureSource; TEXTURE_UNITS],
}

/// Blocks of one size for the whole frame, bound with dynamic offsets.
#[derive(Debug)]
struct UniformRing {
    label: &'static str,
    buffer: wgpu::Buffer,
    block_size: u64,
    capacity: u64,
    alignment: u64,
    staging: Vec<u8>,
}

impl UniformRing {
    fn new(device: &wgpu::Device, label: &'static str, block_size: u64) -> Self {
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let capacity = block_size.next_multiple_of(alignment) * INITIAL_UNIFORM_SLOTS;
        Self {
            label,
            buffer: Self::allocate(device, label, capacity),
            block_size,
            capacity,
            alignment,
            staging: Vec::new(),
        }
    }

    fn allocate(device: &wgpu::Device, label: &str, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Appends a block and returns its dynamic offset.
    fn push(&mut self, block: &[u8]) -> Result<u32, RenderError> {
        let offset = (self.staging.len() as u64).next_multiple_of(self.alignment);
        let offset_u32 = u32::try_from(offset)
            .map_err(|_| RenderError::Internal(format!("{} ring overflow", self.label)))?;
        self.staging.resize(offset as usize, 0);
        self.staging.extend_from_slice(block);
        Ok(offset_u32)
    }

    /// Uploads the frame's blocks. Returns `true` when the buffer was replaced.
    fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let needed = self.staging.len() as u64;
        if needed == 0 {
            return false;
        }
        let grew = needed > self.capacity;
        if grew {
            let capacity = needed.next_power_of_two();
            log::debug!(
                "Growing {} from {} to {} bytes",
                self.label,
                self.capacity,
                capacity
            );
            self.buffer = Self::allocate(device, self.label, capacity);
            self.capacity = capacity;
        }
        queue.write_buffer(&self.buffer, 0, &self.staging);
        grew
    }

    fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(self.block_size),
        })
    }

    fn reset(&mut self) {
        self.staging.clear();
    }
}

/// Skinning matrices of every draw in the frame, in one storage buffer.
#[derive(Debug)]
struct PaletteBuffer {
    buffer: wgpu::Buffer,
    capacity: u64,
    staging: Vec<Mat4>,
}

impl PaletteBuffer {
    fn new(device: &wgpu::Device) -> Self {
        let capacity = INITIAL_PALETTE_MATRICES * MATRIX_SIZE;
        Self {
            buffer: Self::allocate(device, capacity),
            capacity,
            staging: Vec::new(),
        }
    }

    fn allocate(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lumen Matrix Palette"),
            size: capacity,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Appends `matrices` and returns the index of the first one.
    fn push(&mut self, matrices: &[Mat4]) -> Result<u32, RenderError> {
        let base = u32::try_from(self.staging.len())
            .map_err(|_| RenderError::Internal("Matrix palette overflow".to_string()))?;
        self.staging.extend_from_slice(matrices);
        Ok(base)
    }

    fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let needed = self.staging.len() as u64 * MATRIX_SIZE;
        if needed == 0 {
            return false;
        }
        let grew = needed > self.capacity;
        if grew {
            let capacity = needed.next_power_of_two();
            log::debug!("Growing matrix palette from {} to {capacity} bytes", self.capacity);
            self.buffer = Self::allocate(device, capacity);
            self.capacity = capacity;
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&self.staging));
        grew
    }

    fn reset(&mut self) {
        self.staging.clear();
    }
}

/// Group 0: the per-object block, the parameter block and the matrix palette.
#[derive(Debug)]
struct FrameBindings {
    layout: wgpu::BindGroupLayout,
    per_object: UniformRing,
    parameters: UniformRing,
    palette: PaletteBuffer,
    bind_group: wgpu::BindGroup,
}

impl FrameBindings {
    fn new(device: &wgpu::Device) -> Self {
        let per_object_size = std::mem::size_of::<PerObjectUniforms>() as u64;
        let parameters_size = std::mem::size_of::<DrawParameters>() as u64;
        let uniform = |binding: u32, size: u64| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(size),
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lumen Frame Layout"),
            entries: &[
                uniform(0, per_object_size),
                uniform(1, parameters_size),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(MATRIX_SIZE),
                    },
                    count: None,
                },
            ],
        });
        let per_object = UniformRing::new(device, "Lumen Per-Object Uniforms", per_object_size);
        let parameters = UniformRing::new(device, "Lumen Draw Parameters", parameters_size);
        let palette = PaletteBuffer::new(device);
        let bind_group =
            Self::create_bind_group(device, &layout, &per_object, &parameters, &palette);
        Self {
            layout,
            per_object,
            parameters,
            palette,
            bind_group,
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        per_object: &UniformRing,
        parameters: &UniformRing,
        palette: &PaletteBuffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lumen Frame Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: per_object.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: parameters.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: palette.buffer.as_entire_binding(),
                },
            ],
        })
    }

    fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        // Every buffer is flushed; any replacement invalidates the bind group.
        let grew = self.per_object.flush(device, queue)
            | self.parameters.flush(device, queue)
            | self.palette.flush(device, queue);
        if grew {
            self.bind_group = Self::create_bind_group(
                device,
                &self.layout,
                &self.per_object,
                &self.parameters,
                &self.palette,
            );
        }
    }

    fn reset(&mut self) {
        self.per_object.reset();
        self.parameters.reset();
        self.palette.reset();
    }
}

/// Group 1: [`TEXTURE_UNITS`] sampled textures followed by one sampler.
#[derive(Debug)]
struct TextureBindings {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fallback: TextureEntry,
    textures: HashMap<TextureId, TextureEntry>,
    render_textures: HashMap<RenderTextureId, TextureEntry>,
    groups: HashMap<[TextureSource; TEXTURE_UNITS], wgpu::BindGroup>,
}

impl TextureBindings {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..TEXTURE_UNITS as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: TEXTURE_UNITS as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lumen Texture Layout"),
            entries: &entries,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Lumen Linear Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let fallback = upload_rgba8(device, queue, "Lumen Fallback Texture", 1, 1, &[255; 4]);
        Self {
            layout,
            sampler,
            fallback,
            textures: HashMap::new(),
            render_textures: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    fn view(&self, source: TextureSource) -> Result<&wgpu::TextureView, ResourceError> {
        let entry = match source {
            TextureSource::Fallback => Some(&self.fallback),
            TextureSource::Texture(id) => self.textures.get(&id),
            TextureSource::RenderTexture(id) => self.render_textures.get(&id),
        };
        entry.map(|entry| &entry.view).ok_or(ResourceError::NotFound)
    }

    /// Makes sure a bind group exists for `units`.
    fn prepare(
        &mut self,
        device: &wgpu::Device,
        units: &[TextureSource; TEXTURE_UNITS],
    ) -> Result<(), ResourceError> {
        if self.groups.contains_key(units) {
            return Ok(());
        }
        let mut entries = Vec::with_capacity(TEXTURE_UNITS + 1);
        for (binding, &source) in units.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(self.view(source)?),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: TEXTURE_UNITS as u32,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        });
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lumen Texture Bind Group"),
            layout: &self.layout,
            entries: &entries,
        });
        self.groups.insert(*units, group);
        Ok(())
    }
}

fn upload_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    texels: &[u8],
) -> TextureEntry {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        texels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureEntry {
        _texture: texture,
        view,
    }
}

/// A [`GraphicsBackend`] that renders into an off-screen color and depth target.
///
/// Geometry and shader stages are registered up front through
/// [`WgpuBackend::create_vertex_buffer`] and [`WgpuBackend::register_shader_stage`].
/// Draws are recorded on the CPU and replayed inside a single render pass at
/// [`GraphicsBackend::submit`].
///
/// Shaders see this binding model:
///
/// * group 0, binding 0: the per-object block, at a dynamic offset.
/// * group 0, binding 1: the draw's parameter block, at a dynamic offset. Each
///   name passed to [`WgpuBackend::declare_parameter`] owns one `vec4<f32>` slot.
/// * group 0, binding 2: the frame's matrix palette as `array<mat4x4<f32>>`.
/// * group 1, bindings `0..TEXTURE_UNITS`: 2D textures by unit, then a sampler.
///
/// Parameters reset on every `use_shader`. Values for undeclared names are
/// dropped with a warning.
#[derive(Debug)]
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    _color_target: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth_target: wgpu::Texture,
    depth_view: wgpu::TextureView,
    pipeline_layout: wgpu::PipelineLayout,
    frame: FrameBindings,
    texture_bindings: TextureBindings,
    parameters: ParameterTable,
    shader_stages: HashMap<ShaderStageId, ShaderStageEntry>,
    geometry: HashMap<VertexBufferId, GeometryEntry>,
    pipelines: HashMap<PipelineStateId, PipelineStateDescriptor>,
    variants: HashMap<VariantKey, wgpu::RenderPipeline>,
    texel_buffers: HashMap<GpuBufferId, wgpu::Buffer>,
    next_id: usize,
    draws: Vec<RecordedDraw>,
    current_uniform_offset: Option<u32>,
    pending_clear: Option<([f32; 4], f32)>,
    depth_bias: Option<(f32, f32)>,
    supports_line_mode: bool,
    next_fence: u64,
    device_error: Arc<AtomicBool>,
    released: bool,
}

impl WgpuBackend {
    /// Creates a backend and its `width` x `height` off-screen targets.
    ///
    /// Blocks on adapter and device creation.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::new_async(width, height))
    }

    async fn new_async(width: u32, height: u32) -> Result<Self> {
        log::info!("Initializing WGPU backend ({width}x{height}, off-screen)...");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("Failed to find a suitable adapter: {}", e))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        let wanted_features = wgpu::Features::POLYGON_MODE_LINE;
        let features_to_enable = adapter.features() & wanted_features;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Lumen Logical Device"),
                required_features: features_to_enable,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::info!("Logical device and command queue created.");

        let device_error = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::clone(&device_error);
        device.on_uncaptured_error(Box::new(move |e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
            error_flag.store(true, Ordering::Release);
        }));

        let supports_line_mode = device.features().contains(wgpu::Features::POLYGON_MODE_LINE);
        if !supports_line_mode {
            log::warn!("Adapter lacks POLYGON_MODE_LINE; wireframe draws will be filled.");
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color_target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Lumen Backbuffer"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth_target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Lumen Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color_target.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth_target.create_view(&wgpu::TextureViewDescriptor::default());

        let frame = FrameBindings::new(&device);
        let texture_bindings = TextureBindings::new(&device, &queue);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lumen Pipeline Layout"),
            bind_group_layouts: &[&frame.layout, &texture_bindings.layout],
            push_constant_ranges: &[],
        });

        Ok(Self {
            device,
            queue,
            width,
            height,
            _color_target: color_target,
            color_view,
            _depth_target: depth_target,
            depth_view,
            pipeline_layout,
            frame,
            texture_bindings,
            parameters: ParameterTable::default(),
            shader_stages: HashMap::new(),
            geometry: HashMap::new(),
            pipelines: HashMap::new(),
            variants: HashMap::new(),
            texel_buffers: HashMap::new(),
            next_id: 0,
            draws: Vec::new(),
            current_uniform_offset: None,
            pending_clear: None,
            depth_bias: None,
            supports_line_mode,
            next_fence: 0,
            device_error,
            released: false,
        })
    }

    fn generate_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Compiles a WGSL module and registers one of its entry points as a stage.
    pub fn register_shader_stage(
        &mut self,
        label: &str,
        wgsl: &str,
        entry_point: &str,
    ) -> ShaderStageId {
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(wgsl.to_owned().into()),
        });
        let id = ShaderStageId(self.generate_id());
        self.shader_stages.insert(
            id,
            ShaderStageEntry {
                module,
                entry_point: entry_point.to_owned(),
            },
        );
        log::debug!("WgpuBackend: Registered shader stage '{label}::{entry_point}' as {id:?}");
        id
    }

    /// Gives `name` a slot in the parameter block and returns its index.
    ///
    /// Declaring a name twice returns the same slot.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If every slot is taken.
    pub fn declare_parameter(&mut self, name: &str) -> Result<u32, ResourceError> {
        let slot = self.parameters.declare(name)?;
        log::debug!("WgpuBackend: Parameter '{name}' uses slot {slot}");
        Ok(slot)
    }

    /// Uploads a `width` x `height` RGBA8 image as a sampled 2D texture.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If `texels` is not `width * height * 4` bytes.
    pub fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        texels: &[u8],
    ) -> Result<TextureId, ResourceError> {
        let expected = u64::from(width) * u64::from(height) * 4;
        if expected == 0 || texels.len() as u64 != expected {
            return Err(ResourceError::OutOfBounds);
        }
        let entry = upload_rgba8(&self.device, &self.queue, "Lumen Texture", width, height, texels);
        let id = TextureId(self.generate_id());
        self.texture_bindings.textures.insert(id, entry);
        log::debug!("WgpuBackend: Created {width}x{height} texture {id:?}");
        Ok(id)
    }

    /// Creates a 2D render target that draws can sample.
    pub fn create_render_texture(&mut self, width: u32, height: u32) -> RenderTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Lumen Render Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = RenderTextureId(self.generate_id());
        self.texture_bindings.render_textures.insert(
            id,
            TextureEntry {
                _texture: texture,
                view,
            },
        );
        log::debug!("WgpuBackend: Created {width}x{height} render texture {id:?}");
        RenderTexture::new_2d(id, width, height)
    }

    /// Uploads positions and 32-bit triangle indices as one piece of geometry.
    pub fn create_vertex_buffer(
        &mut self,
        positions: &[[f32; 3]],
        indices: &[u32],
    ) -> VertexBufferId {
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Lumen Vertices"),
                contents: bytemuck::cast_slice(positions),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Lumen Indices"),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = VertexBufferId(self.generate_id());
        self.geometry.insert(
            id,
            GeometryEntry {
                vertices,
                indices: index_buffer,
                index_count: indices.len() as u32,
            },
        );
        log::debug!(
            "WgpuBackend: Created vertex buffer {id:?} ({} vertices, {} indices)",
            positions.len(),
            indices.len()
        );
        id
    }

    fn stage(&self, id: ShaderStageId) -> Result<&ShaderStageEntry, PipelineError> {
        self.shader_stages
            .get(&id)
            .ok_or_else(|| ShaderError::StageNotFound { id }.into())
    }

    fn build_variant(
        &self,
        descriptor: &PipelineStateDescriptor,
        variant: &VariantKey,
    ) -> Result<wgpu::RenderPipeline, PipelineError> {
        let key = &descriptor.key;
        let vertex_stage = self.stage(key.vertex_stage)?;
        let pixel_stage = self.stage(key.pixel_stage)?;

        let polygon_mode = match variant.raster.fill_mode {
            FillMode::Wireframe if !self.supports_line_mode => wgpu::PolygonMode::Fill,
            fill => fill.into_wgpu(),
        };

        let bias = match variant.depth_bias {
            Some((factor_bits, units)) => wgpu::DepthBiasState {
                constant: units,
                slope_scale: f32::from_bits(factor_bits),
                clamp: 0.0,
            },
            None => wgpu::DepthBiasState::default(),
        };

        let vertex_layouts = [wgpu::VertexBufferLayout {
            array_stride: VERTEX_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        }];
        let color_targets = [Some(wgpu::ColorTargetState {
            format: COLOR_FORMAT,
            blend: key.blend_mode.into_wgpu(),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_stage.module,
                    entry_point: Some(vertex_stage.entry_point.as_str()),
                    buffers: &vertex_layouts,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &pixel_stage.module,
                    entry_point: Some(pixel_stage.entry_point.as_str()),
                    targets: &color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: variant.raster.topology.into_wgpu(),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: variant.raster.cull_mode.into_wgpu(),
                    polygon_mode,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: key.depth_func.write_enabled(),
                    depth_compare: key.depth_func.into_wgpu(),
                    stencil: wgpu::StencilState::default(),
                    bias,
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        Ok(pipeline)
    }

    fn current_depth_bias(&self) -> Option<(u32, i32)> {
        self.depth_bias
            .map(|(factor, units)| (factor.to_bits(), units as i32))
    }

    fn encode_frame(&mut self) -> wgpu::CommandEncoder {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Lumen Frame Encoder"),
            });

        let clear = self.pending_clear.take();
        if clear.is_none() && self.draws.is_empty() {
            return encoder;
        }

        let (color_load, depth_load) = match clear {
            Some((color, depth)) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(color[0]),
                    g: f64::from(color[1]),
                    b: f64::from(color[2]),
                    a: f64::from(color[3]),
                }),
                wgpu::LoadOp::Clear(depth),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lumen Main Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for draw in &self.draws {
            let (Some(pipeline), Some(geometry)) = (
                self.variants.get(&draw.variant),
                self.geometry.get(&draw.vertex_buffer),
            ) else {
                log::warn!("Skipping draw with a released pipeline or vertex buffer");
                continue;
            };
            let Some(textures) = self.texture_bindings.groups.get(&draw.textures) else {
                log::warn!("Skipping draw without a texture bind group");
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(
                0,
                &self.frame.bind_group,
                &[draw.uniform_offset, draw.parameters_offset],
            );
            pass.set_bind_group(1, textures, &[]);
            pass.set_vertex_buffer(0, geometry.vertices.slice(..));
            pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(draw.indices.clone(), 0, 0..1);
        }
        drop(pass);
        encoder
    }
}

impl GraphicsBackend for WgpuBackend {
    fn backbuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_pipeline_state(
        &mut self,
        descriptor: &PipelineStateDescriptor,
    ) -> Result<PipelineStateId, PipelineError> {
        if !self.geometry.contains_key(&descriptor.key.vertex_buffer) {
            return Err(PipelineError::CompilationFailed {
                label: descriptor.label.clone(),
                details: format!("unknown vertex buffer {:?}", descriptor.key.vertex_buffer),
            });
        }
        let id = PipelineStateId(self.generate_id());
        let variant = VariantKey {
            pipeline: id,
            raster: descriptor.raster,
            depth_bias: None,
        };
        let pipeline = self.build_variant(descriptor, &variant)?;
        self.variants.insert(variant, pipeline);
        self.pipelines.insert(id, descriptor.clone());
        log::info!(
            "WgpuBackend: Created pipeline state '{}' with ID: {:?}",
            descriptor.label.as_deref().unwrap_or("Unnamed"),
            id
        );
        Ok(id)
    }

    fn destroy_pipeline_state(&mut self, id: PipelineStateId) -> Result<(), ResourceError> {
        self.pipelines.remove(&id).ok_or(ResourceError::NotFound)?;
        self.variants.retain(|variant, _| variant.pipeline != id);
        log::debug!("WgpuBackend: Destroyed pipeline state with ID: {id:?}");
        Ok(())
    }

    fn transition_backbuffer(&mut self, from: BackbufferState, to: BackbufferState) {
        // wgpu tracks texture usage itself.
        log::trace!("Backbuffer {from:?} -> {to:?}");
    }

    fn set_viewport_and_scissor(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            log::warn!(
                "Viewport {width}x{height} differs from the {}x{} target; using the full target",
                self.width,
                self.height
            );
        }
    }

    fn clear_and_bind_backbuffer(&mut self, color: [f32; 4], depth: f32) {
        if !self.draws.is_empty() {
            log::warn!(
                "Clear requested after {} recorded draws; they will be cleared",
                self.draws.len()
            );
            self.draws.clear();
        }
        self.pending_clear = Some((color, depth));
    }

    fn use_shader(&mut self, program: &ShaderProgram) {
        log::trace!("use_shader {:?}", program.label);
        self.parameters.clear();
    }

    fn set_int(&mut self, name: &str, value: i32) {
        self.parameters.set_int(name, value);
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.parameters.set_float(name, value);
    }

    fn set_vector3(&mut self, name: &str, value: Vec3) {
        self.parameters.set_vector3(name, value);
    }

    fn set_matrix_array(&mut self, name: &str, matrices: &[Mat4]) {
        self.parameters.set_matrix_array(name, matrices);
    }

    fn set_texture(&mut self, name: &str, texture: TextureBinding, unit: u32) {
        self.parameters.set_texture(name, texture, unit);
    }

    fn set_polygon_offset(&mut self, enabled: bool, factor: f32, units: f32) {
        self.depth_bias = enabled.then_some((factor, units));
    }

    fn upload_per_object_uniforms(
        &mut self,
        uniforms: &PerObjectUniforms,
    ) -> Result<(), RenderError> {
        let offset = self.frame.per_object.push(bytemuck::bytes_of(uniforms))?;
        self.current_uniform_offset = Some(offset);
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        pipeline: PipelineStateId,
        command: &DrawCommand,
    ) -> Result<(), RenderError> {
        let descriptor = self
            .pipelines
            .get(&pipeline)
            .cloned()
            .ok_or(PipelineError::InvalidPipelineState { id: pipeline })?;
        let geometry = self
            .geometry
            .get(&command.vertex_buffer)
            .ok_or(ResourceError::NotFound)?;
        let indices = command.index_range();
        if indices.end > geometry.index_count {
            return Err(ResourceError::OutOfBounds.into());
        }
        let uniform_offset = self.current_uniform_offset.ok_or_else(|| {
            RenderError::Internal("Draw recorded before any per-object upload".to_string())
        })?;

        let variant = VariantKey {
            pipeline,
            raster: command.raster,
            depth_bias: self.current_depth_bias(),
        };
        if !self.variants.contains_key(&variant) {
            let compiled = self.build_variant(&descriptor, &variant)?;
            log::debug!("WgpuBackend: Compiled variant {variant:?}");
            self.variants.insert(variant, compiled);
        }

        let textures = self.parameters.textures();
        self.texture_bindings.prepare(&self.device, &textures)?;
        let palette_base = self.frame.palette.push(self.parameters.palette())?;
        let parameters = self.parameters.block(palette_base);
        let parameters_offset = self.frame.parameters.push(bytemuck::bytes_of(&parameters))?;

        self.draws.push(RecordedDraw {
            variant,
            vertex_buffer: command.vertex_buffer,
            indices,
            uniform_offset,
            parameters_offset,
            textures,
        });
        Ok(())
    }

    fn submit(&mut self) -> Result<FenceValue, RenderError> {
        self.frame.flush(&self.device, &self.queue);
        let encoder = self.encode_frame();
        self.queue.submit(std::iter::once(encoder.finish()));
        self.next_fence += 1;
        Ok(FenceValue(self.next_fence))
    }

    fn present(&mut self) -> Result<(), RenderError> {
        if self.device_error.load(Ordering::Acquire) {
            return Err(RenderError::RenderingFailed(
                "the device reported an uncaptured error".to_string(),
            ));
        }
        // The target is off-screen; presenting only validates the frame.
        Ok(())
    }

    fn wait_for_fence(&mut self, fence: FenceValue) -> Result<(), RenderError> {
        // PollType::Wait blocks until the queue is empty, which covers `fence`.
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| RenderError::RenderingFailed(format!("Waiting on {fence:?}: {e}")))?;
        Ok(())
    }

    fn reset_command_recording(&mut self) {
        self.draws.clear();
        self.frame.reset();
        self.current_uniform_offset = None;
    }

    fn create_texel_buffer(
        &mut self,
        descriptor: &TexelBufferDescriptor,
    ) -> Result<GpuBufferId, ResourceError> {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = GpuBufferId(self.generate_id());
        self.texel_buffers.insert(id, buffer);
        log::info!(
            "WgpuBackend: Created texel buffer '{:?}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn write_texel_buffer(
        &mut self,
        id: GpuBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let buffer = self.texel_buffers.get(&id).ok_or(ResourceError::NotFound)?;
        let end_offset = offset + data.len() as u64;
        if end_offset > buffer.size() {
            return Err(ResourceError::OutOfBounds);
        }
        self.queue.write_buffer(buffer, offset, data);
        Ok(())
    }

    fn destroy_texel_buffer(&mut self, id: GpuBufferId) -> Result<(), ResourceError> {
        let buffer = self.texel_buffers.remove(&id).ok_or(ResourceError::NotFound)?;
        buffer.destroy();
        log::debug!("WgpuBackend: Destroyed texel buffer with ID: {id:?}");
        Ok(())
    }

    fn release_device(&mut self) {
        if self.released {
            return;
        }
        self.draws.clear();
        self.variants.clear();
        self.geometry.clear();
        self.shader_stages.clear();
        self.texture_bindings.groups.clear();
        self.texture_bindings.textures.clear();
        self.texture_bindings.render_textures.clear();
        if let Err(e) = self.device.poll(wgpu::PollType::Wait) {
            log::warn!("Device poll during release failed: {e}");
        }
        self.device.destroy();
        self.released = true;
        log::info!("WgpuBackend: Device released.");
    }
}
