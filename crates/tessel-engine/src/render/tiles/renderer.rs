use std::collections::HashMap;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::coords::ColorRgba;
use crate::render::{RenderCtx, RenderTarget};
use crate::tile::{FrameAttributes, GeometryData, TileAttrs, TileError, TileResult, TileVertex};

use super::backend::{BufferSetId, LayerDraw, TileGpu};
use super::charset::CharsetAtlas;

/// Tile renderer configuration.
#[derive(Debug, Clone)]
pub struct TileRendererConfig {
    /// Color table indexed by tile fg/bg. Entry 0 always renders transparent.
    pub palette: Vec<ColorRgba>,

    /// Layer draws the uniform buffer holds before it has to grow.
    pub initial_draw_capacity: u32,
}

impl Default for TileRendererConfig {
    fn default() -> Self {
        Self {
            palette: default_palette(),
            initial_draw_capacity: 64,
        }
    }
}

/// Sixteen-color palette; index 0 is the transparent slot.
pub fn default_palette() -> Vec<ColorRgba> {
    const RGB: [u32; 16] = [
        0x000000, 0x1d2b53, 0x7e2553, 0x008751, 0xab5236, 0x5f574f, 0xc2c3c7, 0xfff1e8,
        0xff004d, 0xffa300, 0xffec27, 0x00e436, 0x29adff, 0x83769c, 0xff77a8, 0xffccaa,
    ];
    RGB.iter()
        .enumerate()
        .map(|(i, rgb)| {
            let [_, r, g, b] = rgb.to_be_bytes();
            ColorRgba::from_rgba8(r, g, b, if i == 0 { 0 } else { 255 })
        })
        .collect()
}

/// wgpu backend for the tile core.
///
/// Draws requested through [`TileGpu`] are queued with their resolved
/// uniforms; [`flush`](Self::flush) encodes them into one render pass in issue
/// order. Attribute uploads go straight to the queue, so a caller that edits a
/// buffer set between `draw_layer` and submission sees the edit in the draw.
pub struct TileRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,

    charset: CharsetAtlas,
    palette_len: u32,
    palette_buffer: wgpu::Buffer,

    frame_layout: wgpu::BindGroupLayout,
    attrs_layout: wgpu::BindGroupLayout,
    blended: wgpu::RenderPipeline,
    opaque: wgpu::RenderPipeline,

    uniform_buffer: wgpu::Buffer,
    uniform_stride: u64,
    uniform_capacity: u32,
    frame_group: wgpu::BindGroup,

    sets: HashMap<BufferSetId, GpuBufferSet>,
    next_id: u64,

    program_bound: bool,
    blending: bool,
    queued: Vec<QueuedDraw>,
}

struct GpuBufferSet {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    chars: wgpu::Buffer,
    uvs: wgpu::Buffer,
    fg: wgpu::Buffer,
    bg: wgpu::Buffer,
    attrs_group: wgpu::BindGroup,
    tiles: usize,
}

impl GpuBufferSet {
    fn attribute(&self, which: TileAttrs) -> &wgpu::Buffer {
        if which.contains(TileAttrs::CHAR) {
            &self.chars
        } else if which.contains(TileAttrs::UV) {
            &self.uvs
        } else if which.contains(TileAttrs::FG) {
            &self.fg
        } else {
            &self.bg
        }
    }
}

struct QueuedDraw {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    attrs_group: wgpu::BindGroup,
    elements: Range<u32>,
    blended: bool,
    uniforms: TileUniforms,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct TileUniforms {
    mvp: [[f32; 4]; 4],
    /// columns, rows, palette length, unused
    charset: [u32; 4],
    /// alpha, background alpha, brightness, unused
    params: [f32; 4],
}

impl TileUniforms {
    fn new(draw: &LayerDraw, columns: u32, rows: u32, palette_len: u32) -> Self {
        Self {
            mvp: layer_mvp(draw).to_cols_array_2d(),
            charset: [columns, rows, palette_len, 0],
            params: [draw.alpha, draw.bg_alpha, draw.brightness, 0.0],
        }
    }
}

/// `projection * view * translate(position) * scale(scale)`.
fn layer_mvp(draw: &LayerDraw) -> Mat4 {
    draw.projection
        * draw.view
        * Mat4::from_translation(draw.position)
        * Mat4::from_scale(draw.scale)
}

fn align_to(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

impl TileRenderer {
    /// Builds pipelines for `ctx.surface_format` around `charset`.
    pub fn new(ctx: &RenderCtx<'_>, charset: CharsetAtlas, config: TileRendererConfig) -> Self {
        let device = ctx.device.clone();
        let queue = ctx.queue.clone();
        let format = ctx.surface_format;

        let mut palette: Vec<[f32; 4]> = config
            .palette
            .iter()
            .map(|c| [c.r, c.g, c.b, c.a])
            .collect();
        if palette.is_empty() {
            log::warn!("tile renderer: empty palette; every tile renders transparent");
            palette.push([0.0; 4]);
        }
        let palette_len = palette.len() as u32;
        let palette_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel tile palette"),
            contents: bytemuck::cast_slice(&palette),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessel tile frame bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<TileUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                storage_entry(3),
            ],
        });

        let attrs_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessel tile attributes bgl"),
            entries: &[
                storage_entry(0),
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tessel tile shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/tile.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessel tile pipeline layout"),
            bind_group_layouts: &[&frame_layout, &attrs_layout],
            immediate_size: 0,
        });

        let blended = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            format,
            Some(source_alpha_blend()),
            "tessel tile pipeline (blended)",
        );
        let opaque = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            format,
            None,
            "tessel tile pipeline (opaque)",
        );

        let uniform_stride = align_to(
            std::mem::size_of::<TileUniforms>() as u64,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );
        let uniform_capacity = config.initial_draw_capacity.max(1);
        let uniform_buffer = create_uniform_buffer(&device, uniform_stride, uniform_capacity);
        let frame_group = create_frame_group(
            &device,
            &frame_layout,
            &uniform_buffer,
            &charset,
            &palette_buffer,
        );

        log::debug!(
            "tile renderer: format {format:?}, palette {palette_len}, uniform stride {uniform_stride}"
        );

        Self {
            device,
            queue,
            format,
            charset,
            palette_len,
            palette_buffer,
            frame_layout,
            attrs_layout,
            blended,
            opaque,
            uniform_buffer,
            uniform_stride,
            uniform_capacity,
            frame_group,
            sets: HashMap::new(),
            next_id: 0,
            program_bound: false,
            blending: false,
            queued: Vec::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Color format the pipelines were built for.
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn charset(&self) -> &CharsetAtlas {
        &self.charset
    }

    /// Live buffer sets.
    pub fn buffer_sets(&self) -> usize {
        self.sets.len()
    }

    /// Draws waiting for [`flush`](Self::flush).
    pub fn queued_draws(&self) -> usize {
        self.queued.len()
    }

    /// Encodes every queued draw into one render pass over `target`.
    ///
    /// With `clear`, the target is cleared first even if nothing is queued.
    /// Returns the number of draws encoded. Program and blend state are reset.
    pub fn flush(&mut self, target: &mut RenderTarget<'_>, clear: Option<ColorRgba>) -> usize {
        let draws = std::mem::take(&mut self.queued);
        self.program_bound = false;
        self.blending = false;
        if draws.is_empty() && clear.is_none() {
            return 0;
        }

        self.ensure_uniform_capacity(draws.len() as u32);
        if !draws.is_empty() {
            let stride = self.uniform_stride as usize;
            let mut staging = vec![0u8; stride * draws.len()];
            for (chunk, draw) in staging.chunks_exact_mut(stride).zip(&draws) {
                let bytes = bytemuck::bytes_of(&draw.uniforms);
                chunk[..bytes.len()].copy_from_slice(bytes);
            }
            self.queue.write_buffer(&self.uniform_buffer, 0, &staging);
        }

        let load = match clear {
            Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(c.r),
                g: f64::from(c.g),
                b: f64::from(c.b),
                a: f64::from(c.a),
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("tessel tile pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for (i, draw) in draws.iter().enumerate() {
            let offset = (i as u64 * self.uniform_stride) as u32;
            rpass.set_pipeline(if draw.blended { &self.blended } else { &self.opaque });
            rpass.set_bind_group(0, &self.frame_group, &[offset]);
            rpass.set_bind_group(1, &draw.attrs_group, &[]);
            rpass.set_vertex_buffer(0, draw.vertex.slice(..));
            rpass.set_index_buffer(draw.index.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(draw.elements.clone(), 0, 0..1);
        }

        log::trace!("tile renderer: flushed {} draws", draws.len());
        draws.len()
    }

    fn ensure_uniform_capacity(&mut self, draws: u32) {
        if draws <= self.uniform_capacity {
            return;
        }
        let capacity = draws.next_power_of_two().max(64);
        self.uniform_buffer = create_uniform_buffer(&self.device, self.uniform_stride, capacity);
        self.frame_group = create_frame_group(
            &self.device,
            &self.frame_layout,
            &self.uniform_buffer,
            &self.charset,
            &self.palette_buffer,
        );
        self.uniform_capacity = capacity;
        log::debug!("tile renderer: uniform capacity grown to {capacity} draws");
    }

    /// Rejects sets the device could not bind.
    fn check_limits(&self, tiles: usize, vertices: usize, indices: usize) -> TileResult<()> {
        let limits = self.device.limits();
        let attr_bytes = (tiles * std::mem::size_of::<u32>()) as u64;
        let vertex_bytes = (vertices * std::mem::size_of::<TileVertex>()) as u64;
        let index_bytes = (indices * std::mem::size_of::<u32>()) as u64;

        if attr_bytes > u64::from(limits.max_storage_buffer_binding_size) {
            return Err(TileError::gpu(format!(
                "{tiles} tiles need {attr_bytes} bytes per attribute buffer, device allows {}",
                limits.max_storage_buffer_binding_size
            )));
        }
        let largest = vertex_bytes.max(index_bytes);
        if largest > limits.max_buffer_size {
            return Err(TileError::gpu(format!(
                "geometry buffer of {largest} bytes exceeds device limit {}",
                limits.max_buffer_size
            )));
        }
        Ok(())
    }

    fn create_attribute_buffer(&self, label: &str, data: &[u32]) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        })
    }

    fn create_geometry_buffers(&self, geometry: GeometryData<'_>) -> (wgpu::Buffer, wgpu::Buffer) {
        let vertex = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel tile vertices"),
            contents: bytemuck::cast_slice(geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let index = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tessel tile indices"),
            contents: bytemuck::cast_slice(geometry.indices),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        });
        (vertex, index)
    }

    fn create_attrs_group(
        &self,
        chars: &wgpu::Buffer,
        uvs: &wgpu::Buffer,
        fg: &wgpu::Buffer,
        bg: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tessel tile attributes"),
            layout: &self.attrs_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: chars.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uvs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: fg.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: bg.as_entire_binding(),
                },
            ],
        })
    }

    fn set(&self, id: BufferSetId) -> TileResult<&GpuBufferSet> {
        self.sets
            .get(&id)
            .ok_or_else(|| TileError::gpu(format!("unknown buffer set {id:?}")))
    }
}

impl TileGpu for TileRenderer {
    fn create_buffer_set(
        &mut self,
        geometry: GeometryData<'_>,
        attrs: FrameAttributes<'_>,
    ) -> TileResult<BufferSetId> {
        let tiles = attrs.tile_count();
        if tiles == 0 || geometry.indices.is_empty() {
            return Err(TileError::gpu("refusing to allocate an empty buffer set"));
        }
        self.check_limits(tiles, geometry.vertices.len(), geometry.indices.len())?;

        let (vertex, index) = self.create_geometry_buffers(geometry);
        let chars = self.create_attribute_buffer("tessel tile chars", attrs.chars);
        let uvs = self.create_attribute_buffer("tessel tile uv mods", attrs.uvs);
        let fg = self.create_attribute_buffer("tessel tile fg", attrs.fg);
        let bg = self.create_attribute_buffer("tessel tile bg", attrs.bg);
        let attrs_group = self.create_attrs_group(&chars, &uvs, &fg, &bg);

        let id = BufferSetId(self.next_id);
        self.next_id += 1;
        self.sets.insert(
            id,
            GpuBufferSet {
                vertex,
                index,
                chars,
                uvs,
                fg,
                bg,
                attrs_group,
                tiles,
            },
        );
        Ok(id)
    }

    fn upload_geometry(&mut self, id: BufferSetId, geometry: GeometryData<'_>) -> TileResult<()> {
        let tiles = geometry.vertices.len() / crate::tile::VERTICES_PER_TILE as usize;
        if tiles == 0 {
            return Err(TileError::gpu("refusing to upload empty geometry"));
        }
        self.check_limits(tiles, geometry.vertices.len(), geometry.indices.len())?;
        let current = self.set(id)?.tiles;

        let (vertex, index) = self.create_geometry_buffers(geometry);
        let resized = if current != tiles {
            // Contents are refilled by the attribute upload that follows.
            let zeros = vec![0u32; tiles];
            let chars = self.create_attribute_buffer("tessel tile chars", &zeros);
            let uvs = self.create_attribute_buffer("tessel tile uv mods", &zeros);
            let fg = self.create_attribute_buffer("tessel tile fg", &zeros);
            let bg = self.create_attribute_buffer("tessel tile bg", &zeros);
            let group = self.create_attrs_group(&chars, &uvs, &fg, &bg);
            Some((chars, uvs, fg, bg, group))
        } else {
            None
        };

        let set = self
            .sets
            .get_mut(&id)
            .ok_or_else(|| TileError::gpu(format!("unknown buffer set {id:?}")))?;
        set.vertex = vertex;
        set.index = index;
        if let Some((chars, uvs, fg, bg, group)) = resized {
            set.chars = chars;
            set.uvs = uvs;
            set.fg = fg;
            set.bg = bg;
            set.attrs_group = group;
            set.tiles = tiles;
        }
        Ok(())
    }

    fn upload_attributes(
        &mut self,
        id: BufferSetId,
        which: TileAttrs,
        attrs: FrameAttributes<'_>,
    ) -> TileResult<()> {
        let set = self.set(id)?;
        if attrs.tile_count() != set.tiles {
            return Err(TileError::gpu(format!(
                "attribute upload of {} tiles into a set sized for {}",
                attrs.tile_count(),
                set.tiles
            )));
        }
        for flag in which.iter() {
            self.queue
                .write_buffer(set.attribute(flag), 0, bytemuck::cast_slice(attrs.slice(flag)));
        }
        Ok(())
    }

    fn release_buffer_set(&mut self, id: BufferSetId) {
        // Dropping the handles frees the memory once queued draws that still
        // reference it have been flushed.
        if self.sets.remove(&id).is_none() {
            log::warn!("tile renderer: release of unknown buffer set {id:?}");
        }
    }

    fn bind_program(&mut self) {
        self.program_bound = true;
    }

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
    }

    fn draw_layer(&mut self, id: BufferSetId, draw: &LayerDraw) -> TileResult<()> {
        if !self.program_bound {
            return Err(TileError::gpu("draw_layer before bind_program"));
        }
        let set = self.set(id)?;
        let uniforms = TileUniforms::new(
            draw,
            self.charset.columns(),
            self.charset.rows(),
            self.palette_len,
        );
        let queued = QueuedDraw {
            vertex: set.vertex.clone(),
            index: set.index.clone(),
            attrs_group: set.attrs_group.clone(),
            elements: draw.elements.clone(),
            blended: self.blending,
            uniforms,
        };
        self.queued.push(queued);
        Ok(())
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Straight (non-premultiplied) source-over.
fn source_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[TileVertex::layout()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        // Layers are painted back to front; no depth buffer.
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn create_uniform_buffer(device: &wgpu::Device, stride: u64, capacity: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("tessel tile uniforms"),
        size: stride * u64::from(capacity),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_frame_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniforms: &wgpu::Buffer,
    charset: &CharsetAtlas,
    palette: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("tessel tile frame"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: uniforms,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<TileUniforms>() as u64),
                }),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(charset.view()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(charset.sampler()),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: palette.as_entire_binding(),
            },
        ],
    })
}
