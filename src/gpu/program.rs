// gpu/program.rs - Kernel programs: WGSL modules and their render pipelines.
//
// Each kernel is one WGSL module built from `common.wgsl` (uniform block,
// slot 0, full-screen vertex stage) followed by the kernel's fragment
// source. Modules are compiled once, eagerly, when `Programs` is built:
// a shader that fails validation is fatal at startup.
//
// A render pipeline is specific to the colour target format and to
// whether a depth attachment is present, so each `Program` caches its
// pipelines per `(PixelFormat, depth)`. The two formats without depth are
// linked up front; other variants link on first use.
//
// BIND GROUP LAYOUT (group 0)
// ───────────────────────────
//   binding 0   uniform KernelUniforms        (all kernels)
//   binding 1   texture_2d<f32>  input 0
//   binding 2   sampler          input 0
//   binding 3   texture_2d<f32>  input 1      (two-input kernels only)
//   binding 4   sampler          input 1

use std::collections::HashMap;

use tracing::debug;
use wgpu::util::DeviceExt;

use crate::error::{PipelineError, Result};
use crate::gpu::device::{texture_format, GpuDevice, DEPTH_FORMAT};
use crate::gpu::scoped;
use crate::kernel::{KernelKind, KernelUniforms};
use crate::surface::PixelFormat;

const COMMON: &str = include_str!("../shaders/common.wgsl");
const SOBEL: &str = include_str!("../shaders/sobel.wgsl");
const PASSTHROUGH: &str = include_str!("../shaders/passthrough.wgsl");
const GRAYSCALE: &str = include_str!("../shaders/grayscale.wgsl");
const GAUSSIAN_BLUR: &str = include_str!("../shaders/gaussian_blur.wgsl");
const SOBEL_NORMAL: &str = include_str!("../shaders/sobel_normal.wgsl");
const SOBEL_GRADIENT: &str = include_str!("../shaders/sobel_gradient.wgsl");
const MAGNITUDE: &str = include_str!("../shaders/magnitude.wgsl");
const NON_MAX_SUPPRESSION: &str = include_str!("../shaders/non_max_suppression.wgsl");
const DILATE: &str = include_str!("../shaders/dilate.wgsl");
const ALPHA_BLEND: &str = include_str!("../shaders/alpha_blend.wgsl");

/// Clip-space corners of the full-screen quad.
pub const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, 1.0], [1.0, -1.0]];

/// Two triangles covering the quad.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Complete WGSL source for a kernel.
pub fn shader_source(kind: KernelKind) -> String {
    let parts: &[&str] = match kind {
        KernelKind::Passthrough => &[PASSTHROUGH],
        KernelKind::Grayscale => &[GRAYSCALE],
        KernelKind::GaussianBlur => &[GAUSSIAN_BLUR],
        KernelKind::SobelNormal => &[SOBEL, SOBEL_NORMAL],
        KernelKind::SobelGradient => &[SOBEL, SOBEL_GRADIENT],
        KernelKind::Magnitude => &[MAGNITUDE],
        KernelKind::NonMaxSuppression => &[NON_MAX_SUPPRESSION],
        KernelKind::Dilate => &[DILATE],
        KernelKind::AlphaBlend => &[ALPHA_BLEND],
    };
    let mut src = String::from(COMMON);
    for part in parts {
        src.push('\n');
        src.push_str(part);
    }
    src
}

/// Vertex and index buffers of the full-screen quad, shared by every pass.
pub struct QuadGeometry {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
}

impl QuadGeometry {
    pub const INDEX_COUNT: u32 = QUAD_INDICES.len() as u32;

    fn new(device: &wgpu::Device) -> Self {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad::vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad::indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        QuadGeometry { vertices, indices }
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// One kernel's compiled module and its linked pipelines.
pub struct Program {
    pub kind: KernelKind,
    module: wgpu::ShaderModule,
    pipelines: HashMap<(PixelFormat, bool), wgpu::RenderPipeline>,
}

impl Program {
    fn compile(device: &wgpu::Device, kind: KernelKind) -> Result<Self> {
        let source = shader_source(kind);
        let (module, err) = scoped(device, || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kind.name()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(e) = err {
            return Err(PipelineError::ShaderCompile {
                kernel: kind,
                message: e.to_string(),
            });
        }
        Ok(Program {
            kind,
            module,
            pipelines: HashMap::new(),
        })
    }

    /// The pipeline for a target, if already linked.
    pub fn pipeline(&self, format: PixelFormat, depth: bool) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&(format, depth))
    }

    fn link(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        format: PixelFormat,
        depth: bool,
    ) -> Result<()> {
        if self.pipelines.contains_key(&(format, depth)) {
            return Ok(());
        }
        let kind = self.kind;
        let (pipeline, err) = scoped(device, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(kind.name()),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: &self.module,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[QuadGeometry::layout()],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: depth.then(|| wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.module,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format(format),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        });
        if let Some(e) = err {
            return Err(PipelineError::Link {
                kernel: kind,
                message: e.to_string(),
            });
        }
        debug!(kernel = %kind, %format, depth, "linked render pipeline");
        self.pipelines.insert((format, depth), pipeline);
        Ok(())
    }
}

/// Every kernel program, resolved once.
pub struct Programs {
    pub passthrough: Program,
    pub grayscale: Program,
    pub gaussian_blur: Program,
    pub sobel_normal: Program,
    pub sobel_gradient: Program,
    pub magnitude: Program,
    pub non_max_suppression: Program,
    pub dilate: Program,
    pub alpha_blend: Program,
    pub quad: QuadGeometry,
    single_input: wgpu::BindGroupLayout,
    double_input: wgpu::BindGroupLayout,
    single_layout: wgpu::PipelineLayout,
    double_layout: wgpu::PipelineLayout,
}

impl Programs {
    /// Compile every kernel and link the common pipeline variants.
    ///
    /// # Errors
    /// `ShaderCompile` for the first module that fails validation,
    /// `Link` for the first pipeline that fails to build.
    pub fn new(gpu: &GpuDevice) -> Result<Self> {
        let device = &gpu.device;
        let single_input = bind_group_layout(device, 1);
        let double_input = bind_group_layout(device, 2);
        let single_layout = pipeline_layout(device, &single_input);
        let double_layout = pipeline_layout(device, &double_input);

        let mut programs = Programs {
            passthrough: Program::compile(device, KernelKind::Passthrough)?,
            grayscale: Program::compile(device, KernelKind::Grayscale)?,
            gaussian_blur: Program::compile(device, KernelKind::GaussianBlur)?,
            sobel_normal: Program::compile(device, KernelKind::SobelNormal)?,
            sobel_gradient: Program::compile(device, KernelKind::SobelGradient)?,
            magnitude: Program::compile(device, KernelKind::Magnitude)?,
            non_max_suppression: Program::compile(device, KernelKind::NonMaxSuppression)?,
            dilate: Program::compile(device, KernelKind::Dilate)?,
            alpha_blend: Program::compile(device, KernelKind::AlphaBlend)?,
            quad: QuadGeometry::new(device),
            single_input,
            double_input,
            single_layout,
            double_layout,
        };

        for kind in KernelKind::ALL {
            for format in [PixelFormat::Rgba8Unorm, PixelFormat::Rgba16Float] {
                programs.ensure(gpu, kind, format, false)?;
            }
        }
        debug!(kernels = KernelKind::ALL.len(), "programs ready");
        Ok(programs)
    }

    pub fn get(&self, kind: KernelKind) -> &Program {
        match kind {
            KernelKind::Passthrough => &self.passthrough,
            KernelKind::Grayscale => &self.grayscale,
            KernelKind::GaussianBlur => &self.gaussian_blur,
            KernelKind::SobelNormal => &self.sobel_normal,
            KernelKind::SobelGradient => &self.sobel_gradient,
            KernelKind::Magnitude => &self.magnitude,
            KernelKind::NonMaxSuppression => &self.non_max_suppression,
            KernelKind::Dilate => &self.dilate,
            KernelKind::AlphaBlend => &self.alpha_blend,
        }
    }

    /// Bind group layout for a kernel with `inputs` input slots.
    pub fn bind_group_layout(&self, inputs: usize) -> &wgpu::BindGroupLayout {
        if inputs > 1 {
            &self.double_input
        } else {
            &self.single_input
        }
    }

    /// Make sure the pipeline for `(kind, format, depth)` is linked.
    pub fn ensure(
        &mut self,
        gpu: &GpuDevice,
        kind: KernelKind,
        format: PixelFormat,
        depth: bool,
    ) -> Result<()> {
        let layout = if kind.input_count() > 1 {
            &self.double_layout
        } else {
            &self.single_layout
        };
        // Field-level borrows so the layout and the program can coexist.
        let program = match kind {
            KernelKind::Passthrough => &mut self.passthrough,
            KernelKind::Grayscale => &mut self.grayscale,
            KernelKind::GaussianBlur => &mut self.gaussian_blur,
            KernelKind::SobelNormal => &mut self.sobel_normal,
            KernelKind::SobelGradient => &mut self.sobel_gradient,
            KernelKind::Magnitude => &mut self.magnitude,
            KernelKind::NonMaxSuppression => &mut self.non_max_suppression,
            KernelKind::Dilate => &mut self.dilate,
            KernelKind::AlphaBlend => &mut self.alpha_blend,
        };
        program.link(&gpu.device, layout, format, depth)
    }
}

fn bind_group_layout(device: &wgpu::Device, inputs: u32) -> wgpu::BindGroupLayout {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<KernelUniforms>() as u64),
        },
        count: None,
    }];
    for slot in 0..inputs {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 1 + 2 * slot,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2 + 2 * slot,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(if inputs > 1 { "kernel::bgl2" } else { "kernel::bgl1" }),
        entries: &entries,
    })
}

fn pipeline_layout(device: &wgpu::Device, bgl: &wgpu::BindGroupLayout) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("kernel::layout"),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    })
}
