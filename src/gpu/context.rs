// gpu/context.rs - wgpu implementation of `PipelineContext`.
//
// One draw = one render pass:
//
//   1. link (or look up) the kernel's pipeline for the target's format
//   2. upload a fresh uniform buffer (texel size of input 0 + params)
//   3. bind group: uniforms at 0, input n at bindings 1+2n / 2+2n
//   4. render pass on the target view, cleared, viewport = target size
//   5. draw the shared quad (6 indices, 2 triangles)
//
// Passes are recorded into one command encoder and submitted together by
// `flush`. Every pass gets its own uniform buffer: a shared buffer
// rewritten with `queue.write_buffer` would hold only the last value by
// the time the encoder is submitted.

use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use crate::context::{check_draw, PipelineContext};
use crate::error::{PipelineError, Result};
use crate::gpu::device::{DeviceProfile, GpuDevice};
use crate::gpu::program::{Programs, QuadGeometry};
use crate::gpu::scoped;
use crate::gpu::surface::GpuSurface;
use crate::image::{Image, Rgba, Rgba8};
use crate::kernel::{Kernel, KernelKind};
use crate::surface::{Surface, SurfaceDesc};

/// Render passes on a wgpu device.
pub struct GpuContext {
    programs: Programs,
    encoder: Option<wgpu::CommandEncoder>,
    /// Kernels recorded since the last flush, for error reports.
    pending: Vec<KernelKind>,
    draws: u64,
    gpu: GpuDevice,
}

impl GpuContext {
    /// Open a device with `profile` limits and build every program.
    ///
    /// # Errors
    /// Device selection errors, then `ShaderCompile`/`Link` from
    /// [`Programs::new`].
    pub fn new(profile: DeviceProfile) -> Result<Self> {
        let gpu = GpuDevice::new_with_profile(profile)?;
        Self::from_device(gpu)
    }

    pub fn from_device(gpu: GpuDevice) -> Result<Self> {
        let programs = Programs::new(&gpu)?;
        Ok(GpuContext {
            programs,
            encoder: None,
            pending: Vec::new(),
            draws: 0,
            gpu,
        })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    pub fn programs(&self) -> &Programs {
        &self.programs
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.gpu.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("normap::frame"),
            })
        })
    }
}

fn color_attachment(view: &wgpu::TextureView, clear: wgpu::Color) -> wgpu::RenderPassColorAttachment<'_> {
    wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
    }
}

fn depth_attachment(surface: &GpuSurface) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
    surface
        .depth
        .as_ref()
        .map(|(_, view)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        })
}

impl PipelineContext for GpuContext {
    type Surface = GpuSurface;

    fn backend_name(&self) -> &str {
        "wgpu"
    }

    fn max_surface_dimension(&self) -> u32 {
        self.gpu.max_texture_dimension()
    }

    fn create_surface(&mut self, desc: SurfaceDesc) -> Result<GpuSurface> {
        GpuSurface::create(&self.gpu, desc)
    }

    fn upload(&mut self, image: &Image<Rgba8>) -> Result<GpuSurface> {
        GpuSurface::upload(&self.gpu, image)
    }

    fn clear(&mut self, target: &mut GpuSurface, color: Rgba) -> Result<()> {
        let clear = wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        };
        let encoder = self.encoder();
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear"),
            color_attachments: &[Some(color_attachment(&target.view, clear))],
            depth_stencil_attachment: depth_attachment(target),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        Ok(())
    }

    fn draw(&mut self, kernel: &Kernel, inputs: &[&GpuSurface], target: &mut GpuSurface) -> Result<()> {
        check_draw(kernel, inputs.len())?;
        let kind = kernel.kind();
        let format = target.format();
        let depth = target.depth.is_some();
        self.programs.ensure(&self.gpu, kind, format, depth)?;

        // Field-level borrows: the pass records into `encoder` while reading
        // the pipeline and quad out of `programs`.
        let GpuContext {
            programs,
            encoder,
            gpu,
            ..
        } = self;
        let encoder = encoder.get_or_insert_with(|| {
            gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("normap::frame"),
            })
        });
        let Some(pipeline) = programs.get(kind).pipeline(format, depth) else {
            return Err(PipelineError::Link {
                kernel: kind,
                message: format!("no pipeline for {format} (depth: {depth})"),
            });
        };

        let uniforms = kernel.uniforms(inputs[0].texel());
        let (w, h) = (target.width(), target.height());
        trace!(kernel = %kind, w, h, "gpu draw");

        let ((), err) = scoped(&gpu.device, || {
            let uniform_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kernel::uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let mut entries = vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buf.as_entire_binding(),
            }];
            for (slot, input) in inputs.iter().enumerate() {
                entries.extend(input.bind_as_read(slot as u32));
            }
            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kind.name()),
                layout: programs.bind_group_layout(inputs.len()),
                entries: &entries,
            });

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(kind.name()),
                color_attachments: &[Some(color_attachment(&target.view, wgpu::Color::TRANSPARENT))],
                depth_stencil_attachment: depth_attachment(target),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_viewport(0.0, 0.0, w as f32, h as f32, 0.0, 1.0);
            pass.set_vertex_buffer(0, programs.quad.vertices.slice(..));
            pass.set_index_buffer(programs.quad.indices.slice(..), wgpu::IndexFormat::Uint16);
            pass.draw_indexed(0..QuadGeometry::INDEX_COUNT, 0, 0..1);
        });
        if let Some(e) = err {
            return Err(PipelineError::Draw {
                kernel: kind,
                message: e.to_string(),
            });
        }

        self.pending.push(kind);
        self.draws += 1;
        Ok(())
    }

    fn readback(&mut self, surface: &GpuSurface) -> Result<Image<Rgba>> {
        self.flush()?;
        surface.readback(&self.gpu)
    }

    fn flush(&mut self) -> Result<()> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        let kinds = std::mem::take(&mut self.pending);
        let queue = &self.gpu.queue;
        let (_, err) = scoped(&self.gpu.device, || queue.submit(std::iter::once(encoder.finish())));
        if let Some(e) = err {
            return Err(PipelineError::Draw {
                kernel: kinds.last().copied().unwrap_or(KernelKind::Passthrough),
                message: format!("submission of {} pass(es) failed: {e}", kinds.len()),
            });
        }
        debug!(passes = kinds.len(), "submitted");
        Ok(())
    }

    fn draw_count(&self) -> u64 {
        self.draws
    }
}
