// gpu/surface.rs - A texture that can be sampled and rendered into.
//
// RESPONSIBILITIES
// ─────────────────
// 1. Allocation: texture + default view + a sampler built from the
//    surface's filter/wrap, plus an optional Depth32Float attachment.
//    Size and format capability are checked up front so the common
//    failures produce a readable `Allocation` error instead of a wgpu
//    validation panic.
//
// 2. `bind_as_read(slot)`: the two bind group entries (texture, sampler)
//    for input slot `slot`. Slot n occupies bindings 1+2n and 2+2n;
//    binding 0 is always the kernel uniform block.
//
// 3. Upload of an `Image<Rgba8>` and synchronous readback to `Image<Rgba>`.
//
//
// ROW ALIGNMENT
// ──────────────
// Buffer<->texture copies need `bytes_per_row` to be a multiple of
// `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` (256). Upload compacts the CPU
// image (dropping its stride padding) into a staging buffer with aligned
// rows; readback strips the alignment padding again.
//
//   width = 100 (Rgba8):   400 bytes of pixels  ->  512-byte rows
//   width = 512 (Rgba16F): 4096 bytes of pixels ->  4096-byte rows

use wgpu::util::DeviceExt;

use crate::error::{PipelineError, Result};
use crate::gpu::device::{texture_format, GpuDevice, DEPTH_FORMAT};
use crate::gpu::scoped;
use crate::image::{unorm8_to_f32, Image, Rgba, Rgba8};
use crate::surface::{FilterMode, PixelFormat, Surface, SurfaceDesc, WrapMode};

const COPY_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// A surface resident on the GPU.
pub struct GpuSurface {
    desc: SurfaceDesc,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    /// Depth texture and its view, when requested.
    pub depth: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl Surface for GpuSurface {
    fn desc(&self) -> &SurfaceDesc {
        &self.desc
    }
}

impl GpuSurface {
    /// Allocate an uninitialised surface.
    ///
    /// # Errors
    /// `PipelineError::Allocation` when the size is zero or above the
    /// device limit, the format is not renderable/filterable on this
    /// adapter, or the device reports an error for the allocation.
    pub fn create(gpu: &GpuDevice, desc: SurfaceDesc) -> Result<Self> {
        desc.validate(gpu.max_texture_dimension())?;
        if !gpu.supports_render_target(desc.format) {
            return Err(PipelineError::allocation(
                desc.width,
                desc.height,
                desc.format,
                "format is not renderable and filterable on this adapter",
            ));
        }

        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };

        let ((texture, depth), err) = scoped(&gpu.device, || {
            let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("GpuSurface"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc.format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let depth = desc.depth.then(|| {
                gpu.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("GpuSurface::depth"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
            });
            (texture, depth)
        });
        if let Some(e) = err {
            return Err(PipelineError::allocation(
                desc.width,
                desc.height,
                desc.format,
                e.to_string(),
            ));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = depth.map(|t| {
            let v = t.create_view(&wgpu::TextureViewDescriptor::default());
            (t, v)
        });
        let sampler = create_sampler(&gpu.device, desc.filter, desc.wrap);

        Ok(GpuSurface {
            desc,
            texture,
            view,
            sampler,
            depth,
        })
    }

    /// Bind group entries placing this surface in input slot `slot`.
    pub fn bind_as_read(&self, slot: u32) -> [wgpu::BindGroupEntry<'_>; 2] {
        [
            wgpu::BindGroupEntry {
                binding: 1 + 2 * slot,
                resource: wgpu::BindingResource::TextureView(&self.view),
            },
            wgpu::BindGroupEntry {
                binding: 2 + 2 * slot,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ]
    }

    /// Create a source surface from `image` and submit the copy.
    ///
    /// The copy runs on the GPU timeline; anything submitted afterwards
    /// sees the data.
    pub fn upload(gpu: &GpuDevice, image: &Image<Rgba8>) -> Result<Self> {
        let desc = SurfaceDesc::source(image.width() as u32, image.height() as u32);
        let surface = GpuSurface::create(gpu, desc)?;
        let (width, height) = (desc.width, desc.height);

        let row_bytes = width * 4;
        let aligned_bytes_per_row = align_to(row_bytes, COPY_ALIGNMENT);
        let staging = compact_rows(image, aligned_bytes_per_row as usize);

        let staging_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GpuSurface::staging"),
            contents: &staging,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuSurface::upload"),
            });
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        Ok(surface)
    }

    /// Read the texture back to CPU memory.
    ///
    /// Expensive and synchronous: it blocks until the GPU has finished
    /// everything submitted so far. Export and tests only.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<Image<Rgba>> {
        let (width, height) = (self.desc.width, self.desc.height);
        let bpp = self.desc.format.bytes_per_pixel();
        let aligned_bytes_per_row = align_to(width * bpp, COPY_ALIGNMENT);

        let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("GpuSurface::readback"),
            size: (aligned_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GpuSurface::readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback_buf,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let buf_slice = readback_buf.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only disappears if this function already returned.
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| PipelineError::Readback("map callback never fired".into()))?
            .map_err(|e| PipelineError::Readback(e.to_string()))?;

        let mapped = buf_slice.get_mapped_range();
        let image = decode_rows(
            &mapped,
            self.desc.format,
            width as usize,
            height as usize,
            aligned_bytes_per_row as usize,
        );
        drop(mapped);
        readback_buf.unmap();

        Ok(image)
    }
}

fn create_sampler(device: &wgpu::Device, filter: FilterMode, wrap: WrapMode) -> wgpu::Sampler {
    let address_mode = match wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    };
    let filter = match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("GpuSurface::sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// Pack `image` into rows of `aligned_bytes_per_row` bytes.
fn compact_rows(image: &Image<Rgba8>, aligned_bytes_per_row: usize) -> Vec<u8> {
    let row_bytes = image.width() * 4;
    let mut staging = vec![0u8; aligned_bytes_per_row * image.height()];
    for y in 0..image.height() {
        let dst_start = y * aligned_bytes_per_row;
        let src: &[u8] = bytemuck::cast_slice(image.row(y));
        staging[dst_start..dst_start + row_bytes].copy_from_slice(src);
    }
    staging
}

/// Decode padded rows of `format` texels into linear RGBA.
fn decode_rows(
    bytes: &[u8],
    format: PixelFormat,
    width: usize,
    height: usize,
    aligned_bytes_per_row: usize,
) -> Image<Rgba> {
    let bpp = format.bytes_per_pixel() as usize;
    Image::from_fn(width, height, |x, y| {
        let start = y * aligned_bytes_per_row + x * bpp;
        let texel = &bytes[start..start + bpp];
        match format {
            PixelFormat::Rgba8Unorm => [
                unorm8_to_f32(texel[0]),
                unorm8_to_f32(texel[1]),
                unorm8_to_f32(texel[2]),
                unorm8_to_f32(texel[3]),
            ],
            PixelFormat::Rgba16Float => {
                let mut out = [0.0f32; 4];
                for (c, v) in out.iter_mut().enumerate() {
                    let h = half::f16::from_le_bytes([texel[2 * c], texel[2 * c + 1]]);
                    *v = h.to_f32();
                }
                out
            }
        }
    })
}

/// Round `value` up to the next multiple of `alignment`.
///
///   align_to(100, 256) = 256
///   align_to(256, 256) = 256
///   align_to(257, 256) = 512
#[inline]
pub(crate) fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}
