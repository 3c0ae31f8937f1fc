// gpu/device.rs - wgpu adapter/device selection.
//
// Responsibilities:
//   - Enumerate adapters on the primary backends and select the first
//     non-CPU one.
//   - Expose a `DeviceProfile` for simulating a constrained target on a
//     development machine (WebGL2-class limits).
//   - Answer capability questions the surface allocator needs: maximum
//     texture size, whether a format can be rendered into and filtered.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe (the software renderer appears as a valid
// Vulkan device under WSL2 and in many containers). We enumerate
// explicitly and only fall back to a CPU adapter when nothing else exists.
//
// DEVICE LIMITS:
// Under `WebGl2` we request *lower* limits than the hardware supports.
// wgpu validates every texture allocation against the requested limits,
// so a 4096² surface that a browser would reject fails on the laptop too.

use std::fmt;

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::surface::PixelFormat;

/// Hardware profile controlling requested device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    /// The adapter's default limits.
    #[default]
    Native,
    /// `wgpu::Limits::downlevel_webgl2_defaults()`: 2048² textures, no
    /// storage buffers. Matches what a WebGL2 canvas guarantees.
    WebGl2,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::WebGl2 => write!(f, "WebGl2 (simulated limits)"),
        }
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device, queue and the limits actually granted.
///
/// # Field drop order
/// Fields drop top to bottom. `_instance` is declared last so the
/// `wgpu::Instance` outlives `device` and `queue`; some Vulkan layers
/// crash when the instance is destroyed before device-level objects.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub limits: wgpu::Limits,
    adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// First suitable adapter, `DeviceProfile::Native` limits.
    pub fn new() -> Result<Self> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let backends = wgpu::Backends::PRIMARY | wgpu::Backends::GL;
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            flags,
            ..Default::default()
        });

        // Tiered selection:
        //   1. DiscreteGpu / IntegratedGpu / VirtualGpu / Other
        //   2. anything at all (llvmpipe), logged so it is obvious
        let all_adapters = instance.enumerate_adapters(backends);
        if all_adapters.is_empty() {
            return Err(PipelineError::NoSuitableAdapter);
        }

        for a in &all_adapters {
            let info = a.get_info();
            info!(
                adapter = %info.name,
                backend = ?info.backend,
                device_type = ?info.device_type,
                "found adapter"
            );
        }

        let mut fallback = None;
        let mut chosen = None;
        for a in all_adapters {
            if a.get_info().device_type == wgpu::DeviceType::Cpu {
                fallback.get_or_insert(a);
            } else {
                chosen = Some(a);
                break;
            }
        }
        let adapter = match chosen.or(fallback) {
            Some(a) => a,
            None => return Err(PipelineError::NoSuitableAdapter),
        };

        let raw_info = adapter.get_info();
        if raw_info.device_type == wgpu::DeviceType::Cpu {
            warn!(adapter = %raw_info.name, "only a software adapter is available");
        }
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        // A GL adapter cannot promise more than WebGL2 anyway.
        let profile = match profile {
            DeviceProfile::Native if raw_info.backend == wgpu::Backend::Gl => {
                info!("GL backend selected, using WebGl2 profile");
                DeviceProfile::WebGl2
            }
            other => other,
        };

        let limits = limits_for_profile(profile, &adapter.limits());

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("normap"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        info!(adapter = %adapter_info, %profile, max_texture = limits.max_texture_dimension_2d, "device ready");

        Ok(GpuDevice {
            device,
            queue,
            profile,
            adapter_info,
            limits,
            adapter,
            _instance: instance,
        })
    }

    /// Largest width or height a 2D texture may have on this device.
    pub fn max_texture_dimension(&self) -> u32 {
        self.limits.max_texture_dimension_2d
    }

    /// Whether `format` can be both rendered into and sampled with a
    /// filtering sampler.
    pub fn supports_render_target(&self, format: PixelFormat) -> bool {
        let features = self.adapter.get_texture_format_features(texture_format(format));
        features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
            && features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {}, max texture: {} }}",
            self.adapter_info,
            self.profile,
            self.max_texture_dimension()
        )
    }
}

/// wgpu format backing each pixel format.
pub fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
    }
}

/// Depth attachment format used when a surface asks for depth.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Build wgpu limits for the given profile.
///
/// `Native` takes the defaults, raised to whatever texture size the adapter
/// offers. `WebGl2` is the downlevel WebGL2 set, unchanged.
fn limits_for_profile(profile: DeviceProfile, adapter: &wgpu::Limits) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default().using_resolution(adapter.clone()),
        DeviceProfile::WebGl2 => wgpu::Limits::downlevel_webgl2_defaults(),
    }
}
