// gpu/mod.rs - wgpu backend.
//
// Every kernel in the catalogue runs as a render pipeline drawing one
// full-screen quad into the destination surface. The CPU implementations
// in the parent crate remain the authoritative reference; every GPU
// kernel is validated against them within storage tolerance.
//
//   device   adapter selection, limits, format capabilities
//   surface  GpuSurface: texture + view + sampler (+ depth), upload, readback
//   program  WGSL modules and render pipelines, resolved once per kernel
//   context  GpuContext: the PipelineContext implementation
//
// All submission happens on the calling thread. Passes recorded between
// two `flush` calls share one command encoder.

pub mod context;
pub mod device;
pub mod program;
pub mod surface;

pub use context::GpuContext;
pub use device::{DeviceProfile, GpuDevice};
pub use surface::GpuSurface;

/// Run `f` inside validation and out-of-memory error scopes.
///
/// Returns the value together with the first error the device reported
/// for it, if any.
pub(crate) fn scoped<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    (value, validation.or(oom))
}

#[cfg(test)]
pub(crate) mod test_support {
    // Some Vulkan layers (dzn on WSL2 in particular) crash during process
    // exit once any device has been created in that process. GPU tests
    // therefore run in a child `cargo test` process: the `inner_*` test
    // does the real work and prints "GPU_TEST_OK" just before returning,
    // and the outer `test_*` wrapper only checks for that token, not the
    // exit status.

    /// Spawn a child `cargo test` running one named, ignored lib test.
    /// Returns the combined stdout + stderr.
    pub(crate) fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args([
                "test",
                "--lib",
                "--",
                test_name,
                "--exact",
                "--ignored",
                "--nocapture",
            ])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }
}
