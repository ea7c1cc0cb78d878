use crate::cli::CliConfig;
use crate::Result;
use okl_core::TargetBackend;

fn describe(backend: TargetBackend) -> &'static str {
    match backend {
        TargetBackend::Serial => "sequential host C++",
        TargetBackend::OpenMp => "host C++ with OpenMP pragmas",
        TargetBackend::Cuda => "CUDA kernels",
        TargetBackend::Hip => "HIP kernels",
        TargetBackend::Dpcpp => "SYCL kernels submitted to a queue",
    }
}

/// List the supported backends, marking the configured default.
pub fn backends_command(config: &CliConfig) -> Result<()> {
    for backend in TargetBackend::all() {
        let marker = if backend == config.pipeline.backend {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<8} {}", backend.to_string(), describe(backend));
    }
    Ok(())
}
