use super::cuda_subset::{register_for, SYNC_THREADS_BARRIER};
use super::simt::SimtDialect;
use crate::params::BarrierScope;
use crate::registry::AttributeRegistry;
use okl_core::TargetBackend;

const AXES: [&str; 3] = ["x", "y", "z"];

pub struct Cuda;

impl SimtDialect for Cuda {
    fn group_index(axis: usize) -> String {
        format!("blockIdx.{}", AXES[axis])
    }

    fn local_index(axis: usize) -> String {
        format!("threadIdx.{}", AXES[axis])
    }

    fn barrier(_scope: BarrierScope) -> String {
        SYNC_THREADS_BARRIER.to_string()
    }
}

pub fn register(registry: &mut AttributeRegistry) {
    register_for::<Cuda>(registry, TargetBackend::Cuda);
}
