use super::cuda_subset::{register_for, SYNC_THREADS_BARRIER};
use super::simt::SimtDialect;
use crate::params::BarrierScope;
use crate::registry::AttributeRegistry;
use crate::session::SessionStage;
use okl_core::syntax::{NodeKind, NodeRef};
use okl_core::transpilation::{Transpilation, TranspilationBuilder};
use okl_core::{Result, TargetBackend};

pub const HIP_RUNTIME_INCLUDE: &str = "<hip/hip_runtime.h>";

const AXES: [&str; 3] = ["x", "y", "z"];

pub struct Hip;

impl SimtDialect for Hip {
    fn group_index(axis: usize) -> String {
        format!("hipBlockIdx_{}", AXES[axis])
    }

    fn local_index(axis: usize) -> String {
        format!("hipThreadIdx_{}", AXES[axis])
    }

    fn barrier(_scope: BarrierScope) -> String {
        SYNC_THREADS_BARRIER.to_string()
    }
}

fn handle_translation_unit(node: NodeRef<'_>, _stage: &mut SessionStage<'_>) -> Result<Transpilation> {
    Ok(TranspilationBuilder::new(node)
        .add_include(HIP_RUNTIME_INCLUDE)
        .build())
}

pub fn register(registry: &mut AttributeRegistry) {
    register_for::<Hip>(registry, TargetBackend::Hip);
    registry.register_implicit(
        TargetBackend::Hip,
        NodeKind::TranslationUnit,
        handle_translation_unit,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hip_spells_indices_with_prefixed_builtins() {
        assert_eq!(Hip::group_index(0), "hipBlockIdx_x");
        assert_eq!(Hip::local_index(2), "hipThreadIdx_z");
        assert_eq!(Hip::barrier(BarrierScope::Global), "__syncthreads();");
    }
}
