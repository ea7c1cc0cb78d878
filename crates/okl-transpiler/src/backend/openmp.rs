use super::common::handle_nobarrier;
use super::host::{
    handle_atomic, handle_barrier, handle_kernel, handle_loop, handle_restrict, handle_shared,
    handle_tile, HostDialect,
};
use crate::frontend::{
    ATOMIC_ATTR_NAME, BARRIER_ATTR_NAME, INNER_ATTR_NAME, KERNEL_ATTR_NAME, NOBARRIER_ATTR_NAME,
    OUTER_ATTR_NAME, RESTRICT_ATTR_NAME, SHARED_ATTR_NAME, TILE_ATTR_NAME,
};
use crate::registry::AttributeRegistry;
use crate::session::SessionStage;
use okl_core::syntax::{NodeKind, NodeRef};
use okl_core::transpilation::{Transpilation, TranspilationBuilder};
use okl_core::{Result, TargetBackend};

pub const OMP_INCLUDE: &str = "<omp.h>";

pub struct OpenMp;

impl HostDialect for OpenMp {
    const PARALLEL_FOR: Option<&'static str> = Some("\n#pragma omp parallel for\n");
    const ATOMIC: Option<&'static str> = Some("\n#pragma omp atomic\n");
    const CRITICAL: Option<&'static str> = Some("\n#pragma omp critical\n");
}

fn handle_translation_unit(node: NodeRef<'_>, _stage: &mut SessionStage<'_>) -> Result<Transpilation> {
    Ok(TranspilationBuilder::new(node).add_include(OMP_INCLUDE).build())
}

pub fn register(registry: &mut AttributeRegistry) {
    let backend = TargetBackend::OpenMp;
    registry.register_backend(backend, KERNEL_ATTR_NAME, NodeKind::Function, handle_kernel);
    registry.register_backend(backend, OUTER_ATTR_NAME, NodeKind::For, handle_loop::<OpenMp>);
    registry.register_backend(backend, INNER_ATTR_NAME, NodeKind::For, handle_loop::<OpenMp>);
    registry.register_backend(backend, TILE_ATTR_NAME, NodeKind::For, handle_tile::<OpenMp>);
    registry.register_backend(backend, SHARED_ATTR_NAME, NodeKind::Var, handle_shared);
    registry.register_backend(backend, RESTRICT_ATTR_NAME, NodeKind::Param, handle_restrict);
    registry.register_backend(backend, ATOMIC_ATTR_NAME, NodeKind::Expr, handle_atomic::<OpenMp>);
    registry.register_backend(backend, ATOMIC_ATTR_NAME, NodeKind::Compound, handle_atomic::<OpenMp>);
    registry.register_backend(backend, BARRIER_ATTR_NAME, NodeKind::Null, handle_barrier);
    registry.register_backend(backend, NOBARRIER_ATTR_NAME, NodeKind::For, handle_nobarrier);
    registry.register_implicit(backend, NodeKind::TranslationUnit, handle_translation_unit);
}
