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
use okl_core::syntax::NodeKind;
use okl_core::TargetBackend;

pub struct Serial;

impl HostDialect for Serial {
    const PARALLEL_FOR: Option<&'static str> = None;
    const ATOMIC: Option<&'static str> = None;
    const CRITICAL: Option<&'static str> = None;
}

pub fn register(registry: &mut AttributeRegistry) {
    let backend = TargetBackend::Serial;
    registry.register_backend(backend, KERNEL_ATTR_NAME, NodeKind::Function, handle_kernel);
    registry.register_backend(backend, OUTER_ATTR_NAME, NodeKind::For, handle_loop::<Serial>);
    registry.register_backend(backend, INNER_ATTR_NAME, NodeKind::For, handle_loop::<Serial>);
    registry.register_backend(backend, TILE_ATTR_NAME, NodeKind::For, handle_tile::<Serial>);
    registry.register_backend(backend, SHARED_ATTR_NAME, NodeKind::Var, handle_shared);
    registry.register_backend(backend, RESTRICT_ATTR_NAME, NodeKind::Param, handle_restrict);
    registry.register_backend(backend, ATOMIC_ATTR_NAME, NodeKind::Expr, handle_atomic::<Serial>);
    registry.register_backend(backend, ATOMIC_ATTR_NAME, NodeKind::Compound, handle_atomic::<Serial>);
    registry.register_backend(backend, BARRIER_ATTR_NAME, NodeKind::Null, handle_barrier);
    registry.register_backend(backend, NOBARRIER_ATTR_NAME, NodeKind::For, handle_nobarrier);
}
