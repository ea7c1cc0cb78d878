//! Handler tables keyed by attribute name, backend and node kind.
//!
//! The table is filled exactly once by [`bootstrap`], which calls the
//! `register` function of the frontend and of every backend in a fixed
//! order, and is read-only afterwards.

use crate::params::ParsedParams;
use crate::session::SessionStage;
use crate::{backend, frontend};
use okl_core::attr::OklPayload;
use okl_core::syntax::{AttrNode, NodeKind, NodeRef};
use okl_core::transpilation::Transpilation;
use okl_core::{Result, TargetBackend};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{error, info};

pub type ParseFn = fn(&OklPayload) -> Result<ParsedParams>;
pub type GenerateFn =
    fn(&AttrNode, NodeRef<'_>, &ParsedParams, &mut SessionStage<'_>) -> Result<Transpilation>;
pub type ImplicitFn = fn(NodeRef<'_>, &mut SessionStage<'_>) -> Result<Transpilation>;

/// Backend-independent half of an attribute: where it may appear and how
/// its arguments are validated.
#[derive(Clone, Copy)]
pub struct FrontendHandler {
    pub applies_to: &'static [NodeKind],
    pub parse: ParseFn,
}

impl FrontendHandler {
    pub fn applies_to(&self, kind: NodeKind) -> bool {
        self.applies_to.contains(&kind)
    }
}

#[derive(Clone, Copy)]
pub struct AttrHandler {
    pub node_kind: NodeKind,
    pub generate: GenerateFn,
}

#[derive(Default)]
pub struct AttributeRegistry {
    frontends: HashMap<&'static str, FrontendHandler>,
    backends: HashMap<TargetBackend, HashMap<&'static str, Vec<AttrHandler>>>,
    implicits: HashMap<(TargetBackend, NodeKind), ImplicitFn>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_frontend(
        &mut self,
        name: &'static str,
        applies_to: &'static [NodeKind],
        parse: ParseFn,
    ) -> bool {
        if self.frontends.contains_key(name) {
            error!("failed to register frontend for [@{name}]: already registered");
            return false;
        }
        self.frontends
            .insert(name, FrontendHandler { applies_to, parse });
        true
    }

    pub fn register_backend(
        &mut self,
        backend: TargetBackend,
        name: &'static str,
        node_kind: NodeKind,
        generate: GenerateFn,
    ) -> bool {
        let handlers = self
            .backends
            .entry(backend)
            .or_default()
            .entry(name)
            .or_default();
        if handlers.iter().any(|h| h.node_kind == node_kind) {
            error!("failed to register [@{name}] handler for {backend} on {node_kind}: already registered");
            return false;
        }
        handlers.push(AttrHandler {
            node_kind,
            generate,
        });
        true
    }

    pub fn register_implicit(
        &mut self,
        backend: TargetBackend,
        node_kind: NodeKind,
        handler: ImplicitFn,
    ) -> bool {
        if self.implicits.contains_key(&(backend, node_kind)) {
            error!("failed to register implicit handler for {backend} on {node_kind}: already registered");
            return false;
        }
        self.implicits.insert((backend, node_kind), handler);
        true
    }

    pub fn frontend(&self, name: &str) -> Option<&FrontendHandler> {
        self.frontends.get(name)
    }

    pub fn backend_handlers(&self, backend: TargetBackend, name: &str) -> Option<&[AttrHandler]> {
        self.backends
            .get(&backend)?
            .get(name)
            .map(Vec::as_slice)
    }

    pub fn implicit(&self, backend: TargetBackend, node_kind: NodeKind) -> Option<ImplicitFn> {
        self.implicits.get(&(backend, node_kind)).copied()
    }

    /// At least one attribute handler exists for `backend`.
    pub fn supports_backend(&self, backend: TargetBackend) -> bool {
        self.backends
            .get(&backend)
            .is_some_and(|handlers| !handlers.is_empty())
    }

    pub fn attribute_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.frontends.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

static REGISTRY: OnceLock<AttributeRegistry> = OnceLock::new();

/// Populate the registry on first call; later calls return the same table.
pub fn bootstrap() -> &'static AttributeRegistry {
    REGISTRY.get_or_init(|| {
        let mut registry = AttributeRegistry::new();
        frontend::register(&mut registry);
        backend::register(&mut registry);
        info!(
            attributes = registry.frontends.len(),
            handlers = registry
                .backends
                .values()
                .flat_map(HashMap::values)
                .map(Vec::len)
                .sum::<usize>(),
            implicit = registry.implicits.len(),
            "attribute registry ready"
        );
        registry
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::transpilation::TranspilationBuilder;

    fn noop_parse(_: &OklPayload) -> Result<ParsedParams> {
        Ok(ParsedParams::Empty)
    }

    fn noop_generate(
        _: &AttrNode,
        node: NodeRef<'_>,
        _: &ParsedParams,
        _: &mut SessionStage<'_>,
    ) -> Result<Transpilation> {
        Ok(TranspilationBuilder::new(node).build())
    }

    #[test]
    fn duplicates_keep_the_first_registration() {
        let mut registry = AttributeRegistry::new();
        assert!(registry.register_frontend("kernel", &[NodeKind::Function], noop_parse));
        assert!(!registry.register_frontend("kernel", &[NodeKind::Var], noop_parse));
        assert!(registry
            .frontend("kernel")
            .is_some_and(|fe| fe.applies_to(NodeKind::Function)));

        assert!(registry.register_backend(TargetBackend::Cuda, "shared", NodeKind::Var, noop_generate));
        assert!(registry.register_backend(TargetBackend::Cuda, "shared", NodeKind::DeclStmt, noop_generate));
        assert!(!registry.register_backend(TargetBackend::Cuda, "shared", NodeKind::Var, noop_generate));
        assert_eq!(
            registry
                .backend_handlers(TargetBackend::Cuda, "shared")
                .map(<[AttrHandler]>::len),
            Some(2)
        );
        assert!(registry.supports_backend(TargetBackend::Cuda));
        assert!(!registry.supports_backend(TargetBackend::Hip));
    }

    #[test]
    fn bootstrap_registers_every_backend() {
        let registry = bootstrap();
        for backend in TargetBackend::all() {
            assert!(registry.supports_backend(backend), "{backend}");
            assert!(registry.backend_handlers(backend, "kernel").is_some(), "{backend}");
        }
        assert!(registry.backend_handlers(TargetBackend::Serial, "exclusive").is_none());
        assert!(registry
            .implicit(TargetBackend::Cuda, NodeKind::Function)
            .is_some());
        assert!(std::ptr::eq(registry, bootstrap()));
    }
}
