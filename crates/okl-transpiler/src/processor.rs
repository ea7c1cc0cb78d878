//! Attribute-driven traversal of one translation unit.
//!
//! The pre-order hook parses attribute arguments and enters attributed
//! loops into the semantic context; the post-order hook runs the backend
//! handlers (or the implicit handler of unattributed nodes) and collects
//! their transpilations. Nothing is written to the source until the whole
//! tree has been visited without errors.

use crate::frontend::{KERNEL_ATTR_NAME, LOOP_ATTR_NAMES, NOBARRIER_ATTR_NAME};
use crate::metadata::KernelInfo;
use crate::params::{LoopType, ParsedParams};
use crate::registry::{bootstrap, AttributeRegistry};
use crate::sema::{child_loops, role_of, ChildLoop};
use crate::session::SessionStage;
use okl_core::syntax::{
    walk, AttrNode, Decl, NodeId, NodeKind, NodeRef, Stmt, TranslationUnit, Visitor,
};
use okl_core::transpilation::{SlotName, Transpilation, TranspilationBuilder, TranspilationSet};
use okl_core::{Error, ErrorCode, Span};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use tracing::{debug, info};

/// Transpile `tu` for the stage's backend using the global registry.
pub fn transpile_unit(
    stage: &mut SessionStage<'_>,
    tu: &TranslationUnit,
) -> Result<String, Vec<Error>> {
    transpile_with(bootstrap(), stage, tu)
}

pub fn transpile_with(
    registry: &AttributeRegistry,
    stage: &mut SessionStage<'_>,
    tu: &TranslationUnit,
) -> Result<String, Vec<Error>> {
    let source = stage.source();
    let mut processor = Processor::new(registry, stage);
    let _ = walk(tu, &mut processor);
    let set = processor.finish();

    if stage.has_errors() {
        return Err(stage.take_errors());
    }
    if let Some(meta) = stage.take_kernel_meta() {
        info!(kernels = meta.kernels.len(), backend = %meta.backend, "collected kernel metadata");
        stage.session_mut().set_metadata(meta);
    }
    set.apply(source).map_err(|err| vec![err])
}

struct Processor<'r, 's, 'src> {
    registry: &'r AttributeRegistry,
    stage: &'s mut SessionStage<'src>,
    set: TranspilationSet,
    params: HashMap<(NodeId, usize), ParsedParams>,
    failed_loops: HashSet<NodeId>,
}

fn located(err: Error, span: Span) -> Error {
    if err.span.is_some() {
        err
    } else {
        err.with_span(span)
    }
}

impl<'r, 's, 'src> Processor<'r, 's, 'src> {
    fn new(registry: &'r AttributeRegistry, stage: &'s mut SessionStage<'src>) -> Self {
        Self {
            registry,
            stage,
            set: TranspilationSet::new(),
            params: HashMap::new(),
            failed_loops: HashSet::new(),
        }
    }

    fn finish(self) -> TranspilationSet {
        self.set
    }

    /// Soft errors warn, fatal ones stop the walk, the rest fail the stage
    /// once the walk is over.
    fn report(&mut self, err: Error) -> ControlFlow<()> {
        if err.code.is_soft() {
            self.stage.push_warning(err);
            ControlFlow::Continue(())
        } else if err.code.is_fatal() {
            self.stage.push_error(err);
            ControlFlow::Break(())
        } else {
            self.stage.push_error(err);
            ControlFlow::Continue(())
        }
    }

    fn parse_attrs(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let registry = self.registry;
        for (idx, attr) in node.attrs().iter().enumerate() {
            let Some(payload) = attr.okl_payload() else {
                continue;
            };
            let Some(frontend) = registry.frontend(&payload.name) else {
                self.report(
                    Error::new(
                        ErrorCode::NoHandler,
                        format!("no handler registered for [@{}]", payload.name),
                    )
                    .with_span(attr.span),
                )?;
                continue;
            };
            match (frontend.parse)(&payload) {
                Ok(params) => {
                    self.params.insert((node.id(), idx), params);
                }
                Err(err) => self.report(located(err, attr.span))?,
            }
        }
        ControlFlow::Continue(())
    }

    /// Loop role and barrier opt-out of a loop not yet visited.
    fn classify(&self, child: &Stmt) -> ChildLoop {
        let mut bindings = Vec::new();
        let mut nobarrier = false;
        for payload in child.attrs.iter().filter_map(AttrNode::okl_payload) {
            if payload.name == NOBARRIER_ATTR_NAME {
                nobarrier = true;
            } else if LOOP_ATTR_NAMES.contains(&payload.name.as_str()) {
                if let Some(Ok(params)) = self
                    .registry
                    .frontend(&payload.name)
                    .map(|frontend| (frontend.parse)(&payload))
                {
                    bindings.extend(params.loop_bindings());
                }
            }
        }
        ChildLoop {
            id: child.id,
            role: role_of(&bindings),
            nobarrier,
        }
    }

    fn enter_loop(&mut self, stmt: &Stmt) -> ControlFlow<()> {
        let Some(for_stmt) = stmt.as_for() else {
            return ControlFlow::Continue(());
        };
        let bindings: Vec<_> = (0..stmt.attrs.len())
            .filter_map(|idx| self.params.get(&(stmt.id, idx)))
            .flat_map(ParsedParams::loop_bindings)
            .collect();
        if bindings.is_empty() {
            return ControlFlow::Continue(());
        }

        if role_of(&bindings) == LoopType::Outer {
            let children: Vec<ChildLoop> = child_loops(&for_stmt.body)
                .into_iter()
                .map(|child| self.classify(child))
                .collect();
            self.stage.sema_mut().plan_sync(&children);
        }

        let source = self.stage.source();
        if let Err(err) = self.stage.sema_mut().enter_loop(source, stmt, &bindings) {
            self.failed_loops.insert(stmt.id);
            return self.report(located(err, stmt.span));
        }
        ControlFlow::Continue(())
    }

    fn run_implicit(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let Some(handler) = self.registry.implicit(self.stage.backend(), node.kind()) else {
            return ControlFlow::Continue(());
        };
        match handler(node, self.stage) {
            Ok(transpilation) if !transpilation.is_empty() => {
                self.set.insert(transpilation);
                ControlFlow::Continue(())
            }
            Ok(_) => ControlFlow::Continue(()),
            Err(err) => self.report(located(err, node.span())),
        }
    }

    fn run_attrs(&mut self, node: NodeRef<'_>, typed: &[AttrNode]) -> ControlFlow<()> {
        let mut attr_slot_taken = false;
        for (idx, attr) in node.attrs().iter().enumerate() {
            let Some(payload) = attr.okl_payload() else {
                continue;
            };
            let Some(params) = self.params.remove(&(node.id(), idx)) else {
                continue;
            };
            if self.failed_loops.contains(&node.id()) {
                continue;
            }
            self.dispatch(node, attr, &payload.name, &params, &mut attr_slot_taken)?;
        }
        for attr in typed {
            let Some(payload) = attr.okl_payload() else {
                continue;
            };
            let parsed = self
                .registry
                .frontend(&payload.name)
                .map(|frontend| (frontend.parse)(&payload));
            match parsed {
                Some(Ok(params)) => {
                    self.dispatch(node, attr, &payload.name, &params, &mut attr_slot_taken)?
                }
                Some(Err(err)) => self.report(located(err, node.span()))?,
                None => {}
            }
        }
        ControlFlow::Continue(())
    }

    /// Run the backend handler of one attribute; the first handler that
    /// rewrites the attribute slot wins.
    fn dispatch(
        &mut self,
        node: NodeRef<'_>,
        attr: &AttrNode,
        name: &str,
        params: &ParsedParams,
        attr_slot_taken: &mut bool,
    ) -> ControlFlow<()> {
        let registry = self.registry;
        let backend = self.stage.backend();
        let kind = node.kind();
        let applies = registry
            .frontend(name)
            .is_some_and(|frontend| frontend.applies_to(kind));
        if !applies {
            return self.report(
                Error::new(
                    ErrorCode::AttributeNotApplicable,
                    format!("[@{name}] cannot be applied to {kind}"),
                )
                .with_span(attr.span),
            );
        }

        let Some(handlers) = registry.backend_handlers(backend, name) else {
            let err = if registry.supports_backend(backend) {
                Error::new(
                    ErrorCode::NoHandler,
                    format!("[@{name}] has no {backend} handler"),
                )
            } else {
                Error::new(
                    ErrorCode::UnknownBackend,
                    format!("no handlers registered for backend {backend}"),
                )
            };
            return self.report(err.with_span(attr.span));
        };
        let Some(handler) = handlers.iter().find(|h| h.node_kind == kind) else {
            return self.report(
                Error::new(
                    ErrorCode::AttributeNotApplicable,
                    format!("[@{name}] has no {backend} handler for {kind}"),
                )
                .with_span(attr.span),
            );
        };

        debug!(node = node.id(), %kind, "handle [@{name}] for {backend}");
        let transpilation = match (handler.generate)(attr, node, params, self.stage) {
            Ok(transpilation) => transpilation,
            Err(err) => return self.report(located(err, attr.span)),
        };
        if transpilation.is_empty() {
            return ControlFlow::Continue(());
        }
        if transpilation.has_slot(SlotName::Attr) {
            if *attr_slot_taken {
                debug!(node = node.id(), "[@{name}] attribute slot already rewritten");
                return ControlFlow::Continue(());
            }
            *attr_slot_taken = true;
        }
        if name == KERNEL_ATTR_NAME {
            self.record_kernel(node, &transpilation);
        }
        self.set.insert(transpilation);
        ControlFlow::Continue(())
    }

    /// Attributes that decorate a declared object rather than a statement
    /// and can therefore ride on a type alias.
    fn is_type_attr(&self, name: &str) -> bool {
        self.registry.frontend(name).is_some_and(|frontend| {
            frontend.applies_to(NodeKind::Var) || frontend.applies_to(NodeKind::Param)
        })
    }

    fn record_attributed_type(&mut self, decl: &Decl) {
        let Some(typedef) = decl.as_typedef() else {
            return;
        };
        let carried: Vec<AttrNode> = decl
            .attrs
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.params.contains_key(&(decl.id, *idx)))
            .filter(|(_, attr)| {
                attr.okl_payload()
                    .is_some_and(|payload| self.is_type_attr(&payload.name))
            })
            .map(|(_, attr)| attr.clone())
            .collect();
        if !carried.is_empty() {
            self.stage
                .attributed_types_mut()
                .insert(typedef.name.clone(), carried);
        }
    }

    /// The alias keeps its type; its OKL attributes are dropped from the
    /// output and applied at each use instead.
    fn strip_typedef(&mut self, node: NodeRef<'_>) -> ControlFlow<()> {
        let mut builder = TranspilationBuilder::new(node);
        let mut stripped = false;
        for (idx, attr) in node.attrs().iter().enumerate() {
            let Some(payload) = attr.okl_payload() else {
                continue;
            };
            if self.params.remove(&(node.id(), idx)).is_none() {
                continue;
            }
            if self.is_type_attr(&payload.name) {
                builder = builder.add_replacement(SlotName::Attr, attr.removal_span, "");
                stripped = true;
            } else {
                self.report(
                    Error::new(
                        ErrorCode::AttributeNotApplicable,
                        format!("[@{}] cannot be applied to Typedef", payload.name),
                    )
                    .with_span(attr.span),
                )?;
            }
        }
        if stripped {
            self.set.insert(builder.build());
        }
        ControlFlow::Continue(())
    }

    /// Attributes a variable or parameter inherits from the aliases in its
    /// type, anchored at the start of the declaration.
    fn typed_attrs(&self, node: NodeRef<'_>) -> Vec<AttrNode> {
        let Some(types) = self.stage.attributed_types() else {
            return Vec::new();
        };
        let type_text = match node {
            NodeRef::Decl(decl) => decl.as_var().map(|var| var.type_text.as_str()),
            NodeRef::Param(param) => Some(param.type_text.as_str()),
            _ => None,
        };
        let Some(type_text) = type_text else {
            return Vec::new();
        };
        let kind = node.kind();
        let anchor = Span::empty_at(node.span().lo);
        types
            .carried_by(type_text)
            .into_iter()
            .filter(|attr| {
                attr.okl_payload()
                    .and_then(|payload| self.registry.frontend(&payload.name))
                    .is_some_and(|frontend| frontend.applies_to(kind))
            })
            .filter(|attr| !node.attrs().iter().any(|own| own.name == attr.name))
            .map(|attr| AttrNode {
                span: anchor,
                removal_span: anchor,
                ..attr.clone()
            })
            .collect()
    }

    fn record_kernel(&mut self, node: NodeRef<'_>, transpilation: &Transpilation) {
        let Some(func) = node.as_decl().and_then(|decl| decl.as_function()) else {
            return;
        };
        let emitted = transpilation
            .slot_text(SlotName::Name)
            .unwrap_or(func.name.as_str());
        let kernel = KernelInfo::new(func, emitted);
        self.stage.kernel_meta_mut().kernels.push(kernel);
    }
}

impl<'ast> Visitor<'ast> for Processor<'_, '_, '_> {
    fn pre(&mut self, node: NodeRef<'ast>) -> ControlFlow<()> {
        self.parse_attrs(node)?;
        match node {
            NodeRef::Stmt(stmt) => self.enter_loop(stmt),
            NodeRef::Decl(decl) => {
                self.record_attributed_type(decl);
                ControlFlow::Continue(())
            }
            _ => ControlFlow::Continue(()),
        }
    }

    fn post(&mut self, node: NodeRef<'ast>) -> ControlFlow<()> {
        let flow = if node.kind() == NodeKind::Typedef && node.has_okl_attrs() {
            self.strip_typedef(node)
        } else {
            let typed = self.typed_attrs(node);
            if node.has_okl_attrs() || !typed.is_empty() {
                self.run_attrs(node, &typed)
            } else {
                self.run_implicit(node)
            }
        };
        if let Some(stmt) = node.as_stmt().filter(|stmt| stmt.as_for().is_some()) {
            if self.stage.sema().is_some() {
                self.stage.sema_mut().exit_loop(stmt.id);
            }
        }
        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TranspilerSession;
    use okl_core::syntax::parse;
    use okl_core::TargetBackend;
    use pretty_assertions::assert_eq;

    fn run(backend: TargetBackend, source: &str) -> (Result<String, Vec<Error>>, TranspilerSession) {
        let mut session = TranspilerSession::new(backend);
        let tu = parse(source).expect("parse");
        let result = {
            let mut stage = SessionStage::new(&mut session, source);
            transpile_unit(&mut stage, &tu)
        };
        (result, session)
    }

    #[test]
    fn kernel_is_renamed_and_recorded() {
        let src = r#"[[okl_kernel("")]] void add(const float *a, int n) {}"#;
        let (out, session) = run(TargetBackend::Cuda, src);
        assert_eq!(
            out.expect("transpile"),
            r#"extern "C" __global__ void _occa_add_0(const float *a, int n) {}"#
        );
        let meta = session.metadata().expect("metadata");
        let kernel = meta.kernel("add").expect("kernel");
        assert_eq!(kernel.emitted_name, "_occa_add_0");
        assert_eq!(kernel.args.len(), 2);
    }

    #[test]
    fn unknown_attribute_is_a_warning() {
        let src = r#"[[okl_bogus("")]] void f() {}"#;
        let (out, session) = run(TargetBackend::Serial, src);
        assert_eq!(out.expect("transpile"), src);
        assert_eq!(session.diagnostics().len(), 1);
        assert_eq!(session.diagnostics()[0].code.as_deref(), Some("NO_HANDLER"));
    }

    #[test]
    fn misplaced_attribute_is_a_warning() {
        let src = r#"[[okl_shared("")]] void f() {}"#;
        let (out, session) = run(TargetBackend::Cuda, src);
        assert_eq!(out.expect("transpile"), src);
        assert_eq!(
            session.diagnostics()[0].code.as_deref(),
            Some("ATTRIBUTE_NOT_APPLICABLE")
        );
    }

    #[test]
    fn bad_arguments_fail_the_stage() {
        let src = r#"void f() { [[okl_outer("(5)")]] for (int i = 0; i < 4; ++i) {} }"#;
        let (out, _) = run(TargetBackend::Cuda, src);
        let errors = out.expect_err("axis out of range");
        assert_eq!(errors[0].code, ErrorCode::AttributeArguments);
    }

    #[test]
    fn typedef_attributes_apply_to_each_use() {
        let src = "[[okl_shared(\"\")]] typedef float tile_t;\nvoid f() { tile_t s[16]; float t[4]; }";
        let (out, session) = run(TargetBackend::Cuda, src);
        let out = out.expect("transpile");
        assert!(out.contains("typedef float tile_t;"), "{out}");
        assert!(out.contains("__shared__ tile_t s[16];"), "{out}");
        assert!(out.contains(" float t[4];"), "{out}");
        assert!(!out.contains("okl_shared"), "{out}");
        assert!(session.diagnostics().is_empty());
    }

    #[test]
    fn restrict_typedef_reaches_kernel_parameters() {
        let src = "[[okl_restrict(\"\")]] typedef float *real_ptr;\n[[okl_kernel(\"\")]] void f(real_ptr a, int n) {}";
        let (out, _) = run(TargetBackend::Cuda, src);
        let out = out.expect("transpile");
        assert!(out.contains("real_ptr  __restrict__ a, int n"), "{out}");
        assert!(!out.contains("okl_restrict"), "{out}");
    }

    #[test]
    fn statement_attribute_on_typedef_is_a_warning() {
        let src = "[[okl_atomic(\"\")]] typedef int counter_t;\nvoid f() { counter_t c; }";
        let (out, session) = run(TargetBackend::Serial, src);
        assert_eq!(out.expect("transpile"), src);
        assert_eq!(
            session.diagnostics()[0].code.as_deref(),
            Some("ATTRIBUTE_NOT_APPLICABLE")
        );
    }

    #[test]
    fn outer_inside_inner_is_rejected() {
        let src = r#"void f() { [[okl_inner("")]] for (int i = 0; i < 4; ++i) { [[okl_outer("")]] for (int j = 0; j < 4; ++j) {} } }"#;
        let (out, _) = run(TargetBackend::Cuda, src);
        let errors = out.expect_err("nesting");
        assert_eq!(errors[0].code, ErrorCode::LoopNesting);
    }
}
