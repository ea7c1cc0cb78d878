use super::loop_info::{parse_loop_header, role_of, LoopInfo};
use crate::params::{AttributedLoop, Axis, LoopType};
use okl_core::syntax::{NodeId, Stmt, StmtKind};
use okl_core::{Error, ErrorCode, Result};
use std::collections::HashMap;
use tracing::debug;

/// A directly nested attributed loop, as seen from its enclosing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLoop {
    pub id: NodeId,
    pub role: LoopType,
    pub nobarrier: bool,
}

/// Attributed-loop nesting of one translation unit.
///
/// Loops are entered pre-order and left post-order. Each [`LoopInfo`] is
/// built on entry, with `Auto` axes resolved against the loops enclosing
/// it, and stays cached until the context is dropped.
#[derive(Debug, Default)]
pub struct SemanticLoopContext {
    loops: HashMap<NodeId, LoopInfo>,
    stack: Vec<NodeId>,
    sync_plan: HashMap<NodeId, bool>,
}

impl SemanticLoopContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loop_info(&self, id: NodeId) -> Option<&LoopInfo> {
        self.loops.get(&id)
    }

    pub fn current(&self) -> Option<&LoopInfo> {
        self.stack.last().and_then(|id| self.loops.get(id))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Enclosing attributed loops of `id`, innermost first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &LoopInfo> {
        let mut next = self.loops.get(&id).and_then(|info| info.parent);
        std::iter::from_fn(move || {
            let info = self.loops.get(&next?)?;
            next = info.parent;
            Some(info)
        })
    }

    /// True when no enclosing loop has a sub-loop of `loop_type`.
    pub fn is_outermost(&self, id: NodeId, loop_type: LoopType) -> bool {
        !self.ancestors(id).any(|info| info.has_type(loop_type))
    }

    /// Record which inner children of a loop need a barrier after them:
    /// every inner child except the last one, unless it opts out.
    pub fn plan_sync(&mut self, children: &[ChildLoop]) {
        let inner: Vec<&ChildLoop> = children
            .iter()
            .filter(|child| child.role == LoopType::Inner)
            .collect();
        let Some((_, rest)) = inner.split_last() else {
            return;
        };
        for child in rest {
            self.sync_plan.insert(child.id, !child.nobarrier);
        }
    }

    pub fn enter_loop(
        &mut self,
        source: &str,
        stmt: &Stmt,
        bindings: &[AttributedLoop],
    ) -> Result<&LoopInfo> {
        let for_stmt = stmt
            .as_for()
            .ok_or_else(|| Error::internal(format!("node {} is not a for loop", stmt.id)))?;
        let header = parse_loop_header(source, for_stmt)?;
        let parent = self.stack.last().copied();

        validate_nesting(bindings, stmt)?;
        if bindings.iter().any(|b| b.loop_type == LoopType::Outer)
            && parent.is_some_and(|p| {
                self.loops.get(&p).is_some_and(|info| info.has_type(LoopType::Inner))
                    || self.ancestors(p).any(|info| info.has_type(LoopType::Inner))
            })
        {
            return Err(Error::new(
                ErrorCode::LoopNesting,
                "[@outer] loop cannot be nested inside an [@inner] loop",
            )
            .with_span(stmt.span));
        }

        let loops = self.resolve_axes(parent, bindings, stmt)?;
        let info = LoopInfo {
            node_id: stmt.id,
            parent,
            var: header.var,
            range: header.range,
            inc: header.inc,
            role: role_of(&loops),
            loops,
            sync_required: self.sync_plan.get(&stmt.id).copied().unwrap_or(false),
        };
        debug!(
            node = stmt.id,
            var = %info.var.name,
            role = %info.role,
            axes = ?info.axes(),
            "entered attributed loop"
        );
        self.stack.push(stmt.id);
        self.loops.insert(stmt.id, info);
        self.loops
            .get(&stmt.id)
            .ok_or_else(|| Error::internal("loop info vanished"))
    }

    pub fn exit_loop(&mut self, id: NodeId) {
        if self.stack.last() == Some(&id) {
            self.stack.pop();
        }
    }

    /// Bind every `Auto` axis to the lowest axis not already taken by an
    /// enclosing loop of the same type, walking sub-loops in order.
    fn resolve_axes(
        &self,
        parent: Option<NodeId>,
        bindings: &[AttributedLoop],
        stmt: &Stmt,
    ) -> Result<Vec<AttributedLoop>> {
        let mut taken: HashMap<LoopType, Vec<Axis>> = HashMap::new();
        if let Some(parent) = parent {
            let chain = self
                .loops
                .get(&parent)
                .into_iter()
                .chain(self.ancestors(parent));
            for info in chain {
                for attributed in info.loops.iter().filter(|l| l.is_parallel()) {
                    taken.entry(attributed.loop_type).or_default().push(attributed.axis);
                }
            }
        }

        let mut resolved = Vec::with_capacity(bindings.len());
        for attributed in bindings {
            if !attributed.is_parallel() {
                resolved.push(*attributed);
                continue;
            }
            let used = taken.entry(attributed.loop_type).or_default();
            let axis = if attributed.axis.is_auto() {
                Axis::RESOLVED
                    .into_iter()
                    .find(|axis| !used.contains(axis))
                    .ok_or_else(|| {
                        Error::new(
                            ErrorCode::UnresolvedAxis,
                            format!("no free axis left for [@{}] loop", attributed.loop_type),
                        )
                        .with_span(stmt.span)
                    })?
            } else {
                attributed.axis
            };
            used.push(axis);
            resolved.push(AttributedLoop {
                axis,
                ..*attributed
            });
        }
        Ok(resolved)
    }
}

fn validate_nesting(bindings: &[AttributedLoop], stmt: &Stmt) -> Result<()> {
    if let [first, second] = bindings {
        if first.loop_type == LoopType::Inner && second.loop_type == LoopType::Outer {
            return Err(Error::new(
                ErrorCode::LoopNesting,
                "[@tile] cannot place an [@outer] loop inside an [@inner] loop",
            )
            .with_span(stmt.span));
        }
    }
    Ok(())
}

/// `for` statements nested directly in `body`, without descending into
/// other `for` loops.
pub fn child_loops(body: &Stmt) -> Vec<&Stmt> {
    let mut out = Vec::new();
    collect_child_loops(body, &mut out);
    out
}

fn collect_child_loops<'a>(stmt: &'a Stmt, out: &mut Vec<&'a Stmt>) {
    match &stmt.kind {
        StmtKind::For(_) => out.push(stmt),
        StmtKind::Compound(block) => {
            for child in &block.stmts {
                collect_child_loops(child, out);
            }
        }
        StmtKind::If {
            then, otherwise, ..
        } => {
            collect_child_loops(then, out);
            if let Some(otherwise) = otherwise {
                collect_child_loops(otherwise, out);
            }
        }
        StmtKind::RangeFor { body }
        | StmtKind::While { body, .. }
        | StmtKind::Do { body, .. }
        | StmtKind::Switch { body, .. }
        | StmtKind::Labeled { body } => collect_child_loops(body, out),
        StmtKind::Jump
        | StmtKind::Decl(_)
        | StmtKind::Expr
        | StmtKind::Null
        | StmtKind::Directive
        | StmtKind::Other => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use okl_core::syntax::parse;
    use pretty_assertions::assert_eq;

    fn loops_in(source: &str) -> Vec<Stmt> {
        let tu = parse(source).expect("parse");
        let func = tu.decls[0].as_function().expect("function");
        let body = func.body.as_ref().expect("body");
        child_loops(body).into_iter().cloned().collect()
    }

    fn body_loops(stmt: &Stmt) -> Vec<Stmt> {
        let for_stmt = stmt.as_for().expect("for");
        child_loops(&for_stmt.body).into_iter().cloned().collect()
    }

    #[test]
    fn auto_axes_take_lowest_free_slot_outer_to_inner() {
        let src = "void k() { for (int b = 0; b < 4; ++b) { for (int t = 0; t < 8; ++t) {} } }";
        let outer = loops_in(src).remove(0);
        let inner = body_loops(&outer).remove(0);

        let mut sema = SemanticLoopContext::new();
        let auto_outer = [AttributedLoop::outer(Axis::Auto)];
        let info = sema.enter_loop(src, &outer, &auto_outer).expect("outer");
        assert_eq!(info.axes(), vec![Axis::X]);

        let tile = [
            AttributedLoop::outer(Axis::Auto),
            AttributedLoop::outer(Axis::Auto),
        ];
        let info = sema.enter_loop(src, &inner, &tile).expect("tile");
        assert_eq!(info.axes(), vec![Axis::Y, Axis::Z]);
        assert_eq!(info.parent, Some(outer.id));
        assert!(!sema.is_outermost(inner.id, LoopType::Outer));
        assert!(sema.is_outermost(outer.id, LoopType::Outer));

        sema.exit_loop(inner.id);
        sema.exit_loop(outer.id);
        assert_eq!(sema.depth(), 0);
    }

    #[test]
    fn explicit_axes_are_kept_and_reserved() {
        let src = "void k() { for (int b = 0; b < 4; ++b) { for (int t = 0; t < 8; ++t) {} } }";
        let outer = loops_in(src).remove(0);
        let inner = body_loops(&outer).remove(0);
        let mut sema = SemanticLoopContext::new();
        sema.enter_loop(src, &outer, &[AttributedLoop::outer(Axis::X)])
            .expect("outer");
        let info = sema
            .enter_loop(src, &inner, &[AttributedLoop::outer(Axis::Auto)])
            .expect("inner");
        assert_eq!(info.axes(), vec![Axis::Y]);
    }

    #[test]
    fn runs_out_of_axes() {
        let src = "void k() { for (int a = 0; a < 4; ++a) { for (int b = 0; b < 4; ++b) { for (int c = 0; c < 4; ++c) { for (int d = 0; d < 4; ++d) {} } } } }";
        let mut stmts = loops_in(src);
        let mut sema = SemanticLoopContext::new();
        let auto = [AttributedLoop::inner(Axis::Auto)];
        for _ in 0..3 {
            let stmt = stmts.remove(0);
            sema.enter_loop(src, &stmt, &auto).expect("free axis");
            stmts = body_loops(&stmt);
        }
        let err = sema
            .enter_loop(src, &stmts[0], &auto)
            .expect_err("no axis");
        assert_eq!(err.code, ErrorCode::UnresolvedAxis);
    }

    #[test]
    fn outer_inside_inner_is_rejected() {
        let src = "void k() { for (int t = 0; t < 4; ++t) { for (int b = 0; b < 4; ++b) {} } }";
        let inner = loops_in(src).remove(0);
        let outer = body_loops(&inner).remove(0);
        let mut sema = SemanticLoopContext::new();
        sema.enter_loop(src, &inner, &[AttributedLoop::inner(Axis::Auto)])
            .expect("inner");
        let err = sema
            .enter_loop(src, &outer, &[AttributedLoop::outer(Axis::Auto)])
            .expect_err("nesting");
        assert_eq!(err.code, ErrorCode::LoopNesting);

        let tile = [
            AttributedLoop::inner(Axis::Auto),
            AttributedLoop::outer(Axis::Auto),
        ];
        let err = SemanticLoopContext::new()
            .enter_loop(src, &inner, &tile)
            .map(|_| ())
            .expect_err("tile nesting");
        assert_eq!(err.code, ErrorCode::LoopNesting);
    }

    #[test]
    fn every_inner_child_but_the_last_synchronizes() {
        let children = [
            ChildLoop {
                id: 1,
                role: LoopType::Inner,
                nobarrier: false,
            },
            ChildLoop {
                id: 2,
                role: LoopType::Inner,
                nobarrier: true,
            },
            ChildLoop {
                id: 3,
                role: LoopType::Regular,
                nobarrier: false,
            },
            ChildLoop {
                id: 4,
                role: LoopType::Inner,
                nobarrier: false,
            },
        ];
        let mut sema = SemanticLoopContext::new();
        sema.plan_sync(&children);
        assert_eq!(sema.sync_plan.get(&1), Some(&true));
        assert_eq!(sema.sync_plan.get(&2), Some(&false));
        assert_eq!(sema.sync_plan.get(&4), None);
    }

    #[test]
    fn child_loops_skip_nested_for_bodies() {
        let src = "void k() { for (int a = 0; a < 4; ++a) { if (a) { for (int b = 0; b < 4; ++b) { for (int c = 0; c < 4; ++c) {} } } for (int d = 0; d < 4; ++d) {} } }";
        let top = loops_in(src);
        assert_eq!(top.len(), 1);
        assert_eq!(body_loops(&top[0]).len(), 2);
    }
}
