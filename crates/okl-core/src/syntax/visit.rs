use super::{Decl, DeclKind, NodeRef, Stmt, StmtKind, TranslationUnit};
use std::ops::ControlFlow;

/// Depth-first traversal hooks. `pre` runs before a node's children,
/// `post` after them; returning `Break` stops the whole walk.
pub trait Visitor<'ast> {
    fn pre(&mut self, _node: NodeRef<'ast>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn post(&mut self, _node: NodeRef<'ast>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

pub fn walk<'ast, V: Visitor<'ast>>(tu: &'ast TranslationUnit, visitor: &mut V) -> ControlFlow<()> {
    let node = NodeRef::TranslationUnit(tu);
    visitor.pre(node)?;
    for decl in &tu.decls {
        walk_decl(decl, visitor)?;
    }
    visitor.post(node)
}

fn walk_decl<'ast, V: Visitor<'ast>>(decl: &'ast Decl, visitor: &mut V) -> ControlFlow<()> {
    let node = NodeRef::Decl(decl);
    visitor.pre(node)?;
    match &decl.kind {
        DeclKind::Function(func) => {
            for param in &func.params {
                let node = NodeRef::Param(param);
                visitor.pre(node)?;
                visitor.post(node)?;
            }
            if let Some(body) = &func.body {
                walk_stmt(body, visitor)?;
            }
        }
        DeclKind::Namespace(decls) | DeclKind::Linkage(decls) => {
            for child in decls {
                walk_decl(child, visitor)?;
            }
        }
        DeclKind::Var(_) | DeclKind::Typedef(_) | DeclKind::Directive | DeclKind::Other => {}
    }
    visitor.post(node)
}

fn walk_stmt<'ast, V: Visitor<'ast>>(stmt: &'ast Stmt, visitor: &mut V) -> ControlFlow<()> {
    let node = NodeRef::Stmt(stmt);
    visitor.pre(node)?;
    match &stmt.kind {
        StmtKind::Compound(compound) => {
            for child in &compound.stmts {
                walk_stmt(child, visitor)?;
            }
        }
        StmtKind::For(for_stmt) => walk_stmt(&for_stmt.body, visitor)?,
        StmtKind::RangeFor { body }
        | StmtKind::While { body, .. }
        | StmtKind::Do { body, .. }
        | StmtKind::Switch { body, .. }
        | StmtKind::Labeled { body } => walk_stmt(body, visitor)?,
        StmtKind::If {
            then, otherwise, ..
        } => {
            walk_stmt(then, visitor)?;
            if let Some(otherwise) = otherwise {
                walk_stmt(otherwise, visitor)?;
            }
        }
        StmtKind::Decl(decl) => walk_decl(decl, visitor)?,
        StmtKind::Jump
        | StmtKind::Expr
        | StmtKind::Null
        | StmtKind::Directive
        | StmtKind::Other => {}
    }
    visitor.post(node)
}
