//! A deliberately small C++ syntax tree: enough structure to find
//! declarations, loop headers and attribute attachment points, with every
//! node keeping byte spans into the parsed text.

mod parser;
mod visit;

pub use parser::{join_tokens, parse};
pub use visit::{walk, Visitor};

use crate::attr::OklPayload;
use crate::span::Span;

pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrSyntax {
    /// `[[name(args)]]`
    Cxx11,
    /// `__attribute__((name(args)))`
    Gnu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrNode {
    /// Name as written, possibly scoped (`gnu::aligned`).
    pub name: String,
    /// Text between the argument parentheses.
    pub args: Option<String>,
    pub syntax: AttrSyntax,
    pub span: Span,
    /// Text to delete so the attribute disappears without leaving an empty
    /// `[[ ]]` or `__attribute__(())` group behind.
    pub removal_span: Span,
}

impl AttrNode {
    pub fn okl_payload(&self) -> Option<OklPayload> {
        OklPayload::from_parts(&self.name, self.args.as_deref())
    }

    pub fn is_okl(&self) -> bool {
        self.okl_payload().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display)]
pub enum NodeKind {
    TranslationUnit,
    Function,
    Var,
    Param,
    Typedef,
    Namespace,
    Directive,
    DeclStmt,
    Compound,
    For,
    RangeFor,
    While,
    Do,
    If,
    Switch,
    Labeled,
    Jump,
    Expr,
    Null,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub decls: Vec<Decl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub id: NodeId,
    pub attrs: Vec<AttrNode>,
    pub kind: DeclKind,
    /// From the first specifier token, excluding leading attributes.
    pub span: Span,
    pub full_span: Span,
    /// Declared at namespace scope.
    pub is_global: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Function(FunctionDecl),
    Var(VarDecl),
    Typedef(TypedefDecl),
    Namespace(Vec<Decl>),
    /// `extern "C" { ... }`
    Linkage(Vec<Decl>),
    Directive,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: Span,
    pub return_type: String,
    pub params: Vec<Param>,
    pub lparen: Span,
    pub rparen: Span,
    pub body: Option<Box<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub id: NodeId,
    pub attrs: Vec<AttrNode>,
    pub type_text: String,
    pub name: Option<String>,
    pub name_span: Option<Span>,
    pub is_const: bool,
    pub is_pointer: bool,
    pub span: Span,
    pub full_span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub type_text: String,
    pub is_constexpr: bool,
    pub specifier_const: bool,
    pub declarators: Vec<Declarator>,
}

impl VarDecl {
    /// The object itself is `const`: `const int x`, `int *const p`,
    /// `const float a[4]`, but not `const int *p`.
    pub fn is_top_level_const(&self) -> bool {
        self.declarators.first().is_some_and(|d| {
            if d.pointer_depth == 0 {
                self.specifier_const
            } else {
                d.const_pointer
            }
        })
    }
}

/// `typedef float *real_ptr;`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedefDecl {
    pub name: String,
    pub name_span: Span,
    /// Aliased type without the new name.
    pub type_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declarator {
    pub name: String,
    pub name_span: Span,
    pub pointer_depth: usize,
    /// The outermost pointer level is `const`.
    pub const_pointer: bool,
    pub array_dims: Vec<String>,
    pub init: Option<Span>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub id: NodeId,
    pub attrs: Vec<AttrNode>,
    pub kind: StmtKind,
    /// From the first token after leading attributes.
    pub span: Span,
    pub full_span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Compound(CompoundStmt),
    For(ForStmt),
    RangeFor { body: Box<Stmt> },
    While { cond: Span, body: Box<Stmt> },
    Do { body: Box<Stmt>, cond: Span },
    If {
        cond: Span,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    Switch { cond: Span, body: Box<Stmt> },
    Labeled { body: Box<Stmt> },
    Jump,
    Decl(Decl),
    Expr,
    Null,
    Directive,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundStmt {
    pub lbrace: Span,
    pub rbrace: Span,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForStmt {
    pub for_kw: Span,
    pub lparen: Span,
    pub init: Span,
    pub cond: Span,
    pub inc: Span,
    pub rparen: Span,
    pub body: Box<Stmt>,
}

impl Stmt {
    pub fn kind(&self) -> NodeKind {
        match &self.kind {
            StmtKind::Compound(_) => NodeKind::Compound,
            StmtKind::For(_) => NodeKind::For,
            StmtKind::RangeFor { .. } => NodeKind::RangeFor,
            StmtKind::While { .. } => NodeKind::While,
            StmtKind::Do { .. } => NodeKind::Do,
            StmtKind::If { .. } => NodeKind::If,
            StmtKind::Switch { .. } => NodeKind::Switch,
            StmtKind::Labeled { .. } => NodeKind::Labeled,
            StmtKind::Jump => NodeKind::Jump,
            StmtKind::Decl(_) => NodeKind::DeclStmt,
            StmtKind::Expr => NodeKind::Expr,
            StmtKind::Null => NodeKind::Null,
            StmtKind::Directive => NodeKind::Directive,
            StmtKind::Other => NodeKind::Other,
        }
    }

    pub fn as_for(&self) -> Option<&ForStmt> {
        match &self.kind {
            StmtKind::For(for_stmt) => Some(for_stmt),
            _ => None,
        }
    }
}

impl Decl {
    pub fn kind(&self) -> NodeKind {
        match &self.kind {
            DeclKind::Function(_) => NodeKind::Function,
            DeclKind::Var(_) => NodeKind::Var,
            DeclKind::Typedef(_) => NodeKind::Typedef,
            DeclKind::Namespace(_) | DeclKind::Linkage(_) => NodeKind::Namespace,
            DeclKind::Directive => NodeKind::Directive,
            DeclKind::Other => NodeKind::Other,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionDecl> {
        match &self.kind {
            DeclKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_var(&self) -> Option<&VarDecl> {
        match &self.kind {
            DeclKind::Var(var) => Some(var),
            _ => None,
        }
    }

    pub fn as_typedef(&self) -> Option<&TypedefDecl> {
        match &self.kind {
            DeclKind::Typedef(typedef) => Some(typedef),
            _ => None,
        }
    }
}

/// Borrowed view of any node that can carry attributes or handlers.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    TranslationUnit(&'a TranslationUnit),
    Decl(&'a Decl),
    Param(&'a Param),
    Stmt(&'a Stmt),
}

/// The translation unit is not numbered by the parser.
pub const TRANSLATION_UNIT_ID: NodeId = NodeId::MAX;

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::TranslationUnit(_) => TRANSLATION_UNIT_ID,
            NodeRef::Decl(decl) => decl.id,
            NodeRef::Param(param) => param.id,
            NodeRef::Stmt(stmt) => stmt.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::TranslationUnit(_) => NodeKind::TranslationUnit,
            NodeRef::Decl(decl) => decl.kind(),
            NodeRef::Param(_) => NodeKind::Param,
            NodeRef::Stmt(stmt) => stmt.kind(),
        }
    }

    pub fn attrs(&self) -> &'a [AttrNode] {
        match self {
            NodeRef::TranslationUnit(_) => &[],
            NodeRef::Decl(decl) => &decl.attrs,
            NodeRef::Param(param) => &param.attrs,
            NodeRef::Stmt(stmt) => &stmt.attrs,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            NodeRef::TranslationUnit(tu) => tu.span,
            NodeRef::Decl(decl) => decl.span,
            NodeRef::Param(param) => param.span,
            NodeRef::Stmt(stmt) => stmt.span,
        }
    }

    pub fn full_span(&self) -> Span {
        match self {
            NodeRef::TranslationUnit(tu) => tu.span,
            NodeRef::Decl(decl) => decl.full_span,
            NodeRef::Param(param) => param.full_span,
            NodeRef::Stmt(stmt) => stmt.full_span,
        }
    }

    pub fn has_okl_attrs(&self) -> bool {
        self.attrs().iter().any(AttrNode::is_okl)
    }

    pub fn as_decl(&self) -> Option<&'a Decl> {
        match self {
            NodeRef::Decl(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<&'a Param> {
        match self {
            NodeRef::Param(param) => Some(param),
            _ => None,
        }
    }

    pub fn as_stmt(&self) -> Option<&'a Stmt> {
        match self {
            NodeRef::Stmt(stmt) => Some(stmt),
            _ => None,
        }
    }
}
