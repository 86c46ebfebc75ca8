use generational_arena::{Arena, Index};
use string_interner::symbol::SymbolUsize;

use crate::compiler::{
    scope::{ScopeId, ScopeTree},
    tokens::{Span, Token},
};

use super::types::Type;

pub type BlockId = Index;

/// Owns every node, block and scope of one compilation unit. Macro expansion
/// and `#include` parse into the same store, so indices stay valid across
/// re-entrant parses.
pub struct Ast {
    pub nodes: Arena<Node>,
    pub blocks: Arena<Block>,
    pub scopes: ScopeTree,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            blocks: Arena::new(),
            scopes: ScopeTree::new(),
        }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> Index {
        self.nodes.insert(Node { kind, span })
    }

    pub fn new_block(&mut self, stmts: Vec<Index>) -> BlockId {
        let scope = self.scopes.new_scope(None);
        self.blocks.insert(Block::new(stmts, scope))
    }
}

/// An ordered statement list with a lowering cursor. `cursor` is the
/// statement currently being lowered and `next` the one that will be visited
/// after it; splices keep both consistent.
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Index>,
    pub cursor: usize,
    pub next: usize,
    pub scope: ScopeId,
    pub returns: bool,
}

impl Block {
    pub fn new(stmts: Vec<Index>, scope: ScopeId) -> Self {
        Self {
            stmts,
            cursor: 0,
            next: 0,
            scope,
            returns: false,
        }
    }

    /// Replaces the statement under the cursor. The new statements count as
    /// already visited.
    pub fn replace_current(&mut self, nodes: Vec<Index>) {
        let n = nodes.len();
        self.stmts.splice(self.cursor..=self.cursor, nodes);
        self.next = self.cursor + n;
    }

    /// Inserts statements in front of the one under the cursor, leaving the
    /// cursor on the same statement.
    pub fn insert_before_current(&mut self, nodes: Vec<Index>) {
        let n = nodes.len();
        self.stmts.splice(self.cursor..self.cursor, nodes);
        self.cursor += n;
        self.next += n;
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
    And,
    Or,
}

impl BinOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::Mod => "%",
            BinOpKind::Eq => "==",
            BinOpKind::NotEq => "!=",
            BinOpKind::LessThan => "<",
            BinOpKind::LessThanOrEq => "<=",
            BinOpKind::GreaterThan => ">",
            BinOpKind::GreaterThanOrEq => ">=",
            BinOpKind::And => "&&",
            BinOpKind::Or => "||",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOpKind::Eq
                | BinOpKind::NotEq
                | BinOpKind::LessThan
                | BinOpKind::LessThanOrEq
                | BinOpKind::GreaterThan
                | BinOpKind::GreaterThanOrEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOpKind::And | BinOpKind::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    AddressOf,
    Deref,
    Not,
    Neg,
}

impl UnaryOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOpKind::AddressOf => "&",
            UnaryOpKind::Deref => "*",
            UnaryOpKind::Not => "!",
            UnaryOpKind::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: SymbolUsize,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: SymbolUsize,
    pub params: Vec<Param>,
    pub ret: Type,
    /// `None` for a prototype (external symbol or trait method).
    pub body: Option<BlockId>,
    /// Holds the parameters; parent of the body's scope.
    pub scope: ScopeId,
    /// Set during lowering when a `return` appears below the top level of the body.
    pub needs_ret_block: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: SymbolUsize,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroParamKind {
    Single,
    Variadic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroParam {
    pub name: SymbolUsize,
    pub kind: MacroParamKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroArm {
    pub params: Vec<MacroParam>,
    pub body: Vec<Token>,
}

#[derive(Debug, Clone)]
pub struct MatchCase {
    pub value: Index,
    pub body: BlockId,
}

#[derive(Debug, Clone)]
pub struct InitEntry {
    /// `None` for positional entries.
    pub field: Option<SymbolUsize>,
    pub value: Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Direct,
    /// `recv.f(..)`: the receiver is `args[0]` and the callee is resolved to
    /// `<ReceiverType>_f` once the receiver's type is known.
    Method,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Module {
        body: BlockId,
    },
    Function(Function),
    StructDef {
        name: SymbolUsize,
        generics: Vec<SymbolUsize>,
        fields: Vec<Field>,
    },
    EnumDef {
        name: SymbolUsize,
        variants: Vec<SymbolUsize>,
        backing: Type,
    },
    TypeAlias {
        name: SymbolUsize,
        ty: Type,
    },
    Static {
        name: SymbolUsize,
        ty: Type,
        init: Option<Index>,
    },
    Impl {
        target: SymbolUsize,
        generics: Vec<SymbolUsize>,
        trait_: Option<SymbolUsize>,
        body: BlockId,
    },
    Trait {
        name: SymbolUsize,
        body: BlockId,
    },
    MacroDef {
        name: SymbolUsize,
        arms: Vec<MacroArm>,
    },
    MacroCall {
        name: SymbolUsize,
        args: Vec<Vec<Token>>,
    },
    MacroInclude {
        path: SymbolUsize,
    },
    SizeOf {
        ty: Type,
    },

    VarDecl {
        name: SymbolUsize,
        mutable: bool,
        ty: Option<Type>,
        value: Option<Index>,
    },
    Return {
        value: Option<Index>,
    },
    Break,
    If {
        cond: Index,
        then: BlockId,
        else_: Option<BlockId>,
    },
    For {
        var: Index,
        cond: Index,
        body: BlockId,
        scope: ScopeId,
    },
    Match {
        scrutinee: Index,
        cases: Vec<MatchCase>,
    },
    Block(BlockId),

    Assign {
        target: Index,
        value: Index,
    },
    Binary {
        op: BinOpKind,
        lhs: Index,
        rhs: Index,
    },
    Unary {
        op: UnaryOpKind,
        operand: Index,
    },
    Cast {
        ty: Type,
        value: Index,
    },
    Call {
        callee: Index,
        args: Vec<Index>,
        dispatch: Dispatch,
    },
    /// `object.member` or `object->member`. Before lowering `member` may be a call.
    Member {
        object: Index,
        member: Index,
        deref: bool,
    },
    Index {
        object: Index,
        index: Index,
    },
    /// `base::member`
    Resolution {
        base: SymbolUsize,
        member: Index,
    },
    InitList {
        ty: Option<Type>,
        entries: Vec<InitEntry>,
    },
    Identifier(SymbolUsize),
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(u8),
    Str(SymbolUsize),
}

impl NodeKind {
    /// Variants that only exist between parsing and the end of lowering.
    pub fn is_pre_lowering_only(&self) -> bool {
        matches!(
            self,
            NodeKind::MacroCall { .. } | NodeKind::MacroInclude { .. } | NodeKind::InitList { .. }
        )
    }

    pub fn is_item(&self) -> bool {
        matches!(
            self,
            NodeKind::Function(_)
                | NodeKind::StructDef { .. }
                | NodeKind::EnumDef { .. }
                | NodeKind::TypeAlias { .. }
                | NodeKind::Static { .. }
                | NodeKind::Impl { .. }
                | NodeKind::Trait { .. }
                | NodeKind::MacroDef { .. }
                | NodeKind::MacroInclude { .. }
        )
    }
}
