use crate::globals::GlobalState;
use crate::names::{wk, NameRef};
use crate::span::{FileId, Loc};
use crate::symbols::SymbolRef;
use serde::{Deserialize, Serialize};

/// A resolved-or-not local variable: the spelling plus a disambiguating
/// number assigned by local-variable resolution (0 for `self` and for
/// variables that never shadow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalName {
    pub name: NameRef,
    pub unique: u32,
}

pub const SELF_LOCAL: LocalName = LocalName {
    name: wk::SELF_,
    unique: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Module,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentKind {
    Local,
    Instance,
    Class,
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub loc: Loc,
    pub decl_loc: Loc,
    pub kind: ClassKind,
    pub name: Box<Expr>,
    pub symbol: SymbolRef,
    pub ancestors: Vec<Expr>,
    pub singleton_ancestors: Vec<Expr>,
    pub rhs: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    pub loc: Loc,
    pub decl_loc: Loc,
    pub name: NameRef,
    pub symbol: SymbolRef,
    pub is_self: bool,
    pub dsl_synthesized: bool,
    pub args: Vec<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Send {
    pub loc: Loc,
    pub recv: Box<Expr>,
    pub fun: NameRef,
    pub args: Vec<Expr>,
    pub block: Option<Box<Block>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub loc: Loc,
    pub args: Vec<Expr>,
    pub body: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    pub loc: Loc,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Nil,
    True,
    False,
    Integer(i64),
    String(NameRef),
    Symbol(NameRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub loc: Loc,
    pub value: LiteralValue,
}

impl Literal {
    pub fn as_symbol(&self) -> Option<NameRef> {
        match self.value {
            LiteralValue::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub loc: Loc,
    pub name: LocalName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionalArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
    pub default: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowArg {
    pub loc: Loc,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedConstantLit {
    pub loc: Loc,
    pub scope: Box<Expr>,
    pub cnst: NameRef,
}

/// A constant reference that has been attached to a symbol. `original`
/// keeps the authored path for diagnostics and IDE queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantLit {
    pub loc: Loc,
    pub symbol: SymbolRef,
    pub original: Option<Box<UnresolvedConstantLit>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedIdent {
    pub loc: Loc,
    pub kind: IdentKind,
    pub name: NameRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub loc: Loc,
    pub symbol: SymbolRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsSeq {
    pub loc: Loc,
    pub stats: Vec<Expr>,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashLit {
    pub loc: Loc,
    pub keys: Vec<Expr>,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    EmptyTree,
    ClassDef(ClassDef),
    MethodDef(MethodDef),
    Send(Send),
    Assign(Assign),
    Literal(Literal),
    Local(Local),
    OptionalArg(OptionalArg),
    RestArg(RestArg),
    KeywordArg(KeywordArg),
    BlockArg(BlockArg),
    ShadowArg(ShadowArg),
    UnresolvedConstantLit(UnresolvedConstantLit),
    ConstantLit(ConstantLit),
    UnresolvedIdent(UnresolvedIdent),
    Field(Field),
    InsSeq(InsSeq),
    Hash(HashLit),
}

impl Expr {
    pub fn loc(&self) -> Option<Loc> {
        match self {
            Expr::EmptyTree => None,
            Expr::ClassDef(n) => Some(n.loc),
            Expr::MethodDef(n) => Some(n.loc),
            Expr::Send(n) => Some(n.loc),
            Expr::Assign(n) => Some(n.loc),
            Expr::Literal(n) => Some(n.loc),
            Expr::Local(n) => Some(n.loc),
            Expr::OptionalArg(n) => Some(n.loc),
            Expr::RestArg(n) => Some(n.loc),
            Expr::KeywordArg(n) => Some(n.loc),
            Expr::BlockArg(n) => Some(n.loc),
            Expr::ShadowArg(n) => Some(n.loc),
            Expr::UnresolvedConstantLit(n) => Some(n.loc),
            Expr::ConstantLit(n) => Some(n.loc),
            Expr::UnresolvedIdent(n) => Some(n.loc),
            Expr::Field(n) => Some(n.loc),
            Expr::InsSeq(n) => Some(n.loc),
            Expr::Hash(n) => Some(n.loc),
        }
    }

    pub fn is_empty_tree(&self) -> bool {
        matches!(self, Expr::EmptyTree)
    }

    pub fn is_self_reference(&self) -> bool {
        matches!(self, Expr::Local(local) if local.name == SELF_LOCAL)
    }
}

/// One file's desugared tree. `owner_gs` records which global state the
/// tree's name refs belong to; substitution rewrites it, and debug builds
/// use it to reject substituting a tree twice.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub tree: Expr,
    pub file: FileId,
    pub(crate) owner_gs: u32,
}

impl ParsedFile {
    pub fn new(tree: Expr, file: FileId, gs: &GlobalState) -> ParsedFile {
        ParsedFile {
            tree,
            file,
            owner_gs: gs.gs_id,
        }
    }

    pub fn empty(file: FileId, gs: &GlobalState) -> ParsedFile {
        ParsedFile::new(Expr::EmptyTree, file, gs)
    }

    /// Re-tag a tree as belonging to `gs` without rewriting names. Used
    /// for cache hits, which are already in the canonical id space.
    pub(crate) fn adopt(&mut self, gs: &GlobalState) {
        self.owner_gs = gs.gs_id;
    }
}

/// Tree builders for synthesized nodes.
pub mod mk {
    use super::*;

    pub fn empty_tree() -> Expr {
        Expr::EmptyTree
    }

    pub fn self_local(loc: Loc) -> Expr {
        Expr::Local(Local {
            loc,
            name: SELF_LOCAL,
        })
    }

    pub fn ins_seq(loc: Loc, stats: Vec<Expr>, expr: Expr) -> Expr {
        if stats.is_empty() {
            return expr;
        }
        Expr::InsSeq(InsSeq {
            loc,
            stats,
            expr: Box::new(expr),
        })
    }

    pub fn send(loc: Loc, recv: Expr, fun: NameRef, args: Vec<Expr>) -> Expr {
        Expr::Send(Send {
            loc,
            recv: Box::new(recv),
            fun,
            args,
            block: None,
        })
    }

    /// Marker send telling later phases to keep a node for IDE queries.
    pub fn keep_for_ide(loc: Loc, expr: Expr) -> Expr {
        send(loc, Expr::EmptyTree, wk::KEEP_FOR_IDE, vec![expr])
    }

    pub fn constant(loc: Loc, symbol: SymbolRef) -> Expr {
        Expr::ConstantLit(ConstantLit {
            loc,
            symbol,
            original: None,
        })
    }

    fn t_const(loc: Loc) -> Expr {
        Expr::UnresolvedConstantLit(UnresolvedConstantLit {
            loc,
            scope: Box::new(Expr::EmptyTree),
            cnst: wk::T,
        })
    }

    pub fn t_untyped(loc: Loc) -> Expr {
        send(loc, t_const(loc), wk::UNTYPED, vec![])
    }

    /// `T.type_alias(T.untyped)`, the fallback right-hand side for
    /// malformed type definitions.
    pub fn t_type_alias_untyped(loc: Loc) -> Expr {
        send(loc, t_const(loc), wk::TYPE_ALIAS, vec![t_untyped(loc)])
    }
}

/// Pre/post transformer pair per node kind. The walk owns each node and
/// hands it to the hooks by value; the owner symbol is threaded through
/// the descent (class and method bodies switch it to their own symbol).
pub trait TreeMapper {
    fn pre_class_def(&mut self, _gs: &mut GlobalState, _owner: SymbolRef, node: ClassDef) -> ClassDef {
        node
    }

    fn post_class_def(&mut self, _gs: &mut GlobalState, _owner: SymbolRef, node: ClassDef) -> Expr {
        Expr::ClassDef(node)
    }

    fn pre_method_def(
        &mut self,
        _gs: &mut GlobalState,
        _owner: SymbolRef,
        node: MethodDef,
    ) -> MethodDef {
        node
    }

    fn post_method_def(&mut self, _gs: &mut GlobalState, _owner: SymbolRef, node: MethodDef) -> Expr {
        Expr::MethodDef(node)
    }

    fn post_send(&mut self, _gs: &mut GlobalState, _owner: SymbolRef, node: Send) -> Expr {
        Expr::Send(node)
    }

    fn post_assign(&mut self, _gs: &mut GlobalState, _owner: SymbolRef, node: Assign) -> Expr {
        Expr::Assign(node)
    }

    fn post_unresolved_ident(
        &mut self,
        _gs: &mut GlobalState,
        _owner: SymbolRef,
        node: UnresolvedIdent,
    ) -> Expr {
        Expr::UnresolvedIdent(node)
    }

    fn post_unresolved_constant_lit(
        &mut self,
        _gs: &mut GlobalState,
        _owner: SymbolRef,
        node: UnresolvedConstantLit,
    ) -> Expr {
        Expr::UnresolvedConstantLit(node)
    }

    fn post_constant_lit(
        &mut self,
        _gs: &mut GlobalState,
        _owner: SymbolRef,
        node: ConstantLit,
    ) -> Expr {
        Expr::ConstantLit(node)
    }
}

pub fn map_tree<M: TreeMapper>(
    mapper: &mut M,
    gs: &mut GlobalState,
    owner: SymbolRef,
    expr: Expr,
) -> Expr {
    match expr {
        Expr::ClassDef(node) => {
            let mut node = mapper.pre_class_def(gs, owner, node);
            let inner = if node.symbol.exists() { node.symbol } else { owner };
            node.ancestors = node
                .ancestors
                .into_iter()
                .map(|anc| map_tree(mapper, gs, inner, anc))
                .collect();
            node.singleton_ancestors = node
                .singleton_ancestors
                .into_iter()
                .map(|anc| map_tree(mapper, gs, inner, anc))
                .collect();
            node.rhs = node
                .rhs
                .into_iter()
                .map(|stat| map_tree(mapper, gs, inner, stat))
                .collect();
            mapper.post_class_def(gs, owner, node)
        }
        Expr::MethodDef(node) => {
            let mut node = mapper.pre_method_def(gs, owner, node);
            let inner = if node.symbol.exists() { node.symbol } else { owner };
            node.args = node
                .args
                .into_iter()
                .map(|arg| map_tree(mapper, gs, inner, arg))
                .collect();
            node.rhs = Box::new(map_tree(mapper, gs, inner, *node.rhs));
            mapper.post_method_def(gs, owner, node)
        }
        Expr::Send(mut node) => {
            node.recv = Box::new(map_tree(mapper, gs, owner, *node.recv));
            node.args = node
                .args
                .into_iter()
                .map(|arg| map_tree(mapper, gs, owner, arg))
                .collect();
            if let Some(mut block) = node.block {
                block.args = block
                    .args
                    .into_iter()
                    .map(|arg| map_tree(mapper, gs, owner, arg))
                    .collect();
                block.body = Box::new(map_tree(mapper, gs, owner, *block.body));
                node.block = Some(block);
            }
            mapper.post_send(gs, owner, node)
        }
        Expr::Assign(mut node) => {
            node.lhs = Box::new(map_tree(mapper, gs, owner, *node.lhs));
            node.rhs = Box::new(map_tree(mapper, gs, owner, *node.rhs));
            mapper.post_assign(gs, owner, node)
        }
        Expr::InsSeq(mut node) => {
            node.stats = node
                .stats
                .into_iter()
                .map(|stat| map_tree(mapper, gs, owner, stat))
                .collect();
            node.expr = Box::new(map_tree(mapper, gs, owner, *node.expr));
            Expr::InsSeq(node)
        }
        Expr::OptionalArg(mut node) => {
            node.expr = Box::new(map_tree(mapper, gs, owner, *node.expr));
            node.default = Box::new(map_tree(mapper, gs, owner, *node.default));
            Expr::OptionalArg(node)
        }
        Expr::RestArg(mut node) => {
            node.expr = Box::new(map_tree(mapper, gs, owner, *node.expr));
            Expr::RestArg(node)
        }
        Expr::KeywordArg(mut node) => {
            node.expr = Box::new(map_tree(mapper, gs, owner, *node.expr));
            Expr::KeywordArg(node)
        }
        Expr::BlockArg(mut node) => {
            node.expr = Box::new(map_tree(mapper, gs, owner, *node.expr));
            Expr::BlockArg(node)
        }
        Expr::ShadowArg(mut node) => {
            node.expr = Box::new(map_tree(mapper, gs, owner, *node.expr));
            Expr::ShadowArg(node)
        }
        Expr::UnresolvedConstantLit(mut node) => {
            node.scope = Box::new(map_tree(mapper, gs, owner, *node.scope));
            mapper.post_unresolved_constant_lit(gs, owner, node)
        }
        Expr::ConstantLit(node) => mapper.post_constant_lit(gs, owner, node),
        Expr::UnresolvedIdent(node) => mapper.post_unresolved_ident(gs, owner, node),
        Expr::Hash(mut node) => {
            node.keys = node
                .keys
                .into_iter()
                .map(|key| map_tree(mapper, gs, owner, key))
                .collect();
            node.values = node
                .values
                .into_iter()
                .map(|value| map_tree(mapper, gs, owner, value))
                .collect();
            Expr::Hash(node)
        }
        leaf @ (Expr::EmptyTree | Expr::Literal(_) | Expr::Local(_) | Expr::Field(_)) => leaf,
    }
}

impl Expr {
    /// Structural rendering with textual names, independent of name ids.
    /// Used by tests comparing trees across global states.
    pub fn show_raw(&self, gs: &GlobalState) -> String {
        match self {
            Expr::EmptyTree => "(empty)".to_string(),
            Expr::ClassDef(node) => format!(
                "(classdef {:?} name={} symbol={} ancestors=[{}] singleton_ancestors=[{}] rhs=[{}])",
                node.kind,
                node.name.show_raw(gs),
                gs.show_symbol(node.symbol),
                show_all(gs, &node.ancestors),
                show_all(gs, &node.singleton_ancestors),
                show_all(gs, &node.rhs),
            ),
            Expr::MethodDef(node) => format!(
                "(methoddef {} self={} symbol={} args=[{}] rhs={})",
                gs.names.show_raw(node.name),
                node.is_self,
                gs.show_symbol(node.symbol),
                show_all(gs, &node.args),
                node.rhs.show_raw(gs),
            ),
            Expr::Send(node) => {
                let block = match &node.block {
                    Some(block) => format!(" block={}", block.body.show_raw(gs)),
                    None => String::new(),
                };
                format!(
                    "(send {} {} [{}]{})",
                    node.recv.show_raw(gs),
                    gs.names.show_raw(node.fun),
                    show_all(gs, &node.args),
                    block,
                )
            }
            Expr::Assign(node) => format!(
                "(assign {} {})",
                node.lhs.show_raw(gs),
                node.rhs.show_raw(gs)
            ),
            Expr::Literal(node) => match node.value {
                LiteralValue::Nil => "(lit nil)".to_string(),
                LiteralValue::True => "(lit true)".to_string(),
                LiteralValue::False => "(lit false)".to_string(),
                LiteralValue::Integer(i) => format!("(lit {})", i),
                LiteralValue::String(name) => format!("(lit str {})", gs.names.show_raw(name)),
                LiteralValue::Symbol(name) => format!("(lit sym {})", gs.names.show_raw(name)),
            },
            Expr::Local(node) => format!(
                "(local {} {})",
                gs.names.show_raw(node.name.name),
                node.name.unique
            ),
            Expr::OptionalArg(node) => format!(
                "(optarg {} default={})",
                node.expr.show_raw(gs),
                node.default.show_raw(gs)
            ),
            Expr::RestArg(node) => format!("(restarg {})", node.expr.show_raw(gs)),
            Expr::KeywordArg(node) => format!("(kwarg {})", node.expr.show_raw(gs)),
            Expr::BlockArg(node) => format!("(blockarg {})", node.expr.show_raw(gs)),
            Expr::ShadowArg(node) => format!("(shadowarg {})", node.expr.show_raw(gs)),
            Expr::UnresolvedConstantLit(node) => format!(
                "(uconst {} {})",
                node.scope.show_raw(gs),
                gs.names.show_raw(node.cnst)
            ),
            Expr::ConstantLit(node) => format!("(const {})", gs.show_symbol(node.symbol)),
            Expr::UnresolvedIdent(node) => format!(
                "(uident {:?} {})",
                node.kind,
                gs.names.show_raw(node.name)
            ),
            Expr::Field(node) => format!("(field {})", gs.show_symbol(node.symbol)),
            Expr::InsSeq(node) => format!(
                "(seq [{}] {})",
                show_all(gs, &node.stats),
                node.expr.show_raw(gs)
            ),
            Expr::Hash(node) => format!(
                "(hash [{}] [{}])",
                show_all(gs, &node.keys),
                show_all(gs, &node.values)
            ),
        }
    }
}

fn show_all(gs: &GlobalState, exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(|e| e.show_raw(gs))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_reference() {
        let loc = Loc::new(FileId::from_raw(0), 0, 4);
        assert!(mk::self_local(loc).is_self_reference());
        assert!(!mk::empty_tree().is_self_reference());
        let other = Expr::Local(Local {
            loc,
            name: LocalName {
                name: wk::ARG,
                unique: 0,
            },
        });
        assert!(!other.is_self_reference());
    }

    #[test]
    fn test_ins_seq_collapses_when_empty() {
        let loc = Loc::new(FileId::from_raw(0), 0, 0);
        let single = mk::ins_seq(loc, vec![], mk::empty_tree());
        assert!(single.is_empty_tree());
        let seq = mk::ins_seq(loc, vec![mk::empty_tree()], mk::empty_tree());
        assert!(matches!(seq, Expr::InsSeq(_)));
    }
}
