use crate::ast::{
    self, mk, Assign, Block, ClassDef, ClassKind, Expr, HashLit, IdentKind, Literal, LiteralValue,
    MethodDef, Send, UnresolvedConstantLit, UnresolvedIdent,
};
use crate::globals::GlobalState;
use crate::names::wk;
use crate::parse::{BlockNode, Node};
use crate::span::{FileId, Loc};
use crate::symbols::syms;

/// Lower the parser's concrete nodes into the abstract tree the rest of
/// the pipeline works on. Every file body is wrapped in a synthetic
/// top-level class definition whose symbol is the root class, so
/// top-level code names exactly like a class body.
pub fn desugar(gs: &GlobalState, file: FileId, stmts: Vec<Node>) -> Expr {
    let file_loc = Loc::new(file, 0, gs.files[file].source.len() as u32);
    let rhs: Vec<Expr> = stmts.into_iter().map(node).collect();
    Expr::ClassDef(ClassDef {
        loc: file_loc,
        decl_loc: Loc::empty(file),
        kind: ClassKind::Class,
        name: Box::new(mk::empty_tree()),
        symbol: syms::ROOT,
        ancestors: Vec::new(),
        singleton_ancestors: Vec::new(),
        rhs,
    })
}

fn node(n: Node) -> Expr {
    match n {
        Node::Class {
            loc,
            decl_loc,
            name,
            superclass,
            body,
        } => Expr::ClassDef(ClassDef {
            loc,
            decl_loc,
            kind: ClassKind::Class,
            name: Box::new(node(*name)),
            symbol: syms::TODO,
            ancestors: superclass.map(|sup| vec![node(*sup)]).unwrap_or_default(),
            singleton_ancestors: Vec::new(),
            rhs: body.into_iter().map(node).collect(),
        }),
        Node::SingletonClass {
            loc,
            decl_loc,
            body,
        } => Expr::ClassDef(ClassDef {
            loc,
            decl_loc,
            kind: ClassKind::Class,
            name: Box::new(Expr::UnresolvedIdent(UnresolvedIdent {
                loc: decl_loc,
                kind: IdentKind::Class,
                name: wk::SINGLETON,
            })),
            symbol: syms::TODO,
            ancestors: Vec::new(),
            singleton_ancestors: Vec::new(),
            rhs: body.into_iter().map(node).collect(),
        }),
        Node::Module {
            loc,
            decl_loc,
            name,
            body,
        } => Expr::ClassDef(ClassDef {
            loc,
            decl_loc,
            kind: ClassKind::Module,
            name: Box::new(node(*name)),
            symbol: syms::TODO,
            ancestors: Vec::new(),
            singleton_ancestors: Vec::new(),
            rhs: body.into_iter().map(node).collect(),
        }),
        Node::DefMethod {
            loc,
            decl_loc,
            name,
            is_self,
            args,
            body,
        } => Expr::MethodDef(MethodDef {
            loc,
            decl_loc,
            name,
            symbol: syms::NONE,
            is_self,
            dsl_synthesized: false,
            args: args.into_iter().map(arg_node).collect(),
            rhs: Box::new(body_seq(loc, body)),
        }),
        Node::Send {
            loc,
            recv,
            method,
            args,
            block,
        } => {
            let recv = match recv {
                Some(recv) => node(*recv),
                None => mk::self_local(loc),
            };
            Expr::Send(Send {
                loc,
                recv: Box::new(recv),
                fun: method,
                args: args.into_iter().map(node).collect(),
                block: block.map(|b| Box::new(block_node(*b))),
            })
        }
        Node::Const { loc, scope, name } => {
            let scope = match scope {
                None => mk::empty_tree(),
                Some(scope) => match *scope {
                    Node::Cbase { loc } => mk::constant(loc, syms::ROOT),
                    other => node(other),
                },
            };
            Expr::UnresolvedConstantLit(UnresolvedConstantLit {
                loc,
                scope: Box::new(scope),
                cnst: name,
            })
        }
        Node::Cbase { loc } => mk::constant(loc, syms::ROOT),
        Node::SelfNode { loc } => mk::self_local(loc),
        Node::Ident { loc, name } => Expr::UnresolvedIdent(UnresolvedIdent {
            loc,
            kind: IdentKind::Local,
            name,
        }),
        Node::InstanceVar { loc, name } => Expr::UnresolvedIdent(UnresolvedIdent {
            loc,
            kind: IdentKind::Instance,
            name,
        }),
        Node::ClassVar { loc, name } => Expr::UnresolvedIdent(UnresolvedIdent {
            loc,
            kind: IdentKind::Class,
            name,
        }),
        Node::GlobalVar { loc, name } => Expr::UnresolvedIdent(UnresolvedIdent {
            loc,
            kind: IdentKind::Global,
            name,
        }),
        Node::Assign { loc, lhs, rhs } => Expr::Assign(Assign {
            loc,
            lhs: Box::new(node(*lhs)),
            rhs: Box::new(node(*rhs)),
        }),
        Node::Sym { loc, name } => Expr::Literal(Literal {
            loc,
            value: LiteralValue::Symbol(name),
        }),
        Node::Str { loc, name } => Expr::Literal(Literal {
            loc,
            value: LiteralValue::String(name),
        }),
        Node::Int { loc, value } => Expr::Literal(Literal {
            loc,
            value: LiteralValue::Integer(value),
        }),
        Node::Nil { loc } => Expr::Literal(Literal {
            loc,
            value: LiteralValue::Nil,
        }),
        Node::True { loc } => Expr::Literal(Literal {
            loc,
            value: LiteralValue::True,
        }),
        Node::False { loc } => Expr::Literal(Literal {
            loc,
            value: LiteralValue::False,
        }),
        Node::KwPairs { loc, pairs } => {
            let mut keys = Vec::with_capacity(pairs.len());
            let mut values = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                keys.push(node(key));
                values.push(node(value));
            }
            Expr::Hash(HashLit { loc, keys, values })
        }
        arg @ (Node::Arg { .. }
        | Node::OptArg { .. }
        | Node::RestArg { .. }
        | Node::KwArg { .. }
        | Node::KwOptArg { .. }
        | Node::BlockParam { .. }
        | Node::ShadowParam { .. }) => arg_node(arg),
    }
}

fn local_ident(loc: Loc, name: crate::names::NameRef) -> Expr {
    Expr::UnresolvedIdent(UnresolvedIdent {
        loc,
        kind: IdentKind::Local,
        name,
    })
}

fn arg_node(n: Node) -> Expr {
    match n {
        Node::Arg { loc, name } => local_ident(loc, name),
        Node::OptArg { loc, name, default } => Expr::OptionalArg(ast::OptionalArg {
            loc,
            expr: Box::new(local_ident(loc, name)),
            default: Box::new(node(*default)),
        }),
        Node::RestArg { loc, name } => Expr::RestArg(ast::RestArg {
            loc,
            expr: Box::new(local_ident(loc, name.unwrap_or(wk::ARG))),
        }),
        Node::KwArg { loc, name } => Expr::KeywordArg(ast::KeywordArg {
            loc,
            expr: Box::new(local_ident(loc, name)),
        }),
        Node::KwOptArg { loc, name, default } => Expr::KeywordArg(ast::KeywordArg {
            loc,
            expr: Box::new(Expr::OptionalArg(ast::OptionalArg {
                loc,
                expr: Box::new(local_ident(loc, name)),
                default: Box::new(node(*default)),
            })),
        }),
        Node::BlockParam { loc, name } => Expr::BlockArg(ast::BlockArg {
            loc,
            expr: Box::new(local_ident(loc, name)),
        }),
        Node::ShadowParam { loc, name } => Expr::ShadowArg(ast::ShadowArg {
            loc,
            expr: Box::new(local_ident(loc, name)),
        }),
        other => node(other),
    }
}

fn block_node(block: BlockNode) -> Block {
    Block {
        loc: block.loc,
        args: block.args.into_iter().map(arg_node).collect(),
        body: Box::new(body_seq(block.loc, block.body)),
    }
}

fn body_seq(loc: Loc, body: Vec<Node>) -> Expr {
    let mut stats: Vec<Expr> = body.into_iter().map(node).collect();
    match stats.pop() {
        None => mk::empty_tree(),
        Some(last) => {
            let loc = stats
                .first()
                .and_then(|first| first.loc())
                .map(|first| first.to(last.loc().unwrap_or(loc)))
                .unwrap_or_else(|| last.loc().unwrap_or(loc));
            mk::ins_seq(loc, stats, last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileKind;
    use crate::parse;

    fn desugar_source(source: &str) -> (GlobalState, Expr) {
        let mut gs = GlobalState::new();
        let file = gs.with_unfrozen_files(|gs| {
            let file = gs.reserve_file("./test.rb");
            gs.enter_file_source(file, source.into(), FileKind::Normal);
            file
        });
        let stmts = gs
            .with_unfrozen_names(|gs| parse::parse_file(gs, file))
            .expect("parse failed");
        let tree = desugar(&gs, file, stmts);
        (gs, tree)
    }

    fn root_rhs(tree: Expr) -> Vec<Expr> {
        match tree {
            Expr::ClassDef(class) => {
                assert_eq!(class.symbol, syms::ROOT);
                class.rhs
            }
            other => panic!("expected root class wrap, got {:?}", other),
        }
    }

    #[test]
    fn test_wraps_file_in_root_class() {
        let (_gs, tree) = desugar_source("FOO = 1\n");
        let rhs = root_rhs(tree);
        assert_eq!(rhs.len(), 1);
        assert!(matches!(&rhs[0], Expr::Assign(a)
            if matches!(a.lhs.as_ref(), Expr::UnresolvedConstantLit(_))));
    }

    #[test]
    fn test_class_symbol_starts_as_todo() {
        let (_gs, tree) = desugar_source("class A\nend\n");
        let rhs = root_rhs(tree);
        match &rhs[0] {
            Expr::ClassDef(class) => {
                assert_eq!(class.symbol, syms::TODO);
                assert_eq!(class.kind, ClassKind::Class);
            }
            other => panic!("expected classdef, got {:?}", other),
        }
    }

    #[test]
    fn test_singleton_class_name_marker() {
        let (_gs, tree) = desugar_source("class A\n  class << self\n  end\nend\n");
        let rhs = root_rhs(tree);
        match &rhs[0] {
            Expr::ClassDef(class) => match &class.rhs[0] {
                Expr::ClassDef(sclass) => match sclass.name.as_ref() {
                    Expr::UnresolvedIdent(ident) => {
                        assert_eq!(ident.kind, IdentKind::Class);
                        assert_eq!(ident.name, wk::SINGLETON);
                    }
                    other => panic!("expected singleton marker, got {:?}", other),
                },
                other => panic!("expected inner classdef, got {:?}", other),
            },
            other => panic!("expected classdef, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_send_gets_self_receiver() {
        let (gs, tree) = desugar_source("include Enumerable\n");
        let rhs = root_rhs(tree);
        match &rhs[0] {
            Expr::Send(send) => {
                assert!(send.recv.is_self_reference());
                assert_eq!(gs.names.show(send.fun), "include");
            }
            other => panic!("expected send, got {:?}", other),
        }
    }

    #[test]
    fn test_kwoptarg_nesting() {
        let (_gs, tree) = desugar_source("def m(k: 2); end\n");
        let rhs = root_rhs(tree);
        match &rhs[0] {
            Expr::MethodDef(def) => match &def.args[0] {
                Expr::KeywordArg(kwarg) => {
                    assert!(matches!(kwarg.expr.as_ref(), Expr::OptionalArg(_)));
                }
                other => panic!("expected keyword arg, got {:?}", other),
            },
            other => panic!("expected methoddef, got {:?}", other),
        }
    }

    #[test]
    fn test_cbase_scope_is_root_constant() {
        let (_gs, tree) = desugar_source("::Foo\n");
        let rhs = root_rhs(tree);
        match &rhs[0] {
            Expr::UnresolvedConstantLit(lit) => match lit.scope.as_ref() {
                Expr::ConstantLit(scope) => assert_eq!(scope.symbol, syms::ROOT),
                other => panic!("expected resolved root scope, got {:?}", other),
            },
            other => panic!("expected constant, got {:?}", other),
        }
    }

    #[test]
    fn test_method_body_sequence() {
        let (_gs, tree) = desugar_source("def m\n  x = 1\n  x\nend\n");
        let rhs = root_rhs(tree);
        match &rhs[0] {
            Expr::MethodDef(def) => {
                assert!(matches!(def.rhs.as_ref(), Expr::InsSeq(seq) if seq.stats.len() == 1));
            }
            other => panic!("expected methoddef, got {:?}", other),
        }
    }
}
