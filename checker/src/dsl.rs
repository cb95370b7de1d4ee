use crate::ast::{Assign, Expr, IdentKind, LiteralValue, MethodDef, ParsedFile, UnresolvedIdent};
use crate::globals::GlobalState;
use crate::names::{wk, NameRef};
use crate::span::Loc;
use crate::symbols::syms;

/// Expand attribute-declaration DSL calls into synthesized method
/// definitions so naming sees real methods. `attr_reader :a` becomes a
/// reader, `attr_writer :a` a setter, `attr_accessor :a` both. Calls
/// whose arguments are not all symbol literals are left untouched.
pub fn run(gs: &mut GlobalState, mut parsed: ParsedFile) -> ParsedFile {
    parsed.tree = walk(gs, parsed.tree);
    parsed
}

fn walk(gs: &mut GlobalState, expr: Expr) -> Expr {
    match expr {
        Expr::ClassDef(mut node) => {
            let mut rhs = Vec::with_capacity(node.rhs.len());
            for stat in node.rhs {
                let stat = walk(gs, stat);
                match attr_target(&stat) {
                    Some(kind) => expand(gs, kind, stat, &mut rhs),
                    None => rhs.push(stat),
                }
            }
            node.rhs = rhs;
            Expr::ClassDef(node)
        }
        Expr::MethodDef(mut node) => {
            node.rhs = Box::new(walk(gs, *node.rhs));
            Expr::MethodDef(node)
        }
        Expr::InsSeq(mut node) => {
            node.stats = node.stats.into_iter().map(|stat| walk(gs, stat)).collect();
            node.expr = Box::new(walk(gs, *node.expr));
            Expr::InsSeq(node)
        }
        other => other,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum AttrKind {
    Reader,
    Writer,
    Accessor,
}

fn attr_target(stat: &Expr) -> Option<AttrKind> {
    let Expr::Send(send) = stat else {
        return None;
    };
    if !send.recv.is_self_reference() || send.block.is_some() || send.args.is_empty() {
        return None;
    }
    let kind = match send.fun {
        name if name == wk::ATTR_READER => AttrKind::Reader,
        name if name == wk::ATTR_WRITER => AttrKind::Writer,
        name if name == wk::ATTR_ACCESSOR => AttrKind::Accessor,
        _ => return None,
    };
    let all_symbols = send.args.iter().all(|arg| {
        matches!(
            arg,
            Expr::Literal(lit) if matches!(lit.value, LiteralValue::Symbol(_))
        )
    });
    all_symbols.then_some(kind)
}

fn expand(gs: &mut GlobalState, kind: AttrKind, stat: Expr, out: &mut Vec<Expr>) {
    let Expr::Send(send) = stat else {
        unreachable!("attr_target only matches sends");
    };
    for arg in &send.args {
        let Expr::Literal(lit) = arg else { continue };
        let Some(name) = lit.as_symbol() else { continue };
        if kind != AttrKind::Writer {
            out.push(reader_def(gs, send.loc, name));
        }
        if kind != AttrKind::Reader {
            out.push(writer_def(gs, send.loc, name));
        }
    }
}

fn ivar_name(gs: &mut GlobalState, name: NameRef) -> NameRef {
    let text = format!("@{}", gs.names.short_name(name));
    gs.enter_name_utf8(&text)
}

fn reader_def(gs: &mut GlobalState, loc: Loc, name: NameRef) -> Expr {
    let ivar = ivar_name(gs, name);
    Expr::MethodDef(MethodDef {
        loc,
        decl_loc: loc,
        name,
        symbol: syms::NONE,
        is_self: false,
        dsl_synthesized: true,
        args: Vec::new(),
        rhs: Box::new(Expr::UnresolvedIdent(UnresolvedIdent {
            loc,
            kind: IdentKind::Instance,
            name: ivar,
        })),
    })
}

fn writer_def(gs: &mut GlobalState, loc: Loc, name: NameRef) -> Expr {
    let ivar = ivar_name(gs, name);
    let setter = {
        let text = format!("{}=", gs.names.short_name(name));
        gs.enter_name_utf8(&text)
    };
    Expr::MethodDef(MethodDef {
        loc,
        decl_loc: loc,
        name: setter,
        symbol: syms::NONE,
        is_self: false,
        dsl_synthesized: true,
        args: vec![Expr::UnresolvedIdent(UnresolvedIdent {
            loc,
            kind: IdentKind::Local,
            name,
        })],
        rhs: Box::new(Expr::Assign(Assign {
            loc,
            lhs: Box::new(Expr::UnresolvedIdent(UnresolvedIdent {
                loc,
                kind: IdentKind::Instance,
                name: ivar,
            })),
            rhs: Box::new(Expr::UnresolvedIdent(UnresolvedIdent {
                loc,
                kind: IdentKind::Local,
                name,
            })),
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::files::FileKind;
    use crate::parse;

    fn expand_source(source: &str) -> (GlobalState, Expr) {
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
        let parsed = ParsedFile::new(tree, file, &gs);
        let parsed = gs.with_unfrozen_names(|gs| run(gs, parsed));
        (gs, parsed.tree)
    }

    fn class_rhs(tree: &Expr) -> &[Expr] {
        match tree {
            Expr::ClassDef(root) => match &root.rhs[0] {
                Expr::ClassDef(class) => &class.rhs,
                other => panic!("expected classdef, got {:?}", other),
            },
            other => panic!("expected root classdef, got {:?}", other),
        }
    }

    #[test]
    fn test_attr_accessor_expands_to_reader_and_writer() {
        let (gs, tree) = expand_source("class A\n  attr_accessor :foo\nend\n");
        let rhs = class_rhs(&tree);
        assert_eq!(rhs.len(), 2);
        match (&rhs[0], &rhs[1]) {
            (Expr::MethodDef(reader), Expr::MethodDef(writer)) => {
                assert_eq!(gs.names.show(reader.name), "foo");
                assert!(reader.dsl_synthesized);
                assert!(reader.args.is_empty());
                assert_eq!(gs.names.show(writer.name), "foo=");
                assert_eq!(writer.args.len(), 1);
            }
            other => panic!("expected two methoddefs, got {:?}", other),
        }
    }

    #[test]
    fn test_attr_reader_expands_multiple_names() {
        let (gs, tree) = expand_source("class A\n  attr_reader :a, :b\nend\n");
        let rhs = class_rhs(&tree);
        assert_eq!(rhs.len(), 2);
        match &rhs[1] {
            Expr::MethodDef(def) => assert_eq!(gs.names.show(def.name), "b"),
            other => panic!("expected methoddef, got {:?}", other),
        }
    }

    #[test]
    fn test_non_symbol_args_left_untouched() {
        let (_gs, tree) = expand_source("class A\n  attr_reader foo\nend\n");
        let rhs = class_rhs(&tree);
        assert_eq!(rhs.len(), 1);
        assert!(matches!(&rhs[0], Expr::Send(_)));
    }

    #[test]
    fn test_reader_reads_instance_variable() {
        let (gs, tree) = expand_source("class A\n  attr_reader :foo\nend\n");
        let rhs = class_rhs(&tree);
        match &rhs[0] {
            Expr::MethodDef(def) => match def.rhs.as_ref() {
                Expr::UnresolvedIdent(ident) => {
                    assert_eq!(ident.kind, IdentKind::Instance);
                    assert_eq!(gs.names.show(ident.name), "@foo");
                }
                other => panic!("expected ivar read, got {:?}", other),
            },
            other => panic!("expected methoddef, got {:?}", other),
        }
    }
}
