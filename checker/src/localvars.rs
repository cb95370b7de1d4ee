use crate::ast::{mk, Expr, IdentKind, Local, LocalName, ParsedFile, Send};
use crate::names::NameRef;
use rustc_hash::FxHashMap;

/// Resolve local variables ahead of naming: method and block parameters
/// and assigned locals become `Local` nodes; bare identifiers that never
/// resolve to a local become sends to `self`. After this pass no
/// `UnresolvedIdent` of local kind remains in the tree.
pub fn run(mut parsed: ParsedFile) -> ParsedFile {
    let mut walker = LocalVars {
        frames: vec![Frame::boundary()],
        shadow_counter: 0,
    };
    parsed.tree = walker.walk(parsed.tree);
    parsed
}

struct Frame {
    locals: FxHashMap<NameRef, LocalName>,
    /// Method and class bodies do not see enclosing locals; blocks do.
    boundary: bool,
}

impl Frame {
    fn boundary() -> Frame {
        Frame {
            locals: FxHashMap::default(),
            boundary: true,
        }
    }

    fn block() -> Frame {
        Frame {
            locals: FxHashMap::default(),
            boundary: false,
        }
    }
}

struct LocalVars {
    frames: Vec<Frame>,
    shadow_counter: u32,
}

impl LocalVars {
    fn lookup(&self, name: NameRef) -> Option<LocalName> {
        for frame in self.frames.iter().rev() {
            if let Some(local) = frame.locals.get(&name) {
                return Some(*local);
            }
            if frame.boundary {
                return None;
            }
        }
        None
    }

    fn declare(&mut self, name: NameRef) -> LocalName {
        if let Some(existing) = self.lookup(name) {
            return existing;
        }
        let local = LocalName { name, unique: 0 };
        self.frames
            .last_mut()
            .expect("non-empty scope stack")
            .locals
            .insert(name, local);
        local
    }

    fn declare_shadow(&mut self, name: NameRef) -> LocalName {
        self.shadow_counter += 1;
        let local = LocalName {
            name,
            unique: self.shadow_counter,
        };
        self.frames
            .last_mut()
            .expect("non-empty scope stack")
            .locals
            .insert(name, local);
        local
    }

    /// Rewrite the identifier inside an argument wrapper into a declared
    /// local.
    fn walk_param(&mut self, expr: Expr, shadow: bool) -> Expr {
        match expr {
            Expr::UnresolvedIdent(ident) if ident.kind == IdentKind::Local => {
                let local = if shadow {
                    self.declare_shadow(ident.name)
                } else {
                    self.declare(ident.name)
                };
                Expr::Local(Local {
                    loc: ident.loc,
                    name: local,
                })
            }
            Expr::OptionalArg(mut arg) => {
                arg.expr = Box::new(self.walk_param(*arg.expr, shadow));
                // Defaults may reference earlier parameters.
                arg.default = Box::new(self.walk(*arg.default));
                Expr::OptionalArg(arg)
            }
            Expr::RestArg(mut arg) => {
                arg.expr = Box::new(self.walk_param(*arg.expr, shadow));
                Expr::RestArg(arg)
            }
            Expr::KeywordArg(mut arg) => {
                arg.expr = Box::new(self.walk_param(*arg.expr, shadow));
                Expr::KeywordArg(arg)
            }
            Expr::BlockArg(mut arg) => {
                arg.expr = Box::new(self.walk_param(*arg.expr, shadow));
                Expr::BlockArg(arg)
            }
            Expr::ShadowArg(mut arg) => {
                arg.expr = Box::new(self.walk_param(*arg.expr, true));
                Expr::ShadowArg(arg)
            }
            other => self.walk(other),
        }
    }

    fn walk(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::ClassDef(mut node) => {
                node.name = Box::new(self.walk(*node.name));
                self.frames.push(Frame::boundary());
                node.ancestors = node
                    .ancestors
                    .into_iter()
                    .map(|anc| self.walk(anc))
                    .collect();
                node.rhs = node.rhs.into_iter().map(|stat| self.walk(stat)).collect();
                self.frames.pop();
                Expr::ClassDef(node)
            }
            Expr::MethodDef(mut node) => {
                self.frames.push(Frame::boundary());
                node.args = node
                    .args
                    .into_iter()
                    .map(|arg| self.walk_param(arg, false))
                    .collect();
                node.rhs = Box::new(self.walk(*node.rhs));
                self.frames.pop();
                Expr::MethodDef(node)
            }
            Expr::Send(mut node) => {
                node.recv = Box::new(self.walk(*node.recv));
                node.args = node.args.into_iter().map(|arg| self.walk(arg)).collect();
                if let Some(mut block) = node.block {
                    self.frames.push(Frame::block());
                    block.args = block
                        .args
                        .into_iter()
                        .map(|arg| self.walk_param(arg, false))
                        .collect();
                    block.body = Box::new(self.walk(*block.body));
                    self.frames.pop();
                    node.block = Some(block);
                }
                Expr::Send(node)
            }
            Expr::Assign(mut node) => {
                node.rhs = Box::new(self.walk(*node.rhs));
                node.lhs = Box::new(match *node.lhs {
                    Expr::UnresolvedIdent(ident) if ident.kind == IdentKind::Local => {
                        let local = self.declare(ident.name);
                        Expr::Local(Local {
                            loc: ident.loc,
                            name: local,
                        })
                    }
                    other => self.walk(other),
                });
                Expr::Assign(node)
            }
            Expr::UnresolvedIdent(ident) if ident.kind == IdentKind::Local => {
                match self.lookup(ident.name) {
                    Some(local) => Expr::Local(Local {
                        loc: ident.loc,
                        name: local,
                    }),
                    // A bare identifier that is not a local is an
                    // implicit send to self.
                    None => Expr::Send(Send {
                        loc: ident.loc,
                        recv: Box::new(mk::self_local(ident.loc)),
                        fun: ident.name,
                        args: Vec::new(),
                        block: None,
                    }),
                }
            }
            Expr::InsSeq(mut node) => {
                node.stats = node.stats.into_iter().map(|stat| self.walk(stat)).collect();
                node.expr = Box::new(self.walk(*node.expr));
                Expr::InsSeq(node)
            }
            Expr::OptionalArg(mut node) => {
                node.expr = Box::new(self.walk(*node.expr));
                node.default = Box::new(self.walk(*node.default));
                Expr::OptionalArg(node)
            }
            Expr::RestArg(mut node) => {
                node.expr = Box::new(self.walk(*node.expr));
                Expr::RestArg(node)
            }
            Expr::KeywordArg(mut node) => {
                node.expr = Box::new(self.walk(*node.expr));
                Expr::KeywordArg(node)
            }
            Expr::BlockArg(mut node) => {
                node.expr = Box::new(self.walk(*node.expr));
                Expr::BlockArg(node)
            }
            Expr::ShadowArg(mut node) => {
                node.expr = Box::new(self.walk(*node.expr));
                Expr::ShadowArg(node)
            }
            Expr::UnresolvedConstantLit(mut node) => {
                node.scope = Box::new(self.walk(*node.scope));
                Expr::UnresolvedConstantLit(node)
            }
            Expr::Hash(mut node) => {
                node.keys = node.keys.into_iter().map(|key| self.walk(key)).collect();
                node.values = node
                    .values
                    .into_iter()
                    .map(|value| self.walk(value))
                    .collect();
                Expr::Hash(node)
            }
            leaf @ (Expr::EmptyTree
            | Expr::Literal(_)
            | Expr::Local(_)
            | Expr::Field(_)
            | Expr::ConstantLit(_)
            | Expr::UnresolvedIdent(_)) => leaf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ClassKind;
    use crate::desugar::desugar;
    use crate::files::FileKind;
    use crate::globals::GlobalState;
    use crate::parse;

    fn resolve(source: &str) -> (GlobalState, Expr) {
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
        let parsed = run(ParsedFile::new(tree, file, &gs));
        (gs, parsed.tree)
    }

    fn first_method(tree: &Expr) -> &crate::ast::MethodDef {
        match tree {
            Expr::ClassDef(root) => match &root.rhs[0] {
                Expr::MethodDef(def) => def,
                other => panic!("expected methoddef, got {:?}", other),
            },
            other => panic!("expected root classdef, got {:?}", other),
        }
    }

    #[test]
    fn test_parameters_become_locals() {
        let (_gs, tree) = resolve("def m(x)\n  x\nend\n");
        let def = first_method(&tree);
        assert!(matches!(&def.args[0], Expr::Local(_)));
        assert!(matches!(def.rhs.as_ref(), Expr::Local(_)));
    }

    #[test]
    fn test_assignment_declares_local() {
        let (_gs, tree) = resolve("def m\n  x = 1\n  x\nend\n");
        let def = first_method(&tree);
        match def.rhs.as_ref() {
            Expr::InsSeq(seq) => {
                assert!(matches!(&seq.stats[0], Expr::Assign(a)
                    if matches!(a.lhs.as_ref(), Expr::Local(_))));
                assert!(matches!(seq.expr.as_ref(), Expr::Local(_)));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_ident_becomes_self_send() {
        let (gs, tree) = resolve("def m\n  helper\nend\n");
        let def = first_method(&tree);
        match def.rhs.as_ref() {
            Expr::Send(send) => {
                assert!(send.recv.is_self_reference());
                assert_eq!(gs.names.show(send.fun), "helper");
            }
            other => panic!("expected self send, got {:?}", other),
        }
    }

    #[test]
    fn test_method_bodies_do_not_see_enclosing_locals() {
        let (_gs, tree) = resolve("x = 1\ndef m\n  x\nend\n");
        match &tree {
            Expr::ClassDef(root) => match &root.rhs[1] {
                Expr::MethodDef(def) => {
                    assert!(matches!(def.rhs.as_ref(), Expr::Send(_)));
                }
                other => panic!("expected methoddef, got {:?}", other),
            },
            other => panic!("expected root classdef, got {:?}", other),
        }
    }

    #[test]
    fn test_blocks_see_enclosing_method_locals() {
        let (_gs, tree) = resolve("def m(x)\n  each do |y|\n    x\n  end\nend\n");
        let def = first_method(&tree);
        match def.rhs.as_ref() {
            Expr::Send(send) => {
                let block = send.block.as_ref().expect("block");
                assert!(matches!(block.body.as_ref(), Expr::Local(_)));
            }
            other => panic!("expected send with block, got {:?}", other),
        }
    }

    #[test]
    fn test_shadow_args_get_fresh_numbering() {
        let (_gs, tree) = resolve("def m(y)\n  each do |x; y|\n    y\n  end\nend\n");
        let def = first_method(&tree);
        match def.rhs.as_ref() {
            Expr::Send(send) => {
                let block = send.block.as_ref().expect("block");
                match &block.args[1] {
                    Expr::ShadowArg(arg) => match arg.expr.as_ref() {
                        Expr::Local(local) => assert!(local.name.unique > 0),
                        other => panic!("expected local, got {:?}", other),
                    },
                    other => panic!("expected shadow arg, got {:?}", other),
                }
                match block.body.as_ref() {
                    Expr::Local(local) => assert!(local.name.unique > 0),
                    other => panic!("expected local body, got {:?}", other),
                }
            }
            other => panic!("expected send with block, got {:?}", other),
        }
    }

    #[test]
    fn test_class_bodies_are_boundaries() {
        let (_gs, tree) = resolve("x = 1\nclass A\n  x\nend\n");
        match &tree {
            Expr::ClassDef(root) => match &root.rhs[1] {
                Expr::ClassDef(class) => {
                    assert_eq!(class.kind, ClassKind::Class);
                    assert!(matches!(&class.rhs[0], Expr::Send(_)));
                }
                other => panic!("expected classdef, got {:?}", other),
            },
            other => panic!("expected root classdef, got {:?}", other),
        }
    }

    #[test]
    fn test_self_survives() {
        let (_gs, tree) = resolve("def m\n  self\nend\n");
        let def = first_method(&tree);
        assert!(def.rhs.is_self_reference());
    }
}
