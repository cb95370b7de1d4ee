use crate::ast::{
    map_tree, ConstantLit, Expr, ParsedFile, TreeMapper, UnresolvedConstantLit,
};
use crate::globals::GlobalState;
use crate::symbols::{syms, SymbolRef};

/// The tree-level subset of constant resolution: rewrite unresolved
/// constant references whose meaning is already decided by the symbol
/// table. Used by incremental re-resolution, where re-running the full
/// whole-program resolver would defeat the purpose; anything still
/// unresolved is left in the tree for the full resolver.
pub fn run_tree_passes(gs: &mut GlobalState, trees: Vec<ParsedFile>) -> Vec<ParsedFile> {
    trees
        .into_iter()
        .map(|mut parsed| {
            let mut walk = ResolveConstantsWalk;
            parsed.tree = map_tree(&mut walk, gs, syms::ROOT, parsed.tree);
            parsed
        })
        .collect()
}

struct ResolveConstantsWalk;

impl ResolveConstantsWalk {
    /// Lexical lookup: the owner chain from the innermost scope to the
    /// root.
    fn resolve_lexical(
        gs: &GlobalState,
        owner: SymbolRef,
        name: crate::names::NameRef,
    ) -> SymbolRef {
        let mut scope = gs.enclosing_class(owner);
        loop {
            let found = gs.find_member(scope, name);
            if found.exists() {
                return found;
            }
            if scope == syms::ROOT {
                return syms::NONE;
            }
            scope = gs.enclosing_class(gs.symbol(scope).owner);
        }
    }
}

impl TreeMapper for ResolveConstantsWalk {
    fn post_unresolved_constant_lit(
        &mut self,
        gs: &mut GlobalState,
        owner: SymbolRef,
        node: UnresolvedConstantLit,
    ) -> Expr {
        let resolved = match node.scope.as_ref() {
            // Unqualified reference: search enclosing scopes.
            Expr::EmptyTree => Self::resolve_lexical(gs, owner, node.cnst),
            // Qualified reference through an already-resolved scope.
            Expr::ConstantLit(scope) => gs.find_member(scope.symbol, node.cnst),
            _ => syms::NONE,
        };
        if resolved.exists() {
            let loc = node.loc;
            Expr::ConstantLit(ConstantLit {
                loc,
                symbol: resolved,
                original: Some(Box::new(node)),
            })
        } else {
            Expr::UnresolvedConstantLit(node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::files::FileKind;
    use crate::localvars;
    use crate::namer;
    use crate::parse;

    fn name_file(gs: &mut GlobalState, path: &str, source: &str) -> ParsedFile {
        let file = gs.with_unfrozen_files(|gs| {
            let file = gs.reserve_file(path);
            gs.enter_file_source(file, source.into(), FileKind::Normal);
            file
        });
        let stmts = gs
            .with_unfrozen_names(|gs| parse::parse_file(gs, file))
            .expect("parse failed");
        let tree = desugar(gs, file, stmts);
        let parsed = localvars::run(ParsedFile::new(tree, file, gs));
        gs.with_unfrozen_names(|gs| gs.with_unfrozen_symbols(|gs| namer::run(gs, parsed)))
    }

    fn count_unresolved(expr: &Expr) -> usize {
        match expr {
            Expr::UnresolvedConstantLit(node) => 1 + count_unresolved(&node.scope),
            Expr::ClassDef(node) => {
                node.ancestors.iter().map(count_unresolved).sum::<usize>()
                    + node
                        .singleton_ancestors
                        .iter()
                        .map(count_unresolved)
                        .sum::<usize>()
                    + node.rhs.iter().map(count_unresolved).sum::<usize>()
            }
            Expr::MethodDef(node) => count_unresolved(&node.rhs),
            Expr::Send(node) => {
                count_unresolved(&node.recv)
                    + node.args.iter().map(count_unresolved).sum::<usize>()
                    + node
                        .block
                        .as_ref()
                        .map(|b| count_unresolved(&b.body))
                        .unwrap_or(0)
            }
            Expr::Assign(node) => count_unresolved(&node.lhs) + count_unresolved(&node.rhs),
            Expr::InsSeq(node) => {
                node.stats.iter().map(count_unresolved).sum::<usize>()
                    + count_unresolved(&node.expr)
            }
            _ => 0,
        }
    }

    #[test]
    fn test_resolves_known_lexical_constant() {
        let mut gs = GlobalState::new();
        name_file(&mut gs, "./base.rb", "module Base\nend\n");
        let user = name_file(&mut gs, "./user.rb", "class User\n  include Base\nend\n");
        assert_eq!(count_unresolved(&user.tree), 1);
        let resolved = run_tree_passes(&mut gs, vec![user]);
        assert_eq!(count_unresolved(&resolved[0].tree), 0);
    }

    #[test]
    fn test_resolves_qualified_reference() {
        let mut gs = GlobalState::new();
        name_file(&mut gs, "./a.rb", "module A\n  class B\n  end\nend\n");
        let user = name_file(&mut gs, "./user.rb", "X = A::B\n");
        let resolved = run_tree_passes(&mut gs, vec![user]);
        assert_eq!(count_unresolved(&resolved[0].tree), 0);
    }

    #[test]
    fn test_unknown_constant_left_unresolved() {
        let mut gs = GlobalState::new();
        let user = name_file(&mut gs, "./user.rb", "class User\n  include Missing\nend\n");
        let resolved = run_tree_passes(&mut gs, vec![user]);
        assert!(count_unresolved(&resolved[0].tree) > 0);
    }
}
