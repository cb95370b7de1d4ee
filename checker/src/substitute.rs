use crate::ast::{Expr, LiteralValue, ParsedFile};
use crate::globals::GlobalState;
use crate::names::{Name, NameRef};
use index_vec::IndexVec;

/// Map from one global state's name ids to another's, built by
/// re-interning every source name into the destination. Ids below the
/// deep-clone fast path bound map to themselves. Trees rewritten through
/// the map become valid in the destination state without copying any
/// other structure.
pub struct GlobalSubstitution {
    map: IndexVec<NameRef, NameRef>,
    from_gs: u32,
    to_gs: u32,
}

impl GlobalSubstitution {
    pub fn new(from: &GlobalState, to: &mut GlobalState) -> GlobalSubstitution {
        let shared = from.names_shared_with(to);
        let mut map: IndexVec<NameRef, NameRef> = IndexVec::with_capacity(from.names.len());
        to.with_unfrozen_names(|to| {
            for (id, name) in from.names.iter() {
                let to_id = if id.raw() < shared {
                    id
                } else {
                    // Originals have smaller ids, so their mappings are
                    // already in `map`.
                    match name {
                        Name::Utf8(text) => to.enter_name_utf8(text),
                        Name::Unique {
                            kind,
                            num,
                            original,
                        } => {
                            let original = map[*original];
                            to.fresh_name_unique(*kind, original, *num)
                        }
                        Name::Constant { original } => {
                            let original = map[*original];
                            to.enter_name_constant(original)
                        }
                    }
                };
                map.push(to_id);
            }
        });
        GlobalSubstitution {
            map,
            from_gs: from.gs_id,
            to_gs: to.gs_id,
        }
    }

    pub fn substitute(&self, name: NameRef) -> NameRef {
        self.map[name]
    }

    /// Rewrite every name ref in the tree into the destination state's id
    /// space. A tree may be substituted at most once; in debug builds,
    /// handing back a tree that no longer belongs to the source state is
    /// a contract violation.
    pub fn run(&self, parsed: &mut ParsedFile) {
        debug_assert!(
            parsed.owner_gs == self.from_gs,
            "tree does not belong to this substitution's source state (substituted twice?)"
        );
        self.run_expr(&mut parsed.tree);
        parsed.owner_gs = self.to_gs;
    }

    fn run_expr(&self, expr: &mut Expr) {
        match expr {
            Expr::EmptyTree => {}
            Expr::ClassDef(node) => {
                self.run_expr(&mut node.name);
                for anc in &mut node.ancestors {
                    self.run_expr(anc);
                }
                for anc in &mut node.singleton_ancestors {
                    self.run_expr(anc);
                }
                for stat in &mut node.rhs {
                    self.run_expr(stat);
                }
            }
            Expr::MethodDef(node) => {
                node.name = self.substitute(node.name);
                for arg in &mut node.args {
                    self.run_expr(arg);
                }
                self.run_expr(&mut node.rhs);
            }
            Expr::Send(node) => {
                node.fun = self.substitute(node.fun);
                self.run_expr(&mut node.recv);
                for arg in &mut node.args {
                    self.run_expr(arg);
                }
                if let Some(block) = &mut node.block {
                    for arg in &mut block.args {
                        self.run_expr(arg);
                    }
                    self.run_expr(&mut block.body);
                }
            }
            Expr::Assign(node) => {
                self.run_expr(&mut node.lhs);
                self.run_expr(&mut node.rhs);
            }
            Expr::Literal(node) => match &mut node.value {
                LiteralValue::String(name) | LiteralValue::Symbol(name) => {
                    *name = self.substitute(*name);
                }
                _ => {}
            },
            Expr::Local(node) => {
                node.name.name = self.substitute(node.name.name);
            }
            Expr::OptionalArg(node) => {
                self.run_expr(&mut node.expr);
                self.run_expr(&mut node.default);
            }
            Expr::RestArg(node) => self.run_expr(&mut node.expr),
            Expr::KeywordArg(node) => self.run_expr(&mut node.expr),
            Expr::BlockArg(node) => self.run_expr(&mut node.expr),
            Expr::ShadowArg(node) => self.run_expr(&mut node.expr),
            Expr::UnresolvedConstantLit(node) => {
                node.cnst = self.substitute(node.cnst);
                self.run_expr(&mut node.scope);
            }
            Expr::ConstantLit(node) => {
                if let Some(original) = &mut node.original {
                    original.cnst = self.substitute(original.cnst);
                    self.run_expr(&mut original.scope);
                }
            }
            Expr::UnresolvedIdent(node) => {
                node.name = self.substitute(node.name);
            }
            Expr::Field(_) => {}
            Expr::InsSeq(node) => {
                for stat in &mut node.stats {
                    self.run_expr(stat);
                }
                self.run_expr(&mut node.expr);
            }
            Expr::Hash(node) => {
                for key in &mut node.keys {
                    self.run_expr(key);
                }
                for value in &mut node.values {
                    self.run_expr(value);
                }
            }
        }
    }
}
