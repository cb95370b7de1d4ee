use crate::ast::{
    map_tree, mk, Assign, ClassDef, ClassKind, ConstantLit, Expr, HashLit, IdentKind, LocalName,
    MethodDef, ParsedFile, Send, TreeMapper, UnresolvedConstantLit, UnresolvedIdent,
};
use crate::diagnostics::{Diagnostic, ErrorClass};
use crate::globals::GlobalState;
use crate::names::{wk, NameRef, UniqueKind};
use crate::span::Loc;
use crate::symbols::{syms, SymbolRef, Variance, Visibility};
use rustc_hash::FxHashMap;

/// State shared by one naming run across files: the first non-interface
/// file that defined each class, used to flag cross-file redefinition.
#[derive(Default)]
pub struct NamerCtx {
    class_behavior_locs: FxHashMap<SymbolRef, Loc>,
}

/// Walk one parsed file and enter its classes, methods, arguments,
/// constants, and type members into the symbol table. Callers run files
/// sequentially: the symbol table is not safe for concurrent insertion
/// and singleton-class forcing cascades into classes entered by other
/// files.
pub fn run(gs: &mut GlobalState, parsed: ParsedFile) -> ParsedFile {
    let mut ctx = NamerCtx::default();
    run_with_ctx(gs, &mut ctx, parsed)
}

pub fn run_with_ctx(gs: &mut GlobalState, ctx: &mut NamerCtx, mut parsed: ParsedFile) -> ParsedFile {
    let mut inserter = NameInserter {
        ctx,
        scope_stack: vec![LocalFrame::default()],
    };
    parsed.tree = map_tree(&mut inserter, gs, syms::ROOT, parsed.tree);
    parsed
}

#[derive(Default)]
struct LocalFrame {
    module_function_active: bool,
}

struct NameInserter<'ctx> {
    ctx: &'ctx mut NamerCtx,
    scope_stack: Vec<LocalFrame>,
}

/// A method parameter in symbol-entry form, unwrapped from the tree's
/// argument wrapper nodes.
struct ParsedArg {
    local: LocalName,
    loc: Loc,
    keyword: bool,
    block: bool,
    repeated: bool,
    shadow: bool,
    default: Option<Expr>,
}

fn parse_arg(expr: Expr) -> ParsedArg {
    match expr {
        Expr::Local(local) => ParsedArg {
            local: local.name,
            loc: local.loc,
            keyword: false,
            block: false,
            repeated: false,
            shadow: false,
            default: None,
        },
        Expr::OptionalArg(arg) => {
            let mut parsed = parse_arg(*arg.expr);
            parsed.default = Some(*arg.default);
            parsed
        }
        Expr::RestArg(arg) => {
            let mut parsed = parse_arg(*arg.expr);
            parsed.repeated = true;
            parsed
        }
        Expr::KeywordArg(arg) => {
            let mut parsed = parse_arg(*arg.expr);
            parsed.keyword = true;
            parsed
        }
        Expr::BlockArg(arg) => {
            let mut parsed = parse_arg(*arg.expr);
            parsed.block = true;
            parsed
        }
        Expr::ShadowArg(arg) => {
            let mut parsed = parse_arg(*arg.expr);
            parsed.shadow = true;
            parsed
        }
        other => {
            debug_assert!(false, "malformed method argument: {:?}", other);
            let loc = other.loc().unwrap_or(Loc::empty(crate::span::FileId::NONE));
            ParsedArg {
                local: LocalName {
                    name: wk::ARG,
                    unique: 0,
                },
                loc,
                keyword: false,
                block: false,
                repeated: false,
                shadow: false,
                default: None,
            }
        }
    }
}

impl<'ctx> NameInserter<'ctx> {
    fn enter_scope(&mut self) {
        self.scope_stack.push(LocalFrame::default());
    }

    fn exit_scope(&mut self) {
        self.scope_stack.pop();
    }

    /// Resolve (entering as needed) a possibly nested constant reference
    /// used as a definition name, rewriting it to a resolved constant.
    /// Returns the rewritten node and the symbol it denotes.
    fn squash_names(
        &mut self,
        gs: &mut GlobalState,
        owner: SymbolRef,
        node: Expr,
    ) -> (Expr, SymbolRef) {
        match node {
            Expr::UnresolvedConstantLit(const_lit) => {
                let loc = const_lit.loc;
                let cnst = const_lit.cnst;
                let (scope, new_owner) = self.squash_names(gs, owner, *const_lit.scope);
                let mut existing = gs.find_member(new_owner, cnst);
                if !existing.exists() {
                    if !gs.symbol(new_owner).is_class() {
                        let const_name = gs.names.show(cnst);
                        let owner_name = gs.show_symbol(new_owner);
                        gs.error(
                            Diagnostic::new(
                                ErrorClass::InvalidClassOwner,
                                loc,
                                format!(
                                    "Can't nest `{}` under `{}` because `{}` is not a class or module",
                                    const_name, owner_name, owner_name
                                ),
                            )
                            .with_note(
                                format!("`{}` defined here", owner_name),
                                gs.symbol(new_owner).loc(),
                            ),
                        );
                        return (mk::empty_tree(), owner);
                    }
                    existing = gs.enter_class_symbol(loc, new_owner, cnst);
                    gs.singleton_class(existing);
                }
                let node = Expr::ConstantLit(ConstantLit {
                    loc,
                    symbol: existing,
                    original: Some(Box::new(UnresolvedConstantLit {
                        loc,
                        scope: Box::new(scope),
                        cnst,
                    })),
                });
                (node, existing)
            }
            Expr::ConstantLit(id) => {
                let symbol = gs.dealias(id.symbol);
                (Expr::ConstantLit(id), symbol)
            }
            Expr::UnresolvedIdent(uid) => {
                if uid.kind != IdentKind::Class || uid.name != wk::SINGLETON {
                    gs.error(Diagnostic::new(
                        ErrorClass::DynamicConstant,
                        uid.loc,
                        "Unsupported constant scope",
                    ));
                }
                // Emitted via `class << self` bodies.
                (mk::empty_tree(), owner)
            }
            Expr::EmptyTree => (mk::empty_tree(), owner),
            node if node.is_self_reference() => (mk::empty_tree(), owner),
            node => {
                gs.error(Diagnostic::new(
                    ErrorClass::DynamicConstant,
                    node.loc(),
                    "Dynamic constant references are unsupported",
                ));
                (mk::empty_tree(), owner)
            }
        }
    }

    /// Enter the symbol-table slot for one parsed argument and produce
    /// the tree node standing for it in the method's argument list.
    fn arg_to_symbol(
        &mut self,
        gs: &mut GlobalState,
        method: SymbolRef,
        pos: usize,
        arg: ParsedArg,
    ) -> Expr {
        if pos < gs.symbol(method).arguments.len() {
            // Re-parsing the same definition: keep the symbol's argument
            // list and refresh locations.
            gs.symbol_mut(method).arguments[pos].loc = arg.loc;
            return Expr::Local(crate::ast::Local {
                loc: arg.loc,
                name: arg.local,
            });
        }

        let name = if arg.keyword {
            arg.local.name
        } else if arg.block {
            wk::BLK_ARG
        } else {
            gs.fresh_name_unique(UniqueKind::PositionalArg, wk::ARG, pos as u32 + 1)
        };
        let info = gs.enter_method_argument(method, name, arg.loc);
        info.flags.keyword = arg.keyword;
        info.flags.block = arg.block;
        info.flags.repeated = arg.repeated;
        info.flags.default = arg.default.is_some();

        let local: Expr = Expr::Local(crate::ast::Local {
            loc: arg.loc,
            name: arg.local,
        });
        match arg.default {
            Some(default) => Expr::OptionalArg(crate::ast::OptionalArg {
                loc: arg.loc,
                expr: Box::new(local),
                default: Box::new(default),
            }),
            None => local,
        }
    }

    fn fill_in_args(
        &mut self,
        gs: &mut GlobalState,
        method: SymbolRef,
        parsed_args: Vec<ParsedArg>,
    ) -> Vec<Expr> {
        let mut args = Vec::with_capacity(parsed_args.len());
        let mut in_shadows = false;
        for (pos, arg) in parsed_args.into_iter().enumerate() {
            if arg.shadow {
                in_shadows = true;
                args.push(Expr::Local(crate::ast::Local {
                    loc: arg.loc,
                    name: arg.local,
                }));
            } else {
                debug_assert!(!in_shadows, "shadow argument followed by non-shadow argument");
                args.push(self.arg_to_symbol(gs, method, pos, arg));
            }
        }
        args
    }

    fn method_owner(&self, gs: &mut GlobalState, owner: SymbolRef) -> SymbolRef {
        let owner = gs.enclosing_class(owner);
        if owner == syms::ROOT {
            // Top-level methods live on Object.
            syms::OBJECT
        } else {
            owner
        }
    }

    fn is_intrinsic(&self, gs: &GlobalState, sym: SymbolRef) -> bool {
        gs.symbol(sym).flags.intrinsic
    }

    fn params_match(
        &mut self,
        gs: &mut GlobalState,
        candidate: SymbolRef,
        loc: Loc,
        parsed_args: &[ParsedArg],
    ) -> bool {
        let sym = gs.dealias(candidate);
        if gs.symbol(sym).arguments.len() != parsed_args.len() {
            let shown = gs.show_symbol(sym);
            let expected = gs.symbol(sym).arguments.len();
            gs.error(
                Diagnostic::new(
                    ErrorClass::RedefinitionOfMethod,
                    loc,
                    format!(
                        "Method `{}` redefined without matching argument count. Expected: `{}`, got: `{}`",
                        shown,
                        expected,
                        parsed_args.len()
                    ),
                )
                .with_note("Previous definition", gs.symbol(sym).loc()),
            );
            return false;
        }
        for (parsed, pos) in parsed_args.iter().zip(0..) {
            let sym_arg = &gs.symbol(sym).arguments[pos];
            let mismatch = if sym_arg.flags.keyword != parsed.keyword {
                Some(("isKeyword", sym_arg.flags.keyword, parsed.keyword))
            } else if sym_arg.flags.block != parsed.block {
                Some(("isBlock", sym_arg.flags.block, parsed.block))
            } else if sym_arg.flags.repeated != parsed.repeated {
                Some(("isRepeated", sym_arg.flags.repeated, parsed.repeated))
            } else {
                None
            };
            if let Some((attribute, expected, got)) = mismatch {
                let shown = gs.show_symbol(sym);
                let prev = gs.symbol(sym).loc();
                gs.error(
                    Diagnostic::new(
                        ErrorClass::RedefinitionOfMethod,
                        loc,
                        format!(
                            "Method `{}` redefined with mismatched argument attribute `{}`. Expected: `{}`, got: `{}`",
                            shown, attribute, expected, got
                        ),
                    )
                    .with_note("Previous definition", prev),
                );
                return false;
            }
            if sym_arg.flags.keyword && sym_arg.name != parsed.local.name {
                let shown = gs.show_symbol(sym);
                let expected = gs.names.show(sym_arg.name);
                let got = gs.names.show(parsed.local.name);
                let prev = gs.symbol(sym).loc();
                gs.error(
                    Diagnostic::new(
                        ErrorClass::RedefinitionOfMethod,
                        loc,
                        format!(
                            "Method `{}` redefined with mismatched argument name. Expected: `{}`, got: `{}`",
                            shown, expected, got
                        ),
                    )
                    .with_note("Previous definition", prev),
                );
                return false;
            }
        }
        true
    }

    fn alias_method(
        &mut self,
        gs: &mut GlobalState,
        loc: Loc,
        owner: SymbolRef,
        new_name: NameRef,
        method: SymbolRef,
    ) {
        let alias = gs.enter_method_symbol(loc, owner, new_name);
        gs.symbol_mut(alias).alias_to = Some(method);
    }

    fn alias_module_function(&mut self, gs: &mut GlobalState, loc: Loc, method: SymbolRef) {
        let owner = gs.symbol(method).owner;
        let singleton = gs.singleton_class(owner);
        let name = gs.symbol(method).name;
        self.alias_method(gs, loc, singleton, name, method);
    }

    /// The class whose scope a constant assignment lands in: the nearest
    /// class in the owner chain.
    fn context_class(&self, gs: &GlobalState, of: SymbolRef) -> SymbolRef {
        gs.enclosing_class(of)
    }

    fn is_valid_ancestor(expr: &Expr) -> bool {
        match expr {
            Expr::EmptyTree | Expr::ConstantLit(_) => true,
            node if node.is_self_reference() => true,
            Expr::UnresolvedConstantLit(lit) => Self::is_valid_ancestor(&lit.scope),
            _ => false,
        }
    }

    /// `include`/`extend` statements append their arguments to the class
    /// node's ancestor lists. Returns true when the statement was
    /// consumed.
    fn add_ancestor(
        &mut self,
        gs: &mut GlobalState,
        klass: &mut ClassDef,
        line: &mut Expr,
    ) -> bool {
        let Expr::Send(send) = line else {
            return false;
        };
        let to_singleton = if send.fun == wk::INCLUDE {
            false
        } else if send.fun == wk::EXTEND {
            true
        } else {
            return false;
        };
        if !send.recv.is_self_reference() {
            // `something.include` is not a mixin declaration.
            return false;
        }
        let shown = gs.names.show(send.fun);
        if send.args.is_empty() {
            gs.error(Diagnostic::new(
                ErrorClass::IncludeMultipleParam,
                send.loc,
                format!("`{}` requires at least one argument", shown),
            ));
            return false;
        }
        if send.block.is_some() {
            gs.error(Diagnostic::new(
                ErrorClass::IncludePassedBlock,
                send.loc,
                format!("`{}` can not be passed a block", shown),
            ));
            return false;
        }
        // Reverse order matches the language's ancestor linearization.
        for arg in std::mem::take(&mut send.args).into_iter().rev() {
            if arg.is_empty_tree() {
                continue;
            }
            if arg.is_self_reference() || Self::is_valid_ancestor(&arg) {
                if to_singleton {
                    klass.singleton_ancestors.push(arg);
                } else {
                    klass.ancestors.push(arg);
                }
            } else {
                gs.error(Diagnostic::new(
                    ErrorClass::AncestorNotConstant,
                    arg.loc(),
                    format!("`{}` must only contain constant literals", shown),
                ));
            }
        }
        true
    }

    /// Flag-setting class-body DSL (`final!`, `abstract!`, `interface!`)
    /// and mixin statements. Returns true when the line should be removed
    /// from the class body.
    fn handle_namer_dsl(
        &mut self,
        gs: &mut GlobalState,
        klass: &mut ClassDef,
        line: &mut Expr,
    ) -> bool {
        if self.add_ancestor(gs, klass, line) {
            return true;
        }
        let Expr::Send(send) = line else {
            return false;
        };
        if send.fun == wk::DECLARE_FINAL {
            gs.symbol_mut(klass.symbol).flags.final_ = true;
            let singleton = gs.singleton_class(klass.symbol);
            gs.symbol_mut(singleton).flags.final_ = true;
        }
        if send.fun == wk::DECLARE_INTERFACE || send.fun == wk::DECLARE_ABSTRACT {
            gs.symbol_mut(klass.symbol).flags.abstract_ = true;
            let singleton = gs.singleton_class(klass.symbol);
            gs.symbol_mut(singleton).flags.abstract_ = true;
        }
        if send.fun == wk::DECLARE_INTERFACE {
            gs.symbol_mut(klass.symbol).flags.interface = true;
            if klass.kind == ClassKind::Class {
                gs.error(Diagnostic::new(
                    ErrorClass::InterfaceClass,
                    send.loc,
                    "Classes can't be interfaces. Use `abstract!` instead of `interface!`",
                ));
            }
        }
        // The declarations stay in the body for later phases.
        false
    }

    /// Whether an ancestor node is worth keeping for IDE queries.
    fn should_leave_ancestor_for_ide(anc: &Expr) -> bool {
        if anc.is_empty_tree() || anc.is_self_reference() {
            return false;
        }
        if let Expr::ConstantLit(lit) = anc {
            if lit.symbol == syms::TODO {
                return false;
            }
        }
        true
    }

    fn fill_assign(&mut self, gs: &mut GlobalState, owner: SymbolRef, asgn: Assign) -> Expr {
        // Constant assignment outside a class scope is dynamic.
        if !gs.symbol(owner).is_class() && !gs.symbol(owner).flags.dsl_synthesized {
            gs.error(Diagnostic::new(
                ErrorClass::DynamicConstantAssignment,
                asgn.loc,
                "Dynamic constant assignment",
            ));
        }

        let Assign { loc, lhs, rhs } = asgn;
        let lhs = match *lhs {
            Expr::UnresolvedConstantLit(lhs) => lhs,
            other => {
                debug_assert!(false, "fill_assign called without a constant left-hand side");
                return Expr::Assign(Assign {
                    loc,
                    lhs: Box::new(other),
                    rhs,
                });
            }
        };

        let context = self.context_class(gs, owner);
        let (scope_tree, mut scope) = self.squash_names(gs, context, *lhs.scope);
        if !gs.symbol(scope).is_class() {
            let const_name = gs.names.show(lhs.cnst);
            let scope_shown = gs.show_symbol(scope);
            gs.error(
                Diagnostic::new(
                    ErrorClass::InvalidClassOwner,
                    loc,
                    format!(
                        "Can't nest `{}` under `{}` because `{}` is not a class or module",
                        const_name, scope_shown, scope_shown
                    ),
                )
                .with_note(format!("`{}` defined here", scope_shown), gs.symbol(scope).loc()),
            );
            // Mangle the offender out of the way and re-enter it as a
            // class so compilation can proceed.
            let scope_name = gs.symbol(scope).name;
            gs.mangle_rename_symbol(scope, scope_name);
            let scope_owner = gs.symbol(scope).owner;
            scope = gs.enter_class_symbol(lhs.loc, scope_owner, scope_name);
            gs.singleton_class(scope);
        }

        let existing = gs.find_member_no_dealias(scope, lhs.cnst);
        if existing.exists() && !gs.symbol(existing).is_static_field() {
            let shown = gs.names.show(lhs.cnst);
            let prev = gs.symbol(existing).loc();
            gs.error(
                Diagnostic::new(
                    ErrorClass::ModuleKindRedefinition,
                    loc,
                    format!("Redefining constant `{}`", shown),
                )
                .with_note("Previous definition", prev),
            );
            let existing_name = gs.symbol(existing).name;
            gs.mangle_rename_symbol(existing, existing_name);
        }
        let cnst = gs.enter_static_field_symbol(lhs.loc, scope, lhs.cnst);
        let lhs_loc = lhs.loc;
        let original = UnresolvedConstantLit {
            loc: lhs.loc,
            scope: Box::new(scope_tree),
            cnst: lhs.cnst,
        };
        Expr::Assign(Assign {
            loc,
            lhs: Box::new(Expr::ConstantLit(ConstantLit {
                loc: lhs_loc,
                symbol: cnst,
                original: Some(Box::new(original)),
            })),
            rhs,
        })
    }

    fn handle_assignment(&mut self, gs: &mut GlobalState, owner: SymbolRef, asgn: Assign) -> Expr {
        let is_type_alias = matches!(&*asgn.rhs, Expr::Send(send) if send.fun == wk::TYPE_ALIAS);
        let ret = self.fill_assign(gs, owner, asgn);
        if is_type_alias {
            if let Expr::Assign(assign) = &ret {
                if let Expr::ConstantLit(id) = assign.lhs.as_ref() {
                    if gs.symbol(id.symbol).is_static_field() {
                        gs.symbol_mut(id.symbol).flags.type_alias = true;
                    }
                }
            }
        }
        ret
    }

    fn type_definition_error(&mut self, gs: &mut GlobalState, loc: Loc, message: impl Into<String>) {
        gs.error(Diagnostic::new(
            ErrorClass::InvalidTypeDefinition,
            loc,
            message,
        ));
    }

    fn handle_type_member(&mut self, gs: &mut GlobalState, owner: SymbolRef, asgn: Assign) -> Expr {
        let Assign { loc, lhs, rhs } = asgn;
        let Expr::Send(send) = *rhs else {
            debug_assert!(false, "type member handler requires a send right-hand side");
            return mk::empty_tree();
        };
        let Expr::UnresolvedConstantLit(type_name) = *lhs else {
            debug_assert!(false, "type member handler requires a constant left-hand side");
            return mk::empty_tree();
        };

        let is_template = send.fun == wk::TYPE_TEMPLATE;
        if !gs.symbol(owner).is_class() {
            self.type_definition_error(gs, send.loc, "Types must be defined in class or module scopes");
            return mk::empty_tree();
        }
        if owner == syms::ROOT {
            gs.error(Diagnostic::new(
                ErrorClass::RootTypeMember,
                send.loc,
                "`type_member` cannot be used at the top-level",
            ));
            let fallback = Assign {
                loc,
                lhs: Box::new(Expr::UnresolvedConstantLit(type_name)),
                rhs: Box::new(mk::t_type_alias_untyped(loc)),
            };
            return self.handle_assignment(gs, owner, fallback);
        }

        let mut variance = Variance::Invariant;
        if !send.args.is_empty() {
            if send.args.len() > 2 {
                self.type_definition_error(gs, send.loc, "Too many args in type definition");
                let fallback = Assign {
                    loc,
                    lhs: Box::new(Expr::UnresolvedConstantLit(type_name)),
                    rhs: Box::new(mk::t_type_alias_untyped(loc)),
                };
                return self.handle_assignment(gs, owner, fallback);
            }
            match &send.args[0] {
                Expr::Literal(lit) if lit.as_symbol().is_some() => {
                    let name = lit.as_symbol().unwrap();
                    if name == wk::COVARIANT {
                        variance = Variance::Covariant;
                    } else if name == wk::CONTRAVARIANT {
                        variance = Variance::Contravariant;
                    } else if name == wk::INVARIANT {
                        variance = Variance::Invariant;
                    } else {
                        self.type_definition_error(
                            gs,
                            lit.loc,
                            "Invalid variance kind, only `:covariant` and `:contravariant` are supported",
                        );
                    }
                }
                _ => {
                    if send.args.len() != 1 || !matches!(send.args[0], Expr::Hash(_)) {
                        self.type_definition_error(gs, send.loc, "Invalid param, must be a :symbol");
                    }
                }
            }
        }

        let on_symbol = if is_template {
            gs.singleton_class(owner)
        } else {
            owner
        };

        let duplicate = gs
            .symbol(on_symbol)
            .type_members
            .iter()
            .copied()
            .find(|&member| gs.symbol(member).name == type_name.cnst);
        if let Some(member) = duplicate {
            if gs.symbol(member).loc() != Some(loc) {
                let shown = gs.names.show(type_name.cnst);
                self.type_definition_error(
                    gs,
                    type_name.loc,
                    format!("Duplicate type member `{}`", shown),
                );
                return mk::empty_tree();
            }
        }
        let old_sym = gs.find_member_no_dealias(on_symbol, type_name.cnst);
        if old_sym.exists() && gs.symbol(old_sym).loc() != Some(loc) {
            let shown = gs.show_symbol(old_sym);
            let prev = gs.symbol(old_sym).loc();
            gs.error(
                Diagnostic::new(
                    ErrorClass::InvalidTypeDefinition,
                    type_name.loc,
                    format!("Redefining constant `{}`", shown),
                )
                .with_note("Previous definition", prev),
            );
            let old_name = gs.symbol(old_sym).name;
            gs.mangle_rename_symbol(old_sym, old_name);
        }
        let sym = gs.enter_type_member(loc, on_symbol, type_name.cnst, variance);
        if is_template {
            let context = owner;
            let old = gs.find_member_no_dealias(context, type_name.cnst);
            if old.exists() && gs.symbol(old).loc() != Some(loc) {
                let shown = gs.names.show(type_name.cnst);
                let prev = gs.symbol(old).loc();
                gs.error(
                    Diagnostic::new(
                        ErrorClass::InvalidTypeDefinition,
                        type_name.loc,
                        format!("Redefining constant `{}`", shown),
                    )
                    .with_note("Previous definition", prev),
                );
                gs.mangle_rename_symbol(old, type_name.cnst);
            }
            let alias = gs.enter_static_field_symbol(loc, context, type_name.cnst);
            gs.symbol_mut(alias).alias_to = Some(sym);
        }

        if let Some(Expr::Hash(hash)) = send.args.last() {
            let hash = hash.clone();
            self.apply_type_member_bounds(gs, sym, &hash);
            let fixed = gs.symbol(sym).flags.fixed;
            let bounded = gs.symbol(sym).flags.bounded;
            if bounded {
                // Only :fixed is supported for now.
                self.type_definition_error(gs, send.loc, "Only `:fixed` type members are supported");
            }
            if fixed != bounded {
                let lhs = if fixed {
                    mk::constant(type_name.loc, sym)
                } else {
                    Expr::UnresolvedConstantLit(type_name)
                };
                return Expr::Assign(Assign {
                    loc,
                    lhs: Box::new(lhs),
                    rhs: Box::new(Expr::Send(send)),
                });
            } else if fixed {
                self.type_definition_error(
                    gs,
                    send.loc,
                    "Type member is defined with bounds and `:fixed`",
                );
            } else {
                self.type_definition_error(gs, send.loc, "Missing required param :fixed");
            }
        }
        mk::empty_tree()
    }

    fn apply_type_member_bounds(&mut self, gs: &mut GlobalState, sym: SymbolRef, hash: &HashLit) {
        for key in &hash.keys {
            let Expr::Literal(lit) = key else { continue };
            let Some(name) = lit.as_symbol() else { continue };
            if name == wk::FIXED {
                gs.symbol_mut(sym).flags.fixed = true;
            } else if name == wk::LOWER || name == wk::UPPER {
                gs.symbol_mut(sym).flags.bounded = true;
            }
        }
    }
}

impl<'ctx> TreeMapper for NameInserter<'ctx> {
    fn pre_class_def(&mut self, gs: &mut GlobalState, owner: SymbolRef, node: ClassDef) -> ClassDef {
        let mut klass = node;
        let singleton_body = matches!(
            klass.name.as_ref(),
            Expr::UnresolvedIdent(UnresolvedIdent {
                kind: IdentKind::Class,
                name,
                ..
            }) if *name == wk::SINGLETON
        );
        if singleton_body {
            let enclosing = gs.enclosing_class(owner);
            klass.symbol = gs.singleton_class(enclosing);
        } else {
            if klass.symbol == syms::TODO {
                let enclosing = gs.enclosing_class(owner);
                let name = std::mem::replace(&mut klass.name, Box::new(mk::empty_tree()));
                let (name, symbol) = self.squash_names(gs, enclosing, *name);
                klass.name = Box::new(name);
                klass.symbol = symbol;
            } else {
                // Desugaring produces exactly one resolved class def per
                // file: the top-level wrapper on the root class.
                debug_assert!(klass.symbol == syms::ROOT);
            }
            let is_module = klass.kind == ClassKind::Module;
            if !gs.symbol(klass.symbol).is_class() {
                let shown = gs.show_symbol(klass.symbol);
                let prev = gs.symbol(klass.symbol).loc();
                gs.error(
                    Diagnostic::new(
                        ErrorClass::ModuleKindRedefinition,
                        klass.loc,
                        format!("Redefining constant `{}`", shown),
                    )
                    .with_note("Previous definition", prev),
                );
                let orig_name = gs.symbol(klass.symbol).name;
                gs.mangle_rename_symbol(klass.symbol, orig_name);
                let owner_sym = gs.symbol(klass.symbol).owner;
                klass.symbol = gs.enter_class_symbol(klass.decl_loc, owner_sym, orig_name);
                let flags = &mut gs.symbol_mut(klass.symbol).flags;
                flags.module = is_module;
                flags.module_kind_set = true;
                let before = gs.symbols_used();
                let singleton = gs.singleton_class(klass.symbol);
                debug_assert!(
                    singleton.raw() as usize >= before,
                    "singleton class must be fresh after a mangle-rename"
                );
            } else if gs.symbol(klass.symbol).flags.module_kind_set
                && gs.symbol(klass.symbol).flags.module != is_module
            {
                let shown = gs.show_symbol(klass.symbol);
                let previous_kind = if gs.symbol(klass.symbol).flags.module {
                    "module"
                } else {
                    "class"
                };
                gs.error(Diagnostic::new(
                    ErrorClass::ModuleKindRedefinition,
                    klass.loc,
                    format!("`{}` was previously defined as a `{}`", shown, previous_kind),
                ));
            } else {
                let flags = &mut gs.symbol_mut(klass.symbol).flags;
                flags.module = is_module;
                flags.module_kind_set = true;
            }
        }

        if klass.symbol != syms::ROOT && !gs.files[klass.decl_loc.file].is_rbi() {
            match self.ctx.class_behavior_locs.get(&klass.symbol) {
                None => {
                    self.ctx
                        .class_behavior_locs
                        .insert(klass.symbol, klass.decl_loc);
                }
                Some(prev) if prev.file != klass.decl_loc.file => {
                    let shown = gs.show_symbol(klass.symbol);
                    let prev = *prev;
                    gs.error(
                        Diagnostic::new(
                            ErrorClass::MultipleBehaviorDefs,
                            klass.decl_loc,
                            format!("`{}` has behavior defined in multiple files", shown),
                        )
                        .with_note("Previous definition", prev),
                    );
                }
                Some(_) => {}
            }
        }
        self.enter_scope();
        klass
    }

    fn post_class_def(&mut self, gs: &mut GlobalState, _owner: SymbolRef, node: ClassDef) -> Expr {
        self.exit_scope();
        let mut klass = node;
        if klass.kind == ClassKind::Class
            && gs.symbol(klass.symbol).superclass.is_none()
            && klass.symbol != syms::BASIC_OBJECT
        {
            gs.symbol_mut(klass.symbol).superclass = Some(syms::TODO);
        }

        gs.symbol_mut(klass.symbol).add_loc(klass.decl_loc);
        gs.singleton_class(klass.symbol);

        let rhs = std::mem::take(&mut klass.rhs);
        let mut kept = Vec::with_capacity(rhs.len());
        for mut line in rhs {
            if !self.handle_namer_dsl(gs, &mut klass, &mut line) {
                kept.push(line);
            }
        }
        klass.rhs = kept;

        if !klass.ancestors.is_empty() {
            for pos in 0..klass.ancestors.len() {
                if !Self::is_valid_ancestor(&klass.ancestors[pos]) {
                    gs.error(Diagnostic::new(
                        ErrorClass::AncestorNotConstant,
                        klass.ancestors[pos].loc(),
                        "Superclasses must only contain constant literals",
                    ));
                    klass.ancestors[pos] = mk::empty_tree();
                } else if Self::should_leave_ancestor_for_ide(&klass.ancestors[pos])
                    && (klass.kind == ClassKind::Module || pos != 0)
                {
                    let copy = klass.ancestors[pos].clone();
                    let loc = copy.loc().unwrap_or(klass.loc);
                    klass.rhs.push(mk::keep_for_ide(loc, copy));
                }
            }
        }
        for anc in &klass.singleton_ancestors {
            if Self::should_leave_ancestor_for_ide(anc) {
                let copy = anc.clone();
                let loc = copy.loc().unwrap_or(klass.loc);
                klass.rhs.push(mk::keep_for_ide(loc, copy));
            }
        }

        let mut ide_seqs = Vec::new();
        if matches!(klass.name.as_ref(), Expr::ConstantLit(_)) {
            let copy = (*klass.name).clone();
            ide_seqs.push(mk::keep_for_ide(klass.decl_loc, copy));
        }
        if klass.kind == ClassKind::Class
            && !klass.ancestors.is_empty()
            && Self::should_leave_ancestor_for_ide(&klass.ancestors[0])
        {
            let copy = klass.ancestors[0].clone();
            ide_seqs.push(mk::keep_for_ide(klass.decl_loc, copy));
        }

        // Register the static initializer so later phases can flatten
        // class-body code into it.
        if klass.symbol == syms::ROOT {
            gs.static_init_for_file(klass.loc);
        } else {
            gs.static_init_for_class(klass.symbol, klass.loc);
        }

        let decl_loc = klass.decl_loc;
        mk::ins_seq(decl_loc, ide_seqs, Expr::ClassDef(klass))
    }

    fn pre_method_def(
        &mut self,
        gs: &mut GlobalState,
        owner: SymbolRef,
        node: MethodDef,
    ) -> MethodDef {
        self.enter_scope();
        let mut method = node;

        let mut method_owner = self.method_owner(gs, owner);
        if method.is_self && gs.symbol(method_owner).is_class() {
            method_owner = gs.singleton_class(method_owner);
        }
        debug_assert!(gs.symbol(method_owner).is_class());

        let parsed_args: Vec<ParsedArg> = std::mem::take(&mut method.args)
            .into_iter()
            .map(parse_arg)
            .collect();

        let existing = gs.find_member_no_dealias(method_owner, method.name);
        if existing.exists() {
            if gs.symbol(existing).loc() == Some(method.decl_loc) {
                // Re-parsing the same file.
                method.symbol = existing;
                method.args = self.fill_in_args(gs, existing, parsed_args);
                return method;
            }
            if self.is_intrinsic(gs, existing)
                || self.params_match(gs, existing, method.decl_loc, &parsed_args)
            {
                gs.symbol_mut(existing).add_loc(method.decl_loc);
            } else {
                gs.mangle_rename_symbol(existing, method.name);
            }
        }
        method.symbol = gs.enter_method_symbol(method.decl_loc, method_owner, method.name);
        method.args = self.fill_in_args(gs, method.symbol, parsed_args);
        gs.symbol_mut(method.symbol).add_loc(method.decl_loc);
        if method.dsl_synthesized {
            gs.symbol_mut(method.symbol).flags.dsl_synthesized = true;
        }
        method
    }

    fn post_method_def(&mut self, gs: &mut GlobalState, _owner: SymbolRef, node: MethodDef) -> Expr {
        debug_assert_eq!(
            node.args.len(),
            gs.symbol(node.symbol).arguments.len(),
            "tree arguments and symbol arguments must agree"
        );
        self.exit_scope();
        if self
            .scope_stack
            .last()
            .map(|frame| frame.module_function_active)
            .unwrap_or(false)
        {
            let loc = gs.symbol(node.symbol).loc().unwrap_or(node.decl_loc);
            self.alias_module_function(gs, loc, node.symbol);
        }
        Expr::MethodDef(node)
    }

    fn post_send(&mut self, gs: &mut GlobalState, owner: SymbolRef, node: Send) -> Expr {
        let mut send = node;

        // `private def foo ... end` and friends.
        if send.args.len() == 1 && matches!(send.args[0], Expr::MethodDef(_)) {
            let handled = if send.fun == wk::PRIVATE || send.fun == wk::PRIVATE_CLASS_METHOD {
                let Expr::MethodDef(mdef) = &send.args[0] else {
                    unreachable!()
                };
                gs.symbol_mut(mdef.symbol).visibility = Visibility::Private;
                true
            } else if send.fun == wk::PROTECTED {
                let Expr::MethodDef(mdef) = &send.args[0] else {
                    unreachable!()
                };
                gs.symbol_mut(mdef.symbol).visibility = Visibility::Protected;
                true
            } else if send.fun == wk::PUBLIC {
                let Expr::MethodDef(mdef) = &send.args[0] else {
                    unreachable!()
                };
                gs.symbol_mut(mdef.symbol).visibility = Visibility::Public;
                true
            } else if send.fun == wk::MODULE_FUNCTION {
                let Expr::MethodDef(mdef) = &send.args[0] else {
                    unreachable!()
                };
                self.alias_module_function(gs, send.loc, mdef.symbol);
                true
            } else {
                false
            };
            if handled {
                return send.args.pop().unwrap();
            }
        }

        if send.recv.is_self_reference() && send.fun == wk::MODULE_FUNCTION {
            if send.args.is_empty() {
                if let Some(frame) = self.scope_stack.last_mut() {
                    frame.module_function_active = true;
                }
            } else {
                for pos in 0..send.args.len() {
                    let symbol_arg = match &send.args[pos] {
                        Expr::Literal(lit) => lit.as_symbol().map(|name| (lit.loc, name)),
                        _ => None,
                    };
                    let Some((arg_loc, name)) = symbol_arg else {
                        let shown = gs.names.show(send.fun);
                        let loc = send.args[pos].loc();
                        gs.error(Diagnostic::new(
                            ErrorClass::DynamicDslInvocation,
                            loc,
                            format!(
                                "Unsupported argument to `{}`: arguments must be symbol literals",
                                shown
                            ),
                        ));
                        continue;
                    };
                    let method_owner = self.method_owner(gs, owner);
                    let method = gs.find_member(method_owner, name);
                    if !method.exists() {
                        let fun = gs.names.show(send.fun);
                        let shown = gs.names.show(name);
                        gs.error(Diagnostic::new(
                            ErrorClass::MethodNotFound,
                            arg_loc,
                            format!("`{}`: no such method: `{}`", fun, shown),
                        ));
                        continue;
                    }
                    self.alias_module_function(gs, send.loc, method);
                }
            }
        }

        Expr::Send(send)
    }

    fn post_assign(&mut self, gs: &mut GlobalState, owner: SymbolRef, node: Assign) -> Expr {
        if !matches!(node.lhs.as_ref(), Expr::UnresolvedConstantLit(_)) {
            return Expr::Assign(node);
        }
        let Expr::Send(send) = node.rhs.as_ref() else {
            return self.fill_assign(gs, owner, node);
        };
        if !send.recv.is_self_reference() {
            return self.handle_assignment(gs, owner, node);
        }
        if send.fun == wk::TYPE_MEMBER || send.fun == wk::TYPE_TEMPLATE {
            self.handle_type_member(gs, owner, node)
        } else {
            self.fill_assign(gs, owner, node)
        }
    }

    fn post_unresolved_ident(
        &mut self,
        gs: &mut GlobalState,
        _owner: SymbolRef,
        node: UnresolvedIdent,
    ) -> Expr {
        debug_assert!(
            node.kind != IdentKind::Local,
            "unresolved local left after local-variable resolution"
        );
        if node.kind == IdentKind::Global {
            let mut sym = gs.find_member(syms::ROOT, node.name);
            if !sym.exists() {
                sym = gs.enter_field_symbol(node.loc, syms::ROOT, node.name);
            }
            Expr::Field(crate::ast::Field {
                loc: node.loc,
                symbol: sym,
            })
        } else {
            Expr::UnresolvedIdent(node)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desugar::desugar;
    use crate::dsl;
    use crate::files::FileKind;
    use crate::localvars;
    use crate::parse;
    use crate::span::FileId;
    use crate::symbols::SymbolKind;

    fn enter(gs: &mut GlobalState, path: &str, source: &str) -> FileId {
        gs.with_unfrozen_files(|gs| {
            let file = gs.reserve_file(path);
            gs.enter_file_source(file, source.into(), FileKind::Normal);
            file
        })
    }

    fn index(gs: &mut GlobalState, file: FileId) -> ParsedFile {
        let stmts = gs
            .with_unfrozen_names(|gs| parse::parse_file(gs, file))
            .expect("parse failed");
        let tree = desugar(gs, file, stmts);
        let parsed = ParsedFile::new(tree, file, gs);
        let parsed = gs.with_unfrozen_names(|gs| dsl::run(gs, parsed));
        localvars::run(parsed)
    }

    fn name_source(
        gs: &mut GlobalState,
        ctx: &mut NamerCtx,
        path: &str,
        source: &str,
    ) -> ParsedFile {
        let file = enter(gs, path, source);
        let parsed = index(gs, file);
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| run_with_ctx(gs, ctx, parsed))
        })
    }

    fn member(gs: &GlobalState, owner: SymbolRef, name: &str) -> SymbolRef {
        gs.symbol(owner)
            .members
            .iter()
            .find(|(n, _)| gs.names.show(**n) == name)
            .map(|(_, sym)| *sym)
            .unwrap_or(syms::NONE)
    }

    fn error_classes(gs: &GlobalState) -> Vec<ErrorClass> {
        gs.errors.iter().map(|diag| diag.class).collect()
    }

    #[test]
    fn test_multiple_behavior_defs_across_files() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(&mut gs, &mut ctx, "./a.rb", "class A\nend\n");
        let symbols_after_first = gs.symbols_used();
        name_source(&mut gs, &mut ctx, "./b.rb", "class A\nend\n");

        let a = member(&gs, syms::ROOT, "A");
        assert!(a.exists());
        // No second class symbol for A.
        assert!(gs
            .symbol(syms::ROOT)
            .members
            .iter()
            .filter(|(n, _)| gs.names.show(**n) == "A")
            .count()
            == 1);
        let errors = error_classes(&gs);
        assert_eq!(
            errors
                .iter()
                .filter(|c| **c == ErrorClass::MultipleBehaviorDefs)
                .count(),
            1
        );
        // The second file entered no new class for A.
        assert!(gs.symbols_used() > symbols_after_first); // static init only
    }

    #[test]
    fn test_rbi_files_do_not_define_behavior() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(&mut gs, &mut ctx, "./a.rb", "class A\nend\n");
        name_source(&mut gs, &mut ctx, "./a.rbi", "class A\nend\n");
        assert!(error_classes(&gs).is_empty());
    }

    #[test]
    fn test_reparse_reuses_method_symbol() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        let source = "class Foo\n  def bar(x); end\nend\n";
        name_source(&mut gs, &mut ctx, "./foo.rb", source);
        let foo = member(&gs, syms::ROOT, "Foo");
        let bar = member(&gs, foo, "bar");
        assert!(bar.exists());

        // Re-parse the identical file: same decl loc, same symbol.
        let file = gs.files.find_by_path("./foo.rb").unwrap();
        let parsed = index(&mut gs, file);
        let mut ctx2 = NamerCtx::default();
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| run_with_ctx(gs, &mut ctx2, parsed))
        });
        assert_eq!(member(&gs, foo, "bar"), bar);
        assert!(!error_classes(&gs).contains(&ErrorClass::RedefinitionOfMethod));
    }

    #[test]
    fn test_method_redefinition_mangles_prior() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        let source = "class Foo\n  def bar(x); end\n  def bar(x, y); end\nend\n";
        name_source(&mut gs, &mut ctx, "./foo.rb", source);
        let errors = error_classes(&gs);
        assert_eq!(
            errors
                .iter()
                .filter(|c| **c == ErrorClass::RedefinitionOfMethod)
                .count(),
            1
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let bar = member(&gs, foo, "bar");
        // The second definition wins.
        assert_eq!(gs.symbol(bar).arguments.len(), 2);
        // The first is still present under a mangled name.
        let mangled = member(&gs, foo, "bar$1");
        assert!(mangled.exists());
        assert_eq!(gs.symbol(mangled).arguments.len(), 1);
    }

    #[test]
    fn test_top_level_constant_assignment() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(&mut gs, &mut ctx, "./consts.rb", "FOO = 1\n");
        let foo = member(&gs, syms::ROOT, "FOO");
        assert!(foo.exists());
        assert_eq!(gs.symbol(foo).kind, SymbolKind::StaticField);
        assert!(error_classes(&gs).is_empty());
    }

    #[test]
    fn test_constant_assignment_in_method_is_dynamic() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./consts.rb",
            "def m\n  FOO = 2\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::DynamicConstantAssignment));
    }

    #[test]
    fn test_type_member_variance_and_duplicate() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  X = type_member(:covariant)\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let x = member(&gs, foo, "X");
        assert!(x.exists());
        assert_eq!(gs.symbol(x).kind, SymbolKind::TypeMember);
        assert_eq!(gs.symbol(x).variance, Variance::Covariant);
        assert!(error_classes(&gs).is_empty());

        name_source(
            &mut gs,
            &mut ctx,
            "./dup.rb",
            "class Dup\n  X = type_member(:covariant)\n  X = type_member(:covariant)\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::InvalidTypeDefinition));
    }

    #[test]
    fn test_type_template_goes_on_singleton() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  Y = type_template\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let singleton = gs.symbol(foo).singleton.expect("singleton");
        let y = member(&gs, singleton, "Y");
        assert!(y.exists());
        assert_eq!(gs.symbol(y).kind, SymbolKind::TypeMember);
        // Plus a static-field alias on the class itself.
        let alias = member(&gs, foo, "Y");
        assert!(alias.exists());
        assert_eq!(gs.symbol(alias).kind, SymbolKind::StaticField);
        assert_eq!(gs.dealias(alias), y);
    }

    #[test]
    fn test_type_member_at_root_is_an_error() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(&mut gs, &mut ctx, "./top.rb", "X = type_member\n");
        assert!(error_classes(&gs).contains(&ErrorClass::RootTypeMember));
        // Rewritten to a type alias so later phases see a constant.
        let x = member(&gs, syms::ROOT, "X");
        assert!(x.exists());
        assert!(gs.symbol(x).flags.type_alias);
    }

    #[test]
    fn test_type_member_fixed_bound_keeps_assign() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        let parsed = name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  X = type_member(fixed: Integer)\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let x = member(&gs, foo, "X");
        assert!(gs.symbol(x).flags.fixed);
        assert!(error_classes(&gs).is_empty());
        // The assignment stays in the tree for the resolver.
        let shown = parsed.tree.show_raw(&gs);
        assert!(shown.contains("assign"), "{}", shown);
    }

    #[test]
    fn test_include_appends_ancestor() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        let parsed = name_source(
            &mut gs,
            &mut ctx,
            "./m.rb",
            "module M\n  include Enumerable\nend\n",
        );
        fn find_class(expr: &Expr) -> Option<&ClassDef> {
            match expr {
                Expr::ClassDef(class) => {
                    for stat in &class.rhs {
                        if let Some(found) = find_class(stat) {
                            return Some(found);
                        }
                    }
                    if class.symbol != syms::ROOT {
                        Some(class)
                    } else {
                        None
                    }
                }
                Expr::InsSeq(seq) => {
                    for stat in &seq.stats {
                        if let Some(found) = find_class(stat) {
                            return Some(found);
                        }
                    }
                    find_class(&seq.expr)
                }
                _ => None,
            }
        }
        let class = find_class(&parsed.tree).expect("module M");
        assert_eq!(class.ancestors.len(), 1);
        assert!(matches!(class.ancestors[0], Expr::UnresolvedConstantLit(_)));
        assert!(error_classes(&gs).is_empty());
    }

    #[test]
    fn test_include_non_constant_is_dropped() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        let parsed = name_source(
            &mut gs,
            &mut ctx,
            "./m.rb",
            "module M\n  include foo\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::AncestorNotConstant));
        let shown = parsed.tree.show_raw(&gs);
        assert!(!shown.contains("ancestors=[(send"), "{}", shown);
    }

    #[test]
    fn test_include_without_args_and_with_block() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(&mut gs, &mut ctx, "./m.rb", "module M\n  include\nend\n");
        assert!(error_classes(&gs).contains(&ErrorClass::IncludeMultipleParam));

        name_source(
            &mut gs,
            &mut ctx,
            "./n.rb",
            "module N\n  include Enumerable do\n  end\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::IncludePassedBlock));
    }

    #[test]
    fn test_visibility_send_unwraps_method_def() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  private def secret; end\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let secret = member(&gs, foo, "secret");
        assert!(secret.exists());
        assert_eq!(gs.symbol(secret).visibility, Visibility::Private);
    }

    #[test]
    fn test_module_function_aliases_into_singleton() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./m.rb",
            "module M\n  def helper; end\n  module_function :helper\nend\n",
        );
        let m = member(&gs, syms::ROOT, "M");
        let helper = member(&gs, m, "helper");
        let singleton = gs.symbol(m).singleton.expect("singleton");
        let alias = gs.find_member_no_dealias(singleton, gs.symbol(helper).name);
        assert!(alias.exists());
        assert_eq!(gs.dealias(alias), helper);
    }

    #[test]
    fn test_module_function_mode_aliases_following_defs() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./m.rb",
            "module M\n  module_function\n  def helper; end\nend\n",
        );
        let m = member(&gs, syms::ROOT, "M");
        let singleton = gs.symbol(m).singleton.expect("singleton");
        let helper = member(&gs, m, "helper");
        let alias = gs.find_member_no_dealias(singleton, gs.symbol(helper).name);
        assert!(alias.exists());
    }

    #[test]
    fn test_module_function_diagnostics() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./m.rb",
            "module M\n  module_function :missing\n  module_function 42\nend\n",
        );
        let errors = error_classes(&gs);
        assert!(errors.contains(&ErrorClass::MethodNotFound));
        assert!(errors.contains(&ErrorClass::DynamicDslInvocation));
    }

    #[test]
    fn test_singleton_class_body_methods() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  class << self\n    def make; end\n  end\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let singleton = gs.symbol(foo).singleton.expect("singleton");
        assert!(member(&gs, singleton, "make").exists());
    }

    #[test]
    fn test_self_method_goes_on_singleton() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  def self.create; end\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let singleton = gs.symbol(foo).singleton.expect("singleton");
        assert!(member(&gs, singleton, "create").exists());
        assert!(!member(&gs, foo, "create").exists());
    }

    #[test]
    fn test_interface_on_class_is_an_error() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  interface!\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::InterfaceClass));
        let foo = member(&gs, syms::ROOT, "Foo");
        assert!(gs.symbol(foo).flags.interface);
        assert!(gs.symbol(foo).flags.abstract_);
        let singleton = gs.symbol(foo).singleton.expect("singleton");
        assert!(gs.symbol(singleton).flags.abstract_);
    }

    #[test]
    fn test_final_marks_class_and_singleton() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./m.rb",
            "module M\n  final!\nend\n",
        );
        let m = member(&gs, syms::ROOT, "M");
        assert!(gs.symbol(m).flags.final_);
        let singleton = gs.symbol(m).singleton.expect("singleton");
        assert!(gs.symbol(singleton).flags.final_);
        assert!(error_classes(&gs).is_empty());
    }

    #[test]
    fn test_module_kind_redefinition() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./a.rb",
            "class A\nend\nmodule A\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::ModuleKindRedefinition));
    }

    #[test]
    fn test_constant_redefined_as_class_mangles() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./a.rb",
            "A = 1\nclass A\nend\n",
        );
        assert!(error_classes(&gs).contains(&ErrorClass::ModuleKindRedefinition));
        let a = member(&gs, syms::ROOT, "A");
        assert!(gs.symbol(a).is_class());
        let mangled = member(&gs, syms::ROOT, "A$1");
        assert!(mangled.exists());
        assert!(gs.symbol(mangled).is_static_field());
    }

    #[test]
    fn test_nested_constant_path_enters_scopes() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./a.rb",
            "class A::B::C\nend\n",
        );
        let a = member(&gs, syms::ROOT, "A");
        assert!(a.exists());
        let b = member(&gs, a, "B");
        assert!(b.exists());
        let c = member(&gs, b, "C");
        assert!(c.exists());
        // Intermediate scopes get singleton classes eagerly.
        assert!(gs.symbol(a).singleton.is_some());
    }

    #[test]
    fn test_global_ident_enters_field_on_root() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./g.rb",
            "def m\n  $counter = 1\nend\n",
        );
        let field = member(&gs, syms::ROOT, "$counter");
        assert!(field.exists());
        assert_eq!(gs.symbol(field).kind, SymbolKind::Field);
    }

    #[test]
    fn test_attr_accessor_methods_are_named() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Foo\n  attr_accessor :name\nend\n",
        );
        let foo = member(&gs, syms::ROOT, "Foo");
        let reader = member(&gs, foo, "name");
        let writer = member(&gs, foo, "name=");
        assert!(reader.exists());
        assert!(writer.exists());
        assert!(gs.symbol(reader).flags.dsl_synthesized);
        assert_eq!(gs.symbol(writer).arguments.len(), 1);
    }

    #[test]
    fn test_static_init_registered_per_class_and_file() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(&mut gs, &mut ctx, "./foo.rb", "class Foo\nend\n");
        let foo = member(&gs, syms::ROOT, "Foo");
        let class_init = gs
            .symbol(foo)
            .members
            .values()
            .copied()
            .find(|sym| gs.is_static_init(*sym));
        assert!(class_init.is_some());
        let file_init = gs
            .symbol(syms::ROOT)
            .members
            .values()
            .copied()
            .find(|sym| gs.is_static_init(*sym));
        assert!(file_init.is_some());
    }

    #[test]
    fn test_superclass_left_for_resolver() {
        let mut gs = GlobalState::new();
        let mut ctx = NamerCtx::default();
        name_source(
            &mut gs,
            &mut ctx,
            "./foo.rb",
            "class Base\nend\nclass Child < Base\nend\n",
        );
        let child = member(&gs, syms::ROOT, "Child");
        assert_eq!(gs.symbol(child).superclass, Some(syms::TODO));
    }
}
