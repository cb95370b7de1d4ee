use crate::globals::GlobalState;
use crate::names::{wk, NameRef, UniqueKind};
use crate::span::Loc;
use index_vec::define_index_type;
use rustc_hash::FxHashMap;

define_index_type! {
    pub struct SymbolRef = u32;
}

impl SymbolRef {
    pub fn exists(&self) -> bool {
        *self != syms::NONE
    }
}

impl serde::Serialize for SymbolRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for SymbolRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(SymbolRef::from_raw)
    }
}

/// Well-known symbols, populated at global-state initialization in this
/// order.
pub mod syms {
    use super::SymbolRef;

    pub const NONE: SymbolRef = SymbolRef { _raw: 0 };
    pub const ROOT: SymbolRef = SymbolRef { _raw: 1 };
    /// Sentinel for "to be resolved later", e.g. implicit superclasses.
    pub const TODO: SymbolRef = SymbolRef { _raw: 2 };
    pub const OBJECT: SymbolRef = SymbolRef { _raw: 3 };
    pub const BASIC_OBJECT: SymbolRef = SymbolRef { _raw: 4 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    ClassOrModule,
    Method,
    Field,
    StaticField,
    TypeMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolFlags {
    /// Class-or-module discriminant; meaningful only once
    /// `module_kind_set` is true.
    pub module: bool,
    pub module_kind_set: bool,
    pub final_: bool,
    pub abstract_: bool,
    pub interface: bool,
    pub dsl_synthesized: bool,
    pub type_alias: bool,
    pub fixed: bool,
    pub bounded: bool,
    /// Stub entered to hold an intrinsic; a later real definition may
    /// fill it in without a redefinition error.
    pub intrinsic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgFlags {
    pub keyword: bool,
    pub block: bool,
    pub repeated: bool,
    pub default: bool,
}

#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub name: NameRef,
    pub loc: Loc,
    pub flags: ArgFlags,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: NameRef,
    pub owner: SymbolRef,
    pub locs: Vec<Loc>,
    pub members: FxHashMap<NameRef, SymbolRef>,
    pub arguments: Vec<ArgInfo>,
    pub type_members: Vec<SymbolRef>,
    pub superclass: Option<SymbolRef>,
    /// Lazily created singleton class; once created it never disappears.
    pub singleton: Option<SymbolRef>,
    /// For singleton classes, the class they were created for.
    pub attached: Option<SymbolRef>,
    pub variance: Variance,
    /// Alias to another symbol (module_function aliases, type_template
    /// static-field aliases).
    pub alias_to: Option<SymbolRef>,
    pub visibility: Visibility,
    pub flags: SymbolFlags,
}

impl Symbol {
    pub fn new(kind: SymbolKind, name: NameRef, owner: SymbolRef) -> Symbol {
        Symbol {
            kind,
            name,
            owner,
            locs: Vec::new(),
            members: FxHashMap::default(),
            arguments: Vec::new(),
            type_members: Vec::new(),
            superclass: None,
            singleton: None,
            attached: None,
            variance: Variance::Invariant,
            alias_to: None,
            visibility: Visibility::Public,
            flags: SymbolFlags::default(),
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind == SymbolKind::ClassOrModule
    }

    pub fn is_method(&self) -> bool {
        self.kind == SymbolKind::Method
    }

    pub fn is_static_field(&self) -> bool {
        self.kind == SymbolKind::StaticField
    }

    pub fn is_type_member(&self) -> bool {
        self.kind == SymbolKind::TypeMember
    }

    /// The most recent definition location.
    pub fn loc(&self) -> Option<Loc> {
        self.locs.last().copied()
    }

    pub fn add_loc(&mut self, loc: Loc) {
        if self.locs.last() != Some(&loc) {
            self.locs.push(loc);
        }
    }
}

impl GlobalState {
    pub fn symbols_used(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol(&self, sym: SymbolRef) -> &Symbol {
        &self.symbols[sym]
    }

    pub fn symbol_mut(&mut self, sym: SymbolRef) -> &mut Symbol {
        &mut self.symbols[sym]
    }

    fn create_symbol(&mut self, symbol: Symbol) -> SymbolRef {
        debug_assert!(!self.symbols_frozen(), "symbol table is frozen");
        let name = symbol.name;
        let owner = symbol.owner;
        let sym = self.symbols.push(symbol);
        self.symbols[owner].members.insert(name, sym);
        sym
    }

    fn enter_symbol(&mut self, kind: SymbolKind, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        debug_assert!(owner.exists(), "entering symbol on non-existent owner");
        if let Some(&existing) = self.symbols[owner].members.get(&name) {
            if self.symbols[existing].kind == kind {
                return existing;
            }
            debug_assert!(
                false,
                "symbol {} redefined with a different kind; caller must mangle first",
                self.names.show(name)
            );
        }
        let mut symbol = Symbol::new(kind, name, owner);
        symbol.locs.push(loc);
        self.create_symbol(symbol)
    }

    pub fn enter_class_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(SymbolKind::ClassOrModule, loc, owner, name)
    }

    pub fn enter_method_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(SymbolKind::Method, loc, owner, name)
    }

    pub fn enter_field_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(SymbolKind::Field, loc, owner, name)
    }

    pub fn enter_static_field_symbol(&mut self, loc: Loc, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.enter_symbol(SymbolKind::StaticField, loc, owner, name)
    }

    pub fn enter_type_member(
        &mut self,
        loc: Loc,
        owner: SymbolRef,
        name: NameRef,
        variance: Variance,
    ) -> SymbolRef {
        let sym = self.enter_symbol(SymbolKind::TypeMember, loc, owner, name);
        self.symbols[sym].variance = variance;
        if !self.symbols[owner].type_members.contains(&sym) {
            self.symbols[owner].type_members.push(sym);
        }
        sym
    }

    /// Append an argument slot to a method symbol.
    pub fn enter_method_argument(&mut self, method: SymbolRef, name: NameRef, loc: Loc) -> &mut ArgInfo {
        debug_assert!(self.symbols[method].is_method());
        let args = &mut self.symbols[method].arguments;
        args.push(ArgInfo {
            name,
            loc,
            flags: ArgFlags::default(),
        });
        args.last_mut().unwrap()
    }

    /// The singleton class of `sym`, created on first access. Owned by
    /// the class itself; stable once created.
    pub fn singleton_class(&mut self, sym: SymbolRef) -> SymbolRef {
        debug_assert!(self.symbols[sym].is_class(), "only classes have singleton classes");
        if let Some(existing) = self.symbols[sym].singleton {
            return existing;
        }
        let name = self.fresh_name_unique(UniqueKind::Singleton, self.symbols[sym].name, 1);
        let loc = self.symbols[sym].loc().unwrap_or(Loc::empty(crate::span::FileId::NONE));
        let singleton = {
            let mut symbol = Symbol::new(SymbolKind::ClassOrModule, name, sym);
            symbol.locs.push(loc);
            symbol.attached = Some(sym);
            symbol.flags.module = false;
            symbol.flags.module_kind_set = true;
            self.create_symbol(symbol)
        };
        self.symbols[sym].singleton = Some(singleton);
        singleton
    }

    pub fn attached_class(&self, sym: SymbolRef) -> Option<SymbolRef> {
        self.symbols[sym].attached
    }

    /// The nearest class in the owner chain, including `sym` itself.
    pub fn enclosing_class(&self, sym: SymbolRef) -> SymbolRef {
        let mut current = sym;
        while !self.symbols[current].is_class() {
            current = self.symbols[current].owner;
            debug_assert!(current.exists(), "owner chain ended before a class");
        }
        current
    }

    pub fn dealias(&self, sym: SymbolRef) -> SymbolRef {
        let mut current = sym;
        while let Some(target) = self.symbols[current].alias_to {
            current = target;
        }
        current
    }

    pub fn find_member_no_dealias(&self, owner: SymbolRef, name: NameRef) -> SymbolRef {
        self.symbols[owner]
            .members
            .get(&name)
            .copied()
            .unwrap_or(syms::NONE)
    }

    pub fn find_member(&self, owner: SymbolRef, name: NameRef) -> SymbolRef {
        let found = self.find_member_no_dealias(owner, name);
        if found.exists() {
            self.dealias(found)
        } else {
            syms::NONE
        }
    }

    /// Rename `sym` to a fresh `MangleRename` unique so a new definition
    /// can claim its name. The symbol stays in the table (queryable by id
    /// and by its mangled name); the original name becomes free.
    pub fn mangle_rename_symbol(&mut self, sym: SymbolRef, name: NameRef) {
        debug_assert!(self.symbols[sym].name == name);
        let owner = self.symbols[sym].owner;
        self.symbols[owner].members.remove(&name);
        let mangled = self.next_name_unique(UniqueKind::MangleRename, name);
        self.symbols[sym].name = mangled;
        self.symbols[owner].members.insert(mangled, sym);
    }

    /// The static-initializer method symbol for a class body.
    pub fn static_init_for_class(&mut self, klass: SymbolRef, loc: Loc) -> SymbolRef {
        let name = self.fresh_name_unique(UniqueKind::Namer, wk::STATIC_INIT, 1);
        self.enter_method_symbol(loc, klass, name)
    }

    /// The static-initializer for top-level code, one per file, entered
    /// on the root class.
    pub fn static_init_for_file(&mut self, loc: Loc) -> SymbolRef {
        let name = self.fresh_name_unique(UniqueKind::Namer, wk::STATIC_INIT, loc.file.raw() + 1);
        self.enter_method_symbol(loc, syms::ROOT, name)
    }

    pub fn is_static_init(&self, sym: SymbolRef) -> bool {
        matches!(
            self.names.resolve(self.symbols[sym].name),
            crate::names::Name::Unique {
                kind: UniqueKind::Namer,
                original,
                ..
            } if *original == wk::STATIC_INIT
        )
    }

    /// Owner-qualified rendering, e.g. `A::B#method` without the `#`
    /// refinement: path segments joined by `::`, root elided.
    pub fn show_symbol(&self, sym: SymbolRef) -> String {
        let mut segments = vec![];
        let mut current = sym;
        while current.exists() && current != syms::ROOT {
            segments.push(self.names.show(self.symbols[current].name));
            current = self.symbols[current].owner;
        }
        segments.reverse();
        segments.join("::")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    fn loc() -> Loc {
        Loc::new(FileId::from_raw(0), 0, 0)
    }

    fn test_gs() -> GlobalState {
        GlobalState::new()
    }

    #[test]
    fn test_enter_class_is_idempotent() {
        let mut gs = test_gs();
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| {
                let name = gs.enter_name_utf8("Widget");
                let name = gs.enter_name_constant(name);
                let a = gs.enter_class_symbol(loc(), syms::ROOT, name);
                let b = gs.enter_class_symbol(loc(), syms::ROOT, name);
                assert_eq!(a, b);
                assert_eq!(gs.find_member(syms::ROOT, name), a);
            })
        });
    }

    #[test]
    fn test_singleton_class_is_lazy_and_stable() {
        let mut gs = test_gs();
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| {
                let name = gs.enter_name_utf8("Widget");
                let name = gs.enter_name_constant(name);
                let class = gs.enter_class_symbol(loc(), syms::ROOT, name);
                assert_eq!(gs.symbol(class).singleton, None);
                let singleton = gs.singleton_class(class);
                assert_eq!(gs.singleton_class(class), singleton);
                assert_eq!(gs.symbol(singleton).attached, Some(class));
                assert_eq!(gs.symbol(singleton).owner, class);
                assert!(gs.names.show(gs.symbol(singleton).name).starts_with("<Class:"));
            })
        });
    }

    #[test]
    fn test_mangle_rename_keeps_symbol_queryable() {
        let mut gs = test_gs();
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| {
                let name = gs.enter_name_utf8("Widget");
                let name = gs.enter_name_constant(name);
                let old = gs.enter_class_symbol(loc(), syms::ROOT, name);
                gs.mangle_rename_symbol(old, name);
                // Original name is free again.
                assert!(!gs.find_member(syms::ROOT, name).exists());
                // The symbol survives, locatable by id, with a fresh name.
                assert_ne!(gs.symbol(old).name, name);
                assert_eq!(gs.find_member_no_dealias(syms::ROOT, gs.symbol(old).name), old);
                // A new definition can claim the old name.
                let new = gs.enter_class_symbol(loc(), syms::ROOT, name);
                assert_ne!(new, old);
            })
        });
    }

    #[test]
    fn test_dealias_follows_chain() {
        let mut gs = test_gs();
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| {
                let m = gs.enter_name_utf8("m");
                let method = gs.enter_method_symbol(loc(), syms::OBJECT, m);
                let alias_name = gs.enter_name_utf8("m_alias");
                let alias = gs.enter_method_symbol(loc(), syms::OBJECT, alias_name);
                gs.symbol_mut(alias).alias_to = Some(method);
                assert_eq!(gs.dealias(alias), method);
                assert_eq!(gs.find_member(syms::OBJECT, alias_name), method);
                assert_eq!(gs.find_member_no_dealias(syms::OBJECT, alias_name), alias);
            })
        });
    }

    #[test]
    fn test_show_symbol_qualifies_owners() {
        let mut gs = test_gs();
        gs.with_unfrozen_names(|gs| {
            gs.with_unfrozen_symbols(|gs| {
                let outer = gs.enter_name_utf8("Outer");
                let outer = gs.enter_name_constant(outer);
                let inner = gs.enter_name_utf8("Inner");
                let inner = gs.enter_name_constant(inner);
                let a = gs.enter_class_symbol(loc(), syms::ROOT, outer);
                let b = gs.enter_class_symbol(loc(), a, inner);
                assert_eq!(gs.show_symbol(b), "Outer::Inner");
            })
        });
    }
}
