use ecow::EcoString;
use index_vec::{define_index_type, IndexVec};
use rustc_hash::FxHashMap;

define_index_type! {
    pub struct NameRef = u32;
}

impl NameRef {
    pub fn exists(&self) -> bool {
        *self != wk::NONE
    }
}

impl serde::Serialize for NameRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for NameRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(NameRef::from_raw)
    }
}

/// Derivation context of a `UNIQUE` name. `(kind, original, num)` is the
/// identity of the derived name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UniqueKind {
    Parser,
    Desugar,
    Namer,
    MangleRename,
    Singleton,
    Overload,
    TypeVar,
    PositionalArg,
    MangledKeywordArg,
    ResolverMissingClass,
}

impl UniqueKind {
    fn letter(self) -> char {
        match self {
            UniqueKind::Parser => 'P',
            UniqueKind::Desugar => 'D',
            UniqueKind::Namer => 'N',
            UniqueKind::MangleRename => 'M',
            UniqueKind::Singleton => 'S',
            UniqueKind::Overload => 'O',
            UniqueKind::TypeVar => 'T',
            UniqueKind::PositionalArg => 'A',
            UniqueKind::MangledKeywordArg => 'K',
            UniqueKind::ResolverMissingClass => 'R',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Name {
    Utf8(EcoString),
    Unique {
        kind: UniqueKind,
        num: u32,
        original: NameRef,
    },
    Constant {
        original: NameRef,
    },
}

/// Hashable identity of a name, mirroring the three `enter*` signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NameKey {
    Utf8(EcoString),
    Unique(UniqueKind, NameRef, u32),
    Constant(NameRef),
}

/// Insertion-ordered interning table. Ids are assigned in insertion
/// order, and every `UNIQUE`/`CONSTANT` name refers to an original with a
/// strictly smaller id, so id order is a topological order: cloning the
/// whole vector is a valid deep copy into a fresh state.
#[derive(Debug, Clone)]
pub struct NameTable {
    names: IndexVec<NameRef, Name>,
    table: FxHashMap<NameKey, NameRef>,
}

impl NameTable {
    pub fn new() -> NameTable {
        let mut this = NameTable {
            names: IndexVec::new(),
            table: FxHashMap::default(),
        };
        for text in wk::WELL_KNOWN {
            this.enter_utf8(text);
        }
        debug_assert_eq!(this.names.len(), wk::WELL_KNOWN.len());
        this
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn resolve(&self, name: NameRef) -> &Name {
        &self.names[name]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NameRef, &Name)> {
        self.names.iter_enumerated()
    }

    /// Intern a source spelling. Re-entering the same bytes returns the
    /// same id and allocates nothing.
    pub fn enter_utf8(&mut self, text: &str) -> NameRef {
        if let Some(id) = self.table.get(&NameKey::Utf8(text.into())) {
            return *id;
        }
        let text: EcoString = text.into();
        let id = self.names.push(Name::Utf8(text.clone()));
        self.table.insert(NameKey::Utf8(text), id);
        id
    }

    /// Wrap an existing name as a constant identifier. The original must
    /// be `UTF8`, or a `UNIQUE` minted by the resolver for a missing
    /// class.
    pub fn enter_constant(&mut self, original: NameRef) -> NameRef {
        debug_assert!(
            matches!(
                self.resolve(original),
                Name::Utf8(_)
                    | Name::Unique {
                        kind: UniqueKind::ResolverMissingClass,
                        ..
                    }
            ),
            "constant name must wrap a UTF8 or ResolverMissingClass name"
        );
        if let Some(id) = self.table.get(&NameKey::Constant(original)) {
            return *id;
        }
        let id = self.names.push(Name::Constant { original });
        self.table.insert(NameKey::Constant(original), id);
        id
    }

    /// Retrieve or create the derivation `(kind, original, num)`. Used
    /// both to allocate fresh numbering (via `next_unique`) and to
    /// reproduce a specific numbering when replaying cached trees.
    pub fn fresh_unique(&mut self, kind: UniqueKind, original: NameRef, num: u32) -> NameRef {
        debug_assert!(num > 0, "unique num must be positive");
        if let Some(id) = self.table.get(&NameKey::Unique(kind, original, num)) {
            return *id;
        }
        let id = self.names.push(Name::Unique {
            kind,
            num,
            original,
        });
        self.table.insert(NameKey::Unique(kind, original, num), id);
        id
    }

    /// Allocate the first unused numbering of `(kind, original)`.
    pub fn next_unique(&mut self, kind: UniqueKind, original: NameRef) -> NameRef {
        let mut num = 1;
        while self
            .table
            .contains_key(&NameKey::Unique(kind, original, num))
        {
            num += 1;
        }
        self.fresh_unique(kind, original, num)
    }

    /// The user-facing rendering of a name.
    pub fn show(&self, name: NameRef) -> String {
        match self.resolve(name) {
            Name::Utf8(text) => text.to_string(),
            Name::Unique {
                kind: UniqueKind::Singleton,
                original,
                ..
            } => format!("<Class:{}>", self.show(*original)),
            Name::Unique {
                kind: UniqueKind::Overload,
                original,
                num,
            } => format!("{} (overload.{})", self.show(*original), num),
            Name::Unique {
                kind: UniqueKind::MangleRename,
                original,
                num,
            } => format!("{}${}", self.show(*original), num),
            Name::Unique { original, .. } => self.show(*original),
            Name::Constant { original } => self.show(*original),
        }
    }

    /// Structural rendering used in debug dumps and tests.
    pub fn show_raw(&self, name: NameRef) -> String {
        match self.resolve(name) {
            Name::Utf8(text) => format!("<U {}>", text),
            Name::Unique {
                kind,
                original,
                num,
            } => format!("<{} {} ${}>", kind.letter(), self.show_raw(*original), num),
            Name::Constant { original } => format!("<C {}>", self.show_raw(*original)),
        }
    }

    /// The underlying source spelling, through any derivation.
    pub fn short_name(&self, name: NameRef) -> &str {
        match self.resolve(name) {
            Name::Utf8(text) => text,
            Name::Unique { original, .. } => self.short_name(*original),
            Name::Constant { original } => self.short_name(*original),
        }
    }
}

impl Default for NameTable {
    fn default() -> NameTable {
        NameTable::new()
    }
}

/// Well-known names, interned at global-state initialization. This prefix
/// of ids is identical across all global states, so these refs can be
/// shared freely between siblings.
pub mod wk {
    use super::NameRef;

    pub(super) const WELL_KNOWN: &[&str] = &[
        "<none>",
        "self",
        "<root>",
        "Object",
        "BasicObject",
        "<todo>",
        "include",
        "extend",
        "private",
        "protected",
        "public",
        "private_class_method",
        "module_function",
        "final!",
        "abstract!",
        "interface!",
        "type_member",
        "type_template",
        "type_alias",
        "covariant",
        "contravariant",
        "invariant",
        "fixed",
        "lower",
        "upper",
        "<blk>",
        "arg",
        "<static-init>",
        "<singleton>",
        "attr_reader",
        "attr_writer",
        "attr_accessor",
        "<keep-for-ide>",
        "T",
        "untyped",
    ];

    pub const NONE: NameRef = NameRef { _raw: 0 };
    pub const SELF_: NameRef = NameRef { _raw: 1 };
    pub const ROOT: NameRef = NameRef { _raw: 2 };
    pub const OBJECT: NameRef = NameRef { _raw: 3 };
    pub const BASIC_OBJECT: NameRef = NameRef { _raw: 4 };
    pub const TODO: NameRef = NameRef { _raw: 5 };
    pub const INCLUDE: NameRef = NameRef { _raw: 6 };
    pub const EXTEND: NameRef = NameRef { _raw: 7 };
    pub const PRIVATE: NameRef = NameRef { _raw: 8 };
    pub const PROTECTED: NameRef = NameRef { _raw: 9 };
    pub const PUBLIC: NameRef = NameRef { _raw: 10 };
    pub const PRIVATE_CLASS_METHOD: NameRef = NameRef { _raw: 11 };
    pub const MODULE_FUNCTION: NameRef = NameRef { _raw: 12 };
    pub const DECLARE_FINAL: NameRef = NameRef { _raw: 13 };
    pub const DECLARE_ABSTRACT: NameRef = NameRef { _raw: 14 };
    pub const DECLARE_INTERFACE: NameRef = NameRef { _raw: 15 };
    pub const TYPE_MEMBER: NameRef = NameRef { _raw: 16 };
    pub const TYPE_TEMPLATE: NameRef = NameRef { _raw: 17 };
    pub const TYPE_ALIAS: NameRef = NameRef { _raw: 18 };
    pub const COVARIANT: NameRef = NameRef { _raw: 19 };
    pub const CONTRAVARIANT: NameRef = NameRef { _raw: 20 };
    pub const INVARIANT: NameRef = NameRef { _raw: 21 };
    pub const FIXED: NameRef = NameRef { _raw: 22 };
    pub const LOWER: NameRef = NameRef { _raw: 23 };
    pub const UPPER: NameRef = NameRef { _raw: 24 };
    pub const BLK_ARG: NameRef = NameRef { _raw: 25 };
    pub const ARG: NameRef = NameRef { _raw: 26 };
    pub const STATIC_INIT: NameRef = NameRef { _raw: 27 };
    pub const SINGLETON: NameRef = NameRef { _raw: 28 };
    pub const ATTR_READER: NameRef = NameRef { _raw: 29 };
    pub const ATTR_WRITER: NameRef = NameRef { _raw: 30 };
    pub const ATTR_ACCESSOR: NameRef = NameRef { _raw: 31 };
    pub const KEEP_FOR_IDE: NameRef = NameRef { _raw: 32 };
    pub const T: NameRef = NameRef { _raw: 33 };
    pub const UNTYPED: NameRef = NameRef { _raw: 34 };

    pub const LAST_WELL_KNOWN_NAME: u32 = 34;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_prefix() {
        let table = NameTable::new();
        assert_eq!(table.len() as u32, wk::LAST_WELL_KNOWN_NAME + 1);
        assert_eq!(table.show(wk::SELF_), "self");
        assert_eq!(table.show(wk::ROOT), "<root>");
        assert_eq!(table.show(wk::ATTR_ACCESSOR), "attr_accessor");
        assert_eq!(table.show(wk::UNTYPED), "untyped");
    }

    #[test]
    fn test_enter_utf8_idempotent() {
        let mut table = NameTable::new();
        let a = table.enter_utf8("foo");
        let len = table.len();
        let b = table.enter_utf8("foo");
        assert_eq!(a, b);
        assert_eq!(table.len(), len, "second enter must allocate nothing");
        assert_ne!(a, table.enter_utf8("bar"));
    }

    #[test]
    fn test_fresh_unique_idempotent() {
        let mut table = NameTable::new();
        let base = table.enter_utf8("foo");
        let u1 = table.fresh_unique(UniqueKind::MangleRename, base, 1);
        let len = table.len();
        assert_eq!(table.fresh_unique(UniqueKind::MangleRename, base, 1), u1);
        assert_eq!(table.len(), len);
        assert_ne!(table.fresh_unique(UniqueKind::MangleRename, base, 2), u1);
        assert_ne!(table.fresh_unique(UniqueKind::Singleton, base, 1), u1);
    }

    #[test]
    fn test_next_unique_numbers_from_one() {
        let mut table = NameTable::new();
        let base = table.enter_utf8("foo");
        let first = table.next_unique(UniqueKind::MangleRename, base);
        let second = table.next_unique(UniqueKind::MangleRename, base);
        assert_ne!(first, second);
        assert_eq!(table.show(first), "foo$1");
        assert_eq!(table.show(second), "foo$2");
    }

    #[test]
    fn test_derived_ids_are_larger_than_originals() {
        let mut table = NameTable::new();
        let base = table.enter_utf8("Widget");
        let cnst = table.enter_constant(base);
        let unique = table.fresh_unique(UniqueKind::Singleton, base, 1);
        assert!(base.raw() < cnst.raw());
        assert!(base.raw() < unique.raw());
        match *table.resolve(cnst) {
            Name::Constant { original } => assert_eq!(original, base),
            _ => panic!("expected constant name"),
        }
    }

    #[test]
    fn test_show_formats() {
        let mut table = NameTable::new();
        let base = table.enter_utf8("Widget");
        let singleton = table.fresh_unique(UniqueKind::Singleton, base, 1);
        let cnst = table.enter_constant(base);
        assert_eq!(table.show(singleton), "<Class:Widget>");
        assert_eq!(table.show(cnst), "Widget");
        assert_eq!(table.show_raw(cnst), "<C <U Widget>>");
        assert_eq!(table.short_name(singleton), "Widget");
    }

    #[test]
    fn test_deep_copy_preserves_ids() {
        let mut table = NameTable::new();
        let base = table.enter_utf8("Widget");
        let unique = table.fresh_unique(UniqueKind::Namer, base, 3);
        let copy = table.clone();
        assert_eq!(copy.show(unique), table.show(unique));
        assert_eq!(copy.len(), table.len());
    }
}
