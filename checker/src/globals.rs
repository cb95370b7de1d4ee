use crate::diagnostics::{Diagnostic, ErrorQueue};
use crate::error::{CompileResult, ReportedError};
use crate::files::{FileKind, FileTable};
use crate::names::{NameRef, NameTable, UniqueKind};
use crate::span::FileId;
use crate::symbols::{syms, Symbol, SymbolKind, SymbolRef};
use ecow::EcoString;
use index_vec::IndexVec;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_GS_ID: AtomicU32 = AtomicU32::new(1);

fn fresh_gs_id() -> u32 {
    NEXT_GS_ID.fetch_add(1, Ordering::Relaxed)
}

/// One fork recorded in a state's deep-clone history: the parent state's
/// id and how many names the parent had at the fork. A `NameRef` below
/// that bound means the same thing in both states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepCloneInfo {
    pub gs_id: u32,
    pub last_name_known: u32,
}

/// The shared mutable state of one pipeline: name table, symbol table,
/// file table, error queue, freeze bits, and the deep-clone history used
/// to validate cross-state name sharing.
pub struct GlobalState {
    pub(crate) gs_id: u32,
    pub names: NameTable,
    pub(crate) symbols: IndexVec<SymbolRef, Symbol>,
    pub files: FileTable,
    pub errors: ErrorQueue,
    names_frozen: bool,
    symbols_frozen: bool,
    files_frozen: bool,
    deep_clone_history: Vec<DeepCloneInfo>,
}

impl GlobalState {
    pub fn new() -> GlobalState {
        let mut gs = GlobalState {
            gs_id: fresh_gs_id(),
            names: NameTable::new(),
            symbols: IndexVec::new(),
            files: FileTable::default(),
            errors: ErrorQueue::default(),
            names_frozen: false,
            symbols_frozen: false,
            files_frozen: false,
            deep_clone_history: Vec::new(),
        };
        gs.init_well_known_symbols();
        gs.names_frozen = true;
        gs.symbols_frozen = true;
        gs.files_frozen = true;
        gs
    }

    fn init_well_known_symbols(&mut self) {
        use crate::names::wk;
        debug_assert!(self.symbols.is_empty());
        // Order must agree with the constants in `symbols::syms`.
        self.symbols
            .push(Symbol::new(SymbolKind::ClassOrModule, wk::NONE, syms::NONE));
        self.symbols
            .push(Symbol::new(SymbolKind::ClassOrModule, wk::ROOT, syms::ROOT));
        self.symbols
            .push(Symbol::new(SymbolKind::ClassOrModule, wk::TODO, syms::ROOT));
        self.symbols
            .push(Symbol::new(SymbolKind::ClassOrModule, wk::OBJECT, syms::ROOT));
        self.symbols.push(Symbol::new(
            SymbolKind::ClassOrModule,
            wk::BASIC_OBJECT,
            syms::ROOT,
        ));
        self.symbols[syms::OBJECT].superclass = Some(syms::BASIC_OBJECT);
        self.symbols[syms::ROOT].superclass = Some(syms::OBJECT);
        let root_members = [
            (wk::OBJECT, syms::OBJECT),
            (wk::BASIC_OBJECT, syms::BASIC_OBJECT),
        ];
        for (name, sym) in root_members {
            self.symbols[syms::ROOT].members.insert(name, sym);
        }
    }

    pub fn error(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub fn ok(&self) -> CompileResult<()> {
        if self.errors.had_errors() {
            Err(ReportedError)
        } else {
            Ok(())
        }
    }

    // --- freeze discipline -------------------------------------------------

    /// Scoped write permission for the name table. Nested scopes are
    /// idempotent; the previous freeze state is restored on exit.
    pub fn with_unfrozen_names<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        let prev = std::mem::replace(&mut self.names_frozen, false);
        let result = f(self);
        self.names_frozen = prev;
        result
    }

    pub fn with_unfrozen_symbols<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        let prev = std::mem::replace(&mut self.symbols_frozen, false);
        let result = f(self);
        self.symbols_frozen = prev;
        result
    }

    pub fn with_unfrozen_files<R>(&mut self, f: impl FnOnce(&mut GlobalState) -> R) -> R {
        let prev = std::mem::replace(&mut self.files_frozen, false);
        let result = f(self);
        self.files_frozen = prev;
        result
    }

    /// Panic isolation can unwind out of an unfreeze scope before its
    /// restore runs; callers that catch the panic re-freeze here.
    pub(crate) fn refreeze(&mut self) {
        self.names_frozen = true;
        self.symbols_frozen = true;
        self.files_frozen = true;
    }

    pub(crate) fn symbols_frozen(&self) -> bool {
        self.symbols_frozen
    }

    // --- name table --------------------------------------------------------

    pub fn enter_name_utf8(&mut self, text: &str) -> NameRef {
        debug_assert!(!self.names_frozen, "name table is frozen");
        self.names.enter_utf8(text)
    }

    pub fn enter_name_constant(&mut self, original: NameRef) -> NameRef {
        debug_assert!(!self.names_frozen, "name table is frozen");
        self.names.enter_constant(original)
    }

    pub fn fresh_name_unique(&mut self, kind: UniqueKind, original: NameRef, num: u32) -> NameRef {
        debug_assert!(!self.names_frozen, "name table is frozen");
        self.names.fresh_unique(kind, original, num)
    }

    pub fn next_name_unique(&mut self, kind: UniqueKind, original: NameRef) -> NameRef {
        debug_assert!(!self.names_frozen, "name table is frozen");
        self.names.next_unique(kind, original)
    }

    // --- file table --------------------------------------------------------

    pub fn reserve_file(&mut self, path: &str) -> FileId {
        debug_assert!(!self.files_frozen, "file table is frozen");
        self.files.reserve(path)
    }

    pub fn enter_file_source(&mut self, id: FileId, source: EcoString, kind: FileKind) {
        debug_assert!(!self.files_frozen, "file table is frozen");
        self.files.fill(id, source, kind);
    }

    // --- deep clones -------------------------------------------------------

    /// Fork a private copy of this state for a worker. The clone shares
    /// no mutable structure with its parent, starts with an empty error
    /// queue, and records the fork in its deep-clone history.
    pub fn deep_clone(&self) -> GlobalState {
        let mut history = self.deep_clone_history.clone();
        history.push(DeepCloneInfo {
            gs_id: self.gs_id,
            last_name_known: self.names.len() as u32,
        });
        GlobalState {
            gs_id: fresh_gs_id(),
            names: self.names.clone(),
            symbols: self.symbols.clone(),
            files: self.files.clone(),
            errors: ErrorQueue::default(),
            names_frozen: self.names_frozen,
            symbols_frozen: self.symbols_frozen,
            files_frozen: self.files_frozen,
            deep_clone_history: history,
        }
    }

    fn lineage(&self) -> impl Iterator<Item = DeepCloneInfo> + '_ {
        self.deep_clone_history
            .iter()
            .copied()
            .chain(std::iter::once(DeepCloneInfo {
                gs_id: self.gs_id,
                last_name_known: self.names.len() as u32,
            }))
    }

    /// How many leading name ids this state provably shares with `other`:
    /// the largest fork bound of a common ancestor in the two deep-clone
    /// histories. Ids below the bound substitute to themselves.
    pub(crate) fn names_shared_with(&self, other: &GlobalState) -> u32 {
        let mut shared = 0;
        for ours in self.lineage() {
            for theirs in other.lineage() {
                if ours.gs_id == theirs.gs_id {
                    shared = shared.max(ours.last_name_known.min(theirs.last_name_known));
                }
            }
        }
        shared
    }
}

impl Default for GlobalState {
    fn default() -> GlobalState {
        GlobalState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::wk;

    #[test]
    fn test_well_known_symbols_exist() {
        let gs = GlobalState::new();
        assert_eq!(gs.symbols[syms::ROOT].name, wk::ROOT);
        assert_eq!(gs.symbols[syms::OBJECT].owner, syms::ROOT);
        assert_eq!(gs.symbols[syms::OBJECT].superclass, Some(syms::BASIC_OBJECT));
        assert!(gs.symbols[syms::ROOT].is_class());
    }

    #[test]
    fn test_unfreeze_scope_restores() {
        let mut gs = GlobalState::new();
        let name = gs.with_unfrozen_names(|gs| {
            let outer = gs.enter_name_utf8("outer");
            // Nested scopes are idempotent.
            gs.with_unfrozen_names(|gs| gs.enter_name_utf8("inner"));
            gs.enter_name_utf8("after_inner");
            outer
        });
        assert!(name.exists());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "name table is frozen")]
    fn test_frozen_name_table_rejects_mutation() {
        let mut gs = GlobalState::new();
        gs.enter_name_utf8("nope");
    }

    #[test]
    fn test_deep_clone_history_records_fork() {
        let mut base = GlobalState::new();
        let extra = base.with_unfrozen_names(|gs| gs.enter_name_utf8("extra"));
        let clone = base.deep_clone();
        assert_ne!(clone.gs_id, base.gs_id);
        assert_eq!(clone.names.len(), base.names.len());
        assert!(clone.errors.is_empty());
        // Names entered before the fork are shared.
        assert!(extra.raw() < base.names_shared_with(&clone));
        assert_eq!(
            base.names_shared_with(&clone),
            base.names.len() as u32
        );
    }

    #[test]
    fn test_siblings_share_through_common_ancestor() {
        let base = GlobalState::new();
        let mut left = base.deep_clone();
        let right = base.deep_clone();
        let shared = left.names_shared_with(&right);
        assert_eq!(shared, base.names.len() as u32);
        let after = left.with_unfrozen_names(|gs| gs.enter_name_utf8("left_only"));
        assert!(after.raw() >= left.names_shared_with(&right));
    }

    #[test]
    fn test_unrelated_states_share_nothing_beyond_nothing() {
        let a = GlobalState::new();
        let b = GlobalState::new();
        assert_eq!(a.names_shared_with(&b), 0);
    }
}
