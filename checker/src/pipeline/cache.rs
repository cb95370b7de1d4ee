use crate::ast::{Expr, ParsedFile};
use crate::diagnostics::ErrorClass;
use crate::globals::GlobalState;
use crate::span::FileId;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// Content-addressed store for serialized desugared trees. Reads happen
/// on worker threads, so implementations synchronize internally; the
/// pipeline only writes from the coordinator's sequential merge.
///
/// Payloads keep every name, symbol, and file ref exactly as written, so
/// an entry is only valid against global states that share the writer's
/// interning history: states descending from the canonical state the
/// entry was written against, or states that re-interned the same inputs
/// in the same (deterministic, single-writer) order. Persisting entries
/// across processes is the job of the on-disk collaborator that also
/// persists the global state.
pub trait KeyValueStore: Sync {
    fn read(&self, key: &str) -> Option<Vec<u8>>;
    fn write(&self, key: &str, value: Vec<u8>);
}

pub type Cache<'a> = Option<&'a dyn KeyValueStore>;

#[derive(Default)]
pub struct InMemoryKvStore {
    map: Mutex<FxHashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> InMemoryKvStore {
        InMemoryKvStore::default()
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn write(&self, key: &str, value: Vec<u8>) {
        self.map.lock().unwrap().insert(key.to_string(), value);
    }
}

/// `<path>//<hex(sha256(source))>`: the same path re-keys when its
/// contents change.
pub fn file_key(gs: &GlobalState, file: FileId) -> String {
    let data = &gs.files[file];
    let digest = Sha256::digest(data.source.as_bytes());
    let mut key = String::with_capacity(data.path.len() + 2 + digest.len() * 2);
    key.push_str(&data.path);
    key.push_str("//");
    for byte in digest {
        key.push_str(&format!("{:02x}", byte));
    }
    key
}

/// On a hit the file skips parse, desugar, DSL expansion, and local-var
/// resolution entirely. The deserialized tree must refer to the requested
/// file; anything else is treated as a miss.
pub fn fetch_tree_from_cache(gs: &mut GlobalState, file: FileId, cache: Cache) -> Option<Expr> {
    let kvstore = cache?;
    let key = file_key(gs, file);
    let Some(bytes) = kvstore.read(&key) else {
        log::trace!("parse-tree cache miss: {}", gs.files[file].path);
        return None;
    };
    let tree: Expr = match serde_json::from_slice(&bytes) {
        Ok(tree) => tree,
        Err(err) => {
            log::debug!("discarding undecodable cache entry for {}: {}", key, err);
            return None;
        }
    };
    let tree_file = tree.loc().map(|loc| loc.file);
    if tree_file != Some(file) {
        debug_assert!(false, "cached tree does not belong to the requested file");
        return None;
    }
    log::trace!("parse-tree cache hit: {}", gs.files[file].path);
    gs.files[file].cached_parse_tree = true;
    Some(tree)
}

/// Write freshly computed trees back. Cache hits are skipped (already
/// stored), as are files whose parse failed: their hash state is not
/// trustworthy.
pub fn cache_trees(gs: &GlobalState, cache: Cache, trees: &[ParsedFile]) {
    let Some(kvstore) = cache else { return };
    for parsed in trees {
        if gs.files[parsed.file].cached_parse_tree {
            continue;
        }
        let parse_failed = gs.errors.iter().any(|diag| {
            diag.class == ErrorClass::ParserError
                && diag.loc.map(|loc| loc.file) == Some(parsed.file)
        });
        if parse_failed {
            continue;
        }
        match serde_json::to_vec(&parsed.tree) {
            Ok(bytes) => kvstore.write(&file_key(gs, parsed.file), bytes),
            Err(err) => log::debug!("failed to serialize tree for cache: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::mk;
    use crate::files::FileKind;
    use crate::span::Loc;

    fn gs_with_file(path: &str, source: &str) -> (GlobalState, FileId) {
        let mut gs = GlobalState::new();
        let file = gs.with_unfrozen_files(|gs| {
            let file = gs.reserve_file(path);
            gs.enter_file_source(file, source.into(), FileKind::Normal);
            file
        });
        (gs, file)
    }

    #[test]
    fn test_file_key_tracks_content() {
        let (gs_a, file_a) = gs_with_file("./a.rb", "class A; end");
        let (gs_b, file_b) = gs_with_file("./a.rb", "class B; end");
        let key_a = file_key(&gs_a, file_a);
        let key_b = file_key(&gs_b, file_b);
        assert!(key_a.starts_with("./a.rb//"));
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_round_trip_marks_cached() {
        let (mut gs, file) = gs_with_file("./a.rb", "class A; end");
        let store = InMemoryKvStore::new();
        let tree = mk::keep_for_ide(Loc::new(file, 0, 5), mk::empty_tree());
        let parsed = ParsedFile::new(tree.clone(), file, &gs);
        cache_trees(&gs, Some(&store), &[parsed]);
        assert_eq!(store.len(), 1);

        let fetched = fetch_tree_from_cache(&mut gs, file, Some(&store)).expect("hit");
        assert_eq!(fetched, tree);
        assert!(gs.files[file].cached_parse_tree);
    }

    #[test]
    fn test_miss_on_changed_source() {
        let (gs, file) = gs_with_file("./a.rb", "class A; end");
        let store = InMemoryKvStore::new();
        let tree = mk::keep_for_ide(Loc::new(file, 0, 5), mk::empty_tree());
        cache_trees(&gs, Some(&store), &[ParsedFile::new(tree, file, &gs)]);

        let (mut gs2, file2) = gs_with_file("./a.rb", "class Changed; end");
        assert!(fetch_tree_from_cache(&mut gs2, file2, Some(&store)).is_none());
        assert!(!gs2.files[file2].cached_parse_tree);
    }

    #[test]
    fn test_no_store_is_always_a_miss() {
        let (mut gs, file) = gs_with_file("./a.rb", "class A; end");
        assert!(fetch_tree_from_cache(&mut gs, file, None).is_none());
    }
}
