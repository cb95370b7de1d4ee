use crate::span::FileId;
use ecow::EcoString;
use index_vec::IndexVec;
use rustc_hash::FxHashMap;
use std::fmt;
use std::str::FromStr;

/// How strictly a file is checked. The ordering matters: override
/// clamping works on the `False..=Strong` range, everything outside it is
/// exempt.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StrictLevel {
    Internal,
    Ignore,
    False,
    True,
    Strict,
    Strong,
    Autogenerated,
}

impl StrictLevel {
    /// Levels outside this range are never clamped by
    /// `force_min_strict`/`force_max_strict`.
    pub fn clampable(self) -> bool {
        self > StrictLevel::Ignore && self <= StrictLevel::Strong
    }
}

impl FromStr for StrictLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<StrictLevel, ()> {
        match s {
            "ignore" => Ok(StrictLevel::Ignore),
            "false" => Ok(StrictLevel::False),
            "true" => Ok(StrictLevel::True),
            "strict" => Ok(StrictLevel::Strict),
            "strong" => Ok(StrictLevel::Strong),
            "autogenerated" => Ok(StrictLevel::Autogenerated),
            _ => Err(()),
        }
    }
}

impl fmt::Display for StrictLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrictLevel::Internal => "internal",
            StrictLevel::Ignore => "ignore",
            StrictLevel::False => "false",
            StrictLevel::True => "true",
            StrictLevel::Strict => "strict",
            StrictLevel::Strong => "strong",
            StrictLevel::Autogenerated => "autogenerated",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Normal,
    Payload,
    /// Declaration-only interface file (`.rbi`): declarations in it never
    /// count as behavior.
    Interface,
}

#[derive(Debug, Clone)]
pub struct File {
    pub path: EcoString,
    pub source: EcoString,
    pub kind: FileKind,
    /// False until the pipeline has populated the reserved slot.
    pub read: bool,
    /// The strictness sigil literally written at the top of the file.
    pub original_sigil: Option<StrictLevel>,
    /// Derived level: sigil + overrides + clamping (see pipeline).
    pub strict: StrictLevel,
    pub cached_parse_tree: bool,
    line_breaks: Vec<u32>,
}

impl File {
    fn placeholder(path: EcoString) -> File {
        let kind = if path.ends_with(".rbi") {
            FileKind::Interface
        } else {
            FileKind::Normal
        };
        File {
            path,
            source: EcoString::new(),
            kind,
            read: false,
            original_sigil: None,
            strict: StrictLevel::False,
            cached_parse_tree: false,
            line_breaks: Vec::new(),
        }
    }

    pub fn is_rbi(&self) -> bool {
        self.kind == FileKind::Interface
    }

    pub fn line_count(&self) -> usize {
        self.line_breaks.len() + 1
    }

    /// 1-based line, 0-based column for a byte offset.
    pub fn pos(&self, offset: u32) -> (usize, usize) {
        let line = self.line_breaks.partition_point(|&b| b < offset);
        let start = if line == 0 {
            0
        } else {
            self.line_breaks[line - 1] + 1
        };
        (line + 1, (offset - start) as usize)
    }

    pub fn line(&self, number: usize) -> &str {
        debug_assert!(number >= 1);
        let begin = if number == 1 {
            0
        } else {
            self.line_breaks[number - 2] as usize + 1
        };
        let end = self
            .line_breaks
            .get(number - 1)
            .map(|&b| b as usize)
            .unwrap_or(self.source.len());
        &self.source[begin..end]
    }
}

/// Extract the `# typed: <level>` sigil from the leading comment block of
/// a source file, if any.
pub fn sigil_of_source(source: &str) -> Option<StrictLevel> {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            let comment = comment.trim();
            if let Some(rest) = comment.strip_prefix("typed:") {
                return rest.trim().parse().ok();
            }
            continue;
        }
        break;
    }
    None
}

#[derive(Debug, Default, Clone)]
pub struct FileTable {
    files: IndexVec<FileId, File>,
    by_path: FxHashMap<EcoString, FileId>,
}

impl FileTable {
    pub fn find_by_path(&self, path: &str) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    /// Reserve a slot for a path without reading it. Reserving the same
    /// path twice yields the same id.
    pub fn reserve(&mut self, path: &str) -> FileId {
        if let Some(id) = self.by_path.get(path) {
            return *id;
        }
        let path: EcoString = path.into();
        let id = self.files.push(File::placeholder(path.clone()));
        self.by_path.insert(path, id);
        id
    }

    /// Fill a previously reserved slot with its source text.
    pub fn fill(&mut self, id: FileId, source: EcoString, kind: FileKind) {
        let file = &mut self.files[id];
        file.line_breaks = source
            .bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i as u32)
            .collect();
        file.original_sigil = sigil_of_source(&source);
        file.source = source;
        if file.kind == FileKind::Normal {
            file.kind = kind;
        }
        file.read = true;
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.indices()
    }
}

impl std::ops::Index<FileId> for FileTable {
    type Output = File;

    fn index(&self, id: FileId) -> &File {
        &self.files[id]
    }
}

impl std::ops::IndexMut<FileId> for FileTable {
    fn index_mut(&mut self, id: FileId) -> &mut File {
        &mut self.files[id]
    }
}

/// Source-of-bytes collaborator. Missing files yield `None`; the pipeline
/// substitutes an empty source and reports `FileNotFound`.
pub trait FileSystem: Sync {
    fn read_file(&self, path: &str) -> Option<Vec<u8>>;
}

pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        std::fs::read(path).ok()
    }
}

/// In-memory file system used by tests and tools that feed sources
/// directly.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: FxHashMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> MemoryFileSystem {
        MemoryFileSystem::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), source.into());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigil_parsing() {
        assert_eq!(
            sigil_of_source("# typed: strict\nclass A; end\n"),
            Some(StrictLevel::Strict)
        );
        assert_eq!(
            sigil_of_source("# frozen_string_literal: true\n# typed: true\n"),
            Some(StrictLevel::True)
        );
        assert_eq!(sigil_of_source("class A; end\n# typed: true\n"), None);
        assert_eq!(sigil_of_source("# typed: nonsense\n"), None);
        assert_eq!(
            sigil_of_source("\n\n#typed: ignore\n"),
            Some(StrictLevel::Ignore)
        );
    }

    #[test]
    fn test_reserve_is_idempotent() {
        let mut table = FileTable::default();
        let a = table.reserve("./a.rb");
        let b = table.reserve("./b.rb");
        assert_ne!(a, b);
        assert_eq!(table.reserve("./a.rb"), a);
        assert!(!table[a].read);
    }

    #[test]
    fn test_fill_records_lines_and_sigil() {
        let mut table = FileTable::default();
        let id = table.reserve("./a.rb");
        table.fill(id, "# typed: true\nclass A\nend\n".into(), FileKind::Normal);
        let file = &table[id];
        assert!(file.read);
        assert_eq!(file.original_sigil, Some(StrictLevel::True));
        assert_eq!(file.line_count(), 4);
        assert_eq!(file.pos(14), (2, 0));
        assert_eq!(file.line(2), "class A");
    }

    #[test]
    fn test_rbi_detection() {
        let mut table = FileTable::default();
        let id = table.reserve("./interfaces/foo.rbi");
        assert!(table[id].is_rbi());
    }

    #[test]
    fn test_clampable_range() {
        assert!(!StrictLevel::Ignore.clampable());
        assert!(!StrictLevel::Internal.clampable());
        assert!(StrictLevel::False.clampable());
        assert!(StrictLevel::Strong.clampable());
        assert!(!StrictLevel::Autogenerated.clampable());
    }
}
