use index_vec::define_index_type;
use std::fmt;

define_index_type! {
    pub struct FileId = u32;
}

impl FileId {
    pub const NONE: FileId = FileId { _raw: u32::MAX };

    pub fn exists(&self) -> bool {
        *self != FileId::NONE
    }
}

impl serde::Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for FileId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(FileId::from_raw)
    }
}

/// A byte range within a single file. Offsets are byte offsets into the
/// file's source; line/column pairs are derived lazily when rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Loc {
    pub file: FileId,
    pub begin: u32,
    pub end: u32,
}

impl Loc {
    pub fn new(file: FileId, begin: u32, end: u32) -> Loc {
        Loc { file, begin, end }
    }

    pub fn empty(file: FileId) -> Loc {
        Loc {
            file,
            begin: 0,
            end: 0,
        }
    }

    pub fn to(&self, other: Loc) -> Loc {
        debug_assert!(self.file == other.file, "files must match");
        Loc {
            file: self.file,
            begin: self.begin,
            end: other.end,
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}
