use crate::files::FileTable;
use crate::span::Loc;
use colored::{ColoredString, Colorize};

/// Every diagnostic this pipeline can emit. None of these abort the
/// pipeline; they are queued on the global state and drained by the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    InternalError,
    FileNotFound,
    ParserError,
    UselessStrictnessOverride,
    IncludeMultipleParam,
    AncestorNotConstant,
    IncludePassedBlock,
    DynamicDslInvocation,
    MethodNotFound,
    RedefinitionOfMethod,
    InvalidTypeDefinition,
    ModuleKindRedefinition,
    InterfaceClass,
    DynamicConstant,
    InvalidClassOwner,
    RootTypeMember,
    DynamicConstantAssignment,
    MultipleBehaviorDefs,
    StubConstant,
}

impl ErrorClass {
    pub fn code(self) -> u32 {
        match self {
            ErrorClass::InternalError => 1001,
            ErrorClass::FileNotFound => 1004,
            ErrorClass::ParserError => 2001,
            ErrorClass::UselessStrictnessOverride => 2002,
            ErrorClass::IncludeMultipleParam => 4001,
            ErrorClass::AncestorNotConstant => 4002,
            ErrorClass::IncludePassedBlock => 4003,
            ErrorClass::DynamicDslInvocation => 4007,
            ErrorClass::MethodNotFound => 4008,
            ErrorClass::RedefinitionOfMethod => 4010,
            ErrorClass::InvalidTypeDefinition => 4011,
            ErrorClass::ModuleKindRedefinition => 4012,
            ErrorClass::InterfaceClass => 4013,
            ErrorClass::DynamicConstant => 4014,
            ErrorClass::InvalidClassOwner => 4015,
            ErrorClass::RootTypeMember => 4016,
            ErrorClass::DynamicConstantAssignment => 4017,
            ErrorClass::MultipleBehaviorDefs => 4019,
            ErrorClass::StubConstant => 5002,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Note {
    pub message: String,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub class: ErrorClass,
    pub loc: Option<Loc>,
    pub message: String,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(class: ErrorClass, loc: impl Into<Option<Loc>>, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            class,
            loc: loc.into(),
            message: message.into(),
            notes: vec![],
        }
    }

    pub fn with_note(mut self, message: impl Into<String>, loc: impl Into<Option<Loc>>) -> Diagnostic {
        self.notes.push(Note {
            message: message.into(),
            loc: loc.into(),
        });
        self
    }
}

/// Ordered queue of structured diagnostics owned by a global state.
/// Worker clones start empty; the coordinator appends their queues onto
/// the canonical one during the merge.
#[derive(Debug, Default, Clone)]
pub struct ErrorQueue {
    errors: Vec<Diagnostic>,
}

impl ErrorQueue {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub fn had_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter()
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.errors)
    }

    pub fn append(&mut self, mut other: ErrorQueue) {
        self.errors.append(&mut other.errors);
    }
}

fn severity(text: &str) -> ColoredString {
    text.red().bold()
}

/// Render one diagnostic in the `error: message -> path:line:col` format
/// with a caret line under the offending span.
pub fn render(files: &FileTable, diag: &Diagnostic) -> String {
    let mut out = String::new();
    render_one(files, &mut out, &diag.message, diag.loc, false);
    for note in &diag.notes {
        render_one(files, &mut out, &note.message, note.loc, true);
    }
    out
}

fn render_one(files: &FileTable, out: &mut String, message: &str, loc: Option<Loc>, is_note: bool) {
    let label = if is_note {
        "note".cyan().bold()
    } else {
        severity("error")
    };
    match loc {
        Some(loc) if loc.file.exists() => {
            let file = &files[loc.file];
            let (line, col) = file.pos(loc.begin);
            out.push_str(&format!(
                "\n{}: {}\n -> {}:{}:{}\n",
                label,
                message.bold(),
                file.path,
                line,
                col,
            ));
            let text = file.line(line);
            out.push_str(&format!("\t{}\n", text));
            let clamped_start = col.min(text.len());
            let clamped_end = ((loc.end - loc.begin) as usize + clamped_start).min(text.len());
            let mut caret = " ".repeat(clamped_start);
            caret.push_str(&"^".repeat((clamped_end - clamped_start).max(1)));
            out.push_str(&format!("\t{}\n", severity(&caret)));
        }
        _ => {
            out.push_str(&format!("\n{}: {}\n", label, message.bold()));
        }
    }
}
