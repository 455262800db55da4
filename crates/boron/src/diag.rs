//! Accumulated semantic diagnostics.
//!
//! Analysis never aborts on the first error: diagnostics are pushed onto a
//! list and compilation keeps going to collect more. IR emission is skipped
//! entirely when the list is non-empty. An `Invalid` type result silences
//! further diagnostics about the same subexpression, so each user mistake
//! produces one primary message plus optional notes ("previous definition
//! is here", "declared here").

use std::fmt::Write as _;

use smallvec::SmallVec;

use crate::{imports::ImportId, span::Span};

/// A secondary location attached to a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagNote {
    pub import: ImportId,
    pub span: Span,
    pub msg: String,
}

/// One reported error with its primary location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub import: ImportId,
    pub span: Span,
    pub msg: String,
    pub notes: SmallVec<[DiagNote; 2]>,
}

/// The build-wide diagnostic list.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports an error and returns its index so notes can be attached.
    pub fn add(&mut self, import: ImportId, span: Span, msg: String) -> usize {
        self.list.push(Diagnostic {
            import,
            span,
            msg,
            notes: SmallVec::new(),
        });
        self.list.len() - 1
    }

    /// Attaches a note to a previously reported diagnostic.
    pub fn add_note(&mut self, diag_idx: usize, import: ImportId, span: Span, msg: String) {
        self.list[diag_idx].notes.push(DiagNote { import, span, msg });
    }

    pub fn error_count(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    /// Renders all diagnostics as `path:line:col: error: msg` lines, notes
    /// indented beneath their parent.
    pub fn render(&self, imports: &crate::imports::Imports) -> String {
        let mut out = String::new();
        for diag in &self.list {
            let import = imports.get(diag.import);
            let loc = import.line_offsets.locate(diag.span.start);
            let _ = writeln!(
                out,
                "{}:{loc}: error: {}",
                import.display_path(),
                diag.msg
            );
            for note in &diag.notes {
                let note_import = imports.get(note.import);
                let note_loc = note_import.line_offsets.locate(note.span.start);
                let _ = writeln!(
                    out,
                    "{}:{note_loc}: note: {}",
                    note_import.display_path(),
                    note.msg
                );
            }
        }
        out
    }
}
