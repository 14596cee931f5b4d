//! Diagnostics and the report sink.
//!
//! The pipeline never writes to stderr; every finding is a [`Diagnostic`]
//! handed to a [`Report`] sink supplied by the driver. Rendering is the
//! driver's concern. A diagnostic has a severity, a one-line message, an
//! optional primary snippet, and any number of decorations: secondary
//! snippets, help text, notes, machine-applicable edits, page breaks.

use std::fmt;

use crate::ast::Span;

/// How bad a diagnostic is.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Severity {
    /// Suspicious but legal input.
    Warning,
    /// Invalid input; lowering continues with a zero-valued placeholder.
    Error,
    /// A bug in the analyzer itself, caught at the `lower` boundary.
    Ice,
    /// Unrecoverable input, e.g. a missing `descriptor.proto`.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Ice => "internal compiler error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// A source snippet: a span plus an optional label.
#[derive(Clone, PartialEq, Debug)]
pub struct Snippet {
    pub span: Span,
    pub label: String,
}

/// An extra attachment on a diagnostic.
#[derive(Clone, PartialEq, Debug)]
pub enum Decoration {
    /// A secondary snippet ("expected due to this").
    Snippet(Snippet),
    /// Free-form guidance.
    Help(String),
    /// A remark that is not actionable.
    Note(String),
    /// A machine-applicable suggested edit.
    Edit {
        span: Span,
        replacement: String,
        message: String,
    },
    /// Separates diagnostic groups in paged renderers.
    PageBreak,
}

/// A single finding.
#[derive(Clone, PartialEq, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub primary: Option<Snippet>,
    pub decorations: Vec<Decoration>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            message: message.into(),
            primary: None,
            decorations: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn ice(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Ice, message)
    }

    pub fn fatal(message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(Severity::Fatal, message)
    }

    /// Sets the primary span without a label.
    pub fn at(mut self, span: Span) -> Diagnostic {
        self.primary = Some(Snippet {
            span,
            label: String::new(),
        });
        self
    }

    /// Sets the primary span with a label.
    pub fn at_label(mut self, span: Span, label: impl Into<String>) -> Diagnostic {
        self.primary = Some(Snippet {
            span,
            label: label.into(),
        });
        self
    }

    /// Adds a secondary snippet.
    pub fn with_snippet(mut self, span: Span, label: impl Into<String>) -> Diagnostic {
        self.decorations.push(Decoration::Snippet(Snippet {
            span,
            label: label.into(),
        }));
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Diagnostic {
        self.decorations.push(Decoration::Help(help.into()));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Diagnostic {
        self.decorations.push(Decoration::Note(note.into()));
        self
    }

    /// Adds a machine-applicable suggested edit.
    pub fn with_edit(
        mut self,
        span: Span,
        replacement: impl Into<String>,
        message: impl Into<String>,
    ) -> Diagnostic {
        self.decorations.push(Decoration::Edit {
            span,
            replacement: replacement.into(),
            message: message.into(),
        });
        self
    }

    pub fn with_page_break(mut self) -> Diagnostic {
        self.decorations.push(Decoration::PageBreak);
        self
    }

    /// The primary span's start, for canonical ordering. Span-less
    /// diagnostics sort first.
    pub fn sort_key(&self) -> (u32, u32) {
        match &self.primary {
            Some(snippet) => (snippet.span.start, snippet.span.end),
            None => (0, 0),
        }
    }
}

/// The sink the pipeline emits into.
pub trait Report {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl Report for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

impl<R: Report + ?Sized> Report for &mut R {
    fn report(&mut self, diagnostic: Diagnostic) {
        (**self).report(diagnostic);
    }
}

/// Sorts diagnostics by primary-span start, stably.
///
/// The pipeline is deterministic by construction; this canonical order is
/// what the determinism property is stated against.
pub fn sort_canonical(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by_key(Diagnostic::sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_decorations() {
        let d = Diagnostic::error("bad thing")
            .at(Span::new(10, 14))
            .with_snippet(Span::new(2, 4), "expected due to this")
            .with_help("try something else")
            .with_edit(Span::new(10, 14), "", "delete it");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.primary.as_ref().unwrap().span, Span::new(10, 14));
        assert_eq!(d.decorations.len(), 3);
    }

    #[test]
    fn canonical_sort_is_by_span_start() {
        let mut diags = vec![
            Diagnostic::error("b").at(Span::new(20, 21)),
            Diagnostic::error("a").at(Span::new(5, 6)),
            Diagnostic::warning("no span"),
        ];
        sort_canonical(&mut diags);
        assert_eq!(diags[0].message, "no span");
        assert_eq!(diags[1].message, "a");
        assert_eq!(diags[2].message, "b");
    }
}
