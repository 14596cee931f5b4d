#![doc = include_str!("../README.md")]

//! # Overview
//!
//! `prosem` turns a syntactically parsed Protocol Buffers file into a typed,
//! linked, validated intermediate representation. The entry point is
//! [`lower`]: given an [`ast::File`], an [`Importer`] that supplies lowered
//! dependencies, and a [`Report`] sink for diagnostics, it runs a fixed
//! sequence of passes (AST walking, import resolution, map-entry
//! synthesis, symbol tables, name resolution, constant evaluation, number
//! assignment, option lowering, feature propagation, validation) and
//! returns the finished [`File`].
//!
//! Lowering is single-threaded per file; files sharing a [`Session`] may be
//! lowered in parallel by an external driver. Most problems are recoverable
//! and flow into the report sink; only a missing `descriptor.proto`, an
//! importer failure, or an internal error abort with a [`FatalError`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::debug;
use thiserror::Error;

pub mod arena;
pub mod ast;
pub mod descriptor;
pub mod features;
pub mod file;
pub mod intern;
pub mod ir;
pub mod report;
pub mod session;
pub mod symtab;
pub mod value;

mod builtins;
mod eval;
mod imports;
mod json_name;
mod maps;
mod numbers;
mod options;
mod resolve;
mod validate;
mod walker;

pub use crate::file::{Edition, File, FileNo, SyntaxMode};
pub use crate::imports::{CycleEntry, ImportError, Importer};
pub use crate::intern::Istr;
pub use crate::report::{Diagnostic, Report, Severity};
pub use crate::session::Session;

use crate::builtins::Builtins;
use crate::imports::ImportGraph;

/// An unrecoverable lowering failure.
///
/// Everything else (bad numbers, unresolved names, option misuse) is
/// reported as a [`Diagnostic`] and lowering continues.
#[derive(Error, Debug)]
pub enum FatalError {
    /// An import could not be satisfied at all.
    #[error("import of {path:?} failed: {source}")]
    Import {
        path: String,
        #[source]
        source: ImportError,
    },
    /// `google/protobuf/descriptor.proto` is implicitly required and could
    /// not be provided by the importer.
    #[error("google/protobuf/descriptor.proto is required but could not be imported")]
    MissingDescriptor,
    /// The importer observed a cancellation request.
    #[error("lowering was cancelled")]
    Cancelled,
    /// A panic escaped a lowering pass; reported as an ICE diagnostic.
    #[error("internal error while lowering {0:?}")]
    Internal(String),
}

/// The AST declaration a lowered type came from.
#[derive(Clone, Copy)]
pub(crate) enum TypeAst<'a> {
    Message(&'a ast::MessageDecl),
    Enum(&'a ast::EnumDecl),
    Group(&'a ast::FieldDecl),
    /// Synthesized map-entry types have no AST.
    MapEntry,
}

/// The AST declaration a lowered member came from.
#[derive(Clone, Copy)]
pub(crate) enum MemberAst<'a> {
    Field(&'a ast::FieldDecl),
    EnumValue(&'a ast::EnumValueDecl),
    /// Synthesized map-entry key/value fields: a fixed number, and the type
    /// written inside `map<K, V>` when it still needs resolution.
    Synth {
        typ: Option<&'a ast::TypeName>,
        number: i64,
    },
}

/// Mutable state threaded through the lowering passes of one file.
///
/// The passes live next to their data in `walker.rs`, `imports.rs`,
/// `resolve.rs`, ... as `impl Lower` blocks; this struct is the spine
/// they all hang off.
pub(crate) struct Lower<'a> {
    pub(crate) session: Arc<Session>,
    pub(crate) ast: &'a ast::File,
    pub(crate) file: file::File,
    pub(crate) report: &'a mut dyn Report,
    pub(crate) importer: &'a mut dyn Importer,

    // AST back-references, parallel to the file's arenas.
    pub(crate) type_ast: Vec<TypeAst<'a>>,
    pub(crate) member_ast: Vec<MemberAst<'a>>,
    pub(crate) oneof_ast: Vec<Option<&'a ast::OneofDecl>>,
    pub(crate) extend_ast: Vec<Option<&'a ast::ExtendDecl>>,
    pub(crate) service_ast: Vec<&'a ast::ServiceDecl>,
    pub(crate) method_ast: Vec<&'a ast::MethodDecl>,
    pub(crate) range_ast: Vec<Option<&'a ast::RangeExpr>>,
    /// Options of the `extensions` statement each range came from; empty
    /// for reserved ranges.
    pub(crate) range_options_ast: Vec<&'a [ast::OptionDecl]>,

    pub(crate) import_graph: ImportGraph,
    pub(crate) builtins: Builtins,
}

impl<'a> Lower<'a> {
    pub(crate) fn emit(&mut self, diagnostic: Diagnostic) {
        self.report.report(diagnostic);
    }

    pub(crate) fn intern(&self, s: &str) -> Istr {
        self.session.intern(s)
    }

    pub(crate) fn str(&self, id: Istr) -> Arc<str> {
        self.session.str(id)
    }

    /// Parses the `syntax` / `edition` declaration into the file's mode.
    fn setup_syntax(&mut self) {
        let Some(decl) = &self.ast.syntax else {
            // No declaration defaults to proto2, matching protoc.
            self.file.syntax = SyntaxMode::Proto2;
            return;
        };
        self.file.syntax_span = decl.span;
        self.file.syntax = if decl.is_edition {
            match Edition::from_decl_value(&decl.value) {
                Some(Edition::Legacy) => SyntaxMode::EditionsLegacy,
                Some(edition) => SyntaxMode::Editions(edition),
                None => {
                    self.emit(
                        Diagnostic::error(format!("unknown edition `{}`", decl.value))
                            .at(decl.value_span)
                            .with_help("supported editions are `2023` and `2024`"),
                    );
                    SyntaxMode::Editions(Edition::Unknown)
                }
            }
        } else {
            match decl.value.as_str() {
                "proto2" => SyntaxMode::Proto2,
                "proto3" => SyntaxMode::Proto3,
                _ => {
                    self.emit(
                        Diagnostic::error(format!("unknown syntax `{}`", decl.value))
                            .at(decl.value_span)
                            .with_help("supported syntaxes are `proto2` and `proto3`"),
                    );
                    SyntaxMode::Proto2
                }
            }
        };
    }

    fn run(&mut self) -> Result<(), FatalError> {
        let path = self.str(self.file.path);
        debug!("lowering {}", path);

        self.setup_syntax();
        self.walk_ast();
        self.resolve_imports()?;
        self.lower_maps();
        self.build_symbol_tables();
        self.bind_builtins();
        self.resolve_early();
        self.assign_numbers();
        self.lower_options();
        self.build_feature_infos();
        self.build_features();
        self.compute_json_names();
        self.validate();

        debug!(
            "lowered {}: {} types, {} members, {} deps",
            path,
            self.file.types.len(),
            self.file.members.len(),
            self.file.deps.len(),
        );
        Ok(())
    }
}

/// Lowers one parsed file to its IR.
///
/// `path` is the canonical path of the file being lowered (forward-slash
/// separators). The importer is consulted once per `import` declaration and
/// once more for the implicit `descriptor.proto` requirement. All
/// diagnostics flow into `report`; the returned `Err` only covers the
/// conditions in [`FatalError`].
pub fn lower(
    ast: &ast::File,
    path: &str,
    session: &Arc<Session>,
    report: &mut dyn Report,
    importer: &mut dyn Importer,
) -> Result<Arc<File>, FatalError> {
    let path_id = session.intern(path);
    let mut ctx = Lower {
        session: session.clone(),
        ast,
        file: File::new(session.clone(), path_id),
        report,
        importer,
        type_ast: Vec::new(),
        member_ast: Vec::new(),
        oneof_ast: Vec::new(),
        extend_ast: Vec::new(),
        service_ast: Vec::new(),
        method_ast: Vec::new(),
        range_ast: Vec::new(),
        range_options_ast: Vec::new(),
        import_graph: ImportGraph::new(),
        builtins: Builtins::default(),
    };

    match panic::catch_unwind(AssertUnwindSafe(|| ctx.run())) {
        Ok(Ok(())) => Ok(Arc::new(ctx.file)),
        Ok(Err(fatal)) => {
            // Import failures already produced a span-anchored fatal
            // diagnostic inside the pass; cancellation has no span.
            if matches!(fatal, FatalError::Cancelled) {
                ctx.report.report(Diagnostic::fatal(fatal.to_string()));
            }
            Err(fatal)
        }
        Err(payload) => {
            let detail = panic_message(payload.as_ref());
            ctx.report.report(
                Diagnostic::ice(format!("panic while lowering {:?}: {}", path, detail))
                    .with_note("this is a bug in the analyzer, not in the input file"),
            );
            Err(FatalError::Internal(path.to_owned()))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

/// Applies the canonical diagnostic order used by the determinism property:
/// stable sort by primary-span start.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    report::sort_canonical(diagnostics);
}

pub use crate::report::{Decoration, Snippet};
