//! Shared test harness: AST builders and a map-backed importer.
//!
//! The builders construct the same shapes a parser would; spans are passed
//! explicitly where a scenario asserts on them and default to empty
//! elsewhere. `TestImporter` lowers dependencies on demand from an
//! in-memory path→AST map, memoizes results, and detects import cycles
//! the way a real incremental driver would.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use prosem::ast::{
    Decl, DictEntry, DictKey, EnumDecl, EnumValueDecl, Expr, FieldDecl, File as AstFile, Ident,
    Import, ImportModifier, Label, LabelKind, MessageDecl, MessageItem, OptionDecl, OptionPath,
    OptionPathPart, PackageDecl, Span, SyntaxDecl, TypeName, TypePath,
};
use prosem::descriptor;
use prosem::{
    lower, CycleEntry, Diagnostic, FatalError, File, ImportError, Importer, Session,
};

pub fn sp(start: u32, end: u32) -> Span {
    Span::new(start, end)
}

pub fn ident(name: &str) -> Ident {
    Ident::new(name, Span::default())
}

pub fn ident_at(name: &str, span: Span) -> Ident {
    Ident::new(name, span)
}

pub fn type_path(name: &str) -> TypePath {
    type_path_at(name, Span::default())
}

pub fn type_path_at(name: &str, span: Span) -> TypePath {
    let absolute = name.starts_with('.');
    TypePath {
        absolute,
        segments: name
            .trim_start_matches('.')
            .split('.')
            .map(|seg| Ident::new(seg, span))
            .collect(),
        span,
    }
}

pub fn named(name: &str) -> TypeName {
    TypeName::Named(type_path(name))
}

pub fn named_at(name: &str, span: Span) -> TypeName {
    TypeName::Named(type_path_at(name, span))
}

pub fn int(value: u64) -> Expr {
    Expr::Int {
        value,
        span: Span::default(),
    }
}

pub fn int_at(value: u64, span: Span) -> Expr {
    Expr::Int { value, span }
}

pub fn string_expr(value: &str) -> Expr {
    Expr::Str {
        value: value.to_owned(),
        span: Span::default(),
    }
}

pub fn path_expr(name: &str) -> Expr {
    Expr::Path(type_path(name))
}

/// `{ key: value, ... }` with plain field-name keys.
pub fn dict(entries: Vec<(&str, Expr)>) -> Expr {
    Expr::Dict {
        entries: entries
            .into_iter()
            .map(|(key, value)| DictEntry {
                key: DictKey::Field(ident(key)),
                value,
                span: Span::default(),
            })
            .collect(),
        span: Span::default(),
    }
}

pub fn option(name: &str, value: Expr) -> OptionDecl {
    OptionDecl {
        path: OptionPath {
            parts: name
                .split('.')
                .map(|part| OptionPathPart::Simple(ident(part)))
                .collect(),
            span: Span::default(),
        },
        value,
        span: Span::default(),
    }
}

pub fn custom_option(extension: &str, value: Expr) -> OptionDecl {
    OptionDecl {
        path: OptionPath {
            parts: vec![OptionPathPart::Extension {
                path: type_path(extension),
                span: Span::default(),
            }],
            span: Span::default(),
        },
        value,
        span: Span::default(),
    }
}

pub fn field(typ: TypeName, name: &str, number: Expr) -> FieldDecl {
    FieldDecl {
        label: None,
        typ,
        name: ident(name),
        number,
        options: Vec::new(),
        group_body: None,
        span: Span::default(),
    }
}

pub fn optional_field(typ: TypeName, name: &str, number: Expr) -> FieldDecl {
    FieldDecl {
        label: Some(Label {
            kind: LabelKind::Optional,
            span: Span::default(),
        }),
        ..field(typ, name, number)
    }
}

pub fn map_field(key: TypeName, value: TypeName, name: &str, number: Expr) -> FieldDecl {
    let span = key.span().join(value.span());
    field(
        TypeName::Generic {
            base: type_path("map"),
            args: vec![key, value],
            span,
        },
        name,
        number,
    )
}

pub fn message(name: &str, items: Vec<MessageItem>) -> Decl {
    Decl::Message(MessageDecl {
        visibility: None,
        name: ident(name),
        items,
        span: Span::default(),
    })
}

pub fn enum_value(name: &str, number: Expr) -> EnumValueDecl {
    EnumValueDecl {
        name: ident(name),
        number,
        options: Vec::new(),
        span: Span::default(),
    }
}

pub fn enum_decl(name: &str, values: Vec<EnumValueDecl>) -> Decl {
    Decl::Enum(EnumDecl {
        visibility: None,
        name: ident(name),
        values,
        reserved: Vec::new(),
        options: Vec::new(),
        span: Span::default(),
    })
}

pub fn proto2() -> Option<SyntaxDecl> {
    syntax("proto2", Span::default())
}

pub fn proto3() -> Option<SyntaxDecl> {
    syntax("proto3", Span::default())
}

pub fn syntax(value: &str, span: Span) -> Option<SyntaxDecl> {
    Some(SyntaxDecl {
        is_edition: false,
        value: value.to_owned(),
        value_span: span,
        span,
    })
}

pub fn edition(value: &str, span: Span) -> Option<SyntaxDecl> {
    Some(SyntaxDecl {
        is_edition: true,
        value: value.to_owned(),
        value_span: span,
        span,
    })
}

pub fn package(name: &str) -> Option<PackageDecl> {
    Some(PackageDecl {
        path: type_path(name),
        span: Span::default(),
    })
}

pub fn import(path: &str, span: Span) -> Import {
    Import {
        modifier: None,
        path: path.to_owned(),
        path_span: span,
        span,
    }
}

pub fn public_import(path: &str, span: Span) -> Import {
    Import {
        modifier: Some(ImportModifier::Public(span)),
        ..import(path, span)
    }
}

/// A map-backed importer with memoization and cycle detection. The
/// well-known `descriptor.proto` and `any.proto` are served from the
/// synthesized ASTs unless the test supplies its own.
pub struct TestImporter {
    session: Arc<Session>,
    sources: HashMap<String, AstFile>,
    cache: HashMap<String, Arc<File>>,
    /// `(path, span of the import that pulled it in)` for every in-flight
    /// lowering, outermost first.
    stack: Vec<(String, Span)>,
    /// Diagnostics emitted while lowering dependencies.
    pub dep_diagnostics: Vec<Diagnostic>,
}

impl TestImporter {
    pub fn new(session: &Arc<Session>) -> TestImporter {
        TestImporter {
            session: session.clone(),
            sources: HashMap::new(),
            cache: HashMap::new(),
            stack: Vec::new(),
            dep_diagnostics: Vec::new(),
        }
    }

    pub fn add(&mut self, path: &str, file: AstFile) -> &mut Self {
        self.sources.insert(path.to_owned(), file);
        self
    }

    fn source_for(&self, path: &str) -> Option<AstFile> {
        if let Some(file) = self.sources.get(path) {
            return Some(file.clone());
        }
        match path {
            "google/protobuf/descriptor.proto" => Some(descriptor::descriptor_file()),
            "google/protobuf/any.proto" => Some(descriptor::any_file()),
            _ => None,
        }
    }

    /// Lowers `path` as the root file, reporting into `report`.
    pub fn lower_root(
        &mut self,
        path: &str,
        report: &mut Vec<Diagnostic>,
    ) -> Result<Arc<File>, FatalError> {
        let ast = self
            .source_for(path)
            .unwrap_or_else(|| panic!("no source registered for {:?}", path));
        let session = self.session.clone();
        self.stack.push((path.to_owned(), Span::default()));
        let result = lower(&ast, path, &session, report, self);
        self.stack.pop();
        result
    }
}

impl Importer for TestImporter {
    fn import(
        &mut self,
        _index: i32,
        path: &str,
        decl: Option<&prosem::ast::Import>,
    ) -> Result<Arc<File>, ImportError> {
        if let Some(file) = self.cache.get(path) {
            return Ok(file.clone());
        }

        if let Some(position) = self.stack.iter().position(|(p, _)| p == path) {
            // Walk the in-flight chain from the first occurrence back to
            // this import: those declarations form the cycle.
            let mut entries: Vec<CycleEntry> = Vec::new();
            for window in self.stack[position..].windows(2) {
                entries.push(CycleEntry {
                    file: window[0].0.clone(),
                    imports: window[1].0.clone(),
                    span: window[1].1,
                });
            }
            let current = self
                .stack
                .last()
                .map(|(p, _)| p.clone())
                .unwrap_or_default();
            entries.push(CycleEntry {
                file: current,
                imports: path.to_owned(),
                span: decl.map(|d| d.span).unwrap_or_default(),
            });
            return Err(ImportError::Cycle(entries));
        }

        let Some(ast) = self.source_for(path) else {
            return Err(ImportError::NotFound);
        };
        let span = decl.map(|d| d.span).unwrap_or_default();
        self.stack.push((path.to_owned(), span));
        let session = self.session.clone();
        let mut report = Vec::new();
        let result = lower(&ast, path, &session, &mut report, self);
        self.stack.pop();
        self.dep_diagnostics.append(&mut report);

        match result {
            Ok(file) => {
                self.cache.insert(path.to_owned(), file.clone());
                Ok(file)
            }
            Err(FatalError::Cancelled) => Err(ImportError::Cancelled),
            Err(fatal) => Err(ImportError::Other(fatal.to_string())),
        }
    }
}

/// Lowers a single file with the default importer setup; returns the file
/// and the root file's diagnostics.
pub fn lower_file(ast: AstFile, path: &str) -> (Option<Arc<File>>, Vec<Diagnostic>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let session = Session::new();
    let mut importer = TestImporter::new(&session);
    importer.add(path, ast);
    let mut report = Vec::new();
    let file = importer.lower_root(path, &mut report).ok();
    (file, report)
}
