//! Import resolution.
//!
//! The importer callback is invoked once per `import` declaration (and once
//! with index `-1` for the implicit `descriptor.proto` requirement) and
//! must return a fully-lowered file or an error. This pass unions the
//! transitive dependency lists, records the per-import flags, and computes
//! visibility: a dep is visible when it is imported directly or reachable
//! from a direct import through an unbroken chain of `public` imports.
//! Reachability runs on a small petgraph over the public-import edges.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use log::trace;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{Graph, NodeIndex};
use thiserror::Error;

use crate::ast::{self, Span};
use crate::file::{Dep, File, FileNo};
use crate::intern::Istr;
use crate::report::Diagnostic;
use crate::{FatalError, Lower};

/// One hop of an import cycle, for the cycle diagnostic.
#[derive(Clone, PartialEq, Debug)]
pub struct CycleEntry {
    /// Canonical path of the file containing the import declaration.
    pub file: String,
    /// Path the declaration imports.
    pub imports: String,
    /// Span of the import declaration within `file`.
    pub span: Span,
}

/// Why an import could not be satisfied.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("file not found")]
    NotFound,
    /// The requested file is part of an import cycle; the entries list the
    /// participating import declarations.
    #[error("import cycle detected")]
    Cycle(Vec<CycleEntry>),
    /// The driver asked to stop; propagates as [`FatalError::Cancelled`].
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Supplies lowered dependencies to the pipeline.
///
/// `index` is the position of the `import` declaration in the file being
/// lowered, or `-1` for the implicit `descriptor.proto` requirement (in
/// which case `decl` is `None`). Implementations typically memoize per
/// path and perform their own cycle detection across in-flight files.
pub trait Importer {
    fn import(
        &mut self,
        index: i32,
        path: &str,
        decl: Option<&ast::Import>,
    ) -> Result<Arc<File>, ImportError>;
}

/// Rejects paths that are not in canonical form: forward-slash separators,
/// no `.` or `..` components, no absolute or empty components.
pub fn is_canonical_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && !path.starts_with('/')
        && !path.ends_with('/')
        && path
            .split('/')
            .all(|component| !component.is_empty() && component != "." && component != "..")
}

/// Reachability over direct `import public` edges.
///
/// Nodes are canonical file paths (interned); an edge `A -> B` exists when
/// `A` directly and publicly imports `B`.
pub(crate) struct ImportGraph {
    index: HashMap<Istr, NodeIndex>,
    graph: Graph<Istr, ()>,
}

impl ImportGraph {
    pub(crate) fn new() -> ImportGraph {
        ImportGraph {
            index: HashMap::new(),
            graph: Graph::new(),
        }
    }

    fn get_or_insert(&mut self, path: Istr) -> NodeIndex {
        let ImportGraph {
            ref mut index,
            ref mut graph,
        } = *self;
        *index.entry(path).or_insert_with(|| graph.add_node(path))
    }

    fn add_public_edge(&mut self, from: Istr, to: Istr) {
        let from = self.get_or_insert(from);
        let to = self.get_or_insert(to);
        self.graph.add_edge(from, to, ());
    }

    /// Whether `to` is reachable from `from` through public imports.
    pub(crate) fn reaches(&self, from: Istr, to: Istr) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(&from), self.index.get(&to)) else {
            return false;
        };
        has_path_connecting(&self.graph, from, to, None)
    }
}

impl<'a> Lower<'a> {
    /// Resolves every import declaration and the implicit descriptor.proto
    /// requirement (pass C4).
    pub(crate) fn resolve_imports(&mut self) -> Result<(), FatalError> {
        let ast = self.ast;
        for (index, import) in ast.imports.iter().enumerate() {
            if !is_canonical_path(&import.path) {
                self.emit(
                    Diagnostic::error(format!("import path {:?} is not canonical", import.path))
                        .at(import.path_span)
                        .with_help(
                            "paths use forward slashes and may not contain `.` or `..` components",
                        ),
                );
                continue;
            }
            let path_id = self.intern(&import.path);
            if path_id == self.file.path {
                self.emit(
                    Diagnostic::error("a file cannot import itself").at(import.path_span),
                );
                continue;
            }
            if self
                .file
                .dep_by_path(path_id)
                .is_some_and(|(_, dep)| dep.direct)
            {
                self.emit(
                    Diagnostic::warning(format!("duplicate import of {:?}", import.path))
                        .at(import.span)
                        .with_edit(import.span, "", "delete it"),
                );
                continue;
            }

            match self.importer.import(index as i32, &import.path, Some(import)) {
                Ok(file) => self.add_direct_dep(file, path_id, index, import),
                Err(ImportError::Cycle(entries)) => self.report_cycle(&entries),
                Err(ImportError::Cancelled) => return Err(FatalError::Cancelled),
                Err(source) => {
                    self.emit(
                        Diagnostic::fatal(format!("cannot import {:?}: {}", import.path, source))
                            .at(import.path_span),
                    );
                    return Err(FatalError::Import {
                        path: import.path.clone(),
                        source,
                    });
                }
            }
        }

        self.require_descriptor()?;
        self.flatten_deps();
        self.build_import_graph();
        self.compute_visibility();
        Ok(())
    }

    fn add_direct_dep(&mut self, file: Arc<File>, path: Istr, decl: usize, import: &ast::Import) {
        let (public, weak) = match import.modifier {
            Some(ast::ImportModifier::Public(_)) => (true, false),
            Some(ast::ImportModifier::Weak(_)) => (false, true),
            None => (false, false),
        };
        self.file.deps.push(Dep {
            file,
            path,
            decl: Some(decl),
            span: import.span,
            public,
            weak,
            direct: true,
            visible: true,
            used: Default::default(),
        });
    }

    /// `descriptor.proto` is always implicitly required: options cannot
    /// resolve without it. Invokes the importer with index `-1` when it is
    /// not already present; failure here is fatal.
    fn require_descriptor(&mut self) -> Result<(), FatalError> {
        let descriptor = self.session.names().descriptor_file;
        if self.file.path == descriptor || self.file.dep_by_path(descriptor).is_some() {
            return Ok(());
        }
        let transitively_present = self.file.deps.iter().any(|dep| {
            dep.file
                .dep_by_path(descriptor)
                .is_some()
        });
        let path = self.str(descriptor);
        match self.importer.import(-1, &path, None) {
            Ok(file) => {
                self.file.deps.push(Dep {
                    file,
                    path: descriptor,
                    decl: None,
                    span: Span::default(),
                    public: false,
                    weak: false,
                    direct: false,
                    visible: false,
                    used: Default::default(),
                });
                Ok(())
            }
            Err(ImportError::Cancelled) => Err(FatalError::Cancelled),
            Err(_) if transitively_present => Ok(()),
            Err(_) => {
                self.emit(Diagnostic::fatal(
                    "google/protobuf/descriptor.proto is required but could not be imported",
                ));
                Err(FatalError::MissingDescriptor)
            }
        }
    }

    fn report_cycle(&mut self, entries: &[CycleEntry]) {
        let chain = entries
            .iter()
            .map(|entry| format!("{} imports {}", entry.file, entry.imports))
            .join(", ");
        let mut diagnostic = Diagnostic::error(format!("import cycle: {}", chain));
        for (i, entry) in entries.iter().enumerate() {
            if i == 0 {
                diagnostic = diagnostic.at_label(entry.span, "cycle starts here");
            } else {
                diagnostic = diagnostic.with_snippet(entry.span, format!("imports {}", entry.imports));
            }
        }
        self.emit(diagnostic);
    }

    /// Unions the dep lists of every direct dep into this file's list, in
    /// deterministic breadth-first order.
    fn flatten_deps(&mut self) {
        let mut cursor = 0;
        while cursor < self.file.deps.len() {
            let indirect: Vec<(Istr, Arc<File>, Span)> = {
                let dep = &self.file.deps[cursor];
                dep.file
                    .deps
                    .iter()
                    .map(|d| (d.path, d.file.clone(), Span::default()))
                    .collect()
            };
            for (path, file, span) in indirect {
                if path == self.file.path || self.file.dep_by_path(path).is_some() {
                    continue;
                }
                self.file.deps.push(Dep {
                    file,
                    path,
                    decl: None,
                    span,
                    public: false,
                    weak: false,
                    direct: false,
                    visible: false,
                    used: Default::default(),
                });
            }
            cursor += 1;
        }
        trace!("transitive deps: {}", self.file.deps.len());
    }

    fn build_import_graph(&mut self) {
        let mut graph = ImportGraph::new();
        graph.get_or_insert(self.file.path);
        for dep in &self.file.deps {
            if dep.direct && dep.public {
                graph.add_public_edge(self.file.path, dep.path);
            }
        }
        for dep in &self.file.deps {
            for inner in &dep.file.deps {
                if inner.direct && inner.public {
                    graph.add_public_edge(dep.path, inner.path);
                }
            }
        }
        self.import_graph = graph;
    }

    fn compute_visibility(&mut self) {
        let direct: Vec<Istr> = self
            .file
            .deps
            .iter()
            .filter(|dep| dep.direct)
            .map(|dep| dep.path)
            .collect();
        for index in 0..self.file.deps.len() {
            if self.file.deps[index].direct {
                continue;
            }
            let target = self.file.deps[index].path;
            let visible = direct
                .iter()
                .any(|&from| self.import_graph.reaches(from, target));
            self.file.deps[index].visible = visible;
        }
    }

    /// Marks `no` (and the direct public re-export chain that exposes it)
    /// as used by a successful name resolution.
    pub(crate) fn mark_dep_used(&mut self, no: FileNo) {
        let Some(index) = no.dep_index() else {
            return;
        };
        self.file.deps[index].mark_used();
        if self.file.deps[index].direct {
            return;
        }
        let target = self.file.deps[index].path;
        for dep in &self.file.deps {
            if dep.direct && self.import_graph.reaches(dep.path, target) {
                dep.mark_used();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_paths() {
        assert!(is_canonical_path("google/protobuf/descriptor.proto"));
        assert!(is_canonical_path("a.proto"));
        assert!(!is_canonical_path(""));
        assert!(!is_canonical_path("/abs/path.proto"));
        assert!(!is_canonical_path("a//b.proto"));
        assert!(!is_canonical_path("./a.proto"));
        assert!(!is_canonical_path("a/../b.proto"));
        assert!(!is_canonical_path("a\\b.proto"));
        assert!(!is_canonical_path("dir/"));
    }

    #[test]
    fn import_graph_reachability_is_transitive() {
        let interner = crate::intern::Interner::new();
        let a = interner.intern("a.proto");
        let b = interner.intern("b.proto");
        let c = interner.intern("c.proto");
        let d = interner.intern("d.proto");

        let mut graph = ImportGraph::new();
        graph.add_public_edge(a, b);
        graph.add_public_edge(b, c);
        assert!(graph.reaches(a, c));
        assert!(!graph.reaches(c, a));
        assert!(!graph.reaches(a, d));
    }
}
