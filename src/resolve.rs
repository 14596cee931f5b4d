//! Name resolution.
//!
//! Protobuf references resolve innermost-first: for a reference
//! `foo.bar.Baz` written in scope `a.b.c`, the candidate scopes are
//! `a.b.c`, `a.b`, `a`, and the package root. The first scope in which the
//! *first* path component resolves commits the search; a first hit that
//! is the wrong kind of symbol, ambiguous, or not visible is reported
//! rather than skipped. Early resolution covers type references, extendees
//! and method I/O; option paths resolve in a later phase to break the
//! circular option-versus-type dependency.

use itertools::Itertools;
use log::trace;

use crate::ast;
use crate::arena::Idx;
use crate::file::FileNo;
use crate::intern::Istr;
use crate::ir::{ElemType, MemberRef, Scalar, Symbol, TypeRef};
use crate::report::Diagnostic;
use crate::{Lower, MemberAst};

/// What a symbol-table lookup amounted to, after visibility filtering.
enum Verdict {
    Missing,
    Found(FileNo, Symbol),
    /// The name exists only in files that are not visible here; carries
    /// the paths of the providing files.
    Invisible(Vec<Istr>),
    /// More than one visible, distinct definition; carries the providers.
    Ambiguous(Vec<Istr>),
}

impl<'a> Lower<'a> {
    /// Resolves field element types, extendees, and method input/output
    /// references (pass C7, early phase).
    pub(crate) fn resolve_early(&mut self) {
        for raw in 0..self.file.members.len() as u32 {
            let member_id = Idx::new(raw);
            if self.file.members[member_id].elem != ElemType::Unresolved {
                continue;
            }
            let type_name: Option<&'a ast::TypeName> = match self.member_ast[raw as usize] {
                MemberAst::Field(decl) => Some(&decl.typ),
                MemberAst::Synth { typ, .. } => typ,
                MemberAst::EnumValue(_) => None,
            };
            let Some(ast::TypeName::Named(path)) = type_name else {
                // Generic types were already diagnosed by map lowering.
                continue;
            };
            let scope = self.member_scope(member_id);
            let Some((file, sym)) = self.resolve_type_name(scope, path) else {
                continue;
            };
            let elem = match sym {
                Symbol::Scalar(scalar) => ElemType::Scalar(scalar),
                Symbol::Message(idx) | Symbol::Enum(idx) => {
                    ElemType::Named(TypeRef { file, idx })
                }
                other => {
                    self.emit(
                        Diagnostic::error(format!(
                            "`{}` is a {}, not a type",
                            path.text(),
                            other.describe()
                        ))
                        .at(path.span),
                    );
                    continue;
                }
            };
            self.file.members[member_id].elem = elem;
        }

        for raw in 0..self.file.extends.len() as u32 {
            let extend_id = Idx::new(raw);
            let Some(decl) = self.extend_ast[raw as usize] else {
                continue;
            };
            let scope = match self.file.extends[extend_id].parent {
                Some(parent) => self.file.types[parent].fqn,
                None => self.file.package,
            };
            let Some((file, sym)) = self.resolve_path(scope, &decl.extendee) else {
                continue;
            };
            match sym {
                Symbol::Message(idx) => {
                    self.file.extends[extend_id].extendee = Some(TypeRef { file, idx });
                }
                other => {
                    self.emit(
                        Diagnostic::error(format!(
                            "`{}` is a {}; only messages can be extended",
                            decl.extendee.text(),
                            other.describe()
                        ))
                        .at(decl.extendee.span),
                    );
                }
            }
        }

        for raw in 0..self.file.methods.len() as u32 {
            let method_id = Idx::new(raw);
            let decl = self.method_ast[raw as usize];
            let service = self.file.methods[method_id].service;
            let scope = self.file.services[service].fqn;
            if let Some(input) = self.resolve_method_type(scope, &decl.input) {
                self.file.methods[method_id].input = Some(input);
            }
            if let Some(output) = self.resolve_method_type(scope, &decl.output) {
                self.file.methods[method_id].output = Some(output);
            }
        }
        trace!("early resolution complete");
    }

    fn resolve_method_type(
        &mut self,
        scope: Istr,
        typ: &'a ast::MethodType,
    ) -> Option<TypeRef> {
        let (file, sym) = self.resolve_path(scope, &typ.path)?;
        match sym {
            Symbol::Message(idx) => Some(TypeRef { file, idx }),
            other => {
                self.emit(
                    Diagnostic::error(format!(
                        "`{}` is a {}; method inputs and outputs must be messages",
                        typ.path.text(),
                        other.describe()
                    ))
                    .at(typ.path.span),
                );
                None
            }
        }
    }

    /// The innermost lexical scope enclosing a member.
    pub(crate) fn member_scope(&self, member_id: crate::ir::MemberId) -> Istr {
        match self.file.members[member_id].parent {
            Some(parent) => self.file.types[parent].fqn,
            None => self.file.package,
        }
    }

    /// Resolves a type-position reference, giving predeclared scalar names
    /// priority over user symbols.
    pub(crate) fn resolve_type_name(
        &mut self,
        scope: Istr,
        path: &ast::TypePath,
    ) -> Option<(FileNo, Symbol)> {
        if !path.absolute && path.segments.len() == 1 {
            if let Some(scalar) = Scalar::from_name(&path.segments[0].text) {
                return Some((FileNo::SELF, Symbol::Scalar(scalar)));
            }
        }
        self.resolve_path(scope, path)
    }

    /// Resolves a custom-option component; must name an extension.
    pub(crate) fn resolve_extension(
        &mut self,
        scope: Istr,
        path: &ast::TypePath,
    ) -> Option<MemberRef> {
        let (file, sym) = self.resolve_path(scope, path)?;
        match sym {
            Symbol::Extension(idx) => Some(MemberRef { file, idx }),
            other => {
                self.emit(
                    Diagnostic::error(format!(
                        "`{}` is a {}, not an extension",
                        path.text(),
                        other.describe()
                    ))
                    .at(path.span),
                );
                None
            }
        }
    }

    /// The scope-walking resolution algorithm. Emits its own diagnostics;
    /// `None` always means "already reported".
    pub(crate) fn resolve_path(
        &mut self,
        scope: Istr,
        path: &ast::TypePath,
    ) -> Option<(FileNo, Symbol)> {
        let text = path.text();
        if path.absolute {
            let fqn = self.intern(&text);
            return self.commit_lookup(&text, path.span, fqn);
        }

        let first = &path.segments[0].text;
        let scope_text = self.str(scope).to_string();
        for candidate in scope_chain(&scope_text) {
            let probe = join_scoped(candidate, first);
            let probe_id = self.intern(&probe);
            match self.classify(probe_id) {
                Verdict::Missing => continue,
                Verdict::Found(file, sym) => {
                    if path.segments.len() == 1 {
                        self.mark_dep_used(file);
                        return Some((file, sym));
                    }
                    if !sym.is_scope() {
                        self.emit(
                            Diagnostic::error(format!(
                                "`{}` is a {}; cannot resolve `{}` inside it",
                                probe,
                                sym.describe(),
                                text
                            ))
                            .at(path.span),
                        );
                        return None;
                    }
                    // First component committed: the full reference must
                    // resolve in this candidate scope.
                    let full = join_scoped(candidate, &text);
                    let full_id = self.intern(&full);
                    return self.commit_lookup(&text, path.span, full_id);
                }
                verdict @ (Verdict::Invisible(_) | Verdict::Ambiguous(_)) => {
                    self.report_verdict(&probe, path.span, verdict);
                    return None;
                }
            }
        }

        self.emit(
            Diagnostic::error(format!("cannot resolve `{}`", text))
                .at(path.span)
                .with_note(if scope_text.is_empty() {
                    "searched from the package root".to_owned()
                } else {
                    format!("searched outward from `{}`", scope_text)
                }),
        );
        None
    }

    /// Final lookup once a scope has been committed to.
    fn commit_lookup(
        &mut self,
        text: &str,
        span: ast::Span,
        fqn: Istr,
    ) -> Option<(FileNo, Symbol)> {
        match self.classify(fqn) {
            Verdict::Found(file, sym) => {
                self.mark_dep_used(file);
                Some((file, sym))
            }
            Verdict::Missing => {
                self.emit(Diagnostic::error(format!("cannot resolve `{}`", text)).at(span));
                None
            }
            verdict => {
                self.report_verdict(text, span, verdict);
                None
            }
        }
    }

    fn classify(&self, fqn: Istr) -> Verdict {
        let rows = self.file.merged.lookup(fqn);
        if rows.is_empty() {
            return Verdict::Missing;
        }
        let visible: Vec<_> = rows
            .iter()
            .filter(|entry| self.dep_visible(entry.file))
            .collect();
        if visible.is_empty() {
            let providers = rows.iter().map(|e| self.provider_path(e.file)).collect();
            return Verdict::Invisible(providers);
        }
        // The same package declared by many files is one symbol, not an
        // ambiguity.
        let non_packages: Vec<_> = visible
            .iter()
            .filter(|entry| entry.sym != Symbol::Package)
            .collect();
        match non_packages.len() {
            0 => {
                let entry = visible[0];
                Verdict::Found(entry.file, entry.sym)
            }
            1 => {
                let entry = non_packages[0];
                Verdict::Found(entry.file, entry.sym)
            }
            _ => Verdict::Ambiguous(
                non_packages
                    .iter()
                    .map(|e| self.provider_path(e.file))
                    .collect(),
            ),
        }
    }

    fn dep_visible(&self, no: FileNo) -> bool {
        match no.dep_index() {
            None => true,
            Some(index) => self.file.deps[index].visible,
        }
    }

    fn provider_path(&self, no: FileNo) -> Istr {
        match no.dep_index() {
            None => self.file.path,
            Some(index) => self.file.deps[index].path,
        }
    }

    fn report_verdict(&mut self, name: &str, span: ast::Span, verdict: Verdict) {
        match verdict {
            Verdict::Invisible(providers) => {
                let mut diagnostic = Diagnostic::error(format!(
                    "`{}` exists but is not visible here",
                    name
                ))
                .at(span);
                for provider in providers {
                    let provider = self.str(provider);
                    diagnostic = diagnostic
                        .with_help(format!("add an import of {:?} to make it visible", provider));
                }
                self.emit(diagnostic);
            }
            Verdict::Ambiguous(providers) => {
                let list = providers
                    .iter()
                    .map(|&p| format!("{:?}", self.str(p)))
                    .join(", ");
                self.emit(
                    Diagnostic::error(format!("`{}` is ambiguous: defined in {}", name, list))
                        .at(span),
                );
            }
            Verdict::Missing | Verdict::Found(..) => {}
        }
    }
}

/// The candidate scopes for an unqualified reference, innermost first,
/// ending at the package root.
fn scope_chain(scope: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    if !scope.is_empty() {
        let mut rest = scope;
        loop {
            chain.push(rest);
            match rest.rfind('.') {
                Some(dot) => rest = &rest[..dot],
                None => break,
            }
        }
    }
    chain.push("");
    chain
}

fn join_scoped(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", scope, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_chain_walks_outward() {
        assert_eq!(scope_chain("a.b.c"), vec!["a.b.c", "a.b", "a", ""]);
        assert_eq!(scope_chain("a"), vec!["a", ""]);
        assert_eq!(scope_chain(""), vec![""]);
    }

    #[test]
    fn join_scoped_handles_root() {
        assert_eq!(join_scoped("", "Foo"), "Foo");
        assert_eq!(join_scoped("a.b", "Foo"), "a.b.Foo");
    }
}
