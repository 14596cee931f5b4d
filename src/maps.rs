//! Map-entry synthesis.
//!
//! `map<K, V>` fields have no direct descriptor representation: each one
//! stands for an implicit repeated nested message `<FieldName>Entry` with a
//! `key = 1` and a `value = 2` field. This pass synthesizes those entry
//! types, rewrites the map field to reference them, and enforces the map
//! key constraints. It runs before symbol tables are built so the entry
//! types become ordinary addressable symbols, and it is idempotent: a
//! rewritten field no longer looks map-typed.

use heck::ToUpperCamelCase;
use log::trace;

use crate::ast;
use crate::arena::Idx;
use crate::file::FileNo;
use crate::ir::{ElemType, MemberId, MemberKind, MemberNode, Presence, Scalar, Symbol, TypeNode, TypeRef};
use crate::report::Diagnostic;
use crate::{Lower, MemberAst};

/// The key types `map` accepts, for the help text.
const ALLOWED_KEY_TYPES: &str =
    "int32, int64, uint32, uint64, sint32, sint64, fixed32, fixed64, sfixed32, sfixed64, bool, string";

impl<'a> Lower<'a> {
    /// Synthesizes entry messages for map fields (pass C5).
    pub(crate) fn lower_maps(&mut self) {
        let total = self.file.members.len();
        for raw in 0..total as u32 {
            let member_id: MemberId = Idx::new(raw);
            let MemberAst::Field(decl) = self.member_ast[raw as usize] else {
                continue;
            };
            let ast::TypeName::Generic { base, args, .. } = &decl.typ else {
                continue;
            };
            // Already rewritten (groups also arrive resolved).
            if matches!(self.file.members[member_id].elem, ElemType::Named(_)) {
                continue;
            }

            if base.absolute || base.text() != "map" {
                self.emit(
                    Diagnostic::error("generic types other than `map` are not supported")
                        .at(base.span),
                );
                continue;
            }
            if args.len() != 2 {
                self.emit(
                    Diagnostic::error(format!(
                        "`map` takes exactly two type arguments, found {}",
                        args.len()
                    ))
                    .at(decl.typ.span()),
                );
                continue;
            }

            self.lower_map_field(member_id, decl, &args[0], &args[1]);
        }
    }

    fn lower_map_field(
        &mut self,
        member_id: MemberId,
        decl: &'a ast::FieldDecl,
        key: &'a ast::TypeName,
        value: &'a ast::TypeName,
    ) {
        self.check_map_key(key);

        let is_extension = self.file.members[member_id].kind == MemberKind::Extension;
        let in_oneof = self.file.members[member_id].oneof.is_some();
        if is_extension {
            // Hard error, but the entry is still synthesized so later
            // passes can diagnose the extension coherently.
            self.emit(
                Diagnostic::error("extensions cannot be map-typed").at(decl.typ.span()),
            );
        }
        if in_oneof {
            self.emit(Diagnostic::error("map fields are not allowed in oneofs").at(decl.span));
        }
        if let Some(label) = decl.label {
            self.emit(
                Diagnostic::error("map fields may not have a label")
                    .at(label.span)
                    .with_edit(label.span, "", "delete it"),
            );
        }

        let parent = self.file.members[member_id].parent;
        let scope = match parent {
            Some(parent) => self.file.types[parent].fqn,
            None => self.file.package,
        };
        let entry_simple = format!("{}Entry", decl.name.text.to_upper_camel_case());
        let entry_name = self.intern(&entry_simple);
        let entry_fqn = self.join_fqn(scope, &entry_simple);

        let mut node = TypeNode::new(entry_name, entry_fqn, false, parent);
        node.span = decl.span;
        node.name_span = decl.name.span;
        node.map_entry_of = Some(member_id);
        let entry_id = self.alloc_synthetic_type(node);
        if let Some(parent) = parent {
            self.file.types[parent].nested.push(entry_id);
        }
        self.file.symtab.insert(entry_fqn, Symbol::Message(entry_id));

        let key_id = self.synth_entry_field(entry_id, entry_fqn, "key", 1, key);
        let value_id = self.synth_entry_field(entry_id, entry_fqn, "value", 2, value);
        self.file.types[entry_id].members = vec![key_id, value_id];
        self.file.types[entry_id].extns_start = 2;

        // The map field itself becomes a repeated field of the entry type.
        let member = &mut self.file.members[member_id];
        member.elem = ElemType::Named(TypeRef {
            file: FileNo::SELF,
            idx: entry_id,
        });
        member.presence = Presence::Repeated;
        trace!("synthesized map entry {}", entry_simple);
    }

    fn check_map_key(&mut self, key: &ast::TypeName) {
        let scalar = match key {
            ast::TypeName::Named(path) if !path.absolute && path.segments.len() == 1 => {
                Scalar::from_name(&path.segments[0].text)
            }
            _ => None,
        };
        match scalar {
            Some(scalar) if scalar.is_valid_map_key() => {}
            _ => {
                self.emit(
                    Diagnostic::error("unexpected non-comparable type in map key type")
                        .at(key.span())
                        .with_help(format!("allowed key types are {}", ALLOWED_KEY_TYPES)),
                );
            }
        }
    }

    fn synth_entry_field(
        &mut self,
        entry_id: crate::ir::TypeId,
        entry_fqn: crate::intern::Istr,
        name: &str,
        number: i64,
        typ: &'a ast::TypeName,
    ) -> MemberId {
        let name_id = self.intern(name);
        let fqn = self.join_fqn(entry_fqn, name);
        let mut member = MemberNode::new(name_id, fqn, MemberKind::Field, Some(entry_id));
        member.span = typ.span();
        member.name_span = typ.span();
        member.type_span = typ.span();
        member.number = number;
        member.presence = self.initial_presence(None, None);
        member.elem = ElemType::Unresolved;
        let id = self.alloc_member(
            member,
            MemberAst::Synth {
                typ: Some(typ),
                number,
            },
        );
        self.file.symtab.insert(fqn, Symbol::Field(id));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, FieldDecl, Ident, Span, TypeName, TypePath};

    fn path(name: &str, span: Span) -> TypePath {
        TypePath {
            absolute: false,
            segments: vec![Ident::new(name, span)],
            span,
        }
    }

    fn map_field(key: &str, value: &str) -> FieldDecl {
        let span = Span::new(0, 10);
        FieldDecl {
            label: None,
            typ: TypeName::Generic {
                base: path("map", span),
                args: vec![
                    TypeName::Named(path(key, Span::new(4, 5))),
                    TypeName::Named(path(value, Span::new(7, 8))),
                ],
                span,
            },
            name: Ident::new("x", Span::new(11, 12)),
            number: Expr::Int {
                value: 1,
                span: Span::new(15, 16),
            },
            options: Vec::new(),
            group_body: None,
            span: Span::new(0, 17),
        }
    }

    fn harness(
        field: &FieldDecl,
        run: impl FnOnce(&mut Lower<'_>),
    ) -> Vec<crate::report::Diagnostic> {
        struct NoImports;
        impl crate::imports::Importer for NoImports {
            fn import(
                &mut self,
                _: i32,
                _: &str,
                _: Option<&crate::ast::Import>,
            ) -> Result<std::sync::Arc<crate::file::File>, crate::imports::ImportError> {
                Err(crate::imports::ImportError::NotFound)
            }
        }

        let session = crate::session::Session::new();
        let ast = crate::ast::File {
            decls: vec![crate::ast::Decl::Message(crate::ast::MessageDecl {
                visibility: None,
                name: Ident::new("M", Span::new(0, 1)),
                items: vec![crate::ast::MessageItem::Field(field.clone())],
                span: Span::new(0, 20),
            })],
            ..Default::default()
        };
        let mut report = Vec::new();
        let mut importer = NoImports;
        let path_id = session.intern("test.proto");
        let mut ctx = Lower {
            session: session.clone(),
            ast: &ast,
            file: crate::file::File::new(session, path_id),
            report: &mut report,
            importer: &mut importer,
            type_ast: Vec::new(),
            member_ast: Vec::new(),
            oneof_ast: Vec::new(),
            extend_ast: Vec::new(),
            service_ast: Vec::new(),
            method_ast: Vec::new(),
            range_ast: Vec::new(),
            range_options_ast: Vec::new(),
            import_graph: crate::imports::ImportGraph::new(),
            builtins: crate::builtins::Builtins::default(),
        };
        ctx.walk_ast();
        run(&mut ctx);
        report
    }

    #[test]
    fn synthesizes_entry_and_rewrites_field() {
        let field = map_field("string", "int32");
        let report = harness(&field, |ctx| {
            ctx.lower_maps();
            assert_eq!(ctx.file.types.len(), 2);
            let entry = &ctx.file.types[Idx::new(1)];
            assert_eq!(&*ctx.str(entry.name), "XEntry");
            assert!(entry.map_entry_of.is_some());
            assert_eq!(entry.members.len(), 2);

            let field_node = &ctx.file.members[Idx::new(0)];
            assert_eq!(field_node.presence, Presence::Repeated);
            assert!(matches!(field_node.elem, ElemType::Named(_)));
        });
        assert!(report.is_empty(), "unexpected diagnostics: {:?}", report);
    }

    #[test]
    fn lowering_twice_is_idempotent() {
        let field = map_field("int32", "string");
        harness(&field, |ctx| {
            ctx.lower_maps();
            let types = ctx.file.types.len();
            let members = ctx.file.members.len();
            ctx.lower_maps();
            assert_eq!(ctx.file.types.len(), types);
            assert_eq!(ctx.file.members.len(), members);
        });
    }

    #[test]
    fn non_comparable_key_is_diagnosed() {
        let field = map_field("float", "string");
        let report = harness(&field, |ctx| ctx.lower_maps());
        assert_eq!(report.len(), 1);
        assert!(report[0]
            .message
            .contains("non-comparable type in map key type"));
    }
}
