//! Option lowering.
//!
//! Options, both `option a.b.c = expr;` statements and compact
//! `[a = 1, b = 2]` lists, evaluate into a message-literal tree rooted at the options
//! message for the annotated entity's kind. Dotted paths descend through
//! message-typed fields, creating nested [`MessageValue`]s on demand and
//! merging with values set by earlier options; setting the same field (or
//! two members of one oneof) twice is an error. Custom options resolve as
//! extensions. The pseudo-options `json_name`, `default` and `deprecated`
//! are recognized by name and stored on the member directly, bypassing the
//! options message.
//!
//! [`MessageValue`]: crate::value::MessageValue

use log::trace;

use crate::arena::Idx;
use crate::ast;
use crate::builtins::OptionTarget;
use crate::intern::Istr;
use crate::ir::{ElemType, MemberId, MemberKind, MemberRef, TypeRef};
use crate::report::Diagnostic;
use crate::value::{MessageValue, MsgValId, Payload, ValueNode};
use crate::{Lower, MemberAst, TypeAst};

impl<'a> Lower<'a> {
    /// Lowers every option on every entity (pass C10).
    pub(crate) fn lower_options(&mut self) {
        self.lower_file_options();
        self.lower_type_options();
        self.lower_member_options();
        self.lower_oneof_options();
        self.lower_service_options();
        self.lower_range_options();
        trace!("options lowered: {} message values", self.file.msg_values.len());
    }

    fn lower_file_options(&mut self) {
        let ast = self.ast;
        let scope = self.file.package;
        let mut root = self.file.options;
        for decl in &ast.decls {
            if let ast::Decl::Option(option) = decl {
                self.lower_option_decl(scope, OptionTarget::File, &mut root, option, None);
            }
        }
        self.file.options = root;
    }

    fn lower_type_options(&mut self) {
        for raw in 0..self.file.types.len() as u32 {
            let type_id = Idx::new(raw);
            let scope = self.file.types[type_id].fqn;
            let mut root = self.file.types[type_id].options;
            match self.type_ast[raw as usize] {
                TypeAst::Message(decl) => {
                    for item in &decl.items {
                        if let ast::MessageItem::Option(option) = item {
                            self.lower_option_decl(
                                scope,
                                OptionTarget::Message,
                                &mut root,
                                option,
                                None,
                            );
                        }
                    }
                }
                TypeAst::Enum(decl) => {
                    for option in &decl.options {
                        self.lower_option_decl(scope, OptionTarget::Enum, &mut root, option, None);
                    }
                }
                TypeAst::Group(decl) => {
                    // Group body options apply to the group's message.
                    for item in decl.group_body.as_deref().unwrap_or(&[]) {
                        if let ast::MessageItem::Option(option) = item {
                            self.lower_option_decl(
                                scope,
                                OptionTarget::Message,
                                &mut root,
                                option,
                                None,
                            );
                        }
                    }
                }
                TypeAst::MapEntry => {
                    self.set_map_entry_option(&mut root);
                }
            }
            self.file.types[type_id].options = root;
        }
    }

    /// Synthesized map-entry types carry `map_entry = true` without any
    /// source option.
    fn set_map_entry_option(&mut self, root: &mut Option<MsgValId>) {
        let Some(options_msg) = self.builtins.message_options else {
            return;
        };
        let names_map_entry = self.session.names().map_entry;
        let Some(field) = self.builtin_member(Some(options_msg), names_map_entry) else {
            return;
        };
        let msgval = self.ensure_root(root, Some(options_msg), ast::Span::default());
        // Every map entry sets the identical flag node; share one.
        let value = self.file.values.compress(ValueNode {
            span: ast::Span::default(),
            field: Some(field),
            option_path_span: None,
            payload: Payload::Bits(1),
            ok: true,
        });
        self.msgval_insert(msgval, field, value, ast::Span::default());
    }

    fn lower_member_options(&mut self) {
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let options: &'a [ast::OptionDecl] = match self.member_ast[raw as usize] {
                MemberAst::Field(decl) => &decl.options,
                MemberAst::EnumValue(decl) => &decl.options,
                MemberAst::Synth { .. } => continue,
            };
            if options.is_empty() {
                continue;
            }
            let scope = self.member_scope(member_id);
            let target = match self.file.members[member_id].kind {
                MemberKind::EnumValue => OptionTarget::EnumValue,
                MemberKind::Field | MemberKind::Extension => OptionTarget::Field,
            };
            let mut root = self.file.members[member_id].options;
            for option in options {
                self.lower_option_decl(scope, target, &mut root, option, Some(member_id));
            }
            self.file.members[member_id].options = root;
        }
    }

    fn lower_oneof_options(&mut self) {
        for raw in 0..self.file.oneofs.len() as u32 {
            let oneof_id = Idx::new(raw);
            let Some(decl) = self.oneof_ast[raw as usize] else {
                continue;
            };
            if decl.options.is_empty() {
                continue;
            }
            let scope = self.file.types[self.file.oneofs[oneof_id].parent].fqn;
            let mut root = self.file.oneofs[oneof_id].options;
            for option in &decl.options {
                self.lower_option_decl(scope, OptionTarget::Oneof, &mut root, option, None);
            }
            self.file.oneofs[oneof_id].options = root;
        }
    }

    fn lower_service_options(&mut self) {
        for raw in 0..self.file.services.len() as u32 {
            let service_id = Idx::new(raw);
            let decl = self.service_ast[raw as usize];
            let scope = self.file.services[service_id].fqn;
            let mut root = self.file.services[service_id].options;
            for option in &decl.options {
                self.lower_option_decl(scope, OptionTarget::Service, &mut root, option, None);
            }
            self.file.services[service_id].options = root;
        }
        for raw in 0..self.file.methods.len() as u32 {
            let method_id = Idx::new(raw);
            let decl = self.method_ast[raw as usize];
            let scope = self.file.methods[method_id].fqn;
            let mut root = self.file.methods[method_id].options;
            for option in &decl.options {
                self.lower_option_decl(scope, OptionTarget::Method, &mut root, option, None);
            }
            self.file.methods[method_id].options = root;
        }
    }

    fn lower_range_options(&mut self) {
        for raw in 0..self.file.ranges.len() as u32 {
            let range_id = Idx::new(raw);
            let options = self.range_options_ast[raw as usize];
            if options.is_empty() {
                continue;
            }
            let scope = self.file.types[self.file.ranges[range_id].parent].fqn;
            let mut root = self.file.ranges[range_id].options;
            for option in options {
                self.lower_option_decl(
                    scope,
                    OptionTarget::ExtensionRange,
                    &mut root,
                    option,
                    None,
                );
            }
            self.file.ranges[range_id].options = root;
        }
    }

    /// Lowers one `name = value` option into the entity's tree.
    fn lower_option_decl(
        &mut self,
        scope: Istr,
        target: OptionTarget,
        root: &mut Option<MsgValId>,
        option: &'a ast::OptionDecl,
        member: Option<MemberId>,
    ) {
        if let Some(member_id) = member {
            if self.lower_pseudo_option(scope, member_id, option) {
                return;
            }
        }

        let Some(root_msg) = self.builtins.options_message_for(target) else {
            // descriptor.proto did not define the options message; import
            // errors already explained why.
            return;
        };
        let root_id = self.ensure_root(root, Some(root_msg), option.span);

        let mut current_msgval = root_id;
        let mut current_msg = root_msg;
        let parts = &option.path.parts;
        for (index, part) in parts.iter().enumerate() {
            let Some(field) = self.resolve_option_part(scope, target, current_msg, part) else {
                return;
            };
            let last = index + 1 == parts.len();
            if last {
                let value = self.eval_expr(scope, &option.value, field, true);
                self.file.values[value].option_path_span = Some(option.path.span);
                self.msgval_insert(current_msgval, field, value, part.span());
                return;
            }
            // Intermediate components must be message-typed fields.
            let elem = self.file.elem_of(field);
            let next_msg = match elem {
                ElemType::Named(type_ref) if !self.file.type_node(type_ref).is_enum => type_ref,
                ElemType::None | ElemType::Unresolved => return,
                _ => {
                    let name = self.str(self.file.member_node(field).name);
                    self.emit(
                        Diagnostic::error(format!(
                            "`{}` is not a message-typed option; cannot descend into it",
                            name
                        ))
                        .at(part.span()),
                    );
                    return;
                }
            };
            let Some(next_msgval) =
                self.descend_into(current_msgval, field, next_msg, part.span())
            else {
                return;
            };
            current_msgval = next_msgval;
            current_msg = next_msg;
        }
    }

    /// Resolves one option-path component to a field of `msg`.
    fn resolve_option_part(
        &mut self,
        scope: Istr,
        target: OptionTarget,
        msg: TypeRef,
        part: &'a ast::OptionPathPart,
    ) -> Option<MemberRef> {
        match part {
            ast::OptionPathPart::Simple(ident) => {
                let name = self.intern(&ident.text);
                let found = self.file.member_named(msg, name);
                if found.is_none() {
                    let msg_name = self.str(self.file.type_node(msg).fqn).to_string();
                    self.emit(
                        Diagnostic::error(format!(
                            "`{}` is not a {} option",
                            ident.text,
                            target.describe()
                        ))
                        .at(ident.span)
                        .with_note(format!("no field `{}` on `{}`", ident.text, msg_name)),
                    );
                }
                found
            }
            ast::OptionPathPart::Extension { path, span } => {
                let field = self.resolve_extension(scope, path)?;
                let extendee_matches = self
                    .file
                    .member_node(field)
                    .extend
                    .and_then(|extend| {
                        self.file
                            .dep_file(field.file)
                            .extends[extend]
                            .extendee
                    })
                    .map(|extendee| {
                        // Re-root the extendee reference, which is relative
                        // to the extension's own file, for comparison.
                        let owner = self.file.dep_file(field.file);
                        let node = &owner.types[extendee.idx];
                        (owner.dep_file(extendee.file).path, node.fqn)
                    })
                    == Some(self.canonical_type_key(msg));
                if !extendee_matches {
                    let msg_name = self.str(self.file.type_node(msg).fqn).to_string();
                    self.emit(
                        Diagnostic::error(format!(
                            "extension `{}` does not extend `{}`",
                            path.text(),
                            msg_name
                        ))
                        .at(*span),
                    );
                    return None;
                }
                Some(field)
            }
        }
    }

    /// Finds or creates the nested message value for `field` inside
    /// `parent`, merging with earlier options along the same path.
    fn descend_into(
        &mut self,
        parent: MsgValId,
        field: MemberRef,
        msg: TypeRef,
        span: ast::Span,
    ) -> Option<MsgValId> {
        let member = self.file.member_node(field);
        let key = match member.oneof {
            Some(oneof) => self.file.dep_file(field.file).oneofs[oneof].fqn,
            None => member.fqn,
        };
        if let Some(&existing) = self.file.msg_values[parent].by_key.get(&key) {
            // Deep option paths merge into the value an earlier option
            // created, provided it is a message literal.
            return match self.file.values[existing].payload {
                Payload::Message(msgval) => Some(msgval),
                _ => {
                    let name = self.str(self.file.member_node(field).name);
                    self.emit(
                        Diagnostic::error(format!("`{}` is already set to a non-message value", name))
                            .at(span)
                            .with_snippet(
                                self.file.values[existing].span,
                                "previously set here",
                            ),
                    );
                    None
                }
            };
        }
        let msgval = self
            .file
            .msg_values
            .alloc(MessageValue::new(Some(msg), span));
        let value = self.file.values.alloc(ValueNode {
            span,
            field: Some(field),
            option_path_span: None,
            payload: Payload::Message(msgval),
            ok: true,
        });
        self.msgval_insert(parent, field, value, span);
        Some(msgval)
    }

    fn ensure_root(
        &mut self,
        root: &mut Option<MsgValId>,
        msg: Option<TypeRef>,
        span: ast::Span,
    ) -> MsgValId {
        match *root {
            Some(id) => id,
            None => {
                let id = self.file.msg_values.alloc(MessageValue::new(msg, span));
                *root = Some(id);
                id
            }
        }
    }

    /// Handles `json_name`, `default` and `deprecated` on members.
    /// Returns `true` when the option was consumed as a pseudo-option.
    fn lower_pseudo_option(
        &mut self,
        scope: Istr,
        member_id: MemberId,
        option: &'a ast::OptionDecl,
    ) -> bool {
        let [ast::OptionPathPart::Simple(ident)] = option.path.parts.as_slice() else {
            return false;
        };
        let kind = self.file.members[member_id].kind;
        match ident.text.as_str() {
            "json_name" if kind != MemberKind::EnumValue => {
                match &option.value {
                    ast::Expr::Str { value, .. } => {
                        let id = self.intern(value);
                        let member = &mut self.file.members[member_id];
                        member.json_name = Some(id);
                        member.json_name_span = option.span;
                    }
                    other => {
                        self.emit(
                            Diagnostic::error("`json_name` expects a string literal")
                                .at(other.span()),
                        );
                    }
                }
                true
            }
            "default" if kind != MemberKind::EnumValue => {
                let field = MemberRef {
                    file: crate::file::FileNo::SELF,
                    idx: member_id,
                };
                let value = self.eval_expr(scope, &option.value, field, false);
                self.file.members[member_id].default_value = Some(value);
                true
            }
            "deprecated" => {
                match &option.value {
                    ast::Expr::Path(path) if path.text() == "true" => {
                        self.file.members[member_id].deprecated = true;
                    }
                    ast::Expr::Path(path) if path.text() == "false" => {}
                    other => {
                        self.emit(
                            Diagnostic::error("`deprecated` expects `true` or `false`")
                                .at(other.span()),
                        );
                    }
                }
                true
            }
            _ => false,
        }
    }
}
