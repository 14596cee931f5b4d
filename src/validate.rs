//! The validator catalog.
//!
//! Every check here is independent, span-anchored, and runs after the
//! graph is fully linked and evaluated: unused imports, enum shape,
//! MessageSet rules, oneof shape, presence/packed/ctype/jstype/lazy/
//! utf8/message-encoding constraints, custom defaults, extension
//! declarations, reserved names, visibility, and naming style. A check
//! that cannot see its preconditions (an unresolved type, a failed
//! number) stays quiet; the earlier pass already reported the cause.

use heck::{ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use log::trace;

use crate::arena::Idx;
use crate::ast::Span;
use crate::features::FeatSetId;
use crate::file::SyntaxMode;
use crate::intern::Istr;
use crate::ir::{
    ElemType, MemberId, MemberKind, Presence, RangeId, Scalar, Symbol, TypeId, TypeRef, Visibility,
};
use crate::report::Diagnostic;
use crate::value::{MsgValId, Payload, ValId};
use crate::Lower;

impl<'a> Lower<'a> {
    /// Runs the whole catalog (pass C12).
    pub(crate) fn validate(&mut self) {
        self.check_unused_imports();
        self.check_enums();
        self.check_oneofs();
        self.check_message_sets();
        self.check_groups_and_required();
        self.check_presence_features();
        self.check_packed();
        self.check_field_option_types();
        self.check_encoding_features();
        self.check_defaults();
        self.check_extension_declarations();
        self.check_reserved_names();
        self.check_visibility();
        self.check_naming_style();
        trace!("validation complete");
    }

    /// Warns for direct imports nothing resolved through. Public imports
    /// are re-exports and stay silent.
    fn check_unused_imports(&mut self) {
        let unused: Vec<(Istr, Span)> = self
            .file
            .deps
            .iter()
            .filter(|dep| dep.direct && !dep.public && !dep.weak && !dep.is_used())
            .map(|dep| (dep.path, dep.span))
            .collect();
        for (path, span) in unused {
            let path = self.str(path);
            self.emit(
                Diagnostic::warning(format!("import {:?} is never used", path))
                    .at(span)
                    .with_edit(span, "", "delete it"),
            );
        }
    }

    fn check_enums(&mut self) {
        let names = self.session.names();
        let (enum_type_name, open_name) = (names.enum_type, names.open);
        for raw in 0..self.file.types.len() as u32 {
            let type_id: TypeId = Idx::new(raw);
            let node = &self.file.types[type_id];
            if !node.is_enum {
                continue;
            }
            let name_span = node.name_span;
            let first = node.members.first().copied();
            let features = node.features;
            if first.is_none() {
                self.emit(
                    Diagnostic::error("enums must have at least one value").at(name_span),
                );
                continue;
            }
            // Open enums decode unknown numbers into the zero value, so
            // the first declared value must be zero.
            let open = self.feature_is(features, enum_type_name, open_name);
            if let Some(first) = first {
                let number = self.file.members[first].number;
                let number_span = self.file.members[first].number_span;
                if open && number != 0 {
                    self.emit(
                        Diagnostic::error("first value of open enum must be zero")
                            .at(number_span)
                            .with_snippet(self.file.syntax_span, "the enum is open under this syntax")
                            .with_help("add a zero value, or make the enum closed"),
                    );
                }
            }
        }
    }

    fn check_oneofs(&mut self) {
        for raw in 0..self.file.oneofs.len() as u32 {
            let oneof_id = Idx::new(raw);
            if self.file.oneofs[oneof_id].members.is_empty() {
                let span = self.file.oneofs[oneof_id].name_span;
                self.emit(
                    Diagnostic::error("oneofs must have at least one member").at(span),
                );
            }
        }
    }

    /// `message_set_wire_format` rules, both on the message itself and on
    /// extensions of MessageSet messages.
    fn check_message_sets(&mut self) {
        let message_set_name = self.session.names().message_set_wire_format;
        for raw in 0..self.file.types.len() as u32 {
            let type_id: TypeId = Idx::new(raw);
            let node = &self.file.types[type_id];
            if node.is_enum {
                continue;
            }
            let options = node.options;
            let name_span = node.name_span;
            if self.file.option_bool(options, message_set_name) != Some(true) {
                continue;
            }
            if self.file.syntax == SyntaxMode::Proto3 {
                self.emit(
                    Diagnostic::error("MessageSet wire format is not supported in proto3")
                        .at(name_span),
                );
                continue;
            }
            let node = &self.file.types[type_id];
            let has_fields = !node.fields().is_empty();
            let has_oneofs = !node.oneofs.is_empty();
            let has_extn_ranges = !node.extension_ranges().is_empty();
            if has_fields || has_oneofs {
                self.emit(
                    Diagnostic::error("a MessageSet may not declare fields or oneofs")
                        .at(name_span),
                );
            } else if !has_extn_ranges {
                self.emit(
                    Diagnostic::error("a MessageSet requires at least one extension range")
                        .at(name_span),
                );
            } else {
                self.emit(
                    Diagnostic::warning("MessageSet wire format is deprecated").at(name_span),
                );
            }
        }

        // Extensions of a MessageSet must be singular messages.
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            if self.file.members[member_id].kind != MemberKind::Extension {
                continue;
            }
            let Some(extendee) = self.extension_extendee(member_id) else {
                continue;
            };
            let owner = self.file.dep_file(extendee.file);
            let extendee_options = owner.types[extendee.idx].options;
            if owner.option_bool(extendee_options, message_set_name) != Some(true) {
                continue;
            }
            let member = &self.file.members[member_id];
            let singular_message = member.presence != Presence::Repeated
                && matches!(member.elem, ElemType::Named(t) if !self.file.type_node(t).is_enum);
            if !singular_message {
                let span = member.type_span;
                self.emit(
                    Diagnostic::error(
                        "extensions of a MessageSet must be singular message-typed fields",
                    )
                    .at(span),
                );
            }
        }
    }

    /// Groups only exist in proto2; `required` only outside proto3 and
    /// editions.
    fn check_groups_and_required(&mut self) {
        let syntax = self.file.syntax;
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            let (is_group, label, span) = (member.is_group, member.label, member.span);
            if is_group && syntax != SyntaxMode::Proto2 {
                self.emit(
                    Diagnostic::error("group fields are only supported in proto2")
                        .at(span)
                        .with_help(
                            "use a nested message with `features.message_encoding = DELIMITED` instead",
                        ),
                );
            }
            if let Some(label) = label {
                if label.kind == crate::ast::LabelKind::Required
                    && syntax != SyntaxMode::Proto2
                {
                    self.emit(
                        Diagnostic::error("`required` fields are not supported here")
                            .at(label.span)
                            .with_help(
                                "use `features.field_presence = LEGACY_REQUIRED` in editions, or drop the label",
                            ),
                    );
                }
            }
        }
    }

    /// Constraints on explicitly-set `field_presence` features.
    fn check_presence_features(&mut self) {
        let names = self.session.names();
        let (presence_name, explicit_name, implicit_name, required_name) = (
            names.field_presence,
            names.explicit,
            names.implicit,
            names.legacy_required,
        );
        let explicit_number = self.feature_value_named(presence_name, explicit_name);
        let implicit_number = self.feature_value_named(presence_name, implicit_name);
        let required_number = self.feature_value_named(presence_name, required_name);

        // File-level default may not be LEGACY_REQUIRED.
        if let Some((number, span)) = self.explicit_feature_entry(self.file.features, presence_name)
        {
            if Some(number) == required_number {
                self.emit(
                    Diagnostic::error(
                        "`LEGACY_REQUIRED` may not be set as a file-wide presence default",
                    )
                    .at(span),
                );
            }
        }

        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            if member.kind == MemberKind::EnumValue {
                continue;
            }
            let features = member.features;
            let Some((number, span)) = self.explicit_feature_entry(features, presence_name) else {
                continue;
            };
            let member = &self.file.members[member_id];
            let (kind, presence, oneof, elem) =
                (member.kind, member.presence, member.oneof, member.elem);

            if Some(number) == explicit_number || Some(number) == required_number {
                let singular = presence != Presence::Repeated;
                if !singular || oneof.is_some() || kind == MemberKind::Extension {
                    self.emit(
                        Diagnostic::error(
                            "explicit presence can only be set on singular fields outside oneofs and extensions",
                        )
                        .at(span),
                    );
                }
            }
            if Some(number) == implicit_number {
                if matches!(elem, ElemType::Named(t) if !self.file.type_node(t).is_enum) {
                    self.emit(
                        Diagnostic::error(
                            "`IMPLICIT` presence is not allowed on message-typed fields",
                        )
                        .at(span),
                    );
                }
            }
            if Some(number) == required_number {
                self.emit(
                    Diagnostic::warning("`LEGACY_REQUIRED` presence is deprecated").at(span),
                );
            }
        }
    }

    /// `[packed = ...]`: repeated packable fields only; under editions the
    /// option is superseded by `features.repeated_field_encoding`.
    fn check_packed(&mut self) {
        let names = self.session.names();
        let packed_name = names.packed;
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let options = self.file.members[member_id].options;
            let Some(value_id) = self.file.option_value(options, packed_name) else {
                continue;
            };
            let value = self.file.values[value_id];
            let span = value
                .option_path_span
                .map(|s| s.join(value.span))
                .unwrap_or(value.span);
            let member = &self.file.members[member_id];
            let packable = member.presence == Presence::Repeated
                && matches!(member.elem, ElemType::Scalar(s) if s.is_packable())
                || matches!(member.elem, ElemType::Named(t)
                    if member.presence == Presence::Repeated && self.file.type_node(t).is_enum);
            if !packable {
                self.emit(
                    Diagnostic::error(
                        "`packed` is only allowed on repeated fields of numeric, bool, or enum type",
                    )
                    .at(span),
                );
                continue;
            }
            if self.file.syntax.is_editions() {
                let replacement = if value.as_bool() == Some(false) {
                    "features.repeated_field_encoding = EXPANDED"
                } else {
                    "features.repeated_field_encoding = PACKED"
                };
                self.emit(
                    Diagnostic::warning("the `packed` option is not used in editions")
                        .at(span)
                        .with_edit(span, replacement, "use the repeated-field-encoding feature"),
                );
            }
        }
    }

    /// Type constraints for `ctype`, `jstype`, and the lazy options.
    fn check_field_option_types(&mut self) {
        let names = self.session.names();
        let (ctype_name, jstype_name, lazy_name, unverified_lazy_name) =
            (names.ctype, names.jstype, names.lazy, names.unverified_lazy);
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let options = self.file.members[member_id].options;
            let elem = self.file.members[member_id].elem;

            if let Some(value_id) = self.file.option_value(options, ctype_name) {
                let span = self.option_span(value_id);
                let stringish = matches!(
                    elem,
                    ElemType::Scalar(Scalar::String) | ElemType::Scalar(Scalar::Bytes)
                );
                if !stringish {
                    self.emit(
                        Diagnostic::error("`ctype` is only allowed on string and bytes fields")
                            .at(span),
                    );
                } else if self.file.edition() >= crate::file::Edition::Edition2023 {
                    self.emit(
                        Diagnostic::warning("`ctype` is superseded in editions")
                            .at(span)
                            .with_help("use the `features.(pb.cpp).string_type` feature instead"),
                    );
                }
            }

            if let Some(value_id) = self.file.option_value(options, jstype_name) {
                let span = self.option_span(value_id);
                let sixty_four = matches!(elem, ElemType::Scalar(s) if s.is_integer() && s.is_64bit());
                if !sixty_four {
                    self.emit(
                        Diagnostic::error("`jstype` is only allowed on 64-bit integer fields")
                            .at(span),
                    );
                }
            }

            for lazy in [lazy_name, unverified_lazy_name] {
                let Some(value_id) = self.file.option_value(options, lazy) else {
                    continue;
                };
                let span = self.option_span(value_id);
                let message_typed =
                    matches!(elem, ElemType::Named(t) if !self.file.type_node(t).is_enum);
                if !message_typed {
                    self.emit(
                        Diagnostic::error("lazy parsing options require a message-typed field")
                            .at(span),
                    );
                }
            }
        }
    }

    /// Explicit `utf8_validation` and `message_encoding` features must
    /// match their field's type.
    fn check_encoding_features(&mut self) {
        let names = self.session.names();
        let (utf8_name, encoding_name, delimited_name) = (
            names.utf8_validation,
            names.message_encoding,
            names.delimited,
        );
        let delimited_number = self.feature_value_named(encoding_name, delimited_name);

        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            if member.kind == MemberKind::EnumValue {
                continue;
            }
            let (features, elem) = (member.features, member.elem);

            if let Some((_, span)) = self.explicit_feature_entry(features, utf8_name) {
                if elem != ElemType::Scalar(Scalar::String) {
                    self.emit(
                        Diagnostic::error(
                            "`utf8_validation` can only be set on string fields",
                        )
                        .at(span),
                    );
                }
            }

            if let Some((number, span)) = self.explicit_feature_entry(features, encoding_name) {
                if Some(number) == delimited_number {
                    let valid = match elem {
                        ElemType::Named(t) => {
                            let node = self.file.type_node(t);
                            !node.is_enum && node.map_entry_of.is_none()
                        }
                        _ => false,
                    };
                    if !valid {
                        self.emit(
                            Diagnostic::error(
                                "`DELIMITED` encoding requires a non-map message field",
                            )
                            .at(span),
                        );
                    }
                }
            }
        }
    }

    /// Custom `default` pseudo-option constraints, including the
    /// redundant-zero warning.
    fn check_defaults(&mut self) {
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            let Some(default_value) = member.default_value else {
                continue;
            };
            let (presence, elem) = (member.presence, member.elem);
            let value = self.file.values[default_value];

            if self.file.syntax == SyntaxMode::Proto3 {
                self.emit(
                    Diagnostic::error("custom default values are not supported in proto3")
                        .at(value.span),
                );
                continue;
            }
            if presence == Presence::Repeated {
                self.emit(
                    Diagnostic::error("repeated fields cannot have a custom default")
                        .at(value.span),
                );
                continue;
            }
            if matches!(elem, ElemType::Named(t) if !self.file.type_node(t).is_enum) {
                self.emit(
                    Diagnostic::error("message fields cannot have a custom default")
                        .at(value.span),
                );
                continue;
            }
            if value.ok && self.is_zero_value(&value.payload, elem) {
                self.emit(
                    Diagnostic::warning("redundant custom default")
                        .at(value.span)
                        .with_note("this is already the field's default value"),
                );
            }
        }
    }

    fn is_zero_value(&self, payload: &Payload, elem: ElemType) -> bool {
        match payload {
            Payload::Bits(bits) => match elem {
                // -0.0 and 0.0 are distinct defaults for floats.
                ElemType::Scalar(s) if s.is_float() => *bits == 0,
                _ => *bits == 0,
            },
            Payload::Str(id) => id.is_empty(),
            Payload::Message(_) | Payload::Array(_) => false,
        }
    }

    /// Extension declaration checking: declarations must be well-formed,
    /// and extensions must agree with the declaration for their number.
    fn check_extension_declarations(&mut self) {
        let names = self.session.names();
        let (declaration_name, verification_name, unverified_name) =
            (names.declaration, names.verification, names.unverified);

        for raw in 0..self.file.ranges.len() as u32 {
            let range_id: RangeId = Idx::new(raw);
            let range = &self.file.ranges[range_id];
            if range.kind != crate::ir::RangeKind::Extension || range.options.is_none() {
                continue;
            }
            let (options, start, end, ok, span) =
                (range.options, range.start, range.end, range.ok, range.span);
            let declarations = self.declaration_entries(options, declaration_name);

            // Explicit UNVERIFIED with declarations present is contradictory.
            if let Some(verification_id) = self.file.option_value(options, verification_name) {
                let number = self.file.values[verification_id].as_i64();
                let unverified = self
                    .verification_value_number(unverified_name)
                    .is_some_and(|n| Some(n) == number);
                if unverified && !declarations.is_empty() {
                    self.emit(
                        Diagnostic::error(
                            "`verification = UNVERIFIED` cannot be combined with declarations",
                        )
                        .at(self.option_span(verification_id)),
                    );
                }
            }

            for declaration in declarations {
                self.check_one_declaration(declaration, start, end, ok, span);
            }
        }

        self.check_extensions_against_declarations();
    }

    /// The `declaration` entries of an extension range's options.
    fn declaration_entries(
        &self,
        options: Option<MsgValId>,
        declaration_name: Istr,
    ) -> Vec<MsgValId> {
        let Some(value_id) = self.file.option_value(options, declaration_name) else {
            return Vec::new();
        };
        match self.file.values[value_id].payload {
            Payload::Message(id) => vec![id],
            Payload::Array(array) => self.file.arrays[array]
                .elems
                .iter()
                .filter_map(|&elem| match self.file.values[elem].payload {
                    Payload::Message(id) => Some(id),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn check_one_declaration(
        &mut self,
        declaration: MsgValId,
        start: i64,
        end: i64,
        range_ok: bool,
        range_span: Span,
    ) {
        let names = self.session.names();
        let (number_name, full_name_name, type_name_name, reserved_name) =
            (names.number, names.full_name, names.type_name, names.reserved);
        let decl_span = self.file.msg_values[declaration].span;

        let number = self
            .declaration_field(declaration, number_name)
            .and_then(|v| self.file.values[v].as_i64());
        if let Some(number) = number {
            if range_ok && (number < start || number >= end) {
                self.emit(
                    Diagnostic::error(format!(
                        "declared number {} is outside the extension range",
                        number
                    ))
                    .at(decl_span)
                    .with_snippet(range_span, "the range declared here"),
                );
            }
        } else {
            self.emit(
                Diagnostic::error("an extension declaration requires a `number`").at(decl_span),
            );
        }

        let reserved = self
            .declaration_field(declaration, reserved_name)
            .and_then(|v| self.file.values[v].as_bool())
            .unwrap_or(false);

        let full_name = self
            .declaration_field(declaration, full_name_name)
            .and_then(|v| self.file.values[v].as_str_id());
        match full_name {
            Some(id) => {
                let text = self.str(id).to_string();
                if !is_absolute_name(&text) {
                    self.emit(
                        Diagnostic::error(format!(
                            "declared name `{}` must be absolute and dot-separated",
                            text
                        ))
                        .at(decl_span)
                        .with_help("write it with a leading dot, like `.pkg.my_extension`"),
                    );
                }
            }
            None if !reserved => {
                self.emit(
                    Diagnostic::error("an extension declaration requires a `full_name`")
                        .at(decl_span),
                );
            }
            None => {}
        }

        let type_text = self
            .declaration_field(declaration, type_name_name)
            .and_then(|v| self.file.values[v].as_str_id());
        match type_text {
            Some(id) => {
                let text = self.str(id).to_string();
                if reserved {
                    self.emit(
                        Diagnostic::error(
                            "a reserved declaration may not carry a `type`",
                        )
                        .at(decl_span),
                    );
                } else if !self.declared_type_resolves(&text) {
                    self.emit(
                        Diagnostic::error(format!(
                            "declared type `{}` is neither a known type nor a predeclared scalar",
                            text
                        ))
                        .at(decl_span),
                    );
                }
            }
            None if !reserved => {
                self.emit(
                    Diagnostic::error("an extension declaration requires a `type`").at(decl_span),
                );
            }
            None => {}
        }
    }

    fn declaration_field(&self, declaration: MsgValId, name: Istr) -> Option<ValId> {
        let msg = self.file.msg_values[declaration].msg?;
        let field = self.file.member_named(msg, name)?;
        let key = self.file.member_node(field).fqn;
        self.file.msg_values[declaration].by_key.get(&key).copied()
    }

    /// Declared types are either predeclared scalars or absolute FQNs of
    /// messages or enums visible here.
    fn declared_type_resolves(&self, text: &str) -> bool {
        if Scalar::from_name(text).is_some() {
            return true;
        }
        let Some(stripped) = text.strip_prefix('.') else {
            return false;
        };
        let fqn = self.session.intern(stripped);
        self.file
            .merged
            .lookup(fqn)
            .iter()
            .any(|entry| matches!(entry.sym, Symbol::Message(_) | Symbol::Enum(_)))
    }

    /// For every extension in this file: if the extendee range carrying its
    /// number uses declarations, the declaration must exist and agree.
    fn check_extensions_against_declarations(&mut self) {
        let names = self.session.names();
        let (declaration_name, number_name, full_name_name, type_name_name, repeated_name, reserved_name) = (
            names.declaration,
            names.number,
            names.full_name,
            names.type_name,
            names.repeated,
            names.reserved,
        );

        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            if member.kind != MemberKind::Extension || member.number == 0 {
                continue;
            }
            let number = member.number;
            let number_span = member.number_span;
            let Some(extendee) = self.extension_extendee(member_id) else {
                continue;
            };

            // Everything the extendee's file knows is copied out before
            // any diagnostics are emitted, because the extendee may live
            // in a dep and the borrow would otherwise pin `self`.
            struct Declared {
                reserved: bool,
                full_name: Option<String>,
                type_text: Option<String>,
                repeated: bool,
            }
            let mut range_declared = false;
            let mut declared: Option<Declared> = None;
            {
                let owner = self.file.dep_file(extendee.file);
                let extendee_node = &owner.types[extendee.idx];
                'ranges: for &range_id in extendee_node.extension_ranges() {
                    let range = &owner.ranges[range_id];
                    if !range.ok || number < range.start || number >= range.end {
                        continue;
                    }
                    let Some(decl_value) = owner.option_value(range.options, declaration_name)
                    else {
                        continue;
                    };
                    range_declared = true;
                    let entries: Vec<MsgValId> = match owner.values[decl_value].payload {
                        Payload::Message(id) => vec![id],
                        Payload::Array(array) => owner.arrays[array]
                            .elems
                            .iter()
                            .filter_map(|&e| match owner.values[e].payload {
                                Payload::Message(id) => Some(id),
                                _ => None,
                            })
                            .collect(),
                        _ => Vec::new(),
                    };
                    for entry in entries {
                        let declared_number = owner
                            .option_value_in_msgval(entry, number_name)
                            .and_then(|v| owner.values[v].as_i64());
                        if declared_number == Some(number) {
                            declared = Some(Declared {
                                reserved: owner
                                    .option_value_in_msgval(entry, reserved_name)
                                    .and_then(|v| owner.values[v].as_bool())
                                    .unwrap_or(false),
                                full_name: owner
                                    .option_value_in_msgval(entry, full_name_name)
                                    .and_then(|v| owner.values[v].as_str_id())
                                    .map(|id| owner.session.str(id).to_string()),
                                type_text: owner
                                    .option_value_in_msgval(entry, type_name_name)
                                    .and_then(|v| owner.values[v].as_str_id())
                                    .map(|id| owner.session.str(id).to_string()),
                                repeated: owner
                                    .option_value_in_msgval(entry, repeated_name)
                                    .and_then(|v| owner.values[v].as_bool())
                                    .unwrap_or(false),
                            });
                            break 'ranges;
                        }
                    }
                    break;
                }
            }

            if !range_declared {
                continue;
            }
            let Some(declared) = declared else {
                self.emit(
                    Diagnostic::error(format!(
                        "extension number {} has no declaration in the extendee's extension range",
                        number
                    ))
                    .at(number_span)
                    .with_help("add a `declaration` entry for this number, or reserve it"),
                );
                continue;
            };

            if declared.reserved {
                self.emit(
                    Diagnostic::error(format!(
                        "extension number {} is reserved by the extendee's declarations",
                        number
                    ))
                    .at(number_span),
                );
                continue;
            }

            let actual_name = format!(".{}", self.str(self.file.members[member_id].fqn));
            if let Some(declared_name) = declared.full_name {
                if declared_name != actual_name {
                    let name_span = self.file.members[member_id].name_span;
                    self.emit(
                        Diagnostic::error(format!(
                            "extension is declared as `{}` but defined as `{}`",
                            declared_name, actual_name
                        ))
                        .at(name_span),
                    );
                }
            }

            let actual_type = self.elem_type_text(self.file.members[member_id].elem);
            if let (Some(declared_type), Some(actual_type)) = (declared.type_text, actual_type) {
                if declared_type != actual_type {
                    let type_span = self.file.members[member_id].type_span;
                    self.emit(
                        Diagnostic::error(format!(
                            "extension is declared with type `{}` but defined with type `{}`",
                            declared_type, actual_type
                        ))
                        .at(type_span),
                    );
                }
            }

            let actually_repeated = self.file.members[member_id].presence == Presence::Repeated;
            if declared.repeated != actually_repeated {
                let span = self.file.members[member_id].span;
                self.emit(
                    Diagnostic::error(format!(
                        "extension is declared {} but defined {}",
                        if declared.repeated { "repeated" } else { "singular" },
                        if actually_repeated { "repeated" } else { "singular" },
                    ))
                    .at(span),
                );
            }
        }
    }

    /// The canonical textual type of a member, matching declaration `type`
    /// strings: a scalar name, or a dot-prefixed FQN.
    fn elem_type_text(&self, elem: ElemType) -> Option<String> {
        match elem {
            ElemType::Scalar(scalar) => Some(scalar.name().to_owned()),
            ElemType::Named(type_ref) => {
                Some(format!(".{}", self.str(self.file.type_node(type_ref).fqn)))
            }
            ElemType::None | ElemType::Unresolved => None,
        }
    }

    fn check_reserved_names(&mut self) {
        for raw in 0..self.file.types.len() as u32 {
            let type_id: TypeId = Idx::new(raw);
            let reserved = self.file.types[type_id].reserved_names.clone();
            if reserved.is_empty() {
                continue;
            }
            let members = self.file.types[type_id].fields().to_vec();
            for member_id in members {
                let name = self.file.members[member_id].name;
                let Some(entry) = reserved.iter().find(|r| r.name == name) else {
                    continue;
                };
                let name_text = self.str(name);
                let name_span = self.file.members[member_id].name_span;
                self.emit(
                    Diagnostic::error(format!("the name `{}` is reserved", name_text))
                        .at(name_span)
                        .with_snippet(entry.span, "reserved here"),
                );
            }
        }
    }

    /// Editions 2024 visibility: modifiers need the edition, and only
    /// top-level types may be exported under the strict rule.
    fn check_visibility(&mut self) {
        for raw in 0..self.file.types.len() as u32 {
            let type_id: TypeId = Idx::new(raw);
            let node = &self.file.types[type_id];
            if node.visibility == Visibility::Default {
                continue;
            }
            let (visibility, span, nested) =
                (node.visibility, node.visibility_span, node.parent.is_some());
            if self.file.edition() < crate::file::Edition::Edition2024 {
                self.emit(
                    Diagnostic::error("visibility modifiers require edition 2024").at(span),
                );
                continue;
            }
            if nested && visibility == Visibility::Export {
                self.emit(
                    Diagnostic::error("only top-level types may be exported")
                        .at(span)
                        .with_help("nested types are visible exactly when their container is"),
                );
            }
        }
    }

    /// STYLE2024 naming enforcement, gated on the
    /// `enforce_naming_style` feature.
    fn check_naming_style(&mut self) {
        let names = self.session.names();
        let (style_name, style2024_name) = (names.enforce_naming_style, names.style2024);
        if !self.feature_is(self.file.features, style_name, style2024_name) {
            return;
        }

        if !self.file.package.is_empty() {
            let package = self.str(self.file.package).to_string();
            let bad = package
                .split('.')
                .any(|part| part.is_empty() || part != part.to_snake_case());
            if bad {
                self.emit(
                    Diagnostic::error("package names must be lower_snake_case, dot-separated")
                        .at(self.file.package_span),
                );
            }
        }

        for raw in 0..self.file.types.len() as u32 {
            let type_id: TypeId = Idx::new(raw);
            let node = &self.file.types[type_id];
            if node.map_entry_of.is_some() {
                continue;
            }
            let (name, span) = (node.name, node.name_span);
            self.require_style(name, span, StyleCase::Pascal, "type names");
        }
        for raw in 0..self.file.services.len() as u32 {
            let id = Idx::new(raw);
            let (name, span) = {
                let node = &self.file.services[id];
                (node.name, node.name_span)
            };
            self.require_style(name, span, StyleCase::Pascal, "service names");
        }
        for raw in 0..self.file.methods.len() as u32 {
            let id = Idx::new(raw);
            let (name, span) = {
                let node = &self.file.methods[id];
                (node.name, node.name_span)
            };
            self.require_style(name, span, StyleCase::Pascal, "method names");
        }
        for raw in 0..self.file.oneofs.len() as u32 {
            let id = Idx::new(raw);
            let (name, span) = {
                let node = &self.file.oneofs[id];
                (node.name, node.name_span)
            };
            self.require_style(name, span, StyleCase::Snake, "oneof names");
        }
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            let (name, span, kind) = (member.name, member.name_span, member.kind);
            match kind {
                MemberKind::EnumValue => {
                    self.require_style(name, span, StyleCase::Shouty, "enum value names")
                }
                MemberKind::Field | MemberKind::Extension => {
                    self.require_style(name, span, StyleCase::Snake, "field names")
                }
            }
        }
    }

    fn require_style(&mut self, name: Istr, span: Span, case: StyleCase, what: &str) {
        if span.is_empty() {
            return;
        }
        let text = self.str(name).to_string();
        let (conforming, expected) = match case {
            StyleCase::Pascal => (text == text.to_upper_camel_case(), "PascalCase"),
            StyleCase::Snake => (text == text.to_snake_case(), "lower_snake_case"),
            StyleCase::Shouty => (text == text.to_shouty_snake_case(), "SCREAMING_SNAKE_CASE"),
        };
        if !conforming {
            let fixed = match case {
                StyleCase::Pascal => text.to_upper_camel_case(),
                StyleCase::Snake => text.to_snake_case(),
                StyleCase::Shouty => text.to_shouty_snake_case(),
            };
            self.emit(
                Diagnostic::error(format!("{} must be {}", what, expected))
                    .at(span)
                    .with_edit(span, fixed, "rename it"),
            );
        }
    }

    // Shared helpers.

    /// The extendee of an extension member, if resolution succeeded.
    fn extension_extendee(&self, member_id: MemberId) -> Option<TypeRef> {
        let extend = self.file.members[member_id].extend?;
        self.file.extends[extend].extendee
    }

    /// The value and span of a feature explicitly set at a scope's own
    /// options (not inherited).
    fn explicit_feature_entry(
        &self,
        set: Option<FeatSetId>,
        field_name: Istr,
    ) -> Option<(i64, Span)> {
        let set = set?;
        let options = self.file.feature_sets[set].options?;
        let feature = self.builtin_member(self.builtins.feature_set, field_name)?;
        let key = self.file.member_node(feature).fqn;
        let &value_id = self.file.msg_values[options].by_key.get(&key)?;
        let value = &self.file.values[value_id];
        Some((value.as_i64()?, value.span))
    }

    /// The enum number of `value_name` within a feature field's enum type.
    fn feature_value_named(&self, field_name: Istr, value_name: Istr) -> Option<i64> {
        let feature = self.builtin_member(self.builtins.feature_set, field_name)?;
        let enum_ref = match self.file.elem_of(feature) {
            ElemType::Named(type_ref) => type_ref,
            _ => return None,
        };
        self.enum_value_number(enum_ref, value_name)
    }

    /// The number of a `VerificationState` enum value, resolved through
    /// the `verification` field of `ExtensionRangeOptions`.
    fn verification_value_number(&self, value_name: Istr) -> Option<i64> {
        let verification = self.session.names().verification;
        let field = self.builtin_member(self.builtins.extension_range_options, verification)?;
        let enum_ref = match self.file.elem_of(field) {
            ElemType::Named(type_ref) => type_ref,
            _ => return None,
        };
        self.enum_value_number(enum_ref, value_name)
    }

    /// The display span of an option value: path plus value when known.
    fn option_span(&self, value_id: ValId) -> Span {
        let value = &self.file.values[value_id];
        value
            .option_path_span
            .map(|s| s.join(value.span))
            .unwrap_or(value.span)
    }
}

/// `.pkg.name` shape: leading dot, non-empty identifier components.
fn is_absolute_name(text: &str) -> bool {
    let Some(rest) = text.strip_prefix('.') else {
        return false;
    };
    !rest.is_empty()
        && rest.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .enumerate()
                    .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
        })
}

#[derive(Clone, Copy)]
enum StyleCase {
    Pascal,
    Snake,
    Shouty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_names() {
        assert!(is_absolute_name(".pkg.ext"));
        assert!(is_absolute_name(".ext_1"));
        assert!(!is_absolute_name("pkg.ext"));
        assert!(!is_absolute_name("."));
        assert!(!is_absolute_name(".pkg..ext"));
        assert!(!is_absolute_name(".1pkg"));
    }
}
