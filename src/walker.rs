//! The AST walker: builds the skeletal IR graph.
//!
//! One recursive traversal over the parsed declarations, creating types,
//! members, oneofs, extend blocks, services and methods with their names,
//! FQNs and structural links. The walker performs no name resolution and no
//! constant evaluation; every cross-reference it cannot know yet is left
//! `Unresolved` for later passes.

use log::trace;

use crate::ast;
use crate::intern::Istr;
use crate::ir::{
    ElemType, ExtendId, ExtendNode, MemberId, MemberKind, MemberNode, MethodNode, OneofId,
    OneofNode, Presence, RangeId, RangeKind, RangeNode, ReservedName, ServiceNode, Symbol, TypeId,
    TypeNode, TypeRef, Visibility,
};
use crate::file::{FileNo, SyntaxMode};
use crate::{Lower, MemberAst, TypeAst};

impl<'a> Lower<'a> {
    /// Builds the structural graph from the AST (pass C3).
    pub(crate) fn walk_ast(&mut self) {
        self.setup_package();

        // The AST reference is copied out of `self` so the loop can call
        // `&mut self` methods while iterating it.
        let ast = self.ast;
        for decl in &ast.decls {
            match decl {
                ast::Decl::Message(message) => {
                    let id = self.walk_message(None, self.file.package, message);
                    self.file.top_types.push(id);
                }
                ast::Decl::Enum(decl) => {
                    let id = self.walk_enum(None, self.file.package, decl);
                    self.file.top_types.push(id);
                }
                ast::Decl::Extend(decl) => {
                    let id = self.walk_extend(None, self.file.package, decl);
                    self.file.top_extends.push(id);
                }
                ast::Decl::Service(decl) => {
                    let id = self.walk_service(self.file.package, decl);
                    self.file.top_services.push(id);
                }
                // File options lower in the option pass.
                ast::Decl::Option(_) => {}
            }
        }
        trace!(
            "walked {} top-level types, {} extend blocks, {} services",
            self.file.top_types.len(),
            self.file.top_extends.len(),
            self.file.top_services.len(),
        );
    }

    fn setup_package(&mut self) {
        let ast = self.ast;
        let Some(package) = &ast.package else {
            return;
        };
        self.file.package_span = package.span;
        let dotted = package.path.text();
        self.file.package = self.intern(&dotted);

        // Every package prefix is a symbol: `package a.b.c` declares the
        // packages `a`, `a.b`, and `a.b.c`.
        let mut prefix = String::new();
        for segment in &package.path.segments {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(&segment.text);
            let id = self.intern(&prefix);
            self.file.symtab.insert(id, Symbol::Package);
        }
    }

    /// Joins a scope FQN and a simple name.
    pub(crate) fn join_fqn(&self, scope: Istr, name: &str) -> Istr {
        if scope.is_empty() {
            self.intern(name)
        } else {
            let scope = self.str(scope);
            self.intern(&format!("{}.{}", scope, name))
        }
    }

    fn visibility(decl: Option<&ast::VisibilityDecl>) -> (Visibility, ast::Span) {
        match decl {
            None => (Visibility::Default, ast::Span::default()),
            Some(v) if v.export => (Visibility::Export, v.span),
            Some(v) => (Visibility::Local, v.span),
        }
    }

    fn walk_message(
        &mut self,
        parent: Option<TypeId>,
        scope: Istr,
        decl: &'a ast::MessageDecl,
    ) -> TypeId {
        let name = self.intern(&decl.name.text);
        let fqn = self.join_fqn(scope, &decl.name.text);
        let (visibility, visibility_span) = Self::visibility(decl.visibility.as_ref());

        let mut node = TypeNode::new(name, fqn, false, parent);
        node.span = decl.span;
        node.name_span = decl.name.span;
        node.visibility = visibility;
        node.visibility_span = visibility_span;
        let id = self.alloc_type(node, TypeAst::Message(decl));
        self.file.symtab.insert(fqn, Symbol::Message(id));

        self.walk_message_items(id, fqn, &decl.items);
        id
    }

    /// Walks a message body (shared by messages and group bodies).
    ///
    /// Two sub-passes keep the member invariant: fields first, then the
    /// extensions declared in nested `extend` blocks, with `extns_start`
    /// separating them. Ranges likewise collect reserved before extension
    /// ranges, split by `ranges_extn_start`.
    fn walk_message_items(&mut self, id: TypeId, fqn: Istr, items: &'a [ast::MessageItem]) {
        let mut reserved_ranges = Vec::new();
        let mut extension_ranges = Vec::new();

        for item in items {
            match item {
                ast::MessageItem::Field(field) => {
                    let member = self.walk_field(Some(id), fqn, None, field, MemberKind::Field);
                    self.file.types[id].members.push(member);
                }
                ast::MessageItem::Oneof(oneof) => self.walk_oneof(id, fqn, oneof),
                ast::MessageItem::Message(nested) => {
                    let nested_id = self.walk_message(Some(id), fqn, nested);
                    self.file.types[id].nested.push(nested_id);
                }
                ast::MessageItem::Enum(nested) => {
                    let nested_id = self.walk_enum(Some(id), fqn, nested);
                    self.file.types[id].nested.push(nested_id);
                }
                ast::MessageItem::Reserved(reserved) => {
                    self.walk_reserved(id, reserved, &mut reserved_ranges);
                }
                ast::MessageItem::Extensions(extensions) => {
                    for range in &extensions.ranges {
                        let range_id =
                            self.alloc_range(id, RangeKind::Extension, range, &extensions.options);
                        extension_ranges.push(range_id);
                    }
                }
                ast::MessageItem::Extend(_) | ast::MessageItem::Option(_) => {}
            }
        }

        self.file.types[id].extns_start = self.file.types[id].members.len();
        for item in items {
            if let ast::MessageItem::Extend(extend) = item {
                let extend_id = self.walk_extend(Some(id), fqn, extend);
                let members = self.file.extends[extend_id].members.clone();
                self.file.types[id].members.extend(members);
            }
        }

        self.file.types[id].ranges_extn_start = reserved_ranges.len();
        let mut ranges = reserved_ranges;
        ranges.append(&mut extension_ranges);
        self.file.types[id].ranges = ranges;
    }

    fn walk_enum(&mut self, parent: Option<TypeId>, scope: Istr, decl: &'a ast::EnumDecl) -> TypeId {
        let name = self.intern(&decl.name.text);
        let fqn = self.join_fqn(scope, &decl.name.text);
        let (visibility, visibility_span) = Self::visibility(decl.visibility.as_ref());

        let mut node = TypeNode::new(name, fqn, true, parent);
        node.span = decl.span;
        node.name_span = decl.name.span;
        node.visibility = visibility;
        node.visibility_span = visibility_span;
        let id = self.alloc_type(node, TypeAst::Enum(decl));
        self.file.symtab.insert(fqn, Symbol::Enum(id));

        for value in &decl.values {
            // An enum value's FQN is rooted at the enum's parent scope, per
            // Protobuf's value-at-sibling-scope rule: `pkg.E.FOO` is
            // addressed as `pkg.FOO`.
            let value_name = self.intern(&value.name.text);
            let value_fqn = self.join_fqn(scope, &value.name.text);
            let mut member = MemberNode::new(value_name, value_fqn, MemberKind::EnumValue, Some(id));
            member.span = value.span;
            member.name_span = value.name.span;
            member.number_span = value.number.span();
            let member_id = self.alloc_member(member, MemberAst::EnumValue(value));
            self.file.types[id].members.push(member_id);
            self.file.symtab.insert(value_fqn, Symbol::EnumValue(member_id));
        }
        self.file.types[id].extns_start = self.file.types[id].members.len();

        let mut reserved_ranges = Vec::new();
        for reserved in &decl.reserved {
            self.walk_reserved(id, reserved, &mut reserved_ranges);
        }
        self.file.types[id].ranges_extn_start = reserved_ranges.len();
        self.file.types[id].ranges = reserved_ranges;
        id
    }

    fn walk_reserved(
        &mut self,
        id: TypeId,
        decl: &'a ast::ReservedDecl,
        out_ranges: &mut Vec<RangeId>,
    ) {
        for range in &decl.ranges {
            let range_id = self.alloc_range(id, RangeKind::Reserved, range, &[]);
            out_ranges.push(range_id);
        }
        for name in &decl.names {
            let reserved = ReservedName {
                name: self.intern(&name.text),
                span: name.span,
            };
            self.file.types[id].reserved_names.push(reserved);
        }
    }

    fn walk_oneof(&mut self, parent: TypeId, parent_fqn: Istr, decl: &'a ast::OneofDecl) {
        let name = self.intern(&decl.name.text);
        let fqn = self.join_fqn(parent_fqn, &decl.name.text);
        let node = OneofNode {
            name,
            fqn,
            parent,
            span: decl.span,
            name_span: decl.name.span,
            members: Vec::new(),
            options: None,
            features: None,
        };
        let id = self.file.oneofs.alloc(node);
        self.oneof_ast.push(Some(decl));
        self.file.symtab.insert(fqn, Symbol::Oneof(id));

        for field in &decl.fields {
            let member = self.walk_field(Some(parent), parent_fqn, Some(id), field, MemberKind::Field);
            self.file.types[parent].members.push(member);
            self.file.oneofs[id].members.push(member);
        }
    }

    /// Lowers one field declaration to a member.
    ///
    /// Group declarations additionally synthesize the group's message type;
    /// the member keeps the group name lower-cased and refers to the new
    /// type directly.
    fn walk_field(
        &mut self,
        parent: Option<TypeId>,
        scope: Istr,
        oneof: Option<OneofId>,
        decl: &'a ast::FieldDecl,
        kind: MemberKind,
    ) -> MemberId {
        let is_group = decl.group_body.is_some();
        let field_name = if is_group {
            decl.name.text.to_lowercase()
        } else {
            decl.name.text.clone()
        };
        let name = self.intern(&field_name);
        let fqn = self.join_fqn(scope, &field_name);

        let mut member = MemberNode::new(name, fqn, kind, parent);
        member.span = decl.span;
        member.name_span = decl.name.span;
        member.type_span = decl.typ.span();
        member.number_span = decl.number.span();
        member.label = decl.label;
        member.oneof = oneof;
        member.is_group = is_group;
        member.elem = ElemType::Unresolved;
        member.presence = self.initial_presence(decl.label, oneof);
        let member_id = self.alloc_member(member, MemberAst::Field(decl));

        let symbol = match kind {
            MemberKind::Extension => Symbol::Extension(member_id),
            _ => Symbol::Field(member_id),
        };
        self.file.symtab.insert(fqn, symbol);

        if let Some(body) = &decl.group_body {
            // A group is both a nested message and a field of that type.
            let group_name = self.intern(&decl.name.text);
            let group_fqn = self.join_fqn(scope, &decl.name.text);
            let mut node = TypeNode::new(group_name, group_fqn, false, parent);
            node.span = decl.span;
            node.name_span = decl.name.span;
            let group_id = self.alloc_type(node, TypeAst::Group(decl));
            if let Some(parent) = parent {
                self.file.types[parent].nested.push(group_id);
            }
            self.file.symtab.insert(group_fqn, Symbol::Message(group_id));
            self.walk_message_items(group_id, group_fqn, body);
            self.file.members[member_id].elem = ElemType::Named(TypeRef {
                file: FileNo::SELF,
                idx: group_id,
            });
        }

        member_id
    }

    /// The presence a field starts out with, before features resolve.
    ///
    /// Editions fields without a label stay `Unknown` until the
    /// `field_presence` feature is looked up in the feature pass.
    pub(crate) fn initial_presence(
        &self,
        label: Option<ast::Label>,
        oneof: Option<OneofId>,
    ) -> Presence {
        if oneof.is_some() {
            return Presence::Shared;
        }
        match label.map(|l| l.kind) {
            Some(ast::LabelKind::Repeated) => Presence::Repeated,
            Some(ast::LabelKind::Optional) | Some(ast::LabelKind::Required) => Presence::Explicit,
            None => match self.file.syntax {
                SyntaxMode::Proto2 => Presence::Explicit,
                SyntaxMode::Proto3 => Presence::Implicit,
                SyntaxMode::Editions(_) | SyntaxMode::EditionsLegacy => Presence::Unknown,
            },
        }
    }

    fn walk_extend(
        &mut self,
        parent: Option<TypeId>,
        scope: Istr,
        decl: &'a ast::ExtendDecl,
    ) -> ExtendId {
        let extendee_text = self.intern(&decl.extendee.text());
        let node = ExtendNode {
            extendee_text,
            extendee_span: decl.extendee.span,
            extendee: None,
            parent,
            span: decl.span,
            members: Vec::new(),
        };
        let id = self.file.extends.alloc(node);
        self.extend_ast.push(Some(decl));

        for field in &decl.fields {
            let member = self.walk_field(parent, scope, None, field, MemberKind::Extension);
            self.file.members[member].extend = Some(id);
            self.file.extends[id].members.push(member);
        }
        id
    }

    fn walk_service(&mut self, scope: Istr, decl: &'a ast::ServiceDecl) -> crate::ir::ServiceId {
        let name = self.intern(&decl.name.text);
        let fqn = self.join_fqn(scope, &decl.name.text);
        let node = ServiceNode {
            name,
            fqn,
            span: decl.span,
            name_span: decl.name.span,
            methods: Vec::new(),
            options: None,
            features: None,
        };
        let id = self.file.services.alloc(node);
        self.service_ast.push(decl);

        for method in &decl.methods {
            let method_name = self.intern(&method.name.text);
            let method_fqn = self.join_fqn(fqn, &method.name.text);
            let node = MethodNode {
                name: method_name,
                fqn: method_fqn,
                service: id,
                span: method.span,
                name_span: method.name.span,
                input: None,
                input_span: method.input.span,
                output: None,
                output_span: method.output.span,
                client_streaming: method.input.stream.is_some(),
                server_streaming: method.output.stream.is_some(),
                options: None,
                features: None,
            };
            let method_id = self.file.methods.alloc(node);
            self.method_ast.push(method);
            self.file.services[id].methods.push(method_id);
        }
        id
    }

    // Allocation helpers that keep the AST side tables aligned with the
    // arenas.

    fn alloc_type(&mut self, node: TypeNode, ast: TypeAst<'a>) -> TypeId {
        let id = self.file.types.alloc(node);
        self.type_ast.push(ast);
        debug_assert_eq!(self.type_ast.len(), self.file.types.len());
        id
    }

    pub(crate) fn alloc_member(&mut self, node: MemberNode, ast: MemberAst<'a>) -> MemberId {
        let id = self.file.members.alloc(node);
        self.member_ast.push(ast);
        debug_assert_eq!(self.member_ast.len(), self.file.members.len());
        id
    }

    fn alloc_range(
        &mut self,
        parent: TypeId,
        kind: RangeKind,
        ast: &'a ast::RangeExpr,
        options: &'a [ast::OptionDecl],
    ) -> RangeId {
        let node = RangeNode {
            kind,
            parent,
            span: ast.span,
            start_span: ast.start.span(),
            end_span: match &ast.end {
                ast::RangeEnd::None => ast.start.span(),
                ast::RangeEnd::Expr(expr) => expr.span(),
                ast::RangeEnd::Max(span) => *span,
            },
            start: 0,
            end: 0,
            ok: false,
            options: None,
            features: None,
        };
        let id = self.file.ranges.alloc(node);
        self.range_ast.push(Some(ast));
        self.range_options_ast.push(options);
        debug_assert_eq!(self.range_ast.len(), self.file.ranges.len());
        id
    }

    /// Allocates a type with no backing AST (map-entry synthesis).
    pub(crate) fn alloc_synthetic_type(&mut self, node: TypeNode) -> TypeId {
        self.alloc_type(node, TypeAst::MapEntry)
    }
}
