//! Constant evaluation.
//!
//! Evaluates AST expressions against a target type: field numbers, enum
//! value numbers, range endpoints, and full option values including nested
//! message literals. Failures are reported to the sink and produce a
//! zero value flagged `ok = false`; no error crosses the evaluator
//! boundary any other way. Out-of-range integers additionally saturate to
//! the nearest legal value so downstream passes can keep going.

use log::trace;

use crate::ast;
use crate::file::FileNo;
use crate::intern::Istr;
use crate::ir::{ElemType, MemberRef, Scalar, TypeRef};
use crate::report::Diagnostic;
use crate::value::{MessageValue, MsgValId, Payload, ValId, ValueArray, ValueNode};
use crate::Lower;

/// Highest legal field number: 2^29 - 1.
pub const MAX_FIELD_NUMBER: i64 = (1 << 29) - 1;
/// The implementation-reserved field number band.
pub const RESERVED_NUMBERS: (i64, i64) = (19_000, 19_999);

/// Integer evaluation shape: bounds plus a human-readable target name.
#[derive(Clone, Copy)]
enum IntKind {
    Signed { min: i64, max: i64 },
    Unsigned { max: u64 },
}

#[derive(Clone, Copy)]
struct IntSpec {
    kind: IntKind,
    what: &'static str,
    /// A disallowed sub-range (the 19000–19999 band for field numbers).
    reserved: Option<(i64, i64)>,
}

impl<'a> Lower<'a> {
    /// Evaluates a field or extension number: `[1, 2^29)` minus the
    /// reserved band.
    pub(crate) fn eval_field_number(&mut self, expr: &ast::Expr) -> (i64, bool) {
        let spec = IntSpec {
            kind: IntKind::Signed {
                min: 1,
                max: MAX_FIELD_NUMBER,
            },
            what: "field number",
            reserved: Some(RESERVED_NUMBERS),
        };
        let (bits, ok) = self.eval_integer(expr, spec);
        (bits as i64, ok)
    }

    /// Evaluates an enum value number: any `int32`.
    pub(crate) fn eval_enum_value_number(&mut self, expr: &ast::Expr) -> (i64, bool) {
        let spec = IntSpec {
            kind: IntKind::Signed {
                min: i32::MIN as i64,
                max: i32::MAX as i64,
            },
            what: "enum value number",
            reserved: None,
        };
        let (bits, ok) = self.eval_integer(expr, spec);
        (bits as i64, ok)
    }

    /// Evaluates a reserved/extension range endpoint. Enum ranges span the
    /// whole of `int32`; message ranges are field numbers without the
    /// reserved-band restriction (reserving the band itself is legal).
    pub(crate) fn eval_range_bound(&mut self, expr: &ast::Expr, is_enum: bool) -> (i64, bool) {
        let spec = if is_enum {
            IntSpec {
                kind: IntKind::Signed {
                    min: i32::MIN as i64,
                    max: i32::MAX as i64,
                },
                what: "enum range endpoint",
                reserved: None,
            }
        } else {
            IntSpec {
                kind: IntKind::Signed {
                    min: 1,
                    max: MAX_FIELD_NUMBER,
                },
                what: "range endpoint",
                reserved: None,
            }
        };
        let (bits, ok) = self.eval_integer(expr, spec);
        (bits as i64, ok)
    }

    /// The integer core: literals, negated literals, and helpful rejections
    /// for everything else. Returns two's-complement bits.
    fn eval_integer(&mut self, expr: &ast::Expr, spec: IntSpec) -> (u64, bool) {
        match expr {
            ast::Expr::Int { value, span } => self.clamp_integer(*value, false, *span, spec),
            ast::Expr::Neg { inner, span, .. } => match inner.as_ref() {
                ast::Expr::Int { value, .. } => self.clamp_integer(*value, true, *span, spec),
                _ => {
                    self.emit(
                        Diagnostic::error("`-` may only precede a number literal or `inf`")
                            .at(*span),
                    );
                    (0, false)
                }
            },
            ast::Expr::Path(path) if path.text() == "max" => {
                self.emit(
                    Diagnostic::error("`max` is only allowed inside a range expression")
                        .at(path.span),
                );
                (0, false)
            }
            other => {
                self.emit(
                    Diagnostic::error(format!("expected a {}, found {}", spec.what, describe(other)))
                        .at(other.span()),
                );
                (0, false)
            }
        }
    }

    /// Bounds-checks and saturates one integer literal.
    fn clamp_integer(
        &mut self,
        magnitude: u64,
        negative: bool,
        span: ast::Span,
        spec: IntSpec,
    ) -> (u64, bool) {
        match spec.kind {
            IntKind::Unsigned { max } => {
                if negative {
                    self.out_of_range(span, spec, &format!("-{}", magnitude));
                    return (0, false);
                }
                if magnitude > max {
                    self.out_of_range(span, spec, &magnitude.to_string());
                    return (max, false);
                }
                (magnitude, true)
            }
            IntKind::Signed { min, max } => {
                let value = if negative {
                    // i64::MIN magnitude overflows i64; saturate through
                    // i128 to keep the comparison honest.
                    let wide = -(magnitude as i128);
                    if wide < min as i128 {
                        self.out_of_range(span, spec, &format!("-{}", magnitude));
                        return (min as u64, false);
                    }
                    wide as i64
                } else {
                    if magnitude > max as u64 {
                        self.out_of_range(span, spec, &magnitude.to_string());
                        return (max as u64, false);
                    }
                    magnitude as i64
                };
                if value < min {
                    self.out_of_range(span, spec, &value.to_string());
                    return (min as u64, false);
                }
                if let Some((lo, hi)) = spec.reserved {
                    if value >= lo && value <= hi {
                        self.emit(
                            Diagnostic::error(format!("{} out of range", spec.what))
                                .at(span)
                                .with_help(format!(
                                    "numbers {}..{} are reserved for the wire format implementation",
                                    lo, hi
                                )),
                        );
                        // Saturate to the nearest legal value outside the
                        // band.
                        let nearest = if value - lo < hi - value { lo - 1 } else { hi + 1 };
                        return (nearest as u64, false);
                    }
                }
                (value as u64, true)
            }
        }
    }

    fn out_of_range(&mut self, span: ast::Span, spec: IntSpec, literal: &str) {
        let range = match spec.kind {
            IntKind::Signed { min, max } => format!("{}..{}", min, max),
            IntKind::Unsigned { max } => format!("0..{}", max),
        };
        self.emit(
            Diagnostic::error(format!("{} out of range", spec.what))
                .at(span)
                .with_note(format!("{} does not fit in {}", literal, range)),
        );
    }

    /// Evaluates an option or default expression against a target field.
    ///
    /// `repeated_ok` permits array expressions; it is cleared when
    /// recursing into elements.
    pub(crate) fn eval_expr(
        &mut self,
        scope: Istr,
        expr: &ast::Expr,
        field: MemberRef,
        repeated_ok: bool,
    ) -> ValId {
        if let ast::Expr::Array { elems, span } = expr {
            let member = self.file.member_node(field);
            if member.presence != crate::ir::Presence::Repeated || !repeated_ok {
                let mut diagnostic =
                    Diagnostic::error("array expression for a singular value").at(*span);
                diagnostic = self.expected_due_to(diagnostic, field);
                self.emit(diagnostic);
                return self.alloc_bad_value(*span, Some(field));
            }
            return match elems.len() {
                // A one-element array shares the single-value storage path.
                1 => self.eval_expr(scope, &elems[0], field, false),
                _ => {
                    let mut ids = Vec::with_capacity(elems.len());
                    let mut ok = true;
                    for elem in elems {
                        let id = self.eval_expr(scope, elem, field, false);
                        ok &= self.file.values[id].ok;
                        ids.push(id);
                    }
                    let array = self.file.arrays.alloc(ValueArray { elems: ids });
                    self.file.values.alloc(ValueNode {
                        span: *span,
                        field: Some(field),
                        option_path_span: None,
                        payload: Payload::Array(array),
                        ok,
                    })
                }
            };
        }
        self.eval_single(scope, expr, field)
    }

    fn eval_single(&mut self, scope: Istr, expr: &ast::Expr, field: MemberRef) -> ValId {
        let elem = self.file.elem_of(field);
        match elem {
            ElemType::Scalar(scalar) => self.eval_scalar(expr, scalar, field),
            ElemType::Named(type_ref) => {
                if self.file.type_node(type_ref).is_enum {
                    self.eval_enum_ident(expr, type_ref, field)
                } else {
                    self.eval_message(scope, expr, type_ref, field)
                }
            }
            // An unresolved element type was already diagnosed; swallow.
            ElemType::None | ElemType::Unresolved => self.alloc_bad_value(expr.span(), Some(field)),
        }
    }

    fn eval_scalar(&mut self, expr: &ast::Expr, scalar: Scalar, field: MemberRef) -> ValId {
        let span = expr.span();
        let (payload, ok) = if scalar.is_integer() {
            let spec = int_spec(scalar);
            let (bits, ok) = self.eval_integer(expr, spec);
            (Payload::Bits(bits), ok)
        } else if scalar.is_float() {
            self.eval_float(expr)
        } else if scalar == Scalar::Bool {
            match expr {
                ast::Expr::Path(path) if path.text() == "true" => (Payload::Bits(1), true),
                ast::Expr::Path(path) if path.text() == "false" => (Payload::Bits(0), true),
                other => {
                    self.mismatch(other, "bool", field);
                    (Payload::ZERO, false)
                }
            }
        } else {
            // string / bytes
            match expr {
                ast::Expr::Str { value, .. } => (Payload::Str(self.intern(value)), true),
                other => {
                    self.mismatch(other, scalar.name(), field);
                    (Payload::ZERO, false)
                }
            }
        };
        self.file.values.alloc(ValueNode {
            span,
            field: Some(field),
            option_path_span: None,
            payload,
            ok,
        })
    }

    /// Floats are always stored as binary64 bits; a binary32 target
    /// narrows at emission time, which is lossless for every value the
    /// evaluator produces from source.
    fn eval_float(&mut self, expr: &ast::Expr) -> (Payload, bool) {
        match expr {
            ast::Expr::Float { value, .. } => (Payload::Bits(value.to_bits()), true),
            ast::Expr::Int { value, .. } => (Payload::Bits((*value as f64).to_bits()), true),
            ast::Expr::Path(path) if path.text() == "inf" => {
                (Payload::Bits(f64::INFINITY.to_bits()), true)
            }
            ast::Expr::Path(path) if path.text() == "nan" => {
                (Payload::Bits(f64::NAN.to_bits()), true)
            }
            ast::Expr::Neg { inner, span, .. } => {
                let (payload, ok) = self.eval_float(inner);
                match payload {
                    // Negation flips the sign bit, which also yields -0.0
                    // and -inf correctly.
                    Payload::Bits(bits) if ok => (Payload::Bits(bits ^ (1u64 << 63)), true),
                    _ => {
                        self.emit(
                            Diagnostic::error("`-` may only precede a number literal or `inf`")
                                .at(*span),
                        );
                        (Payload::ZERO, false)
                    }
                }
            }
            other => {
                self.emit(
                    Diagnostic::error(format!(
                        "expected a floating-point value, found {}",
                        describe(other)
                    ))
                    .at(other.span()),
                );
                (Payload::ZERO, false)
            }
        }
    }

    fn eval_enum_ident(&mut self, expr: &ast::Expr, enum_ref: TypeRef, field: MemberRef) -> ValId {
        let span = expr.span();
        let (payload, ok) = match expr {
            ast::Expr::Path(path) if !path.absolute && path.segments.len() == 1 => {
                let name = self.intern(&path.segments[0].text);
                match self.enum_value_number(enum_ref, name) {
                    Some(number) => (Payload::Bits(number as u64), true),
                    None => {
                        let enum_name = self.str(self.file.type_node(enum_ref).fqn);
                        self.emit(
                            Diagnostic::error(format!(
                                "`{}` is not a value of enum `{}`",
                                path.segments[0].text, enum_name
                            ))
                            .at(path.span),
                        );
                        (Payload::ZERO, false)
                    }
                }
            }
            other => {
                let enum_name = self.str(self.file.type_node(enum_ref).fqn).to_string();
                self.mismatch(other, &format!("a value of enum `{}`", enum_name), field);
                (Payload::ZERO, false)
            }
        };
        self.file.values.alloc(ValueNode {
            span,
            field: Some(field),
            option_path_span: None,
            payload,
            ok,
        })
    }

    fn eval_message(
        &mut self,
        scope: Istr,
        expr: &ast::Expr,
        msg: TypeRef,
        field: MemberRef,
    ) -> ValId {
        let span = expr.span();
        match expr {
            ast::Expr::Dict { entries, span } => {
                let msgval = self.eval_message_literal(scope, entries, *span, msg);
                self.file.values.alloc(ValueNode {
                    span: *span,
                    field: Some(field),
                    option_path_span: None,
                    payload: Payload::Message(msgval),
                    ok: true,
                })
            }
            other => {
                let name = self.str(self.file.type_node(msg).fqn).to_string();
                self.mismatch(other, &format!("a `{}` message literal", name), field);
                self.alloc_bad_value(span, Some(field))
            }
        }
    }

    /// Evaluates `{ key: value, ... }` against a message type, creating a
    /// [`MessageValue`] with per-field de-duplication.
    pub(crate) fn eval_message_literal(
        &mut self,
        scope: Istr,
        entries: &[ast::DictEntry],
        span: ast::Span,
        msg: TypeRef,
    ) -> MsgValId {
        let msgval = self.file.msg_values.alloc(MessageValue::new(Some(msg), span));
        for entry in entries {
            match &entry.key {
                ast::DictKey::Field(ident) => {
                    let name = self.intern(&ident.text);
                    let Some(field) = self.file.member_named(msg, name) else {
                        let msg_name = self.str(self.file.type_node(msg).fqn);
                        self.emit(
                            Diagnostic::error(format!(
                                "message `{}` has no field named `{}`",
                                msg_name, ident.text
                            ))
                            .at(ident.span),
                        );
                        continue;
                    };
                    let value = self.eval_expr(scope, &entry.value, field, true);
                    self.msgval_insert(msgval, field, value, entry.key.span());
                }
                ast::DictKey::Extension { path, span } => {
                    let Some(field) = self.resolve_extension(scope, path) else {
                        continue;
                    };
                    let extendee = self
                        .file
                        .member_node(field)
                        .extend
                        .and_then(|e| self.extendee_of(field.file, e));
                    if extendee != Some(self.canonical_type_key(msg)) {
                        self.emit(
                            Diagnostic::error(format!(
                                "extension `{}` does not extend this message",
                                path.text()
                            ))
                            .at(*span),
                        );
                        continue;
                    }
                    let value = self.eval_expr(scope, &entry.value, field, true);
                    self.msgval_insert(msgval, field, value, *span);
                }
                ast::DictKey::TypeUrl { domain, path, span } => {
                    self.eval_any_entry(scope, msgval, msg, domain, path, &entry.value, *span);
                }
            }
        }
        msgval
    }

    /// `[type.googleapis.com/pkg.Msg]: { ... }` inside an `Any` literal.
    fn eval_any_entry(
        &mut self,
        scope: Istr,
        msgval: MsgValId,
        msg: TypeRef,
        _domain: &str,
        path: &ast::TypePath,
        value: &ast::Expr,
        span: ast::Span,
    ) {
        let is_any = self
            .builtins
            .any
            .map(|any| self.canonical_type_key(any) == self.canonical_type_key(msg))
            .unwrap_or(false);
        if !is_any {
            self.emit(
                Diagnostic::error("type-URL keys are only allowed in `google.protobuf.Any` literals")
                    .at(span),
            );
            return;
        }
        if self.file.msg_values[msgval].concrete.is_some() {
            self.emit(
                Diagnostic::error("`Any` literal already has a concrete payload").at(span),
            );
            return;
        }
        let Some((file, sym)) = self.resolve_path(scope, path) else {
            return;
        };
        let concrete = match sym {
            crate::ir::Symbol::Message(idx) => TypeRef { file, idx },
            other => {
                self.emit(
                    Diagnostic::error(format!(
                        "`{}` is a {}; an `Any` payload must be a message",
                        path.text(),
                        other.describe()
                    ))
                    .at(path.span),
                );
                return;
            }
        };
        let ast::Expr::Dict { entries, span: dict_span } = value else {
            self.emit(
                Diagnostic::error("an `Any` payload must be a message literal").at(value.span()),
            );
            return;
        };
        let child = self.eval_message_literal(scope, entries, *dict_span, concrete);
        let child_value = self.file.values.alloc(ValueNode {
            span: *dict_span,
            field: None,
            option_path_span: None,
            payload: Payload::Message(child),
            ok: true,
        });
        let msgval_node = &mut self.file.msg_values[msgval];
        msgval_node.concrete = Some(concrete);
        msgval_node.fields.push(child_value);
    }

    /// Inserts a field value into a message literal, de-duplicating by the
    /// field's FQN, or its containing oneof's FQN so that two members of
    /// one oneof collide. Repeated fields append instead: the first value
    /// stays on the one-element storage path and a second set converts it
    /// into an element array in place.
    pub(crate) fn msgval_insert(
        &mut self,
        msgval: MsgValId,
        field: MemberRef,
        value: ValId,
        key_span: ast::Span,
    ) {
        let member = self.file.member_node(field);
        let field_name = member.name;
        let repeated = member.presence == crate::ir::Presence::Repeated;
        let (key, via_oneof) = match member.oneof {
            Some(oneof) => (
                self.file.dep_file(field.file).oneofs[oneof].fqn,
                true,
            ),
            None => (member.fqn, false),
        };
        if let Some(&previous) = self.file.msg_values[msgval].by_key.get(&key) {
            if repeated && !via_oneof {
                self.append_repeated(previous, value);
                return;
            }
            let previous_span = self.file.values[previous].span;
            let name = self.str(field_name);
            let message = if via_oneof {
                format!(
                    "`{}` belongs to a oneof that already has a value in this literal",
                    name
                )
            } else {
                format!("`{}` is already set in this literal", name)
            };
            self.emit(
                Diagnostic::error(message)
                    .at(key_span)
                    .with_snippet(previous_span, "previously set here"),
            );
            return;
        }
        self.file.msg_values[msgval].fields.push(value);
        self.file.msg_values[msgval].by_key.insert(key, value);
        trace!("message literal field set: {:?}", key);
    }

    /// Appends `value` to an already-set repeated field. A single-valued
    /// holder is converted to a two-element array; an array holder grows.
    fn append_repeated(&mut self, holder: ValId, value: ValId) {
        match self.file.values[holder].payload {
            Payload::Array(array) => {
                match self.file.values[value].payload {
                    // Array-valued sets splice their elements.
                    Payload::Array(other) => {
                        let mut elems = self.file.arrays[other].elems.clone();
                        self.file.arrays[array].elems.append(&mut elems);
                    }
                    _ => self.file.arrays[array].elems.push(value),
                }
            }
            _ => {
                // Move the holder's current payload into element storage.
                let first = self.file.values.alloc(self.file.values[holder]);
                let elems = match self.file.values[value].payload {
                    Payload::Array(other) => {
                        let mut elems = vec![first];
                        elems.extend(self.file.arrays[other].elems.iter().copied());
                        elems
                    }
                    _ => vec![first, value],
                };
                let array = self.file.arrays.alloc(ValueArray { elems });
                self.file.values[holder].payload = Payload::Array(array);
            }
        }
    }

    /// The number of an enum's value by simple name, if any.
    pub(crate) fn enum_value_number(&self, enum_ref: TypeRef, name: Istr) -> Option<i64> {
        let member = self.file.member_named(enum_ref, name)?;
        Some(self.file.member_node(member).number)
    }

    /// The extendee of an extension, as a canonical comparison key.
    fn extendee_of(&self, file: FileNo, extend: crate::ir::ExtendId) -> Option<(Istr, Istr)> {
        let owner = self.file.dep_file(file);
        let extendee = owner.extends[extend].extendee?;
        let node = owner.type_node(extendee);
        Some((owner.dep_file(extendee.file).path, node.fqn))
    }

    /// `(file path, fqn)` identity for a type, comparable across the
    /// different [`FileNo`] coordinate systems of nested files.
    pub(crate) fn canonical_type_key(&self, type_ref: TypeRef) -> (Istr, Istr) {
        let node = self.file.type_node(type_ref);
        (self.file.dep_file(type_ref.file).path, node.fqn)
    }

    fn alloc_bad_value(&mut self, span: ast::Span, field: Option<MemberRef>) -> ValId {
        self.file.values.alloc(ValueNode {
            field,
            ..ValueNode::bad(span)
        })
    }

    fn mismatch(&mut self, expr: &ast::Expr, expected: &str, field: MemberRef) {
        let mut diagnostic = Diagnostic::error(format!(
            "expected {}, found {}",
            expected,
            describe(expr)
        ))
        .at(expr.span());
        diagnostic = self.expected_due_to(diagnostic, field);
        self.emit(diagnostic);
    }

    /// Attaches the "expected due to this" anchor: a secondary snippet for
    /// same-file targets, a note naming the declaration otherwise.
    pub(crate) fn expected_due_to(
        &self,
        diagnostic: Diagnostic,
        field: MemberRef,
    ) -> Diagnostic {
        let member = self.file.member_node(field);
        if field.file.is_self() && !member.type_span.is_empty() {
            diagnostic.with_snippet(member.type_span, "expected due to this")
        } else {
            let fqn = self.str(member.fqn);
            let path = self.str(self.file.dep_file(field.file).path);
            diagnostic.with_note(format!(
                "expected due to the declaration of `{}` in {:?}",
                fqn, path
            ))
        }
    }
}

/// The bounds for each integral scalar.
fn int_spec(scalar: Scalar) -> IntSpec {
    match scalar {
        Scalar::Int32 | Scalar::Sint32 | Scalar::Sfixed32 => IntSpec {
            kind: IntKind::Signed {
                min: i32::MIN as i64,
                max: i32::MAX as i64,
            },
            what: scalar.name(),
            reserved: None,
        },
        Scalar::Int64 | Scalar::Sint64 | Scalar::Sfixed64 => IntSpec {
            kind: IntKind::Signed {
                min: i64::MIN,
                max: i64::MAX,
            },
            what: scalar.name(),
            reserved: None,
        },
        Scalar::Uint32 | Scalar::Fixed32 => IntSpec {
            kind: IntKind::Unsigned {
                max: u32::MAX as u64,
            },
            what: scalar.name(),
            reserved: None,
        },
        Scalar::Uint64 | Scalar::Fixed64 => IntSpec {
            kind: IntKind::Unsigned { max: u64::MAX },
            what: scalar.name(),
            reserved: None,
        },
        _ => unreachable!("int_spec called for non-integer scalar"),
    }
}

/// A short description of an expression's shape for mismatch messages.
fn describe(expr: &ast::Expr) -> &'static str {
    match expr {
        ast::Expr::Int { .. } => "an integer literal",
        ast::Expr::Float { .. } => "a float literal",
        ast::Expr::Str { .. } => "a string literal",
        ast::Expr::Path(_) => "an identifier",
        ast::Expr::Neg { .. } => "a negated expression",
        ast::Expr::Array { .. } => "an array expression",
        ast::Expr::Dict { .. } => "a message literal",
    }
}
