//! Evaluated constant values.
//!
//! A [`ValueNode`] is the result of evaluating one AST expression against a
//! target type. The payload is a tagged variant interpreted per the target
//! field's type: numeric, bool and enum values are bit patterns; strings and
//! bytes are interner IDs; message literals index the message-value arena;
//! repeated values index the element-array arena.

use std::collections::HashMap;

use crate::arena::Idx;
use crate::ast::Span;
use crate::intern::Istr;
use crate::ir::{MemberRef, TypeRef};

pub type ValId = Idx<ValueNode>;
pub type MsgValId = Idx<MessageValue>;
pub type ArrayId = Idx<ValueArray>;

/// The payload of an evaluated value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Payload {
    /// Numeric, bool, or enum bit pattern. Signed values are stored as
    /// two's complement; floats as their IEEE-754 bits widened to binary64.
    Bits(u64),
    /// A string or bytes value, interned.
    Str(Istr),
    /// A message literal.
    Message(MsgValId),
    /// Two or more repeated elements. Singletons stay on the scalar paths.
    Array(ArrayId),
}

impl Payload {
    /// The zero value used when evaluation fails.
    pub const ZERO: Payload = Payload::Bits(0);
}

/// One evaluated expression.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ValueNode {
    pub span: Span,
    /// The target field that supplied the type, when there is one.
    pub field: Option<MemberRef>,
    /// Span of the dotted option path that produced this value, for deep
    /// options like `a.b.c`.
    pub option_path_span: Option<Span>,
    pub payload: Payload,
    /// `false` when evaluation failed; the payload is then zero-valued and
    /// consumers must not interpret it.
    pub ok: bool,
}

impl ValueNode {
    pub fn bad(span: Span) -> ValueNode {
        ValueNode {
            span,
            field: None,
            option_path_span: None,
            payload: Payload::ZERO,
            ok: false,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.payload {
            Payload::Bits(bits) if self.ok => Some(bits),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_u64().map(|bits| bits as i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_u64().map(|bits| bits != 0)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_u64().map(f64::from_bits)
    }

    pub fn as_str_id(&self) -> Option<Istr> {
        match self.payload {
            Payload::Str(id) if self.ok => Some(id),
            _ => None,
        }
    }
}

/// An ordered message literal with a de-duplication index.
///
/// `by_key` is keyed by the interned FQN of the set field (or of its
/// containing oneof, so that setting two members of one oneof in the
/// same options block collides).
#[derive(Debug, Default)]
pub struct MessageValue {
    /// The message type this literal instantiates.
    pub msg: Option<TypeRef>,
    pub span: Span,
    pub fields: Vec<ValId>,
    pub by_key: HashMap<Istr, ValId>,
    /// For `Any` messages given as `[type_url]: { ... }`: the concrete
    /// payload type.
    pub concrete: Option<TypeRef>,
}

impl MessageValue {
    pub fn new(msg: Option<TypeRef>, span: Span) -> MessageValue {
        MessageValue {
            msg,
            span,
            fields: Vec::new(),
            by_key: HashMap::new(),
            concrete: None,
        }
    }
}

/// Element storage for repeated values with two or more entries.
#[derive(Debug, Default)]
pub struct ValueArray {
    pub elems: Vec<ValId>,
}
