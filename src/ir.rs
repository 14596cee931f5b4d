//! The raw IR node types populated by the lowering passes.
//!
//! Nodes live in per-file arenas ([`crate::file::File`]) and refer to each
//! other by index. Back-edges (parent, extendee, containing oneof) are
//! always indices, never owning handles, so the cyclic type graph has no
//! ownership cycles. Cross-file references pair an arena index with a
//! [`FileNo`] naming an entry in the referring file's transitive dep list.

use std::collections::HashMap;

use once_cell::sync::OnceCell;

use crate::ast::{Label, Span};
use crate::file::FileNo;
use crate::intern::Istr;
use crate::value::MsgValId;
use crate::{arena::Idx, features::FeatSetId, features::FeatureInfoId};

pub type TypeId = Idx<TypeNode>;
pub type MemberId = Idx<MemberNode>;
pub type OneofId = Idx<OneofNode>;
pub type ExtendId = Idx<ExtendNode>;
pub type ServiceId = Idx<ServiceNode>;
pub type MethodId = Idx<MethodNode>;
pub type RangeId = Idx<RangeNode>;

/// A cross-file reference to a type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeRef {
    pub file: FileNo,
    pub idx: TypeId,
}

/// A cross-file reference to a member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MemberRef {
    pub file: FileNo,
    pub idx: MemberId,
}

/// The predeclared scalar types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Scalar {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    Bool,
    String,
    Bytes,
}

impl Scalar {
    /// Maps a source identifier to a scalar, if it names one.
    pub fn from_name(name: &str) -> Option<Scalar> {
        let scalar = match name {
            "int32" => Scalar::Int32,
            "int64" => Scalar::Int64,
            "uint32" => Scalar::Uint32,
            "uint64" => Scalar::Uint64,
            "sint32" => Scalar::Sint32,
            "sint64" => Scalar::Sint64,
            "fixed32" => Scalar::Fixed32,
            "fixed64" => Scalar::Fixed64,
            "sfixed32" => Scalar::Sfixed32,
            "sfixed64" => Scalar::Sfixed64,
            "float" => Scalar::Float,
            "double" => Scalar::Double,
            "bool" => Scalar::Bool,
            "string" => Scalar::String,
            "bytes" => Scalar::Bytes,
            _ => return None,
        };
        Some(scalar)
    }

    pub fn name(self) -> &'static str {
        match self {
            Scalar::Int32 => "int32",
            Scalar::Int64 => "int64",
            Scalar::Uint32 => "uint32",
            Scalar::Uint64 => "uint64",
            Scalar::Sint32 => "sint32",
            Scalar::Sint64 => "sint64",
            Scalar::Fixed32 => "fixed32",
            Scalar::Fixed64 => "fixed64",
            Scalar::Sfixed32 => "sfixed32",
            Scalar::Sfixed64 => "sfixed64",
            Scalar::Float => "float",
            Scalar::Double => "double",
            Scalar::Bool => "bool",
            Scalar::String => "string",
            Scalar::Bytes => "bytes",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Scalar::Int32
                | Scalar::Int64
                | Scalar::Uint32
                | Scalar::Uint64
                | Scalar::Sint32
                | Scalar::Sint64
                | Scalar::Fixed32
                | Scalar::Fixed64
                | Scalar::Sfixed32
                | Scalar::Sfixed64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Scalar::Int32
                | Scalar::Int64
                | Scalar::Sint32
                | Scalar::Sint64
                | Scalar::Sfixed32
                | Scalar::Sfixed64
        )
    }

    pub fn is_64bit(self) -> bool {
        matches!(
            self,
            Scalar::Int64 | Scalar::Uint64 | Scalar::Sint64 | Scalar::Fixed64 | Scalar::Sfixed64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::Float | Scalar::Double)
    }

    /// Whether a repeated field of this type may use packed encoding.
    pub fn is_packable(self) -> bool {
        self.is_integer() || self.is_float() || self == Scalar::Bool
    }

    /// Whether this scalar is legal as a `map` key.
    pub fn is_valid_map_key(self) -> bool {
        (self.is_integer() || self == Scalar::Bool || self == Scalar::String)
            && !self.is_float()
    }
}

/// The element type of a member, once resolved.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ElemType {
    /// Enum values have no element type.
    #[default]
    None,
    /// Reference recorded but not yet (or unsuccessfully) resolved.
    Unresolved,
    Scalar(Scalar),
    /// A message, enum, or group type.
    Named(TypeRef),
}

impl ElemType {
    pub fn as_named(self) -> Option<TypeRef> {
        match self {
            ElemType::Named(type_ref) => Some(type_ref),
            _ => None,
        }
    }

    pub fn as_scalar(self) -> Option<Scalar> {
        match self {
            ElemType::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }
}

/// How absence of a field value is distinguished from a zero value.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Presence {
    #[default]
    Unknown,
    /// Hazzer-backed presence (`optional` in proto2, editions `EXPLICIT`).
    Explicit,
    /// Zero value means absent (proto3 singular, editions `IMPLICIT`).
    Implicit,
    Repeated,
    /// Presence shared with the other members of a oneof.
    Shared,
}

/// Type visibility modifier (editions 2024 `export` / `local`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Visibility {
    #[default]
    Default,
    Export,
    Local,
}

/// A reserved member name on a type.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ReservedName {
    pub name: Istr,
    pub span: Span,
}

/// A message, enum, or group type.
///
/// Invariants: `members[extns_start..]` are all extensions declared in this
/// scope; `ranges[ranges_extn_start..]` are all extension ranges.
#[derive(Debug)]
pub struct TypeNode {
    pub name: Istr,
    pub fqn: Istr,
    pub is_enum: bool,
    pub parent: Option<TypeId>,
    pub span: Span,
    pub name_span: Span,
    pub visibility: Visibility,
    pub visibility_span: Span,
    pub nested: Vec<TypeId>,
    pub members: Vec<MemberId>,
    pub extns_start: usize,
    pub oneofs: Vec<OneofId>,
    pub ranges: Vec<RangeId>,
    pub ranges_extn_start: usize,
    pub reserved_names: Vec<ReservedName>,
    /// Set on synthesized map-entry types: the map field they belong to.
    pub map_entry_of: Option<MemberId>,
    /// Lazy name index over `members`, for option-path descent.
    pub member_by_name: OnceCell<HashMap<Istr, MemberId>>,
    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
}

impl TypeNode {
    pub fn new(name: Istr, fqn: Istr, is_enum: bool, parent: Option<TypeId>) -> TypeNode {
        TypeNode {
            name,
            fqn,
            is_enum,
            parent,
            span: Span::default(),
            name_span: Span::default(),
            visibility: Visibility::Default,
            visibility_span: Span::default(),
            nested: Vec::new(),
            members: Vec::new(),
            extns_start: 0,
            oneofs: Vec::new(),
            ranges: Vec::new(),
            ranges_extn_start: 0,
            reserved_names: Vec::new(),
            map_entry_of: None,
            member_by_name: OnceCell::new(),
            options: None,
            features: None,
        }
    }

    /// The fields (or enum values) of this type, excluding extensions.
    pub fn fields(&self) -> &[MemberId] {
        &self.members[..self.extns_start]
    }

    /// The extensions declared inside this type's scope.
    pub fn extensions(&self) -> &[MemberId] {
        &self.members[self.extns_start..]
    }

    /// The reserved ranges of this type.
    pub fn reserved_ranges(&self) -> &[RangeId] {
        &self.ranges[..self.ranges_extn_start]
    }

    /// The extension ranges of this type.
    pub fn extension_ranges(&self) -> &[RangeId] {
        &self.ranges[self.ranges_extn_start..]
    }
}

/// What a member is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemberKind {
    Field,
    EnumValue,
    Extension,
}

/// A field, enum value, or extension.
#[derive(Debug)]
pub struct MemberNode {
    pub name: Istr,
    pub fqn: Istr,
    pub kind: MemberKind,
    /// The containing type; `None` for file-level extensions.
    pub parent: Option<TypeId>,
    pub span: Span,
    pub name_span: Span,
    pub type_span: Span,
    pub number_span: Span,
    pub label: Option<Label>,
    pub elem: ElemType,
    /// The extend block this extension was declared in, iff an extension.
    pub extend: Option<ExtendId>,
    /// The containing oneof; set iff `presence` is [`Presence::Shared`].
    pub oneof: Option<OneofId>,
    /// The evaluated tag; zero means "not set / already diagnosed".
    pub number: i64,
    pub presence: Presence,
    pub is_group: bool,
    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
    /// Set iff this member is itself a feature field.
    pub feature_info: Option<FeatureInfoId>,
    /// Explicit `json_name` pseudo-option.
    pub json_name: Option<Istr>,
    pub json_name_span: Span,
    /// Default JSON name computed by the JSON-name pass.
    pub default_json_name: Istr,
    /// The evaluated `default` pseudo-option.
    pub default_value: Option<crate::value::ValId>,
    pub deprecated: bool,
}

impl MemberNode {
    pub fn new(name: Istr, fqn: Istr, kind: MemberKind, parent: Option<TypeId>) -> MemberNode {
        MemberNode {
            name,
            fqn,
            kind,
            parent,
            span: Span::default(),
            name_span: Span::default(),
            type_span: Span::default(),
            number_span: Span::default(),
            label: None,
            elem: ElemType::None,
            extend: None,
            oneof: None,
            number: 0,
            presence: Presence::Unknown,
            is_group: false,
            options: None,
            features: None,
            feature_info: None,
            json_name: None,
            json_name_span: Span::default(),
            default_json_name: Istr::EMPTY,
            default_value: None,
            deprecated: false,
        }
    }
}

/// A oneof group inside a message.
#[derive(Debug)]
pub struct OneofNode {
    pub name: Istr,
    pub fqn: Istr,
    pub parent: TypeId,
    pub span: Span,
    pub name_span: Span,
    pub members: Vec<MemberId>,
    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
}

/// An `extend` block.
#[derive(Debug)]
pub struct ExtendNode {
    /// The extendee reference as written, for diagnostics.
    pub extendee_text: Istr,
    pub extendee_span: Span,
    /// The resolved extendee message.
    pub extendee: Option<TypeRef>,
    pub parent: Option<TypeId>,
    pub span: Span,
    pub members: Vec<MemberId>,
}

/// A service declaration.
#[derive(Debug)]
pub struct ServiceNode {
    pub name: Istr,
    pub fqn: Istr,
    pub span: Span,
    pub name_span: Span,
    pub methods: Vec<MethodId>,
    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
}

/// An rpc method.
#[derive(Debug)]
pub struct MethodNode {
    pub name: Istr,
    pub fqn: Istr,
    pub service: ServiceId,
    pub span: Span,
    pub name_span: Span,
    pub input: Option<TypeRef>,
    pub input_span: Span,
    pub output: Option<TypeRef>,
    pub output_span: Span,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
}

/// Whether a range reserves numbers or opens them for extension.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RangeKind {
    Reserved,
    Extension,
}

/// A reserved or extension range. Half-open after evaluation: the declared
/// `[first, last]` is stored as `[first, last + 1)`.
#[derive(Debug)]
pub struct RangeNode {
    pub kind: RangeKind,
    pub parent: TypeId,
    pub span: Span,
    pub start_span: Span,
    pub end_span: Span,
    pub start: i64,
    pub end: i64,
    /// Both endpoints evaluated successfully.
    pub ok: bool,
    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
}

/// A polymorphic symbol-table entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Symbol {
    Package,
    Message(TypeId),
    Enum(TypeId),
    Field(MemberId),
    EnumValue(MemberId),
    Extension(MemberId),
    Oneof(OneofId),
    /// A predeclared scalar name; never stored in tables, produced by the
    /// resolver for unqualified scalar references.
    Scalar(Scalar),
}

impl Symbol {
    /// A short human-readable noun for diagnostics.
    pub fn describe(self) -> &'static str {
        match self {
            Symbol::Package => "package",
            Symbol::Message(_) => "message",
            Symbol::Enum(_) => "enum",
            Symbol::Field(_) => "field",
            Symbol::EnumValue(_) => "enum value",
            Symbol::Extension(_) => "extension",
            Symbol::Oneof(_) => "oneof",
            Symbol::Scalar(_) => "scalar type",
        }
    }

    /// Whether the resolver may descend into this symbol to resolve a
    /// further path component.
    pub fn is_scope(self) -> bool {
        matches!(self, Symbol::Package | Symbol::Message(_) | Symbol::Enum(_))
    }
}
