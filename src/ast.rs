//! The abstract syntax tree consumed by the lowering pipeline.
//!
//! These types are the seam to the external parser: a parsed `.proto` file
//! arrives as an [`ast::File`](File) and the pipeline never re-reads source
//! text. Every node carries the byte span it was parsed from; spans are the
//! only part of the AST that survives into the IR, anchoring diagnostics.

use std::fmt;

/// A half-open byte range into the source file.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A single identifier with its span.
#[derive(Clone, PartialEq, Debug)]
pub struct Ident {
    pub text: String,
    pub span: Span,
}

impl Ident {
    pub fn new(text: impl Into<String>, span: Span) -> Ident {
        Ident {
            text: text.into(),
            span,
        }
    }
}

/// A dotted reference like `foo.bar.Baz`, optionally absolute (`.foo.Baz`).
#[derive(Clone, PartialEq, Debug)]
pub struct TypePath {
    pub absolute: bool,
    pub segments: Vec<Ident>,
    pub span: Span,
}

impl TypePath {
    /// Joins the segments back into source form, without the leading dot.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(&seg.text);
        }
        out
    }
}

/// The type position of a field declaration.
#[derive(Clone, PartialEq, Debug)]
pub enum TypeName {
    /// A scalar or named type: `int32`, `Foo`, `.pkg.Bar`.
    Named(TypePath),
    /// An angle-bracketed generic application. Only `map<K, V>` is part of
    /// the language; anything else is diagnosed and lowered as unresolved.
    Generic {
        base: TypePath,
        args: Vec<TypeName>,
        span: Span,
    },
}

impl TypeName {
    pub fn span(&self) -> Span {
        match self {
            TypeName::Named(path) => path.span,
            TypeName::Generic { span, .. } => *span,
        }
    }
}

/// A constant expression in option or number position.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    /// An unsigned integer literal. Negative numbers arrive as [`Expr::Neg`].
    Int { value: u64, span: Span },
    /// A float literal; binary64 in the AST regardless of target width.
    Float { value: f64, span: Span },
    /// A string literal, unescaped.
    Str { value: String, span: Span },
    /// An identifier or dotted path: enum values, `true`, `inf`, `max`.
    Path(TypePath),
    /// A `-` applied to an inner expression.
    Neg { minus: Span, inner: Box<Expr>, span: Span },
    /// `[a, b, c]`
    Array { elems: Vec<Expr>, span: Span },
    /// `{ key: value, ... }`: a message literal.
    Dict { entries: Vec<DictEntry>, span: Span },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Str { span, .. }
            | Expr::Neg { span, .. }
            | Expr::Array { span, .. }
            | Expr::Dict { span, .. } => *span,
            Expr::Path(path) => path.span,
        }
    }
}

/// One `key: value` entry of a message literal.
#[derive(Clone, PartialEq, Debug)]
pub struct DictEntry {
    pub key: DictKey,
    pub value: Expr,
    pub span: Span,
}

/// The key position of a message-literal entry.
#[derive(Clone, PartialEq, Debug)]
pub enum DictKey {
    /// A plain field name.
    Field(Ident),
    /// `[pkg.ext]`: an extension field.
    Extension { path: TypePath, span: Span },
    /// `[type.googleapis.com/pkg.Msg]`: an `Any` concrete type.
    TypeUrl {
        domain: String,
        path: TypePath,
        span: Span,
    },
}

impl DictKey {
    pub fn span(&self) -> Span {
        match self {
            DictKey::Field(ident) => ident.span,
            DictKey::Extension { span, .. } | DictKey::TypeUrl { span, .. } => *span,
        }
    }
}

/// A range in `reserved` or `extensions` position: `1`, `5 to 9`, `10 to max`.
#[derive(Clone, PartialEq, Debug)]
pub struct RangeExpr {
    pub start: Expr,
    pub end: RangeEnd,
    pub span: Span,
}

/// The upper endpoint of a [`RangeExpr`].
#[derive(Clone, PartialEq, Debug)]
pub enum RangeEnd {
    /// Single-number range: `reserved 5;`
    None,
    /// `5 to 9`
    Expr(Expr),
    /// `5 to max`
    Max(Span),
}

/// One component of an option name path.
#[derive(Clone, PartialEq, Debug)]
pub enum OptionPathPart {
    /// A built-in option or nested field name.
    Simple(Ident),
    /// `(pkg.ext)`: a custom option, resolved as an extension.
    Extension { path: TypePath, span: Span },
}

impl OptionPathPart {
    pub fn span(&self) -> Span {
        match self {
            OptionPathPart::Simple(ident) => ident.span,
            OptionPathPart::Extension { span, .. } => *span,
        }
    }
}

/// The dotted name of an option: `deprecated`, `(pkg.ext).field.sub`.
#[derive(Clone, PartialEq, Debug)]
pub struct OptionPath {
    pub parts: Vec<OptionPathPart>,
    pub span: Span,
}

/// `option name = value;` or one entry of a compact `[name = value]` list.
#[derive(Clone, PartialEq, Debug)]
pub struct OptionDecl {
    pub path: OptionPath,
    pub value: Expr,
    pub span: Span,
}

/// The `syntax = "..."` / `edition = "..."` declaration.
#[derive(Clone, PartialEq, Debug)]
pub struct SyntaxDecl {
    pub is_edition: bool,
    /// The raw declared value: `"proto2"`, `"proto3"`, `"2023"`, ...
    pub value: String,
    pub value_span: Span,
    pub span: Span,
}

/// `package a.b.c;`
#[derive(Clone, PartialEq, Debug)]
pub struct PackageDecl {
    pub path: TypePath,
    pub span: Span,
}

/// An `import` declaration.
#[derive(Clone, PartialEq, Debug)]
pub struct Import {
    pub modifier: Option<ImportModifier>,
    pub path: String,
    pub path_span: Span,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ImportModifier {
    Public(Span),
    Weak(Span),
}

/// `export` / `local` visibility modifier on a type (editions 2024).
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct VisibilityDecl {
    pub export: bool,
    pub span: Span,
}

/// `optional` / `required` / `repeated`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LabelKind {
    Optional,
    Required,
    Repeated,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Label {
    pub kind: LabelKind,
    pub span: Span,
}

/// A field declaration, including group fields.
#[derive(Clone, PartialEq, Debug)]
pub struct FieldDecl {
    pub label: Option<Label>,
    pub typ: TypeName,
    pub name: Ident,
    pub number: Expr,
    pub options: Vec<OptionDecl>,
    /// Set for `group Name = N { ... }`; the group body declares a nested
    /// message and the field name is the group name lower-cased.
    pub group_body: Option<Vec<MessageItem>>,
    pub span: Span,
}

/// `oneof name { ... }`
#[derive(Clone, PartialEq, Debug)]
pub struct OneofDecl {
    pub name: Ident,
    pub fields: Vec<FieldDecl>,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// `reserved 1, 5 to 9;` or `reserved "foo", "bar";`
#[derive(Clone, PartialEq, Debug)]
pub struct ReservedDecl {
    pub ranges: Vec<RangeExpr>,
    pub names: Vec<Ident>,
    pub span: Span,
}

/// `extensions 100 to 199 [declaration = { ... }];`
#[derive(Clone, PartialEq, Debug)]
pub struct ExtensionsDecl {
    pub ranges: Vec<RangeExpr>,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// An item in a message body.
#[derive(Clone, PartialEq, Debug)]
pub enum MessageItem {
    Field(FieldDecl),
    Message(MessageDecl),
    Enum(EnumDecl),
    Extend(ExtendDecl),
    Oneof(OneofDecl),
    Reserved(ReservedDecl),
    Extensions(ExtensionsDecl),
    Option(OptionDecl),
}

/// `message Name { ... }`
#[derive(Clone, PartialEq, Debug)]
pub struct MessageDecl {
    pub visibility: Option<VisibilityDecl>,
    pub name: Ident,
    pub items: Vec<MessageItem>,
    pub span: Span,
}

/// One value of an enum.
#[derive(Clone, PartialEq, Debug)]
pub struct EnumValueDecl {
    pub name: Ident,
    pub number: Expr,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// `enum Name { ... }`
#[derive(Clone, PartialEq, Debug)]
pub struct EnumDecl {
    pub visibility: Option<VisibilityDecl>,
    pub name: Ident,
    pub values: Vec<EnumValueDecl>,
    pub reserved: Vec<ReservedDecl>,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// `extend Extendee { ... }`
#[derive(Clone, PartialEq, Debug)]
pub struct ExtendDecl {
    pub extendee: TypePath,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

/// The type position of a method input or output.
#[derive(Clone, PartialEq, Debug)]
pub struct MethodType {
    pub stream: Option<Span>,
    pub path: TypePath,
    pub span: Span,
}

/// `rpc Name (In) returns (Out);`
#[derive(Clone, PartialEq, Debug)]
pub struct MethodDecl {
    pub name: Ident,
    pub input: MethodType,
    pub output: MethodType,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// `service Name { ... }`
#[derive(Clone, PartialEq, Debug)]
pub struct ServiceDecl {
    pub name: Ident,
    pub methods: Vec<MethodDecl>,
    pub options: Vec<OptionDecl>,
    pub span: Span,
}

/// A top-level declaration, in source order.
#[derive(Clone, PartialEq, Debug)]
pub enum Decl {
    Message(MessageDecl),
    Enum(EnumDecl),
    Extend(ExtendDecl),
    Service(ServiceDecl),
    Option(OptionDecl),
}

/// A parsed source file.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct File {
    pub syntax: Option<SyntaxDecl>,
    pub package: Option<PackageDecl>,
    pub imports: Vec<Import>,
    pub decls: Vec<Decl>,
}
