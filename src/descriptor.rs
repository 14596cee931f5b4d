//! A synthesized AST for `google/protobuf/descriptor.proto`.
//!
//! The pipeline implicitly requires descriptor.proto for option and
//! feature resolution. Drivers whose opener ships the real file parse it
//! like any other input; drivers without one (and this crate's own tests)
//! can serve [`descriptor_file`] from the importer instead. Only the
//! subset the analyzer itself consumes is modeled: the options messages,
//! `FeatureSet` with its feature fields and their edition-default tables,
//! `ExtensionRangeOptions.Declaration`, and the `Edition` enum. Field
//! numbers match the upstream file.

use crate::ast::{
    Decl, DictEntry, DictKey, EnumDecl, EnumValueDecl, Expr, ExtensionsDecl, FieldDecl, File,
    Ident, Label, LabelKind, MessageDecl, MessageItem, OptionDecl, OptionPath, OptionPathPart,
    PackageDecl, RangeEnd, RangeExpr, Span, SyntaxDecl, TypeName, TypePath,
};

fn sp() -> Span {
    Span::default()
}

fn ident(name: &str) -> Ident {
    Ident::new(name, sp())
}

fn type_path(name: &str) -> TypePath {
    TypePath {
        absolute: false,
        segments: name.split('.').map(ident).collect(),
        span: sp(),
    }
}

fn named(name: &str) -> TypeName {
    TypeName::Named(type_path(name))
}

fn int(value: u64) -> Expr {
    Expr::Int { value, span: sp() }
}

fn string(value: &str) -> Expr {
    Expr::Str {
        value: value.to_owned(),
        span: sp(),
    }
}

fn path_expr(name: &str) -> Expr {
    Expr::Path(type_path(name))
}

fn dict(entries: Vec<(&str, Expr)>) -> Expr {
    Expr::Dict {
        entries: entries
            .into_iter()
            .map(|(key, value)| DictEntry {
                key: DictKey::Field(ident(key)),
                value,
                span: sp(),
            })
            .collect(),
        span: sp(),
    }
}

fn option(name: &str, value: Expr) -> OptionDecl {
    OptionDecl {
        path: OptionPath {
            parts: vec![OptionPathPart::Simple(ident(name))],
            span: sp(),
        },
        value,
        span: sp(),
    }
}

fn field(label: LabelKind, typ: &str, name: &str, number: u64) -> FieldDecl {
    field_with(label, typ, name, number, Vec::new())
}

fn field_with(
    label: LabelKind,
    typ: &str,
    name: &str,
    number: u64,
    options: Vec<OptionDecl>,
) -> FieldDecl {
    FieldDecl {
        label: Some(Label { kind: label, span: sp() }),
        typ: named(typ),
        name: ident(name),
        number: int(number),
        options,
        group_body: None,
        span: sp(),
    }
}

fn optional(typ: &str, name: &str, number: u64) -> MessageItem {
    MessageItem::Field(field(LabelKind::Optional, typ, name, number))
}

fn repeated(typ: &str, name: &str, number: u64) -> MessageItem {
    MessageItem::Field(field(LabelKind::Repeated, typ, name, number))
}

fn value(name: &str, number: u64) -> EnumValueDecl {
    EnumValueDecl {
        name: ident(name),
        number: int(number),
        options: Vec::new(),
        span: sp(),
    }
}

fn enum_decl(name: &str, values: Vec<EnumValueDecl>) -> EnumDecl {
    EnumDecl {
        visibility: None,
        name: ident(name),
        values,
        reserved: Vec::new(),
        options: Vec::new(),
        span: sp(),
    }
}

fn message(name: &str, items: Vec<MessageItem>) -> MessageDecl {
    MessageDecl {
        visibility: None,
        name: ident(name),
        items,
        span: sp(),
    }
}

/// `extensions 1000 to max;`: every options message is extensible, which
/// is what custom options hang off.
fn custom_option_range() -> MessageItem {
    MessageItem::Extensions(ExtensionsDecl {
        ranges: vec![RangeExpr {
            start: int(1000),
            end: RangeEnd::Max(sp()),
            span: sp(),
        }],
        options: Vec::new(),
        span: sp(),
    })
}

/// `[edition_defaults = { edition: ..., value: "..." }]`
fn edition_default(edition: &str, default: &str) -> OptionDecl {
    option(
        "edition_defaults",
        dict(vec![
            ("edition", path_expr(edition)),
            ("value", string(default)),
        ]),
    )
}

/// `[feature_support = { edition_introduced: ... }]`
fn introduced(edition: &str) -> OptionDecl {
    option(
        "feature_support",
        dict(vec![("edition_introduced", path_expr(edition))]),
    )
}

/// A `FeatureSet` feature field: enum-typed, with a default-per-edition
/// table and a support window.
fn feature_field(
    typ: &str,
    name: &str,
    number: u64,
    defaults: &[(&str, &str)],
    introduced_in: &str,
) -> MessageItem {
    let mut options: Vec<OptionDecl> = defaults
        .iter()
        .map(|&(edition, default)| edition_default(edition, default))
        .collect();
    options.push(introduced(introduced_in));
    MessageItem::Field(field_with(LabelKind::Optional, typ, name, number, options))
}

fn feature_set() -> MessageDecl {
    message(
        "FeatureSet",
        vec![
            MessageItem::Enum(enum_decl(
                "FieldPresence",
                vec![
                    value("FIELD_PRESENCE_UNKNOWN", 0),
                    value("EXPLICIT", 1),
                    value("IMPLICIT", 2),
                    value("LEGACY_REQUIRED", 3),
                ],
            )),
            MessageItem::Enum(enum_decl(
                "EnumType",
                vec![
                    value("ENUM_TYPE_UNKNOWN", 0),
                    value("OPEN", 1),
                    value("CLOSED", 2),
                ],
            )),
            MessageItem::Enum(enum_decl(
                "RepeatedFieldEncoding",
                vec![
                    value("REPEATED_FIELD_ENCODING_UNKNOWN", 0),
                    value("PACKED", 1),
                    value("EXPANDED", 2),
                ],
            )),
            MessageItem::Enum(enum_decl(
                "Utf8Validation",
                vec![
                    value("UTF8_VALIDATION_UNKNOWN", 0),
                    value("VERIFY", 2),
                    value("NONE", 3),
                ],
            )),
            MessageItem::Enum(enum_decl(
                "MessageEncoding",
                vec![
                    value("MESSAGE_ENCODING_UNKNOWN", 0),
                    value("LENGTH_PREFIXED", 1),
                    value("DELIMITED", 2),
                ],
            )),
            MessageItem::Enum(enum_decl(
                "JsonFormat",
                vec![
                    value("JSON_FORMAT_UNKNOWN", 0),
                    value("ALLOW", 1),
                    value("LEGACY_BEST_EFFORT", 2),
                ],
            )),
            MessageItem::Enum(enum_decl(
                "EnforceNamingStyle",
                vec![
                    value("ENFORCE_NAMING_STYLE_UNKNOWN", 0),
                    value("STYLE2024", 1),
                    value("STYLE_LEGACY", 2),
                ],
            )),
            feature_field(
                "FieldPresence",
                "field_presence",
                1,
                &[
                    ("EDITION_LEGACY", "EXPLICIT"),
                    ("EDITION_PROTO3", "IMPLICIT"),
                    ("EDITION_2023", "EXPLICIT"),
                ],
                "EDITION_2023",
            ),
            feature_field(
                "EnumType",
                "enum_type",
                2,
                &[("EDITION_LEGACY", "CLOSED"), ("EDITION_PROTO3", "OPEN")],
                "EDITION_2023",
            ),
            feature_field(
                "RepeatedFieldEncoding",
                "repeated_field_encoding",
                3,
                &[("EDITION_LEGACY", "EXPANDED"), ("EDITION_PROTO3", "PACKED")],
                "EDITION_2023",
            ),
            feature_field(
                "Utf8Validation",
                "utf8_validation",
                4,
                &[("EDITION_LEGACY", "NONE"), ("EDITION_PROTO3", "VERIFY")],
                "EDITION_2023",
            ),
            feature_field(
                "MessageEncoding",
                "message_encoding",
                5,
                &[("EDITION_LEGACY", "LENGTH_PREFIXED")],
                "EDITION_2023",
            ),
            feature_field(
                "JsonFormat",
                "json_format",
                6,
                &[
                    ("EDITION_LEGACY", "LEGACY_BEST_EFFORT"),
                    ("EDITION_PROTO3", "ALLOW"),
                ],
                "EDITION_2023",
            ),
            feature_field(
                "EnforceNamingStyle",
                "enforce_naming_style",
                7,
                &[("EDITION_LEGACY", "STYLE_LEGACY"), ("EDITION_2024", "STYLE2024")],
                "EDITION_2024",
            ),
        ],
    )
}

fn edition_enum() -> EnumDecl {
    enum_decl(
        "Edition",
        vec![
            value("EDITION_UNKNOWN", 0),
            value("EDITION_LEGACY", 900),
            value("EDITION_PROTO2", 998),
            value("EDITION_PROTO3", 999),
            value("EDITION_2023", 1000),
            value("EDITION_2024", 1001),
        ],
    )
}

fn file_options() -> MessageDecl {
    message(
        "FileOptions",
        vec![
            optional("string", "java_package", 1),
            optional("string", "java_outer_classname", 8),
            optional("string", "go_package", 11),
            optional("bool", "deprecated", 23),
            optional("FeatureSet", "features", 50),
            custom_option_range(),
        ],
    )
}

fn message_options() -> MessageDecl {
    message(
        "MessageOptions",
        vec![
            optional("bool", "message_set_wire_format", 1),
            optional("bool", "no_standard_descriptor_accessor", 2),
            optional("bool", "deprecated", 3),
            optional("bool", "map_entry", 7),
            optional("FeatureSet", "features", 12),
            custom_option_range(),
        ],
    )
}

fn field_options() -> MessageDecl {
    message(
        "FieldOptions",
        vec![
            MessageItem::Enum(enum_decl(
                "CType",
                vec![value("STRING", 0), value("CORD", 1), value("STRING_PIECE", 2)],
            )),
            MessageItem::Enum(enum_decl(
                "JSType",
                vec![
                    value("JS_NORMAL", 0),
                    value("JS_STRING", 1),
                    value("JS_NUMBER", 2),
                ],
            )),
            MessageItem::Message(message(
                "EditionDefault",
                vec![optional("Edition", "edition", 3), optional("string", "value", 2)],
            )),
            MessageItem::Message(message(
                "FeatureSupport",
                vec![
                    optional("Edition", "edition_introduced", 1),
                    optional("Edition", "edition_deprecated", 2),
                    optional("string", "deprecation_warning", 3),
                    optional("Edition", "edition_removed", 4),
                ],
            )),
            optional("CType", "ctype", 1),
            optional("bool", "packed", 2),
            optional("JSType", "jstype", 6),
            optional("bool", "lazy", 5),
            optional("bool", "unverified_lazy", 15),
            optional("bool", "deprecated", 3),
            optional("bool", "debug_redact", 16),
            repeated("EditionDefault", "edition_defaults", 20),
            optional("FeatureSet", "features", 21),
            optional("FeatureSupport", "feature_support", 22),
            custom_option_range(),
        ],
    )
}

fn oneof_options() -> MessageDecl {
    message(
        "OneofOptions",
        vec![optional("FeatureSet", "features", 1), custom_option_range()],
    )
}

fn enum_options() -> MessageDecl {
    message(
        "EnumOptions",
        vec![
            optional("bool", "allow_alias", 2),
            optional("bool", "deprecated", 3),
            optional("FeatureSet", "features", 7),
            custom_option_range(),
        ],
    )
}

fn enum_value_options() -> MessageDecl {
    message(
        "EnumValueOptions",
        vec![
            optional("bool", "deprecated", 1),
            optional("FeatureSet", "features", 2),
            optional("bool", "debug_redact", 3),
            custom_option_range(),
        ],
    )
}

fn service_options() -> MessageDecl {
    message(
        "ServiceOptions",
        vec![
            optional("bool", "deprecated", 33),
            optional("FeatureSet", "features", 34),
            custom_option_range(),
        ],
    )
}

fn method_options() -> MessageDecl {
    message(
        "MethodOptions",
        vec![
            optional("bool", "deprecated", 33),
            optional("FeatureSet", "features", 35),
            custom_option_range(),
        ],
    )
}

fn extension_range_options() -> MessageDecl {
    message(
        "ExtensionRangeOptions",
        vec![
            MessageItem::Enum(enum_decl(
                "VerificationState",
                vec![value("DECLARATION", 0), value("UNVERIFIED", 1)],
            )),
            MessageItem::Message(message(
                "Declaration",
                vec![
                    optional("int32", "number", 1),
                    optional("string", "full_name", 2),
                    optional("string", "type", 3),
                    optional("bool", "reserved", 5),
                    optional("bool", "repeated", 6),
                ],
            )),
            repeated("Declaration", "declaration", 2),
            optional("FeatureSet", "features", 50),
            optional("VerificationState", "verification", 3),
            custom_option_range(),
        ],
    )
}

/// The descriptor.proto subset, ready to lower under the canonical path
/// `google/protobuf/descriptor.proto`.
pub fn descriptor_file() -> File {
    File {
        syntax: Some(SyntaxDecl {
            is_edition: false,
            value: "proto2".to_owned(),
            value_span: sp(),
            span: sp(),
        }),
        package: Some(PackageDecl {
            path: type_path("google.protobuf"),
            span: sp(),
        }),
        imports: Vec::new(),
        decls: vec![
            Decl::Enum(edition_enum()),
            Decl::Message(feature_set()),
            Decl::Message(file_options()),
            Decl::Message(message_options()),
            Decl::Message(field_options()),
            Decl::Message(oneof_options()),
            Decl::Message(enum_options()),
            Decl::Message(enum_value_options()),
            Decl::Message(service_options()),
            Decl::Message(method_options()),
            Decl::Message(extension_range_options()),
        ],
    }
}

/// `google/protobuf/any.proto`, for drivers exercising `Any` literals.
pub fn any_file() -> File {
    File {
        syntax: Some(SyntaxDecl {
            is_edition: false,
            value: "proto3".to_owned(),
            value_span: sp(),
            span: sp(),
        }),
        package: Some(PackageDecl {
            path: type_path("google.protobuf"),
            span: sp(),
        }),
        imports: Vec::new(),
        decls: vec![Decl::Message(message(
            "Any",
            vec![
                optional("string", "type_url", 1),
                optional("bytes", "value", 2),
            ],
        ))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_subset_shape() {
        let file = descriptor_file();
        assert_eq!(file.decls.len(), 11);
        let Decl::Message(features) = &file.decls[1] else {
            panic!("FeatureSet must be the second declaration");
        };
        assert_eq!(features.name.text, "FeatureSet");
        let fields: Vec<_> = features
            .items
            .iter()
            .filter_map(|item| match item {
                MessageItem::Field(field) => Some(field.name.text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(fields.len(), 7);
        assert!(fields.contains(&"field_presence"));
        assert!(fields.contains(&"enforce_naming_style"));
    }

    #[test]
    fn any_subset_shape() {
        let file = any_file();
        assert_eq!(file.decls.len(), 1);
    }
}
