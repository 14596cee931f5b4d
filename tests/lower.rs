//! End-to-end lowering scenarios.
//!
//! Each test builds the AST a parser would produce for a small source
//! snippet (quoted in the test), lowers it with the map-backed importer,
//! and asserts on the produced diagnostics or IR.

mod support;

use pretty_assertions::assert_eq;

use prosem::ast::{self, MessageItem};
use prosem::ir::{ElemType, MemberKind, Presence, Symbol};
use prosem::{features, Decoration, FileNo, Session, Severity};

use support::*;

fn messages_of(report: &[prosem::Diagnostic]) -> Vec<String> {
    report.iter().map(|d| d.message.clone()).collect()
}

fn has_message(report: &[prosem::Diagnostic], needle: &str) -> bool {
    report.iter().any(|d| d.message.contains(needle))
}

/// S1: `message M { map<M, string> x = 1; }`
#[test]
fn s1_map_key_must_be_comparable() {
    let key_span = sp(16, 17);
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![MessageItem::Field(map_field(
                named_at("M", key_span),
                named("string"),
                "x",
                int(1),
            ))],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "s1.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("non-comparable type in map key type"))
        .unwrap_or_else(|| panic!("missing diagnostic, got {:?}", messages_of(&report)));
    assert_eq!(diagnostic.primary.as_ref().unwrap().span, key_span);
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Help(help) if help.contains("int64") && help.contains("string")
    )));
}

/// S2: `message M { list<string> xs = 1; }`
#[test]
fn s2_generic_types_other_than_map_rejected() {
    let list_span = sp(12, 16);
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![MessageItem::Field(field(
                ast::TypeName::Generic {
                    base: type_path_at("list", list_span),
                    args: vec![named("string")],
                    span: sp(12, 24),
                },
                "xs",
                int(1),
            ))],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "s2.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("generic types other than `map` are not supported"))
        .unwrap_or_else(|| panic!("missing diagnostic, got {:?}", messages_of(&report)));
    assert_eq!(diagnostic.primary.as_ref().unwrap().span, list_span);
}

/// S3: `message M { int32 x = 19500; }`
#[test]
fn s3_reserved_field_number_band() {
    let number_span = sp(22, 27);
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![MessageItem::Field(field(
                named("int32"),
                "x",
                int_at(19500, number_span),
            ))],
        )],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "s3.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("field number out of range"))
        .unwrap_or_else(|| panic!("missing diagnostic, got {:?}", messages_of(&report)));
    assert_eq!(diagnostic.primary.as_ref().unwrap().span, number_span);
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Help(help) if help.contains("19000") && help.contains("19999")
    )));
    // The number saturates out of the band so later passes keep going.
    let file = file.unwrap();
    let member = file.members.iter().next().unwrap().1;
    assert!(member.number == 18999 || member.number == 20000);
}

/// S4 (edition 2023): `enum E { FOO = 1; }`
#[test]
fn s4_open_enum_first_value_must_be_zero() {
    let syntax_span = sp(0, 16);
    let ast = ast::File {
        syntax: edition("2023", syntax_span),
        decls: vec![enum_decl("E", vec![enum_value("FOO", int_at(1, sp(28, 29)))])],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "s4.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("first value of open enum must be zero"))
        .unwrap_or_else(|| panic!("missing diagnostic, got {:?}", messages_of(&report)));
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Snippet(snippet) if snippet.span == syntax_span
    )));
}

/// S5: two files importing each other yield one cycle diagnostic.
#[test]
fn s5_import_cycle_reported_once() {
    let session = Session::new();
    let mut importer = TestImporter::new(&session);
    importer.add(
        "a.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("b.proto", sp(16, 34))],
            ..Default::default()
        },
    );
    importer.add(
        "b.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("a.proto", sp(16, 34))],
            ..Default::default()
        },
    );
    let mut report = Vec::new();
    importer.lower_root("a.proto", &mut report).unwrap();

    let mut all = report;
    all.append(&mut importer.dep_diagnostics);
    let cycles: Vec<_> = all
        .iter()
        .filter(|d| d.message.contains("import cycle"))
        .collect();
    assert_eq!(cycles.len(), 1, "got {:?}", messages_of(&all));
    // Both participating import declarations are listed.
    let cycle = cycles[0];
    let mentioned = cycle.message.matches("imports").count();
    assert_eq!(mentioned, 2);
}

/// S6: an unused import warns with a whole-statement delete edit.
#[test]
fn s6_unused_import_suggests_deletion() {
    let import_span = sp(16, 36);
    let session = Session::new();
    let mut importer = TestImporter::new(&session);
    importer.add(
        "dep.proto",
        ast::File {
            syntax: proto3(),
            package: package("dep"),
            decls: vec![message("D", vec![])],
            ..Default::default()
        },
    );
    importer.add(
        "main.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("dep.proto", import_span)],
            decls: vec![message("M", vec![])],
            ..Default::default()
        },
    );
    let mut report = Vec::new();
    importer.lower_root("main.proto", &mut report).unwrap();

    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("never used"))
        .unwrap_or_else(|| panic!("missing warning, got {:?}", messages_of(&report)));
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Edit { span, replacement, .. }
            if *span == import_span && replacement.is_empty()
    )));
}

/// S7: `optional int32 x = 1 [default = 0];`
#[test]
fn s7_redundant_custom_default_warns() {
    let mut field_decl = optional_field(named("int32"), "x", int(1));
    field_decl.options = vec![option("default", int(0))];
    let ast = ast::File {
        syntax: proto2(),
        decls: vec![message("M", vec![MessageItem::Field(field_decl)])],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "s7.proto");
    assert!(
        has_message(&report, "redundant custom default"),
        "got {:?}",
        messages_of(&report)
    );
}

#[test]
fn map_fields_lower_to_entry_messages() {
    let ast = ast::File {
        syntax: proto3(),
        package: package("demo"),
        decls: vec![message(
            "M",
            vec![MessageItem::Field(map_field(
                named("string"),
                named("int32"),
                "labels",
                int(3),
            ))],
        )],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "maps.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();

    let entry = file
        .types
        .iter()
        .find(|(_, t)| t.map_entry_of.is_some())
        .map(|(_, t)| t)
        .expect("synthesized entry type");
    assert_eq!(&*file.session.str(entry.fqn), "demo.M.LabelsEntry");
    assert_eq!(entry.members.len(), 2);
    // map_entry = true is set on the synthesized options.
    let names = file.session.names();
    assert_eq!(file.option_bool(entry.options, names.map_entry), Some(true));

    let map_member = file.types[file.top_types[0]]
        .fields()
        .first()
        .copied()
        .expect("the map field");
    let member = &file.members[map_member];
    assert_eq!(member.presence, Presence::Repeated);
    assert!(matches!(member.elem, ElemType::Named(_)));
}

#[test]
fn fqns_are_unique_within_a_file() {
    let ast = ast::File {
        syntax: proto3(),
        package: package("a.b"),
        decls: vec![
            message(
                "Outer",
                vec![
                    MessageItem::Message(match message("Inner", vec![]) {
                        ast::Decl::Message(m) => m,
                        _ => unreachable!(),
                    }),
                    MessageItem::Field(field(named("int32"), "x", int(1))),
                ],
            ),
            enum_decl("E", vec![enum_value("E_ZERO", int(0))]),
        ],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "fqn.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();

    let mut fqns: Vec<u32> = file.symtab.iter().map(|entry| entry.fqn.raw()).collect();
    let before = fqns.len();
    fqns.sort_unstable();
    fqns.dedup();
    assert_eq!(before, fqns.len());
}

#[test]
fn member_numbers_stay_in_range() {
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![
                MessageItem::Field(field(named("int32"), "a", int(1))),
                MessageItem::Field(field(named("int32"), "b", int(536870911))),
            ],
        )],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "numbers.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();
    for (_, member) in file.members.iter() {
        if member.number == 0 {
            continue;
        }
        assert!(member.number >= 1 && member.number < (1 << 29));
        assert!(!(19000..=19999).contains(&member.number));
    }
}

#[test]
fn duplicate_field_numbers_are_rejected() {
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![
                MessageItem::Field(field(named("int32"), "a", int_at(7, sp(20, 21)))),
                MessageItem::Field(field(named("int32"), "b", int_at(7, sp(40, 41)))),
            ],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "dup.proto");
    assert!(
        has_message(&report, "number 7 is already used"),
        "got {:?}",
        messages_of(&report)
    );
}

#[test]
fn enum_aliases_require_allow_alias() {
    let values = vec![
        enum_value("E_A", int(0)),
        enum_value("E_B", int_at(0, sp(30, 31))),
    ];

    let plain = ast::File {
        syntax: proto3(),
        decls: vec![enum_decl("E", values.clone())],
        ..Default::default()
    };
    let (_, report) = lower_file(plain, "alias.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("already used"))
        .expect("duplicate enum number must be diagnosed");
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Help(help) if help.contains("allow_alias")
    )));

    let mut aliased_decl = match enum_decl("E", values) {
        ast::Decl::Enum(e) => e,
        _ => unreachable!(),
    };
    aliased_decl.options = vec![option("allow_alias", path_expr("true"))];
    let aliased = ast::File {
        syntax: proto3(),
        decls: vec![ast::Decl::Enum(aliased_decl)],
        ..Default::default()
    };
    let (_, report) = lower_file(aliased, "alias2.proto");
    assert!(
        !has_message(&report, "already used"),
        "got {:?}",
        messages_of(&report)
    );
}

#[test]
fn cross_file_references_resolve_and_mark_imports_used() {
    let session = Session::new();
    let mut importer = TestImporter::new(&session);
    importer.add(
        "types.proto",
        ast::File {
            syntax: proto3(),
            package: package("pkg"),
            decls: vec![message("M", vec![])],
            ..Default::default()
        },
    );
    importer.add(
        "main.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("types.proto", sp(16, 38))],
            decls: vec![message(
                "Holder",
                vec![MessageItem::Field(field(named("pkg.M"), "m", int(1)))],
            )],
            ..Default::default()
        },
    );
    let mut report = Vec::new();
    let file = importer.lower_root("main.proto", &mut report).unwrap();
    assert!(report.is_empty(), "got {:?}", messages_of(&report));

    let holder = &file.types[file.top_types[0]];
    let member = &file.members[holder.fields()[0]];
    assert!(matches!(member.elem, ElemType::Named(t) if !t.file.is_self()));
    let dep = file
        .dep_by_path(session.intern("types.proto"))
        .map(|(_, dep)| dep)
        .unwrap();
    assert!(dep.is_used());
}

#[test]
fn transitive_symbols_need_public_chains() {
    let session = Session::new();
    let mut importer = TestImporter::new(&session);
    importer.add(
        "base.proto",
        ast::File {
            syntax: proto3(),
            package: package("pkg"),
            decls: vec![message("M", vec![])],
            ..Default::default()
        },
    );
    importer.add(
        "middle.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("base.proto", sp(16, 36))],
            // Keep the import alive so the unused warning stays out of
            // the assertion's way.
            decls: vec![message(
                "Keep",
                vec![MessageItem::Field(field(named("pkg.M"), "m", int(1)))],
            )],
            ..Default::default()
        },
    );
    importer.add(
        "main.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("middle.proto", sp(16, 40))],
            decls: vec![message(
                "Holder",
                vec![MessageItem::Field(field(named("pkg.M"), "m", int(1)))],
            )],
            ..Default::default()
        },
    );
    let mut report = Vec::new();
    importer.lower_root("main.proto", &mut report).unwrap();
    assert!(
        has_message(&report, "not visible"),
        "got {:?}",
        messages_of(&report)
    );

    // The same shape with `import public` resolves.
    let session = Session::new();
    let mut importer = TestImporter::new(&session);
    importer.add(
        "base.proto",
        ast::File {
            syntax: proto3(),
            package: package("pkg"),
            decls: vec![message("M", vec![])],
            ..Default::default()
        },
    );
    importer.add(
        "middle.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![public_import("base.proto", sp(16, 43))],
            ..Default::default()
        },
    );
    importer.add(
        "main.proto",
        ast::File {
            syntax: proto3(),
            imports: vec![import("middle.proto", sp(16, 40))],
            decls: vec![message(
                "Holder",
                vec![MessageItem::Field(field(named("pkg.M"), "m", int(1)))],
            )],
            ..Default::default()
        },
    );
    let mut report = Vec::new();
    importer.lower_root("main.proto", &mut report).unwrap();
    assert!(
        !has_message(&report, "not visible"),
        "got {:?}",
        messages_of(&report)
    );
}

#[test]
fn editions_presence_comes_from_features() {
    let ast = ast::File {
        syntax: edition("2023", sp(0, 16)),
        decls: vec![
            ast::Decl::Option(option("features.field_presence", path_expr("IMPLICIT"))),
            message(
                "M",
                vec![MessageItem::Field(field(named("int32"), "x", int(1)))],
            ),
        ],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "editions.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();
    let member = &file.members[file.types[file.top_types[0]].fields()[0]];
    assert_eq!(member.presence, Presence::Implicit);
}

/// Property 5: an unset feature at a child scope resolves to the parent's
/// value, flagged inherited.
#[test]
fn feature_inheritance_is_monotone() {
    let ast = ast::File {
        syntax: edition("2023", sp(0, 16)),
        decls: vec![
            ast::Decl::Option(option("features.enum_type", path_expr("CLOSED"))),
            message("Outer", vec![]),
        ],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "inherit.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();
    let session = &file.session;

    let descriptor = session.intern("google/protobuf/descriptor.proto");
    let (dep_index, dep) = file.dep_by_path(descriptor).unwrap();
    let feature_set_fqn = session.intern("google.protobuf.FeatureSet");
    let feature_set = dep
        .file
        .symtab
        .lookup(feature_set_fqn)
        .iter()
        .find_map(|entry| match entry.sym {
            Symbol::Message(idx) => Some(idx),
            _ => None,
        })
        .unwrap();
    let enum_type_field = file
        .member_named(
            prosem::ir::TypeRef {
                file: FileNo::dep(dep_index),
                idx: feature_set,
            },
            session.intern("enum_type"),
        )
        .unwrap();

    let file_set = file.features.unwrap();
    let type_set = file.types[file.top_types[0]].features.unwrap();
    let at_file = features::lookup_feature(&file, file_set, enum_type_field);
    let at_type = features::lookup_feature(&file, type_set, enum_type_field);
    assert_eq!(at_file.value, at_type.value);
    assert!(!at_file.is_inherited);
    assert!(at_type.is_inherited);
    assert!(!at_type.is_default);
}

#[test]
fn packed_in_editions_suggests_the_feature() {
    let mut field_decl = field(named("int32"), "xs", int(1));
    field_decl.label = Some(ast::Label {
        kind: ast::LabelKind::Repeated,
        span: sp(18, 26),
    });
    field_decl.options = vec![option("packed", path_expr("true"))];
    let ast = ast::File {
        syntax: edition("2023", sp(0, 16)),
        decls: vec![message("M", vec![MessageItem::Field(field_decl)])],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "packed.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("`packed` option is not used in editions"))
        .unwrap_or_else(|| panic!("missing warning, got {:?}", messages_of(&report)));
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Edit { replacement, .. }
            if replacement.contains("repeated_field_encoding")
    )));
}

#[test]
fn custom_options_resolve_as_extensions() {
    let mut tagged = field(named("string"), "name", int(1));
    tagged.options = vec![custom_option("opt_tag", string_expr("pii"))];
    let extension_field = ast::FieldDecl {
        label: Some(ast::Label {
            kind: ast::LabelKind::Optional,
            span: sp(0, 0),
        }),
        typ: named("string"),
        name: ident("opt_tag"),
        number: int(50001),
        options: Vec::new(),
        group_body: None,
        span: sp(0, 0),
    };
    let ast = ast::File {
        syntax: proto2(),
        package: package("demo"),
        imports: vec![import("google/protobuf/descriptor.proto", sp(16, 57))],
        decls: vec![
            ast::Decl::Extend(ast::ExtendDecl {
                extendee: type_path("google.protobuf.FieldOptions"),
                fields: vec![extension_field],
                span: sp(0, 0),
            }),
            message("M", vec![MessageItem::Field(tagged)]),
        ],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "custom.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();

    // The extension member exists and the tagged field's options carry a
    // value keyed by its FQN.
    let extension = file
        .members
        .iter()
        .find(|(_, m)| m.kind == MemberKind::Extension)
        .map(|(_, m)| m)
        .unwrap();
    assert_eq!(&*file.session.str(extension.fqn), "demo.opt_tag");

    let tagged_member = file
        .members
        .iter()
        .find(|(_, m)| &*file.session.str(m.name) == "name")
        .map(|(_, m)| m)
        .unwrap();
    let options = tagged_member.options.expect("options tree");
    let key = file.session.intern("demo.opt_tag");
    assert!(file.msg_values[options].by_key.contains_key(&key));
}

#[test]
fn reserved_names_block_members() {
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![
                MessageItem::Reserved(ast::ReservedDecl {
                    ranges: Vec::new(),
                    names: vec![ident_at("foo", sp(22, 27))],
                    span: sp(13, 28),
                }),
                MessageItem::Field(field(named("int32"), "foo", int(1))),
            ],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "reserved.proto");
    assert!(
        has_message(&report, "`foo` is reserved"),
        "got {:?}",
        messages_of(&report)
    );
}

#[test]
fn reserved_ranges_are_enforced_and_disjoint() {
    let reserved_span = sp(13, 30);
    let overlap_span = sp(31, 48);
    let single_span = sp(49, 60);
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![
                MessageItem::Reserved(ast::ReservedDecl {
                    ranges: vec![ast::RangeExpr {
                        start: int(5),
                        end: ast::RangeEnd::Expr(int(10)),
                        span: reserved_span,
                    }],
                    names: Vec::new(),
                    span: reserved_span,
                }),
                MessageItem::Reserved(ast::ReservedDecl {
                    ranges: vec![ast::RangeExpr {
                        start: int(8),
                        end: ast::RangeEnd::Expr(int(12)),
                        span: overlap_span,
                    }],
                    names: Vec::new(),
                    span: overlap_span,
                }),
                MessageItem::Reserved(ast::ReservedDecl {
                    ranges: vec![ast::RangeExpr {
                        start: int(20),
                        end: ast::RangeEnd::Expr(int(20)),
                        span: single_span,
                    }],
                    names: Vec::new(),
                    span: single_span,
                }),
                MessageItem::Field(field(named("int32"), "x", int_at(7, sp(70, 71)))),
            ],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "ranges.proto");

    // Field 7 sits inside the reserved 5..10 range.
    assert!(
        has_message(&report, "number 7 is reserved"),
        "got {:?}",
        messages_of(&report)
    );
    // 5..10 and 8..12 overlap.
    assert!(
        has_message(&report, "ranges overlap"),
        "got {:?}",
        messages_of(&report)
    );
    // `20 to 20` warns with a simplification edit.
    let single = report
        .iter()
        .find(|d| d.message.contains("single number"))
        .unwrap_or_else(|| panic!("missing warning, got {:?}", messages_of(&report)));
    assert!(single.decorations.iter().any(|d| matches!(
        d,
        Decoration::Edit { replacement, .. } if replacement == "20"
    )));
}

#[test]
fn oneofs_share_presence_and_collide_in_options() {
    let ast = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![MessageItem::Oneof(ast::OneofDecl {
                name: ident("choice"),
                fields: vec![
                    field(named("int32"), "a", int(1)),
                    field(named("string"), "b", int(2)),
                ],
                options: Vec::new(),
                span: sp(0, 0),
            })],
        )],
        ..Default::default()
    };
    let (file, report) = lower_file(ast, "oneof.proto");
    assert!(report.is_empty(), "got {:?}", messages_of(&report));
    let file = file.unwrap();
    for (_, member) in file.members.iter() {
        assert_eq!(member.presence, Presence::Shared);
        assert!(member.oneof.is_some());
    }
}

/// MessageSet wire-format rules: field-bearing and range-less MessageSets
/// are rejected, valid ones warn as deprecated, and extensions of a
/// MessageSet must be singular messages.
#[test]
fn message_set_rules_are_enforced() {
    let mut rep_ext = field(named("Payload"), "rep_ext", int(151));
    rep_ext.label = Some(ast::Label {
        kind: ast::LabelKind::Repeated,
        span: sp(0, 0),
    });
    let ast_file = ast::File {
        syntax: proto2(),
        decls: vec![
            message("Payload", vec![]),
            message(
                "BadFields",
                vec![
                    MessageItem::Option(option("message_set_wire_format", path_expr("true"))),
                    MessageItem::Field(optional_field(named("int32"), "x", int(1))),
                ],
            ),
            message(
                "NoRanges",
                vec![MessageItem::Option(option(
                    "message_set_wire_format",
                    path_expr("true"),
                ))],
            ),
            message(
                "GoodSet",
                vec![
                    MessageItem::Option(option("message_set_wire_format", path_expr("true"))),
                    MessageItem::Extensions(ast::ExtensionsDecl {
                        ranges: vec![ast::RangeExpr {
                            start: int(100),
                            end: ast::RangeEnd::Expr(int(199)),
                            span: sp(0, 0),
                        }],
                        options: Vec::new(),
                        span: sp(0, 0),
                    }),
                ],
            ),
            ast::Decl::Extend(ast::ExtendDecl {
                extendee: type_path("GoodSet"),
                fields: vec![
                    optional_field(named("int32"), "bad_ext", int(150)),
                    rep_ext,
                    optional_field(named("Payload"), "good_ext", int(152)),
                ],
                span: sp(0, 0),
            }),
        ],
        ..Default::default()
    };
    let (_, report) = lower_file(ast_file, "messageset.proto");

    assert!(
        has_message(&report, "may not declare fields or oneofs"),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(&report, "requires at least one extension range"),
        "got {:?}",
        messages_of(&report)
    );
    let deprecated = report
        .iter()
        .find(|d| d.message.contains("MessageSet wire format is deprecated"))
        .unwrap_or_else(|| panic!("missing warning, got {:?}", messages_of(&report)));
    assert_eq!(deprecated.severity, Severity::Warning);
    // The int32 extension and the repeated one are both the wrong shape;
    // the singular message-typed one passes.
    let shape_errors = report
        .iter()
        .filter(|d| {
            d.message
                .contains("extensions of a MessageSet must be singular message-typed fields")
        })
        .count();
    assert_eq!(shape_errors, 2, "got {:?}", messages_of(&report));

    // proto3 forbids the wire format entirely.
    let p3 = ast::File {
        syntax: proto3(),
        decls: vec![message(
            "Set",
            vec![MessageItem::Option(option(
                "message_set_wire_format",
                path_expr("true"),
            ))],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(p3, "messageset3.proto");
    assert!(
        has_message(&report, "MessageSet wire format is not supported in proto3"),
        "got {:?}",
        messages_of(&report)
    );
}

/// Type constraints on `ctype`, `jstype` and the lazy options, plus the
/// editions supersession warning for `ctype`.
#[test]
fn field_option_type_constraints() {
    let mut a = optional_field(named("int32"), "a", int(1));
    a.options = vec![option("ctype", path_expr("CORD"))];
    let mut b = optional_field(named("string"), "b", int(2));
    b.options = vec![option("jstype", path_expr("JS_STRING"))];
    let mut c = optional_field(named("int32"), "c", int(3));
    c.options = vec![option("lazy", path_expr("true"))];
    let ast_file = ast::File {
        syntax: proto2(),
        decls: vec![message(
            "M",
            vec![
                MessageItem::Field(a),
                MessageItem::Field(b),
                MessageItem::Field(c),
            ],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast_file, "fieldopts.proto");
    assert!(
        has_message(&report, "`ctype` is only allowed on string and bytes fields"),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(&report, "`jstype` is only allowed on 64-bit integer fields"),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(&report, "lazy parsing options require a message-typed field"),
        "got {:?}",
        messages_of(&report)
    );

    // On a well-typed field under editions, `ctype` survives only with a
    // supersession warning.
    let mut d = field(named("string"), "d", int(1));
    d.options = vec![option("ctype", path_expr("CORD"))];
    let editions_file = ast::File {
        syntax: edition("2023", sp(0, 16)),
        decls: vec![message("M", vec![MessageItem::Field(d)])],
        ..Default::default()
    };
    let (_, report) = lower_file(editions_file, "fieldopts2023.proto");
    let superseded = report
        .iter()
        .find(|d| d.message.contains("`ctype` is superseded in editions"))
        .unwrap_or_else(|| panic!("missing warning, got {:?}", messages_of(&report)));
    assert_eq!(superseded.severity, Severity::Warning);
}

/// Extension declarations: declared numbers must land inside the range,
/// the defining extension must agree on name, type and cardinality,
/// reserved numbers stay unusable, undeclared numbers are rejected, and
/// `verification = UNVERIFIED` contradicts having declarations at all.
#[test]
fn extension_declarations_are_checked() {
    let declared_range = ast::ExtensionsDecl {
        ranges: vec![ast::RangeExpr {
            start: int(1000),
            end: ast::RangeEnd::Expr(int(1999)),
            span: sp(10, 33),
        }],
        options: vec![
            option(
                "declaration",
                dict(vec![
                    ("number", int(1000)),
                    ("full_name", string_expr(".decl.matching")),
                    ("type", string_expr("int32")),
                ]),
            ),
            option(
                "declaration",
                dict(vec![
                    ("number", int(1001)),
                    ("full_name", string_expr(".decl.wrong_name")),
                    ("type", string_expr("string")),
                ]),
            ),
            option(
                "declaration",
                dict(vec![("number", int(1002)), ("reserved", path_expr("true"))]),
            ),
            option(
                "declaration",
                dict(vec![
                    ("number", int(1003)),
                    ("full_name", string_expr(".decl.multi")),
                    ("type", string_expr("int32")),
                    ("repeated", path_expr("true")),
                ]),
            ),
            option(
                "declaration",
                dict(vec![
                    ("number", int(5)),
                    ("full_name", string_expr(".decl.out_of_range")),
                    ("type", string_expr("int32")),
                ]),
            ),
        ],
        span: sp(10, 40),
    };
    let unverified_range = ast::ExtensionsDecl {
        ranges: vec![ast::RangeExpr {
            start: int(10),
            end: ast::RangeEnd::Expr(int(19)),
            span: sp(50, 70),
        }],
        options: vec![
            option("verification", path_expr("UNVERIFIED")),
            option(
                "declaration",
                dict(vec![
                    ("number", int(10)),
                    ("full_name", string_expr(".decl.x")),
                    ("type", string_expr("int32")),
                ]),
            ),
        ],
        span: sp(50, 80),
    };
    let ast_file = ast::File {
        syntax: proto2(),
        package: package("decl"),
        decls: vec![
            message("Host", vec![MessageItem::Extensions(declared_range)]),
            message("Unverified", vec![MessageItem::Extensions(unverified_range)]),
            ast::Decl::Extend(ast::ExtendDecl {
                extendee: type_path("Host"),
                fields: vec![
                    optional_field(named("int32"), "matching", int(1000)),
                    optional_field(named("int64"), "mismatched", int(1001)),
                    optional_field(named("int32"), "taken", int(1002)),
                    optional_field(named("int32"), "multi", int(1003)),
                    optional_field(named("int32"), "undeclared", int(1500)),
                ],
                span: sp(0, 0),
            }),
        ],
        ..Default::default()
    };
    let (_, report) = lower_file(ast_file, "declarations.proto");

    assert!(
        has_message(&report, "declared number 5 is outside the extension range"),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(
            &report,
            "declared as `.decl.wrong_name` but defined as `.decl.mismatched`"
        ),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(
            &report,
            "declared with type `string` but defined with type `int64`"
        ),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(
            &report,
            "extension number 1002 is reserved by the extendee's declarations"
        ),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(&report, "declared repeated but defined singular"),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(
            &report,
            "extension number 1500 has no declaration in the extendee's extension range"
        ),
        "got {:?}",
        messages_of(&report)
    );
    assert!(
        has_message(
            &report,
            "`verification = UNVERIFIED` cannot be combined with declarations"
        ),
        "got {:?}",
        messages_of(&report)
    );
    // The conforming extension draws no diagnostics at all.
    assert!(
        !has_message(&report, ".decl.matching"),
        "got {:?}",
        messages_of(&report)
    );
}

/// STYLE2024 naming enforcement: under edition 2024 the
/// `enforce_naming_style` feature defaults to STYLE2024 and badly-cased
/// names get rename edits.
#[test]
fn style2024_names_get_rename_edits() {
    let ast_file = ast::File {
        syntax: edition("2024", sp(0, 16)),
        decls: vec![
            ast::Decl::Message(ast::MessageDecl {
                visibility: None,
                name: ident_at("bad_message", sp(26, 37)),
                items: vec![MessageItem::Field(ast::FieldDecl {
                    label: None,
                    typ: named("int32"),
                    name: ident_at("BadField", sp(50, 58)),
                    number: int(1),
                    options: Vec::new(),
                    group_body: None,
                    span: sp(44, 63),
                })],
                span: sp(18, 65),
            }),
            ast::Decl::Enum(ast::EnumDecl {
                visibility: None,
                name: ident_at("Color", sp(72, 77)),
                values: vec![ast::EnumValueDecl {
                    name: ident_at("red", sp(84, 87)),
                    number: int(0),
                    options: Vec::new(),
                    span: sp(84, 92),
                }],
                reserved: Vec::new(),
                options: Vec::new(),
                span: sp(67, 94),
            }),
        ],
        ..Default::default()
    };
    let (_, report) = lower_file(ast_file, "style.proto");

    let expect_edit = |needle: &str, replacement: &str| {
        let diagnostic = report
            .iter()
            .find(|d| d.message.contains(needle))
            .unwrap_or_else(|| {
                panic!("missing `{}` diagnostic, got {:?}", needle, messages_of(&report))
            });
        assert!(
            diagnostic.decorations.iter().any(|d| matches!(
                d,
                Decoration::Edit { replacement: r, .. } if r == replacement
            )),
            "wrong edit for `{}`: {:?}",
            needle,
            diagnostic
        );
    };
    expect_edit("type names must be PascalCase", "BadMessage");
    expect_edit("field names must be lower_snake_case", "bad_field");
    expect_edit("enum value names must be SCREAMING_SNAKE_CASE", "RED");
    assert_eq!(report.len(), 3, "got {:?}", messages_of(&report));
}

/// Property 7: identical input yields identical diagnostics.
#[test]
fn diagnostics_are_deterministic() {
    let build = || ast::File {
        syntax: proto3(),
        decls: vec![message(
            "M",
            vec![
                MessageItem::Field(field(named("int32"), "a", int_at(7, sp(20, 21)))),
                MessageItem::Field(field(named("int32"), "b", int_at(7, sp(40, 41)))),
                MessageItem::Field(field(named("Missing"), "c", int_at(19500, sp(60, 65)))),
            ],
        )],
        ..Default::default()
    };
    let (_, mut first) = lower_file(build(), "det.proto");
    let (_, mut second) = lower_file(build(), "det.proto");
    prosem::sort_diagnostics(&mut first);
    prosem::sort_diagnostics(&mut second);
    assert_eq!(first, second);
    assert!(first.len() >= 3);
}

#[test]
fn unresolved_names_report_the_search_scope() {
    let ast = ast::File {
        syntax: proto3(),
        package: package("a.b"),
        decls: vec![message(
            "M",
            vec![MessageItem::Field(field(
                named_at("NoSuchType", sp(30, 40)),
                "x",
                int(1),
            ))],
        )],
        ..Default::default()
    };
    let (_, report) = lower_file(ast, "missing.proto");
    let diagnostic = report
        .iter()
        .find(|d| d.message.contains("cannot resolve `NoSuchType`"))
        .unwrap_or_else(|| panic!("missing diagnostic, got {:?}", messages_of(&report)));
    assert!(diagnostic.decorations.iter().any(|d| matches!(
        d,
        Decoration::Note(note) if note.contains("a.b.M")
    )));
}
