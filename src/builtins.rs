//! Binding the well-known descriptor.proto symbols.
//!
//! Option lowering and feature propagation need typed handles to the
//! `google.protobuf` options messages and the `FeatureSet` machinery.
//! Instead of reflecting at runtime, a single declarative table of
//! `(name, setter)` rows resolves each well-known FQN against the merged
//! symbol table, which covers both the ordinary case (descriptor.proto is
//! a dep) and the self-hosting case (the file being lowered *is*
//! descriptor.proto).

use log::trace;

use crate::intern::Istr;
use crate::ir::{MemberRef, Symbol, TypeRef};
use crate::Lower;

/// Typed handles to the descriptor.proto symbols, relative to the file
/// being lowered. A `None` handle means descriptor.proto did not provide
/// the symbol; consumers then diagnose unresolved options normally.
#[derive(Default)]
pub(crate) struct Builtins {
    pub(crate) file_options: Option<TypeRef>,
    pub(crate) message_options: Option<TypeRef>,
    pub(crate) field_options: Option<TypeRef>,
    pub(crate) oneof_options: Option<TypeRef>,
    pub(crate) enum_options: Option<TypeRef>,
    pub(crate) enum_value_options: Option<TypeRef>,
    pub(crate) service_options: Option<TypeRef>,
    pub(crate) method_options: Option<TypeRef>,
    pub(crate) extension_range_options: Option<TypeRef>,
    pub(crate) feature_set: Option<TypeRef>,
    pub(crate) edition_enum: Option<TypeRef>,
    pub(crate) any: Option<TypeRef>,
}

/// The kind of entity an option annotates, selecting its options message.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum OptionTarget {
    File,
    Message,
    Field,
    Oneof,
    Enum,
    EnumValue,
    Service,
    Method,
    ExtensionRange,
}

impl OptionTarget {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            OptionTarget::File => "file",
            OptionTarget::Message => "message",
            OptionTarget::Field => "field",
            OptionTarget::Oneof => "oneof",
            OptionTarget::Enum => "enum",
            OptionTarget::EnumValue => "enum value",
            OptionTarget::Service => "service",
            OptionTarget::Method => "method",
            OptionTarget::ExtensionRange => "extension range",
        }
    }
}

impl Builtins {
    /// The options message annotating entities of `target`'s kind.
    pub(crate) fn options_message_for(&self, target: OptionTarget) -> Option<TypeRef> {
        match target {
            OptionTarget::File => self.file_options,
            OptionTarget::Message => self.message_options,
            OptionTarget::Field => self.field_options,
            OptionTarget::Oneof => self.oneof_options,
            OptionTarget::Enum => self.enum_options,
            OptionTarget::EnumValue => self.enum_value_options,
            OptionTarget::Service => self.service_options,
            OptionTarget::Method => self.method_options,
            OptionTarget::ExtensionRange => self.extension_range_options,
        }
    }
}

impl<'a> Lower<'a> {
    /// Resolves the built-ins table against the merged symbols (pass C13).
    pub(crate) fn bind_builtins(&mut self) {
        let names = self.session.names();
        // The declarative row list: one (interned name, setter) pair per
        // handle. Adding a built-in means adding a row.
        let rows: &[(Istr, fn(&mut Builtins, TypeRef))] = &[
            (names.file_options, |b, r| b.file_options = Some(r)),
            (names.message_options, |b, r| b.message_options = Some(r)),
            (names.field_options, |b, r| b.field_options = Some(r)),
            (names.oneof_options, |b, r| b.oneof_options = Some(r)),
            (names.enum_options, |b, r| b.enum_options = Some(r)),
            (names.enum_value_options, |b, r| {
                b.enum_value_options = Some(r)
            }),
            (names.service_options, |b, r| b.service_options = Some(r)),
            (names.method_options, |b, r| b.method_options = Some(r)),
            (names.extension_range_options, |b, r| {
                b.extension_range_options = Some(r)
            }),
            (names.feature_set, |b, r| b.feature_set = Some(r)),
            (names.edition_enum, |b, r| b.edition_enum = Some(r)),
            (names.any, |b, r| b.any = Some(r)),
        ];

        let mut builtins = Builtins::default();
        let mut bound = 0usize;
        for &(fqn, set) in rows {
            if let Some(type_ref) = self.find_builtin_type(fqn) {
                set(&mut builtins, type_ref);
                bound += 1;
            }
        }
        trace!("bound {}/{} built-in handles", bound, rows.len());
        self.builtins = builtins;
    }

    fn find_builtin_type(&self, fqn: Istr) -> Option<TypeRef> {
        self.file.merged.lookup(fqn).iter().find_map(|entry| {
            match entry.sym {
                Symbol::Message(idx) | Symbol::Enum(idx) => Some(TypeRef {
                    file: entry.file,
                    idx,
                }),
                _ => None,
            }
        })
    }

    /// Looks up a member of a built-in message by simple name.
    pub(crate) fn builtin_member(
        &self,
        message: Option<TypeRef>,
        name: Istr,
    ) -> Option<MemberRef> {
        self.file.member_named(message?, name)
    }
}
