//! Process-wide lowering state.
//!
//! A [`Session`] owns the string interner and the table of pre-interned
//! well-known names. It is created once by the driver, shared by reference
//! (`Arc`), and dropped with its last user; there is no other process-wide
//! state anywhere in the crate.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::intern::{Interner, Istr};

/// Declares the [`Names`] table: one interned ID per well-known
/// descriptor.proto identifier. The single list of `(field, literal)` rows
/// here replaces the runtime reflection walk of other implementations;
/// every later lookup is an ID comparison.
macro_rules! names {
    ($($field:ident => $literal:expr,)*) => {
        /// Pre-interned well-known names.
        #[allow(missing_docs)]
        #[derive(Debug)]
        pub struct Names {
            $(pub $field: Istr,)*
        }

        impl Names {
            fn preload(interner: &Interner) -> Names {
                Names {
                    $($field: interner.intern($literal),)*
                }
            }
        }
    };
}

names! {
    // Files and packages.
    descriptor_file => "google/protobuf/descriptor.proto",
    google_protobuf => "google.protobuf",

    // Options messages, keyed by the kind of entity they annotate.
    file_options => "google.protobuf.FileOptions",
    message_options => "google.protobuf.MessageOptions",
    field_options => "google.protobuf.FieldOptions",
    oneof_options => "google.protobuf.OneofOptions",
    enum_options => "google.protobuf.EnumOptions",
    enum_value_options => "google.protobuf.EnumValueOptions",
    service_options => "google.protobuf.ServiceOptions",
    method_options => "google.protobuf.MethodOptions",
    extension_range_options => "google.protobuf.ExtensionRangeOptions",
    feature_set => "google.protobuf.FeatureSet",
    edition_enum => "google.protobuf.Edition",
    any => "google.protobuf.Any",

    // Field names the pipeline treats specially.
    features => "features",
    map_entry => "map_entry",
    message_set_wire_format => "message_set_wire_format",
    allow_alias => "allow_alias",
    packed => "packed",
    ctype => "ctype",
    jstype => "jstype",
    lazy => "lazy",
    unverified_lazy => "unverified_lazy",
    deprecated => "deprecated",
    default => "default",
    json_name => "json_name",
    edition_defaults => "edition_defaults",
    feature_support => "feature_support",
    verification => "verification",
    declaration => "declaration",
    deprecation_warning => "deprecation_warning",
    edition_introduced => "edition_introduced",
    edition_deprecated => "edition_deprecated",
    edition_removed => "edition_removed",
    field_presence => "field_presence",
    enum_type => "enum_type",
    repeated_field_encoding => "repeated_field_encoding",
    utf8_validation => "utf8_validation",
    message_encoding => "message_encoding",
    json_format => "json_format",
    enforce_naming_style => "enforce_naming_style",
    value => "value",
    edition => "edition",
    number => "number",
    full_name => "full_name",
    type_name => "type",
    repeated => "repeated",
    reserved => "reserved",
    key => "key",

    // Feature enum values, compared by name against the feature's enum.
    explicit => "EXPLICIT",
    implicit => "IMPLICIT",
    legacy_required => "LEGACY_REQUIRED",
    open => "OPEN",
    closed => "CLOSED",
    packed_value => "PACKED",
    expanded => "EXPANDED",
    length_prefixed => "LENGTH_PREFIXED",
    delimited => "DELIMITED",
    verify => "VERIFY",
    none => "NONE",
    allow => "ALLOW",
    legacy_best_effort => "LEGACY_BEST_EFFORT",
    style2024 => "STYLE2024",
    style_legacy => "STYLE_LEGACY",
    declaration_mode => "DECLARATION",
    unverified => "UNVERIFIED",

    // ctype / jstype values.
    cord => "CORD",
    string_piece => "STRING_PIECE",
    string_value => "STRING",
    js_normal => "JS_NORMAL",
    js_string => "JS_STRING",
    js_number => "JS_NUMBER",

    // Edition enum values, for `edition_defaults` entries.
    edition_unknown => "EDITION_UNKNOWN",
    edition_legacy => "EDITION_LEGACY",
    edition_proto2 => "EDITION_PROTO2",
    edition_proto3 => "EDITION_PROTO3",
    edition_2023 => "EDITION_2023",
    edition_2024 => "EDITION_2024",
}

/// Process-wide state shared by every file lowered in this process.
#[derive(Debug)]
pub struct Session {
    interner: Interner,
    names: OnceCell<Names>,
}

impl Session {
    pub fn new() -> Arc<Session> {
        Arc::new(Session {
            interner: Interner::new(),
            names: OnceCell::new(),
        })
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Interns `s` in the session interner.
    pub fn intern(&self, s: &str) -> Istr {
        self.interner.intern(s)
    }

    /// Resolves an interned ID back to its string.
    pub fn str(&self, id: Istr) -> Arc<str> {
        self.interner.resolve(id)
    }

    /// The well-known name table, interned on first use.
    pub fn names(&self) -> &Names {
        self.names.get_or_init(|| Names::preload(&self.interner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_intern_once() {
        let session = Session::new();
        let first = session.names().map_entry;
        let again = session.intern("map_entry");
        assert_eq!(first, again);
    }

    #[test]
    fn names_are_distinct() {
        let session = Session::new();
        let names = session.names();
        assert_ne!(names.packed, names.packed_value);
        assert_ne!(names.file_options, names.message_options);
    }
}
