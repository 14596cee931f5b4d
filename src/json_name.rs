//! Default JSON names and collision checking.
//!
//! Every field gets a default JSON name: the field name converted to
//! camelCase by the Protobuf rule (discard underscores, capitalize the
//! character following each). Enum values first drop their enum's name
//! prefix (compared ignoring case and underscores) and then convert.
//! Within one type, two members mapping to the same JSON name collide:
//! default-versus-default, default-versus-custom, and custom-versus-custom
//! are all errors. Extensions may not specify `json_name` at all.

use std::collections::HashMap;

use heck::ToSnakeCase;

use crate::arena::Idx;
use crate::intern::Istr;
use crate::ir::{MemberId, MemberKind, TypeId};
use crate::report::Diagnostic;
use crate::Lower;

/// Converts to the Protobuf flavor of camelCase: discard underscores and
/// capitalize the next character after each; everything else is kept
/// verbatim.
pub trait ToProtoCamelCase: ToOwned {
    fn to_proto_camel_case(&self) -> Self::Owned;
}

impl ToProtoCamelCase for str {
    fn to_proto_camel_case(&self) -> String {
        let mut capitalize_next = false;
        let mut out = String::with_capacity(self.len());
        for chr in self.chars() {
            if chr == '_' {
                capitalize_next = true;
            } else if capitalize_next {
                out.push(chr.to_ascii_uppercase());
                capitalize_next = false;
            } else {
                out.push(chr);
            }
        }
        out
    }
}

impl ToProtoCamelCase for String {
    fn to_proto_camel_case(&self) -> String {
        self.as_str().to_proto_camel_case()
    }
}

/// Drops `prefix` from the front of `value_name`, comparing with case and
/// underscores ignored. Returns `None` when the prefix does not match or
/// would consume the whole name.
fn strip_enum_prefix<'v>(prefix: &str, value_name: &'v str) -> Option<&'v str> {
    let mut value_chars = value_name.char_indices();
    'prefix: for p in prefix.chars() {
        if p == '_' {
            continue;
        }
        for (_, v) in value_chars.by_ref() {
            if v == '_' {
                continue;
            }
            if v.to_ascii_lowercase() == p.to_ascii_lowercase() {
                continue 'prefix;
            }
            return None;
        }
        return None;
    }
    let rest = match value_chars.next() {
        Some((index, _)) => &value_name[index..],
        None => return None,
    };
    let rest = rest.trim_start_matches('_');
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// The default JSON name of an enum value: prefix-stripped, lower-cased,
/// then camel-converted like a field name.
fn enum_value_json_name(enum_name: &str, value_name: &str) -> String {
    let stripped = strip_enum_prefix(enum_name, value_name).unwrap_or(value_name);
    stripped.to_snake_case().to_proto_camel_case()
}

impl<'a> Lower<'a> {
    /// Computes default JSON names and reports collisions (pass C14).
    pub(crate) fn compute_json_names(&mut self) {
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            let kind = member.kind;
            let name = self.str(member.name).to_string();
            let default = match kind {
                MemberKind::Field | MemberKind::Extension => name.to_proto_camel_case(),
                MemberKind::EnumValue => match member.parent {
                    Some(parent) => {
                        let enum_name = self.str(self.file.types[parent].name).to_string();
                        enum_value_json_name(&enum_name, &name)
                    }
                    None => continue,
                },
            };
            let default_id = self.intern(&default);
            self.file.members[member_id].default_json_name = default_id;

            if kind == MemberKind::Extension {
                if let Some(_custom) = self.file.members[member_id].json_name {
                    let span = self.file.members[member_id].json_name_span;
                    self.emit(
                        Diagnostic::error("extensions may not specify `json_name`")
                            .at(span)
                            .with_edit(span, "", "delete it"),
                    );
                }
            }
        }

        for raw in 0..self.file.types.len() as u32 {
            self.check_json_collisions(Idx::new(raw));
        }
    }

    fn check_json_collisions(&mut self, type_id: TypeId) {
        let members = self.file.types[type_id].fields().to_vec();
        // JSON name -> (member, was it a custom name).
        let mut seen: HashMap<Istr, (MemberId, bool)> = HashMap::new();
        for member_id in members {
            let member = &self.file.members[member_id];
            let custom = member.json_name;
            let effective = custom.unwrap_or(member.default_json_name);
            if effective.is_empty() {
                continue;
            }
            let name_span = member.name_span;
            match seen.get(&effective) {
                None => {
                    seen.insert(effective, (member_id, custom.is_some()));
                }
                Some(&(previous, previous_custom)) => {
                    let json = self.str(effective).to_string();
                    let previous_span = self.file.members[previous].name_span;
                    let message = if custom.is_some() || previous_custom {
                        format!("JSON name `{}` conflicts with a custom `json_name`", json)
                    } else {
                        format!("default JSON name `{}` is used by two members", json)
                    };
                    self.emit(
                        Diagnostic::error(message)
                            .at(name_span)
                            .with_snippet(previous_span, "also maps to this member"),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proto_camel_case() {
        assert_eq!("fooBar", &"foo_bar".to_proto_camel_case());
        assert_eq!("fooBarBaz", &"foo_bar_baz".to_proto_camel_case());
        assert_eq!("foo", &"foo".to_proto_camel_case());
        assert_eq!("fooBar", &"foo__bar".to_proto_camel_case());
        assert_eq!("FooBar", &"_foo_bar".to_proto_camel_case());
        assert_eq!("foo", &"foo_".to_proto_camel_case());
        assert_eq!("fieldName7", &"field_name7".to_proto_camel_case());
        assert_eq!("field0Name6", &"field_0_name6".to_proto_camel_case());
    }

    #[test]
    fn enum_prefix_stripping() {
        assert_eq!(Some("RED"), strip_enum_prefix("Color", "COLOR_RED"));
        assert_eq!(Some("GREEN"), strip_enum_prefix("Color", "ColorGREEN"));
        assert_eq!(None, strip_enum_prefix("Color", "COLOR"));
        assert_eq!(None, strip_enum_prefix("Color", "HUE_RED"));
        assert_eq!(Some("BLUE"), strip_enum_prefix("MY_ENUM", "MyEnum_BLUE"));
    }

    #[test]
    fn enum_value_json_names() {
        assert_eq!("red", &enum_value_json_name("Color", "COLOR_RED"));
        assert_eq!("deepRed", &enum_value_json_name("Color", "COLOR_DEEP_RED"));
        // No prefix match: the full value name converts.
        assert_eq!("hueRed", &enum_value_json_name("Color", "HUE_RED"));
    }
}
