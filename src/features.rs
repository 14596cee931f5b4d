//! Editions feature propagation.
//!
//! A *feature field* is a descriptor.proto field carrying both
//! `edition_defaults` and `feature_support` options; each one gets a
//! [`FeatureInfo`] with its defaults sorted by edition. Every scope
//! (file, type, member, oneof, extension range, service, method) gets a
//! [`FeatureSetNode`] chained to its enclosing scope's set. Lookup
//! resolves explicit → inherited → edition default, memoizing per feature
//! key, and feature lifecycle (introduced / deprecated / removed) is
//! validated against the file's edition.

use std::collections::HashMap;
use std::sync::Mutex;

use log::trace;

use crate::arena::Idx;
use crate::file::{Edition, File, FileNo};
use crate::intern::Istr;
use crate::ir::{MemberId, MemberRef, Presence, TypeId};
use crate::report::Diagnostic;
use crate::value::{MsgValId, Payload, ValId};
use crate::Lower;

pub type FeatSetId = Idx<FeatureSetNode>;
pub type FeatureInfoId = Idx<FeatureInfo>;

/// One default of a feature field, taking effect at `edition`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct FeatureDefault {
    pub edition: Edition,
    pub value: Payload,
}

/// Per-feature-field metadata: defaults and support range.
///
/// Invariant: `defaults` is sorted by edition and its first entry is the
/// `Unknown`-edition sentinel.
#[derive(Debug)]
pub struct FeatureInfo {
    /// The feature field itself, in the file that owns this info.
    pub member: MemberId,
    pub defaults: Vec<FeatureDefault>,
    pub introduced: Edition,
    pub deprecated: Option<Edition>,
    pub removed: Option<Edition>,
    pub deprecation_warning: Option<Istr>,
}

/// Cache key: `(extension FQN or empty, feature field FQN)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FeatureKey {
    pub extension: Istr,
    pub field: Istr,
}

/// A resolved feature value with its provenance flags.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Feature {
    pub value: Payload,
    /// The file whose arenas the payload indexes into, relative to the
    /// file the lookup ran on.
    pub file: FileNo,
    /// Set via a custom (extension) feature key.
    pub is_custom: bool,
    /// Not set in this scope's own options.
    pub is_inherited: bool,
    /// Fell through to the edition default table.
    pub is_default: bool,
}

/// The effective feature state at one scope.
#[derive(Debug)]
pub struct FeatureSetNode {
    /// The explicit `features` message literal of this scope's options.
    pub options: Option<MsgValId>,
    /// The enclosing scope's set.
    pub parent: Option<FeatSetId>,
    cache: Mutex<HashMap<FeatureKey, Feature>>,
}

impl FeatureSetNode {
    pub fn new(options: Option<MsgValId>, parent: Option<FeatSetId>) -> FeatureSetNode {
        FeatureSetNode {
            options,
            parent,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

/// Resolves a feature at a scope: explicit value, else the parent chain,
/// else the greatest edition default not past the file's edition.
///
/// The cache is write-once per key: any thread observing a cached entry
/// sees the value the first computation produced.
pub fn lookup_feature(file: &File, set_id: FeatSetId, feature: MemberRef) -> Feature {
    let field_fqn = file.member_node(feature).fqn;
    let key = FeatureKey {
        extension: Istr::EMPTY,
        field: field_fqn,
    };
    lookup_feature_inner(file, set_id, feature, key)
}

fn lookup_feature_inner(
    file: &File,
    set_id: FeatSetId,
    feature: MemberRef,
    key: FeatureKey,
) -> Feature {
    let set = &file.feature_sets[set_id];
    if let Some(&cached) = set.cache.lock().unwrap().get(&key) {
        return cached;
    }

    let explicit = set
        .options
        .and_then(|options| file.msg_values[options].by_key.get(&key.field).copied());
    let resolved = match explicit {
        Some(value_id) => Feature {
            value: file.values[value_id].payload,
            file: FileNo::SELF,
            is_custom: !key.extension.is_empty(),
            is_inherited: false,
            is_default: false,
        },
        None => match set.parent {
            Some(parent) => {
                let inherited = lookup_feature_inner(file, parent, feature, key);
                Feature {
                    is_inherited: true,
                    ..inherited
                }
            }
            None => default_feature(file, feature, key),
        },
    };

    file.feature_sets[set_id]
        .cache
        .lock()
        .unwrap()
        .entry(key)
        .or_insert(resolved);
    resolved
}

/// The root fallback: the greatest default whose edition does not exceed
/// the file's edition. Falls back to the `Unknown` sentinel.
fn default_feature(file: &File, feature: MemberRef, key: FeatureKey) -> Feature {
    let zero = Feature {
        value: Payload::ZERO,
        file: feature.file,
        is_custom: !key.extension.is_empty(),
        is_inherited: true,
        is_default: true,
    };
    let owner = file.dep_file(feature.file);
    let Some(info_id) = owner.members[feature.idx].feature_info else {
        return zero;
    };
    let info = &owner.feature_infos[info_id];
    let edition = file.edition();
    let mut value = Payload::ZERO;
    for default in &info.defaults {
        if default.edition <= edition {
            value = default.value;
        } else {
            break;
        }
    }
    Feature { value, ..zero }
}

/// Maps `google.protobuf.Edition` enum numbers to editions.
pub fn edition_from_enum_number(number: i64) -> Edition {
    match number {
        900 => Edition::Legacy,
        998 => Edition::Proto2,
        999 => Edition::Proto3,
        1000 => Edition::Edition2023,
        1001 => Edition::Edition2024,
        _ => Edition::Unknown,
    }
}

impl<'a> Lower<'a> {
    /// Builds [`FeatureInfo`] for every feature field declared in this file
    /// (pass C11, first half). Only descriptor.proto and files declaring
    /// custom features actually produce any.
    pub(crate) fn build_feature_infos(&mut self) {
        let names_edition_defaults = self.session.names().edition_defaults;
        let names_feature_support = self.session.names().feature_support;

        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let options = self.file.members[member_id].options;
            let Some(defaults_value) = self.file.option_value(options, names_edition_defaults) else {
                continue;
            };
            let Some(support_value) = self.file.option_value(options, names_feature_support) else {
                continue;
            };

            let defaults = self.collect_edition_defaults(member_id, defaults_value);
            let support = self.collect_feature_support(support_value);
            let info = FeatureInfo {
                member: member_id,
                defaults,
                introduced: support.0,
                deprecated: support.1,
                removed: support.2,
                deprecation_warning: support.3,
            };
            let info_id = self.file.feature_infos.alloc(info);
            self.file.members[member_id].feature_info = Some(info_id);
        }
        if !self.file.feature_infos.is_empty() {
            trace!("built {} feature infos", self.file.feature_infos.len());
        }
    }

    /// Parses `edition_defaults` entries into a sorted default table with
    /// the `Unknown` sentinel in front.
    fn collect_edition_defaults(
        &mut self,
        member_id: MemberId,
        defaults_value: ValId,
    ) -> Vec<FeatureDefault> {
        let mut entries: Vec<MsgValId> = Vec::new();
        match self.file.values[defaults_value].payload {
            Payload::Message(id) => entries.push(id),
            Payload::Array(array) => {
                let elems = self.file.arrays[array].elems.clone();
                for elem in elems {
                    if let Payload::Message(id) = self.file.values[elem].payload {
                        entries.push(id);
                    }
                }
            }
            _ => {}
        }

        let names = self.session.names();
        let (edition_name, value_name) = (names.edition, names.value);
        let elem = self.file.members[member_id].elem;

        let mut defaults = vec![FeatureDefault {
            edition: Edition::Unknown,
            value: Payload::ZERO,
        }];
        for entry in entries {
            let Some(msg) = self.file.msg_values[entry].msg else {
                continue;
            };
            let edition = self
                .message_value_field(entry, msg, edition_name)
                .and_then(|v| self.file.values[v].as_i64())
                .map(edition_from_enum_number)
                .unwrap_or(Edition::Unknown);
            let span = self.file.msg_values[entry].span;
            let value = self
                .message_value_field(entry, msg, value_name)
                .and_then(|v| self.file.values[v].as_str_id());
            let Some(raw) = value else {
                continue;
            };
            let Some(payload) = self.parse_feature_default(&self.str(raw), elem) else {
                self.emit(
                    Diagnostic::error("cannot parse this edition default against the field's type")
                        .at(span),
                );
                continue;
            };
            defaults.push(FeatureDefault {
                edition,
                value: payload,
            });
        }
        defaults.sort_by_key(|d| d.edition);
        defaults
    }

    /// `edition_defaults.value` strings hold a textual scalar; parse it
    /// against the feature field's element type.
    fn parse_feature_default(&self, text: &str, elem: crate::ir::ElemType) -> Option<Payload> {
        use crate::ir::{ElemType, Scalar};
        match elem {
            ElemType::Named(type_ref) if self.file.type_node(type_ref).is_enum => {
                let name = self.session.intern(text);
                self.enum_value_number(type_ref, name)
                    .map(|n| Payload::Bits(n as u64))
            }
            ElemType::Scalar(Scalar::Bool) => match text {
                "true" => Some(Payload::Bits(1)),
                "false" => Some(Payload::Bits(0)),
                _ => None,
            },
            ElemType::Scalar(scalar) if scalar.is_integer() => {
                text.parse::<i64>().ok().map(|n| Payload::Bits(n as u64))
            }
            ElemType::Scalar(Scalar::String) | ElemType::Scalar(Scalar::Bytes) => {
                Some(Payload::Str(self.session.intern(text)))
            }
            _ => None,
        }
    }

    fn collect_feature_support(
        &mut self,
        support_value: ValId,
    ) -> (Edition, Option<Edition>, Option<Edition>, Option<Istr>) {
        let Payload::Message(support) = self.file.values[support_value].payload else {
            return (Edition::Unknown, None, None, None);
        };
        let Some(msg) = self.file.msg_values[support].msg else {
            return (Edition::Unknown, None, None, None);
        };
        let names = self.session.names();
        let (introduced_name, deprecated_name, removed_name, warning_name) = (
            names.edition_introduced,
            names.edition_deprecated,
            names.edition_removed,
            names.deprecation_warning,
        );
        let edition_of = |this: &Self, name: Istr| {
            this.message_value_field(support, msg, name)
                .and_then(|v| this.file.values[v].as_i64())
                .map(edition_from_enum_number)
        };
        let introduced = edition_of(self, introduced_name).unwrap_or(Edition::Unknown);
        let deprecated = edition_of(self, deprecated_name);
        let removed = edition_of(self, removed_name);
        let warning = self
            .message_value_field(support, msg, warning_name)
            .and_then(|v| self.file.values[v].as_str_id());
        (introduced, deprecated, removed, warning)
    }

    /// A field value of a message literal, by the field's simple name.
    fn message_value_field(&self, msgval: MsgValId, msg: crate::ir::TypeRef, name: Istr) -> Option<ValId> {
        let field = self.file.member_named(msg, name)?;
        let key = self.file.member_node(field).fqn;
        self.file.msg_values[msgval].by_key.get(&key).copied()
    }

    /// Builds the feature-set chain for every scope and finishes
    /// editions-dependent state (pass C11, second half).
    pub(crate) fn build_features(&mut self) {
        let features_name = self.session.names().features;

        let file_options = self.file.options;
        let file_set = {
            let options = self.features_option(file_options, features_name);
            self.file.feature_sets.alloc(FeatureSetNode::new(options, None))
        };
        self.file.features = Some(file_set);

        // Parents are always allocated before children, so one forward
        // pass links every type to an already-built parent set.
        for raw in 0..self.file.types.len() as u32 {
            let type_id: TypeId = Idx::new(raw);
            let parent_set = match self.file.types[type_id].parent {
                Some(parent) => self.file.types[parent].features.unwrap_or(file_set),
                None => file_set,
            };
            let options = self.features_option(self.file.types[type_id].options, features_name);
            let set = self
                .file
                .feature_sets
                .alloc(FeatureSetNode::new(options, Some(parent_set)));
            self.file.types[type_id].features = Some(set);
        }

        for raw in 0..self.file.oneofs.len() as u32 {
            let oneof_id = Idx::new(raw);
            let parent = self.file.oneofs[oneof_id].parent;
            let parent_set = self.file.types[parent].features.unwrap_or(file_set);
            let options = self.features_option(self.file.oneofs[oneof_id].options, features_name);
            let set = self
                .file
                .feature_sets
                .alloc(FeatureSetNode::new(options, Some(parent_set)));
            self.file.oneofs[oneof_id].features = Some(set);
        }

        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let parent_set = match self.file.members[member_id].oneof {
                Some(oneof) => self.file.oneofs[oneof].features.unwrap_or(file_set),
                None => match self.file.members[member_id].parent {
                    Some(parent) => self.file.types[parent].features.unwrap_or(file_set),
                    None => file_set,
                },
            };
            let options = self.features_option(self.file.members[member_id].options, features_name);
            let set = self
                .file
                .feature_sets
                .alloc(FeatureSetNode::new(options, Some(parent_set)));
            self.file.members[member_id].features = Some(set);
        }

        for raw in 0..self.file.ranges.len() as u32 {
            let range_id = Idx::new(raw);
            let parent = self.file.ranges[range_id].parent;
            let parent_set = self.file.types[parent].features.unwrap_or(file_set);
            let options = self.features_option(self.file.ranges[range_id].options, features_name);
            let set = self
                .file
                .feature_sets
                .alloc(FeatureSetNode::new(options, Some(parent_set)));
            self.file.ranges[range_id].features = Some(set);
        }

        for raw in 0..self.file.services.len() as u32 {
            let service_id = Idx::new(raw);
            let options = self.features_option(self.file.services[service_id].options, features_name);
            let set = self
                .file
                .feature_sets
                .alloc(FeatureSetNode::new(options, Some(file_set)));
            self.file.services[service_id].features = Some(set);
        }
        for raw in 0..self.file.methods.len() as u32 {
            let method_id = Idx::new(raw);
            let service = self.file.methods[method_id].service;
            let parent_set = self.file.services[service].features.unwrap_or(file_set);
            let options = self.features_option(self.file.methods[method_id].options, features_name);
            let set = self
                .file
                .feature_sets
                .alloc(FeatureSetNode::new(options, Some(parent_set)));
            self.file.methods[method_id].features = Some(set);
        }

        self.resolve_editions_presence();
        self.validate_feature_lifecycles();
    }

    fn features_option(&self, options: Option<MsgValId>, features_name: Istr) -> Option<MsgValId> {
        let value = self.file.option_value(options, features_name)?;
        match self.file.values[value].payload {
            Payload::Message(id) => Some(id),
            _ => None,
        }
    }

    /// In editions files, fields without a label take their presence from
    /// the `field_presence` feature.
    fn resolve_editions_presence(&mut self) {
        if !self.file.syntax.is_editions() {
            return;
        }
        let names = self.session.names();
        let (presence_name, explicit_name, implicit_name, required_name) = (
            names.field_presence,
            names.explicit,
            names.implicit,
            names.legacy_required,
        );
        let Some(feature) = self.builtin_member(self.builtins.feature_set, presence_name) else {
            return;
        };
        let presence_enum = match self.file.elem_of(feature) {
            crate::ir::ElemType::Named(type_ref) => type_ref,
            _ => return,
        };
        let explicit = self.enum_value_number(presence_enum, explicit_name);
        let implicit = self.enum_value_number(presence_enum, implicit_name);
        let legacy_required = self.enum_value_number(presence_enum, required_name);

        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            if self.file.members[member_id].presence != Presence::Unknown {
                continue;
            }
            let Some(set) = self.file.members[member_id].features else {
                continue;
            };
            let resolved = lookup_feature(&self.file, set, feature);
            let number = match resolved.value {
                Payload::Bits(bits) => Some(bits as i64),
                _ => None,
            };
            let presence = match number {
                Some(n) if Some(n) == implicit => Presence::Implicit,
                // EXPLICIT and LEGACY_REQUIRED both track presence; the
                // required deprecation is warned separately.
                Some(n) if Some(n) == explicit || Some(n) == legacy_required => Presence::Explicit,
                _ => Presence::Explicit,
            };
            self.file.members[member_id].presence = presence;
        }
    }

    /// Errors for features used outside their supported edition window,
    /// warnings for deprecated ones.
    fn validate_feature_lifecycles(&mut self) {
        let edition = self.file.edition();
        let is_editions = self.file.syntax.is_editions();

        for raw in 0..self.file.feature_sets.len() as u32 {
            let set_id: FeatSetId = Idx::new(raw);
            let Some(options) = self.file.feature_sets[set_id].options else {
                continue;
            };
            if !is_editions && !self.file.is_descriptor() {
                let span = self.file.msg_values[options].span;
                self.emit(
                    Diagnostic::error("features require editions syntax")
                        .at(span)
                        .with_snippet(self.file.syntax_span, "file syntax declared here"),
                );
                continue;
            }

            let field_values: Vec<ValId> = self.file.msg_values[options].fields.clone();
            for value_id in field_values {
                let Some(field) = self.file.values[value_id].field else {
                    continue;
                };
                let value_span = self.file.values[value_id].span;
                let owner = self.file.dep_file(field.file);
                let Some(info_id) = owner.members[field.idx].feature_info else {
                    continue;
                };
                let info = &owner.feature_infos[info_id];
                let name = self.str(owner.members[field.idx].name).to_string();
                let (introduced, deprecated, removed) =
                    (info.introduced, info.deprecated, info.removed);
                let warning_text = info.deprecation_warning;

                if let Some(removed) = removed {
                    if removed <= edition {
                        self.emit(
                            Diagnostic::error(format!(
                                "feature `{}` was removed in edition {}",
                                name, removed
                            ))
                            .at(value_span),
                        );
                        continue;
                    }
                }
                if introduced != Edition::Unknown && edition < introduced {
                    self.emit(
                        Diagnostic::error(format!(
                            "feature `{}` is not available until edition {}",
                            name, introduced
                        ))
                        .at(value_span)
                        .with_snippet(self.file.syntax_span, "file edition declared here"),
                    );
                    continue;
                }
                if let Some(deprecated) = deprecated {
                    if deprecated <= edition {
                        let mut diagnostic = Diagnostic::warning(format!(
                            "feature `{}` is deprecated as of edition {}",
                            name, deprecated
                        ))
                        .at(value_span);
                        if let Some(text) = warning_text {
                            diagnostic = diagnostic.with_note(self.str(text).to_string());
                        }
                        self.emit(diagnostic);
                    }
                }
            }
        }
    }

    /// Resolves a standard feature by field name at the given scope.
    pub(crate) fn feature_enum_number(
        &self,
        set: Option<FeatSetId>,
        field_name: Istr,
    ) -> Option<(i64, Feature)> {
        let set = set?;
        let feature = self.builtin_member(self.builtins.feature_set, field_name)?;
        let resolved = lookup_feature(&self.file, set, feature);
        match resolved.value {
            Payload::Bits(bits) => Some((bits as i64, resolved)),
            _ => None,
        }
    }

    /// Whether the enum value number named `value_name` of the feature
    /// field's enum equals the resolved feature.
    pub(crate) fn feature_is(
        &self,
        set: Option<FeatSetId>,
        field_name: Istr,
        value_name: Istr,
    ) -> bool {
        let Some((number, _)) = self.feature_enum_number(set, field_name) else {
            return false;
        };
        let Some(feature) = self.builtin_member(self.builtins.feature_set, field_name) else {
            return false;
        };
        let enum_ref = match self.file.elem_of(feature) {
            crate::ir::ElemType::Named(type_ref) => type_ref,
            _ => return false,
        };
        self.enum_value_number(enum_ref, value_name) == Some(number)
    }
}
