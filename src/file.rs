//! The per-file IR container.
//!
//! A [`File`] exclusively owns the arenas for every raw node kind produced
//! while lowering one source file, plus its transitive dependency list and
//! symbol tables. Nodes are immutable once lowering finishes (lazy caches
//! aside) and are freed as a unit when the `File` is dropped. Other files
//! are only ever referenced through [`FileNo`] dep numbers, never raw
//! pointers, so no node outlives its file.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::arena::Arena;
use crate::ast::Span;
use crate::features::{FeatSetId, FeatureInfo, FeatureSetNode};
use crate::intern::Istr;
use crate::ir::{
    ExtendId, ExtendNode, MemberNode, MemberRef, MethodNode, OneofNode, RangeNode, ServiceId,
    ServiceNode, TypeId, TypeNode, TypeRef,
};
use crate::session::Session;
use crate::symtab::SymbolTable;
use crate::value::{MessageValue, MsgValId, ValId, ValueArray, ValueNode};

/// Names a file from the point of view of a referring file: `SELF`, or an
/// entry in the referrer's transitive dep list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct FileNo(u32);

impl FileNo {
    pub const SELF: FileNo = FileNo(0);

    pub fn dep(index: usize) -> FileNo {
        FileNo(index as u32 + 1)
    }

    pub fn is_self(self) -> bool {
        self.0 == 0
    }

    /// The dep-list index, if this is not `SELF`.
    pub fn dep_index(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0 as usize - 1)
        }
    }
}

/// A Protobuf language version.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum Edition {
    #[default]
    Unknown,
    Legacy,
    Proto2,
    Proto3,
    Edition2023,
    Edition2024,
}

impl Edition {
    /// Parses the value of an `edition = "..."` declaration.
    pub fn from_decl_value(value: &str) -> Option<Edition> {
        match value {
            "legacy" => Some(Edition::Legacy),
            "2023" => Some(Edition::Edition2023),
            "2024" => Some(Edition::Edition2024),
            _ => None,
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Edition::Unknown => "unknown",
            Edition::Legacy => "legacy",
            Edition::Proto2 => "proto2",
            Edition::Proto3 => "proto3",
            Edition::Edition2023 => "2023",
            Edition::Edition2024 => "2024",
        };
        f.write_str(s)
    }
}

/// The declared syntax mode of a file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SyntaxMode {
    Proto2,
    Proto3,
    Editions(Edition),
    /// Files opted into editions semantics without an ordinary edition
    /// number (`edition = "legacy"`).
    EditionsLegacy,
}

impl SyntaxMode {
    /// The edition this mode occupies in the ordering
    /// `legacy < proto2 < proto3 < 2023 < ...`.
    pub fn edition(self) -> Edition {
        match self {
            SyntaxMode::Proto2 => Edition::Proto2,
            SyntaxMode::Proto3 => Edition::Proto3,
            SyntaxMode::Editions(edition) => edition,
            SyntaxMode::EditionsLegacy => Edition::Legacy,
        }
    }

    /// Whether features/editions semantics apply.
    pub fn is_editions(self) -> bool {
        matches!(self, SyntaxMode::Editions(_) | SyntaxMode::EditionsLegacy)
    }
}

impl Default for SyntaxMode {
    fn default() -> SyntaxMode {
        SyntaxMode::Proto2
    }
}

/// One entry in a file's transitive dependency list.
#[derive(Debug)]
pub struct Dep {
    pub file: Arc<File>,
    pub path: Istr,
    /// Index of the `import` declaration in the AST, for direct imports.
    pub decl: Option<usize>,
    /// Span of the whole import statement, for delete-edits.
    pub span: Span,
    pub public: bool,
    pub weak: bool,
    pub direct: bool,
    /// Reachable via a direct import or an unbroken chain of public
    /// imports; only visible deps satisfy name resolution.
    pub visible: bool,
    /// Flipped lazily the first time a name resolves through this dep.
    pub used: AtomicBool,
}

impl Dep {
    pub fn mark_used(&self) {
        self.used.store(true, Ordering::Relaxed);
    }

    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Relaxed)
    }
}

/// A lowered source file: arenas, deps, and symbol tables.
#[derive(Debug)]
pub struct File {
    pub session: Arc<Session>,
    pub path: Istr,
    pub package: Istr,
    pub package_span: Span,
    pub syntax: SyntaxMode,
    /// Span of the `syntax` / `edition` declaration, secondary anchor for
    /// edition-gated diagnostics.
    pub syntax_span: Span,
    pub deps: Vec<Dep>,

    pub types: Arena<TypeNode>,
    pub members: Arena<MemberNode>,
    pub oneofs: Arena<OneofNode>,
    pub extends: Arena<ExtendNode>,
    pub services: Arena<ServiceNode>,
    pub methods: Arena<MethodNode>,
    pub ranges: Arena<RangeNode>,
    pub values: Arena<ValueNode>,
    pub msg_values: Arena<MessageValue>,
    pub arrays: Arena<ValueArray>,
    pub feature_sets: Arena<FeatureSetNode>,
    pub feature_infos: Arena<FeatureInfo>,

    pub top_types: Vec<TypeId>,
    pub top_extends: Vec<ExtendId>,
    pub top_services: Vec<ServiceId>,

    /// Local symbols only.
    pub symtab: SymbolTable,
    /// Local symbols plus every transitive dep's, with provenance.
    pub merged: SymbolTable,

    pub options: Option<MsgValId>,
    pub features: Option<FeatSetId>,
}

impl File {
    pub fn new(session: Arc<Session>, path: Istr) -> File {
        File {
            session,
            path,
            package: Istr::EMPTY,
            package_span: Span::default(),
            syntax: SyntaxMode::default(),
            syntax_span: Span::default(),
            deps: Vec::new(),
            types: Arena::new(),
            members: Arena::new(),
            oneofs: Arena::new(),
            extends: Arena::new(),
            services: Arena::new(),
            methods: Arena::new(),
            ranges: Arena::new(),
            values: Arena::new(),
            msg_values: Arena::new(),
            arrays: Arena::new(),
            feature_sets: Arena::new(),
            feature_infos: Arena::new(),
            top_types: Vec::new(),
            top_extends: Vec::new(),
            top_services: Vec::new(),
            symtab: SymbolTable::new(),
            merged: SymbolTable::new(),
            options: None,
            features: None,
        }
    }

    /// The file a [`FileNo`] names, from this file's point of view.
    pub fn dep_file(&self, no: FileNo) -> &File {
        match no.dep_index() {
            None => self,
            Some(index) => &self.deps[index].file,
        }
    }

    /// Looks up the dep entry for `path`, if present.
    pub fn dep_by_path(&self, path: Istr) -> Option<(usize, &Dep)> {
        self.deps
            .iter()
            .enumerate()
            .find(|(_, dep)| dep.path == path)
    }

    /// Dereferences a cross-file type reference.
    pub fn type_node(&self, type_ref: TypeRef) -> &TypeNode {
        &self.dep_file(type_ref.file).types[type_ref.idx]
    }

    /// Dereferences a cross-file member reference.
    pub fn member_node(&self, member_ref: MemberRef) -> &MemberNode {
        &self.dep_file(member_ref.file).members[member_ref.idx]
    }

    /// Finds a member of `type_ref` by simple name, via the type's lazy
    /// name index.
    pub fn member_named(&self, type_ref: TypeRef, name: Istr) -> Option<MemberRef> {
        let owner = self.dep_file(type_ref.file);
        let node = &owner.types[type_ref.idx];
        let map = node.member_by_name.get_or_init(|| {
            node.members
                .iter()
                .map(|&member| (owner.members[member].name, member))
                .collect()
        });
        map.get(&name).map(|&idx| MemberRef {
            file: type_ref.file,
            idx,
        })
    }

    /// Re-roots a type reference read out of `owner`'s arenas into this
    /// file's dep coordinates.
    ///
    /// A reference stored inside a dep is relative to *that* file's dep
    /// list; consumers here must translate it before dereferencing, or
    /// they would index the wrong arenas. Returns `None` when the
    /// referenced file is not in this file's transitive closure (which
    /// only happens for inputs that already failed import resolution).
    pub fn reroot_type(&self, owner: FileNo, type_ref: TypeRef) -> Option<TypeRef> {
        if owner.is_self() {
            return Some(type_ref);
        }
        match type_ref.file.dep_index() {
            None => Some(TypeRef {
                file: owner,
                idx: type_ref.idx,
            }),
            Some(inner) => {
                let owner_file = self.dep_file(owner);
                let path = owner_file.deps[inner].path;
                let (index, _) = self.dep_by_path(path)?;
                Some(TypeRef {
                    file: FileNo::dep(index),
                    idx: type_ref.idx,
                })
            }
        }
    }

    /// The element type of a member reference, translated into this
    /// file's coordinates.
    pub fn elem_of(&self, member: MemberRef) -> crate::ir::ElemType {
        use crate::ir::ElemType;
        match self.member_node(member).elem {
            ElemType::Named(type_ref) => match self.reroot_type(member.file, type_ref) {
                Some(type_ref) => ElemType::Named(type_ref),
                None => ElemType::Unresolved,
            },
            other => other,
        }
    }

    /// Looks up a set option value by the simple name of its field, in
    /// this file's arenas.
    pub fn option_value(&self, options: Option<MsgValId>, field_name: Istr) -> Option<ValId> {
        let msgval = &self.msg_values[options?];
        let msg = msgval.msg?;
        let field = self.member_named(msg, field_name)?;
        let key = self.member_node(field).fqn;
        msgval.by_key.get(&key).copied()
    }

    /// A field value of a message literal in this file, by the field's
    /// simple name.
    pub fn option_value_in_msgval(&self, msgval: MsgValId, field_name: Istr) -> Option<ValId> {
        let msg = self.msg_values[msgval].msg?;
        let field = self.member_named(msg, field_name)?;
        let key = self.member_node(field).fqn;
        self.msg_values[msgval].by_key.get(&key).copied()
    }

    /// The evaluated boolean of a named option field, when present.
    pub fn option_bool(&self, options: Option<MsgValId>, field_name: Istr) -> Option<bool> {
        let value = self.option_value(options, field_name)?;
        self.values[value].as_bool()
    }

    /// The effective edition of this file.
    pub fn edition(&self) -> Edition {
        self.syntax.edition()
    }

    /// Whether this file is `google/protobuf/descriptor.proto` itself.
    pub fn is_descriptor(&self) -> bool {
        self.path == self.session.names().descriptor_file
    }
}
