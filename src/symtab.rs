//! Per-file symbol tables.
//!
//! Each file owns a table of `(interned FQN, symbol)` rows sorted by FQN
//! ID, plus a merged view that unions in every transitive dep's local table
//! with provenance. Collisions across files are legal at the table level;
//! the resolver polices ambiguity and visibility when rows are consumed.

use crate::ast::Span;
use crate::file::{File, FileNo};
use crate::intern::Istr;
use crate::ir::Symbol;

/// One table row.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SymbolEntry {
    pub fqn: Istr,
    /// Which file the symbol lives in, relative to the table's owner.
    pub file: FileNo,
    pub sym: Symbol,
}

/// An ordered list of symbol rows, binary-searchable by interned FQN.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    sorted: bool,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            entries: Vec::new(),
            sorted: false,
        }
    }

    /// Appends a local symbol. The table must not have been finished yet.
    pub fn insert(&mut self, fqn: Istr, sym: Symbol) {
        debug_assert!(!self.sorted);
        self.entries.push(SymbolEntry {
            fqn,
            file: FileNo::SELF,
            sym,
        });
    }

    /// Appends every row of a dep's local table, re-rooting provenance at
    /// `dep_no`.
    pub fn merge_from(&mut self, dep_no: FileNo, table: &SymbolTable) {
        debug_assert!(!self.sorted);
        for entry in &table.entries {
            // Rows in a local table are all SELF-rooted.
            self.entries.push(SymbolEntry {
                fqn: entry.fqn,
                file: dep_no,
                sym: entry.sym,
            });
        }
    }

    /// Sorts the table. Insertion order is preserved among equal FQNs, so
    /// the owner's rows stay ahead of dep rows in the merged view.
    pub fn finish(&mut self) {
        self.entries.sort_by_key(|entry| entry.fqn.raw());
        self.sorted = true;
    }

    /// All rows with the given FQN.
    pub fn lookup(&self, fqn: Istr) -> &[SymbolEntry] {
        debug_assert!(self.sorted);
        let start = self.entries.partition_point(|e| e.fqn.raw() < fqn.raw());
        let end = self.entries[start..]
            .iter()
            .position(|e| e.fqn != fqn)
            .map(|off| start + off)
            .unwrap_or(self.entries.len());
        &self.entries[start..end]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups of two or more same-FQN rows. Only meaningful after
    /// `finish`; used for local collision diagnostics.
    pub fn duplicate_groups(&self) -> Vec<&[SymbolEntry]> {
        debug_assert!(self.sorted);
        let mut groups = Vec::new();
        let mut start = 0;
        while start < self.entries.len() {
            let fqn = self.entries[start].fqn;
            let mut end = start + 1;
            while end < self.entries.len() && self.entries[end].fqn == fqn {
                end += 1;
            }
            if end - start > 1 {
                groups.push(&self.entries[start..end]);
            }
            start = end;
        }
        groups
    }
}

impl<'a> crate::Lower<'a> {
    /// Finishes the local table, diagnoses local FQN collisions, and
    /// builds the merged transitive view (pass C6).
    pub(crate) fn build_symbol_tables(&mut self) {
        self.file.symtab.finish();

        // Collect collision data before emitting: `duplicate_groups`
        // borrows the table.
        let mut collisions: Vec<(Istr, Vec<Span>)> = Vec::new();
        for group in self.file.symtab.duplicate_groups() {
            // Package prefixes are inserted once per file, so a duplicate
            // group is always a real collision.
            let spans = group
                .iter()
                .map(|entry| symbol_name_span(&self.file, entry.sym))
                .collect();
            collisions.push((group[0].fqn, spans));
        }
        for (fqn, spans) in collisions {
            let name = self.str(fqn);
            let mut diagnostic = crate::report::Diagnostic::error(format!(
                "the name `{}` is declared multiple times in this file",
                name
            ));
            let mut spans = spans.into_iter();
            if let Some(first) = spans.next() {
                diagnostic = diagnostic.with_snippet(first, "first declared here");
            }
            for span in spans {
                diagnostic = diagnostic.at_label(span, "declared again here");
            }
            self.emit(diagnostic);
        }

        let mut merged = SymbolTable::new();
        merged.merge_from(FileNo::SELF, &self.file.symtab);
        for (index, dep) in self.file.deps.iter().enumerate() {
            merged.merge_from(FileNo::dep(index), &dep.file.symtab);
        }
        merged.finish();
        self.file.merged = merged;
    }
}

/// The span of a symbol's declared name, for collision diagnostics.
pub fn symbol_name_span(file: &File, sym: Symbol) -> Span {
    match sym {
        Symbol::Package | Symbol::Scalar(_) => Span::default(),
        Symbol::Message(idx) | Symbol::Enum(idx) => file.types[idx].name_span,
        Symbol::Field(idx) | Symbol::EnumValue(idx) | Symbol::Extension(idx) => {
            file.members[idx].name_span
        }
        Symbol::Oneof(idx) => file.oneofs[idx].name_span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn entry_syms(entries: &[SymbolEntry]) -> Vec<Symbol> {
        entries.iter().map(|e| e.sym).collect()
    }

    #[test]
    fn lookup_finds_all_rows_for_a_name() {
        let interner = Interner::new();
        let foo = interner.intern("pkg.Foo");
        let bar = interner.intern("pkg.Bar");

        let mut table = SymbolTable::new();
        table.insert(foo, Symbol::Package);
        table.insert(bar, Symbol::Package);
        let mut merged = SymbolTable::new();
        merged.merge_from(FileNo::dep(0), &table);
        merged.insert(foo, Symbol::Package);
        merged.finish();

        assert_eq!(merged.lookup(foo).len(), 2);
        assert_eq!(merged.lookup(bar).len(), 1);
        assert!(merged.lookup(interner.intern("pkg.Baz")).is_empty());
    }

    #[test]
    fn duplicate_groups_reports_same_fqn_runs() {
        let interner = Interner::new();
        let foo = interner.intern("Foo");
        let bar = interner.intern("Bar");

        let mut table = SymbolTable::new();
        table.insert(foo, Symbol::Package);
        table.insert(bar, Symbol::Package);
        table.insert(foo, Symbol::Package);
        table.finish();

        let groups = table.duplicate_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(entry_syms(groups[0]), vec![Symbol::Package, Symbol::Package]);
    }
}
