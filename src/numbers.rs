//! Number assignment and overlap checking.
//!
//! Evaluates every member number and every reserved/extension range
//! endpoint, normalizes ranges to half-open intervals, and polices the
//! per-type number space: duplicate member numbers (with the enum
//! `allow_alias` exemption), members landing inside reserved or extension
//! ranges, overlapping ranges, and extension numbers that miss every
//! extension range of their extendee.

use multimap::MultiMap;

use crate::arena::Idx;
use crate::ast;
use crate::eval::MAX_FIELD_NUMBER;
use crate::ir::{MemberId, MemberKind, RangeId, RangeKind, TypeId};
use crate::report::Diagnostic;
use crate::{Lower, MemberAst, TypeAst};

impl<'a> Lower<'a> {
    /// Evaluates numbers and enforces the number-space invariants
    /// (pass C9).
    pub(crate) fn assign_numbers(&mut self) {
        self.eval_member_numbers();
        self.eval_ranges();
        for raw in 0..self.file.types.len() as u32 {
            self.check_type_numbers(Idx::new(raw));
        }
        self.check_extension_numbers();
    }

    fn eval_member_numbers(&mut self) {
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let expr: &'a ast::Expr = match self.member_ast[raw as usize] {
                MemberAst::Field(decl) => &decl.number,
                MemberAst::EnumValue(decl) => &decl.number,
                // Synthesized members carry their number from birth.
                MemberAst::Synth { .. } => continue,
            };
            let (number, _ok) = match self.file.members[member_id].kind {
                MemberKind::EnumValue => self.eval_enum_value_number(expr),
                MemberKind::Field | MemberKind::Extension => self.eval_field_number(expr),
            };
            // Saturated values are stored so later passes keep moving; a
            // hard failure leaves the zero sentinel.
            self.file.members[member_id].number = number;
        }
    }

    fn eval_ranges(&mut self) {
        for raw in 0..self.file.ranges.len() as u32 {
            let range_id: RangeId = Idx::new(raw);
            let Some(decl) = self.range_ast[raw as usize] else {
                continue;
            };
            let is_enum = {
                let parent = self.file.ranges[range_id].parent;
                self.file.types[parent].is_enum
            };
            let max = if is_enum {
                i32::MAX as i64
            } else {
                MAX_FIELD_NUMBER
            };

            let (start, start_ok) = self.eval_range_bound(&decl.start, is_enum);
            let (end, end_ok) = match &decl.end {
                ast::RangeEnd::None => (start, start_ok),
                ast::RangeEnd::Expr(expr) => self.eval_range_bound(expr, is_enum),
                ast::RangeEnd::Max(_) => (max, true),
            };
            if !start_ok || !end_ok {
                continue;
            }
            if start > end {
                self.emit(
                    Diagnostic::error(format!(
                        "range start {} comes after its end {}",
                        start, end
                    ))
                    .at(decl.span),
                );
                continue;
            }
            if start == end && !matches!(decl.end, ast::RangeEnd::None) {
                self.emit(
                    Diagnostic::warning("this range covers a single number")
                        .at(decl.span)
                        .with_edit(decl.span, start.to_string(), "simplify it"),
                );
            }
            let range = &mut self.file.ranges[range_id];
            range.start = start;
            range.end = end + 1;
            range.ok = true;
        }
    }

    /// Duplicate member numbers and member-versus-range conflicts within
    /// one type, then range-versus-range overlap.
    fn check_type_numbers(&mut self, type_id: TypeId) {
        let is_enum = self.file.types[type_id].is_enum;
        let allow_alias = is_enum && self.enum_allows_alias(type_id);
        let fields: Vec<MemberId> = self.file.types[type_id].fields().to_vec();
        let ranges: Vec<RangeId> = self.file.types[type_id].ranges.clone();

        let mut occupied: MultiMap<i64, MemberId> = MultiMap::new();
        let mut aliased = false;
        for &member_id in &fields {
            let number = self.file.members[member_id].number;
            if number == 0 && !is_enum {
                // Zero means the number already failed evaluation.
                continue;
            }
            if let Some(previous) = occupied.get_vec(&number).and_then(|v| v.first().copied()) {
                aliased = true;
                if !allow_alias {
                    let previous_span = self.file.members[previous].number_span;
                    let mut diagnostic = Diagnostic::error(format!(
                        "number {} is already used by another {}",
                        number,
                        if is_enum { "enum value" } else { "field" },
                    ))
                    .at(self.file.members[member_id].number_span)
                    .with_snippet(previous_span, "first used here");
                    if is_enum {
                        diagnostic = diagnostic.with_help(
                            "set `option allow_alias = true;` if the values are intentional aliases",
                        );
                    }
                    self.emit(diagnostic);
                }
            }
            occupied.insert(number, member_id);
        }

        if allow_alias && !aliased && !fields.is_empty() {
            let span = self
                .enum_alias_option_span(type_id)
                .unwrap_or(self.file.types[type_id].name_span);
            self.emit(
                Diagnostic::warning("`allow_alias = true` but no values are aliased")
                    .at(span)
                    .with_edit(span, "", "delete it"),
            );
        }

        // Members inside reserved or extension ranges.
        for &member_id in &fields {
            let number = self.file.members[member_id].number;
            if number == 0 && !is_enum {
                continue;
            }
            for &range_id in &ranges {
                let range = &self.file.ranges[range_id];
                if !range.ok || number < range.start || number >= range.end {
                    continue;
                }
                let (range_span, kind) = (range.span, range.kind);
                let what = match kind {
                    RangeKind::Reserved => "reserved",
                    RangeKind::Extension => "inside an extension range",
                };
                let number_span = self.file.members[member_id].number_span;
                self.emit(
                    Diagnostic::error(format!("number {} is {}", number, what))
                        .at(number_span)
                        .with_snippet(range_span, "range declared here"),
                );
                break;
            }
        }

        // Range-versus-range overlap, by sweeping the sorted intervals.
        let mut intervals: Vec<(i64, i64, RangeId)> = ranges
            .iter()
            .map(|&id| (&self.file.ranges[id], id))
            .filter(|(range, _)| range.ok)
            .map(|(range, id)| (range.start, range.end, id))
            .collect();
        intervals.sort_by_key(|&(start, end, id)| (start, end, id.raw()));
        let overlaps: Vec<(RangeId, RangeId)> = intervals
            .windows(2)
            .filter(|pair| pair[1].0 < pair[0].1)
            .map(|pair| (pair[0].2, pair[1].2))
            .collect();
        for (first, second) in overlaps {
            let first_span = self.file.ranges[first].span;
            let second_span = self.file.ranges[second].span;
            self.emit(
                Diagnostic::error("ranges overlap")
                    .at(second_span)
                    .with_snippet(first_span, "overlaps this range"),
            );
        }
    }

    /// Every extension number must land inside an `extensions` range of
    /// its extendee.
    fn check_extension_numbers(&mut self) {
        for raw in 0..self.file.members.len() as u32 {
            let member_id: MemberId = Idx::new(raw);
            let member = &self.file.members[member_id];
            if member.kind != MemberKind::Extension || member.number == 0 {
                continue;
            }
            let number = member.number;
            let number_span = member.number_span;
            let Some(extend) = member.extend else {
                continue;
            };
            let Some(extendee) = self.file.extends[extend].extendee else {
                continue;
            };
            let extendee_file = self.file.dep_file(extendee.file);
            let extendee_node = &extendee_file.types[extendee.idx];
            let in_range = extendee_node.extension_ranges().iter().any(|&range_id| {
                let range = &extendee_file.ranges[range_id];
                range.ok && number >= range.start && number < range.end
            });
            if in_range {
                continue;
            }
            let extendee_name = self.str(extendee_node.fqn).to_string();
            self.emit(
                Diagnostic::error(format!(
                    "extension number {} is not in any extension range of `{}`",
                    number, extendee_name
                ))
                .at(number_span)
                .with_help(format!(
                    "`{}` must declare `extensions` covering {} for this extension to be legal",
                    extendee_name, number
                )),
            );
        }
    }

    /// Whether an enum sets `option allow_alias = true;`.
    ///
    /// Options lower after numbers by pipeline contract, so this peeks at
    /// the declaration directly; `allow_alias` is specified to be a plain
    /// boolean literal, which makes the syntactic answer exact.
    fn enum_allows_alias(&self, type_id: TypeId) -> bool {
        let TypeAst::Enum(decl) = self.type_ast[type_id.raw() as usize] else {
            return false;
        };
        decl.options.iter().any(|option| {
            option_is_simple(option, "allow_alias")
                && matches!(&option.value, ast::Expr::Path(path) if path.text() == "true")
        })
    }

    fn enum_alias_option_span(&self, type_id: TypeId) -> Option<ast::Span> {
        let TypeAst::Enum(decl) = self.type_ast[type_id.raw() as usize] else {
            return None;
        };
        decl.options
            .iter()
            .find(|option| option_is_simple(option, "allow_alias"))
            .map(|option| option.span)
    }
}

fn option_is_simple(option: &ast::OptionDecl, name: &str) -> bool {
    matches!(
        option.path.parts.as_slice(),
        [ast::OptionPathPart::Simple(ident)] if ident.text == name
    )
}
