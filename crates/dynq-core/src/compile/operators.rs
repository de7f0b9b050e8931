//! Static table from filter operator tokens to their relational meaning.

use crate::sql::CompareOp;

/// How a `LIKE` pattern is built from the user value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// The value already is a pattern.
    Raw,
    /// `%v%`
    Contains,
    /// `v%`
    StartsWith,
    /// `%v`
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Compare(CompareOp),
    List { negated: bool },
    Pattern(PatternKind),
    Range { negated: bool },
    NullTest { negated: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub token: &'static str,
    pub kind: OperatorKind,
}

const fn op(token: &'static str, kind: OperatorKind) -> Operator {
    Operator { token, kind }
}

static OPERATORS: &[Operator] = &[
    op("_eq", OperatorKind::Compare(CompareOp::Eq)),
    op("_ne", OperatorKind::Compare(CompareOp::Ne)),
    op("_neq", OperatorKind::Compare(CompareOp::Ne)),
    op("_lt", OperatorKind::Compare(CompareOp::Lt)),
    op("_lte", OperatorKind::Compare(CompareOp::Lte)),
    op("_gt", OperatorKind::Compare(CompareOp::Gt)),
    op("_gte", OperatorKind::Compare(CompareOp::Gte)),
    op("_in", OperatorKind::List { negated: false }),
    op("_nin", OperatorKind::List { negated: true }),
    op("_like", OperatorKind::Pattern(PatternKind::Raw)),
    op("_contains", OperatorKind::Pattern(PatternKind::Contains)),
    op("_starts_with", OperatorKind::Pattern(PatternKind::StartsWith)),
    op("_ends_with", OperatorKind::Pattern(PatternKind::EndsWith)),
    op("_between", OperatorKind::Range { negated: false }),
    op("_nbetween", OperatorKind::Range { negated: true }),
    op("_is_null", OperatorKind::NullTest { negated: false }),
    op("_is_nnull", OperatorKind::NullTest { negated: true }),
];

pub fn lookup(token: &str) -> Option<&'static Operator> {
    OPERATORS.iter().find(|o| o.token == token)
}

/// Tokens accepted inside an `id` filter on a relation.
pub(crate) const ID_SET_OPERATORS: &[&str] = &["_in", "_nin", "_eq", "_neq", "_eq_set"];

/// Build the `LIKE` pattern for `raw` under `kind`.
pub(crate) fn like_pattern(kind: PatternKind, raw: &str) -> String {
    use crate::sql::helpers::escape_like;
    match kind {
        PatternKind::Raw => raw.to_string(),
        PatternKind::Contains => format!("%{}%", escape_like(raw)),
        PatternKind::StartsWith => format!("{}%", escape_like(raw)),
        PatternKind::EndsWith => format!("%{}", escape_like(raw)),
    }
}
