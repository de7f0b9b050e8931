use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CompileError, Result};

/// Alias of the root table in every statement.
pub const ROOT_ALIAS: &str = "self";

/// Separator between relation properties inside an alias.
///
/// Catalog names never contain it, so distinct paths never share an alias.
pub const ALIAS_SEPARATOR: char = '$';

/// Longest relation alias handed to MySQL. Identifiers stop at 64
/// characters and junction aliases add a one-letter prefix.
pub const MAX_ALIAS_LEN: usize = 63;

/// Very simple identifier guard: letters, digits, underscore only.
pub fn validate_name(name: &str) -> Result<()> {
    static NAME: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));
    if name.is_empty() {
        return Err(CompileError::InvalidIdentifier("empty".into()));
    }
    if !NAME.is_match(name) {
        return Err(CompileError::InvalidIdentifier(format!("`{name}`")));
    }
    Ok(())
}

/// Aliases are names joined by [`ALIAS_SEPARATOR`].
pub(crate) fn validate_alias(alias: &str) -> Result<()> {
    for part in alias.split(ALIAS_SEPARATOR) {
        validate_name(part)?;
    }
    Ok(())
}

/// Labels are `alias.column`.
pub(crate) fn validate_label(label: &str) -> Result<()> {
    let (alias, column) = split_label(label)
        .ok_or_else(|| CompileError::InvalidIdentifier(format!("label `{label}`")))?;
    validate_alias(alias)?;
    validate_name(column)
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Alias for a relation path; the empty path is the root.
pub fn path_alias<S: AsRef<str>>(path: &[S]) -> String {
    let mut alias = String::from(ROOT_ALIAS);
    for segment in path {
        alias.push(ALIAS_SEPARATOR);
        alias.push_str(segment.as_ref());
    }
    alias
}

/// Short alias for the `n`th join, used when the path alias is too long.
pub fn numbered_alias(n: usize) -> String {
    format!("{ROOT_ALIAS}{ALIAS_SEPARATOR}j{n}")
}

/// Result-column label for `column` read through `alias`.
pub fn label(alias: &str, column: &str) -> String {
    format!("{alias}.{column}")
}

pub fn split_label(label: &str) -> Option<(&str, &str)> {
    label.rsplit_once('.')
}

/// Escape `LIKE` metacharacters so user text matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
