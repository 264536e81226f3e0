//! Category resolution: map a user-supplied category argument to a numeric
//! id, matching names case-insensitively against the whole name only.
//!
//! The resolver never prompts. A zero-match outcome is returned as
//! [`Lookup::Missing`] and the caller decides whether to create, ask, or
//! abort; this keeps the algorithm testable without a terminal.

use std::collections::HashMap;
use std::fmt::Write as _;

use thiserror::Error;

use crate::api::categories::{self, Category};
use crate::api::session::Session;
use crate::api::{ApiError, PwgClient};

/// Separator between ancestor names in a rendered category path.
pub const PATH_SEPARATOR: &str = "::";

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: u64,
    pub path: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("multiple categories are named '{name}'; pass a numeric id instead")]
    Ambiguous {
        name: String,
        candidates: Vec<Candidate>,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub enum Lookup {
    /// Input was already a numeric id; no server round-trip happened.
    Id(u64),
    /// Exactly one category matched the name.
    Matched { id: u64, path: String },
    /// No category matched; the caller decides create/ask/abort.
    Missing,
}

/// Resolve a category argument. Digits pass through verbatim; anything else
/// is matched against a fresh flat listing from the server.
pub fn lookup(
    client: &PwgClient,
    session: &Session,
    input: &str,
) -> Result<Lookup, ResolveError> {
    if let Some(id) = parse_id(input) {
        return Ok(Lookup::Id(id));
    }

    let categories = categories::fetch_flat(client, session)?;
    resolve_name(&categories, input)
}

/// Accept the input as an id only when it is all digits.
pub fn parse_id(input: &str) -> Option<u64> {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    input.parse().ok()
}

/// Whole-name, case-insensitive matching over a category set.
pub fn resolve_name(categories: &[Category], name: &str) -> Result<Lookup, ResolveError> {
    let index: HashMap<u64, &Category> = categories.iter().map(|c| (c.id, c)).collect();
    let wanted = name.to_lowercase();
    let matches: Vec<&Category> = categories
        .iter()
        .filter(|c| c.name.to_lowercase() == wanted)
        .collect();

    match matches.as_slice() {
        [] => Ok(Lookup::Missing),
        [category] => Ok(Lookup::Matched {
            id: category.id,
            path: full_path(&index, category),
        }),
        _ => Err(ResolveError::Ambiguous {
            name: name.to_string(),
            candidates: matches
                .iter()
                .map(|category| Candidate {
                    id: category.id,
                    path: full_path(&index, category),
                })
                .collect(),
        }),
    }
}

/// Render the full display path of a category from its ancestor chain,
/// root first. The chain is self-inclusive, so the category's own name is
/// the last element.
fn full_path(index: &HashMap<u64, &Category>, category: &Category) -> String {
    let names: Vec<&str> = category
        .uppercats
        .split(',')
        .filter_map(|raw| raw.trim().parse::<u64>().ok())
        .filter_map(|id| index.get(&id).map(|c| c.name.as_str()))
        .collect();

    if names.is_empty() {
        category.name.clone()
    } else {
        names.join(PATH_SEPARATOR)
    }
}

/// Render the category forest for operator inspection, two spaces of indent
/// per depth level.
pub fn render_tree(categories: &[Category]) -> String {
    let mut out = String::new();
    render_level(categories, 0, &mut out);
    out
}

fn render_level(categories: &[Category], depth: usize, out: &mut String) {
    for category in categories {
        let _ = writeln!(out, "{}({}) {}", "  ".repeat(depth), category.id, category.name);
        render_level(&category.children, depth + 1, out);
    }
}
