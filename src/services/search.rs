//! Search strategies: build a case-insensitive "any field contains term"
//! query in the dialect of the active record store.
//!
//! The strategy is chosen once at startup together with the store, so call
//! sites never inspect which backend is running.

use regex::escape;
use serde_json::{Map, Value, json};

/// Fields matched by the media library search box.
pub const SEARCH_FIELDS: [&str; 2] = ["hash", "name"];

/// Unicode lowercase used for case-insensitive matching. SQLite's own
/// `LOWER()` only folds ASCII, so the relational store keeps a folded copy
/// of every searchable field.
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Column holding the folded copy of a searchable field.
pub fn folded_column(field: &str) -> String {
    format!("{}_folded", field)
}

/// A query in one store's native dialect.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchQuery {
    /// Raw SQL predicate with positional `?` placeholders and their binds.
    Relational { clause: String, binds: Vec<String> },
    /// A document filter using `$or` / `$regex`.
    Document(Value),
}

impl SearchQuery {
    pub fn dialect(&self) -> &'static str {
        match self {
            Self::Relational { .. } => "relational",
            Self::Document(_) => "document",
        }
    }
}

pub trait SearchStrategy: Send + Sync {
    fn build_or_substring_match_query(&self, fields: &[&str], term: &str) -> SearchQuery;
}

/// `field_folded LIKE '%term%'` joined with `OR`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelationalSearch;

impl SearchStrategy for RelationalSearch {
    fn build_or_substring_match_query(&self, fields: &[&str], term: &str) -> SearchQuery {
        let pattern = format!("%{}%", escape_like(&fold_case(term)));
        let clause = fields
            .iter()
            .map(|field| format!("{} LIKE ? ESCAPE '\\'", folded_column(field)))
            .collect::<Vec<_>>()
            .join(" OR ");
        SearchQuery::Relational {
            clause,
            binds: vec![pattern; fields.len()],
        }
    }
}

/// `{ $or: [{ field: { $regex, $options: "i" } }, ...] }`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentSearch;

impl SearchStrategy for DocumentSearch {
    fn build_or_substring_match_query(&self, fields: &[&str], term: &str) -> SearchQuery {
        let pattern = escape(term);
        let clauses: Vec<Value> = fields
            .iter()
            .map(|field| {
                let mut clause = Map::new();
                clause.insert(
                    field.to_string(),
                    json!({ "$regex": pattern, "$options": "i" }),
                );
                Value::Object(clause)
            })
            .collect();
        SearchQuery::Document(json!({ "$or": clauses }))
    }
}

/// Escape `LIKE` wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
