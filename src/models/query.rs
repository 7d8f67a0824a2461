//! Listing parameters for `find` / `count`.
//!
//! Clients send Strapi-style query pairs (`mime_ncontains=image/png`,
//! `size_gt=10`, `_sort=created_at:DESC`, `_limit=20`). They are parsed
//! into a backend-neutral descriptor that each record store renders in its
//! own dialect. Field names are closed over `FileField`, so nothing from
//! the query string reaches SQL text.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryParseError {
    #[error("unknown filter field `{0}`")]
    UnknownField(String),
    #[error("invalid value `{value}` for `{param}`")]
    InvalidValue { param: String, value: String },
}

/// Fields of an asset record that may be filtered or sorted on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileField {
    Name,
    AlternativeText,
    Caption,
    Hash,
    Ext,
    Mime,
    Size,
    Url,
    Provider,
    Path,
    Bucket,
    Key,
    CreatedAt,
    UpdatedAt,
}

impl FileField {
    pub fn from_api(name: &str) -> Option<Self> {
        let field = match name {
            "name" => Self::Name,
            "alternativeText" => Self::AlternativeText,
            "caption" => Self::Caption,
            "hash" => Self::Hash,
            "ext" => Self::Ext,
            "mime" => Self::Mime,
            "size" => Self::Size,
            "url" => Self::Url,
            "provider" => Self::Provider,
            "path" => Self::Path,
            "Bucket" => Self::Bucket,
            "Key" => Self::Key,
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            _ => return None,
        };
        Some(field)
    }

    /// Name of the field in serialized records (and document stores).
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::AlternativeText => "alternativeText",
            Self::Caption => "caption",
            Self::Hash => "hash",
            Self::Ext => "ext",
            Self::Mime => "mime",
            Self::Size => "size",
            Self::Url => "url",
            Self::Provider => "provider",
            Self::Path => "path",
            Self::Bucket => "Bucket",
            Self::Key => "Key",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }

    /// Column name in the relational schema.
    pub fn column(self) -> &'static str {
        match self {
            Self::AlternativeText => "alternative_text",
            Self::Bucket => "bucket",
            Self::Key => "object_key",
            other => other.api_name(),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Size)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Contains,
    NotContains,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl FilterOp {
    fn from_suffix(suffix: &str) -> Option<Self> {
        let op = match suffix {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "contains" => Self::Contains,
            "ncontains" => Self::NotContains,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    One(String),
    Many(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> &[String] {
        match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    pub field: FileField,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// A top-level clause; clauses in `FindParams::conditions` are ANDed.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Field(FieldFilter),
    /// Matches when any of the filters match.
    Any(Vec<FieldFilter>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: FileField,
    pub order: SortOrder,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct FindParams {
    pub conditions: Vec<Condition>,
    pub sort: Option<Sort>,
    pub limit: Option<u32>,
    pub start: Option<u32>,
}

impl FindParams {
    /// Parse raw query-string pairs. Repeated keys become multi-value filters.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, QueryParseError> {
        let mut params = FindParams::default();
        let mut grouped: Vec<(&str, Vec<String>)> = Vec::new();

        for (key, value) in pairs {
            match key.as_str() {
                "_limit" => params.limit = Some(parse_u32(key, value)?),
                "_start" => params.start = Some(parse_u32(key, value)?),
                "_sort" => params.sort = Some(parse_sort(value)?),
                _ => match grouped.iter_mut().find(|(k, _)| *k == key.as_str()) {
                    Some((_, values)) => values.push(value.clone()),
                    None => grouped.push((key.as_str(), vec![value.clone()])),
                },
            }
        }

        for (key, mut values) in grouped {
            let (field, op) = split_filter_key(key)?;
            let value = if values.len() == 1 {
                FilterValue::One(values.remove(0))
            } else {
                FilterValue::Many(values)
            };
            if field.is_numeric() {
                for v in value.values() {
                    if v.parse::<f64>().is_err() {
                        return Err(QueryParseError::InvalidValue {
                            param: key.to_string(),
                            value: v.clone(),
                        });
                    }
                }
            }
            params
                .conditions
                .push(Condition::Field(FieldFilter { field, op, value }));
        }

        Ok(params)
    }
}

fn split_filter_key(key: &str) -> Result<(FileField, FilterOp), QueryParseError> {
    if let Some((field, suffix)) = key.rsplit_once('_') {
        if let (Some(field), Some(op)) = (FileField::from_api(field), FilterOp::from_suffix(suffix))
        {
            return Ok((field, op));
        }
    }
    FileField::from_api(key)
        .map(|field| (field, FilterOp::Eq))
        .ok_or_else(|| QueryParseError::UnknownField(key.to_string()))
}

fn parse_u32(param: &str, value: &str) -> Result<u32, QueryParseError> {
    value.parse().map_err(|_| QueryParseError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
    })
}

fn parse_sort(value: &str) -> Result<Sort, QueryParseError> {
    let (field, order) = value.split_once(':').unwrap_or((value, "ASC"));
    let field = FileField::from_api(field)
        .ok_or_else(|| QueryParseError::UnknownField(field.to_string()))?;
    let order = match order.to_ascii_uppercase().as_str() {
        "ASC" => SortOrder::Asc,
        "DESC" => SortOrder::Desc,
        _ => {
            return Err(QueryParseError::InvalidValue {
                param: "_sort".into(),
                value: value.to_string(),
            });
        }
    };
    Ok(Sort { field, order })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn repeated_keys_become_multi_value() {
        let params = FindParams::from_pairs(&pairs(&[
            ("mime_ncontains", "image/png"),
            ("mime_ncontains", "image/jpeg"),
        ]))
        .unwrap();

        assert_eq!(
            params.conditions,
            vec![Condition::Field(FieldFilter {
                field: FileField::Mime,
                op: FilterOp::NotContains,
                value: FilterValue::Many(vec!["image/png".into(), "image/jpeg".into()]),
            })]
        );
    }

    #[test]
    fn underscore_field_names_are_not_split_into_ops() {
        let params = FindParams::from_pairs(&pairs(&[
            ("created_at", "2024-01-01"),
            ("created_at_lt", "2025-01-01"),
        ]))
        .unwrap();

        let ops: Vec<_> = params
            .conditions
            .iter()
            .map(|c| match c {
                Condition::Field(f) => (f.field, f.op),
                Condition::Any(_) => unreachable!(),
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                (FileField::CreatedAt, FilterOp::Eq),
                (FileField::CreatedAt, FilterOp::Lt)
            ]
        );
    }

    #[test]
    fn paging_and_sort_are_parsed() {
        let params = FindParams::from_pairs(&pairs(&[
            ("_limit", "10"),
            ("_start", "20"),
            ("_sort", "size:desc"),
        ]))
        .unwrap();

        assert_eq!(params.limit, Some(10));
        assert_eq!(params.start, Some(20));
        assert_eq!(
            params.sort,
            Some(Sort {
                field: FileField::Size,
                order: SortOrder::Desc
            })
        );
        assert!(params.conditions.is_empty());
    }

    #[test]
    fn unknown_fields_and_bad_numbers_are_rejected() {
        assert_eq!(
            FindParams::from_pairs(&pairs(&[("password", "x")])),
            Err(QueryParseError::UnknownField("password".into()))
        );
        assert!(matches!(
            FindParams::from_pairs(&pairs(&[("size_gt", "big")])),
            Err(QueryParseError::InvalidValue { .. })
        ));
    }
}
