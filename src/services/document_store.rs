//! src/services/document_store.rs
//!
//! Document-dialect record store. Records are held as JSON documents in an
//! in-process collection; listing filters are evaluated field by field and
//! search accepts `$or` / `$regex` filter documents.

use crate::{
    models::{
        file::{AssetRecord, FileUpdate, NewFile},
        query::{Condition, FieldFilter, FilterOp, FindParams, SortOrder},
    },
    services::{
        record_store::{RecordStore, SettingsStore, StoreError, StoreResult},
        search::SearchQuery,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use regex::RegexBuilder;
use serde_json::{Map, Value};
use std::{cmp::Ordering, collections::HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct DocumentRecordStore {
    /// Documents in insertion order.
    files: RwLock<Vec<Value>>,
    settings: RwLock<HashMap<String, Value>>,
}

impl DocumentRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_record(doc: &Value) -> StoreResult<AssetRecord> {
    Ok(serde_json::from_value(doc.clone())?)
}

fn doc_id(doc: &Value) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// Field value as text, the way filters compare it.
fn field_text(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn compare(doc: &Value, filter: &FieldFilter, value: &str) -> Option<Ordering> {
    let field = filter.field.api_name();
    if filter.field.is_numeric() {
        let lhs = doc.get(field)?.as_f64()?;
        let rhs = value.parse::<f64>().ok()?;
        lhs.partial_cmp(&rhs)
    } else {
        Some(field_text(doc, field)?.as_str().cmp(value))
    }
}

fn eq(doc: &Value, filter: &FieldFilter, value: &str) -> bool {
    compare(doc, filter, value) == Some(Ordering::Equal)
}

fn contains(doc: &Value, filter: &FieldFilter, value: &str) -> bool {
    field_text(doc, filter.field.api_name())
        .map(|text| text.to_lowercase().contains(&value.to_lowercase()))
        .unwrap_or(false)
}

fn matches_filter(doc: &Value, filter: &FieldFilter) -> bool {
    let values = filter.value.values();
    match filter.op {
        FilterOp::Eq => values.iter().any(|v| eq(doc, filter, v)),
        FilterOp::Ne => values.iter().all(|v| !eq(doc, filter, v)),
        FilterOp::Contains => values.iter().any(|v| contains(doc, filter, v)),
        FilterOp::NotContains => values.iter().all(|v| !contains(doc, filter, v)),
        FilterOp::Lt => values
            .iter()
            .all(|v| compare(doc, filter, v) == Some(Ordering::Less)),
        FilterOp::Lte => values.iter().all(|v| {
            matches!(
                compare(doc, filter, v),
                Some(Ordering::Less | Ordering::Equal)
            )
        }),
        FilterOp::Gt => values
            .iter()
            .all(|v| compare(doc, filter, v) == Some(Ordering::Greater)),
        FilterOp::Gte => values.iter().all(|v| {
            matches!(
                compare(doc, filter, v),
                Some(Ordering::Greater | Ordering::Equal)
            )
        }),
    }
}

fn matches_conditions(doc: &Value, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| match condition {
        Condition::Field(filter) => matches_filter(doc, filter),
        Condition::Any(filters) => filters.iter().any(|f| matches_filter(doc, f)),
    })
}

/// Evaluate a filter document: `$or`, `$and`, `{field: {$regex, $options}}`
/// and plain `{field: value}` equality.
fn matches_document(doc: &Value, query: &Value) -> StoreResult<bool> {
    let Value::Object(clauses) = query else {
        return Err(StoreError::MalformedQuery(format!(
            "expected an object, got {}",
            query
        )));
    };

    for (key, expected) in clauses {
        let matched = match key.as_str() {
            "$or" => any_of(doc, expected)?,
            "$and" => all_of(doc, expected)?,
            field => match expected {
                Value::Object(ops) if ops.contains_key("$regex") => {
                    matches_regex(doc.get(field), ops)?
                }
                literal => doc.get(field).unwrap_or(&Value::Null) == literal,
            },
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_queries(list: &Value) -> StoreResult<&Vec<Value>> {
    list.as_array()
        .ok_or_else(|| StoreError::MalformedQuery("logical operator expects an array".into()))
}

fn any_of(doc: &Value, list: &Value) -> StoreResult<bool> {
    for query in sub_queries(list)? {
        if matches_document(doc, query)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn all_of(doc: &Value, list: &Value) -> StoreResult<bool> {
    for query in sub_queries(list)? {
        if !matches_document(doc, query)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_regex(value: Option<&Value>, ops: &Map<String, Value>) -> StoreResult<bool> {
    let pattern = ops
        .get("$regex")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::MalformedQuery("$regex must be a string".into()))?;
    let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .build()?;

    Ok(match value {
        Some(Value::String(s)) => regex.is_match(s),
        _ => false,
    })
}

fn sort_key(doc: &Value, field: &str) -> Option<Value> {
    doc.get(field).filter(|v| !v.is_null()).cloned()
}

fn cmp_values(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl RecordStore for DocumentRecordStore {
    fn dialect(&self) -> &'static str {
        "document"
    }

    async fn create(&self, file: &NewFile) -> StoreResult<AssetRecord> {
        let now = Utc::now();
        let record = AssetRecord {
            id: Uuid::new_v4(),
            name: file.name.clone(),
            alternative_text: file.alternative_text.clone(),
            caption: file.caption.clone(),
            hash: file.hash.clone(),
            ext: file.ext.clone(),
            mime: file.mime.clone(),
            size: file.size,
            bucket: file.bucket.clone(),
            key: file.key.clone(),
            url: file.url.clone(),
            provider: file.provider.clone(),
            related: file.related.clone(),
            path: file.path.clone(),
            created_by: file.created_by.clone(),
            updated_by: file.updated_by.clone(),
            created_at: now,
            updated_at: now,
        };
        let doc = serde_json::to_value(&record)?;
        self.files.write().await.push(doc);
        Ok(record)
    }

    async fn update(&self, id: Uuid, update: &FileUpdate) -> StoreResult<Option<AssetRecord>> {
        let id = id.to_string();
        let mut files = self.files.write().await;
        let Some(doc) = files.iter_mut().find(|d| doc_id(d) == Some(id.as_str())) else {
            return Ok(None);
        };

        let mut record = to_record(doc)?;
        if let Some(name) = &update.name {
            record.name = Some(name.clone());
        }
        if let Some(alternative_text) = &update.alternative_text {
            record.alternative_text = Some(alternative_text.clone());
        }
        if let Some(caption) = &update.caption {
            record.caption = Some(caption.clone());
        }
        if let Some(updated_by) = &update.updated_by {
            record.updated_by = Some(updated_by.clone());
        }
        record.updated_at = Utc::now();

        *doc = serde_json::to_value(&record)?;
        Ok(Some(record))
    }

    async fn find_one(&self, id: Uuid) -> StoreResult<Option<AssetRecord>> {
        let id = id.to_string();
        let files = self.files.read().await;
        files
            .iter()
            .find(|d| doc_id(d) == Some(id.as_str()))
            .map(to_record)
            .transpose()
    }

    async fn find(&self, params: &FindParams) -> StoreResult<Vec<AssetRecord>> {
        let files = self.files.read().await;
        let mut matched: Vec<&Value> = files
            .iter()
            .filter(|doc| matches_conditions(doc, &params.conditions))
            .collect();

        if let Some(sort) = params.sort {
            let field = sort.field.api_name();
            matched.sort_by(|a, b| {
                let ord = cmp_values(&sort_key(a, field), &sort_key(b, field));
                match sort.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        let start = params.start.unwrap_or(0) as usize;
        let limit = params.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        matched
            .into_iter()
            .skip(start)
            .take(limit)
            .map(to_record)
            .collect()
    }

    async fn count(&self, params: &FindParams) -> StoreResult<u64> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .filter(|doc| matches_conditions(doc, &params.conditions))
            .count() as u64)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<Option<AssetRecord>> {
        let id = id.to_string();
        let mut files = self.files.write().await;
        match files.iter().position(|d| doc_id(d) == Some(id.as_str())) {
            Some(idx) => to_record(&files.remove(idx)).map(Some),
            None => Ok(None),
        }
    }

    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<AssetRecord>> {
        let SearchQuery::Document(filter) = query else {
            return Err(StoreError::DialectMismatch {
                store: "document",
                query: query.dialect(),
            });
        };

        let files = self.files.read().await;
        let mut found = Vec::new();
        for doc in files.iter() {
            if matches_document(doc, filter)? {
                found.push(to_record(doc)?);
            }
        }
        Ok(found)
    }

    async fn count_search(&self, query: &SearchQuery) -> StoreResult<u64> {
        Ok(self.search(query).await?.len() as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for DocumentRecordStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.settings.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        self.settings
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}
