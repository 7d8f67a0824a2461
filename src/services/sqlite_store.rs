//! src/services/sqlite_store.rs
//!
//! Relational record store backed by SQLite. Listing filters are rendered
//! with `QueryBuilder`; search runs the raw `LIKE` predicate produced by
//! `RelationalSearch`.

use crate::{
    models::{
        file::{AssetRecord, FileUpdate, NewFile, RelatedLink},
        query::{Condition, FieldFilter, FileField, FilterOp, FindParams, SortOrder},
    },
    services::{
        record_store::{FILE_COLLECTION, RecordStore, SettingsStore, StoreError, StoreResult},
        search::{SearchQuery, fold_case, folded_column},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, name, alternative_text, caption, hash, ext, mime, size, \
     bucket, object_key, url, provider, related, path, created_by, updated_by, \
     created_at, updated_at";

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

/// Row shape of `upload_file`; `related` is stored as a JSON array.
#[derive(FromRow, Debug)]
struct FileRow {
    id: Uuid,
    name: Option<String>,
    alternative_text: Option<String>,
    caption: Option<String>,
    hash: String,
    ext: String,
    mime: String,
    size: f64,
    bucket: String,
    object_key: String,
    url: String,
    provider: String,
    related: String,
    path: Option<String>,
    created_by: Option<String>,
    updated_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for AssetRecord {
    type Error = StoreError;

    fn try_from(row: FileRow) -> StoreResult<Self> {
        let related: Vec<RelatedLink> = serde_json::from_str(&row.related)?;
        Ok(AssetRecord {
            id: row.id,
            name: row.name,
            alternative_text: row.alternative_text,
            caption: row.caption,
            hash: row.hash,
            ext: row.ext,
            mime: row.mime,
            size: row.size,
            bucket: row.bucket,
            key: row.object_key,
            url: row.url,
            provider: row.provider,
            related,
            path: row.path,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<FileRow>) -> StoreResult<Vec<AssetRecord>> {
    rows.into_iter().map(AssetRecord::try_from).collect()
}

#[derive(Clone)]
pub struct SqliteRecordStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
}

impl SqliteRecordStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        let statements = MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    fn select(&self) -> QueryBuilder<'static, Sqlite> {
        QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            SELECT_COLUMNS, FILE_COLLECTION
        ))
    }
}

/// Render `conditions` as ` AND (...)` clauses.
fn push_conditions(builder: &mut QueryBuilder<'static, Sqlite>, conditions: &[Condition]) {
    for condition in conditions {
        builder.push(" AND (");
        match condition {
            Condition::Field(filter) => push_filter(builder, filter),
            Condition::Any(filters) => {
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    builder.push("(");
                    push_filter(builder, filter);
                    builder.push(")");
                }
            }
        }
        builder.push(")");
    }
}

/// Lowercased expression for substring filters; searchable fields use
/// their Unicode-folded copy.
fn folded_expr(field: FileField) -> String {
    match field {
        FileField::Name | FileField::Hash => folded_column(field.column()),
        other => format!("LOWER({})", other.column()),
    }
}

fn push_filter(builder: &mut QueryBuilder<'static, Sqlite>, filter: &FieldFilter) {
    let column = filter.field.column();
    let values = filter.value.values();

    match filter.op {
        FilterOp::Eq => {
            builder.push(column).push(" IN (");
            let mut list = builder.separated(", ");
            for value in values {
                push_typed(&mut list, filter.field, value);
            }
            builder.push(")");
        }
        FilterOp::Contains => {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push(format!("{} LIKE ", folded_expr(filter.field)))
                    .push_bind(like_pattern(value))
                    .push(" ESCAPE '\\'");
            }
        }
        FilterOp::NotContains => {
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(" AND ");
                }
                builder
                    .push(format!(
                        "({} IS NULL OR {} NOT LIKE ",
                        column,
                        folded_expr(filter.field)
                    ))
                    .push_bind(like_pattern(value))
                    .push(" ESCAPE '\\')");
            }
        }
        FilterOp::Ne | FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
            let operator = match filter.op {
                FilterOp::Ne => "<>",
                FilterOp::Lt => "<",
                FilterOp::Lte => "<=",
                FilterOp::Gt => ">",
                _ => ">=",
            };
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(" AND ");
                }
                if filter.op == FilterOp::Ne {
                    builder.push(format!("({0} IS NULL OR {0} <> ", column));
                    push_bind_typed(builder, filter.field, value);
                    builder.push(")");
                } else {
                    builder.push(format!("{} {} ", column, operator));
                    push_bind_typed(builder, filter.field, value);
                }
            }
        }
    }
}

fn push_bind_typed(builder: &mut QueryBuilder<'static, Sqlite>, field: FileField, value: &str) {
    match numeric(field, value) {
        Some(number) => builder.push_bind(number),
        None => builder.push_bind(value.to_string()),
    };
}

fn push_typed(
    list: &mut sqlx::query_builder::Separated<'_, 'static, Sqlite, &'static str>,
    field: FileField,
    value: &str,
) {
    match numeric(field, value) {
        Some(number) => list.push_bind(number),
        None => list.push_bind(value.to_string()),
    };
}

fn numeric(field: FileField, value: &str) -> Option<f64> {
    if field.is_numeric() {
        value.parse().ok()
    } else {
        None
    }
}

fn like_pattern(value: &str) -> String {
    let mut out = String::from("%");
    for c in fold_case(value).chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn dialect(&self) -> &'static str {
        "relational"
    }

    #[instrument(skip(self, file), fields(key = %file.key))]
    async fn create(&self, file: &NewFile) -> StoreResult<AssetRecord> {
        let now = Utc::now();
        let related = serde_json::to_string(&file.related)?;

        let row = sqlx::query_as::<_, FileRow>(&format!(
            r#"
            INSERT INTO {} (
                id, name, alternative_text, caption, hash, ext, mime, size,
                bucket, object_key, url, provider, related, path,
                created_by, updated_by, created_at, updated_at,
                name_folded, hash_folded
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            FILE_COLLECTION, SELECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&file.name)
        .bind(&file.alternative_text)
        .bind(&file.caption)
        .bind(&file.hash)
        .bind(&file.ext)
        .bind(&file.mime)
        .bind(file.size)
        .bind(&file.bucket)
        .bind(&file.key)
        .bind(&file.url)
        .bind(&file.provider)
        .bind(related)
        .bind(&file.path)
        .bind(&file.created_by)
        .bind(&file.updated_by)
        .bind(now)
        .bind(now)
        .bind(file.name.as_deref().map(fold_case))
        .bind(fold_case(&file.hash))
        .fetch_one(&*self.db)
        .await?;

        row.try_into()
    }

    async fn update(&self, id: Uuid, update: &FileUpdate) -> StoreResult<Option<AssetRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            r#"
            UPDATE {} SET
                name = COALESCE(?, name),
                name_folded = COALESCE(?, name_folded),
                alternative_text = COALESCE(?, alternative_text),
                caption = COALESCE(?, caption),
                updated_by = COALESCE(?, updated_by),
                updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            FILE_COLLECTION, SELECT_COLUMNS
        ))
        .bind(&update.name)
        .bind(update.name.as_deref().map(fold_case))
        .bind(&update.alternative_text)
        .bind(&update.caption)
        .bind(&update.updated_by)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(AssetRecord::try_from).transpose()
    }

    async fn find_one(&self, id: Uuid) -> StoreResult<Option<AssetRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {} FROM {} WHERE id = ?",
            SELECT_COLUMNS, FILE_COLLECTION
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(AssetRecord::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find(&self, params: &FindParams) -> StoreResult<Vec<AssetRecord>> {
        let mut builder = self.select();
        push_conditions(&mut builder, &params.conditions);

        match params.sort {
            Some(sort) => {
                builder.push(format!(
                    " ORDER BY {} {}",
                    sort.field.column(),
                    match sort.order {
                        SortOrder::Asc => "ASC",
                        SortOrder::Desc => "DESC",
                    }
                ));
            }
            None => {
                builder.push(" ORDER BY created_at ASC, rowid ASC");
            }
        }

        if params.limit.is_some() || params.start.is_some() {
            builder.push(" LIMIT ");
            builder.push_bind(params.limit.map(i64::from).unwrap_or(-1));
            builder.push(" OFFSET ");
            builder.push_bind(i64::from(params.start.unwrap_or(0)));
        }

        let rows: Vec<FileRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        into_records(rows)
    }

    async fn count(&self, params: &FindParams) -> StoreResult<u64> {
        let mut builder: QueryBuilder<'static, Sqlite> =
            QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE 1 = 1", FILE_COLLECTION));
        push_conditions(&mut builder, &params.conditions);

        let count: i64 = builder.build_query_scalar().fetch_one(&*self.db).await?;
        Ok(count.max(0) as u64)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<Option<AssetRecord>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "DELETE FROM {} WHERE id = ? RETURNING {}",
            FILE_COLLECTION, SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        row.map(AssetRecord::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<AssetRecord>> {
        let SearchQuery::Relational { clause, binds } = query else {
            return Err(StoreError::DialectMismatch {
                store: "relational",
                query: query.dialect(),
            });
        };

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS, FILE_COLLECTION, clause
        );
        let mut q = sqlx::query_as::<_, FileRow>(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        into_records(q.fetch_all(&*self.db).await?)
    }

    async fn count_search(&self, query: &SearchQuery) -> StoreResult<u64> {
        let SearchQuery::Relational { clause, binds } = query else {
            return Err(StoreError::DialectMismatch {
                store: "relational",
                query: query.dialect(),
            });
        };

        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", FILE_COLLECTION, clause);
        let mut q = sqlx::query_scalar::<_, i64>(&sql);
        for bind in binds {
            q = q.bind(bind);
        }
        Ok(q.fetch_one(&*self.db).await?.max(0) as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteRecordStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM core_store WHERE key = ?")
                .bind(key)
                .fetch_optional(&*self.db)
                .await?;

        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn set(&self, key: &str, value: &Value) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO core_store (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(serde_json::to_string(value)?)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::query::{FilterValue, Sort},
        services::{
            fixtures::new_file,
            search::{DocumentSearch, RelationalSearch, SEARCH_FIELDS, SearchStrategy},
        },
    };
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteRecordStore {
        // in-memory databases are per connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteRecordStore::new(Arc::new(pool));
        store.run_migrations().await.unwrap();
        store
    }

    fn filter(field: FileField, op: FilterOp, value: &str) -> FieldFilter {
        FieldFilter {
            field,
            op,
            value: FilterValue::One(value.into()),
        }
    }

    #[tokio::test]
    async fn create_then_find_one_round_trips_related_links() {
        let store = store().await;
        let mut file = new_file("cat.png", "hash1", "image/png");
        file.related = vec![RelatedLink {
            ref_id: "7".into(),
            ref_: "article".into(),
            source: None,
            field: "cover".into(),
        }];

        let created = store.create(&file).await.unwrap();
        let fetched = store.find_one(created.id).await.unwrap().unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.related.len(), 1);
        assert_eq!(fetched.key, "images/cat.png");
    }

    #[tokio::test]
    async fn update_only_touches_given_fields() {
        let store = store().await;
        let mut file = new_file("cat.png", "hash1", "image/png");
        file.caption = Some("old caption".into());
        let created = store.create(&file).await.unwrap();

        let updated = store
            .update(
                created.id,
                &FileUpdate {
                    name: Some("kitten.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.name.as_deref(), Some("kitten.png"));
        assert_eq!(updated.caption.as_deref(), Some("old caption"));
        assert!(
            store
                .update(Uuid::new_v4(), &FileUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn find_applies_filters_sort_and_paging() {
        let store = store().await;
        for (name, mime, size) in [
            ("a.png", "image/png", 10.0),
            ("b.jpg", "image/jpeg", 20.0),
            ("c.pdf", "application/pdf", 30.0),
        ] {
            let mut file = new_file(name, name, mime);
            file.size = size;
            store.create(&file).await.unwrap();
        }

        let params = FindParams {
            conditions: vec![Condition::Field(filter(FileField::Size, FilterOp::Gte, "20"))],
            sort: Some(Sort {
                field: FileField::Size,
                order: SortOrder::Desc,
            }),
            ..Default::default()
        };
        let names: Vec<_> = store
            .find(&params)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["c.pdf", "b.jpg"]);
        assert_eq!(store.count(&params).await.unwrap(), 2);

        let page = FindParams {
            limit: Some(1),
            start: Some(1),
            ..Default::default()
        };
        let names: Vec<_> = store
            .find(&page)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["b.jpg"]);
    }

    #[tokio::test]
    async fn any_condition_ors_negated_equalities() {
        let store = store().await;
        store
            .create(&new_file("a.png", "h1", "image/png"))
            .await
            .unwrap();
        store
            .create(&new_file("c.pdf", "h2", "application/pdf"))
            .await
            .unwrap();

        let params = FindParams {
            conditions: vec![Condition::Any(vec![
                filter(FileField::Mime, FilterOp::Ne, "image/png"),
                filter(FileField::Mime, FilterOp::Ne, "application/pdf"),
            ])],
            ..Default::default()
        };
        assert_eq!(store.count(&params).await.unwrap(), 2);

        let params = FindParams {
            conditions: vec![Condition::Any(vec![filter(
                FileField::Mime,
                FilterOp::Ne,
                "image/png",
            )])],
            ..Default::default()
        };
        let found = store.find(&params).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mime, "application/pdf");
    }

    #[tokio::test]
    async fn search_matches_hash_or_name_case_insensitively() {
        let store = store().await;
        store
            .create(&new_file("Holiday-ABC.png", "zzz", "image/png"))
            .await
            .unwrap();
        store
            .create(&new_file("report.pdf", "xxabcxx", "application/pdf"))
            .await
            .unwrap();
        store
            .create(&new_file("other.txt", "nothing", "text/plain"))
            .await
            .unwrap();

        let query = RelationalSearch.build_or_substring_match_query(&SEARCH_FIELDS, "aBc");
        let found = store.search(&query).await.unwrap();
        let mut names: Vec<_> = found.into_iter().filter_map(|r| r.name).collect();
        names.sort();
        assert_eq!(names, vec!["Holiday-ABC.png", "report.pdf"]);
        assert_eq!(store.count_search(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let store = store().await;
        let created = store
            .create(&new_file("ÉTÉ.png", "Ünïcode_hash", "image/png"))
            .await
            .unwrap();

        let by_name = RelationalSearch.build_or_substring_match_query(&SEARCH_FIELDS, "été");
        let found = store.search(&by_name).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);

        let by_hash = RelationalSearch.build_or_substring_match_query(&SEARCH_FIELDS, "üNÏ");
        assert_eq!(store.count_search(&by_hash).await.unwrap(), 1);

        // a rename refreshes the folded copy
        store
            .update(
                created.id,
                &FileUpdate {
                    name: Some("HIVER.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.count_search(&by_name).await.unwrap(), 0);
        let renamed = RelationalSearch.build_or_substring_match_query(&SEARCH_FIELDS, "hiver");
        assert_eq!(store.count_search(&renamed).await.unwrap(), 1);

        let params = FindParams {
            conditions: vec![Condition::Field(filter(
                FileField::Hash,
                FilterOp::Contains,
                "ÜNÏ",
            ))],
            ..Default::default()
        };
        assert_eq!(store.count(&params).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_rejects_foreign_dialect() {
        let store = store().await;
        let query = DocumentSearch.build_or_substring_match_query(&SEARCH_FIELDS, "abc");
        assert!(matches!(
            store.search(&query).await,
            Err(StoreError::DialectMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn delete_returns_removed_record() {
        let store = store().await;
        let created = store
            .create(&new_file("a.png", "h1", "image/png"))
            .await
            .unwrap();

        let removed = store.delete(created.id).await.unwrap();
        assert_eq!(removed.map(|r| r.id), Some(created.id));
        assert!(store.find_one(created.id).await.unwrap().is_none());
        assert!(store.delete(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn settings_upsert() {
        let store = store().await;
        assert_eq!(SettingsStore::get(&store, "k").await.unwrap(), None);

        store.set("k", &json!({"a": 1})).await.unwrap();
        store.set("k", &json!({"a": 2})).await.unwrap();
        assert_eq!(
            SettingsStore::get(&store, "k").await.unwrap(),
            Some(json!({"a": 2}))
        );
        store.ping().await.unwrap();
    }
}
