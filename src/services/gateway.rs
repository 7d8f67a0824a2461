//! Uniform access to asset records on top of whichever record store is
//! configured. Create and update stamp audit identities and emit
//! lifecycle events; listing rewrites filters the stores cannot express.

use crate::{
    errors::UploadError,
    models::{
        actor::Actor,
        file::{AssetRecord, FileUpdate, NewFile},
        query::{Condition, FieldFilter, FileField, FilterOp, FilterValue, FindParams},
        settings::{SETTINGS_KEY, UploadSettings},
    },
    services::{
        events::{EventHub, MediaEventKind, Telemetry},
        record_store::{RecordStore, SettingsStore, StoreError, StoreResult},
        search::{SEARCH_FIELDS, SearchStrategy},
    },
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn RecordStore>,
    search: Arc<dyn SearchStrategy>,
    settings: Arc<dyn SettingsStore>,
    events: EventHub,
    telemetry: Arc<dyn Telemetry>,
}

impl PersistenceGateway {
    pub fn new(
        store: Arc<dyn RecordStore>,
        search: Arc<dyn SearchStrategy>,
        settings: Arc<dyn SettingsStore>,
        events: EventHub,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            store,
            search,
            settings,
            events,
            telemetry,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    #[instrument(skip(self, file, actor), fields(key = %file.key))]
    pub async fn create(
        &self,
        mut file: NewFile,
        actor: Option<&Actor>,
    ) -> Result<AssetRecord, UploadError> {
        if let Some(actor) = actor {
            file.created_by = Some(actor.id.clone());
            file.updated_by = Some(actor.id.clone());
        }
        self.send_media_metrics(file.caption.as_deref(), file.alternative_text.as_deref());

        let record = self.store.create(&file).await?;
        self.events.emit(MediaEventKind::Create, record.sanitized());
        Ok(record)
    }

    #[instrument(skip(self, update, actor))]
    pub async fn update(
        &self,
        id: Uuid,
        mut update: FileUpdate,
        actor: Option<&Actor>,
    ) -> Result<AssetRecord, UploadError> {
        if let Some(actor) = actor {
            update.updated_by = Some(actor.id.clone());
        }
        self.send_media_metrics(update.caption.as_deref(), update.alternative_text.as_deref());

        let record = self
            .store
            .update(id, &update)
            .await?
            .ok_or_else(|| UploadError::NotFound("file not found".into()))?;
        self.events.emit(MediaEventKind::Update, record.sanitized());
        Ok(record)
    }

    pub async fn find_one(&self, id: Uuid) -> StoreResult<Option<AssetRecord>> {
        self.store.find_one(id).await
    }

    pub async fn find(&self, mut params: FindParams) -> StoreResult<Vec<AssetRecord>> {
        combine_filters(&mut params);
        self.store.find(&params).await
    }

    pub async fn count(&self, mut params: FindParams) -> StoreResult<u64> {
        combine_filters(&mut params);
        self.store.count(&params).await
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<Option<AssetRecord>> {
        self.store.delete(id).await
    }

    /// Records whose `hash` or `name` contains `term`, ignoring case.
    #[instrument(skip(self))]
    pub async fn search(&self, term: &str) -> StoreResult<Vec<AssetRecord>> {
        let query = self
            .search
            .build_or_substring_match_query(&SEARCH_FIELDS, term);
        self.store.search(&query).await
    }

    pub async fn count_search(&self, term: &str) -> StoreResult<u64> {
        let query = self
            .search
            .build_or_substring_match_query(&SEARCH_FIELDS, term);
        self.store.count_search(&query).await
    }

    pub async fn get_settings(&self) -> Result<UploadSettings, UploadError> {
        match self.settings.get(SETTINGS_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value).map_err(StoreError::from)?),
            None => Ok(UploadSettings::default()),
        }
    }

    pub async fn set_settings(
        &self,
        settings: UploadSettings,
    ) -> Result<UploadSettings, UploadError> {
        match settings.responsive_dimensions {
            Some(true) => self.telemetry.send("didEnableResponsiveDimensions"),
            Some(false) => self.telemetry.send("didDisableResponsiveDimensions"),
            None => {}
        }

        let value = serde_json::to_value(&settings).map_err(StoreError::from)?;
        self.settings.set(SETTINGS_KEY, &value).await?;
        Ok(settings)
    }

    fn send_media_metrics(&self, caption: Option<&str>, alternative_text: Option<&str>) {
        if caption.is_some_and(|c| !c.is_empty()) {
            self.telemetry.send("didSaveMediaWithCaption");
        }
        if alternative_text.is_some_and(|a| !a.is_empty()) {
            self.telemetry.send("didSaveMediaWithAlternativeText");
        }
    }
}

/// Rewrite a multi-value `mime_ncontains` into a disjunction of
/// `mime <> value` clauses, since stores cannot take the raw array.
pub fn combine_filters(params: &mut FindParams) {
    for condition in params.conditions.iter_mut() {
        let Condition::Field(FieldFilter {
            field: FileField::Mime,
            op: FilterOp::NotContains,
            value: FilterValue::Many(values),
        }) = condition
        else {
            continue;
        };

        let clauses = values
            .iter()
            .map(|value| FieldFilter {
                field: FileField::Mime,
                op: FilterOp::Ne,
                value: FilterValue::One(value.clone()),
            })
            .collect();
        *condition = Condition::Any(clauses);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        document_store::DocumentRecordStore, events::testing::RecordingTelemetry,
        fixtures::new_file, search::DocumentSearch,
    };
    use serde_json::json;

    fn gateway() -> (PersistenceGateway, Arc<RecordingTelemetry>) {
        let store = Arc::new(DocumentRecordStore::new());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let gateway = PersistenceGateway::new(
            store.clone(),
            Arc::new(DocumentSearch),
            store,
            EventHub::new(16),
            telemetry.clone(),
        );
        (gateway, telemetry)
    }

    #[test]
    fn mime_ncontains_array_becomes_or_of_negated_equalities() {
        let mut params = FindParams {
            conditions: vec![Condition::Field(FieldFilter {
                field: FileField::Mime,
                op: FilterOp::NotContains,
                value: FilterValue::Many(vec!["image/png".into(), "image/jpeg".into()]),
            })],
            ..Default::default()
        };
        combine_filters(&mut params);

        assert_eq!(
            params.conditions,
            vec![Condition::Any(vec![
                FieldFilter {
                    field: FileField::Mime,
                    op: FilterOp::Ne,
                    value: FilterValue::One("image/png".into()),
                },
                FieldFilter {
                    field: FileField::Mime,
                    op: FilterOp::Ne,
                    value: FilterValue::One("image/jpeg".into()),
                },
            ])]
        );
    }

    #[test]
    fn single_value_and_other_fields_are_left_alone() {
        let original = vec![
            Condition::Field(FieldFilter {
                field: FileField::Mime,
                op: FilterOp::NotContains,
                value: FilterValue::One("image".into()),
            }),
            Condition::Field(FieldFilter {
                field: FileField::Name,
                op: FilterOp::NotContains,
                value: FilterValue::Many(vec!["a".into(), "b".into()]),
            }),
        ];
        let mut params = FindParams {
            conditions: original.clone(),
            ..Default::default()
        };
        combine_filters(&mut params);
        assert_eq!(params.conditions, original);
    }

    #[tokio::test]
    async fn create_stamps_actor_and_emits_one_sanitized_event() {
        let (gateway, telemetry) = gateway();
        let mut rx = gateway.events().subscribe();
        let mut file = new_file("a.png", "h", "image/png");
        file.caption = Some("a caption".into());

        let actor = Actor { id: "admin-1".into() };
        let record = gateway.create(file, Some(&actor)).await.unwrap();

        assert_eq!(record.created_by.as_deref(), Some("admin-1"));
        assert_eq!(record.updated_by.as_deref(), Some("admin-1"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, MediaEventKind::Create);
        assert_eq!(event.media, record.sanitized());
        assert!(rx.try_recv().is_err());
        assert_eq!(telemetry.sent(), vec!["didSaveMediaWithCaption"]);
    }

    #[tokio::test]
    async fn create_without_actor_leaves_audit_fields_empty() {
        let (gateway, _) = gateway();
        let record = gateway
            .create(new_file("a.png", "h", "image/png"), None)
            .await
            .unwrap();
        assert_eq!(record.created_by, None);
        assert_eq!(record.updated_by, None);
    }

    #[tokio::test]
    async fn update_emits_event_and_missing_id_is_not_found() {
        let (gateway, _) = gateway();
        let record = gateway
            .create(new_file("a.png", "h", "image/png"), None)
            .await
            .unwrap();
        let mut rx = gateway.events().subscribe();

        let actor = Actor { id: "7".into() };
        let updated = gateway
            .update(
                record.id,
                FileUpdate {
                    name: Some("b.png".into()),
                    ..Default::default()
                },
                Some(&actor),
            )
            .await
            .unwrap();
        assert_eq!(updated.updated_by.as_deref(), Some("7"));
        assert_eq!(rx.recv().await.unwrap().event, MediaEventKind::Update);

        assert!(matches!(
            gateway
                .update(Uuid::new_v4(), FileUpdate::default(), None)
                .await,
            Err(UploadError::NotFound(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn find_and_count_apply_filter_rewrite() {
        let (gateway, _) = gateway();
        for (name, mime) in [
            ("a.png", "image/png"),
            ("b.jpg", "image/jpeg"),
            ("c.pdf", "application/pdf"),
        ] {
            gateway.create(new_file(name, name, mime), None).await.unwrap();
        }

        let params = FindParams {
            conditions: vec![Condition::Field(FieldFilter {
                field: FileField::Mime,
                op: FilterOp::NotContains,
                value: FilterValue::Many(vec!["image/png".into(), "image/png".into()]),
            })],
            ..Default::default()
        };
        assert_eq!(gateway.count(params.clone()).await.unwrap(), 2);
        assert_eq!(gateway.find(params).await.unwrap().len(), 2);

        // distinct values: every record differs from at least one of them
        let params = FindParams {
            conditions: vec![Condition::Field(FieldFilter {
                field: FileField::Mime,
                op: FilterOp::NotContains,
                value: FilterValue::Many(vec!["image/png".into(), "image/jpeg".into()]),
            })],
            ..Default::default()
        };
        assert_eq!(gateway.count(params.clone()).await.unwrap(), 3);
        let mut mimes: Vec<_> = gateway
            .find(params)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.mime)
            .collect();
        mimes.sort();
        assert_eq!(mimes, vec!["application/pdf", "image/jpeg", "image/png"]);
    }

    #[tokio::test]
    async fn search_uses_configured_strategy() {
        let (gateway, _) = gateway();
        gateway
            .create(new_file("Sunset.png", "h1", "image/png"), None)
            .await
            .unwrap();
        gateway
            .create(new_file("doc.pdf", "h2", "application/pdf"), None)
            .await
            .unwrap();

        let found = gateway.search("SUN").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(gateway.count_search("h").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn settings_writes_signal_telemetry() {
        let (gateway, telemetry) = gateway();
        assert_eq!(gateway.get_settings().await.unwrap(), UploadSettings::default());

        let settings: UploadSettings =
            serde_json::from_value(json!({ "responsiveDimensions": true, "sizeOptimization": false }))
                .unwrap();
        gateway.set_settings(settings.clone()).await.unwrap();
        assert_eq!(gateway.get_settings().await.unwrap(), settings);

        gateway
            .set_settings(UploadSettings {
                responsive_dimensions: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        gateway.set_settings(UploadSettings::default()).await.unwrap();

        assert_eq!(
            telemetry.sent(),
            vec!["didEnableResponsiveDimensions", "didDisableResponsiveDimensions"]
        );
    }
}
