use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::{
    models::referralmodel::{GenerationStore, ReferralRecord},
    service::{
        downline_query::{aggregate, filter_generation, paginate, FilterCriteria, GenerationStats, Page},
        downline_tree::{build_tree, DownlineTree},
        error::ServiceError,
        export::{format_for_export, render_workbook, ExportLocale, ExportFile, ExportOptions, ExportScope},
        generation_source::GenerationSource,
        request_tracker::RequestTracker,
    },
    utils::currency::CurrencyFormat,
};

/// One generation tab: the filtered page plus statistics over the whole,
/// unfiltered bucket.
#[derive(Debug, Clone)]
pub struct GenerationView {
    pub generation: usize,
    pub generation_count: usize,
    pub page: Page<ReferralRecord>,
    pub stats: Option<GenerationStats>,
}

#[derive(Debug, Clone)]
pub struct ExportRequest<'a> {
    pub generation: usize,
    pub criteria: &'a FilterCriteria,
    pub scope: ExportScope,
    pub locale: Option<ExportLocale>,
    pub exported_at: NaiveDateTime,
}

pub struct DownlineService {
    source: Arc<dyn GenerationSource>,
    tracker: RequestTracker,
    currency: CurrencyFormat,
    locale: ExportLocale,
}

impl std::fmt::Debug for DownlineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownlineService")
            .field("currency", &self.currency)
            .field("locale", &self.locale)
            .finish()
    }
}

impl DownlineService {
    pub fn new(source: Arc<dyn GenerationSource>, currency: CurrencyFormat, locale: ExportLocale) -> Self {
        Self {
            source,
            tracker: RequestTracker::new(),
            currency,
            locale,
        }
    }

    async fn load(&self, user_id: &str, pack_id: &str) -> Result<GenerationStore, ServiceError> {
        let store = self.source.fetch_generations(user_id, pack_id).await?;
        tracing::info!(
            "Loaded downline for user {} pack {}: {} generations, {} referrals",
            user_id,
            pack_id,
            store.generation_count(),
            store.record_count()
        );
        Ok(store)
    }

    pub async fn generation_view(
        &self,
        user_id: &str,
        pack_id: &str,
        generation: usize,
        criteria: &FilterCriteria,
        page: usize,
        limit: usize,
    ) -> Result<GenerationView, ServiceError> {
        let store = self.load(user_id, pack_id).await?;
        let bucket = store.bucket(generation);
        let filtered = filter_generation(bucket, criteria);

        Ok(GenerationView {
            generation,
            generation_count: store.generation_count(),
            page: paginate(&filtered, page, limit),
            stats: aggregate(bucket),
        })
    }

    /// Build the tree for a downline. When a newer tree request for the same
    /// user and pack starts while this one is fetching, this result is dropped.
    /// The ticket is released on every exit, including cancellation.
    pub async fn tree_view(&self, user_id: &str, pack_id: &str, root_label: &str) -> Result<DownlineTree, ServiceError> {
        let ticket = self.tracker.begin(user_id, pack_id);

        let store = self.load(user_id, pack_id).await?;

        if !ticket.is_current() {
            return Err(ServiceError::RequestSuperseded(format!(
                "tree request for user {} pack {}",
                user_id, pack_id
            )));
        }

        let tree = build_tree(&store, root_label, &self.currency);

        if !ticket.complete() {
            return Err(ServiceError::RequestSuperseded(format!(
                "tree request for user {} pack {}",
                user_id, pack_id
            )));
        }

        if tree.orphaned > 0 {
            tracing::warn!(
                "{} referrals of user {} pack {} have no sponsor in the tree",
                tree.orphaned,
                user_id,
                pack_id
            );
        }

        Ok(tree)
    }

    /// Export either the filtered projection or the whole bucket of one generation.
    pub async fn export(
        &self,
        user_id: &str,
        pack_id: &str,
        request: ExportRequest<'_>,
    ) -> Result<(ExportFile, usize), ServiceError> {
        let store = self.load(user_id, pack_id).await?;
        let bucket = store.bucket(request.generation);

        let records = match request.scope {
            ExportScope::Filtered => filter_generation(bucket, request.criteria),
            ExportScope::All => bucket.to_vec(),
        };

        let locale = request.locale.unwrap_or(self.locale);
        let options = ExportOptions {
            locale,
            currency: self.currency.clone(),
            exported_at: request.exported_at,
        };

        let sheets = format_for_export(&records, &locale.generation_label(request.generation), &options);
        let file = render_workbook(&sheets, request.generation, request.exported_at.date())?;

        tracing::info!(
            "Exported {} referrals of generation {} for user {} pack {}",
            records.len(),
            request.generation,
            user_id,
            pack_id
        );

        Ok((file, records.len()))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    use crate::service::export::{tests::read_sheet, SUMMARY_SHEET};
    use tokio::sync::{oneshot, Mutex, Notify};

    /// Source that always answers with the same payload.
    pub struct StaticSource(pub Value);

    #[async_trait]
    impl GenerationSource for StaticSource {
        async fn fetch_generations(&self, _user_id: &str, _pack_id: &str) -> Result<GenerationStore, ServiceError> {
            Ok(GenerationStore::from_value(self.0.clone()))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl GenerationSource for FailingSource {
        async fn fetch_generations(&self, user_id: &str, pack_id: &str) -> Result<GenerationStore, ServiceError> {
            Err(ServiceError::DownlineNotFound {
                user_id: user_id.to_string(),
                pack_id: pack_id.to_string(),
            })
        }
    }

    /// Holds the first fetch until released so a second request can overtake it.
    struct GatedSource {
        store: Value,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        started: Notify,
    }

    #[async_trait]
    impl GenerationSource for GatedSource {
        async fn fetch_generations(&self, _user_id: &str, _pack_id: &str) -> Result<GenerationStore, ServiceError> {
            let gate = self.gate.lock().await.take();
            if let Some(gate) = gate {
                self.started.notify_one();
                let _ = gate.await;
            }
            Ok(GenerationStore::from_value(self.store.clone()))
        }
    }

    pub fn sample_store() -> Value {
        json!([
            [
                { "id": 1, "sponsorId": 0, "name": "Alice", "status": "active", "commission": 10, "purchaseDate": "15/01/2024", "referralCode": "ALI" },
                { "id": 2, "sponsorId": 0, "name": "Bob", "status": "inactive", "commission": 5, "purchaseDate": "2024-02-10" },
                { "id": 3, "sponsorId": 0, "name": "Carla", "status": "active", "commission": 2.5 }
            ],
            [
                { "id": 4, "sponsorId": 1, "name": "Dan", "status": "active", "commission": 1 },
                { "id": 5, "sponsorId": 99, "name": "Orphan", "status": "expired", "commission": 3 }
            ]
        ])
    }

    fn service(source: Arc<dyn GenerationSource>) -> DownlineService {
        DownlineService::new(source, CurrencyFormat::default(), ExportLocale::En)
    }

    fn exported_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn generation_view_filters_page_but_not_stats() {
        let service = service(Arc::new(StaticSource(sample_store())));
        let criteria = FilterCriteria {
            status_filter: crate::service::downline_query::StatusFilter::Active,
            ..Default::default()
        };

        let view = service.generation_view("7", "gold", 1, &criteria, 1, 1).await.unwrap();

        assert_eq!(view.generation_count, 2);
        assert_eq!(view.page.pagination.total, 2);
        assert_eq!(view.page.items.len(), 1);
        assert_eq!(view.page.items[0].display_name(), "Alice");
        assert_eq!(view.stats, Some(GenerationStats { total: 3, total_commission: 17.5 }));
    }

    #[tokio::test]
    async fn orphans_stay_in_table_but_leave_tree() {
        let service = service(Arc::new(StaticSource(sample_store())));

        let view = service
            .generation_view("7", "gold", 2, &FilterCriteria::default(), 1, 10)
            .await
            .unwrap();
        let names: Vec<&str> = view.page.items.iter().map(ReferralRecord::display_name).collect();
        assert_eq!(names, vec!["Dan", "Orphan"]);

        let tree = service.tree_view("7", "gold", "User 7").await.unwrap();
        assert_eq!(tree.orphaned, 1);
        assert_eq!(tree.tree.count_nodes(), 5);
    }

    #[tokio::test]
    async fn missing_generation_has_no_stats() {
        let service = service(Arc::new(StaticSource(sample_store())));
        let view = service
            .generation_view("7", "gold", 4, &FilterCriteria::default(), 1, 10)
            .await
            .unwrap();

        assert!(view.page.items.is_empty());
        assert_eq!(view.stats, None);
    }

    #[tokio::test]
    async fn malformed_store_degrades_quietly() {
        let service = service(Arc::new(StaticSource(json!({ "unexpected": true }))));

        let view = service
            .generation_view("7", "gold", 1, &FilterCriteria::default(), 1, 10)
            .await
            .unwrap();
        assert_eq!(view.generation_count, 0);
        assert_eq!(view.stats, None);

        let tree = service.tree_view("7", "gold", "Root").await.unwrap();
        assert!(tree.tree.children.is_empty());
    }

    #[tokio::test]
    async fn export_scope_controls_summary() {
        let service = service(Arc::new(StaticSource(sample_store())));
        let criteria = FilterCriteria {
            status_filter: crate::service::downline_query::StatusFilter::Active,
            ..Default::default()
        };

        let request = |scope| ExportRequest {
            generation: 1,
            criteria: &criteria,
            scope,
            locale: None,
            exported_at: exported_at(),
        };

        let (filtered, filtered_count) = service.export("7", "gold", request(ExportScope::Filtered)).await.unwrap();
        assert_eq!(filtered_count, 2);
        let summary = read_sheet(&filtered.content, SUMMARY_SHEET);
        assert!(summary.contains(&vec!["Total commission".to_string(), "12.50 $".to_string()]));

        let (_, all_count) = service.export("7", "gold", request(ExportScope::All)).await.unwrap();
        assert_eq!(all_count, 3);
    }

    #[tokio::test]
    async fn source_errors_propagate() {
        let service = service(Arc::new(FailingSource));
        let result = service.tree_view("7", "gold", "Root").await;
        assert!(matches!(result, Err(ServiceError::DownlineNotFound { .. })));

        let result = service
            .generation_view("7", "gold", 1, &FilterCriteria::default(), 1, 10)
            .await;
        assert!(matches!(result, Err(ServiceError::DownlineNotFound { .. })));
    }

    #[tokio::test]
    async fn stale_tree_request_is_discarded() {
        let (release, gate) = oneshot::channel();
        let source = Arc::new(GatedSource {
            store: sample_store(),
            gate: Mutex::new(Some(gate)),
            started: Notify::new(),
        });
        let service = Arc::new(service(source.clone()));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.tree_view("7", "gold", "Root").await })
        };
        source.started.notified().await;

        let second = service.tree_view("7", "gold", "Root").await;
        assert!(second.is_ok());

        release.send(()).unwrap();
        let first = first.await.unwrap();
        assert!(matches!(first, Err(ServiceError::RequestSuperseded(_))));
        assert_eq!(service.tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_tree_request_releases_its_ticket() {
        let (_release, gate) = oneshot::channel::<()>();
        let source = Arc::new(GatedSource {
            store: sample_store(),
            gate: Mutex::new(Some(gate)),
            started: Notify::new(),
        });
        let service = Arc::new(service(source.clone()));

        let pending = {
            let service = service.clone();
            tokio::spawn(async move { service.tree_view("7", "gold", "Root").await })
        };
        source.started.notified().await;
        assert_eq!(service.tracker.in_flight(), 1);

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        assert_eq!(service.tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn failed_tree_request_releases_its_ticket() {
        let service = service(Arc::new(FailingSource));
        assert!(service.tree_view("7", "gold", "Root").await.is_err());
        assert_eq!(service.tracker.in_flight(), 0);
    }
}
