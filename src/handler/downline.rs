use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    dtos::downlinedtos::*,
    error::HttpError,
    service::downline_service::ExportRequest,
    AppState,
};

pub fn downline_handler() -> Router {
    Router::new()
        .route("/", get(get_generation))
        .route("/tree", get(get_tree))
        .route("/export", get(export_generation))
}

/// Table view of one generation tab
pub async fn get_generation(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((user_id, pack_id)): Path<(String, String)>,
    Query(query): Query<DownlineQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let criteria = query.criteria()?;

    let view = app_state.downline_service
        .generation_view(&user_id, &pack_id, query.generation(), &criteria, query.page(), query.limit())
        .await?;

    Ok(Json(GenerationViewResponse {
        status: "success".to_string(),
        generation: view.generation,
        generation_count: view.generation_count,
        records: view.page.items,
        pagination: view.page.pagination,
        stats: view.stats,
    }))
}

pub async fn get_tree(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((user_id, pack_id)): Path<(String, String)>,
    Query(query): Query<TreeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let root_label = query.root_label
        .filter(|label| !label.trim().is_empty())
        .unwrap_or_else(|| format!("User {}", user_id));

    let tree = app_state.downline_service
        .tree_view(&user_id, &pack_id, &root_label)
        .await?;

    Ok(Json(TreeResponse {
        status: "success".to_string(),
        data: tree,
    }))
}

pub async fn export_generation(
    Extension(app_state): Extension<Arc<AppState>>,
    Path((user_id, pack_id)): Path<(String, String)>,
    Query(query): Query<DownlineQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    query.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let criteria = query.criteria()?;

    let request = ExportRequest {
        generation: query.generation(),
        criteria: &criteria,
        scope: query.scope.unwrap_or_default(),
        locale: query.locale,
        exported_at: Utc::now().naive_utc(),
    };

    let (file, record_count) = app_state.downline_service
        .export(&user_id, &pack_id, request)
        .await?;

    Ok(Json(ExportResponse {
        status: "success".to_string(),
        data: ExportData {
            record_count,
            file: ExportFileDto::from(&file),
        },
    }))
}
