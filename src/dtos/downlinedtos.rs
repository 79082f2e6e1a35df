use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ErrorMessage,
    models::referralmodel::ReferralRecord,
    service::{
        downline_query::{DateRange, FilterCriteria, GenerationStats, Pagination, StatusFilter},
        downline_tree::DownlineTree,
        error::ServiceError,
        export::{ExportFile, ExportLocale, ExportScope},
    },
    utils::date::normalize_text,
};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 10;

/// Query string shared by the table and export endpoints. The host view owns
/// the selection; everything it selected travels here explicitly.
#[derive(Validate, Debug, Default, Clone, Deserialize)]
pub struct DownlineQueryDto {
    #[validate(range(min = 1, max = 64, message = "Generation must be between 1 and 64"))]
    pub generation: Option<usize>,

    pub search: Option<String>,

    pub status: Option<StatusFilter>,

    pub start: Option<String>,

    pub end: Option<String>,

    #[validate(range(min = 1))]
    pub page: Option<usize>,

    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,

    pub scope: Option<ExportScope>,

    pub locale: Option<ExportLocale>,
}

impl DownlineQueryDto {
    pub fn generation(&self) -> usize {
        self.generation.unwrap_or(1)
    }

    pub fn page(&self) -> usize {
        self.page.unwrap_or(DEFAULT_PAGE)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    /// The date filter only applies when both bounds are given.
    pub fn criteria(&self) -> Result<FilterCriteria, ServiceError> {
        let start = self.start.as_deref().filter(|s| !s.trim().is_empty());
        let end = self.end.as_deref().filter(|s| !s.trim().is_empty());

        let date_range = match (start, end) {
            (Some(start), Some(end)) => {
                let invalid = || ServiceError::Validation(ErrorMessage::InvalidDateRange.to_string());
                let start = normalize_text(start).ok_or_else(invalid)?;
                let end = normalize_text(end).ok_or_else(invalid)?;
                Some(DateRange::new(start, end))
            }
            _ => None,
        };

        Ok(FilterCriteria {
            search_term: self.search.clone().unwrap_or_default(),
            status_filter: self.status.unwrap_or_default(),
            date_range,
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct TreeQueryDto {
    pub root_label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerationViewResponse {
    pub status: String,
    pub generation: usize,
    pub generation_count: usize,
    pub records: Vec<ReferralRecord>,
    pub pagination: Pagination,
    pub stats: Option<GenerationStats>,
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub status: String,
    pub data: DownlineTree,
}

#[derive(Debug, Serialize)]
pub struct ExportFileDto {
    pub file_name: String,
    pub content_type: String,
    pub sheets: Vec<String>,
    /// Base64 encoded workbook bytes.
    pub content: String,
}

impl From<&ExportFile> for ExportFileDto {
    fn from(file: &ExportFile) -> Self {
        Self {
            file_name: file.file_name.clone(),
            content_type: file.content_type.to_string(),
            sheets: file.sheet_names.iter().map(|name| name.to_string()).collect(),
            content: general_purpose::STANDARD.encode(&file.content),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportData {
    pub record_count: usize,
    pub file: ExportFileDto,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub status: String,
    pub data: ExportData,
}
