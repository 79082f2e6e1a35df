use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    models::referralmodel::ReferralRecord,
    utils::{currency::round_to_cents, date::end_of_day},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
    Expired,
}

impl StatusFilter {
    pub fn to_str(&self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Active => "active",
            StatusFilter::Inactive => "inactive",
            StatusFilter::Expired => "expired",
        }
    }

    /// Exact, case-sensitive comparison against the record's status.
    pub fn matches(&self, status: Option<&str>) -> bool {
        match self {
            StatusFilter::All => true,
            filter => status == Some(filter.to_str()),
        }
    }
}

/// Inclusive purchase date window. The end bound covers its whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            start,
            end: end_of_day(end),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub search_term: String,
    pub status_filter: StatusFilter,
    pub date_range: Option<DateRange>,
}

impl FilterCriteria {
    pub fn matches(&self, record: &ReferralRecord) -> bool {
        self.matches_search(record)
            && self.status_filter.matches(record.effective_status())
            && self.matches_date(record)
    }

    fn matches_search(&self, record: &ReferralRecord) -> bool {
        if self.search_term.is_empty() {
            return true;
        }

        let term = self.search_term.to_lowercase();
        let contains = |field: &Option<String>| {
            field
                .as_deref()
                .map(|value| value.to_lowercase().contains(&term))
                .unwrap_or(false)
        };

        contains(&record.name) || contains(&record.referral_code)
    }

    // A record without a readable purchase date never falls inside a range.
    fn matches_date(&self, record: &ReferralRecord) -> bool {
        match self.date_range {
            None => true,
            Some(range) => record
                .purchased_at()
                .map(|at| range.contains(at))
                .unwrap_or(false),
        }
    }
}

/// Records of one generation bucket that pass every criterion, in bucket order.
pub fn filter_generation(bucket: &[ReferralRecord], criteria: &FilterCriteria) -> Vec<ReferralRecord> {
    bucket
        .iter()
        .filter(|record| criteria.matches(record))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    pub total: usize,
    pub total_commission: f64,
}

/// Count and commission sum of a bucket. `None` means there is nothing to
/// report, which callers must not confuse with a zero total.
pub fn aggregate(bucket: &[ReferralRecord]) -> Option<GenerationStats> {
    if bucket.is_empty() {
        return None;
    }

    let sum: f64 = bucket.iter().map(ReferralRecord::commission_amount).sum();

    Some(GenerationStats {
        total: bucket.len(),
        total_commission: round_to_cents(sum),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Slice out a 1-based page. Pages past the end are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, limit: usize) -> Page<T> {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len();
    let offset = (page - 1).saturating_mul(limit);

    let slice = items
        .iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();

    Page {
        items: slice,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    }
}
