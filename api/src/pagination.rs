use serde::{Deserialize, Serialize};

/// Server-wide paging limits.
#[derive(Debug, Clone, Copy)]
pub struct PaginationSettings {
    pub default_per_page: u32,
    pub max_per_page: u32,
}

/// Raw `page` / `per_page` query strings.
#[derive(Debug, Default, Deserialize)]
pub struct PaginateQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginateOptions {
    pub page: u32,
    pub per_page: u32,
}

impl PaginateOptions {
    /// Missing, non-numeric or zero values fall back to page 1 and the
    /// default page size. Page size is capped at `max_per_page`.
    pub fn from_query(query: &PaginateQuery, settings: &PaginationSettings) -> Self {
        let page = parse_positive(query.page.as_deref()).unwrap_or(1);
        let per_page = parse_positive(query.per_page.as_deref())
            .unwrap_or(settings.default_per_page)
            .min(settings.max_per_page);
        Self { page, per_page }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

#[derive(Debug, Default, Serialize)]
pub struct SortInfo {
    pub by: Option<String>,
    pub order: Option<String>,
}

/// Envelope for paginated index responses.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub subtotal: u64,
    pub page: u32,
    pub per_page: u32,
    pub search: Option<String>,
    pub sort: SortInfo,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, total: u64, options: PaginateOptions) -> Self {
        Self {
            total,
            subtotal: total,
            page: options.page,
            per_page: options.per_page,
            search: None,
            sort: SortInfo::default(),
            results,
        }
    }
}
