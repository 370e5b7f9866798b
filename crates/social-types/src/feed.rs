use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::normalize_tags;

pub const MAX_LIMIT: i64 = 20;
pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_SEARCH_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// The only two strings that ever reach the ORDER BY clause.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(Error::validation(format!(
                "sort must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

/// A validated feed filter. Only obtainable through [`FeedFilter::new`], so
/// the query builder never sees out-of-range values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    search: String,
    tags: Vec<String>,
    limit: i64,
    offset: i64,
    sort: SortDirection,
}

impl FeedFilter {
    pub fn new(
        search: impl Into<String>,
        tags: Vec<String>,
        limit: i64,
        offset: i64,
        sort: SortDirection,
    ) -> Result<Self> {
        let search = search.into();
        if search.chars().count() > MAX_SEARCH_CHARS {
            return Err(Error::validation(format!(
                "search must be at most {} characters",
                MAX_SEARCH_CHARS
            )));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(Error::validation(format!(
                "limit must be between 1 and {}",
                MAX_LIMIT
            )));
        }
        if offset < 0 {
            return Err(Error::validation("offset must not be negative"));
        }

        Ok(Self {
            search: search.trim().to_string(),
            tags: normalize_tags(tags),
            limit,
            offset,
            sort,
        })
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn sort(&self) -> SortDirection {
        self.sort
    }
}

impl Default for FeedFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            tags: Vec::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: SortDirection::Desc,
        }
    }
}

/// Raw feed query string: `?search=..&tags=a,b&limit=..&offset=..&sort=..`.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub search: Option<String>,
    pub tags: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
}

impl FeedQuery {
    pub fn into_filter(self) -> Result<FeedFilter> {
        let sort = match self.sort.as_deref() {
            None | Some("") => SortDirection::default(),
            Some(s) => s.parse()?,
        };
        let tags = self
            .tags
            .map(|t| t.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        FeedFilter::new(
            self.search.unwrap_or_default(),
            tags,
            self.limit.unwrap_or(DEFAULT_LIMIT),
            self.offset.unwrap_or(0),
            sort,
        )
    }
}
