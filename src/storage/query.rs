//! Filter, sort and paging parameters for record listings

use std::fmt;
use std::str::FromStr;

use super::error::{StorageError, StorageResult};
use super::schema::RecordKind;

pub const DEFAULT_SORT_FIELD: &str = "timestamp";
pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(StorageError::InvalidQuery(format!(
                "sort_order must be ASC or DESC, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Listing parameters for one record kind
///
/// `page == 0` disables pagination and returns every match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub machine_id: Option<String>,
    pub min_timestamp: Option<i64>,
    pub max_timestamp: Option<i64>,
    pub sort_field: String,
    pub sort_order: SortOrder,
    pub page: u32,
    pub size: u32,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            machine_id: None,
            min_timestamp: None,
            max_timestamp: None,
            sort_field: DEFAULT_SORT_FIELD.to_string(),
            sort_order: SortOrder::Asc,
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RecordQuery {
    /// Check the sort field against the columns of `kind`
    ///
    /// The field is interpolated into SQL, so this must pass before any
    /// backend sees the query.
    pub fn validate(&self, kind: RecordKind) -> StorageResult<()> {
        if !kind.sortable_columns().contains(&self.sort_field.as_str()) {
            return Err(StorageError::InvalidQuery(format!(
                "cannot sort {} by '{}'",
                kind.table(),
                self.sort_field
            )));
        }

        if let (Some(min), Some(max)) = (self.min_timestamp, self.max_timestamp)
            && min > max
        {
            return Err(StorageError::InvalidQuery(format!(
                "min_timestamp {min} is after max_timestamp {max}"
            )));
        }

        Ok(())
    }

    /// `(limit, offset)` for the requested page, `None` when unpaginated
    pub fn limit_offset(&self) -> Option<(u32, u64)> {
        (self.page > 0).then(|| (self.size, u64::from(self.page - 1) * u64::from(self.size)))
    }

    pub fn matches(&self, machine_id: Option<&str>, timestamp: Option<i64>) -> bool {
        if let Some(wanted) = &self.machine_id
            && machine_id != Some(wanted.as_str())
        {
            return false;
        }

        if self.min_timestamp.is_some() || self.max_timestamp.is_some() {
            let Some(ts) = timestamp else {
                return false;
            };
            if self.min_timestamp.is_some_and(|min| ts < min) {
                return false;
            }
            if self.max_timestamp.is_some_and(|max| ts > max) {
                return false;
            }
        }

        true
    }
}
