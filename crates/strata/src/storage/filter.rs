//! Filter types for tier queries
//!
//! Provides filtering for record scans. The cold tier turns a filter into a SQL
//! predicate for LanceDB; the in-memory tiers evaluate it directly.

use chrono::{DateTime, Utc};

use crate::memory::types::{Category, MemoryRecord};

/// Filter criteria for tier queries.
///
/// All fields are optional - when `None`, that filter is not applied.
/// Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Filter by categories (OR logic within this filter)
    pub categories: Option<Vec<Category>>,
    /// Only records scoped to this project
    pub project_id: Option<String>,
    /// Only records created at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Minimum stored access count (inclusive)
    pub min_access_count: Option<u32>,
}

impl RecordFilter {
    /// Create a new empty filter (no filtering applied)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_min_access_count(mut self, min_access_count: u32) -> Self {
        self.min_access_count = Some(min_access_count);
        self
    }

    /// Build a SQL WHERE clause from this filter.
    /// Returns `None` if no filters are set.
    pub fn to_sql_clause(&self) -> Option<String> {
        let mut conditions = Vec::new();

        if let Some(ref categories) = self.categories {
            if !categories.is_empty() {
                if categories.len() == 1 {
                    conditions.push(format!("category = '{}'", categories[0].as_str()));
                } else {
                    let in_clause = categories
                        .iter()
                        .map(|c| format!("'{}'", c.as_str()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    conditions.push(format!("category IN ({in_clause})"));
                }
            }
        }

        if let Some(ref project_id) = self.project_id {
            conditions.push(format!("project_id = '{}'", escape_literal(project_id)));
        }

        // created_at is stored as microseconds since epoch
        if let Some(ref since) = self.since {
            conditions.push(format!("created_at >= {}", since.timestamp_micros()));
        }

        if let Some(min_access_count) = self.min_access_count {
            conditions.push(format!("access_count >= {min_access_count}"));
        }

        if conditions.is_empty() {
            None
        } else {
            Some(conditions.join(" AND "))
        }
    }

    /// Evaluate this filter against a record in memory
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(ref categories) = self.categories {
            if !categories.is_empty() && !categories.contains(&record.category) {
                return false;
            }
        }

        if let Some(ref project_id) = self.project_id {
            if record.project_id.as_deref() != Some(project_id.as_str()) {
                return false;
            }
        }

        if let Some(since) = self.since {
            if record.created_at < since {
                return false;
            }
        }

        if let Some(min_access_count) = self.min_access_count {
            if record.access_count < min_access_count {
                return false;
            }
        }

        true
    }

    /// Check if this filter is empty (no conditions set)
    pub fn is_empty(&self) -> bool {
        self.categories.is_none()
            && self.project_id.is_none()
            && self.since.is_none()
            && self.min_access_count.is_none()
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
