//! Task listing filters.
//!
//! # Design
//! `FetchOptions` is what callers pass: every field is optional and an absent
//! field falls back to its default. `TaskFilter` is the fully merged request
//! body the listing endpoint receives, with upper-camel field names.
//!
//! Presence, not truthiness, decides the merge. `page_size: Some(0)` is sent
//! as `0` rather than replaced by the default of 100.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 0;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveStatus {
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    AllIncludingArchived,
    #[default]
    Todo,
    DoneOrArchived,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkingStatus {
    #[default]
    All,
    OnlyMarked,
    OnlyUnmarked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerType {
    #[default]
    OnlySetters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadStatus {
    #[default]
    All,
    OnlyRead,
    OnlyUnread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    DueDate,
    SetDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingCriterion {
    pub column: SortColumn,
    pub order: SortOrder,
}

impl SortingCriterion {
    pub fn new(column: SortColumn, order: SortOrder) -> Self {
        Self { column, order }
    }
}

/// Newest due date first.
pub fn default_sorting() -> Vec<SortingCriterion> {
    vec![SortingCriterion::new(SortColumn::DueDate, SortOrder::Descending)]
}

/// Caller-facing options for `TaskFetcher::fetch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass a present cache and always hit the network.
    pub force: bool,
    pub archive_status: Option<ArchiveStatus>,
    pub completion_status: Option<CompletionStatus>,
    pub marking_status: Option<MarkingStatus>,
    pub owner_type: Option<OwnerType>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub read_status: Option<ReadStatus>,
    pub sorting_criteria: Option<Vec<SortingCriterion>>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn archive_status(mut self, status: ArchiveStatus) -> Self {
        self.archive_status = Some(status);
        self
    }

    pub fn completion_status(mut self, status: CompletionStatus) -> Self {
        self.completion_status = Some(status);
        self
    }

    pub fn marking_status(mut self, status: MarkingStatus) -> Self {
        self.marking_status = Some(status);
        self
    }

    pub fn owner_type(mut self, owner: OwnerType) -> Self {
        self.owner_type = Some(owner);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn read_status(mut self, status: ReadStatus) -> Self {
        self.read_status = Some(status);
        self
    }

    pub fn sorting_criteria(mut self, criteria: Vec<SortingCriterion>) -> Self {
        self.sorting_criteria = Some(criteria);
        self
    }

    /// Merge these options over the defaults.
    pub fn to_filter(&self) -> TaskFilter {
        TaskFilter {
            archive_status: self.archive_status.unwrap_or_default(),
            completion_status: self.completion_status.unwrap_or_default(),
            marking_status: self.marking_status.unwrap_or_default(),
            owner_type: self.owner_type.unwrap_or_default(),
            page: self.page.unwrap_or(DEFAULT_PAGE),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            read_status: self.read_status.unwrap_or_default(),
            sorting_criteria: self.sorting_criteria.clone().unwrap_or_else(default_sorting),
        }
    }
}

/// Request body of the task listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFilter {
    pub archive_status: ArchiveStatus,
    pub completion_status: CompletionStatus,
    pub marking_status: MarkingStatus,
    pub owner_type: OwnerType,
    pub page: u32,
    pub page_size: u32,
    pub read_status: ReadStatus,
    pub sorting_criteria: Vec<SortingCriterion>,
}

impl Default for TaskFilter {
    fn default() -> Self {
        FetchOptions::default().to_filter()
    }
}
