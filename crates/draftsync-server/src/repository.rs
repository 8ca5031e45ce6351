//! Report storage seam
//!
//! The controller's read-check-write must be atomic per report, so the trait
//! exposes a single [`ReportRepository::compare_and_swap`] that runs the whole
//! check and mutation while the report's entry is locked. No lock outlives a
//! call.

use crate::error::ServerError;
use dashmap::DashMap;
use draftsync_core::{ReportId, ServerReport};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Check-and-mutate step run under the report's entry lock
pub type SwapFn<'a> = dyn FnMut(&mut ServerReport) -> Result<(), ServerError> + 'a;

/// Keyed report storage
pub trait ReportRepository: Send + Sync + Debug {
    /// Allocate a fresh report id
    fn next_id(&self) -> ReportId;

    /// Store a new report
    ///
    /// # Errors
    /// `ServerError::BadRequest` if the id is already taken
    fn insert(&self, report: ServerReport) -> Result<(), ServerError>;

    /// Current copy of a report
    fn get(&self, id: ReportId) -> Option<ServerReport>;

    /// Run `swap` against the stored report while holding its lock.
    ///
    /// If `swap` fails the stored report is left untouched. Returns the report
    /// as stored afterwards.
    ///
    /// # Errors
    /// `ServerError::NotFound` for an unknown id, otherwise whatever `swap` returns
    fn compare_and_swap(
        &self,
        id: ReportId,
        swap: &mut SwapFn<'_>,
    ) -> Result<ServerReport, ServerError>;
}

/// DashMap-backed repository used by the bundled server
#[derive(Debug)]
pub struct InMemoryReportRepository {
    reports: DashMap<ReportId, ServerReport>,
    next_id: AtomicU64,
}

impl InMemoryReportRepository {
    /// Create an empty repository; ids start at 1
    #[must_use]
    pub fn new() -> Self {
        Self {
            reports: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored reports
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl Default for InMemoryReportRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportRepository for InMemoryReportRepository {
    fn next_id(&self) -> ReportId {
        ReportId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn insert(&self, report: ServerReport) -> Result<(), ServerError> {
        let id = report.report_id;
        match self.reports.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(ServerError::BadRequest(format!("report {id} already exists")))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                // Keep allocation ahead of explicitly inserted ids.
                self.next_id.fetch_max(id.0 + 1, Ordering::SeqCst);
                slot.insert(report);
                Ok(())
            }
        }
    }

    fn get(&self, id: ReportId) -> Option<ServerReport> {
        self.reports.get(&id).map(|entry| entry.value().clone())
    }

    fn compare_and_swap(
        &self,
        id: ReportId,
        swap: &mut SwapFn<'_>,
    ) -> Result<ServerReport, ServerError> {
        let mut entry = self.reports.get_mut(&id).ok_or(ServerError::NotFound(id))?;
        let mut candidate = entry.value().clone();
        swap(&mut candidate)?;
        *entry.value_mut() = candidate.clone();
        Ok(candidate)
    }
}
