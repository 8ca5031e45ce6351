//! Server concurrency controller
//!
//! Single-timestamp optimistic concurrency with a version counter as a second
//! guard. An update either carries the marker its writer last observed or
//! nothing at all (the force path). A supplied marker that differs from the
//! current one is a conflict; a supplied version lower than the current one is
//! a conflict too. Every applied write advances the marker strictly and bumps
//! the version.

use crate::error::ServerError;
use crate::repository::ReportRepository;
use draftsync_core::{
    Clock, ConflictDetails, Marker, Precondition, ReportId, ReportPayload, ServerReport,
    UpdateReceipt,
};
use std::sync::Arc;

/// Applies report writes under optimistic locking
#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    repo: Arc<dyn ReportRepository>,
    clock: Arc<dyn Clock>,
}

impl ConcurrencyController {
    /// Create a controller over a repository
    #[must_use]
    pub fn new(repo: Arc<dyn ReportRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Create a report; it starts at version 1
    ///
    /// # Errors
    /// `ServerError::BadRequest` if the allocated id collides
    pub fn create(
        &self,
        payload: ReportPayload,
        editor: &str,
    ) -> Result<UpdateReceipt, ServerError> {
        let report = ServerReport {
            report_id: self.repo.next_id(),
            fields: payload.fields,
            responses: payload.responses,
            attachments: payload.attachments,
            updated_at: Marker::advance(None, self.clock.now()),
            updated_by: editor.to_string(),
            version: 1,
        };
        let receipt = receipt_of(&report);
        self.repo.insert(report)?;

        tracing::info!("Created report {} for {}", receipt.report_id, editor);
        Ok(receipt)
    }

    /// Current copy of a report
    ///
    /// # Errors
    /// `ServerError::NotFound` for an unknown id
    pub fn get(&self, report_id: ReportId) -> Result<ServerReport, ServerError> {
        self.repo.get(report_id).ok_or(ServerError::NotFound(report_id))
    }

    /// Apply an update if its precondition still holds.
    ///
    /// # Errors
    /// - `ServerError::Conflict` carrying the current editor and marker
    /// - `ServerError::NotFound` for an unknown id
    pub fn update(
        &self,
        report_id: ReportId,
        payload: ReportPayload,
        precondition: Precondition,
        editor: &str,
    ) -> Result<UpdateReceipt, ServerError> {
        let mut payload = Some(payload);

        let updated = self.repo.compare_and_swap(report_id, &mut |current| {
            check(report_id, current, &precondition)?;

            let body = payload.take().unwrap_or_default();
            current.fields = body.fields;
            current.responses = body.responses;
            current.attachments = body.attachments;
            current.updated_at = Marker::advance(Some(current.updated_at), self.clock.now());
            current.updated_by = editor.to_string();
            current.version += 1;
            Ok(())
        });

        match &updated {
            Ok(report) if precondition.is_force() => tracing::info!(
                "Force-overwrote report {} by {} (version {})",
                report_id,
                editor,
                report.version
            ),
            Ok(report) => tracing::debug!(
                "Updated report {} by {} (version {})",
                report_id,
                editor,
                report.version
            ),
            Err(err @ ServerError::Conflict { .. }) => {
                tracing::warn!("Rejected write from {}: {}", editor, err);
            }
            Err(_) => {}
        }

        updated.map(|report| receipt_of(&report))
    }
}

fn check(
    report_id: ReportId,
    current: &ServerReport,
    precondition: &Precondition,
) -> Result<(), ServerError> {
    let conflict = || ServerError::Conflict {
        report_id,
        details: ConflictDetails {
            updated_by: current.updated_by.clone(),
            updated_at: current.updated_at,
        },
    };

    if let Some((observed, precision)) = precondition.if_unmodified_since {
        if !current.updated_at.matches(&observed, precision) {
            return Err(conflict());
        }
    }
    if let Some(version) = precondition.version {
        if version < current.version {
            return Err(conflict());
        }
    }
    Ok(())
}

fn receipt_of(report: &ServerReport) -> UpdateReceipt {
    UpdateReceipt {
        report_id: report.report_id,
        updated_at: report.updated_at,
        version: report.version,
    }
}
