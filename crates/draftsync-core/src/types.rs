//! Core types for draftsync
//!
//! Defines the data exchanged between the client and the server:
//! - Draft identity and the client-owned [`Draft`]
//! - Server report identity, payloads and the authoritative [`ServerReport`]
//! - The optimistic concurrency [`Marker`]
//! - Wire bodies for successful updates and conflicts

use crate::attachment::AttachmentRef;
use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

/// Field values keyed by field name
pub type FieldMap = BTreeMap<String, Value>;

/// Checklist responses keyed by section, then item
pub type ResponseMap = BTreeMap<String, BTreeMap<String, Value>>;

/// Local draft identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    /// Identifier used by the wizard before the report exists on the server
    pub const NEW: &'static str = "new";

    /// Wrap an existing identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The reserved unsaved-wizard identifier
    #[inline]
    #[must_use]
    pub fn unsaved() -> Self {
        Self(Self::NEW.to_string())
    }

    /// Generate a fresh sortable identifier
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved unsaved-wizard identifier
    #[inline]
    #[must_use]
    pub fn is_unsaved(&self) -> bool {
        self.0 == Self::NEW
    }
}

impl std::fmt::Display for DraftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server report identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub u64);

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReportId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Precision carried by a marker parsed from a request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPrecision {
    /// RFC 3339 with fractional seconds (what draftsync clients send)
    Micros,
    /// HTTP-date / RFC 2822, whole seconds only
    Seconds,
}

/// Error parsing a marker header value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid marker '{value}': expected RFC 3339 or HTTP-date")]
pub struct MarkerParseError {
    /// The rejected header value
    pub value: String,
}

/// Last-modified stamp used for optimistic concurrency.
///
/// Always truncated to microseconds so it survives the RFC 3339 wire format
/// unchanged and equality comparison stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Marker(DateTime<Utc>);

impl Marker {
    /// Marker for the given instant
    #[inline]
    #[must_use]
    pub fn at(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(6))
    }

    /// Next marker after `previous`, stamped `now` unless the clock has not
    /// moved past `previous`.
    #[must_use]
    pub fn advance(previous: Option<Marker>, now: DateTime<Utc>) -> Self {
        let candidate = Self::at(now);
        match previous {
            Some(prev) if candidate <= prev => Self(prev.0 + Duration::microseconds(1)),
            _ => candidate,
        }
    }

    /// Underlying timestamp
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Header encoding (RFC 3339, microseconds, `Z` suffix)
    #[must_use]
    pub fn to_header(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Parse a header value, remembering how precise it was
    ///
    /// # Errors
    /// Returns `MarkerParseError` when the value is neither RFC 3339 nor HTTP-date
    pub fn parse_header(value: &str) -> Result<(Self, MarkerPrecision), MarkerParseError> {
        let value = value.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Ok((Self::at(parsed.with_timezone(&Utc)), MarkerPrecision::Micros));
        }
        // HTTP-date uses "GMT", which RFC 2822 parsing accepts.
        if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
            return Ok((Self::at(parsed.with_timezone(&Utc)), MarkerPrecision::Seconds));
        }
        Err(MarkerParseError {
            value: value.to_string(),
        })
    }

    /// Compare against a client-supplied marker.
    ///
    /// A whole-second marker only matches a current marker with no sub-second
    /// part. Two writes inside the same second would otherwise be
    /// indistinguishable, so anything finer is reported as modified.
    #[must_use]
    pub fn matches(&self, observed: &Marker, precision: MarkerPrecision) -> bool {
        match precision {
            MarkerPrecision::Micros => self == observed,
            MarkerPrecision::Seconds => {
                self.0.timestamp_subsec_nanos() == 0 && self.0 == observed.0.trunc_subsecs(0)
            }
        }
    }
}

impl std::fmt::Display for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_header())
    }
}

/// Notice left on a draft whose attachments were evicted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionNotice {
    /// Number of attachments removed
    pub stripped_attachments: usize,
    /// Bytes (estimated) reclaimed
    pub reclaimed_bytes: u64,
    /// When the eviction ran
    pub at: DateTime<Utc>,
}

impl EvictionNotice {
    /// Fold a later eviction into an unread notice
    #[must_use]
    pub fn merge(self, later: EvictionNotice) -> Self {
        Self {
            stripped_attachments: self.stripped_attachments + later.stripped_attachments,
            reclaimed_bytes: self.reclaimed_bytes + later.reclaimed_bytes,
            at: later.at,
        }
    }
}

impl std::fmt::Display for EvictionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} attachment(s), {} bytes removed at {}",
            self.stripped_attachments,
            self.reclaimed_bytes,
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Client-local, possibly-unsaved copy of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    /// Local key
    pub id: DraftId,
    /// Server counterpart, once created
    pub report_id: Option<ReportId>,
    /// Top-level report fields
    #[serde(default)]
    pub fields: FieldMap,
    /// Checklist responses
    #[serde(default)]
    pub responses: ResponseMap,
    /// Attachments owned by this draft
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    /// Stamped by the local store on every save
    pub last_modified_local: DateTime<Utc>,
    /// Server marker this draft was last reconciled with
    pub last_known_server_marker: Option<Marker>,
    /// Server version this draft was last reconciled with
    #[serde(default)]
    pub last_known_server_version: Option<u64>,
    /// Unread eviction notice
    #[serde(default)]
    pub eviction_notice: Option<EvictionNotice>,
}

impl Draft {
    /// Create an empty, unlinked draft
    #[must_use]
    pub fn new(id: DraftId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            report_id: None,
            fields: FieldMap::new(),
            responses: ResponseMap::new(),
            attachments: Vec::new(),
            last_modified_local: now,
            last_known_server_marker: None,
            last_known_server_version: None,
            eviction_notice: None,
        }
    }

    /// Create a draft already linked to a server report
    #[must_use]
    pub fn linked(id: DraftId, report: &ServerReport, now: DateTime<Utc>) -> Self {
        let mut draft = Self::new(id, now);
        draft.report_id = Some(report.report_id);
        draft.apply_server_report(report);
        draft
    }

    /// Whether the draft has a server counterpart
    #[inline]
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.report_id.is_some()
    }

    /// Set a top-level field
    pub fn set_field(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Set a checklist response
    pub fn set_response(
        &mut self,
        section: impl Into<String>,
        item: impl Into<String>,
        value: Value,
    ) {
        self.responses
            .entry(section.into())
            .or_default()
            .insert(item.into(), value);
    }

    /// Attach a file
    pub fn add_attachment(&mut self, attachment: AttachmentRef) {
        self.attachments.retain(|a| a.id != attachment.id);
        self.attachments.push(attachment);
    }

    /// Sum of attachment byte estimates
    #[must_use]
    pub fn attachment_bytes(&self) -> u64 {
        self.attachments.iter().map(|a| a.byte_estimate).sum()
    }

    /// Remove every attachment, returning the bytes reclaimed
    pub fn strip_attachments(&mut self) -> (usize, u64) {
        let bytes = self.attachment_bytes();
        let count = self.attachments.len();
        self.attachments.clear();
        (count, bytes)
    }

    /// Record a reconciled server marker
    pub fn record_server_marker(&mut self, marker: Marker, version: u64) {
        self.last_known_server_marker = Some(marker);
        self.last_known_server_version = Some(version);
    }

    /// Replace local content with the authoritative server copy.
    ///
    /// Attachments not present on the server are dropped with the rest of the
    /// local changes.
    pub fn apply_server_report(&mut self, report: &ServerReport) {
        self.fields = report.fields.clone();
        self.responses = report.responses.clone();
        self.attachments
            .retain(|a| report.attachments.iter().any(|id| *id == a.id));
        self.record_server_marker(report.updated_at, report.version);
    }

    /// Body sent to the update endpoint
    #[must_use]
    pub fn to_payload(&self) -> ReportPayload {
        ReportPayload {
            fields: self.fields.clone(),
            responses: self.responses.clone(),
            attachments: self.attachments.iter().map(|a| a.id.clone()).collect(),
        }
    }
}

/// Update / create request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    /// Top-level report fields
    #[serde(default)]
    pub fields: FieldMap,
    /// Checklist responses
    #[serde(default)]
    pub responses: ResponseMap,
    /// Attachment identifiers
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Authoritative server-side report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerReport {
    /// Report identifier
    pub report_id: ReportId,
    /// Top-level report fields
    pub fields: FieldMap,
    /// Checklist responses
    pub responses: ResponseMap,
    /// Attachment identifiers
    pub attachments: Vec<String>,
    /// Last-modified marker
    pub updated_at: Marker,
    /// Display name of the last writer
    pub updated_by: String,
    /// Write counter
    pub version: u64,
}

/// Optimistic-concurrency guard carried by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Precondition {
    /// Marker the writer last observed, with the precision it was sent at
    pub if_unmodified_since: Option<(Marker, MarkerPrecision)>,
    /// Version the writer last observed
    pub version: Option<u64>,
}

impl Precondition {
    /// Unconditional write
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Guard on what a draft last reconciled with
    #[must_use]
    pub fn observed(marker: Option<Marker>, version: Option<u64>) -> Self {
        Self {
            if_unmodified_since: marker.map(|m| (m, MarkerPrecision::Micros)),
            version,
        }
    }

    /// Whether the write is unconditional
    #[inline]
    #[must_use]
    pub fn is_force(&self) -> bool {
        self.if_unmodified_since.is_none() && self.version.is_none()
    }
}

/// Body of a successful update (200) or create (201)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReceipt {
    /// Report written
    pub report_id: ReportId,
    /// New marker
    pub updated_at: Marker,
    /// New version
    pub version: u64,
}

/// Body of a conflict (409) response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    /// Who made the write the caller did not observe
    pub updated_by: String,
    /// Current server marker
    pub updated_at: Marker,
}
