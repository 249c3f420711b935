//! Submission normalizer
//!
//! Converts the three trigger payload shapes into one [`SubmissionRecord`]:
//! - **Form event**: answers looked up by question title
//! - **Sheet edit**: positional row snapshot (columns A-F) plus the edited
//!   cell. Positional lookup is fragile by nature: reordering sheet columns
//!   breaks it, so the column layout is pinned by the constants below.
//! - **Folder entry**: a local image file with no metadata
//!
//! Everything here is local computation. The gates (publish, then
//! authorization, then image reference) run before the pipeline makes any
//! external call.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageRef, SubmissionRecord, TriggerSource};

/// Sheet row snapshot: 0-based index of the respondent email (column B)
const SHEET_EMAIL_INDEX: usize = 1;
/// Sheet row snapshot: photo URL (column C)
const SHEET_PHOTO_INDEX: usize = 2;
/// Sheet row snapshot: location (column D)
const SHEET_LOCATION_INDEX: usize = 3;
/// Sheet row snapshot: category (column E)
const SHEET_CATEGORY_INDEX: usize = 4;
/// Sheet row snapshot: memo (column F)
const SHEET_MEMO_INDEX: usize = 5;
/// 1-based column holding the publish checkbox (column G)
pub const SHEET_PUBLISH_COLUMN: u32 = 7;
/// First data row (row 1 is the header)
const SHEET_FIRST_DATA_ROW: u32 = 2;

// ============================================================================
// Trigger payloads
// ============================================================================

/// Form-submission event: question title → answers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormEvent {
    #[serde(alias = "namedValues")]
    pub named_values: HashMap<String, Vec<String>>,
}

/// Spreadsheet edit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetEditEvent {
    /// 1-based row of the edited cell
    pub row: u32,
    /// 1-based column of the edited cell
    pub column: u32,
    /// New cell value (checkbox `true`, `"TRUE"` or the publish marker)
    pub value: serde_json::Value,
    /// Snapshot of columns A-F of the edited row
    #[serde(default)]
    pub row_values: Vec<String>,
}

/// Watch-folder listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub path: PathBuf,
}

/// Trigger payload, one variant per source
#[derive(Debug, Clone)]
pub enum TriggerEvent {
    Form(FormEvent),
    SheetEdit(SheetEditEvent),
    Folder(FolderEntry),
}

impl TriggerEvent {
    pub fn source(&self) -> TriggerSource {
        match self {
            TriggerEvent::Form(_) => TriggerSource::Form,
            TriggerEvent::SheetEdit(_) => TriggerSource::Sheet,
            TriggerEvent::Folder(_) => TriggerSource::Folder,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// What to do when a submission lacks the publish signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishGateMode {
    /// Return `Skipped` without side effects
    #[default]
    SilentSkip,
    /// Fail with `PublishNotRequested`
    Reject,
}

/// Form question titles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormFields {
    pub email: String,
    pub photo: String,
    pub location: String,
    pub category: String,
    pub memo: String,
    pub publish: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            email: "Email Address".to_string(),
            photo: "Photo".to_string(),
            location: "Location".to_string(),
            category: "Category".to_string(),
            memo: "Memo".to_string(),
            publish: "Publish".to_string(),
        }
    }
}

/// Normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Only this submitter may publish (unset = anyone)
    pub allowed_email: Option<String>,
    pub form_fields: FormFields,
    /// Literal answer meaning "publish this"
    pub publish_marker: String,
    pub publish_gate: PublishGateMode,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            allowed_email: None,
            form_fields: FormFields::default(),
            publish_marker: "publish".to_string(),
            publish_gate: PublishGateMode::SilentSkip,
        }
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Normalization result
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Ready to run through the pipeline
    Ready(SubmissionRecord),
    /// Not a publish request; nothing should happen
    Skipped { reason: String },
}

/// Submission normalizer
pub struct SubmissionNormalizer {
    config: NormalizerConfig,
}

impl SubmissionNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize any trigger payload
    pub fn normalize(&self, event: &TriggerEvent) -> PipelineResult<Normalized> {
        match event {
            TriggerEvent::Form(form) => self.normalize_form(form),
            TriggerEvent::SheetEdit(edit) => self.normalize_sheet_edit(edit),
            TriggerEvent::Folder(entry) => Ok(self.normalize_folder_entry(entry)),
        }
    }

    /// Form event: look answers up by question title
    pub fn normalize_form(&self, form: &FormEvent) -> PipelineResult<Normalized> {
        let fields = &self.config.form_fields;
        let answer = |title: &str| -> Option<String> {
            form.named_values
                .get(title)
                .and_then(|values| values.first())
                .and_then(|v| non_blank(v))
        };

        let publish_answer = answer(&fields.publish).unwrap_or_default();
        if publish_answer != self.config.publish_marker {
            return self.not_requested(format!(
                "publish answer is '{}', expected '{}'",
                publish_answer, self.config.publish_marker
            ));
        }

        let identity = answer(&fields.email);
        self.check_identity(identity.as_deref())?;

        let photo = answer(&fields.photo).ok_or_else(|| {
            PipelineError::InvalidImageReference(format!(
                "form has no '{}' answer",
                fields.photo
            ))
        })?;
        let image_ref = parse_image_ref(&photo)?;

        let record = SubmissionRecord {
            submission_id: Uuid::new_v4(),
            source: TriggerSource::Form,
            image_ref,
            location: answer(&fields.location),
            category: answer(&fields.category),
            memo: answer(&fields.memo),
            respondent_identity: identity,
            publish_requested: true,
        };
        info!(
            submission_id = %record.submission_id,
            respondent = record.respondent_identity.as_deref().unwrap_or("<none>"),
            "Form submission received"
        );
        Ok(Normalized::Ready(record))
    }

    /// Sheet edit: only a truthy edit of the publish column on a data row
    /// counts as a submission
    pub fn normalize_sheet_edit(&self, edit: &SheetEditEvent) -> PipelineResult<Normalized> {
        if edit.column != SHEET_PUBLISH_COLUMN || edit.row < SHEET_FIRST_DATA_ROW {
            // Unrelated edit, never a submission regardless of gate mode
            debug!(row = edit.row, column = edit.column, "Ignoring non-publish cell edit");
            return Ok(Normalized::Skipped {
                reason: format!("edit at row {} column {} is not a publish cell", edit.row, edit.column),
            });
        }

        if !self.is_publish_value(&edit.value) {
            return self.not_requested(format!("publish cell value is {}", edit.value));
        }

        let cell = |index: usize| edit.row_values.get(index).and_then(|v| non_blank(v));

        let identity = cell(SHEET_EMAIL_INDEX);
        self.check_identity(identity.as_deref())?;

        let photo = cell(SHEET_PHOTO_INDEX).ok_or_else(|| {
            PipelineError::InvalidImageReference(format!("row {} has no photo URL", edit.row))
        })?;
        let image_ref = parse_image_ref(&photo)?;

        let record = SubmissionRecord {
            submission_id: Uuid::new_v4(),
            source: TriggerSource::Sheet,
            image_ref,
            location: cell(SHEET_LOCATION_INDEX),
            category: cell(SHEET_CATEGORY_INDEX),
            memo: cell(SHEET_MEMO_INDEX),
            respondent_identity: identity,
            publish_requested: true,
        };
        info!(
            submission_id = %record.submission_id,
            row = edit.row,
            "Sheet publish request received"
        );
        Ok(Normalized::Ready(record))
    }

    /// Folder entry: operator-initiated, no identity and no publish gate
    pub fn normalize_folder_entry(&self, entry: &FolderEntry) -> Normalized {
        Normalized::Ready(SubmissionRecord {
            submission_id: Uuid::new_v4(),
            source: TriggerSource::Folder,
            image_ref: ImageRef::LocalFile {
                path: entry.path.clone(),
            },
            location: None,
            category: None,
            memo: None,
            respondent_identity: None,
            publish_requested: true,
        })
    }

    fn is_publish_value(&self, value: &serde_json::Value) -> bool {
        match value {
            serde_json::Value::Bool(checked) => *checked,
            serde_json::Value::String(s) => {
                let s = s.trim();
                s.eq_ignore_ascii_case("true") || s == self.config.publish_marker
            }
            _ => false,
        }
    }

    fn check_identity(&self, identity: Option<&str>) -> PipelineResult<()> {
        let Some(allowed) = self.config.allowed_email.as_deref() else {
            return Ok(());
        };
        if identity.map(str::trim) == Some(allowed.trim()) {
            return Ok(());
        }
        warn!(
            respondent = identity.unwrap_or("<none>"),
            "Blocked submission from unauthorized user"
        );
        Err(PipelineError::Unauthorized {
            identity: identity.map(str::to_string),
        })
    }

    fn not_requested(&self, reason: String) -> PipelineResult<Normalized> {
        match self.config.publish_gate {
            PublishGateMode::SilentSkip => {
                info!("Skipping submission without publish request: {}", reason);
                Ok(Normalized::Skipped { reason })
            }
            PublishGateMode::Reject => Err(PipelineError::PublishNotRequested(reason)),
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a photo answer into a drive file reference
pub fn parse_image_ref(url: &str) -> PipelineResult<ImageRef> {
    extract_file_id(url)
        .map(|id| ImageRef::DriveFile { id })
        .ok_or_else(|| PipelineError::InvalidImageReference(url.to_string()))
}

/// Query-string form: `...?id=<ID>` or `...&id=<ID>`
static QUERY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("static query id pattern"));

/// Path form: `.../d/<ID>/...`
static PATH_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("static path id pattern"));

/// Extract a file ID from `...?id=<ID>` or `.../d/<ID>/...`
///
/// The query form wins when both are present.
pub fn extract_file_id(url: &str) -> Option<String> {
    QUERY_ID
        .captures(url)
        .or_else(|| PATH_ID.captures(url))
        .map(|caps| caps[1].to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormEvent {
        FormEvent {
            named_values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
                .collect(),
        }
    }

    fn full_form(email: &str, publish: &str) -> FormEvent {
        form(&[
            ("Email Address", email),
            ("Photo", "https://drive.google.com/open?id=AbC_123-x"),
            ("Location", "Yoyogi Park"),
            ("Category", "park"),
            ("Memo", "windy day"),
            ("Publish", publish),
        ])
    }

    fn normalizer(allowed: Option<&str>, gate: PublishGateMode) -> SubmissionNormalizer {
        SubmissionNormalizer::new(NormalizerConfig {
            allowed_email: allowed.map(str::to_string),
            publish_gate: gate,
            ..Default::default()
        })
    }

    #[test]
    fn test_extract_query_id() {
        assert_eq!(
            extract_file_id("https://drive.google.com/open?id=1aB_c-D"),
            Some("1aB_c-D".to_string())
        );
        assert_eq!(
            extract_file_id("https://drive.google.com/uc?export=view&id=XyZ"),
            Some("XyZ".to_string())
        );
    }

    #[test]
    fn test_extract_path_id() {
        assert_eq!(
            extract_file_id("https://drive.google.com/file/d/1Qw-Er_T/view?usp=sharing"),
            Some("1Qw-Er_T".to_string())
        );
    }

    #[test]
    fn test_extract_prefers_query_id_over_path() {
        assert_eq!(
            extract_file_id("https://drive.google.com/file/d/PathId/view?id=QueryId"),
            Some("QueryId".to_string())
        );
    }

    #[test]
    fn test_extract_rejects_unknown_shapes() {
        assert_eq!(extract_file_id("https://example.com/photo.jpg"), None);
        assert_eq!(extract_file_id("https://example.com/?id="), None);
        assert_eq!(extract_file_id("https://example.com/?uuid=abc"), None);
    }

    #[test]
    fn test_form_ready() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::SilentSkip);
        let result = n.normalize_form(&full_form("owner@example.com", "publish")).unwrap();
        let Normalized::Ready(record) = result else {
            panic!("expected ready record");
        };
        assert_eq!(record.source, TriggerSource::Form);
        assert_eq!(record.image_ref, ImageRef::DriveFile { id: "AbC_123-x".into() });
        assert_eq!(record.location.as_deref(), Some("Yoyogi Park"));
        assert_eq!(record.category.as_deref(), Some("park"));
        assert_eq!(record.memo.as_deref(), Some("windy day"));
        assert!(record.publish_requested);
    }

    #[test]
    fn test_form_without_publish_is_silent_skip() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::SilentSkip);
        let result = n.normalize_form(&full_form("owner@example.com", "")).unwrap();
        assert!(matches!(result, Normalized::Skipped { .. }));
    }

    #[test]
    fn test_form_without_publish_rejects_in_reject_mode() {
        let n = normalizer(None, PublishGateMode::Reject);
        let result = n.normalize_form(&full_form("owner@example.com", "later"));
        assert!(matches!(result, Err(PipelineError::PublishNotRequested(_))));
    }

    #[test]
    fn test_form_unauthorized() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::SilentSkip);
        let result = n.normalize_form(&full_form("intruder@example.com", "publish"));
        assert!(matches!(result, Err(PipelineError::Unauthorized { .. })));
    }

    #[test]
    fn test_form_missing_identity_is_unauthorized_when_allow_listed() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::SilentSkip);
        let event = form(&[
            ("Photo", "https://drive.google.com/open?id=abc"),
            ("Publish", "publish"),
        ]);
        let result = n.normalize_form(&event);
        assert!(matches!(result, Err(PipelineError::Unauthorized { identity: None })));
    }

    #[test]
    fn test_form_without_allow_list_accepts_anyone() {
        let n = normalizer(None, PublishGateMode::SilentSkip);
        let result = n.normalize_form(&full_form("anyone@example.com", "publish")).unwrap();
        assert!(matches!(result, Normalized::Ready(_)));
    }

    #[test]
    fn test_form_invalid_photo_url() {
        let n = normalizer(None, PublishGateMode::SilentSkip);
        let event = form(&[("Photo", "not a url"), ("Publish", "publish")]);
        let result = n.normalize_form(&event);
        assert!(matches!(result, Err(PipelineError::InvalidImageReference(_))));
    }

    #[test]
    fn test_form_blank_answers_become_none() {
        let n = normalizer(None, PublishGateMode::SilentSkip);
        let event = form(&[
            ("Photo", "https://drive.google.com/open?id=abc"),
            ("Location", "   "),
            ("Publish", "publish"),
        ]);
        let Normalized::Ready(record) = n.normalize_form(&event).unwrap() else {
            panic!("expected ready record");
        };
        assert!(record.location.is_none());
        assert!(record.category.is_none());
    }

    fn sheet_edit(column: u32, row: u32, value: serde_json::Value, email: &str) -> SheetEditEvent {
        SheetEditEvent {
            row,
            column,
            value,
            row_values: vec![
                "2024/05/01 9:30:15".into(),
                email.into(),
                "https://drive.google.com/file/d/ROWID/view".into(),
                "Dog run".into(),
                "dog-run".into(),
                "".into(),
            ],
        }
    }

    #[test]
    fn test_sheet_checkbox_true() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::SilentSkip);
        let edit = sheet_edit(7, 3, serde_json::json!(true), "owner@example.com");
        let Normalized::Ready(record) = n.normalize_sheet_edit(&edit).unwrap() else {
            panic!("expected ready record");
        };
        assert_eq!(record.source, TriggerSource::Sheet);
        assert_eq!(record.image_ref, ImageRef::DriveFile { id: "ROWID".into() });
        assert_eq!(record.category.as_deref(), Some("dog-run"));
        assert!(record.memo.is_none());
    }

    #[test]
    fn test_sheet_string_values() {
        let n = normalizer(None, PublishGateMode::SilentSkip);
        for value in ["TRUE", "true", "publish"] {
            let edit = sheet_edit(7, 2, serde_json::json!(value), "a@example.com");
            assert!(matches!(n.normalize_sheet_edit(&edit).unwrap(), Normalized::Ready(_)));
        }
    }

    #[test]
    fn test_sheet_other_column_or_header_is_skipped_even_in_reject_mode() {
        let n = normalizer(None, PublishGateMode::Reject);
        let other_column = sheet_edit(6, 3, serde_json::json!(true), "a@example.com");
        assert!(matches!(
            n.normalize_sheet_edit(&other_column).unwrap(),
            Normalized::Skipped { .. }
        ));
        let header = sheet_edit(7, 1, serde_json::json!(true), "a@example.com");
        assert!(matches!(
            n.normalize_sheet_edit(&header).unwrap(),
            Normalized::Skipped { .. }
        ));
    }

    #[test]
    fn test_sheet_unchecked_is_skipped() {
        let n = normalizer(None, PublishGateMode::SilentSkip);
        let edit = sheet_edit(7, 3, serde_json::json!(false), "a@example.com");
        assert!(matches!(n.normalize_sheet_edit(&edit).unwrap(), Normalized::Skipped { .. }));
    }

    #[test]
    fn test_sheet_unauthorized() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::SilentSkip);
        let edit = sheet_edit(7, 3, serde_json::json!("TRUE"), "other@example.com");
        assert!(matches!(
            n.normalize_sheet_edit(&edit),
            Err(PipelineError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_folder_entry_bypasses_gates() {
        let n = normalizer(Some("owner@example.com"), PublishGateMode::Reject);
        let entry = FolderEntry { path: PathBuf::from("/watch/dog.jpg") };
        let Normalized::Ready(record) = n.normalize(&TriggerEvent::Folder(entry)).unwrap() else {
            panic!("expected ready record");
        };
        assert_eq!(record.source, TriggerSource::Folder);
        assert_eq!(
            record.image_ref,
            ImageRef::LocalFile { path: PathBuf::from("/watch/dog.jpg") }
        );
    }

    #[test]
    fn test_form_event_accepts_named_values_alias() {
        let event: FormEvent = serde_json::from_str(
            r#"{"namedValues": {"Photo": ["https://drive.google.com/open?id=abc"]}}"#,
        )
        .unwrap();
        assert_eq!(event.named_values["Photo"].len(), 1);
    }
}
