//! Import wizard state machine and session registry
//!
//! A wizard run is one owned state record. Every transition consumes the
//! current step and either moves forward or returns a typed error, so the
//! step order (upload, mapColumns, preview, import, summary) is enforced in
//! one place. Sessions are held in a process-wide registry keyed by id.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use super::mapping::{ColumnMapping, MappingError};
use super::parser::{self, ParseError, ParsedCsv};
use super::schema::{get_schema, SchemaDefinition};
use crate::types::import::{ImportResult, ImportType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Upload,
    MapColumns,
    Preview,
    Import,
    Summary,
}

impl WizardStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::Upload => "upload",
            WizardStep::MapColumns => "mapColumns",
            WizardStep::Preview => "preview",
            WizardStep::Import => "import",
            WizardStep::Summary => "summary",
        }
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("Missing required fields: {}", missing.join(", "))]
    MappingIncomplete { missing: Vec<String> },
    #[error("Cannot {action} from step '{from}'")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error("No CSV uploaded yet")]
    NoCsv,
    #[error("Wizard session not found")]
    SessionNotFound,
}

#[derive(Debug, Clone)]
pub struct WizardState {
    pub id: Uuid,
    pub user_id: Uuid,
    pub import_type: ImportType,
    pub step: WizardStep,
    pub csv: Option<ParsedCsv>,
    pub mapping: Option<ColumnMapping>,
    pub result: Option<ImportResult>,
    pub job_id: Option<Uuid>,
}

impl WizardState {
    pub fn new(user_id: Uuid, import_type: ImportType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            import_type,
            step: WizardStep::Upload,
            csv: None,
            mapping: None,
            result: None,
            job_id: None,
        }
    }

    pub fn schema(&self) -> &'static SchemaDefinition {
        get_schema(self.import_type)
    }

    /// upload -> mapColumns. A parse failure leaves the state at upload
    /// with nothing retained.
    pub fn upload(&mut self, content: &str) -> Result<(), WizardError> {
        if self.step != WizardStep::Upload {
            return Err(self.invalid("upload"));
        }
        let csv = parser::parse(content)?;
        self.mapping = Some(ColumnMapping::propose(&csv.headers, self.schema()));
        self.csv = Some(csv);
        self.step = WizardStep::MapColumns;
        Ok(())
    }

    /// Adjust one header assignment. Only valid while mapping.
    pub fn map_column(&mut self, header: &str, field: Option<&str>) -> Result<(), WizardError> {
        if self.step != WizardStep::MapColumns {
            return Err(self.invalid("map columns"));
        }
        let schema = self.schema();
        let mapping = self.mapping.as_mut().ok_or(WizardError::NoCsv)?;
        mapping.assign(header, field, schema)?;
        Ok(())
    }

    /// mapColumns -> preview, gated on every required field being mapped.
    pub fn to_preview(&mut self) -> Result<(), WizardError> {
        if self.step != WizardStep::MapColumns {
            return Err(self.invalid("preview"));
        }
        let schema = self.schema();
        let mapping = self.mapping.as_ref().ok_or(WizardError::NoCsv)?;
        let missing = mapping.missing_required(schema);
        if !missing.is_empty() {
            return Err(WizardError::MappingIncomplete {
                missing: missing.into_iter().map(str::to_string).collect(),
            });
        }
        self.step = WizardStep::Preview;
        Ok(())
    }

    /// preview -> import. Always allowed from preview; the import run
    /// re-validates every row itself, so a stale preview cannot block it.
    pub fn begin_import(&mut self, job_id: Uuid) -> Result<(), WizardError> {
        if self.step != WizardStep::Preview {
            return Err(self.invalid("start import"));
        }
        self.job_id = Some(job_id);
        self.step = WizardStep::Import;
        Ok(())
    }

    /// import -> summary, automatic on orchestrator completion. Applies only
    /// while `job_id` is still the session's active import; a result arriving
    /// after a reset, or for a superseded run, is dropped.
    pub fn complete(&mut self, job_id: Uuid, result: ImportResult) -> bool {
        if self.step != WizardStep::Import || self.job_id != Some(job_id) {
            return false;
        }
        self.result = Some(result);
        self.step = WizardStep::Summary;
        true
    }

    /// Backward navigation: preview -> mapColumns, mapColumns -> upload.
    /// A run in progress or completed cannot be rewound.
    pub fn back(&mut self) -> Result<(), WizardError> {
        match self.step {
            WizardStep::Preview => {
                self.step = WizardStep::MapColumns;
                Ok(())
            }
            WizardStep::MapColumns => {
                self.csv = None;
                self.mapping = None;
                self.step = WizardStep::Upload;
                Ok(())
            }
            _ => Err(self.invalid("go back")),
        }
    }

    /// Full restart: discard everything but the session identity.
    pub fn reset(&mut self) {
        self.csv = None;
        self.mapping = None;
        self.result = None;
        self.job_id = None;
        self.step = WizardStep::Upload;
    }

    fn invalid(&self, action: &'static str) -> WizardError {
        WizardError::InvalidTransition {
            from: self.step.as_str(),
            action,
        }
    }
}

// Session registry. Sessions live for the process lifetime or until reset
// replaces their content; nothing here is persisted.
static SESSIONS: Lazy<RwLock<HashMap<Uuid, WizardState>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn insert_session(state: WizardState) {
    SESSIONS.write().insert(state.id, state);
}

pub fn get_session(id: Uuid) -> Result<WizardState, WizardError> {
    SESSIONS
        .read()
        .get(&id)
        .cloned()
        .ok_or(WizardError::SessionNotFound)
}

pub fn remove_session(id: Uuid) -> Option<WizardState> {
    SESSIONS.write().remove(&id)
}

/// Run a closure against a session in place under the registry lock.
pub fn with_session<T>(
    id: Uuid,
    f: impl FnOnce(&mut WizardState) -> Result<T, WizardError>,
) -> Result<T, WizardError> {
    let mut sessions = SESSIONS.write();
    let state = sessions.get_mut(&id).ok_or(WizardError::SessionNotFound)?;
    f(state)
}
