use std::fmt::{Display, Formatter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::temporal::now_utc_rfc3339;

pub const ENVELOPE_SCHEMA_VERSION: &str = "dogtrends.envelope.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// Dog rows whose `user_guid` has no `users` row.
    OrphanDogs,
    /// A required table or column is missing from the snapshot.
    SchemaIncomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    CommandFailed,
    ParityMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeWarning {
    pub code: WarningCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: ErrorCode,
    pub message: String,

    /// Outermost context first, root cause last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

/// Where a response came from and where its artifacts went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

impl Default for EnvelopeMeta {
    fn default() -> Self {
        Self {
            schema_version: ENVELOPE_SCHEMA_VERSION.to_string(),
            database: None,
            report_path: None,
        }
    }
}

/// Machine-readable wrapper around every `--json` response and command
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub command: String,
    pub generated_at_utc: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    pub meta: EnvelopeMeta,
    pub warnings: Vec<EnvelopeWarning>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

/// Carries a failure envelope up to `main`, which prints it on stdout.
#[derive(Debug, Clone)]
pub struct EnvelopeCommandFailure {
    envelope: Envelope,
}

impl EnvelopeCommandFailure {
    #[must_use]
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }
}

impl From<Envelope> for EnvelopeCommandFailure {
    fn from(envelope: Envelope) -> Self {
        Self { envelope }
    }
}

impl Display for EnvelopeCommandFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let Some(error) = &self.envelope.error else {
            return write!(f, "`{}` failed", self.envelope.command);
        };
        write!(f, "`{}` failed: {}", self.envelope.command, error.message)
    }
}

impl std::error::Error for EnvelopeCommandFailure {}

impl Envelope {
    #[must_use]
    pub fn ok(command: impl Into<String>, data: Value) -> Self {
        Self::base(command, true).with_data(data)
    }

    #[must_use]
    pub fn error(command: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        let mut envelope = Self::base(command, false);
        envelope.error = Some(EnvelopeError {
            code,
            message: message.into(),
            causes: Vec::new(),
        });
        envelope
    }

    /// Failure envelope for an `anyhow` error, keeping its context chain.
    #[must_use]
    pub fn failed(command: impl Into<String>, error: &anyhow::Error) -> Self {
        let mut envelope = Self::error(command, ErrorCode::CommandFailed, format!("{error:#}"));
        if let Some(detail) = envelope.error.as_mut() {
            detail.causes = error.chain().map(ToString::to_string).collect();
        }
        envelope
    }

    fn base(command: impl Into<String>, ok: bool) -> Self {
        Self {
            ok,
            command: command.into(),
            generated_at_utc: now_utc_rfc3339(),
            data: None,
            meta: EnvelopeMeta::default(),
            warnings: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: &Path) -> Self {
        self.meta.database = Some(database.display().to_string());
        self
    }

    #[must_use]
    pub fn with_report_path(mut self, report_path: &Path) -> Self {
        self.meta.report_path = Some(report_path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_warning(mut self, code: WarningCode, message: impl Into<String>) -> Self {
        self.warnings.push(EnvelopeWarning {
            code,
            message: message.into(),
        });
        self
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to encode response envelope")
    }
}
