//! Wire format between the service and the helper process.
//!
//! The service spawns `fpbridge-helper <command> [identity]`; the helper
//! writes free-text progress to stderr and exactly one [`BridgeResult`] JSON
//! line to stdout.

use crate::common::{FingerprintError, Result};
use crate::core::enrollment::Enrollment;
use crate::core::identification::MatchOutcome;
use crate::storage::Template;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};

/// Exit code when a structured result was produced, whatever its content.
pub const EXIT_RESULT: i32 = 0;
/// Exit code when the command could not be run at all.
pub const EXIT_NO_RESULT: i32 = 1;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Report whether a reader is connected and can be opened
    Status,
    /// Capture several samples and store a template for IDENTITY
    Enroll { identity: String },
    /// Compare one live capture with IDENTITY's template
    Verify { identity: String },
    /// Compare one live capture with every stored template
    Identify,
    /// Remove IDENTITY's template
    Delete { identity: String },
    /// List stored templates
    List,
}

impl BridgeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Enroll { .. } => "enroll",
            Self::Verify { .. } => "verify",
            Self::Identify => "identify",
            Self::Delete { .. } => "delete",
            Self::List => "list",
        }
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Self::Enroll { identity } | Self::Verify { identity } | Self::Delete { identity } => {
                Some(identity)
            }
            Self::Status | Self::Identify | Self::List => None,
        }
    }

    /// Helper command line for this command.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        if let Some(identity) = self.identity() {
            args.push(identity.to_string());
        }
        args
    }

    /// Commands that hold the reader for a capture session.
    pub fn needs_device(&self) -> bool {
        matches!(self, Self::Enroll { .. } | Self::Verify { .. } | Self::Identify)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub identity: String,
    pub template_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Template> for TemplateSummary {
    fn from(template: &Template) -> Self {
        Self {
            identity: template.identity.clone(),
            template_id: template.template_id.clone(),
            created_at: template.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub connected: bool,
    pub ready: bool,
    pub name: String,
    pub serial_number: Option<String>,
    pub message: String,
}

/// The single JSON line a helper invocation prints. Fields that do not
/// apply to a command are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", alias = "staffId")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<TemplateSummary>>,
}

impl BridgeResult {
    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: Some(code.to_string()),
            ..Default::default()
        }
    }

    pub fn from_error(error: &FingerprintError) -> Self {
        Self::failure(error.code(), error.to_string())
    }

    pub fn status(status: DeviceStatus) -> Self {
        Self {
            success: true,
            connected: Some(status.connected),
            device_ready: Some(status.ready),
            device_name: Some(status.name),
            serial_number: status.serial_number,
            message: Some(status.message),
            ..Default::default()
        }
    }

    pub fn enrolled(enrollment: Enrollment) -> Self {
        Self {
            success: true,
            template_id: Some(enrollment.template_id),
            identity: Some(enrollment.identity),
            message: Some("Fingerprint enrolled successfully".into()),
            ..Default::default()
        }
    }

    /// A no-match is still a successful call.
    pub fn match_outcome(outcome: MatchOutcome) -> Self {
        Self {
            success: true,
            matched: Some(outcome.matched),
            identity: outcome.identity,
            score: outcome.score.map(|s| s.value()),
            message: Some(outcome.message),
            ..Default::default()
        }
    }

    pub fn deleted(existed: bool) -> Self {
        let message = if existed {
            "Fingerprint template deleted"
        } else {
            crate::core::identification::NOT_ENROLLED_MESSAGE
        };
        Self { success: true, message: Some(message.into()), ..Default::default() }
    }

    pub fn listing(templates: Vec<TemplateSummary>) -> Self {
        Self {
            success: true,
            count: Some(templates.len()),
            templates: Some(templates),
            ..Default::default()
        }
    }

    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = Some(simulation);
        self
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"error":"INTERNAL_ERROR","message":"Failed to encode result: {}"}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }

    /// Parses helper stdout. The result is the last non-empty line.
    pub fn parse_output(stdout: &str) -> Result<Self> {
        let line = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| FingerprintError::BridgeProtocol("helper printed no result".into()))?;

        serde_json::from_str(line)
            .map_err(|e| FingerprintError::BridgeProtocol(format!("unparseable result '{}': {}", line, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::Score;

    #[test]
    fn commands_render_helper_arguments() {
        assert_eq!(BridgeCommand::Status.args(), ["status"]);
        assert_eq!(
            BridgeCommand::Enroll { identity: "E-1".into() }.args(),
            ["enroll", "E-1"]
        );
        assert!(BridgeCommand::Identify.needs_device());
        assert!(!BridgeCommand::List.needs_device());
    }

    #[test]
    fn absent_fields_are_omitted() {
        let line = BridgeResult::failure("ALREADY_ENROLLED", "exists").to_line();
        assert_eq!(
            line,
            r#"{"success":false,"message":"exists","error":"ALREADY_ENROLLED"}"#
        );
        assert!(!line.contains('\n'));
    }

    #[test]
    fn no_match_carries_score_without_error() {
        let result = BridgeResult::match_outcome(MatchOutcome {
            matched: false,
            identity: None,
            score: Some(Score::new(30_000)),
            message: "No matching fingerprint found".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&result.to_line()).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["matched"], false);
        assert_eq!(value["score"], 30_000);
        assert!(value.get("error").is_none());
        assert!(value.get("identity").is_none());
    }

    #[test]
    fn parses_last_line_and_legacy_staff_id() {
        let stdout = "\n{\"success\":true,\"matched\":true,\"staffId\":\"E-1\"}\n";
        let result = BridgeResult::parse_output(stdout).unwrap();
        assert_eq!(result.identity.as_deref(), Some("E-1"));
        assert_eq!(result.matched, Some(true));
    }

    #[test]
    fn garbage_output_is_a_protocol_error() {
        assert_eq!(BridgeResult::parse_output("").unwrap_err().code(), "BRIDGE_PROTOCOL");
        assert_eq!(
            BridgeResult::parse_output("Segmentation fault").unwrap_err().code(),
            "BRIDGE_PROTOCOL"
        );
    }
}
