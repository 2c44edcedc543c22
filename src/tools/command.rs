//! CoachCommand — the closed set of operations the model may invoke.
//!
//! Tool calls arrive as a name plus JSON arguments. They are parsed once into
//! a typed command, and the tool definitions offered to the model are generated
//! from the same table, so the two cannot drift apart.

use std::collections::BTreeMap;

use crate::error::ToolError;
use crate::llm::ToolDefinition;
use crate::tools::tool::require_scalar;
use crate::tracker::RecordKind;
use crate::tracker::model::scalar_to_string;

pub const UPDATE_FIELD: &str = "update_field";
pub const UPDATE_MULTIPLE_FIELDS: &str = "update_multiple_fields";
pub const PRESENT_SUMMARY: &str = "present_summary";
pub const CHECK_COMPLETENESS: &str = "check_completeness";

/// Every command name, in the order offered to the model.
pub const COMMAND_NAMES: &[&str] = &[
    UPDATE_FIELD,
    UPDATE_MULTIPLE_FIELDS,
    PRESENT_SUMMARY,
    CHECK_COMPLETENESS,
];

/// A typed command parsed from a model tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachCommand {
    UpdateField {
        field_name: String,
        field_value: String,
    },
    UpdateMultipleFields {
        updates: BTreeMap<String, String>,
    },
    PresentSummary,
    CheckCompleteness,
}

impl CoachCommand {
    /// Parse a tool call. Unknown names are `ToolError::NotFound`; arguments
    /// that are not a JSON object are `ToolError::InvalidParameters`.
    pub fn parse(name: &str, params: &serde_json::Value) -> Result<Self, ToolError> {
        if let Some(canonical) = canonical_name(name)
            && !params.is_object()
        {
            return Err(ToolError::InvalidParameters {
                name: canonical.to_string(),
                reason: format!("arguments must be a JSON object, got {params}"),
            });
        }

        match canonical_name(name) {
            Some(UPDATE_FIELD) => Ok(Self::UpdateField {
                field_name: require_scalar(UPDATE_FIELD, params, &["field_name", "field"])?,
                field_value: require_scalar(UPDATE_FIELD, params, &["field_value", "value"])?,
            }),
            Some(UPDATE_MULTIPLE_FIELDS) => {
                let updates = params
                    .get("updates")
                    .and_then(|v| v.as_object())
                    .ok_or_else(|| ToolError::InvalidParameters {
                        name: UPDATE_MULTIPLE_FIELDS.to_string(),
                        reason: "'updates' must be an object of field names to values"
                            .to_string(),
                    })?
                    .iter()
                    .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k.clone(), s)))
                    .collect();
                Ok(Self::UpdateMultipleFields { updates })
            }
            Some(PRESENT_SUMMARY) => Ok(Self::PresentSummary),
            Some(CHECK_COMPLETENESS) => Ok(Self::CheckCompleteness),
            _ => Err(ToolError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UpdateField { .. } => UPDATE_FIELD,
            Self::UpdateMultipleFields { .. } => UPDATE_MULTIPLE_FIELDS,
            Self::PresentSummary => PRESENT_SUMMARY,
            Self::CheckCompleteness => CHECK_COMPLETENESS,
        }
    }

    /// Tool definitions for a record kind. The field enums list exactly the
    /// kind's required fields.
    pub fn definitions(kind: RecordKind) -> Vec<ToolDefinition> {
        COMMAND_NAMES
            .iter()
            .map(|name| definition(name, kind))
            .collect()
    }
}

/// Map a tool name, or one of the older aliases, onto its canonical name.
fn canonical_name(name: &str) -> Option<&'static str> {
    match name {
        UPDATE_FIELD | "update_single_field" | "update_profile" => Some(UPDATE_FIELD),
        UPDATE_MULTIPLE_FIELDS => Some(UPDATE_MULTIPLE_FIELDS),
        PRESENT_SUMMARY | "confirm_data_from_user" | "confirm_profile" => Some(PRESENT_SUMMARY),
        CHECK_COMPLETENESS | "confirm_completeness" | "check_profile_completeness" => {
            Some(CHECK_COMPLETENESS)
        }
        _ => None,
    }
}

fn definition(name: &str, kind: RecordKind) -> ToolDefinition {
    let fields = kind.required_fields();
    let (description, parameters) = match name {
        UPDATE_FIELD => (
            format!("Record one {kind} field the user just told you about."),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "field_name": {
                        "type": "string",
                        "enum": fields,
                        "description": "Field to update"
                    },
                    "field_value": {
                        "type": "string",
                        "description": "Value in the user's own words"
                    }
                },
                "required": ["field_name", "field_value"]
            }),
        ),
        UPDATE_MULTIPLE_FIELDS => {
            let properties: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|f| ((*f).to_string(), serde_json::json!({"type": "string"})))
                .collect();
            (
                format!("Record several {kind} fields mentioned in one message."),
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "updates": {
                            "type": "object",
                            "properties": properties,
                            "additionalProperties": false,
                            "description": "Map of field name to value"
                        }
                    },
                    "required": ["updates"]
                }),
            )
        }
        PRESENT_SUMMARY => (
            format!(
                "Show the collected {kind} data to the user and ask them to confirm it. \
                 Call this before check_completeness."
            ),
            serde_json::json!({"type": "object", "properties": {}}),
        ),
        _ => (
            format!(
                "Finalize the {kind} once every field is filled and the user has explicitly \
                 confirmed the summary. Reports missing fields otherwise."
            ),
            serde_json::json!({"type": "object", "properties": {}}),
        ),
    };

    ToolDefinition {
        name: name.to_string(),
        description,
        parameters,
    }
}
