//! Record data model: field sets, values and finalized snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile fields in canonical order.
pub const PROFILE_FIELDS: &[&str] = &[
    "name",
    "age",
    "current_occupation",
    "desired_career",
    "work_experience",
];

/// Life-event fields in canonical order.
pub const EVENT_FIELDS: &[&str] = &[
    "event_overview",
    "when_happened",
    "what_happened",
    "peak_moment",
];

/// Which shape of record a session is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Profile,
    Event,
}

impl RecordKind {
    /// Required fields in their canonical declared order.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Profile => PROFILE_FIELDS,
            Self::Event => EVENT_FIELDS,
        }
    }

    /// Whether `field` belongs to this kind's field set.
    pub fn recognizes(&self, field: &str) -> bool {
        self.required_fields().contains(&field)
    }

    /// Human-readable label used in summaries.
    pub fn field_label(&self, field: &str) -> &'static str {
        match field {
            "name" => "Name",
            "age" => "Age",
            "current_occupation" => "Current Occupation",
            "desired_career" => "Desired Career",
            "work_experience" => "Work Experience",
            "event_overview" => "Overview",
            "when_happened" => "When It Happened",
            "what_happened" => "What Happened",
            "peak_moment" => "Peak Moment",
            _ => "Unknown",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profile => write!(f, "profile"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// A stored field value.
///
/// `age` is coerced to an integer when its leading token parses; every other
/// field is text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Build the stored value for `field` from an already-trimmed input.
    pub fn coerce(field: &str, trimmed: &str) -> Self {
        if field == "age"
            && let Some(n) = trimmed
                .split_whitespace()
                .next()
                .and_then(|token| token.parse::<i64>().ok())
        {
            return Self::Integer(n);
        }
        Self::Text(trimmed.to_string())
    }

    /// Text values that trim to nothing count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Integer(_) => false,
            Self::Text(s) => s.trim().is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Outcome of a single field update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    /// The value was stored.
    Applied { field: String, value: FieldValue },
    /// The value trimmed to empty; nothing changed.
    Ignored { field: String },
    /// The field name is not part of this record kind.
    Rejected { field: String, reason: String },
}

impl FieldUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Status line reported back to the model.
    pub fn message(&self) -> String {
        match self {
            Self::Applied { field, value } => format!("Updated {field}: {value}"),
            Self::Ignored { field } => format!("No change to {field}: empty value"),
            Self::Rejected { reason, .. } => reason.clone(),
        }
    }
}

/// Outcome of a multi-field update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpdate {
    /// Applied field names, sorted.
    pub applied: Vec<String>,
    /// Unrecognized field names, sorted.
    pub rejected: Vec<String>,
}

/// The in-progress fields for one profile or one event.
///
/// Only non-empty values are ever stored, so an absent key and an empty value
/// mean the same thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub kind: RecordKind,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// An empty record.
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Build a record from an external JSON object (e.g. state round-tripped by
    /// an agent runtime). Unknown keys, nulls, and empty strings are dropped.
    pub fn from_json(kind: RecordKind, value: &serde_json::Value) -> Self {
        let mut record = Self::new(kind);
        if let Some(obj) = value.as_object() {
            for (key, v) in obj {
                if let Some(raw) = scalar_to_string(v) {
                    record.set_field(key, &raw);
                }
            }
        }
        record
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set one field. Unknown names are rejected with a diagnostic, empty values
    /// are ignored, everything else is trimmed and stored.
    pub fn set_field(&mut self, name: &str, value: &str) -> FieldUpdate {
        if !self.kind.recognizes(name) {
            return FieldUpdate::Rejected {
                field: name.to_string(),
                reason: format!(
                    "Unknown field '{name}' for {} record. Valid fields: {}",
                    self.kind,
                    self.kind.required_fields().join(", ")
                ),
            };
        }

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return FieldUpdate::Ignored {
                field: name.to_string(),
            };
        }

        let stored = FieldValue::coerce(name, trimmed);
        self.fields.insert(name.to_string(), stored.clone());
        FieldUpdate::Applied {
            field: name.to_string(),
            value: stored,
        }
    }

    /// Apply several updates; invalid names and empty values are skipped.
    pub fn set_fields<'a, I>(&mut self, updates: I) -> BatchUpdate
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut batch = BatchUpdate::default();
        for (name, value) in updates {
            match self.set_field(name, value) {
                FieldUpdate::Applied { field, .. } => batch.applied.push(field),
                FieldUpdate::Rejected { field, .. } => batch.rejected.push(field),
                FieldUpdate::Ignored { .. } => {}
            }
        }
        batch.applied.sort();
        batch.applied.dedup();
        batch.rejected.sort();
        batch.rejected.dedup();
        batch
    }

    /// Required fields without a non-empty value, in canonical order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.kind
            .required_fields()
            .iter()
            .copied()
            .filter(|field| self.fields.get(*field).is_none_or(FieldValue::is_empty))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Merge an incoming record over a retained memory copy.
///
/// A non-empty incoming value wins; otherwise the memory value is kept. Only
/// fields recognized by the memory record's kind survive.
pub fn merge(memory: &Record, incoming: &Record) -> Record {
    let mut merged = Record::new(memory.kind);
    for field in memory.kind.required_fields() {
        let chosen = incoming
            .fields
            .get(*field)
            .filter(|v| !v.is_empty())
            .or_else(|| memory.fields.get(*field).filter(|v| !v.is_empty()));
        if let Some(value) = chosen {
            merged.fields.insert((*field).to_string(), value.clone());
        }
    }
    merged
}

/// Render a JSON scalar as the raw string a field update expects.
pub(crate) fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Immutable copy of a record taken at the moment of completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedRecord {
    pub id: Uuid,
    pub kind: RecordKind,
    pub sequence_number: u32,
    pub phase_label: String,
    pub user_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
    pub is_complete: bool,
    pub completed_at: DateTime<Utc>,
}

impl FinalizedRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// `(label, value)` pairs in canonical field order, skipping absent fields.
    pub fn summary_lines(&self) -> Vec<(&'static str, String)> {
        self.kind
            .required_fields()
            .iter()
            .filter_map(|field| {
                self.fields
                    .get(*field)
                    .map(|v| (self.kind.field_label(field), v.to_string()))
            })
            .collect()
    }

    /// Typed profile view. `None` for event records.
    pub fn to_profile(&self) -> Option<UserProfile> {
        if self.kind != RecordKind::Profile {
            return None;
        }
        Some(UserProfile {
            name: self.text("name"),
            age: self.fields.get("age").cloned(),
            current_occupation: self.text("current_occupation"),
            desired_career: self.text("desired_career"),
            work_experience: self.text("work_experience"),
        })
    }

    /// Typed event view. `None` for profile records.
    pub fn to_event(&self) -> Option<EventDetails> {
        if self.kind != RecordKind::Event {
            return None;
        }
        Some(EventDetails {
            event_id: self.id,
            event_number: self.sequence_number,
            event_overview: self.text("event_overview"),
            when_happened: self.text("when_happened"),
            what_happened: self.text("what_happened"),
            peak_moment: self.text("peak_moment"),
            is_complete: self.is_complete,
        })
    }

    fn text(&self, field: &str) -> Option<String> {
        self.fields.get(field).map(|v| v.to_string())
    }
}

/// Completed profile, used to seed the event coach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub age: Option<FieldValue>,
    pub current_occupation: Option<String>,
    pub desired_career: Option<String>,
    pub work_experience: Option<String>,
}

impl UserProfile {
    /// Render the profile as a markdown section for system prompt injection.
    pub fn to_system_prompt_section(&self) -> String {
        let mut parts = vec!["# User Profile".to_string()];
        let rows = [
            ("Name", self.name.clone()),
            ("Age", self.age.as_ref().map(|a| a.to_string())),
            ("Current occupation", self.current_occupation.clone()),
            ("Desired career", self.desired_career.clone()),
            ("Work experience", self.work_experience.clone()),
        ];
        for (label, value) in rows {
            if let Some(value) = value {
                parts.push(format!("- **{label}:** {value}"));
            }
        }
        parts.join("\n")
    }
}

/// Completed life event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub event_id: Uuid,
    pub event_number: u32,
    pub event_overview: Option<String>,
    pub when_happened: Option<String>,
    pub what_happened: Option<String>,
    pub peak_moment: Option<String>,
    pub is_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_record(pairs: &[(&str, &str)]) -> Record {
        let mut r = Record::new(RecordKind::Event);
        r.set_fields(pairs.iter().copied());
        r
    }

    #[test]
    fn set_field_trims_and_stores() {
        let mut r = Record::new(RecordKind::Profile);
        let update = r.set_field("current_occupation", "  software engineer \n");
        assert!(update.is_applied());
        assert_eq!(
            r.get("current_occupation"),
            Some(&FieldValue::Text("software engineer".into()))
        );
        assert_eq!(update.message(), "Updated current_occupation: software engineer");
    }

    #[test]
    fn set_field_overwrites_prior_value() {
        let mut r = Record::new(RecordKind::Event);
        r.set_field("when_happened", "2018");
        r.set_field("when_happened", "2019");
        assert_eq!(r.get("when_happened").unwrap().as_text(), Some("2019"));
    }

    #[test]
    fn unknown_field_leaves_record_unchanged() {
        let mut r = Record::new(RecordKind::Profile);
        r.set_field("name", "Sarah");
        let before = r.clone();

        let update = r.set_field("favourite_colour", "blue");
        assert!(matches!(update, FieldUpdate::Rejected { .. }));
        assert!(update.message().contains("favourite_colour"));
        assert_eq!(r, before);
    }

    #[test]
    fn event_field_rejected_on_profile() {
        let mut r = Record::new(RecordKind::Profile);
        assert!(!r.set_field("peak_moment", "summit").is_applied());
        assert!(r.is_empty());
    }

    #[test]
    fn whitespace_value_is_ignored() {
        let mut r = Record::new(RecordKind::Profile);
        r.set_field("name", "John");
        let update = r.set_field("name", "   ");
        assert!(matches!(update, FieldUpdate::Ignored { .. }));
        assert_eq!(r.get("name").unwrap().as_text(), Some("John"));
    }

    #[test]
    fn age_parses_leading_integer() {
        let mut r = Record::new(RecordKind::Profile);
        r.set_field("age", "25 years old");
        assert_eq!(r.get("age"), Some(&FieldValue::Integer(25)));
    }

    #[test]
    fn unparsable_age_keeps_raw_string() {
        let mut r = Record::new(RecordKind::Profile);
        r.set_field("age", "mid twenties");
        assert_eq!(r.get("age"), Some(&FieldValue::Text("mid twenties".into())));

        r.set_field("age", "25,");
        assert_eq!(r.get("age"), Some(&FieldValue::Text("25,".into())));
    }

    #[test]
    fn age_coercion_only_applies_to_age() {
        let mut r = Record::new(RecordKind::Profile);
        r.set_field("work_experience", "5 years");
        assert_eq!(r.get("work_experience").unwrap().as_text(), Some("5 years"));
    }

    #[test]
    fn set_fields_reports_sorted_applied_names() {
        let mut r = Record::new(RecordKind::Profile);
        let batch = r.set_fields([
            ("work_experience", "5 years"),
            ("name", "Sarah"),
            ("hobby", "climbing"),
            ("desired_career", "  "),
            ("age", "28"),
        ]);
        assert_eq!(batch.applied, vec!["age", "name", "work_experience"]);
        assert_eq!(batch.rejected, vec!["hobby"]);
        assert!(r.get("desired_career").is_none());
    }

    #[test]
    fn missing_fields_scenario() {
        let r = event_record(&[("event_overview", "trip"), ("when_happened", "2019")]);
        assert_eq!(r.missing_fields(), vec!["what_happened", "peak_moment"]);
        assert!(!r.is_complete());
    }

    #[test]
    fn missing_fields_follow_canonical_order() {
        let mut r = Record::new(RecordKind::Profile);
        r.set_field("desired_career", "tech lead");
        assert_eq!(
            r.missing_fields(),
            vec!["name", "age", "current_occupation", "work_experience"]
        );
    }

    #[test]
    fn complete_iff_no_missing_fields() {
        let r = event_record(&[
            ("event_overview", "trip"),
            ("when_happened", "2019"),
            ("what_happened", "hiked"),
            ("peak_moment", "summit"),
        ]);
        assert!(r.missing_fields().is_empty());
        assert!(r.is_complete());
    }

    #[test]
    fn merge_prefers_non_empty_incoming() {
        let memory = event_record(&[("event_overview", "trip"), ("when_happened", "2019")]);
        let incoming = event_record(&[("when_happened", "2020"), ("peak_moment", "summit")]);

        let merged = merge(&memory, &incoming);
        assert_eq!(merged.get("event_overview").unwrap().as_text(), Some("trip"));
        assert_eq!(merged.get("when_happened").unwrap().as_text(), Some("2020"));
        assert_eq!(merged.get("peak_moment").unwrap().as_text(), Some("summit"));
    }

    #[test]
    fn merge_never_clears_values() {
        let memory = event_record(&[("event_overview", "trip")]);
        let incoming = Record::from_json(
            RecordKind::Event,
            &serde_json::json!({"event_overview": "", "what_happened": null}),
        );
        let merged = merge(&memory, &incoming);
        assert_eq!(merged.get("event_overview").unwrap().as_text(), Some("trip"));
    }

    #[test]
    fn merge_is_idempotent() {
        let memory = event_record(&[("event_overview", "trip"), ("when_happened", "2019")]);
        let incoming = event_record(&[("what_happened", "hiked"), ("when_happened", "2020")]);

        let once = merge(&memory, &incoming);
        let twice = merge(&memory, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn from_json_drops_unknown_and_coerces() {
        let r = Record::from_json(
            RecordKind::Profile,
            &serde_json::json!({"name": " Ann ", "age": 30, "pet": "cat", "desired_career": null}),
        );
        assert_eq!(r.get("name").unwrap().as_text(), Some("Ann"));
        assert_eq!(r.get("age"), Some(&FieldValue::Integer(30)));
        assert!(r.get("pet").is_none());
        assert_eq!(r.fields().len(), 2);
    }

    #[test]
    fn finalized_record_flattens_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Text("John".into()));
        fields.insert("age".to_string(), FieldValue::Integer(30));
        let finalized = FinalizedRecord {
            id: Uuid::new_v4(),
            kind: RecordKind::Profile,
            sequence_number: 1,
            phase_label: "Gather profile information".into(),
            user_id: "u1".into(),
            session_id: "s1".into(),
            fields,
            is_complete: true,
            completed_at: Utc::now(),
        };

        let json = serde_json::to_value(&finalized).unwrap();
        assert_eq!(json["name"], "John");
        assert_eq!(json["age"], 30);
        assert_eq!(json["is_complete"], true);
        assert_eq!(json["kind"], "profile");

        let parsed: FinalizedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.get("age"), Some(&FieldValue::Integer(30)));
        assert_eq!(parsed.id, finalized.id);
    }

    #[test]
    fn summary_lines_use_labels_in_order() {
        let mut fields = BTreeMap::new();
        fields.insert("work_experience".to_string(), FieldValue::Text("4 years".into()));
        fields.insert("name".to_string(), FieldValue::Text("John".into()));
        let finalized = FinalizedRecord {
            id: Uuid::new_v4(),
            kind: RecordKind::Profile,
            sequence_number: 1,
            phase_label: String::new(),
            user_id: "u".into(),
            session_id: "s".into(),
            fields,
            is_complete: true,
            completed_at: Utc::now(),
        };
        assert_eq!(
            finalized.summary_lines(),
            vec![
                ("Name", "John".to_string()),
                ("Work Experience", "4 years".to_string())
            ]
        );
        let profile = finalized.to_profile().unwrap();
        assert_eq!(profile.name.as_deref(), Some("John"));
        assert!(finalized.to_event().is_none());
    }

    #[test]
    fn profile_prompt_section_skips_missing() {
        let profile = UserProfile {
            name: Some("Sarah".into()),
            age: Some(FieldValue::Integer(28)),
            ..Default::default()
        };
        let section = profile.to_system_prompt_section();
        assert!(section.contains("Sarah"));
        assert!(section.contains("28"));
        assert!(!section.contains("Desired career"));
    }
}
