//! Shared domain types for the AmoCRM integration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Resource kinds addressable through the search API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Contacts,
    Companies,
    Leads,
    Notes,
}

impl SearchKind {
    /// Path segment under /api/v4/. Notes live under the leads resource.
    pub fn path(&self) -> &'static str {
        match self {
            SearchKind::Contacts => "contacts",
            SearchKind::Companies => "companies",
            SearchKind::Leads => "leads",
            SearchKind::Notes => "leads/notes",
        }
    }

    /// Key of the result list inside the `_embedded` envelope
    pub fn embedded_key(&self) -> &'static str {
        match self {
            SearchKind::Contacts => "contacts",
            SearchKind::Companies => "companies",
            SearchKind::Leads => "leads",
            SearchKind::Notes => "notes",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.embedded_key())
    }
}

/// Logical custom-field names the integration tracks on contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Phone,
    Email,
}

#[derive(Debug, Error)]
#[error("unknown field kind: {0}")]
pub struct ParseFieldKindError(String);

impl FromStr for FieldKind {
    type Err = ParseFieldKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(FieldKind::Phone),
            "email" => Ok(FieldKind::Email),
            other => Err(ParseFieldKindError(other.to_string())),
        }
    }
}

/// Custom-field value as the provider returns it: phone numbers arrive as
/// strings, some numeric fields as integers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrInt {
    Str(String),
    Int(i64),
}

impl StringOrInt {
    pub fn as_string(&self) -> String {
        match self {
            StringOrInt::Str(s) => s.clone(),
            StringOrInt::Int(n) => n.to_string(),
        }
    }
}

/// One value of a contact custom field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: StringOrInt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_code: Option<String>,
}

/// A custom field with its values, as embedded in contact records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValues {
    pub field_id: i64,
    #[serde(default)]
    pub field_name: Option<String>,
    pub values: Vec<FieldValue>,
}

/// Custom-field definition from the account metadata endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomFieldDef {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Sales pipeline status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub id: i64,
    pub name: String,
}

/// Sales pipeline with its ordered statuses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub statuses: Vec<PipelineStatus>,
}

/// Contact record decoded from a provider search result.
///
/// `fields` keeps the raw custom-field values keyed by field id; `phones`
/// and `emails` are derived from the configured field ids so the matcher
/// never has to know provider field numbering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<i64, Vec<String>>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

/// Deal record decoded from a provider search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub pipeline_id: Option<i64>,
    #[serde(default)]
    pub status_id: Option<i64>,
    #[serde(default)]
    pub responsible_user_id: Option<i64>,
}

/// Incoming lead data from a web form. Never persisted by this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub manager_id: Option<i64>,
}

/// A graded match candidate. The grade is only meaningful relative to other
/// candidates from the same search.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub contact: Contact,
    pub grade: i32,
}

/// Fields for a deal to be created
#[derive(Debug, Clone)]
pub struct NewDeal {
    pub name: String,
    pub pipeline_id: i64,
    pub status_id: i64,
    pub contact_id: i64,
    pub manager_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_decodes_string_and_int() {
        let json = r#"[
            {"value": "+7 900 123-45-67", "enum_id": 1, "enum_code": "MOB"},
            {"value": 42}
        ]"#;
        let values: Vec<FieldValue> = serde_json::from_str(json).unwrap();
        assert_eq!(values[0].value.as_string(), "+7 900 123-45-67");
        assert_eq!(values[0].enum_code.as_deref(), Some("MOB"));
        assert_eq!(values[1].value.as_string(), "42");
        assert_eq!(values[1].enum_id, None);
    }

    #[test]
    fn custom_field_values_tolerates_missing_name() {
        let json = r#"{"field_id": 101, "values": [{"value": "a@b.cc"}]}"#;
        let field: CustomFieldValues = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_id, 101);
        assert!(field.field_name.is_none());
    }

    #[test]
    fn search_kind_paths() {
        assert_eq!(SearchKind::Contacts.path(), "contacts");
        assert_eq!(SearchKind::Notes.path(), "leads/notes");
        assert_eq!(SearchKind::Notes.embedded_key(), "notes");
        assert_eq!(SearchKind::Leads.to_string(), "leads");
    }

    #[test]
    fn field_kind_from_str() {
        assert_eq!("phone".parse::<FieldKind>().unwrap(), FieldKind::Phone);
        assert_eq!("email".parse::<FieldKind>().unwrap(), FieldKind::Email);
        assert!("fax".parse::<FieldKind>().is_err());
    }

    #[test]
    fn pipeline_decodes_without_statuses() {
        let json = r#"{"id": 5, "name": "Main"}"#;
        let pipeline: Pipeline = serde_json::from_str(json).unwrap();
        assert!(pipeline.statuses.is_empty());
    }
}
