use serde::{Deserialize, Serialize};

pub const ALERT_SCHEMA_V1: &str = "alert.v1";
pub const ACTION_SCHEMA_V1: &str = "action.v1";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unsupported schema '{0}'")]
    UnsupportedSchema(String),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid severity '{0}'")]
    InvalidSeverity(String),
    #[error("invalid action type '{0}'")]
    InvalidActionType(String),
}

/// Operator-submitted alert, before the store assigns id and timestamp.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalAlertV1 {
    #[serde(default = "alert_schema")]
    pub schema: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub location: String,
    pub severity: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalActionV1 {
    #[serde(default = "action_schema")]
    pub schema: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub details: String,
}

fn alert_schema() -> String {
    ALERT_SCHEMA_V1.into()
}

fn action_schema() -> String {
    ACTION_SCHEMA_V1.into()
}

pub fn validate_alert_v1(alert: &CanonicalAlertV1) -> Result<(), RegistryError> {
    if alert.schema != ALERT_SCHEMA_V1 {
        return Err(RegistryError::UnsupportedSchema(alert.schema.clone()));
    }
    if alert.incident_type.trim().is_empty() {
        return Err(RegistryError::Missing("type"));
    }
    if alert.location.trim().is_empty() {
        return Err(RegistryError::Missing("location"));
    }
    match alert.severity.trim().to_lowercase().as_str() {
        "low" | "medium" | "high" => {}
        other => return Err(RegistryError::InvalidSeverity(other.to_string())),
    }
    Ok(())
}

pub fn validate_action_v1(action: &CanonicalActionV1) -> Result<(), RegistryError> {
    if action.schema != ACTION_SCHEMA_V1 {
        return Err(RegistryError::UnsupportedSchema(action.schema.clone()));
    }
    match action.action_type.as_str() {
        "DISPATCH_RESPONDER" | "DISPATCH_DRONE" => {}
        other => return Err(RegistryError::InvalidActionType(other.to_string())),
    }
    if action.details.trim().is_empty() {
        return Err(RegistryError::Missing("details"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(incident_type: &str, location: &str, severity: &str) -> CanonicalAlertV1 {
        CanonicalAlertV1 {
            schema: ALERT_SCHEMA_V1.into(),
            incident_type: incident_type.into(),
            location: location.into(),
            severity: severity.into(),
        }
    }

    #[test]
    fn validates_alert_v1() {
        assert!(validate_alert_v1(&alert("Unrest", "Ghat 5", "High")).is_ok());
        assert!(validate_alert_v1(&alert("Medical", "Ghat 2", "low")).is_ok());
    }

    #[test]
    fn severity_ignores_surrounding_whitespace() {
        assert!(validate_alert_v1(&alert("Unrest", "Ghat 5", " High ")).is_ok());
        assert!(validate_alert_v1(&alert("Unrest", "Ghat 5", "\tmedium\n")).is_ok());
    }

    #[test]
    fn rejects_blank_fields_and_unknown_severity() {
        assert_eq!(
            validate_alert_v1(&alert(" ", "Ghat 5", "High")),
            Err(RegistryError::Missing("type"))
        );
        assert_eq!(
            validate_alert_v1(&alert("Unrest", "", "High")),
            Err(RegistryError::Missing("location"))
        );
        assert_eq!(
            validate_alert_v1(&alert("Unrest", "Ghat 5", "critical")),
            Err(RegistryError::InvalidSeverity("critical".into()))
        );
    }

    #[test]
    fn schema_defaults_when_omitted() {
        let parsed: CanonicalAlertV1 = serde_json::from_value(serde_json::json!({
            "type": "Medical",
            "location": "Sector 12 Bridge",
            "severity": "Medium"
        }))
        .expect("parse");
        assert_eq!(parsed.schema, ALERT_SCHEMA_V1);
        assert!(validate_alert_v1(&parsed).is_ok());
    }

    #[test]
    fn action_type_must_be_known() {
        let action = CanonicalActionV1 {
            schema: ACTION_SCHEMA_V1.into(),
            action_type: "DISPATCH_BOAT".into(),
            details: "x".into(),
        };
        assert_eq!(
            validate_action_v1(&action),
            Err(RegistryError::InvalidActionType("DISPATCH_BOAT".into()))
        );
    }
}
