use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Capability {
    Medical,
    Security,
}

impl Capability {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "medical" => Some(Capability::Medical),
            "security" => Some(Capability::Security),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Medical => f.write_str("Medical"),
            Capability::Security => f.write_str("Security"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    pub id: String,
    pub capability: Capability,
    pub position: Coordinate,
    pub on_duty: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IncidentLocation {
    pub name: String,
    pub position: Coordinate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    DispatchResponder,
    DispatchDrone,
}

impl ActionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DISPATCH_RESPONDER" => Some(ActionKind::DispatchResponder),
            "DISPATCH_DRONE" => Some(ActionKind::DispatchDrone),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::DispatchResponder => "DISPATCH_RESPONDER",
            ActionKind::DispatchDrone => "DISPATCH_DRONE",
        }
    }
}

/// Appended to an [`Alert`]; never edited afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyline: Option<Vec<Coordinate>>,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub incident_type: String,
    pub location: String,
    pub severity: Severity,
    pub created_at: String,
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub incident_type: String,
    pub location: String,
    pub severity: Severity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub kind: ActionKind,
    pub details: String,
    pub polyline: Option<Vec<Coordinate>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub route: String,
    pub eta: String,
    pub eta_minutes: u32,
    pub distance_m: f64,
    pub polyline: Vec<Coordinate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub responder: Responder,
    pub distance_m: f64,
    pub distance: String,
}

pub(crate) fn now_string() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
