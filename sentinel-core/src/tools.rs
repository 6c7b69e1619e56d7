use crate::error::DispatchError;
use crate::model::{Candidate, Capability, RouteResult};
use crate::registry::ResponderDirectory;
use crate::route::RoutePlanner;
use crate::selector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const GET_AVAILABLE_RESPONDERS: &str = "getAvailableResponders";
pub const GET_FASTEST_ROUTE: &str = "getFastestRoute";

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRespondersArgs {
    /// Incident location, e.g. "Ghat 5".
    pub incident_location: String,
    pub responder_type: Capability,
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FastestRouteArgs {
    pub responder_id: String,
    /// Incident location, e.g. "Ghat 5".
    pub destination: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Clone, Debug)]
pub enum ToolOutput {
    Responders {
        capability: Capability,
        candidates: Vec<Candidate>,
    },
    Route {
        responder_id: String,
        result: RouteResult,
    },
}

impl ToolOutput {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ToolOutput::Responders { candidates, .. } => serde_json::Value::Array(
                candidates
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.responder.id,
                            "type": c.responder.capability,
                            "location": c.responder.position,
                            "distance": c.distance,
                        })
                    })
                    .collect(),
            ),
            ToolOutput::Route { result, .. } => serde_json::json!({
                "route": result.route,
                "eta": result.eta,
                "polyline": result.polyline,
            }),
        }
    }
}

/// Selector and route estimator exposed by name to the reasoning service.
#[derive(Clone)]
pub struct ToolRegistry {
    directory: Arc<dyn ResponderDirectory>,
    planner: Arc<dyn RoutePlanner>,
}

impl ToolRegistry {
    pub fn new(directory: Arc<dyn ResponderDirectory>, planner: Arc<dyn RoutePlanner>) -> Self {
        Self { directory, planner }
    }

    pub fn definitions(&self) -> serde_json::Value {
        serde_json::json!([
            {
                "name": GET_AVAILABLE_RESPONDERS,
                "description": "List on-duty responders (Medical or Security) for an incident location, nearest first.",
                "parameters": schemars::schema_for!(AvailableRespondersArgs),
            },
            {
                "name": GET_FASTEST_ROUTE,
                "description": "Route, ETA and polyline for a responder to reach an incident location.",
                "parameters": schemars::schema_for!(FastestRouteArgs),
            }
        ])
    }

    pub fn execute(&self, call: &ToolCall) -> Result<ToolOutput, DispatchError> {
        match call.name.as_str() {
            GET_AVAILABLE_RESPONDERS => {
                let args: AvailableRespondersArgs = parse_args(call)?;
                let candidates = selector::select_responders(
                    self.directory.as_ref(),
                    args.responder_type,
                    &args.incident_location,
                )?;
                Ok(ToolOutput::Responders {
                    capability: args.responder_type,
                    candidates,
                })
            }
            GET_FASTEST_ROUTE => {
                let args: FastestRouteArgs = parse_args(call)?;
                let result = self.planner.plan(&args.responder_id, &args.destination)?;
                Ok(ToolOutput::Route {
                    responder_id: args.responder_id,
                    result,
                })
            }
            other => Err(DispatchError::UnknownTool(other.to_string())),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(call: &ToolCall) -> Result<T, DispatchError> {
    serde_json::from_value(call.args.clone())
        .map_err(|e| DispatchError::Tool(format!("bad arguments for {}: {e}", call.name)))
}
