use crate::error::DispatchError;
use crate::llm::{self, ReasoningRequest, ReasoningService};
use crate::model::{Capability, Coordinate, RouteResult};
use crate::registry::ResponderDirectory;
use crate::route::RoutePlanner;
use crate::rules;
use crate::selector;
use crate::tools::{ToolCall, ToolOutput, ToolRegistry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_TURNS: usize = 4;

const DISPATCH_PREAMBLE: &str = "You are the dispatch commander for a large public event. \
Medical or Accident incidents need a Medical responder; Unrest needs a Security responder. \
Find the closest available unit, get its fastest route, then confirm the dispatch naming the unit, \
its ETA and its route. If no unit is available, say so clearly.";

const DRONE_PREAMBLE: &str = "You are the drone dispatch operator for a large public event.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub confirmation: String,
    pub responder: Option<String>,
    pub capability: Option<Capability>,
    pub route: Option<RouteResult>,
}

impl DispatchOutcome {
    pub fn polyline(&self) -> Option<&[Coordinate]> {
        self.route.as_ref().map(|r| r.polyline.as_slice())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DroneOutcome {
    pub confirmation: String,
}

#[derive(Clone)]
pub enum DispatchStrategy {
    Rules,
    Model {
        reasoner: Arc<dyn ReasoningService>,
        max_turns: usize,
    },
}

/// One model turn: either a tool call or the final confirmation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ModelStep {
    Call {
        tool: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    Final {
        #[serde(rename = "final")]
        confirmation: String,
    },
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DroneConfirmation {
    confirmation_message: String,
}

#[derive(Clone)]
pub struct Dispatcher {
    directory: Arc<dyn ResponderDirectory>,
    planner: Arc<dyn RoutePlanner>,
    tools: ToolRegistry,
    strategy: DispatchStrategy,
}

impl Dispatcher {
    pub fn new(directory: Arc<dyn ResponderDirectory>, planner: Arc<dyn RoutePlanner>) -> Self {
        Self {
            tools: ToolRegistry::new(directory.clone(), planner.clone()),
            directory,
            planner,
            strategy: DispatchStrategy::Rules,
        }
    }

    pub fn with_strategy(mut self, strategy: DispatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn directory(&self) -> &dyn ResponderDirectory {
        self.directory.as_ref()
    }

    pub async fn dispatch(
        &self,
        incident_type: &str,
        location: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let outcome = match &self.strategy {
            DispatchStrategy::Rules => self.dispatch_by_rules(incident_type, location)?,
            DispatchStrategy::Model {
                reasoner,
                max_turns,
            } => {
                self.dispatch_by_model(reasoner.as_ref(), *max_turns, incident_type, location)
                    .await?
            }
        };

        info!(
            incident_type,
            location,
            responder = outcome.responder.as_deref().unwrap_or("none"),
            "dispatch resolved"
        );
        Ok(outcome)
    }

    pub fn dispatch_by_rules(
        &self,
        incident_type: &str,
        location: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let capability = rules::required_capability(incident_type)
            .ok_or_else(|| DispatchError::UnclassifiedIncident(incident_type.to_string()))?;
        let candidates = selector::select_responders(self.directory.as_ref(), capability, location)?;

        let Some(nearest) = candidates.first() else {
            return Ok(DispatchOutcome {
                confirmation: format!(
                    "No {capability} units are currently available for {incident_type} at {location}."
                ),
                responder: None,
                capability: Some(capability),
                route: None,
            });
        };

        let route = self.planner.plan(&nearest.responder.id, location)?;
        Ok(DispatchOutcome {
            confirmation: format!(
                "{id} ({capability}) dispatched to {incident_type} at {location}. ETA {eta}, {distance} away. Route: {route}",
                id = nearest.responder.id,
                eta = route.eta,
                distance = nearest.distance,
                route = route.route,
            ),
            responder: Some(nearest.responder.id.clone()),
            capability: Some(capability),
            route: Some(route),
        })
    }

    async fn dispatch_by_model(
        &self,
        reasoner: &dyn ReasoningService,
        max_turns: usize,
        incident_type: &str,
        location: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut transcript: Vec<serde_json::Value> = Vec::new();
        let mut capability = None;
        let mut last_route: Option<(String, RouteResult)> = None;

        for turn in 0..max_turns {
            let prompt = format!(
                "Incident Type: {incident_type}, Location: {location}\n\
                 Tools:\n{tools}\n\
                 Transcript so far:\n{transcript}\n\
                 Reply with JSON only: either {{\"tool\":\"<name>\",\"args\":{{...}}}} to call a tool, \
                 or {{\"final\":\"<confirmation message>\"}} when done.",
                tools = self.tools.definitions(),
                transcript = serde_json::Value::Array(transcript.clone()),
            );

            let raw = reasoner
                .complete(&ReasoningRequest::new(DISPATCH_PREAMBLE, prompt))
                .await?;

            match llm::parse_json_reply::<ModelStep>(&raw)? {
                ModelStep::Final { confirmation } => {
                    let (responder, route) = match last_route {
                        Some((id, route)) => (Some(id), Some(route)),
                        None => (None, None),
                    };
                    return Ok(DispatchOutcome {
                        confirmation,
                        responder,
                        capability,
                        route,
                    });
                }
                ModelStep::Call { tool, args } => {
                    debug!(turn, tool = %tool, "model requested tool");
                    let call = ToolCall { name: tool, args };
                    let result = match self.tools.execute(&call) {
                        Ok(output) => {
                            let json = output.to_json();
                            match output {
                                ToolOutput::Responders { capability: c, .. } => capability = Some(c),
                                ToolOutput::Route {
                                    responder_id,
                                    result,
                                } => last_route = Some((responder_id, result)),
                            }
                            json
                        }
                        Err(err @ DispatchError::UnknownTool(_)) => return Err(err),
                        Err(err) => {
                            warn!(tool = %call.name, error = %err, "tool call failed");
                            serde_json::json!({ "error": err.to_string() })
                        }
                    };
                    transcript.push(serde_json::json!({
                        "tool": call.name,
                        "args": call.args,
                        "result": result,
                    }));
                }
            }
        }

        Err(DispatchError::TurnLimit(max_turns))
    }

    pub async fn dispatch_drone(&self, location: &str) -> Result<DroneOutcome, DispatchError> {
        if self.directory.location(location).is_none() {
            return Err(DispatchError::UnknownLocation(location.to_string()));
        }

        let confirmation = match &self.strategy {
            DispatchStrategy::Rules => format!(
                "Drone dispatched to {location}. Aerial feed will be available to the security team on arrival."
            ),
            DispatchStrategy::Model { reasoner, .. } => {
                let reply: DroneConfirmation = llm::ask_structured(
                    reasoner.as_ref(),
                    DRONE_PREAMBLE,
                    &format!(
                        "A high-priority incident is at {location}. Acknowledge the request and confirm \
                         that a drone is being dispatched there immediately to give the security team a closer look."
                    ),
                    Vec::new(),
                )
                .await?;
                reply.confirmation_message
            }
        };

        info!(location, "drone dispatched");
        Ok(DroneOutcome { confirmation })
    }
}
