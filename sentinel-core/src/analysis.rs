//! Structured model calls behind the dashboard's analysis pages.
//!
//! Each flow sends one request to the [`ReasoningService`] with the JSON
//! schema of its reply type attached and parses the answer into that type.

use crate::alerts::AlertStore;
use crate::error::{ReasoningError, StoreError};
use crate::llm::{ask_structured, MediaPayload, ReasoningService};
use crate::records::{Collection, RecordStore};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const SECURITY_ANALYST: &str = "You are a security analyst monitoring a crowded public event.";
const INTELLIGENCE_ANALYST: &str =
    "You are an intelligence analyst for the event command center.";
const CONTEXT_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrameAnomaly {
    pub is_anomaly: bool,
    /// Smoke, Fire, Panic, Obstruction, Fight or None.
    pub anomaly_type: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SafetyAnalysis {
    pub hazard_detected: bool,
    pub hazard_description: String,
    /// Position in the video of the main hazard, e.g. "00:25".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub crowd_density: String,
    pub unusual_events: String,
    pub smoke_detected: bool,
    pub fire_detected: bool,
    pub panic_detected: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MissingPersonFinding {
    pub person_found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub details: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentimentSummary {
    pub overall_sentiment: String,
    pub key_concerns: String,
    pub potential_safety_issues: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SituationalSummary {
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MapSuggestions {
    pub suggested_improvements: String,
}

pub async fn detect_frame_anomaly(
    service: &dyn ReasoningService,
    frame: MediaPayload,
) -> Result<FrameAnomaly, ReasoningError> {
    require_kind(&frame, "image/")?;
    ask_structured(
        service,
        SECURITY_ANALYST,
        "Analyze this frame from a live video feed. Look for smoke or fire, signs of a crowd \
         surge or panic, large unattended objects or obstructions in pathways, and fights. \
         If an anomaly is present set isAnomaly to true with its type and a short description; \
         otherwise set isAnomaly to false and anomalyType to \"None\".",
        vec![frame],
    )
    .await
}

pub async fn analyze_video_safety(
    service: &dyn ReasoningService,
    video: MediaPayload,
) -> Result<SafetyAnalysis, ReasoningError> {
    require_kind(&video, "video/")?;
    ask_structured(
        service,
        SECURITY_ANALYST,
        "Analyze this video for safety hazards. Describe crowd density and unusual events, flag \
         smoke, fire and panicked crowd surges, and give the timestamp of the main hazard if any.",
        vec![video],
    )
    .await
}

pub async fn find_missing_person(
    service: &dyn ReasoningService,
    photo: MediaPayload,
    video: MediaPayload,
) -> Result<MissingPersonFinding, ReasoningError> {
    require_kind(&photo, "image/")?;
    require_kind(&video, "video/")?;
    ask_structured(
        service,
        SECURITY_ANALYST,
        "The first attachment is a photo of a missing person, the second is CCTV footage. \
         Report whether the person appears in the footage, when, and any useful details.",
        vec![photo, video],
    )
    .await
}

pub async fn summarize_social_sentiment(
    service: &dyn ReasoningService,
    feeds: &str,
) -> Result<SentimentSummary, ReasoningError> {
    ask_structured(
        service,
        INTELLIGENCE_ANALYST,
        &format!(
            "Summarize the overall sentiment, key concerns and potential safety issues in these \
             social media posts about the event:\n{feeds}"
        ),
        Vec::new(),
    )
    .await
}

pub async fn suggest_map_improvements(
    service: &dyn ReasoningService,
    event_description: &str,
    current_map_features: &str,
) -> Result<MapSuggestions, ReasoningError> {
    ask_structured(
        service,
        "You are a cartographer planning maps for event safety.",
        &format!(
            "Event: {event_description}\nCurrent map features: {current_map_features}\n\
             Suggest improvements to the map for better situational awareness."
        ),
        Vec::new(),
    )
    .await
}

pub async fn situational_summary(
    service: &dyn ReasoningService,
    query: &str,
    context: &str,
) -> Result<SituationalSummary, ReasoningError> {
    ask_structured(
        service,
        INTELLIGENCE_ANALYST,
        &format!(
            "Fuse the sources below into a concise, actionable briefing that answers the \
             commander's query. Lead with the most critical information and do not just list \
             the sources.\n\nCommander's query: \"{query}\"\n\n{context}"
        ),
        Vec::new(),
    )
    .await
}

/// Recent alerts, video insights and sentiment analyses as prompt context.
pub fn situational_context(alerts: &AlertStore, records: &RecordStore) -> Result<String, StoreError> {
    let mut out = String::from("Recent alerts:\n");
    let recent = alerts.list()?;
    if recent.is_empty() {
        out.push_str("- none\n");
    }
    for alert in recent.iter().take(CONTEXT_LIMIT) {
        out.push_str(&format!(
            "- [{}] {} at {} ({})\n",
            alert.severity.as_str(),
            alert.incident_type,
            alert.location,
            alert.created_at
        ));
        for action in &alert.actions {
            out.push_str(&format!("  - {}: {}\n", action.kind.as_str(), action.details));
        }
    }

    for (title, collection) in [
        ("Video analytics", Collection::VideoInsights),
        ("Social media sentiment", Collection::SocialSentiments),
    ] {
        out.push_str(&format!("\n{title}:\n"));
        let records = records.list(collection, CONTEXT_LIMIT)?;
        if records.is_empty() {
            out.push_str("- none\n");
        }
        for record in records {
            let analysis = record.payload.get("analysis").unwrap_or(&record.payload);
            out.push_str(&format!("- {}: {}\n", record.created_at, analysis));
        }
    }
    Ok(out)
}

fn require_kind(media: &MediaPayload, prefix: &str) -> Result<(), ReasoningError> {
    if media.mime_type.starts_with(prefix) {
        Ok(())
    } else {
        Err(ReasoningError::InvalidMedia(format!(
            "expected {prefix}* media, got {}",
            media.mime_type
        )))
    }
}
