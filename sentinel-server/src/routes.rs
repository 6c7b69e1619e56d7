use crate::state::AppState;
use alert_registry::{
    validate_action_v1, validate_alert_v1, CanonicalActionV1, CanonicalAlertV1, RegistryError,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sentinel_core::alerts::SequencedAction;
use sentinel_core::analysis;
use sentinel_core::db;
use sentinel_core::dispatch::{DispatchOutcome, DroneOutcome};
use sentinel_core::error::{DispatchError, ReasoningError, StoreError};
use sentinel_core::feed::{FeedChanges, FeedCursor};
use sentinel_core::llm::{MediaPayload, ReasoningService};
use sentinel_core::model::{
    ActionKind, Alert, IncidentLocation, NewAction, NewAlert, Responder, Severity,
};
use sentinel_core::records::{Collection, Record};
use sentinel_core::scanner::{FrameScan, Scanner};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_RECORD_LIMIT: usize = 50;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alerts", post(create_alert).get(list_alerts))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/actions", post(append_action))
        .route("/alerts/:id/dispatch/responder", post(dispatch_for_alert))
        .route("/alerts/:id/dispatch/drone", post(drone_for_alert))
        .route("/dispatch/responder", post(dispatch_responder))
        .route("/responders", get(list_responders))
        .route("/locations", get(list_locations))
        .route("/analysis/frame", post(analyze_frame))
        .route("/analysis/video", post(analyze_video))
        .route("/analysis/missing-person", post(search_missing_person))
        .route("/analysis/sentiment", post(analyze_sentiment))
        .route("/analysis/situation", post(summarize_situation))
        .route("/analysis/map-suggestions", post(suggest_map))
        .route("/records/:collection", get(list_records))
        .route("/feed", get(pull_feed))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlertNotFound(_) => ApiError::new(StatusCode::NOT_FOUND, err.to_string()),
            other => {
                warn!(error = %other, "store failure");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<ReasoningError> for ApiError {
    fn from(err: ReasoningError) -> Self {
        match err {
            ReasoningError::InvalidMedia(_) => ApiError::new(StatusCode::BAD_REQUEST, err.to_string()),
            other => {
                warn!(error = %other, "reasoning failure");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    format!("An error occurred while contacting the AI service: {other}"),
                )
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Reasoning(inner) => inner.into(),
            e if e.is_lookup() => ApiError::new(StatusCode::NOT_FOUND, e.to_string()),
            e @ DispatchError::UnclassifiedIncident(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
            }
            other => {
                warn!(error = %other, "dispatch failure");
                ApiError::new(StatusCode::BAD_GATEWAY, other.to_string())
            }
        }
    }
}

/// A result that was produced even if saving it failed.
#[derive(Debug, Serialize)]
pub struct Saved<T> {
    pub result: T,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

impl<T> Saved<T> {
    fn from_store<R>(result: T, stored: Result<R, StoreError>, id: impl FnOnce(&R) -> String) -> Self {
        match stored {
            Ok(saved) => Saved {
                result,
                persisted: true,
                record_id: Some(id(&saved)),
                persistence_error: None,
            },
            Err(err) => {
                warn!(error = %err, "result produced but not saved");
                Saved {
                    result,
                    persisted: false,
                    record_id: None,
                    persistence_error: Some(err.to_string()),
                }
            }
        }
    }
}

fn reasoner(state: &AppState) -> Result<Arc<dyn ReasoningService>, ApiError> {
    state.reasoner.clone().ok_or_else(|| {
        ApiError::new(StatusCode::BAD_GATEWAY, "reasoning service not configured")
    })
}

async fn load_alert(state: &AppState, id: String) -> Result<Alert, StoreError> {
    let alerts = state.alerts.clone();
    db::blocking(move || alerts.get(&id)).await
}

async fn save_action(
    state: &AppState,
    alert_id: String,
    action: NewAction,
) -> Result<SequencedAction, StoreError> {
    let alerts = state.alerts.clone();
    db::blocking(move || alerts.append_action(&alert_id, action)).await
}

async fn save_record(
    state: &AppState,
    collection: Collection,
    payload: serde_json::Value,
) -> Result<Record, StoreError> {
    let records = state.records.clone();
    db::blocking(move || records.append(collection, payload)).await
}

fn media(field: &'static str, uri: &str) -> Result<MediaPayload, ApiError> {
    if uri.trim().is_empty() {
        return Err(RegistryError::Missing(field).into());
    }
    Ok(MediaPayload::from_data_uri(uri)?)
}

async fn create_alert(
    State(state): State<AppState>,
    Json(payload): Json<CanonicalAlertV1>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    validate_alert_v1(&payload)?;
    let severity = Severity::parse(&payload.severity)
        .ok_or_else(|| RegistryError::InvalidSeverity(payload.severity.clone()))?;
    let new = NewAlert {
        incident_type: payload.incident_type,
        location: payload.location,
        severity,
    };
    let alerts = state.alerts.clone();
    let alert = db::blocking(move || alerts.create(new)).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

async fn list_alerts(State(state): State<AppState>) -> Result<Json<Vec<Alert>>, ApiError> {
    let alerts = state.alerts.clone();
    Ok(Json(db::blocking(move || alerts.list()).await?))
}

async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(load_alert(&state, id).await?))
}

async fn append_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<CanonicalActionV1>,
) -> Result<(StatusCode, Json<SequencedAction>), ApiError> {
    validate_action_v1(&payload)?;
    let kind = ActionKind::parse(&payload.action_type)
        .ok_or_else(|| RegistryError::InvalidActionType(payload.action_type.clone()))?;
    let action = save_action(
        &state,
        id,
        NewAction {
            kind,
            details: payload.details,
            polyline: None,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(action)))
}

async fn dispatch_for_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Saved<DispatchOutcome>>, ApiError> {
    let alert = load_alert(&state, id).await?;
    let outcome = state
        .dispatcher
        .dispatch(&alert.incident_type, &alert.location)
        .await?;

    let stored = save_action(
        &state,
        alert.id,
        NewAction {
            kind: ActionKind::DispatchResponder,
            details: outcome.confirmation.clone(),
            polyline: outcome.polyline().map(<[_]>::to_vec),
        },
    )
    .await;
    Ok(Json(Saved::from_store(outcome, stored, |a| a.seq.to_string())))
}

async fn drone_for_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Saved<DroneOutcome>>, ApiError> {
    let alert = load_alert(&state, id).await?;
    let outcome = state.dispatcher.dispatch_drone(&alert.location).await?;

    let stored = save_action(
        &state,
        alert.id,
        NewAction {
            kind: ActionKind::DispatchDrone,
            details: outcome.confirmation.clone(),
            polyline: None,
        },
    )
    .await;
    Ok(Json(Saved::from_store(outcome, stored, |a| a.seq.to_string())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub incident_type: String,
    pub incident_location: String,
}

async fn dispatch_responder(
    State(state): State<AppState>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    if req.incident_type.trim().is_empty() {
        return Err(RegistryError::Missing("incidentType").into());
    }
    let outcome = state
        .dispatcher
        .dispatch(&req.incident_type, &req.incident_location)
        .await?;
    Ok(Json(outcome))
}

async fn list_responders(State(state): State<AppState>) -> Json<Vec<Responder>> {
    Json(state.dispatcher.directory().responders().to_vec())
}

async fn list_locations(State(state): State<AppState>) -> Json<Vec<IncidentLocation>> {
    Json(state.dispatcher.directory().locations().to_vec())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRequest {
    pub feed: String,
    pub location: String,
    pub frame_data_uri: String,
}

async fn analyze_frame(
    State(state): State<AppState>,
    Json(req): Json<FrameRequest>,
) -> Result<Json<FrameScan>, ApiError> {
    let Some(_guard) = state.scan_gate.try_begin(&req.feed) else {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            format!("a scan for feed '{}' is already in progress", req.feed),
        ));
    };
    let frame = media("frameDataUri", &req.frame_data_uri)?;
    let scanner = Scanner::new(reasoner(&state)?, state.alerts.clone(), state.scan_gate.clone());
    let scan = scanner.scan_frame(&req.feed, &req.location, frame).await?;
    Ok(Json(scan))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    #[serde(default)]
    pub video_url: String,
    pub video_data_uri: String,
}

async fn analyze_video(
    State(state): State<AppState>,
    Json(req): Json<VideoRequest>,
) -> Result<Json<Saved<analysis::SafetyAnalysis>>, ApiError> {
    let video = media("videoDataUri", &req.video_data_uri)?;
    let result = analysis::analyze_video_safety(reasoner(&state)?.as_ref(), video).await?;

    let stored = save_record(
        &state,
        Collection::VideoInsights,
        json!({ "videoUrl": req.video_url, "analysis": result }),
    )
    .await;
    Ok(Json(Saved::from_store(result, stored, |r| r.id.clone())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingPersonRequest {
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub video_url: String,
    pub photo_data_uri: String,
    pub video_data_uri: String,
}

async fn search_missing_person(
    State(state): State<AppState>,
    Json(req): Json<MissingPersonRequest>,
) -> Result<Json<Saved<analysis::MissingPersonFinding>>, ApiError> {
    let photo = media("photoDataUri", &req.photo_data_uri)?;
    let video = media("videoDataUri", &req.video_data_uri)?;
    let result = analysis::find_missing_person(reasoner(&state)?.as_ref(), photo, video).await?;

    let stored = save_record(
        &state,
        Collection::LostAndFoundCases,
        json!({
            "photoUrl": req.photo_url,
            "videoUrl": req.video_url,
            "analysis": result,
        }),
    )
    .await;
    Ok(Json(Saved::from_store(result, stored, |r| r.id.clone())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentRequest {
    pub social_media_feeds: String,
}

async fn analyze_sentiment(
    State(state): State<AppState>,
    Json(req): Json<SentimentRequest>,
) -> Result<Json<Saved<analysis::SentimentSummary>>, ApiError> {
    if req.social_media_feeds.trim().is_empty() {
        return Err(RegistryError::Missing("socialMediaFeeds").into());
    }
    let result =
        analysis::summarize_social_sentiment(reasoner(&state)?.as_ref(), &req.social_media_feeds)
            .await?;

    let stored = save_record(
        &state,
        Collection::SocialSentiments,
        json!({ "sourceText": req.social_media_feeds, "analysis": result }),
    )
    .await;
    Ok(Json(Saved::from_store(result, stored, |r| r.id.clone())))
}

#[derive(Debug, Deserialize)]
pub struct SituationRequest {
    pub query: String,
}

async fn summarize_situation(
    State(state): State<AppState>,
    Json(req): Json<SituationRequest>,
) -> Result<Json<Saved<analysis::SituationalSummary>>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(RegistryError::Missing("query").into());
    }
    let service = reasoner(&state)?;
    let (alerts, records) = (state.alerts.clone(), state.records.clone());
    let context =
        db::blocking(move || analysis::situational_context(&alerts, &records)).await?;
    let result = analysis::situational_summary(service.as_ref(), &req.query, &context).await?;

    let stored = save_record(
        &state,
        Collection::SituationalSummaries,
        json!({ "query": req.query, "summary": result.summary }),
    )
    .await;
    Ok(Json(Saved::from_store(result, stored, |r| r.id.clone())))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRequest {
    pub event_description: String,
    #[serde(default)]
    pub current_map_features: String,
}

async fn suggest_map(
    State(state): State<AppState>,
    Json(req): Json<MapRequest>,
) -> Result<Json<analysis::MapSuggestions>, ApiError> {
    let result = analysis::suggest_map_improvements(
        reasoner(&state)?.as_ref(),
        &req.event_description,
        &req.current_map_features,
    )
    .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub limit: Option<usize>,
}

async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let collection = Collection::parse(&collection).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("unknown collection '{collection}'"),
        )
    })?;
    let limit = query.limit.unwrap_or(DEFAULT_RECORD_LIMIT);
    let records = state.records.clone();
    Ok(Json(db::blocking(move || records.list(collection, limit)).await?))
}

async fn pull_feed(
    State(state): State<AppState>,
    Query(cursor): Query<FeedCursor>,
) -> Result<Json<FeedChanges>, ApiError> {
    let feed = state.feed();
    let changes = db::blocking(move || feed.changes_after(cursor)).await?;
    debug!(
        alerts = changes.alerts.len(),
        actions = changes.actions.len(),
        "feed pulled"
    );
    Ok(Json(changes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::assemble;
    use futures::future::{BoxFuture, FutureExt};
    use sentinel_core::db::Database;
    use sentinel_core::llm::ReasoningRequest;
    use std::path::PathBuf;

    struct Canned(&'static str);

    impl ReasoningService for Canned {
        fn complete<'a>(
            &'a self,
            _request: &'a ReasoningRequest,
        ) -> BoxFuture<'a, Result<String, ReasoningError>> {
            async move { Ok(self.0.to_string()) }.boxed()
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        PathBuf::from(format!("/tmp/sentinel-tests/server-{name}-{nanos}"))
    }

    fn test_state(name: &str, reasoner: Option<Arc<dyn ReasoningService>>) -> (AppState, PathBuf) {
        let dir = scratch_dir(name);
        let db = Database::open(dir.join("sentinel.db")).expect("open db");
        let config = ServerConfig::from_lookup(|_| None);
        (assemble(db, reasoner, &config), dir)
    }

    fn alert_payload(incident_type: &str, location: &str, severity: &str) -> CanonicalAlertV1 {
        CanonicalAlertV1 {
            schema: alert_registry::ALERT_SCHEMA_V1.into(),
            incident_type: incident_type.into(),
            location: location.into(),
            severity: severity.into(),
        }
    }

    async fn raise(state: &AppState, incident_type: &str, location: &str) -> Alert {
        let (status, Json(alert)) = create_alert(
            State(state.clone()),
            Json(alert_payload(incident_type, location, "high")),
        )
        .await
        .expect("create alert");
        assert_eq!(status, StatusCode::CREATED);
        alert
    }

    #[tokio::test]
    async fn creates_and_reads_alerts() {
        let (state, _dir) = test_state("alerts", None);
        let alert = raise(&state, "Unrest", "Ghat 5").await;
        assert_eq!(alert.severity, Severity::High);

        let Json(fetched) = get_alert(State(state.clone()), Path(alert.id.clone()))
            .await
            .expect("get");
        assert_eq!(fetched, alert);

        let Json(all) = list_alerts(State(state)).await.expect("list");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn rejects_invalid_alert() {
        let (state, _dir) = test_state("invalid-alert", None);
        let err = create_alert(
            State(state),
            Json(alert_payload("Medical", "Ghat 2", "catastrophic")),
        )
        .await
        .expect_err("severity rejected");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn padded_severity_is_accepted() {
        let (state, _dir) = test_state("padded-severity", None);
        let (status, Json(alert)) = create_alert(
            State(state),
            Json(alert_payload("Medical", "Ghat 2", " High ")),
        )
        .await
        .expect("padded severity accepted");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(alert.severity, Severity::High);
    }

    #[tokio::test]
    async fn unknown_alert_is_not_found() {
        let (state, _dir) = test_state("missing-alert", None);
        let err = get_alert(State(state.clone()), Path("nope".into()))
            .await
            .expect_err("missing");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = dispatch_for_alert(State(state), Path("nope".into()))
            .await
            .expect_err("missing");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_action_is_validated_and_appended() {
        let (state, _dir) = test_state("manual-action", None);
        let alert = raise(&state, "Medical", "Ghat 2").await;

        let bad = CanonicalActionV1 {
            schema: alert_registry::ACTION_SCHEMA_V1.into(),
            action_type: "CALL_POLICE".into(),
            details: "x".into(),
        };
        let err = append_action(State(state.clone()), Path(alert.id.clone()), Json(bad))
            .await
            .expect_err("bad type");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let good = CanonicalActionV1 {
            schema: alert_registry::ACTION_SCHEMA_V1.into(),
            action_type: "DISPATCH_DRONE".into(),
            details: "drone over Ghat 2".into(),
        };
        let (status, Json(action)) =
            append_action(State(state.clone()), Path(alert.id.clone()), Json(good))
                .await
                .expect("append");
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(action.action.kind, ActionKind::DispatchDrone);
        assert_eq!(state.alerts.get(&alert.id).expect("get").actions.len(), 1);
    }

    #[tokio::test]
    async fn dispatch_appends_responder_action_with_route() {
        let (state, _dir) = test_state("dispatch-alert", None);
        let alert = raise(&state, "Unrest", "Ghat 5").await;

        let Json(saved) = dispatch_for_alert(State(state.clone()), Path(alert.id.clone()))
            .await
            .expect("dispatch");
        assert!(saved.persisted);
        assert_eq!(saved.result.responder.as_deref(), Some("security-01"));

        let stored = state.alerts.get(&alert.id).expect("get");
        assert_eq!(stored.actions.len(), 1);
        assert_eq!(stored.actions[0].kind, ActionKind::DispatchResponder);
        assert_eq!(stored.actions[0].details, saved.result.confirmation);
        assert_eq!(stored.actions[0].polyline.as_ref().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn drone_dispatch_appends_action() {
        let (state, _dir) = test_state("dispatch-drone", None);
        let alert = raise(&state, "Fire", "Main Parking").await;

        let Json(saved) = drone_for_alert(State(state.clone()), Path(alert.id.clone()))
            .await
            .expect("drone");
        assert!(saved.persisted);
        assert!(saved.result.confirmation.contains("Main Parking"));

        let stored = state.alerts.get(&alert.id).expect("get");
        assert_eq!(stored.actions[0].kind, ActionKind::DispatchDrone);
        assert!(stored.actions[0].polyline.is_none());
    }

    #[tokio::test]
    async fn dispatch_errors_map_to_statuses() {
        let (state, _dir) = test_state("dispatch-errors", None);

        let err = dispatch_responder(
            State(state.clone()),
            Json(DispatchRequest {
                incident_type: "Medical".into(),
                incident_location: "Atlantis".into(),
            }),
        )
        .await
        .expect_err("unknown location");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = dispatch_responder(
            State(state),
            Json(DispatchRequest {
                incident_type: "Lost Child".into(),
                incident_location: "Ghat 2".into(),
            }),
        )
        .await
        .expect_err("unclassified");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analysis_without_reasoner_is_bad_gateway() {
        let (state, _dir) = test_state("no-reasoner", None);
        let err = analyze_sentiment(
            State(state),
            Json(SentimentRequest {
                social_media_feeds: "crowd is calm near Ghat 2".into(),
            }),
        )
        .await
        .expect_err("not configured");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.message(), "reasoning service not configured");
    }

    #[tokio::test]
    async fn sentiment_is_persisted() {
        let reply = r#"{"overallSentiment": "Tense", "keyConcerns": "crowding", "potentialSafetyIssues": "bridge"}"#;
        let (state, _dir) = test_state("sentiment", Some(Arc::new(Canned(reply))));

        let Json(saved) = analyze_sentiment(
            State(state.clone()),
            Json(SentimentRequest {
                social_media_feeds: "too many people on the bridge".into(),
            }),
        )
        .await
        .expect("sentiment");
        assert!(saved.persisted);
        assert_eq!(saved.result.overall_sentiment, "Tense");

        let Json(records) = list_records(
            State(state),
            Path("social-sentiments".into()),
            Query(RecordQuery { limit: None }),
        )
        .await
        .expect("records");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload["sourceText"], "too many people on the bridge");
    }

    #[tokio::test]
    async fn save_failure_still_returns_result() {
        let reply = r#"{"overallSentiment": "Calm", "keyConcerns": "none", "potentialSafetyIssues": "none"}"#;
        let (state, dir) = test_state("save-failure", Some(Arc::new(Canned(reply))));
        std::fs::remove_dir_all(&dir).expect("remove db dir");

        let Json(saved) = analyze_sentiment(
            State(state),
            Json(SentimentRequest {
                social_media_feeds: "all quiet".into(),
            }),
        )
        .await
        .expect("result survives");
        assert!(!saved.persisted);
        assert!(saved.persistence_error.is_some());
        assert_eq!(saved.result.overall_sentiment, "Calm");
    }

    #[tokio::test]
    async fn frame_scan_conflicts_while_pending() {
        let (state, _dir) = test_state("frame-gate", Some(Arc::new(Canned("{}"))));
        let _pending = state.scan_gate.try_begin("ghat-5-cam").expect("gate");

        let err = analyze_frame(
            State(state),
            Json(FrameRequest {
                feed: "ghat-5-cam".into(),
                location: "Ghat 5".into(),
                frame_data_uri: "data:image/jpeg;base64,QUJD".into(),
            }),
        )
        .await
        .expect_err("conflict");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn frame_anomaly_raises_alert() {
        let reply = r#"{"isAnomaly": true, "anomalyType": "Smoke", "description": "smoke near stalls"}"#;
        let (state, _dir) = test_state("frame-alert", Some(Arc::new(Canned(reply))));

        let Json(scan) = analyze_frame(
            State(state.clone()),
            Json(FrameRequest {
                feed: "market-cam".into(),
                location: "Market Area".into(),
                frame_data_uri: "data:image/png;base64,QUJD".into(),
            }),
        )
        .await
        .expect("scan");
        let alert_id = scan.alert_id.expect("alert raised");
        let alert = state.alerts.get(&alert_id).expect("get");
        assert_eq!(alert.incident_type, "Smoke");
        assert_eq!(alert.severity, Severity::High);
        assert!(!state.scan_gate.is_scanning("market-cam"));
    }

    #[tokio::test]
    async fn unknown_collection_is_not_found() {
        let (state, _dir) = test_state("records-unknown", None);
        let err = list_records(
            State(state),
            Path("diaries".into()),
            Query(RecordQuery { limit: None }),
        )
        .await
        .expect_err("unknown");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feed_returns_changes_after_cursor() {
        let (state, _dir) = test_state("feed", None);
        let first = raise(&state, "Medical", "Ghat 2").await;

        let Json(changes) = pull_feed(State(state.clone()), Query(FeedCursor::default()))
            .await
            .expect("feed");
        assert_eq!(changes.alerts.len(), 1);
        assert_eq!(changes.alerts[0].alert.id, first.id);

        raise(&state, "Unrest", "Ghat 5").await;
        let Json(next) = pull_feed(State(state), Query(changes.cursor))
            .await
            .expect("feed");
        assert_eq!(next.alerts.len(), 1);
        assert_eq!(next.alerts[0].alert.incident_type, "Unrest");
    }
}
