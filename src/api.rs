//! REST API for the placement service.
//!
//! Exposes cellar occupancy, placement runs (plain and streamed) and the bottle
//! lifecycle over HTTP. Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::ApiConfig;
use crate::model::{Bottle, BottleId, BottleRecord, BottleStatus, LocationId, PositionId};
use crate::occupancy::LocationSummary;
use crate::optimizer::{Assignment, PlacementOutcome, PlacementStrategy};
use crate::service::{
    FailedAssignment, PlacementReport, PlacementRequest, PlacementService, StatusLevel,
    StatusMessage,
};
use crate::store::{StoreBackend, StoreError};

#[derive(Clone)]
pub struct ApiState {
    service: Arc<PlacementService<StoreBackend>>,
}

impl ApiState {
    pub fn new(service: PlacementService<StoreBackend>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>cellar-sort API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request body for a status change.
///
/// `date` is recorded as `consumed_on` for consumed and gifted bottles.
#[derive(Deserialize, ToSchema)]
#[schema(example = json!({ "status": "consumed", "date": "2025-12-24" }))]
pub struct StatusChangeRequest {
    pub status: BottleStatus,
    #[serde(default)]
    #[schema(nullable = true)]
    pub date: Option<NaiveDate>,
}

/// Occupant of a position, if any.
#[derive(Serialize, ToSchema)]
pub struct PositionOccupant {
    pub position_id: PositionId,
    #[schema(nullable = true)]
    pub bottle: Option<BottleRecord>,
}

/// Final frame of a placement stream.
#[derive(Serialize)]
#[serde(tag = "type")]
enum StreamFrame {
    Report { report: PlacementReport },
    Failed { error: String, details: String },
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn store_error_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found"),
        StoreError::PositionOccupied { .. }
        | StoreError::NotInStock(_)
        | StoreError::Lifecycle(_) => (StatusCode::CONFLICT, "Conflicting cellar state"),
        StoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid input data"),
        StoreError::Http(_) | StoreError::Backend { .. } => {
            (StatusCode::BAD_GATEWAY, "Store unavailable")
        }
        StoreError::LockPoisoned(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

fn store_error(err: StoreError) -> Response {
    let (status, error) = store_error_status(&err);
    if status.is_server_error() {
        log::error!("❌ {}: {}", error, err);
    }
    error_response(status, error, err.to_string())
}

fn parse_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    match payload {
        Ok(Json(payload)) => Ok(payload),
        Err(err) => Err(json_deserialize_error(err)),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_list_locations,
        handle_location_occupancy,
        handle_position_bottle,
        handle_optimize,
        handle_optimize_stream,
        handle_change_status,
        handle_unplace_bottle
    ),
    components(
        schemas(
            LocationSummary,
            PositionOccupant,
            BottleRecord,
            Bottle,
            BottleStatus,
            PlacementRequest,
            PlacementStrategy,
            PlacementReport,
            PlacementOutcome,
            Assignment,
            FailedAssignment,
            StatusMessage,
            StatusLevel,
            StatusChangeRequest,
            ErrorResponse
        )
    ),
    tags(
        (name = "cellar", description = "Locations, positions and occupancy"),
        (name = "placement", description = "Automatic bottle placement"),
        (name = "bottles", description = "Bottle lifecycle")
    )
)]
struct ApiDoc;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/locations", get(handle_list_locations))
        .route("/locations/{id}/occupancy", get(handle_location_occupancy))
        .route("/positions/{id}/bottle", get(handle_position_bottle))
        .route("/placements/optimize", post(handle_optimize))
        .route("/placements/optimize_stream", post(handle_optimize_stream))
        .route("/bottles/{id}/status", post(handle_change_status))
        .route("/bottles/{id}/position", delete(handle_unplace_bottle))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(config: ApiConfig, state: ApiState) -> std::io::Result<()> {
    let store_name = state.service.store().name();
    let app = router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        log::error!("❌ Could not bind API server to {}: {}", addr, err);
        err
    })?;

    let display_host = config.display_host();
    log::info!(
        "🚀 Server running on http://{}:{} ({} store)",
        display_host,
        config.port(),
        store_name
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        log::info!("💡 Local access: http://localhost:{}", config.port());
    }
    log::info!("🍷 API Endpoints:");
    log::info!("   - GET /locations");
    log::info!("   - GET /locations/{{id}}/occupancy");
    log::info!("   - GET /positions/{{id}}/bottle");
    log::info!("   - POST /placements/optimize");
    log::info!("   - POST /placements/optimize_stream");
    log::info!("   - POST /bottles/{{id}}/status");
    log::info!("   - DELETE /bottles/{{id}}/position");
    log::info!("📑 Documentation:");
    log::info!("   - GET /docs");
    log::info!("   - GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for GET /locations.
///
/// Lists every storage location with its capacity and occupancy.
#[utoipa::path(
    get,
    path = "/locations",
    responses(
        (status = 200, description = "Occupancy per location", body = [LocationSummary]),
        (status = BAD_GATEWAY, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "cellar"
)]
async fn handle_list_locations(State(state): State<ApiState>) -> Response {
    match state.service.location_summaries().await {
        Ok(summaries) => (StatusCode::OK, Json(summaries)).into_response(),
        Err(err) => store_error(err),
    }
}

#[utoipa::path(
    get,
    path = "/locations/{id}/occupancy",
    params(("id" = String, Path, description = "Storage location id")),
    responses(
        (status = 200, description = "Occupancy of the location", body = LocationSummary),
        (status = NOT_FOUND, description = "Unknown location", body = ErrorResponse)
    ),
    tag = "cellar"
)]
async fn handle_location_occupancy(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    match state.service.location_summary(&LocationId::new(id)).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => store_error(err),
    }
}

/// Handler for GET /positions/{id}/bottle.
///
/// An empty position answers with `bottle: null`.
#[utoipa::path(
    get,
    path = "/positions/{id}/bottle",
    params(("id" = String, Path, description = "Position id")),
    responses(
        (status = 200, description = "Bottle at the position", body = PositionOccupant)
    ),
    tag = "cellar"
)]
async fn handle_position_bottle(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let position_id = PositionId::new(id);
    match state.service.bottle_at_position(&position_id).await {
        Ok(bottle) => (
            StatusCode::OK,
            Json(PositionOccupant {
                position_id,
                bottle,
            }),
        )
            .into_response(),
        Err(err) => store_error(err),
    }
}

/// Handler for POST /placements/optimize.
///
/// Places every unplaced in-stock bottle with the requested strategy. Writes that
/// fail are listed under `failed`; the others are kept.
#[utoipa::path(
    post,
    path = "/placements/optimize",
    request_body = PlacementRequest,
    responses(
        (status = 200, description = "Placement run finished", body = PlacementReport),
        (status = NOT_FOUND, description = "Unknown location in request", body = ErrorResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_optimize(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Response {
    let request = match parse_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    log::info!(
        "📥 New placement request: strategy {}, dry run {}",
        request
            .strategy
            .unwrap_or(state.service.config().default_strategy),
        request.dry_run
    );
    match state.service.optimize(request).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => store_error(err),
    }
}

/// Handler for POST /placements/optimize_stream (SSE).
///
/// Streams every placement step, then a final `Report` frame with the persisted result.
#[utoipa::path(
    post,
    path = "/placements/optimize_stream",
    request_body = PlacementRequest,
    responses(
        (
            status = 200,
            description = "Streams placement events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "placement"
)]
async fn handle_optimize_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlacementRequest>, JsonRejection>,
) -> Response {
    let request = match parse_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let service = Arc::clone(&state.service);

    tokio::spawn(async move {
        let progress = tx.clone();
        let outcome = service
            .optimize_with_progress(request, move |evt| {
                if let Ok(json) = serde_json::to_string(evt) {
                    // A closed receiver only means the client went away.
                    let _ = progress.send(json);
                }
            })
            .await;

        let frame = match outcome {
            Ok(report) => StreamFrame::Report { report },
            Err(err) => {
                let (_, error) = store_error_status(&err);
                StreamFrame::Failed {
                    error: error.to_string(),
                    details: err.to_string(),
                }
            }
        };
        if let Ok(json) = serde_json::to_string(&frame) {
            let _ = tx.send(json);
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /bottles/{id}/status.
///
/// Consumes, gifts or loses an in-stock bottle and frees its position.
#[utoipa::path(
    post,
    path = "/bottles/{id}/status",
    params(("id" = String, Path, description = "Bottle id")),
    request_body = StatusChangeRequest,
    responses(
        (status = 200, description = "Updated bottle", body = Bottle),
        (status = NOT_FOUND, description = "Unknown bottle", body = ErrorResponse),
        (status = CONFLICT, description = "Bottle is not in stock", body = ErrorResponse)
    ),
    tag = "bottles"
)]
async fn handle_change_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Response {
    let request = match parse_payload(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    match state
        .service
        .change_status(&BottleId::new(id), request.status, request.date)
        .await
    {
        Ok(bottle) => (StatusCode::OK, Json(bottle)).into_response(),
        Err(err) => store_error(err),
    }
}

#[utoipa::path(
    delete,
    path = "/bottles/{id}/position",
    params(("id" = String, Path, description = "Bottle id")),
    responses(
        (status = 204, description = "Bottle no longer has a position"),
        (status = NOT_FOUND, description = "Unknown bottle", body = ErrorResponse)
    ),
    tag = "bottles"
)]
async fn handle_unplace_bottle(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.service.unplace_bottle(&BottleId::new(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => store_error(err),
    }
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::PlacementConfig;
    use crate::store::InMemoryStore;
    use serde_json::Value;

    fn demo_state() -> (InMemoryStore, ApiState) {
        let store = InMemoryStore::with_demo_cellar().expect("demo cellar builds");
        let service = PlacementService::new(
            StoreBackend::InMemory(store.clone()),
            PlacementConfig::default(),
        );
        (store, ApiState::new(service))
    }

    /// Collects the JSON payloads of every `data:` line of an SSE body.
    async fn sse_frames(response: Response) -> Vec<Value> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("stream completes");
        String::from_utf8(bytes.to_vec())
            .expect("stream is UTF-8")
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).expect("frame is JSON"))
            .collect()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body is readable");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in [
            "/locations",
            "/locations/{id}/occupancy",
            "/positions/{id}/bottle",
            "/placements/optimize",
            "/placements/optimize_stream",
            "/bottles/{id}/status",
            "/bottles/{id}/position",
        ] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        for name in ["PlacementRequest", "PlacementReport", "ErrorResponse"] {
            assert!(
                components.schemas.contains_key(name),
                "Expected schema '{}' is missing from the OpenAPI document",
                name
            );
        }
    }

    #[test]
    fn placement_request_defaults() {
        let request: PlacementRequest = serde_json::from_str("{}").expect("Should parse");
        assert_eq!(request.strategy, None);
        assert!(!request.dry_run);
        assert!(request.location_ids.is_none());

        let request: PlacementRequest =
            serde_json::from_str(r#"{"strategy": "capacity", "location_ids": ["fridge"]}"#)
                .expect("Should parse");
        assert_eq!(request.strategy, Some(PlacementStrategy::Capacity));
        assert_eq!(request.location_ids, Some(vec![LocationId::from("fridge")]));
    }

    #[test]
    fn placement_request_rejects_unknown_strategy() {
        let result = serde_json::from_str::<PlacementRequest>(r#"{"strategy": "random"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn store_errors_map_to_status_codes() {
        let (status, _) = store_error_status(&StoreError::not_found("bottle", "b-1"));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = store_error_status(&StoreError::NotInStock(BottleId::from("b-1")));
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = store_error_status(&StoreError::Backend {
            status: 500,
            message: "boom".to_string(),
        });
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn optimize_places_demo_bottles() {
        let (store, state) = demo_state();
        let response = handle_optimize(
            State(state.clone()),
            Ok(Json(PlacementRequest::default())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["strategy"], "affinity");
        assert_eq!(body["assignments"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["status"]["level"], "success");
        assert!(body["occupancy"].as_array().is_some_and(|rows| !rows.is_empty()));
        assert!(store.bottle(&BottleId::from("b-6")).unwrap().is_placed());

        let again = body_json(
            handle_optimize(State(state), Ok(Json(PlacementRequest::default()))).await,
        )
        .await;
        assert_eq!(again["outcome"]["kind"], "no_candidates");
    }

    #[tokio::test]
    async fn optimize_stream_emits_progress_then_report() {
        let (store, state) = demo_state();
        let response = handle_optimize_stream(
            State(state.clone()),
            Ok(Json(PlacementRequest::default())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let frames = sse_frames(response).await;
        let kinds: Vec<&str> = frames
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(
            kinds,
            [
                "RunStarted",
                "BottlePlaced",
                "BottlePlaced",
                "BottlePlaced",
                "Finished",
                "Report"
            ]
        );
        assert_eq!(frames[0]["candidates"], 3);
        assert_eq!(frames[4]["placed"], 3);
        let report = &frames[5]["report"];
        assert_eq!(report["assignments"].as_array().map(Vec::len), Some(3));
        assert_eq!(report["status"]["level"], "success");
        assert!(store.bottle(&BottleId::from("b-8")).unwrap().is_placed());

        let response = handle_optimize_stream(
            State(state),
            Ok(Json(PlacementRequest {
                location_ids: Some(vec![LocationId::from("attic")]),
                ..Default::default()
            })),
        )
        .await;
        let frames = sse_frames(response).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "Failed");
        assert_eq!(frames[0]["error"], "Not found");
    }

    #[tokio::test]
    async fn occupancy_and_position_lookup() {
        let (_, state) = demo_state();
        let response =
            handle_location_occupancy(State(state.clone()), Path("cave-a".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["capacity"], 6);
        assert_eq!(body["placed"], 4);

        let response =
            handle_location_occupancy(State(state.clone()), Path("attic".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(
            handle_position_bottle(State(state.clone()), Path("cave-a-1-3".to_string())).await,
        )
        .await;
        assert_eq!(body["bottle"]["id"], "b-3");
        assert_eq!(body["bottle"]["wine"]["color"], "white");

        let body =
            body_json(handle_position_bottle(State(state), Path("fridge-2-4".to_string())).await)
                .await;
        assert!(body["bottle"].is_null());
    }

    #[tokio::test]
    async fn status_change_frees_position() {
        let (store, state) = demo_state();
        let request = StatusChangeRequest {
            status: BottleStatus::Consumed,
            date: NaiveDate::from_ymd_opt(2025, 12, 24),
        };
        let response = handle_change_status(
            State(state.clone()),
            Path("b-1".to_string()),
            Ok(Json(request)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "consumed");
        assert!(body["position_id"].is_null());
        assert!(!store.bottle(&BottleId::from("b-1")).unwrap().is_placed());

        let request = StatusChangeRequest {
            status: BottleStatus::Gifted,
            date: None,
        };
        let response =
            handle_change_status(State(state), Path("b-1".to_string()), Ok(Json(request))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unplace_unknown_bottle_is_not_found() {
        let (_, state) = demo_state();
        let response = handle_unplace_bottle(State(state.clone()), Path("b-2".to_string())).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = handle_unplace_bottle(State(state), Path("nope".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
