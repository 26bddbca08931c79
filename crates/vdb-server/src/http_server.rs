use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use vdb_core::{Document, FilterExpr, FilterOp, IndexKind};

use crate::error::ServerError;
use crate::node::Node;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/insert", post(insert))
        .route("/upsert", post(upsert))
        .route("/query", post(query))
        .route("/admin/snapshot", post(admin_snapshot))
        .route("/admin/setLeader", post(admin_set_leader))
        .route("/admin/addFollower", post(admin_add_follower))
        .route("/admin/listNode", get(admin_list_node))
        .route("/admin/getNode", get(admin_get_node))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(node)
}

#[derive(Deserialize)]
struct FilterBody {
    #[serde(rename = "fieldName")]
    field_name: String,
    op: String,
    value: i64,
}

#[derive(Deserialize)]
struct SearchRequest {
    vectors: Vec<f32>,
    k: usize,
    #[serde(rename = "indexType")]
    index_type: String,
    #[serde(default)]
    filter: Option<FilterBody>,
    #[serde(default)]
    ef_search: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    #[serde(rename = "retCode")]
    ret_code: i32,
    vectors: Vec<u64>,
    distances: Vec<f32>,
}

async fn search(
    State(node): State<Arc<Node>>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ServerError> {
    let index_type = IndexKind::parse(&body.index_type)
        .ok_or_else(|| ServerError::BadRequest(format!("unknown indexType '{}'", body.index_type)))?;
    let filter = match body.filter {
        Some(f) => {
            let op = FilterOp::parse(&f.op)
                .ok_or_else(|| ServerError::BadRequest(format!("unknown filter op '{}'", f.op)))?;
            Some(FilterExpr { field: f.field_name, op, value: f.value })
        }
        None => None,
    };

    let (ids, distances) = node.db.search(
        index_type,
        &body.vectors,
        body.k,
        body.ef_search,
        filter.as_ref(),
    )?;

    Ok(Json(SearchResponse { ret_code: 0, vectors: ids, distances }))
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(rename = "retCode")]
    ret_code: i32,
}

/// Best-effort, non-replicated fast path direct to the local index —
/// useful for bulk local loading, never durable or cluster-visible until
/// the next snapshot.
async fn insert(
    State(node): State<Arc<Node>>,
    Json(body): Json<Value>,
) -> Result<Json<StatusResponse>, ServerError> {
    let document = Document::new(body);
    let id = document
        .id()
        .ok_or_else(|| ServerError::BadRequest("missing id".into()))?;
    let index_type = document
        .index_type()
        .and_then(IndexKind::parse)
        .unwrap_or(IndexKind::Flat);
    let vector = document
        .vectors()
        .ok_or_else(|| ServerError::BadRequest("missing vectors".into()))?;

    node.db.registry_insert(id, &vector, index_type)?;
    Ok(Json(StatusResponse { ret_code: 0 }))
}

/// The durable, replicated write path: goes through consensus and only
/// responds once the entry has committed, so a 200 here means every node
/// that is or becomes leader will eventually apply it.
async fn upsert(
    State(node): State<Arc<Node>>,
    Json(body): Json<Value>,
) -> Result<Json<StatusResponse>, ServerError> {
    let payload = serde_json::to_string(&body).map_err(|err| ServerError::BadRequest(err.to_string()))?;
    node.replication.append(payload).await?;
    Ok(Json(StatusResponse { ret_code: 0 }))
}

#[derive(Deserialize)]
struct QueryRequest {
    id: u64,
}

async fn query(
    State(node): State<Arc<Node>>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<Value>, ServerError> {
    match node.db.query(body.id)? {
        Some(document) => Ok(Json(json!({ "retCode": 0, "document": document.0 }))),
        None => Ok(Json(json!({ "retCode": 404, "msg": "not found" }))),
    }
}

async fn admin_snapshot(State(node): State<Arc<Node>>) -> Result<Json<StatusResponse>, ServerError> {
    node.take_snapshot()?;
    Ok(Json(StatusResponse { ret_code: 0 }))
}

async fn admin_set_leader(State(node): State<Arc<Node>>) -> Result<Json<StatusResponse>, ServerError> {
    node.replication.enable_election_timeout().await;
    Ok(Json(StatusResponse { ret_code: 0 }))
}

#[derive(Deserialize)]
struct AddFollowerRequest {
    #[serde(rename = "nodeId")]
    node_id: u64,
    endpoint: String,
}

async fn admin_add_follower(
    State(node): State<Arc<Node>>,
    Json(body): Json<AddFollowerRequest>,
) -> Result<Json<StatusResponse>, ServerError> {
    node.replication.add_server(body.node_id, body.endpoint).await?;
    Ok(Json(StatusResponse { ret_code: 0 }))
}

async fn admin_list_node(State(node): State<Arc<Node>>) -> Json<Value> {
    let nodes = node.replication.list_nodes().await;
    Json(json!({ "retCode": 0, "nodes": nodes }))
}

async fn admin_get_node(State(node): State<Arc<Node>>) -> Json<Value> {
    let status = node.replication.self_status().await;
    Json(json!({ "retCode": 0, "node": status }))
}

/// Liveness probe only — deliberately never touches the database or
/// replication core, so it stays responsive even while a node is mid
/// WAL replay or blocked on a durability fault.
async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::{Args, NodeConfig};

    async fn test_node() -> Arc<Node> {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::load(&Args {
            config: dir.path().join("missing.conf"),
            node_id: Some(1),
            http_port: None,
        })
        .unwrap();
        config.db_path = dir.path().join("db");
        config.dimension = 4;
        // Keep the directory alive for the duration of the test node.
        std::mem::forget(dir);
        Arc::new(Node::start(config).await.unwrap())
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn healthz_never_touches_the_database() {
        let node = test_node().await;
        let app = router(node);
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn upsert_then_query_round_trips_through_the_http_surface() {
        let node = test_node().await;
        let app = router(node);

        let upsert_body = json!({"id": 1, "vectors": [1.0, 0.0, 0.0, 0.0], "category": 7});
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upsert")
                    .header("content-type", "application/json")
                    .body(Body::from(upsert_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"id": 1}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["document"]["category"], 7);
    }

    #[tokio::test]
    async fn search_with_unknown_index_type_is_a_bad_request() {
        let node = test_node().await;
        let app = router(node);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/search")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({"vectors": [1.0,0.0,0.0,0.0], "k": 1, "indexType": "BOGUS"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
