use crate::db;
use crate::errors::{ApiError, PipelineError};
use crate::health::HealthReport;
use crate::mint::MintRequest;
use crate::models::*;
use crate::signature::{challenge_message, new_challenge_nonce, verify_challenge};
use crate::state::AppState;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use learnchain_zk::types::{CircuitType, PublicInputs};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/v1/achievements/mint", post(mint_achievement))
        .route("/api/v1/proofs/verify", post(verify_proof))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/network/health", get(network_health))
        .route("/api/v1/challenges", post(create_challenge))
        .route("/api/v1/mints/:id", get(get_mint))
        .route("/api/v1/zk/vk/:circuit", get(get_vk))
        .merge(protected_routes)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(provided_key) = headers.get("X-API-KEY") {
        if provided_key == state.settings.api_key.as_str() {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!("unauthorized access attempt");
    Err(StatusCode::UNAUTHORIZED)
}

async fn network_health(State(state): State<AppState>) -> Result<Json<HealthReport>, ApiError> {
    Ok(Json(state.health.check_health().await?))
}

async fn create_challenge(
    State(state): State<AppState>,
    Json(req): Json<ChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let nonce = new_challenge_nonce();
    let ttl = i64::try_from(state.settings.challenge_ttl.as_secs()).unwrap_or(i64::MAX / 2);
    let expires_at = Utc::now() + chrono::Duration::seconds(ttl);

    db::insert_challenge(&state.db, &nonce, &format!("{:?}", req.address), expires_at).await?;

    Ok(Json(ChallengeResponse {
        message: challenge_message(&state.settings.app_name, &nonce),
        nonce,
        expires_at,
    }))
}

async fn mint_achievement(
    State(state): State<AppState>,
    Json(req): Json<MintRequest>,
) -> Result<(StatusCode, Json<MintResponse>), ApiError> {
    // A signed claim must answer a live challenge issued to the same address.
    if let Some(sig) = &req.claim.signature {
        if !verify_challenge(&state.settings.app_name, req.claim.student, &sig.nonce, &sig.signature) {
            return Err(ApiError::Unauthorized("challenge signature does not match the student address".into()));
        }
        let address = format!("{:?}", req.claim.student);
        if !db::consume_challenge(&state.db, &sig.nonce, &address, Utc::now()).await? {
            return Err(ApiError::Unauthorized("challenge unknown, expired or already used".into()));
        }
    }

    let report = state.mint.execute(&req).await?;

    let (status, retryable) = match report.error {
        None => (StatusCode::OK, false),
        Some(e) => {
            let retryable = e.is_retryable();
            (ApiError::from(e).status(), retryable)
        }
    };

    // A retryable failure leaves the challenge usable for the retry.
    if retryable {
        if let Some(sig) = &req.claim.signature {
            db::release_challenge(&state.db, &sig.nonce).await?;
        }
    }

    Ok((
        status,
        Json(MintResponse {
            mint_id: report.record.id,
            commitment_hash: report.record.commitment_hash,
            metadata_uri: report.record.metadata_uri,
            metadata_url: report.gateway_url,
            outcome: report.record.outcome,
            retryable,
        }),
    ))
}

async fn verify_proof(
    State(state): State<AppState>,
    Json(req): Json<VerifyProofRequest>,
) -> Result<Json<VerifyProofResponse>, ApiError> {
    let proof = req
        .proof
        .to_proof()
        .map_err(|e| ApiError::BadRequest(format!("invalid proof: {e}")))?;
    let public_inputs = PublicInputs::from_decimal_strings(req.circuit, &req.public_signals)
        .map_err(|e| ApiError::BadRequest(format!("invalid public signals: {e}")))?;

    let valid = state.verifier.verify(&proof, &public_inputs, req.circuit, req.mode).await?;

    Ok(Json(VerifyProofResponse { valid, circuit: req.circuit, mode: req.mode }))
}

async fn get_mint(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<db::MintRecord>, ApiError> {
    let Some(record) = db::get_mint(&state.db, id).await? else {
        return Err(ApiError::NotFound("mint not found".to_string()));
    };
    Ok(Json(record))
}

async fn get_vk(State(state): State<AppState>, Path(circuit): Path<CircuitType>) -> Result<Json<Value>, ApiError> {
    let vk = state
        .prover
        .export_verifying_key(circuit)
        .await
        .map_err(|e| ApiError::from(PipelineError::from(e)))?;
    Ok(Json(vk))
}
