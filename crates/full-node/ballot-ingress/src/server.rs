//! The worker-mode HTTP protocol (spec §6): a master sequencer hands out
//! Pending ballots to remote provers and accepts back verified ballots,
//! mirroring the teacher's [`axum`] router construction (state behind an
//! `Arc`, routes registered on a path prefix, errors folded into a JSON
//! envelope via `sequencer_rest_utils`).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sequencer_interface::model::VerifiedBallot;
use sequencer_interface::traits::{ProcessStateLookup, QueueStore, VoteIdTracker};
use sequencer_interface::status::VoteIdStatus;
use sequencer_interface::ProcessId;
use sequencer_rest_utils::{errors, json_obj, preconfigured_router_layers, ApiResult, ErrorObject, Path};
use sequencer_state::ProcessRegistry;
use serde::{Deserialize, Serialize};

use crate::auth::{WorkerAuth, WorkerAuthDecision};

/// The `addr`/`token`/`name` query parameters carried by every worker-mode
/// request (spec §6).
#[derive(Debug, Deserialize)]
pub struct WorkerQuery {
    /// The worker's self-reported network address, used for ban checks.
    pub addr: String,
    /// The shared-secret token authenticating the worker.
    pub token: String,
    /// A human-readable worker name, logged only.
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize)]
struct SubmitOutcome {
    success_count: u32,
    failed_count: u32,
}

struct Inner {
    queues: Arc<dyn QueueStore>,
    vote_ids: Arc<dyn VoteIdTracker>,
    processes: Arc<ProcessRegistry>,
    process_lookup: Arc<dyn ProcessStateLookup>,
    auth: Arc<dyn WorkerAuth>,
}

/// The worker-mode HTTP server (spec §6). Cheap to clone; every clone shares
/// the same underlying state.
#[derive(Clone)]
pub struct WorkerServer(Arc<Inner>);

impl WorkerServer {
    /// Builds a new server over the given collaborators.
    pub fn new(
        queues: Arc<dyn QueueStore>,
        vote_ids: Arc<dyn VoteIdTracker>,
        processes: Arc<ProcessRegistry>,
        process_lookup: Arc<dyn ProcessStateLookup>,
        auth: Arc<dyn WorkerAuth>,
    ) -> Self {
        Self(Arc::new(Inner {
            queues,
            vote_ids,
            processes,
            process_lookup,
            auth,
        }))
    }

    /// Builds the [`Router`] serving the worker-mode protocol under `/`.
    pub fn axum_router(self) -> Router {
        let router = Router::new()
            .route("/workers/:sequencer_uuid", get(fetch_job).post(submit_job))
            .route("/processes/:process_id_hex", get(get_process))
            .with_state(self);
        preconfigured_router_layers(router)
    }
}

fn check_auth(inner: &Inner, query: &WorkerQuery) -> Result<(), Response> {
    match inner.auth.check(&query.token, &query.addr) {
        WorkerAuthDecision::Allowed => Ok(()),
        WorkerAuthDecision::BadToken => Err(ErrorObject {
            status: StatusCode::UNAUTHORIZED,
            title: "invalid worker token".to_string(),
            details: json_obj!({}),
        }
        .into_response()),
        WorkerAuthDecision::Banned => Err(ErrorObject {
            status: StatusCode::FORBIDDEN,
            title: "worker address is banned".to_string(),
            details: json_obj!({ "addr": query.addr }),
        }
        .into_response()),
    }
}

fn now_holder(addr: &str) -> [u8; 16] {
    let mut holder = [0u8; 16];
    let bytes = addr.as_bytes();
    let n = bytes.len().min(16);
    holder[..n].copy_from_slice(&bytes[..n]);
    holder
}

/// `GET /workers/:sequencer_uuid` — hands out the oldest unreserved Pending
/// ballot as a borsh-encoded octet-stream body, or `204` when there is no job
/// (spec §6: the sentinel `WorkerNotAvailable` maps to `204`).
async fn fetch_job(
    State(server): State<WorkerServer>,
    Path(_sequencer_uuid): Path<String>,
    Query(query): Query<WorkerQuery>,
) -> Response {
    let inner = &server.0;
    if let Err(resp) = check_auth(inner, &query) {
        return resp;
    }

    match inner.queues.next_unreserved_pending(now_holder(&query.addr)).await {
        Ok(reserved) => match borsh::to_vec(&reserved.item) {
            Ok(bytes) => (StatusCode::OK, bytes).into_response(),
            Err(e) => errors::internal_server_error_response_500(e),
        },
        Err(sequencer_interface::SequencerError::NoMoreElements) => {
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::internal_server_error_response_500(e),
    }
}

/// `POST /workers/:sequencer_uuid` — accepts a borsh-encoded
/// [`VerifiedBallot`] produced by the remote worker, pushes it onto the
/// `verified` queue, and reports `{success_count, failed_count}` (spec §6).
async fn submit_job(
    State(server): State<WorkerServer>,
    Path(_sequencer_uuid): Path<String>,
    Query(query): Query<WorkerQuery>,
    body: axum::body::Bytes,
) -> Response {
    let inner = &server.0;
    if let Err(resp) = check_auth(inner, &query) {
        return resp;
    }

    let ballot: VerifiedBallot = match borsh::from_slice(&body) {
        Ok(b) => b,
        Err(e) => return errors::bad_request_400("malformed VerifiedBallot artifact", e),
    };
    let vote_id = ballot.ballot.vote_id;

    let mut success_count = 0u32;
    let mut failed_count = 0u32;
    match inner.queues.push_verified(ballot).await {
        Ok(_) => {
            if inner.vote_ids.set(vote_id, VoteIdStatus::Verified).await.is_ok() {
                success_count += 1;
            } else {
                failed_count += 1;
            }
        }
        Err(_) => failed_count += 1,
    }

    axum::Json(SubmitOutcome {
        success_count,
        failed_count,
    })
    .into_response()
}

/// `GET /processes/:process_id_hex` — returns the JSON-encoded process state.
async fn get_process(
    State(server): State<WorkerServer>,
    Path(process_id_hex): Path<String>,
) -> ApiResult<sequencer_interface::model::ProcessState> {
    let inner = &server.0;
    let trimmed = process_id_hex.strip_prefix("0x").unwrap_or(&process_id_hex);
    let bytes = hex::decode(trimmed)
        .map_err(|e| errors::bad_request_400("invalid process id hex encoding", e))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| errors::bad_request_400("process id must be 32 bytes", "wrong length"))?;
    let process_id = ProcessId::new(array);

    if !inner.processes.exists(process_id) {
        return Err(errors::not_found_404("Process", process_id));
    }
    let state = inner
        .process_lookup
        .get(process_id)
        .ok_or_else(|| errors::not_found_404("Process", process_id))?;

    Ok(state.into())
}
