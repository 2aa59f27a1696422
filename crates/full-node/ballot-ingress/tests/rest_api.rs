//! End-to-end coverage of the worker-mode HTTP protocol (spec §6) against a
//! real, tempdir-backed [`sequencer_state::SequencerState`].

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use sequencer_interface::traits::ProcessStateLookup;
use ballot_ingress::{SharedSecretAuth, WorkerServer};
use sequencer_interface::model::{
    Ballot, CensusProof, EncryptedBallot, ProcessState, RecursiveProof, VerifiedBallot,
    WitnessedProof,
};
use sequencer_interface::{Address, ProcessId, VoteId};
use sequencer_state::SequencerState;
use tempfile::TempDir;
use tower::ServiceExt;

struct NoProcesses;
impl ProcessStateLookup for NoProcesses {
    fn get(&self, _process_id: ProcessId) -> Option<ProcessState> {
        None
    }
}

fn sample_ballot(process_id: ProcessId, vote_id: VoteId) -> Ballot {
    Ballot {
        process_id,
        vote_id,
        address: Address::new([7u8; 32]),
        weight: 1,
        encrypted_ballot: EncryptedBallot {
            ciphertexts: vec![[0u8; 32]],
        },
        signature: [0u8; 64],
        voter_public_key: [2u8; 33],
        census_proof: CensusProof {
            bytes: vec![],
            is_dummy: true,
        },
        inner_ballot_proof: vec![],
    }
}

async fn test_app() -> (TempDir, axum::Router) {
    let dir = TempDir::new().unwrap();
    let state = SequencerState::open(dir.path()).unwrap();
    let process_id = ProcessId::new([1u8; 32]);
    state.processes.add(process_id, 0).unwrap();

    let queues: Arc<dyn sequencer_interface::traits::QueueStore> = Arc::new(state.queues);
    let vote_ids: Arc<dyn sequencer_interface::traits::VoteIdTracker> = state.vote_ids;
    let processes = Arc::new(state.processes);
    let server = WorkerServer::new(
        queues,
        vote_ids,
        processes,
        Arc::new(NoProcesses),
        Arc::new(SharedSecretAuth::new("s3cr3t")),
    );
    (dir, server.axum_router())
}

#[tokio::test]
async fn fetch_job_rejects_a_bad_token() {
    let (_dir, app) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/workers/abc?addr=w1&token=wrong&name=w1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn fetch_job_returns_204_when_the_pending_queue_is_empty() {
    let (_dir, app) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/workers/abc?addr=w1&token=s3cr3t&name=w1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn full_round_trip_fetches_and_submits_a_ballot() {
    let dir = TempDir::new().unwrap();
    let state = SequencerState::open(dir.path()).unwrap();
    let process_id = ProcessId::new([1u8; 32]);
    state.processes.add(process_id, 0).unwrap();
    let vote_id = VoteId::new([9u8; 32]);
    let ballot = sample_ballot(process_id, vote_id);
    state.queues.push_pending(ballot.clone()).await.unwrap();
    state
        .vote_ids
        .set(vote_id, sequencer_interface::status::VoteIdStatus::Pending)
        .await
        .unwrap();

    let queues: Arc<dyn sequencer_interface::traits::QueueStore> = Arc::new(state.queues);
    let vote_ids: Arc<dyn sequencer_interface::traits::VoteIdTracker> = state.vote_ids;
    let processes = Arc::new(state.processes);
    let server = WorkerServer::new(
        queues.clone(),
        vote_ids.clone(),
        processes,
        Arc::new(NoProcesses),
        Arc::new(SharedSecretAuth::new("s3cr3t")),
    );
    let app = server.axum_router();

    let fetch_response = app
        .clone()
        .oneshot(
            Request::get("/workers/abc?addr=w1&token=s3cr3t&name=w1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fetch_response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(fetch_response.into_body(), usize::MAX)
        .await
        .unwrap();
    let fetched: Ballot = borsh::from_slice(&body).unwrap();
    assert_eq!(fetched.vote_id, vote_id);

    let verified = VerifiedBallot {
        ballot: fetched,
        proof: WitnessedProof {
            proof: RecursiveProof {
                bytes: vec![],
                is_dummy: false,
            },
            inputs_hash: [0u8; 32],
        },
        census_proof: CensusProof {
            bytes: vec![],
            is_dummy: true,
        },
    };
    let submit_response = app
        .oneshot(
            Request::post("/workers/abc?addr=w1&token=s3cr3t&name=w1")
                .body(Body::from(borsh::to_vec(&verified).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(submit_response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(submit_response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success_count"], 1);
    assert_eq!(json["failed_count"], 0);
}

#[tokio::test]
async fn get_process_404s_for_an_unregistered_process() {
    let (_dir, app) = test_app().await;
    let response = app
        .oneshot(
            Request::get(format!("/processes/{}", hex::encode([5u8; 32])))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
