//! The worker-mode HTTP protocol (spec §6, "Optional HTTP between a master
//! sequencer and remote workers"): `GET`/`POST /workers/{sequencer-uuid}` for
//! job dispatch and result submission, and `GET /processes/{process-id-hex}`
//! for status polling. The public ballot-ingestion API is explicitly out of
//! scope (spec §1); this crate only ever sees ballots that already passed
//! through it and landed in the `pending` queue.

pub mod auth;
pub mod server;

pub use auth::{SharedSecretAuth, WorkerAuth, WorkerAuthDecision};
pub use server::{WorkerQuery, WorkerServer};
