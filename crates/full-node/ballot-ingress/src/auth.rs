//! Authentication for the worker-mode HTTP protocol (spec §6): each request
//! carries `addr`, `token`, and `name` query parameters identifying the
//! remote prover. The concrete token/ban store is pluggable so the node
//! crate can back it with whatever operator-configured allowlist it likes.

/// The outcome of checking a worker's credentials against the configured
/// allowlist, mapped directly onto the wire's `401`/`403` split (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerAuthDecision {
    /// The token is valid and the address is not banned.
    Allowed,
    /// The token does not match any configured worker.
    BadToken,
    /// The token is valid but the address has been banned.
    Banned,
}

/// Checks worker credentials. Implementations are expected to be cheap and
/// non-blocking; the HTTP handler calls this on every request.
pub trait WorkerAuth: Send + Sync {
    /// Evaluates `token`/`addr` against the configured allowlist.
    fn check(&self, token: &str, addr: &str) -> WorkerAuthDecision;
}

/// A [`WorkerAuth`] backed by a fixed shared-secret token; every address that
/// presents it is allowed. Suitable for a single trusted pool of workers.
pub struct SharedSecretAuth {
    token: String,
}

impl SharedSecretAuth {
    /// Creates an authenticator that accepts exactly `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl WorkerAuth for SharedSecretAuth {
    fn check(&self, token: &str, _addr: &str) -> WorkerAuthDecision {
        if token == self.token {
            WorkerAuthDecision::Allowed
        } else {
            WorkerAuthDecision::BadToken
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_secret_accepts_only_the_configured_token() {
        let auth = SharedSecretAuth::new("s3cr3t");
        assert_eq!(auth.check("s3cr3t", "0xabc"), WorkerAuthDecision::Allowed);
        assert_eq!(auth.check("wrong", "0xabc"), WorkerAuthDecision::BadToken);
    }
}
