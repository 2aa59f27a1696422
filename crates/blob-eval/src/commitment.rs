//! The KZG commitment / opening / cell-proof external contract (spec §6
//! "Blob / KZG external contracts"), implemented against `c-kzg`, the
//! reference EIP-4844/7594 library the spec's evaluation formula is defined
//! relative to.

use c_kzg::{Blob, Bytes32, Bytes48, KzgCommitment, KzgProof, KzgSettings};
use sequencer_interface::model::BlobSidecar;
use sequencer_interface::SequencerError;
use sha2::{Digest, Sha256};

type Result<T> = std::result::Result<T, SequencerError>;

/// Loaded trusted-setup parameters, constructed once at startup and treated
/// as immutable thereafter (spec §9 "Global mutable state").
pub struct KzgContext {
    settings: KzgSettings,
}

impl KzgContext {
    /// Loads the trusted setup from `path` (the standard c-kzg text format).
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let settings = KzgSettings::load_trusted_setup_file(path.as_ref())
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))?;
        Ok(Self { settings })
    }

    /// Commits to `blob`, whose 4096 cells are already the big-endian
    /// 32-byte encodings produced by [`crate::evaluation::fr_to_be_bytes`].
    pub fn commit(&self, blob_bytes: &[u8]) -> Result<KzgCommitment> {
        let blob = Blob::from_bytes(blob_bytes)
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))?;
        KzgCommitment::blob_to_kzg_commitment(&blob, &self.settings)
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))
    }

    /// Opens `blob` at `z`, returning the claimed evaluation `y` and the
    /// single EIP-4844 opening proof.
    pub fn open(&self, blob_bytes: &[u8], z: [u8; 32]) -> Result<([u8; 32], KzgProof)> {
        let blob = Blob::from_bytes(blob_bytes)
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))?;
        let z_bytes = Bytes32::from(z);
        let (proof, y) = KzgProof::compute_kzg_proof(&blob, &z_bytes, &self.settings)
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))?;
        Ok((*y.as_ref(), proof))
    }

    /// Produces the 128 EIP-7594 cell proofs for `blob`.
    pub fn cell_proofs(&self, blob_bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let blob = Blob::from_bytes(blob_bytes)
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))?;
        let (_cells, proofs) = c_kzg::KzgProof::compute_cells_and_kzg_proofs(&blob, &self.settings)
            .map_err(|e| SequencerError::BlobConstructionFailure(e.to_string()))?;
        Ok(proofs.iter().map(|p| p.to_bytes().as_ref().to_vec()).collect())
    }

    /// Builds the full sidecar: blob bytes plus cell proofs, falling back to
    /// a single opening proof when `eip7594` is false (spec §4.8).
    pub fn build_sidecar(
        &self,
        blob_bytes: Vec<u8>,
        z: [u8; 32],
        eip7594: bool,
    ) -> Result<(BlobSidecar, [u8; 32])> {
        let (y, single_proof) = self.open(&blob_bytes, z)?;
        let proofs = if eip7594 {
            self.cell_proofs(&blob_bytes)?
        } else {
            vec![single_proof.to_bytes().as_ref().to_vec()]
        };
        Ok((
            BlobSidecar {
                blob: blob_bytes,
                proofs,
            },
            y,
        ))
    }
}

/// `sha256(commitment)` with a leading `0x01` version byte (spec §6).
pub fn blob_version_hash(commitment: &Bytes48) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(commitment.as_ref());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out[0] = 0x01;
    out[1..].copy_from_slice(&digest[1..]);
    out
}
