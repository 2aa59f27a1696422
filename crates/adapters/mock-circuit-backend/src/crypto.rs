//! Ballot signature structural validation (spec §4.4 step 3 "well-formed
//! signature"). The actual ECDSA verification is emulated inside the real
//! vote-verification circuit (spec §4.4 step 5 "secp256k1 signature"); this
//! module only does the off-circuit structural check the Ballot Worker runs
//! before it ever touches the circuit.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use sequencer_interface::SequencerError;

type Result<T> = std::result::Result<T, SequencerError>;

/// Parses `public_key` and `signature` and checks the signature is
/// well-formed (in range, `s` low) for `message` under secp256k1. Does not
/// attempt to match the real circuit's ECDSA recovery; that happens
/// in-circuit.
pub fn check_well_formed(
    public_key: &[u8; 33],
    signature: &[u8; 64],
    message_hash: &[u8; 32],
) -> Result<()> {
    let secp = Secp256k1::verification_only();

    let pk = PublicKey::from_slice(public_key)
        .map_err(|e| SequencerError::StructuralInvalid(format!("bad public key: {e}")))?;
    let sig = Signature::from_compact(signature)
        .map_err(|e| SequencerError::StructuralInvalid(format!("bad signature encoding: {e}")))?;
    let msg = Message::from_slice(message_hash)
        .map_err(|e| SequencerError::StructuralInvalid(format!("bad message digest: {e}")))?;

    secp.verify_ecdsa(&msg, &sig, &pk)
        .map_err(|e| SequencerError::StructuralInvalid(format!("signature does not verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::SecretKey;

    #[test]
    fn accepts_a_genuine_signature() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);
        let digest = [9u8; 32];
        let msg = Message::from_slice(&digest).unwrap();
        let sig = secp.sign_ecdsa(&msg, &secret);

        check_well_formed(&public.serialize(), &sig.serialize_compact(), &digest).unwrap();
    }

    #[test]
    fn rejects_a_signature_over_the_wrong_message() {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[7u8; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);
        let sig = secp.sign_ecdsa(&Message::from_slice(&[9u8; 32]).unwrap(), &secret);

        assert!(check_well_formed(&public.serialize(), &sig.serialize_compact(), &[1u8; 32]).is_err());
    }
}
