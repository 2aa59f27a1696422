//! Minimal arithmetic circuits standing in for the four real Groth16 circuits
//! the spec treats as a black box (spec §1 Out of scope, §9): each binds its
//! public inputs into the constraint system via an equality-checked witness
//! mirror, so `Groth16::verify` rejects a tampered public input the same way
//! the real circuits would.
//!
//! The batch-shaped circuits (aggregation, state-transition) fix their slot
//! counts at setup time; a proving call with a mismatched shape is a usage
//! error on the caller's part, not something these circuits can route around.

use ark_bls12_381::Fr;
use ark_relations::r1cs::{lc, ConstraintSynthesizer, ConstraintSystemRef, SynthesisError, Variable};

/// Fixed aggregator batch width this backend was set up for (spec §3
/// `AggregatorBatch`: "Exactly `B` slots").
pub const BATCH_SLOTS: usize = 8;

/// Fixed number of 32-byte limbs the state-transition circuit binds for the
/// blob's KZG commitment (spec §4.8 "verifier-friendly limb encoding").
pub const COMMITMENT_LIMBS: usize = 2;

fn bind(cs: &ConstraintSystemRef<Fr>, value: Option<Fr>) -> Result<Variable, SynthesisError> {
    let public = cs.new_input_variable(|| value.ok_or(SynthesisError::AssignmentMissing))?;
    let mirror = cs.new_witness_variable(|| value.ok_or(SynthesisError::AssignmentMissing))?;
    cs.enforce_constraint(lc!() + public, lc!() + Variable::One, lc!() + mirror)?;
    Ok(public)
}

/// Binds `{IsValid, InputsHash}` and constrains `IsValid` to be boolean
/// (spec §4.4 step 6, §4.5 "re-verifies... against IsValid, InputsHash").
#[derive(Clone, Debug, Default)]
pub struct VoteCircuit {
    pub is_valid: Option<Fr>,
    pub inputs_hash: Option<Fr>,
}

impl ConstraintSynthesizer<Fr> for VoteCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let is_valid = bind(&cs, self.is_valid)?;
        bind(&cs, self.inputs_hash)?;
        cs.enforce_constraint(lc!() + is_valid, lc!() + Variable::One - is_valid, lc!())?;
        Ok(())
    }
}

/// Binds the `BATCH_SLOTS` per-slot inputs-hashes and the resulting
/// `batch_inputs_hash`, constraining the latter to equal their sum (spec
/// §4.5 "recursively combines... into one aggregation proof").
#[derive(Clone, Debug, Default)]
pub struct AggregationCircuit {
    pub slot_hashes: [Option<Fr>; BATCH_SLOTS],
    pub batch_inputs_hash: Option<Fr>,
}

impl ConstraintSynthesizer<Fr> for AggregationCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let mut sum_value = Some(Fr::from(0u64));
        let mut sum_lc = lc!();
        for slot in self.slot_hashes {
            let var = bind(&cs, slot)?;
            sum_lc = sum_lc + var;
            sum_value = sum_value.zip(slot).map(|(acc, s)| acc + s);
        }
        let batch_hash = bind(&cs, self.batch_inputs_hash)?;
        let total = cs.new_witness_variable(|| sum_value.ok_or(SynthesisError::AssignmentMissing))?;
        cs.enforce_constraint(sum_lc, lc!() + Variable::One, lc!() + total)?;
        cs.enforce_constraint(lc!() + total, lc!() + Variable::One, lc!() + batch_hash)?;
        Ok(())
    }
}

/// Binds the pre/post state roots, the claimed blob evaluation, and the
/// commitment limbs (spec §4.6 step 9 "targeting the Solidity verifier
/// encoding").
#[derive(Clone, Debug, Default)]
pub struct StateTransitionCircuit {
    pub root_before: Option<Fr>,
    pub root_after: Option<Fr>,
    pub claimed_evaluation: Option<Fr>,
    pub commitment_limbs: [Option<Fr>; COMMITMENT_LIMBS],
}

impl ConstraintSynthesizer<Fr> for StateTransitionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        bind(&cs, self.root_before)?;
        bind(&cs, self.root_after)?;
        bind(&cs, self.claimed_evaluation)?;
        for limb in self.commitment_limbs {
            bind(&cs, limb)?;
        }
        Ok(())
    }
}

/// Binds the finalized per-option tallies and their declared sum (spec §3
/// `VerifiedResults`).
#[derive(Clone, Debug, Default)]
pub struct ResultsCircuit {
    pub tally_sum: Option<Fr>,
}

impl ConstraintSynthesizer<Fr> for ResultsCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        bind(&cs, self.tally_sum)?;
        Ok(())
    }
}
