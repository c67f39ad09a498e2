//! Provably fair crash-point pipeline.
//!
//! A commitment hash over the hidden seed is published at round start; the
//! seed is revealed at crash time so anyone can recompute the hash and the
//! crash point. Everything here is pure and verifiable independently of the
//! running engine.

use crate::errors::{EngineError, EngineResult};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Crash points map onto [0, MAX_CRASH], floored at 1.0.
pub const MAX_CRASH: f64 = 100.0;

/// Modulo range for the digest prefix; fixed by the verification contract.
const CRASH_RANGE: u32 = 10_000;

const SEED_LEN: usize = 16;

/// Opaque random seed, generated once per round and never reused.
pub fn generate_seed() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SEED_LEN)
        .map(char::from)
        .collect()
}

fn check_inputs(seed: &str, round_id: u64) -> EngineResult<()> {
    if seed.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "Seed must be a non-empty string".to_string(),
        ));
    }
    if round_id == 0 {
        return Err(EngineError::InvalidInput(
            "Round ID must be a positive number".to_string(),
        ));
    }
    Ok(())
}

fn digest_hex(seed: &str, round_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}{}", seed, round_id).as_bytes());
    hex::encode(hasher.finalize())
}

/// Commitment hash published at round start, before the outcome is knowable.
pub fn commitment_hash(seed: &str, round_id: u64) -> EngineResult<String> {
    check_inputs(seed, round_id)?;
    Ok(digest_hex(seed, round_id))
}

/// Deterministic crash point for a round.
///
/// First 8 hex chars of SHA-256(seed + round_id) as an unsigned integer,
/// reduced mod 10000, mapped linearly onto [0, MAX_CRASH], floored at 1.0
/// and rounded to two decimals. Same inputs always yield the same output.
pub fn generate_crash_point(seed: &str, round_id: u64) -> EngineResult<f64> {
    check_inputs(seed, round_id)?;
    let digest = digest_hex(seed, round_id);
    // 8 hex chars always parse as u32
    let value = u32::from_str_radix(&digest[..8], 16)
        .map_err(|e| EngineError::InvalidInput(format!("Digest prefix not parseable: {}", e)))?;
    let value = value % CRASH_RANGE;
    let crash_point = (f64::from(value) / f64::from(CRASH_RANGE) * MAX_CRASH).max(1.0);
    Ok(round2(crash_point))
}

/// Recompute the commitment from a revealed seed and compare it to the hash
/// published at round start. This is the client-side half of the provably
/// fair contract.
pub fn verify_commitment(seed: &str, round_id: u64, published_hash: &str) -> EngineResult<bool> {
    let recomputed = commitment_hash(seed, round_id)?;
    Ok(recomputed.eq_ignore_ascii_case(published_hash))
}

/// Round to two decimal places, the resolution used for all published
/// multipliers and crash points.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
