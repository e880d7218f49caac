//! Batch jobs behind the `ledger-node` subcommands.
//!
//! Each job builds fresh trees from a request file, runs the engine and
//! returns the verifier input. Nothing is persisted between runs.

use batch_circuit::{
    ChainInput, ChainVerifier, ClaimFilter, FilterChainInput, MintQueue, MintRequest,
    ReplayVerifier, TransitionEngine, WithdrawRequest, WitnessChain,
};
use crypto::ecdsa::EcdsaSecretKey;
use crypto::traits::{SigningKey, VerifyKey};
use crypto::FieldElement;
use serde::{Deserialize, Serialize};
use state_history::SnapshotHistory;
use state_merkle::{AccountEntry, MerkleTree};
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::{NodeError, NodeResult};

/// Mint job: queued requests, optionally on top of an existing ledger.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MintBatch {
    #[serde(default)]
    pub ledger: Vec<AccountEntry>,
    pub requests: Vec<MintRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WithdrawBatch {
    pub ledger: Vec<AccountEntry>,
    pub requests: Vec<WithdrawRequest>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimLocation {
    pub block_number: usize,
    pub state_index: usize,
}

/// Filter job: snapshots in block order and the posted claims.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterBatch {
    pub snapshots: Vec<Vec<AccountEntry>>,
    pub claims: Vec<ClaimLocation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExport {
    pub secret_key: String,
    pub public_key: String,
    pub address: FieldElement,
}

fn ledger_tree(config: &LedgerConfig, entries: &[AccountEntry]) -> NodeResult<MerkleTree> {
    Ok(MerkleTree::with_leaves(
        config.ledger_depth,
        config.zero.clone(),
        entries.iter().map(AccountEntry::leaf),
    )?)
}

pub fn run_mint(config: &LedgerConfig, batch: &MintBatch) -> NodeResult<ChainInput> {
    let mut engine = TransitionEngine::with_ledger(ledger_tree(config, &batch.ledger)?);
    let mut queue = MintQueue::new(config.queue_depth, config.zero.clone(), batch.requests.clone())?;
    let steps = engine.apply_mint(&mut queue)?;
    let chain = WitnessChain::from_steps(steps)?;
    info!(steps = chain.len(), ledger_root = %engine.root(), "mint chain ready");
    Ok(chain.to_input())
}

pub fn run_withdraw(config: &LedgerConfig, batch: &WithdrawBatch) -> NodeResult<ChainInput> {
    let mut engine = TransitionEngine::with_ledger(ledger_tree(config, &batch.ledger)?);
    let steps = engine.apply_withdrawals(&batch.requests)?;
    let chain = WitnessChain::from_steps(steps)?;
    info!(steps = chain.len(), ledger_root = %engine.root(), "withdraw chain ready");
    Ok(chain.to_input())
}

pub fn run_filter(config: &LedgerConfig, batch: &FilterBatch) -> NodeResult<FilterChainInput> {
    let mut history =
        SnapshotHistory::new(config.history_depth, config.snapshot_depth, config.zero.clone())?;
    for entries in &batch.snapshots {
        history.append_snapshot(entries.iter().cloned())?;
    }
    let claims = batch
        .claims
        .iter()
        .map(|location| history.claim(location.block_number, location.state_index))
        .collect::<Result<Vec<_>, _>>()?;
    let outcome = ClaimFilter::new(&history, config.filtered_depth, config.zero.clone()).run(&claims)?;
    info!(
        claims = claims.len(),
        accepted = outcome.accepted.len(),
        "filter chain ready"
    );
    Ok(outcome.input)
}

/// Replay a chain input and return its final state.
pub fn verify_chain(config: &LedgerConfig, input: &ChainInput) -> NodeResult<Vec<FieldElement>> {
    Ok(ReplayVerifier::new(config.zero.clone()).verify(input)?)
}

pub fn keygen(seed: &[u8]) -> KeyExport {
    let secret = EcdsaSecretKey::generate_deterministic(seed);
    let public = secret.verify_key();
    KeyExport {
        secret_key: hex::encode(secret.to_bytes()),
        public_key: hex::encode(public.to_bytes()),
        address: public.address(),
    }
}

pub fn parse_secret_key(text: &str) -> NodeResult<EcdsaSecretKey> {
    let bytes = hex::decode(text.trim().trim_start_matches("0x"))
        .map_err(|err| NodeError::InvalidInput(format!("secret key must be hex: {err}")))?;
    Ok(EcdsaSecretKey::from_bytes(&bytes)?)
}

pub fn sign_withdrawal(
    secret: &EcdsaSecretKey,
    leaf_index: usize,
    range_start: FieldElement,
    range_end: FieldElement,
    receiver: FieldElement,
) -> NodeResult<WithdrawRequest> {
    Ok(WithdrawRequest::signed(
        secret,
        leaf_index,
        range_start,
        range_end,
        receiver,
    )?)
}
