//! External JSON shape consumed by the step verifier.
//!
//! Every integer is rendered as a decimal string. Field names follow the
//! verifier's input signals, hence the camel-case renames.

use crypto::limbs::{limbs_to_decimal, Limbs, LIMB_COUNT};
use crypto::FieldElement;
use serde::{Deserialize, Serialize};
use state_merkle::MerkleProof;

use crate::error::TransitionError;
use crate::witness::{MintStep, WithdrawStep};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRound {
    pub sender: String,
    pub recipient: String,
    pub leaf_coins: [String; 2],
    #[serde(rename = "mintPathElements")]
    pub mint_path_elements: Vec<String>,
    #[serde(rename = "mintPathIndices")]
    pub mint_path_indices: Vec<String>,
    #[serde(rename = "pathElements")]
    pub path_elements: Vec<String>,
    #[serde(rename = "pathIndices")]
    pub path_indices: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintChainInput {
    pub step_in: [String; 2],
    pub private_inputs: Vec<MintRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<[String; 2]>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRound {
    pub sender: String,
    pub recipient: String,
    pub leaf_coins: [String; 2],
    #[serde(rename = "pathElements")]
    pub path_elements: Vec<String>,
    #[serde(rename = "pathIndices")]
    pub path_indices: Vec<String>,
    pub r: [String; LIMB_COUNT],
    pub s: [String; LIMB_COUNT],
    pub msghash: [String; LIMB_COUNT],
    pub pubkey: [[String; LIMB_COUNT]; 2],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawChainInput {
    pub step_in: [String; 1],
    pub private_inputs: Vec<WithdrawRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<[String; 1]>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRound {
    pub next_claim_chain: [String; 2],
    #[serde(rename = "history_pathElements")]
    pub history_path_elements: Vec<String>,
    pub state_root: String,
    #[serde(rename = "filtered_pathElements")]
    pub filtered_path_elements: Vec<String>,
    pub address: String,
    pub first_coin: String,
    pub last_coin: String,
    pub block_number: String,
    #[serde(rename = "state_pathElements")]
    pub state_path_elements: Vec<String>,
    #[serde(rename = "state_pathIndex")]
    pub state_path_index: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChainInput {
    pub step_in: [String; 5],
    pub private_inputs: Vec<FilterRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<[String; 5]>,
}

/// Either transition chain, as read from or written to disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChainInput {
    Mint(MintChainInput),
    Withdraw(WithdrawChainInput),
}

pub(crate) fn decimals(values: &[FieldElement]) -> Vec<String> {
    values.iter().map(FieldElement::to_decimal).collect()
}

fn path_bits(proof: &MerkleProof) -> Vec<String> {
    proof.path_indices.iter().map(u8::to_string).collect()
}

impl From<&MintStep> for MintRound {
    fn from(step: &MintStep) -> Self {
        Self {
            sender: FieldElement::zero().to_decimal(),
            recipient: step.request.recipient.to_decimal(),
            leaf_coins: [
                step.request.range_start.to_decimal(),
                step.request.range_end.to_decimal(),
            ],
            mint_path_elements: decimals(&step.queue_proof.path_elements),
            mint_path_indices: path_bits(&step.queue_proof),
            path_elements: decimals(&step.ledger_proof.path_elements),
            path_indices: path_bits(&step.ledger_proof),
        }
    }
}

impl From<&WithdrawStep> for WithdrawRound {
    fn from(step: &WithdrawStep) -> Self {
        Self {
            sender: step.sender.to_decimal(),
            recipient: step.receiver.to_decimal(),
            leaf_coins: [step.range_start.to_decimal(), step.range_end.to_decimal()],
            path_elements: decimals(&step.ledger_proof.path_elements),
            path_indices: path_bits(&step.ledger_proof),
            r: limbs_to_decimal(&step.r),
            s: limbs_to_decimal(&step.s),
            msghash: limbs_to_decimal(&step.msghash),
            pubkey: [
                limbs_to_decimal(&step.pubkey[0]),
                limbs_to_decimal(&step.pubkey[1]),
            ],
        }
    }
}

pub(crate) fn parse_field(text: &str) -> Result<FieldElement, TransitionError> {
    Ok(FieldElement::from_decimal(text)?)
}

pub(crate) fn parse_fields(texts: &[String]) -> Result<Vec<FieldElement>, TransitionError> {
    texts.iter().map(|text| parse_field(text)).collect()
}

pub(crate) fn parse_bits(texts: &[String]) -> Result<Vec<u8>, TransitionError> {
    texts
        .iter()
        .map(|text| match text.trim() {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(TransitionError::InvalidEncoding(format!(
                "path index must be 0 or 1, got {other}"
            ))),
        })
        .collect()
}

pub(crate) fn parse_limbs(texts: &[String; LIMB_COUNT]) -> Result<Limbs, TransitionError> {
    let mut limbs = [0u64; LIMB_COUNT];
    for (limb, text) in limbs.iter_mut().zip(texts.iter()) {
        *limb = text.trim().parse().map_err(|_| {
            TransitionError::InvalidEncoding(format!("limb is not a 64-bit decimal: {text}"))
        })?;
    }
    Ok(limbs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renamed_fields_reach_the_json() {
        let round = MintRound {
            sender: "0".into(),
            recipient: "111".into(),
            leaf_coins: ["0".into(), "10".into()],
            mint_path_elements: vec!["1".into()],
            mint_path_indices: vec!["0".into()],
            path_elements: vec!["2".into()],
            path_indices: vec!["1".into()],
        };
        let json = serde_json::to_value(&round).unwrap();
        assert_eq!(json["mintPathElements"][0], "1");
        assert_eq!(json["pathIndices"][0], "1");
        assert!(json.get("mint_path_elements").is_none());
    }

    #[test]
    fn expected_is_optional() {
        let input: WithdrawChainInput =
            serde_json::from_str(r#"{"step_in":["5"],"private_inputs":[]}"#).unwrap();
        assert_eq!(input.expected, None);
        let rendered = serde_json::to_string(&input).unwrap();
        assert!(!rendered.contains("expected"));
    }

    #[test]
    fn untagged_chain_input_picks_arity() {
        let mint: ChainInput =
            serde_json::from_str(r#"{"step_in":["1","2"],"private_inputs":[]}"#).unwrap();
        assert!(matches!(mint, ChainInput::Mint(_)));
        let withdraw: ChainInput =
            serde_json::from_str(r#"{"step_in":["1"],"private_inputs":[]}"#).unwrap();
        assert!(matches!(withdraw, ChainInput::Withdraw(_)));
    }

    #[test]
    fn malformed_values_are_reported() {
        assert!(parse_bits(&["2".to_string()]).is_err());
        assert!(parse_limbs(&["1".into(), "2".into(), "x".into(), "4".into()]).is_err());
        assert!(parse_field("nope").is_err());
    }
}
