// Proposal records and their lifecycle
//
// SAFETY INVARIANTS:
// 1. The id is a pure function of the proposal content and creation height
// 2. At most one vote per voter; weight comes from the frozen snapshot
// 3. Terminal states (Executed, Rejected, Expired) have no outgoing transition
// 4. Every transition is recorded with the height at which it happened

use crate::parameter_registry::ParameterValue;
use crate::tally::Tally;
use atlas_crypto::canonical_sha3_512;
use atlas_economics::WeightSnapshot;
use atlas_math::FixedPoint128;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalKind {
    ParameterChange,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::ParameterChange => "PARAMETER_CHANGE",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalState {
    Draft,
    Voting,
    Passed,
    Rejected,
    Executed,
    Expired,
}

impl ProposalState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalState::Executed | ProposalState::Rejected | ProposalState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalState::Draft => "DRAFT",
            ProposalState::Voting => "VOTING",
            ProposalState::Passed => "PASSED",
            ProposalState::Rejected => "REJECTED",
            ProposalState::Executed => "EXECUTED",
            ProposalState::Expired => "EXPIRED",
        }
    }

    fn can_transition_to(self, to: ProposalState) -> bool {
        matches!(
            (self, to),
            (ProposalState::Draft, ProposalState::Voting)
                | (ProposalState::Voting, ProposalState::Passed)
                | (ProposalState::Voting, ProposalState::Rejected)
                | (ProposalState::Voting, ProposalState::Expired)
                | (ProposalState::Passed, ProposalState::Executed)
        )
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid transition {from} -> {to} for proposal {proposal_id}")]
pub struct InvalidTransition {
    pub proposal_id: String,
    pub from: ProposalState,
    pub to: ProposalState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteChoice {
    Yes,
    No,
    Abstain,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub voter: String,
    pub proposal_id: String,
    pub choice: VoteChoice,
    pub weight: FixedPoint128,
    pub height: u64,
}

/// What a proposer submits; the engine adds height and snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalRequest {
    pub kind: ProposalKind,
    pub title: String,
    pub parameter_key: String,
    pub new_value: ParameterValue,
    pub proposer: String,
}

impl ProposalRequest {
    pub fn parameter_change(
        title: impl Into<String>,
        parameter_key: impl Into<String>,
        new_value: ParameterValue,
        proposer: impl Into<String>,
    ) -> Self {
        Self {
            kind: ProposalKind::ParameterChange,
            title: title.into(),
            parameter_key: parameter_key.into(),
            new_value,
            proposer: proposer.into(),
        }
    }
}

/// SHA3-512 over the sorted-key JSON of the identifying fields.
pub fn compute_proposal_id(
    request: &ProposalRequest,
    creation_height: u64,
) -> Result<String, serde_json::Error> {
    canonical_sha3_512(&json!({
        "kind": request.kind,
        "title": request.title,
        "parameter_key": request.parameter_key,
        "new_value": request.new_value,
        "proposer": request.proposer,
        "creation_height": creation_height,
    }))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ProposalState,
    pub to: ProposalState,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    pub id: String,
    pub kind: ProposalKind,
    pub title: String,
    pub parameter_key: String,
    pub new_value: ParameterValue,
    pub proposer: String,
    pub creation_height: u64,
    pub voting_window: u64,
    pub snapshot: WeightSnapshot,
    pub votes: BTreeMap<String, Vote>,
    pub tally: Tally,
    pub state: ProposalState,
    pub history: Vec<StateTransition>,
}

impl Proposal {
    pub fn new(
        id: String,
        request: ProposalRequest,
        creation_height: u64,
        voting_window: u64,
        snapshot: WeightSnapshot,
    ) -> Self {
        Self {
            id,
            kind: request.kind,
            title: request.title,
            parameter_key: request.parameter_key,
            new_value: request.new_value,
            proposer: request.proposer,
            creation_height,
            voting_window,
            snapshot,
            votes: BTreeMap::new(),
            tally: Tally::default(),
            state: ProposalState::Draft,
            history: Vec::new(),
        }
    }

    /// First height at which voting is closed. Saturates at `u64::MAX`.
    pub fn voting_ends_at(&self) -> u64 {
        self.creation_height.saturating_add(self.voting_window)
    }

    pub fn is_voting_open(&self, height: u64) -> bool {
        self.state == ProposalState::Voting && height < self.voting_ends_at()
    }

    /// Pure expiry predicate on heights alone.
    pub fn window_elapsed(&self, height: u64) -> bool {
        height >= self.voting_ends_at()
    }

    pub fn has_voted(&self, voter: &str) -> bool {
        self.votes.contains_key(voter)
    }

    /// Weights of the counted votes, keyed by voter.
    pub fn vote_weights(&self) -> BTreeMap<String, FixedPoint128> {
        self.votes
            .iter()
            .map(|(voter, vote)| (voter.clone(), vote.weight))
            .collect()
    }

    pub fn transition(&mut self, to: ProposalState, height: u64) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(to) {
            return Err(InvalidTransition {
                proposal_id: self.id.clone(),
                from: self.state,
                to,
            });
        }
        let from = self.state;
        self.state = to;
        self.history.push(StateTransition { from, to, height });
        info!("proposal {} {} -> {} at height {}", short_id(&self.id), from, to, height);
        Ok(())
    }
}

/// Leading 16 hex characters, for log lines.
pub fn short_id(id: &str) -> &str {
    id.get(..16).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProposalRequest {
        ProposalRequest::parameter_change("Raise cap", "CAP", ParameterValue::Integer(150), "alice")
    }

    fn snapshot() -> WeightSnapshot {
        WeightSnapshot::from_weights(10, BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_proposal_id_deterministic_and_content_bound() {
        let a = compute_proposal_id(&request(), 10).unwrap();
        let b = compute_proposal_id(&request(), 10).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert_ne!(a, compute_proposal_id(&request(), 11).unwrap());

        let mut other = request();
        other.new_value = ParameterValue::Integer(151);
        assert_ne!(a, compute_proposal_id(&other, 10).unwrap());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut p = Proposal::new("id".into(), request(), 10, 100, snapshot());
        assert!(p.transition(ProposalState::Passed, 10).is_err());
        p.transition(ProposalState::Voting, 10).unwrap();
        p.transition(ProposalState::Passed, 110).unwrap();
        p.transition(ProposalState::Executed, 120).unwrap();
        assert!(p.state.is_terminal());
        let err = p.transition(ProposalState::Expired, 130).unwrap_err();
        assert_eq!(err.from, ProposalState::Executed);
        assert_eq!(p.history.len(), 3);
    }

    #[test]
    fn test_window_boundaries() {
        let mut p = Proposal::new("id".into(), request(), 10, 100, snapshot());
        p.transition(ProposalState::Voting, 10).unwrap();
        assert!(p.is_voting_open(109));
        assert!(!p.is_voting_open(110));
        assert!(!p.window_elapsed(109));
        assert!(p.window_elapsed(110));
    }
}
