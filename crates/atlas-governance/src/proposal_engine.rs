// Proposal engine: create, vote, close, execute
//
// SAFETY INVARIANTS:
// 1. Height never decreases across engine calls
// 2. A rejected call leaves proposals, tallies and the clock unchanged
// 3. A height regression on any entry point fires a TimeRegression halt
// 4. Execution re-validates against the registry as it is at execution time
// 5. Any execution-time failure halts the circuit with the registry, the
//    proposal, the operation log and the clock untouched
// 6. A proposal executes at most once and yields exactly one proof

use crate::execution_proof::{self, ExecutionProof, ProofError};
use crate::parameter_registry::{keys, ParameterRegistry, ParameterValue, RegistryError};
use crate::proposal::{
    compute_proposal_id, short_id, InvalidTransition, Proposal, ProposalRequest, ProposalState,
    Vote, VoteChoice,
};
use crate::tally::{evaluate, TallyOutcome};
use atlas_core::{
    halt_context, CircuitError, HaltCode, HaltHandler, HaltRecord, HeightClock, HeightRegression,
    NodeVerifier, NotEligibleError,
};
use atlas_crypto::{Environment, SignatureBackend};
use atlas_economics::{
    validate_cap, validate_parameter_value, validate_voting_power, EconomicsGuard, GuardViolation,
    InvariantChecker, LedgerError, SupplyCheckpoint, TokenEvent, WeightSnapshot,
};
use atlas_math::{ArithmeticError, FixedPoint128, OperationLog};
use log::{info, warn};
use std::collections::BTreeMap;
use thiserror::Error;

const CREATE: &str = "create_proposal";
const VOTE: &str = "cast_vote";
const CLOSE: &str = "close_voting";
const EXPIRE: &str = "expire_stale";
const EXECUTE: &str = "execute_proposal";

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Guard(#[from] GuardViolation),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Circuit(#[from] CircuitError),

    #[error(transparent)]
    HeightRegression(#[from] HeightRegression),

    #[error(transparent)]
    NotEligible(#[from] NotEligibleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("node gating is enabled but no verified node snapshot is installed")]
    VerifierUnavailable,

    #[error("{voter} holds no weight in the snapshot of proposal {proposal_id}")]
    NoVotingWeight { voter: String, proposal_id: String },

    #[error("{voter} already voted on proposal {proposal_id}")]
    DuplicateVote { voter: String, proposal_id: String },

    #[error("voting on {proposal_id} is closed at height {height} (window ended at {ends_at})")]
    VotingClosed {
        proposal_id: String,
        height: u64,
        ends_at: u64,
    },

    #[error("voting on {proposal_id} is open until height {ends_at}, now {height}")]
    VotingStillOpen {
        proposal_id: String,
        height: u64,
        ends_at: u64,
    },

    #[error("snapshot height {snapshot_height} is after creation height {creation_height}")]
    SnapshotAfterCreation {
        snapshot_height: u64,
        creation_height: u64,
    },

    #[error("proposal {proposal_id} is {state}, not PASSED")]
    NotPassed {
        proposal_id: String,
        state: ProposalState,
    },

    #[error("proposal {0} already executed")]
    AlreadyExecuted(String),

    #[error("halted: {0}")]
    Halted(Box<HaltRecord>),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl GovernanceError {
    pub fn code(&self) -> &'static str {
        match self {
            GovernanceError::ProposalNotFound(_) => "PROPOSAL_NOT_FOUND",
            GovernanceError::Registry(e) => e.code(),
            GovernanceError::Guard(e) => e.code(),
            GovernanceError::Arithmetic(e) => e.code(),
            GovernanceError::Transition(_) => "INVALID_TRANSITION",
            GovernanceError::Proof(e) => e.code(),
            GovernanceError::Circuit(e) => e.code(),
            GovernanceError::HeightRegression(_) => "HEIGHT_REGRESSION",
            GovernanceError::NotEligible(_) | GovernanceError::NoVotingWeight { .. } => {
                "NOT_ELIGIBLE"
            }
            GovernanceError::Ledger(e) => e.code(),
            GovernanceError::VerifierUnavailable => "VERIFIER_UNAVAILABLE",
            GovernanceError::DuplicateVote { .. } => "DUPLICATE_VOTE",
            GovernanceError::VotingClosed { .. } => "VOTING_CLOSED",
            GovernanceError::VotingStillOpen { .. } => "VOTING_STILL_OPEN",
            GovernanceError::SnapshotAfterCreation { .. } => "SNAPSHOT_AFTER_CREATION",
            GovernanceError::NotPassed { .. } => "NOT_PASSED",
            GovernanceError::AlreadyExecuted(_) => "ALREADY_EXECUTED",
            GovernanceError::Halted(_) => "HALTED",
            GovernanceError::Serialization(_) => "SERIALIZATION",
        }
    }

    /// The halt record, when this error is a halt.
    pub fn halt_record(&self) -> Option<&HaltRecord> {
        match self {
            GovernanceError::Halted(record) => Some(record.as_ref()),
            _ => None,
        }
    }
}

/// Who may vote.
#[derive(Clone, Copy)]
pub enum VoterGate<'a> {
    Open,
    /// Voters must pass node verification.
    NodeGated(&'a NodeVerifier),
}

/// Everything execution needs, passed explicitly per call.
pub struct ExecutionContext<'a> {
    pub registry: &'a mut ParameterRegistry,
    pub guard: &'a EconomicsGuard,
    pub checkpoint: &'a SupplyCheckpoint,
    pub events: &'a [TokenEvent],
    pub signer: &'a dyn SignatureBackend,
    pub environment: Environment,
    pub halt: &'a mut HaltHandler,
    pub height: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ProposalEngine {
    proposals: BTreeMap<String, Proposal>,
    proofs: BTreeMap<String, ExecutionProof>,
    log: OperationLog,
    clock: HeightClock,
}

impl ProposalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock copy advanced to `height`; committed by the caller on success.
    /// A regression fires a `TimeRegression` halt.
    fn advance(
        &self,
        height: u64,
        operation: &str,
        halt: &mut HaltHandler,
    ) -> Result<HeightClock, GovernanceError> {
        let mut clock = self.clock;
        clock
            .observe_or_halt(height, operation, halt)
            .map_err(|record| GovernanceError::Halted(Box::new(record)))?;
        Ok(clock)
    }

    pub fn create_proposal(
        &mut self,
        request: ProposalRequest,
        snapshot: WeightSnapshot,
        registry: &ParameterRegistry,
        height: u64,
        halt: &mut HaltHandler,
    ) -> Result<String, GovernanceError> {
        let clock = self.advance(height, CREATE, halt)?;

        let parameter = registry.get(&request.parameter_key)?;
        if !parameter.is_mutable() {
            warn!("proposal targets immutable parameter {}", request.parameter_key);
            return Err(RegistryError::ImmutableParameterViolation {
                key: request.parameter_key,
            }
            .into());
        }
        registry.check_type(&request.parameter_key, &request.new_value)?;
        if snapshot.height > height {
            return Err(GovernanceError::SnapshotAfterCreation {
                snapshot_height: snapshot.height,
                creation_height: height,
            });
        }
        let window = registry.get_integer(keys::VOTING_WINDOW)?;

        let id = compute_proposal_id(&request, height)
            .map_err(|e| GovernanceError::Serialization(e.to_string()))?;
        self.clock = clock;
        if self.proposals.contains_key(&id) {
            info!("proposal {} already exists", short_id(&id));
            return Ok(id);
        }

        let mut proposal = Proposal::new(id.clone(), request, height, window, snapshot);
        proposal.transition(ProposalState::Voting, height)?;
        info!(
            "proposal {} opened: {} -> {} until height {}",
            short_id(&id),
            proposal.parameter_key,
            proposal.new_value,
            proposal.voting_ends_at()
        );
        self.proposals.insert(id.clone(), proposal);
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn cast_vote(
        &mut self,
        proposal_id: &str,
        voter: &str,
        choice: VoteChoice,
        height: u64,
        registry: &ParameterRegistry,
        gate: VoterGate<'_>,
        halt: &mut HaltHandler,
    ) -> Result<(), GovernanceError> {
        let result =
            self.try_cast_vote(proposal_id, voter, choice, height, registry, gate, halt);
        if let Err(e) = &result {
            warn!("vote by {} on {} rejected: {}", voter, short_id(proposal_id), e);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn try_cast_vote(
        &mut self,
        proposal_id: &str,
        voter: &str,
        choice: VoteChoice,
        height: u64,
        registry: &ParameterRegistry,
        gate: VoterGate<'_>,
        halt: &mut HaltHandler,
    ) -> Result<(), GovernanceError> {
        let clock = self.advance(height, VOTE, halt)?;
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;

        if !proposal.is_voting_open(height) {
            return Err(GovernanceError::VotingClosed {
                proposal_id: proposal_id.to_string(),
                height,
                ends_at: proposal.voting_ends_at(),
            });
        }
        if proposal.has_voted(voter) {
            return Err(GovernanceError::DuplicateVote {
                voter: voter.to_string(),
                proposal_id: proposal_id.to_string(),
            });
        }
        if let VoterGate::NodeGated(verifier) = gate {
            verifier.require_eligible(voter)?;
        }
        let weight = proposal
            .snapshot
            .weight_of(voter)
            .filter(|w| !w.is_zero())
            .ok_or_else(|| GovernanceError::NoVotingWeight {
                voter: voter.to_string(),
                proposal_id: proposal_id.to_string(),
            })?;
        let cap = registry.get_fixed(keys::MAX_VOTING_POWER_FRACTION)?;
        validate_voting_power(voter, weight, proposal.snapshot.total_weight, cap)?;

        proposal.tally.record(choice, weight, &mut self.log)?;
        proposal.votes.insert(
            voter.to_string(),
            Vote {
                voter: voter.to_string(),
                proposal_id: proposal_id.to_string(),
                choice,
                weight,
                height,
            },
        );
        self.clock = clock;
        info!(
            "{} voted {:?} on {} with weight {}",
            voter,
            choice,
            short_id(proposal_id),
            weight
        );
        Ok(())
    }

    /// Quorum and supermajority against the registry's thresholds.
    pub fn outcome(
        &mut self,
        proposal_id: &str,
        registry: &ParameterRegistry,
    ) -> Result<TallyOutcome, GovernanceError> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        proposal_outcome(proposal, registry, &mut self.log)
    }

    pub fn check_passed(
        &mut self,
        proposal_id: &str,
        registry: &ParameterRegistry,
    ) -> Result<bool, GovernanceError> {
        Ok(self.outcome(proposal_id, registry)?.passed())
    }

    /// Resolve a proposal whose window has elapsed.
    pub fn close_voting(
        &mut self,
        proposal_id: &str,
        height: u64,
        registry: &ParameterRegistry,
        halt: &mut HaltHandler,
    ) -> Result<ProposalState, GovernanceError> {
        let clock = self.advance(height, CLOSE, halt)?;
        let proposal = self
            .proposals
            .get(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.state == ProposalState::Voting && !proposal.window_elapsed(height) {
            return Err(GovernanceError::VotingStillOpen {
                proposal_id: proposal_id.to_string(),
                height,
                ends_at: proposal.voting_ends_at(),
            });
        }

        let next = resolution(&self.outcome(proposal_id, registry)?);
        let proposal = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        proposal.transition(next, height)?;
        self.clock = clock;
        Ok(next)
    }

    /// Close every elapsed proposal still in voting, in id order.
    pub fn expire_stale(
        &mut self,
        height: u64,
        registry: &ParameterRegistry,
        halt: &mut HaltHandler,
    ) -> Result<Vec<(String, ProposalState)>, GovernanceError> {
        self.advance(height, EXPIRE, halt)?;
        let elapsed: Vec<String> = self
            .proposals
            .values()
            .filter(|p| p.state == ProposalState::Voting && p.window_elapsed(height))
            .map(|p| p.id.clone())
            .collect();

        let mut closed = Vec::with_capacity(elapsed.len());
        for id in elapsed {
            let state = self.close_voting(&id, height, registry, halt)?;
            closed.push((id, state));
        }
        if !closed.is_empty() {
            info!("closed {} elapsed proposal(s) at height {}", closed.len(), height);
        }
        Ok(closed)
    }

    /// Apply a passed proposal to the registry and sign the change.
    pub fn execute_proposal(
        &mut self,
        proposal_id: &str,
        ctx: ExecutionContext<'_>,
    ) -> Result<ExecutionProof, GovernanceError> {
        let ExecutionContext {
            registry,
            guard,
            checkpoint,
            events,
            signer,
            environment,
            halt,
            height,
        } = ctx;

        halt.ensure_closed()?;
        let mut proposal = self
            .proposals
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| GovernanceError::ProposalNotFound(proposal_id.to_string()))?;
        if proposal.state == ProposalState::Executed {
            return Err(GovernanceError::AlreadyExecuted(proposal_id.to_string()));
        }
        let clock = self.advance(height, EXECUTE, halt)?;
        let mut log = self.log.clone();

        // An elapsed proposal still in voting is resolved on the working copy
        // and committed together with the execution.
        if proposal.state == ProposalState::Voting {
            if !proposal.window_elapsed(height) {
                return Err(GovernanceError::VotingStillOpen {
                    proposal_id: proposal_id.to_string(),
                    height,
                    ends_at: proposal.voting_ends_at(),
                });
            }
            let next = resolution(&proposal_outcome(&proposal, registry, &mut log)?);
            if next != ProposalState::Passed {
                return Err(GovernanceError::NotPassed {
                    proposal_id: proposal_id.to_string(),
                    state: next,
                });
            }
            proposal.transition(ProposalState::Passed, height)?;
        }
        if proposal.state != ProposalState::Passed {
            return Err(GovernanceError::NotPassed {
                proposal_id: proposal_id.to_string(),
                state: proposal.state,
            });
        }

        let key = proposal.parameter_key.clone();
        let new_value = proposal.new_value.clone();
        let vote_weights = proposal.vote_weights();
        let total_weight = proposal.snapshot.total_weight;
        let halted = |halt: &mut HaltHandler, code: HaltCode, reason: &str, detail: String| {
            let record = halt.halt(
                code,
                EXECUTE,
                height,
                halt_context(&[
                    ("proposal_id", proposal_id.to_string()),
                    ("parameter_key", key.clone()),
                    ("reason", reason.to_string()),
                    ("detail", detail),
                ]),
            );
            GovernanceError::Halted(Box::new(record))
        };

        let previous_value = match revalidate(registry, guard, &key, &new_value) {
            Ok(previous) => previous,
            Err(Revalidation::Registry(e)) => {
                return Err(halted(halt, HaltCode::RegistryViolation, e.code(), e.to_string()))
            }
            Err(Revalidation::Guard(e)) => {
                return Err(halted(halt, HaltCode::GuardViolation, e.code(), e.to_string()))
            }
            Err(Revalidation::Arithmetic(e)) => {
                return Err(halted(halt, HaltCode::ArithmeticFailure, e.code(), e.to_string()))
            }
        };

        let cap = match registry.get_fixed(keys::MAX_VOTING_POWER_FRACTION) {
            Ok(cap) => cap,
            Err(e) => {
                return Err(halted(halt, HaltCode::RegistryViolation, e.code(), e.to_string()))
            }
        };
        let report =
            InvariantChecker::check_all(events, checkpoint, &vote_weights, total_weight, cap);
        if !report.is_clean() {
            return Err(halted(
                halt,
                HaltCode::InvariantViolation,
                &report.codes().join(","),
                report.to_string(),
            ));
        }

        let proof = match ExecutionProof::create(
            proposal_id,
            &key,
            previous_value,
            new_value.clone(),
            height,
            signer,
            environment,
        ) {
            Ok(proof) => proof,
            Err(e) => {
                return Err(halted(halt, HaltCode::ProofFailure, e.code(), e.to_string()))
            }
        };

        proposal.transition(ProposalState::Executed, height)?;
        if let Err(e) = registry.set(&key, new_value) {
            return Err(halted(halt, HaltCode::RegistryViolation, e.code(), e.to_string()));
        }

        self.proposals.insert(proposal_id.to_string(), proposal);
        self.proofs.insert(proposal_id.to_string(), proof.clone());
        self.log = log;
        self.clock = clock;
        info!(
            "proposal {} executed at height {}: {} = {} (proof {})",
            short_id(proposal_id),
            height,
            key,
            proof.new_value,
            short_id(&proof.content_hash)
        );
        Ok(proof)
    }

    pub fn verify_proof(
        &self,
        proof: &ExecutionProof,
        verifier: &dyn SignatureBackend,
        environment: Environment,
    ) -> Result<(), ProofError> {
        execution_proof::verify_proof(proof, verifier, environment)
    }

    pub fn proposal(&self, proposal_id: &str) -> Option<&Proposal> {
        self.proposals.get(proposal_id)
    }

    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.proposals.values()
    }

    pub fn proposals_in_state(&self, state: ProposalState) -> Vec<&Proposal> {
        self.proposals.values().filter(|p| p.state == state).collect()
    }

    pub fn proof(&self, proposal_id: &str) -> Option<&ExecutionProof> {
        self.proofs.get(proposal_id)
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn current_height(&self) -> Option<u64> {
        self.clock.current()
    }
}

/// Quorum and supermajority of `proposal` against the registry's thresholds.
fn proposal_outcome(
    proposal: &Proposal,
    registry: &ParameterRegistry,
    log: &mut OperationLog,
) -> Result<TallyOutcome, GovernanceError> {
    let quorum = registry.get_fixed(keys::QUORUM_FRACTION)?;
    let supermajority = registry.get_fixed(keys::SUPERMAJORITY_FRACTION)?;
    Ok(evaluate(
        &proposal.tally,
        proposal.snapshot.total_weight,
        quorum,
        supermajority,
        log,
    )?)
}

/// State an elapsed proposal closes into.
fn resolution(outcome: &TallyOutcome) -> ProposalState {
    if outcome.passed() {
        ProposalState::Passed
    } else if outcome.quorum_met {
        ProposalState::Rejected
    } else {
        ProposalState::Expired
    }
}

enum Revalidation {
    Registry(RegistryError),
    Guard(GuardViolation),
    Arithmetic(ArithmeticError),
}

/// Checks that depend on the registry as it stands now. Returns the value
/// being replaced.
fn revalidate(
    registry: &ParameterRegistry,
    guard: &EconomicsGuard,
    key: &str,
    new_value: &ParameterValue,
) -> Result<ParameterValue, Revalidation> {
    let parameter = registry.get(key).map_err(Revalidation::Registry)?;
    if !parameter.is_mutable() {
        return Err(Revalidation::Registry(RegistryError::ImmutableParameterViolation {
            key: key.to_string(),
        }));
    }
    registry.check_type(key, new_value).map_err(Revalidation::Registry)?;

    let numeric: Option<FixedPoint128> = match new_value.as_fixed() {
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => return Err(Revalidation::Arithmetic(e)),
        None => None,
    };
    if let (Some(bounds), Some(value)) = (&parameter.bounds, numeric) {
        validate_parameter_value(key, value, bounds).map_err(Revalidation::Guard)?;
    }
    if let Some(value) = numeric {
        if key == keys::MAX_VOTING_POWER_FRACTION {
            validate_cap(value).map_err(Revalidation::Guard)?;
        }
        if key == keys::TREASURY_ALLOCATION_FRACTION {
            guard.validate_allocation(value).map_err(Revalidation::Guard)?;
        }
    }
    Ok(parameter.value.clone())
}
