// Governance: parameter registry, proposal lifecycle and signed execution
pub mod parameter_registry;
pub mod proposal;
pub mod tally;
pub mod execution_proof;
pub mod proposal_engine;
pub mod config;

pub use parameter_registry::{
    keys, GenesisConfig, GenesisParameter, GovernanceParameter, Mutability, ParameterRegistry,
    ParameterValue, RegistryError, ValueKind,
};

pub use proposal::{
    compute_proposal_id, InvalidTransition, Proposal, ProposalKind, ProposalRequest,
    ProposalState, StateTransition, Vote, VoteChoice,
};

pub use tally::{evaluate, Tally, TallyOutcome};

pub use execution_proof::{compute_content_hash, verify_proof, ExecutionProof, ProofError};

pub use proposal_engine::{ExecutionContext, GovernanceError, ProposalEngine, VoterGate};

pub use self::config::{ConfigError, GovernanceConfig};
