// PROPOSAL LIFECYCLE INTEGRATION TESTS
//
// Test Coverage:
// 1. Immutable parameters cannot be targeted; creation is idempotent
// 2. Vote admission: duplicates, missing weight, node gating, voting-power cap
// 3. Passed proposals execute once, mutate the registry and yield a verifiable proof
// 4. Bound violations at execution halt the circuit with the registry untouched
// 5. Elapsed windows resolve to Passed, Rejected or Expired
// 6. Height regression at execution trips the breaker
// 7. Two independent runs produce identical logs and proofs
// 8. Height regression on create, vote, close and sweep trips the breaker
// 9. A halted execution of an elapsed proposal leaves it in voting
// 10. Invariant and proof failures at execution halt with the registry untouched

use atlas_core::{
    HaltCode, HaltHandler, NodeRecord, NodeVerifier, Snapshot, TelemetryRecord, VerifierPolicy,
};
use atlas_crypto::{Environment, MockSigner};
use atlas_economics::{EconomicsGuard, GovernanceWeightLedger, SupplyCheckpoint, TokenEvent};
use atlas_governance::{
    keys, verify_proof, ExecutionContext, ExecutionProof, GenesisConfig, GovernanceError,
    ParameterRegistry, ParameterValue, ProposalEngine, ProposalRequest, ProposalState, VoteChoice,
    VoterGate,
};
use atlas_math::{FixedPoint128, OperationLog};
use std::collections::BTreeMap;

fn fp(s: &str) -> FixedPoint128 {
    s.parse().unwrap()
}

const STANDARD_WEIGHTS: &[(&str, &str)] = &[
    ("v1", "150"),
    ("v2", "130"),
    ("v3", "120"),
    ("v4", "200"),
    ("v5", "200"),
    ("v6", "200"),
];

struct World {
    registry: ParameterRegistry,
    ledger: GovernanceWeightLedger,
    engine: ProposalEngine,
    halt: HaltHandler,
    signer: MockSigner,
    guard: EconomicsGuard,
}

impl World {
    fn with_weights(weights: &[(&str, &str)]) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = ParameterRegistry::genesis(&GenesisConfig::default()).unwrap();
        let supply = registry.get_fixed(keys::TOTAL_SUPPLY).unwrap();
        let mut ledger = GovernanceWeightLedger::new(supply);
        let mut log = OperationLog::new();
        for (account, amount) in weights {
            ledger.allocate(account, fp(amount), &mut log).unwrap();
        }
        Self {
            registry,
            ledger,
            engine: ProposalEngine::new(),
            halt: HaltHandler::new(Environment::Dev),
            signer: MockSigner::new("governance-exec", b"execution-key").unwrap(),
            guard: EconomicsGuard::default(),
        }
    }

    fn new() -> Self {
        Self::with_weights(STANDARD_WEIGHTS)
    }

    fn propose(&mut self, title: &str, key: &str, value: ParameterValue, height: u64) -> String {
        let request = ProposalRequest::parameter_change(title, key, value, "alice");
        let snapshot = self.ledger.snapshot(height).unwrap();
        self.engine
            .create_proposal(request, snapshot, &self.registry, height, &mut self.halt)
            .unwrap()
    }

    fn vote(
        &mut self,
        id: &str,
        voter: &str,
        choice: VoteChoice,
        height: u64,
    ) -> Result<(), GovernanceError> {
        self.vote_gated(id, voter, choice, height, VoterGate::Open)
    }

    fn vote_gated(
        &mut self,
        id: &str,
        voter: &str,
        choice: VoteChoice,
        height: u64,
        gate: VoterGate<'_>,
    ) -> Result<(), GovernanceError> {
        self.engine.cast_vote(
            id,
            voter,
            choice,
            height,
            &self.registry,
            gate,
            &mut self.halt,
        )
    }

    fn expire_stale(
        &mut self,
        height: u64,
    ) -> Result<Vec<(String, ProposalState)>, GovernanceError> {
        self.engine.expire_stale(height, &self.registry, &mut self.halt)
    }

    fn pass(&mut self, id: &str, height: u64) {
        self.vote(id, "v1", VoteChoice::Yes, height).unwrap();
        self.vote(id, "v2", VoteChoice::Yes, height).unwrap();
        self.vote(id, "v3", VoteChoice::No, height).unwrap();
    }

    fn execute(&mut self, id: &str, height: u64) -> Result<ExecutionProof, GovernanceError> {
        let checkpoint = self.ledger.checkpoint().unwrap();
        let events = self.ledger.events().to_vec();
        self.execute_with(id, height, &checkpoint, &events, Environment::Dev)
    }

    fn execute_with(
        &mut self,
        id: &str,
        height: u64,
        checkpoint: &SupplyCheckpoint,
        events: &[TokenEvent],
        environment: Environment,
    ) -> Result<ExecutionProof, GovernanceError> {
        self.engine.execute_proposal(
            id,
            ExecutionContext {
                registry: &mut self.registry,
                guard: &self.guard,
                checkpoint,
                events,
                signer: &self.signer,
                environment,
                halt: &mut self.halt,
                height,
            },
        )
    }
}

#[test]
fn test_01_immutable_target_rejected_and_creation_idempotent() {
    let mut world = World::new();
    let snapshot = world.ledger.snapshot(10).unwrap();
    let request = ProposalRequest::parameter_change(
        "Lower quorum",
        keys::QUORUM_FRACTION,
        ParameterValue::Fixed(fp("0.10")),
        "mallory",
    );
    let err = world
        .engine
        .create_proposal(request, snapshot, &world.registry, 10, &mut world.halt)
        .unwrap_err();
    assert_eq!(err.code(), "IMMUTABLE_PARAMETER_VIOLATION");

    let a = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 10);
    let b = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 10);
    assert_eq!(a, b);
    assert_eq!(world.engine.proposals().count(), 1);
    assert_eq!(world.engine.proposal(&a).unwrap().state, ProposalState::Voting);
}

#[test]
fn test_02_type_mismatch_and_late_snapshot_rejected() {
    let mut world = World::new();
    let request =
        ProposalRequest::parameter_change("Cap", keys::CAP, ParameterValue::Bool(true), "alice");
    let snapshot = world.ledger.snapshot(5).unwrap();
    let err = world
        .engine
        .create_proposal(request.clone(), snapshot, &world.registry, 5, &mut world.halt)
        .unwrap_err();
    assert_eq!(err.code(), "TYPE_MISMATCH");

    let mut ok = request;
    ok.new_value = ParameterValue::Integer(120);
    let future = world.ledger.snapshot(20).unwrap();
    let err = world
        .engine
        .create_proposal(ok, future, &world.registry, 5, &mut world.halt)
        .unwrap_err();
    assert_eq!(err.code(), "SNAPSHOT_AFTER_CREATION");
}

#[test]
fn test_03_vote_admission_rules() {
    let mut world = World::new();
    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 100);

    world.vote(&id, "v1", VoteChoice::Yes, 110).unwrap();
    let err = world.vote(&id, "v1", VoteChoice::No, 111).unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_VOTE");

    let err = world.vote(&id, "stranger", VoteChoice::Yes, 111).unwrap_err();
    assert_eq!(err.code(), "NOT_ELIGIBLE");

    let err = world.vote(&id, "v2", VoteChoice::Yes, 200).unwrap_err();
    assert_eq!(err.code(), "VOTING_CLOSED");

    let proposal = world.engine.proposal(&id).unwrap();
    assert_eq!(proposal.votes.len(), 1);
    assert_eq!(proposal.tally.yes, fp("150"));
}

#[test]
fn test_04_weight_comes_from_snapshot_not_live_balance() {
    let mut world = World::new();
    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 100);
    let mut log = OperationLog::new();
    world.ledger.allocate("late", fp("100"), &mut log).unwrap();
    let err = world.vote(&id, "late", VoteChoice::Yes, 101).unwrap_err();
    assert_eq!(err.code(), "NOT_ELIGIBLE");
}

#[test]
fn test_05_voting_power_cap_enforced() {
    let mut world = World::with_weights(&[
        ("whale", "250"),
        ("a", "200"),
        ("b", "200"),
        ("c", "200"),
        ("d", "150"),
    ]);
    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 1);
    let err = world.vote(&id, "whale", VoteChoice::Yes, 2).unwrap_err();
    assert_eq!(err.code(), "VOTING_POWER_EXCEEDED");
    world.vote(&id, "a", VoteChoice::Yes, 2).unwrap();
}

#[test]
fn test_06_node_gated_voting_excludes_revoked_nodes() {
    let mut world = World::with_weights(&[
        ("node-a", "200"),
        ("node-b", "200"),
        ("node-c", "200"),
        ("node-d", "200"),
        ("node-e", "200"),
    ]);
    let mut nodes = BTreeMap::new();
    let mut reports = BTreeMap::new();
    for id in ["node-a", "node-b"] {
        nodes.insert(
            id.to_string(),
            NodeRecord {
                node_id: id.to_string(),
                public_key: "0f".repeat(32),
                key_scheme: "mock-sha3".to_string(),
                revoked: id == "node-b",
                registered_at: 0,
            },
        );
        reports.insert(id.to_string(), TelemetryRecord::new(id, fp("0.99"), true));
    }
    let verifier = NodeVerifier::new(
        Snapshot::seal("registry-v1", 1, nodes).unwrap(),
        Snapshot::seal("telemetry-v1", 1, reports).unwrap(),
        VerifierPolicy::default(),
    )
    .unwrap();

    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 5);
    let gate = VoterGate::NodeGated(&verifier);
    world.vote_gated(&id, "node-a", VoteChoice::Yes, 6, gate).unwrap();
    let err = world.vote_gated(&id, "node-b", VoteChoice::Yes, 6, gate).unwrap_err();
    assert_eq!(err.code(), "NOT_ELIGIBLE");
    match err {
        GovernanceError::NotEligible(e) => assert_eq!(e.result.codes(), vec!["REVOKED"]),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_07_execute_once_with_verifiable_proof() {
    let mut world = World::new();
    let id = world.propose(
        "Widen treasury allocation",
        keys::TREASURY_ALLOCATION_FRACTION,
        ParameterValue::Fixed(fp("0.10")),
        900,
    );
    world.pass(&id, 950);
    assert!(world.engine.check_passed(&id, &world.registry).unwrap());

    let err = world.execute(&id, 999).unwrap_err();
    assert_eq!(err.code(), "VOTING_STILL_OPEN");

    let proof = world.execute(&id, 1000).unwrap();
    assert_eq!(proof.previous_value, ParameterValue::Fixed(fp("0.05")));
    assert_eq!(
        world.registry.get_fixed(keys::TREASURY_ALLOCATION_FRACTION).unwrap(),
        fp("0.10")
    );
    verify_proof(&proof, &world.signer, Environment::Dev).unwrap();
    assert_eq!(world.engine.proof(&id), Some(&proof));
    assert_eq!(world.engine.proposal(&id).unwrap().state, ProposalState::Executed);

    let err = world.execute(&id, 1001).unwrap_err();
    assert_eq!(err.code(), "ALREADY_EXECUTED");
    assert_eq!(world.registry.get(keys::TREASURY_ALLOCATION_FRACTION).unwrap().version, 1);
}

#[test]
fn test_08_out_of_bounds_execution_halts_and_leaves_registry_untouched() {
    let mut world = World::new();
    let id = world.propose(
        "Overspend treasury",
        keys::TREASURY_ALLOCATION_FRACTION,
        ParameterValue::Fixed(fp("0.16")),
        900,
    );
    world.pass(&id, 950);
    let before = world.registry.commitment_hash().unwrap();

    let err = world.execute(&id, 1000).unwrap_err();
    let record = err.halt_record().cloned().unwrap();
    assert_eq!(record.code, HaltCode::GuardViolation);
    assert_eq!(
        record.context.get("reason").map(String::as_str),
        Some("PARAMETER_OUT_OF_BOUNDS")
    );
    assert_eq!(world.registry.commitment_hash().unwrap(), before);
    assert!(world.engine.proof(&id).is_none());

    let err = world.execute(&id, 1001).unwrap_err();
    assert_eq!(err.code(), "CIRCUIT_OPEN");

    world.halt.acknowledge(record.sequence).unwrap();
    let again = world.execute(&id, 1001).unwrap_err();
    let second = again.halt_record().unwrap();
    assert_eq!(second.code, record.code);
    assert_eq!(second.sequence, record.sequence + 1);
    assert_eq!(world.registry.commitment_hash().unwrap(), before);
}

#[test]
fn test_09_elapsed_windows_resolve_by_outcome() {
    let mut world = World::new();
    let passing = world.propose("A", keys::CAP, ParameterValue::Integer(110), 10);
    let rejected = world.propose("B", keys::CAP, ParameterValue::Integer(120), 10);
    let silent = world.propose("C", keys::CAP, ParameterValue::Integer(130), 10);

    world.pass(&passing, 20);
    world.vote(&rejected, "v4", VoteChoice::No, 20).unwrap();
    world.vote(&rejected, "v5", VoteChoice::Yes, 20).unwrap();

    assert!(world.expire_stale(109).unwrap().is_empty());
    let closed: BTreeMap<String, ProposalState> =
        world.expire_stale(110).unwrap().into_iter().collect();
    assert_eq!(closed.len(), 3);
    assert_eq!(closed[&passing], ProposalState::Passed);
    assert_eq!(closed[&rejected], ProposalState::Rejected);
    assert_eq!(closed[&silent], ProposalState::Expired);

    assert!(world.expire_stale(200).unwrap().is_empty());
    let err = world.execute(&silent, 200).unwrap_err();
    assert_eq!(err.code(), "NOT_PASSED");
}

#[test]
fn test_10_height_regression_at_execution_halts() {
    let mut world = World::new();
    let first = world.propose("A", keys::CAP, ParameterValue::Integer(110), 10);
    let second = world.propose("B", keys::VOTING_WINDOW, ParameterValue::Integer(50), 10);
    world.pass(&first, 20);
    world.pass(&second, 20);

    world.execute(&first, 500).unwrap();
    let err = world.execute(&second, 499).unwrap_err();
    assert_eq!(err.halt_record().unwrap().code, HaltCode::TimeRegression);
    assert_eq!(world.registry.get_integer(keys::VOTING_WINDOW).unwrap(), 100);
}

#[test]
fn test_11_replay_is_deterministic() {
    let run = || {
        let mut world = World::new();
        let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 900);
        world.pass(&id, 950);
        let proof = world.execute(&id, 1000).unwrap();
        (
            id,
            proof.content_hash,
            world.engine.log().head_hash(),
            world.registry.commitment_hash().unwrap(),
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn test_12_height_regression_on_every_entry_point_halts() {
    let mut world = World::new();
    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 50);

    let err = world.vote(&id, "v1", VoteChoice::Yes, 40).unwrap_err();
    let record = err.halt_record().cloned().unwrap();
    assert_eq!(record.code, HaltCode::TimeRegression);
    assert_eq!(record.operation, "cast_vote");
    assert_eq!(record.context.get("requested").map(String::as_str), Some("40"));
    assert_eq!(world.halt.records().len(), 1);
    assert!(world.engine.proposal(&id).unwrap().votes.is_empty());
    assert_eq!(world.engine.current_height(), Some(50));
    world.halt.acknowledge(record.sequence).unwrap();

    let request =
        ProposalRequest::parameter_change("Late", keys::CAP, ParameterValue::Integer(90), "bob");
    let snapshot = world.ledger.snapshot(30).unwrap();
    let err = world
        .engine
        .create_proposal(request, snapshot, &world.registry, 30, &mut world.halt)
        .unwrap_err();
    assert_eq!(err.halt_record().unwrap().code, HaltCode::TimeRegression);
    assert_eq!(world.engine.proposals().count(), 1);

    let err = world
        .engine
        .close_voting(&id, 20, &world.registry, &mut world.halt)
        .unwrap_err();
    assert_eq!(err.halt_record().unwrap().operation, "close_voting");

    let err = world.expire_stale(10).unwrap_err();
    assert_eq!(err.halt_record().unwrap().operation, "expire_stale");

    let codes: Vec<HaltCode> = world.halt.records().iter().map(|r| r.code).collect();
    assert_eq!(codes, vec![HaltCode::TimeRegression; 4]);
    assert_eq!(world.engine.current_height(), Some(50));
}

#[test]
fn test_13_halted_execution_of_elapsed_proposal_commits_nothing() {
    let mut world = World::new();
    let id = world.propose(
        "Overspend treasury",
        keys::TREASURY_ALLOCATION_FRACTION,
        ParameterValue::Fixed(fp("0.16")),
        900,
    );
    world.pass(&id, 950);
    let history_before = world.engine.proposal(&id).unwrap().history.len();
    let log_before = world.engine.log().head_hash();
    let registry_before = world.registry.commitment_hash().unwrap();

    let err = world.execute(&id, 1000).unwrap_err();
    assert_eq!(err.halt_record().unwrap().code, HaltCode::GuardViolation);

    let proposal = world.engine.proposal(&id).unwrap();
    assert_eq!(proposal.state, ProposalState::Voting);
    assert_eq!(proposal.history.len(), history_before);
    assert_eq!(world.engine.current_height(), Some(950));
    assert_eq!(world.engine.log().head_hash(), log_before);
    assert_eq!(world.registry.commitment_hash().unwrap(), registry_before);

    world.halt.acknowledge(err.halt_record().unwrap().sequence).unwrap();
    let state = world
        .engine
        .close_voting(&id, 1000, &world.registry, &mut world.halt)
        .unwrap();
    assert_eq!(state, ProposalState::Passed);
}

#[test]
fn test_14_invariant_violation_at_execution_halts() {
    let mut world = World::new();
    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 900);
    world.pass(&id, 950);
    let before = world.registry.commitment_hash().unwrap();

    let honest = world.ledger.checkpoint().unwrap();
    let leaky = SupplyCheckpoint {
        treasury_reserve: fp("1"),
        ..honest
    };
    let events = world.ledger.events().to_vec();
    let err = world
        .execute_with(&id, 1000, &leaky, &events, Environment::Dev)
        .unwrap_err();
    let record = err.halt_record().cloned().unwrap();
    assert_eq!(record.code, HaltCode::InvariantViolation);
    assert_eq!(world.registry.commitment_hash().unwrap(), before);
    assert!(world.engine.proof(&id).is_none());
    world.halt.acknowledge(record.sequence).unwrap();

    let mut transferred = events;
    transferred.push(TokenEvent::Transfer {
        from: "v1".to_string(),
        to: "v2".to_string(),
        amount: fp("1"),
    });
    let err = world
        .execute_with(&id, 1000, &honest, &transferred, Environment::Dev)
        .unwrap_err();
    assert_eq!(err.halt_record().unwrap().code, HaltCode::InvariantViolation);
    assert_eq!(world.registry.commitment_hash().unwrap(), before);
    assert_eq!(world.registry.get_integer(keys::CAP).unwrap(), 100);
}

#[test]
fn test_15_refused_signature_at_execution_halts() {
    let mut world = World::new();
    let id = world.propose("Raise cap", keys::CAP, ParameterValue::Integer(150), 900);
    world.pass(&id, 950);
    let before = world.registry.commitment_hash().unwrap();

    let checkpoint = world.ledger.checkpoint().unwrap();
    let events = world.ledger.events().to_vec();
    let err = world
        .execute_with(&id, 1000, &checkpoint, &events, Environment::Mainnet)
        .unwrap_err();
    let record = err.halt_record().cloned().unwrap();
    assert_eq!(record.code, HaltCode::ProofFailure);
    assert_eq!(world.registry.commitment_hash().unwrap(), before);
    assert!(world.engine.proof(&id).is_none());
    assert_eq!(world.engine.proposal(&id).unwrap().state, ProposalState::Voting);

    world.halt.acknowledge(record.sequence).unwrap();
    let proof = world.execute(&id, 1000).unwrap();
    assert_eq!(proof.new_value, ParameterValue::Integer(150));
}
