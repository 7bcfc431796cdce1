// END-TO-END GOVERNANCE TESTS
//
// Test Coverage:
// 1. CAP 100 -> 150: three node-verified voters, 40% turnout, 70% approval
// 2. Allocation round includes the valid node and excludes the revoked one
// 3. A tampered node snapshot halts the ledger until acknowledged
// 4. Node-gated voting without installed snapshots is refused
// 5. Bootstrap from a configuration file
// 6. An out-of-bounds allocation round halts and grants nothing
// 7. Height regression on a vote halts the ledger

use atlas_core::{HaltCode, NodeRecord, Snapshot, TelemetryRecord};
use atlas_crypto::{Environment, MockSigner};
use atlas_governance::{
    keys, GovernanceConfig, ParameterValue, ProposalRequest, ProposalState, VoteChoice,
};
use atlas_math::FixedPoint128;
use atlas_root::GovernedLedger;
use std::collections::BTreeMap;

fn fp(s: &str) -> FixedPoint128 {
    s.parse().unwrap()
}

fn signer() -> Box<MockSigner> {
    Box::new(MockSigner::new("atlas-exec-1", b"end-to-end-key").unwrap())
}

fn node_snapshots(
    nodes: &[(&str, bool)],
    height: u64,
) -> (Snapshot<NodeRecord>, Snapshot<TelemetryRecord>) {
    let mut records = BTreeMap::new();
    let mut reports = BTreeMap::new();
    for (id, revoked) in nodes {
        records.insert(
            id.to_string(),
            NodeRecord {
                node_id: id.to_string(),
                public_key: "ab".repeat(32),
                key_scheme: "mock-sha3".to_string(),
                revoked: *revoked,
                registered_at: 1,
            },
        );
        reports.insert(id.to_string(), TelemetryRecord::new(*id, fp("0.995"), true));
    }
    (
        Snapshot::seal("registry-e2e", height, records).unwrap(),
        Snapshot::seal("telemetry-e2e", height, reports).unwrap(),
    )
}

fn ledger_with_voters() -> GovernedLedger {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ledger = GovernedLedger::bootstrap(GovernanceConfig::default(), signer()).unwrap();
    for (voter, weight) in [
        ("v1", "150"),
        ("v2", "130"),
        ("v3", "120"),
        ("v4", "200"),
        ("v5", "200"),
        ("v6", "200"),
    ] {
        ledger.grant(voter, fp(weight)).unwrap();
    }
    let voters = [
        ("v1", false),
        ("v2", false),
        ("v3", false),
        ("v4", false),
        ("v5", false),
        ("v6", false),
    ];
    let (registry, telemetry) = node_snapshots(&voters, 800);
    ledger.install_snapshots(registry, telemetry, 800).unwrap();
    ledger
}

#[test]
fn test_01_cap_change_end_to_end() {
    let mut ledger = ledger_with_voters();
    assert_eq!(ledger.registry().get_integer(keys::CAP).unwrap(), 100);

    let request = ProposalRequest::parameter_change(
        "Raise CAP to 150",
        keys::CAP,
        ParameterValue::Integer(150),
        "v1",
    );
    let id = ledger.propose(request, 900).unwrap();

    ledger.vote(&id, "v1", VoteChoice::Yes, 910).unwrap();
    ledger.vote(&id, "v2", VoteChoice::Yes, 920).unwrap();
    ledger.vote(&id, "v3", VoteChoice::No, 930).unwrap();

    let tally = ledger.engine().proposal(&id).unwrap().tally;
    assert_eq!(tally.cast().unwrap(), fp("400"));
    assert_eq!(tally.yes, fp("280"));
    assert!(ledger.check_passed(&id).unwrap());

    let proof = ledger.execute(&id, 1000).unwrap();
    assert_eq!(ledger.registry().get_integer(keys::CAP).unwrap(), 150);
    assert_eq!(proof.previous_value, ParameterValue::Integer(100));
    assert_eq!(proof.new_value, ParameterValue::Integer(150));
    assert_eq!(proof.block_height, 1000);
    assert_eq!(proof.environment, Environment::Dev);
    ledger.verify_proof(&proof).unwrap();

    assert_eq!(ledger.engine().proposal(&id).unwrap().state, ProposalState::Executed);
    assert!(ledger.check_invariants().unwrap().is_clean());
    assert!(ledger.halts().is_empty());
    assert_eq!(ledger.execute(&id, 1001).unwrap_err().code(), "ALREADY_EXECUTED");
}

#[test]
fn test_02_allocation_round_excludes_revoked_node() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ledger = GovernedLedger::bootstrap(GovernanceConfig::default(), signer()).unwrap();
    let (registry, telemetry) = node_snapshots(&[("node-a", false), ("node-b", true)], 10);
    ledger.install_snapshots(registry, telemetry, 10).unwrap();

    let mut requests = BTreeMap::new();
    requests.insert("node-a".to_string(), fp("0.10"));
    requests.insert("node-b".to_string(), fp("0.10"));
    let round = ledger.allocation_round(&requests, 11).unwrap();

    // pool = 1,000,000 x 0.05
    assert_eq!(round.grants.get("node-a"), Some(&fp("5000")));
    assert!(!round.grants.contains_key("node-b"));
    assert_eq!(round.excluded["node-b"][0].code(), "REVOKED");
    assert_eq!(ledger.weights().balance_of("node-a"), fp("5000"));
    assert_eq!(ledger.weights().treasury_reserve(), fp("995000"));
    assert!(ledger.check_invariants().unwrap().is_clean());
}

#[test]
fn test_03_tampered_snapshot_halts_until_acknowledged() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ledger = GovernedLedger::bootstrap(GovernanceConfig::default(), signer()).unwrap();
    let (registry, telemetry) = node_snapshots(&[("node-a", false)], 10);

    let mut tampered = serde_json::to_value(&registry).unwrap();
    tampered["entries"]["node-a"]["revoked"] = serde_json::json!(true);
    let err = ledger
        .install_snapshots_json(
            &tampered.to_string(),
            &serde_json::to_string(&telemetry).unwrap(),
            10,
        )
        .unwrap_err();
    let record = err.halt_record().cloned().unwrap();
    assert_eq!(record.code, HaltCode::SnapshotInvalid);
    assert_eq!(record.context["reason"], "SNAPSHOT_HASH_MISMATCH");

    let requests: BTreeMap<String, FixedPoint128> =
        [("node-a".to_string(), fp("0.05"))].into_iter().collect();
    let err = ledger.allocation_round(&requests, 10).unwrap_err();
    assert_eq!(err.code(), "CIRCUIT_OPEN");

    ledger.acknowledge_halt(record.sequence).unwrap();
    let err = ledger.allocation_round(&requests, 10).unwrap_err();
    assert_eq!(err.code(), "VERIFIER_UNAVAILABLE");

    ledger
        .install_snapshots_json(
            &serde_json::to_string(&registry).unwrap(),
            &serde_json::to_string(&telemetry).unwrap(),
            11,
        )
        .unwrap();
    assert_eq!(ledger.allocation_round(&requests, 11).unwrap().grants.len(), 1);
}

#[test]
fn test_04_gated_vote_without_snapshots_refused() {
    let mut ledger = GovernedLedger::bootstrap(GovernanceConfig::default(), signer()).unwrap();
    ledger.grant("v1", fp("10")).unwrap();
    let request = ProposalRequest::parameter_change(
        "Shorter window",
        keys::VOTING_WINDOW,
        ParameterValue::Integer(50),
        "v1",
    );
    let id = ledger.propose(request, 1).unwrap();
    let err = ledger.vote(&id, "v1", VoteChoice::Yes, 2).unwrap_err();
    assert_eq!(err.code(), "VERIFIER_UNAVAILABLE");
}

#[test]
fn test_05_bootstrap_from_config_file() {
    let dir = std::env::temp_dir().join(format!("atlas-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("atlas.json");
    std::fs::write(
        &path,
        r#"{
            "environment": "BETA",
            "node_gated": false,
            "genesis": { "parameters": [
                { "key": "CAP", "mutable": true,
                  "value": { "type": "INTEGER", "value": 100 } },
                { "key": "QUORUM_FRACTION", "mutable": false,
                  "value": { "type": "FIXED", "value": "0.30" } },
                { "key": "SUPERMAJORITY_FRACTION", "mutable": false,
                  "value": { "type": "FIXED", "value": "0.66" } },
                { "key": "MAX_VOTING_POWER_FRACTION", "mutable": false,
                  "value": { "type": "FIXED", "value": "0.25" } },
                { "key": "VOTING_WINDOW", "mutable": true,
                  "value": { "type": "INTEGER", "value": 10 } },
                { "key": "TREASURY_ALLOCATION_FRACTION", "mutable": true,
                  "value": { "type": "FIXED", "value": "0.05" } },
                { "key": "TOTAL_SUPPLY", "mutable": false,
                  "value": { "type": "FIXED", "value": "5000" } }
            ] }
        }"#,
    )
    .unwrap();

    let mut ledger = GovernedLedger::from_config_file(&path, signer()).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
    assert_eq!(ledger.environment(), Environment::Beta);
    assert_eq!(ledger.weights().total_supply(), fp("5000"));

    for voter in ["a", "b", "c", "d"] {
        ledger.grant(voter, fp("250")).unwrap();
    }
    let value = ParameterValue::Integer(200);
    let request = ProposalRequest::parameter_change("Raise CAP", keys::CAP, value, "a");
    let id = ledger.propose(request, 5).unwrap();
    for voter in ["a", "b", "c"] {
        ledger.vote(&id, voter, VoteChoice::Yes, 6).unwrap();
    }
    let proof = ledger.execute(&id, 15).unwrap();
    assert_eq!(proof.environment, Environment::Beta);
    ledger.verify_proof(&proof).unwrap();
    assert_eq!(ledger.registry().get_integer(keys::CAP).unwrap(), 200);
}

#[test]
fn test_06_out_of_bounds_allocation_round_halts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut ledger = GovernedLedger::bootstrap(GovernanceConfig::default(), signer()).unwrap();
    let (registry, telemetry) = node_snapshots(&[("node-a", false), ("node-b", false)], 10);
    ledger.install_snapshots(registry, telemetry, 10).unwrap();

    let mut requests = BTreeMap::new();
    requests.insert("node-a".to_string(), fp("0.10"));
    requests.insert("node-b".to_string(), fp("0.150000000000000001"));
    let err = ledger.allocation_round(&requests, 12).unwrap_err();
    let record = err.halt_record().cloned().unwrap();
    assert_eq!(record.code, HaltCode::GuardViolation);
    assert_eq!(record.operation, "allocation_round");
    assert_eq!(record.height, 12);
    assert_eq!(record.context["reason"], "ALLOCATION_OUT_OF_BOUNDS");
    assert_eq!(ledger.halts().len(), 1);

    assert_eq!(ledger.weights().balance_of("node-a"), FixedPoint128::ZERO);
    assert_eq!(ledger.weights().treasury_reserve(), fp("1000000"));
    assert!(ledger.weights().events().is_empty());
    assert_eq!(ledger.grant("node-a", fp("1")).unwrap_err().code(), "CIRCUIT_OPEN");
}

#[test]
fn test_07_vote_height_regression_halts() {
    let mut config = GovernanceConfig::default();
    config.node_gated = false;
    let mut ledger = GovernedLedger::bootstrap(config, signer()).unwrap();
    for voter in ["v1", "v2", "v3", "v4", "v5"] {
        ledger.grant(voter, fp("200")).unwrap();
    }
    let value = ParameterValue::Integer(120);
    let request = ProposalRequest::parameter_change("Raise CAP", keys::CAP, value, "v1");
    let id = ledger.propose(request, 50).unwrap();

    let err = ledger.vote(&id, "v1", VoteChoice::Yes, 40).unwrap_err();
    assert_eq!(err.code(), "HALTED");
    assert_eq!(ledger.halts().len(), 1);
    assert_eq!(ledger.halts()[0].code, HaltCode::TimeRegression);
    assert!(ledger.engine().proposal(&id).unwrap().votes.is_empty());
}
