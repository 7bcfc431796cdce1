/// GOVERNED LEDGER
///
/// Single-node composition of the core: genesis registry, governance weight,
/// proposal engine, constitutional guard and circuit breaker, wired from one
/// `GovernanceConfig`. Bootstrap errors are reported with `anyhow`; every
/// operation after bootstrap returns typed errors.
use anyhow::{anyhow, Context};
use atlas_core::{
    halt_context, CircuitError, HaltCode, HaltHandler, HaltRecord, NodeRecord, NodeVerifier,
    Snapshot, SnapshotError, TelemetryRecord,
};
use atlas_crypto::{Environment, SignatureBackend};
use atlas_economics::{
    AllocationRound, EconomicsGuard, GovernanceWeightLedger, InvariantChecker, InvariantReport,
};
use atlas_governance::{
    keys, ExecutionContext, ExecutionProof, GovernanceConfig, GovernanceError, ParameterRegistry,
    ProofError, ProposalEngine, ProposalRequest, ProposalState, VoteChoice, VoterGate,
};
use atlas_math::{run_self_test, CertifiedMath, FixedPoint128, OperationLog};
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::Path;

const ALLOCATION_ROUND: &str = "allocation_round";

pub struct GovernedLedger {
    config: GovernanceConfig,
    registry: ParameterRegistry,
    weights: GovernanceWeightLedger,
    engine: ProposalEngine,
    guard: EconomicsGuard,
    halt: HaltHandler,
    signer: Box<dyn SignatureBackend>,
    verifier: Option<NodeVerifier>,
    allocation_log: OperationLog,
}

impl GovernedLedger {
    /// Run the math self-test, build the genesis registry and seed the
    /// treasury with `TOTAL_SUPPLY`.
    pub fn bootstrap(
        config: GovernanceConfig,
        signer: Box<dyn SignatureBackend>,
    ) -> anyhow::Result<Self> {
        config.validate().context("governance configuration rejected")?;
        run_self_test().context("fixed-point self-test failed")?;

        let registry = config.genesis_registry().context("genesis registry")?;
        let total_supply = registry
            .get_fixed(keys::TOTAL_SUPPLY)
            .context("genesis must define a fixed-point TOTAL_SUPPLY")?;
        if total_supply.is_zero() {
            return Err(anyhow!("TOTAL_SUPPLY must be positive"));
        }

        info!(
            "bootstrapped {} ledger: {} parameters, supply {}, registry commitment {}",
            config.environment,
            registry.len(),
            total_supply,
            registry.commitment_hash().context("registry commitment")?
        );
        Ok(Self {
            guard: EconomicsGuard::new(config.allocation_bounds),
            halt: HaltHandler::new(config.environment),
            weights: GovernanceWeightLedger::new(total_supply),
            engine: ProposalEngine::new(),
            verifier: None,
            allocation_log: OperationLog::new(),
            registry,
            signer,
            config,
        })
    }

    pub fn from_config_file(
        path: &Path,
        signer: Box<dyn SignatureBackend>,
    ) -> anyhow::Result<Self> {
        let config = GovernanceConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?;
        Self::bootstrap(config, signer)
    }

    /// Replace the node verifier. An invalid snapshot halts the circuit and
    /// keeps the previous verifier.
    pub fn install_snapshots(
        &mut self,
        registry: Snapshot<NodeRecord>,
        telemetry: Snapshot<TelemetryRecord>,
        height: u64,
    ) -> Result<(), GovernanceError> {
        match NodeVerifier::new(registry, telemetry, self.config.verifier.clone()) {
            Ok(verifier) => {
                info!("node snapshots installed at height {}", height);
                self.verifier = Some(verifier);
                Ok(())
            }
            Err(e) => Err(self.snapshot_halt(&e, height)),
        }
    }

    /// As `install_snapshots`, from the JSON artifacts.
    pub fn install_snapshots_json(
        &mut self,
        registry_json: &str,
        telemetry_json: &str,
        height: u64,
    ) -> Result<(), GovernanceError> {
        let parsed: Result<(Snapshot<NodeRecord>, Snapshot<TelemetryRecord>), serde_json::Error> =
            serde_json::from_str(registry_json).and_then(|registry| {
                serde_json::from_str(telemetry_json).map(|telemetry| (registry, telemetry))
            });
        match parsed {
            Ok((registry, telemetry)) => self.install_snapshots(registry, telemetry, height),
            Err(e) => {
                let error = SnapshotError::Serialization(e.to_string());
                Err(self.snapshot_halt(&error, height))
            }
        }
    }

    fn snapshot_halt(&mut self, error: &SnapshotError, height: u64) -> GovernanceError {
        let record = self.halt.halt(
            HaltCode::SnapshotInvalid,
            "install_snapshots",
            height,
            halt_context(&[("reason", error.code().to_string()), ("detail", error.to_string())]),
        );
        GovernanceError::Halted(Box::new(record))
    }

    /// Grant each requesting node its fraction of the treasury allocation
    /// pool (`treasury reserve × TREASURY_ALLOCATION_FRACTION`).
    ///
    /// Grants are applied all together or not at all. A bound violation, an
    /// arithmetic failure or a ledger failure halts the circuit.
    pub fn allocation_round(
        &mut self,
        requests: &BTreeMap<String, FixedPoint128>,
        height: u64,
    ) -> Result<AllocationRound, GovernanceError> {
        self.halt.ensure_closed()?;
        let verifier = self.verifier.as_ref().ok_or(GovernanceError::VerifierUnavailable)?;
        let mut weights = self.weights.clone();
        let outcome = allocate(
            &self.registry,
            &self.guard,
            verifier,
            &mut weights,
            requests,
            &mut self.allocation_log,
        );
        match outcome {
            Ok(round) => {
                self.weights = weights;
                Ok(round)
            }
            Err((code, reason, detail)) => {
                let record = self.halt.halt(
                    code,
                    ALLOCATION_ROUND,
                    height,
                    halt_context(&[("reason", reason.to_string()), ("detail", detail)]),
                );
                Err(GovernanceError::Halted(Box::new(record)))
            }
        }
    }

    /// Direct treasury grant, outside any allocation round.
    pub fn grant(&mut self, account: &str, amount: FixedPoint128) -> Result<(), GovernanceError> {
        self.halt.ensure_closed()?;
        self.weights.allocate(account, amount, &mut self.allocation_log)?;
        Ok(())
    }

    pub fn propose(
        &mut self,
        request: ProposalRequest,
        height: u64,
    ) -> Result<String, GovernanceError> {
        let snapshot = self.weights.snapshot(height)?;
        self.engine
            .create_proposal(request, snapshot, &self.registry, height, &mut self.halt)
    }

    pub fn vote(
        &mut self,
        proposal_id: &str,
        voter: &str,
        choice: VoteChoice,
        height: u64,
    ) -> Result<(), GovernanceError> {
        let gate = if self.config.node_gated {
            match &self.verifier {
                Some(verifier) => VoterGate::NodeGated(verifier),
                None => {
                    warn!("vote by {} refused: no node snapshot installed", voter);
                    return Err(GovernanceError::VerifierUnavailable);
                }
            }
        } else {
            VoterGate::Open
        };
        self.engine.cast_vote(
            proposal_id,
            voter,
            choice,
            height,
            &self.registry,
            gate,
            &mut self.halt,
        )
    }

    pub fn check_passed(&mut self, proposal_id: &str) -> Result<bool, GovernanceError> {
        self.engine.check_passed(proposal_id, &self.registry)
    }

    pub fn expire_stale(
        &mut self,
        height: u64,
    ) -> Result<Vec<(String, ProposalState)>, GovernanceError> {
        self.engine.expire_stale(height, &self.registry, &mut self.halt)
    }

    pub fn execute(
        &mut self,
        proposal_id: &str,
        height: u64,
    ) -> Result<ExecutionProof, GovernanceError> {
        let checkpoint = self.weights.checkpoint()?;
        self.engine.execute_proposal(
            proposal_id,
            ExecutionContext {
                registry: &mut self.registry,
                guard: &self.guard,
                checkpoint: &checkpoint,
                events: self.weights.events(),
                signer: self.signer.as_ref(),
                environment: self.config.environment,
                halt: &mut self.halt,
                height,
            },
        )
    }

    pub fn verify_proof(&self, proof: &ExecutionProof) -> Result<(), ProofError> {
        self.engine
            .verify_proof(proof, self.signer.as_ref(), self.config.environment)
    }

    /// Ledger invariants plus the voting cap on every proposal still
    /// collecting or awaiting execution.
    pub fn check_invariants(&self) -> Result<InvariantReport, GovernanceError> {
        let checkpoint = self.weights.checkpoint()?;
        let cap = self.registry.get_fixed(keys::MAX_VOTING_POWER_FRACTION)?;
        let mut report = InvariantChecker::check_all(
            self.weights.events(),
            &checkpoint,
            &BTreeMap::new(),
            FixedPoint128::ONE,
            cap,
        );
        for proposal in self.engine.proposals() {
            if matches!(proposal.state, ProposalState::Voting | ProposalState::Passed) {
                report.violations.extend(InvariantChecker::check_voting_cap(
                    &proposal.vote_weights(),
                    proposal.snapshot.total_weight,
                    cap,
                ));
            }
        }
        Ok(report)
    }

    pub fn acknowledge_halt(&mut self, sequence: u64) -> Result<(), CircuitError> {
        self.halt.acknowledge(sequence)
    }

    pub fn halts(&self) -> &[HaltRecord] {
        self.halt.records()
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn weights(&self) -> &GovernanceWeightLedger {
        &self.weights
    }

    pub fn engine(&self) -> &ProposalEngine {
        &self.engine
    }

    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    /// Certified operations from governance and from treasury allocation.
    pub fn operation_logs(&self) -> (&OperationLog, &OperationLog) {
        (self.engine.log(), &self.allocation_log)
    }
}

/// One allocation round against a working copy of the weight ledger. Errors
/// carry the halt code, the error code and its message.
fn allocate(
    registry: &ParameterRegistry,
    guard: &EconomicsGuard,
    verifier: &NodeVerifier,
    weights: &mut GovernanceWeightLedger,
    requests: &BTreeMap<String, FixedPoint128>,
    log: &mut OperationLog,
) -> Result<AllocationRound, (HaltCode, &'static str, String)> {
    let fraction = registry
        .get_fixed(keys::TREASURY_ALLOCATION_FRACTION)
        .map_err(|e| (HaltCode::RegistryViolation, e.code(), e.to_string()))?;
    let pool = CertifiedMath::mul(log, weights.treasury_reserve(), fraction)
        .map_err(|e| (HaltCode::ArithmeticFailure, e.code(), e.to_string()))?;
    let round = guard
        .allocate_round(pool, requests, verifier, log)
        .map_err(|e| (HaltCode::GuardViolation, e.code(), e.to_string()))?;
    for (node, amount) in &round.grants {
        weights
            .allocate(node, *amount, log)
            .map_err(|e| (HaltCode::InvariantViolation, e.code(), e.to_string()))?;
    }
    Ok(round)
}
