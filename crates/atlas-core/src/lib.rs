// Ledger core: snapshots, node eligibility, the height clock and the circuit breaker
pub mod snapshot;
pub mod node_verifier;
pub mod halt;
pub mod height;

pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_SCHEMA_VERSION};

pub use node_verifier::{
    FailureReason, NodeRecord, NodeVerifier, NotEligibleError, TelemetryRecord,
    VerificationResult, VerifierPolicy,
};

pub use halt::{halt_context, CircuitError, HaltCode, HaltHandler, HaltRecord};

pub use height::{HeightClock, HeightRegression};
