// Atlas ledger core
//
// `GovernedLedger` composes the workspace crates into a single node:
// genesis registry, governance weight, proposals and the circuit breaker.
pub mod ledger;

pub use ledger::GovernedLedger;
