// Exact vote tallying
//
// Quorum:        cast >= quorum_fraction * total_weight
// Supermajority: yes  >= supermajority_fraction * (yes + no)
// Both are decided by wide-integer cross-multiplication, inclusive at the
// boundary. Abstentions count toward quorum only.

use crate::proposal::VoteChoice;
use atlas_math::{ArithmeticError, CertifiedMath, FixedPoint128, OperationLog};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    pub yes: FixedPoint128,
    pub no: FixedPoint128,
    pub abstain: FixedPoint128,
}

impl Tally {
    pub fn record(
        &mut self,
        choice: VoteChoice,
        weight: FixedPoint128,
        log: &mut OperationLog,
    ) -> Result<(), ArithmeticError> {
        let slot = match choice {
            VoteChoice::Yes => &mut self.yes,
            VoteChoice::No => &mut self.no,
            VoteChoice::Abstain => &mut self.abstain,
        };
        *slot = CertifiedMath::add(log, *slot, weight)?;
        Ok(())
    }

    pub fn decisive(&self) -> Result<FixedPoint128, ArithmeticError> {
        self.yes.checked_add(self.no)
    }

    pub fn cast(&self) -> Result<FixedPoint128, ArithmeticError> {
        self.decisive()?.checked_add(self.abstain)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TallyOutcome {
    pub quorum_met: bool,
    pub supermajority_met: bool,
}

impl TallyOutcome {
    pub fn passed(&self) -> bool {
        self.quorum_met && self.supermajority_met
    }
}

/// Evaluate a tally against the snapshot total.
///
/// An empty snapshot meets no quorum; no decisive weight meets no
/// supermajority. Neither case is an error.
pub fn evaluate(
    tally: &Tally,
    total_weight: FixedPoint128,
    quorum_fraction: FixedPoint128,
    supermajority_fraction: FixedPoint128,
    log: &mut OperationLog,
) -> Result<TallyOutcome, ArithmeticError> {
    let cast = tally.cast()?;
    let quorum_met = if total_weight.is_zero() {
        false
    } else {
        CertifiedMath::ratio_at_least(log, cast, total_weight, quorum_fraction)?
    };

    let decisive = tally.decisive()?;
    let supermajority_met = if decisive.is_zero() {
        false
    } else {
        CertifiedMath::ratio_at_least(log, tally.yes, decisive, supermajority_fraction)?
    };

    Ok(TallyOutcome {
        quorum_met,
        supermajority_met,
    })
}
