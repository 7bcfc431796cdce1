// Block height is the only clock.
//
// Heights may repeat (several operations in one block) but never decrease;
// a decrease means two nodes disagree about ordering and trips the breaker.

use crate::halt::{halt_context, HaltCode, HaltHandler, HaltRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("height regression: observed {requested} after {current}")]
pub struct HeightRegression {
    pub current: u64,
    pub requested: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeightClock {
    current: Option<u64>,
}

impl HeightClock {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn starting_at(height: u64) -> Self {
        Self {
            current: Some(height),
        }
    }

    pub fn current(&self) -> Option<u64> {
        self.current
    }

    pub fn observe(&mut self, height: u64) -> Result<u64, HeightRegression> {
        if let Some(current) = self.current {
            if height < current {
                return Err(HeightRegression {
                    current,
                    requested: height,
                });
            }
        }
        self.current = Some(height);
        Ok(height)
    }

    /// `observe`, firing a `TimeRegression` halt on failure.
    pub fn observe_or_halt(
        &mut self,
        height: u64,
        operation: &str,
        halt: &mut HaltHandler,
    ) -> Result<u64, HaltRecord> {
        self.observe(height).map_err(|e| {
            halt.halt(
                HaltCode::TimeRegression,
                operation,
                e.current,
                halt_context(&[
                    ("current", e.current.to_string()),
                    ("requested", e.requested.to_string()),
                ]),
            )
        })
    }
}
