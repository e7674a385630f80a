//! Validation-phase access rules.
//!
//! A bundler can only trust a simulated validation if re-running it later gives the same answer.
//! While a trace is active the ledger reports every environment read and storage access here,
//! and anything outside the sender's own state is recorded as a violation.

use alloy_primitives::{Address, B256};
use serde::Serialize;

use crate::ledger::SlotKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Opcode {
    Timestamp,
    Number,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RuleViolation {
    /// Environment read whose value changes between simulation and inclusion.
    BannedOpcode { opcode: Opcode },
    /// Storage neither owned by nor associated with the sender.
    UnassociatedStorage {
        contract: Address,
        account: Address,
        slot: B256,
    },
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleViolation::BannedOpcode { opcode } => {
                write!(f, "validation used banned opcode {opcode:?}")
            }
            RuleViolation::UnassociatedStorage { contract, account, .. } => write!(
                f,
                "validation accessed storage of {contract} associated with {account}"
            ),
        }
    }
}

#[derive(Debug)]
pub struct ValidationTracer {
    sender: Address,
    violations: Vec<RuleViolation>,
}

impl ValidationTracer {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            violations: Vec::new(),
        }
    }

    pub fn on_opcode(&mut self, opcode: Opcode) {
        self.record(RuleViolation::BannedOpcode { opcode });
    }

    pub fn on_storage(&mut self, key: SlotKey) {
        if key.contract == self.sender || key.account == self.sender {
            return;
        }
        self.record(RuleViolation::UnassociatedStorage {
            contract: key.contract,
            account: key.account,
            slot: key.slot,
        });
    }

    fn record(&mut self, violation: RuleViolation) {
        if !self.violations.contains(&violation) {
            self.violations.push(violation);
        }
    }

    pub fn finish(self) -> Vec<RuleViolation> {
        self.violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_and_associated_storage_is_allowed() {
        let sender = Address::repeat_byte(1);
        let module = Address::repeat_byte(2);
        let mut tracer = ValidationTracer::new(sender);
        tracer.on_storage(SlotKey::new(sender, Address::ZERO, B256::ZERO));
        tracer.on_storage(SlotKey::new(module, sender, B256::ZERO));
        assert!(tracer.finish().is_empty());
    }

    #[test]
    fn violations_are_deduplicated() {
        let mut tracer = ValidationTracer::new(Address::repeat_byte(1));
        tracer.on_opcode(Opcode::Timestamp);
        tracer.on_opcode(Opcode::Timestamp);
        let foreign = SlotKey::new(Address::repeat_byte(2), Address::repeat_byte(3), B256::ZERO);
        tracer.on_storage(foreign);
        tracer.on_storage(foreign);
        let violations = tracer.finish();
        assert_eq!(violations.len(), 2);
        let json = serde_json::to_value(&violations[0]).unwrap();
        assert_eq!(json["kind"], "bannedOpcode");
        assert_eq!(json["opcode"], "TIMESTAMP");
    }
}
