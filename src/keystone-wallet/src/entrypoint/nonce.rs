//! Two-dimensional nonces: `key (192 bits) || sequence (64 bits)`, one sequence per key.

use alloy_primitives::{Address, U256};

use crate::ledger::{mapping_slot, Ledger, SlotKey};

const SEQUENCE: &str = "entrypoint.nonce";

/// How a nonce is compared to the stored sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceCheck {
    /// Inclusion: the nonce must be the next one.
    Exact,
    /// Mempool admission: the nonce may be ahead of the ledger.
    AtLeast,
}

fn sequence_key(entry_point: Address, sender: Address, key: U256) -> SlotKey {
    SlotKey::new(entry_point, sender, mapping_slot(SEQUENCE, key.to_be_bytes::<32>()))
}

pub fn sequence(ledger: &Ledger, entry_point: Address, sender: Address, key: U256) -> u64 {
    ledger.sload(sequence_key(entry_point, sender, key)).unwrap_or(0)
}

/// Check the nonce and, for exact checks, consume it.
pub fn validate_and_update(
    ledger: &mut Ledger,
    entry_point: Address,
    sender: Address,
    key: U256,
    seq: u64,
    check: NonceCheck,
) -> bool {
    let current = sequence(ledger, entry_point, sender, key);
    match check {
        NonceCheck::Exact if seq == current => {
            ledger.sstore(sequence_key(entry_point, sender, key), &(current + 1));
            true
        }
        NonceCheck::Exact => false,
        NonceCheck::AtLeast => seq >= current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_independent() {
        let mut ledger = Ledger::new(1, 0);
        let ep = Address::repeat_byte(0xe9);
        let sender = Address::repeat_byte(1);
        let key = U256::from(7);
        assert!(validate_and_update(&mut ledger, ep, sender, key, 0, NonceCheck::Exact));
        assert!(!validate_and_update(&mut ledger, ep, sender, key, 0, NonceCheck::Exact));
        assert!(validate_and_update(&mut ledger, ep, sender, U256::ZERO, 0, NonceCheck::Exact));
        assert_eq!(sequence(&ledger, ep, sender, key), 1);
        assert!(validate_and_update(&mut ledger, ep, sender, key, 5, NonceCheck::AtLeast));
        assert!(!validate_and_update(&mut ledger, ep, sender, key, 0, NonceCheck::AtLeast));
        assert_eq!(sequence(&ledger, ep, sender, key), 1);
    }
}
