//! Validation data returned by every validation module.
//!
//! Packed word (ERC-4337): `authorizer (160 bits) | validUntil << 160 | validAfter << 208`.
//! `authorizer == 1` flags a signature failure. A zero `validUntil` means "no upper bound".

use alloy_primitives::U256;

pub const MAX_UINT48: u64 = (1 << 48) - 1;

/// `validateUserOp` return for success (no time bounds).
pub const SIG_VALIDATION_SUCCESS: U256 = U256::ZERO;
/// `validateUserOp` return for signature failure.
pub const SIG_VALIDATION_FAILED: U256 = U256::from_limbs([1, 0, 0, 0]);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationData {
    pub sig_failed: bool,
    pub valid_until: u64,
    pub valid_after: u64,
}

impl ValidationData {
    pub const SUCCESS: Self = Self {
        sig_failed: false,
        valid_until: 0,
        valid_after: 0,
    };

    pub const fn failed() -> Self {
        Self {
            sig_failed: true,
            valid_until: 0,
            valid_after: 0,
        }
    }

    pub const fn window(valid_until: u64, valid_after: u64) -> Self {
        Self {
            sig_failed: false,
            valid_until,
            valid_after,
        }
    }

    pub fn pack(&self) -> U256 {
        let authorizer = if self.sig_failed { U256::from(1u8) } else { U256::ZERO };
        authorizer
            | U256::from(self.valid_until & MAX_UINT48) << 160
            | U256::from(self.valid_after & MAX_UINT48) << 208
    }

    pub fn unpack(word: U256) -> Self {
        let authorizer_mask = (U256::from(1u8) << 160) - U256::from(1u8);
        let uint48_mask = U256::from(MAX_UINT48);
        let valid_until: U256 = (word >> 160) & uint48_mask;
        let valid_after: U256 = (word >> 208) & uint48_mask;
        Self {
            sig_failed: (word & authorizer_mask) != U256::ZERO,
            valid_until: valid_until.to::<u64>(),
            valid_after: valid_after.to::<u64>(),
        }
    }

    /// Half-open window check: `validAfter <= now < validUntil`, zero disabling a bound.
    pub fn is_active_at(&self, now: u64) -> bool {
        now >= self.valid_after && (self.valid_until == 0 || now < self.valid_until)
    }

    /// True when the window closes before `deadline` (an unbounded window never does).
    pub fn expires_before(&self, deadline: u64) -> bool {
        self.valid_until != 0 && self.valid_until <= deadline
    }

    /// Combine two results: any failure fails, and the windows intersect.
    pub fn intersect(self, other: Self) -> Self {
        let valid_until = match (self.valid_until, other.valid_until) {
            (0, b) => b,
            (a, 0) => a,
            (a, b) => a.min(b),
        };
        Self {
            sig_failed: self.sig_failed || other.sig_failed,
            valid_until,
            valid_after: self.valid_after.max(other.valid_after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_matches_entry_point_layout() {
        assert_eq!(ValidationData::SUCCESS.pack(), SIG_VALIDATION_SUCCESS);
        assert_eq!(ValidationData::failed().pack(), SIG_VALIDATION_FAILED);

        let data = ValidationData::window(2_000, 1_000);
        let word = data.pack();
        assert_eq!(word >> 208, U256::from(1_000u64));
        assert_eq!(ValidationData::unpack(word), data);
    }

    #[test]
    fn zero_bounds_are_unbounded() {
        let open = ValidationData::SUCCESS;
        assert!(open.is_active_at(0));
        assert!(open.is_active_at(u64::MAX));
    }

    #[test]
    fn window_closes_exactly_at_valid_until() {
        let data = ValidationData::window(200, 100);
        assert!(!data.is_active_at(99));
        assert!(data.is_active_at(100));
        assert!(data.is_active_at(199));
        assert!(!data.is_active_at(200));
        assert!(!data.is_active_at(201));
    }

    #[test]
    fn intersect_takes_the_tightest_bounds() {
        let a = ValidationData::window(0, 50);
        let b = ValidationData::window(300, 10);
        let c = ValidationData::window(200, 0);
        let merged = a.intersect(b).intersect(c);
        assert_eq!(merged, ValidationData::window(200, 50));
        assert!(a.intersect(ValidationData::failed()).sig_failed);
    }
}
