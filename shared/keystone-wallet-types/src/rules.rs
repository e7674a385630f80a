use alloy_primitives::{Address, B256, U256};

/// Comparison applied between a calldata word and a rule's reference value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Condition {
    Equal = 0,
    LessThanOrEqual = 1,
    LessThan = 2,
    GreaterThanOrEqual = 3,
    GreaterThan = 4,
    NotEqual = 5,
}

impl Condition {
    pub fn holds(self, lhs: U256, rhs: U256) -> bool {
        match self {
            Condition::Equal => lhs == rhs,
            Condition::LessThanOrEqual => lhs <= rhs,
            Condition::LessThan => lhs < rhs,
            Condition::GreaterThanOrEqual => lhs >= rhs,
            Condition::GreaterThan => lhs > rhs,
            Condition::NotEqual => lhs != rhs,
        }
    }
}

impl TryFrom<u8> for Condition {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Condition::*;
        let condition = match value {
            0 => Equal,
            1 => LessThanOrEqual,
            2 => LessThan,
            3 => GreaterThanOrEqual,
            4 => GreaterThan,
            5 => NotEqual,
            _ => return Err(()),
        };
        Ok(condition)
    }
}

/// One argument constraint: the 32-byte word at `4 + offset` in the calldata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamRule {
    pub offset: u16,
    pub condition: Condition,
    pub reference: B256,
}

/// Decoded configuration of the ABI permission sub-validator.
///
/// Packed layout:
/// - `address sessionKey`
/// - `address destination`
/// - `bytes4 selector`
/// - `uint128 valueLimit`
/// - `uint16 rulesCount`
/// - `rulesCount * (uint16 offset, uint8 condition, bytes32 reference)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiPermission {
    pub session_key: Address,
    pub destination: Address,
    pub selector: [u8; 4],
    pub value_limit: u128,
    pub rules: Vec<ParamRule>,
}

pub const PERMISSION_HEADER_LEN: usize = 20 + 20 + 4 + 16 + 2;
pub const PARAM_RULE_LEN: usize = 2 + 1 + 32;
