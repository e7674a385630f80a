//! Shared harness for the integration tests: a ledger with every module deployed, one account
//! owned by a deterministic key, and a few mock contracts to call.

#![allow(dead_code)]

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolInterface, SolValue};
use eyre::{eyre, Result};
use keystone_wallet::interfaces::{IERC20::IERC20Calls, IOwnershipModule, ISmartAccount};
use keystone_wallet::ledger::{mapping_slot, SlotKey};
use keystone_wallet::modules::ValidationModule;
use keystone_wallet::{
    AbiSessionValidator, AccountRecoveryModule, BatchedSessionRouter, Contract, EcdsaOwnershipModule, EntryPoint,
    Erc20SessionValidator, HybridSessionManager, Ledger, MerkleSessionManager, Msg, OpOutcome, Revert, SmartAccount,
    ValidationError,
};
use keystone_wallet_encoder::{encode_envelope, LocalSigner};
use keystone_wallet_types::{UserOperation, ValidationData};

pub const CHAIN_ID: u64 = 1;
pub const GENESIS: u64 = 1_700_000_000;

pub const EP: Address = Address::repeat_byte(0xe9);
pub const OWNERSHIP: Address = Address::repeat_byte(0x0e);
pub const MERKLE: Address = Address::repeat_byte(0x3a);
pub const HYBRID: Address = Address::repeat_byte(0x3c);
pub const ROUTER: Address = Address::repeat_byte(0x3d);
pub const RECOVERY: Address = Address::repeat_byte(0x4c);
pub const ERC20_SV: Address = Address::repeat_byte(0x3b);
pub const ABI_SV: Address = Address::repeat_byte(0x3e);
pub const CLOCK_MODULE: Address = Address::repeat_byte(0x6c);
pub const SNOOP_MODULE: Address = Address::repeat_byte(0x6d);

pub const ACCOUNT: Address = Address::repeat_byte(0xac);
pub const TOKEN: Address = Address::repeat_byte(0x70);
pub const NFT: Address = Address::repeat_byte(0x72);
pub const VAULT: Address = Address::repeat_byte(0x7a);

pub const INITIAL_TOKENS: u64 = 1_000_000;

sol! {
    interface IERC721 {
        function setApprovalForAll(address operator, bool approved) external;
        function isApprovedForAll(address owner, address operator) external view returns (bool);
    }

    interface IVault {
        function deposit(uint256 amount) external;
        function deposits(address owner) external view returns (uint256);
    }
}

/// ERC-20 with a public `mint` for setup. Reverts on insufficient balance or allowance.
pub struct MockErc20;

impl MockErc20 {
    fn balance_key(token: Address, owner: Address) -> SlotKey {
        SlotKey::new(token, owner, mapping_slot("erc20.balance", owner))
    }

    fn allowance_key(token: Address, owner: Address, spender: Address) -> SlotKey {
        SlotKey::new(token, owner, mapping_slot("erc20.allowance", spender))
    }

    pub fn balance_of(ledger: &Ledger, token: Address, owner: Address) -> U256 {
        ledger.sload(Self::balance_key(token, owner)).unwrap_or_default()
    }

    pub fn mint(ledger: &mut Ledger, token: Address, to: Address, amount: U256) {
        let balance = Self::balance_of(ledger, token, to) + amount;
        ledger.sstore(Self::balance_key(token, to), &balance);
    }

    fn move_tokens(ledger: &mut Ledger, token: Address, from: Address, to: Address, amount: U256) -> Result<(), Revert> {
        let from_balance = Self::balance_of(ledger, token, from);
        if from_balance < amount {
            return Err(Revert::reason_string("ERC20: transfer amount exceeds balance"));
        }
        ledger.sstore(Self::balance_key(token, from), &(from_balance - amount));
        let to_balance = Self::balance_of(ledger, token, to);
        ledger.sstore(Self::balance_key(token, to), &(to_balance + amount));
        Ok(())
    }
}

impl Contract for MockErc20 {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        let token = msg.to;
        let call = IERC20Calls::abi_decode(&msg.data, true).map_err(|_| Revert::reason_string("ERC20: unknown call"))?;
        match call {
            IERC20Calls::transfer(c) => {
                Self::move_tokens(ledger, token, msg.sender, c.to, c.amount)?;
                Ok(true.abi_encode().into())
            }
            IERC20Calls::approve(c) => {
                ledger.sstore(Self::allowance_key(token, msg.sender, c.spender), &c.amount);
                Ok(true.abi_encode().into())
            }
            IERC20Calls::transferFrom(c) => {
                let key = Self::allowance_key(token, c.from, msg.sender);
                let allowance: U256 = ledger.sload(key).unwrap_or_default();
                if allowance < c.amount {
                    return Err(Revert::reason_string("ERC20: insufficient allowance"));
                }
                ledger.sstore(key, &(allowance - c.amount));
                Self::move_tokens(ledger, token, c.from, c.to, c.amount)?;
                Ok(true.abi_encode().into())
            }
            IERC20Calls::balanceOf(c) => Ok(Self::balance_of(ledger, token, c.owner).abi_encode().into()),
            IERC20Calls::allowance(c) => {
                let allowance: U256 = ledger.sload(Self::allowance_key(token, c.owner, c.spender)).unwrap_or_default();
                Ok(allowance.abi_encode().into())
            }
        }
    }
}

pub struct MockErc721;

impl MockErc721 {
    fn approval_key(nft: Address, owner: Address, operator: Address) -> SlotKey {
        SlotKey::new(nft, owner, mapping_slot("erc721.operator", operator))
    }

    pub fn is_approved_for_all(ledger: &Ledger, nft: Address, owner: Address, operator: Address) -> bool {
        ledger.sload(Self::approval_key(nft, owner, operator)).unwrap_or(false)
    }
}

impl Contract for MockErc721 {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        use IERC721::IERC721Calls;
        match IERC721Calls::abi_decode(&msg.data, true).map_err(|_| Revert::reason_string("ERC721: unknown call"))? {
            IERC721Calls::setApprovalForAll(c) => {
                ledger.sstore(Self::approval_key(msg.to, msg.sender, c.operator), &c.approved);
                Ok(Bytes::new())
            }
            IERC721Calls::isApprovedForAll(c) => Ok(Self::is_approved_for_all(ledger, msg.to, c.owner, c.operator)
                .abi_encode()
                .into()),
        }
    }
}

/// Pulls `TOKEN` from the caller with `transferFrom` and records the deposit.
pub struct MockVault;

impl MockVault {
    fn deposit_key(vault: Address, owner: Address) -> SlotKey {
        SlotKey::new(vault, owner, mapping_slot("vault.deposit", owner))
    }

    pub fn deposits(ledger: &Ledger, vault: Address, owner: Address) -> U256 {
        ledger.sload(Self::deposit_key(vault, owner)).unwrap_or_default()
    }
}

impl Contract for MockVault {
    fn call(&self, ledger: &mut Ledger, msg: &Msg) -> Result<Bytes, Revert> {
        use IVault::IVaultCalls;
        match IVaultCalls::abi_decode(&msg.data, true).map_err(|_| Revert::reason_string("vault: unknown call"))? {
            IVaultCalls::deposit(c) => {
                let pull = keystone_wallet::interfaces::IERC20::transferFromCall {
                    from: msg.sender,
                    to: msg.to,
                    amount: c.amount,
                };
                ledger.call(Msg::new(msg.to, TOKEN, pull.abi_encode()))?;
                let total = Self::deposits(ledger, msg.to, msg.sender) + c.amount;
                ledger.sstore(Self::deposit_key(msg.to, msg.sender), &total);
                Ok(Bytes::new())
            }
            IVaultCalls::deposits(c) => Ok(Self::deposits(ledger, msg.to, c.owner).abi_encode().into()),
        }
    }
}

/// Validation module that consults the block timestamp.
pub struct ClockGatedModule;

impl Contract for ClockGatedModule {
    fn call(&self, _ledger: &mut Ledger, _msg: &Msg) -> Result<Bytes, Revert> {
        Ok(Bytes::new())
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for ClockGatedModule {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        _this: Address,
        _op: &UserOperation,
        _op_hash: B256,
        _signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        if ledger.timestamp() % 2 == 0 {
            Ok(ValidationData::SUCCESS)
        } else {
            Ok(ValidationData::failed())
        }
    }
}

/// Validation module that reads another holder's token balance.
pub struct SnoopingModule;

impl Contract for SnoopingModule {
    fn call(&self, _ledger: &mut Ledger, _msg: &Msg) -> Result<Bytes, Revert> {
        Ok(Bytes::new())
    }

    fn as_validation_module(&self) -> Option<&dyn ValidationModule> {
        Some(self)
    }
}

impl ValidationModule for SnoopingModule {
    fn validate_user_op(
        &self,
        ledger: &mut Ledger,
        _this: Address,
        _op: &UserOperation,
        _op_hash: B256,
        _signature: &[u8],
    ) -> Result<ValidationData, ValidationError> {
        let whale = MockErc20::balance_of(ledger, TOKEN, VAULT);
        Ok(if whale.is_zero() {
            ValidationData::SUCCESS
        } else {
            ValidationData::failed()
        })
    }
}

pub struct Harness {
    pub ledger: Ledger,
    pub entry_point: EntryPoint,
    pub owner: LocalSigner,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::on_chain(CHAIN_ID)
    }

    pub fn on_chain(chain_id: u64) -> Result<Self> {
        let mut ledger = Ledger::new(chain_id, GENESIS);
        let entry_point = EntryPoint::new(EP);
        let code: [(Address, Arc<dyn Contract>); 13] = [
            (EP, Arc::new(entry_point)),
            (OWNERSHIP, Arc::new(EcdsaOwnershipModule)),
            (MERKLE, Arc::new(MerkleSessionManager)),
            (HYBRID, Arc::new(HybridSessionManager)),
            (ROUTER, Arc::new(BatchedSessionRouter)),
            (RECOVERY, Arc::new(AccountRecoveryModule)),
            (ERC20_SV, Arc::new(Erc20SessionValidator)),
            (ABI_SV, Arc::new(AbiSessionValidator)),
            (CLOCK_MODULE, Arc::new(ClockGatedModule)),
            (SNOOP_MODULE, Arc::new(SnoopingModule)),
            (TOKEN, Arc::new(MockErc20)),
            (NFT, Arc::new(MockErc721)),
            (VAULT, Arc::new(MockVault)),
        ];
        for (address, contract) in code {
            ledger.deploy(address, contract).map_err(|r| eyre!("deploy {address}: {r}"))?;
        }

        let owner = LocalSigner::from_label("owner");
        let init = IOwnershipModule::initForSmartAccountCall {
            eoaOwner: owner.address(),
        };
        SmartAccount::deploy(&mut ledger, ACCOUNT, EP, OWNERSHIP, init.abi_encode())
            .map_err(|r| eyre!("account deploy: {r}"))?;
        MockErc20::mint(&mut ledger, TOKEN, ACCOUNT, U256::from(INITIAL_TOKENS));
        ledger.set_balance(ACCOUNT, U256::from(10u64.pow(18)));

        Ok(Self {
            ledger,
            entry_point,
            owner,
        })
    }

    pub fn token_balance(&self, owner: Address) -> U256 {
        MockErc20::balance_of(&self.ledger, TOKEN, owner)
    }

    /// Unsigned operation from `ACCOUNT` at the next nonce of key 0.
    pub fn op(&self, call_data: impl Into<Bytes>) -> UserOperation {
        UserOperation {
            sender: ACCOUNT,
            nonce: self.entry_point.get_nonce(&self.ledger, ACCOUNT, U256::ZERO),
            callData: call_data.into(),
            ..Default::default()
        }
    }

    pub fn hash(&self, op: &UserOperation) -> B256 {
        self.entry_point.get_user_op_hash(&self.ledger, op)
    }

    pub fn sign_as_owner(&self, op: &mut UserOperation) -> Result<()> {
        let sig = self.owner.sign_eth_message(self.hash(op))?;
        op.signature = encode_envelope(sig, OWNERSHIP);
        Ok(())
    }

    pub fn handle(&mut self, op: UserOperation) -> OpOutcome {
        let mut outcomes = self.entry_point.handle_ops(&mut self.ledger, &[op]);
        outcomes.remove(0)
    }

    /// Sign `call_data` with the owner key, run it, and require success.
    pub fn run_as_owner(&mut self, call_data: impl Into<Bytes>) -> Result<()> {
        let mut op = self.op(call_data);
        self.sign_as_owner(&mut op)?;
        match self.handle(op) {
            outcome if outcome.is_success() => Ok(()),
            outcome => Err(eyre!("owner operation failed: {outcome:?}")),
        }
    }

    pub fn enable_module(&mut self, module: Address) -> Result<()> {
        self.run_as_owner(self_call(ISmartAccount::enableModuleCall { module }.abi_encode()))
    }

    pub fn setup_module(&mut self, module: Address, setup: impl Into<Bytes>) -> Result<()> {
        let call = ISmartAccount::setupAndEnableModuleCall {
            setupContract: module,
            setupData: setup.into(),
        };
        self.run_as_owner(self_call(call.abi_encode()))
    }
}

/// `execute(ACCOUNT, 0, inner)`: the account calling itself.
pub fn self_call(inner: impl Into<Bytes>) -> Bytes {
    execute(ACCOUNT, U256::ZERO, inner)
}

pub fn execute(dest: Address, value: U256, func: impl Into<Bytes>) -> Bytes {
    ISmartAccount::executeCall {
        dest,
        value,
        func: func.into(),
    }
    .abi_encode()
    .into()
}

pub fn execute_batch(calls: Vec<(Address, Bytes)>) -> Bytes {
    let (dest, func) = calls.into_iter().unzip();
    ISmartAccount::executeBatchCall {
        dest,
        value: vec![],
        func,
    }
    .abi_encode()
    .into()
}

pub fn erc20_transfer(to: Address, amount: u64) -> Bytes {
    keystone_wallet::interfaces::IERC20::transferCall {
        to,
        amount: U256::from(amount),
    }
    .abi_encode()
    .into()
}
