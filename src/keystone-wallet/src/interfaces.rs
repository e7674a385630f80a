//! Solidity ABI of the account, its modules and the entry point.
//!
//! Every contract on the ledger dispatches its `call` through these definitions, so the calldata
//! a client builds for the real contracts drives the in-memory ones unchanged.

use alloy_sol_types::sol;

sol! {
    interface ISmartAccount {
        function execute(address dest, uint256 value, bytes func) external;
        function executeBatch(address[] dest, uint256[] value, bytes[] func) external;
        function enableModule(address module) external;
        function disableModule(address module) external;
        function setupAndEnableModule(address setupContract, bytes setupData) external returns (address);
        function isModuleEnabled(address module) external view returns (bool);
        function isValidSignature(bytes32 dataHash, bytes signature) external view returns (bytes4);

        error CallerIsNotEntryPointOrSelf(address caller);
        error CallerIsNotSelf(address caller);
        error ModuleNotEnabled(address module);
        error ModuleAlreadyEnabled(address module);
        error InvalidModule(address module);
        error WrongBatchProvided(uint256 destLength, uint256 valueLength, uint256 funcLength);
    }

    interface IOwnershipModule {
        function initForSmartAccount(address eoaOwner) external returns (address);
        function transferOwnership(address owner) external;
        function getOwner(address smartAccount) external view returns (address);

        error AlreadyInitedForSmartAccount(address smartAccount);
        error NoOwnerRegisteredForSmartAccount(address smartAccount);
        error NotEOA(address account);
        error ZeroAddressNotAllowedAsOwner();
    }

    interface ISessionKeyManager {
        function setMerkleRoot(bytes32 merkleRoot) external;
        function getSessionKeys(address smartAccount) external view returns (bytes32);
    }

    interface ISessionKeyManagerHybrid {
        function enableSession(uint48 validUntil, uint48 validAfter, address sessionValidationModule, bytes sessionKeyData) external;
        function disableSession(bytes32 sessionDataDigest) external;
        function isSessionEnabled(address smartAccount, bytes32 sessionDataDigest) external view returns (bool);
    }

    struct TimeFrame {
        uint48 validUntil;
        uint48 validAfter;
    }

    struct RecoverySettings {
        uint8 guardiansCount;
        uint8 recoveryThreshold;
        uint48 securityDelay;
        uint8 recoveriesLeft;
    }

    struct RecoveryRequest {
        bytes32 callDataHash;
        uint48 executeAfter;
    }

    interface IAccountRecoveryModule {
        function initForSmartAccount(
            bytes32[] guardians,
            TimeFrame[] timeFrames,
            uint8 recoveryThreshold,
            uint48 securityDelay,
            uint8 recoveriesAllowed
        ) external returns (address);
        function submitRecoveryRequest(bytes recoveryCallData) external;
        function addGuardian(bytes32 guardian, uint48 validUntil, uint48 validAfter) external;
        function removeGuardian(bytes32 guardian) external;
        function replaceGuardian(bytes32 guardian, bytes32 newGuardian, uint48 validUntil, uint48 validAfter) external;
        function changeGuardianParams(bytes32 guardian, uint48 validUntil, uint48 validAfter) external;
        function setThreshold(uint8 newThreshold) external;
        function setSecurityDelay(uint48 newSecurityDelay) external;
        function setAllowedRecoveries(uint8 allowedRecoveries) external;
        function getGuardianParams(bytes32 guardian, address smartAccount) external view returns (TimeFrame);
        function getSmartAccountSettings(address smartAccount) external view returns (RecoverySettings);
        function getRecoveryRequest(address smartAccount) external view returns (RecoveryRequest);

        error AlreadyInitedForSmartAccount(address smartAccount);
        error NotInitializedForSmartAccount(address smartAccount);
        error InvalidAmountOfGuardianParams();
        error ZeroGuardian();
        error GuardianAlreadySet(bytes32 guardian);
        error GuardianNotSet(bytes32 guardian);
        error TooManyGuardians();
        error ZeroThreshold();
        error ThresholdTooHigh(uint8 threshold, uint8 guardiansCount);
        error InvalidTimeFrame(uint48 validUntil, uint48 validAfter);
        error EmptyRecoveryCallData();
        error NoRecoveriesLeft();
    }

    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256);

        error FailedOp(uint256 opIndex, string reason);
    }

    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
    }
}
