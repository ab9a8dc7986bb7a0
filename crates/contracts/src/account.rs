pub use IAccount::{IAccountErrors as AccountError, IAccountEvents as AccountEvent};

alloy_sol_types::sol! {
    /// Keyguard account interface.
    ///
    /// The account is administered exclusively through calls it makes to itself:
    /// - keys of several signature types are authorized, optionally with an expiry,
    ///   and may be flagged as super admins
    /// - non super admin keys may only call whitelisted `(target, selector)` pairs
    /// - call checkers can veto individual calls beyond the static whitelist
    /// - spend limits cap how much of an asset a key moves per calendar window
    #[derive(Debug, PartialEq, Eq)]
    interface IAccount {
        enum KeyType {
            P256,
            WebAuthnP256,
            Secp256k1,
            External,
        }

        enum SpendPeriod {
            Minute,
            Hour,
            Day,
            Week,
            Month,
            Year,
            Forever,
        }

        /// Key record. `expiry == 0` means the key never expires.
        struct Key {
            uint64 expiry;
            KeyType keyType;
            bool isSuperAdmin;
            bytes publicKey;
        }

        struct Call {
            address to;
            uint256 value;
            bytes data;
        }

        struct SpendInfo {
            address token;
            SpendPeriod period;
            uint256 limit;
            uint256 spent;
            uint64 windowStart;
            uint64 currentWindowStart;
            uint256 currentSpent;
        }

        struct CanExecuteEntry {
            address target;
            bytes4 fnSel;
        }

        struct CallCheckerInfo {
            address target;
            address checker;
        }

        event Authorized(bytes32 indexed keyHash, Key key);
        event Revoked(bytes32 indexed keyHash);
        event CanExecuteSet(bytes32 indexed keyHash, address target, bytes4 fnSel, bool can);
        event CallCheckerSet(bytes32 indexed keyHash, address target, address checker);
        event SpendLimitSet(bytes32 indexed keyHash, address token, SpendPeriod period, uint256 limit);
        event SpendLimitRemoved(bytes32 indexed keyHash, address token, SpendPeriod period);
        event SpendLimitsEnabledSet(bytes32 indexed keyHash, bool enabled);
        event Executed(bytes32 indexed keyHash, bytes32 digest, uint256 calls);

        /// Authorizes `key` and returns its key hash. Re-authorizing overwrites the record.
        function authorize(Key memory key) external returns (bytes32 keyHash);

        /// Revokes the key together with every permission and spend limit attached to it.
        function revoke(bytes32 keyHash) external;

        function getKey(bytes32 keyHash) external view returns (Key memory key);
        function getKeys() external view returns (Key[] memory keys, bytes32[] memory keyHashes);

        function setCanExecute(bytes32 keyHash, address target, bytes4 fnSel, bool can) external;
        function canExecute(bytes32 keyHash, address target, bytes calldata data) external view returns (bool);
        function canExecuteEntries(bytes32 keyHash) external view returns (CanExecuteEntry[] memory entries);

        /// Sets the checker consulted for calls to `target`. The zero address removes it.
        function setCallChecker(bytes32 keyHash, address target, address checker) external;
        function callCheckerInfos(bytes32 keyHash) external view returns (CallCheckerInfo[] memory infos);

        function setSpendLimit(bytes32 keyHash, address token, SpendPeriod period, uint256 limit) external;
        function removeSpendLimit(bytes32 keyHash, address token, SpendPeriod period) external;
        function setSpendLimitsEnabled(bytes32 keyHash, bool enabled) external;
        function spendInfos(bytes32 keyHash) external view returns (SpendInfo[] memory infos);

        /// Digest a key signs to authorize `calls` on this account.
        function computeDigest(Call[] calldata calls) external view returns (bytes32);

        // Errors
        error KeyDoesNotExist();
        error KeyExpired();
        error Unauthorized();
        error CheckerRejected(address checker);
        error ExceedsLimit(address token);
        error NoSpendPermissions(address token);
        error InvalidSignature();
        error InvalidPublicKey();
        error CannotSelfExecute();
        error SuperAdminCanExecuteEverything();
        error FnSelectorNotRecognized(bytes4 selector);
        error BatchTooLarge(uint256 len, uint256 max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use alloy_sol_types::{SolCall, SolError, SolInterface};

    #[test]
    fn errors_encode_with_selector() {
        let token = Address::repeat_byte(0x11);
        let encoded = AccountError::exceeds_limit(token).abi_encode();
        assert_eq!(&encoded[..4], IAccount::ExceedsLimit::SELECTOR.as_slice());

        let decoded = AccountError::abi_decode(&encoded).unwrap();
        assert_eq!(decoded, AccountError::exceeds_limit(token));
    }

    #[test]
    fn authorize_call_round_trips_key_type() {
        let call = IAccount::authorizeCall {
            key: IAccount::Key {
                expiry: 0,
                keyType: IAccount::KeyType::External,
                isSuperAdmin: false,
                publicKey: vec![0xab; 32].into(),
            },
        };
        let decoded = IAccount::authorizeCall::abi_decode(&call.abi_encode()).unwrap();
        assert_eq!(decoded.key.keyType, IAccount::KeyType::External);
    }
}
