pub use IMultiSigSigner::{
    IMultiSigSignerErrors as MultiSigSignerError, IMultiSigSignerEvents as MultiSigSignerEvent,
};

alloy_sol_types::sol! {
    /// Threshold signature validator for `External` account keys.
    ///
    /// Configs live under `(account, keyHash)`, where `account` is the caller. Owners are key
    /// hashes of the account's own keys and form an ordered multiset: an owner listed twice
    /// holds two slots and carries two votes.
    #[derive(Debug, PartialEq, Eq)]
    interface IMultiSigSigner {
        struct MultisigConfig {
            uint256 threshold;
            bytes32[] owners;
        }

        event ConfigInitialized(address indexed account, bytes32 indexed keyHash, uint256 threshold, bytes32[] owners);
        event OwnerAdded(address indexed account, bytes32 indexed keyHash, bytes32 ownerKeyHash);
        event OwnerRemoved(address indexed account, bytes32 indexed keyHash, bytes32 ownerKeyHash);
        event ThresholdChanged(address indexed account, bytes32 indexed keyHash, uint256 threshold);

        function initConfig(bytes32 keyHash, uint256 threshold, bytes32[] calldata owners) external;

        /// Mutators require the caller to be executing under `keyHash`.
        function addOwner(bytes32 keyHash, bytes32 ownerKeyHash) external;
        function removeOwner(bytes32 keyHash, bytes32 ownerKeyHash) external;
        function setThreshold(bytes32 keyHash, uint256 threshold) external;

        /// Returns a zero threshold and no owners when no config exists.
        function getConfig(address account, bytes32 keyHash) external view returns (MultisigConfig memory config);

        /// Signature is `abi.encode(bytes[])`. Never reverts; returns the fail value instead.
        function isValidSignatureWithKeyHash(bytes32 digest, bytes32 keyHash, bytes calldata signature) external view returns (bytes4);

        // Errors
        error InvalidThreshold();
        error ConfigAlreadySet();
        error InvalidKeyHash();
        error OwnerNotFound();
        error TooManyOwners(uint256 max);
    }
}

