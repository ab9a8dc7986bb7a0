alloy_sol_types::sol! {
    /// External oracle consulted before a guarded key calls a target.
    #[derive(Debug, PartialEq, Eq)]
    interface ICallChecker {
        function canExecute(bytes32 keyHash, address target, bytes calldata data) external view returns (bool);
    }
}
