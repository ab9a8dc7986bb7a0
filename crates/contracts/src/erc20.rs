alloy_sol_types::sol! {
    /// Subset of ERC-20 whose amounts count against spend limits.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}
