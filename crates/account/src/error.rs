use alloy::{
    primitives::{Address, Bytes},
    sol_types::SolInterface,
};
use keyguard_contracts::{AccountError, MultiSigSignerError};

/// Top-level error for account operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyguardError {
    /// Error from the account: key registry, guarded executor or spend ledger
    #[error("Account error: {0:?}")]
    Account(AccountError),

    /// Error from the multisig signer
    #[error("Multisig signer error: {0:?}")]
    MultiSigSigner(MultiSigSignerError),

    /// A dispatched call reverted with `data`
    #[error("Call to {target} reverted")]
    CallReverted { target: Address, data: Bytes },

    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Result type alias for account operations
pub type Result<T> = std::result::Result<T, KeyguardError>;

impl KeyguardError {
    /// ABI-encoded revert payload, or `None` for fatal errors.
    pub fn revert_data(&self) -> Option<Bytes> {
        match self {
            Self::Account(err) => Some(err.abi_encode().into()),
            Self::MultiSigSigner(err) => Some(err.abi_encode().into()),
            Self::CallReverted { data, .. } => Some(data.clone()),
            Self::Fatal(_) => None,
        }
    }
}

impl From<AccountError> for KeyguardError {
    fn from(err: AccountError) -> Self {
        Self::Account(err)
    }
}

impl From<MultiSigSignerError> for KeyguardError {
    fn from(err: MultiSigSignerError) -> Self {
        Self::MultiSigSigner(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolError;
    use keyguard_contracts::IAccount;

    #[test]
    fn revert_data_carries_selector() {
        let err: KeyguardError = AccountError::unauthorized().into();
        let data = err.revert_data().unwrap();
        assert_eq!(data.as_ref(), IAccount::Unauthorized::SELECTOR.as_slice());

        let err: KeyguardError = MultiSigSignerError::owner_not_found().into();
        assert_eq!(err.revert_data().unwrap().len(), 4);

        assert_eq!(KeyguardError::Fatal("boom".into()).revert_data(), None);
    }
}
