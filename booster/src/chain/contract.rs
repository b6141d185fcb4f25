//! Bindings for the BGT contract methods used by the booster.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};

sol! {
    #[allow(missing_docs)]
    interface BGT {
        function activateBoostDelay() external view returns (uint32);
        function unboostedBalanceOf(address account) external view returns (uint256);
        function boostedQueue(address operator, bytes calldata pubkey)
            external
            view
            returns (uint32 blockNumber, uint256 balance);
        function queueBoost(bytes calldata pubkey, uint256 amount) external;
        function activateBoost(address operator, bytes calldata pubkey) external;
    }
}

/// Call data for `queueBoost(pubkey, amount)`.
pub fn queue_boost(pubkey: Bytes, amount: U256) -> Bytes {
    BGT::queueBoostCall { pubkey, amount }.abi_encode().into()
}

/// Call data for `activateBoost(operator, pubkey)`.
pub fn activate_boost(operator: Address, pubkey: Bytes) -> Bytes {
    BGT::activateBoostCall { operator, pubkey }.abi_encode().into()
}
