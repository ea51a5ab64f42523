pub mod access_guard;
pub mod assistant;
pub mod audit_service;
pub mod chain_client;
pub mod compliance_engine;
pub mod deposit_memo;
pub mod error;
pub mod ledger;
pub mod notification_service;
pub mod wallet_service;
pub mod withdrawal_service;

#[cfg(test)]
pub mod testing;
