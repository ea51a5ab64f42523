pub mod audit_logs;
pub mod compliance;
pub mod jobs;
pub mod transactions;
pub mod users;
pub mod wallets;

pub use audit_logs::{AuditLogRepository, PgAuditLogRepository};
pub use compliance::{ComplianceRepository, PgComplianceRepository};
pub use jobs::{JobRepository, PgJobRepository};
pub use transactions::{PgTransactionRepository, TransactionRepository, WithdrawalReservation};
pub use users::{PgUserRepository, UserRepository};
pub use wallets::{PgWalletRepository, WalletRepository};
