pub mod claim_ledger;
pub mod permission_backup;

pub use claim_ledger::{create_shared_claim_ledger, ClaimLedger, SharedClaimLedger};
pub use permission_backup::PermissionBackup;
