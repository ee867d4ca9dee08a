//! SQLite storage layer for the GIRO license server.
//!
//! The store is the single source of truth for licenses, hardware
//! bindings, the append-only validation audit, and the auth tables
//! (admin accounts, sessions, API keys). The hardware seat-count
//! invariant is enforced here and nowhere else: `activate_seat` runs its
//! quota check and insert inside one `BEGIN IMMEDIATE` transaction, so
//! two concurrent activations for the last seat can never both succeed,
//! even from separate server processes.

mod error;
mod records;
mod store;

pub use error::{StoreError, StoreResult};
pub use records::{
    ActivateOutcome, AdminRecord, AuditAction, AuditRecord, BindingRecord, CreateOutcome,
    LicenseRecord, LicenseStats, NewAudit, NewLicense, RevokeOutcome, TransferOutcome,
    ValidateOutcome,
};
pub use store::LicenseStore;
