//! Tool permissions
//!
//! Stored per-project decisions and the approval workflow built on them.

pub mod store;
pub mod approval;

// Re-export commonly used types
pub use store::{
    FilePermissionStore, MemoryPermissionStore, PermissionLevel, PermissionRecord,
    PermissionStore,
};
pub use approval::{
    decode_arguments, ApprovalCoordinator, ApprovalDecision, ApprovalOutcome, ApprovalRequest,
    ApprovalResponse, DecodedArguments,
};
