pub mod record;
pub mod task;

pub use record::{ArtifactKind, BackupRecord, RunStatus, VerificationStatus};
pub use task::{BackupMode, BackupScope, BackupTask, BackupType, StorageType};
