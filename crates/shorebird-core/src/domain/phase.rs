use serde::{Deserialize, Serialize};

/// Lifecycle phase of a backup.
///
/// Transitions are one-directional:
/// - New -> InProgress -> Completed
/// - New -> InProgress -> Failed
///
/// Externally created objects may carry an empty phase, which means the
/// same thing as New; anything past New is not this reconciler's to touch
/// (another writer claimed it, or it is already done).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupPhase {
    #[default]
    #[serde(alias = "")]
    New,
    InProgress,
    Completed,
    Failed,
}

impl BackupPhase {
    /// Terminal phases are never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, BackupPhase::Completed | BackupPhase::Failed)
    }

    /// Only New (or empty) backups are eligible for claiming.
    pub fn is_new(self) -> bool {
        matches!(self, BackupPhase::New)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_deserializes_as_new() {
        let phase: BackupPhase = serde_json::from_str("\"\"").unwrap();
        assert_eq!(phase, BackupPhase::New);
    }

    #[test]
    fn terminal_set() {
        assert!(BackupPhase::Completed.is_terminal());
        assert!(BackupPhase::Failed.is_terminal());
        assert!(!BackupPhase::New.is_terminal());
        assert!(!BackupPhase::InProgress.is_terminal());
    }
}
