use crate::domain::ObjectKey;

/// Change-notification observer for backup objects.
///
/// The cache calls these as objects appear and change; the agent's
/// implementation feeds both straight into the work queue. Handlers must
/// not block: enqueueing is a set insert, nothing more.
pub trait BackupEvents: Send + Sync {
    fn on_add(&self, key: ObjectKey);

    fn on_update(&self, key: ObjectKey);
}
