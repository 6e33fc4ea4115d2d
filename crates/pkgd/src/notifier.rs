//! The default [`KernelNotifier`] this binary wires in when no real
//! kernel filesystem adapter (out of scope per spec.md §1) is attached to
//! the process: it only logs what would have been invalidated.

use pkgd_fskit::KernelNotifier;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl KernelNotifier for LoggingNotifier {
    fn notify_inode(&self, ino: u64, offset: i64, data: &[u8]) {
        tracing::info!(
            ino,
            offset,
            len = data.len(),
            "would invalidate kernel inode (no adapter attached)"
        );
    }
}
