//! Host privilege detection.
//!
//! Ownership recorded in layer archives can only be applied by root; an
//! unprivileged extraction leaves files owned by the invoking user.

/// Whether the current process runs with an effective uid of 0.
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
