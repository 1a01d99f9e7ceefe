//! Errors describing captures that cannot be stored in a [`Task`].
//!
//! [`Task`]: crate::Task

/// A captured value cannot be stored inline in a [`Task`].
///
/// Loading a closure never fails at run time: the load paths check the
/// capture while the program is compiled, and an oversized or over-aligned
/// capture is a compile error naming one of these variants. This type is
/// returned by [`Task::check_capture`], which lets callers make the same
/// decision themselves (in a `const` context, if they like).
///
/// [`Task`]: crate::Task
/// [`Task::check_capture`]: crate::Task::check_capture
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The capture is larger than the task's inline capacity.
    #[error("a {size}-byte capture exceeds the task's inline capacity of {capacity} bytes")]
    TooLarge {
        /// Size of the captured value, in bytes.
        size: usize,
        /// The task's capture capacity, in bytes.
        capacity: usize,
    },

    /// The capture requires a stricter alignment than the capture buffer has.
    #[error("a capture aligned to {align} bytes exceeds the capture buffer's alignment of {max_align} bytes")]
    Misaligned {
        /// Alignment of the captured value, in bytes.
        align: usize,
        /// Alignment of the task's capture buffer, in bytes.
        max_align: usize,
    },
}
