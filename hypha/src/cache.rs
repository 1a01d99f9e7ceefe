use core::mem;

#[cfg(any(
    all(feature = "cache-line-32", feature = "cache-line-64"),
    all(feature = "cache-line-32", feature = "cache-line-128"),
    all(feature = "cache-line-64", feature = "cache-line-128"),
))]
compile_error!("at most one of the `cache-line-32`, `cache-line-64`, and `cache-line-128` features may be enabled");

/// The size of a cache line on the target, in bytes.
///
/// Every [`Task`](crate::Task) is exactly this long and aligned to this
/// boundary, so adjacent tasks in an array never share a cache line.
///
/// This is 64 bytes unless the `cache-line-32` or `cache-line-128` crate
/// feature is enabled. 64 bytes is the L1 line size of the common x86_64
/// and aarch64 parts; 32-byte lines are found on many 32-bit embedded cores,
/// and some server parts prefetch in 128-byte pairs of lines.
pub const CACHE_LINE_SIZE: usize = if cfg!(feature = "cache-line-32") {
    32
} else if cfg!(feature = "cache-line-128") {
    128
} else {
    64
};

/// The largest alignment a captured value may require.
///
/// The capture buffer starts right after the task's two trampoline pointers,
/// so it is aligned to twice the pointer width.
pub const MAX_CAPTURE_ALIGN: usize = 2 * mem::size_of::<usize>();

/// Returns the capture capacity of a task whose metadata tag is
/// `meta_size` bytes long.
pub(crate) const fn capacity_for(meta_size: usize) -> usize {
    CACHE_LINE_SIZE - MAX_CAPTURE_ALIGN - meta_size
}

const _: () = assert!(
    CACHE_LINE_SIZE.is_power_of_two() && CACHE_LINE_SIZE % MAX_CAPTURE_ALIGN == 0,
    "the cache-line size must be a power of two multiple of two pointers"
);
