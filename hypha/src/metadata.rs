//! Metadata tags carried alongside a [`Task`]'s capture.
//!
//! [`Task`]: crate::Task
use crate::cache::capacity_for;
use core::{
    fmt,
    mem::{self, MaybeUninit},
};

/// An integer type that may be used as a [`Task`]'s metadata tag.
///
/// The tag is stored in the last bytes of the task, so a wider tag leaves
/// less room for captured state: a task's capture capacity is
/// [`CACHE_LINE_SIZE`] minus two pointers minus `size_of::<Self>()`.
///
/// This trait is sealed, and implemented for the fixed-width integer types
/// `u8`, `u16`, `u32`, `u64`, `i8`, `i16`, `i32` and `i64`.
///
/// [`Task`]: crate::Task
/// [`CACHE_LINE_SIZE`]: crate::CACHE_LINE_SIZE
pub trait Metadata:
    Copy + Eq + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static + sealed::Sealed
{
    /// The smallest value representable by this type.
    const MIN: Self;
    /// The largest value representable by this type.
    const MAX: Self;
    /// Zero; the tag of a newly constructed task.
    const ZERO: Self;

    /// Number of bytes available for captured state in a task tagged with
    /// this type.
    const CAPACITY: usize;

    #[doc(hidden)]
    type Buffer: Send + Sync + 'static;

    #[doc(hidden)]
    const EMPTY_BUFFER: Self::Buffer;
}

/// The metadata type used by [`Task`] when none is named.
///
/// This is `u16` unless one of the `metadata-*` crate features selects a
/// different width.
///
/// [`Task`]: crate::Task
#[cfg(not(any(
    feature = "metadata-u8",
    feature = "metadata-u32",
    feature = "metadata-u64",
    feature = "metadata-i8",
    feature = "metadata-i16",
    feature = "metadata-i32",
    feature = "metadata-i64",
)))]
pub type DefaultMetadata = u16;

macro_rules! default_metadata {
    ($($feature:literal => $t:ty),+ $(,)?) => {
        $(
            /// The metadata type used by [`Task`] when none is named.
            ///
            /// [`Task`]: crate::Task
            #[cfg(feature = $feature)]
            pub type DefaultMetadata = $t;
        )+

        const _: () = assert!(
            0 $(+ cfg!(feature = $feature) as usize)+ + cfg!(feature = "metadata-u16") as usize <= 1,
            "at most one `metadata-*` feature may be enabled"
        );
    };
}

default_metadata! {
    "metadata-u8" => u8,
    "metadata-u32" => u32,
    "metadata-u64" => u64,
    "metadata-i8" => i8,
    "metadata-i16" => i16,
    "metadata-i32" => i32,
    "metadata-i64" => i64,
}

macro_rules! impl_metadata {
    ($($t:ty),+ $(,)?) => {
        $(
            impl sealed::Sealed for $t {}

            impl Metadata for $t {
                const MIN: Self = <$t>::MIN;
                const MAX: Self = <$t>::MAX;
                const ZERO: Self = 0;
                const CAPACITY: usize = capacity_for(mem::size_of::<$t>());

                type Buffer = [MaybeUninit<u8>; capacity_for(mem::size_of::<$t>())];

                const EMPTY_BUFFER: Self::Buffer =
                    [MaybeUninit::uninit(); capacity_for(mem::size_of::<$t>())];
            }
        )+
    };
}

impl_metadata!(u8, u16, u32, u64, i8, i16, i32, i64);

mod sealed {
    pub trait Sealed {}
}
