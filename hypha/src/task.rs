//! The [`Task`] type.
//!
//! A task is a cache-line-sized slot that holds one unit of deferred work.
//! It is *loaded* with a closure or a function pointer, *executed* any
//! number of times, and finally *cleaned up*, which drops whatever the
//! closure captured and returns the slot to the empty state:
//!
//! ```text
//!            load               cleanup
//!   Empty ─────────▶ Loaded ─────────────▶ Empty
//!                    │    ▲
//!                    └────┘
//!                    execute
//! ```
//!
//! Type erasure is done by hand: the capture is written into an inline byte
//! buffer, and two function pointers (the *trampolines*) remember how to call
//! it and how to drop it. There is no heap allocation and no `dyn` vtable.
//!
//! # Handing tasks between threads
//!
//! `Task` contains no synchronization of its own. A scheduler that loads a
//! task on one thread, executes it on another and cleans it up on a third
//! must make each step happen-before the next, which the queue or channel
//! used to pass the task around normally does already. Since every
//! operation that touches the capture takes `&mut self`, safe code cannot
//! race two of them on the same task.
use crate::{
    cache::{CACHE_LINE_SIZE, MAX_CAPTURE_ALIGN},
    error::CaptureError,
    metadata::{DefaultMetadata, Metadata},
};
use core::{
    any::type_name,
    fmt,
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
};


/// A fixed-size, allocation-free, type-erased unit of deferred work.
///
/// A `Task` is exactly [`CACHE_LINE_SIZE`] bytes long and aligned to a cache
/// line. Of those bytes, two pointers hold the trampolines, the last
/// `size_of::<M>()` bytes hold the [metadata tag](Self::metadata), and the
/// remaining [`Task::CAPACITY`] bytes hold the captured state.
///
/// See the [module-level documentation](self) for the lifecycle.
///
/// # Captures that do not fit
///
/// A closure whose captured state is larger than [`Task::CAPACITY`], or more
/// strictly aligned than [`MAX_CAPTURE_ALIGN`], cannot be loaded. This is
/// checked when the program is compiled, not when it runs:
///
/// ```compile_fail
/// let big = [0u8; 512];
/// let mut task = hypha::Task::empty();
/// task.load(move || {
///     let _ = big.len();
/// });
/// ```
///
/// The same goes for a capture that would fit, but needs a stricter
/// alignment than the buffer has:
///
/// ```compile_fail
/// #[repr(align(32))]
/// struct Overaligned(u8);
///
/// let value = Overaligned(1);
/// let mut task = hypha::Task::empty();
/// task.load(move || {
///     let _ = &value;
/// });
/// ```
///
/// Use [`Task::can_hold`] or [`Task::check_capture`] to find out whether a
/// closure type fits without triggering the error.
///
/// # Dropping a loaded task
///
/// Schedulers are expected to call [`cleanup`](Self::cleanup) themselves,
/// at the point where releasing the captured state is safe. A task that is
/// dropped while still loaded is cleaned up by its destructor.
#[repr(C)]
#[cfg_attr(feature = "cache-line-32", repr(align(32)))]
#[cfg_attr(feature = "cache-line-128", repr(align(128)))]
#[cfg_attr(
    not(any(feature = "cache-line-32", feature = "cache-line-128")),
    repr(align(64))
)]
pub struct Task<M: Metadata = DefaultMetadata> {
    /// Calls the loaded closure. `None` iff the task is empty.
    invoke: Option<Trampoline>,

    /// Drops the loaded closure. `None` when the task is empty, or when the
    /// loaded payload has no drop glue.
    cleanup: Option<Trampoline>,

    /// Inline storage for the loaded payload.
    ///
    /// # Safety
    ///
    /// This must directly follow the two trampolines: its offset is what
    /// guarantees [`MAX_CAPTURE_ALIGN`].
    buf: M::Buffer,

    /// The metadata tag. Never touched by `load`, `execute` or `cleanup`.
    meta: M,
}

/// A type-erased operation over a task's capture buffer.
type Trampoline = unsafe fn(NonNull<u8>);

/// Payload written by [`Task::load_raw`].
#[derive(Copy, Clone)]
struct RawCall {
    f: fn(*mut ()),
    arg: *mut (),
}

/// Compile-time check that `F` can be written into a `Task<M>`'s buffer.
struct Fits<F, M>(PhantomData<fn(F, M)>);

macro_rules! trace_task {
    ($task:expr, $method:literal $(, $($field:tt)+)?) => {
        tracing::trace!(
            task = ?ptr::addr_of!(*$task),
            $($($field)+,)?
            concat!("Task::", $method),
        )
    };
}

// === impl Task ===

impl Task {
    /// Returns a new, empty task tagged with [`DefaultMetadata`]'s zero.
    ///
    /// This is a `const fn`, so arrays of tasks may be built at compile time:
    ///
    /// ```
    /// use hypha::Task;
    ///
    /// let slots: [Task; 8] = [const { Task::empty() }; 8];
    /// assert!(slots.iter().all(|task| !task.is_loaded()));
    /// ```
    #[must_use]
    pub const fn empty() -> Self {
        Self::with_metadata(DefaultMetadata::ZERO)
    }

    /// Returns a new task loaded with the closure `f`.
    ///
    /// This is equivalent to [`Task::empty`] followed by [`Task::load`].
    #[must_use]
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let mut task = Self::empty();
        task.load(f);
        task
    }

    /// Returns a new task that calls `f(arg)` when executed.
    ///
    /// This is equivalent to [`Task::empty`] followed by [`Task::load_raw`].
    #[must_use]
    pub fn from_raw_parts(f: fn(*mut ()), arg: *mut ()) -> Self {
        let mut task = Self::empty();
        task.load_raw(f, arg);
        task
    }

    /// Returns a new task that calls `f` with a null argument when executed.
    ///
    /// This is equivalent to [`Task::empty`] followed by [`Task::load_fn`].
    #[must_use]
    pub fn from_fn(f: fn(*mut ())) -> Self {
        let mut task = Self::empty();
        task.load_fn(f);
        task
    }
}

impl<M: Metadata> Task<M> {
    /// Number of bytes of captured state a task can hold inline.
    ///
    /// This is [`CACHE_LINE_SIZE`] minus the two trampoline pointers minus
    /// the metadata tag.
    pub const CAPACITY: usize = M::CAPACITY;

    /// The largest alignment a captured value may require.
    pub const MAX_CAPTURE_ALIGN: usize = MAX_CAPTURE_ALIGN;

    /// Returns a new, empty task with the given metadata tag.
    #[must_use]
    pub const fn with_metadata(meta: M) -> Self {
        Self {
            invoke: None,
            cleanup: None,
            buf: M::EMPTY_BUFFER,
            meta,
        }
    }

    /// Checks whether a value of type `F` can be stored in this task's
    /// capture buffer.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::TooLarge`] if `F` is larger than [`Task::CAPACITY`].
    /// - [`CaptureError::Misaligned`] if `F`'s alignment exceeds
    ///   [`MAX_CAPTURE_ALIGN`].
    pub const fn check_capture<F>() -> Result<(), CaptureError> {
        let size = mem::size_of::<F>();
        let align = mem::align_of::<F>();
        if size > M::CAPACITY {
            return Err(CaptureError::TooLarge {
                size,
                capacity: M::CAPACITY,
            });
        }

        if align > MAX_CAPTURE_ALIGN {
            return Err(CaptureError::Misaligned {
                align,
                max_align: MAX_CAPTURE_ALIGN,
            });
        }

        Ok(())
    }

    /// Returns `true` if a value of type `F` can be stored in this task's
    /// capture buffer.
    #[must_use]
    pub const fn can_hold<F>() -> bool {
        Self::check_capture::<F>().is_ok()
    }

    /// Loads the closure `f` into this task.
    ///
    /// `f` is moved into the task's inline buffer and is owned by the task
    /// until [`cleanup`](Self::cleanup) drops it.
    ///
    /// If the task is already loaded, the previous payload is overwritten
    /// *without* being dropped, leaking anything it owned. Call
    /// [`cleanup`](Self::cleanup) first.
    ///
    /// # Compile-time errors
    ///
    /// Fails to compile if `F` does not fit in [`Task::CAPACITY`] bytes or
    /// is aligned to more than [`MAX_CAPTURE_ALIGN`].
    #[inline]
    pub fn load<F>(&mut self, f: F)
    where
        F: FnMut() + Send + 'static,
    {
        // Safety: `F` is `Send` and `'static`, so the task may outlive the
        // caller's frame and move between threads with it.
        unsafe { self.load_unchecked(f) }
    }

    /// Loads the closure `f` into this task, without requiring that it is
    /// `Send` or `'static`.
    ///
    /// This allows loading closures that borrow from the caller's stack,
    /// such as a scoped parallel loop whose body refers to local data.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - every value borrowed by `f` outlives every later call to
    ///   [`execute`](Self::execute) and [`cleanup`](Self::cleanup) on this
    ///   task (including the cleanup performed when the task is dropped);
    /// - if `F` is not `Send`, the task is executed and cleaned up only on
    ///   the thread that loaded it.
    ///
    /// # Compile-time errors
    ///
    /// Fails to compile if `F` does not fit in [`Task::CAPACITY`] bytes or
    /// is aligned to more than [`MAX_CAPTURE_ALIGN`].
    #[inline]
    pub unsafe fn load_unchecked<F>(&mut self, f: F)
    where
        F: FnMut(),
    {
        trace_task!(
            self,
            "load",
            capture = %type_name::<F>(),
            size = mem::size_of::<F>(),
            owns_drop = mem::needs_drop::<F>()
        );
        self.write_payload(f, invoke_closure::<F>, drop_closure::<F>);
    }

    /// Loads a function pointer and its argument into this task.
    ///
    /// Executing the task calls `f(arg)`. Only the two pointers are stored;
    /// whatever `arg` points to is not owned by the task, so
    /// [`cleanup`](Self::cleanup) does nothing besides emptying the task.
    #[inline]
    pub fn load_raw(&mut self, f: fn(*mut ()), arg: *mut ()) {
        trace_task!(self, "load_raw", ?arg);
        self.write_payload(RawCall { f, arg }, invoke_raw, drop_closure::<RawCall>);
    }

    /// Loads a capture-less function into this task.
    ///
    /// This is [`load_raw`](Self::load_raw) with a null argument. A closure
    /// that captures nothing coerces to `fn(*mut ())`:
    ///
    /// ```
    /// let mut task = hypha::Task::empty();
    /// task.load_fn(|arg| assert!(arg.is_null()));
    /// task.execute_and_cleanup();
    /// ```
    #[inline]
    pub fn load_fn(&mut self, f: fn(*mut ())) {
        self.load_raw(f, ptr::null_mut())
    }

    /// Runs the loaded closure.
    ///
    /// The captured state is neither moved nor dropped, so a task may be
    /// executed any number of times before it is cleaned up. A panic raised
    /// by the closure propagates out of this method unchanged; the task is
    /// still loaded afterwards and must still be cleaned up.
    ///
    /// Executing an empty task is a bug in the caller. In debug builds it
    /// panics; in release builds it does nothing.
    #[inline]
    pub fn execute(&mut self) {
        match self.invoke {
            // Safety: `invoke` was set by the same `write_payload` call that
            // wrote the payload it expects into `buf`, and `cleanup` clears
            // it before that payload is dropped.
            Some(invoke) => unsafe { invoke(self.buf_ptr()) },
            None => {
                #[cfg(debug_assertions)]
                panic!("tried to execute an empty `Task`; it must be loaded first");
            }
        }
    }

    /// Drops the loaded closure's captured state and empties the task.
    ///
    /// After this returns, the task may be loaded again; it behaves exactly
    /// like a newly created task with the same metadata tag. A task that was
    /// loaded but never executed may be cleaned up directly, which cancels
    /// the work.
    ///
    /// Cleaning up an empty task does nothing.
    #[inline]
    pub fn cleanup(&mut self) {
        let drop_payload = self.cleanup.take();
        // Empty the task before the destructor runs: if it panics, the
        // payload must not be called or dropped again.
        self.invoke = None;

        trace_task!(self, "cleanup", drops = drop_payload.is_some());
        if let Some(drop_payload) = drop_payload {
            // Safety: `drop_payload` matches the payload in `buf`, which has
            // not been dropped yet: `cleanup` was `Some` until just now.
            unsafe { drop_payload(self.buf_ptr()) }
        }
    }

    /// Runs the loaded closure, then cleans up the task.
    ///
    /// This is exactly [`execute`](Self::execute) followed by
    /// [`cleanup`](Self::cleanup). If the closure panics, the panic
    /// propagates before the cleanup, and the task stays loaded.
    #[inline]
    pub fn execute_and_cleanup(&mut self) {
        self.execute();
        self.cleanup();
    }

    /// Returns `true` if the task holds a payload that has not been cleaned
    /// up yet.
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.invoke.is_some()
    }

    /// Returns the task's metadata tag.
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> M {
        self.meta
    }

    /// Sets the task's metadata tag.
    ///
    /// The tag is only ever changed by this method and
    /// [`replace_metadata`](Self::replace_metadata).
    #[inline]
    pub fn set_metadata(&mut self, meta: M) {
        self.meta = meta;
    }

    /// Sets the task's metadata tag, returning the previous one.
    #[inline]
    pub fn replace_metadata(&mut self, meta: M) -> M {
        mem::replace(&mut self.meta, meta)
    }

    #[inline(always)]
    fn buf_ptr(&mut self) -> NonNull<u8> {
        NonNull::from(&mut self.buf).cast()
    }

    /// Moves `payload` into the buffer and installs its trampolines.
    ///
    /// `invoke` and `drop` must be instantiated for `P`.
    #[inline(always)]
    fn write_payload<P>(&mut self, payload: P, invoke: Trampoline, drop: Trampoline) {
        #[allow(clippy::let_unit_value)]
        let () = Fits::<P, M>::OK;

        // Safety: `Fits` guarantees that `P` fits in the buffer, and that
        // the buffer (which starts `MAX_CAPTURE_ALIGN` bytes into a
        // cache-line-aligned task) is aligned for `P`.
        unsafe { self.buf_ptr().cast::<P>().as_ptr().write(payload) };
        self.invoke = Some(invoke);
        self.cleanup = if mem::needs_drop::<P>() {
            Some(drop)
        } else {
            None
        };
    }
}

impl<M: Metadata> Default for Task<M> {
    /// Returns an empty task tagged with zero.
    fn default() -> Self {
        Self::with_metadata(M::ZERO)
    }
}

impl<M: Metadata> Drop for Task<M> {
    fn drop(&mut self) {
        if self.cleanup.is_some() {
            test_trace!(task = ?ptr::addr_of!(*self), "dropped a loaded task");
        }
        self.cleanup();
    }
}

impl<M: Metadata> fmt::Debug for Task<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("loaded", &self.is_loaded())
            .field("owns_drop", &self.cleanup.is_some())
            .field("metadata", &self.meta)
            .finish()
    }
}

// === impl Fits ===

impl<F, M: Metadata> Fits<F, M> {
    const OK: () = match Task::<M>::check_capture::<F>() {
        Ok(()) => {}
        Err(CaptureError::TooLarge { .. }) => {
            panic!("CaptureError::TooLarge: the capture does not fit in a `Task`'s inline buffer")
        }
        Err(CaptureError::Misaligned { .. }) => panic!(
            "CaptureError::Misaligned: the capture is aligned more strictly than a `Task`'s inline buffer"
        ),
    };
}

// === trampolines ===

/// # Safety
///
/// `buf` must point to a live, properly aligned `F`.
unsafe fn invoke_closure<F: FnMut()>(buf: NonNull<u8>) {
    let f = &mut *buf.cast::<F>().as_ptr();
    f()
}

/// # Safety
///
/// `buf` must point to a live, properly aligned `F`, which must not be used
/// again afterwards.
unsafe fn drop_closure<F>(buf: NonNull<u8>) {
    ptr::drop_in_place(buf.cast::<F>().as_ptr())
}

/// # Safety
///
/// `buf` must point to a `RawCall`.
unsafe fn invoke_raw(buf: NonNull<u8>) {
    let RawCall { f, arg } = buf.cast::<RawCall>().as_ptr().read();
    f(arg)
}

// === layout assertions ===

macro_rules! assert_layout {
    ($($t:ty),+ $(,)?) => {
        $(
            const _: () = {
                assert!(
                    mem::size_of::<Task<$t>>() == CACHE_LINE_SIZE,
                    concat!("`Task<", stringify!($t), ">` must be exactly one cache line long")
                );
                assert!(
                    mem::align_of::<Task<$t>>() == CACHE_LINE_SIZE,
                    concat!("`Task<", stringify!($t), ">` must be cache-line aligned")
                );
                assert!(mem::offset_of!(Task<$t>, buf) == MAX_CAPTURE_ALIGN);
                assert!(mem::offset_of!(Task<$t>, meta) == CACHE_LINE_SIZE - mem::size_of::<$t>());
                assert!(
                    Task::<$t>::can_hold::<RawCall>(),
                    concat!(
                        "the cache line is too small for a `Task<",
                        stringify!($t),
                        ">` to hold a function pointer and its argument"
                    )
                );
            };
        )+
    };
}

assert_layout!(u8, u16, u32, u64, i8, i16, i32, i64);
