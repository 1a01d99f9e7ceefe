pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    pub(crate) use loom::{alloc, sync, thread};

    pub(crate) fn model(f: impl Fn() + Sync + Send + 'static) {
        let _trace = crate::util::trace_init();
        loom::model(f)
    }
}

#[cfg(not(loom))]
mod inner {
    pub(crate) use std::sync;

    pub(crate) mod thread {
        pub(crate) use std::thread::JoinHandle;

        /// Spawns a thread that inherits the spawning thread's `tracing`
        /// dispatcher, so that test output from every thread is captured.
        pub(crate) fn spawn<F, T>(f: F) -> JoinHandle<T>
        where
            F: FnOnce() -> T + Send + 'static,
            T: Send + 'static,
        {
            let dispatch = tracing::dispatcher::get_default(|current| current.clone());
            std::thread::spawn(move || {
                let _guard = tracing::dispatcher::set_default(&dispatch);
                test_trace!("thread spawned");
                f()
            })
        }
    }

    pub(crate) fn model(f: impl Fn()) {
        let _trace = crate::util::trace_init();
        f()
    }

    pub(crate) mod alloc {
        /// Tracks a value for leaks.
        ///
        /// Outside of loom this is a plain wrapper; leak detection only
        /// happens when running under `cfg(loom)`.
        #[derive(Debug)]
        pub(crate) struct Track<T> {
            value: T,
        }

        impl<T> Track<T> {
            #[inline(always)]
            pub(crate) fn new(value: T) -> Track<T> {
                Track { value }
            }

            #[inline(always)]
            pub(crate) fn get_ref(&self) -> &T {
                &self.value
            }
        }
    }
}
