#[cfg(not(test))]
#[allow(unused_macros)]
macro_rules! test_dbg {
    ($e:expr) => {
        $e
    };
}

#[cfg(test)]
macro_rules! test_dbg {
    ($e:expr) => {
        match $e {
            e => {
                tracing::debug!(
                    location = %core::panic::Location::caller(),
                    "{} = {:?}",
                    stringify!($e),
                    &e
                );
                e
            }
        }
    };
}

#[cfg(not(test))]
#[allow(unused_macros)]
macro_rules! test_trace {
    ($($args:tt)+) => {};
}

#[cfg(test)]
macro_rules! test_trace {
    ($($args:tt)+) => {
        tracing::debug!(
            location = %core::panic::Location::caller(),
            $($args)+
        );
    };
}

#[cfg(all(test, not(loom)))]
pub(crate) fn trace_init() -> impl Drop {
    use tracing_subscriber::{prelude::*, EnvFilter};
    let filter = EnvFilter::from_env("RUST_LOG");
    tracing_subscriber::fmt()
        .with_test_writer()
        .without_time()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish()
        .set_default()
}

#[cfg(all(test, loom))]
pub(crate) fn trace_init() -> impl Drop {
    use tracing_subscriber::{prelude::*, EnvFilter};
    let filter = EnvFilter::from_env("LOOM_LOG");
    tracing_subscriber::fmt()
        .with_test_writer()
        .without_time()
        .with_env_filter(filter)
        .finish()
        .set_default()
}
