#![warn(clippy::all, rust_2018_idioms)]

/// Region-scoped logging macros with file and line context.
///
/// Multi-region executions interleave their log lines, so every line carries the
/// region both as a structured field and in the rendered message.
#[macro_export]
macro_rules! region_trace {
    ($region:expr, $($arg:tt)*) => {
        tracing::trace!(
            region = %$region,
            "[{}:{}] [{}] {}",
            file!(),
            line!(),
            $region,
            format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! region_debug {
    ($region:expr, $($arg:tt)*) => {
        tracing::debug!(
            region = %$region,
            "[{}:{}] [{}] {}",
            file!(),
            line!(),
            $region,
            format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! region_info {
    ($region:expr, $($arg:tt)*) => {
        tracing::info!(
            region = %$region,
            "[{}:{}] [{}] {}",
            file!(),
            line!(),
            $region,
            format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! region_warn {
    ($region:expr, $($arg:tt)*) => {
        tracing::warn!(
            region = %$region,
            "[{}:{}] [{}] {}",
            file!(),
            line!(),
            $region,
            format!($($arg)*)
        )
    };
}

#[macro_export]
macro_rules! region_error {
    ($region:expr, $($arg:tt)*) => {
        tracing::error!(
            region = %$region,
            "[{}:{}] [{}] {}",
            file!(),
            line!(),
            $region,
            format!($($arg)*)
        )
    };
}
