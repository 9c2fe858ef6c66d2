//! ---
//! oph_section: "03-logging"
//! oph_subsection: "module"
//! oph_type: "source"
//! oph_scope: "code"
//! oph_description: "Structured logging adapters and sinks."
//! oph_version: "v0.1.0"
//! oph_owner: "tbd"
//! ---
//! Logging macros enriched with a [`LogContext`](crate::LogContext).

#[doc(hidden)]
pub use tracing as __tracing;

#[doc(hidden)]
#[macro_export]
macro_rules! __oph_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        $crate::macros::__tracing::event!(
            $level,
            task = ctx.task.unwrap_or(""),
            operator = ctx.operator.unwrap_or(""),
            checkpoint = ctx.checkpoint.unwrap_or_default(),
            subtask = ctx.subtask.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with harness context.
#[macro_export]
macro_rules! oph_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__oph_event!($crate::macros::__tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__oph_event!(
            $crate::macros::__tracing::Level::INFO,
            $crate::LogContext::default(),
            $($arg)+
        )
    };
}

/// Emit a debug log enriched with harness context.
#[macro_export]
macro_rules! oph_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__oph_event!($crate::macros::__tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__oph_event!(
            $crate::macros::__tracing::Level::DEBUG,
            $crate::LogContext::default(),
            $($arg)+
        )
    };
}

/// Emit a warning enriched with harness context.
#[macro_export]
macro_rules! oph_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__oph_event!($crate::macros::__tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__oph_event!(
            $crate::macros::__tracing::Level::WARN,
            $crate::LogContext::default(),
            $($arg)+
        )
    };
}

/// Emit an error log enriched with harness context.
#[macro_export]
macro_rules! oph_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__oph_event!($crate::macros::__tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__oph_event!(
            $crate::macros::__tracing::Level::ERROR,
            $crate::LogContext::default(),
            $($arg)+
        )
    };
}
