//! Tracing hooks for parser and compiler observability.
//!
//! Enable the `tracing` feature to emit events via the `tracing` crate.
//! These macros no-op when the feature is disabled, avoiding `#[cfg]`
//! boilerplate at every call site.

/// Emit a debug-level event with the compiled SQL text and parameter count.
#[macro_export]
macro_rules! trace_compiled {
    ($sql:expr, $param_count:expr) => {{
        #[cfg(feature = "tracing")]
        tracing::debug!(sql = %$sql, params = $param_count, "eagerload.compile");
        #[cfg(not(feature = "tracing"))]
        let _ = (&$sql, &$param_count);
    }};
}

/// Emit a debug-level event for a prefetch round trip on a fallback path.
#[macro_export]
macro_rules! trace_prefetch {
    ($path:expr, $rows:expr) => {{
        #[cfg(feature = "tracing")]
        tracing::debug!(path = %$path, rows = $rows, "eagerload.prefetch");
        #[cfg(not(feature = "tracing"))]
        let _ = (&$path, &$rows);
    }};
}

/// Emit a debug-level event for a key dropped in non-strict parsing.
#[macro_export]
macro_rules! trace_dropped {
    ($key:expr, $code:expr) => {{
        #[cfg(feature = "tracing")]
        tracing::debug!(key = %$key, code = $code, "eagerload.dropped");
        #[cfg(not(feature = "tracing"))]
        let _ = (&$key, &$code);
    }};
}
