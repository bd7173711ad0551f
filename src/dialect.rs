//! Target SQL dialect and its capabilities.

use std::borrow::Cow;

/// The SQL dialect a compiled query is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    SQLite,
    PostgreSQL,
    MySQL,
}

impl Dialect {
    /// Whether this dialect is assumed to support `ROW_NUMBER() OVER (...)`.
    ///
    /// Callers targeting an engine version that differs from the default can
    /// override this with `CompileOptions::window_functions`.
    pub const fn supports_window_functions(self) -> bool {
        match self {
            Dialect::SQLite => false,
            Dialect::PostgreSQL | Dialect::MySQL => true,
        }
    }

    /// Renders the bind-parameter placeholder with the given 1-based index.
    ///
    /// SQLite and MySQL use positional `?`; PostgreSQL uses numbered `$N`.
    pub fn render_placeholder(self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::PostgreSQL => Cow::Owned(format!("${index}")),
            Dialect::SQLite | Dialect::MySQL => Cow::Borrowed("?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders() {
        assert_eq!(Dialect::SQLite.render_placeholder(3), "?");
        assert_eq!(Dialect::PostgreSQL.render_placeholder(3), "$3");
    }

    #[test]
    fn window_support_defaults() {
        assert!(!Dialect::SQLite.supports_window_functions());
        assert!(Dialect::PostgreSQL.supports_window_functions());
    }
}
