//! Composable SQL fragments with ordered bind parameters.

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::dialect::Dialect;
use crate::value::Value;

/// A SQL fragment: rendered text plus the bind values its placeholders
/// reference, in order.
///
/// Fragments are built with positional `?` placeholders and concatenated
/// freely; [`Sql::render`] rewrites placeholders for the target dialect as
/// the final step. User data never lands in `text`, so a `?` in the buffer is
/// always a placeholder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sql {
    text: String,
    params: SmallVec<[Value; 4]>,
}

impl Sql {
    /// Creates an empty fragment.
    pub fn empty() -> Self {
        Sql::default()
    }

    /// Creates a fragment from literal SQL text, no parameters.
    pub fn raw(text: impl Into<String>) -> Self {
        Sql {
            text: text.into(),
            params: SmallVec::new(),
        }
    }

    /// Creates a fragment holding a single placeholder bound to `value`.
    pub fn parameter(value: impl Into<Value>) -> Self {
        let mut params = SmallVec::new();
        params.push(value.into());
        Sql {
            text: "?".to_string(),
            params,
        }
    }

    /// Creates a comma-separated placeholder list: `?, ?, ?`.
    pub fn parameters<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut out = Sql::empty();
        for (i, v) in values.into_iter().enumerate() {
            if i > 0 {
                out = out.append_raw(", ");
            }
            out = out.append(Sql::parameter(v));
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Appends literal SQL text.
    pub fn append_raw(mut self, text: impl AsRef<str>) -> Self {
        self.text.push_str(text.as_ref());
        self
    }

    /// Appends another fragment, merging text and parameters.
    pub fn append(mut self, other: Sql) -> Self {
        self.text.push_str(&other.text);
        self.params.extend(other.params);
        self
    }

    /// Joins fragments with a separator, skipping empty ones.
    pub fn join<I>(fragments: I, separator: &str) -> Sql
    where
        I: IntoIterator<Item = Sql>,
    {
        let mut out = Sql::empty();
        let mut first = true;
        for frag in fragments {
            if frag.is_empty() {
                continue;
            }
            if !first {
                out = out.append_raw(separator);
            }
            first = false;
            out = out.append(frag);
        }
        out
    }

    /// Wraps this fragment in parentheses.
    pub fn subquery(self) -> Sql {
        Sql::raw("(").append(self).append_raw(")")
    }

    /// Wraps this fragment in parentheses and appends `AS "alias"`.
    pub fn alias(self, alias: &str) -> Sql {
        self.subquery()
            .append_raw(" AS ")
            .append_raw(quote_ident(alias))
    }

    /// The raw text of this fragment with positional `?` placeholders.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The bind values in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params.into_vec()
    }

    /// Renders the final SQL string for `dialect`, numbering placeholders
    /// where the dialect requires it.
    pub fn render(&self, dialect: Dialect) -> String {
        match dialect {
            Dialect::SQLite | Dialect::MySQL => self.text.clone(),
            Dialect::PostgreSQL => {
                let mut out = String::with_capacity(self.text.len() + 8);
                let mut index = 0usize;
                for ch in self.text.chars() {
                    if ch == '?' {
                        index += 1;
                        out.push_str(&dialect.render_placeholder(index));
                    } else {
                        out.push(ch);
                    }
                }
                out
            }
        }
    }
}

/// Quotes an identifier: `name` becomes `"name"`.
pub fn quote_ident(name: &str) -> CompactString {
    let mut out = CompactString::with_capacity(name.len() + 2);
    out.push('"');
    out.push_str(name);
    out.push('"');
    out
}

/// Writes a qualified column reference: `"alias"."column"`.
pub fn qualified(alias: &str, column: &str) -> CompactString {
    let mut out = CompactString::with_capacity(alias.len() + column.len() + 5);
    out.push('"');
    out.push_str(alias);
    out.push_str("\".\"");
    out.push_str(column);
    out.push('"');
    out
}
