//! Parsed query specification value objects.
//!
//! These are produced once per request by the parser, validated at
//! construction, and consumed immutably by the compiler.

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Sort direction. Defaults to ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A single sort: attribute name plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    attr: String,
    direction: SortDirection,
}

impl SortSpec {
    /// Creates a sort, rejecting empty attribute names at construction.
    pub fn new(attr: impl Into<String>, direction: SortDirection) -> ParseResult<Self> {
        let attr = attr.into();
        if attr.is_empty() {
            return Err(ParseError::InvalidSortType);
        }
        Ok(SortSpec { attr, direction })
    }

    pub fn asc(attr: impl Into<String>) -> ParseResult<Self> {
        SortSpec::new(attr, SortDirection::Asc)
    }

    pub fn desc(attr: impl Into<String>) -> ParseResult<Self> {
        SortSpec::new(attr, SortDirection::Desc)
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Parses a single `attr` / `-attr` token.
    pub fn parse(token: &str) -> ParseResult<Self> {
        match token.strip_prefix('-') {
            Some(rest) => SortSpec::desc(rest),
            None => SortSpec::asc(token),
        }
    }

    /// Parses a comma-separated sort list, e.g. `"track_id,-name"`.
    pub fn parse_list(raw: &str) -> ParseResult<Vec<SortSpec>> {
        raw.split(',')
            .map(|token| SortSpec::parse(token.trim()))
            .collect()
    }
}

/// Serializes back to the `-attr` query form, so that parsing a rendered
/// sort list is idempotent.
impl std::fmt::Display for SortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            SortDirection::Asc => f.write_str(&self.attr),
            SortDirection::Desc => write!(f, "-{}", self.attr),
        }
    }
}

/// A non-negative offset with an optional non-negative limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OffsetLimit {
    offset: u64,
    limit: Option<u64>,
}

impl OffsetLimit {
    /// Validates raw integers into an offset/limit pair.
    ///
    /// Negative values are rejected here rather than at query time.
    pub fn new(offset: i64, limit: Option<i64>) -> ParseResult<Self> {
        if offset < 0 {
            return Err(ParseError::InvalidOffset {
                offset: offset.to_string(),
            });
        }
        let limit = match limit {
            Some(l) if l < 0 => {
                return Err(ParseError::InvalidLimit {
                    limit: l.to_string(),
                });
            }
            Some(l) => Some(l as u64),
            None => None,
        };
        Ok(OffsetLimit {
            offset: offset as u64,
            limit,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Overwrites the offset with an already-validated value.
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Overwrites the limit with an already-validated value.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }
}

/// Filters, pagination, and sorts attached to one dot-separated
/// relationship path (e.g. `"album.tracks"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubfilterSpec {
    /// Boolean filter tree; conditions accumulate under a top-level `$and`.
    pub filters: Option<serde_json::Value>,
    pub offset_limit: Option<OffsetLimit>,
    pub sorts: Vec<SortSpec>,
}

impl SubfilterSpec {
    pub fn new() -> Self {
        SubfilterSpec::default()
    }

    pub fn with_filters(mut self, filters: serde_json::Value) -> Self {
        self.push_filter(filters);
        self
    }

    pub fn with_offset_limit(mut self, offset_limit: OffsetLimit) -> Self {
        self.offset_limit = Some(offset_limit);
        self
    }

    pub fn with_sorts(mut self, sorts: Vec<SortSpec>) -> Self {
        self.sorts = sorts;
        self
    }

    /// Adds one filter document to the accumulated `$and` list.
    pub fn push_filter(&mut self, doc: serde_json::Value) {
        let filters = self
            .filters
            .get_or_insert_with(|| serde_json::json!({ "$and": [] }));
        if let Some(list) = filters
            .get_mut("$and")
            .and_then(serde_json::Value::as_array_mut)
        {
            list.push(doc);
        }
    }

    /// True when this spec carries no constraints at all.
    pub fn is_empty(&self) -> bool {
        self.filters.is_none() && self.offset_limit.is_none() && self.sorts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_round_trip() {
        let sorts = SortSpec::parse_list("-a,b").unwrap();
        assert_eq!(sorts[0].attr(), "a");
        assert_eq!(sorts[0].direction(), SortDirection::Desc);
        assert_eq!(sorts[1].attr(), "b");
        assert_eq!(sorts[1].direction(), SortDirection::Asc);

        let rendered: Vec<String> = sorts.iter().map(ToString::to_string).collect();
        let reparsed = SortSpec::parse_list(&rendered.join(",")).unwrap();
        assert_eq!(sorts, reparsed);
    }

    #[test]
    fn empty_sort_attr_rejected() {
        assert_eq!(SortSpec::parse("-"), Err(ParseError::InvalidSortType));
        assert_eq!(SortSpec::asc(""), Err(ParseError::InvalidSortType));
    }

    #[test]
    fn negative_offset_limit_rejected() {
        assert!(matches!(
            OffsetLimit::new(-1, Some(1)),
            Err(ParseError::InvalidOffset { .. })
        ));
        assert!(matches!(
            OffsetLimit::new(1, Some(-1)),
            Err(ParseError::InvalidLimit { .. })
        ));
    }

    #[test]
    fn subfilter_accumulates_under_and() {
        let mut spec = SubfilterSpec::new();
        spec.push_filter(serde_json::json!({"track_id": 5}));
        spec.push_filter(serde_json::json!({"name": "x"}));
        let filters = spec.filters.unwrap();
        assert_eq!(filters["$and"].as_array().unwrap().len(), 2);
    }
}
