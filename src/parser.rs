//! Query-string parsing into structured specifications.
//!
//! [`QueryParamParser`] takes ordered key/value string pairs (the shape of a
//! decoded URL query string; repeated keys are preserved) and extracts root
//! filters, per-relationship-path subfilter specs, sorts, pagination, embeds,
//! and sparse field lists.
//!
//! Every fallible method takes a `strict` flag. Strict mode returns the first
//! error; non-strict mode drops the offending key and keeps parsing, which is
//! an observably different result rather than a swallowed exception.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;

use crate::error::{ParseError, ParseResult};
use crate::spec::{OffsetLimit, SortSpec, SubfilterSpec};
use crate::trace_dropped;
use crate::value::Value;

/// Key segments that attach the remainder of a key to a relationship path
/// instead of the root entity.
const CONTROL_TOKENS: &[&str] = &["_subquery_", "_limit_", "_offset_", "_sorts_"];

/// Operator suffixes recognized on filter keys, mapped to filter-tree
/// operators. `-eq` is the implicit default for a bare key.
const OPERATOR_SUFFIXES: &[(&str, &str)] = &[
    ("-gte", "$gte"),
    ("-gt", "$gt"),
    ("-eq", "$eq"),
    ("-lte", "$lte"),
    ("-lt", "$lt"),
    ("-ne", "$ne"),
    ("-like", "$like"),
];

/// Options for [`QueryParamParser::parse_filters`].
#[derive(Default)]
pub struct FilterParseOptions<'a> {
    /// Key holding whole JSON filter documents. Defaults to `query`.
    pub complex_key: Option<&'a str>,
    /// When set, simple key/value filters are ignored entirely.
    pub only_complex: bool,
    /// Key-name conversion hook, e.g. camelCase to snake_case. Returning
    /// `None` rejects the key. The original key name is kept in the output;
    /// conversion only feeds the attribute-existence check.
    pub convert_key: Option<&'a dyn Fn(&str) -> Option<String>>,
    /// Attribute-existence check for the first path segment of a filter key.
    /// Keys failing the check are silently ignored, matching query strings'
    /// tolerance for unrelated parameters.
    pub known_attr: Option<&'a dyn Fn(&str) -> bool>,
}

/// Parses flat query parameters into the structured query specification.
pub struct QueryParamParser {
    params: Vec<(String, String)>,
}

impl QueryParamParser {
    /// Wraps already-decoded key/value pairs. Order and key repetition are
    /// significant and preserved.
    pub fn new(params: Vec<(String, String)>) -> Self {
        QueryParamParser { params }
    }

    /// Parses a raw query string (`a=1&b=two%20words`), percent-decoding
    /// keys and values and treating `+` as a space.
    pub fn from_query_str(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let params = raw
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key), decode_component(value))
            })
            .collect();
        QueryParamParser { params }
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Comma-separated sparse field list from the `fields` key.
    pub fn parse_fields(&self) -> Vec<String> {
        self.parse_list("fields")
    }

    /// Comma-separated relationship embed paths from the `embeds` key.
    pub fn parse_embeds(&self) -> Vec<String> {
        self.parse_list("embeds")
    }

    fn parse_list(&self, key: &str) -> Vec<String> {
        match self.value(key) {
            Some(raw) if !raw.is_empty() => raw.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Root sorts from the `sort` key: `"track_id,-name"`.
    pub fn parse_sorts(&self, strict: bool) -> ParseResult<Vec<SortSpec>> {
        let raw = match self.value("sort") {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(Vec::new()),
        };
        let mut sorts = Vec::new();
        for token in raw.split(',') {
            match SortSpec::parse(token.trim()) {
                Ok(sort) => sorts.push(sort),
                Err(e) if strict => return Err(e),
                Err(e) => trace_dropped!(token, e.code()),
            }
        }
        Ok(sorts)
    }

    /// Root pagination from the `page`, `offset`, and `limit` keys.
    ///
    /// `page_max_size` doubles as a default limit and as a cap: a page size
    /// when paging, and the ceiling a raw `limit` may not exceed (clamped in
    /// non-strict mode, `limit_too_high` in strict).
    ///
    /// A page below 1, or any non-integer page value, is an error in both
    /// modes; there is no sensible default to substitute for it. `page > 1`
    /// needs a page size to multiply by (`page_no_max`).
    pub fn parse_offset_limit(
        &self,
        page_max_size: Option<u64>,
        strict: bool,
    ) -> ParseResult<OffsetLimit> {
        let mut limit = page_max_size;
        if let Some(raw) = self.value("limit").filter(|v| !v.is_empty()) {
            match raw.parse::<u64>() {
                Ok(value) => limit = Some(value),
                Err(_) if strict => {
                    return Err(ParseError::InvalidLimit {
                        limit: raw.to_string(),
                    });
                }
                Err(_) => trace_dropped!(raw, "invalid_limit_value"),
            }
        }

        let mut page = None;
        if let Some(raw) = self.value("page").filter(|v| !v.is_empty()) {
            let value = raw.parse::<u64>().ok().filter(|p| *p >= 1).ok_or_else(|| {
                ParseError::InvalidPage {
                    page: raw.to_string(),
                }
            })?;
            if value > 1 && page_max_size.is_none() && limit.is_none() {
                if strict {
                    return Err(ParseError::PageNoMax);
                }
                trace_dropped!(raw, "page_no_max");
            } else {
                page = Some(value);
            }
        }

        let mut offset = 0u64;
        if let Some(raw) = self.value("offset").filter(|v| !v.is_empty()) {
            match raw.parse::<u64>() {
                Ok(value) => offset = value,
                Err(_) if strict => {
                    return Err(ParseError::InvalidOffset {
                        offset: raw.to_string(),
                    });
                }
                Err(_) => trace_dropped!(raw, "invalid_offset_value"),
            }
        }

        if let (Some(max), Some(l)) = (page_max_size, limit) {
            if l > max {
                if strict {
                    return Err(ParseError::LimitTooHigh {
                        limit: l,
                        max_page_size: max,
                    });
                }
                limit = Some(max);
            }
        }

        if let Some(page) = page.filter(|p| *p > 1) {
            // page_max_size wins as the page size; a plain limit stands in
            // when no max was configured.
            if let Some(size) = page_max_size.or(limit) {
                offset = (page - 1).checked_mul(size).ok_or_else(|| {
                    ParseError::InvalidPage {
                        page: page.to_string(),
                    }
                })?;
            }
        }

        let mut out = OffsetLimit::default();
        out.set_offset(offset);
        if let Some(limit) = limit {
            out.set_limit(limit);
        }
        Ok(out)
    }

    /// Root filters as a JSON boolean tree.
    ///
    /// The `query` key (repeatable) carries whole JSON documents; every
    /// other key not claimed by pagination/sorting/subfilters is a simple
    /// filter in the operator-suffix grammar. All conditions accumulate
    /// under a top-level `$and`; no conditions at all yields `None`.
    pub fn parse_filters(
        &self,
        options: &FilterParseOptions<'_>,
        strict: bool,
    ) -> ParseResult<Option<serde_json::Value>> {
        let complex_key = options.complex_key.unwrap_or("query");
        let mut conditions: Vec<serde_json::Value> = Vec::new();

        for (key, value) in &self.params {
            if key == complex_key {
                match decode_json_object(value) {
                    Ok(doc) => conditions.push(doc),
                    Err(e) if strict => return Err(e),
                    Err(e) => trace_dropped!(key, e.code()),
                }
                continue;
            }
            if options.only_complex
                || is_reserved_key(key)
                || key.split('.').any(|seg| CONTROL_TOKENS.contains(&seg))
            {
                continue;
            }

            let (attr_name, operator) = split_operator_suffix(key);
            let checked = match options.convert_key {
                Some(convert) => match convert(attr_name) {
                    Some(converted) => converted,
                    None => continue,
                },
                None => attr_name.to_string(),
            };
            let first_segment = checked.split('.').next().unwrap_or_default();
            if first_segment.is_empty() {
                continue;
            }
            if let Some(known) = options.known_attr {
                if !known(first_segment) {
                    continue;
                }
            }

            if value.starts_with('{') {
                match decode_json_object(value) {
                    Ok(doc) => conditions.push(serde_json::json!({ attr_name: doc })),
                    Err(e) if strict => return Err(e),
                    Err(e) => trace_dropped!(key, e.code()),
                }
            } else {
                let typed: serde_json::Value = Value::from_param_str(value).into();
                conditions.push(serde_json::json!({ attr_name: { operator: typed } }));
            }
        }

        if conditions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(serde_json::json!({ "$and": conditions })))
        }
    }

    /// Per-relationship-path subfilter specs from control-token keys.
    ///
    /// A key like `album.tracks._subquery_.track_id-gt` attaches to the path
    /// `album.tracks`; segments before the first control token name the
    /// path, segments after name the filtered field. `_limit_` / `_offset_`
    /// / `_sorts_` allow no trailing segments. Repeated keys for one path
    /// accumulate into a single [`SubfilterSpec`].
    pub fn parse_subfilters(
        &self,
        strict: bool,
    ) -> ParseResult<BTreeMap<String, SubfilterSpec>> {
        let mut specs: BTreeMap<String, SubfilterSpec> = BTreeMap::new();

        for (key, value) in &self.params {
            let segments: Vec<&str> = key.split('.').collect();
            let token_at = segments
                .iter()
                .position(|seg| CONTROL_TOKENS.contains(seg));
            let Some(token_at) = token_at else {
                continue;
            };
            let token = segments[token_at];
            let path = segments[..token_at].join(".");
            let trailing = segments[token_at + 1..].join(".");

            match self.parse_subfilter_key(&path, token, &trailing, value) {
                Ok(part) => {
                    let spec = specs.entry(path).or_default();
                    match part {
                        SubfilterPart::Filter(doc) => spec.push_filter(doc),
                        SubfilterPart::Limit(limit) => {
                            spec.offset_limit.get_or_insert_default().set_limit(limit);
                        }
                        SubfilterPart::Offset(offset) => {
                            spec.offset_limit.get_or_insert_default().set_offset(offset);
                        }
                        SubfilterPart::Sorts(sorts) => spec.sorts.extend(sorts),
                    }
                }
                Err(e) if strict => return Err(e),
                Err(e) => trace_dropped!(key, e.code()),
            }
        }

        Ok(specs)
    }

    fn parse_subfilter_key(
        &self,
        path: &str,
        token: &str,
        trailing: &str,
        value: &str,
    ) -> ParseResult<SubfilterPart> {
        if path.is_empty() {
            return Err(ParseError::InvalidSubresourcePath {
                path: token.to_string(),
            });
        }
        match token {
            "_subquery_" => {
                if trailing.is_empty() {
                    // A bare _subquery_ key carries a whole JSON document.
                    return Ok(SubfilterPart::Filter(decode_json_object(value)?));
                }
                if value.starts_with('{') {
                    let doc = decode_json_object(value)?;
                    Ok(SubfilterPart::Filter(serde_json::json!({ trailing: doc })))
                } else {
                    let (field, operator) = split_operator_suffix(trailing);
                    let typed: serde_json::Value = Value::from_param_str(value).into();
                    Ok(SubfilterPart::Filter(
                        serde_json::json!({ field: { operator: typed } }),
                    ))
                }
            }
            "_limit_" => {
                require_no_trailing(path, trailing)?;
                let limit = value
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidSublimit {
                        path: path.to_string(),
                        value: value.to_string(),
                    })?;
                Ok(SubfilterPart::Limit(limit))
            }
            "_offset_" => {
                require_no_trailing(path, trailing)?;
                let offset = value
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidSuboffset {
                        path: path.to_string(),
                        value: value.to_string(),
                    })?;
                Ok(SubfilterPart::Offset(offset))
            }
            "_sorts_" => {
                require_no_trailing(path, trailing)?;
                Ok(SubfilterPart::Sorts(SortSpec::parse_list(value)?))
            }
            _ => Err(ParseError::InvalidSubresourcePath {
                path: path.to_string(),
            }),
        }
    }
}

enum SubfilterPart {
    Filter(serde_json::Value),
    Limit(u64),
    Offset(u64),
    Sorts(Vec<SortSpec>),
}

fn require_no_trailing(path: &str, trailing: &str) -> ParseResult<()> {
    if trailing.is_empty() {
        Ok(())
    } else {
        Err(ParseError::InvalidSubresourcePath {
            path: format!("{path}.{trailing}"),
        })
    }
}

fn is_reserved_key(key: &str) -> bool {
    matches!(key, "sort" | "page" | "offset" | "limit" | "embeds" | "fields")
}

/// Splits an operator suffix off a filter key: `"price-gt"` becomes
/// `("price", "$gt")`, a bare key defaults to `$eq`.
fn split_operator_suffix(key: &str) -> (&str, &'static str) {
    for (suffix, operator) in OPERATOR_SUFFIXES {
        if let Some(field) = key.strip_suffix(suffix) {
            if !field.is_empty() {
                return (field, operator);
            }
        }
    }
    (key, "$eq")
}

fn decode_json_object(raw: &str) -> ParseResult<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(doc) if doc.is_object() => Ok(doc),
        _ => Err(ParseError::InvalidComplexFilters),
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}
