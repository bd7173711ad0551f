//! Typed errors with stable string codes.
//!
//! Every variant exposes a `code()` suitable for caller-side message
//! rendering, plus structured context (the offending field, path, or value)
//! on the variant itself.

use thiserror::Error;

/// Errors produced while parsing query parameters into specs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A complex filter value was not valid JSON, or not a JSON object.
    #[error("the complex filters query value must be set to a valid json dict")]
    InvalidComplexFilters,

    /// The limit could not be converted to a non-negative integer.
    #[error("the limit provided ({limit}) is not a non-negative integer")]
    InvalidLimit { limit: String },

    /// The offset could not be converted to a non-negative integer.
    #[error("the offset provided ({offset}) is not a non-negative integer")]
    InvalidOffset { offset: String },

    /// The page could not be converted to a positive integer.
    #[error("the page value provided ({page}) is not a positive integer")]
    InvalidPage { page: String },

    /// A page greater than 1 was requested with no page size to multiply by.
    #[error("page greater than 1 provided without a page max size")]
    PageNoMax,

    /// The limit exceeds the configured maximum page size.
    #[error("the limit provided ({limit}) is greater than the max page size allowed ({max_page_size})")]
    LimitTooHigh { limit: u64, max_page_size: u64 },

    /// A subresource limit could not be converted to a non-negative integer.
    #[error("the subresource limit for {path} ({value}) is not a non-negative integer")]
    InvalidSublimit { path: String, value: String },

    /// A subresource offset could not be converted to a non-negative integer.
    #[error("the subresource offset for {path} ({value}) is not a non-negative integer")]
    InvalidSuboffset { path: String, value: String },

    /// A control token was followed by segments it does not allow, or had no
    /// relationship path in front of it.
    #[error("the subresource path {path} is invalid")]
    InvalidSubresourcePath { path: String },

    /// A sort was constructed with an empty attribute name.
    #[error("the sort provided is invalid")]
    InvalidSortType,
}

impl ParseError {
    /// Stable string code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            ParseError::InvalidComplexFilters => "invalid_complex_filters",
            ParseError::InvalidLimit { .. } => "invalid_limit_value",
            ParseError::InvalidOffset { .. } => "invalid_offset_value",
            ParseError::InvalidPage { .. } => "invalid_page_value",
            ParseError::PageNoMax => "page_no_max",
            ParseError::LimitTooHigh { .. } => "limit_too_high",
            ParseError::InvalidSublimit { .. } => "invalid_sublimit_value",
            ParseError::InvalidSuboffset { .. } => "invalid_suboffset_value",
            ParseError::InvalidSubresourcePath { .. } => "invalid_subresource_path",
            ParseError::InvalidSortType => "invalid_sort_type",
        }
    }
}

/// Errors produced while compiling a query plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// A requested path does not resolve to a relationship.
    #[error("the subresource path {path} does not exist")]
    InvalidSubresource { path: String },

    /// Limit/offset requested on a to-one relationship, or pagination
    /// requested where the engine cannot express it.
    #[error("the subresource options for {path} are invalid")]
    InvalidSubresourceOptions { path: String },

    /// Sorts requested on a child that is not being truncated.
    #[error("sorts on subresource {path} require a limit or offset")]
    InvalidSubresourceSorts { path: String },

    /// A subresource limit exceeds the configured maximum.
    #[error("the limit provided for {path} ({limit}) is greater than the max allowed ({max})")]
    InvalidSubresourceLimit { path: String, limit: u64, max: u64 },

    /// The same path was registered twice with conflicting pagination.
    #[error("the subresource path {path} was embedded multiple times with conflicting options")]
    InvalidSubresourceMultiEmbed { path: String },

    /// A named sort field does not exist on the sorted entity.
    #[error("the sort provided for field {field} is invalid")]
    InvalidSortField { field: String },

    /// A named filter field does not exist.
    #[error("the filter field {field} does not exist")]
    FiltersFieldError { field: String },

    /// A filter field exists but does not support the requested operator.
    #[error("the filter operator {op} for field {field} is invalid")]
    FiltersFieldOpError { field: String, op: String },

    /// A filter field exists but may not be filtered in this context.
    #[error("the filter field {field} is not permitted here")]
    FiltersPermissionError { field: String },

    /// The filter tree exceeds the configured complexity ceiling.
    #[error("the filters provided are too complex ({nodes} nodes, depth {depth})")]
    FiltersTooComplex { nodes: usize, depth: usize },

    /// The preparatory query of the non-window fallback failed, or no
    /// executor was supplied to run it.
    #[error("prefetch query failed: {message}")]
    PrefetchError { message: String },

    /// A parse-level failure surfaced during compilation (e.g. a raw
    /// root limit handed straight to the compiler).
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl PlanError {
    /// Stable string code for this error.
    pub const fn code(&self) -> &'static str {
        match self {
            PlanError::InvalidSubresource { .. } => "invalid_subresource",
            PlanError::InvalidSubresourceOptions { .. } => "invalid_subresource_options",
            PlanError::InvalidSubresourceSorts { .. } => "invalid_subresource_sorts",
            PlanError::InvalidSubresourceLimit { .. } => "invalid_subresource_limit",
            PlanError::InvalidSubresourceMultiEmbed { .. } => "invalid_subresource_multi_embed",
            PlanError::InvalidSortField { .. } => "invalid_sort_field",
            PlanError::FiltersFieldError { .. } => "filters_field_error",
            PlanError::FiltersFieldOpError { .. } => "filters_field_op_error",
            PlanError::FiltersPermissionError { .. } => "filters_permission_error",
            PlanError::FiltersTooComplex { .. } => "filters_too_complex",
            PlanError::PrefetchError { .. } => "prefetch_error",
            PlanError::Parse(e) => e.code(),
        }
    }
}

/// Result alias for parser operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result alias for compiler operations.
pub type PlanResult<T> = std::result::Result<T, PlanError>;
