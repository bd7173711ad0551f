//! # eagerload
//!
//! URL-style query specifications compiled into a single eager-loading SQL
//! statement.
//!
//! The crate covers two stages. [`parser`] turns flat key/value query
//! parameters (filters with operator suffixes, dotted subresource keys,
//! sorts, pagination) into typed specs. [`plan`] compiles those specs
//! against a [`schema`] into one `SELECT` that left-joins every requested
//! relationship path, paginating each path independently with
//! `row_number()` window functions (or a prefetch fallback on dialects
//! without them).
//!
//! ## Quick start
//!
//! ```rust
//! use eagerload::parser::QueryParamParser;
//! use eagerload::plan::{CompileOptions, QueryCompiler, QueryRequest};
//! use eagerload::schema::{
//!     EntityDef, RelationshipDef, RelationshipKind, StaticSchema, TableDef,
//! };
//!
//! static SCHEMA: StaticSchema = StaticSchema {
//!     entities: &[
//!         EntityDef {
//!             key: "album",
//!             table: TableDef {
//!                 name: "Album",
//!                 columns: &["AlbumId", "Title"],
//!                 identity: &["AlbumId"],
//!             },
//!             relationships: &[RelationshipDef {
//!                 name: "tracks",
//!                 target: "track",
//!                 kind: RelationshipKind::OneToMany,
//!                 local_columns: &["AlbumId"],
//!                 remote_columns: &["AlbumId"],
//!                 association: None,
//!                 self_referential: false,
//!             }],
//!         },
//!         EntityDef {
//!             key: "track",
//!             table: TableDef {
//!                 name: "Track",
//!                 columns: &["TrackId", "Name", "AlbumId"],
//!                 identity: &["TrackId"],
//!             },
//!             relationships: &[],
//!         },
//!     ],
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Five tracks per album, only the ones with "love" in the name.
//!     let parser = QueryParamParser::from_query_str(
//!         "tracks._subquery_.Name-like=%25love%25&tracks._limit_=5",
//!     );
//!     let mut request = QueryRequest::new("album");
//!     request.subfilters = parser.parse_subfilters(true)?.into_iter().collect();
//!
//!     let compiler = QueryCompiler::new(&SCHEMA);
//!     let options = CompileOptions {
//!         window_functions: Some(true),
//!         ..CompileOptions::default()
//!     };
//!     let compiled = compiler.compile(&request, &options)?;
//!     assert!(compiled.sql.contains("row_number() OVER"));
//!     Ok(())
//! }
//! ```
//!
//! ## Strict and non-strict modes
//!
//! Every parse and compile entry point runs in one of two modes. Strict
//! mode fails on the first invalid key, value, path, or filter. Non-strict
//! mode drops only the offending piece and carries on, reporting drops in
//! [`plan::CompiledQuery::skipped_paths`]. Non-strict is the mode for
//! endpoints that prefer serving a partial result over a 400.

pub mod dialect;
pub mod error;
pub mod filter;
pub mod parser;
pub mod plan;
pub mod schema;
pub mod spec;
pub mod sql;
pub mod value;

mod trace;

pub use dialect::Dialect;
pub use error::{ParseError, ParseResult, PlanError, PlanResult};
pub use parser::{FilterParseOptions, QueryParamParser};
pub use plan::{
    CompileOptions, CompiledQuery, Prefetch, QueryCompiler, QueryRequest, Selection, SkippedPath,
};
pub use schema::{
    AssociationDef, EntityDef, RelationshipDef, RelationshipKind, SchemaResolver, StaticSchema,
    TableDef,
};
pub use spec::{OffsetLimit, SortDirection, SortSpec, SubfilterSpec};
pub use sql::Sql;
pub use value::Value;
