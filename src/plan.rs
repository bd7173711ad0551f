//! Query plan compilation.
//!
//! [`QueryCompiler::compile`] turns a parsed request (root filters, embed
//! paths, per-path subfilter specs, sorts, pagination) into one composed SQL
//! statement that eager-loads every requested relationship path, with
//! independent pagination at each node.
//!
//! Per-parent pagination uses `row_number() OVER (PARTITION BY <parent-side
//! keys>)` inside a per-node subselect. Dialects without window functions
//! fall back to a preparatory identity query run through a caller-supplied
//! [`Prefetch`] executor; that fallback bounds the child set globally rather
//! than per parent, a documented approximation.

use compact_str::{format_compact, CompactString};
use hashbrown::HashMap;

use crate::dialect::Dialect;
use crate::error::{ParseError, PlanError, PlanResult};
use crate::filter::{
    lower_filters, FilterContext, DEFAULT_MAX_FILTER_DEPTH, DEFAULT_MAX_FILTER_NODES,
};
use crate::schema::{RelationshipDef, SchemaResolver, TableDef};
use crate::spec::{OffsetLimit, SortSpec, SubfilterSpec};
use crate::sql::{qualified, quote_ident, Sql};
use crate::value::Value;
use crate::{trace_compiled, trace_prefetch};

/// Executor for the non-window-function pagination fallback.
///
/// Implementations run the preparatory statement and return the selected
/// identity rows (one inner `Vec` per row, one `Value` per identity column).
/// The statement carries the node's filters, sorts, and a *global*
/// limit/offset; an engine without window functions generally cannot express
/// "top N per group", so the bound is over the whole child set.
pub trait Prefetch {
    fn fetch_identities(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>, String>;
}

/// Per-compile knobs. Shared hooks are plain `Fn` references so one options
/// value can serve concurrent compiles.
pub struct CompileOptions<'a> {
    pub dialect: Dialect,
    /// Overrides the dialect's window-function capability, mainly so tests
    /// can exercise both strategies against one engine.
    pub window_functions: Option<bool>,
    pub strict: bool,
    /// Ceiling for per-node limits; exceeded limits error in strict mode and
    /// clamp otherwise.
    pub max_sublimit: Option<u64>,
    pub max_filter_nodes: usize,
    pub max_filter_depth: usize,
    /// Filter-field permission hook, forwarded to filter lowering.
    pub permit_filter: Option<&'a dyn Fn(&str) -> bool>,
    /// Per-node required filters (permission/tenant scoping), keyed by
    /// relationship path with `""` for the root. ANDed in before user
    /// filters, never overridable by user input.
    pub required_filter: Option<&'a dyn Fn(&str) -> Option<serde_json::Value>>,
    pub prefetch: Option<&'a dyn Prefetch>,
}

impl Default for CompileOptions<'_> {
    fn default() -> Self {
        CompileOptions {
            dialect: Dialect::default(),
            window_functions: None,
            strict: true,
            max_sublimit: None,
            max_filter_nodes: DEFAULT_MAX_FILTER_NODES,
            max_filter_depth: DEFAULT_MAX_FILTER_DEPTH,
            permit_filter: None,
            required_filter: None,
            prefetch: None,
        }
    }
}

/// One parsed request, ready for compilation.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// Root entity key, resolvable through the compiler's schema.
    pub entity: String,
    /// Root filter tree.
    pub filters: Option<serde_json::Value>,
    /// Subfilter specs keyed by relationship path, in registration order.
    /// The same path registered twice with conflicting pagination is an
    /// `invalid_subresource_multi_embed` error.
    pub subfilters: Vec<(String, SubfilterSpec)>,
    /// Relationship paths to eager-load with no extra constraints. A
    /// trailing column segment (a property embed) attaches to its parent
    /// path.
    pub embeds: Vec<String>,
    pub sorts: Vec<SortSpec>,
    /// Raw root pagination, validated at compile time.
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl QueryRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        QueryRequest {
            entity: entity.into(),
            ..QueryRequest::default()
        }
    }
}

/// Column mapping for one occurrence of an entity in the compiled statement.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Relationship path, `""` for the root.
    pub path: String,
    pub alias: CompactString,
    /// `(result label, source column)` pairs in select-list order.
    pub columns: Vec<(String, &'static str)>,
}

/// A path dropped during a non-strict compile, with the error code that
/// would have failed a strict one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    pub path: String,
    pub code: &'static str,
}

/// The composed statement plus everything a caller needs to execute it and
/// regroup the joined rows.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub selections: Vec<Selection>,
    pub skipped_paths: Vec<SkippedPath>,
    /// Preparatory queries executed for the non-window fallback.
    pub prefetch_count: usize,
}

/// Compiles query requests against a fixed schema.
pub struct QueryCompiler<'a> {
    resolver: &'a dyn SchemaResolver,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(resolver: &'a dyn SchemaResolver) -> Self {
        QueryCompiler { resolver }
    }

    /// Compiles one request into a single eager-loading statement.
    ///
    /// Strict mode fails on the first invalid path, filter, sort, or
    /// pagination value. Non-strict mode drops only the offending piece,
    /// keeps processing siblings, and reports the drops in
    /// [`CompiledQuery::skipped_paths`].
    pub fn compile(
        &self,
        request: &QueryRequest,
        options: &CompileOptions<'_>,
    ) -> PlanResult<CompiledQuery> {
        Compilation::new(self.resolver, request, options)?.run()
    }
}

/// Plan node for one relationship occurrence.
struct Node<'a> {
    path: String,
    rel: &'a RelationshipDef,
    table: &'a TableDef,
    alias: CompactString,
    parent: Option<usize>,
    spec: SubfilterSpec,
}

struct Compilation<'a, 'o> {
    resolver: &'a dyn SchemaResolver,
    request: &'a QueryRequest,
    options: &'o CompileOptions<'o>,
    root_table: &'a TableDef,
    window: bool,
    nodes: Vec<Node<'a>>,
    // (parent node, relationship name) -> node, fresh per compile.
    dedup: HashMap<(Option<usize>, &'a str), usize>,
    alias_counts: HashMap<&'a str, usize>,
    skipped: Vec<SkippedPath>,
    prefetch_count: usize,
    subquery_seq: usize,
}

impl<'a, 'o> Compilation<'a, 'o> {
    fn new(
        resolver: &'a dyn SchemaResolver,
        request: &'a QueryRequest,
        options: &'o CompileOptions<'o>,
    ) -> PlanResult<Self> {
        let root_table =
            resolver
                .table(&request.entity)
                .ok_or_else(|| PlanError::InvalidSubresource {
                    path: request.entity.clone(),
                })?;
        let window = options
            .window_functions
            .unwrap_or_else(|| options.dialect.supports_window_functions());
        Ok(Compilation {
            resolver,
            request,
            options,
            root_table,
            window,
            nodes: Vec::new(),
            dedup: HashMap::new(),
            alias_counts: HashMap::new(),
            skipped: Vec::new(),
            prefetch_count: 0,
            subquery_seq: 0,
        })
    }

    /// Records `error` for `path` and continues in non-strict mode, fails in
    /// strict mode.
    fn flag(&mut self, path: &str, error: PlanError) -> PlanResult<()> {
        if self.options.strict {
            return Err(error);
        }
        self.skipped.push(SkippedPath {
            path: path.to_string(),
            code: error.code(),
        });
        Ok(())
    }

    fn run(mut self) -> PlanResult<CompiledQuery> {
        let root_ol = self.validate_root_pagination()?;
        let root_sorts = self.validate_root_sorts()?;
        self.build_tree()?;
        self.validate_nodes()?;

        let nested_pagination = self
            .nodes
            .iter()
            .any(|node| node.spec.offset_limit.is_some());
        let root_paginated = root_ol.is_some();
        // Plain LIMIT/OFFSET truncates joined rows, not root rows; once any
        // child is paginated the root must be materialized and row-numbered
        // (or prefetched) before the joins multiply it.
        let root_windowed = root_paginated && nested_pagination && self.window;
        let mut root_filter = self.lower_node_filters(
            "",
            &self.request.entity,
            self.root_table.name,
            self.request.filters.clone(),
        )?;
        let mut root_ol = root_ol;
        if root_paginated && nested_pagination && !self.window {
            match self.prefetch_identities(
                "",
                self.root_table,
                self.root_table.name,
                &root_filter,
                &root_sorts,
                root_ol.unwrap_or_default(),
            ) {
                Ok(identity) => {
                    root_filter = Sql::join([root_filter, identity], " AND ");
                    root_ol = None;
                }
                Err(e) => {
                    self.flag("", e)?;
                    root_ol = None;
                }
            }
        }

        // Join targets first; they consume the alias counters in path order.
        let mut joins = Sql::empty();
        let mut node_selects: Vec<Sql> = Vec::new();
        let mut selections = vec![self.root_selection(root_windowed)];
        for idx in 0..self.nodes.len() {
            let join = self.build_join(idx, root_windowed)?;
            joins = joins.append(join);
            node_selects.push(self.node_select_list(idx));
            selections.push(self.node_selection(idx));
        }

        let mut select_list = vec![self.root_select_list(root_windowed)];
        select_list.extend(node_selects);

        let mut sql = Sql::raw("SELECT ")
            .append(Sql::join(select_list, ", "))
            .append_raw(" FROM ");

        let mut outer_where = Sql::empty();
        if root_windowed {
            let ol = root_ol.unwrap_or_default();
            sql = sql.append(self.root_window_source(&root_filter, &root_sorts));
            outer_where = row_number_bounds("anon_1.row_number", ol);
            root_ol = None;
        } else {
            sql = sql.append_raw(quote_ident(self.root_table.name));
            outer_where = Sql::join([outer_where, root_filter], " AND ");
        }

        sql = sql.append(joins);
        if !outer_where.is_empty() {
            sql = sql.append_raw(" WHERE ").append(outer_where);
        }

        let order_by = if root_windowed {
            Sql::raw("anon_1.row_number")
        } else if !root_sorts.is_empty() {
            sort_fragment(self.root_table.name, &root_sorts, &[])
        } else if !self.nodes.is_empty() {
            sort_fragment(self.root_table.name, &[], self.root_table.identity)
        } else {
            Sql::empty()
        };
        if !order_by.is_empty() {
            sql = sql.append_raw(" ORDER BY ").append(order_by);
        }
        if let Some(ol) = root_ol {
            // Plain pagination; only reachable with no nested pagination.
            sql = sql.append_raw(limit_offset_clause(self.options.dialect, ol));
        }

        let rendered = sql.render(self.options.dialect);
        trace_compiled!(rendered, sql.params().len());
        Ok(CompiledQuery {
            sql: rendered,
            params: sql.into_params(),
            selections,
            skipped_paths: self.skipped,
            prefetch_count: self.prefetch_count,
        })
    }

    fn validate_root_pagination(&mut self) -> PlanResult<Option<OffsetLimit>> {
        let mut offset = self.request.offset.unwrap_or(0);
        if offset < 0 {
            self.flag(
                "",
                PlanError::Parse(ParseError::InvalidOffset {
                    offset: offset.to_string(),
                }),
            )?;
            offset = 0;
        }
        let mut limit = self.request.limit;
        if let Some(l) = limit {
            if l < 0 {
                self.flag(
                    "",
                    PlanError::Parse(ParseError::InvalidLimit {
                        limit: l.to_string(),
                    }),
                )?;
                limit = None;
            }
        }
        if offset == 0 && limit.is_none() {
            return Ok(None);
        }
        let mut ol = OffsetLimit::default();
        ol.set_offset(offset as u64);
        if let Some(l) = limit {
            ol.set_limit(l as u64);
        }
        if !bounds_fit_i64(ol) {
            self.flag(
                "",
                PlanError::Parse(ParseError::InvalidOffset {
                    offset: offset.to_string(),
                }),
            )?;
            return Ok(None);
        }
        Ok(Some(ol))
    }

    fn validate_root_sorts(&mut self) -> PlanResult<Vec<SortSpec>> {
        let mut sorts = Vec::with_capacity(self.request.sorts.len());
        for sort in &self.request.sorts {
            if self.root_table.has_column(sort.attr()) {
                sorts.push(sort.clone());
            } else {
                let error = PlanError::InvalidSortField {
                    field: sort.attr().to_string(),
                };
                self.flag("", error)?;
            }
        }
        Ok(sorts)
    }

    fn build_tree(&mut self) -> PlanResult<()> {
        // Sorted registration keeps a path after its own prefix, so parent
        // nodes always exist by the time a child path is walked.
        let mut registrations: Vec<(&str, Option<&SubfilterSpec>)> = self
            .request
            .embeds
            .iter()
            .map(|path| (path.as_str(), None))
            .chain(
                self.request
                    .subfilters
                    .iter()
                    .map(|(path, spec)| (path.as_str(), Some(spec))),
            )
            .collect();
        registrations.sort_by_key(|(path, _)| *path);

        for (path, spec) in registrations {
            if let Err(e) = self.register_path(path, spec) {
                self.flag(path, e)?;
            }
        }
        Ok(())
    }

    fn register_path(&mut self, path: &str, spec: Option<&SubfilterSpec>) -> PlanResult<()> {
        let is_embed = spec.is_none();
        let segments: Vec<&str> = path.split('.').collect();
        let mut parent: Option<usize> = None;
        let mut entity = self.request.entity.as_str();
        let mut walked = String::new();

        for (i, segment) in segments.iter().enumerate() {
            if let Some(rel) = self.resolver.relationship(entity, segment) {
                if !walked.is_empty() {
                    walked.push('.');
                }
                walked.push_str(segment);
                let idx = self.get_or_create_node(parent, rel, &walked)?;
                parent = Some(idx);
                entity = rel.target;
                continue;
            }
            let table = self
                .resolver
                .table(entity)
                .ok_or_else(|| PlanError::InvalidSubresource {
                    path: path.to_string(),
                })?;
            // A property embed names a column after the relationship path;
            // it loads the parent path and nothing more.
            if is_embed && i == segments.len() - 1 && table.has_column(segment) {
                return Ok(());
            }
            return Err(PlanError::InvalidSubresource {
                path: path.to_string(),
            });
        }

        if let (Some(idx), Some(spec)) = (parent, spec) {
            self.attach_spec(idx, spec)?;
        }
        Ok(())
    }

    fn get_or_create_node(
        &mut self,
        parent: Option<usize>,
        rel: &'a RelationshipDef,
        path: &str,
    ) -> PlanResult<usize> {
        if let Some(idx) = self.dedup.get(&(parent, rel.name)) {
            return Ok(*idx);
        }
        let table = self
            .resolver
            .table(rel.target)
            .ok_or_else(|| PlanError::InvalidSubresource {
                path: path.to_string(),
            })?;
        let count = self.alias_counts.entry(table.name).or_insert(0);
        *count += 1;
        let alias = format_compact!("{}{}", table.name, count);
        let idx = self.nodes.len();
        self.nodes.push(Node {
            path: path.to_string(),
            rel,
            table,
            alias,
            parent,
            spec: SubfilterSpec::new(),
        });
        self.dedup.insert((parent, rel.name), idx);
        Ok(idx)
    }

    fn attach_spec(&mut self, idx: usize, spec: &SubfilterSpec) -> PlanResult<()> {
        let node = &mut self.nodes[idx];
        if let (Some(existing), Some(incoming)) = (node.spec.offset_limit, spec.offset_limit) {
            if existing != incoming {
                return Err(PlanError::InvalidSubresourceMultiEmbed {
                    path: node.path.clone(),
                });
            }
        }
        if let Some(filters) = &spec.filters {
            node.spec.push_filter(filters.clone());
        }
        node.spec.sorts.extend(spec.sorts.iter().cloned());
        if spec.offset_limit.is_some() {
            node.spec.offset_limit = spec.offset_limit;
        }
        Ok(())
    }

    fn validate_nodes(&mut self) -> PlanResult<()> {
        for idx in 0..self.nodes.len() {
            let path = self.nodes[idx].path.clone();

            // Pagination normalization: "offset 0, no limit" asks nothing.
            if let Some(ol) = self.nodes[idx].spec.offset_limit {
                if ol.offset() == 0 && ol.limit().is_none() {
                    self.nodes[idx].spec.offset_limit = None;
                }
            }

            if let Some(ol) = self.nodes[idx].spec.offset_limit {
                if !self.nodes[idx].rel.kind.is_to_many() {
                    // A single related row cannot be paginated.
                    self.flag(
                        &path,
                        PlanError::InvalidSubresourceOptions { path: path.clone() },
                    )?;
                    self.nodes[idx].spec.offset_limit = None;
                } else if let (Some(max), Some(limit)) = (self.options.max_sublimit, ol.limit()) {
                    if limit > max {
                        self.flag(
                            &path,
                            PlanError::InvalidSubresourceLimit {
                                path: path.clone(),
                                limit,
                                max,
                            },
                        )?;
                        let mut clamped = ol;
                        clamped.set_limit(max);
                        self.nodes[idx].spec.offset_limit = Some(clamped);
                    }
                }
            }

            if let Some(ol) = self.nodes[idx].spec.offset_limit {
                if !bounds_fit_i64(ol) {
                    self.flag(
                        &path,
                        PlanError::InvalidSubresourceOptions { path: path.clone() },
                    )?;
                    self.nodes[idx].spec.offset_limit = None;
                }
            }

            if !self.nodes[idx].spec.sorts.is_empty()
                && self.nodes[idx].spec.offset_limit.is_none()
            {
                // Sorting a child that is not being truncated is meaningless
                // overhead; rows are regrouped per parent by the caller.
                self.flag(
                    &path,
                    PlanError::InvalidSubresourceSorts { path: path.clone() },
                )?;
                self.nodes[idx].spec.sorts.clear();
            }

            let mut kept = Vec::with_capacity(self.nodes[idx].spec.sorts.len());
            for sort in self.nodes[idx].spec.sorts.clone() {
                if self.nodes[idx].table.has_column(sort.attr()) {
                    kept.push(sort);
                } else {
                    let error = PlanError::InvalidSortField {
                        field: sort.attr().to_string(),
                    };
                    self.flag(&path, error)?;
                }
            }
            self.nodes[idx].spec.sorts = kept;
        }
        Ok(())
    }

    /// Required filters for `path` ANDed with the user filter tree, lowered
    /// against `alias`. Lowering failures drop the user filters in
    /// non-strict mode; required filters never lower fallibly from user
    /// input and any error in them is a caller bug surfaced in both modes.
    fn lower_node_filters(
        &mut self,
        path: &str,
        entity: &str,
        alias: &str,
        user_filters: Option<serde_json::Value>,
    ) -> PlanResult<Sql> {
        let ctx = FilterContext {
            resolver: self.resolver,
            entity,
            alias,
            permit: self.options.permit_filter,
            max_nodes: self.options.max_filter_nodes,
            max_depth: self.options.max_filter_depth,
        };
        let required = match self.options.required_filter.and_then(|f| f(path)) {
            Some(doc) => lower_filters(&ctx, &doc)?,
            None => Sql::empty(),
        };
        let user = match user_filters {
            Some(doc) => match lower_filters(&ctx, &doc) {
                Ok(sql) => sql,
                Err(e) => {
                    self.flag(path, e)?;
                    Sql::empty()
                }
            },
            None => Sql::empty(),
        };
        Ok(Sql::join([required, user], " AND "))
    }

    /// Runs the preparatory query of the non-window fallback and returns the
    /// identity membership predicate to AND into the node's filters.
    fn prefetch_identities(
        &mut self,
        path: &str,
        table: &TableDef,
        alias: &str,
        filter: &Sql,
        sorts: &[SortSpec],
        ol: OffsetLimit,
    ) -> PlanResult<Sql> {
        let executor = self
            .options
            .prefetch
            .ok_or_else(|| PlanError::PrefetchError {
                message: "dialect lacks window functions and no prefetch executor is configured"
                    .to_string(),
            })?;

        let id_list = Sql::join(
            table
                .identity
                .iter()
                .map(|col| Sql::raw(qualified(alias, col))),
            ", ",
        );
        let mut sql = Sql::raw("SELECT ")
            .append(id_list)
            .append_raw(" FROM ")
            .append_raw(quote_ident(table.name));
        if alias != table.name {
            sql = sql
                .append_raw(" AS ")
                .append_raw(quote_ident(alias));
        }
        if !filter.is_empty() {
            sql = sql.append_raw(" WHERE ").append(filter.clone());
        }
        sql = sql
            .append_raw(" ORDER BY ")
            .append(sort_fragment(alias, sorts, table.identity))
            .append_raw(limit_offset_clause(self.options.dialect, ol));

        let rendered = sql.render(self.options.dialect);
        let rows = executor
            .fetch_identities(&rendered, sql.params())
            .map_err(|message| PlanError::PrefetchError { message })?;
        self.prefetch_count += 1;
        trace_prefetch!(path, rows.len());
        Ok(identity_predicate(alias, table.identity, rows))
    }

    fn root_selection(&self, root_windowed: bool) -> Selection {
        let columns = self
            .root_table
            .columns
            .iter()
            .map(|col| {
                let label = if root_windowed {
                    format!("anon_1_{}_{}", self.root_table.name, col)
                } else {
                    format!("{}_{}", self.root_table.name, col)
                };
                (label, *col)
            })
            .collect();
        Selection {
            path: String::new(),
            alias: if root_windowed {
                CompactString::const_new("anon_1")
            } else {
                CompactString::new(self.root_table.name)
            },
            columns,
        }
    }

    fn node_selection(&self, idx: usize) -> Selection {
        let node = &self.nodes[idx];
        let columns = node
            .table
            .columns
            .iter()
            .map(|col| (format!("{}_{}", node.alias, col), *col))
            .collect();
        Selection {
            path: node.path.clone(),
            alias: node.alias.clone(),
            columns,
        }
    }

    fn root_select_list(&self, root_windowed: bool) -> Sql {
        let table = self.root_table;
        Sql::join(
            table.columns.iter().map(|col| {
                if root_windowed {
                    Sql::raw(format!(
                        "anon_1.\"{0}_{1}\" AS \"anon_1_{0}_{1}\"",
                        table.name, col
                    ))
                } else {
                    Sql::raw(qualified(table.name, col))
                        .append_raw(" AS ")
                        .append_raw(quote_ident(&format!("{}_{}", table.name, col)))
                }
            }),
            ", ",
        )
    }

    fn node_select_list(&self, idx: usize) -> Sql {
        let node = &self.nodes[idx];
        Sql::join(
            node.table.columns.iter().map(|col| {
                Sql::raw(qualified(&node.alias, col))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(&format!("{}_{}", node.alias, col)))
            }),
            ", ",
        )
    }

    /// The root materialized as `(SELECT <labeled cols>, row_number() OVER
    /// (ORDER BY ...) AS row_number FROM <table> [WHERE ...]) AS anon_1`.
    fn root_window_source(&self, filter: &Sql, sorts: &[SortSpec]) -> Sql {
        let table = self.root_table;
        let cols = Sql::join(
            table.columns.iter().map(|col| {
                Sql::raw(qualified(table.name, col))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(&format!("{}_{}", table.name, col)))
            }),
            ", ",
        );
        let mut inner = Sql::raw("SELECT ")
            .append(cols)
            .append_raw(", row_number() OVER (ORDER BY ")
            .append(sort_fragment(table.name, sorts, table.identity))
            .append_raw(") AS row_number FROM ")
            .append_raw(quote_ident(table.name));
        if !filter.is_empty() {
            inner = inner.append_raw(" WHERE ").append(filter.clone());
        }
        inner.subquery().append_raw(" AS anon_1")
    }

    /// Emits `LEFT OUTER JOIN <target> ON <condition>` for node `idx`,
    /// including the association-table hop for many-to-many.
    fn build_join(&mut self, idx: usize, root_windowed: bool) -> PlanResult<Sql> {
        let target = self.build_node_target(idx)?;
        let node = &self.nodes[idx];
        let parent = node.parent;

        let parent_ref = |col: &str| -> Sql {
            match parent {
                Some(p) => Sql::raw(qualified(&self.nodes[p].alias, col)),
                None if root_windowed => Sql::raw(format!(
                    "anon_1.\"{}_{}\"",
                    self.root_table.name, col
                )),
                None => Sql::raw(qualified(self.root_table.name, col)),
            }
        };

        if let Some(assoc) = node.rel.association.as_ref() {
            // A windowed target already joined the association inside its
            // subselect and carries the parent-side columns out; reuse that
            // derived condition instead of hopping through the association
            // a second time.
            if self.window && node.spec.offset_limit.is_some() {
                let on = Sql::join(
                    assoc.parent_columns.iter().map(|(assoc_col, parent_col)| {
                        let carried = format!("{}_{}", assoc.table, assoc_col);
                        Sql::raw(qualified(&node.alias, &carried))
                            .append_raw(" = ")
                            .append(parent_ref(parent_col))
                    }),
                    " AND ",
                );
                return Ok(Sql::raw(" LEFT OUTER JOIN ")
                    .append(target)
                    .append_raw(" ON ")
                    .append(on));
            }
            let count = self.alias_counts.entry(assoc.table).or_insert(0);
            *count += 1;
            let assoc_alias = format_compact!("{}_{}", assoc.table, count);
            let node = &self.nodes[idx];

            let parent_on = Sql::join(
                assoc.parent_columns.iter().map(|(assoc_col, parent_col)| {
                    Sql::raw(qualified(&assoc_alias, assoc_col))
                        .append_raw(" = ")
                        .append(parent_ref(parent_col))
                }),
                " AND ",
            );
            let child_on = Sql::join(
                assoc.child_columns.iter().map(|(assoc_col, child_col)| {
                    Sql::raw(qualified(&assoc_alias, assoc_col))
                        .append_raw(" = ")
                        .append_raw(qualified(&node.alias, child_col))
                }),
                " AND ",
            );
            return Ok(Sql::raw(" LEFT OUTER JOIN ")
                .append_raw(quote_ident(assoc.table))
                .append_raw(" AS ")
                .append_raw(quote_ident(&assoc_alias))
                .append_raw(" ON ")
                .append(parent_on)
                .append_raw(" LEFT OUTER JOIN ")
                .append(target)
                .append_raw(" ON ")
                .append(child_on));
        }

        let on = Sql::join(
            node.rel
                .local_columns
                .iter()
                .zip(node.rel.remote_columns)
                .map(|(local, remote)| {
                    parent_ref(local)
                        .append_raw(" = ")
                        .append_raw(qualified(&node.alias, remote))
                }),
            " AND ",
        );
        Ok(Sql::raw(" LEFT OUTER JOIN ")
            .append(target)
            .append_raw(" ON ")
            .append(on))
    }

    /// Builds the join target for a node: the bare table, a filtered
    /// subselect, or a row-number-bounded subselect, aliased to the node.
    fn build_node_target(&mut self, idx: usize) -> PlanResult<Sql> {
        let path = self.nodes[idx].path.clone();
        let entity = self.nodes[idx].rel.target;
        let alias = self.nodes[idx].alias.clone();
        let table = self.nodes[idx].table;
        let user_filters = self.nodes[idx].spec.filters.clone();

        let mut filter = self.lower_node_filters(&path, entity, &alias, user_filters)?;
        let mut prefetched = false;

        if let Some(ol) = self.nodes[idx].spec.offset_limit {
            if self.window {
                return Ok(self.windowed_target(idx, &filter, ol));
            }
            let sorts = self.nodes[idx].spec.sorts.clone();
            match self.prefetch_identities(&path, table, &alias, &filter, &sorts, ol) {
                Ok(identity) => {
                    filter = Sql::join([filter, identity], " AND ");
                    prefetched = true;
                }
                Err(e) => self.flag(&path, e)?,
            }
        }

        if filter.is_empty() && !prefetched {
            return Ok(Sql::raw(quote_ident(table.name))
                .append_raw(" AS ")
                .append_raw(quote_ident(&alias)));
        }

        let node = &self.nodes[idx];
        let cols = Sql::join(
            table.columns.iter().map(|col| {
                Sql::raw(qualified(&alias, col))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(col))
            }),
            ", ",
        );
        let mut select = Sql::raw("SELECT ")
            .append(cols)
            .append_raw(" FROM ")
            .append_raw(quote_ident(table.name))
            .append_raw(" AS ")
            .append_raw(quote_ident(&alias));
        if !filter.is_empty() {
            select = select.append_raw(" WHERE ").append(filter);
        }
        if prefetched && !node.spec.sorts.is_empty() {
            // The identity prefetch already chose which rows survive; the
            // sort is reapplied so grouped children come back in order.
            select = select
                .append_raw(" ORDER BY ")
                .append(sort_fragment(&alias, &node.spec.sorts, &[]));
        }
        Ok(select.alias(&alias))
    }

    /// Per-parent pagination: an inner select row-numbering the (filtered)
    /// child partitioned by the parent-side key, then a bounding select over
    /// the numbered rows.
    ///
    /// For many-to-many the inner select joins through the association table
    /// and partitions by the association's parent-side columns; the child's
    /// own key would number rows globally, not per parent. A shared child
    /// survives the window once per parent, so the parent-side columns are
    /// carried through the bounded select and the outer join condition uses
    /// them directly. Joining back through the association on the child key
    /// would match every surviving copy of a shared child.
    fn windowed_target(&mut self, idx: usize, filter: &Sql, ol: OffsetLimit) -> Sql {
        let node = &self.nodes[idx];
        let table = node.table;
        let alias = node.alias.clone();
        self.subquery_seq += 1;
        let q = format!("q{}", self.subquery_seq);

        let partition = match node.rel.association.as_ref() {
            Some(assoc) => Sql::join(
                assoc
                    .parent_columns
                    .iter()
                    .map(|(assoc_col, _)| Sql::raw(qualified(assoc.table, assoc_col))),
                ", ",
            ),
            None => Sql::join(
                node.rel
                    .remote_columns
                    .iter()
                    .map(|col| Sql::raw(qualified(&alias, col))),
                ", ",
            ),
        };

        let mut inner_cols = Sql::join(
            table.columns.iter().map(|col| {
                Sql::raw(qualified(&alias, col))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(col))
            }),
            ", ",
        );
        if let Some(assoc) = node.rel.association.as_ref() {
            let carried = Sql::join(
                assoc.parent_columns.iter().map(|(assoc_col, _)| {
                    Sql::raw(qualified(assoc.table, assoc_col))
                        .append_raw(" AS ")
                        .append_raw(quote_ident(&format!("{}_{}", assoc.table, assoc_col)))
                }),
                ", ",
            );
            inner_cols = Sql::join([inner_cols, carried], ", ");
        }
        let mut inner = Sql::raw("SELECT ")
            .append(inner_cols)
            .append_raw(", row_number() OVER (");
        if !partition.is_empty() {
            inner = inner.append_raw("PARTITION BY ").append(partition).append_raw(" ");
        }
        inner = inner
            .append_raw("ORDER BY ")
            .append(sort_fragment(&alias, &node.spec.sorts, table.identity))
            .append_raw(") AS row_number FROM ")
            .append_raw(quote_ident(table.name))
            .append_raw(" AS ")
            .append_raw(quote_ident(&alias));
        if let Some(assoc) = node.rel.association.as_ref() {
            let on = Sql::join(
                assoc.child_columns.iter().map(|(assoc_col, child_col)| {
                    Sql::raw(qualified(assoc.table, assoc_col))
                        .append_raw(" = ")
                        .append_raw(qualified(&alias, child_col))
                }),
                " AND ",
            );
            inner = inner
                .append_raw(" JOIN ")
                .append_raw(quote_ident(assoc.table))
                .append_raw(" ON ")
                .append(on);
        }
        if !filter.is_empty() {
            inner = inner.append_raw(" WHERE ").append(filter.clone());
        }

        let mut outer_cols = Sql::join(
            table
                .columns
                .iter()
                .map(|col| Sql::raw(format!("{q}.\"{col}\" AS \"{col}\""))),
            ", ",
        );
        if let Some(assoc) = node.rel.association.as_ref() {
            let carried = Sql::join(
                assoc.parent_columns.iter().map(|(assoc_col, _)| {
                    let label = format!("{}_{}", assoc.table, assoc_col);
                    Sql::raw(format!("{q}.\"{label}\" AS \"{label}\""))
                }),
                ", ",
            );
            outer_cols = Sql::join([outer_cols, carried], ", ");
        }
        Sql::raw("SELECT ")
            .append(outer_cols)
            .append_raw(format!(", {q}.row_number AS row_number FROM "))
            .append(inner.subquery())
            .append_raw(format!(" AS {q} WHERE "))
            .append(row_number_bounds(&format!("{q}.row_number"), ol))
            .alias(&alias)
    }
}

/// `<col> >= offset+1 [AND <col> <= offset+limit]` over a row-number column.
/// The bounds saturate at `i64::MAX`; pagination that would exceed it is
/// rejected during validation before this runs.
fn row_number_bounds(column: &str, ol: OffsetLimit) -> Sql {
    let cap = i64::MAX as u64;
    let lower = ol.offset().saturating_add(1).min(cap) as i64;
    let mut bounds = Sql::raw(column)
        .append_raw(" >= ")
        .append(Sql::parameter(Value::Integer(lower)));
    if let Some(limit) = ol.limit() {
        let upper = ol.offset().saturating_add(limit).min(cap) as i64;
        bounds = bounds
            .append_raw(" AND ")
            .append_raw(column)
            .append_raw(" <= ")
            .append(Sql::parameter(Value::Integer(upper)));
    }
    bounds
}

/// Whether the row-number bounds derived from `ol` fit in `i64` parameters.
fn bounds_fit_i64(ol: OffsetLimit) -> bool {
    match ol.offset().checked_add(ol.limit().unwrap_or(0)) {
        Some(upper) => upper < i64::MAX as u64,
        None => false,
    }
}

/// Sorts qualified by `alias`, falling back to `identity` ascending.
fn sort_fragment(alias: &str, sorts: &[SortSpec], identity: &[&str]) -> Sql {
    if sorts.is_empty() {
        return Sql::join(
            identity
                .iter()
                .map(|col| Sql::raw(qualified(alias, col)).append_raw(" ASC")),
            ", ",
        );
    }
    Sql::join(
        sorts.iter().map(|sort| {
            Sql::raw(qualified(alias, sort.attr()))
                .append_raw(" ")
                .append_raw(sort.direction().keyword())
        }),
        ", ",
    )
}

/// Identity membership over prefetched rows: `IN` for single-column
/// identities, OR-of-AND for composite ones. An empty result set must match
/// nothing, not everything.
fn identity_predicate(alias: &str, identity: &[&'static str], rows: Vec<Vec<Value>>) -> Sql {
    if identity.len() == 1 {
        let column = Sql::raw(qualified(alias, identity[0]));
        if rows.is_empty() {
            return column.append_raw(" IN (NULL)");
        }
        let values = rows.into_iter().filter_map(|mut row| row.pop());
        return column
            .append_raw(" IN (")
            .append(Sql::parameters(values))
            .append_raw(")");
    }
    if rows.is_empty() {
        return Sql::raw("1 = 0");
    }
    Sql::join(
        rows.into_iter().map(|row| {
            Sql::join(
                identity.iter().zip(row).map(|(col, value)| {
                    Sql::raw(qualified(alias, col))
                        .append_raw(" = ")
                        .append(Sql::parameter(value))
                }),
                " AND ",
            )
            .subquery()
        }),
        " OR ",
    )
    .subquery()
}

fn limit_offset_clause(dialect: Dialect, ol: OffsetLimit) -> String {
    match (ol.limit(), ol.offset()) {
        (Some(limit), 0) => format!(" LIMIT {limit}"),
        (Some(limit), offset) => format!(" LIMIT {limit} OFFSET {offset}"),
        (None, 0) => String::new(),
        // SQLite and MySQL cannot express OFFSET without LIMIT.
        (None, offset) => match dialect {
            Dialect::PostgreSQL => format!(" OFFSET {offset}"),
            Dialect::SQLite => format!(" LIMIT -1 OFFSET {offset}"),
            Dialect::MySQL => format!(" LIMIT 18446744073709551615 OFFSET {offset}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityDef, RelationshipKind, StaticSchema};

    static SCHEMA: StaticSchema = StaticSchema {
        entities: &[
            EntityDef {
                key: "album",
                table: TableDef {
                    name: "Album",
                    columns: &["AlbumId", "Title", "ArtistId"],
                    identity: &["AlbumId"],
                },
                relationships: &[
                    RelationshipDef {
                        name: "tracks",
                        target: "track",
                        kind: RelationshipKind::OneToMany,
                        local_columns: &["AlbumId"],
                        remote_columns: &["AlbumId"],
                        association: None,
                        self_referential: false,
                    },
                    RelationshipDef {
                        name: "artist",
                        target: "artist",
                        kind: RelationshipKind::ManyToOne,
                        local_columns: &["ArtistId"],
                        remote_columns: &["ArtistId"],
                        association: None,
                        self_referential: false,
                    },
                ],
            },
            EntityDef {
                key: "artist",
                table: TableDef {
                    name: "Artist",
                    columns: &["ArtistId", "Name"],
                    identity: &["ArtistId"],
                },
                relationships: &[],
            },
            EntityDef {
                key: "track",
                table: TableDef {
                    name: "Track",
                    columns: &["TrackId", "Name", "AlbumId"],
                    identity: &["TrackId"],
                },
                relationships: &[],
            },
        ],
    };

    fn spec_with_pagination(offset: i64, limit: Option<i64>) -> SubfilterSpec {
        SubfilterSpec::new().with_offset_limit(OffsetLimit::new(offset, limit).unwrap())
    }

    #[test]
    fn plain_embed_joins_table_directly() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.embeds = vec!["tracks".to_string()];
        let compiled = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"Album\".\"AlbumId\" AS \"Album_AlbumId\", \
             \"Album\".\"Title\" AS \"Album_Title\", \
             \"Album\".\"ArtistId\" AS \"Album_ArtistId\", \
             \"Track1\".\"TrackId\" AS \"Track1_TrackId\", \
             \"Track1\".\"Name\" AS \"Track1_Name\", \
             \"Track1\".\"AlbumId\" AS \"Track1_AlbumId\" \
             FROM \"Album\" \
             LEFT OUTER JOIN \"Track\" AS \"Track1\" \
             ON \"Album\".\"AlbumId\" = \"Track1\".\"AlbumId\" \
             ORDER BY \"Album\".\"AlbumId\" ASC"
        );
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn paginated_child_uses_row_number() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![(
            "tracks".to_string(),
            spec_with_pagination(1, Some(1))
                .with_filters(serde_json::json!({"TrackId": {"$gte": 5}})),
        )];
        let options = CompileOptions {
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &options).unwrap();
        assert!(compiled.sql.contains(
            "row_number() OVER (PARTITION BY \"Track1\".\"AlbumId\" \
             ORDER BY \"Track1\".\"TrackId\" ASC) AS row_number"
        ));
        assert!(compiled
            .sql
            .contains("AS q1 WHERE q1.row_number >= ? AND q1.row_number <= ?"));
        // Filter param first, then the row-number bounds.
        assert_eq!(
            compiled.params,
            vec![Value::Integer(5), Value::Integer(2), Value::Integer(2)]
        );
    }

    #[test]
    fn pagination_on_to_one_fails() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![("artist".to_string(), spec_with_pagination(1, None))];
        let options = CompileOptions {
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let err = compiler.compile(&request, &options).unwrap_err();
        assert_eq!(err.code(), "invalid_subresource_options");
    }

    #[test]
    fn sorts_without_pagination_fail_strict_drop_non_strict() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![(
            "tracks".to_string(),
            SubfilterSpec::new().with_sorts(vec![SortSpec::asc("TrackId").unwrap()]),
        )];
        let options = CompileOptions {
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let err = compiler.compile(&request, &options).unwrap_err();
        assert_eq!(err.code(), "invalid_subresource_sorts");

        let non_strict = CompileOptions {
            strict: false,
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &non_strict).unwrap();
        assert_eq!(
            compiled.skipped_paths,
            vec![SkippedPath {
                path: "tracks".to_string(),
                code: "invalid_subresource_sorts",
            }]
        );
    }

    #[test]
    fn unknown_path_fails() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![(
            "tracks.TrackId".to_string(),
            SubfilterSpec::new().with_filters(serde_json::json!({"TrackId": 5})),
        )];
        let err = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_subresource");
    }

    #[test]
    fn sublimit_over_max_clamps_when_not_strict() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![("tracks".to_string(), spec_with_pagination(0, Some(10_000)))];
        let options = CompileOptions {
            max_sublimit: Some(30),
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let err = compiler.compile(&request, &options).unwrap_err();
        assert_eq!(err.code(), "invalid_subresource_limit");

        let non_strict = CompileOptions {
            strict: false,
            max_sublimit: Some(30),
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &non_strict).unwrap();
        assert!(compiled.params.contains(&Value::Integer(30)));
    }

    #[test]
    fn root_pagination_without_nested_is_plain() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.limit = Some(10);
        request.offset = Some(5);
        let compiled = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap();
        assert!(compiled.sql.ends_with(" LIMIT 10 OFFSET 5"));
        assert!(!compiled.sql.contains("anon_1"));
    }

    #[test]
    fn root_pagination_with_nested_wraps_in_anon_1() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.limit = Some(1);
        request.offset = Some(1);
        request.subfilters = vec![("tracks".to_string(), spec_with_pagination(1, Some(1)))];
        let options = CompileOptions {
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &options).unwrap();
        assert!(compiled.sql.starts_with(
            "SELECT anon_1.\"Album_AlbumId\" AS \"anon_1_Album_AlbumId\""
        ));
        assert!(compiled
            .sql
            .contains("row_number() OVER (ORDER BY \"Album\".\"AlbumId\" ASC) AS row_number"));
        assert!(compiled
            .sql
            .contains("ON anon_1.\"Album_AlbumId\" = \"Track1\".\"AlbumId\""));
        assert!(compiled.sql.contains(
            "WHERE anon_1.row_number >= ? AND anon_1.row_number <= ? ORDER BY anon_1.row_number"
        ));
    }

    #[test]
    fn negative_root_limit_fails_strict_only() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.limit = Some(-1);
        let err = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_limit_value");

        let non_strict = CompileOptions {
            strict: false,
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &non_strict).unwrap();
        assert!(!compiled.sql.contains("LIMIT"));
    }

    #[test]
    fn pagination_bounds_must_fit_window_parameters() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        let mut ol = OffsetLimit::default();
        ol.set_offset(u64::MAX - 1);
        ol.set_limit(2);
        request.subfilters = vec![(
            "tracks".to_string(),
            SubfilterSpec::new().with_offset_limit(ol),
        )];
        let options = CompileOptions {
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let err = compiler.compile(&request, &options).unwrap_err();
        assert_eq!(err.code(), "invalid_subresource_options");

        let non_strict = CompileOptions {
            strict: false,
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &non_strict).unwrap();
        assert_eq!(
            compiled.skipped_paths,
            vec![SkippedPath {
                path: "tracks".to_string(),
                code: "invalid_subresource_options",
            }]
        );
        assert!(!compiled.sql.contains("row_number"));
    }

    #[test]
    fn root_pagination_overflow_rejected() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.offset = Some(i64::MAX);
        request.limit = Some(i64::MAX);
        let err = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_offset_value");
    }

    #[test]
    fn missing_prefetch_executor_fails() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![("tracks".to_string(), spec_with_pagination(0, Some(2)))];
        // SQLite dialect, no override, no executor.
        let err = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "prefetch_error");
    }

    #[test]
    fn prefetch_rewrites_pagination_as_identity_filter() {
        struct Fixed;
        impl Prefetch for Fixed {
            fn fetch_identities(
                &self,
                _sql: &str,
                _params: &[Value],
            ) -> Result<Vec<Vec<Value>>, String> {
                Ok(vec![vec![Value::Integer(3)], vec![Value::Integer(4)]])
            }
        }
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![("tracks".to_string(), spec_with_pagination(0, Some(2)))];
        let options = CompileOptions {
            prefetch: Some(&Fixed),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &options).unwrap();
        assert_eq!(compiled.prefetch_count, 1);
        assert!(compiled.sql.contains("\"Track1\".\"TrackId\" IN (?, ?)"));
        assert!(!compiled.sql.contains("row_number"));
        assert_eq!(compiled.params, vec![Value::Integer(3), Value::Integer(4)]);
    }

    #[test]
    fn empty_prefetch_matches_nothing() {
        struct Empty;
        impl Prefetch for Empty {
            fn fetch_identities(
                &self,
                _sql: &str,
                _params: &[Value],
            ) -> Result<Vec<Vec<Value>>, String> {
                Ok(Vec::new())
            }
        }
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![("tracks".to_string(), spec_with_pagination(0, Some(2)))];
        let options = CompileOptions {
            prefetch: Some(&Empty),
            ..CompileOptions::default()
        };
        let compiled = compiler.compile(&request, &options).unwrap();
        assert!(compiled.sql.contains("\"Track1\".\"TrackId\" IN (NULL)"));
    }

    #[test]
    fn conflicting_double_registration_fails() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.subfilters = vec![
            ("tracks".to_string(), spec_with_pagination(0, Some(2))),
            ("tracks".to_string(), spec_with_pagination(0, Some(5))),
        ];
        let options = CompileOptions {
            window_functions: Some(true),
            ..CompileOptions::default()
        };
        let err = compiler.compile(&request, &options).unwrap_err();
        assert_eq!(err.code(), "invalid_subresource_multi_embed");
    }

    #[test]
    fn embed_and_subfilter_share_a_node() {
        let compiler = QueryCompiler::new(&SCHEMA);
        let mut request = QueryRequest::new("album");
        request.embeds = vec!["tracks".to_string(), "tracks.TrackId".to_string()];
        request.subfilters = vec![(
            "tracks".to_string(),
            SubfilterSpec::new().with_filters(serde_json::json!({"TrackId": 5})),
        )];
        let compiled = compiler
            .compile(&request, &CompileOptions::default())
            .unwrap();
        assert_eq!(compiled.selections.len(), 2);
        assert_eq!(compiled.selections[1].alias, "Track1");
        assert_eq!(compiled.sql.matches("LEFT OUTER JOIN").count(), 1);
    }
}
