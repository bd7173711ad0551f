//! Lowering of JSON filter trees into SQL predicates.
//!
//! A filter document is a JSON object: `{"field": value}` compares for
//! equality, `{"field": {"$op": value}}` uses one of the fixed comparison
//! operators, `{"$and": [...]}` / `{"$or": [...]}` nest boolean groups, and
//! a dotted field (or a nested document under a relationship name) becomes a
//! correlated `EXISTS` subquery against the related table.

use serde_json::Value as Json;

use crate::error::{ParseError, PlanError, PlanResult};
use crate::schema::{RelationshipDef, RelationshipKind, SchemaResolver, TableDef};
use crate::sql::{qualified, quote_ident, Sql};
use crate::value::Value;

/// Scope a filter document is lowered in: which entity it refers to and the
/// SQL alias that entity's table carries in the enclosing statement.
pub struct FilterContext<'a> {
    pub resolver: &'a dyn SchemaResolver,
    pub entity: &'a str,
    pub alias: &'a str,
    /// Field permission hook. Receives the full dotted field path; `false`
    /// rejects the filter with `filters_permission_error`.
    pub permit: Option<&'a dyn Fn(&str) -> bool>,
    pub max_nodes: usize,
    pub max_depth: usize,
}

/// Default filter complexity ceiling (total nodes in the tree).
pub const DEFAULT_MAX_FILTER_NODES: usize = 100;
/// Default filter nesting ceiling.
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 32;

/// Lowers a filter document to a predicate fragment.
///
/// An empty document (or empty `$and`/`$or` lists) lowers to an empty
/// fragment, meaning "no filter" rather than "match nothing".
pub fn lower_filters(ctx: &FilterContext<'_>, tree: &Json) -> PlanResult<Sql> {
    let mut walker = Walker {
        ctx,
        nodes: 0,
        exists_seq: 0,
    };
    walker.lower_doc(tree, ctx.entity, ctx.alias, "", 0)
}

struct Walker<'a, 'c> {
    ctx: &'c FilterContext<'a>,
    nodes: usize,
    exists_seq: usize,
}

impl<'a, 'c> Walker<'a, 'c> {
    fn bump(&mut self, depth: usize) -> PlanResult<()> {
        self.nodes += 1;
        if self.nodes > self.ctx.max_nodes || depth > self.ctx.max_depth {
            return Err(PlanError::FiltersTooComplex {
                nodes: self.nodes,
                depth,
            });
        }
        Ok(())
    }

    fn table(&self, entity: &str) -> PlanResult<&'a TableDef> {
        self.ctx
            .resolver
            .table(entity)
            .ok_or_else(|| PlanError::FiltersFieldError {
                field: entity.to_string(),
            })
    }

    fn lower_doc(
        &mut self,
        doc: &Json,
        entity: &str,
        alias: &str,
        scope: &str,
        depth: usize,
    ) -> PlanResult<Sql> {
        let obj = match doc {
            Json::Object(obj) => obj,
            Json::Null => return Ok(Sql::empty()),
            _ => return Err(PlanError::Parse(ParseError::InvalidComplexFilters)),
        };
        let mut conjuncts = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            self.bump(depth)?;
            let lowered = match key.as_str() {
                "$and" => self.lower_group(value, entity, alias, scope, depth, " AND ")?,
                "$or" => self.lower_group(value, entity, alias, scope, depth, " OR ")?,
                _ => self.lower_field(key, value, entity, alias, scope, depth)?,
            };
            if !lowered.is_empty() {
                conjuncts.push(lowered);
            }
        }
        Ok(Sql::join(conjuncts, " AND "))
    }

    fn lower_group(
        &mut self,
        value: &Json,
        entity: &str,
        alias: &str,
        scope: &str,
        depth: usize,
        separator: &str,
    ) -> PlanResult<Sql> {
        let items = match value {
            Json::Array(items) => items,
            _ => return Err(PlanError::Parse(ParseError::InvalidComplexFilters)),
        };
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            self.bump(depth + 1)?;
            let lowered = self.lower_doc(item, entity, alias, scope, depth + 1)?;
            if !lowered.is_empty() {
                parts.push(lowered);
            }
        }
        Ok(match parts.len() {
            0 => Sql::empty(),
            1 => parts.into_iter().next().unwrap_or_default(),
            _ => Sql::join(parts, separator).subquery(),
        })
    }

    fn lower_field(
        &mut self,
        field: &str,
        value: &Json,
        entity: &str,
        alias: &str,
        scope: &str,
        depth: usize,
    ) -> PlanResult<Sql> {
        let full_path = join_scope(scope, field);
        if let Some(permit) = self.ctx.permit {
            if !permit(&full_path) {
                return Err(PlanError::FiltersPermissionError { field: full_path });
            }
        }

        let mut segments = field.split('.');
        let first = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();
        let table = self.table(entity)?;

        if table.has_column(first) {
            if !rest.is_empty() {
                return Err(PlanError::FiltersFieldError { field: full_path });
            }
            return self.lower_comparison(first, value, alias, &full_path, depth);
        }

        if let Some(rel) = self.ctx.resolver.relationship(entity, first) {
            let inner_doc = if rest.is_empty() {
                match value {
                    Json::Object(_) => value.clone(),
                    _ => return Err(PlanError::FiltersFieldError { field: full_path }),
                }
            } else {
                // Re-nest the remaining dotted path as a single-field doc
                // inside the relationship scope.
                serde_json::json!({ rest.join("."): value })
            };
            let child_scope = join_scope(scope, first);
            return self.lower_exists(rel, &inner_doc, alias, &child_scope, depth + 1);
        }

        Err(PlanError::FiltersFieldError { field: full_path })
    }

    /// Builds `EXISTS (SELECT 1 FROM child WHERE <correlate> AND <inner>)`.
    fn lower_exists(
        &mut self,
        rel: &RelationshipDef,
        inner_doc: &Json,
        parent_alias: &str,
        scope: &str,
        depth: usize,
    ) -> PlanResult<Sql> {
        let child_table = self.table(rel.target)?;
        self.exists_seq += 1;
        let child_alias = format!("{}_f{}", child_table.name, self.exists_seq);

        let mut body = Sql::raw("SELECT 1 FROM ");
        let mut correlate = Vec::new();
        match (rel.kind, rel.association.as_ref()) {
            (RelationshipKind::ManyToMany, Some(assoc)) => {
                let assoc_alias = format!("{}_f{}", assoc.table, self.exists_seq);
                body = body
                    .append_raw(quote_ident(assoc.table))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(&assoc_alias))
                    .append_raw(" JOIN ")
                    .append_raw(quote_ident(child_table.name))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(&child_alias))
                    .append_raw(" ON ");
                let on = assoc.child_columns.iter().map(|(assoc_col, child_col)| {
                    Sql::raw(qualified(&assoc_alias, assoc_col))
                        .append_raw(" = ")
                        .append_raw(qualified(&child_alias, child_col))
                });
                body = body.append(Sql::join(on, " AND "));
                for (assoc_col, parent_col) in assoc.parent_columns {
                    correlate.push(
                        Sql::raw(qualified(&assoc_alias, assoc_col))
                            .append_raw(" = ")
                            .append_raw(qualified(parent_alias, parent_col)),
                    );
                }
            }
            _ => {
                body = body
                    .append_raw(quote_ident(child_table.name))
                    .append_raw(" AS ")
                    .append_raw(quote_ident(&child_alias));
                for (local, remote) in rel.local_columns.iter().zip(rel.remote_columns) {
                    correlate.push(
                        Sql::raw(qualified(&child_alias, remote))
                            .append_raw(" = ")
                            .append_raw(qualified(parent_alias, local)),
                    );
                }
            }
        }

        let inner = self.lower_doc(inner_doc, rel.target, &child_alias, scope, depth)?;
        if !inner.is_empty() {
            correlate.push(inner);
        }
        body = body
            .append_raw(" WHERE ")
            .append(Sql::join(correlate, " AND "));
        Ok(Sql::raw("EXISTS ").append(body.subquery()))
    }

    fn lower_comparison(
        &mut self,
        column: &str,
        value: &Json,
        alias: &str,
        full_path: &str,
        depth: usize,
    ) -> PlanResult<Sql> {
        match value {
            Json::Object(ops) => {
                let mut parts = Vec::with_capacity(ops.len());
                for (op, operand) in ops {
                    self.bump(depth + 1)?;
                    parts.push(self.lower_op(column, op, operand, alias, full_path)?);
                }
                Ok(Sql::join(parts, " AND "))
            }
            Json::Array(_) => Err(PlanError::FiltersFieldOpError {
                field: full_path.to_string(),
                op: "$eq".to_string(),
            }),
            _ => self.lower_op(column, "$eq", value, alias, full_path),
        }
    }

    fn lower_op(
        &mut self,
        column: &str,
        op: &str,
        operand: &Json,
        alias: &str,
        full_path: &str,
    ) -> PlanResult<Sql> {
        let lhs = Sql::raw(qualified(alias, column));
        let op_error = || PlanError::FiltersFieldOpError {
            field: full_path.to_string(),
            op: op.to_string(),
        };
        let scalar = |operand: &Json| Value::from_json(operand).ok_or_else(op_error);
        match op {
            "$eq" => match operand {
                Json::Null => Ok(lhs.append_raw(" IS NULL")),
                _ => Ok(lhs.append_raw(" = ").append(Sql::parameter(scalar(operand)?))),
            },
            "$ne" => match operand {
                Json::Null => Ok(lhs.append_raw(" IS NOT NULL")),
                _ => Ok(lhs
                    .append_raw(" <> ")
                    .append(Sql::parameter(scalar(operand)?))),
            },
            "$gt" => Ok(lhs.append_raw(" > ").append(Sql::parameter(scalar(operand)?))),
            "$gte" => Ok(lhs
                .append_raw(" >= ")
                .append(Sql::parameter(scalar(operand)?))),
            "$lt" => Ok(lhs.append_raw(" < ").append(Sql::parameter(scalar(operand)?))),
            "$lte" => Ok(lhs
                .append_raw(" <= ")
                .append(Sql::parameter(scalar(operand)?))),
            "$like" => Ok(lhs
                .append_raw(" LIKE ")
                .append(Sql::parameter(scalar(operand)?))),
            "$in" | "$nin" => {
                let items = operand.as_array().ok_or_else(op_error)?;
                let keyword = if op == "$in" { " IN (" } else { " NOT IN (" };
                if items.is_empty() {
                    // Matches the classic empty-set rendering; NULL makes the
                    // membership test unknown, excluding every row.
                    return Ok(lhs.append_raw(keyword).append_raw("NULL)"));
                }
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(scalar(item)?);
                }
                Ok(lhs
                    .append_raw(keyword)
                    .append(Sql::parameters(values))
                    .append_raw(")"))
            }
            _ => Err(op_error()),
        }
    }
}

fn join_scope(scope: &str, field: &str) -> String {
    if scope.is_empty() {
        field.to_string()
    } else {
        format!("{scope}.{field}")
    }
}
