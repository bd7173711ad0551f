//! Static relational metadata consumed by the compiler.
//!
//! The compiler never introspects a live database. It asks a
//! [`SchemaResolver`] four things about a relationship: its direction, its
//! join column pairs, the association table for many-to-many, and whether it
//! is self-referential. Any source of those facts works; the descriptors
//! here are `'static` so a schema can be declared as plain constants.

/// Relationship direction between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    OneToMany,
    ManyToOne,
    OneToOne,
    ManyToMany,
}

impl RelationshipKind {
    /// Whether the child side is a collection. Only to-many relationships
    /// have a per-parent partition to paginate within.
    pub const fn is_to_many(self) -> bool {
        matches!(
            self,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany
        )
    }
}

/// A table: name, columns, and the identity (primary key) columns used for
/// default ordering and fallback identity filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub identity: &'static [&'static str],
}

impl TableDef {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(&name)
    }
}

/// The intermediary table of a many-to-many relationship, with its two join
/// conditions as `(association column, endpoint column)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationDef {
    pub table: &'static str,
    /// Association columns zipped against the parent entity's columns.
    pub parent_columns: &'static [(&'static str, &'static str)],
    /// Association columns zipped against the child entity's columns.
    pub child_columns: &'static [(&'static str, &'static str)],
}

/// A named relationship from one entity to another.
///
/// `local_columns` live on the owning (parent) side and `remote_columns` on
/// the target (child) side, zipped positionally to support composite keys.
/// For many-to-many both lists are empty and `association` carries the join
/// conditions instead. Self-referential relationships rely on this explicit
/// local/remote split: both sides share a table, so sides cannot be told
/// apart by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipDef {
    pub name: &'static str,
    /// Key of the target entity, resolvable through the same resolver.
    pub target: &'static str,
    pub kind: RelationshipKind,
    pub local_columns: &'static [&'static str],
    pub remote_columns: &'static [&'static str],
    pub association: Option<AssociationDef>,
    pub self_referential: bool,
}

/// Read-only schema lookup.
///
/// Shared across concurrent compiles; implementations must not mutate.
pub trait SchemaResolver {
    /// Looks up a table by entity key.
    fn table(&self, entity: &str) -> Option<&TableDef>;

    /// Looks up a relationship by owning entity key and attribute name.
    fn relationship(&self, entity: &str, name: &str) -> Option<&RelationshipDef>;
}

/// A schema declared as a static slice of entities.
pub struct StaticSchema {
    pub entities: &'static [EntityDef],
}

/// One entity: its table plus its outgoing relationships.
pub struct EntityDef {
    pub key: &'static str,
    pub table: TableDef,
    pub relationships: &'static [RelationshipDef],
}

impl SchemaResolver for StaticSchema {
    fn table(&self, entity: &str) -> Option<&TableDef> {
        self.entities
            .iter()
            .find(|e| e.key == entity)
            .map(|e| &e.table)
    }

    fn relationship(&self, entity: &str, name: &str) -> Option<&RelationshipDef> {
        self.entities
            .iter()
            .find(|e| e.key == entity)?
            .relationships
            .iter()
            .find(|r| r.name == name)
    }
}
