//! Shared fixture: a small music-catalog schema with every relationship
//! shape the compiler handles (one-to-many, many-to-one, many-to-many
//! through an association table, a self-referential hierarchy, and a
//! composite-key tree), plus a seeded SQLite database mirroring it.

use eagerload::plan::Prefetch;
use eagerload::schema::{
    AssociationDef, EntityDef, RelationshipDef, RelationshipKind, StaticSchema, TableDef,
};
use eagerload::value::Value;

pub static SCHEMA: StaticSchema = StaticSchema {
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
            relationships: &[RelationshipDef {
                name: "albums",
                target: "album",
                kind: RelationshipKind::OneToMany,
                local_columns: &["ArtistId"],
                remote_columns: &["ArtistId"],
                association: None,
                self_referential: false,
            }],
        },
        EntityDef {
            key: "track",
            table: TableDef {
                name: "Track",
                columns: &["TrackId", "Name", "AlbumId"],
                identity: &["TrackId"],
            },
            relationships: &[
                RelationshipDef {
                    name: "album",
                    target: "album",
                    kind: RelationshipKind::ManyToOne,
                    local_columns: &["AlbumId"],
                    remote_columns: &["AlbumId"],
                    association: None,
                    self_referential: false,
                },
                RelationshipDef {
                    name: "playlists",
                    target: "playlist",
                    kind: RelationshipKind::ManyToMany,
                    local_columns: &[],
                    remote_columns: &[],
                    association: Some(AssociationDef {
                        table: "PlaylistTrack",
                        parent_columns: &[("TrackId", "TrackId")],
                        child_columns: &[("PlaylistId", "PlaylistId")],
                    }),
                    self_referential: false,
                },
            ],
        },
        EntityDef {
            key: "playlist",
            table: TableDef {
                name: "Playlist",
                columns: &["PlaylistId", "Name"],
                identity: &["PlaylistId"],
            },
            relationships: &[RelationshipDef {
                name: "tracks",
                target: "track",
                kind: RelationshipKind::ManyToMany,
                local_columns: &[],
                remote_columns: &[],
                association: Some(AssociationDef {
                    table: "PlaylistTrack",
                    parent_columns: &[("PlaylistId", "PlaylistId")],
                    child_columns: &[("TrackId", "TrackId")],
                }),
                self_referential: false,
            }],
        },
        EntityDef {
            key: "node",
            table: TableDef {
                name: "Node",
                columns: &[
                    "NodeId",
                    "CompositeId",
                    "Name",
                    "ParentNodeId",
                    "ParentCompositeId",
                ],
                identity: &["NodeId", "CompositeId"],
            },
            relationships: &[
                RelationshipDef {
                    name: "children",
                    target: "node",
                    kind: RelationshipKind::OneToMany,
                    local_columns: &["NodeId", "CompositeId"],
                    remote_columns: &["ParentNodeId", "ParentCompositeId"],
                    association: None,
                    self_referential: true,
                },
                RelationshipDef {
                    name: "parent",
                    target: "node",
                    kind: RelationshipKind::ManyToOne,
                    local_columns: &["ParentNodeId", "ParentCompositeId"],
                    remote_columns: &["NodeId", "CompositeId"],
                    association: None,
                    self_referential: true,
                },
            ],
        },
        EntityDef {
            key: "employee",
            table: TableDef {
                name: "Employee",
                columns: &["EmployeeId", "LastName", "ReportsTo"],
                identity: &["EmployeeId"],
            },
            relationships: &[
                RelationshipDef {
                    name: "subordinates",
                    target: "employee",
                    kind: RelationshipKind::OneToMany,
                    local_columns: &["EmployeeId"],
                    remote_columns: &["ReportsTo"],
                    association: None,
                    self_referential: true,
                },
                RelationshipDef {
                    name: "manager",
                    target: "employee",
                    kind: RelationshipKind::ManyToOne,
                    local_columns: &["ReportsTo"],
                    remote_columns: &["EmployeeId"],
                    association: None,
                    self_referential: true,
                },
            ],
        },
    ],
};

/// Opens an in-memory database seeded with a deterministic catalog:
/// three artists, four albums (the last one empty), nine tracks, two
/// playlists, a three-level employee hierarchy, and a two-root
/// composite-key node tree.
#[allow(dead_code)]
pub fn setup_db() -> rusqlite::Connection {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE "Artist" ("ArtistId" INTEGER PRIMARY KEY, "Name" TEXT);
        CREATE TABLE "Album" (
            "AlbumId" INTEGER PRIMARY KEY,
            "Title" TEXT,
            "ArtistId" INTEGER REFERENCES "Artist"("ArtistId")
        );
        CREATE TABLE "Track" (
            "TrackId" INTEGER PRIMARY KEY,
            "Name" TEXT,
            "AlbumId" INTEGER REFERENCES "Album"("AlbumId")
        );
        CREATE TABLE "Playlist" ("PlaylistId" INTEGER PRIMARY KEY, "Name" TEXT);
        CREATE TABLE "PlaylistTrack" (
            "PlaylistId" INTEGER REFERENCES "Playlist"("PlaylistId"),
            "TrackId" INTEGER REFERENCES "Track"("TrackId"),
            PRIMARY KEY ("PlaylistId", "TrackId")
        );
        CREATE TABLE "Node" (
            "NodeId" INTEGER NOT NULL,
            "CompositeId" INTEGER NOT NULL,
            "Name" TEXT,
            "ParentNodeId" INTEGER,
            "ParentCompositeId" INTEGER,
            PRIMARY KEY ("NodeId", "CompositeId")
        );
        CREATE TABLE "Employee" (
            "EmployeeId" INTEGER PRIMARY KEY,
            "LastName" TEXT,
            "ReportsTo" INTEGER REFERENCES "Employee"("EmployeeId")
        );

        INSERT INTO "Artist" VALUES (1, 'AC/DC'), (2, 'Accept'), (3, 'Aerosmith');
        INSERT INTO "Album" VALUES
            (1, 'For Those About To Rock', 1),
            (2, 'Balls to the Wall', 2),
            (3, 'Restless and Wild', 2),
            (4, 'Unreleased', 3);
        INSERT INTO "Track" VALUES
            (1, 'For Those About To Rock (We Salute You)', 1),
            (2, 'Put The Finger On You', 1),
            (3, 'Let''s Get It Up', 1),
            (4, 'Inject The Venom', 1),
            (5, 'Snowballed', 1),
            (6, 'Balls to the Wall', 2),
            (7, 'Fast As a Shark', 3),
            (8, 'Restless and Wild', 3),
            (9, 'Princess of the Dawn', 3);
        INSERT INTO "Playlist" VALUES (1, 'Music'), (2, 'Favorites');
        INSERT INTO "PlaylistTrack" VALUES
            (1, 1), (1, 2), (1, 3), (1, 6), (1, 7),
            (2, 1), (2, 6), (2, 8), (2, 9);
        INSERT INTO "Node" VALUES
            (1, 1, 'root a', NULL, NULL),
            (1, 2, 'root b', NULL, NULL),
            (6, 1, 'branch', 1, 1),
            (7, 1, 'branch', 1, 1),
            (8, 1, 'branch', 1, 1),
            (6, 2, 'branch', 1, 2),
            (9, 1, 'branch', 1, 2);
        INSERT INTO "Employee" VALUES
            (1, 'Adams', NULL),
            (2, 'Edwards', 1),
            (3, 'Peacock', 2),
            (4, 'Park', 2),
            (5, 'Johnson', 2);
        "#,
    )
    .unwrap();
    conn
}

#[allow(dead_code)]
pub fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
    }
}

#[allow(dead_code)]
pub fn from_sql_value(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::Integer(i),
        rusqlite::types::Value::Real(f) => Value::Real(f),
        rusqlite::types::Value::Text(s) => Value::Text(s),
        rusqlite::types::Value::Blob(_) => Value::Null,
    }
}

/// Prefetch executor backed by a live connection.
#[allow(dead_code)]
pub struct SqlitePrefetch<'a>(pub &'a rusqlite::Connection);

impl Prefetch for SqlitePrefetch<'_> {
    fn fetch_identities(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>, String> {
        let mut stmt = self.0.prepare(sql).map_err(|e| e.to_string())?;
        let column_count = stmt.column_count();
        let bound: Vec<rusqlite::types::Value> = params.iter().map(to_sql_value).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound))
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| e.to_string())? {
            let mut identity = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: rusqlite::types::Value = row.get(i).map_err(|e| e.to_string())?;
                identity.push(from_sql_value(value));
            }
            out.push(identity);
        }
        Ok(out)
    }
}
