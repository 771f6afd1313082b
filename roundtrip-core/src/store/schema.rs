/// Current schema version of the embedded reference store.
pub const SCHEMA_VERSION: &str = "1";

/// SQL schema for the `SQLite` reference store.
///
/// Entities and relationships are keyed by namespace so several runs can share
/// one database file. Vector indexes are database-wide, as in Neo4j.
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS harness_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    namespace TEXT NOT NULL,
    id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    description TEXT NOT NULL,
    embedding TEXT,               -- JSON array of floats
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    PRIMARY KEY (namespace, id)
);
CREATE INDEX IF NOT EXISTS idx_entities_kind ON entities(namespace, kind);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    source TEXT NOT NULL,
    kind TEXT NOT NULL,
    target TEXT NOT NULL,
    FOREIGN KEY (namespace, source) REFERENCES entities(namespace, id) ON DELETE CASCADE,
    FOREIGN KEY (namespace, target) REFERENCES entities(namespace, id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(namespace, source, kind);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(namespace, target, kind);

CREATE TABLE IF NOT EXISTS vector_indexes (
    name TEXT PRIMARY KEY,
    label TEXT NOT NULL,
    property TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    similarity TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn schema_executes_on_in_memory_sqlite() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        // idempotent
        conn.execute_batch(SCHEMA_SQL).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in ["harness_meta", "entities", "relationships", "vector_indexes"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn deleting_an_entity_cascades_to_its_edges() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        conn.execute_batch(
            "INSERT INTO entities (namespace, id, name, kind, description, created_at)
                 VALUES ('ns', 'a', 'A', 'Topic', 'a', 'now'), ('ns', 'b', 'B', 'Topic', 'b', 'now');
             INSERT INTO relationships (namespace, source, kind, target) VALUES ('ns', 'a', 'CITES', 'b');
             DELETE FROM entities WHERE id = 'b';",
        )
        .unwrap();
        let edges: i64 = conn
            .query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))
            .unwrap();
        assert_eq!(edges, 0);
    }
}
