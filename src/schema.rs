use rusqlite::Connection;

use crate::errors::MetaGraphError;

pub fn ensure_schema(conn: &Connection) -> Result<(), MetaGraphError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS graph_vertices (
            id        INTEGER PRIMARY KEY AUTOINCREMENT
        );
        CREATE TABLE IF NOT EXISTS graph_edges (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            label     TEXT NOT NULL,
            out_id    INTEGER NOT NULL,
            in_id     INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_properties (
            owner      TEXT NOT NULL CHECK (owner IN ('v', 'e')),
            element_id INTEGER NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            PRIMARY KEY (owner, element_id, key)
        );
        CREATE INDEX IF NOT EXISTS idx_edges_out ON graph_edges(out_id, label);
        CREATE INDEX IF NOT EXISTS idx_edges_in ON graph_edges(in_id, label);
        CREATE INDEX IF NOT EXISTS idx_props_key_value ON graph_properties(key, value);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_guid
            ON graph_properties(value) WHERE owner = 'v' AND key = '__guid';
        "#,
    )
    .map_err(|e| MetaGraphError::schema(e.to_string()))?;
    Ok(())
}

/// Creates a partial unique index over one vertex property key.
///
/// Used for attributes declared unique, so that a second vertex carrying the
/// same value is rejected by the store itself.
pub fn ensure_unique_property_index(conn: &Connection, key: &str) -> Result<(), MetaGraphError> {
    let index_name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let escaped = key.replace('\'', "''");
    conn.execute_batch(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_{index_name} \
         ON graph_properties(value) WHERE owner = 'v' AND key = '{escaped}';"
    ))
    .map_err(|e| MetaGraphError::schema(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        ensure_schema(&conn).expect("first");
        ensure_schema(&conn).expect("second");
        ensure_unique_property_index(&conn, "db.name").expect("index");
        ensure_unique_property_index(&conn, "db.name").expect("index again");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
                 AND name IN ('graph_vertices', 'graph_edges', 'graph_properties')",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 3);
    }
}
