use rusqlite::Connection;

pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;\n\
         PRAGMA cache_size = -16000;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )
}

/// Writers additionally switch the journal to WAL so readers never block.
pub fn configure_writer(conn: &Connection) -> rusqlite::Result<()> {
    configure_connection(conn)?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
}
