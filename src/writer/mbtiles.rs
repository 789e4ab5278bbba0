use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::tile::Tile;
use crate::writer::TileWriter;

/// Writes tiles into a single-file MBTiles database.
///
/// The MBTiles format fixes its own row convention: `tile_row` is always
/// stored bottom-left-origin, whatever the job's convention flag says.
pub struct MbtilesWriter {
    conn: Option<Connection>,
}

impl MbtilesWriter {
    pub fn new(output: &Path, root_dir: &str, ext: &'static str) -> Result<Self> {
        let conn = Connection::open(output)
            .with_context(|| format!("open mbtiles: {}", output.display()))?;
        apply_write_pragmas(&conn)?;
        setup_schema(&conn)?;
        seed_metadata(&conn, root_dir, ext)?;
        Ok(MbtilesWriter { conn: Some(conn) })
    }
}

fn apply_write_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA synchronous = OFF;")
        .context("set synchronous pragma")?;
    // These two answer with the mode they settled on; read and drop it.
    conn.query_row("PRAGMA journal_mode = MEMORY", [], |row| {
        row.get::<_, String>(0)
    })
    .context("set journal_mode pragma")?;
    conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |row| {
        row.get::<_, String>(0)
    })
    .context("set locking_mode pragma")?;
    Ok(())
}

fn setup_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT);
        CREATE UNIQUE INDEX IF NOT EXISTS metadata_index ON metadata (name);
        CREATE TABLE IF NOT EXISTS tiles (
            zoom_level INTEGER,
            tile_column INTEGER,
            tile_row INTEGER,
            tile_data BLOB
        );
        CREATE UNIQUE INDEX IF NOT EXISTS tile_index
            ON tiles (zoom_level, tile_column, tile_row);
        ",
    )
    .context("create mbtiles schema")?;
    Ok(())
}

fn seed_metadata(conn: &Connection, root_dir: &str, ext: &'static str) -> Result<()> {
    // Reopening an existing database refreshes these rows instead of
    // accumulating duplicates.
    for (name, value) in [("name", root_dir), ("type", "baselayer"), ("format", ext)] {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )
        .context("insert mbtiles metadata")?;
    }
    Ok(())
}

impl TileWriter for MbtilesWriter {
    fn write_tile(&mut self, tile: &Tile, data: &[u8]) -> Result<()> {
        let conn = self
            .conn
            .as_ref()
            .context("mbtiles connection already finalized")?;
        conn.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![tile.z, tile.x, tile.y_tms(), data],
        )
        .with_context(|| format!("insert tile {}/{}/{}", tile.z, tile.x, tile.y))?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            // Post-load compaction pass, then close.
            conn.execute_batch("ANALYZE; VACUUM;")
                .context("optimize mbtiles database")?;
            conn.close()
                .map_err(|(_, err)| err)
                .context("close mbtiles database")?;
        }
        Ok(())
    }
}
