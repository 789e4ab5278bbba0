use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zip::write::SimpleFileOptions;

use crate::tile::Tile;
use crate::writer::TileWriter;

/// Writes tiles as entries `<root_dir>/<z>/<x>/<y>.<ext>` inside a single
/// `.zip` archive. The archive stays open for the whole job and is closed
/// by `finalize`.
pub struct ZipWriter {
    archive: Option<zip::ZipWriter<File>>,
    root_dir: String,
    ext: &'static str,
    tms: bool,
}

impl ZipWriter {
    pub fn new(output: &Path, root_dir: &str, ext: &'static str, tms: bool) -> Result<Self> {
        let file = File::create(output)
            .with_context(|| format!("create zip archive: {}", output.display()))?;
        Ok(ZipWriter {
            archive: Some(zip::ZipWriter::new(file)),
            root_dir: root_dir.to_string(),
            ext,
            tms,
        })
    }
}

impl TileWriter for ZipWriter {
    fn write_tile(&mut self, tile: &Tile, data: &[u8]) -> Result<()> {
        let archive = self
            .archive
            .as_mut()
            .context("zip archive already finalized")?;
        let y = if self.tms { tile.y_tms() } else { tile.y };
        let entry = format!("{}/{}/{}/{y}.{}", self.root_dir, tile.z, tile.x, self.ext);
        archive
            .start_file(&entry, SimpleFileOptions::default())
            .with_context(|| format!("start zip entry: {entry}"))?;
        archive
            .write_all(data)
            .with_context(|| format!("write zip entry: {entry}"))?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if let Some(archive) = self.archive.take() {
            archive.finish().context("close zip archive")?;
        }
        Ok(())
    }
}
