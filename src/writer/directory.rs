use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::tile::Tile;
use crate::writer::TileWriter;

/// Writes tiles as `<output>/<root_dir>/<z>/<x>/<y>.<ext>`, creating
/// intermediate directories on demand.
pub struct DirectoryWriter {
    root: PathBuf,
    ext: &'static str,
    tms: bool,
}

impl DirectoryWriter {
    pub fn new(output: &Path, root_dir: &str, ext: &'static str, tms: bool) -> Result<Self> {
        let root = output.join(root_dir);
        fs::create_dir_all(&root)
            .with_context(|| format!("create tile directory: {}", root.display()))?;
        Ok(DirectoryWriter { root, ext, tms })
    }
}

impl TileWriter for DirectoryWriter {
    fn write_tile(&mut self, tile: &Tile, data: &[u8]) -> Result<()> {
        let y = if self.tms { tile.y_tms() } else { tile.y };
        let dir = self.root.join(tile.z.to_string()).join(tile.x.to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("create tile directory: {}", dir.display()))?;
        let path = dir.join(format!("{y}.{}", self.ext));
        fs::write(&path, data).with_context(|| format!("write tile: {}", path.display()))?;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
