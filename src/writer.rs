use std::path::Path;

use anyhow::Result;

use crate::render::TileImageFormat;
use crate::tile::Tile;

mod directory;
mod mbtiles;
mod zip;

pub use self::directory::DirectoryWriter;
pub use self::mbtiles::MbtilesWriter;
pub use self::zip::ZipWriter;

/// Persistence backend for encoded tiles.
///
/// `finalize` must be called exactly once at job end, on every exit path
/// (completion, interruption or failure); the job guarantees the single
/// call.
pub trait TileWriter {
    fn write_tile(&mut self, tile: &Tile, data: &[u8]) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
}

/// The closed set of output backends, picked from the destination path's
/// trailing form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Directory,
    Zip,
    Mbtiles,
}

impl OutputKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "zip" => OutputKind::Zip,
            "mbtiles" => OutputKind::Mbtiles,
            _ => OutputKind::Directory,
        }
    }
}

/// Opens the writer matching the destination path.
pub fn open_writer(
    output: &Path,
    root_dir: &str,
    format: TileImageFormat,
    tms: bool,
) -> Result<Box<dyn TileWriter + Send>> {
    let ext = format.extension();
    Ok(match OutputKind::from_path(output) {
        OutputKind::Directory => Box::new(DirectoryWriter::new(output, root_dir, ext, tms)?),
        OutputKind::Zip => Box::new(ZipWriter::new(output, root_dir, ext, tms)?),
        OutputKind::Mbtiles => Box::new(MbtilesWriter::new(output, root_dir, ext)?),
    })
}
