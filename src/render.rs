use std::io::Cursor;

use anyhow::{Context, Result};
use geo_types::Rect;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};

/// Encoded-image flavour for output tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileImageFormat {
    Png,
    Jpeg,
}

impl TileImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileImageFormat::Png => "png",
            TileImageFormat::Jpeg => "jpg",
        }
    }
}

/// Boundary to the host map engine: render the given geographic extent at
/// the given pixel size. Calls are strictly sequential, the backend is never
/// invoked concurrently, and a failed render is fatal to the job rather than
/// retried.
pub trait RenderBackend {
    fn render(&mut self, extent: &Rect<f64>, width: u32, height: u32) -> Result<RgbaImage>;
}

impl<F> RenderBackend for F
where
    F: FnMut(&Rect<f64>, u32, u32) -> Result<RgbaImage>,
{
    fn render(&mut self, extent: &Rect<f64>, width: u32, height: u32) -> Result<RgbaImage> {
        self(extent, width, height)
    }
}

/// Built-in backend that fills every requested raster with one RGBA colour.
/// Stands in for a real map engine when exercising the pipeline from the
/// CLI and in tests.
#[derive(Debug, Clone, Copy)]
pub struct FlatFillBackend {
    pub color: Rgba<u8>,
}

impl FlatFillBackend {
    pub fn new(color: [u8; 4]) -> Self {
        FlatFillBackend { color: Rgba(color) }
    }
}

impl RenderBackend for FlatFillBackend {
    fn render(&mut self, _extent: &Rect<f64>, width: u32, height: u32) -> Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(width, height, self.color))
    }
}

/// Parses a fill colour given as `#rrggbb` or `#rrggbbaa` (leading `#`
/// optional). Missing alpha means opaque.
pub fn parse_fill_spec(value: &str) -> Result<[u8; 4]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        anyhow::bail!("fill colour must be rrggbb or rrggbbaa hex");
    }
    let mut channels = [0u8, 0, 0, 255];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).context("invalid fill colour")?;
        channels[i] = u8::from_str_radix(pair, 16).context("invalid fill colour")?;
    }
    Ok(channels)
}

/// Encodes one tile-sized raster into the configured output format.
/// JPEG has no alpha channel, so the raster is flattened to RGB first.
pub fn encode_tile(image: &RgbaImage, format: TileImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match format {
        TileImageFormat::Png => {
            image
                .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
                .context("encode png tile")?;
        }
        TileImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut cursor = Cursor::new(&mut data);
            let encoder = JpegEncoder::new_with_quality(&mut cursor, quality);
            rgb.write_with_encoder(encoder).context("encode jpeg tile")?;
        }
    }
    Ok(data)
}
