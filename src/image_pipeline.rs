//! File-backed cover decoding and draw-time image transforms.
//!
//! [`FileCoverDecoder`] is one [`CoverDecoder`]; the browser only needs the
//! placeholder and border helpers, and hosts may plug in their own decoder.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgba, RgbaImage};
use log::debug;
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::album::CoverImage;
use crate::cover_loader::{CoverDecoder, CoverRequest, DecodeError};

/// File stems accepted as album art, most preferred first.
const COVER_STEMS: [&str; 4] = ["cover", "folder", "front", "album"];
const COVER_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const BORDER_COLOR: Rgba<u8> = Rgba([0, 0, 0, 96]);

/// Loads cover files stored next to an album's songs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCoverDecoder {
    cover_size_px: u32,
}

impl FileCoverDecoder {
    pub fn new(cover_size_px: u32) -> Self {
        Self {
            cover_size_px: cover_size_px.max(1),
        }
    }

    pub fn target_edge_px(&self, scale_factor: f64) -> u32 {
        let scale = if scale_factor.is_finite() && scale_factor > 0.0 {
            scale_factor
        } else {
            1.0
        };
        ((f64::from(self.cover_size_px) * scale).round() as u32).max(1)
    }
}

impl CoverDecoder for FileCoverDecoder {
    fn decode_cover(
        &self,
        request: &CoverRequest,
        scale_factor: f64,
    ) -> Result<CoverImage, DecodeError> {
        let path = find_cover_file(&request.song_paths)
            .ok_or_else(|| DecodeError::NotFound(request.key.clone()))?;
        let bytes = fs::read(&path)?;
        let decoded =
            decode_cover_bytes(&bytes).ok_or_else(|| DecodeError::Decode {
                path: path.clone(),
                reason: "unsupported or corrupt image data".to_string(),
            })?;
        let (width, height) = decoded.dimensions();
        let (target_width, target_height) =
            cover_dimensions(width, height, self.target_edge_px(scale_factor));
        debug!(
            "Image pipeline: decoded cover album={} path={} size={}x{} target={}x{}",
            request.key,
            path.display(),
            width,
            height,
            target_width,
            target_height
        );
        let resized = resize_for_display(decoded, target_width, target_height);
        Ok(CoverImage::new(resized.to_rgba8()))
    }
}

fn cover_file_rank(path: &Path) -> Option<usize> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if !COVER_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
    COVER_STEMS.iter().position(|candidate| *candidate == stem)
}

/// Best cover file across the directories holding `song_paths`.
pub fn find_cover_file(song_paths: &[PathBuf]) -> Option<PathBuf> {
    let directories: BTreeSet<&Path> = song_paths.iter().filter_map(|path| path.parent()).collect();
    let mut best: Option<(usize, PathBuf)> = None;
    for directory in directories {
        let Ok(entries) = fs::read_dir(directory) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(rank) = cover_file_rank(&path) else {
                continue;
            };
            let better = match &best {
                Some((best_rank, best_path)) => (rank, &path) < (*best_rank, best_path),
                None => true,
            };
            if better && path.is_file() {
                best = Some((rank, path));
            }
        }
    }
    best.map(|(_, path)| path)
}

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xff, 0xd8];

/// Salvages JPEG files the strict decoder rejects, such as ones with trailing bytes.
fn decode_lenient_jpeg(bytes: &[u8]) -> Option<DynamicImage> {
    if !bytes.starts_with(&JPEG_SOI) {
        return None;
    }
    let mut decoder = JpegDecoder::new_with_options(
        bytes,
        DecoderOptions::new_cmd()
            .set_strict_mode(false)
            .jpeg_set_out_colorspace(ColorSpace::RGBA),
    );
    let rgba = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    RgbaImage::from_raw(u32::try_from(width).ok()?, u32::try_from(height).ok()?, rgba)
        .map(DynamicImage::ImageRgba8)
}

fn decode_cover_bytes(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_lenient_jpeg(bytes))
}

/// Scales `(width, height)` so the longer edge is at most `max_edge`, rounding the shorter one.
fn cover_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let longest = width.max(height);
    let max_edge = max_edge.max(1);
    if longest <= max_edge {
        return (width, height);
    }
    let scale = |edge: u32| {
        let scaled = (u64::from(edge) * u64::from(max_edge) + u64::from(longest) / 2)
            / u64::from(longest);
        scaled.clamp(1, u64::from(max_edge)) as u32
    };
    (scale(width), scale(height))
}

fn resize_for_display(decoded: DynamicImage, target_width: u32, target_height: u32) -> DynamicImage {
    let mut current = decoded;
    let mut current_dims = current.dimensions();
    let target_w = target_width.max(1);
    let target_h = target_height.max(1);

    // Halving first keeps large scans from aliasing at grid sizes.
    while current_dims.0 > target_w.saturating_mul(2) || current_dims.1 > target_h.saturating_mul(2)
    {
        let next_w = (current_dims.0 / 2).max(target_w);
        let next_h = (current_dims.1 / 2).max(target_h);
        current = current.resize_exact(next_w, next_h, FilterType::Triangle);
        current_dims = current.dimensions();
    }

    if current_dims == (target_w, target_h) {
        return current;
    }
    current.resize_exact(target_w, target_h, FilterType::CatmullRom)
}

/// Neutral stand-in drawn for albums without artwork.
pub fn placeholder_cover(edge_px: u32) -> CoverImage {
    let edge = edge_px.max(1);
    let center = (edge as f32 - 1.0) / 2.0;
    let outer = edge as f32 * 0.38;
    let inner = edge as f32 * 0.08;
    let pixels = RgbaImage::from_fn(edge, edge, |x, y| {
        let distance = ((x as f32 - center).powi(2) + (y as f32 - center).powi(2)).sqrt();
        if distance <= inner || distance > outer {
            Rgba([214, 214, 214, 255])
        } else {
            Rgba([168, 168, 168, 255])
        }
    });
    CoverImage::new(pixels)
}

/// Draws a one pixel frame; rounded frames clear the corners outside the arc.
///
/// Depends on the live `round_covers` setting, so results are never cached.
pub fn add_border(cover: &CoverImage, round: bool) -> CoverImage {
    let mut pixels = cover.pixels().clone();
    let (width, height) = pixels.dimensions();
    if width == 0 || height == 0 {
        return CoverImage::new(pixels);
    }
    let radius = if round {
        (width.min(height) / 8).max(1) as f32
    } else {
        0.0
    };

    for y in 0..height {
        for x in 0..width {
            let corner_distance = corner_distance(x, y, width, height, radius);
            match corner_distance {
                Some(distance) if distance > radius => pixels.put_pixel(x, y, Rgba([0, 0, 0, 0])),
                Some(distance) if distance > radius - 1.0 => pixels.put_pixel(x, y, BORDER_COLOR),
                Some(_) => {}
                None => {
                    if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                        pixels.put_pixel(x, y, BORDER_COLOR);
                    }
                }
            }
        }
    }
    CoverImage::new(pixels)
}

/// Distance from the arc center when `(x, y)` lies in a rounded corner box.
fn corner_distance(x: u32, y: u32, width: u32, height: u32, radius: f32) -> Option<f32> {
    if radius <= 0.0 {
        return None;
    }
    let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
    let cx = if px < radius {
        radius
    } else if px > width as f32 - radius {
        width as f32 - radius
    } else {
        return None;
    };
    let cy = if py < radius {
        radius
    } else if py > height as f32 - radius {
        height as f32 - radius
    } else {
        return None;
    };
    Some(((px - cx).powi(2) + (py - cy).powi(2)).sqrt())
}
