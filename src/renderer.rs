use std::path::{Path, PathBuf};
use std::sync::Arc;

use fontdue::{Font, FontSettings};
use image::{ImageBuffer, Rgb, RgbImage};
use tracing::{debug, warn};

use crate::config::ReelConfig;
use crate::error::{Error, Result, ResultExt, require_exists};

/// Coverage mask produced by rasterizing a block of text.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32) -> Self {
        AlphaMask {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Turns text into a centred, word-wrapped coverage mask.
pub trait TextRasterizer: Send + Sync {
    fn rasterize(&self, text: &str, size: f32, max_width: u32) -> Result<AlphaMask>;
}

pub struct FontRasterizer {
    font: Font,
}

impl FontRasterizer {
    pub fn load(path: &Path) -> Result<Self> {
        require_exists(path)?;
        let font_data = std::fs::read(path)?;
        let font = Font::from_bytes(font_data.as_slice(), FontSettings::default())
            .composition(&format!("failed to load font '{}'", path.display()))?;
        Ok(FontRasterizer { font })
    }

    /// Loads the configured font, or the first fallback that parses.
    pub fn from_config(config: &ReelConfig) -> Result<Self> {
        if let Some(path) = &config.font_path {
            debug!("Loading custom font: {}", path.display());
            return Self::load(path);
        }
        for candidate in &config.font_fallbacks {
            if let Ok(rasterizer) = Self::load(candidate) {
                debug!("Using system font: {}", candidate.display());
                return Ok(rasterizer);
            }
        }
        Err(Error::Composition("no usable font found".to_string()))
    }

    fn text_width(&self, text: &str, size: f32) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, size).advance_width)
            .sum()
    }

    fn wrap(&self, text: &str, size: f32, max_width: u32) -> Vec<String> {
        let space = self.text_width(" ", size);
        let mut lines = Vec::new();
        for paragraph in text.lines() {
            let mut line = String::new();
            let mut line_width = 0.0;
            for word in paragraph.split_whitespace() {
                let word_width = self.text_width(word, size);
                if !line.is_empty() && line_width + space + word_width > max_width as f32 {
                    lines.push(std::mem::take(&mut line));
                    line_width = 0.0;
                }
                if !line.is_empty() {
                    line.push(' ');
                    line_width += space;
                }
                line.push_str(word);
                line_width += word_width;
            }
            lines.push(line);
        }
        lines
    }
}

impl TextRasterizer for FontRasterizer {
    fn rasterize(&self, text: &str, size: f32, max_width: u32) -> Result<AlphaMask> {
        if let Some(ch) = text
            .chars()
            .find(|ch| !ch.is_whitespace() && self.font.lookup_glyph_index(*ch) == 0)
        {
            return Err(Error::Composition(format!(
                "font has no glyph for {ch:?}"
            )));
        }

        let lines = self.wrap(text, size, max_width);
        let (ascent, line_height) = match self.font.horizontal_line_metrics(size) {
            Some(m) => (m.ascent, m.new_line_size),
            None => (size * 0.8, size * 1.2),
        };
        let widths: Vec<f32> = lines.iter().map(|l| self.text_width(l, size)).collect();
        let mask_width = widths.iter().cloned().fold(0.0, f32::max).ceil() as u32;
        let mask_height = (lines.len() as f32 * line_height).ceil() as u32;
        let mut mask = AlphaMask::new(mask_width.max(1), mask_height.max(1));

        for (index, line) in lines.iter().enumerate() {
            let baseline = index as f32 * line_height + ascent;
            let mut pen_x = (mask_width as f32 - widths[index]) / 2.0;
            for ch in line.chars() {
                let (metrics, bitmap) = self.font.rasterize(ch, size);
                let left = (pen_x + metrics.xmin as f32).round() as i32;
                let top = (baseline - metrics.height as f32 - metrics.ymin as f32).round() as i32;
                for (i, &alpha) in bitmap.iter().enumerate() {
                    if alpha == 0 {
                        continue;
                    }
                    let x = left + (i % metrics.width) as i32;
                    let y = top + (i / metrics.width) as i32;
                    if x < 0 || y < 0 || x >= mask.width as i32 || y >= mask.height as i32 {
                        continue;
                    }
                    let slot = &mut mask.data[(y as u32 * mask.width + x as u32) as usize];
                    *slot = (*slot).max(alpha);
                }
                pen_x += metrics.advance_width;
            }
        }

        Ok(mask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Block starts `y` pixels from the top edge.
    Top(u32),
    Center,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayer {
    pub text: String,
    pub size: f32,
    pub color: [u8; 3],
    /// Opacity of the black box drawn behind the text, if any.
    pub backing: Option<f32>,
    pub box_width: u32,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Image(PathBuf),
    Text(TextLayer),
}

impl Layer {
    fn describe(&self) -> String {
        match self {
            Layer::Image(path) => format!("image {}", path.display()),
            Layer::Text(text) => format!("text {:?}", text.text),
        }
    }
}

/// A composed frame and the layers that had to be dropped while building it.
pub struct ComposedFrame {
    pub frame: RgbImage,
    pub skipped: Vec<String>,
}

const BACKING_PADDING: u32 = 12;

pub struct Compositor {
    width: u32,
    height: u32,
    background: [u8; 3],
    rasterizer: Option<Arc<dyn TextRasterizer>>,
}

impl Compositor {
    pub fn new(
        width: u32,
        height: u32,
        background: [u8; 3],
        rasterizer: Option<Arc<dyn TextRasterizer>>,
    ) -> Self {
        Compositor {
            width,
            height,
            background,
            rasterizer,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Paints `layers` in order over the background. A failing layer is
    /// logged and left out; the rest of the frame is still produced.
    pub fn compose(&self, layers: &[Layer]) -> ComposedFrame {
        let mut frame = ImageBuffer::from_pixel(self.width, self.height, Rgb(self.background));
        let mut skipped = Vec::new();

        for layer in layers {
            let applied = match layer {
                Layer::Image(path) => self.draw_image(&mut frame, path),
                Layer::Text(text) => self.draw_text(&mut frame, text),
            };
            if let Err(e) = applied {
                warn!("Dropping {} from frame: {}", layer.describe(), e);
                skipped.push(layer.describe());
            }
        }

        ComposedFrame { frame, skipped }
    }

    /// Scales to frame width, keeps aspect ratio, centres vertically.
    fn draw_image(&self, frame: &mut RgbImage, path: &Path) -> Result<()> {
        require_exists(path)?;
        let still = image::open(path)
            .composition(&format!("failed to load image '{}'", path.display()))?;
        if still.width() == 0 || still.height() == 0 {
            return Err(Error::Composition(format!("empty image '{}'", path.display())));
        }
        let scaled_height =
            ((still.height() as f64 * self.width as f64 / still.width() as f64).round() as u32).max(1);
        let scaled = still
            .resize_exact(
                self.width,
                scaled_height,
                image::imageops::FilterType::Lanczos3,
            )
            .to_rgb8();
        let y = (self.height as i64 - scaled_height as i64) / 2;
        image::imageops::overlay(frame, &scaled, 0, y);
        Ok(())
    }

    fn draw_text(&self, frame: &mut RgbImage, layer: &TextLayer) -> Result<()> {
        let rasterizer = self
            .rasterizer
            .as_ref()
            .ok_or_else(|| Error::Composition("no font available".to_string()))?;
        let box_width = layer.box_width.min(self.width);
        let mask = rasterizer.rasterize(&layer.text, layer.size, box_width)?;

        let block_height = mask.height + 2 * BACKING_PADDING;
        let top = match layer.placement {
            Placement::Top(y) => y.min(self.height.saturating_sub(block_height)),
            Placement::Center => self.height.saturating_sub(block_height) / 2,
        };

        if let Some(opacity) = layer.backing {
            let left = (self.width - box_width) / 2;
            darken(frame, left, top, box_width, block_height, opacity);
        }

        let left = self.width.saturating_sub(mask.width) as i64 / 2;
        let text_top = (top + BACKING_PADDING) as i64;
        for my in 0..mask.height {
            for mx in 0..mask.width {
                let alpha = mask.get(mx, my);
                if alpha == 0 {
                    continue;
                }
                let (x, y) = (left + mx as i64, text_top + my as i64);
                if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
                    continue;
                }
                let pixel = frame.get_pixel_mut(x as u32, y as u32);
                let alpha_f = alpha as f32 / 255.0;
                for (i, &channel) in layer.color.iter().enumerate() {
                    pixel.0[i] =
                        ((1.0 - alpha_f) * pixel.0[i] as f32 + alpha_f * channel as f32) as u8;
                }
            }
        }
        Ok(())
    }
}

/// Blends a black box of the given opacity over a region of the frame.
fn darken(frame: &mut RgbImage, left: u32, top: u32, width: u32, height: u32, opacity: f32) {
    let keep = 1.0 - opacity.clamp(0.0, 1.0);
    let right = (left + width).min(frame.width());
    let bottom = (top + height).min(frame.height());
    for y in top..bottom {
        for x in left..right {
            let pixel = frame.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * keep) as u8;
            }
        }
    }
}

pub fn parse_hex_color(hex: &str) -> Result<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(Error::Composition(format!("Invalid hex color: {hex}")));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).composition("Invalid hex color")
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;

    /// Paints a solid block per character; refuses text containing `poison`.
    pub struct BlockRasterizer {
        pub poison: Option<&'static str>,
    }

    impl TextRasterizer for BlockRasterizer {
        fn rasterize(&self, text: &str, size: f32, max_width: u32) -> Result<AlphaMask> {
            if let Some(poison) = self.poison {
                if text.contains(poison) {
                    return Err(Error::Composition(format!("no glyph in {text:?}")));
                }
            }
            let width = ((text.chars().count() as f32 * size * 0.5) as u32).clamp(1, max_width);
            let mut mask = AlphaMask::new(width, size as u32);
            mask.data.fill(255);
            Ok(mask)
        }
    }
}
