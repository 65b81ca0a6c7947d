use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};
use webp::{Encoder, WebPConfig};

use crate::config::CompressionConfig;
use crate::error::AssetError;

/// Output of [`compress_image`].
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Quality of the accepted encode.
    pub quality: u8,
    pub attempts: u32,
    pub has_alpha: bool,
}

/// Decoded pixels after colour normalization: RGB unless some pixel is actually translucent.
enum Canvas {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl Canvas {
    fn normalize(img: DynamicImage) -> Self {
        if !img.color().has_alpha() {
            return Canvas::Rgb(img.into_rgb8());
        }
        let rgba = img.into_rgba8();
        if rgba.pixels().any(|p| p.0[3] < u8::MAX) {
            Canvas::Rgba(rgba)
        } else {
            Canvas::Rgb(DynamicImage::ImageRgba8(rgba).into_rgb8())
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        match self {
            Canvas::Rgb(buf) => buf.dimensions(),
            Canvas::Rgba(buf) => buf.dimensions(),
        }
    }

    fn has_alpha(&self) -> bool {
        matches!(self, Canvas::Rgba(_))
    }

    fn fit_within(self, max: (u32, u32)) -> Self {
        let (w, h) = self.dimensions();
        if w <= max.0 && h <= max.1 {
            return self;
        }
        let (nw, nh) = fit_dimensions((w, h), max);
        match self {
            Canvas::Rgb(buf) => Canvas::Rgb(imageops::resize(&buf, nw, nh, FilterType::Lanczos3)),
            Canvas::Rgba(buf) => Canvas::Rgba(imageops::resize(&buf, nw, nh, FilterType::Lanczos3)),
        }
    }

    fn encode(&self, quality: u8, method: u8) -> Result<Vec<u8>, AssetError> {
        let (w, h) = self.dimensions();
        let mut config = WebPConfig::new()
            .map_err(|_| AssetError::Encode("could not initialise encoder config".into()))?;
        config.lossless = 0;
        config.quality = f32::from(quality);
        config.method = i32::from(method);
        let encoder = match self {
            Canvas::Rgb(buf) => Encoder::from_rgb(buf.as_raw(), w, h),
            Canvas::Rgba(buf) => {
                // keep RGB under transparent pixels and the alpha plane itself lossless
                config.exact = 1;
                config.alpha_quality = 100;
                Encoder::from_rgba(buf.as_raw(), w, h)
            }
        };
        let out = encoder
            .encode_advanced(&config)
            .map_err(|e| AssetError::Encode(format!("{e:?}")))?;
        Ok(out.to_vec())
    }
}

/// Largest size with the same aspect ratio that fits inside `max`. Never below 1x1.
pub fn fit_dimensions((w, h): (u32, u32), (max_w, max_h): (u32, u32)) -> (u32, u32) {
    if w <= max_w && h <= max_h {
        return (w, h);
    }
    let scale = (f64::from(max_w) / f64::from(w)).min(f64::from(max_h) / f64::from(h));
    let nw = ((f64::from(w) * scale).round() as u32).clamp(1, max_w);
    let nh = ((f64::from(h) * scale).round() as u32).clamp(1, max_h);
    (nw, nh)
}

/// Decode `raw`, normalize colour, shrink into the envelope and re-encode as lossy WebP,
/// lowering quality step by step until the result fits `max_bytes` or the floor is hit.
///
/// CPU-bound; async callers should run it on the blocking pool.
pub fn compress_image(raw: &[u8], cfg: &CompressionConfig) -> Result<CompressedImage, AssetError> {
    let img = image::load_from_memory(raw)?;
    let canvas = Canvas::normalize(img).fit_within(cfg.max_dimensions);
    let (width, height) = canvas.dimensions();

    let mut quality = cfg.quality_initial;
    let mut attempts = 0;
    loop {
        attempts += 1;
        let data = canvas.encode(quality, cfg.method)?;
        let next = quality
            .checked_sub(cfg.quality_step)
            .filter(|q| *q >= cfg.quality_floor && cfg.quality_step > 0);
        match next {
            Some(q) if data.len() > cfg.max_bytes => quality = q,
            _ => {
                return Ok(CompressedImage {
                    data,
                    width,
                    height,
                    quality,
                    attempts,
                    has_alpha: canvas.has_alpha(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb, Rgba};
    use std::io::Cursor;

    fn png(img: DynamicImage) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 128])
        }))
    }

    fn noise(w: u32, h: u32) -> DynamicImage {
        let mut state: u32 = 0x2545_f491;
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(w, h, |_, _| {
            let mut px = [0u8; 3];
            for c in &mut px {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                *c = (state >> 24) as u8;
            }
            Rgb(px)
        }))
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        assert_eq!(fit_dimensions((2000, 3000), (800, 1200)), (800, 1200));
        assert_eq!(fit_dimensions((4000, 1000), (800, 1200)), (800, 200));
        assert_eq!(fit_dimensions((1000, 6000), (800, 1200)), (200, 1200));
        assert_eq!(fit_dimensions((640, 480), (800, 1200)), (640, 480));
        assert_eq!(fit_dimensions((10_000, 1), (800, 1200)), (800, 1));

        let (w, h) = fit_dimensions((1234, 987), (800, 1200));
        assert!(w <= 800 && h <= 1200);
        let before = 1234.0 / 987.0;
        let after = f64::from(w) / f64::from(h);
        assert!((before - after).abs() < 0.01, "{before} vs {after}");
    }

    #[test]
    fn oversized_input_is_shrunk_into_envelope() {
        let out = compress_image(&png(gradient(1600, 900)), &CompressionConfig::default()).unwrap();
        assert_eq!((out.width, out.height), (800, 450));

        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 450));
    }

    #[test]
    fn small_input_keeps_resolution_and_exits_after_one_attempt() {
        let out = compress_image(&png(gradient(120, 80)), &CompressionConfig::default()).unwrap();
        assert_eq!((out.width, out.height), (120, 80));
        assert_eq!(out.attempts, 1);
        assert_eq!(out.quality, 85);
        assert_eq!(image::guess_format(&out.data).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn quality_search_stops_at_floor_within_bound() {
        let cfg = CompressionConfig { max_bytes: 1024, ..CompressionConfig::default() };
        let out = compress_image(&png(noise(400, 400)), &cfg).unwrap();
        assert!(out.data.len() > cfg.max_bytes, "noise should not fit in 1KiB");
        assert_eq!(out.quality, cfg.quality_floor);
        assert_eq!(out.attempts, cfg.max_attempts());
    }

    #[test]
    fn quality_search_never_exceeds_bound_or_floor() {
        // 43 is not a multiple of 5: the last usable level is 45, not 40
        let cfg = CompressionConfig {
            quality_initial: 85,
            quality_floor: 42,
            quality_step: 5,
            max_bytes: 1024,
            ..CompressionConfig::default()
        };
        let out = compress_image(&png(noise(256, 256)), &cfg).unwrap();
        assert!(out.quality >= cfg.quality_floor);
        assert!(out.attempts <= cfg.max_attempts());
        assert_eq!(cfg.max_attempts(), 9);
        if out.data.len() > cfg.max_bytes {
            assert!(out.quality - cfg.quality_step < cfg.quality_floor);
        }
    }

    #[test]
    fn stops_early_once_under_budget() {
        let raw = png(noise(300, 300));
        let loose = CompressionConfig { max_bytes: usize::MAX, ..CompressionConfig::default() };
        let out = compress_image(&raw, &loose).unwrap();
        assert_eq!(out.attempts, 1);

        let first_size = out.data.len();
        let tighter = CompressionConfig { max_bytes: first_size - 1, ..CompressionConfig::default() };
        let out = compress_image(&raw, &tighter).unwrap();
        assert!(out.attempts >= 2);
        assert!(out.quality < 85);
        assert!(out.data.len() <= tighter.max_bytes || out.quality == tighter.quality_floor);
    }

    #[test]
    fn translucent_pixels_keep_alpha() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_fn(64, 64, |x, _| {
            Rgba([200, 40, 40, if x < 32 { 255 } else { 90 }])
        }));
        let out = compress_image(&png(img), &CompressionConfig::default()).unwrap();
        assert!(out.has_alpha);
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert!(decoded.color().has_alpha());
        let px = decoded.to_rgba8();
        assert_eq!(px.get_pixel(60, 10).0[3], 90);
        assert_eq!(px.get_pixel(5, 10).0[3], 255);
    }

    #[test]
    fn opaque_alpha_channel_is_dropped() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_fn(64, 64, |x, y| {
            Rgba([x as u8, y as u8, 7, 255])
        }));
        let out = compress_image(&png(img), &CompressionConfig::default()).unwrap();
        assert!(!out.has_alpha);
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = compress_image(b"definitely not an image", &CompressionConfig::default()).unwrap_err();
        assert!(matches!(err, AssetError::Decode(_)));
    }
}
