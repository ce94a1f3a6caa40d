// remap.rs — 按坐标映射双线性重采样 (常量边框)

use glam::Vec2;
use image::{Rgb, RgbImage};

use crate::mapping::CoordinateMap;

/// Resample `source` through `map` with bilinear interpolation.
///
/// The output has the map's extent. Neighbours that fall outside the source,
/// and non-finite coordinates, take the constant `border` colour.
pub fn remap_bilinear(source: &RgbImage, map: &CoordinateMap, border: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(map.width(), map.height(), |col, row| match map.get(col, row) {
        Some(p) => sample_bilinear(source, p, border),
        None => border,
    })
}

fn sample_bilinear(source: &RgbImage, p: Vec2, border: Rgb<u8>) -> Rgb<u8> {
    if !p.is_finite() {
        return border;
    }

    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let wx = p.x - x0;
    let wy = p.y - y0;

    let p00 = fetch(source, x0, y0, border);
    let p10 = fetch(source, x0 + 1.0, y0, border);
    let p01 = fetch(source, x0, y0 + 1.0, border);
    let p11 = fetch(source, x0 + 1.0, y0 + 1.0, border);

    let mut out = Rgb([0u8; 3]);
    for c in 0..3 {
        let val = f32::from(p00[c]) * (1.0 - wx) * (1.0 - wy)
            + f32::from(p10[c]) * wx * (1.0 - wy)
            + f32::from(p01[c]) * (1.0 - wx) * wy
            + f32::from(p11[c]) * wx * wy;
        out[c] = val.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[inline]
fn fetch(source: &RgbImage, x: f32, y: f32, border: Rgb<u8>) -> Rgb<u8> {
    let (w, h) = source.dimensions();
    if x < 0.0 || y < 0.0 || x >= w as f32 || y >= h as f32 {
        return border;
    }
    *source.get_pixel(x as u32, y as u32)
}
