//! Fisheye inverse-projection mapping engine.
//!
//! For every pixel of a rectified destination view, [`MappingEngine`] derives
//! the fractional source coordinate to sample in the fisheye image, using a
//! pinhole-to-sphere projection rotated by the view's pan/tilt/roll. The
//! resulting [`CoordinateMap`]s are kept in a small fixed set of slots so a
//! caller can switch between precomputed views without rebuilding them.
//!
//! # Conventions
//!
//! - Angles are divided by 180 and fed to the trigonometric functions as-is
//!   (not converted to radians); existing views and presets depend on this.
//! - Arithmetic is single precision, matching the 32-bit float grids that
//!   constant-border remappers consume.
//! - Destination centre uses integer division, source centre float division.

use std::time::Instant;

use glam::Vec2;
use image::{Rgb, RgbImage};
use log::debug;
use thiserror::Error;

use crate::remap::remap_bilinear;
use crate::view::ViewParameters;

/// Number of independently addressable map slots.
pub const MAP_SLOTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error(
        "image dimensions must be positive, got source {source_width}x{source_height} \
         and destination {dest_width}x{dest_height}"
    )]
    InvalidDimensions {
        source_width: u32,
        source_height: u32,
        dest_width: u32,
        dest_height: u32,
    },
    #[error("map slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },
    #[error("map slot {0} has not been built")]
    EmptySlot(usize),
    #[error("source image is {actual:?}, engine expects {expected:?}")]
    SourceSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Per-pixel inverse mapping: destination `(col, row)` → source `(x, y)`.
///
/// Both grids are row-major, `height × width`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateMap {
    width: u32,
    height: u32,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl CoordinateMap {
    fn zeroed(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            map_x: vec![0.0; len],
            map_y: vec![0.0; len],
        }
    }

    /// Build a map by evaluating `f(col, row)` for every destination pixel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Vec2) -> Self {
        let mut map = Self::zeroed(width, height);
        for row in 0..height {
            for col in 0..width {
                let p = f(col, row);
                map.set(col as usize, row as usize, p.x, p.y);
            }
        }
        map
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Source x coordinates, row-major.
    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    /// Source y coordinates, row-major.
    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }

    /// Source coordinate for destination pixel `(col, row)`.
    pub fn get(&self, col: u32, row: u32) -> Option<Vec2> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let i = row as usize * self.width as usize + col as usize;
        Some(Vec2::new(self.map_x[i], self.map_y[i]))
    }

    #[inline]
    fn set(&mut self, col: usize, row: usize, x: f32, y: f32) {
        let i = row * self.width as usize + col;
        self.map_x[i] = x;
        self.map_y[i] = y;
    }
}

/// Rotation coefficients of the pan/tilt/roll view.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rotation {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    sin_be: f32,
    sin_al: f32,
    cos_al: f32,
}

impl Rotation {
    fn from_view(view: &ViewParameters) -> Self {
        let al = half_turn(view.alpha);
        let be = half_turn(view.beta);
        let th = half_turn(view.theta);

        let (sin_al, cos_al) = (al.sin(), al.cos());
        let (sin_be, cos_be) = (be.sin(), be.cos());
        let (sin_th, cos_th) = (th.sin(), th.cos());

        Self {
            a: cos_th * cos_al - sin_th * sin_al * cos_be,
            b: sin_th * cos_al + cos_th * sin_al * cos_be,
            c: cos_th * sin_al + sin_th * cos_al * cos_be,
            d: sin_th * sin_al - cos_th * cos_al * cos_be,
            sin_be,
            sin_al,
            cos_al,
        }
    }
}

/// `angle / 180`, computed in double precision and rounded like the grids.
#[inline]
fn half_turn(degrees: f32) -> f32 {
    (f64::from(degrees) / 180.0) as f32
}

/// Storage row/column for a centred offset.
///
/// Offsets below `center` shift back to their absolute index; offsets at or
/// beyond `center` (only the last row/column of an odd extent) are stored at
/// the offset itself, overwriting the centre line and leaving the last line
/// unwritten.
#[inline]
fn fold_index(offset: i64, center: i64) -> usize {
    if center <= offset {
        offset as usize
    } else {
        (offset + center) as usize
    }
}

/// Fisheye dewarping map builder with a fixed set of cached map slots.
#[derive(Debug, Clone)]
pub struct MappingEngine {
    source_width: u32,
    source_height: u32,
    dest_width: u32,
    dest_height: u32,
    sphere_radius: f32,
    view: ViewParameters,
    slots: [Option<CoordinateMap>; MAP_SLOTS],
}

impl MappingEngine {
    /// New engine with sphere radius `source_width / 2`, the default view
    /// and all slots empty.
    pub fn new(
        source_width: u32,
        source_height: u32,
        dest_width: u32,
        dest_height: u32,
    ) -> Result<Self, MappingError> {
        if source_width == 0 || source_height == 0 || dest_width == 0 || dest_height == 0 {
            return Err(MappingError::InvalidDimensions {
                source_width,
                source_height,
                dest_width,
                dest_height,
            });
        }

        Ok(Self {
            source_width,
            source_height,
            dest_width,
            dest_height,
            sphere_radius: (f64::from(source_width) / 2.0) as f32,
            view: ViewParameters::default(),
            slots: std::array::from_fn(|_| None),
        })
    }

    /// Override the projection sphere radius (source pixels). Built slots
    /// keep the maps they were built with.
    pub fn with_sphere_radius(mut self, radius: f32) -> Self {
        self.sphere_radius = radius;
        self
    }

    pub fn sphere_radius(&self) -> f32 {
        self.sphere_radius
    }

    /// View used by the most recent successful [`build_map`](Self::build_map).
    pub fn view(&self) -> ViewParameters {
        self.view
    }

    pub fn source_size(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    pub fn dest_size(&self) -> (u32, u32) {
        (self.dest_width, self.dest_height)
    }

    fn check_slot(slot: usize) -> Result<(), MappingError> {
        if slot < MAP_SLOTS {
            Ok(())
        } else {
            Err(MappingError::SlotOutOfRange {
                slot,
                capacity: MAP_SLOTS,
            })
        }
    }

    /// Compute the map for `view` and store it in `slot`, replacing whatever
    /// was there. Nothing is touched if `slot` is out of range.
    pub fn build_map(&mut self, view: ViewParameters, slot: usize) -> Result<(), MappingError> {
        Self::check_slot(slot)?;
        let started = Instant::now();

        let map = self.compute(&view);
        self.view = view;
        self.slots[slot] = Some(map);

        debug!(
            "built map slot {} ({}x{}) for {:?} in {:?}",
            slot,
            self.dest_width,
            self.dest_height,
            view,
            started.elapsed()
        );
        Ok(())
    }

    fn compute(&self, view: &ViewParameters) -> CoordinateMap {
        let rot = Rotation::from_view(view);
        let radius = self.sphere_radius;

        let m_r = view.zoom * radius;
        let m_r2 = m_r * m_r;
        let m_r_sin_be_sin_al = m_r * rot.sin_be * rot.sin_al;
        let m_r_sin_be_cos_al = m_r * rot.sin_be * rot.cos_al;

        let center_v = i64::from(self.dest_height / 2);
        let center_u = i64::from(self.dest_width / 2);
        let center = Vec2::new(
            (f64::from(self.source_width) / 2.0) as f32,
            (f64::from(self.source_height) / 2.0) as f32,
        );

        let mut map = CoordinateMap::zeroed(self.dest_width, self.dest_height);

        for abs_v in 0..i64::from(self.dest_height) {
            let v_off = abs_v - center_v;
            let v = v_off as f32;
            let vv = v * v;
            let row = fold_index(v_off, center_v);

            for abs_u in 0..i64::from(self.dest_width) {
                let u_off = abs_u - center_u;
                let u = u_off as f32;
                let uu = u * u;

                let upper_x = radius * (u * rot.a - v * rot.b + m_r_sin_be_sin_al);
                let lower = (uu + vv + m_r2).sqrt();
                let upper_y = radius * (u * rot.c - v * rot.d - m_r_sin_be_cos_al);

                let x = upper_x / lower + center.x;
                let y = upper_y / lower + center.y;

                map.set(fold_index(u_off, center_u), row, x, y);
            }
        }

        map
    }

    /// The map currently stored in `slot`.
    pub fn coordinates(&self, slot: usize) -> Result<&CoordinateMap, MappingError> {
        Self::check_slot(slot)?;
        self.slots[slot]
            .as_ref()
            .ok_or(MappingError::EmptySlot(slot))
    }

    pub fn is_built(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(Option::is_some)
    }

    /// Drop the map stored in `slot`.
    pub fn clear(&mut self, slot: usize) -> Result<(), MappingError> {
        Self::check_slot(slot)?;
        self.slots[slot] = None;
        Ok(())
    }

    /// Resample `source` through the map in `slot` (black border).
    pub fn unwarp(&self, source: &RgbImage, slot: usize) -> Result<RgbImage, MappingError> {
        let map = self.coordinates(slot)?;
        let actual = source.dimensions();
        let expected = self.source_size();
        if actual != expected {
            return Err(MappingError::SourceSizeMismatch { expected, actual });
        }
        Ok(remap_bilinear(source, map, Rgb([0, 0, 0])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(sw: u32, sh: u32, dw: u32, dh: u32) -> MappingEngine {
        MappingEngine::new(sw, sh, dw, dh).unwrap()
    }

    fn closed_form_identity(radius: f32, center: Vec2, u: f32, v: f32) -> Vec2 {
        let lower = (u * u + v * v + radius * radius).sqrt();
        Vec2::new(
            center.x + radius * u / lower,
            center.y + radius * v / lower,
        )
    }

    #[test]
    fn new_engine_defaults() {
        let e = engine(640, 480, 320, 240);
        assert_eq!(e.sphere_radius(), 320.0);
        assert_eq!(e.view(), ViewParameters::default());
        assert_eq!(e.source_size(), (640, 480));
        assert_eq!(e.dest_size(), (320, 240));
        for slot in 0..MAP_SLOTS {
            assert!(!e.is_built(slot));
        }
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let err = MappingEngine::new(640, 0, 320, 240).unwrap_err();
        assert!(matches!(err, MappingError::InvalidDimensions { .. }));
        assert!(MappingEngine::new(640, 480, 0, 240).is_err());
    }

    #[test]
    fn unrotated_view_coefficients_are_axis_aligned() {
        let rot = Rotation::from_view(&ViewParameters::default());
        assert_eq!((rot.a, rot.b, rot.c, rot.d), (1.0, 0.0, 0.0, -1.0));
    }

    #[test]
    fn unrotated_view_matches_closed_form() {
        let mut e = engine(200, 100, 64, 48);
        e.build_map(ViewParameters::default(), 0).unwrap();
        let map = e.coordinates(0).unwrap();
        let center = Vec2::new(100.0, 50.0);
        let radius = e.sphere_radius();

        // centre pixel samples the source centre
        assert_eq!(map.get(32, 24), Some(center));

        for (col, row) in [(0u32, 0u32), (10, 40), (63, 5), (40, 24)] {
            let u = col as f32 - 32.0;
            let v = row as f32 - 24.0;
            let expected = closed_form_identity(radius, center, u, v);
            let got = map.get(col, row).unwrap();
            assert!(
                (got.x - expected.x).abs() < 1e-3,
                "x at ({col},{row}): expected {}, got {}",
                expected.x,
                got.x
            );
            assert!(
                (got.y - expected.y).abs() < 1e-3,
                "y at ({col},{row}): expected {}, got {}",
                expected.y,
                got.y
            );
        }
    }

    #[test]
    fn map_shape_matches_destination() {
        let mut e = engine(300, 200, 17, 9);
        for (i, view) in [
            ViewParameters::default(),
            ViewParameters::new(-270.0, 45.0, 270.0, 1.3),
            ViewParameters::new(1e4, -720.0, 33.3, 0.2),
        ]
        .into_iter()
        .enumerate()
        {
            e.build_map(view, i).unwrap();
            let map = e.coordinates(i).unwrap();
            assert_eq!((map.width(), map.height()), (17, 9));
            assert_eq!(map.map_x().len(), 17 * 9);
            assert_eq!(map.map_y().len(), 17 * 9);
        }
    }

    #[test]
    fn rebuilding_is_bit_identical() {
        let view = ViewParameters::new(-270.0, 45.0, 270.0, 1.7);
        let mut e = engine(321, 240, 33, 21);
        e.build_map(view, 0).unwrap();
        let first = e.coordinates(0).unwrap().clone();
        e.build_map(view, 0).unwrap();
        let second = e.coordinates(0).unwrap();
        let bits = |m: &CoordinateMap| -> Vec<u32> {
            m.map_x().iter().chain(m.map_y()).map(|f| f.to_bits()).collect()
        };
        assert_eq!(bits(&first), bits(second));
    }

    #[test]
    fn building_one_slot_leaves_others_alone() {
        let mut e = engine(400, 300, 40, 30);
        e.build_map(ViewParameters::new(10.0, 20.0, 30.0, 1.0), 0).unwrap();
        let snapshot = e.coordinates(0).unwrap().clone();

        e.build_map(ViewParameters::new(-90.0, 45.0, 90.0, 2.0), 1).unwrap();
        assert_eq!(e.coordinates(0).unwrap(), &snapshot);
        assert_ne!(e.coordinates(1).unwrap(), &snapshot);
        assert!(!e.is_built(2));
    }

    #[test]
    fn out_of_range_slot_is_rejected_without_side_effects() {
        let mut e = engine(400, 300, 40, 30);
        let view = ViewParameters::new(10.0, 20.0, 30.0, 1.0);
        e.build_map(view, 2).unwrap();
        let snapshot = e.coordinates(2).unwrap().clone();

        let err = e
            .build_map(ViewParameters::new(90.0, 90.0, 90.0, 3.0), MAP_SLOTS)
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::SlotOutOfRange {
                slot: 3,
                capacity: 3
            }
        );
        assert_eq!(e.view(), view);
        assert_eq!(e.coordinates(2).unwrap(), &snapshot);
        assert!(!e.is_built(0));
        assert!(!e.is_built(1));
        assert!(!e.is_built(3));
    }

    #[test]
    fn unbuilt_slot_access_fails() {
        let e = engine(100, 100, 10, 10);
        assert_eq!(e.coordinates(1).unwrap_err(), MappingError::EmptySlot(1));
        assert!(matches!(
            e.coordinates(7),
            Err(MappingError::SlotOutOfRange { slot: 7, .. })
        ));
    }

    #[test]
    fn clear_empties_a_slot() {
        let mut e = engine(100, 100, 10, 10);
        e.build_map(ViewParameters::default(), 1).unwrap();
        e.clear(1).unwrap();
        assert_eq!(e.coordinates(1).unwrap_err(), MappingError::EmptySlot(1));
        assert!(e.clear(3).is_err());
    }

    #[test]
    fn build_records_the_view() {
        let mut e = engine(100, 100, 10, 10);
        let view = ViewParameters::new(-270.0, 0.0, 270.0, 0.5);
        e.build_map(view, 0).unwrap();
        assert_eq!(e.view(), view);
    }

    #[test]
    fn higher_zoom_narrows_the_view() {
        let mut e = engine(640, 480, 64, 64);
        let (col, row) = (52u32, 40u32);
        let center_x = 320.0;

        let mut last = f32::INFINITY;
        for zoom in [0.5, 1.0, 1.5, 2.0, 4.0] {
            e.build_map(ViewParameters::new(0.0, 0.0, 0.0, zoom), 0).unwrap();
            let x = e.coordinates(0).unwrap().get(col, row).unwrap().x;
            let offset = (x - center_x).abs();
            assert!(offset < last, "zoom {zoom}: {offset} !< {last}");
            last = offset;
        }
    }

    #[test]
    fn odd_extent_folds_last_line_onto_centre() {
        // 5 wide, 3 high: centre (2, 1). Row 2 and column 4 are folded away.
        let mut e = engine(100, 80, 5, 3);
        e.build_map(ViewParameters::default(), 0).unwrap();
        let map = e.coordinates(0).unwrap();

        for col in 0..5 {
            assert_eq!(map.get(col, 2), Some(Vec2::ZERO), "col {col}");
        }
        for row in 0..3 {
            assert_eq!(map.get(4, row), Some(Vec2::ZERO), "row {row}");
        }

        // The centre cell holds the value computed for offset (+2, +1).
        let radius = e.sphere_radius();
        let expected = closed_form_identity(radius, Vec2::new(50.0, 40.0), 2.0, 1.0);
        let got = map.get(2, 1).unwrap();
        assert!((got.x - expected.x).abs() < 1e-3);
        assert!((got.y - expected.y).abs() < 1e-3);
    }

    #[test]
    fn even_extent_is_stored_in_place() {
        for offset in -3..3 {
            assert_eq!(fold_index(offset, 3), (offset + 3) as usize);
        }
        assert_eq!(fold_index(3, 3), 3);
    }

    #[test]
    fn sphere_radius_override() {
        // even extent, so row 10 holds offset v = 0 unfolded
        let mut e = engine(200, 200, 20, 20).with_sphere_radius(50.0);
        assert_eq!(e.sphere_radius(), 50.0);
        e.build_map(ViewParameters::default(), 0).unwrap();
        let got = e.coordinates(0).unwrap().get(0, 10).unwrap();
        let expected = closed_form_identity(50.0, Vec2::new(100.0, 100.0), -10.0, 0.0);
        assert!((got.x - expected.x).abs() < 1e-3);
        assert!((got.y - expected.y).abs() < 1e-3);
    }

    #[test]
    fn zero_zoom_is_degenerate_not_an_error() {
        let mut e = engine(100, 100, 4, 4);
        e.build_map(ViewParameters::new(0.0, 0.0, 0.0, 0.0), 0).unwrap();
        let centre = e.coordinates(0).unwrap().get(2, 2).unwrap();
        assert!(!centre.x.is_finite());
    }

    #[test]
    fn unwarp_checks_source_size() {
        let mut e = engine(8, 6, 4, 4);
        e.build_map(ViewParameters::default(), 0).unwrap();
        let wrong = RgbImage::new(6, 8);
        assert_eq!(
            e.unwarp(&wrong, 0).unwrap_err(),
            MappingError::SourceSizeMismatch {
                expected: (8, 6),
                actual: (6, 8)
            }
        );
        let ok = RgbImage::new(8, 6);
        assert_eq!(e.unwarp(&ok, 0).unwrap().dimensions(), (4, 4));
        assert_eq!(e.unwarp(&ok, 1).unwrap_err(), MappingError::EmptySlot(1));
    }
}
