// view.rs — 视角参数与按键步进

use serde::{Deserialize, Serialize};

/// Zoom change per key step. Applied in double precision, then rounded.
pub const ZOOM_STEP: f64 = 0.1;
/// Pan change per key step, degrees.
pub const ALPHA_STEP: f32 = 90.0;
/// Tilt change per key step, degrees.
pub const BETA_STEP: f32 = 45.0;
/// Roll change per key step, degrees.
pub const THETA_STEP: f32 = 90.0;

/// Orientation and scale of the virtual view into the fisheye sphere.
///
/// Angles are in degrees and kept exactly as supplied (no wrapping). `zoom`
/// is a plain scale on the projection sphere radius; zero or negative values
/// are allowed and simply give degenerate or mirrored maps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewParameters {
    pub alpha: f32, // 水平旋转 (pan)
    pub beta: f32,  // 俯仰 (tilt)
    pub theta: f32, // 滚转 (roll)
    pub zoom: f32,
}

impl Default for ViewParameters {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            beta: 0.0,
            theta: 0.0,
            zoom: 1.0,
        }
    }
}

impl ViewParameters {
    pub fn new(alpha: f32, beta: f32, theta: f32, zoom: f32) -> Self {
        Self {
            alpha,
            beta,
            theta,
            zoom,
        }
    }

    /// Starting view of the interactive driver.
    pub fn initial() -> Self {
        Self::new(-270.0, 0.0, 270.0, 1.0)
    }

    /// Replace the fields given explicitly, keep the rest.
    pub fn with_overrides(
        self,
        alpha: Option<f32>,
        beta: Option<f32>,
        theta: Option<f32>,
        zoom: Option<f32>,
    ) -> Self {
        Self {
            alpha: alpha.unwrap_or(self.alpha),
            beta: beta.unwrap_or(self.beta),
            theta: theta.unwrap_or(self.theta),
            zoom: zoom.unwrap_or(self.zoom),
        }
    }

    /// Apply one key step. `Save` and `Quit` leave the view as is.
    pub fn apply(&mut self, action: ViewAction) {
        match action {
            ViewAction::ZoomOut => self.zoom = (f64::from(self.zoom) - ZOOM_STEP) as f32,
            ViewAction::ZoomIn => self.zoom = (f64::from(self.zoom) + ZOOM_STEP) as f32,
            ViewAction::AlphaUp => self.alpha += ALPHA_STEP,
            ViewAction::AlphaDown => self.alpha -= ALPHA_STEP,
            ViewAction::BetaUp => self.beta += BETA_STEP,
            ViewAction::BetaDown => self.beta -= BETA_STEP,
            ViewAction::ThetaUp => self.theta += THETA_STEP,
            ViewAction::ThetaDown => self.theta -= THETA_STEP,
            ViewAction::Save | ViewAction::Quit => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    ZoomOut,   // r
    ZoomIn,    // f
    AlphaUp,   // g
    AlphaDown, // t
    BetaUp,    // h
    BetaDown,  // y
    ThetaUp,   // j
    ThetaDown, // u
    Save,      // s
    Quit,      // ESC / q
}

impl ViewAction {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'r' => Some(Self::ZoomOut),
            'f' => Some(Self::ZoomIn),
            'g' => Some(Self::AlphaUp),
            't' => Some(Self::AlphaDown),
            'h' => Some(Self::BetaUp),
            'y' => Some(Self::BetaDown),
            'j' => Some(Self::ThetaUp),
            'u' => Some(Self::ThetaDown),
            's' => Some(Self::Save),
            '\u{1b}' | 'q' => Some(Self::Quit),
            _ => None,
        }
    }

    /// Whether the action changes the view (and so needs a rebuilt map).
    pub fn moves_view(self) -> bool {
        !matches!(self, Self::Save | Self::Quit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unrotated_unit_zoom() {
        let v = ViewParameters::default();
        assert_eq!(v, ViewParameters::new(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn key_steps_match_driver_table() {
        let mut v = ViewParameters::initial();
        for key in ['g', 'h', 'j'] {
            v.apply(ViewAction::from_key(key).unwrap());
        }
        assert_eq!(v.alpha, -180.0);
        assert_eq!(v.beta, 45.0);
        assert_eq!(v.theta, 360.0);

        v.apply(ViewAction::ZoomIn);
        assert!((v.zoom - 1.1).abs() < 1e-6, "zoom = {}", v.zoom);
        v.apply(ViewAction::ZoomOut);
        v.apply(ViewAction::ZoomOut);
        assert!((v.zoom - 0.9).abs() < 1e-6, "zoom = {}", v.zoom);
    }

    #[test]
    fn zoom_steps_round_from_double() {
        let mut v = ViewParameters::default();
        v.apply(ViewAction::ZoomIn);
        assert_eq!(v.zoom, 1.1f32);
        v.apply(ViewAction::ZoomOut);
        assert_eq!(v.zoom, 1.0);

        let mut expected = 1.0f32;
        for _ in 0..25 {
            v.apply(ViewAction::ZoomOut);
            expected = (f64::from(expected) - 0.1) as f32;
        }
        assert_eq!(v.zoom.to_bits(), expected.to_bits());
    }

    #[test]
    fn explicit_fields_override_preset() {
        let preset = ViewParameters::new(-270.0, 45.0, 270.0, 1.5);
        let v = preset.with_overrides(Some(90.0), None, Some(-90.0), None);
        assert_eq!(v, ViewParameters::new(90.0, 45.0, -90.0, 1.5));
        assert_eq!(preset.with_overrides(None, None, None, None), preset);
        assert_eq!(
            preset.with_overrides(None, Some(0.0), None, Some(0.3)),
            ViewParameters::new(-270.0, 0.0, 270.0, 0.3)
        );
    }

    #[test]
    fn angles_are_not_wrapped_and_zoom_is_not_clamped() {
        let mut v = ViewParameters::default();
        for _ in 0..5 {
            v.apply(ViewAction::AlphaDown);
        }
        assert_eq!(v.alpha, -450.0);
        for _ in 0..15 {
            v.apply(ViewAction::ZoomOut);
        }
        assert!(v.zoom < 0.0);
    }

    #[test]
    fn save_and_quit_do_not_move() {
        let mut v = ViewParameters::initial();
        v.apply(ViewAction::Save);
        v.apply(ViewAction::Quit);
        assert_eq!(v, ViewParameters::initial());
        assert!(!ViewAction::Save.moves_view());
        assert!(ViewAction::ThetaDown.moves_view());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert_eq!(ViewAction::from_key('x'), None);
        assert_eq!(ViewAction::from_key('\u{1b}'), Some(ViewAction::Quit));
    }

    #[test]
    fn preset_json_fills_missing_fields_with_defaults() {
        let v: ViewParameters = serde_json::from_str(r#"{"alpha": 90.0, "zoom": 2.0}"#).unwrap();
        assert_eq!(v, ViewParameters::new(90.0, 0.0, 0.0, 2.0));
    }
}
