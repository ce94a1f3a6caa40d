//! Fisheye dewarping: inverse-projection coordinate maps from a rectified view
//! back into a fisheye source image, plus the resampler and view state the
//! viewer drives them with.

pub mod i18n;
pub mod mapping;
pub mod remap;
pub mod session;
pub mod view;

pub use mapping::{CoordinateMap, MappingEngine, MappingError, MAP_SLOTS};
pub use remap::remap_bilinear;
pub use session::{KeyOutcome, Session, SessionError};
pub use view::{ViewAction, ViewParameters};
