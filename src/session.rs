// session.rs — 按键步进会话: 重建映射, 预览, 保存

use std::io::BufRead;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{info, warn};
use thiserror::Error;

use crate::i18n::tr_with;
use crate::mapping::{MappingEngine, MappingError};
use crate::view::{ViewAction, ViewParameters};

/// Slot the session renders into.
pub const SESSION_SLOT: usize = 0;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("image {path}: {err}")]
    Image {
        path: PathBuf,
        #[source]
        err: image::ImageError,
    },
    #[error("view preset {path}: {err}")]
    Preset {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("view preset {path}: {err}")]
    PresetFormat {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("reading key commands: {0}")]
    Input(#[from] std::io::Error),
}

/// Load a JSON view preset. Missing fields take their defaults.
pub fn read_view(path: &Path) -> Result<ViewParameters, SessionError> {
    let text = std::fs::read_to_string(path).map_err(|err| SessionError::Preset {
        path: path.to_path_buf(),
        err,
    })?;
    serde_json::from_str(&text).map_err(|err| SessionError::PresetFormat {
        path: path.to_path_buf(),
        err,
    })
}

pub fn write_view(view: &ViewParameters, path: &Path) -> Result<(), SessionError> {
    let text = serde_json::to_string_pretty(view).map_err(|err| SessionError::PresetFormat {
        path: path.to_path_buf(),
        err,
    })?;
    std::fs::write(path, text).map_err(|err| SessionError::Preset {
        path: path.to_path_buf(),
        err,
    })
}

fn write_image(img: &RgbImage, path: &Path) -> Result<(), SessionError> {
    img.save(path).map_err(|err| SessionError::Image {
        path: path.to_path_buf(),
        err,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Quit,
}

/// Interactive stepping over one source image.
///
/// Every moving key rebuilds the map and re-resamples the view; `s` writes
/// the current image to `output` and the view to `output` with a `.json`
/// extension.
pub struct Session<'a> {
    engine: MappingEngine,
    source: &'a RgbImage,
    view: ViewParameters,
    result: RgbImage,
    output: PathBuf,
    preview: Option<PathBuf>,
}

impl<'a> Session<'a> {
    /// Render `view` once (writing the preview if set) and start the session.
    pub fn new(
        engine: MappingEngine,
        source: &'a RgbImage,
        view: ViewParameters,
        output: PathBuf,
        preview: Option<PathBuf>,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            engine,
            source,
            view,
            result: RgbImage::new(0, 0),
            output,
            preview,
        };
        session.render()?;
        Ok(session)
    }

    pub fn view(&self) -> ViewParameters {
        self.view
    }

    pub fn result(&self) -> &RgbImage {
        &self.result
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn render(&mut self) -> Result<(), SessionError> {
        self.engine.build_map(self.view, SESSION_SLOT)?;
        self.result = self.engine.unwarp(self.source, SESSION_SLOT)?;
        if let Some(preview) = &self.preview {
            write_image(&self.result, preview)?;
        }
        Ok(())
    }

    /// Save the current image and its view preset.
    pub fn save(&self) -> Result<(), SessionError> {
        write_image(&self.result, &self.output)?;
        write_view(&self.view, &self.output.with_extension("json"))?;
        info!(
            "{}",
            tr_with("log.saved", &[("path", self.output.display().to_string())])
        );
        Ok(())
    }

    /// Handle one key. Unknown keys leave the view alone.
    pub fn handle_key(&mut self, key: char) -> Result<KeyOutcome, SessionError> {
        let Some(action) = ViewAction::from_key(key) else {
            warn!("{}", tr_with("error.unknown_key", &[("key", key.to_string())]));
            return Ok(KeyOutcome::Continue);
        };

        match action {
            ViewAction::Quit => return Ok(KeyOutcome::Quit),
            ViewAction::Save => self.save()?,
            _ => {
                self.view.apply(action);
                self.render()?;
            }
        }
        Ok(KeyOutcome::Continue)
    }

    /// Feed keys from `input` until quit or end of input. `on_step` sees the
    /// view after every handled key except quit, unknown keys included.
    /// Whitespace (line breaks included) is skipped.
    pub fn run(
        &mut self,
        input: impl BufRead,
        mut on_step: impl FnMut(&ViewParameters),
    ) -> Result<(), SessionError> {
        for line in input.lines() {
            let line = line?;
            for key in line.chars().filter(|c| !c.is_whitespace()) {
                if self.handle_key(key)? == KeyOutcome::Quit {
                    return Ok(());
                }
                on_step(&self.view);
            }
        }
        Ok(())
    }
}
