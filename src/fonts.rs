//! Font registry. Font descriptors are JSON files under `fonts/` naming a
//! family and its style files under `fontfiles/`. A style that fails to
//! register is logged and skipped; the affected text fields fall back to
//! the default family at draw time.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rusttype::Font;
use serde::Deserialize;

use crate::overlay::TextField;
use crate::{DEFAULT_FONT_FAMILY, FONTS_FOLDER, FONT_FILES_FOLDER};

#[derive(Debug, Deserialize)]
struct FontDescriptor {
    family: String,
    styles: Vec<StyleDescriptor>,
}

#[derive(Debug, Deserialize)]
struct StyleDescriptor {
    file: String,
    #[serde(default)]
    weight: String,
    #[serde(default)]
    style: String,
}

struct LoadedStyle {
    style: String,
    weight: String,
    font: Font<'static>,
}

#[derive(Default)]
pub struct FontRegistry {
    families: HashMap<String, Vec<LoadedStyle>>,
}

impl FontRegistry {
    /// Scan `fonts/*.json` and register every style file that parses.
    /// Never fails as a whole: an unreadable descriptor or font file is a
    /// per-style FontLoadFailure, logged and skipped.
    pub fn load(data_dir: impl AsRef<Path>) -> Self {
        let mut registry = Self::default();
        let fonts_dir = data_dir.as_ref().join(FONTS_FOLDER);
        let files_dir = data_dir.as_ref().join(FONT_FILES_FOLDER);

        let entries = match fs::read_dir(&fonts_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("no font descriptors at {}: {}", fonts_dir.display(), e);
                return registry;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let descriptor: FontDescriptor = match fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
                }) {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("skipping font descriptor {}: {}", path.display(), e);
                    continue;
                }
            };
            for style in descriptor.styles {
                registry.register(&files_dir, &descriptor.family, style);
            }
        }

        log::info!("font registry: {} families", registry.families.len());
        registry
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn register(&mut self, files_dir: &Path, family: &str, style: StyleDescriptor) {
        let path = files_dir.join(&style.file);
        let font = fs::read(&path)
            .ok()
            .and_then(Font::try_from_vec);
        match font {
            Some(font) => {
                self.families
                    .entry(family.to_string())
                    .or_default()
                    .push(LoadedStyle {
                        style: style.style,
                        weight: style.weight,
                        font,
                    });
            }
            None => {
                log::warn!(
                    "font registration failed for {} ({}), text will fall back",
                    family,
                    path.display()
                );
            }
        }
    }

    /// Best font for (family, style). Unknown families fall back to the
    /// default family; an unknown style falls back to the family's first
    /// registered style.
    pub fn font_for(&self, family: &str, style: &str) -> Option<&Font<'static>> {
        let styles = self
            .families
            .get(family)
            .or_else(|| self.families.get(DEFAULT_FONT_FAMILY))?;
        styles
            .iter()
            .find(|s| {
                s.style.eq_ignore_ascii_case(style)
                    || s.weight.eq_ignore_ascii_case(style)
            })
            .or_else(|| styles.first())
            .map(|s| &s.font)
    }
}

/// Font family for one text field, evaluated independently per field:
/// the template's family wins when the user keeps the default font or the
/// template forces it; otherwise a non-default user preference wins; the
/// fixed default family is the last resort.
pub fn resolve_family<'a>(field: &'a TextField, user_font: Option<&'a str>) -> &'a str {
    let user = user_font.filter(|f| !f.is_empty() && *f != "default");
    if let Some(family) = field.font_family.as_deref() {
        if user.is_none() || field.force_font {
            return family;
        }
    }
    user.unwrap_or(DEFAULT_FONT_FAMILY)
}
