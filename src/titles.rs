//! Lookup tables mapping 16-digit internal title IDs (WiiU, 3DS) to the
//! canonical short game IDs used by the art endpoints.
//!
//! The databases are read-only collaborators loaded once at construction
//! (`ids/cemu.json`, `ids/3ds.json`); they reload only on process restart.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{Result, TagError, IDS_FOLDER};

pub const CEMU_IDS_FILE: &str = "cemu.json";
pub const CITRA_IDS_FILE: &str = "3ds.json";

/// One regional release of a WiiU title.
#[derive(Debug, Clone, Deserialize)]
pub struct WiiUVariant {
    #[serde(rename = "EUR")]
    pub eur: Option<String>,
    #[serde(rename = "USA")]
    pub usa: Option<String>,
    #[serde(rename = "JPN")]
    pub jpn: Option<String>,
}

impl WiiUVariant {
    fn any_id(&self) -> Option<&String> {
        self.eur
            .as_ref()
            .or(self.usa.as_ref())
            .or(self.jpn.as_ref())
    }
}

#[derive(Debug, Default)]
pub struct TitleIndex {
    wiiu: HashMap<String, Vec<WiiUVariant>>,
    citra: HashMap<String, Vec<String>>,
}

impl TitleIndex {
    /// Load both databases from the data folder. A missing file leaves the
    /// corresponding table empty (every lookup then resolves to unknown).
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self> {
        let ids_dir = data_dir.as_ref().join(IDS_FOLDER);
        let wiiu: HashMap<String, Vec<WiiUVariant>> =
            load_table(&ids_dir.join(CEMU_IDS_FILE))?;
        let citra: HashMap<String, Vec<String>> =
            load_table(&ids_dir.join(CITRA_IDS_FILE))?;
        log::info!(
            "title index loaded: {} wiiu titles, {} 3ds titles",
            wiiu.len(),
            citra.len()
        );
        Ok(Self { wiiu, citra })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn from_parts(
        wiiu: HashMap<String, Vec<WiiUVariant>>,
        citra: HashMap<String, Vec<String>>,
    ) -> Self {
        Self { wiiu, citra }
    }

    /// Resolve a WiiU title ID against the user's cover region.
    ///
    /// Per variant: EUR satisfies the European-language and KO/TW regions,
    /// JPN satisfies JP (JP otherwise degrades to EN), USA satisfies EN.
    /// Nothing matched across all variants: first listed id.
    pub fn resolve_wiiu(&self, title_id: &str, cover_region: &str) -> Result<String> {
        let variants = self
            .wiiu
            .get(title_id)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TagError::TitleMapping(title_id.to_string()))?;

        for variant in variants {
            let mut region = cover_region;
            if matches!(region, "FR" | "DE" | "ES" | "IT" | "NL" | "KO" | "TW") {
                if let Some(eur) = &variant.eur {
                    return Ok(eur.clone());
                }
            }
            if region == "JP" {
                if let Some(jpn) = &variant.jpn {
                    return Ok(jpn.clone());
                }
                region = "EN";
            }
            if region == "EN" {
                if let Some(usa) = &variant.usa {
                    return Ok(usa.clone());
                }
            }
        }

        variants[0]
            .any_id()
            .cloned()
            .ok_or_else(|| TagError::TitleMapping(title_id.to_string()))
    }

    /// Resolve a 3DS title ID. Variants are id codes whose last character
    /// is a region letter; the scan prefers an exact regional match, then
    /// the EN equivalents, then any broadly-compatible letter.
    pub fn resolve_citra(&self, title_id: &str, cover_region: &str) -> Result<String> {
        let variants = self
            .citra
            .get(title_id)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TagError::TitleMapping(title_id.to_string()))?;

        // Single release, nothing to search.
        if variants.len() == 1 {
            return Ok(variants[0].clone());
        }

        for id in variants {
            let letter = id.chars().last().unwrap_or('\0');
            let mut region = cover_region;

            let exact = match region {
                "FR" => 'F',
                "DE" => 'D',
                "ES" => 'S',
                "IT" => 'I',
                "NL" => 'H',
                "KO" => 'K',
                "TW" => 'W',
                _ => '\0',
            };
            if exact != '\0' && letter == exact {
                return Ok(id.clone());
            }

            if region == "JP" {
                if letter == 'J' {
                    return Ok(id.clone());
                }
                region = "EN";
            }
            if region == "EN" && matches!(letter, 'E' | 'X' | 'Y' | 'Z') {
                return Ok(id.clone());
            }

            // Catch-all so there is always some region available.
            if matches!(letter, 'P' | 'V' | 'X' | 'Y' | 'Z' | 'E' | 'J') {
                return Ok(id.clone());
            }
        }

        Ok(variants[0].clone())
    }
}

fn load_table<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        log::warn!("title database {} not found", path.display());
        return Ok(T::default());
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        TagError::Other(anyhow::anyhow!("{}: {}", path.display(), e))
    })
}
