//! User profile model. The profile is owned by the external storage layer
//! and is read-only here; legacy stored profiles use string booleans and a
//! shapeless Mii payload, both accepted by the deserializer.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Result, TagError, USERS_FOLDER};

/// Guest Mii slots of the console, plus the "undefined" placeholder.
pub const GUESTS: &[&str] = &["a", "b", "c", "d", "e", "f", "undefined"];

/// Kind of Mii payload attached to a profile. Chosen explicitly at
/// profile-edit time; legacy profiles recover it from the string shape
/// via [`MiiData::classify_legacy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiiData {
    /// One of the built-in guest Miis, referenced by slot name.
    Guest(String),
    /// Raw Wii-format Mii data, hex encoded, rendered by the contest
    /// channel service.
    HexBlob(String),
    /// A Mii Studio code rendered by the studio service.
    StudioCode(String),
    /// A Check Mii Out / contest channel entry number.
    EntryNumber(u64),
}

impl MiiData {
    /// Shape-based classification kept verbatim for compatibility with
    /// legacy stored profiles: empty or oversized (>= 1000 chars) data is
    /// the undefined guest, guest slot names map to guests, exactly
    /// 94 chars is a studio code, all-digit data is a contest entry
    /// number, anything else is treated as hex data.
    pub fn classify_legacy(raw: &str) -> MiiData {
        if raw.is_empty() || raw.len() >= 1000 {
            return MiiData::Guest("undefined".to_string());
        }
        if GUESTS.contains(&raw) {
            return MiiData::Guest(raw.to_string());
        }
        if raw.len() == 94 {
            return MiiData::StudioCode(raw.to_string());
        }
        if let Ok(n) = raw.parse::<u64>() {
            return MiiData::EntryNumber(n);
        }
        MiiData::HexBlob(raw.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub overlay: String,
    pub bg: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub games: Vec<String>,
    #[serde(default)]
    pub coins: u64,
    #[serde(default)]
    pub friend_code: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub sort: String,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub covertype: Option<String>,
    #[serde(default)]
    pub coverregion: Option<String>,
    #[serde(default)]
    pub coin: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    pub useavatar: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub usemii: bool,
    #[serde(default)]
    pub mii_data: Option<String>,
    #[serde(default)]
    pub mii_number: Option<u64>,
}

impl UserProfile {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| TagError::Profile(e.to_string()))
    }

    /// Read `users/{id}.json` from the data folder.
    pub fn load(data_dir: impl AsRef<Path>, id: &str) -> Result<Self> {
        let path = data_dir
            .as_ref()
            .join(USERS_FOLDER)
            .join(format!("{id}.json"));
        let json = fs::read_to_string(&path)
            .map_err(|e| TagError::Profile(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// The sort mode `"none"` disables cover rendering entirely.
    pub fn covers_enabled(&self) -> bool {
        !self.sort.eq_ignore_ascii_case("none")
    }

    /// Cover-region override, normalized to uppercase; `EN` when unset.
    pub fn cover_region(&self) -> String {
        self.coverregion
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|r| r.to_uppercase())
            .unwrap_or_else(|| "EN".to_string())
    }

    /// The Mii attached to this profile. Profiles edited through the
    /// current flow carry `mii_data`; older CMOC profiles only carry an
    /// entry number.
    pub fn mii(&self) -> MiiData {
        match (self.mii_data.as_deref(), self.mii_number) {
            (Some(data), _) if !data.is_empty() => MiiData::classify_legacy(data),
            (_, Some(n)) => MiiData::EntryNumber(n),
            _ => MiiData::Guest("undefined".to_string()),
        }
    }
}

/// Legacy profiles store booleans as the strings `"true"` / `"false"`.
pub(crate) fn de_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.eq_ignore_ascii_case("true"),
    })
}
