//! Pure lookup functions mapping a played-game token to its canonical
//! cover-art coordinates: console family, cover type, region code, file
//! extension and pixel dimensions.
//!
//! All lookups are total. Unknown input resolves to a documented default,
//! never to an error.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleType {
    Wii,
    WiiU,
    Ds,
    ThreeDs,
}

impl ConsoleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleType::Wii => "wii",
            ConsoleType::WiiU => "wiiu",
            ConsoleType::Ds => "ds",
            ConsoleType::ThreeDs => "3ds",
        }
    }

    pub fn is_handheld(&self) -> bool {
        matches!(self, ConsoleType::Ds | ConsoleType::ThreeDs)
    }
}

impl fmt::Display for ConsoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoverType {
    Cover,
    Cover3D,
    Disc,
    Box,
}

impl CoverType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverType::Cover => "cover",
            CoverType::Cover3D => "cover3D",
            CoverType::Disc => "disc",
            CoverType::Box => "box",
        }
    }

    /// Parse a user preference string. Unknown values yield `None` so the
    /// caller falls back to the default.
    pub fn from_pref(pref: &str) -> Option<CoverType> {
        match pref {
            "cover" => Some(CoverType::Cover),
            "cover3D" => Some(CoverType::Cover3D),
            "disc" => Some(CoverType::Disc),
            "box" => Some(CoverType::Box),
            _ => None,
        }
    }
}

impl fmt::Display for CoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Console family of a played-game token. Prefixed tokens dispatch
/// directly; bare IDs are inferred from the first character.
pub fn console_type(token: &str) -> ConsoleType {
    if token.starts_with("wii-") {
        return ConsoleType::Wii;
    }
    if token.starts_with("wiiu-") {
        return ConsoleType::WiiU;
    }
    if token.starts_with("ds-") {
        return ConsoleType::Ds;
    }
    if token.starts_with("3ds-") {
        return ConsoleType::ThreeDs;
    }
    match token.chars().next() {
        Some('R') | Some('S') => ConsoleType::Wii,
        Some('A') | Some('B') => ConsoleType::WiiU,
        _ => ConsoleType::Wii,
    }
}

/// Strip the console prefix off a token, leaving the raw game id.
pub fn strip_console_prefix(token: &str) -> &str {
    for prefix in ["wii-", "wiiu-", "ds-", "3ds-"] {
        if let Some(rest) = token.strip_prefix(prefix) {
            return rest;
        }
    }
    token
}

/// Handhelds only have box art; everything else honors the user's
/// preference, defaulting to 3D covers.
pub fn cover_type(console: ConsoleType, user_pref: Option<&str>) -> CoverType {
    if console.is_handheld() {
        return CoverType::Box;
    }
    user_pref
        .and_then(CoverType::from_pref)
        .unwrap_or(CoverType::Cover3D)
}

/// Region code for the art endpoint, selected by the 4th character of the
/// game id. PAL games honor the user's 2-letter cover-region override.
pub fn game_region(game_id: &str, cover_region: Option<&str>) -> String {
    match game_id.chars().nth(3) {
        Some('P') => cover_region
            .map(|r| r.to_uppercase())
            .filter(|r| r.len() == 2)
            .unwrap_or_else(|| "EN".to_string()),
        Some('E') => "US".to_string(),
        Some('J') => "JA".to_string(),
        Some('K') => "KO".to_string(),
        Some('W') => "TW".to_string(),
        _ => "EN".to_string(),
    }
}

/// GameTDB serves Wii art as PNG; for other consoles only the flat
/// `cover` type is JPEG.
pub fn extension(cover: CoverType, console: ConsoleType) -> &'static str {
    if console == ConsoleType::Wii {
        return "png";
    }
    if cover == CoverType::Cover {
        return "jpg";
    }
    "png"
}

pub fn cover_width(cover: CoverType) -> u32 {
    match cover {
        CoverType::Cover => 160,
        CoverType::Cover3D => 176,
        CoverType::Disc => 160,
        CoverType::Box => 176,
    }
}

pub fn cover_height(cover: CoverType, console: ConsoleType) -> u32 {
    match cover {
        CoverType::Cover => {
            if console.is_handheld() {
                144
            } else {
                224
            }
        }
        CoverType::Cover3D => 248,
        CoverType::Disc => 160,
        CoverType::Box => 158,
    }
}
