//! Overlay template model: the declarative per-template layout. Templates
//! are fully specified; a missing required field is a fatal template error
//! at load time, never a silent mid-render skip.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::profile::de_flag;
use crate::{Result, TagError, OVERLAYS_FOLDER};

/// Placement and typography of one text field.
#[derive(Debug, Clone, Deserialize)]
pub struct TextField {
    pub x: i64,
    pub y: i64,
    pub font_size: u32,
    pub font_style: String,
    pub font_color: String,
    #[serde(default)]
    pub font_family: Option<String>,
    /// When set, the template's family wins over the user's preference.
    #[serde(default, deserialize_with = "de_flag")]
    pub force_font: bool,
}

/// Placement of a square image layer. `size` scales the source; absent,
/// the image is drawn at its natural size.
#[derive(Debug, Clone, Deserialize)]
pub struct IconSpec {
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinIcon {
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub size: Option<u32>,
    /// Default coin icon name, used when the user has no preference.
    pub img: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFieldKind {
    Username,
    FriendCode,
    CoinCount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayTemplate {
    pub width: u32,
    pub height: u32,
    pub overlay_img: String,
    pub username: TextField,
    pub friend_code: TextField,
    pub coin_count: TextField,
    pub flag: IconSpec,
    pub coin_icon: CoinIcon,
    #[serde(default)]
    pub avatar: Option<IconSpec>,
    #[serde(default)]
    pub mii: Option<IconSpec>,
    pub cover_start_x: i64,
    pub cover_start_y: i64,
    pub cover_increment_x: i64,
    pub cover_increment_y: i64,
    pub max_covers: usize,
}

impl OverlayTemplate {
    pub fn from_json(json: &str) -> Result<Self> {
        let overlay: Self =
            serde_json::from_str(json).map_err(|e| TagError::Template(e.to_string()))?;
        overlay.validate()?;
        Ok(overlay)
    }

    /// Read `overlays/{name}` from the data folder.
    pub fn load(data_dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let path = data_dir.as_ref().join(OVERLAYS_FOLDER).join(name);
        let json = fs::read_to_string(&path)
            .map_err(|e| TagError::Template(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn text_field(&self, kind: TextFieldKind) -> &TextField {
        match kind {
            TextFieldKind::Username => &self.username,
            TextFieldKind::FriendCode => &self.friend_code,
            TextFieldKind::CoinCount => &self.coin_count,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TagError::Template(format!(
                "degenerate canvas {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const TEMPLATE: &str = r##"{
        "width": 1200,
        "height": 450,
        "overlay_img": "overlays/overlay1.png",
        "username": {
            "x": 60, "y": 20,
            "font_size": 60, "font_style": "normal", "font_color": "#ffffff",
            "font_family": "RodinNTLG"
        },
        "friend_code": {
            "x": 64, "y": 340,
            "font_size": 28, "font_style": "normal", "font_color": "#ffffff"
        },
        "coin_count": {
            "x": 944, "y": 340,
            "font_size": 28, "font_style": "normal", "font_color": "#ffffff",
            "force_font": "true", "font_family": "FOT-RodinBokutohPro"
        },
        "flag": { "x": 1030, "y": 30 },
        "coin_icon": { "x": 900, "y": 342, "img": "mario" },
        "avatar": { "x": 40, "y": 30, "size": 110 },
        "mii": { "x": 40, "y": 150, "size": 110 },
        "cover_start_x": 100,
        "cover_start_y": 84,
        "cover_increment_x": 180,
        "cover_increment_y": 0,
        "max_covers": 5
    }"##;

    #[test]
    fn parses_full_template() {
        let overlay = OverlayTemplate::from_json(TEMPLATE).unwrap();
        assert_eq!(overlay.width, 1200);
        assert_eq!(overlay.max_covers, 5);
        assert!(overlay.coin_count.force_font);
        assert!(!overlay.friend_code.force_font);
        assert_eq!(overlay.avatar.as_ref().unwrap().size, Some(110));
        assert_eq!(
            overlay.text_field(TextFieldKind::CoinCount).font_size,
            28
        );
    }

    #[test]
    fn missing_required_field_is_fatal() {
        // No friend_code record at all.
        let json = r##"{
            "width": 1200, "height": 450, "overlay_img": "o.png",
            "username": {
                "x": 0, "y": 0,
                "font_size": 10, "font_style": "normal", "font_color": "#000000"
            },
            "coin_count": {
                "x": 0, "y": 0,
                "font_size": 10, "font_style": "normal", "font_color": "#000000"
            },
            "flag": { "x": 0, "y": 0 },
            "coin_icon": { "x": 0, "y": 0, "img": "mario" },
            "cover_start_x": 0, "cover_start_y": 0,
            "cover_increment_x": 0, "cover_increment_y": 0,
            "max_covers": 1
        }"##;
        assert!(matches!(
            OverlayTemplate::from_json(json),
            Err(TagError::Template(_))
        ));
    }

    #[test]
    fn degenerate_canvas_rejected() {
        let json = TEMPLATE.replace("\"width\": 1200", "\"width\": 0");
        assert!(matches!(
            OverlayTemplate::from_json(&json),
            Err(TagError::Template(_))
        ));
    }
}
