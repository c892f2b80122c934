use std::sync::Once;
use std::time::Duration;

pub mod errors;
pub use errors::{Result, TagError};

pub mod atomic;
pub mod cache;
pub mod fonts;
pub mod overlay;
pub mod profile;
pub mod render;
pub mod resolve;
pub mod titles;

pub use cache::{AssetCache, CoverKey};
pub use overlay::OverlayTemplate;
pub use profile::{MiiData, UserProfile};
pub use render::{RenderResult, TagRenderer};

/// Layout of the data folder, shared with the (out-of-scope) web layer.
pub const USERS_FOLDER: &str = "users";
pub const OVERLAYS_FOLDER: &str = "overlays";
pub const CACHE_FOLDER: &str = "cache";
pub const AVATARS_FOLDER: &str = "avatars";
pub const MIIS_FOLDER: &str = "miis";
pub const GUESTS_FOLDER: &str = "guests";
pub const TAG_FOLDER: &str = "tag";
pub const FLAGS_FOLDER: &str = "flags";
pub const COINS_FOLDER: &str = "img/coin";
pub const FONTS_FOLDER: &str = "fonts";
pub const FONT_FILES_FOLDER: &str = "fontfiles";
pub const IDS_FOLDER: &str = "ids";

pub const DEFAULT_FONT_FAMILY: &str = "RodinNTLG";

/// Upper bound for a single remote fetch attempt. Exceeding it fails the
/// attempt and advances the fallback chain.
pub const FETCH_TIMEOUT: Duration = Duration::from_millis(7500);

pub static INIT: Once = Once::new();

pub fn initialize() {
    INIT.call_once(|| {
        env_logger::init();
    });
}
