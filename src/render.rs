//! The tag compositor. Executes the fixed draw pipeline over one user
//! profile and one overlay template, producing the full-size tag and its
//! one-third-scale thumbnail.
//!
//! The pipeline is strictly sequential: parse profile and template (the
//! only fatal failures), then background, overlay image, game covers,
//! flag, coin icon, the three text fields, and optionally avatar and Mii.
//! A layer whose asset is missing is logged and skipped; the render still
//! completes.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};

use crate::atomic::write_atomic;
use crate::cache::{encode_png, AssetCache, CoverKey};
use crate::fonts::{resolve_family, FontRegistry};
use crate::overlay::{IconSpec, OverlayTemplate, TextFieldKind};
use crate::profile::UserProfile;
use crate::resolve::{self, ConsoleType, CoverType};
use crate::titles::TitleIndex;
use crate::{Result, COINS_FOLDER, FLAGS_FOLDER, TAG_FOLDER};

/// Vertical grid adjustment per cover-type preference.
const COVER_START_SHIFT: i64 = 24;
const DISC_START_SHIFT: i64 = 88;
/// Handheld art is shorter; shift it down so rows stay aligned.
const BOX_ROW_SHIFT: i64 = 87;
const HANDHELD_COVER_ROW_SHIFT: i64 = 80;

/// Outcome of one render: both PNGs, already persisted to their
/// deterministic paths under `tag/`.
#[derive(Debug)]
pub struct RenderResult {
    pub user_id: String,
    pub full_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub full: Vec<u8>,
    pub thumbnail: Vec<u8>,
}

/// A cover that resolved and cached successfully, ready to draw.
#[derive(Debug, Clone)]
pub struct ResolvedCover {
    pub token: String,
    pub path: PathBuf,
    pub console: ConsoleType,
    pub cover: CoverType,
}

pub struct TagRenderer {
    data_dir: PathBuf,
    cache: AssetCache,
    titles: TitleIndex,
    fonts: FontRegistry,
}

impl TagRenderer {
    /// Build a renderer over a data folder, loading the title databases
    /// and font registry once. Reload happens on process restart only.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let titles = TitleIndex::load(&data_dir)?;
        let fonts = FontRegistry::load(&data_dir);
        let cache = AssetCache::new(&data_dir);
        Ok(Self {
            data_dir,
            cache,
            titles,
            fonts,
        })
    }

    /// Construct from pre-built collaborators (tests inject a stubbed
    /// cache here).
    pub fn with_parts(
        data_dir: impl Into<PathBuf>,
        cache: AssetCache,
        titles: TitleIndex,
        fonts: FontRegistry,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache,
            titles,
            fonts,
        }
    }

    /// Render from a raw profile JSON string. The returned future is the
    /// completion signal: it resolves exactly once, with the result or
    /// the fatal cause.
    pub async fn render(&self, profile_json: &str) -> Result<RenderResult> {
        let user = UserProfile::from_json(profile_json)?;
        self.render_profile(&user).await
    }

    /// Render the stored profile of `user_id`.
    pub async fn render_user(&self, user_id: &str) -> Result<RenderResult> {
        let user = UserProfile::load(&self.data_dir, user_id)?;
        self.render_profile(&user).await
    }

    pub async fn render_profile(&self, user: &UserProfile) -> Result<RenderResult> {
        let overlay = OverlayTemplate::load(&self.data_dir, &user.overlay)?;
        log::info!(
            "rendering tag for {} with template {} ({}x{})",
            user.id,
            user.overlay,
            overlay.width,
            overlay.height
        );

        let mut canvas = RgbaImage::new(overlay.width, overlay.height);

        // Background and overlay artwork.
        self.draw_layer(&mut canvas, &self.data_dir.join(&user.bg), 0, 0, None);
        self.draw_layer(
            &mut canvas,
            &self.data_dir.join(&overlay.overlay_img),
            0,
            0,
            None,
        );

        // Game covers.
        let covers = self.select_covers(user, overlay.max_covers).await;
        self.draw_covers(&mut canvas, &overlay, user, &covers);

        // Flag.
        if user.region.is_empty() {
            log::debug!("no region set for {}, skipping flag", user.id);
        } else {
            let path = self
                .data_dir
                .join(FLAGS_FOLDER)
                .join(format!("{}.png", user.region));
            self.draw_layer(
                &mut canvas,
                &path,
                overlay.flag.x,
                overlay.flag.y,
                overlay.flag.size.map(|s| (s, s)),
            );
        }

        // Coin icon.
        let coin = self.coin_icon_name(user, &overlay);
        let coin_path = self
            .data_dir
            .join(COINS_FOLDER)
            .join(format!("{coin}.png"));
        self.draw_layer(
            &mut canvas,
            &coin_path,
            overlay.coin_icon.x,
            overlay.coin_icon.y,
            overlay.coin_icon.size.map(|s| (s, s)),
        );

        // Text fields.
        self.draw_text_field(&mut canvas, &overlay, TextFieldKind::Username, user, &user.name);
        self.draw_text_field(
            &mut canvas,
            &overlay,
            TextFieldKind::FriendCode,
            user,
            &user.friend_code,
        );
        self.draw_text_field(
            &mut canvas,
            &overlay,
            TextFieldKind::CoinCount,
            user,
            &user.coins.to_string(),
        );

        // Avatar and Mii, both opt-in and template-gated.
        if user.useavatar {
            if let Some(spec) = &overlay.avatar {
                self.draw_avatar(&mut canvas, user, spec).await;
            }
        }
        if user.usemii {
            if let Some(spec) = &overlay.mii {
                self.draw_mii(&mut canvas, user, spec).await;
            }
        }

        self.finalize(user, &overlay, canvas)
    }

    /// Assemble the set of covers to draw.
    ///
    /// The most-recent `max` tokens are tried first and enter the draw
    /// list in walk order; unresolvable ones leave gaps that older tokens
    /// backfill at the front of the list, until the list is full or the
    /// history is exhausted. Operates on an immutable view of the games
    /// list, so repeated calls agree.
    pub async fn select_covers(&self, user: &UserProfile, max: usize) -> Vec<ResolvedCover> {
        if !user.covers_enabled() || max == 0 {
            return Vec::new();
        }

        let mut picked: Vec<ResolvedCover> = Vec::new();

        for token in user.games.iter().take(max) {
            if token.is_empty() {
                continue;
            }
            match self.resolve_cover(user, token).await {
                Ok(cover) => picked.push(cover),
                Err(e) => log::debug!("cover unavailable for {token}: {e}"),
            }
        }

        for token in user.games.iter().skip(max) {
            if picked.len() >= max {
                break;
            }
            if token.is_empty() || picked.iter().any(|c| c.token == *token) {
                continue;
            }
            match self.resolve_cover(user, token).await {
                Ok(cover) => picked.insert(0, cover),
                Err(e) => log::debug!("cover unavailable for {token}: {e}"),
            }
        }

        picked
    }

    /// Resolve one token to a cached cover file: console dispatch, title
    /// ID mapping for WiiU/3DS, region and extension lookup, then the
    /// cache's fetch-with-fallback.
    async fn resolve_cover(&self, user: &UserProfile, token: &str) -> Result<ResolvedCover> {
        let console = resolve::console_type(token);
        let cover = resolve::cover_type(console, user.covertype.as_deref());
        let raw_id = resolve::strip_console_prefix(token);

        let game_id = match console {
            ConsoleType::WiiU if is_title_id(raw_id) => {
                self.titles.resolve_wiiu(raw_id, &user.cover_region())?
            }
            ConsoleType::ThreeDs if is_title_id(raw_id) => {
                self.titles.resolve_citra(raw_id, &user.cover_region())?
            }
            _ => raw_id.to_string(),
        };

        let region = resolve::game_region(&game_id, user.coverregion.as_deref());
        let extension = resolve::extension(cover, console);
        let key = CoverKey {
            console,
            cover,
            game_id,
            region,
        };
        let path = self.cache.ensure_cover(&key, extension).await?;
        Ok(ResolvedCover {
            token: token.to_string(),
            path,
            console,
            cover,
        })
    }

    fn draw_covers(
        &self,
        canvas: &mut RgbaImage,
        overlay: &OverlayTemplate,
        user: &UserProfile,
        covers: &[ResolvedCover],
    ) {
        // The grid origin shifts with the user's preferred cover type so
        // different art heights share a baseline.
        let pref = resolve::cover_type(ConsoleType::Wii, user.covertype.as_deref());
        let mut x = overlay.cover_start_x;
        let mut y = overlay.cover_start_y
            + match pref {
                CoverType::Cover => COVER_START_SHIFT,
                CoverType::Disc => DISC_START_SHIFT,
                _ => 0,
            };

        for cover in covers {
            let row_shift = if cover.console.is_handheld() {
                match cover.cover {
                    CoverType::Box => BOX_ROW_SHIFT,
                    CoverType::Cover => HANDHELD_COVER_ROW_SHIFT,
                    _ => 0,
                }
            } else {
                0
            };
            self.draw_layer(canvas, &cover.path, x, y + row_shift, None);
            x += overlay.cover_increment_x;
            y += overlay.cover_increment_y;
        }
    }

    fn coin_icon_name<'a>(&self, user: &'a UserProfile, overlay: &'a OverlayTemplate) -> &'a str {
        match user.coin.as_deref() {
            Some("default") | None => &overlay.coin_icon.img,
            Some(name) => name,
        }
    }

    async fn draw_avatar(&self, canvas: &mut RgbaImage, user: &UserProfile, spec: &IconSpec) {
        let avatar_ref = match user.avatar.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => {
                log::debug!("avatar enabled for {} but no avatar ref", user.id);
                return;
            }
        };
        match self.cache.ensure_avatar(&user.id, avatar_ref).await {
            Ok(path) => {
                self.draw_layer(canvas, &path, spec.x, spec.y, spec.size.map(|s| (s, s)))
            }
            Err(e) => log::warn!("avatar layer skipped for {}: {}", user.id, e),
        }
    }

    async fn draw_mii(&self, canvas: &mut RgbaImage, user: &UserProfile, spec: &IconSpec) {
        let path = self.cache.ensure_mii(user).await;
        let size = spec.size.map(|s| (s, s));
        if image::open(&path).is_ok() {
            self.draw_layer(canvas, &path, spec.x, spec.y, size);
        } else {
            // Last resort: the undefined-guest placeholder.
            let fallback = self.cache.guest_mii_path("undefined");
            self.draw_layer(canvas, &fallback, spec.x, spec.y, size);
        }
    }

    /// Draw one image layer. A missing or undecodable asset skips the
    /// layer; it never aborts the render.
    fn draw_layer(
        &self,
        canvas: &mut RgbaImage,
        path: &Path,
        x: i64,
        y: i64,
        size: Option<(u32, u32)>,
    ) {
        let image = match image::open(path) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("skipping layer {}: {}", path.display(), e);
                return;
            }
        };
        let image = match size {
            Some((w, h)) => image.resize_exact(w, h, FilterType::Triangle),
            None => image,
        };
        imageops::overlay(canvas, &image.to_rgba8(), x, y);
    }

    fn draw_text_field(
        &self,
        canvas: &mut RgbaImage,
        overlay: &OverlayTemplate,
        kind: TextFieldKind,
        user: &UserProfile,
        text: &str,
    ) {
        let field = overlay.text_field(kind);
        let family = resolve_family(field, user.font.as_deref());
        let font = match self.fonts.font_for(family, &field.font_style) {
            Some(font) => font,
            None => {
                log::warn!("no usable font for family {family}, skipping {kind:?} text");
                return;
            }
        };
        let color = parse_color(&field.font_color).unwrap_or_else(|| {
            log::warn!("bad font color {:?}, using white", field.font_color);
            Rgba([255, 255, 255, 255])
        });
        draw_text(
            canvas,
            font,
            field.font_size as f32,
            color,
            text,
            field.x,
            field.y,
        );
    }

    fn finalize(
        &self,
        user: &UserProfile,
        overlay: &OverlayTemplate,
        canvas: RgbaImage,
    ) -> Result<RenderResult> {
        let thumbnail = imageops::resize(
            &canvas,
            overlay.width / 3,
            overlay.height / 3,
            FilterType::Triangle,
        );

        let full = encode_png(&DynamicImage::ImageRgba8(canvas))?;
        let thumb = encode_png(&DynamicImage::ImageRgba8(thumbnail))?;

        let tag_dir = self.data_dir.join(TAG_FOLDER);
        let full_path = tag_dir.join(format!("{}.max.png", user.id));
        let thumbnail_path = tag_dir.join(format!("{}.png", user.id));
        write_atomic(&full_path, &full)?;
        write_atomic(&thumbnail_path, &thumb)?;

        log::info!("tag for {} written to {}", user.id, tag_dir.display());
        Ok(RenderResult {
            user_id: user.id.clone(),
            full_path,
            thumbnail_path,
            full,
            thumbnail: thumb,
        })
    }
}

/// 16-digit internal console title IDs need mapping before they address
/// the art endpoints.
fn is_title_id(id: &str) -> bool {
    id.len() == 16 && id.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_color(spec: &str) -> Option<Rgba<u8>> {
    let hex = spec.trim().strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgba([r, g, b, 255]))
}

/// Rasterize a line of text. The origin matches the reference layout:
/// both axes are offset by the font size, with the baseline at `y + px`.
fn draw_text(
    canvas: &mut RgbaImage,
    font: &Font<'static>,
    px: f32,
    color: Rgba<u8>,
    text: &str,
    x: i64,
    y: i64,
) {
    let scale = Scale::uniform(px);
    let origin = point(x as f32 + px, y as f32 + px);

    for glyph in font.layout(text, scale, origin) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let cx = gx as i64 + bb.min.x as i64;
                let cy = gy as i64 + bb.min.y as i64;
                if cx < 0 || cy < 0 || cx >= canvas.width() as i64 || cy >= canvas.height() as i64
                {
                    return;
                }
                let alpha = (coverage * 255.0) as u16;
                if alpha == 0 {
                    return;
                }
                let pixel = canvas.get_pixel_mut(cx as u32, cy as u32);
                for channel in 0..3 {
                    let src = color.0[channel] as u16;
                    let dst = pixel.0[channel] as u16;
                    pixel.0[channel] = ((src * alpha + dst * (255 - alpha)) / 255) as u8;
                }
                pixel.0[3] = 255;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_parsing() {
        assert_eq!(parse_color("#ffffff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_color("#102030"), Some(Rgba([16, 32, 48, 255])));
        assert_eq!(parse_color("ffffff"), None);
        assert_eq!(parse_color("#fff"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
    }

    #[test]
    fn title_id_shape() {
        assert!(is_title_id("0005000010101010"));
        assert!(is_title_id("00040000000EDF00"));
        assert!(!is_title_id("RMCP"));
        assert!(!is_title_id("000500001010101"));
        assert!(!is_title_id("000500001010101Z"));
    }
}
