//! Content-addressed on-disk cache for remote art: game covers (with
//! regional fallback), user avatars and Mii renders. Covers and Miis never
//! expire; avatars are refreshed on every render. Writes go through the atomic
//! staging in [`crate::atomic`], so concurrent renders can share the cache
//! and a crashed write never satisfies the exists check.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use reqwest::Client;
use url::Url;

use crate::atomic::write_atomic;
use crate::profile::{MiiData, UserProfile};
use crate::resolve::{cover_height, cover_width, ConsoleType, CoverType};
use crate::{
    Result, TagError, AVATARS_FOLDER, CACHE_FOLDER, FETCH_TIMEOUT, GUESTS_FOLDER,
    MIIS_FOLDER,
};

static ART_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("https://art.gametdb.com/").unwrap());
static AVATAR_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("https://cdn.discordapp.com/avatars/").unwrap());
static MII_RENDER_BASE: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://miicontestp.wii.rc24.xyz/cgi-bin/render.cgi").unwrap()
});
static MII_STUDIO_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("https://studio.mii.nintendo.com/miis/image.png").unwrap());

const AVATAR_SIZE: u32 = 512;
const MII_SIZE: u32 = 512;

/// Cache key for one cover: `(console, cover type, game id, region)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoverKey {
    pub console: ConsoleType,
    pub cover: CoverType,
    pub game_id: String,
    pub region: String,
}

impl CoverKey {
    pub fn filename(&self) -> String {
        format!(
            "{}-{}-{}-{}.png",
            self.console, self.cover, self.game_id, self.region
        )
    }

    fn filename_for(&self, region: &str) -> String {
        format!(
            "{}-{}-{}-{}.png",
            self.console, self.cover, self.game_id, region
        )
    }
}

pub struct AssetCache {
    data_dir: PathBuf,
    client: Client,
    art_base: Url,
    avatar_base: Url,
    mii_render_base: Url,
    mii_studio_base: Url,
}

impl AssetCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            client: Client::new(),
            art_base: ART_BASE.clone(),
            avatar_base: AVATAR_BASE.clone(),
            mii_render_base: MII_RENDER_BASE.clone(),
            mii_studio_base: MII_STUDIO_BASE.clone(),
        }
    }

    /// Point the cover-art endpoint somewhere else (tests use a local stub).
    pub fn with_art_base(mut self, base: Url) -> Self {
        self.art_base = base;
        self
    }

    pub fn with_avatar_base(mut self, base: Url) -> Self {
        self.avatar_base = base;
        self
    }

    pub fn with_mii_bases(mut self, render: Url, studio: Url) -> Self {
        self.mii_render_base = render;
        self.mii_studio_base = studio;
        self
    }

    pub fn cover_path(&self, key: &CoverKey) -> PathBuf {
        self.data_dir.join(CACHE_FOLDER).join(key.filename())
    }

    fn cover_path_for(&self, key: &CoverKey, region: &str) -> PathBuf {
        self.data_dir
            .join(CACHE_FOLDER)
            .join(key.filename_for(region))
    }

    pub fn avatar_path(&self, user_id: &str) -> PathBuf {
        self.data_dir
            .join(AVATARS_FOLDER)
            .join(format!("{user_id}.png"))
    }

    pub fn mii_path(&self, user_id: &str) -> PathBuf {
        self.data_dir
            .join(MIIS_FOLDER)
            .join(format!("{user_id}.png"))
    }

    pub fn guest_mii_path(&self, name: &str) -> PathBuf {
        self.data_dir
            .join(MIIS_FOLDER)
            .join(GUESTS_FOLDER)
            .join(format!("{name}.png"))
    }

    /// Regions to try for a key: the requested region, then `EN`, then
    /// `US`, without repeats.
    fn fallback_chain(region: &str) -> Vec<String> {
        let mut chain = vec![region.to_string()];
        for fallback in ["EN", "US"] {
            if !chain.iter().any(|r| r == fallback) {
                chain.push(fallback.to_string());
            }
        }
        chain
    }

    /// Resolve a cover to a cached file, fetching on a miss. A cover
    /// already published under any region of the fallback chain is a hit;
    /// otherwise each region is fetched in turn, each attempt bounded by
    /// [`FETCH_TIMEOUT`]. All attempts failing is a cache miss, reported
    /// as an error the caller treats as "layer absent".
    pub async fn ensure_cover(&self, key: &CoverKey, extension: &str) -> Result<PathBuf> {
        let chain = Self::fallback_chain(&key.region);

        for region in &chain {
            let path = self.cover_path_for(key, region);
            if path.exists() {
                log::trace!("cover cache hit: {}", path.display());
                return Ok(path);
            }
        }

        for region in &chain {
            match self.download_cover(key, region, extension).await {
                Ok(path) => return Ok(path),
                Err(e) => log::debug!(
                    "cover fetch {}/{} ({}) failed: {}",
                    key.game_id,
                    region,
                    key.cover,
                    e
                ),
            }
        }

        Err(TagError::Fetch(format!(
            "no cover available for {}-{}",
            key.console, key.game_id
        )))
    }

    async fn download_cover(
        &self,
        key: &CoverKey,
        region: &str,
        extension: &str,
    ) -> Result<PathBuf> {
        let url = self
            .art_base
            .join(&format!(
                "{}/{}/{}/{}.{}",
                key.console, key.cover, region, key.game_id, extension
            ))
            .map_err(|e| TagError::Fetch(e.to_string()))?;

        let bytes = self.fetch_bytes(url).await?;
        let image = image::load_from_memory(&bytes)?;
        let (w, h) = (cover_width(key.cover), cover_height(key.cover, key.console));
        let image = image.resize_exact(w, h, image::imageops::FilterType::Triangle);

        let path = self.cover_path_for(key, region);
        write_atomic(&path, &encode_png(&image)?)?;
        Ok(path)
    }

    /// Fetch the user's avatar from the CDN and cache it under the user
    /// id. The avatar is re-fetched on every render so edits propagate; a
    /// failed fetch falls back to the previously cached copy if any.
    pub async fn ensure_avatar(&self, user_id: &str, avatar_ref: &str) -> Result<PathBuf> {
        let path = self.avatar_path(user_id);
        let mut url = self
            .avatar_base
            .join(&format!("{user_id}/{avatar_ref}.png"))
            .map_err(|e| TagError::Fetch(e.to_string()))?;
        url.set_query(Some(&format!("size={AVATAR_SIZE}")));

        match self.fetch_square(url, AVATAR_SIZE).await {
            Ok(png) => {
                write_atomic(&path, &png)?;
                Ok(path)
            }
            Err(e) if path.exists() => {
                log::warn!("avatar fetch for {user_id} failed ({e}), using cached copy");
                Ok(path)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve the profile's Mii to an image path. Guests come straight
    /// from the static asset set; remote renders are cached under the user
    /// id; any failure substitutes the undefined-guest placeholder.
    pub async fn ensure_mii(&self, user: &UserProfile) -> PathBuf {
        let url = match user.mii() {
            MiiData::Guest(name) => return self.guest_mii_path(&name),
            MiiData::HexBlob(hex) => {
                let mut url = self.mii_render_base.clone();
                url.set_query(Some(&format!("data={hex}")));
                url
            }
            MiiData::StudioCode(code) => {
                let mut url = self.mii_studio_base.clone();
                url.set_query(Some(&format!(
                    "data={code}&type=face&width={MII_SIZE}&bgColor=FFFFFF00"
                )));
                url
            }
            MiiData::EntryNumber(n) => {
                let mut url = self.mii_render_base.clone();
                url.set_query(Some(&format!("entryno={n}")));
                url
            }
        };

        let path = self.mii_path(&user.id);
        if path.exists() {
            return path;
        }

        match self.fetch_square(url, MII_SIZE).await {
            Ok(png) => match write_atomic(&path, &png) {
                Ok(()) => path,
                Err(e) => {
                    log::warn!("caching Mii for {} failed: {}", user.id, e);
                    self.guest_mii_path("undefined")
                }
            },
            Err(e) => {
                log::warn!(
                    "couldn't render Mii for {}, falling back to undefined: {}",
                    user.id,
                    e
                );
                self.guest_mii_path("undefined")
            }
        }
    }

    /// Fetch and decode an image, scaled to `size`x`size`, re-encoded PNG.
    async fn fetch_square(&self, url: Url, size: u32) -> Result<Vec<u8>> {
        let bytes = self.fetch_bytes(url).await?;
        let image = image::load_from_memory(&bytes)?.resize_exact(
            size,
            size,
            image::imageops::FilterType::Triangle,
        );
        encode_png(&image)
    }

    async fn fetch_bytes(&self, url: Url) -> Result<Vec<u8>> {
        log::debug!("fetching {url}");
        let response = tokio::time::timeout(FETCH_TIMEOUT, self.client.get(url.clone()).send())
            .await
            .map_err(|_| TagError::Timeout(url.to_string()))??;
        let response = response.error_for_status()?;
        let bytes = tokio::time::timeout(FETCH_TIMEOUT, response.bytes())
            .await
            .map_err(|_| TagError::Timeout(url.to_string()))??;
        Ok(bytes.to_vec())
    }
}

pub(crate) fn encode_png(image: &image::DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    image.write_to(
        &mut std::io::Cursor::new(&mut out),
        image::ImageOutputFormat::Png,
    )?;
    Ok(out)
}
