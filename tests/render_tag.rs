//! End-to-end render tests over a temporary data folder and a local
//! cover-art stub, so no test touches the network.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempdir::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use wiitag::cache::{AssetCache, CoverKey};
use wiitag::fonts::FontRegistry;
use wiitag::render::TagRenderer;
use wiitag::resolve::{ConsoleType, CoverType};
use wiitag::titles::TitleIndex;
use wiitag::{TagError, UserProfile, OVERLAYS_FOLDER};

const TEMPLATE: &str = r##"{
    "width": 300,
    "height": 120,
    "overlay_img": "overlays/plain.png",
    "username": {
        "x": 10, "y": 5,
        "font_size": 18, "font_style": "normal", "font_color": "#ffffff"
    },
    "friend_code": {
        "x": 10, "y": 80,
        "font_size": 10, "font_style": "normal", "font_color": "#ffffff"
    },
    "coin_count": {
        "x": 240, "y": 80,
        "font_size": 10, "font_style": "normal", "font_color": "#ffffff"
    },
    "flag": { "x": 260, "y": 8, "size": 24 },
    "coin_icon": { "x": 220, "y": 82, "size": 12, "img": "mario" },
    "mii": { "x": 250, "y": 60, "size": 40 },
    "cover_start_x": 20,
    "cover_start_y": 30,
    "cover_increment_x": 50,
    "cover_increment_y": 0,
    "max_covers": 3
}"##;

fn profile_json(games: &[&str]) -> String {
    let games = games
        .iter()
        .map(|g| format!("\"{g}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        r#"{{
            "name": "tester",
            "id": "42",
            "games": [{games}],
            "coins": 3,
            "friend_code": "0000 0000 0000 0000",
            "region": "EN",
            "overlay": "plain.json",
            "bg": "bg.png",
            "sort": "",
            "font": "default"
        }}"#
    )
}

fn tiny_png(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(
            &mut std::io::Cursor::new(&mut out),
            image::ImageOutputFormat::Png,
        )
        .unwrap();
    out
}

/// Seed the data folder with everything a render reads locally.
fn seed_data_dir(root: &Path) {
    fs::create_dir_all(root.join(OVERLAYS_FOLDER)).unwrap();
    fs::create_dir_all(root.join("flags")).unwrap();
    fs::create_dir_all(root.join("img/coin")).unwrap();
    fs::write(root.join(OVERLAYS_FOLDER).join("plain.json"), TEMPLATE).unwrap();
    fs::write(root.join("bg.png"), tiny_png(300, 120, [10, 20, 30, 255])).unwrap();
    fs::write(
        root.join(OVERLAYS_FOLDER).join("plain.png"),
        tiny_png(300, 120, [0, 0, 0, 40]),
    )
    .unwrap();
    fs::write(root.join("flags/EN.png"), tiny_png(24, 24, [200, 0, 0, 255])).unwrap();
    fs::write(
        root.join("img/coin/mario.png"),
        tiny_png(12, 12, [240, 200, 0, 255]),
    )
    .unwrap();
}

/// Minimal HTTP stub: serves the given path map, 404 for everything else,
/// counting every request it sees.
async fn spawn_art_stub(
    routes: HashMap<String, Vec<u8>>,
    hits: Arc<AtomicUsize>,
) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let routes = Arc::new(routes);
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            let hits = hits.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    match socket.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            buf.extend_from_slice(&chunk[..n]);
                            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                                break;
                            }
                        }
                        Err(_) => return,
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                hits.fetch_add(1, Ordering::SeqCst);
                let response = match routes.get(&path) {
                    Some(body) => {
                        let mut r = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\n\
                             Content-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        )
                        .into_bytes();
                        r.extend_from_slice(body);
                        r
                    }
                    None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\
                              Connection: close\r\n\r\n"
                        .to_vec(),
                };
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

fn renderer_with_stub(root: &Path, addr: SocketAddr) -> TagRenderer {
    let cache = AssetCache::new(root)
        .with_art_base(Url::parse(&format!("http://{addr}/")).unwrap());
    TagRenderer::with_parts(root, cache, TitleIndex::empty(), FontRegistry::empty())
}

#[tokio::test]
async fn renders_full_and_third_scale_thumbnail() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());

    let hits = Arc::new(AtomicUsize::new(0));
    let mut routes = HashMap::new();
    routes.insert(
        "/wii/cover3D/EN/RMCP.png".to_string(),
        tiny_png(176, 248, [0, 120, 0, 255]),
    );
    let addr = spawn_art_stub(routes, hits).await;

    let renderer = renderer_with_stub(dir.path(), addr);
    let result = renderer
        .render(&profile_json(&["wii-RMCP"]))
        .await
        .unwrap();

    let full = image::open(&result.full_path).unwrap();
    let thumb = image::open(&result.thumbnail_path).unwrap();
    assert_eq!((full.width(), full.height()), (300, 120));
    assert_eq!((thumb.width(), thumb.height()), (100, 40));

    // The in-memory streams match what was persisted.
    assert_eq!(result.full, fs::read(&result.full_path).unwrap());
    assert_eq!(result.thumbnail, fs::read(&result.thumbnail_path).unwrap());
}

#[tokio::test]
async fn thumbnail_dimensions_floor_divide() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());
    // 301x121 is not divisible by 3.
    let template = TEMPLATE
        .replace("\"width\": 300", "\"width\": 301")
        .replace("\"height\": 120", "\"height\": 121");
    fs::write(
        dir.path().join(OVERLAYS_FOLDER).join("plain.json"),
        template,
    )
    .unwrap();

    let addr = spawn_art_stub(HashMap::new(), Arc::new(AtomicUsize::new(0))).await;
    let renderer = renderer_with_stub(dir.path(), addr);
    let result = renderer.render(&profile_json(&[])).await.unwrap();

    let thumb = image::open(&result.thumbnail_path).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (100, 40));
}

#[tokio::test]
async fn malformed_profile_is_fatal_and_writes_nothing() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());
    let addr = spawn_art_stub(HashMap::new(), Arc::new(AtomicUsize::new(0))).await;
    let renderer = renderer_with_stub(dir.path(), addr);

    let err = renderer.render("{definitely not json").await.unwrap_err();
    assert!(matches!(err, TagError::Profile(_)));
    assert!(!dir.path().join("tag").exists());
}

#[tokio::test]
async fn missing_template_field_is_fatal() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());
    // Strip the flag record out of the template.
    let broken = TEMPLATE.replace(r#""flag": { "x": 260, "y": 8, "size": 24 },"#, "");
    fs::write(dir.path().join(OVERLAYS_FOLDER).join("plain.json"), broken).unwrap();

    let addr = spawn_art_stub(HashMap::new(), Arc::new(AtomicUsize::new(0))).await;
    let renderer = renderer_with_stub(dir.path(), addr);
    let err = renderer.render(&profile_json(&[])).await.unwrap_err();
    assert!(matches!(err, TagError::Template(_)));
    assert!(!dir.path().join("tag").exists());
}

#[tokio::test]
async fn cover_gaps_are_backfilled_by_older_games() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());

    let mut routes = HashMap::new();
    for id in ["AAAA", "CCCC", "DDDD"] {
        routes.insert(
            format!("/wii/cover3D/EN/{id}.png"),
            tiny_png(176, 248, [0, 0, 200, 255]),
        );
    }
    // BBBB has no cover anywhere.
    let addr = spawn_art_stub(routes, Arc::new(AtomicUsize::new(0))).await;
    let renderer = renderer_with_stub(dir.path(), addr);

    let user = UserProfile::from_json(&profile_json(&[
        "wii-AAAA", "wii-BBBB", "wii-CCCC", "wii-DDDD",
    ]))
    .unwrap();
    let covers = renderer.select_covers(&user, 3).await;

    let tokens: Vec<&str> = covers.iter().map(|c| c.token.as_str()).collect();
    assert_eq!(tokens, vec!["wii-DDDD", "wii-AAAA", "wii-CCCC"]);
}

#[tokio::test]
async fn sort_none_draws_no_covers() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_art_stub(HashMap::new(), hits.clone()).await;
    let renderer = renderer_with_stub(dir.path(), addr);

    let mut user = UserProfile::from_json(&profile_json(&["wii-RMCP"])).unwrap();
    user.sort = "none".to_string();
    let covers = renderer.select_covers(&user, 3).await;
    assert!(covers.is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn guest_mii_draws_from_static_assets() {
    let dir = TempDir::new("wiitag_render").unwrap();
    seed_data_dir(dir.path());
    fs::create_dir_all(dir.path().join("miis/guests")).unwrap();
    fs::write(
        dir.path().join("miis/guests/b.png"),
        tiny_png(512, 512, [90, 90, 90, 255]),
    )
    .unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_art_stub(HashMap::new(), hits.clone()).await;
    let renderer = renderer_with_stub(dir.path(), addr);

    let json = profile_json(&[]).replace(
        "\"sort\": \"\",",
        "\"sort\": \"\", \"usemii\": \"true\", \"mii_data\": \"b\",",
    );
    let result = renderer.render(&json).await.unwrap();
    assert!(result.full_path.exists());
    // Guest Miis never hit the render services.
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cover_fetch_is_idempotent() {
    let dir = TempDir::new("wiitag_cache").unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let mut routes = HashMap::new();
    routes.insert(
        "/wii/cover3D/EN/RMCP.png".to_string(),
        tiny_png(176, 248, [0, 120, 0, 255]),
    );
    let addr = spawn_art_stub(routes, hits.clone()).await;

    let cache = AssetCache::new(dir.path())
        .with_art_base(Url::parse(&format!("http://{addr}/")).unwrap());
    let key = CoverKey {
        console: ConsoleType::Wii,
        cover: CoverType::Cover3D,
        game_id: "RMCP".to_string(),
        region: "EN".to_string(),
    };

    let first = cache.ensure_cover(&key, "png").await.unwrap();
    let second = cache.ensure_cover(&key, "png").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The cached file was re-encoded to the exact cover dimensions.
    let cover = image::open(&first).unwrap();
    assert_eq!((cover.width(), cover.height()), (176, 248));
}

#[tokio::test]
async fn cover_falls_back_to_en_and_caches_under_en_key() {
    let dir = TempDir::new("wiitag_cache").unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let mut routes = HashMap::new();
    // Only the EN cover exists; the requested FR region 404s.
    routes.insert(
        "/wii/cover3D/EN/RMCP.png".to_string(),
        tiny_png(176, 248, [0, 120, 0, 255]),
    );
    let addr = spawn_art_stub(routes, hits).await;

    let cache = AssetCache::new(dir.path())
        .with_art_base(Url::parse(&format!("http://{addr}/")).unwrap());
    let key = CoverKey {
        console: ConsoleType::Wii,
        cover: CoverType::Cover3D,
        game_id: "RMCP".to_string(),
        region: "FR".to_string(),
    };

    let path = cache.ensure_cover(&key, "png").await.unwrap();
    assert!(path.to_string_lossy().ends_with("wii-cover3D-RMCP-EN.png"));
    assert!(!dir
        .path()
        .join("cache")
        .join("wii-cover3D-RMCP-FR.png")
        .exists());
}
