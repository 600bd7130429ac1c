use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use rspotify::model::{PlayableItem, PlaylistId, PlaylistItem};
use rspotify::prelude::*;
use rspotify::{scopes, AuthCodeSpotify, ClientCredsSpotify, Config, Credentials, OAuth};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const PAGE_SIZE: u32 = 100;

static PLAYLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:https?://open\.spotify\.com/(?:intl-[A-Za-z-]+/)?playlist/|spotify:playlist:)([A-Za-z0-9]+)",
    )
    .expect("valid regex")
});

/// One row of a playlist, reduced to what the exporter needs
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistEntry {
    Track { name: String, artists: Vec<String> },
    /// Podcast episodes are not exported
    Episode,
    /// Removed or unavailable items come back without a track
    Missing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistPage {
    pub entries: Vec<PlaylistEntry>,
    pub has_next: bool,
}

/// Anything that can list a playlist a page at a time.
#[async_trait]
pub trait PlaylistSource {
    async fn page(&self, playlist_id: &str, offset: u32, limit: u32) -> Result<PlaylistPage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Pull the playlist id out of an `open.spotify.com` link or a `spotify:playlist:` URI.
pub fn extract_playlist_id(url_or_uri: &str) -> Result<String> {
    PLAYLIST_RE
        .captures(url_or_uri.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .with_context(|| format!("Not a Spotify playlist link or URI: {}", url_or_uri))
}

/// `"{name} — {artist, artist}"`, or `None` for anything that is not a usable track.
pub fn format_track_line(entry: &PlaylistEntry) -> Option<String> {
    let PlaylistEntry::Track { name, artists } = entry else {
        return None;
    };
    let name = name.trim();
    let artists: Vec<&str> = artists
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if name.is_empty() || artists.is_empty() {
        return None;
    }
    Some(format!("{} — {}", name, artists.join(", ")))
}

/// Walk every page of the playlist and format its tracks.
/// Returns the lines plus how many entries were skipped.
pub async fn collect_track_lines<S>(source: &S, playlist_id: &str) -> Result<(Vec<String>, usize)>
where
    S: PlaylistSource + ?Sized,
{
    let mut lines = Vec::new();
    let mut skipped = 0;
    let mut offset = 0;

    loop {
        let page = source.page(playlist_id, offset, PAGE_SIZE).await?;
        for entry in &page.entries {
            match format_track_line(entry) {
                Some(line) => lines.push(line),
                None => skipped += 1,
            }
        }
        if !page.has_next || page.entries.is_empty() {
            break;
        }
        offset += PAGE_SIZE;
    }

    Ok((lines, skipped))
}

/// Write the playlist as a batch list file, one track per line.
pub async fn export_playlist<S>(source: &S, playlist_id: &str, output: &Path) -> Result<ExportSummary>
where
    S: PlaylistSource + ?Sized,
{
    let (lines, skipped) = collect_track_lines(source, playlist_id).await?;

    let mut contents = String::new();
    for line in &lines {
        contents.push_str(line);
        contents.push('\n');
    }
    fs::write(output, contents).with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(ExportSummary {
        written: lines.len(),
        skipped,
    })
}

fn entry_from_item(item: PlaylistItem) -> PlaylistEntry {
    match item.track {
        Some(PlayableItem::Track(track)) => PlaylistEntry::Track {
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
        },
        Some(PlayableItem::Episode(_)) => PlaylistEntry::Episode,
        None => PlaylistEntry::Missing,
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn token_cache_path() -> PathBuf {
    if let Some(path) = env_var("SPOTIFY_TOKEN_CACHE") {
        return PathBuf::from(path);
    }
    dirs::cache_dir()
        .map(|dir| dir.join("trackgrab").join("spotify_token.json"))
        .unwrap_or_else(|| PathBuf::from(".cache-spotify"))
}

pub enum SpotifyClient {
    /// Client credentials, public playlists only
    Public(ClientCredsSpotify),
    /// Logged-in user, can read private and collaborative playlists
    User(AuthCodeSpotify),
}

impl SpotifyClient {
    pub async fn connect(user_auth: bool) -> Result<Self> {
        let (Some(id), Some(secret)) = (env_var("SPOTIFY_CLIENT_ID"), env_var("SPOTIFY_CLIENT_SECRET"))
        else {
            anyhow::bail!(
                "SPOTIFY_CLIENT_ID or SPOTIFY_CLIENT_SECRET is not set (environment or .env)"
            );
        };
        let creds = Credentials::new(&id, &secret);

        if !user_auth {
            let spotify = ClientCredsSpotify::new(creds);
            spotify
                .request_token()
                .await
                .context("Spotify rejected the client credentials")?;
            return Ok(Self::Public(spotify));
        }

        let oauth = OAuth {
            redirect_uri: env_var("SPOTIFY_REDIRECT_URI")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            scopes: scopes!("playlist-read-private"),
            ..Default::default()
        };
        let cache_path = token_cache_path();
        if let Some(parent) = cache_path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let config = Config {
            token_cached: true,
            cache_path,
            ..Default::default()
        };

        let spotify = AuthCodeSpotify::with_config(creds, oauth, config);
        let url = spotify.get_authorize_url(false)?;
        spotify
            .prompt_for_token(&url)
            .await
            .context("Spotify login failed")?;
        Ok(Self::User(spotify))
    }
}

#[async_trait]
impl PlaylistSource for SpotifyClient {
    async fn page(&self, playlist_id: &str, offset: u32, limit: u32) -> Result<PlaylistPage> {
        let id = PlaylistId::from_id(playlist_id)?;
        let page = match self {
            Self::Public(spotify) => {
                spotify
                    .playlist_items_manual(id, None, None, Some(limit), Some(offset))
                    .await?
            }
            Self::User(spotify) => {
                spotify
                    .playlist_items_manual(id, None, None, Some(limit), Some(offset))
                    .await?
            }
        };

        Ok(PlaylistPage {
            has_next: page.next.is_some(),
            entries: page.items.into_iter().map(entry_from_item).collect(),
        })
    }
}
