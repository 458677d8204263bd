//! Album resolution
//!
//! Turns an album page URL into the ordered list of tracks to archive. The
//! page embeds an HTML5 player whose `data-xml` attribute points at an XML
//! document listing every track:
//!
//! ```xml
//! <data>
//!   <item>
//!     <title>T1</title>
//!     <performer>A</performer>
//!     <link>http://host/song/t1</link>
//!     <source>http://host/stream/t1.mp3</source>
//!     <lyric>http://host/lyric/t1</lyric>
//!   </item>
//! </data>
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::HttpConfig;
use crate::error::{AlbumError, Result};
use crate::types::ItemDescriptor;

/// One track as listed by the player XML
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumItem {
    /// Track title
    #[serde(default)]
    pub title: String,
    /// Performing artist
    #[serde(default)]
    pub performer: String,
    /// Track page
    #[serde(default)]
    pub link: String,
    /// Direct download URL of the audio
    #[serde(default)]
    pub source: String,
    /// Lyric page
    #[serde(default)]
    pub lyric: String,
}

impl AlbumItem {
    /// The pipeline's view of this track
    pub fn to_descriptor(&self) -> ItemDescriptor {
        ItemDescriptor::new(&self.performer, &self.title, &self.source)
    }
}

/// The decoded player XML
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "data")]
pub struct Album {
    /// Tracks in playlist order
    #[serde(rename = "item", default)]
    pub items: Vec<AlbumItem>,
}

impl Album {
    /// Decode a player XML document
    pub fn from_xml(xml: &str) -> std::result::Result<Self, AlbumError> {
        quick_xml::de::from_str(xml).map_err(|e| AlbumError::Xml(e.to_string()))
    }

    /// Descriptors for every track, in album order
    pub fn descriptors(&self) -> Vec<ItemDescriptor> {
        self.items.iter().map(AlbumItem::to_descriptor).collect()
    }

    /// Number of tracks
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the album lists no tracks
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[allow(clippy::unwrap_used)]
fn player_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<div\b[^>]*\bid\s*=\s*["']html5player["'][^>]*>"#).unwrap()
    })
}

#[allow(clippy::unwrap_used)]
fn data_xml_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\bdata-xml\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    })
}

/// Find the player's `data-xml` URL in an album page.
///
/// Relative URLs are resolved against `page_url`.
pub fn find_player_xml_url(html: &str, page_url: &Url) -> std::result::Result<Url, AlbumError> {
    let tag = player_tag_regex()
        .find(html)
        .ok_or(AlbumError::NoPlayerFound)?;
    let captures = data_xml_regex()
        .captures(tag.as_str())
        .ok_or(AlbumError::NoPlayerFound)?;
    let raw = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .ok_or(AlbumError::NoPlayerFound)?;

    let unescaped = raw.replace("&amp;", "&");
    page_url
        .join(&unescaped)
        .map_err(|_| AlbumError::InvalidUrl(unescaped))
}

/// Resolves album pages into their track lists over HTTP.
#[derive(Debug, Clone)]
pub struct AlbumResolver {
    client: reqwest::Client,
}

impl AlbumResolver {
    /// Wrap an existing client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client from HTTP settings
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Ok(Self::new(config.build_client()?))
    }

    /// Fetch the album page, locate its player and decode the track list.
    pub async fn resolve(&self, page_url: &str) -> std::result::Result<Album, AlbumError> {
        let page_url = page_url.trim();
        if page_url.is_empty() {
            tracing::error!("Invalid album page URL: empty");
            return Err(AlbumError::InvalidUrl(String::new()));
        }
        let page_url =
            Url::parse(page_url).map_err(|_| AlbumError::InvalidUrl(page_url.to_string()))?;
        tracing::debug!(page_url = %page_url, "Resolving album page");

        let html = self.get_text(&page_url).await?;
        let xml_url = find_player_xml_url(&html, &page_url)?;
        tracing::debug!(xml_url = %xml_url, "Found album player XML");

        let xml = self.get_text(&xml_url).await?;
        let album = Album::from_xml(&xml)?;
        tracing::debug!(item_count = album.len(), page_url = %page_url, "Resolved album");
        Ok(album)
    }

    async fn get_text(&self, url: &Url) -> std::result::Result<String, AlbumError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AlbumError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}
