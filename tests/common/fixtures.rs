//! Album fixtures served from a wiremock server

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One track of a fixture album
#[derive(Clone, Debug)]
pub struct TrackFixture {
    /// Performer element
    pub artist: String,
    /// Title element
    pub title: String,
    /// HTTP status the track URL answers with
    pub status: u16,
    /// Body served for the track
    pub body: Vec<u8>,
}

impl TrackFixture {
    /// A track that downloads successfully
    pub fn ok(artist: &str, title: &str, body: &[u8]) -> Self {
        Self {
            artist: artist.to_string(),
            title: title.to_string(),
            status: 200,
            body: body.to_vec(),
        }
    }

    /// A track whose download answers `status`
    pub fn failing(artist: &str, title: &str, status: u16) -> Self {
        Self {
            artist: artist.to_string(),
            title: title.to_string(),
            status,
            body: Vec::new(),
        }
    }
}

/// Deterministic pseudo-audio payload of `len` bytes
pub fn track_payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect()
}

/// Path of the album page mounted by [`mount_album`]
pub const ALBUM_PAGE_PATH: &str = "/album/fixture.html";

/// Mount an album page, its player XML and every track.
///
/// Returns the album page URL.
pub async fn mount_album(server: &MockServer, tracks: &[TrackFixture]) -> String {
    let mut items = String::new();
    for (n, track) in tracks.iter().enumerate() {
        let track_path = format!("/stream/{n}.mp3");
        items.push_str(&format!(
            "<item type=\"mp3\"><title><![CDATA[{}]]></title><performer><![CDATA[{}]]></performer>\
             <link>{uri}/song/{n}</link><source>{uri}{track_path}</source></item>",
            track.title,
            track.artist,
            uri = server.uri(),
        ));
        Mock::given(method("GET"))
            .and(path(track_path.as_str()))
            .respond_with(ResponseTemplate::new(track.status).set_body_bytes(track.body.clone()))
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/xml/fixture"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><data>{items}</data>"
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(ALBUM_PAGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><body><div id=\"html5player\" class=\"player\" data-xml=\"/xml/fixture\"></div></body></html>",
        ))
        .mount(server)
        .await;

    format!("{}{}", server.uri(), ALBUM_PAGE_PATH)
}
