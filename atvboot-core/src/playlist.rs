//! Single-entry live playlist synthesis for wrapped playback.

/// Placeholder for the media URL in [`PLAYLIST_TEMPLATE`].
const MEDIA_PLACEHOLDER: &str = "{{VIDEO}}";

/// Fixed playlist structure: header, one 10 second segment, the media URL.
const PLAYLIST_TEMPLATE: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-VERSION:4
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:10.0,
{{VIDEO}}
";

const END_LIST_TAG: &str = "#EXT-X-ENDLIST\n";

/// MIME type the router serves playlists with.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// A synthesized playlist referencing exactly one media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDocument {
    body: String,
}

impl PlaylistDocument {
    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn into_string(self) -> String {
        self.body
    }
}

impl std::fmt::Display for PlaylistDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.body)
    }
}

/// Builds [`PlaylistDocument`]s.
///
/// By default the list is left open (no `#EXT-X-ENDLIST`), which the device
/// treats as a live stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaylistSynthesizer {
    end_list: bool,
}

impl PlaylistSynthesizer {
    pub fn new(end_list: bool) -> Self {
        Self { end_list }
    }

    /// Wraps `media_url` in the fixed playlist.
    ///
    /// The URL is inserted verbatim; callers escape it beforehand if needed.
    pub fn wrap(&self, media_url: &str) -> PlaylistDocument {
        let mut body = PLAYLIST_TEMPLATE.replacen(MEDIA_PLACEHOLDER, media_url, 1);
        if self.end_list {
            body.push_str(END_LIST_TAG);
        }
        PlaylistDocument { body }
    }
}
