//! Playback dispatch: decide direct vs. wrapped, then hand off to AirPlay.
//!
//! Receivers only play some container formats natively. Anything that is
//! not already a live playlist is wrapped in a one-entry playlist served by
//! this process at `/wrapVideo`, and the receiver is pointed at that.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::airplay::AirPlayReceiver;
use crate::config::BootstrapConfig;

/// Path of the playlist-wrapping endpoint.
pub const WRAP_PATH: &str = "/wrapVideo";

/// How the dispatcher chooses between direct and wrapped playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum WrapPolicy {
    /// Play native live playlists directly, wrap everything else
    #[default]
    ByExtension,
    /// Always wrap
    Always,
    /// Never wrap
    Never,
    /// Wrap only when the playback request asks for it
    OnRequest,
}

impl std::fmt::Display for WrapPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WrapPolicy::ByExtension => write!(f, "by-extension"),
            WrapPolicy::Always => write!(f, "always"),
            WrapPolicy::Never => write!(f, "never"),
            WrapPolicy::OnRequest => write!(f, "on-request"),
        }
    }
}

impl std::str::FromStr for WrapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "by-extension" | "extension" => Ok(WrapPolicy::ByExtension),
            "always" => Ok(WrapPolicy::Always),
            "never" | "direct" => Ok(WrapPolicy::Never),
            "on-request" | "explicit" => Ok(WrapPolicy::OnRequest),
            _ => Err(format!(
                "Invalid wrap policy: '{s}'. Valid options are: by-extension, always, never, on-request"
            )),
        }
    }
}

/// Failure to decode a playback request body.
#[derive(Debug, Error)]
pub enum RequestDecodeError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct RawPlaybackRequest {
    #[serde(rename = "videoUrl", default)]
    video_url: Option<String>,
}

/// A decoded `POST /play` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub video_url: String,
}

impl PlaybackRequest {
    /// Decodes `{"videoUrl": "..."}`.
    ///
    /// # Errors
    ///
    /// - `RequestDecodeError::MalformedJson` - Body is not a JSON object
    /// - `RequestDecodeError::MissingField` - `videoUrl` absent, null or empty
    pub fn from_json(body: &[u8]) -> Result<Self, RequestDecodeError> {
        let raw: RawPlaybackRequest = serde_json::from_slice(body)?;
        match raw.video_url {
            Some(url) if !url.trim().is_empty() => Ok(Self { video_url: url }),
            _ => Err(RequestDecodeError::MissingField("videoUrl")),
        }
    }
}

/// Outcome of a dispatch decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackDecision {
    /// The media URL goes to the receiver unchanged.
    Direct { url: String },
    /// The receiver is pointed at a playlist wrapping the media URL.
    Wrapped {
        media_url: String,
        playlist_url: String,
    },
}

impl PlaybackDecision {
    /// URL actually handed to the receiver.
    pub fn dispatched_url(&self) -> &str {
        match self {
            PlaybackDecision::Direct { url } => url,
            PlaybackDecision::Wrapped { playlist_url, .. } => playlist_url,
        }
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self, PlaybackDecision::Wrapped { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            PlaybackDecision::Direct { .. } => "direct",
            PlaybackDecision::Wrapped { .. } => "wrapped",
        }
    }
}

/// Chooses direct or wrapped playback and invokes the receiver.
#[derive(Clone)]
pub struct PlaybackDispatcher {
    receiver: Arc<dyn AirPlayReceiver>,
    policy: WrapPolicy,
    stream_extensions: Vec<String>,
    self_base_url: String,
}

impl PlaybackDispatcher {
    pub fn new(config: &BootstrapConfig, receiver: Arc<dyn AirPlayReceiver>) -> Self {
        Self {
            receiver,
            policy: config.playback.wrap_policy,
            stream_extensions: config
                .playback
                .stream_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            self_base_url: config.self_base_url(),
        }
    }

    pub fn policy(&self) -> WrapPolicy {
        self.policy
    }

    /// Whether the URL path ends in a native live-playlist extension.
    ///
    /// Query string and fragment are ignored.
    pub fn is_native_stream(&self, raw_url: &str) -> bool {
        let path = match url::Url::parse(raw_url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => raw_url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        };
        self.stream_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }

    /// Self-referential playlist URL wrapping `raw_url`.
    pub fn wrap_url(&self, raw_url: &str) -> String {
        format!(
            "{}{WRAP_PATH}?url={}",
            self.self_base_url,
            urlencoding::encode(raw_url)
        )
    }

    /// Decides how `raw_url` should be played without dispatching it.
    ///
    /// `wrap_requested` only matters under [`WrapPolicy::OnRequest`].
    pub fn decide(&self, raw_url: &str, wrap_requested: bool) -> PlaybackDecision {
        let wrap = match self.policy {
            WrapPolicy::ByExtension => !self.is_native_stream(raw_url),
            WrapPolicy::Always => true,
            WrapPolicy::Never => false,
            WrapPolicy::OnRequest => wrap_requested,
        };

        if wrap {
            PlaybackDecision::Wrapped {
                media_url: raw_url.to_string(),
                playlist_url: self.wrap_url(raw_url),
            }
        } else {
            PlaybackDecision::Direct {
                url: raw_url.to_string(),
            }
        }
    }

    /// Decides and dispatches to the receiver exactly once.
    ///
    /// Does not wait for playback; receiver failures are not observed here.
    pub fn play(&self, raw_url: &str, wrap_requested: bool) -> PlaybackDecision {
        let decision = self.decide(raw_url, wrap_requested);
        info!(
            url = %raw_url,
            decision = decision.label(),
            policy = %self.policy,
            dispatched = %decision.dispatched_url(),
            "Dispatching playback"
        );
        self.receiver.play(decision.dispatched_url());
        decision
    }
}

impl std::fmt::Debug for PlaybackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackDispatcher")
            .field("policy", &self.policy)
            .field("stream_extensions", &self.stream_extensions)
            .field("self_base_url", &self.self_base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airplay::RecordingReceiver;

    fn dispatcher(policy: WrapPolicy) -> (PlaybackDispatcher, Arc<RecordingReceiver>) {
        let mut config = BootstrapConfig::default();
        config.playback.wrap_policy = policy;
        let receiver = Arc::new(RecordingReceiver::new());
        (PlaybackDispatcher::new(&config, receiver.clone()), receiver)
    }

    #[test]
    fn test_native_stream_played_directly() {
        let (dispatcher, receiver) = dispatcher(WrapPolicy::ByExtension);
        let decision = dispatcher.play("http://x/stream.m3u8", false);

        assert_eq!(
            decision,
            PlaybackDecision::Direct {
                url: "http://x/stream.m3u8".to_string()
            }
        );
        assert_eq!(receiver.played(), vec!["http://x/stream.m3u8"]);
    }

    #[test]
    fn test_other_media_is_wrapped() {
        let (dispatcher, receiver) = dispatcher(WrapPolicy::ByExtension);
        let decision = dispatcher.play("http://x/a.mp4", false);

        assert!(decision.is_wrapped());
        assert_eq!(
            receiver.played(),
            vec!["http://127.0.0.1:8080/wrapVideo?url=http%3A%2F%2Fx%2Fa.mp4"]
        );
    }

    #[test]
    fn test_extension_check_ignores_query_and_case() {
        let (dispatcher, _) = dispatcher(WrapPolicy::ByExtension);
        assert!(dispatcher.is_native_stream("http://cdn/live/2m.M3U8?checkedby:iptvcat.com"));
        assert!(dispatcher.is_native_stream("http://cdn/live/index.m3u8#t=10"));
        assert!(!dispatcher.is_native_stream("http://cdn/movie.mp4?format=.m3u8"));
        assert!(!dispatcher.is_native_stream("http://cdn/m3u8/movie.mkv"));
        // Unparseable input falls back to a plain string check
        assert!(dispatcher.is_native_stream("relative/path.m3u8?x=1"));
    }

    #[test]
    fn test_legacy_policies() {
        let (always, _) = dispatcher(WrapPolicy::Always);
        assert!(always.decide("http://x/stream.m3u8", false).is_wrapped());

        let (never, _) = dispatcher(WrapPolicy::Never);
        assert!(!never.decide("http://x/a.mp4", true).is_wrapped());

        let (on_request, _) = dispatcher(WrapPolicy::OnRequest);
        assert!(!on_request.decide("http://x/a.mp4", false).is_wrapped());
        assert!(on_request.decide("http://x/stream.m3u8", true).is_wrapped());
    }

    #[test]
    fn test_receiver_invoked_once_per_play() {
        let (dispatcher, receiver) = dispatcher(WrapPolicy::ByExtension);
        dispatcher.play("http://x/a.mp4", false);
        dispatcher.play("http://x/b.m3u8", false);
        assert_eq!(receiver.played().len(), 2);
        assert_eq!(receiver.last().as_deref(), Some("http://x/b.m3u8"));
    }

    #[test]
    fn test_wrap_url_encodes_query() {
        let (dispatcher, _) = dispatcher(WrapPolicy::Always);
        assert_eq!(
            dispatcher.wrap_url("http://x/a b.mp4?t=1&u=2"),
            "http://127.0.0.1:8080/wrapVideo?url=http%3A%2F%2Fx%2Fa%20b.mp4%3Ft%3D1%26u%3D2"
        );
    }

    #[test]
    fn test_decode_playback_request() {
        let request = PlaybackRequest::from_json(br#"{"videoUrl":"http://x/a.mp4"}"#).unwrap();
        assert_eq!(request.video_url, "http://x/a.mp4");

        assert!(matches!(
            PlaybackRequest::from_json(b"{not json"),
            Err(RequestDecodeError::MalformedJson(_))
        ));
        assert!(matches!(
            PlaybackRequest::from_json(br#"{"url":"http://x/a.mp4"}"#),
            Err(RequestDecodeError::MissingField("videoUrl"))
        ));
        assert!(matches!(
            PlaybackRequest::from_json(br#"{"videoUrl":null}"#),
            Err(RequestDecodeError::MissingField(_))
        ));
        assert!(matches!(
            PlaybackRequest::from_json(br#"{"videoUrl":""}"#),
            Err(RequestDecodeError::MissingField(_))
        ));
    }

    #[test]
    fn test_wrap_policy_parsing() {
        assert_eq!("by_extension".parse::<WrapPolicy>(), Ok(WrapPolicy::ByExtension));
        assert_eq!("Always".parse::<WrapPolicy>(), Ok(WrapPolicy::Always));
        assert_eq!("direct".parse::<WrapPolicy>(), Ok(WrapPolicy::Never));
        assert_eq!("on-request".parse::<WrapPolicy>(), Ok(WrapPolicy::OnRequest));
        assert!("sometimes".parse::<WrapPolicy>().is_err());
        assert_eq!(WrapPolicy::OnRequest.to_string(), "on-request");
    }
}
