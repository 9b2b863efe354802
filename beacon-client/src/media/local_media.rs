use crate::error::MediaError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// Live local stream handed to the peer connection before negotiating.
#[derive(Clone)]
pub struct LocalMedia {
    pub stream_id: String,
    pub tracks: Vec<LocalTrack>,
}

impl fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMedia")
            .field("stream_id", &self.stream_id)
            .field(
                "tracks",
                &self.tracks.iter().map(|t| t.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Device media acquisition, supplied by the embedding application.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<LocalMedia, MediaError>;
}

/// Opus audio and VP8 video sample tracks the caller feeds frames into.
///
/// Used where no capture device exists (the CLI, tests).
#[derive(Debug, Clone)]
pub struct SyntheticMedia {
    stream_id: String,
}

impl SyntheticMedia {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

impl Default for SyntheticMedia {
    fn default() -> Self {
        Self::new(format!("beacon-{}", Uuid::new_v4()))
    }
}

#[async_trait]
impl MediaSource for SyntheticMedia {
    async fn acquire(&self) -> Result<LocalMedia, MediaError> {
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            self.stream_id.clone(),
        ));
        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            "video".to_owned(),
            self.stream_id.clone(),
        ));

        Ok(LocalMedia {
            stream_id: self.stream_id.clone(),
            tracks: vec![audio, video],
        })
    }
}

/// Source with no devices at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMedia;

#[async_trait]
impl MediaSource for NoMedia {
    async fn acquire(&self) -> Result<LocalMedia, MediaError> {
        Err(MediaError::DeviceUnavailable(
            "no capture devices configured".to_owned(),
        ))
    }
}
