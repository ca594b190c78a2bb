//! Voice capture and playback arbitration.
//!
//! Wraps the platform speech services behind trait seams. Capture and
//! playback are one-shot sessions, never concurrent with each other;
//! a newly started playback preempts the previous one, and capture is
//! gated by the turn arbiter upstream. A missing service degrades the
//! feature instead of failing the session.

use crate::config::VoiceConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Preferred voice gender for playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    #[default]
    Feminine,
    Masculine,
}

impl VoiceGender {
    pub fn toggled(self) -> Self {
        match self {
            Self::Feminine => Self::Masculine,
            Self::Masculine => Self::Feminine,
        }
    }
}

/// One entry in the playback voice catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP-47-style tag, e.g. `en-US`.
    pub lang: String,
    pub gender: Option<VoiceGender>,
}

/// Events delivered by a capture session, in order: zero or more interim
/// transcripts followed by exactly one end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Interim transcript; fully replaces any previous interim text, since
    /// speech engines revise their own guesses.
    Interim(String),
    Ended(CaptureEnd),
}

/// Why a capture session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEnd {
    /// Natural end of utterance.
    Completed,
    /// Explicit stop requested.
    Stopped,
    Error(String),
}

/// Handle to an in-progress capture session.
pub struct CaptureSession {
    pub events: mpsc::UnboundedReceiver<CaptureEvent>,
    /// Cancelling requests an explicit stop; the service still delivers its
    /// single `Ended` event afterwards.
    pub cancel: CancellationToken,
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Start a one-shot capture session in the given locale.
    async fn start(&self, locale: &str) -> Result<CaptureSession>;
}

/// Text-to-speech collaborator.
#[async_trait]
pub trait PlaybackService: Send + Sync {
    /// Current voice catalog; may be empty while the platform populates it.
    async fn voices(&self) -> Vec<VoiceInfo>;

    /// Speak `text` with `voice`, resolving when playback finishes or the
    /// token is cancelled.
    async fn speak(&self, text: &str, voice: &VoiceInfo, cancel: CancellationToken) -> Result<()>;
}

/// Owns the two voice sessions and the playback preferences.
pub struct VoiceController {
    capture: Option<Arc<dyn CaptureService>>,
    playback: Option<Arc<dyn PlaybackService>>,
    output_enabled: bool,
    gender: VoiceGender,
    locale: String,
    preferred_voices: Vec<String>,
    playback_cancel: Option<CancellationToken>,
}

impl VoiceController {
    pub fn new(
        config: &VoiceConfig,
        capture: Option<Arc<dyn CaptureService>>,
        playback: Option<Arc<dyn PlaybackService>>,
    ) -> Self {
        if capture.is_none() {
            debug!("speech capture unavailable, feature disabled");
        }
        if playback.is_none() {
            debug!("speech playback unavailable, feature disabled");
        }
        Self {
            capture,
            playback,
            output_enabled: config.output_enabled,
            gender: config.gender,
            locale: config.locale.clone(),
            preferred_voices: config.preferred_voices.clone(),
            playback_cancel: None,
        }
    }

    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    /// Flip voice output. Disabling cancels any active playback.
    pub fn toggle_output(&mut self) -> bool {
        self.output_enabled = !self.output_enabled;
        if !self.output_enabled {
            self.cancel_playback();
        }
        self.output_enabled
    }

    pub fn toggle_gender(&mut self) -> VoiceGender {
        self.gender = self.gender.toggled();
        self.gender
    }

    /// Start a capture session, or `None` when the capability is absent or
    /// the service fails to start (degraded, not fatal).
    pub async fn start_capture(&self) -> Option<CaptureSession> {
        let service = self.capture.as_ref()?;
        match service.start(&self.locale).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("failed to start speech capture: {e}");
                None
            }
        }
    }

    /// Stop the utterance currently playing, if any.
    pub fn cancel_playback(&mut self) {
        if let Some(token) = self.playback_cancel.take() {
            token.cancel();
        }
    }

    /// Speak a finalized assistant message, preempting any prior utterance.
    ///
    /// Silently skipped when output is disabled, the capability is absent,
    /// the text is empty, or no voice can be selected from the catalog.
    pub fn speak(&mut self, text: &str) {
        if !self.output_enabled || text.trim().is_empty() {
            return;
        }
        let Some(service) = self.playback.clone() else {
            return;
        };
        self.cancel_playback();

        let cancel = CancellationToken::new();
        self.playback_cancel = Some(cancel.clone());
        let text = text.to_owned();
        let gender = self.gender;
        let preferred = self.preferred_voices.clone();
        tokio::spawn(async move {
            let catalog = service.voices().await;
            let Some(voice) = choose_voice(&catalog, gender, &preferred) else {
                debug!("no playback voices available, skipping utterance");
                return;
            };
            if let Err(e) = service.speak(&text, &voice, cancel).await {
                warn!("speech playback failed: {e}");
            }
        });
    }
}

/// Pick a playback voice: gender match in English, then the fixed
/// preference list, then any English voice, then anything at all.
fn choose_voice(
    catalog: &[VoiceInfo],
    gender: VoiceGender,
    preferred: &[String],
) -> Option<VoiceInfo> {
    if let Some(voice) = catalog
        .iter()
        .find(|v| v.gender == Some(gender) && is_english(&v.lang))
    {
        return Some(voice.clone());
    }
    for name in preferred {
        if let Some(voice) = catalog.iter().find(|v| &v.name == name) {
            return Some(voice.clone());
        }
    }
    catalog
        .iter()
        .find(|v| is_english(&v.lang))
        .or_else(|| catalog.first())
        .cloned()
}

fn is_english(lang: &str) -> bool {
    lang.to_ascii_lowercase().starts_with("en")
}
