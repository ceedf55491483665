use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use scribeflow_config::Settings;
use scribeflow_providers::Providers;
use scribeflow_services::{ArchiveService, PipelineController};
use scribeflow_transcription::diarize::Diarizer;
use scribeflow_transcription::voiceprint_match::{RemoteSpeakerEmbedder, SpeakerEmbedder};
use scribeflow_transcription::{HotwordRegistry, VoiceprintMatcher};

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub providers: Arc<Providers>,
    pub pipeline: Arc<PipelineController>,
    pub archive: Arc<ArchiveService>,
    pub hotwords: Arc<HotwordRegistry>,
    /// Present when the speaker-embedder sidecar is configured.
    pub speaker_embedder: Option<Arc<dyn SpeakerEmbedder>>,
}

impl AppState {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let providers = Arc::new(Providers::from_settings(&settings)?);
        Self::with_providers(settings, providers)
    }

    /// Builds the state around pre-constructed providers (tests inject
    /// mocks through this).
    pub fn with_providers(settings: Settings, providers: Arc<Providers>) -> anyhow::Result<Self> {
        let hotwords = Arc::new(HotwordRegistry::load(
            &settings.hotwords.file,
            settings.hotwords.render_limit_chars,
        )?);

        let diarizer = match &settings.diarization.sidecar_url {
            Some(url) if settings.diarization.enabled => Some(Arc::new(Diarizer::new(
                url.clone(),
                Duration::from_secs(settings.diarization.timeout_secs),
            )?)),
            _ => None,
        };
        if diarizer.is_none() {
            info!("diarizer sidecar not configured");
        }

        let speaker_embedder: Option<Arc<dyn SpeakerEmbedder>> =
            match &settings.voiceprint.embedder_url {
                Some(url) => Some(Arc::new(RemoteSpeakerEmbedder::new(
                    url.clone(),
                    Duration::from_secs(settings.limits.embedding_timeout_secs),
                )?)),
                None => {
                    info!("speaker embedder not configured, voiceprint features disabled");
                    None
                }
            };

        let matcher = speaker_embedder.as_ref().map(|embedder| {
            Arc::new(VoiceprintMatcher::new(
                embedder.clone(),
                providers.voiceprints.clone(),
                settings.voiceprint.similarity_threshold,
                settings.voiceprint.clip_secs,
            ))
        });

        let pipeline = Arc::new(PipelineController::new(
            settings.clone(),
            providers.clone(),
            hotwords.clone(),
            diarizer,
            matcher,
        ));
        let archive = Arc::new(pipeline.archive_service());

        Ok(Self {
            settings,
            providers,
            pipeline,
            archive,
            hotwords,
            speaker_embedder,
        })
    }

    /// Test hook: swaps in a speaker embedder after construction.
    pub fn with_speaker_embedder(mut self, embedder: Arc<dyn SpeakerEmbedder>) -> Self {
        let matcher = Arc::new(VoiceprintMatcher::new(
            embedder.clone(),
            self.providers.voiceprints.clone(),
            self.settings.voiceprint.similarity_threshold,
            self.settings.voiceprint.clip_secs,
        ));
        let pipeline = Arc::new(PipelineController::new(
            self.settings.clone(),
            self.providers.clone(),
            self.hotwords.clone(),
            None,
            Some(matcher),
        ));
        self.archive = Arc::new(pipeline.archive_service());
        self.pipeline = pipeline;
        self.speaker_embedder = Some(embedder);
        self
    }
}
