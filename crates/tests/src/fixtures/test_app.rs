use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use scribeflow_api::{build_router, state::AppState};
use scribeflow_config::Settings;
use scribeflow_providers::asr::AsrProvider;
use scribeflow_providers::embedding::HashEmbeddingProvider;
use scribeflow_providers::llm::LlmProvider;
use scribeflow_providers::vector::MemoryVectorStore;
use scribeflow_providers::Providers;
use scribeflow_transcription::voiceprint_match::SpeakerEmbedder;

use crate::fixtures::mocks::{LlmStep, MockAsr, MockLlm};

/// A running test application with mocked providers.
///
/// Each instance gets its own temp directory (hotword file, audio spool)
/// and an in-memory vector store, so tests are fully isolated.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub client: reqwest::Client,
    pub llm: Arc<MockLlm>,
    pub settings: Settings,
    _temp: tempfile::TempDir,
}

impl TestApp {
    /// Spawns with an empty LLM script (every call returns fixed minutes).
    pub async fn spawn() -> Self {
        Self::spawn_with(Vec::new(), None).await
    }

    /// Spawns with a scripted LLM and an optional speaker embedder.
    pub async fn spawn_with(
        llm_script: Vec<LlmStep>,
        speaker_embedder: Option<Arc<dyn SpeakerEmbedder>>,
    ) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(&format!("scribeflow_test_{}", uuid::Uuid::new_v4().simple()))
            .tempdir()
            .expect("failed to create test temp dir");

        let mut settings = Settings::load().expect("default settings");
        settings.app.host = "127.0.0.1".into();
        settings.app.port = 0;
        settings.app.temp_dir = temp.path().join("spool").display().to_string();
        settings.hotwords.file = temp.path().join("hotwords.json").display().to_string();
        settings.vector.kind = "memory".into();
        settings.embedding.kind = "hash".into();
        settings.embedding.dimension = 64;
        settings.voiceprint.min_register_secs = 1.0;

        let llm = MockLlm::new(llm_script);
        let mut asr_map: HashMap<&'static str, Arc<dyn AsrProvider>> = HashMap::new();
        asr_map.insert("funasr", Arc::new(MockAsr));
        let mut llm_map: HashMap<&'static str, Arc<dyn LlmProvider>> = HashMap::new();
        llm_map.insert("deepseek", llm.clone());

        let providers = Arc::new(Providers::from_parts(
            asr_map,
            "funasr",
            llm_map,
            "deepseek",
            Arc::new(HashEmbeddingProvider::new(settings.embedding.dimension)),
            Arc::new(MemoryVectorStore::new()),
            settings.voiceprint.collection.clone(),
        ));

        let mut app_state = AppState::with_providers(settings.clone(), providers)
            .expect("failed to build AppState");
        if let Some(embedder) = speaker_embedder {
            app_state = app_state.with_speaker_embedder(embedder);
        }
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind to a random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::new();

        Self {
            addr,
            base_url,
            client,
            llm,
            settings,
            _temp: temp,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A 30 s mono WAV of a quiet tone, enough to clear duration gates.
    pub fn wav_clip(duration_secs: f64) -> Vec<u8> {
        let sample_rate = 16_000u32;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let n = (duration_secs * sample_rate as f64) as usize;
            for i in 0..n {
                let sample =
                    (0.2 * (i as f32 * 2.0 * std::f32::consts::PI * 220.0 / 16_000.0).sin()
                        * i16::MAX as f32) as i16;
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}
