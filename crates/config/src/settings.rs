use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub asr: AsrSettings,
    pub diarization: DiarizationSettings,
    pub voiceprint: VoiceprintSettings,
    pub hotwords: HotwordSettings,
    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub history: HistorySettings,
    pub archive: ArchiveSettings,
    pub limits: LimitSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub temp_dir: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AsrSettings {
    /// Default ASR provider: "funasr" or "tencent".
    pub default_provider: String,
    pub funasr_url: Option<String>,
    pub tencent_secret_id: Option<String>,
    pub tencent_secret_key: Option<String>,
    pub tencent_region: String,
    pub tencent_engine_model: String,
    /// Hard cap on a single audio file, in seconds.
    pub max_audio_duration_secs: f64,
    /// Directory where `audio_id` inputs are resolved as `{id}.wav`.
    pub audio_store_dir: String,
    pub enable_punctuation: bool,
    pub language_hint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiarizationSettings {
    pub enabled: bool,
    /// Diarizer sidecar base URL (POST {url}/rttm). None disables the sidecar.
    pub sidecar_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VoiceprintSettings {
    pub collection: String,
    /// Top-1 matches below this similarity keep their numeric speaker id.
    pub similarity_threshold: f64,
    /// Speaker-embedder sidecar base URL (POST {url}/voiceprint/embedding).
    pub embedder_url: Option<String>,
    /// Longest clip fed to the embedder, in seconds.
    pub clip_secs: f64,
    /// Clips shorter than this are rejected at registration time.
    pub min_register_secs: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HotwordSettings {
    pub file: String,
    pub render_limit_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmSettings {
    /// Default LLM provider: "deepseek" or "qwen3".
    pub default_provider: String,
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: String,
    pub deepseek_model: String,
    pub qwen_base_url: String,
    pub qwen_api_key: Option<String>,
    pub qwen_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingSettings {
    /// "remote" (OpenAI-style /embeddings endpoint) or "hash" (offline fallback).
    pub kind: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorSettings {
    /// "chroma" or "memory".
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub archive_collection: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistorySettings {
    pub top_k: usize,
    pub min_similarity: f64,
    /// Transcript prefix length fed to the auto-mode RAG judgement.
    pub judge_prefix_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveSettings {
    pub chunk_min_chars: usize,
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitSettings {
    pub asr_timeout_secs: u64,
    pub llm_timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    pub vector_timeout_secs: u64,
    /// Soft deadline for a whole /process request.
    pub request_deadline_secs: u64,
    pub max_upload_bytes: usize,
    pub max_prompt_tokens: usize,
    /// Upper bound on the per-audio fan-out pool.
    pub max_audio_workers: usize,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::default().separator("__").prefix("SCRIBEFLOW"))
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8001)?
            .set_default("app.temp_dir", "temp_files")?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("asr.default_provider", "funasr")?
            .set_default("asr.tencent_region", "ap-beijing")?
            .set_default("asr.tencent_engine_model", "16k_zh")?
            .set_default("asr.max_audio_duration_secs", 18_000.0)?
            .set_default("asr.audio_store_dir", "audio_store")?
            .set_default("asr.enable_punctuation", true)?
            .set_default("diarization.enabled", true)?
            .set_default("diarization.timeout_secs", 600)?
            .set_default("voiceprint.collection", "employee_voiceprint")?
            .set_default("voiceprint.similarity_threshold", 0.75)?
            .set_default("voiceprint.clip_secs", 10.0)?
            .set_default("voiceprint.min_register_secs", 1.0)?
            .set_default("hotwords.file", "config/hotwords.json")?
            .set_default("hotwords.render_limit_chars", 4096)?
            .set_default("llm.default_provider", "deepseek")?
            .set_default("llm.deepseek_base_url", "https://api.deepseek.com/v1")?
            .set_default("llm.deepseek_model", "deepseek-chat")?
            .set_default("llm.qwen_base_url", "http://localhost:8000/v1")?
            .set_default("llm.qwen_model", "qwen3-14b")?
            .set_default("embedding.kind", "remote")?
            .set_default("embedding.model", "bge-m3")?
            .set_default("embedding.dimension", 1024)?
            .set_default("vector.kind", "chroma")?
            .set_default("vector.host", "localhost")?
            .set_default("vector.port", 8000)?
            .set_default("vector.archive_collection", "meeting_minutes_library")?
            .set_default("history.top_k", 5)?
            .set_default("history.min_similarity", 0.3)?
            .set_default("history.judge_prefix_chars", 2000)?
            .set_default("archive.chunk_min_chars", 400)?
            .set_default("archive.chunk_max_chars", 800)?
            .set_default("archive.chunk_overlap_chars", 80)?
            .set_default("limits.asr_timeout_secs", 7200)?
            .set_default("limits.llm_timeout_secs", 180)?
            .set_default("limits.embedding_timeout_secs", 30)?
            .set_default("limits.vector_timeout_secs", 10)?
            .set_default("limits.request_deadline_secs", 7380)?
            .set_default("limits.max_upload_bytes", 500 * 1024 * 1024)?
            .set_default("limits.max_prompt_tokens", 8000)?
            .set_default("limits.max_audio_workers", 4)?
            .build()?;

        config.try_deserialize()
    }
}
