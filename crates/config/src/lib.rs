pub mod settings;

pub use settings::{
    AppSettings, ArchiveSettings, AsrSettings, DiarizationSettings, EmbeddingSettings,
    HistorySettings, HotwordSettings, LimitSettings, LlmSettings, Settings, VectorSettings,
    VoiceprintSettings,
};
