use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use scribeflow_config::Settings;

use crate::asr::funasr::FunasrProvider;
use crate::asr::tencent::TencentAsrProvider;
use crate::asr::AsrProvider;
use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider, RemoteEmbeddingProvider};
use crate::error::{ProviderError, ProviderResult};
use crate::llm::openai_compat::OpenAiCompatProvider;
use crate::llm::LlmProvider;
use crate::vector::{ChromaStore, MemoryVectorStore, VectorStore};
use crate::voiceprint::VoiceprintStore;

/// ASR selection as it arrives on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsrKind {
    Auto,
    Funasr,
    Tencent,
}

impl FromStr for AsrKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "auto" => Ok(AsrKind::Auto),
            "funasr" => Ok(AsrKind::Funasr),
            "tencent" => Ok(AsrKind::Tencent),
            other => Err(format!("unknown asr model: {}", other)),
        }
    }
}

/// LLM selection as it arrives on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmKind {
    Auto,
    Deepseek,
    Qwen3,
}

impl FromStr for LlmKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "auto" => Ok(LlmKind::Auto),
            "deepseek" => Ok(LlmKind::Deepseek),
            "qwen3" => Ok(LlmKind::Qwen3),
            other => Err(format!("unknown llm model: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    pub asr: bool,
    pub llm: bool,
    pub embedding: bool,
    pub vector: bool,
}

/// Process-wide provider singletons, constructed once at startup and passed
/// by reference to the controller.
pub struct Providers {
    asr: HashMap<&'static str, Arc<dyn AsrProvider>>,
    default_asr: &'static str,
    llm: HashMap<&'static str, Arc<dyn LlmProvider>>,
    default_llm: &'static str,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub vector: Arc<dyn VectorStore>,
    pub voiceprints: Arc<VoiceprintStore>,
}

impl Providers {
    pub fn from_settings(settings: &Settings) -> ProviderResult<Self> {
        let asr_timeout = Duration::from_secs(settings.limits.asr_timeout_secs);
        let llm_timeout = Duration::from_secs(settings.limits.llm_timeout_secs);
        let embedding_timeout = Duration::from_secs(settings.limits.embedding_timeout_secs);
        let vector_timeout = Duration::from_secs(settings.limits.vector_timeout_secs);

        // ASR backends: configure whatever has credentials, warn on the rest.
        let mut asr: HashMap<&'static str, Arc<dyn AsrProvider>> = HashMap::new();
        if let Some(url) = &settings.asr.funasr_url {
            match FunasrProvider::new(url.clone(), asr_timeout) {
                Ok(provider) => {
                    asr.insert("funasr", Arc::new(provider));
                }
                Err(e) => warn!(%e, "funasr provider skipped"),
            }
        }
        if let (Some(id), Some(key)) = (
            &settings.asr.tencent_secret_id,
            &settings.asr.tencent_secret_key,
        ) {
            match TencentAsrProvider::new(
                id.clone(),
                key.clone(),
                settings.asr.tencent_region.clone(),
                settings.asr.tencent_engine_model.clone(),
                asr_timeout,
            ) {
                Ok(provider) => {
                    asr.insert("tencent", Arc::new(provider));
                }
                Err(e) => warn!(%e, "tencent provider skipped"),
            }
        }
        if asr.is_empty() {
            return Err(ProviderError::NotConfigured(
                "no ASR provider configured (set asr.funasr_url or tencent credentials)".into(),
            ));
        }
        let default_asr = match settings.asr.default_provider.as_str() {
            "tencent" if asr.contains_key("tencent") => "tencent",
            _ if asr.contains_key("funasr") => "funasr",
            _ => *asr.keys().next().expect("asr map is non-empty"),
        };

        // LLM backends: deepseek (hosted) and qwen3 (local endpoint).
        let mut llm: HashMap<&'static str, Arc<dyn LlmProvider>> = HashMap::new();
        if settings.llm.deepseek_api_key.is_some() {
            llm.insert(
                "deepseek",
                Arc::new(OpenAiCompatProvider::new(
                    "deepseek",
                    settings.llm.deepseek_base_url.clone(),
                    settings.llm.deepseek_api_key.clone(),
                    settings.llm.deepseek_model.clone(),
                    llm_timeout,
                )?),
            );
        }
        llm.insert(
            "qwen3",
            Arc::new(OpenAiCompatProvider::new(
                "qwen3",
                settings.llm.qwen_base_url.clone(),
                settings.llm.qwen_api_key.clone(),
                settings.llm.qwen_model.clone(),
                llm_timeout,
            )?),
        );
        let default_llm = match settings.llm.default_provider.as_str() {
            "qwen3" => "qwen3",
            _ if llm.contains_key("deepseek") => "deepseek",
            _ => "qwen3",
        };

        let embedding: Arc<dyn EmbeddingProvider> = match settings.embedding.kind.as_str() {
            "remote" => match &settings.embedding.base_url {
                Some(base_url) => Arc::new(RemoteEmbeddingProvider::new(
                    base_url.clone(),
                    settings.embedding.api_key.clone(),
                    settings.embedding.model.clone(),
                    settings.embedding.dimension,
                    embedding_timeout,
                )?),
                None => {
                    warn!("embedding.base_url missing, falling back to hashed embeddings");
                    Arc::new(HashEmbeddingProvider::new(settings.embedding.dimension))
                }
            },
            _ => Arc::new(HashEmbeddingProvider::new(settings.embedding.dimension)),
        };

        let vector: Arc<dyn VectorStore> = match settings.vector.kind.as_str() {
            "memory" => Arc::new(MemoryVectorStore::new()),
            _ => Arc::new(ChromaStore::new(
                &settings.vector.host,
                settings.vector.port,
                vector_timeout,
            )?),
        };

        let voiceprints = Arc::new(VoiceprintStore::new(
            vector.clone(),
            settings.voiceprint.collection.clone(),
        ));

        info!(
            asr_backends = ?asr.keys().collect::<Vec<_>>(),
            default_asr,
            llm_backends = ?llm.keys().collect::<Vec<_>>(),
            default_llm,
            embedding = embedding.name(),
            vector = vector.name(),
            "providers initialized"
        );

        Ok(Self {
            asr,
            default_asr,
            llm,
            default_llm,
            embedding,
            vector,
            voiceprints,
        })
    }

    /// Builds a provider set from pre-constructed instances (tests).
    pub fn from_parts(
        asr: HashMap<&'static str, Arc<dyn AsrProvider>>,
        default_asr: &'static str,
        llm: HashMap<&'static str, Arc<dyn LlmProvider>>,
        default_llm: &'static str,
        embedding: Arc<dyn EmbeddingProvider>,
        vector: Arc<dyn VectorStore>,
        voiceprint_collection: String,
    ) -> Self {
        let voiceprints = Arc::new(VoiceprintStore::new(vector.clone(), voiceprint_collection));
        Self {
            asr,
            default_asr,
            llm,
            default_llm,
            embedding,
            vector,
            voiceprints,
        }
    }

    pub fn select_asr(&self, kind: AsrKind) -> ProviderResult<Arc<dyn AsrProvider>> {
        let name = match kind {
            AsrKind::Auto => self.default_asr,
            AsrKind::Funasr => "funasr",
            AsrKind::Tencent => "tencent",
        };
        self.asr
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(format!("asr backend {} unavailable", name)))
    }

    pub fn select_llm(&self, kind: LlmKind) -> ProviderResult<Arc<dyn LlmProvider>> {
        let name = match kind {
            LlmKind::Auto => self.default_llm,
            LlmKind::Deepseek => "deepseek",
            LlmKind::Qwen3 => "qwen3",
        };
        self.llm
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotConfigured(format!("llm backend {} unavailable", name)))
    }

    pub async fn health(&self) -> ProviderHealth {
        let asr = match self.select_asr(AsrKind::Auto) {
            Ok(provider) => provider.ready().await,
            Err(_) => false,
        };
        let llm = match self.select_llm(LlmKind::Auto) {
            Ok(provider) => provider.ready().await,
            Err(_) => false,
        };
        ProviderHealth {
            asr,
            llm,
            embedding: self.embedding.ready().await,
            vector: self.vector.ready().await,
        }
    }
}
