use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use scribeflow_config::HistorySettings;
use scribeflow_providers::embedding::EmbeddingProvider;
use scribeflow_providers::llm::{ChatPrompt, LlmOptions, LlmProvider};
use scribeflow_providers::vector::VectorStore;

/// How prior meetings are folded into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    #[default]
    Auto,
    Retrieval,
    Summary,
}

impl FromStr for HistoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "auto" => Ok(HistoryMode::Auto),
            "retrieval" => Ok(HistoryMode::Retrieval),
            "summary" => Ok(HistoryMode::Summary),
            other => Err(format!("unknown history mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    pub ids: Vec<i64>,
    pub mode: HistoryMode,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryOutcome {
    /// Context appended to the user prompt; empty is always safe.
    pub context: String,
    /// True iff retrieval ran and surfaced at least one chunk.
    pub need_rag: bool,
}

#[derive(Debug, Deserialize)]
struct RagJudgement {
    #[serde(default)]
    need_rag: bool,
    #[serde(default)]
    search_query: String,
}

/// Selects and builds historical context for the current meeting.
///
/// Best-effort by contract: every failure path degrades to an empty
/// context with a warning.
pub struct HistoryService {
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    settings: HistorySettings,
}

impl HistoryService {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: String,
        settings: HistorySettings,
    ) -> Self {
        Self {
            embedding,
            store,
            collection,
            settings,
        }
    }

    pub async fn resolve(
        &self,
        request: &HistoryRequest,
        llm: &Arc<dyn LlmProvider>,
        transcript: &str,
        user_requirement: Option<&str>,
    ) -> HistoryOutcome {
        match request.mode {
            HistoryMode::Summary => HistoryOutcome {
                context: self.summarize(&request.ids).await,
                need_rag: false,
            },
            HistoryMode::Retrieval => {
                let query = self.distill_query(llm, transcript, user_requirement).await;
                self.retrieve(&request.ids, &query).await
            }
            HistoryMode::Auto => {
                let judgement = self.judge(llm, transcript).await;
                if !judgement.need_rag {
                    debug!("auto history judgement: no retrieval needed");
                    return HistoryOutcome::default();
                }
                let query = if judgement.search_query.trim().is_empty() {
                    self.distill_query(llm, transcript, user_requirement).await
                } else {
                    judgement.search_query
                };
                self.retrieve(&request.ids, &query).await
            }
        }
    }

    /// One strict-JSON yes/no over the transcript prefix; any failure means
    /// "no retrieval".
    async fn judge(&self, llm: &Arc<dyn LlmProvider>, transcript: &str) -> RagJudgement {
        let prefix: String = transcript
            .chars()
            .take(self.settings.judge_prefix_chars)
            .collect();
        let prompt = ChatPrompt {
            system: None,
            user: format!(
                "你是会议秘书。判断以下会议记录是否需要检索历史知识库来辅助生成纪要。\n\
                 出现模糊指代（如\"上次说的\"、\"那个项目\"）或具体的历史问题、技术名词时需要检索。\n\
                 严格返回 JSON：{{\"need_rag\": true|false, \"search_query\": \"核心关键词，空格分隔\"}}\n\n\
                 【会议内容】\n{}",
                prefix
            ),
        };
        let opts = LlmOptions {
            temperature: 0.1,
            max_tokens: 200,
            model: None,
        };

        match llm.complete(&prompt, &opts).await {
            Ok(completion) => match parse_judgement(&completion.text) {
                Some(judgement) => judgement,
                None => {
                    warn!("RAG judgement was not valid JSON, skipping retrieval");
                    RagJudgement {
                        need_rag: false,
                        search_query: String::new(),
                    }
                }
            },
            Err(e) => {
                warn!(%e, "RAG judgement failed, skipping retrieval");
                RagJudgement {
                    need_rag: false,
                    search_query: String::new(),
                }
            }
        }
    }

    /// Key-phrase query: the user requirement when present, then an
    /// LLM-distilled phrase over the transcript, then the raw prefix.
    async fn distill_query(
        &self,
        llm: &Arc<dyn LlmProvider>,
        transcript: &str,
        user_requirement: Option<&str>,
    ) -> String {
        if let Some(requirement) = user_requirement.filter(|r| !r.trim().is_empty()) {
            return requirement.to_string();
        }
        let judgement = self.judge(llm, transcript).await;
        if !judgement.search_query.trim().is_empty() {
            return judgement.search_query;
        }
        transcript.chars().take(500).collect()
    }

    async fn retrieve(&self, ids: &[i64], query: &str) -> HistoryOutcome {
        if query.trim().is_empty() {
            return HistoryOutcome::default();
        }

        let embedding = match self.embedding.embed(&[query.to_string()]).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.remove(0),
            Ok(_) => return HistoryOutcome::default(),
            Err(e) => {
                warn!(%e, "query embedding failed, skipping retrieval");
                return HistoryOutcome::default();
            }
        };

        let filter = if ids.is_empty() {
            None
        } else {
            Some(json!({ "source_id": { "$in": ids } }))
        };

        let hits = match self
            .store
            .query(&self.collection, &embedding, self.settings.top_k, filter)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(%e, "history retrieval failed");
                return HistoryOutcome::default();
            }
        };

        let mut lines = Vec::new();
        for hit in hits {
            if hit.similarity < self.settings.min_similarity {
                continue;
            }
            let source = hit
                .metadata
                .get("source_id")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "?".into());
            let section = hit
                .metadata
                .get("section_title")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            lines.push(format!(
                "- [会议{} {}]（相似度 {:.2}）{}",
                source, section, hit.similarity, hit.document
            ));
        }

        info!(surfaced = lines.len(), "history retrieval complete");
        HistoryOutcome {
            need_rag: !lines.is_empty(),
            context: lines.join("\n"),
        }
    }

    /// Summary mode: pull each referenced minute's headline sections and
    /// concatenate them under id headers.
    async fn summarize(&self, ids: &[i64]) -> String {
        let mut parts = Vec::new();
        for id in ids {
            let chunks = match self
                .store
                .fetch_where(&self.collection, json!({ "source_id": id }), 100)
                .await
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(source_id = id, %e, "could not fetch archived minute");
                    continue;
                }
            };
            if chunks.is_empty() {
                continue;
            }

            let mut sections = Vec::new();
            for chunk in &chunks {
                let title = chunk
                    .metadata
                    .get("section_title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if is_headline_section(title) {
                    sections.push(format!("{}：{}", title, chunk.document));
                }
            }
            // A minute with no recognizable sections still contributes its
            // opening chunk.
            if sections.is_empty() {
                sections.push(chunks[0].document.clone());
            }

            parts.push(format!("【会议 {}】\n{}", id, sections.join("\n")));
        }
        parts.join("\n\n")
    }
}

fn is_headline_section(title: &str) -> bool {
    const MARKERS: &[&str] = &["主题", "基本信息", "摘要", "决策", "行动", "结论"];
    MARKERS.iter().any(|m| title.contains(m))
}

/// The model sometimes wraps its JSON in prose; take the first object.
fn parse_judgement(text: &str) -> Option<RagJudgement> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scribeflow_providers::embedding::HashEmbeddingProvider;
    use scribeflow_providers::error::ProviderResult;
    use scribeflow_providers::llm::Completion;
    use scribeflow_providers::vector::{MemoryVectorStore, VectorRecord};

    struct CannedLlm(String);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            _prompt: &ChatPrompt,
            _opts: &LlmOptions,
        ) -> ProviderResult<Completion> {
            Ok(Completion {
                text: self.0.clone(),
                usage_tokens: 10,
            })
        }

        async fn ready(&self) -> bool {
            true
        }
    }

    fn settings() -> HistorySettings {
        HistorySettings {
            top_k: 5,
            min_similarity: 0.0,
            judge_prefix_chars: 2000,
        }
    }

    async fn seeded_service() -> (HistoryService, Arc<MemoryVectorStore>) {
        let store = Arc::new(MemoryVectorStore::new());
        let embedding = Arc::new(HashEmbeddingProvider::new(64));
        store.ensure_collection("minutes", 64).await.unwrap();

        let texts = [
            (7i64, "决策", "数据中台 接口改造 里程碑确认"),
            (7i64, "行动项", "平台组负责回滚预案"),
            (9i64, "摘要", "市场活动预算讨论"),
        ];
        let mut records = Vec::new();
        for (i, (source_id, section, text)) in texts.iter().enumerate() {
            let vector = embedding.embed(&[text.to_string()]).await.unwrap().remove(0);
            let mut metadata = serde_json::Map::new();
            metadata.insert("source_id".into(), json!(source_id));
            metadata.insert("section_title".into(), json!(section));
            records.push(VectorRecord {
                id: format!("{}_{}", source_id, i),
                embedding: vector,
                document: text.to_string(),
                metadata,
            });
        }
        store.upsert("minutes", records).await.unwrap();

        let service = HistoryService::new(embedding, store.clone(), "minutes".into(), settings());
        (service, store)
    }

    #[tokio::test]
    async fn retrieval_filters_by_meeting_ids_and_cites_sources() {
        let (service, _store) = seeded_service().await;
        let llm: Arc<dyn LlmProvider> = Arc::new(CannedLlm(String::new()));

        let outcome = service
            .resolve(
                &HistoryRequest {
                    ids: vec![7],
                    mode: HistoryMode::Retrieval,
                },
                &llm,
                "数据中台 接口改造",
                None,
            )
            .await;

        assert!(outcome.need_rag);
        assert!(outcome.context.contains("会议7"));
        assert!(!outcome.context.contains("市场活动"));
    }

    #[tokio::test]
    async fn auto_mode_negative_judgement_returns_empty() {
        let (service, _store) = seeded_service().await;
        let llm: Arc<dyn LlmProvider> = Arc::new(CannedLlm(
            r#"{"need_rag": false, "search_query": ""}"#.into(),
        ));

        let outcome = service
            .resolve(
                &HistoryRequest {
                    ids: vec![7],
                    mode: HistoryMode::Auto,
                },
                &llm,
                "随便聊聊",
                None,
            )
            .await;

        assert!(!outcome.need_rag);
        assert!(outcome.context.is_empty());
    }

    #[tokio::test]
    async fn auto_mode_positive_judgement_retrieves() {
        let (service, _store) = seeded_service().await;
        let llm: Arc<dyn LlmProvider> = Arc::new(CannedLlm(
            r#"{"need_rag": true, "search_query": "数据中台 接口改造"}"#.into(),
        ));

        let outcome = service
            .resolve(
                &HistoryRequest {
                    ids: vec![7],
                    mode: HistoryMode::Auto,
                },
                &llm,
                "上次说的那个项目进展如何",
                None,
            )
            .await;

        assert!(outcome.need_rag);
        assert!(outcome.context.contains("数据中台"));
    }

    #[tokio::test]
    async fn summary_mode_concatenates_headline_sections() {
        let (service, _store) = seeded_service().await;
        let llm: Arc<dyn LlmProvider> = Arc::new(CannedLlm(String::new()));

        let outcome = service
            .resolve(
                &HistoryRequest {
                    ids: vec![7, 9],
                    mode: HistoryMode::Summary,
                },
                &llm,
                "今天继续",
                None,
            )
            .await;

        assert!(!outcome.need_rag);
        assert!(outcome.context.contains("【会议 7】"));
        assert!(outcome.context.contains("【会议 9】"));
        assert!(outcome.context.contains("决策："));
    }

    #[tokio::test]
    async fn store_failure_degrades_to_empty_context() {
        let store = Arc::new(MemoryVectorStore::new());
        // No collection created: queries will error.
        let service = HistoryService::new(
            Arc::new(HashEmbeddingProvider::new(64)),
            store,
            "minutes".into(),
            settings(),
        );
        let llm: Arc<dyn LlmProvider> = Arc::new(CannedLlm(String::new()));

        let outcome = service
            .resolve(
                &HistoryRequest {
                    ids: vec![1],
                    mode: HistoryMode::Retrieval,
                },
                &llm,
                "内容",
                None,
            )
            .await;

        assert!(!outcome.need_rag);
        assert!(outcome.context.is_empty());
    }

    #[test]
    fn judgement_parsing_tolerates_prose_wrapping() {
        let parsed =
            parse_judgement("好的。{\"need_rag\": true, \"search_query\": \"x\"} 以上。").unwrap();
        assert!(parsed.need_rag);
        assert_eq!(parsed.search_query, "x");
        assert!(parse_judgement("not json").is_none());
    }
}
