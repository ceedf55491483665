use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use scribeflow_config::ArchiveSettings;
use scribeflow_providers::embedding::EmbeddingProvider;
use scribeflow_providers::vector::{VectorRecord, VectorStore};

use crate::error::{ServiceError, ServiceResult};

/// An approved minute submitted for archival.
#[derive(Debug, Clone)]
pub struct MinuteRecord {
    pub source_id: i64,
    pub markdown: String,
    pub user_id: Option<String>,
    pub meeting_date: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub chunks_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub section_title: String,
    pub text: String,
}

/// Splits minute markdown into embedding-sized chunks.
///
/// Headings open sections; within a section, paragraphs and then sentences
/// are combined greedily into `min..=max` character chunks, with `overlap`
/// trailing characters carried into the next chunk of the same section.
pub fn chunk_markdown(markdown: &str, settings: &ArchiveSettings) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for section in split_sections(markdown) {
        let sentences = split_sentences(&section.body);
        if sentences.is_empty() {
            continue;
        }

        let mut current = String::new();
        let mut section_chunks: Vec<String> = Vec::new();
        for sentence in sentences {
            // A single oversized sentence still becomes its own chunk.
            if !current.is_empty()
                && current.chars().count() + sentence.chars().count() > settings.chunk_max_chars
            {
                section_chunks.push(current.clone());
                current = tail_chars(&current, settings.chunk_overlap_chars);
            }
            if !current.is_empty() && !current.ends_with('\n') {
                current.push(' ');
            }
            current.push_str(&sentence);

            if current.chars().count() >= settings.chunk_max_chars {
                section_chunks.push(current.clone());
                current = tail_chars(&current, settings.chunk_overlap_chars);
            }
        }
        if current.chars().count() > settings.chunk_overlap_chars
            || (section_chunks.is_empty() && !current.trim().is_empty())
        {
            section_chunks.push(current);
        }

        for text in section_chunks {
            let text = text.trim().to_string();
            if !text.is_empty() {
                chunks.push(Chunk {
                    section_title: section.title.clone(),
                    text,
                });
            }
        }
    }

    chunks
}

struct Section {
    title: String,
    body: String,
}

fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section {
        title: String::new(),
        body: String::new(),
    };

    for line in markdown.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if !current.body.trim().is_empty() {
                sections.push(current);
            }
            current = Section {
                title: trimmed.trim_start_matches('#').trim().to_string(),
                body: String::new(),
            };
            continue;
        }
        current.body.push_str(line);
        current.body.push('\n');
    }
    if !current.body.trim().is_empty() {
        sections.push(current);
    }
    sections
}

/// Paragraph-then-sentence split. Sentence terminators cover both CJK and
/// Latin punctuation; list items count as sentences of their own.
fn split_sentences(body: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for paragraph in body.split("\n\n") {
        for line in paragraph.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut current = String::new();
            for c in line.chars() {
                current.push(c);
                if matches!(c, '。' | '！' | '？' | '.' | '!' | '?' | '；' | ';') {
                    let sentence = current.trim().to_string();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    current.clear();
                }
            }
            let rest = current.trim().to_string();
            if !rest.is_empty() {
                sentences.push(rest);
            }
        }
    }
    sentences
}

fn tail_chars(text: &str, count: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= count {
        return text.to_string();
    }
    chars[chars.len() - count..].iter().collect()
}

/// Embeds approved minutes and upserts them into the archive collection.
///
/// Idempotent per source: re-archiving deletes the prior chunks for the
/// same `source_id` before inserting the new set. The dimension check runs
/// before any write so a mismatch leaves the collection untouched.
pub struct ArchiveService {
    embedding: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
    settings: ArchiveSettings,
}

impl ArchiveService {
    pub fn new(
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: String,
        settings: ArchiveSettings,
    ) -> Self {
        Self {
            embedding,
            store,
            collection,
            settings,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn archive(&self, record: &MinuteRecord) -> ServiceResult<ArchiveOutcome> {
        if record.markdown.trim().is_empty() {
            return Err(ServiceError::BadInput("markdown content is empty".into()));
        }

        let chunks = chunk_markdown(&record.markdown, &self.settings);
        if chunks.is_empty() {
            return Err(ServiceError::BadInput(
                "markdown produced no archivable chunks".into(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedding.embed(&texts).await?;

        // A pre-existing collection with a different dimension fails here,
        // before any write.
        let dim = self.embedding.dimension();
        self.store.ensure_collection(&self.collection, dim).await?;
        for embedding in &embeddings {
            if embedding.len() != dim {
                return Err(ServiceError::VectorDimMismatch {
                    expected: dim,
                    actual: embedding.len(),
                });
            }
        }

        // Delete-then-insert; the delete is logged so an interrupted run can
        // be completed by simply re-archiving.
        info!(
            source_id = record.source_id,
            chunks = chunks.len(),
            "replacing archived chunks"
        );
        self.store
            .delete_where(&self.collection, json!({ "source_id": record.source_id }))
            .await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (chunk, embedding))| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("source_id".into(), json!(record.source_id));
                metadata.insert("chunk_index".into(), json!(index));
                metadata.insert("section_title".into(), json!(chunk.section_title));
                if let Some(user_id) = &record.user_id {
                    metadata.insert("user_id".into(), json!(user_id));
                }
                if let Some(date) = &record.meeting_date {
                    metadata.insert("meeting_date".into(), json!(date));
                }
                if let Some(department) = &record.department {
                    metadata.insert("department".into(), json!(department));
                }
                VectorRecord {
                    id: format!("{}_{}", record.source_id, index),
                    embedding,
                    document: chunk.text.clone(),
                    metadata,
                }
            })
            .collect();

        self.store.upsert(&self.collection, records).await?;
        debug!(source_id = record.source_id, "archive complete");

        Ok(ArchiveOutcome {
            chunks_count: chunks.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribeflow_providers::embedding::HashEmbeddingProvider;
    use scribeflow_providers::vector::MemoryVectorStore;

    fn settings() -> ArchiveSettings {
        ArchiveSettings {
            chunk_min_chars: 400,
            chunk_max_chars: 800,
            chunk_overlap_chars: 80,
        }
    }

    fn long_markdown() -> String {
        let mut md = String::from("# 项目评审会\n\n");
        for i in 0..32 {
            md.push_str(&format!(
                "第{}项讨论围绕数据中台的接口改造展开，双方确认了里程碑与验收标准，并同意在下一个迭代中完成联调。",
                i
            ));
        }
        md.push_str("\n\n## 决策\n\n");
        for i in 0..20 {
            md.push_str(&format!("决议{}：采用新的发布流程并由平台组负责回滚预案。", i));
        }
        md
    }

    #[test]
    fn chunks_respect_size_bounds() {
        let md = long_markdown();
        assert!(md.chars().count() > 1800);
        let chunks = chunk_markdown(&md, &settings());

        assert!(chunks.len() >= 3 && chunks.len() <= 6, "got {}", chunks.len());
        for chunk in &chunks {
            // Max plus carried overlap is the hard ceiling.
            assert!(chunk.text.chars().count() <= 800 + 80);
        }
        assert_eq!(chunks[0].section_title, "项目评审会");
        assert_eq!(chunks.last().unwrap().section_title, "决策");
    }

    #[test]
    fn adjacent_chunks_share_overlap() {
        let md = long_markdown();
        let chunks = chunk_markdown(&md, &settings());
        let same_section: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.section_title == "项目评审会")
            .collect();
        assert!(same_section.len() >= 2);

        let first = &same_section[0].text;
        let tail: String = first
            .chars()
            .skip(first.chars().count().saturating_sub(40))
            .collect();
        assert!(
            same_section[1].text.contains(tail.trim()),
            "second chunk should carry the first chunk's tail"
        );
    }

    #[test]
    fn short_markdown_is_a_single_chunk() {
        let chunks = chunk_markdown("# 标题\n\n只有一句话。", &settings());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "只有一句话。");
    }

    fn service(store: Arc<MemoryVectorStore>) -> ArchiveService {
        ArchiveService::new(
            Arc::new(HashEmbeddingProvider::new(128)),
            store,
            "minutes".into(),
            settings(),
        )
    }

    fn record(markdown: String) -> MinuteRecord {
        MinuteRecord {
            source_id: 42,
            markdown,
            user_id: Some("u1".into()),
            meeting_date: Some("2026-07-30".into()),
            department: None,
        }
    }

    #[tokio::test]
    async fn archive_twice_is_idempotent() {
        let store = Arc::new(MemoryVectorStore::new());
        let service = service(store.clone());

        let first = service.archive(&record(long_markdown())).await.unwrap();
        let second = service.archive(&record(long_markdown())).await.unwrap();

        assert_eq!(first.chunks_count, second.chunks_count);
        assert_eq!(
            store.count("minutes").await.unwrap(),
            second.chunks_count,
            "re-archiving must replace, not append"
        );
    }

    #[tokio::test]
    async fn empty_markdown_is_rejected() {
        let store = Arc::new(MemoryVectorStore::new());
        let service = service(store);
        let err = service.archive(&record("   ".into())).await.unwrap_err();
        assert_eq!(err.kind(), "BAD_INPUT");
    }

    #[tokio::test]
    async fn dimension_mismatch_leaves_no_partial_writes() {
        let store = Arc::new(MemoryVectorStore::new());
        // Existing collection with a different dimension.
        store.ensure_collection("minutes", 64).await.unwrap();

        let service = service(store.clone());
        let err = service.archive(&record(long_markdown())).await.unwrap_err();
        assert_eq!(err.kind(), "VECTOR_DIM_MISMATCH");
        assert_eq!(store.count("minutes").await.unwrap(), 0);
    }
}
