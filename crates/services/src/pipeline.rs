use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scribeflow_config::Settings;
use scribeflow_providers::asr::{AsrInput, AsrOptions};
use scribeflow_providers::factory::{AsrKind, LlmKind, Providers};
use scribeflow_providers::llm::{clean_completion, LlmOptions};
use scribeflow_transcription::diarize::{self, Diarizer};
use scribeflow_transcription::{
    audio, join_segments, AsrEngine, AudioPreprocessor, HotwordRegistry, TranscriptSegment,
    VoiceprintMatcher,
};

use crate::archive::ArchiveService;
use crate::error::{ServiceError, ServiceResult};
use crate::history::{HistoryRequest, HistoryService};
use crate::markdown;
use crate::orchestrator::LlmOrchestrator;
use crate::template::TemplateResolver;

const SUPPORTED_AUDIO_EXTENSIONS: &[&str] =
    &["wav", "mp3", "m4a", "aac", "flac", "opus", "amr"];

/// One audio item of a batch.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Upload { filename: String, data: Vec<u8> },
    LocalPath(PathBuf),
    RemoteUrl(String),
    StoredId(i64),
}

impl AudioSource {
    fn display_name(&self) -> String {
        match self {
            AudioSource::Upload { filename, .. } => filename.clone(),
            AudioSource::LocalPath(path) => path.display().to_string(),
            AudioSource::RemoteUrl(url) => url.clone(),
            AudioSource::StoredId(id) => format!("audio#{}", id),
        }
    }
}

/// Exactly one input kind per request; the API layer rejects zero or
/// multiple kinds before constructing this.
#[derive(Debug, Clone)]
pub enum InputKind {
    Audio(Vec<AudioSource>),
    Document { filename: String, data: Vec<u8> },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub input: InputKind,
    pub template: String,
    pub user_requirement: Option<String>,
    pub history: HistoryRequest,
    pub asr_model: AsrKind,
    pub llm_model: LlmKind,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
}

/// Per-file failure inside a multi-audio batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileError {
    pub index: usize,
    pub name: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub raw_text: String,
    pub transcript: Vec<TranscriptSegment>,
    pub need_rag: bool,
    pub markdown: String,
    pub html_content: String,
    pub usage_tokens: u32,
    pub file_errors: Vec<FileError>,
}

struct AudioResult {
    index: usize,
    segments: Vec<TranscriptSegment>,
    raw_text: String,
    duration_secs: f64,
}

/// The per-request state machine: input dispatch, per-audio fan-out,
/// merge, history, template, LLM.
pub struct PipelineController {
    settings: Settings,
    providers: Arc<Providers>,
    hotwords: Arc<HotwordRegistry>,
    preprocessor: Arc<AudioPreprocessor>,
    diarizer: Option<Arc<Diarizer>>,
    matcher: Option<Arc<VoiceprintMatcher>>,
    templates: TemplateResolver,
    history: HistoryService,
    orchestrator: LlmOrchestrator,
}

impl PipelineController {
    pub fn new(
        settings: Settings,
        providers: Arc<Providers>,
        hotwords: Arc<HotwordRegistry>,
        diarizer: Option<Arc<Diarizer>>,
        matcher: Option<Arc<VoiceprintMatcher>>,
    ) -> Self {
        let templates = TemplateResolver::new(settings.limits.max_prompt_tokens);
        let history = HistoryService::new(
            providers.embedding.clone(),
            providers.vector.clone(),
            settings.vector.archive_collection.clone(),
            settings.history.clone(),
        );
        Self {
            preprocessor: Arc::new(AudioPreprocessor::new(true)),
            templates,
            history,
            orchestrator: LlmOrchestrator::new(),
            settings,
            providers,
            hotwords,
            diarizer,
            matcher,
        }
    }

    /// Builds the archive service bound to the same store and collection.
    pub fn archive_service(&self) -> ArchiveService {
        ArchiveService::new(
            self.providers.embedding.clone(),
            self.providers.vector.clone(),
            self.settings.vector.archive_collection.clone(),
            self.settings.archive.clone(),
        )
    }

    /// Runs a request under the soft deadline.
    pub async fn process(
        &self,
        request: ProcessRequest,
        cancel: CancellationToken,
    ) -> ServiceResult<ProcessOutcome> {
        let deadline = Duration::from_secs(self.settings.limits.request_deadline_secs);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ServiceError::Cancelled),
            _ = tokio::time::sleep(deadline) => {
                warn!("request exceeded the soft deadline");
                Err(ServiceError::DeadlineExceeded)
            }
            result = self.run(request, &cancel) => result,
        }
    }

    async fn run(
        &self,
        request: ProcessRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<ProcessOutcome> {
        let (raw_text, transcript, file_errors) = match &request.input {
            InputKind::Text(text) => {
                if text.trim().is_empty() {
                    return Err(ServiceError::BadInput("text_content is empty".into()));
                }
                (text.clone(), Vec::new(), Vec::new())
            }
            InputKind::Document { filename, data } => {
                if data.is_empty() {
                    return Err(ServiceError::BadInput("document file is empty".into()));
                }
                let text = crate::document::extract_text(filename, data)?;
                (text, Vec::new(), Vec::new())
            }
            InputKind::Audio(sources) => self.run_audio_batch(sources, &request, cancel).await?,
        };

        if raw_text.trim().is_empty() {
            return Err(ServiceError::BadInput(
                "no usable text could be extracted from the input".into(),
            ));
        }

        // History and generation run serially after the merge.
        let llm = self.providers.select_llm(request.llm_model)?;
        let history_outcome = self
            .history
            .resolve(
                &request.history,
                &llm,
                &raw_text,
                request.user_requirement.as_deref(),
            )
            .await;

        let template = self.templates.resolve(&request.template);
        debug!(source = template.source, "template resolved");
        let prompt = self.templates.render(
            &template,
            &raw_text,
            Some(history_outcome.context.as_str()),
            request.user_requirement.as_deref(),
        )?;

        let opts = LlmOptions {
            temperature: request.llm_temperature.clamp(0.0, 2.0),
            max_tokens: request.llm_max_tokens.max(1),
            model: None,
        };
        let completion = self
            .orchestrator
            .generate(&llm, &prompt, &opts, cancel)
            .await?;

        let minutes_markdown = clean_completion(&completion.text);
        let html_content = markdown::render_html(&minutes_markdown);

        Ok(ProcessOutcome {
            raw_text,
            transcript,
            need_rag: history_outcome.need_rag,
            markdown: minutes_markdown,
            html_content,
            usage_tokens: completion.usage_tokens,
            file_errors,
        })
    }

    async fn run_audio_batch(
        &self,
        sources: &[AudioSource],
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<(String, Vec<TranscriptSegment>, Vec<FileError>)> {
        if sources.is_empty() {
            return Err(ServiceError::BadInput("no audio supplied".into()));
        }

        // Uploaded payloads are spooled into a per-request directory that
        // is removed with this guard on every exit path.
        std::fs::create_dir_all(&self.settings.app.temp_dir)
            .map_err(|e| ServiceError::Internal(format!("temp dir unavailable: {}", e)))?;
        let temp_dir = tempfile::Builder::new()
            .prefix("req_")
            .tempdir_in(&self.settings.app.temp_dir)
            .map_err(|e| ServiceError::Internal(format!("temp dir unavailable: {}", e)))?;

        let parallelism = sources
            .len()
            .min(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            )
            .min(self.settings.limits.max_audio_workers.max(1));
        debug!(files = sources.len(), parallelism, "audio fan-out starting");

        let hotword_blob = self.hotwords.render();
        let temp_path = temp_dir.path();
        let results: Vec<Result<AudioResult, (usize, String, ServiceError)>> =
            futures::stream::iter(sources.iter().cloned().enumerate().map(
                |(index, source)| {
                    let hotword_blob = hotword_blob.clone();
                    async move {
                        let name = source.display_name();
                        self.process_one_audio(
                            index,
                            source,
                            temp_path,
                            &hotword_blob,
                            request,
                            cancel,
                        )
                        .await
                        .map_err(|e| (index, name, e))
                    }
                },
            ))
            .buffered(parallelism)
            .collect()
            .await;

        let mut failures: Vec<(usize, String, ServiceError)> = Vec::new();
        let mut succeeded = Vec::new();
        for result in results {
            match result {
                Ok(audio_result) => succeeded.push(audio_result),
                Err(failure) => {
                    warn!(
                        index = failure.0,
                        name = %failure.1,
                        kind = failure.2.kind(),
                        "audio file failed"
                    );
                    failures.push(failure);
                }
            }
        }

        // All files failed: surface the first error as the request error.
        if succeeded.is_empty() {
            return Err(failures.remove(0).2);
        }

        let file_errors: Vec<FileError> = failures
            .into_iter()
            .map(|(index, name, error)| FileError {
                index,
                name,
                kind: error.kind().to_string(),
                message: error.to_string(),
            })
            .collect();

        // Merge in submission order with a monotone timeline: each file's
        // timestamps shift by the cumulative duration of prior files, and
        // speaker ids re-densify across the whole batch.
        succeeded.sort_by_key(|r| r.index);
        let mut merged = Vec::new();
        let mut raw_parts = Vec::new();
        let mut offset = 0.0f64;
        let mut dense: HashMap<(usize, u32), u32> = HashMap::new();
        let mut next_id = 0u32;

        for file in succeeded {
            for mut segment in file.segments {
                segment.start_s += offset;
                segment.end_s += offset;
                let id = *dense
                    .entry((file.index, segment.speaker_id))
                    .or_insert_with(|| {
                        let id = next_id;
                        next_id += 1;
                        id
                    });
                segment.speaker_id = id;
                merged.push(segment);
            }
            raw_parts.push(file.raw_text);
            offset += file.duration_secs;
        }

        let raw_text = if merged.is_empty() {
            raw_parts.join("\n")
        } else {
            join_segments(&merged)
        };

        info!(
            segments = merged.len(),
            failed = file_errors.len(),
            "audio batch merged"
        );
        Ok((raw_text, merged, file_errors))
    }

    async fn process_one_audio(
        &self,
        index: usize,
        source: AudioSource,
        temp_dir: &Path,
        hotword_blob: &str,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> ServiceResult<AudioResult> {
        let (input, local_bytes) = self.resolve_source(index, source, temp_dir).await?;

        let provider = self.providers.select_asr(request.asr_model)?;
        let engine = AsrEngine::new(provider, self.settings.asr.max_audio_duration_secs);
        let opts = AsrOptions {
            enable_punctuation: self.settings.asr.enable_punctuation,
            enable_diarization: self.settings.diarization.enabled,
            hotword_blob: hotword_blob.to_string(),
            language_hint: self.settings.asr.language_hint.clone(),
        };

        let outcome = engine.recognize(input.clone(), &opts, cancel).await?;
        let mut segments = outcome.segments;

        // Alias pass: canonical spellings from the hotword table replace
        // recognizer variants.
        let table = self.hotwords.snapshot();
        if !table.mappings.is_empty() {
            for segment in &mut segments {
                segment.text = table.apply_aliases(&segment.text);
            }
        }

        // Provider gave no speaker labels: bring in the diarizer sidecar
        // and vote segments onto its turns. Best-effort.
        if self.settings.diarization.enabled
            && segments.iter().all(|s| s.speaker_label.is_none())
        {
            if let Some(diarizer) = &self.diarizer {
                match diarizer.diarize(input).await {
                    Ok(turns) if !turns.is_empty() => {
                        diarize::assign_speakers(&mut segments, &turns)
                    }
                    Ok(_) => debug!(index, "diarizer returned no turns"),
                    Err(e) => warn!(index, %e, "diarization failed, keeping single speaker"),
                }
            }
        }

        let mut transcript = diarize::densify(segments);

        // Voiceprint matching needs the local audio; URL inputs skip it.
        if self.settings.diarization.enabled {
            if let (Some(matcher), Some(bytes)) = (&self.matcher, &local_bytes) {
                if audio::is_wav(bytes) {
                    match audio::decode_wav(bytes) {
                        Ok(recording) => {
                            matcher.match_speakers(&recording, &mut transcript).await
                        }
                        Err(e) => warn!(index, %e, "could not decode audio for voiceprints"),
                    }
                }
            }
        }

        let duration_secs = local_bytes
            .as_deref()
            .filter(|b| audio::is_wav(b))
            .and_then(|b| audio::wav_duration_secs(b).ok())
            .or_else(|| transcript.iter().map(|s| s.end_s).fold(None, |max, e| {
                Some(f64::max(max.unwrap_or(0.0), e))
            }))
            .unwrap_or(0.0);

        let raw_text = if transcript.is_empty() {
            table.apply_aliases(&outcome.full_text)
        } else {
            join_segments(&transcript)
        };

        Ok(AudioResult {
            index,
            segments: transcript,
            raw_text,
            duration_secs,
        })
    }

    /// Resolves a source into provider input plus locally held bytes
    /// (uploads and paths keep their bytes for voiceprint matching).
    async fn resolve_source(
        &self,
        index: usize,
        source: AudioSource,
        temp_dir: &Path,
    ) -> ServiceResult<(AsrInput, Option<Vec<u8>>)> {
        let spool_upload = matches!(source, AudioSource::Upload { .. });
        let (filename, data) = match source {
            AudioSource::RemoteUrl(url) => {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ServiceError::BadInput(format!(
                        "audio url is not http(s): {}",
                        url
                    )));
                }
                return Ok((AsrInput::Url(url), None));
            }
            AudioSource::Upload { filename, data } => (filename, data),
            AudioSource::LocalPath(path) => {
                let data = tokio::fs::read(&path).await.map_err(|e| {
                    ServiceError::BadInput(format!(
                        "audio path unreadable {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                (path.display().to_string(), data)
            }
            AudioSource::StoredId(id) => {
                let path = PathBuf::from(&self.settings.asr.audio_store_dir)
                    .join(format!("{}.wav", id));
                let data = tokio::fs::read(&path).await.map_err(|e| {
                    ServiceError::BadInput(format!("stored audio {} unreadable: {}", id, e))
                })?;
                (format!("{}.wav", id), data)
            }
        };

        if data.is_empty() {
            return Err(ServiceError::BadInput(format!("{} is empty", filename)));
        }
        if data.len() > self.settings.limits.max_upload_bytes {
            return Err(ServiceError::BadInput(format!(
                "{} exceeds the {} byte upload limit",
                filename, self.settings.limits.max_upload_bytes
            )));
        }
        let extension = filename
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ServiceError::UnsupportedFormat(format!(
                "unsupported audio extension: .{}",
                extension
            )));
        }

        if spool_upload {
            let base = Path::new(&filename)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("audio.{}", extension));
            let spooled = temp_dir.join(format!("{}_{}", index, base));
            if let Err(e) = tokio::fs::write(&spooled, &data).await {
                warn!(index, %e, "could not spool upload to the temp dir");
            }
        }

        let processed = self.preprocessor.process(data);
        Ok((
            AsrInput::Bytes {
                filename,
                data: processed.clone(),
            },
            Some(processed),
        ))
    }
}
