//! One user action: validate, caption, then optionally speak the caption.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::caption::{Caption, CaptionService, OpenRouterCaptionClient};
use crate::config::{AppConfig, ServiceCredential};
use crate::error::Failure;
use crate::image_input::{DisplayImage, ImageAsset, ImageValidator};
use crate::speech::{AudioAsset, GoogleTranslateSpeech, SpeechSynthesizer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowOptions {
    pub enable_speech: bool,
    /// 0 disables the preview.
    pub display_resize_width: u32,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            enable_speech: true,
            display_resize_width: 600,
        }
    }
}

/// A raw upload as received from the presentation layer.
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Bytes,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

impl Upload {
    pub fn new(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: Some(file_name.into()),
            content_type: None,
        }
    }
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub caption: Caption,
    pub audio: Option<AudioAsset>,
    /// Set when speech was attempted and failed. The caption is still valid.
    pub speech_error: Option<Failure>,
    pub preview: Option<DisplayImage>,
    pub elapsed: Duration,
}

pub struct CaptionWorkflow {
    validator: ImageValidator,
    captioner: Arc<dyn CaptionService>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    credential: Option<ServiceCredential>,
    options: WorkflowOptions,
}

impl CaptionWorkflow {
    pub fn new(
        validator: ImageValidator,
        captioner: Arc<dyn CaptionService>,
        credential: Option<ServiceCredential>,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            validator,
            captioner,
            speech: None,
            credential,
            options,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Wires the production OpenRouter and Google TTS clients.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let captioner = Arc::new(OpenRouterCaptionClient::new(&config.caption)?);
        let options = WorkflowOptions {
            enable_speech: config.speech.enabled,
            display_resize_width: config.display_resize_width,
        };

        let workflow = Self::new(
            ImageValidator::new(config.max_upload_bytes),
            captioner,
            config.credential.clone(),
            options,
        );

        if config.speech.enabled {
            let speech = Arc::new(GoogleTranslateSpeech::new(&config.speech)?);
            Ok(workflow.with_speech(speech))
        } else {
            Ok(workflow)
        }
    }

    pub fn options(&self) -> WorkflowOptions {
        self.options
    }

    pub fn validator(&self) -> &ImageValidator {
        &self.validator
    }

    pub async fn run(&self, upload: Upload) -> Result<WorkflowOutcome, Failure> {
        let started = Instant::now();

        let asset = self
            .validator
            .validate_upload(
                upload.bytes,
                upload.file_name.as_deref(),
                upload.content_type.as_deref(),
            )
            .inspect_err(|failure| tracing::info!(reason = %failure, "Upload rejected"))?;

        let (caption, preview) = tokio::join!(
            self.captioner.caption(&asset, self.credential.as_ref()),
            self.render_preview(&asset),
        );
        let caption = caption?;

        let (audio, speech_error) = self.speak(&caption.text).await;

        Ok(WorkflowOutcome {
            caption,
            audio,
            speech_error,
            preview,
            elapsed: started.elapsed(),
        })
    }

    async fn render_preview(&self, asset: &ImageAsset) -> Option<DisplayImage> {
        let width = self.options.display_resize_width;
        if width == 0 {
            return None;
        }

        let asset = asset.clone();
        match tokio::task::spawn_blocking(move || DisplayImage::from_asset(&asset, width)).await {
            Ok(Ok(preview)) => Some(preview),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Could not build display preview");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Preview task failed");
                None
            }
        }
    }

    async fn speak(&self, text: &str) -> (Option<AudioAsset>, Option<Failure>) {
        let Some(speech) = self.speech.as_ref().filter(|_| self.options.enable_speech) else {
            return (None, None);
        };

        match speech.synthesize(text).await {
            Ok(audio) => (Some(audio), None),
            Err(failure) => {
                tracing::warn!(reason = %failure, "Speech synthesis failed; returning caption only");
                (None, Some(failure))
            }
        }
    }
}
