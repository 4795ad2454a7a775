//! Text-to-speech for captions via the Google Translate TTS endpoint.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::caption::error_chain;
use crate::config::SpeechSettings;
use crate::error::Failure;

pub const MP3_MIME_TYPE: &str = "audio/mpeg";

/// The endpoint refuses longer `q` values.
const MAX_CHUNK_CHARS: usize = 100;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Synthesized speech. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAsset {
    bytes: Bytes,
}

impl AudioAsset {
    pub fn mp3(bytes: impl Into<Bytes>) -> Option<Self> {
        let bytes = bytes.into();
        (!bytes.is_empty()).then_some(Self { bytes })
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        MP3_MIME_TYPE
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioAsset, Failure>;
}

pub struct GoogleTranslateSpeech {
    client: reqwest::Client,
    endpoint: String,
    language: String,
}

impl GoogleTranslateSpeech {
    pub fn new(settings: &SpeechSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/translate_tts", settings.api_base.trim_end_matches('/')),
            language: settings.language.clone(),
        })
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        idx: usize,
        total: usize,
    ) -> Result<Bytes, Failure> {
        let idx = idx.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.language.as_str()),
                ("q", chunk),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| synthesis_failure(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Failure::Synthesis(format!("TTS endpoint returned {status}")));
        }

        response.bytes().await.map_err(|e| synthesis_failure(&e))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioAsset, Failure> {
        if text.trim().is_empty() {
            return Err(Failure::Synthesis("empty text".to_string()));
        }

        let chunks = split_for_tts(text, MAX_CHUNK_CHARS);
        tracing::info!(
            language = %self.language,
            chunks = chunks.len(),
            "Synthesizing caption audio"
        );

        let mut audio = BytesMut::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let part = self.fetch_chunk(chunk, idx, chunks.len()).await?;
            audio.extend_from_slice(&part);
        }

        let asset = AudioAsset::mp3(audio.freeze())
            .ok_or_else(|| Failure::Synthesis("TTS endpoint returned no audio".to_string()))?;

        tracing::debug!(audio_bytes = asset.bytes().len(), "Caption audio ready");
        Ok(asset)
    }
}

fn synthesis_failure(err: &reqwest::Error) -> Failure {
    tracing::warn!(error = %err, "TTS request failed");
    if err.is_timeout() {
        Failure::Synthesis("timeout".to_string())
    } else {
        Failure::Synthesis(error_chain(err))
    }
}

/// Packs whitespace-separated words into chunks of at most `max_chars`
/// characters. Words longer than the limit are split mid-word.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect()));
            continue;
        }

        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
