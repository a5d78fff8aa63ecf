//! 语音协作者：录音设备、语音识别（ASR）、语音合成（TTS）
//!
//! 录音句柄由 VoiceSession 独占持有；句柄被 drop 即释放设备，因此离开 Listening 的每条路径都会释放。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::ShellError;

/// 录音得到的音频数据
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub data: Vec<u8>,
}

impl AudioBuffer {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 已获取的录音资源；drop 时释放设备
pub trait CaptureHandle: Send {
    /// 结束录音并取出缓冲的音频
    fn finish(self: Box<Self>) -> AudioBuffer;
}

/// 录音设备
pub trait AudioCapture: Send + Sync {
    /// 获取录音资源；无设备或权限被拒绝时返回 CaptureUnavailable
    fn acquire(&self) -> Result<Box<dyn CaptureHandle>, ShellError>;
}

/// 语音识别服务
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: AudioBuffer) -> Result<String, ShellError>;
}

/// 语音合成服务：返回即表示播报结束
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), ShellError>;
}

/// 未配置录音设备时使用：总是不可用
#[derive(Debug, Default)]
pub struct NoAudioInput;

impl AudioCapture for NoAudioInput {
    fn acquire(&self) -> Result<Box<dyn CaptureHandle>, ShellError> {
        Err(ShellError::CaptureUnavailable(
            "no audio input device configured".to_string(),
        ))
    }
}

/// 关闭 TTS 时使用：立即结束
#[derive(Debug, Default)]
pub struct SilentSpeech;

#[async_trait]
impl SpeechSynthesizer for SilentSpeech {
    async fn speak(&self, text: &str) -> Result<(), ShellError> {
        tracing::debug!(chars = text.chars().count(), "tts disabled; skipping utterance");
        Ok(())
    }
}

/// 未配置 ASR 接口时使用：识别总是失败
#[derive(Debug, Default)]
pub struct NoTranscriber;

#[async_trait]
impl Transcriber for NoTranscriber {
    async fn transcribe(&self, _audio: AudioBuffer) -> Result<String, ShellError> {
        Err(ShellError::transient(
            "speech recognition",
            "no ASR endpoint configured",
        ))
    }
}

#[derive(Debug, Deserialize)]
struct AsrResponse {
    #[serde(alias = "result")]
    text: Option<String>,
}

/// 第三方 ASR HTTP 接口：POST 原始音频，响应 JSON `{"text": "..."}`
pub struct HttpTranscriber {
    endpoint: String,
    api_key: Option<String>,
    language: String,
    http: reqwest::Client,
}

impl HttpTranscriber {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        language: &str,
        timeout_secs: u64,
    ) -> Result<Self, ShellError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| ShellError::Config(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            api_key,
            language: language.to_string(),
            http,
        })
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: AudioBuffer) -> Result<String, ShellError> {
        let rate = audio.sample_rate.to_string();
        let mut req = self
            .http
            .post(&self.endpoint)
            .query(&[("language", self.language.as_str()), ("rate", rate.as_str())])
            .header("Content-Type", "application/octet-stream")
            .body(audio.data);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ShellError::transient("speech recognition", e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ShellError::transient("speech recognition", format!("HTTP {status}")));
        }
        let parsed: AsrResponse = response
            .json()
            .await
            .map_err(|e| ShellError::transient("speech recognition", e.to_string()))?;
        Ok(parsed.text.unwrap_or_default().trim().to_string())
    }
}
