//! Mock 语音协作者（用于测试，无需麦克风与语音服务）

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::ShellError;
use crate::voice::{AudioBuffer, AudioCapture, CaptureHandle, SpeechSynthesizer, Transcriber};

/// 统计获取次数与当前未释放句柄数的录音设备
#[derive(Debug, Default)]
pub struct MockAudioCapture {
    deny: bool,
    acquired: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl MockAudioCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟权限被拒绝
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// 当前仍被持有的句柄数
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl AudioCapture for MockAudioCapture {
    fn acquire(&self) -> Result<Box<dyn CaptureHandle>, ShellError> {
        if self.deny {
            return Err(ShellError::CaptureUnavailable("permission denied".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCaptureHandle {
            active: Arc::clone(&self.active),
        }))
    }
}

struct MockCaptureHandle {
    active: Arc<AtomicUsize>,
}

impl CaptureHandle for MockCaptureHandle {
    fn finish(self: Box<Self>) -> AudioBuffer {
        AudioBuffer {
            sample_rate: 16_000,
            data: vec![0u8; 320],
        }
    }
}

impl Drop for MockCaptureHandle {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 返回固定文本（或固定错误）的识别服务
#[derive(Debug, Clone)]
pub struct ScriptedTranscriber {
    result: Result<String, ShellError>,
}

impl ScriptedTranscriber {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            result: Ok(text.into()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            result: Err(ShellError::transient("speech recognition", reason)),
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: AudioBuffer) -> Result<String, ShellError> {
        self.result.clone()
    }
}

/// 记录播报文本的合成服务
#[derive(Debug, Default)]
pub struct RecordingSpeech {
    spoken: std::sync::Mutex<Vec<String>>,
}

impl RecordingSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<(), ShellError> {
        if let Ok(mut s) = self.spoken.lock() {
            s.push(text.to_string());
        }
        Ok(())
    }
}
