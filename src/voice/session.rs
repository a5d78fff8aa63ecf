//! 语音会话状态机
//!
//! Idle --start--> Listening --stop--> Processing --(识别结果)--> Idle；
//! Idle --speak--> Speaking --(结束 | 出错)--> Idle。
//! 录音句柄只在 Listening 期间存在，由会话独占；没有成功获取句柄绝不进入 Listening。

use std::fmt;

use serde::Serialize;

use crate::core::ShellError;
use crate::voice::{AudioBuffer, AudioCapture, CaptureHandle};

/// 语音状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VoiceState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl fmt::Display for VoiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        };
        f.write_str(s)
    }
}

/// 每个外壳实例唯一的语音会话
pub struct VoiceSession {
    state: VoiceState,
    capture: Option<Box<dyn CaptureHandle>>,
}

impl fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceSession")
            .field("state", &self.state)
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

impl Default for VoiceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSession {
    pub fn new() -> Self {
        Self {
            state: VoiceState::Idle,
            capture: None,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// 开始录音；已在录音时返回 ResourceConflict 并保留原有录音
    pub fn start(&mut self, device: &dyn AudioCapture) -> Result<(), ShellError> {
        match self.state {
            VoiceState::Idle => {}
            VoiceState::Listening => {
                return Err(ShellError::ResourceConflict(
                    "audio capture already active".to_string(),
                ))
            }
            other => return Err(invalid(other, "start listening")),
        }
        let handle = device.acquire().map_err(|e| {
            tracing::warn!(error = %e, "audio capture acquisition failed");
            e
        })?;
        self.capture = Some(handle);
        self.state = VoiceState::Listening;
        tracing::info!("voice listening");
        Ok(())
    }

    /// 停止录音：释放设备并返回缓冲的音频，进入 Processing
    pub fn stop(&mut self) -> Result<AudioBuffer, ShellError> {
        if self.state != VoiceState::Listening {
            return Err(invalid(self.state, "stop listening"));
        }
        let buffer = match self.capture.take() {
            Some(handle) => handle.finish(),
            None => AudioBuffer::default(),
        };
        self.state = VoiceState::Processing;
        tracing::info!(bytes = buffer.data.len(), "voice processing");
        Ok(buffer)
    }

    /// 识别完成：回到 Idle；非空文本需转交给操作中介
    pub fn transcript_ready(
        &mut self,
        result: Result<String, ShellError>,
    ) -> Result<Option<String>, ShellError> {
        if self.state != VoiceState::Processing {
            return Err(invalid(self.state, "accept transcript"));
        }
        self.state = VoiceState::Idle;
        let text = result?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    /// 开始播报
    pub fn begin_speaking(&mut self) -> Result<(), ShellError> {
        if self.state != VoiceState::Idle {
            return Err(invalid(self.state, "speak"));
        }
        self.state = VoiceState::Speaking;
        Ok(())
    }

    /// 播报结束或出错：回到 Idle，并把播报错误原样返回
    pub fn speaking_finished(&mut self, result: Result<(), ShellError>) -> Result<(), ShellError> {
        if self.state != VoiceState::Speaking {
            return Err(invalid(self.state, "finish speaking"));
        }
        self.state = VoiceState::Idle;
        result
    }

    /// 外壳关闭或助手面板隐藏：无论处于何种状态都释放录音并回到 Idle
    pub fn teardown(&mut self) {
        if self.capture.take().is_some() {
            tracing::info!("voice capture released on teardown");
        }
        self.state = VoiceState::Idle;
    }
}

fn invalid(state: VoiceState, event: &str) -> ShellError {
    ShellError::InvalidTransition {
        state: state.to_string(),
        event: event.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::MockAudioCapture;

    #[test]
    fn test_happy_path_releases_capture() {
        let mic = MockAudioCapture::new();
        let mut voice = VoiceSession::new();

        voice.start(&mic).unwrap();
        assert_eq!(voice.state(), VoiceState::Listening);
        assert_eq!(mic.active(), 1);

        let audio = voice.stop().unwrap();
        assert!(!audio.is_empty());
        assert_eq!(voice.state(), VoiceState::Processing);
        assert_eq!(mic.active(), 0);

        let text = voice.transcript_ready(Ok(" 搜索 张三 ".into())).unwrap();
        assert_eq!(text.as_deref(), Some("搜索 张三"));
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_double_start_is_conflict_and_keeps_first() {
        let mic = MockAudioCapture::new();
        let mut voice = VoiceSession::new();
        voice.start(&mic).unwrap();

        let err = voice.start(&mic).unwrap_err();
        assert!(matches!(err, ShellError::ResourceConflict(_)));
        assert_eq!(voice.state(), VoiceState::Listening);
        assert_eq!(mic.acquired(), 1);
        assert_eq!(mic.active(), 1);
    }

    #[test]
    fn test_denied_permission_stays_idle() {
        let mic = MockAudioCapture::denied();
        let mut voice = VoiceSession::new();
        let err = voice.start(&mic).unwrap_err();
        assert!(matches!(err, ShellError::CaptureUnavailable(_)));
        assert_eq!(voice.state(), VoiceState::Idle);
        assert!(!voice.is_capturing());
    }

    #[test]
    fn test_teardown_releases_from_listening() {
        let mic = MockAudioCapture::new();
        let mut voice = VoiceSession::new();
        voice.start(&mic).unwrap();
        voice.teardown();
        assert_eq!(mic.active(), 0);
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_drop_releases_capture() {
        let mic = MockAudioCapture::new();
        {
            let mut voice = VoiceSession::new();
            voice.start(&mic).unwrap();
        }
        assert_eq!(mic.active(), 0);
    }

    #[test]
    fn test_transcription_failure_returns_to_idle() {
        let mic = MockAudioCapture::new();
        let mut voice = VoiceSession::new();
        voice.start(&mic).unwrap();
        voice.stop().unwrap();
        let err = voice
            .transcript_ready(Err(ShellError::transient("speech recognition", "timeout")))
            .unwrap_err();
        assert!(err.is_service_failure());
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_empty_transcript_not_forwarded() {
        let mic = MockAudioCapture::new();
        let mut voice = VoiceSession::new();
        voice.start(&mic).unwrap();
        voice.stop().unwrap();
        assert_eq!(voice.transcript_ready(Ok("   ".into())).unwrap(), None);
    }

    #[test]
    fn test_speaking_cycle_and_guards() {
        let mic = MockAudioCapture::new();
        let mut voice = VoiceSession::new();
        voice.begin_speaking().unwrap();
        assert_eq!(voice.state(), VoiceState::Speaking);
        assert!(matches!(
            voice.start(&mic),
            Err(ShellError::InvalidTransition { .. })
        ));
        assert_eq!(mic.acquired(), 0);

        assert!(voice
            .speaking_finished(Err(ShellError::transient("speech synthesis", "device lost")))
            .is_err());
        assert_eq!(voice.state(), VoiceState::Idle);
    }

    #[test]
    fn test_invalid_events() {
        let mut voice = VoiceSession::new();
        assert!(matches!(voice.stop(), Err(ShellError::InvalidTransition { .. })));
        assert!(voice.transcript_ready(Ok("x".into())).is_err());
        assert!(voice.speaking_finished(Ok(())).is_err());
        assert_eq!(voice.state(), VoiceState::Idle);
    }
}
