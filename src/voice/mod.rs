//! 语音层：会话状态机、录音 / 识别 / 合成协作者及其测试替身

pub mod mock;
pub mod services;
pub mod session;

pub use mock::{MockAudioCapture, RecordingSpeech, ScriptedTranscriber};
pub use services::{
    AudioBuffer, AudioCapture, CaptureHandle, HttpTranscriber, NoAudioInput, NoTranscriber,
    SilentSpeech, SpeechSynthesizer, Transcriber,
};
pub use session::{VoiceSession, VoiceState};
