//! 核心编排层：错误、状态投影、会话监管、外壳聚合、主控循环

pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod shell;
pub mod state;

pub use error::ShellError;
pub use orchestrator::{build_collaborators, create_shell, spawn_shell, Command, RuntimeOptions};
pub use session_supervisor::SessionSupervisor;
pub use shell::{
    Collaborators, ExecutionPlan, ExecutionReport, ProposalRequest, Shell, ShellOptions,
};
pub use state::{ShellPhase, UiState};
