//! Pipeline Run State
//!
//! A run moves through `Idle → Extracting → Transforming → Loading → Done`
//! with no branching. A failed stage leaves the runner in that stage's state.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Extracting,
    Transforming,
    Loading,
    Done,
}

impl PipelineState {
    /// Returns true once the run has finished every stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Transforming => "transforming",
            PipelineState::Loading => "loading",
            PipelineState::Done => "done",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
