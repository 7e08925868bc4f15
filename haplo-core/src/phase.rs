use serde::{Deserialize, Serialize};

/// Phases of a single trial, in presentation order.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum TrialPhase {
    #[default]
    Fixation,
    StimulusPresentation,
    PromptDisplay,
    ResponseWait,
    Complete,
}

/// Whether responses are accepted while the prompt is first shown.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPolicy {
    /// Responses keep being collected through the prompt window.
    #[default]
    Continuous,
    /// Only quit is honoured during the prompt window; presses made during it
    /// are discarded when the response wait begins.
    Deferred,
}

impl TrialPhase {
    pub fn polls_input(&self) -> bool {
        matches!(
            self,
            Self::StimulusPresentation | Self::PromptDisplay | Self::ResponseWait
        )
    }

    pub fn collects_responses(&self, policy: PromptPolicy) -> bool {
        match self {
            Self::StimulusPresentation | Self::ResponseWait => true,
            Self::PromptDisplay => policy == PromptPolicy::Continuous,
            Self::Fixation | Self::Complete => false,
        }
    }

    pub fn shows_stimulus(&self) -> bool {
        self.polls_input()
    }

    pub fn shows_prompt(&self) -> bool {
        matches!(self, Self::PromptDisplay | Self::ResponseWait)
    }

    /// Successor phase; any accepted response short-circuits to `Complete`.
    pub fn next(&self, responded: bool) -> Option<Self> {
        use TrialPhase::*;
        Some(match self {
            Complete => return None,
            Fixation => StimulusPresentation,
            _ if responded => Complete,
            StimulusPresentation => PromptDisplay,
            PromptDisplay => ResponseWait,
            ResponseWait => Complete,
        })
    }
}
