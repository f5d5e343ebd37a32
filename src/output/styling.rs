use std::fmt::Display;

use console::{style, StyledObject};

use crate::providers::circleci::WorkflowStatus;

/// How a phase line is colored on the spinner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Active,
    Done,
    Stopped,
}

impl Tone {
    pub fn of(status: &WorkflowStatus) -> Self {
        match status {
            WorkflowStatus::Success => Self::Done,
            s if s.is_failure() => Self::Stopped,
            _ => Self::Active,
        }
    }
}

pub fn phase(tone: Tone, text: impl Display) -> String {
    let styled = style(text.to_string()).bright();
    let styled = match tone {
        Tone::Active => styled.yellow(),
        Tone::Done => styled.green(),
        Tone::Stopped => styled.red(),
    };
    styled.to_string()
}

pub fn heading(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).bright().underlined()
}

pub fn brand(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).magenta().bold()
}

pub fn muted(text: impl Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}
