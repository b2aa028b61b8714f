use serde::{Deserialize, Serialize};

/// Progress record for detached background work, polled by task id.
///
/// A finished status with empty `text` means the stage ran but produced
/// nothing usable.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskStatus {
    pub text: String,
    pub finished: bool,
}

impl TaskStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn finished(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finished: true,
        }
    }

    /// Finished with no usable output.
    pub fn is_failure(&self) -> bool {
        self.finished && self.text.is_empty()
    }
}

/// Returned by every `submit` call.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TaskId {
    pub task_id: String,
}
