use serde::{Deserialize, Serialize};

/// Optional conversational state a caller can attach to an utterance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskContext>,
    #[serde(default, alias = "recentHistory", skip_serializing_if = "Vec::is_empty")]
    pub recent_history: Vec<HistoryTurn>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, alias = "dueDate", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub bot: String,
}

impl ConversationContext {
    pub fn with_task(task: TaskContext) -> Self {
        Self { task: Some(task), recent_history: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.task.is_none() && self.recent_history.is_empty()
    }
}

impl TaskContext {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()), ..Self::default() }
    }
}
