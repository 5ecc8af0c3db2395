use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Vision count estimate confirmed (or corrected) by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiCountLog {
    pub id: String,
    /// Cleared when the item is deleted
    pub item_id: Option<String>,
    pub image_url: String,
    pub ai_count: i32,
    pub confirmed_count: i32,
    pub user_id: String,
    pub user_name: String,
    pub profile_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAiCountLog {
    pub item_id: Option<String>,
    pub image_url: String,
    pub ai_count: i32,
    pub confirmed_count: i32,
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(format!("Unknown chat role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: ChatRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One prior exchange sent along with a chat question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountEstimate {
    pub count: i32,
    pub confidence: String,
    #[serde(default, alias = "message")]
    pub notes: Option<String>,
}
