//! 回复生成边界
//!
//! 这里只负责把用户记录转换为生成回复所需的上下文：语气提示和 @ 提及要求。
//! 提示词主体与模型调用在外部组件中完成。

use crate::bot::user::{Classification, UserRecord};
use serde::Serialize;

const FRIEND_TONE: &str = "This is a friendly account. Be generous, supportive, and warm even if \
their post is ambiguous or you might disagree. Give them the benefit of the doubt.";

const FOE_TONE: &str = "This is an adversarial account. You can be more critical, sharp, or \
pointed in your response. Don't hold back if their take is bad.";

const JOKSTER_TONE: &str = "This is a JOKSTER - they make jokes and enjoy witty banter. Match \
their playful energy with clever wordplay and humor. Keep it light and FUN. AVOID political \
commentary or hot-button issues - focus on pure comedy and playful teasing.";

const SNARK_TONE: &str = "This is a SNARK account - they use sarcasm and sharp wit. You can be \
sarcastic back, use dry humor, and employ clever burns. Snarky energy is welcome here.";

/// 生成一条回复时可见的用户上下文
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContext {
    pub username: String,
    pub bio: String,
    pub classification: Classification,
    pub verified: bool,
}

impl ReplyContext {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            username: record.username.clone(),
            bio: record.bio.clone(),
            classification: record.classification,
            verified: record.verified,
        }
    }

    /// 分类对应的语气提示；中立用户没有
    pub fn tone_note(&self) -> Option<&'static str> {
        match self.classification {
            Classification::Neutral => None,
            Classification::Friend => Some(FRIEND_TONE),
            Classification::Foe => Some(FOE_TONE),
            Classification::Jokster => Some(JOKSTER_TONE),
            Classification::Snark => Some(SNARK_TONE),
        }
    }

    /// @ 提及要求：认证用户在正文中间提及一次，其余用户不提及
    pub fn mention_instruction(&self) -> String {
        if self.verified && !self.username.is_empty() {
            format!(
                "@MENTION REQUIREMENT:\n\
                 This user is verified. You MUST include @{name} somewhere INSIDE your reply \
                 in a place that reads naturally.\n\
                 - DO NOT put @{name} at the very beginning of your reply.\n\
                 - The @{name} must appear exactly once, naturally embedded in the text.",
                name = self.username
            )
        } else {
            "@MENTION REQUIREMENT:\nDo NOT include any @username in your reply. No @mentions at all."
                .to_string()
        }
    }

    /// 拼接用户上下文段落；用户名和简介都为空时返回空串
    pub fn context_section(&self) -> String {
        if self.username.is_empty() && self.bio.is_empty() {
            return String::new();
        }
        let mut section = String::from("USER CONTEXT:\n");
        if !self.username.is_empty() {
            section.push_str(&format!("Replying to: @{}\n", self.username));
        }
        if !self.bio.is_empty() {
            section.push_str(&format!("Their bio: {}\n", self.bio));
        }
        if let Some(note) = self.tone_note() {
            section.push_str(&format!("\nTONE NOTE: {}\n", note));
        }
        section
    }
}
