//! 控制标签解析
//!
//! 机器人在回复中嵌入 `[[ADD-...]]` 形式的标签来管理轮换名单。
//! 解析是纯函数：大小写不敏感、位置无关，每段文本最多得到一个标签。

use crate::bot::user::models::Classification;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 所有标签共享的前缀（小写），也是搜索时使用的宽匹配短语
pub const TAG_PREFIX: &str = "[[add";

/// 标签种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagKind {
    Add,
    AddFriend,
    AddFoe,
    AddPriority,
    AddJokster,
    AddSnark,
    Remove,
}

/// 添加类标签的固定扫描顺序；删除标签优先于全部添加标签，单独处理
const ADD_SCAN_ORDER: [TagKind; 6] = [
    TagKind::AddFriend,
    TagKind::AddFoe,
    TagKind::AddJokster,
    TagKind::AddSnark,
    TagKind::AddPriority,
    TagKind::Add,
];

impl TagKind {
    /// 全部标签种类
    pub const ALL: [TagKind; 7] = [
        TagKind::Add,
        TagKind::AddFriend,
        TagKind::AddFoe,
        TagKind::AddPriority,
        TagKind::AddJokster,
        TagKind::AddSnark,
        TagKind::Remove,
    ];

    /// 标签在文本中的书写形式（小写）
    pub fn token(self) -> &'static str {
        match self {
            TagKind::Add => "[[add]]",
            TagKind::AddFriend => "[[add-friend]]",
            TagKind::AddFoe => "[[add-foe]]",
            TagKind::AddPriority => "[[add-priority]]",
            TagKind::AddJokster => "[[add-jokster]]",
            TagKind::AddSnark => "[[add-snark]]",
            TagKind::Remove => "[[add-remove]]",
        }
    }

    /// 标签对应的用户分类；删除标签没有分类
    pub fn classification(self) -> Option<Classification> {
        match self {
            TagKind::Add | TagKind::AddPriority => Some(Classification::Neutral),
            TagKind::AddFriend => Some(Classification::Friend),
            TagKind::AddFoe => Some(Classification::Foe),
            TagKind::AddJokster => Some(Classification::Jokster),
            TagKind::AddSnark => Some(Classification::Snark),
            TagKind::Remove => None,
        }
    }

    pub fn is_remove(self) -> bool {
        self == TagKind::Remove
    }

    /// 是否需要同时打上优先标记
    pub fn is_priority(self) -> bool {
        self == TagKind::AddPriority
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagKind::Add => "DEFAULT",
            TagKind::AddFriend => "FRIEND",
            TagKind::AddFoe => "FOE",
            TagKind::AddPriority => "PRIORITY",
            TagKind::AddJokster => "JOKSTER",
            TagKind::AddSnark => "SNARK",
            TagKind::Remove => "REMOVE",
        };
        f.write_str(name)
    }
}

/// 解析结果：标签种类 + 目标用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagVariant {
    pub kind: TagKind,
    pub target_username: String,
}

impl TagVariant {
    /// 解析回复文本，并绑定被回复的目标用户
    pub fn parse(text: &str, target_username: &str) -> Option<Self> {
        parse_tag(text).map(|kind| TagVariant {
            kind,
            target_username: target_username.trim_start_matches('@').to_string(),
        })
    }
}

/// 判断文本中是否含有控制标签，返回唯一的标签种类
pub fn parse_tag(text: &str) -> Option<TagKind> {
    let lower = text.to_lowercase();

    // 绝大多数回复不含标签，先用公共前缀快速排除
    if !lower.contains(TAG_PREFIX) {
        return None;
    }

    if lower.contains(TagKind::Remove.token()) {
        return Some(TagKind::Remove);
    }

    ADD_SCAN_ORDER
        .iter()
        .copied()
        .find(|kind| lower.contains(kind.token()))
}
