//! 标签处理监听器回调接口

use async_trait::async_trait;

/// 标签处理监听器回调接口
#[async_trait]
pub trait TagListener: Send + Sync {
    /// 通过标签新增了用户，参数为用户记录的 JSON 字符串
    async fn on_user_added(&self, user_json: String);

    /// 通过删除标签移除了用户
    async fn on_user_removed(&self, username: String);

    /// 一轮处理结束，参数为汇总的 JSON 字符串
    async fn on_process_finished(&self, summary_json: String);
}

/// 默认空实现（无操作）
pub struct EmptyTagListener;

#[async_trait]
impl TagListener for EmptyTagListener {
    async fn on_user_added(&self, _user_json: String) {}

    async fn on_user_removed(&self, _username: String) {}

    async fn on_process_finished(&self, _summary_json: String) {}
}
