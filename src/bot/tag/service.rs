//! 标签处理服务层
//!
//! 一轮处理：读取水位线 -> 增量抓取 -> 解析标签 -> 修改注册表 -> 推进水位线。
//! 抓取失败时本轮中止且不推进水位线；单条失败只记录日志并跳过。

use crate::bot::config::BotConfig;
use crate::bot::error::{BotError, Result};
use crate::bot::search::{FetchedItem, IncrementalFetcher, SearchCapability, XApiClient};
use crate::bot::tag::listener::{EmptyTagListener, TagListener};
use crate::bot::tag::parser::{TagKind, TagVariant};
use crate::bot::user::UserRegistry;
use crate::bot::watermark::WatermarkStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 一轮标签处理的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub added: u32,
    pub removed: u32,
    /// 注册表层面的跳过（重复添加、删除不存在的用户）；不含无标签的回复
    pub skipped: u32,
    /// 单条处理失败（资料不完整、写文件失败）
    pub errors: u32,
    /// 新增用户按标签种类分桶
    pub variant_counts: BTreeMap<TagKind, u32>,
    /// 抓取失败，本轮未处理任何回复，水位线未推进
    pub fetch_failed: bool,
}

impl TagSummary {
    fn fetch_failed() -> Self {
        Self {
            fetch_failed: true,
            ..Default::default()
        }
    }
}

/// 标签处理器
pub struct TagProcessor {
    fetcher: IncrementalFetcher,
    registry: UserRegistry,
    watermark: WatermarkStore,
    listener: Arc<dyn TagListener>,
}

impl TagProcessor {
    /// 创建标签处理器（使用默认空监听器）
    pub fn new(
        fetcher: IncrementalFetcher,
        registry: UserRegistry,
        watermark: WatermarkStore,
    ) -> Self {
        Self::with_listener(fetcher, registry, watermark, Arc::new(EmptyTagListener))
    }

    /// 创建标签处理器（带自定义监听器）
    pub fn with_listener(
        fetcher: IncrementalFetcher,
        registry: UserRegistry,
        watermark: WatermarkStore,
        listener: Arc<dyn TagListener>,
    ) -> Self {
        Self {
            fetcher,
            registry,
            watermark,
            listener,
        }
    }

    /// 按配置创建：X 搜索客户端 + CSV 注册表 + JSON 水位线
    pub fn from_config(config: &BotConfig, listener: Arc<dyn TagListener>) -> Result<Self> {
        config.validate_for_network()?;
        let capability: Arc<dyn SearchCapability> = Arc::new(XApiClient::from_config(config)?);
        info!(
            "[Tag] 创建标签处理器，机器人账号: @{}, 注册表: {}",
            config.bot_handle,
            config.registry_path().display()
        );
        let fetcher = IncrementalFetcher::new(
            capability,
            config.bot_handle.clone(),
            config.tag_prefix.clone(),
            config.max_lookback(),
            config.max_results,
        );
        let registry = UserRegistry::open(config.registry_path())?;
        let watermark = WatermarkStore::new(config.watermark_path(), config.max_lookback());
        Ok(Self::with_listener(fetcher, registry, watermark, listener))
    }

    pub fn registry(&self) -> &UserRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut UserRegistry {
        &mut self.registry
    }

    pub fn into_registry(self) -> UserRegistry {
        self.registry
    }

    pub fn watermark(&self) -> &WatermarkStore {
        &self.watermark
    }

    /// 执行一轮标签处理
    pub async fn run_once(&mut self) -> TagSummary {
        info!("[Tag] 🔄 开始检查新的控制标签...");

        // 预检只记录问题，不阻断本轮
        self.registry.validate_integrity();

        let since = self.watermark.load();
        let items = match self.fetcher.fetch(since).await {
            Ok(items) => items,
            Err(e) => {
                error!(
                    "[Tag] ❌ 抓取标签回复失败，本轮中止，水位线保持 {}: {}",
                    since.to_rfc3339(),
                    e
                );
                let summary = TagSummary::fetch_failed();
                self.notify_finished(&summary).await;
                return summary;
            }
        };

        let mut summary = TagSummary::default();
        for item in &items {
            if let Err(e) = self.process_item(item, &mut summary).await {
                summary.errors += 1;
                warn!(
                    "[Tag] ⚠️ 处理帖子 {}（@{}）失败，已跳过: {}",
                    item.item_id, item.target_username, e
                );
            }
        }

        // 空窗口也推进水位线，避免重复搜索同一时间段
        if let Err(e) = self.watermark.save(Utc::now()) {
            error!("[Tag] 保存水位线失败: {}", e);
        }

        info!(
            "[Tag] ✅ 标签处理完成 - 新增: {}, 删除: {}, 跳过: {}, 失败: {}",
            summary.added, summary.removed, summary.skipped, summary.errors
        );
        for (kind, count) in &summary.variant_counts {
            info!("[Tag]   {}: {}", kind, count);
        }

        self.notify_finished(&summary).await;
        summary
    }

    async fn process_item(&mut self, item: &FetchedItem, summary: &mut TagSummary) -> Result<()> {
        let Some(variant) = TagVariant::parse(&item.text, &item.target_username) else {
            debug!("[Tag] 帖子 {} 不含可识别的标签", item.item_id);
            return Ok(());
        };

        info!(
            "[Tag] [{}] 处理 @{}（帖子 {}）",
            variant.kind, variant.target_username, item.item_id
        );

        if variant.kind.is_remove() {
            if self.registry.remove(&variant.target_username)? {
                summary.removed += 1;
                self.listener
                    .on_user_removed(variant.target_username.clone())
                    .await;
            } else {
                summary.skipped += 1;
            }
            return Ok(());
        }

        if self.registry.contains(&variant.target_username) {
            info!("[Tag] @{} 已在轮换名单中，跳过", variant.target_username);
            summary.skipped += 1;
            return Ok(());
        }

        item.target_profile
            .validate()
            .map_err(|reason| BotError::MalformedProfile {
                item_id: item.item_id.clone(),
                reason,
            })?;

        let classification = variant.kind.classification().unwrap_or_default();
        let Some(record) = self.registry.insert_classified(
            &item.target_profile,
            classification,
            variant.kind.is_priority(),
        )?
        else {
            summary.skipped += 1;
            return Ok(());
        };

        summary.added += 1;
        *summary.variant_counts.entry(variant.kind).or_insert(0) += 1;

        match serde_json::to_string(&record) {
            Ok(json) => self.listener.on_user_added(json).await,
            Err(e) => warn!(
                "[Tag] 序列化用户 @{} 失败，未通知监听器: {}",
                record.username, e
            ),
        }
        Ok(())
    }

    async fn notify_finished(&self, summary: &TagSummary) {
        match serde_json::to_string(summary) {
            Ok(json) => self.listener.on_process_finished(json).await,
            Err(e) => warn!("[Tag] 序列化本轮汇总失败，未通知监听器: {}", e),
        }
    }
}
