//! 社交机器人 CLI
//!
//! 非交互式 CLI，每次调用执行一个操作后退出，由外部调度器定时触发

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use social_bot_core::bot::compose::ReplyContext;
use social_bot_core::bot::ledger::ReplyLedger;
use social_bot_core::bot::profile::ProfileRefresher;
use social_bot_core::bot::tag::TagListener;
use social_bot_core::bot::user::{resort_registry, EngagementOutcome};
use social_bot_core::{
    BotConfig, Classification, RotationPolicy, RotationSelector, TagProcessor, UserRegistry,
    XApiClient,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 社交机器人 CLI
#[derive(Parser, Debug)]
#[command(name = "social-bot-cli")]
#[command(about = "社交机器人 CLI - 标签处理与轮换选择", long_about = None)]
struct Args {
    /// 配置文件路径（JSON）
    #[arg(short, long, default_value = "bot_config.json")]
    config: PathBuf,

    /// 覆盖配置中的数据目录
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 日志级别（默认: info,social_bot_core=debug）
    #[arg(long, default_value = "info,social_bot_core=debug")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 检查新的控制标签并更新注册表
    ProcessTags,
    /// 选择下一个互动用户
    Next {
        /// 覆盖配置中的轮换策略
        #[arg(long, value_enum)]
        policy: Option<RotationPolicy>,
        /// 不查询最新资料，直接使用注册表中的记录
        #[arg(long)]
        no_refresh: bool,
    },
    /// 注册表完整性检查
    Validate,
    /// 列出注册表中的用户
    List,
    /// 设置用户分类（neutral / friend / foe / jokster / snark）
    Classify { username: String, classification: String },
    /// 设置或取消优先标记
    Priority {
        username: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// 从注册表删除用户
    Remove { username: String },
    /// 回报一次互动结果
    Outcome {
        username: String,
        #[arg(value_enum)]
        outcome: OutcomeArg,
        /// 已回复的帖子 ID，记入已回复列表
        #[arg(long)]
        post_id: Option<String>,
    },
    /// 按分类与互动率重排注册表
    Sort,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutcomeArg {
    Replied,
    Skipped,
    NoCandidate,
}

impl From<OutcomeArg> for EngagementOutcome {
    fn from(value: OutcomeArg) -> Self {
        match value {
            OutcomeArg::Replied => EngagementOutcome::Replied,
            OutcomeArg::Skipped => EngagementOutcome::Skipped,
            OutcomeArg::NoCandidate => EngagementOutcome::NoCandidate,
        }
    }
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .context("无法创建日志文件 debug.log")?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// 输出所有标签事件
struct CliTagListener;

#[async_trait::async_trait]
impl TagListener for CliTagListener {
    async fn on_user_added(&self, user_json: String) {
        info!("[CLI/Tag] ➕ 新增用户: {}", user_json);
    }

    async fn on_user_removed(&self, username: String) {
        info!("[CLI/Tag] ➖ 删除用户: @{}", username);
    }

    async fn on_process_finished(&self, summary_json: String) {
        info!("[CLI/Tag] 📊 本轮汇总: {}", summary_json);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level)?;

    let mut config = BotConfig::load(&args.config)
        .with_context(|| format!("读取配置失败: {}", args.config.display()))?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    config.validate()?;

    info!("[CLI] 🚀 数据目录: {}", config.data_dir.display());

    match args.command {
        Command::ProcessTags => {
            let mut processor = TagProcessor::from_config(&config, Arc::new(CliTagListener))?;
            let summary = processor.run_once().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.fetch_failed {
                anyhow::bail!("搜索失败，本轮未处理任何标签");
            }
        }
        Command::Next { policy, no_refresh } => {
            let mut registry = UserRegistry::open(config.registry_path())?;
            let selector = RotationSelector::new(
                policy.unwrap_or(config.rotation_policy),
                config.rotation_index_path(),
            );
            let mut record = selector.next(&registry)?;

            if no_refresh {
                info!("[CLI] 跳过资料刷新");
            } else if let Err(e) = config.validate_for_network() {
                warn!("[CLI] 缺少网络配置，跳过资料刷新: {}", e);
            } else {
                let client = Arc::new(XApiClient::from_config(&config)?);
                let refresher = ProfileRefresher::new(client);
                match refresher.refresh(&mut registry, &record.username).await {
                    Ok(Some(fresh)) => record = fresh,
                    Ok(None) => {}
                    Err(e) => warn!(
                        "[CLI] ⚠️ 刷新 @{} 资料失败，使用注册表中的记录: {}",
                        record.username, e
                    ),
                }
            }

            let context = ReplyContext::from_record(&record);
            info!(
                "[CLI] 🎯 下一个用户: @{}（{}）",
                record.username,
                record.classification.display_name()
            );
            if let Some(note) = context.tone_note() {
                info!("[CLI] 语气提示: {}", note);
            }
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Validate => {
            let registry = UserRegistry::open(config.registry_path())?;
            let report = registry.validate_integrity();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                warn!("[CLI] ⚠️ 注册表存在问题，请人工检查");
            }
        }
        Command::List => {
            let registry = UserRegistry::open(config.registry_path())?;
            info!("[CLI] 📋 用户列表（共 {} 个）:", registry.len());
            for record in registry.all() {
                println!(
                    "@{:<20} {:<8} {:<5} 检查:{} 回复:{} 跳过:{} 无帖:{}",
                    record.username,
                    record.classification.display_name(),
                    if record.priority { "P" } else { "" },
                    record.times_checked,
                    record.times_replied,
                    record.times_skipped,
                    record.times_no_candidate
                );
            }
        }
        Command::Classify {
            username,
            classification,
        } => {
            let classification: Classification = classification.parse()?;
            let mut registry = UserRegistry::open(config.registry_path())?;
            if !registry.set_classification(&username, classification)? {
                anyhow::bail!("用户 @{} 不在注册表中", username);
            }
        }
        Command::Priority { username, enabled } => {
            let mut registry = UserRegistry::open(config.registry_path())?;
            if !registry.set_priority(&username, enabled)? {
                anyhow::bail!("用户 @{} 不在注册表中", username);
            }
        }
        Command::Remove { username } => {
            let mut registry = UserRegistry::open(config.registry_path())?;
            if !registry.remove(&username)? {
                warn!("[CLI] 用户 @{} 不在注册表中，无需删除", username);
            }
        }
        Command::Outcome {
            username,
            outcome,
            post_id,
        } => {
            let mut registry = UserRegistry::open(config.registry_path())?;
            let (old, new) = registry.record_outcome(&username, outcome.into())?;
            info!("[CLI] @{} {:?}: {} -> {}", username, outcome, old, new);
            if let Some(post_id) = post_id {
                let mut ledger =
                    ReplyLedger::open(config.replied_ledger_path(), config.max_replied_posts)?;
                if !ledger.record(&post_id)? {
                    warn!("[CLI] 帖子 {} 已在已回复列表中", post_id);
                }
            }
        }
        Command::Sort => {
            let mut registry = UserRegistry::open(config.registry_path())?;
            if let Err(e) = resort_registry(&mut registry) {
                error!("[CLI] ❌ 重排失败: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}
