use anyhow::{Context, Result, anyhow};
use tracing::info;

use affinity_core::config::load_config;
use affinity_core::tracing::init_tracing_from_config;

mod wire;

pub use wire::{ApplicationContext, MatchRuntime, build_context, initialize};

use crate::application::commands::{
    CreateProfileCommand, LikeUserCommand, SendMessageCommand, StartChatCommand,
};
use crate::application::queries::ListThreadsQuery;
use crate::domain::model::{MatchOutcome, UserProfile, UserRole};

/// 应用启动器
pub struct ApplicationBootstrap;

impl ApplicationBootstrap {
    /// 加载配置、初始化日志，并在进程内后端上演示一次完整的匹配流程
    pub async fn run(config_path: Option<&str>) -> Result<()> {
        let app_config = load_config(config_path);
        init_tracing_from_config(Some(&app_config.logging));
        app_config
            .validate_references()
            .context("invalid configuration")?;

        let runtime = initialize(app_config).context("failed to initialize match runtime")?;
        Self::run_demo(&runtime).await
    }

    /// u1 与 u2 互相点赞后得到同一个单聊，u1 发送一条消息
    async fn run_demo(runtime: &MatchRuntime) -> Result<()> {
        let u1 = runtime.connect();
        u1.session.sign_in("u1");
        let u2 = runtime.connect();
        u2.session.sign_in("u2");

        u1.command_handler
            .handle_create_profile(CreateProfileCommand {
                profile: UserProfile::new("u1", "Ada", UserRole::ContentCreator)
                    .with_tags(["travel", "food"]),
            })
            .await?;
        u2.command_handler
            .handle_create_profile(CreateProfileCommand {
                profile: UserProfile::new("u2", "Acme Studio", UserRole::Enterprise)
                    .with_tags(["food", "brand"]),
            })
            .await?;

        let first = u1
            .command_handler
            .handle_like(LikeUserCommand {
                liker_id: "u1".into(),
                target_id: "u2".into(),
            })
            .await?;
        info!(outcome = ?first, "u1 liked u2");

        let second = u2
            .command_handler
            .handle_like(LikeUserCommand {
                liker_id: "u2".into(),
                target_id: "u1".into(),
            })
            .await?;
        let thread_id = match second {
            MatchOutcome::Matched(handle) => handle.thread_id,
            other => return Err(anyhow!("expected a match, got {:?}", other)),
        };
        info!(thread_id = %thread_id, "u2 liked u1, matched");

        let handle = u1
            .command_handler
            .handle_start_chat(StartChatCommand {
                user_id: "u1".into(),
                other_user_id: "u2".into(),
            })
            .await?;
        info!(
            thread_id = %handle.thread_id,
            same_thread = handle.thread_id == thread_id,
            "u1 opened the chat"
        );

        u1.command_handler
            .handle_send_message(SendMessageCommand {
                thread_id: thread_id.clone(),
                sender_id: "u1".into(),
                text: "hi".into(),
            })
            .await?;

        let inbox = u2
            .query_handler
            .handle_list_threads(ListThreadsQuery {
                user_id: "u2".into(),
            })
            .await?;
        for thread in &inbox {
            info!(
                thread_id = %thread.id,
                last_message = %thread.last_message,
                last_message_at = %thread.last_message_at,
                "u2 inbox"
            );
        }

        Ok(())
    }
}
