//! Interactive loop: read a line, run it against the controller, print
//! events as they arrive.

use joyip_client::types::{FeedbackRequest, TurnRequest};
use joyip_client::GenerationApi;
use joyip_controller::{ControllerError, JobController};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::commands::{Command, HELP, LAST_IMAGE};
use crate::{edits, render};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Run the REPL until `/quit`, end of input, or Ctrl-C.
pub async fn run<R>(
    controller: &JobController,
    api: &dyn GenerationApi,
    input: R,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let cancel = CancellationToken::new();
    let printer = spawn_event_printer(controller.subscribe(), cancel.clone());
    let mut lines = input.lines();

    println!("{}", greeting(controller).await);

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        let flow = tokio::select! {
            _ = tokio::signal::ctrl_c() => Flow::Quit,
            flow = execute(command, controller, api) => flow,
        };
        if flow == Flow::Quit {
            break;
        }
    }

    cancel.cancel();
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer task failed");
    }
    Ok(())
}

/// Run one command.
pub async fn execute(command: Command, controller: &JobController, api: &dyn GenerationApi) -> Flow {
    let result = match command {
        Command::Empty => Ok(()),
        Command::Submit(text) => controller.submit(&text).await,
        Command::Send => controller.send_input().await,
        Command::Confirm => controller.confirm().await,
        Command::Edit { field, value } => {
            let result = controller.edit_analysis(field, value).await;
            if result.is_ok() {
                if let Some(analysis) = controller.snapshot().await.analysis {
                    println!("{}", render::render_preview(&analysis));
                }
            }
            result
        }
        Command::Discard => {
            let result = controller.discard_preview().await;
            if result.is_ok() {
                println!("已放弃当前分析结果");
            }
            result
        }
        Command::Cancel => {
            if !controller.cancel_job().await {
                println!("当前没有进行中的任务");
            }
            Ok(())
        }
        Command::Mode(mode) => {
            controller.set_mode(mode).await;
            println!("生成模式: {mode}");
            Ok(())
        }
        Command::Perspective(perspective) => {
            controller.set_perspective(perspective.as_str()).await;
            println!("视角: {perspective}");
            Ok(())
        }
        Command::Preset { kind, value } => {
            let input = controller.select_preset(kind, value).await;
            println!("输入: {input}  (输入 /send 提交)");
            Ok(())
        }
        Command::Queue => {
            match api.queue_stats().await {
                Ok(stats) => println!("{}", render::render_queue_stats(&stats)),
                Err(e) => println!("获取队列状态失败: {e}"),
            }
            Ok(())
        }
        Command::Turn { image, action } => {
            if let Some(image_url) = resolve_image(controller, &image).await {
                let request = TurnRequest { image_url, action };
                print_edit(api.run_turn(&request).await);
            }
            Ok(())
        }
        Command::Background { image, text } => {
            if let Some(image) = resolve_image(controller, &image).await {
                println!("正在生成背景...");
                let outcome = edits::background(api, &image, &text).await;
                controller.record_edit(outcome.text, outcome.images).await;
            }
            Ok(())
        }
        Command::Optimize { image, keyword } => {
            if let Some(image) = resolve_image(controller, &image).await {
                println!("正在优化形象...");
                let outcome = edits::optimize(api, &image, &keyword).await;
                controller.record_edit(outcome.text, outcome.images).await;
            }
            Ok(())
        }
        Command::Feedback { message, contact } => {
            match api.send_feedback(&FeedbackRequest { message, contact }).await {
                Ok(ack) if ack.success => {
                    println!("{}", ack.message.as_deref().unwrap_or("感谢您的反馈！"));
                }
                Ok(ack) => println!("{}", ack.error.as_deref().unwrap_or("提交失败，请重试")),
                Err(e) => {
                    tracing::warn!(error = %e, "Feedback submission failed");
                    println!("提交失败，请重试");
                }
            }
            Ok(())
        }
        Command::History => {
            let snapshot = controller.snapshot().await;
            if snapshot.chat.messages.is_empty() {
                println!("(暂无对话)");
            }
            for message in &snapshot.chat.messages {
                println!("{}", render::render_message(message));
            }
            Ok(())
        }
        Command::Clear => {
            controller.clear().await;
            println!("对话已清空");
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return Flow::Quit,
    };

    if let Err(e) = result {
        println!("{}", describe(&e));
    }
    Flow::Continue
}

fn describe(error: &ControllerError) -> String {
    match error {
        ControllerError::EmptyInput => "请输入内容".into(),
        ControllerError::Busy { .. } => format!("{error}，请等待完成或使用 /cancel /discard"),
        ControllerError::NotInPreview { .. } => "当前没有待确认的分析结果".into(),
        ControllerError::ShutDown => error.to_string(),
    }
}

/// `last` refers to the newest generated image.
async fn resolve_image(controller: &JobController, image: &str) -> Option<String> {
    if image != LAST_IMAGE {
        return Some(image.to_string());
    }
    let snapshot = controller.snapshot().await;
    let last = snapshot
        .chat
        .last_images()
        .and_then(|images| images.first())
        .cloned();
    if last.is_none() {
        println!("还没有生成过图片");
    }
    last
}

fn print_edit(result: Result<joyip_client::types::EditResponse, joyip_client::ApiError>) {
    match result {
        Ok(response) if response.success => match response.image_url() {
            Some(url) => println!("处理完成: {url}"),
            None => println!("处理完成，但未返回图片"),
        },
        Ok(response) => println!(
            "处理失败: {}",
            response.error.as_deref().unwrap_or("未知错误")
        ),
        Err(e) => println!("处理失败: {e}"),
    }
}

async fn greeting(controller: &JobController) -> String {
    let snapshot = controller.snapshot().await;
    format!(
        "Joy IP 生成助手 ({} 模式, {} 条历史消息)。输入 /help 查看命令。\n当前输入: {}",
        snapshot.settings.mode,
        snapshot.chat.messages.len(),
        snapshot.chat.input
    )
}

/// Print rendered events until `cancel` fires or the channel closes.
fn spawn_event_printer(
    mut rx: broadcast::Receiver<joyip_controller::ControllerEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) => {
                        if let Some(text) = render::render_event(&event) {
                            println!("{text}");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event printer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}
