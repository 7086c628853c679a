//! Text rendering of controller events and transcript entries.

use joyip_controller::ControllerEvent;
use joyip_core::analysis::AnalysisResult;
use joyip_core::chat::{ChatMessage, ChatStatus, MessageKind};
use joyip_core::generation::format_wait_time;
use joyip_core::job::{JobStatus, QueueInfo, QueueStats};

/// The line(s) to print for an event, if any.
///
/// Assistant messages are printed when appended. User messages are not,
/// since the user just typed them.
pub fn render_event(event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::StatusChanged { status } => match status {
            ChatStatus::Analyzing => Some("正在分析需求...".into()),
            ChatStatus::Generating => Some("正在提交生成任务...".into()),
            ChatStatus::Idle | ChatStatus::Preview => None,
        },
        ControllerEvent::AnalysisReady { analysis, .. } => Some(render_preview(analysis)),
        ControllerEvent::JobStarted { job_id } => Some(format!("任务已提交: {job_id}")),
        ControllerEvent::QueueUpdated { queue } => queue.as_ref().map(render_queue),
        ControllerEvent::JobProgress {
            status: JobStatus::Running,
            progress,
            stage,
            ..
        } => Some(match stage.as_deref().filter(|s| !s.is_empty()) {
            Some(stage) => format!("生成中 {progress}% ({stage})"),
            None => format!("生成中 {progress}%"),
        }),
        ControllerEvent::JobProgress { .. } | ControllerEvent::JobFinished { .. } => None,
        ControllerEvent::MessageAppended { message } => match message.kind {
            MessageKind::Assistant => Some(render_message(message)),
            MessageKind::User => None,
        },
        ControllerEvent::ComplianceFlagChanged { active: true } => {
            Some("[提示] 请调整描述后重新提交".into())
        }
        ControllerEvent::ComplianceFlagChanged { active: false } => None,
    }
}

pub fn render_preview(analysis: &AnalysisResult) -> String {
    format!(
        "分析结果:\n{analysis}\n输入 /confirm 开始生成, /edit <字段> <值> 修改, /discard 放弃"
    )
}

pub fn render_queue(queue: &QueueInfo) -> String {
    let mut line = format!(
        "排队中: 第 {} 位, 预计等待 {}",
        queue.position,
        format_wait_time(queue.estimated_wait)
    );
    if queue.running_count > 0 || queue.waiting_count > 0 {
        line.push_str(&format!(
            " (运行中 {}, 等待 {})",
            queue.running_count, queue.waiting_count
        ));
    }
    line
}

pub fn render_queue_stats(stats: &QueueStats) -> String {
    format!(
        "队列: 运行中 {}/{}, 等待 {}, 平均耗时 {:.0} 秒",
        stats.running_count, stats.max_concurrent, stats.waiting_count, stats.avg_duration
    )
}

pub fn render_message(message: &ChatMessage) -> String {
    let who = match message.kind {
        MessageKind::User => "你",
        MessageKind::Assistant => "Joy",
    };
    let time = message
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    let mut out = format!("[{time}] {who}: {}", message.content);
    for image in message.images() {
        out.push_str("\n    ");
        out.push_str(image);
    }
    out
}
