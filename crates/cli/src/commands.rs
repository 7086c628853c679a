//! Parsing of REPL input lines.
//!
//! Plain text is a requirement to analyze. Lines starting with `/` are
//! commands; see [`HELP`].

use joyip_core::analysis::AnalysisField;
use joyip_core::chat::PresetKind;
use joyip_core::error::CoreError;
use joyip_core::generation::GenerationMode;

pub const HELP: &str = "\
命令:
  <文本>                         提交需求进行分析
  /send                          提交当前输入框内容
  /confirm                       确认分析结果并开始生成
  /edit <字段> <值>              修改分析结果 (表情 动作 上装 下装 头戴 手持 视角)
  /discard                       放弃当前分析结果
  /cancel                        取消正在进行的任务
  /mode <2D|3D>                  切换生成模式
  /perspective <视角>            设置 2D 视角
  /preset <expression|action|style> <值>   选择预设并填充输入框
  /queue                         查看队列状态
  /turn <图片|last> <动作>       转换图片角度
  /background <图片|last> <描述> 合成背景 (两个引擎同时生成)
  /optimize <图片|last> <关键词> 优化形象
  /feedback <内容> [| 联系方式]  提交意见反馈
  /history                       显示对话记录
  /clear                         清空对话
  /help                          显示帮助
  /quit                          退出";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Free text to analyze.
    Submit(String),
    Send,
    Confirm,
    Edit { field: AnalysisField, value: String },
    Discard,
    Cancel,
    Mode(GenerationMode),
    Perspective(String),
    Preset { kind: PresetKind, value: String },
    Queue,
    Turn { image: String, action: String },
    Background { image: String, text: String },
    Optimize { image: String, keyword: String },
    Feedback { message: String, contact: String },
    History,
    Clear,
    Help,
    Quit,
    /// Blank line.
    Empty,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("未知命令: /{0} (输入 /help 查看帮助)")]
    Unknown(String),

    #[error("用法: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Image argument meaning "the most recently generated image".
pub const LAST_IMAGE: &str = "last";

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Submit(line.to_string()));
        };

        let (name, args) = split_first(rest);
        let command = match name {
            "send" => Self::Send,
            "confirm" | "ok" => Self::Confirm,
            "edit" => {
                let (field, value) = two_args(args, "/edit <字段> <值>")?;
                Self::Edit {
                    field: field.parse()?,
                    value: value.to_string(),
                }
            }
            "discard" => Self::Discard,
            "cancel" => Self::Cancel,
            "mode" => Self::Mode(one_arg(args, "/mode <2D|3D>")?.parse()?),
            "perspective" => Self::Perspective(one_arg(args, "/perspective <视角>")?.to_string()),
            "preset" => {
                let (kind, value) =
                    two_args(args, "/preset <expression|action|style> <值>")?;
                Self::Preset {
                    kind: kind.parse()?,
                    value: value.to_string(),
                }
            }
            "queue" => Self::Queue,
            "turn" => {
                let (image, action) = two_args(args, "/turn <图片|last> <动作>")?;
                Self::Turn {
                    image: image.to_string(),
                    action: action.to_string(),
                }
            }
            "background" | "bg" => {
                let (image, text) = two_args(args, "/background <图片|last> <描述>")?;
                Self::Background {
                    image: image.to_string(),
                    text: text.to_string(),
                }
            }
            "optimize" | "opt" => {
                let (image, keyword) = two_args(args, "/optimize <图片|last> <关键词>")?;
                Self::Optimize {
                    image: image.to_string(),
                    keyword: keyword.to_string(),
                }
            }
            "feedback" => {
                let text = one_arg(args, "/feedback <内容> [| 联系方式]")?;
                let (message, contact) = match text.rsplit_once('|') {
                    Some((message, contact)) => (message.trim(), contact.trim()),
                    None => (text, ""),
                };
                if message.is_empty() {
                    return Err(CommandError::Usage("/feedback <内容> [| 联系方式]"));
                }
                Self::Feedback {
                    message: message.to_string(),
                    contact: contact.to_string(),
                }
            }
            "history" => Self::History,
            "clear" => Self::Clear,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

fn split_first(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s, ""),
    }
}

fn one_arg<'a>(args: &'a str, usage: &'static str) -> Result<&'a str, CommandError> {
    if args.is_empty() {
        Err(CommandError::Usage(usage))
    } else {
        Ok(args)
    }
}

/// First word, then the remainder (which may contain spaces).
fn two_args<'a>(args: &'a str, usage: &'static str) -> Result<(&'a str, &'a str), CommandError> {
    match split_first(args) {
        (first, rest) if !first.is_empty() && !rest.is_empty() => Ok((first, rest)),
        _ => Err(CommandError::Usage(usage)),
    }
}
