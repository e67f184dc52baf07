//! Chat command handler. Each command maps to one store action and one
//! bilingual reply; unknown commands get no reply.

use chrono::Utc;
use std::time::Duration;

use crate::notify::render::{render_list, FETCH_FAILED};
use crate::notify::Lang;
use crate::pipeline::preview;
use crate::state::AppState;
use crate::subscriber::SubscriberId;

const UPCOMING_TIMEOUT: Duration = Duration::from_secs(8);
const UPCOMING_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    Status,
    /// Optional list size, `/upcoming 3`.
    Upcoming(Option<usize>),
    Start,
    Help,
}

/// `/cmd`, `/cmd@BotName`, `/CMD args`. Anything else is `None`.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.trim().split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or_default().to_lowercase();
    let cmd = match name.as_str() {
        "subscribe" => Command::Subscribe,
        "unsubscribe" | "stop" => Command::Unsubscribe,
        "status" => Command::Status,
        "upcoming" | "next" => Command::Upcoming(parts.next().and_then(|a| a.parse().ok())),
        "start" => Command::Start,
        "help" => Command::Help,
        _ => return None,
    };
    Some(cmd)
}

pub const HELP: &str = "📅 <b>Economic calendar alerts</b>\n\
/subscribe - get alerts before major releases (CPI, NFP, rate decisions...)\n\
/unsubscribe - stop alerts\n\
/upcoming - major events in the next 24 hours\n\
/status - bot status\n\n\
📅 <b>经济日历提醒</b>\n\
/subscribe - 订阅重要经济数据提醒（CPI、非农、利率决议等）\n\
/unsubscribe - 取消订阅\n\
/upcoming - 未来24小时重要事件\n\
/status - 运行状态";

const SUBSCRIBED: &str = "✅ Subscribed! You will get an alert before major economic releases.\n\
Send /unsubscribe to stop.\n\n\
✅ 订阅成功！重要经济数据公布前会提醒您。\n\
发送 /unsubscribe 可取消订阅。";

const UNSUBSCRIBED: &str = "👋 Unsubscribed. Send /subscribe any time to come back.\n\
👋 已取消订阅，随时发送 /subscribe 重新订阅。";

const INVALID_CHAT: &str = "❌ This chat cannot be subscribed.\n❌ 无法订阅此会话。";

const STORE_FAILED: &str =
    "⚠️ Something went wrong, please try again later.\n⚠️ 操作失败，请稍后再试。";

fn status_text(poll_minutes: u64) -> String {
    format!(
        "🟢 Active. Checking the calendar every {poll_minutes} minutes.\n\
         🟢 运行中，每 {poll_minutes} 分钟检查一次经济日历。"
    )
}

/// Run one command for `chat_id` and return the reply to send, if any.
pub async fn handle(
    state: &AppState,
    chat_id: &str,
    display_name: Option<&str>,
    text: &str,
) -> Option<String> {
    let cmd = parse_command(text)?;
    tracing::info!(target: "webhook", chat_id, command = ?cmd, "command received");

    let reply = match cmd {
        Command::Start | Command::Help => HELP.to_string(),
        Command::Status => status_text(state.config.poll_interval_minutes),
        Command::Subscribe => match SubscriberId::parse(chat_id) {
            Err(e) => {
                tracing::warn!(target: "webhook", chat_id, error = %e, "rejected subscribe");
                INVALID_CHAT.to_string()
            }
            Ok(id) => match state.store.add_subscriber(&id, display_name).await {
                Ok(count) => {
                    tracing::info!(target: "webhook", chat_id, count, "subscribed");
                    SUBSCRIBED.to_string()
                }
                Err(e) => {
                    tracing::error!(target: "webhook", chat_id, error = %format!("{e:#}"), "subscribe failed");
                    STORE_FAILED.to_string()
                }
            },
        },
        Command::Unsubscribe => match SubscriberId::parse(chat_id) {
            Err(_) => UNSUBSCRIBED.to_string(),
            Ok(id) => match state.store.remove_subscriber(&id).await {
                Ok(count) => {
                    tracing::info!(target: "webhook", chat_id, count, "unsubscribed");
                    UNSUBSCRIBED.to_string()
                }
                Err(e) => {
                    tracing::error!(target: "webhook", chat_id, error = %format!("{e:#}"), "unsubscribe failed");
                    STORE_FAILED.to_string()
                }
            },
        },
        Command::Upcoming(limit) => {
            let limit = limit.unwrap_or(UPCOMING_LIMIT);
            let fut = preview::upcoming(state, limit, Utc::now());
            match tokio::time::timeout(UPCOMING_TIMEOUT, fut).await {
                Ok(p) => render_list(&p.events, Lang::Both),
                Err(_) => {
                    tracing::warn!(target: "webhook", chat_id, "upcoming timed out");
                    FETCH_FAILED.to_string()
                }
            }
        }
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(parse_command("/subscribe"), Some(Command::Subscribe));
        assert_eq!(parse_command("  /Subscribe@CalendarBot "), Some(Command::Subscribe));
        assert_eq!(parse_command("/upcoming 3"), Some(Command::Upcoming(Some(3))));
        assert_eq!(parse_command("/upcoming@Bot x"), Some(Command::Upcoming(None)));
        assert_eq!(parse_command("/HELP"), Some(Command::Help));
    }

    #[test]
    fn non_commands_are_ignored() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/weather"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("/"), None);
    }
}
