use std::fmt::Write as _;

use snafu::ResultExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::app::{ChatApp, Intent};
use crate::chat::{AppView, BodyView, ChatRoomView, FeedStatus, NoticeLevel};
use crate::error::{ChatResult, ReadInputSnafu, WriteOutputSnafu};
use crate::settings::TerminalSettings;

pub const SCROLL_STEP_ROWS: usize = 5;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignIn,
    SignOut,
    Reconnect,
    ScrollUp(usize),
    ScrollDown(usize),
    Dismiss,
    Quit,
    /// Anything that is not a command is sent as a message.
    Send(String),
    /// Blank line or `/send`: submit the draft as it stands.
    SendDraft,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Command::SendDraft;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let rows = parts
        .next()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(SCROLL_STEP_ROWS);

    match name {
        "signin" => Command::SignIn,
        "signout" => Command::SignOut,
        "reconnect" => Command::Reconnect,
        "up" => Command::ScrollUp(rows),
        "down" => Command::ScrollDown(rows),
        "ok" => Command::Dismiss,
        "send" => Command::SendDraft,
        "quit" | "exit" => Command::Quit,
        // "//text" sends "/text".
        _ if rest.starts_with('/') => Command::Send(rest.to_string()),
        other => Command::Unknown(other.to_string()),
    }
}

fn intents_for(command: Command) -> Vec<Intent> {
    match command {
        Command::SignIn => vec![Intent::SignIn],
        Command::SignOut => vec![Intent::SignOut],
        Command::Reconnect => vec![Intent::Reconnect],
        Command::ScrollUp(rows) => vec![Intent::ScrollUp(rows)],
        Command::ScrollDown(rows) => vec![Intent::ScrollDown(rows)],
        Command::Dismiss => vec![Intent::DismissNotice],
        Command::Send(text) => vec![Intent::EditDraft(text), Intent::Submit],
        Command::SendDraft => vec![Intent::Submit],
        Command::Quit | Command::Unknown(_) => Vec::new(),
    }
}

/// Text rendering of the view tree, newest message last.
pub fn render_text(view: &AppView, history_rows: usize) -> String {
    let mut out = String::new();

    match &view.header.sign_out {
        Some(button) => {
            let _ = writeln!(out, "== {} ==  [{} /signout]", view.header.title, button.label);
        }
        None => {
            let _ = writeln!(out, "== {} ==", view.header.title);
        }
    }

    if let Some(notice) = &view.notice {
        let marker = match notice.level {
            NoticeLevel::Info => "*",
            NoticeLevel::Error => "!",
        };
        let _ = writeln!(out, "{marker} {}", notice.text);
    }

    match &view.body {
        BodyView::SignIn(button) => {
            let _ = writeln!(out, "[{} /signin]", button.label);
        }
        BodyView::ChatRoom(room) => render_room(&mut out, room, history_rows),
    }

    out
}

fn render_room(out: &mut String, room: &ChatRoomView, history_rows: usize) {
    match room.status {
        FeedStatus::Connecting => {
            let _ = writeln!(out, "(connecting...)");
        }
        FeedStatus::Reconnecting { attempt } => {
            let _ = writeln!(out, "(reconnecting, attempt {attempt})");
        }
        FeedStatus::Failed => {
            let _ = writeln!(out, "(feed offline, /reconnect to retry)");
        }
        FeedStatus::Live | FeedStatus::Unsubscribed => {}
    }

    let total = room.messages.len();
    let end = total.saturating_sub(room.scroll.rows_from_latest);
    let start = end.saturating_sub(history_rows.max(1));
    if start > 0 {
        let _ = writeln!(out, "  ... {start} earlier (/up)");
    }
    for message in &room.messages[start..end] {
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            message.style.class_name(),
            message.author_label,
            message.text
        );
    }
    if end < total {
        let _ = writeln!(out, "  ... {} newer (/down)", total - end);
    }

    let _ = writeln!(
        out,
        "> {} [{}]",
        if room.compose.value.is_empty() {
            room.compose.placeholder
        } else {
            room.compose.value.as_str()
        },
        room.compose.submit.label
    );
}

/// Runs the client against a line-oriented input and a text output.
///
/// Input is not read while a sign-in or send is in flight, so piped commands
/// run in order.
pub async fn run<R, W>(
    app: &mut ChatApp,
    input: R,
    mut output: W,
    settings: &TerminalSettings,
) -> ChatResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    enum Step {
        Line(std::io::Result<Option<String>>),
        App(crate::app::AppEvent),
    }

    let mut lines = input.lines();
    write_view(app, &mut output, settings).await?;

    loop {
        let accepting_input = !app.has_pending_work();
        let step = tokio::select! {
            line = lines.next_line(), if accepting_input => Step::Line(line),
            event = app.next_event() => Step::App(event),
        };

        let redraw = match step {
            Step::App(event) => app.handle_event(event),
            Step::Line(line) => {
                let Some(line) = line.context(ReadInputSnafu {
                    stage: "terminal-read-line",
                })?
                else {
                    tracing::info!("input closed");
                    break;
                };

                match parse_command(&line) {
                    Command::Quit => break,
                    Command::Unknown(name) => {
                        tracing::debug!(command = %name, "unknown command");
                        write_line(&mut output, &format!("? unknown command /{name}")).await?;
                        false
                    }
                    command => intents_for(command)
                        .into_iter()
                        .fold(false, |redraw, intent| app.handle_intent(intent) || redraw),
                }
            }
        };

        if redraw {
            write_view(app, &mut output, settings).await?;
        }
    }

    app.shutdown();
    output.flush().await.context(WriteOutputSnafu {
        stage: "terminal-flush",
    })?;
    Ok(())
}

async fn write_view<W>(app: &mut ChatApp, output: &mut W, settings: &TerminalSettings) -> ChatResult<()>
where
    W: AsyncWrite + Unpin,
{
    let text = render_text(&app.render(), settings.history_rows);
    output
        .write_all(text.as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "terminal-write-view",
        })?;
    output.flush().await.context(WriteOutputSnafu {
        stage: "terminal-flush",
    })
}

async fn write_line<W>(output: &mut W, line: &str) -> ChatResult<()>
where
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("{line}\n").as_bytes())
        .await
        .context(WriteOutputSnafu {
            stage: "terminal-write-line",
        })
}
