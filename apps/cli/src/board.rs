use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use client_core::Board;
use shared::domain::{RequestId, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardInput {
    Transition(RequestId, RequestStatus),
    Reload,
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "commands: accept <id> | done <id> | reload | show | help | quit";

pub fn parse_board_input(line: &str) -> Result<Option<BoardInput>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let input = match command.to_ascii_lowercase().as_str() {
        "accept" | "a" => BoardInput::Transition(parse_id(words.next())?, RequestStatus::InProgress),
        "done" | "d" => BoardInput::Transition(parse_id(words.next())?, RequestStatus::Done),
        "reload" | "r" => BoardInput::Reload,
        "show" | "s" => BoardInput::Show,
        "help" | "?" => BoardInput::Help,
        "quit" | "q" | "exit" => BoardInput::Quit,
        other => return Err(format!("unknown command `{other}`; {HELP}")),
    };
    if words.next().is_some() {
        return Err(format!("too many arguments; {HELP}"));
    }
    Ok(Some(input))
}

fn parse_id(word: Option<&str>) -> Result<RequestId, String> {
    let word = word.ok_or_else(|| "missing request id".to_string())?;
    word.trim_start_matches('#')
        .parse::<i64>()
        .map(RequestId)
        .map_err(|_| format!("`{word}` is not a request id"))
}

pub fn age_label(age: Duration) -> String {
    let seconds = age.num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}

fn column_title(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "Pending",
        RequestStatus::InProgress => "In progress",
        RequestStatus::Done => "Done",
    }
}

pub fn render_board(board: &Board, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    for status in RequestStatus::ALL {
        let column = board.column(status);
        let _ = writeln!(out, "== {} ({}) ==", column_title(status), column.len());
        for record in column {
            let _ = write!(
                out,
                "  #{:<5} table {:<4} {:<13} {:>4}",
                record.id.to_string(),
                record.table_id.to_string(),
                record.kind.as_str(),
                age_label(record.age(now)),
            );
            if let Some(waiter) = record.waiter_id {
                let _ = write!(out, "  waiter {waiter}");
            }
            if let Some(notes) = &record.notes {
                let _ = write!(out, "  \"{notes}\"");
            }
            out.push('\n');
        }
    }
    out
}
