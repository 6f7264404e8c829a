//! Plain-text rendering of tasks, logs and stats.

use taskdeck_core::domain::{LogEntry, Task, TaskStats, TaskStatus};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const INSTRUCTIONS_WIDTH: usize = 60;

fn status_cell(status: TaskStatus) -> String {
    format!("{} {:<9}", status.tone().glyph(), status)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

pub fn tasks(rows: &[Task]) {
    if rows.is_empty() {
        println!("no tasks");
        return;
    }
    for task in rows {
        println!(
            "{:<34} {} {}  {}",
            task.id,
            status_cell(task.status),
            task.created_at.format(TIME_FORMAT),
            truncate(task.instructions().unwrap_or(&task.task_type), INSTRUCTIONS_WIDTH),
        );
    }
}

pub fn task(task: &Task) {
    println!("id:        {}", task.id);
    println!("status:    {}", status_cell(task.status).trim_end());
    println!("type:      {}", task.task_type);
    println!("created:   {}", task.created_at.format(TIME_FORMAT));
    if let Some(at) = task.started_at {
        println!("started:   {}", at.format(TIME_FORMAT));
    }
    if let Some(at) = task.completed_at {
        println!("completed: {}", at.format(TIME_FORMAT));
    }
    if let Some(text) = task.instructions() {
        println!("task:      {text}");
    }
    if let Some(result) = &task.result_data {
        let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
        println!("result:\n{pretty}");
    }
    if let Some(error) = &task.error_details {
        println!("error:     {error}");
    }
    if let Err(violation) = task.check_invariants() {
        println!("warning:   inconsistent record ({violation:?})");
    }
    if !task.logs.is_empty() {
        println!("logs:");
        logs(&task.logs);
    }
}

pub fn logs(entries: &[LogEntry]) {
    for entry in entries {
        println!(
            "  {} {} {:<8} {}",
            entry.timestamp.format(TIME_FORMAT),
            entry.level.tone().glyph(),
            entry.level,
            entry.message
        );
    }
}

pub fn stats(stats: &TaskStats) {
    for status in TaskStatus::ALL {
        println!("{} {}", status_cell(status), stats.count(status));
    }
    println!("  {:<9} {}", "TOTAL", stats.total);
}
