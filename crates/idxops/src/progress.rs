//! 📊 progress.rs — "is it done yet?" answered with a bar, then with a table.
//!
//! 🚀 The bar ticks once per migration task. The tables are what the CLI prints
//! when the work is over: batch summaries, index lists, alias maps, delete reports.
//!
//! ⚠️ Watching the bar will not make mongoimport go faster. We checked. 🦆

use std::collections::BTreeMap;
use std::time::Duration;

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};

use crate::common::TaskSource;
use crate::migration::{BatchReport, PlannedTask, TaskResult, TaskStatus};
use crate::search::DeleteReport;

/// ⏱️ MM:SS, or HH:MM:SS for the long ones.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 One tick per task. Hidden unless asked for, so tests and pipes stay quiet.
pub struct BatchProgress {
    bar: ProgressBar,
}

impl std::fmt::Debug for BatchProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- ProgressBar has no Debug; position and length are what matter anyway
        f.debug_struct("BatchProgress")
            .field("position", &self.bar.position())
            .field("length", &self.bar.length())
            .finish()
    }
}

impl BatchProgress {
    pub fn new(tasks: u64, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(tasks)
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}] {pos}/{len} tasks, {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        Self { bar }
    }

    pub fn start_task(&self, name: &str) {
        self.bar.set_message(format!("🚚 {name}"));
    }

    pub fn finish_task(&self, result: &TaskResult) {
        let mark = if result.succeeded() { "✅" } else { "💀" };
        self.bar.println(format!(
            "{mark} {} ({})",
            result.task,
            format_duration(result.elapsed())
        ));
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

fn table_with_header(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

/// 📋 Batch summary: one row per task, then the total.
pub fn batch_table(report: &BatchReport) -> Table {
    let mut table = table_with_header(vec!["task", "status", "rows", "failed step", "elapsed", "detail"]);
    for result in &report.results {
        let (status, rows, step, detail) = match &result.status {
            TaskStatus::Succeeded { rows } => ("✅ ok", rows.to_string(), String::new(), String::new()),
            TaskStatus::Failed { step, error } => ("💀 failed", String::new(), step.to_string(), error.to_string()),
        };
        table.add_row(vec![
            Cell::new(&result.task),
            Cell::new(status),
            Cell::new(rows).set_alignment(CellAlignment::Right),
            Cell::new(step),
            Cell::new(format_duration(result.elapsed())).set_alignment(CellAlignment::Right),
            Cell::new(detail),
        ]);
    }
    table.add_row(vec![
        Cell::new("total"),
        Cell::new(format!(
            "{} ok / {} failed",
            report.succeeded().count(),
            report.failed().count()
        )),
        Cell::new(""),
        Cell::new(""),
        Cell::new(format_duration(report.total_elapsed)).set_alignment(CellAlignment::Right),
        Cell::new(""),
    ]);
    table
}

/// 📋 A single-column list with a count in the header.
pub fn list_table(title: &str, items: &[String]) -> Table {
    let header = format!("{title} ({})", items.len());
    let mut table = table_with_header(vec![header.as_str()]);
    for item in items {
        table.add_row(vec![item.as_str()]);
    }
    table
}

/// 🔗 A one-to-many map, one row per key: alias → indices, or index → aliases.
pub fn mapping_table(key_header: &str, values_header: &str, map: &BTreeMap<String, Vec<String>>) -> Table {
    let mut table = table_with_header(vec![key_header, values_header]);
    for (key, values) in map {
        table.add_row(vec![key.clone(), values.join(", ")]);
    }
    table
}

/// 🗑️ What got deleted and what didn't.
pub fn delete_table(report: &DeleteReport) -> Table {
    let mut table = table_with_header(vec!["index", "result", "detail"]);
    for index in &report.deleted {
        table.add_row(vec![index.as_str(), "✅ deleted", ""]);
    }
    for failure in &report.failures {
        let status = failure
            .status
            .map(|code| format!("💀 {code}"))
            .unwrap_or_else(|| "💀 no response".to_string());
        table.add_row(vec![failure.index.clone(), status, failure.detail.clone()]);
    }
    table
}

/// 🗂️ Configured tasks, for `idxops tasks`. Broken entries get a row saying why.
pub fn tasks_table(plan: &[PlannedTask]) -> Table {
    let mut table = table_with_header(vec!["task", "source", "destination", "schema", "indexes"]);
    for entry in plan {
        let task = match entry {
            PlannedTask::Ready(task) => task,
            PlannedTask::Invalid { name, error } => {
                table.add_row(vec![
                    name.clone(),
                    error.to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                ]);
                continue;
            }
        };
        let source = match &task.source {
            TaskSource::Query(query) => format!("query: {query}"),
            TaskSource::File(path) => format!("file: {}", path.display()),
        };
        let schema = task
            .schema
            .as_ref()
            .map(|schema| schema.field_list())
            .unwrap_or_else(|| "(json array)".to_string());
        table.add_row(vec![
            task.name.clone(),
            source,
            task.target().to_string(),
            schema,
            task.indexes.len().to_string(),
        ]);
    }
    table
}
