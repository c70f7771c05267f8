//! 🚚 The migration orchestrator: extract → stage → import → (indexes), one task at a time.
//!
//! 🎬 COLD OPEN — INT. OPS ROOM — 5:58 PM
//!
//! Six tasks in the list. The third one has a typo in its query. In the old
//! world the whole run stopped there, and tasks four through six waited until
//! Monday. Here the third task fails, says exactly which step and why, and
//! the orchestrator moves on to the fourth.
//!
//! 🧠 Knowledge graph:
//! - within a task: abort on the first failing step (a staging failure skips the import)
//! - across tasks: continue-on-error, strictly sequential, in the order given
//! - precheck runs before any work and fails with `MissingPrerequisite`
//! - a schema means the typed CSV path; no schema means the JSON array path
//! - file-sourced tasks skip extraction and stage the uploaded file as-is
//! - timings are for the operator's eyes only. nothing schedules on them. 🦆

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::common::{MigrationTask, StagedFile, StagingFormat, TaskSource};
use crate::error::{OpsError, OpsResult};
use crate::extractors::RelationalSource;
use crate::importers::BulkImporter;
use crate::progress::BatchProgress;
use crate::staging::{self, StagingWriter};

/// 🪜 The steps of one task, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Precheck,
    Extract,
    Stage,
    Import,
    CreateIndexes,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::Precheck => "precheck",
            Step::Extract => "extract",
            Step::Stage => "stage",
            Step::Import => "import",
            Step::CreateIndexes => "create-indexes",
        };
        f.write_str(label)
    }
}

/// ⏱️ How long one step took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    pub step: Step,
    pub elapsed: Duration,
}

/// 🏁 How a task ended.
#[derive(Debug)]
pub enum TaskStatus {
    Succeeded { rows: usize },
    Failed { step: Step, error: OpsError },
}

/// 📋 Everything the operator needs to know about one task.
#[derive(Debug)]
pub struct TaskResult {
    pub task: String,
    pub steps: Vec<StepTiming>,
    pub status: TaskStatus,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, TaskStatus::Succeeded { .. })
    }

    pub fn elapsed(&self) -> Duration {
        self.steps.iter().map(|timing| timing.elapsed).sum()
    }

    pub fn ran(&self, step: Step) -> bool {
        self.steps.iter().any(|timing| timing.step == step)
    }
}

/// 📊 The whole batch: per-task results plus the summed elapsed time.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<TaskResult>,
    pub total_elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|result| result.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|result| !result.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(TaskResult::succeeded)
    }
}

/// 📋 A batch entry: a task ready to run, or one whose configuration broke
/// before it could become a task. The broken one fails its precheck and the
/// batch moves on.
#[derive(Debug)]
pub enum PlannedTask {
    Ready(MigrationTask),
    Invalid { name: String, error: OpsError },
}

impl PlannedTask {
    pub fn name(&self) -> &str {
        match self {
            PlannedTask::Ready(task) => &task.name,
            PlannedTask::Invalid { name, .. } => name,
        }
    }
}

impl From<MigrationTask> for PlannedTask {
    fn from(task: MigrationTask) -> Self {
        PlannedTask::Ready(task)
    }
}

type StepResult<T> = Result<T, (Step, OpsError)>;

fn timed<T>(steps: &mut Vec<StepTiming>, step: Step, started: Instant, outcome: OpsResult<T>) -> StepResult<T> {
    steps.push(StepTiming {
        step,
        elapsed: started.elapsed(),
    });
    outcome.map_err(|error| (step, error))
}

/// 🚚 Borrows the session's handles for the duration of a run.
///
/// The relational source is optional: a batch made only of uploaded files
/// never needs one, and a query task without one fails its precheck.
#[derive(Debug)]
pub struct Migrator<'a> {
    source: Option<&'a mut dyn RelationalSource>,
    writer: &'a StagingWriter,
    importer: &'a dyn BulkImporter,
    show_progress: bool,
}

impl<'a> Migrator<'a> {
    pub fn new(writer: &'a StagingWriter, importer: &'a dyn BulkImporter) -> Self {
        Self {
            source: None,
            writer,
            importer,
            show_progress: false,
        }
    }

    pub fn with_source(mut self, source: &'a mut dyn RelationalSource) -> Self {
        self.source = Some(source);
        self
    }

    /// 📊 Draw a progress bar while `run_batch` works.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// 🚀 Run one task to completion (or to its first failure).
    pub async fn run_task(&mut self, task: &MigrationTask) -> TaskResult {
        info!("🚚 task '{}' → {}", task.name, task.target());
        let mut steps = Vec::new();
        let status = match self.drive(task, &mut steps).await {
            Ok(rows) => {
                info!("✅ task '{}' imported {} row(s)", task.name, rows);
                TaskStatus::Succeeded { rows }
            }
            Err((step, error)) => {
                error!("💀 task '{}' failed at {}: {}", task.name, step, error);
                TaskStatus::Failed { step, error }
            }
        };
        TaskResult {
            task: task.name.clone(),
            steps,
            status,
        }
    }

    /// 🔁 Run every task, one after another, whatever happens to the previous one.
    pub async fn run_batch(&mut self, tasks: &[MigrationTask]) -> BatchReport {
        let plan: Vec<PlannedTask> = tasks.iter().cloned().map(PlannedTask::from).collect();
        self.run_plan(plan).await
    }

    /// 🔁 Same as [`Migrator::run_batch`], with broken entries reported as precheck failures.
    pub async fn run_plan(&mut self, plan: Vec<PlannedTask>) -> BatchReport {
        let progress = BatchProgress::new(plan.len() as u64, self.show_progress);
        let mut report = BatchReport::default();
        for entry in plan {
            progress.start_task(entry.name());
            let result = match entry {
                PlannedTask::Ready(task) => self.run_task(&task).await,
                PlannedTask::Invalid { name, error } => {
                    error!("💀 task '{}' failed at {}: {}", name, Step::Precheck, error);
                    TaskResult {
                        task: name,
                        steps: vec![StepTiming {
                            step: Step::Precheck,
                            elapsed: Duration::ZERO,
                        }],
                        status: TaskStatus::Failed {
                            step: Step::Precheck,
                            error,
                        },
                    }
                }
            };
            progress.finish_task(&result);
            report.total_elapsed += result.elapsed();
            report.results.push(result);
        }
        progress.finish();

        let failed = report.failed().count();
        if failed > 0 {
            warn!("⚠️ {} of {} task(s) failed", failed, report.results.len());
        } else {
            info!("🎉 all {} task(s) succeeded", report.results.len());
        }
        report
    }

    async fn drive(&mut self, task: &MigrationTask, steps: &mut Vec<StepTiming>) -> StepResult<usize> {
        let started = Instant::now();
        let precheck = self.precheck(task).await;
        timed(steps, Step::Precheck, started, precheck)?;

        let staged = match &task.source {
            TaskSource::Query(query) => {
                let started = Instant::now();
                let extracted = match self.source.as_deref_mut() {
                    Some(source) => source.run_query(query).await,
                    None => Err(no_source(task)),
                };
                let batch = timed(steps, Step::Extract, started, extracted)?;

                let started = Instant::now();
                let staged = match &task.schema {
                    Some(schema) => self.writer.write_delimited_file(&batch, Some(schema)).await,
                    None => self.writer.write_document_file(&batch).await,
                };
                timed(steps, Step::Stage, started, staged)?
            }
            TaskSource::File(path) => {
                let started = Instant::now();
                let staged = self.writer.stage_uploaded_file(path, task.schema.as_ref()).await;
                timed(steps, Step::Stage, started, staged)?
            }
        };

        let started = Instant::now();
        let imported = self.import(task, &staged).await;
        timed(steps, Step::Import, started, imported)?;

        if !task.indexes.is_empty() {
            let started = Instant::now();
            let indexed = self.importer.create_indexes(&task.target(), &task.indexes).await;
            timed(steps, Step::CreateIndexes, started, indexed)?;
        }
        Ok(staged.rows)
    }

    async fn import(&self, task: &MigrationTask, staged: &StagedFile) -> OpsResult<()> {
        let target = task.target();
        match (staged.format, task.schema.as_ref()) {
            (StagingFormat::Document, _) => {
                self.importer.import_document_file(&staged.path, &target).await?;
            }
            (StagingFormat::Delimited, Some(schema)) => {
                self.importer
                    .import_delimited_file(&staged.path, schema, &target)
                    .await?;
            }
            (StagingFormat::Delimited, None) => {
                return Err(OpsError::MissingPrerequisite(format!(
                    "task '{}' staged delimited text but has no column schema",
                    task.name
                )));
            }
        }
        Ok(())
    }

    /// 🙅 Everything that can be known to be missing before any work starts.
    async fn precheck(&self, task: &MigrationTask) -> OpsResult<()> {
        let missing = |what: String| Err(OpsError::MissingPrerequisite(format!("task '{}': {what}", task.name)));

        if task.database.trim().is_empty() {
            return missing("no destination database".to_string());
        }
        if task.collection.trim().is_empty() {
            return missing("no destination collection".to_string());
        }
        if task.schema.as_ref().is_some_and(|schema| schema.is_empty()) {
            return missing("column schema is present but empty".to_string());
        }
        match &task.source {
            TaskSource::Query(query) => {
                if query.trim().is_empty() {
                    return missing("empty query".to_string());
                }
                if self.source.is_none() {
                    return Err(no_source(task));
                }
            }
            TaskSource::File(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return missing(format!("source file '{}' does not exist", path.display()));
                }
                if staging::format_for(path) == StagingFormat::Delimited && task.schema.is_none() {
                    return missing(format!(
                        "'{}' is delimited text, which needs a column schema",
                        path.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

fn no_source(task: &MigrationTask) -> OpsError {
    OpsError::MissingPrerequisite(format!(
        "task '{}' runs a query but no relational source is configured",
        task.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{
        CellValue, Column, ColumnKind, ColumnSchema, ColumnType, IndexKey, IndexSpec, TabularBatch,
    };
    use crate::extractors::InMemorySource;
    use crate::importers::{ImportCall, InMemoryImporter};
    use crate::staging::StagingConfig;

    const QUERY: &str = "select id, name from t";

    fn three_rows() -> TabularBatch {
        let mut batch = TabularBatch::new(vec![
            Column::new("id", ColumnKind::Int),
            Column::new("name", ColumnKind::Text),
        ]);
        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            batch
                .push_row(vec![CellValue::Int(id), CellValue::Text(name.into())])
                .expect("row fits");
        }
        batch
    }

    fn schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            ColumnType::new("id", "int32"),
            ColumnType::new("name", "string"),
        ])
    }

    fn writer(dir: &tempfile::TempDir) -> StagingWriter {
        StagingWriter::new(StagingConfig {
            temp_dir: dir.path().join("temp"),
        })
    }

    #[tokio::test]
    async fn the_one_where_three_rows_make_it_all_the_way_to_t_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let mut source = InMemorySource::new().with_result(QUERY, three_rows());
        let task = MigrationTask::from_query("t", QUERY, "mirror", "t_copy").with_schema(schema());

        let result = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_task(&task)
            .await;

        assert!(result.succeeded(), "{:?}", result.status);
        assert!(matches!(result.status, TaskStatus::Succeeded { rows: 3 }));
        let steps: Vec<Step> = result.steps.iter().map(|t| t.step).collect();
        assert_eq!(steps, vec![Step::Precheck, Step::Extract, Step::Stage, Step::Import]);

        let body = std::fs::read_to_string(writer.delimited_path()).expect("staged file");
        assert_eq!(body.lines().count(), 4);
        match importer.calls().await.as_slice() {
            [ImportCall::Delimited { rows, fields, target, .. }] => {
                assert_eq!(*rows, 3);
                assert_eq!(fields, "id.int32(),name.string()");
                assert_eq!(target.collection, "t_copy");
            }
            plot_twist => panic!("💀 expected one delimited import, got {plot_twist:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_zero_rows_is_still_a_success() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let empty = TabularBatch::new(vec![
            Column::new("id", ColumnKind::Int),
            Column::new("name", ColumnKind::Text),
        ]);
        let mut source = InMemorySource::new().with_result(QUERY, empty);
        let task = MigrationTask::from_query("t", QUERY, "mirror", "t_copy").with_schema(schema());

        let result = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_task(&task)
            .await;

        assert!(matches!(result.status, TaskStatus::Succeeded { rows: 0 }));
        let body = std::fs::read_to_string(writer.delimited_path()).expect("staged file");
        assert_eq!(body, "id.int32(),name.string()\n");
    }

    #[tokio::test]
    async fn the_one_where_no_schema_means_the_json_array_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let mut source = InMemorySource::new().with_result(QUERY, three_rows());
        let task = MigrationTask::from_query("t", QUERY, "mirror", "t_copy").with_indexes(vec![IndexSpec {
            keys: vec![IndexKey {
                field: "id".into(),
                order: 1,
            }],
            unique: true,
            name: None,
        }]);

        let result = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_task(&task)
            .await;

        assert!(result.succeeded());
        assert!(result.ran(Step::CreateIndexes));
        let calls = importer.calls().await;
        assert!(matches!(calls[0], ImportCall::Document { rows: 3, .. }));
        assert!(matches!(calls[1], ImportCall::CreateIndexes { count: 1, .. }));
    }

    #[tokio::test]
    async fn the_one_where_a_staging_failure_never_reaches_the_importer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let mut source = InMemorySource::new().with_result(QUERY, three_rows());
        let wrong_schema = ColumnSchema::new(vec![ColumnType::new("email", "string")]);
        let task = MigrationTask::from_query("t", QUERY, "mirror", "t_copy").with_schema(wrong_schema);

        let result = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_task(&task)
            .await;

        match &result.status {
            TaskStatus::Failed { step, error } => {
                assert_eq!(*step, Step::Stage);
                assert!(matches!(error, OpsError::StagingIo { .. }));
            }
            other => panic!("💀 expected a staging failure, got {other:?}"),
        }
        assert!(!result.ran(Step::Import));
        assert!(importer.calls().await.is_empty());
        assert!(!writer.delimited_path().exists());
    }

    #[tokio::test]
    async fn the_one_where_a_missing_upload_fails_before_anything_happens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let task = MigrationTask {
            source: TaskSource::File(dir.path().join("never-uploaded.json")),
            ..MigrationTask::from_query("upload", "", "mirror", "t_copy")
        };

        let result = Migrator::new(&writer, &importer).run_task(&task).await;

        assert!(matches!(
            result.status,
            TaskStatus::Failed {
                step: Step::Precheck,
                error: OpsError::MissingPrerequisite(_)
            }
        ));
        assert_eq!(result.steps.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_an_uploaded_json_file_skips_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let upload = dir.path().join("upload.json");
        std::fs::write(&upload, r#"[{"id":1},{"id":2}]"#).expect("write upload");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let task = MigrationTask {
            source: TaskSource::File(upload),
            ..MigrationTask::from_query("upload", "", "mirror", "t_copy")
        };

        let result = Migrator::new(&writer, &importer).run_task(&task).await;

        assert!(matches!(result.status, TaskStatus::Succeeded { rows: 2 }));
        assert!(!result.ran(Step::Extract));
    }

    #[tokio::test]
    async fn the_one_where_one_bad_task_does_not_ruin_the_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let mut source = InMemorySource::new().with_result(QUERY, three_rows());
        let tasks = vec![
            MigrationTask::from_query("first", QUERY, "mirror", "one"),
            MigrationTask::from_query("typo", "selct nothing", "mirror", "two"),
            MigrationTask::from_query("third", QUERY, "mirror", "three"),
        ];

        let report = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_batch(&tasks)
            .await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.succeeded().count(), 2);
        let failed: Vec<&str> = report.failed().map(|r| r.task.as_str()).collect();
        assert_eq!(failed, vec!["typo"]);
        assert!(matches!(
            report.results[1].status,
            TaskStatus::Failed {
                step: Step::Extract,
                error: OpsError::SourceQuery(_)
            }
        ));
        assert_eq!(importer.calls().await.len(), 2);
        assert_eq!(source.seen.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn the_one_where_a_plain_csv_upload_gets_a_typed_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let upload = dir.path().join("users.csv");
        std::fs::write(&upload, "id,name\n1,\"a\nb\"\n2,c\n").expect("write upload");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let task = MigrationTask {
            source: TaskSource::File(upload),
            ..MigrationTask::from_query("upload", "", "mirror", "users").with_schema(schema())
        };

        let result = Migrator::new(&writer, &importer).run_task(&task).await;

        assert!(matches!(result.status, TaskStatus::Succeeded { rows: 2 }), "{:?}", result.status);
        let body = std::fs::read_to_string(writer.delimited_path()).expect("staged file");
        assert_eq!(body.lines().next(), Some("id.int32(),name.string()"));
        assert!(matches!(
            importer.calls().await.as_slice(),
            [ImportCall::Delimited { rows: 2, .. }]
        ));
    }

    #[tokio::test]
    async fn the_one_where_a_broken_task_entry_fails_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new();
        let mut source = InMemorySource::new().with_result(QUERY, three_rows());
        let plan = vec![
            PlannedTask::Invalid {
                name: "confused".into(),
                error: OpsError::Config("task 'confused' names both a query and a source_file".into()),
            },
            MigrationTask::from_query("fine", QUERY, "mirror", "fine").into(),
        ];

        let report = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_plan(plan)
            .await;

        assert_eq!(report.results.len(), 2);
        assert!(matches!(
            report.results[0].status,
            TaskStatus::Failed {
                step: Step::Precheck,
                error: OpsError::Config(_)
            }
        ));
        assert!(report.results[1].succeeded());
        assert_eq!(importer.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_importer_says_no_and_we_believe_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = writer(&dir);
        let importer = InMemoryImporter::new().with_exit_code(1);
        let mut source = InMemorySource::new().with_result(QUERY, three_rows());
        let task = MigrationTask::from_query("t", QUERY, "mirror", "t_copy");

        let result = Migrator::new(&writer, &importer)
            .with_source(&mut source)
            .run_task(&task)
            .await;

        assert!(matches!(
            result.status,
            TaskStatus::Failed {
                step: Step::Import,
                error: OpsError::ImportTool { exit_code: Some(1), .. }
            }
        ));
    }
}
