//! The four-step research workflow: upload, extract, generate, backtest.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use log::{debug, info, warn};

use super::error::{Precondition, WorkflowError};
use super::gate::{Control, StepGate};
use super::progress::{WorkflowEvent, WorkflowReporter};
use super::state::{BacktestSelection, DatasetChoices, PipelineState};
use super::status::{StatusBadge, StatusIndicator};
use super::step::{Step, StepStatus};
use crate::api::{
    BackendError, BacktestRequest, ConvertedDocument, CumulativeReturns,
    DocumentUpload, Envelope, ExtractRequest, FactorBackend, GenerateRequest, HttpBackend,
    ModelInfo, ModelProbe,
};
use crate::chart::{ChartInstance, ChartRenderer, StatsTable};
use crate::config::{resolve_config, ClientConfig};
use crate::error::StorageError;
use crate::factors::FactorListing;

pub const DOCUMENT_FILE_NAME: &str = "document.md";
pub const CODE_FILE_NAME: &str = "factor.py";
pub const BACKTEST_FILE_NAME: &str = "backtest.json";

/// What a successful backtest put on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub chart: ChartInstance,
    pub stats: StatsTable,
}

#[derive(Default)]
struct Shared {
    pipeline: PipelineState,
    statuses: StatusIndicator,
    gate: StepGate,
    chart: ChartRenderer,
    selection: BacktestSelection,
    datasets: DatasetChoices,
    editor: Option<String>,
    loading: BTreeSet<Step>,
}

/// Drives the workflow against a backend and reports every visible change.
///
/// Operations take `&self`; state lives behind a mutex that is never held
/// across a request. Each step can have one run in flight at a time.
pub struct WorkflowController<B, R> {
    backend: B,
    reporter: R,
    model_id: Option<String>,
    shared: Mutex<Shared>,
    in_flight: [AtomicBool; 4],
}

/// An in-progress step. Dropping it hides the loading affordance and frees
/// the step for another run, whichever way the run ended.
struct StepRun<'a, B: FactorBackend, R: WorkflowReporter> {
    controller: &'a WorkflowController<B, R>,
    step: Step,
}

impl<B: FactorBackend, R: WorkflowReporter> Drop for StepRun<'_, B, R> {
    fn drop(&mut self) {
        self.controller.set_loading(self.step, false);
        self.controller.in_flight[self.step.index()].store(false, Ordering::Release);
    }
}

impl<R: WorkflowReporter> WorkflowController<HttpBackend, R> {
    /// Production constructor: HTTP backend, configured model and dataset.
    pub fn from_config(config: &ClientConfig, reporter: R) -> Result<Self, BackendError> {
        let backend = HttpBackend::new(config)?;
        let controller = Self::new(backend, reporter).with_model(config.model_id.clone());
        if let Some(dataset) = &config.default_dataset {
            controller.select_dataset(dataset.clone());
        }
        Ok(controller)
    }

    /// Resolves the config (explicit path, user config file, environment)
    /// and builds the controller from it.
    pub fn from_config_path(path: Option<&Path>, reporter: R) -> crate::Result<Self> {
        let config = resolve_config(path)?;
        Ok(Self::from_config(&config, reporter)?)
    }
}

impl<B: FactorBackend, R: WorkflowReporter> WorkflowController<B, R> {
    pub fn new(backend: B, reporter: R) -> Self {
        Self {
            backend,
            reporter,
            model_id: None,
            shared: Mutex::new(Shared::default()),
            in_flight: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    /// Model forwarded to upload, extract and generate.
    pub fn with_model(mut self, model_id: Option<String>) -> Self {
        self.model_id = model_id.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    /// Step 1: converts the selected PDF to markdown on the server.
    #[tracing::instrument(name = "workflow.upload", skip_all)]
    pub async fn upload_document(
        &self,
        file: Option<&Path>,
    ) -> Result<ConvertedDocument, WorkflowError> {
        let Some(path) = file else {
            return self.precondition(Precondition::NoFileSelected);
        };
        if !is_pdf(path) {
            return self.precondition(Precondition::NotPdf);
        }

        let _run = self.begin(Step::Upload)?;
        let outcome = match DocumentUpload::from_path(path).await {
            Ok(document) => {
                self.backend
                    .upload_pdf(document, self.model_id.as_deref())
                    .await
            }
            Err(e) => Err(e),
        };
        let document = self.settle(Step::Upload, outcome)?;

        {
            let mut shared = self.lock();
            let pipeline = &mut shared.pipeline;
            pipeline.document_content = Some(document.markdown_content.clone());
            pipeline.artifacts.original_file = document.original_file.clone();
            pipeline.artifacts.markdown_file = document.markdown_file.clone();
            pipeline.artifacts.upload_model = document.model_used.clone();
        }
        info!(
            "Converted {} to {} characters of markdown",
            path.display(),
            document.markdown_content.len()
        );

        self.reporter.report(WorkflowEvent::DocumentLoaded {
            content: document.markdown_content.clone(),
        });
        self.set_status(Step::Upload, StepStatus::Success);
        self.unlock_after(Step::Upload);
        Ok(document)
    }

    /// Step 2: extracts structured information from the uploaded markdown.
    #[tracing::instrument(name = "workflow.extract", skip_all)]
    pub async fn extract_content(&self) -> Result<FactorListing, WorkflowError> {
        let content = self
            .lock()
            .pipeline
            .document_content
            .clone()
            .filter(|c| !c.is_empty());
        let Some(content) = content else {
            return self.precondition(Precondition::NoDocument);
        };

        let _run = self.begin(Step::Extract)?;
        let outcome = self
            .backend
            .extract_content(ExtractRequest {
                markdown_content: &content,
                model_id: self.model_id.as_deref(),
            })
            .await;
        let extraction = self.settle(Step::Extract, outcome)?;

        let listing = extraction.info.key_factors.normalize();
        debug!(
            "Extracted {} key factors ({:?})",
            listing.factors().len(),
            listing.marker()
        );
        {
            let mut shared = self.lock();
            shared.pipeline.extracted_info = Some(extraction.info.clone());
            shared.pipeline.artifacts.extract_model = extraction.model_used;
        }

        self.reporter.report(WorkflowEvent::FactorsExtracted {
            info: extraction.info,
            listing: listing.clone(),
        });
        self.set_status(Step::Extract, StepStatus::Success);
        self.unlock_after(Step::Extract);
        Ok(listing)
    }

    /// Step 3: generates factor code from the extracted information.
    #[tracing::instrument(name = "workflow.generate", skip_all)]
    pub async fn generate_factor_code(&self) -> Result<String, WorkflowError> {
        let info = self
            .lock()
            .pipeline
            .extracted_info
            .clone()
            .filter(|i| !i.is_empty());
        let Some(info) = info else {
            return self.precondition(Precondition::NoExtractedInfo);
        };

        let _run = self.begin(Step::Generate)?;
        let outcome = self
            .backend
            .generate_factor(GenerateRequest {
                extracted_info: &info,
                model_id: self.model_id.as_deref(),
            })
            .await;
        let generated = self.settle(Step::Generate, outcome)?;

        {
            let mut shared = self.lock();
            shared.pipeline.generated_code = Some(generated.factor_code.clone());
            shared.pipeline.artifacts.code_file = generated.code_file;
            shared.pipeline.artifacts.generate_model = generated.model_used;
        }
        info!("Generated {} lines of factor code", generated.factor_code.lines().count());

        self.reporter.report(WorkflowEvent::CodeRendered {
            code: generated.factor_code.clone(),
        });
        self.set_status(Step::Generate, StepStatus::Success);
        self.unlock_after(Step::Generate);
        Ok(generated.factor_code)
    }

    /// Step 4: backtests the current code on the selected dataset and
    /// renders the chart and stats.
    #[tracing::instrument(name = "workflow.backtest", skip_all)]
    pub async fn run_backtest(&self) -> Result<BacktestReport, WorkflowError> {
        let (code, selection) = {
            let shared = self.lock();
            (
                shared
                    .pipeline
                    .generated_code
                    .clone()
                    .filter(|c| !c.trim().is_empty()),
                shared.selection.clone(),
            )
        };
        let Some(code) = code else {
            return self.precondition(Precondition::NoFactorCode);
        };
        let Some(dataset) = selection.dataset() else {
            return self.precondition(Precondition::NoDataset);
        };

        let _run = self.begin(Step::Backtest)?;
        info!(
            "Backtesting on {} ({:?} to {:?})",
            dataset, selection.start_date, selection.end_date
        );
        let outcome = self
            .backend
            .run_backtest(BacktestRequest {
                factor_code: &code,
                dataset,
                start_date: selection.start_date,
                end_date: selection.end_date,
            })
            .await;
        let results = self.settle(Step::Backtest, outcome)?;

        let empty = CumulativeReturns::default();
        let returns = results.cumulative_returns.as_ref().unwrap_or(&empty);
        let rendered = self.lock().chart.render(returns).cloned();
        let chart = match rendered {
            Ok(chart) => chart,
            Err(e) => return Err(self.fail(Step::Backtest, e.into())),
        };
        let stats = StatsTable::from_results(&results.performance_stats);
        self.lock().pipeline.backtest = Some(results);

        self.reporter.report(WorkflowEvent::BacktestRendered {
            chart: chart.clone(),
            stats: stats.clone(),
        });
        self.set_status(Step::Backtest, StepStatus::Success);
        Ok(BacktestReport { chart, stats })
    }

    // ------------------------------------------------------------------------
    // Inline code editing
    // ------------------------------------------------------------------------

    /// Copies the current code into the edit buffer and returns it.
    pub fn open_editor(&self) -> Result<String, WorkflowError> {
        let code = self.lock().pipeline.generated_code.clone();
        let Some(code) = code else {
            return self.precondition(Precondition::NoFactorCode);
        };
        self.lock().editor = Some(code.clone());
        Ok(code)
    }

    /// Replaces the generated code with `edited` and closes the editor.
    pub fn save_edit(&self, edited: impl Into<String>) -> Result<(), WorkflowError> {
        let edited = edited.into();
        let saved = {
            let mut shared = self.lock();
            if shared.editor.take().is_some() {
                shared.pipeline.generated_code = Some(edited.clone());
                true
            } else {
                false
            }
        };
        if !saved {
            return self.precondition(Precondition::EditorClosed);
        }

        info!("Factor code edited ({} bytes)", edited.len());
        self.reporter
            .report(WorkflowEvent::CodeRendered { code: edited });
        Ok(())
    }

    pub fn cancel_edit(&self) {
        self.lock().editor = None;
    }

    pub fn editor_buffer(&self) -> Option<String> {
        self.lock().editor.clone()
    }

    // ------------------------------------------------------------------------
    // Datasets and backtest inputs
    // ------------------------------------------------------------------------

    /// Fetches the dataset list. A failure only logs: the list falls back
    /// to the placeholder entry and the user is not alerted.
    pub async fn load_datasets(&self) -> DatasetChoices {
        let entries = match self.backend.list_datasets().await {
            Ok(response) => response.datasets,
            Err(e) => {
                warn!("Failed to load datasets: {}", e);
                Vec::new()
            }
        };
        let choices = DatasetChoices::from_entries(entries);
        debug!("Loaded {} datasets", choices.datasets().count());

        self.lock().datasets = choices.clone();
        self.reporter.report(WorkflowEvent::DatasetsLoaded {
            choices: choices.clone(),
        });
        choices
    }

    /// Selects the backtest dataset; an empty id clears the selection.
    pub fn select_dataset(&self, dataset: impl Into<String>) {
        let dataset = dataset.into();
        let mut shared = self.lock();
        if !dataset.is_empty()
            && shared.datasets.datasets().next().is_some()
            && !shared.datasets.contains(&dataset)
        {
            warn!("Dataset '{}' is not in the loaded dataset list", dataset);
        }
        shared.selection.dataset = Some(dataset).filter(|d| !d.is_empty());
    }

    pub fn set_date_range(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) {
        let mut shared = self.lock();
        shared.selection.start_date = start_date;
        shared.selection.end_date = end_date;
    }

    // ------------------------------------------------------------------------
    // Model catalog
    // ------------------------------------------------------------------------

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, WorkflowError> {
        let outcome = self.backend.list_models().await;
        self.settle_service("Loading models", outcome)
    }

    pub async fn test_model(&self, model_id: &str) -> Result<ModelProbe, WorkflowError> {
        let outcome = self.backend.test_model(model_id).await;
        self.settle_service("Model test", outcome)
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Writes whatever the session has produced (markdown, code, backtest
    /// results) into `dir` and returns the written paths.
    pub async fn save_artifacts(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let pipeline = self.pipeline();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: dir.to_path_buf(),
                source: e,
            })?;

        let mut written = Vec::new();
        if let Some(document) = &pipeline.document_content {
            written.push(write_artifact(dir, DOCUMENT_FILE_NAME, document.as_bytes()).await?);
        }
        if let Some(code) = &pipeline.generated_code {
            written.push(write_artifact(dir, CODE_FILE_NAME, code.as_bytes()).await?);
        }
        if let Some(backtest) = &pipeline.backtest {
            let json = serde_json::to_vec_pretty(backtest)?;
            written.push(write_artifact(dir, BACKTEST_FILE_NAME, &json).await?);
        }

        info!("Saved {} artifacts to {}", written.len(), dir.display());
        Ok(written)
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn pipeline(&self) -> PipelineState {
        self.lock().pipeline.clone()
    }

    pub fn status(&self, step: Step) -> StepStatus {
        self.lock().statuses.status(step)
    }

    pub fn badge(&self, step: Step) -> StatusBadge {
        self.lock().statuses.badge(step).clone()
    }

    pub fn is_enabled(&self, control: Control) -> bool {
        self.lock().gate.is_enabled(control)
    }

    pub fn can_run(&self, step: Step) -> bool {
        self.lock().gate.can_run(step)
    }

    pub fn is_loading(&self, step: Step) -> bool {
        self.lock().loading.contains(&step)
    }

    pub fn is_running(&self, step: Step) -> bool {
        self.in_flight[step.index()].load(Ordering::Acquire)
    }

    pub fn chart(&self) -> Option<ChartInstance> {
        self.lock().chart.current().cloned()
    }

    pub fn attached_charts(&self) -> usize {
        self.lock().chart.attached()
    }

    pub fn selection(&self) -> BacktestSelection {
        self.lock().selection.clone()
    }

    pub fn datasets(&self) -> DatasetChoices {
        self.lock().datasets.clone()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims the step, marks it processing and shows its loading affordance.
    fn begin(&self, step: Step) -> Result<StepRun<'_, B, R>, WorkflowError> {
        if self.in_flight[step.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.reject(WorkflowError::StepBusy(step)));
        }

        let run = StepRun {
            controller: self,
            step,
        };
        self.set_status(step, StepStatus::Processing);
        self.set_loading(step, true);
        Ok(run)
    }

    /// Turns a backend outcome into the step's payload, failing the step on
    /// transport errors and `success: false` answers.
    fn settle<E: Envelope>(
        &self,
        step: Step,
        outcome: Result<E, BackendError>,
    ) -> Result<E::Payload, WorkflowError> {
        let result = match outcome {
            Ok(envelope) => envelope
                .into_payload()
                .map_err(|message| WorkflowError::Rejected { step, message }),
            Err(source) => Err(WorkflowError::Transport { step, source }),
        };
        result.map_err(|e| self.fail(step, e))
    }

    fn settle_service<E: Envelope>(
        &self,
        action: &'static str,
        outcome: Result<E, BackendError>,
    ) -> Result<E::Payload, WorkflowError> {
        let message = match outcome {
            Ok(envelope) => match envelope.into_payload() {
                Ok(payload) => return Ok(payload),
                Err(message) => message,
            },
            Err(e) => e.to_string(),
        };
        Err(self.reject(WorkflowError::Service { action, message }))
    }

    fn precondition<T>(&self, precondition: Precondition) -> Result<T, WorkflowError> {
        Err(self.reject(precondition.into()))
    }

    /// Alerts without touching any status.
    fn reject(&self, error: WorkflowError) -> WorkflowError {
        self.alert(error.to_string());
        error
    }

    /// Alerts and marks the step failed.
    fn fail(&self, step: Step, error: WorkflowError) -> WorkflowError {
        self.alert(error.to_string());
        self.set_status(step, StepStatus::Error);
        error
    }

    fn alert(&self, message: String) {
        warn!("{}", message);
        self.reporter.report(WorkflowEvent::Alert { message });
    }

    fn set_status(&self, step: Step, status: StepStatus) {
        let result = self.lock().statuses.set_status(step, status);
        match result {
            Ok(()) => self
                .reporter
                .report(WorkflowEvent::StatusChanged { step, status }),
            Err(e) => warn!("Ignoring status change: {}", e),
        }
    }

    fn set_loading(&self, step: Step, active: bool) {
        let changed = {
            let mut shared = self.lock();
            if active {
                shared.loading.insert(step)
            } else {
                shared.loading.remove(&step)
            }
        };
        if changed {
            self.reporter
                .report(WorkflowEvent::Loading { step, active });
        }
    }

    fn unlock_after(&self, step: Step) {
        let controls = self.lock().gate.unlock_after(step);
        if !controls.is_empty() {
            self.reporter
                .report(WorkflowEvent::ControlsEnabled { controls });
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

async fn write_artifact(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf, StorageError> {
    let path = dir.join(name);
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| StorageError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
    Ok(path)
}
