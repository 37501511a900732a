//! Shared test utilities for factorlab integration tests.
//!
//! This module provides:
//! - `ScriptedBackend`, a `FactorBackend` that answers from canned JSON and
//!   records every request it receives
//! - `CollectingReporter`, which keeps every workflow event for inspection
//! - Response builders for the common backend answers

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Notify;

use factorlab::api::{
    BackendError, BacktestRequest, BacktestResponse, DatasetsResponse, DocumentUpload,
    ExtractRequest, ExtractResponse, FactorBackend, GenerateRequest, GenerateResponse,
    ModelsResponse, TestModelResponse, UploadResponse,
};
use factorlab::workflow::{Step, WorkflowController, WorkflowEvent, WorkflowReporter};

pub const UPLOAD: &str = "upload_pdf";
pub const EXTRACT: &str = "extract_content";
pub const GENERATE: &str = "generate_factor";
pub const DATASETS: &str = "datasets";
pub const BACKTEST: &str = "run_backtest";
pub const MODELS: &str = "models";
pub const TEST_MODEL: &str = "test_model";

/// What a scripted endpoint answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    /// A decoded response body.
    Json(Value),
    /// A transport failure carrying this message.
    Fail(String),
}

/// Backend double answering every endpoint from a script.
///
/// Replies are sticky: an endpoint keeps answering the same way until it is
/// re-scripted. Unscripted endpoints fail like an unreachable server.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<HashMap<&'static str, Reply>>,
    requests: Mutex<Vec<(&'static str, Value)>>,
    holds: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, endpoint: &'static str, body: Value) -> Self {
        self.set_reply(endpoint, body);
        self
    }

    pub fn with_failure(self, endpoint: &'static str, message: &str) -> Self {
        self.set_failure(endpoint, message);
        self
    }

    pub fn set_reply(&self, endpoint: &'static str, body: Value) {
        self.replies
            .lock()
            .unwrap()
            .insert(endpoint, Reply::Json(body));
    }

    pub fn set_failure(&self, endpoint: &'static str, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(endpoint, Reply::Fail(message.to_string()));
    }

    /// Makes `endpoint` wait until the returned handle is notified.
    pub fn hold(&self, endpoint: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds
            .lock()
            .unwrap()
            .insert(endpoint, Arc::clone(&notify));
        notify
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == endpoint)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self, endpoint: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(e, _)| *e == endpoint)
            .map(|(_, body)| body.clone())
    }

    async fn answer<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: Value,
    ) -> Result<T, BackendError> {
        self.requests.lock().unwrap().push((endpoint, request));

        let hold = self.holds.lock().unwrap().get(endpoint).cloned();
        if let Some(notify) = hold {
            notify.notified().await;
        }

        let reply = self.replies.lock().unwrap().get(endpoint).cloned();
        match reply {
            Some(Reply::Json(body)) => {
                Ok(serde_json::from_value(body).expect("scripted reply should decode"))
            }
            Some(Reply::Fail(message)) => Err(BackendError::Client(message)),
            None => Err(BackendError::Client(format!(
                "connection refused ({})",
                endpoint
            ))),
        }
    }
}

#[async_trait]
impl FactorBackend for ScriptedBackend {
    async fn upload_pdf(
        &self,
        document: DocumentUpload,
        model_id: Option<&str>,
    ) -> Result<UploadResponse, BackendError> {
        let request = json!({
            "file_name": document.file_name,
            "size": document.bytes.len(),
            "model_id": model_id,
        });
        self.answer(UPLOAD, request).await
    }

    async fn extract_content(
        &self,
        request: ExtractRequest<'_>,
    ) -> Result<ExtractResponse, BackendError> {
        self.answer(EXTRACT, serde_json::to_value(&request).unwrap())
            .await
    }

    async fn generate_factor(
        &self,
        request: GenerateRequest<'_>,
    ) -> Result<GenerateResponse, BackendError> {
        self.answer(GENERATE, serde_json::to_value(&request).unwrap())
            .await
    }

    async fn list_datasets(&self) -> Result<DatasetsResponse, BackendError> {
        self.answer(DATASETS, Value::Null).await
    }

    async fn run_backtest(
        &self,
        request: BacktestRequest<'_>,
    ) -> Result<BacktestResponse, BackendError> {
        self.answer(BACKTEST, serde_json::to_value(&request).unwrap())
            .await
    }

    async fn list_models(&self) -> Result<ModelsResponse, BackendError> {
        self.answer(MODELS, Value::Null).await
    }

    async fn test_model(&self, model_id: &str) -> Result<TestModelResponse, BackendError> {
        self.answer(TEST_MODEL, json!({ "model_id": model_id }))
            .await
    }
}

/// Reporter that keeps every event in order.
#[derive(Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl CollectingReporter {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::Alert { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// The sequence of loading flags reported for `step`.
    pub fn loading(&self, step: Step) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::Loading { step: s, active } if s == step => Some(active),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl WorkflowReporter for CollectingReporter {
    fn report(&self, event: WorkflowEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub type TestController = WorkflowController<ScriptedBackend, CollectingReporter>;

pub fn controller(backend: ScriptedBackend) -> TestController {
    WorkflowController::new(backend, CollectingReporter::default())
}

/// Writes a small placeholder PDF into `dir`.
pub fn write_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").expect("Failed to write test PDF");
    path
}

// ============================================================================
// Canned responses
// ============================================================================

pub fn upload_ok(markdown: &str) -> Value {
    json!({
        "success": true,
        "markdown_content": markdown,
        "markdown_file": "paper.md",
        "original_file": "paper.pdf",
        "model_used": "gpt-4o",
    })
}

pub fn extract_ok(key_factors: Value) -> Value {
    json!({
        "success": true,
        "extracted_info": {
            "datasets": {
                "primary": "CSI 300 constituents",
                "time_range": "2010-2020",
                "frequency": "daily",
            },
            "core_problem": "Short-term reversal",
            "solution": {
                "method": "cross-sectional ranking",
                "algorithm": "z-score",
                "strategy": "long top quintile, short bottom quintile",
            },
            "key_factors": key_factors,
        },
    })
}

pub fn generate_ok(code: &str) -> Value {
    json!({ "success": true, "factor_code": code, "code_file": "factor.py" })
}

pub fn failure(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

pub fn datasets_ok() -> Value {
    json!({
        "datasets": [
            { "id": "stock_daily", "name": "Daily equities", "description": "A-share daily bars" },
            { "id": "crypto_hourly", "name": "Hourly crypto", "description": "Top 20 coins" },
        ]
    })
}

/// A backtest answer with `len` dates and all six series of that length.
pub fn backtest_ok(len: usize) -> Value {
    let dates: Vec<String> = (0..len)
        .map(|i| format!("2024-01-{:02}", i + 1))
        .collect();
    let series = |scale: f64| -> Vec<f64> { (0..len).map(|i| i as f64 * scale).collect() };
    let stats = |annual: f64| {
        json!({
            "annual_return": annual,
            "annual_volatility": 18.2,
            "sharpe_ratio": 0.734,
            "max_drawdown": -12.5,
        })
    };

    json!({
        "success": true,
        "results": {
            "performance_stats": {
                "Q1": stats(-3.1),
                "Q2": stats(1.2),
                "Q3": stats(4.0),
                "Q4": stats(6.6),
                "Q5": stats(9.8),
                "long_short": stats(12.9),
            },
            "cumulative_returns": {
                "dates": dates,
                "Q1": series(-0.01),
                "Q2": series(0.0),
                "Q3": series(0.01),
                "Q4": series(0.02),
                "Q5": series(0.03),
                "long_short": series(0.04),
            },
        },
    })
}

/// Backend with every step answering successfully.
pub fn happy_backend() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_reply(UPLOAD, upload_ok("# Title"))
        .with_reply(EXTRACT, extract_ok(json!("[{\"name\":\"mom\"}]")))
        .with_reply(GENERATE, generate_ok("def factor(df):\n    return df.close.pct_change(20)\n"))
        .with_reply(DATASETS, datasets_ok())
        .with_reply(BACKTEST, backtest_ok(10))
}
