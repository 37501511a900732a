//! End-to-end tests of the four-step workflow against a scripted backend.

mod common;

use serde_json::json;

use chrono::NaiveDate;
use common::*;
use factorlab::api::Strategy;
use factorlab::factors::{Factor, FactorListing};
use factorlab::workflow::{
    Control, Precondition, Step, StepStatus, WorkflowError, WorkflowEvent, DATASET_PLACEHOLDER,
};

/// Runs upload, extract and generate with the happy backend.
async fn through_generate(controller: &TestController, dir: &std::path::Path) {
    let pdf = write_pdf(dir, "paper.pdf");
    controller.upload_document(Some(&pdf)).await.unwrap();
    controller.extract_content().await.unwrap();
    controller.generate_factor_code().await.unwrap();
}

#[tokio::test]
async fn test_upload_then_extract_normalizes_encoded_factors() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    let pdf = write_pdf(dir.path(), "paper.pdf");

    assert!(!controller.is_enabled(Control::ExtractButton));
    let document = controller.upload_document(Some(&pdf)).await.unwrap();

    assert_eq!(document.markdown_content, "# Title");
    assert_eq!(controller.status(Step::Upload), StepStatus::Success);
    assert!(controller.is_enabled(Control::ExtractButton));
    assert_eq!(
        controller.pipeline().document_content.as_deref(),
        Some("# Title")
    );

    let listing = controller.extract_content().await.unwrap();

    assert_eq!(
        controller.backend().last_request(EXTRACT),
        Some(json!({ "markdown_content": "# Title" }))
    );
    assert_eq!(
        listing,
        FactorListing::Factors(vec![Factor {
            name: "mom".to_string(),
            description: "no description".to_string(),
            kind: "uncategorized".to_string(),
        }])
    );
    assert_eq!(controller.status(Step::Extract), StepStatus::Success);
    assert!(controller.is_enabled(Control::GenerateButton));
    assert!(controller.reporter().alerts().is_empty());
}

#[tokio::test]
async fn test_generate_rejection_keeps_backtest_locked() {
    let dir = tempfile::tempdir().unwrap();
    let backend = happy_backend().with_reply(GENERATE, failure("quota exceeded"));
    let controller = controller(backend);
    let pdf = write_pdf(dir.path(), "paper.pdf");

    controller.upload_document(Some(&pdf)).await.unwrap();
    controller.extract_content().await.unwrap();
    let err = controller.generate_factor_code().await.unwrap_err();

    assert!(matches!(err, WorkflowError::Rejected { step: Step::Generate, .. }));
    assert_eq!(controller.status(Step::Generate), StepStatus::Error);
    assert!(!controller.is_enabled(Control::BacktestButton));
    assert!(!controller.is_enabled(Control::DatasetSelect));
    assert!(!controller.is_enabled(Control::EditCodeButton));
    assert_eq!(
        controller.reporter().alerts(),
        vec!["Code generation failed: quota exceeded".to_string()]
    );
    assert_eq!(controller.pipeline().generated_code, None);
}

#[tokio::test]
async fn test_backtest_without_code_never_calls_backend() {
    let controller = controller(happy_backend());
    controller.select_dataset("stock_daily");

    let err = controller.run_backtest().await.unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Precondition(Precondition::NoFactorCode)
    ));
    assert_eq!(controller.backend().total_calls(), 0);
    assert_eq!(controller.status(Step::Backtest), StepStatus::Pending);
    assert_eq!(
        controller.reporter().alerts(),
        vec!["Please generate factor code first".to_string()]
    );
}

#[tokio::test]
async fn test_backtest_without_dataset_never_calls_backend() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    through_generate(&controller, dir.path()).await;
    let before = controller.backend().total_calls();

    let err = controller.run_backtest().await.unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::Precondition(Precondition::NoDataset)
    ));
    assert_eq!(controller.backend().total_calls(), before);
    assert_eq!(controller.backend().calls(BACKTEST), 0);
    assert_eq!(controller.status(Step::Backtest), StepStatus::Pending);
    assert_eq!(
        controller.reporter().alerts(),
        vec!["Please select a dataset".to_string()]
    );
}

#[tokio::test]
async fn test_backtest_renders_six_series() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    through_generate(&controller, dir.path()).await;
    controller.select_dataset("stock_daily");
    let start = NaiveDate::from_ymd_opt(2024, 1, 1);
    let end = NaiveDate::from_ymd_opt(2024, 6, 30);
    controller.set_date_range(start, end);

    let report = controller.run_backtest().await.unwrap();

    let request = controller.backend().last_request(BACKTEST).unwrap();
    assert_eq!(request["dataset"], "stock_daily");
    assert_eq!(request["start_date"], "2024-01-01");
    assert_eq!(request["end_date"], "2024-06-30");
    assert!(request["factor_code"]
        .as_str()
        .unwrap()
        .starts_with("def factor"));

    assert_eq!(report.chart.dates().len(), 10);
    let strategies: Vec<Strategy> = report.chart.series().iter().map(|s| s.strategy).collect();
    assert_eq!(strategies, Strategy::ALL.to_vec());
    for series in report.chart.series() {
        assert_eq!(series.points.len(), 10);
    }
    assert_eq!(report.stats.rows().len(), 6);
    assert_eq!(controller.status(Step::Backtest), StepStatus::Success);
    assert_eq!(controller.attached_charts(), 1);
    assert!(controller.pipeline().backtest.is_some());
}

#[tokio::test]
async fn test_repeated_backtest_keeps_one_chart() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    through_generate(&controller, dir.path()).await;
    controller.select_dataset("stock_daily");

    let first = controller.run_backtest().await.unwrap();
    let second = controller.run_backtest().await.unwrap();

    assert_ne!(first.chart.id(), second.chart.id());
    assert_eq!(controller.attached_charts(), 1);
    assert_eq!(controller.chart().map(|c| c.id()), Some(second.chart.id()));
}

#[tokio::test]
async fn test_mismatched_series_fails_backtest() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = backtest_ok(10);
    body["results"]["cumulative_returns"]["Q3"] = json!([0.1, 0.2]);
    let controller = controller(happy_backend().with_reply(BACKTEST, body));
    through_generate(&controller, dir.path()).await;
    controller.select_dataset("stock_daily");

    let err = controller.run_backtest().await.unwrap_err();

    assert!(matches!(err, WorkflowError::Chart { .. }));
    assert_eq!(controller.status(Step::Backtest), StepStatus::Error);
    assert_eq!(controller.attached_charts(), 0);
    assert!(!controller.is_loading(Step::Backtest));
}

#[tokio::test]
async fn test_nested_backtest_error_is_rejection() {
    let dir = tempfile::tempdir().unwrap();
    let body = json!({
        "success": true,
        "results": { "error": "factor function raised KeyError: 'close'" },
    });
    let controller = controller(happy_backend().with_reply(BACKTEST, body));
    through_generate(&controller, dir.path()).await;
    controller.select_dataset("stock_daily");

    let err = controller.run_backtest().await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Backtest failed: factor function raised KeyError: 'close'"
    );
    assert_eq!(controller.status(Step::Backtest), StepStatus::Error);
}

#[tokio::test]
async fn test_transport_failure_clears_loading() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new().with_failure(UPLOAD, "connection reset by peer");
    let controller = controller(backend);
    let pdf = write_pdf(dir.path(), "paper.pdf");

    let err = controller.upload_document(Some(&pdf)).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Transport { step: Step::Upload, .. }));
    assert_eq!(controller.status(Step::Upload), StepStatus::Error);
    assert!(!controller.is_loading(Step::Upload));
    assert!(!controller.is_running(Step::Upload));
    assert_eq!(controller.reporter().loading(Step::Upload), vec![true, false]);
    let alerts = controller.reporter().alerts();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].starts_with("Upload failed: "));
    assert!(alerts[0].contains("connection reset by peer"));
    assert!(!controller.is_enabled(Control::ExtractButton));
}

#[tokio::test]
async fn test_missing_success_flag_is_failure() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new().with_reply(UPLOAD, json!({ "error": "Internal error" }));
    let controller = controller(backend);
    let pdf = write_pdf(dir.path(), "paper.pdf");

    let err = controller.upload_document(Some(&pdf)).await.unwrap_err();

    assert_eq!(err.to_string(), "Upload failed: Internal error");
    assert_eq!(controller.status(Step::Upload), StepStatus::Error);
}

#[tokio::test]
async fn test_failed_step_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend().with_reply(EXTRACT, failure("model timeout")));
    let pdf = write_pdf(dir.path(), "paper.pdf");
    controller.upload_document(Some(&pdf)).await.unwrap();

    assert!(controller.extract_content().await.is_err());
    assert_eq!(controller.status(Step::Extract), StepStatus::Error);

    controller
        .backend()
        .set_reply(EXTRACT, extract_ok(json!([{ "name": "value", "type": "fundamental" }])));
    controller.extract_content().await.unwrap();

    assert_eq!(controller.status(Step::Extract), StepStatus::Success);
    assert_eq!(controller.backend().calls(EXTRACT), 2);
}

#[tokio::test]
async fn test_upload_preconditions() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    let docx = dir.path().join("paper.docx");
    std::fs::write(&docx, b"not a pdf").unwrap();

    let none = controller.upload_document(None).await.unwrap_err();
    let wrong = controller.upload_document(Some(&docx)).await.unwrap_err();

    assert!(matches!(
        none,
        WorkflowError::Precondition(Precondition::NoFileSelected)
    ));
    assert!(matches!(
        wrong,
        WorkflowError::Precondition(Precondition::NotPdf)
    ));
    assert_eq!(controller.backend().total_calls(), 0);
    assert_eq!(controller.status(Step::Upload), StepStatus::Pending);
    assert!(controller.reporter().loading(Step::Upload).is_empty());
}

#[tokio::test]
async fn test_extract_and_generate_preconditions() {
    let controller = controller(happy_backend());

    let extract = controller.extract_content().await.unwrap_err();
    let generate = controller.generate_factor_code().await.unwrap_err();

    assert!(matches!(
        extract,
        WorkflowError::Precondition(Precondition::NoDocument)
    ));
    assert!(matches!(
        generate,
        WorkflowError::Precondition(Precondition::NoExtractedInfo)
    ));
    assert_eq!(controller.backend().total_calls(), 0);
    assert_eq!(controller.status(Step::Extract), StepStatus::Pending);
    assert_eq!(controller.status(Step::Generate), StepStatus::Pending);
}

#[tokio::test]
async fn test_empty_extracted_info_blocks_generate() {
    let dir = tempfile::tempdir().unwrap();
    let backend =
        happy_backend().with_reply(EXTRACT, json!({ "success": true, "extracted_info": {} }));
    let controller = controller(backend);
    let pdf = write_pdf(dir.path(), "paper.pdf");
    controller.upload_document(Some(&pdf)).await.unwrap();

    let listing = controller.extract_content().await.unwrap();
    let err = controller.generate_factor_code().await.unwrap_err();

    assert_eq!(listing, FactorListing::NothingExtracted);
    assert!(matches!(
        err,
        WorkflowError::Precondition(Precondition::NoExtractedInfo)
    ));
    assert_eq!(controller.backend().calls(GENERATE), 0);
}

#[tokio::test]
async fn test_generate_sends_extracted_info_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    let pdf = write_pdf(dir.path(), "paper.pdf");
    controller.upload_document(Some(&pdf)).await.unwrap();
    controller.extract_content().await.unwrap();
    controller.generate_factor_code().await.unwrap();

    let request = controller.backend().last_request(GENERATE).unwrap();
    let expected = extract_ok(json!("[{\"name\":\"mom\"}]"));
    assert_eq!(request["extracted_info"], expected["extracted_info"]);

    for control in [
        Control::EditCodeButton,
        Control::BacktestButton,
        Control::DatasetSelect,
        Control::StartDate,
        Control::EndDate,
    ] {
        assert!(controller.is_enabled(control), "{:?} should be enabled", control);
    }
}

#[tokio::test]
async fn test_concurrent_run_of_same_step_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    let pdf = write_pdf(dir.path(), "paper.pdf");
    controller.upload_document(Some(&pdf)).await.unwrap();
    let release = controller.backend().hold(EXTRACT);

    let (first, second) = tokio::join!(controller.extract_content(), async {
        while !controller.is_running(Step::Extract) {
            tokio::task::yield_now().await;
        }
        assert!(controller.is_loading(Step::Extract));
        let second = controller.extract_content().await;
        release.notify_one();
        second
    });

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(WorkflowError::StepBusy(Step::Extract))
    ));
    assert_eq!(controller.backend().calls(EXTRACT), 1);
    assert_eq!(controller.status(Step::Extract), StepStatus::Success);
    assert!(!controller.is_running(Step::Extract));
    assert!(controller
        .reporter()
        .alerts()
        .contains(&"Extraction is already running".to_string()));
}

#[tokio::test]
async fn test_edit_replaces_generated_code() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    through_generate(&controller, dir.path()).await;

    let original = controller.open_editor().unwrap();
    assert!(original.starts_with("def factor"));
    assert_eq!(controller.editor_buffer(), Some(original));

    let edited = "def factor(df):\n    return df.volume.rank()\n";
    controller.save_edit(edited).unwrap();

    assert_eq!(controller.pipeline().generated_code.as_deref(), Some(edited));
    assert_eq!(controller.editor_buffer(), None);
    assert!(matches!(
        controller.reporter().events().last(),
        Some(WorkflowEvent::CodeRendered { code }) if code.as_str() == edited
    ));

    controller.select_dataset("stock_daily");
    controller.run_backtest().await.unwrap();
    let request = controller.backend().last_request(BACKTEST).unwrap();
    assert_eq!(request["factor_code"], edited);
}

#[tokio::test]
async fn test_editor_requires_code_and_open_buffer() {
    let controller = controller(happy_backend());

    assert!(matches!(
        controller.open_editor(),
        Err(WorkflowError::Precondition(Precondition::NoFactorCode))
    ));
    assert!(matches!(
        controller.save_edit("x = 1"),
        Err(WorkflowError::Precondition(Precondition::EditorClosed))
    ));
    assert_eq!(controller.pipeline().generated_code, None);
}

#[tokio::test]
async fn test_load_datasets_leads_with_placeholder() {
    let controller = controller(happy_backend());

    let choices = controller.load_datasets().await;

    assert_eq!(choices.options().len(), 3);
    assert_eq!(choices.options()[0].name, DATASET_PLACEHOLDER);
    assert_eq!(choices.options()[1].id, "stock_daily");
    assert_eq!(choices.options()[2].id, "crypto_hourly");
    assert_eq!(controller.datasets(), choices);
}

#[tokio::test]
async fn test_load_datasets_failure_is_silent() {
    let backend = ScriptedBackend::new().with_failure(DATASETS, "connection refused");
    let controller = controller(backend);

    let choices = controller.load_datasets().await;

    assert_eq!(choices.options().len(), 1);
    assert!(choices.options()[0].is_placeholder());
    assert!(controller.reporter().alerts().is_empty());
    for step in Step::ALL {
        assert_eq!(controller.status(step), StepStatus::Pending);
    }
}

#[tokio::test]
async fn test_model_forwarded_to_llm_steps() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend()).with_model(Some("deepseek-chat".to_string()));
    through_generate(&controller, dir.path()).await;

    for endpoint in [UPLOAD, EXTRACT, GENERATE] {
        let request = controller.backend().last_request(endpoint).unwrap();
        assert_eq!(request["model_id"], "deepseek-chat", "{}", endpoint);
    }
    assert_eq!(
        controller.pipeline().artifacts.upload_model.as_deref(),
        Some("gpt-4o")
    );
}

#[tokio::test]
async fn test_model_catalog() {
    let backend = ScriptedBackend::new()
        .with_reply(
            MODELS,
            json!({
                "success": true,
                "models": {
                    "openai": ["gpt-4o", { "id": "gpt-4o-mini", "name": "GPT-4o mini" }],
                },
            }),
        )
        .with_reply(TEST_MODEL, failure("invalid api key"));
    let controller = controller(backend);

    let models = controller.list_models().await.unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[1].name, "GPT-4o mini");

    let err = controller.test_model("gpt-4o").await.unwrap_err();
    assert_eq!(err.to_string(), "Model test failed: invalid api key");
    assert_eq!(
        controller.backend().last_request(TEST_MODEL),
        Some(json!({ "model_id": "gpt-4o" }))
    );
}

#[tokio::test]
async fn test_save_artifacts_writes_session_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    through_generate(&controller, dir.path()).await;
    controller.select_dataset("stock_daily");
    controller.run_backtest().await.unwrap();

    let out = dir.path().join("out");
    let written = controller.save_artifacts(&out).await.unwrap();

    assert_eq!(written.len(), 3);
    assert_eq!(std::fs::read_to_string(out.join("document.md")).unwrap(), "# Title");
    assert!(std::fs::read_to_string(out.join("factor.py"))
        .unwrap()
        .starts_with("def factor"));
    let backtest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("backtest.json")).unwrap())
            .unwrap();
    assert_eq!(backtest["cumulative_returns"]["dates"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_status_events_pass_through_processing() {
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(happy_backend());
    let pdf = write_pdf(dir.path(), "paper.pdf");
    controller.upload_document(Some(&pdf)).await.unwrap();

    let statuses: Vec<StepStatus> = controller
        .reporter()
        .events()
        .into_iter()
        .filter_map(|e| match e {
            WorkflowEvent::StatusChanged {
                step: Step::Upload,
                status,
            } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![StepStatus::Processing, StepStatus::Success]);

    let badge = controller.badge(Step::Upload);
    assert_eq!(badge.label(), "completed");
    assert_eq!(badge.classes(), &["status-badge", "status-success"]);
}
