mod common;

use std::sync::Arc;

use common::{
    json_template, topic_template, Harness, LateWriteStore, ManualDispatcher, MockProvider, RecordingStore,
};
use forge::db::models::{ItemOutcome, JobStatus};
use forge::db::JobFilter;
use forge::export::{ExportFormat, ExportPayload};
use forge::services::{BatchEntry, GenerateRequest, TemplatePatch};
use forge::ForgeError;
use llm::{ResponseFormat, TokenUsage};
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;

fn vars(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn request(template_id: &str, count: u32, variables: Value) -> GenerateRequest {
    GenerateRequest {
        template_id: template_id.to_string(),
        provider: "mock".to_string(),
        model: "mock-1".to_string(),
        variables: vars(variables),
        count,
    }
}

fn entry(request: &GenerateRequest) -> Value {
    serde_json::to_value(request).unwrap()
}

#[tokio::test]
async fn test_item_failure_is_recorded_and_job_completes() {
    let h = Harness::new(MockProvider::new("item {n}").failing_on(&[2]));
    let template = h.template("alice", topic_template()).await;

    let submitted = h
        .generations
        .create("alice", request(&template.id, 3, json!({"topic": "AI"})))
        .await
        .unwrap();
    assert_eq!(submitted.job.status, JobStatus::Pending);
    assert_eq!(submitted.job.progress, 0);
    assert_eq!(h.dispatcher.submitted.lock().unwrap().clone(), vec![submitted.job.job_id.clone()]);

    let status = h.processor.process(&submitted.job.job_id).await.unwrap();
    assert_eq!(status, JobStatus::Completed);

    let job = h.job(&submitted.job.job_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.error_message.is_none());
    assert_eq!(job.results.len(), 3);
    assert_eq!(job.results[0], ItemOutcome::Generated(vars(json!({"content": "item 1"}))));
    match &job.results[1] {
        ItemOutcome::Failed(failure) => {
            assert_eq!(failure.index, 2);
            assert!(failure.error.contains("call 2 exploded"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(job.results[2], ItemOutcome::Generated(vars(json!({"content": "item 3"}))));
}

#[tokio::test]
async fn test_defaults_and_injected_variables_reach_the_provider() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 2, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    h.processor.process(&job.job_id).await.unwrap();

    let recorded = h.provider.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].user_prompt, "Generate 5 items about AI. Item 1.");
    assert_eq!(recorded[1].user_prompt, "Generate 5 items about AI. Item 2.");
    assert_eq!(recorded[0].system_prompt, "You are a helpful assistant.");
    assert_eq!(recorded[0].model, "mock-1");
    assert_eq!(recorded[0].temperature, 0.7);
    assert_eq!(recorded[0].max_tokens, 1000);
    assert_eq!(recorded[0].response_format, ResponseFormat::Text);

    let stored = h.job(&job.job_id).await;
    assert_eq!(
        stored.prompt_rendered.as_deref(),
        Some("System: You are a helpful assistant.\n\nUser: Generate 5 items about AI. Item 1.")
    );
}

#[tokio::test]
async fn test_json_output_is_parsed_when_schema_declared() {
    let h = Harness::new(MockProvider::new("```json\n{\"question\": \"Q{n}\"}\n```"));
    let mut draft = json_template();
    draft["provider_settings"] = json!({"temperature": 0.2, "max_tokens": 300});
    let template = h.template("alice", draft).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 2, json!({"topic": "rust"})))
        .await
        .unwrap()
        .job;

    h.processor.process(&job.job_id).await.unwrap();

    let recorded = h.provider.recorded();
    assert_eq!(recorded[0].response_format, ResponseFormat::Json);
    assert_eq!(recorded[0].temperature, 0.2);
    assert_eq!(recorded[0].max_tokens, 300);

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.results[0], ItemOutcome::Generated(vars(json!({"question": "Q1"}))));
    assert_eq!(stored.results[1], ItemOutcome::Generated(vars(json!({"question": "Q2"}))));
}

#[tokio::test]
async fn test_unparseable_json_output_is_wrapped() {
    let h = Harness::new(MockProvider::new("not json at all"));
    let template = h.template("alice", json_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 1, json!({"topic": "rust"})))
        .await
        .unwrap()
        .job;

    h.processor.process(&job.job_id).await.unwrap();

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(
        stored.results[0],
        ItemOutcome::Generated(vars(json!({"content": "not json at all", "raw": true})))
    );
}

#[tokio::test]
async fn test_usage_and_cost_accumulate_across_items() {
    let h = Harness::new(MockProvider::new("ok").with_usage(TokenUsage::new(10, 5), 0.25));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 3, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    h.processor.process(&job.job_id).await.unwrap();

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.usage.prompt_tokens, 30);
    assert_eq!(stored.usage.completion_tokens, 15);
    assert_eq!(stored.usage.total_tokens, 45);
    assert!((stored.usage.cost - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_cancel_after_completion_is_rejected() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 1, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;
    h.processor.process(&job.job_id).await.unwrap();
    let before = h.job(&job.job_id).await;

    let err = h.generations.cancel("alice", &job.job_id).await.unwrap_err();
    assert!(matches!(err, ForgeError::InvalidState(_)));
    assert_eq!(err.to_string(), "Cannot cancel completed generation");

    assert_eq!(h.job(&job.job_id).await, before);
}

#[tokio::test]
async fn test_cancel_pending_job_stops_processing() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 2, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    let cancelled = h.generations.cancel("alice", &job.job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.error_message.as_deref(), Some("Cancelled by user"));
    assert!(cancelled.completed_at.is_some());

    let status = h.processor.process(&job.job_id).await.unwrap();
    assert_eq!(status, JobStatus::Cancelled);
    assert_eq!(h.provider.calls(), 0);
    assert!(h.job(&job.job_id).await.results.is_empty());
}

#[tokio::test]
async fn test_cancel_while_item_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let h = Harness::new(MockProvider::new("ok").gated(gate.clone()));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 3, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    let cancel_mid_item = async {
        while h.provider.calls() == 0 {
            tokio::task::yield_now().await;
        }
        let cancelled = h.generations.cancel("alice", &job.job_id).await.unwrap();
        gate.add_permits(3);
        cancelled
    };
    let (status, cancelled) = tokio::join!(h.processor.process(&job.job_id), cancel_mid_item);

    assert_eq!(status.unwrap(), JobStatus::Cancelled);
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(h.provider.calls(), 1);

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.results.is_empty());
}

#[tokio::test]
async fn test_cancel_keeps_results_written_just_before_it() {
    let h = Harness::with_job_store(MockProvider::new("ok"), Arc::new(LateWriteStore::default()));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 3, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    let mut running = h.job(&job.job_id).await;
    running.start(chrono::Utc::now()).unwrap();
    assert!(h.stores.generations.save_active(&running).await.unwrap());

    let cancelled = h.generations.cancel("alice", &job.job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.results.len(), 1);
    assert_eq!(cancelled.progress, 50);

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(stored.error_message.as_deref(), Some("Cancelled by user"));
    assert_eq!(stored.results, vec![ItemOutcome::Generated(vars(json!({"content": "late 1"})))]);
    assert_eq!(stored.progress, 50);
    assert_eq!(stored.started_at, running.started_at);
}

#[tokio::test]
async fn test_results_grow_one_item_at_a_time_with_monotonic_progress() {
    let store = Arc::new(RecordingStore::default());
    let h = Harness::with_job_store(MockProvider::new("ok").failing_on(&[2]), store.clone());
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 3, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    assert_eq!(h.processor.process(&job.job_id).await.unwrap(), JobStatus::Completed);

    let snapshots = store.snapshots();
    let progress: Vec<u8> = snapshots.iter().map(|j| j.progress).collect();
    let lengths: Vec<usize> = snapshots.iter().map(|j| j.results.len()).collect();
    assert_eq!(progress, vec![10, 10, 10, 36, 36, 63, 63, 100]);
    assert_eq!(lengths, vec![0, 0, 1, 1, 2, 2, 3, 3]);

    for pair in snapshots.windows(2) {
        let grown = pair[1].results.len() - pair[0].results.len();
        assert!(grown <= 1, "results jumped by {}", grown);
        assert!(pair[1].progress >= pair[0].progress);
        assert_eq!(pair[1].results[..pair[0].results.len()], pair[0].results[..]);
    }
    assert!(snapshots[..snapshots.len() - 1]
        .iter()
        .all(|j| j.status == JobStatus::Processing));
    assert!(snapshots.iter().all(|j| j.results.len() <= j.count as usize));
}

#[tokio::test]
async fn test_strict_validation_creates_no_job() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;

    let err = h
        .generations
        .create("alice", request(&template.id, 1, json!({})))
        .await
        .unwrap_err();
    match err {
        ForgeError::ValidationFailed(errors) => {
            assert_eq!(errors, vec!["missing required variable `topic`".to_string()]);
        }
        other => panic!("unexpected error {:?}", other),
    }

    let history = h.generations.history("alice", JobFilter::for_user("alice")).await.unwrap();
    assert_eq!(history.total, 0);
    assert!(h.dispatcher.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unvalidated_template_records_render_failures_per_item() {
    let h = Harness::new(MockProvider::new("ok"));
    let mut draft = topic_template();
    draft["validation_mode"] = json!("none");
    let template = h.template("alice", draft).await;

    let job = h
        .generations
        .create("alice", request(&template.id, 2, json!({})))
        .await
        .unwrap()
        .job;
    assert_eq!(h.processor.process(&job.job_id).await.unwrap(), JobStatus::Completed);

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.results.len(), 2);
    assert!(stored.results.iter().all(ItemOutcome::is_failure));
    assert_eq!(h.provider.calls(), 0);
    assert!(stored.prompt_rendered.is_none());
}

#[tokio::test]
async fn test_unknown_provider_fails_the_job() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;
    let mut req = request(&template.id, 2, json!({"topic": "AI"}));
    req.provider = "missing".to_string();
    let job = h.generations.create("alice", req).await.unwrap().job;

    assert_eq!(h.processor.process(&job.job_id).await.unwrap(), JobStatus::Failed);

    let stored = h.job(&job.job_id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("Provider not found: missing"));
    assert!(stored.completed_at.is_some());
    assert!(stored.results.is_empty());
}

#[tokio::test]
async fn test_count_bounds() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;

    for count in [0, 101] {
        let err = h
            .generations
            .create("alice", request(&template.id, count, json!({"topic": "AI"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ValidationFailed(_)), "count {}", count);
    }
    assert!(h
        .generations
        .create("alice", request(&template.id, 100, json!({"topic": "AI"})))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_jobs_are_scoped_to_their_owner() {
    let h = Harness::new(MockProvider::new("ok"));
    let mut private = topic_template();
    private["is_public"] = json!(false);
    let private = h.template("alice", private).await;
    let public = h.template("alice", topic_template()).await;

    let err = h
        .generations
        .create("bob", request(&private.id, 1, json!({"topic": "AI"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::AccessDenied(_)));

    let job = h
        .generations
        .create("bob", request(&public.id, 1, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;
    assert!(matches!(
        h.generations.status("alice", &job.job_id).await,
        Err(ForgeError::NotFound(_))
    ));
    assert!(matches!(
        h.generations.cancel("alice", &job.job_id).await,
        Err(ForgeError::NotFound(_))
    ));
    assert!(h.generations.status("bob", &job.job_id).await.is_ok());
}

#[tokio::test]
async fn test_result_requires_completion() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 1, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    let err = h.generations.result("alice", &job.job_id).await.unwrap_err();
    assert_eq!(err.to_string(), "Generation not completed");
    assert!(matches!(
        h.generations.export("alice", &job.job_id, ExportFormat::Csv).await,
        Err(ForgeError::InvalidState(_))
    ));

    h.processor.process(&job.job_id).await.unwrap();
    let done = h.generations.result("alice", &job.job_id).await.unwrap();
    assert_eq!(done.results.len(), 1);
}

#[tokio::test]
async fn test_export_completed_job() {
    let h = Harness::new(MockProvider::new("{\"name\": \"n{n}\", \"age\": 3{n}}"));
    let template = h.template("alice", json_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 2, json!({"topic": "people"})))
        .await
        .unwrap()
        .job;
    h.processor.process(&job.job_id).await.unwrap();

    let payload = h.generations.export("alice", &job.job_id, ExportFormat::Csv).await.unwrap();
    assert_eq!(payload, ExportPayload::Text("age,name\r\n31,n1\r\n32,n2\r\n".to_string()));
}

#[tokio::test]
async fn test_batch_reports_each_entry() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;

    let entries = h
        .generations
        .batch(
            "alice",
            vec![
                entry(&request(&template.id, 1, json!({"topic": "AI"}))),
                entry(&request("missing", 1, json!({}))),
                json!({"template_id": template.id, "provider": "mock"}),
                json!({"provider": "mock", "model": "m"}),
                entry(&request(&template.id, 2, json!({"topic": "ML"}))),
            ],
        )
        .await
        .unwrap();

    assert_eq!(entries.len(), 5);
    assert!(matches!(&entries[0], BatchEntry::Started { status: JobStatus::Pending, .. }));
    assert_eq!(
        entries[1],
        BatchEntry::Rejected {
            error: "Template missing not found".to_string(),
            template_id: Some("missing".to_string()),
        }
    );
    match &entries[2] {
        BatchEntry::Rejected { error, template_id } => {
            assert!(error.contains("missing field `model`"), "{}", error);
            assert_eq!(template_id.as_deref(), Some(template.id.as_str()));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    match &entries[3] {
        BatchEntry::Rejected { error, template_id } => {
            assert!(error.contains("template_id"), "{}", error);
            assert!(template_id.is_none());
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(matches!(&entries[4], BatchEntry::Started { .. }));
    assert_eq!(h.dispatcher.submitted.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_batch_size_limits() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;

    assert!(h.generations.batch("alice", Vec::new()).await.is_err());
    let eleven = (0..11)
        .map(|_| entry(&request(&template.id, 1, json!({"topic": "AI"}))))
        .collect();
    assert!(matches!(
        h.generations.batch("alice", eleven).await,
        Err(ForgeError::ValidationFailed(_))
    ));
}

#[tokio::test]
async fn test_dispatch_refusal_marks_job_failed() {
    let dispatcher = ManualDispatcher {
        refuse: true,
        ..Default::default()
    };
    let h = Harness::with_dispatcher(MockProvider::new("ok"), dispatcher);
    let template = h.template("alice", topic_template()).await;

    let err = h
        .generations
        .create("alice", request(&template.id, 1, json!({"topic": "AI"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ForgeError::Dispatch(_)));

    let history = h.generations.history("alice", JobFilter::for_user("alice")).await.unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.items[0].status, JobStatus::Failed);
}

#[tokio::test]
async fn test_history_filters_and_orders_newest_first() {
    let h = Harness::new(MockProvider::new("ok"));
    let first = h.template("alice", topic_template()).await;
    let second = h.template("alice", json_template()).await;

    let a = h.generations.create("alice", request(&first.id, 1, json!({"topic": "a"}))).await.unwrap().job;
    let b = h.generations.create("alice", request(&second.id, 1, json!({"topic": "b"}))).await.unwrap().job;
    let c = h.generations.create("alice", request(&first.id, 1, json!({"topic": "c"}))).await.unwrap().job;
    h.generations.create("bob", request(&first.id, 1, json!({"topic": "d"}))).await.unwrap();
    h.processor.process(&b.job_id).await.unwrap();

    let all = h.generations.history("alice", JobFilter::for_user("alice")).await.unwrap();
    assert_eq!(all.total, 3);
    let ids: Vec<_> = all.items.iter().map(|j| j.job_id.clone()).collect();
    assert_eq!(ids, vec![c.job_id.clone(), b.job_id.clone(), a.job_id.clone()]);

    let mut by_template = JobFilter::for_user("alice");
    by_template.template_id = Some(first.id.clone());
    let page = h.generations.history("alice", by_template).await.unwrap();
    assert_eq!(page.total, 2);

    let mut completed = JobFilter::for_user("alice");
    completed.status = Some(JobStatus::Completed);
    let page = h.generations.history("alice", completed).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].job_id, b.job_id);

    let mut paged = JobFilter::for_user("alice");
    paged.skip = 1;
    paged.limit = 1;
    let page = h.generations.history("alice", paged).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].job_id, b.job_id);
}

#[tokio::test]
async fn test_template_edits_do_not_reach_existing_jobs() {
    let h = Harness::new(MockProvider::new("ok"));
    let template = h.template("alice", topic_template()).await;
    let job = h
        .generations
        .create("alice", request(&template.id, 1, json!({"topic": "AI"})))
        .await
        .unwrap()
        .job;

    let patch = TemplatePatch {
        user_prompt: Some("Something else about {{topic}}".to_string()),
        ..Default::default()
    };
    h.templates.update("alice", &template.id, patch).await.unwrap();

    h.processor.process(&job.job_id).await.unwrap();
    assert_eq!(h.provider.recorded()[0].user_prompt, "Generate 5 items about AI. Item 1.");
}
