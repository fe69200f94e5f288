//! End-to-end runs against the in-memory host.

mod common;

use baseliner_core::types::{Operation, ProjectDescriptor, VariableKind};
use baseliner_core::Settings;
use baseliner_sync::pipeline;
use baseliner_sync::{BaselinePlan, RunError, RunReport, Shutdown, Termination};
use common::{settings, settings_with, FakeHost, FakeProvider};
use rstest::rstest;

async fn run(host: &FakeHost, settings: &Settings) -> Result<RunReport, RunError> {
    let plan = BaselinePlan::new(settings).expect("plan");
    let provider = FakeProvider::with_token("glpat-1");
    let host = host.clone();
    pipeline::run(
        settings,
        plan,
        &provider,
        move |token| {
            assert_eq!(token, "glpat-1");
            Ok(host)
        },
        Shutdown::new(),
    )
    .await
}

fn abc() -> FakeHost {
    let host = FakeHost::with_projects(&[("1", "a"), ("2", "b"), ("3", "c")]);
    for id in ["1", "2", "3"] {
        host.set_variables(
            id,
            &[
                ("KUBECONFIG", "path/to/file", VariableKind::File),
                ("CLUSTER", "old", VariableKind::Plain),
            ],
        );
    }
    host
}

// ---------------------------------------------------------------------------
// 1. Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_projects_two_workers_all_succeed() {
    let host = abc();
    let report = run(&host, &settings(2)).await.expect("run");

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.listed, 3);
    assert_eq!(report.summary.attempted(), 3);
    assert_eq!(report.summary.succeeded(), 3);
    assert_eq!(report.summary.failed(), 0);
    assert!(report.summary.errors().is_empty());
    assert!(report.is_success());

    for id in ["1", "2", "3"] {
        let (content, message) = host.file(id, ".gitlab-ci.yml").expect("pipeline written");
        assert_eq!(content, "stages: [build]\n");
        assert_eq!(message, "Add .gitlab-ci.yml");
        let (_, message) = host.file(id, "README.md").expect("readme written");
        assert_eq!(message, "Add README.md");
    }
    assert_eq!(host.file("2", "README.md").unwrap().0, "# b\n");
}

#[tokio::test]
async fn variables_follow_their_kind() {
    let host = FakeHost::with_projects(&[("42", "svc")]);
    host.set_variables(
        "42",
        &[
            ("KUBECONFIG", "path/to/file", VariableKind::File),
            ("CLUSTER", "anything", VariableKind::Plain),
        ],
    );
    run(&host, &settings(1)).await.expect("run");

    assert_eq!(host.variable("42", "KUBECONFIG").as_deref(), Some("path/to/file:42"));
    assert_eq!(host.variable("42", "CLUSTER").as_deref(), Some("prod-cluster"));
}

#[rstest]
#[case(1, 1)]
#[case(5, 1)]
#[case(5, 5)]
#[case(7, 3)]
#[case(4, 16)]
#[tokio::test]
async fn every_project_yields_exactly_one_outcome(#[case] n: usize, #[case] w: usize) {
    let ids: Vec<(String, String)> = (1..=n).map(|i| (i.to_string(), format!("p{i}"))).collect();
    let refs: Vec<(&str, &str)> = ids.iter().map(|(i, n)| (i.as_str(), n.as_str())).collect();
    let host = FakeHost::with_projects(&refs);

    let report = run(&host, &settings(w)).await.expect("run");

    assert_eq!(report.summary.attempted(), n);
    assert_eq!(
        report.summary.succeeded() + report.summary.failed(),
        report.summary.attempted()
    );
    let state = host.state.lock().unwrap();
    let pipeline_checks = state
        .exists_calls
        .iter()
        .filter(|(_, path)| path == ".gitlab-ci.yml")
        .count();
    assert_eq!(pipeline_checks, n, "each project reconciled once");
}

#[tokio::test]
async fn empty_namespace_is_a_successful_empty_run() {
    let host = FakeHost::default();
    let report = run(&host, &settings(4)).await.expect("run");
    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.listed, 0);
    assert_eq!(report.summary.attempted(), 0);
    assert!(report.is_success());
}

// ---------------------------------------------------------------------------
// 2. Partial failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_variable_update_only_fails_that_project() {
    let host = abc();
    host.state
        .lock()
        .unwrap()
        .fail_update_variable
        .insert(("2".into(), "KUBECONFIG".into()));

    let report = run(&host, &settings(2)).await.expect("run");

    assert_eq!(report.summary.attempted(), 3);
    assert_eq!(report.summary.succeeded(), 2);
    assert_eq!(report.summary.failed(), 1);
    let errors = report.summary.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].project.name.0, "b");
    assert_eq!(errors[0].failures.len(), 1);
    assert_eq!(
        errors[0].failures[0].operation,
        Operation::UpdateVariable { key: "KUBECONFIG".into() }
    );
    assert!(!report.is_success());

    // the other variable of b is still its own unit
    assert_eq!(host.variable("2", "CLUSTER").as_deref(), Some("prod-cluster"));
    for id in ["1", "3"] {
        assert_eq!(host.variable(id, "KUBECONFIG").unwrap(), format!("path/to/file:{id}"));
    }
}

#[tokio::test]
async fn failed_existence_check_fails_step_without_writing() {
    let host = abc();
    host.state.lock().unwrap().fail_exists.insert("1".into());

    let report = run(&host, &settings(1)).await.expect("run");

    let errors = report.summary.errors();
    assert_eq!(errors.len(), 1);
    let ops: Vec<_> = errors[0].failures.iter().map(|f| f.operation.clone()).collect();
    assert_eq!(ops, [Operation::EnsurePipelineFile, Operation::EnsureReadme]);
    assert!(host.file("1", ".gitlab-ci.yml").is_none());
    // later steps still ran
    assert_eq!(host.variable("1", "CLUSTER").as_deref(), Some("prod-cluster"));
}

#[tokio::test]
async fn failed_variable_listing_skips_variable_steps() {
    let host = abc();
    host.state.lock().unwrap().fail_list_variables.insert("3".into());
    let settings = settings_with("variables:\n  - {key: REGION, value: eu-west-1}\n", 2);

    let report = run(&host, &settings).await.expect("run");

    let errors = report.summary.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].project.id.0, "3");
    assert_eq!(errors[0].failures.len(), 1);
    assert_eq!(errors[0].failures[0].operation, Operation::ListVariables);
    assert!(host.file("3", "README.md").is_some());

    let state = host.state.lock().unwrap();
    assert!(state.variable_updates.iter().all(|(id, _, _)| id != "3"));
    assert!(state.variable_creates.iter().all(|(id, _, _)| id != "3"));
}

#[tokio::test]
async fn broken_readme_render_is_a_step_failure() {
    let host = FakeHost::with_projects(&[("1", "a")]);
    let settings = settings_with("", 1);
    let settings = Settings {
        baseline: baseliner_core::Baseline {
            readme_template: Some("{{ owner }}".into()),
            ..settings.baseline.clone()
        },
        ..settings
    };

    let report = run(&host, &settings).await.expect("run");

    let errors = report.summary.errors();
    assert_eq!(errors[0].failures[0].operation, Operation::EnsureReadme);
    assert!(host.file("1", ".gitlab-ci.yml").is_some());
    assert!(host.file("1", "README.md").is_none());
}

// ---------------------------------------------------------------------------
// 3. Idempotency and policies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ensuring_files_twice_checks_existence_and_keeps_content() {
    let host = FakeHost::with_projects(&[("1", "a")]);
    run(&host, &settings(1)).await.expect("first run");
    let first = host.file("1", ".gitlab-ci.yml").unwrap();
    run(&host, &settings(1)).await.expect("second run");
    let second = host.file("1", ".gitlab-ci.yml").unwrap();

    assert_eq!(first.0, second.0);
    assert_eq!(second.1, "Update .gitlab-ci.yml");

    let state = host.state.lock().unwrap();
    let checks = state
        .exists_calls
        .iter()
        .filter(|(_, path)| path == ".gitlab-ci.yml")
        .count();
    assert_eq!(checks, 2);
    let messages: Vec<_> = state.writes.iter().map(|(_, m)| m.as_str()).collect();
    assert_eq!(
        messages,
        ["Add .gitlab-ci.yml", "Add README.md", "Update .gitlab-ci.yml", "Update README.md"]
    );
}

#[tokio::test]
async fn append_policy_keeps_growing_across_runs() {
    let host = FakeHost::with_projects(&[("7", "a")]);
    host.set_variables("7", &[("CERT", "certs/ca.pem", VariableKind::File)]);
    run(&host, &settings(1)).await.expect("first");
    run(&host, &settings(1)).await.expect("second");
    assert_eq!(host.variable("7", "CERT").as_deref(), Some("certs/ca.pem:7:7"));
}

#[tokio::test]
async fn append_once_policy_is_stable_across_runs() {
    let host = FakeHost::with_projects(&[("7", "a")]);
    host.set_variables("7", &[("CERT", "certs/ca.pem", VariableKind::File)]);
    let settings = settings_with("file_variable_policy: append-once\n", 1);
    run(&host, &settings).await.expect("first");
    run(&host, &settings).await.expect("second");
    assert_eq!(host.variable("7", "CERT").as_deref(), Some("certs/ca.pem:7"));
    assert_eq!(host.state.lock().unwrap().variable_updates.len(), 1);
}

#[tokio::test]
async fn declared_variables_are_created_only_when_absent() {
    let host = abc();
    let settings = settings_with(
        "variables:\n  - {key: REGION, value: eu-west-1}\n  - {key: CLUSTER, value: ignored}\n",
        2,
    );
    run(&host, &settings).await.expect("run");

    let state = host.state.lock().unwrap();
    let mut creates: Vec<_> = state
        .variable_creates
        .iter()
        .map(|(id, key, value)| format!("{id}:{key}={value}"))
        .collect();
    creates.sort();
    assert_eq!(creates, ["1:REGION=eu-west-1", "2:REGION=eu-west-1", "3:REGION=eu-west-1"]);
}

#[tokio::test(start_paused = true)]
async fn file_writes_are_retried_with_backoff() {
    let host = FakeHost::with_projects(&[("1", "a")]);
    host.state.lock().unwrap().failing_writes.insert("1".into(), 2);
    let settings = settings_with("retry:\n  attempts: 3\n  backoff_ms: 100\n", 1);

    let report = run(&host, &settings).await.expect("run");

    assert!(report.is_success(), "{:?}", report.summary.errors());
    assert_eq!(host.file("1", ".gitlab-ci.yml").unwrap().1, "Add .gitlab-ci.yml");
}

#[tokio::test]
async fn file_writes_are_not_retried_by_default() {
    let host = FakeHost::with_projects(&[("1", "a")]);
    host.state.lock().unwrap().failing_writes.insert("1".into(), 1);

    let report = run(&host, &settings(1)).await.expect("run");

    let errors = report.summary.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].failures[0].operation, Operation::EnsurePipelineFile);
    assert!(errors[0].failures[0].cause.contains("503"));
    // the README write used the next (succeeding) attempt
    assert!(host.file("1", "README.md").is_some());
}

#[test]
fn readme_context_carries_every_plan_field() {
    let mut settings = settings(1);
    settings.baseline.readme_template = Some(
        "{{ project_name }}|{{ project_id }}|{{ namespace }}|{{ cluster_name }}|{{ product_line }}"
            .into(),
    );
    let plan = BaselinePlan::new(&settings).expect("plan");
    let readme = plan
        .readme_for(&ProjectDescriptor::new("42", "web"))
        .expect("render");
    assert_eq!(readme, "web|42|platform/stg|prod-cluster|stg");
}
