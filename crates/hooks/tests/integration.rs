//! End-to-end hook engine runs against the scriptable mock client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use semver::Version;

use capstan_errors::{Error, HookError, Result};
use capstan_events::{AppEvent, HookRunEvent};
use capstan_hooks::HookExecutor;
use capstan_kube::{LogSink, MockOperation, MockResourceClient, PodSelector};
use capstan_release::{
    accessor_mut, v1, v2, HookDeletePolicy, HookEvent, HookOutputLogPolicy, HookPhase,
    MemoryReleaseStore, Releaser,
};

const TIMEOUT: Duration = Duration::from_secs(300);

fn job_hook(name: &str, weight: i32) -> v2::Hook {
    v2::Hook {
        name: name.into(),
        kind: "Job".into(),
        path: format!("templates/hooks/{name}.yaml"),
        manifest: format!("apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: {name}\n"),
        events: vec![HookEvent::PreInstall],
        weight,
        ..v2::Hook::default()
    }
}

fn release(hooks: Vec<v2::Hook>) -> v2::Release {
    let mut release = v2::Release::new("web", "prod", "web-chart", Version::new(1, 0, 0));
    release.hooks = hooks;
    release
}

fn executor(client: &MockResourceClient, store: &Arc<MemoryReleaseStore>) -> HookExecutor {
    HookExecutor::new(Arc::new(client.clone()), store.clone())
}

/// Log sink a test can keep a handle on after handing it to the executor.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<(String, String, String)>>>);

impl SharedSink {
    fn entries(&self) -> Vec<(String, String, String)> {
        self.0.lock().unwrap().clone()
    }
}

impl LogSink for SharedSink {
    fn write_logs(&mut self, namespace: &str, pod: &str, logs: &str) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .push((namespace.to_string(), pod.to_string(), logs.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_hooks_run_in_weight_then_name_order() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());
    let mut release = release(vec![
        job_hook("beta", 1),
        job_hook("alpha", 1),
        job_hook("gamma", 2),
    ]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();

    assert_eq!(client.created(), ["alpha", "beta", "gamma"]);
    let watches = client
        .operations()
        .iter()
        .filter(|op| matches!(op, MockOperation::WatchUntilReady { .. }))
        .count();
    assert_eq!(watches, 3);

    for hook in &release.hooks {
        assert_eq!(hook.last_run.phase, HookPhase::Succeeded);
        assert!(hook.last_run.started_at.is_some());
        assert!(hook.last_run.completed_at.is_some());
    }

    // One checkpoint per hook start; phases are positional in the release
    // (beta, alpha, gamma) while execution is alpha, beta, gamma.
    let records = store.recorded();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0].hook_phases,
        [HookPhase::Unknown, HookPhase::Running, HookPhase::Unknown]
    );
    assert_eq!(
        records[1].hook_phases,
        [HookPhase::Running, HookPhase::Succeeded, HookPhase::Unknown]
    );
    assert_eq!(
        records[2].hook_phases,
        [HookPhase::Succeeded, HookPhase::Succeeded, HookPhase::Running]
    );

    // No hook carries a success delete policy, so cleanup touches nothing.
    run.cleanup.run().await.unwrap();
    assert!(client.deleted().is_empty());
}

#[tokio::test]
async fn test_default_policy_clears_stale_resources_before_create() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());
    let mut release = release(vec![job_hook("migrate", 0)]);
    assert!(release.hooks[0].delete_policies.is_empty());

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();

    // Defaulting is persisted on the record itself.
    assert_eq!(
        release.hooks[0].delete_policies,
        [HookDeletePolicy::BeforeHookCreation]
    );

    // Stale deletion, including its wait, strictly precedes the validating
    // build and create.
    let ops = client.operations();
    assert!(matches!(ops[0], MockOperation::Build { validate: false, .. }));
    assert!(matches!(ops[1], MockOperation::Delete { background: true, .. }));
    assert!(matches!(ops[2], MockOperation::WaitForDelete { .. }));
    assert!(matches!(ops[3], MockOperation::Build { validate: true, .. }));
    assert!(matches!(ops[4], MockOperation::Create { .. }));
    assert!(matches!(ops[5], MockOperation::WatchUntilReady { .. }));
}

#[tokio::test]
async fn test_failed_run_cleans_failed_hook_then_prior_successes() {
    let client = MockResourceClient::new();
    client.fail_readiness("beta");
    let store = Arc::new(MemoryReleaseStore::new());

    let mut alpha = job_hook("alpha", 1);
    alpha.delete_policies = vec![HookDeletePolicy::HookSucceeded];
    let mut beta = job_hook("beta", 2);
    beta.delete_policies = vec![HookDeletePolicy::HookFailed];
    let gamma = job_hook("gamma", 3);
    let mut release = release(vec![alpha, beta, gamma]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;

    let err = run.outcome.unwrap_err();
    assert!(matches!(err, Error::Hook(HookError::NotReady { .. })));
    assert!(err.to_string().contains("templates/hooks/beta.yaml"));
    assert!(err.to_string().contains("pre-install"));

    // Execution stopped at beta; gamma was never applied or even marked.
    assert_eq!(client.created(), ["alpha", "beta"]);
    assert_eq!(release.hooks[0].last_run.phase, HookPhase::Succeeded);
    assert_eq!(release.hooks[1].last_run.phase, HookPhase::Failed);
    assert!(release.hooks[1].last_run.completed_at.is_some());
    assert_eq!(release.hooks[2].last_run.phase, HookPhase::Unknown);
    assert!(release.hooks[2].last_run.started_at.is_none());

    // Failed hook first, then the earlier success in forward order.
    run.cleanup.run().await.unwrap();
    assert_eq!(client.deleted(), ["beta", "alpha"]);
}

#[tokio::test]
async fn test_success_cleanup_deletes_in_reverse_execution_order() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());

    let mut hooks = vec![job_hook("alpha", 1), job_hook("beta", 2)];
    for hook in &mut hooks {
        hook.delete_policies = vec![HookDeletePolicy::HookSucceeded];
    }
    let mut release = release(hooks);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();
    assert!(client.deleted().is_empty());

    run.cleanup.run().await.unwrap();
    assert_eq!(client.deleted(), ["beta", "alpha"]);
}

#[tokio::test]
async fn test_custom_resource_definitions_are_never_deleted() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());

    let crd = v2::Hook {
        name: "crontabs.example.com".into(),
        kind: "CustomResourceDefinition".into(),
        path: "crds/crontab.yaml".into(),
        manifest: "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: crontabs.example.com\n".into(),
        events: vec![HookEvent::PreInstall],
        delete_policies: vec![
            HookDeletePolicy::BeforeHookCreation,
            HookDeletePolicy::HookSucceeded,
        ],
        ..v2::Hook::default()
    };
    let mut release = release(vec![crd]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();
    run.cleanup.run().await.unwrap();

    assert_eq!(client.created(), ["crontabs.example.com"]);
    assert!(client.deleted().is_empty());
}

#[tokio::test]
async fn test_create_failure_marks_hook_failed_and_aborts() {
    let client = MockResourceClient::new();
    client.fail_create("alpha");
    let store = Arc::new(MemoryReleaseStore::new());
    let mut release = release(vec![job_hook("alpha", 1), job_hook("beta", 2)]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;

    assert!(matches!(
        run.outcome.unwrap_err(),
        Error::Hook(HookError::CreateFailed { .. })
    ));
    assert!(run.cleanup.is_noop());
    run.cleanup.run().await.unwrap();

    assert_eq!(release.hooks[0].last_run.phase, HookPhase::Failed);
    assert!(release.hooks[0].last_run.completed_at.is_some());

    // The run stopped before beta.
    assert_eq!(client.created(), ["alpha"]);
    assert_eq!(release.hooks[1].last_run.phase, HookPhase::Unknown);
}

#[tokio::test]
async fn test_unbuildable_hook_manifest_is_fatal() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());

    let mut broken = job_hook("alpha", 0);
    broken.manifest = "kind: Job\nmetadata: {}\n".into();
    let mut release = release(vec![broken]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;

    match run.outcome.unwrap_err() {
        Error::Hook(HookError::ManifestBuild { event, path, .. }) => {
            assert_eq!(event, "pre-install");
            assert_eq!(path, "templates/hooks/alpha.yaml");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(client.created().is_empty());
    // A hook that never started was never checkpointed either.
    assert!(store.recorded().is_empty());
}

#[tokio::test]
async fn test_failed_job_logs_surface_from_manifest_namespace() {
    let client = MockResourceClient::new();
    client.fail_readiness("migrate");
    let selector = PodSelector::Label("job-name=migrate".into());
    client.register_pods(&selector, &["migrate-x1"]);
    client.set_pod_logs("migrate-x1", "schema migration panicked\n");
    let store = Arc::new(MemoryReleaseStore::new());

    let mut hook = job_hook("migrate", 0);
    hook.manifest =
        "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: migrate\n  namespace: tools\n".into();
    hook.output_log_policies = vec![HookOutputLogPolicy::HookFailed];
    let mut release = release(vec![hook]);

    let sink = SharedSink::default();
    let run = executor(&client, &store)
        .with_log_sink(sink.clone())
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    assert!(run.outcome.is_err());

    // Logs were collected immediately on failure, from the manifest's own
    // namespace, without waiting for the cleanup.
    assert_eq!(
        sink.entries(),
        [(
            "tools".to_string(),
            "migrate-x1".to_string(),
            "schema migration panicked\n".to_string()
        )]
    );
    assert!(client
        .operations()
        .iter()
        .any(|op| matches!(op, MockOperation::PodList { namespace, .. } if namespace == "tools")));
}

#[tokio::test]
async fn test_success_logs_collect_during_cleanup_with_release_namespace() {
    let client = MockResourceClient::new();
    let selector = PodSelector::Label("job-name=seed".into());
    client.register_pods(&selector, &["seed-j4"]);
    client.set_pod_logs("seed-j4", "seeded 14 rows\n");
    let store = Arc::new(MemoryReleaseStore::new());

    let mut hook = job_hook("seed", 0);
    hook.output_log_policies = vec![HookOutputLogPolicy::HookSucceeded];
    let mut release = release(vec![hook]);

    let sink = SharedSink::default();
    let run = executor(&client, &store)
        .with_log_sink(sink.clone())
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();
    assert!(sink.entries().is_empty());

    run.cleanup.run().await.unwrap();
    // The hook manifest names no namespace, so the release's is used.
    assert_eq!(
        sink.entries(),
        [(
            "prod".to_string(),
            "seed-j4".to_string(),
            "seeded 14 rows\n".to_string()
        )]
    );
}

#[tokio::test]
async fn test_log_collection_failure_never_masks_the_outcome() {
    let client = MockResourceClient::new();
    client.fail_readiness("migrate");
    client.fail_pod_list(&PodSelector::Label("job-name=migrate".into()));
    let store = Arc::new(MemoryReleaseStore::new());

    let mut hook = job_hook("migrate", 0);
    hook.output_log_policies = vec![HookOutputLogPolicy::HookFailed];
    let mut release = release(vec![hook]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    assert!(matches!(
        run.outcome.unwrap_err(),
        Error::Hook(HookError::NotReady { .. })
    ));
    run.cleanup.run().await.unwrap();
}

#[tokio::test]
async fn test_cleanup_error_takes_precedence_over_run_error() {
    let client = MockResourceClient::new();
    client.fail_readiness("beta");
    client.fail_delete("alpha");
    let store = Arc::new(MemoryReleaseStore::new());

    let mut alpha = job_hook("alpha", 1);
    alpha.delete_policies = vec![HookDeletePolicy::HookSucceeded];
    let beta = job_hook("beta", 2);
    let mut release = release(vec![alpha, beta]);

    let err = executor(&client, &store)
        .execute_and_cleanup(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await
        .unwrap_err();

    // alpha's deletion failed during cleanup; that error wins over beta's
    // readiness failure.
    assert!(matches!(err, Error::Hook(HookError::CleanupFailed { .. })));
    assert!(err.to_string().contains("templates/hooks/alpha.yaml"));
}

#[tokio::test]
async fn test_run_error_survives_a_clean_cleanup() {
    let client = MockResourceClient::new();
    client.fail_readiness("beta");
    let store = Arc::new(MemoryReleaseStore::new());
    let mut release = release(vec![job_hook("alpha", 1), job_hook("beta", 2)]);

    let err = executor(&client, &store)
        .execute_and_cleanup(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Hook(HookError::NotReady { .. })));
}

#[tokio::test]
async fn test_failed_hook_delete_error_does_not_stop_the_walk() {
    let client = MockResourceClient::new();
    client.fail_readiness("beta");
    client.fail_delete("beta");
    let store = Arc::new(MemoryReleaseStore::new());

    let mut alpha = job_hook("alpha", 1);
    alpha.delete_policies = vec![HookDeletePolicy::HookSucceeded];
    let mut beta = job_hook("beta", 2);
    beta.delete_policies = vec![HookDeletePolicy::HookFailed];
    let mut release = release(vec![alpha, beta]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    assert!(run.outcome.is_err());

    // beta's failed deletion is tolerated; alpha is still deleted.
    run.cleanup.run().await.unwrap();
    assert_eq!(client.deleted(), ["beta", "alpha"]);
}

#[tokio::test]
async fn test_only_hooks_bound_to_the_event_run() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());

    let mut notify = job_hook("notify", 0);
    notify.events = vec![HookEvent::PostInstall];
    let mut release = release(vec![job_hook("migrate", 0), notify]);

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();

    assert_eq!(client.created(), ["migrate"]);
    // Unselected hooks are left completely untouched.
    assert!(release.hooks[1].delete_policies.is_empty());
    assert_eq!(release.hooks[1].last_run.phase, HookPhase::Unknown);
}

#[tokio::test]
async fn test_release_without_matching_hooks_is_a_clean_noop() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());
    let mut release = release(Vec::new());

    let run = executor(&client, &store)
        .execute(&mut release, HookEvent::PostUpgrade, TIMEOUT)
        .await;
    run.outcome.unwrap();
    run.cleanup.run().await.unwrap();

    assert!(client.operations().is_empty());
    assert!(store.recorded().is_empty());
}

#[tokio::test]
async fn test_events_narrate_the_run() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());
    let (tx, mut rx) = capstan_events::channel();
    let mut release = release(vec![job_hook("alpha", 0)]);

    let run = executor(&client, &store)
        .with_event_sender(tx)
        .execute(&mut release, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::HookRun(event) = event {
            kinds.push(match event {
                HookRunEvent::Started { .. } => "started",
                HookRunEvent::HookStarted { .. } => "hook-started",
                HookRunEvent::HookSucceeded { .. } => "hook-succeeded",
                HookRunEvent::StaleResourceDeleted { .. } => "stale-deleted",
                HookRunEvent::Completed { .. } => "completed",
                _ => "other",
            });
        }
    }
    // The defaulted before-hook-creation policy fires between the start of
    // the hook and its readiness.
    assert_eq!(
        kinds,
        ["started", "hook-started", "stale-deleted", "hook-succeeded", "completed"]
    );
}

#[tokio::test]
async fn test_classic_schema_releases_run_through_dispatch() {
    let client = MockResourceClient::new();
    let store = Arc::new(MemoryReleaseStore::new());

    let mut opaque: Box<dyn Releaser> = Box::new(v1::Release {
        name: "web".into(),
        namespace: "prod".into(),
        version: 4,
        hooks: vec![v1::Hook {
            name: "migrate".into(),
            kind: "Job".into(),
            path: "templates/hooks/migrate.yaml".into(),
            manifest: "apiVersion: batch/v1\nkind: Job\nmetadata:\n  name: migrate\n".into(),
            events: vec!["pre-install".into()],
            weight: 3,
            ..v1::Hook::default()
        }],
        ..v1::Release::default()
    });

    let accessor = accessor_mut(opaque.as_mut()).unwrap();
    let run = executor(&client, &store)
        .execute(accessor, HookEvent::PreInstall, TIMEOUT)
        .await;
    run.outcome.unwrap();
    run.cleanup.run().await.unwrap();

    assert_eq!(client.created(), ["migrate"]);
    let records = store.recorded();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].version, 4);
    assert_eq!(records[0].namespace, "prod");
}
