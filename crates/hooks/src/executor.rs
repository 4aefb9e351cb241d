//! Lifecycle hook execution engine

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use capstan_errors::{Error, HookError, Result};
use capstan_events::{AppEvent, EventEmitter, EventSender, FailureContext, HookRunEvent};
use capstan_kube::{CreateOptions, LogSink, ResourceClient, WaitStrategy, WriterLogSink};
use capstan_release::{
    HookAccessor, HookDeletePolicy, HookEvent, HookOutputLogPolicy, HookPhase, ReleaseAccessor,
    ReleaseStore,
};

use crate::cleanup::HookCleanup;
use crate::ops::{HookOps, HookSnapshot, SharedLogSink};

/// Two-phase outcome of one execution pass: what happened, plus the
/// deferred cleanup to invoke once the caller has finished its own release
/// bookkeeping.
pub struct HookRun {
    pub cleanup: HookCleanup,
    pub outcome: Result<()>,
}

impl HookRun {
    fn aborted(error: Error) -> Self {
        Self {
            cleanup: HookCleanup::none(),
            outcome: Err(error),
        }
    }
}

/// Runs the hooks a release binds to one lifecycle event, strictly in
/// `(weight, name)` order.
///
/// The executor is configured once per action and reused across events;
/// per-call state (timeout, release namespace) travels with each run.
pub struct HookExecutor {
    client: Arc<dyn ResourceClient>,
    store: Arc<dyn ReleaseStore>,
    wait_strategy: WaitStrategy,
    server_side_apply: bool,
    log_sink: SharedLogSink,
    event_sender: Option<EventSender>,
}

impl HookExecutor {
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>, store: Arc<dyn ReleaseStore>) -> Self {
        Self {
            client,
            store,
            wait_strategy: WaitStrategy::Watcher,
            server_side_apply: false,
            log_sink: Arc::new(Mutex::new(Box::new(WriterLogSink::new(std::io::sink())))),
            event_sender: None,
        }
    }

    /// Readiness strategy used for hook watches and deletion waits.
    #[must_use]
    pub fn with_wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategy = strategy;
        self
    }

    /// Apply hook resources server-side instead of with client-side create.
    #[must_use]
    pub fn with_server_side_apply(mut self, enabled: bool) -> Self {
        self.server_side_apply = enabled;
        self
    }

    /// Destination for pod logs surfaced under output-log policies.
    /// Defaults to discarding them.
    #[must_use]
    pub fn with_log_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.log_sink = Arc::new(Mutex::new(Box::new(sink)));
        self
    }

    /// Report progress through the given channel.
    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Execute every hook bound to `event` on the release, in order.
    ///
    /// Hook records are mutated in place as the run progresses (policy
    /// defaulting, then the last-run lifecycle: started, phase `Unknown`
    /// while the watch is pending, completion and a terminal phase) and
    /// the whole snapshot is checkpointed through the store as each hook
    /// starts. Execution stops at the first failure; hooks after it are
    /// left untouched.
    ///
    /// The returned [`HookRun`] carries the outcome together with the
    /// deferred [`HookCleanup`] - see there for the deletion walk. Callers
    /// persist the mutated release themselves.
    #[allow(clippy::too_many_lines)]
    pub async fn execute(
        &self,
        release: &mut dyn ReleaseAccessor,
        event: HookEvent,
        timeout: Duration,
    ) -> HookRun {
        let order = execution_order(release, event);

        self.emit(AppEvent::HookRun(HookRunEvent::started(
            event.as_str(),
            order.len(),
        )));

        let ops = Arc::new(HookOps {
            client: Arc::clone(&self.client),
            wait_strategy: self.wait_strategy,
            timeout,
            release_namespace: release.namespace().to_string(),
            log_sink: Arc::clone(&self.log_sink),
            events: self.event_sender.clone(),
        });

        let mut executed: Vec<HookSnapshot> = Vec::new();

        for entry in &order {
            let index = entry.index;

            mutate_hook(release, index, |hook| hook.set_default_delete_policy());
            let Some(hook) = release.hook(index) else {
                continue;
            };
            let snapshot = HookSnapshot::capture(hook);

            self.emit(AppEvent::HookRun(HookRunEvent::HookStarted {
                event: event.to_string(),
                name: snapshot.name.clone(),
                path: snapshot.path.clone(),
                weight: entry.weight,
            }));

            // Drop whatever a previous run of this hook left behind.
            if let Err(err) = ops
                .delete_by_policy(&snapshot, HookDeletePolicy::BeforeHookCreation)
                .await
            {
                return HookRun::aborted(err);
            }

            let resources = match self.client.build(&snapshot.manifest, true) {
                Ok(resources) => resources,
                Err(err) => {
                    return HookRun::aborted(
                        HookError::ManifestBuild {
                            event: event.to_string(),
                            path: snapshot.path.clone(),
                            message: err.to_string(),
                        }
                        .into(),
                    );
                }
            };

            mutate_hook(release, index, |hook| hook.set_last_run_started(Utc::now()));
            self.store.record(&*release).await;

            // The watch below must end in a terminal phase; Unknown is what
            // observers see if this process dies before it does.
            mutate_hook(release, index, |hook| {
                hook.set_last_run_phase(HookPhase::Unknown);
            });

            if let Err(err) = self.client.create(&resources, self.create_options()).await {
                mutate_hook(release, index, |hook| {
                    hook.set_last_run_completed(Utc::now());
                    hook.set_last_run_phase(HookPhase::Failed);
                });
                let error: Error = HookError::CreateFailed {
                    event: event.to_string(),
                    path: snapshot.path.clone(),
                    message: err.to_string(),
                }
                .into();
                self.emit(AppEvent::HookRun(HookRunEvent::hook_failed(
                    event.as_str(),
                    &snapshot.name,
                    &snapshot.path,
                    FailureContext::from_error(&error),
                )));
                return HookRun::aborted(error);
            }

            let waiter = match self.client.waiter(self.wait_strategy) {
                Ok(waiter) => waiter,
                Err(err) => return HookRun::aborted(err),
            };
            let watched = waiter.watch_until_ready(&resources, timeout).await;
            mutate_hook(release, index, |hook| {
                hook.set_last_run_completed(Utc::now());
            });

            if let Err(err) = watched {
                mutate_hook(release, index, |hook| {
                    hook.set_last_run_phase(HookPhase::Failed);
                });
                let error: Error = HookError::NotReady {
                    event: event.to_string(),
                    path: snapshot.path.clone(),
                    message: err.to_string(),
                }
                .into();
                self.emit(AppEvent::HookRun(HookRunEvent::hook_failed(
                    event.as_str(),
                    &snapshot.name,
                    &snapshot.path,
                    FailureContext::from_error(&error),
                )));
                // Failure logs surface immediately; the caller may never
                // run the cleanup.
                ops.output_logs_best_effort(&snapshot, HookOutputLogPolicy::HookFailed)
                    .await;
                return HookRun {
                    cleanup: HookCleanup::after_failure(ops, snapshot, executed),
                    outcome: Err(error),
                };
            }

            mutate_hook(release, index, |hook| {
                hook.set_last_run_phase(HookPhase::Succeeded);
            });
            self.emit(AppEvent::HookRun(HookRunEvent::HookSucceeded {
                event: event.to_string(),
                name: snapshot.name.clone(),
                path: snapshot.path.clone(),
            }));
            executed.push(snapshot);
        }

        self.emit(AppEvent::HookRun(HookRunEvent::completed(
            event.as_str(),
            executed.len(),
        )));

        HookRun {
            cleanup: HookCleanup::after_success(ops, executed),
            outcome: Ok(()),
        }
    }

    /// Execute and immediately run the deferred cleanup.
    ///
    /// For callers with no bookkeeping to interleave. On a failed run the
    /// cleanup goes first and a hard cleanup error takes precedence over
    /// the execution error.
    ///
    /// # Errors
    ///
    /// Returns the cleanup error if teardown failed, otherwise the
    /// execution error if any hook did.
    pub async fn execute_and_cleanup(
        &self,
        release: &mut dyn ReleaseAccessor,
        event: HookEvent,
        timeout: Duration,
    ) -> Result<()> {
        let run = self.execute(release, event, timeout).await;
        match run.outcome {
            Ok(()) => run.cleanup.run().await,
            Err(error) => {
                run.cleanup.run().await?;
                Err(error)
            }
        }
    }

    fn create_options(&self) -> CreateOptions {
        CreateOptions {
            server_side_apply: self.server_side_apply,
            force_conflicts: false,
        }
    }
}

impl EventEmitter for HookExecutor {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

/// Position of a selected hook together with its ordering key.
struct OrderedHook {
    weight: i32,
    name: String,
    index: usize,
}

/// Select the hooks bound to `event` and order them by `(weight, name)`.
/// The sort is stable, so records tying on both keys keep their relative
/// order in the release.
fn execution_order(release: &dyn ReleaseAccessor, event: HookEvent) -> Vec<OrderedHook> {
    let mut order: Vec<OrderedHook> = (0..release.hook_count())
        .filter_map(|index| {
            let hook = release.hook(index)?;
            hook.has_event(event).then(|| OrderedHook {
                weight: hook.weight(),
                name: hook.name().to_string(),
                index,
            })
        })
        .collect();
    order.sort_by(|a, b| (a.weight, a.name.as_str()).cmp(&(b.weight, b.name.as_str())));
    order
}

fn mutate_hook<F>(release: &mut dyn ReleaseAccessor, index: usize, mutate: F)
where
    F: FnOnce(&mut dyn HookAccessor),
{
    if let Some(hook) = release.hook_mut(index) {
        mutate(hook);
    }
}
