//! Scriptable in-memory client for engine tests
//!
//! Records every call in order and lets tests inject failures per resource
//! name or pod selector. Waiters share the client's state, so a single
//! operation log covers the whole run.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use capstan_errors::{Error, KubeError, Result};

use crate::client::{LogSink, PodInfo, PodList, PodSelector, ResourceClient, ResourceWaiter};
use crate::resource::{ResourceRef, ResourceSet};
use crate::{CreateOptions, PropagationPolicy, WaitStrategy};

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Build {
        validate: bool,
        names: Vec<String>,
    },
    Create {
        names: Vec<String>,
        server_side_apply: bool,
    },
    Delete {
        names: Vec<String>,
        background: bool,
    },
    WatchUntilReady {
        names: Vec<String>,
    },
    WaitForDelete {
        names: Vec<String>,
    },
    PodList {
        namespace: String,
        selector: String,
    },
    OutputLogs {
        namespace: String,
        pods: Vec<String>,
    },
}

#[derive(Debug, Default)]
struct MockState {
    operations: Vec<MockOperation>,
    fail_create: HashSet<String>,
    fail_ready: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_delete_wait: HashSet<String>,
    fail_pod_list: HashSet<String>,
    pods: HashMap<String, Vec<String>>,
    logs: HashMap<String, String>,
}

/// Scriptable [`ResourceClient`] double.
#[derive(Debug, Clone, Default)]
pub struct MockResourceClient {
    state: Arc<Mutex<MockState>>,
}

impl MockResourceClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `create` fail whenever the named resource is in the batch.
    pub fn fail_create(&self, name: &str) {
        self.lock().fail_create.insert(name.to_string());
    }

    /// Make readiness watches fail for the named resource.
    pub fn fail_readiness(&self, name: &str) {
        self.lock().fail_ready.insert(name.to_string());
    }

    /// Make `delete` report an error for the named resource.
    pub fn fail_delete(&self, name: &str) {
        self.lock().fail_delete.insert(name.to_string());
    }

    /// Make deletion waits fail for the named resource.
    pub fn fail_delete_wait(&self, name: &str) {
        self.lock().fail_delete_wait.insert(name.to_string());
    }

    /// Make pod queries with this selector fail.
    pub fn fail_pod_list(&self, selector: &PodSelector) {
        self.lock().fail_pod_list.insert(selector.as_query());
    }

    /// Register the pods a selector resolves to.
    pub fn register_pods(&self, selector: &PodSelector, pods: &[&str]) {
        self.lock()
            .pods
            .insert(selector.as_query(), pods.iter().map(ToString::to_string).collect());
    }

    /// Set the log text returned for a pod.
    pub fn set_pod_logs(&self, pod: &str, logs: &str) {
        self.lock().logs.insert(pod.to_string(), logs.to_string());
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Names passed to `create`, flattened in call order.
    #[must_use]
    pub fn created(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::Create { names, .. } => Some(names.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Names passed to `delete`, flattened in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::Delete { names, .. } => Some(names.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn record(&self, operation: MockOperation) {
        self.lock().operations.push(operation);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestHead {
    kind: Option<String>,
    metadata: ManifestMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestMeta {
    name: Option<String>,
    namespace: Option<String>,
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    fn build(&self, manifest: &str, validate: bool) -> Result<ResourceSet> {
        let mut resources = Vec::new();
        for document in serde_yml::Deserializer::from_str(manifest) {
            let head = Option::<ManifestHead>::deserialize(document)
                .map_err(|e| KubeError::ManifestParse {
                    message: e.to_string(),
                })?;
            let Some(head) = head else { continue };

            let kind = head.kind.unwrap_or_default();
            let name = head.metadata.name.unwrap_or_default();
            if kind.is_empty() || name.is_empty() {
                if validate {
                    return Err(KubeError::ManifestParse {
                        message: "document is missing kind or metadata.name".to_string(),
                    }
                    .into());
                }
                continue;
            }
            resources.push(ResourceRef {
                name,
                kind,
                namespace: head.metadata.namespace,
            });
        }

        let set = ResourceSet::new(resources);
        self.record(MockOperation::Build {
            validate,
            names: set.names(),
        });
        Ok(set)
    }

    async fn create(&self, resources: &ResourceSet, options: CreateOptions) -> Result<()> {
        self.record(MockOperation::Create {
            names: resources.names(),
            server_side_apply: options.server_side_apply,
        });
        for resource in resources {
            if self.lock().fail_create.contains(&resource.name) {
                return Err(KubeError::CreateFailed {
                    name: resource.name.clone(),
                    message: "injected create failure".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn delete(&self, resources: &ResourceSet, policy: PropagationPolicy) -> Vec<Error> {
        self.record(MockOperation::Delete {
            names: resources.names(),
            background: matches!(policy, PropagationPolicy::Background),
        });
        let mut errors = Vec::new();
        for resource in resources {
            if self.lock().fail_delete.contains(&resource.name) {
                errors.push(
                    KubeError::DeleteFailed {
                        name: resource.name.clone(),
                        message: "injected delete failure".to_string(),
                    }
                    .into(),
                );
            }
        }
        errors
    }

    fn waiter(&self, _strategy: WaitStrategy) -> Result<Box<dyn ResourceWaiter>> {
        Ok(Box::new(MockWaiter {
            client: self.clone(),
        }))
    }

    async fn pod_list(&self, namespace: &str, selector: &PodSelector) -> Result<PodList> {
        let query = selector.as_query();
        self.record(MockOperation::PodList {
            namespace: namespace.to_string(),
            selector: query.clone(),
        });
        if self.lock().fail_pod_list.contains(&query) {
            return Err(KubeError::PodListFailed {
                selector: query,
                message: "injected pod list failure".to_string(),
            }
            .into());
        }
        let items = self
            .lock()
            .pods
            .get(&query)
            .map(|names| {
                names
                    .iter()
                    .map(|name| PodInfo { name: name.clone() })
                    .collect()
            })
            .unwrap_or_default();
        Ok(PodList { items })
    }

    async fn output_pod_logs(
        &self,
        pods: &PodList,
        namespace: &str,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        self.record(MockOperation::OutputLogs {
            namespace: namespace.to_string(),
            pods: pods.items.iter().map(|p| p.name.clone()).collect(),
        });
        for pod in &pods.items {
            let logs = self.lock().logs.get(&pod.name).cloned().unwrap_or_default();
            sink.write_logs(namespace, &pod.name, &logs)?;
        }
        Ok(())
    }
}

struct MockWaiter {
    client: MockResourceClient,
}

#[async_trait]
impl ResourceWaiter for MockWaiter {
    async fn watch_until_ready(&self, resources: &ResourceSet, _timeout: Duration) -> Result<()> {
        self.client.record(MockOperation::WatchUntilReady {
            names: resources.names(),
        });
        for resource in resources {
            if self.client.lock().fail_ready.contains(&resource.name) {
                return Err(KubeError::ReadinessFailed {
                    message: format!("{} never became ready", resource.name),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn wait_for_delete(&self, resources: &ResourceSet, _timeout: Duration) -> Result<()> {
        self.client.record(MockOperation::WaitForDelete {
            names: resources.names(),
        });
        for resource in resources {
            if self.client.lock().fail_delete_wait.contains(&resource.name) {
                return Err(KubeError::DeleteWaitFailed {
                    message: format!("{} was not deleted in time", resource.name),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Log sink capturing writes for assertions.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    pub entries: Vec<(String, String, String)>,
}

impl RecordingLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogSink for RecordingLogSink {
    fn write_logs(&mut self, namespace: &str, pod: &str, logs: &str) -> Result<()> {
        self.entries
            .push((namespace.to_string(), pod.to_string(), logs.to_string()));
        Ok(())
    }
}
