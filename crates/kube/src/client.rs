//! Client and waiter capability traits

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;

use capstan_errors::{Error, Result};

use crate::resource::ResourceSet;
use crate::{CreateOptions, PropagationPolicy, WaitStrategy};

/// Pod query used when surfacing hook logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodSelector {
    /// Label selector, e.g. `job-name=migrate`.
    Label(String),
    /// Field selector, e.g. `metadata.name=smoke`.
    Field(String),
}

impl PodSelector {
    /// Canonical string form, used for matching and diagnostics.
    #[must_use]
    pub fn as_query(&self) -> String {
        match self {
            Self::Label(q) => format!("label:{q}"),
            Self::Field(q) => format!("field:{q}"),
        }
    }
}

/// One pod returned by a selector query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub name: String,
}

/// Result of a pod query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodList {
    pub items: Vec<PodInfo>,
}

impl PodList {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Destination for collected pod logs.
pub trait LogSink: Send {
    /// Write one pod's logs.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying destination rejects the write.
    fn write_logs(&mut self, namespace: &str, pod: &str, logs: &str) -> Result<()>;
}

/// Log sink backed by any [`std::io::Write`], one header line per pod.
#[derive(Debug)]
pub struct WriterLogSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriterLogSink<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the sink and hand the writer back.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> LogSink for WriterLogSink<W> {
    fn write_logs(&mut self, namespace: &str, pod: &str, logs: &str) -> Result<()> {
        writeln!(self.writer, "POD LOGS: {namespace}/{pod}")?;
        self.writer.write_all(logs.as_bytes())?;
        if !logs.ends_with('\n') {
            writeln!(self.writer)?;
        }
        Ok(())
    }
}

/// Capability contract against the cluster API.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Parse a manifest into a set of resource handles.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest does not parse, or when
    /// `validate` is set and a document is missing its kind or name.
    fn build(&self, manifest: &str, validate: bool) -> Result<ResourceSet>;

    /// Create all resources in one request batch.
    ///
    /// # Errors
    ///
    /// Returns an error when any resource is rejected by the cluster.
    async fn create(&self, resources: &ResourceSet, options: CreateOptions) -> Result<()>;

    /// Delete resources, returning one error per resource that failed.
    async fn delete(&self, resources: &ResourceSet, policy: PropagationPolicy) -> Vec<Error>;

    /// Obtain the waiter implementing the given readiness strategy.
    ///
    /// # Errors
    ///
    /// Returns an error when the strategy is not available on this client.
    fn waiter(&self, strategy: WaitStrategy) -> Result<Box<dyn ResourceWaiter>>;

    /// List pods matching a selector.
    ///
    /// # Errors
    ///
    /// Returns an error when the query cannot be executed.
    async fn pod_list(&self, namespace: &str, selector: &PodSelector) -> Result<PodList>;

    /// Stream the logs of every pod in the list into the sink.
    ///
    /// # Errors
    ///
    /// Returns an error when log retrieval or the sink fails.
    async fn output_pod_logs(
        &self,
        pods: &PodList,
        namespace: &str,
        sink: &mut dyn LogSink,
    ) -> Result<()>;
}

/// Readiness and deletion gating for built resource sets.
#[async_trait]
pub trait ResourceWaiter: Send + Sync {
    /// Block until every resource in the set reports ready, or fail.
    ///
    /// # Errors
    ///
    /// Returns an error on readiness failure; hitting `timeout` is
    /// indistinguishable from a resource failing.
    async fn watch_until_ready(&self, resources: &ResourceSet, timeout: Duration) -> Result<()>;

    /// Block until every resource in the set is gone, or fail.
    ///
    /// # Errors
    ///
    /// Returns an error when resources were still present at `timeout`.
    async fn wait_for_delete(&self, resources: &ResourceSet, timeout: Duration) -> Result<()>;
}
