//! Tier-by-tier chart installation

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use capstan_errors::{DeployError, Error, Result};
use capstan_events::{AppEvent, DeployEvent, EventEmitter, EventSender, FailureContext};
use capstan_kube::{CreateOptions, ResourceClient, ResourceSet, WaitStrategy};
use capstan_types::Chart;

use crate::graph::ChartGraph;

/// Renders one chart's own resources to manifest text. Sub-charts are the
/// installer's business, not the renderer's.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the chart's templates cannot be rendered.
    async fn render(&self, chart: &Chart, namespace: &str) -> Result<String>;
}

/// Output of one node's tier task.
struct NodeOutput {
    position: usize,
    manifest: String,
    /// Set when a recursive install already applied these resources; the
    /// tier's own creation call must then skip them.
    applied: bool,
}

/// Installs a chart tree: tier by tier under the ordered strategy, as one
/// flat batch under every other.
#[derive(Clone)]
pub struct TieredInstaller {
    client: Arc<dyn ResourceClient>,
    renderer: Arc<dyn ChartRenderer>,
    server_side_apply: bool,
    event_sender: Option<EventSender>,
}

impl TieredInstaller {
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self {
            client,
            renderer,
            server_side_apply: false,
            event_sender: None,
        }
    }

    /// Apply resources server-side instead of with client-side create.
    #[must_use]
    pub fn with_server_side_apply(mut self, enabled: bool) -> Self {
        self.server_side_apply = enabled;
        self
    }

    /// Report progress through the given channel.
    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Install the chart under the given readiness strategy.
    ///
    /// `Ordered` activates dependency-ordered tiered installation; every
    /// other strategy takes the flat single-batch path, ordering
    /// declarations notwithstanding.
    ///
    /// Returns the applied manifest text, documents in installation order,
    /// for the caller to persist on its release snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error when the dependency declarations are invalid, a
    /// chart fails to render, or the cluster rejects a batch. Resources
    /// applied before the failure are left in place.
    pub async fn install(
        &self,
        chart: &Chart,
        namespace: &str,
        strategy: WaitStrategy,
        timeout: Duration,
    ) -> Result<String> {
        match strategy {
            WaitStrategy::Ordered => self.install_ordered(chart, namespace, true, timeout).await,
            other => self.install_flat(chart, namespace, other, timeout).await,
        }
    }

    /// Install the chart's sub-units in dependency tiers, then its own
    /// resources.
    ///
    /// Within a tier every node runs concurrently: a node with ordering
    /// declarations of its own recurses with its own graph, anything else
    /// renders its whole subtree. Rendered manifests are applied as one
    /// batch per tier, and with `wait` set tier N+1 does not start until
    /// tier N reports ready. The first failing node aborts its in-flight
    /// siblings and the whole operation.
    ///
    /// # Errors
    ///
    /// See [`TieredInstaller::install`].
    pub async fn install_ordered(
        &self,
        chart: &Chart,
        namespace: &str,
        wait: bool,
        timeout: Duration,
    ) -> Result<String> {
        let graph = ChartGraph::build(chart)?;
        self.emit(AppEvent::Deploy(DeployEvent::GraphBuilt {
            chart: chart.name().to_string(),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
        }));

        let plan = graph.install_plan()?;
        self.emit(AppEvent::Deploy(DeployEvent::PlanComputed {
            chart: chart.name().to_string(),
            tiers: plan.tier_count(),
            deferred: plan.deferred().len(),
        }));

        let mut combined = String::new();

        for (tier, names) in plan.tiers().iter().enumerate() {
            self.emit(AppEvent::Deploy(DeployEvent::TierStarted {
                tier,
                nodes: names.clone(),
            }));

            let outputs = self
                .run_tier(chart, names, namespace, wait, timeout, tier)
                .await?;
            self.apply_tier(tier, &outputs, wait, timeout).await?;
            for output in &outputs {
                append_document(&mut combined, &output.manifest);
            }
        }

        // Trailing batch: isolated sub-units plus the chart's own resources.
        let tier = plan.tier_count();
        let mut trailing_nodes = plan.deferred().to_vec();
        trailing_nodes.push(chart.name().to_string());
        self.emit(AppEvent::Deploy(DeployEvent::TierStarted {
            tier,
            nodes: trailing_nodes,
        }));

        let mut trailing = if plan.deferred().is_empty() {
            Vec::new()
        } else {
            self.run_tier(chart, plan.deferred(), namespace, wait, timeout, tier)
                .await?
        };
        let own = self
            .renderer
            .render(chart, namespace)
            .await
            .map_err(|err| render_error(chart.name(), &err))?;
        self.emit(AppEvent::Deploy(DeployEvent::ChartRendered {
            name: chart.name().to_string(),
        }));
        trailing.push(NodeOutput {
            position: trailing.len(),
            manifest: own,
            applied: false,
        });

        self.apply_tier(tier, &trailing, wait, timeout).await?;
        for output in &trailing {
            append_document(&mut combined, &output.manifest);
        }

        self.emit(AppEvent::Deploy(DeployEvent::Completed {
            chart: chart.name().to_string(),
            tiers: tier + 1,
        }));

        Ok(combined)
    }

    /// Flat path: the whole chart tree rendered depth-first and applied as
    /// one batch, with at most one readiness wait over everything.
    ///
    /// # Errors
    ///
    /// See [`TieredInstaller::install`].
    pub async fn install_flat(
        &self,
        chart: &Chart,
        namespace: &str,
        strategy: WaitStrategy,
        timeout: Duration,
    ) -> Result<String> {
        let manifest = self.render_subtree(chart, namespace).await?;
        let resources = self.client.build(&manifest, true)?;

        self.client.create(&resources, self.create_options()).await?;
        if !matches!(strategy, WaitStrategy::None) {
            let waiter = self.client.waiter(strategy)?;
            waiter.watch_until_ready(&resources, timeout).await?;
        }

        self.emit(AppEvent::Deploy(DeployEvent::Completed {
            chart: chart.name().to_string(),
            tiers: 1,
        }));
        Ok(manifest)
    }

    /// Run every node of one tier concurrently and collect their rendered
    /// manifests back in tier order.
    ///
    /// Returns a boxed future: the tier tasks recurse into
    /// [`TieredInstaller::install_ordered`], and the indirection is what lets
    /// the compiler prove the recursive futures `Send`.
    fn run_tier<'a>(
        &'a self,
        chart: &'a Chart,
        names: &'a [String],
        namespace: &'a str,
        wait: bool,
        timeout: Duration,
        tier: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<NodeOutput>>> + Send + 'a>> {
        Box::pin(async move {
            let mut tasks: JoinSet<Result<NodeOutput>> = JoinSet::new();

            for (position, name) in names.iter().enumerate() {
                // Graph construction guarantees the sub-chart exists.
                let Some(node) = chart.sub_chart(name).cloned() else {
                    return Err(DeployError::UnknownDependency {
                        name: name.clone(),
                        dependent: chart.name().to_string(),
                    }
                    .into());
                };
                let installer = self.clone();
                let namespace = namespace.to_string();
                let name = name.clone();

                tasks.spawn(async move {
                    if node.has_dependency_graph() {
                        let manifest = installer
                            .install_ordered(&node, &namespace, wait, timeout)
                            .await?;
                        installer.emit(AppEvent::Deploy(DeployEvent::SubChartInstalled {
                            name: name.clone(),
                        }));
                        Ok(NodeOutput {
                            position,
                            manifest,
                            applied: true,
                        })
                    } else {
                        let manifest = installer.render_subtree(&node, &namespace).await?;
                        installer.emit(AppEvent::Deploy(DeployEvent::ChartRendered {
                            name: name.clone(),
                        }));
                        Ok(NodeOutput {
                            position,
                            manifest,
                            applied: false,
                        })
                    }
                });
            }

            let mut outputs = Vec::with_capacity(names.len());
            while let Some(joined) = tasks.join_next().await {
                let result = match joined {
                    Ok(result) => result,
                    Err(join_error) => Err(Error::internal(format!(
                        "tier {tier} node task failed: {join_error}"
                    ))),
                };
                match result {
                    Ok(output) => outputs.push(output),
                    Err(error) => {
                        tasks.abort_all();
                        self.emit(AppEvent::Deploy(DeployEvent::tier_failed(
                            tier,
                            FailureContext::from_error(&error),
                        )));
                        return Err(error);
                    }
                }
            }

            // Tasks finish in any order; manifests stay in tier order.
            outputs.sort_by_key(|output| output.position);
            Ok(outputs)
        })
    }

    /// Apply a tier's directly rendered manifests as one creation call and
    /// optionally gate on their readiness. Outputs a recursive install
    /// already applied are skipped here.
    async fn apply_tier(
        &self,
        tier: usize,
        outputs: &[NodeOutput],
        wait: bool,
        timeout: Duration,
    ) -> Result<()> {
        let mut manifest = String::new();
        for output in outputs.iter().filter(|output| !output.applied) {
            append_document(&mut manifest, &output.manifest);
        }
        if manifest.is_empty() {
            return Ok(());
        }

        let resources = self.build_tier(tier, &manifest)?;
        if let Err(error) = self.client.create(&resources, self.create_options()).await {
            return Err(self.tier_failed(tier, &error));
        }
        self.emit(AppEvent::Deploy(DeployEvent::TierApplied {
            tier,
            resources: resources.len(),
        }));

        if wait {
            let waiter = self.client.waiter(WaitStrategy::Ordered)?;
            if let Err(error) = waiter.watch_until_ready(&resources, timeout).await {
                return Err(self.tier_failed(tier, &error));
            }
            self.emit(AppEvent::Deploy(DeployEvent::TierReady { tier }));
        }
        Ok(())
    }

    /// Render a chart and its sub-charts flat: children depth-first in
    /// declaration order, the chart's own resources last.
    async fn render_subtree(&self, chart: &Chart, namespace: &str) -> Result<String> {
        let mut manifest = String::new();
        for member in subtree_post_order(chart) {
            let rendered = self
                .renderer
                .render(member, namespace)
                .await
                .map_err(|err| render_error(member.name(), &err))?;
            append_document(&mut manifest, &rendered);
        }
        Ok(manifest)
    }

    fn build_tier(&self, tier: usize, manifest: &str) -> Result<ResourceSet> {
        self.client.build(manifest, true).map_err(|error| {
            let error: Error = DeployError::ManifestBuild {
                tier,
                message: error.to_string(),
            }
            .into();
            self.emit(AppEvent::Deploy(DeployEvent::tier_failed(
                tier,
                FailureContext::from_error(&error),
            )));
            error
        })
    }

    fn tier_failed(&self, tier: usize, cause: &Error) -> Error {
        let error: Error = DeployError::TierFailed {
            tier,
            message: cause.to_string(),
        }
        .into();
        self.emit(AppEvent::Deploy(DeployEvent::tier_failed(
            tier,
            FailureContext::from_error(&error),
        )));
        error
    }

    fn create_options(&self) -> CreateOptions {
        CreateOptions {
            server_side_apply: self.server_side_apply,
            force_conflicts: false,
        }
    }
}

impl EventEmitter for TieredInstaller {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

fn render_error(name: &str, cause: &Error) -> Error {
    DeployError::RenderFailed {
        name: name.to_string(),
        message: cause.to_string(),
    }
    .into()
}

/// The chart tree flattened children-first, the root last.
fn subtree_post_order(chart: &Chart) -> Vec<&Chart> {
    fn visit<'a>(chart: &'a Chart, ordered: &mut Vec<&'a Chart>) {
        for sub in &chart.sub_charts {
            visit(sub, ordered);
        }
        ordered.push(chart);
    }

    let mut ordered = Vec::new();
    visit(chart, &mut ordered);
    ordered
}

/// Append one manifest chunk as its own document, separator included.
fn append_document(buffer: &mut String, chunk: &str) {
    let chunk = chunk.trim();
    if chunk.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push_str("---\n");
    }
    buffer.push_str(chunk);
    buffer.push('\n');
}
