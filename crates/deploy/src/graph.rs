//! Per-chart dependency graph over direct sub-units

use std::collections::{BTreeMap, BTreeSet};

use capstan_errors::{DeployError, Result};
use capstan_types::Chart;

use crate::plan::InstallPlan;

/// Directed dependency graph scoped to one chart's direct sub-units.
///
/// An edge from `a` to `b` means `b` must be ready before `a` installs.
/// Nested graphs are not represented here: each recursion frame of the
/// installer builds its own graph over its own children.
#[derive(Debug, Clone)]
pub struct ChartGraph {
    /// Predecessor sets keyed by node name. Every direct sub-unit is a
    /// node, with or without edges.
    depends_on: BTreeMap<String, BTreeSet<String>>,
}

impl ChartGraph {
    /// Build the graph for a chart, merging its two declaration sources:
    /// the `capstan.io/depends-on` annotation on each sub-chart and the
    /// parent's structured `dependencies` entries. Duplicate declarations
    /// collapse into one edge.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::UnknownDependency` when a declaration names
    /// something that is not a direct sub-chart.
    pub fn build(chart: &Chart) -> Result<Self> {
        let mut depends_on: BTreeMap<String, BTreeSet<String>> = chart
            .sub_charts
            .iter()
            .map(|sub| (sub.name().to_string(), BTreeSet::new()))
            .collect();

        for sub in &chart.sub_charts {
            for dep in sub.metadata.depends_on_annotation() {
                if !depends_on.contains_key(&dep) {
                    return Err(DeployError::UnknownDependency {
                        name: dep,
                        dependent: sub.name().to_string(),
                    }
                    .into());
                }
                if let Some(preds) = depends_on.get_mut(sub.name()) {
                    preds.insert(dep);
                }
            }
        }

        for entry in &chart.metadata.dependencies {
            if !depends_on.contains_key(&entry.name) {
                return Err(DeployError::UnknownDependency {
                    name: entry.name.clone(),
                    dependent: chart.name().to_string(),
                }
                .into());
            }
            for dep in &entry.depends_on {
                if !depends_on.contains_key(dep) {
                    return Err(DeployError::UnknownDependency {
                        name: dep.clone(),
                        dependent: entry.name.clone(),
                    }
                    .into());
                }
                if let Some(preds) = depends_on.get_mut(&entry.name) {
                    preds.insert(dep.clone());
                }
            }
        }

        Ok(Self { depends_on })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.depends_on.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.depends_on.values().map(BTreeSet::len).sum()
    }

    /// Depth-first cycle check.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::DependencyCycle` naming the members of the
    /// first cycle found, in dependency order.
    pub fn validate_acyclic(&self) -> Result<()> {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: BTreeSet<&str> = BTreeSet::new();

        for start in self.depends_on.keys() {
            if !visited.contains(start.as_str()) {
                self.cycle_from(start, &mut visited, &mut stack, &mut on_stack)?;
            }
        }
        Ok(())
    }

    fn cycle_from<'a>(
        &'a self,
        node: &'a str,
        visited: &mut BTreeSet<&'a str>,
        stack: &mut Vec<&'a str>,
        on_stack: &mut BTreeSet<&'a str>,
    ) -> Result<()> {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        if let Some(preds) = self.depends_on.get(node) {
            for pred in preds {
                if on_stack.contains(pred.as_str()) {
                    let from = stack
                        .iter()
                        .position(|name| *name == pred.as_str())
                        .unwrap_or(0);
                    let mut members: Vec<&str> = stack[from..].to_vec();
                    members.push(pred);
                    return Err(DeployError::DependencyCycle {
                        cycle: members.join(" -> "),
                    }
                    .into());
                }
                if !visited.contains(pred.as_str()) {
                    self.cycle_from(pred, visited, stack, on_stack)?;
                }
            }
        }

        stack.pop();
        on_stack.remove(node);
        Ok(())
    }

    /// Compute the tiered installation plan.
    ///
    /// Connected nodes are peeled level by level: a node joins a tier once
    /// every predecessor sits in an earlier tier. Nodes without any edge
    /// in either direction are deferred to the trailing batch instead of
    /// leading the schedule.
    ///
    /// For a chart whose `bar` waits for `nginx` and `rabbitmq` while
    /// `orphaned` declares nothing, the plan is tier 0 = `nginx` and
    /// `rabbitmq`, tier 1 = `bar`, and `orphaned` deferred.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::DependencyCycle` when the declarations do not
    /// form a directed acyclic graph.
    pub fn install_plan(&self) -> Result<InstallPlan> {
        self.validate_acyclic()?;

        // Names appearing on either side of an edge.
        let mut connected: BTreeSet<&str> = BTreeSet::new();
        for (node, preds) in &self.depends_on {
            for pred in preds {
                connected.insert(node.as_str());
                connected.insert(pred.as_str());
            }
        }

        let deferred: Vec<String> = self
            .depends_on
            .keys()
            .filter(|name| !connected.contains(name.as_str()))
            .cloned()
            .collect();

        let mut placed: BTreeSet<String> = BTreeSet::new();
        let mut remaining: BTreeSet<String> =
            connected.iter().map(|name| (*name).to_string()).collect();
        let mut tiers: Vec<Vec<String>> = Vec::new();

        while !remaining.is_empty() {
            let tier: Vec<String> = remaining
                .iter()
                .filter(|name| {
                    self.depends_on
                        .get(*name)
                        .is_none_or(|preds| preds.iter().all(|pred| placed.contains(pred)))
                })
                .cloned()
                .collect();

            // Unreachable once validate_acyclic has passed.
            if tier.is_empty() {
                return Err(DeployError::DependencyCycle {
                    cycle: remaining.iter().cloned().collect::<Vec<_>>().join(" -> "),
                }
                .into());
            }

            for name in &tier {
                remaining.remove(name);
                placed.insert(name.clone());
            }
            tiers.push(tier);
        }

        Ok(InstallPlan::new(tiers, deferred))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_errors::Error;
    use capstan_types::{ChartMetadata, DependencyRef, DEPENDS_ON_ANNOTATION};

    fn chart(name: &str) -> Chart {
        Chart::new(ChartMetadata::new(name, "1.0.0"))
    }

    /// The shape from the `install_plan` docs: bar waits for nginx and
    /// rabbitmq (declared both ways), orphaned is isolated.
    fn documented_example() -> Chart {
        let mut bar = chart("bar");
        bar.metadata.annotations.insert(
            DEPENDS_ON_ANNOTATION.to_string(),
            "nginx, rabbitmq".to_string(),
        );

        let mut foo = chart("foo")
            .with_sub_chart(chart("nginx"))
            .with_sub_chart(chart("rabbitmq"))
            .with_sub_chart(bar)
            .with_sub_chart(chart("orphaned"));
        foo.metadata.dependencies = vec![
            DependencyRef::new("nginx"),
            DependencyRef::new("rabbitmq"),
            DependencyRef::new("bar")
                .depends_on("nginx")
                .depends_on("rabbitmq"),
            DependencyRef::new("orphaned"),
        ];
        foo
    }

    fn assert_plan_invariants(graph: &ChartGraph, plan: &InstallPlan) {
        let mut seen = BTreeSet::new();
        for name in plan.tiers().iter().flatten().chain(plan.deferred()) {
            assert!(seen.insert(name.clone()), "{name} placed twice");
        }
        assert_eq!(seen.len(), graph.node_count());

        let mut tier_of = BTreeMap::new();
        for (tier, names) in plan.tiers().iter().enumerate() {
            for name in names {
                tier_of.insert(name.clone(), tier);
            }
        }
        for (node, preds) in &graph.depends_on {
            for pred in preds {
                assert!(
                    tier_of[pred] < tier_of[node],
                    "{pred} must be placed before {node}"
                );
            }
        }
    }

    #[test]
    fn merges_annotation_and_structured_sources() {
        let graph = ChartGraph::build(&documented_example()).unwrap();
        assert_eq!(graph.node_count(), 4);
        // bar -> nginx and bar -> rabbitmq, each declared twice, counted once.
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn plan_matches_documented_example() {
        let graph = ChartGraph::build(&documented_example()).unwrap();
        let plan = graph.install_plan().unwrap();
        assert_eq!(
            plan.tiers(),
            [
                vec!["nginx".to_string(), "rabbitmq".to_string()],
                vec!["bar".to_string()]
            ]
        );
        assert_eq!(plan.deferred(), ["orphaned"]);
        assert_plan_invariants(&graph, &plan);
    }

    #[test]
    fn chains_produce_one_tier_per_link() {
        let mut app = chart("app")
            .with_sub_chart(chart("a"))
            .with_sub_chart(chart("b"))
            .with_sub_chart(chart("c"));
        app.metadata.dependencies = vec![
            DependencyRef::new("b").depends_on("a"),
            DependencyRef::new("c").depends_on("b"),
        ];

        let graph = ChartGraph::build(&app).unwrap();
        let plan = graph.install_plan().unwrap();
        assert_eq!(
            plan.tiers(),
            [
                vec!["a".to_string()],
                vec!["b".to_string()],
                vec!["c".to_string()]
            ]
        );
        assert!(plan.deferred().is_empty());
        assert_plan_invariants(&graph, &plan);
    }

    #[test]
    fn diamond_resolves_in_three_tiers() {
        let mut app = chart("app")
            .with_sub_chart(chart("base"))
            .with_sub_chart(chart("left"))
            .with_sub_chart(chart("right"))
            .with_sub_chart(chart("top"));
        app.metadata.dependencies = vec![
            DependencyRef::new("left").depends_on("base"),
            DependencyRef::new("right").depends_on("base"),
            DependencyRef::new("top").depends_on("left").depends_on("right"),
        ];

        let graph = ChartGraph::build(&app).unwrap();
        let plan = graph.install_plan().unwrap();
        assert_eq!(
            plan.tiers(),
            [
                vec!["base".to_string()],
                vec!["left".to_string(), "right".to_string()],
                vec!["top".to_string()]
            ]
        );
        assert_plan_invariants(&graph, &plan);
    }

    #[test]
    fn isolated_nodes_defer_instead_of_leading() {
        let mut app = chart("app").with_sub_chart(chart("solo"));
        app.metadata.dependencies = vec![DependencyRef::new("solo")];

        let plan = ChartGraph::build(&app).unwrap().install_plan().unwrap();
        assert!(plan.tiers().is_empty());
        assert_eq!(plan.deferred(), ["solo"]);
    }

    #[test]
    fn cycle_error_names_the_members() {
        let mut app = chart("app").with_sub_chart(chart("x")).with_sub_chart(chart("y"));
        app.metadata.dependencies = vec![
            DependencyRef::new("x").depends_on("y"),
            DependencyRef::new("y").depends_on("x"),
        ];

        let graph = ChartGraph::build(&app).unwrap();
        match graph.install_plan().unwrap_err() {
            Error::Deploy(DeployError::DependencyCycle { cycle }) => {
                assert_eq!(cycle, "x -> y -> x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut app = chart("app").with_sub_chart(chart("x"));
        app.metadata.dependencies = vec![DependencyRef::new("x").depends_on("x")];

        let err = ChartGraph::build(&app).unwrap().install_plan().unwrap_err();
        assert!(matches!(
            err,
            Error::Deploy(DeployError::DependencyCycle { .. })
        ));
    }

    #[test]
    fn unknown_annotation_dependency_is_rejected() {
        let mut web = chart("web");
        web.metadata
            .annotations
            .insert(DEPENDS_ON_ANNOTATION.to_string(), "db".to_string());
        let app = chart("app").with_sub_chart(web);

        match ChartGraph::build(&app).unwrap_err() {
            Error::Deploy(DeployError::UnknownDependency { name, dependent }) => {
                assert_eq!(name, "db");
                assert_eq!(dependent, "web");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_structured_dependency_is_rejected() {
        let mut app = chart("app").with_sub_chart(chart("web"));
        app.metadata.dependencies = vec![DependencyRef::new("web").depends_on("db")];

        let err = ChartGraph::build(&app).unwrap_err();
        assert!(matches!(
            err,
            Error::Deploy(DeployError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn chart_without_declarations_has_only_deferred_nodes() {
        let app = chart("app")
            .with_sub_chart(chart("a"))
            .with_sub_chart(chart("b"));

        let graph = ChartGraph::build(&app).unwrap();
        let plan = graph.install_plan().unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert!(plan.tiers().is_empty());
        assert_eq!(plan.deferred(), ["a", "b"]);
    }
}
