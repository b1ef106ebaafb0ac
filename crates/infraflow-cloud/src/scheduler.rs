//! Graph-driven executor
//!
//! A single driver loop owns the node-state table. Ready nodes are dispatched
//! as tokio tasks that call the adapter; each task reports back through a
//! [`JoinSet`], and the driver applies the resulting state transition. Nodes
//! without a dependency path between them run concurrently.

use crate::adapter::{CreateRequest, Outputs, ProvisioningAdapter};
use crate::error::{NodeError, ProviderError};
use crate::graph::{Graph, NodeState};
use crate::resolver::Resolver;
use crate::result::{self, DeploymentResult};
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Cancels a running deployment
///
/// Nodes already creating finish naturally; every node not yet dispatched is
/// skipped with [`NodeError::Cancelled`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for a single run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Default limit for each adapter call; descriptors may override it
    pub node_timeout: Option<Duration>,

    /// Maximum adapter calls in flight at once (unbounded when `None`)
    pub max_parallel: Option<usize>,

    pub cancel: Option<CancelHandle>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = Some(max);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// What a finished adapter task reports back to the driver
struct Completion {
    id: String,
    outcome: Result<Outputs, NodeError>,
    elapsed: Duration,
}

/// Execute every node of `graph` in dependency order.
///
/// Never fails as a whole: per-node failures end up in the returned
/// [`DeploymentResult`], together with the nodes skipped because of them.
#[tracing::instrument(skip_all, fields(nodes = graph.len(), adapter = adapter.name()))]
pub async fn execute<A>(graph: Graph, adapter: Arc<A>, options: ExecuteOptions) -> DeploymentResult
where
    A: ProvisioningAdapter + ?Sized + 'static,
{
    let mut run = Run::new(graph, options);
    let started = Instant::now();
    info!("Starting deployment");

    let mut cancel_rx = run.options.cancel.as_ref().map(CancelHandle::subscribe);

    loop {
        if !run.cancelled
            && run
                .options
                .cancel
                .as_ref()
                .is_some_and(CancelHandle::is_cancelled)
        {
            run.cancel_pending();
        }

        run.dispatch_ready(&adapter);

        if run.in_flight.is_empty() {
            break;
        }

        tokio::select! {
            joined = run.in_flight.join_next() => match joined {
                Some(Ok(completion)) => run.settle(completion),
                Some(Err(err)) => error!(error = %err, "Adapter task aborted"),
                None => {}
            },
            _ = wait_cancelled(&mut cancel_rx), if !run.cancelled => {
                run.cancel_pending();
            }
        }
    }

    run.finish_stragglers();
    let result = result::aggregate(run.graph, run.cancelled, started.elapsed());
    info!(outcome = ?result.outcome, summary = %result.summary(), "Deployment finished");
    result
}

async fn wait_cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                // Sender gone without cancelling: nothing can cancel any more.
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

struct Run {
    graph: Graph,
    resolver: Resolver,
    ready: VecDeque<String>,
    in_flight: JoinSet<Completion>,
    options: ExecuteOptions,
    cancelled: bool,
}

impl Run {
    fn new(graph: Graph, options: ExecuteOptions) -> Self {
        let resolver = Resolver::new(&graph);
        let ready = graph
            .topological_order()
            .iter()
            .filter(|id| resolver.is_ready(id))
            .cloned()
            .collect();
        Self {
            graph,
            resolver,
            ready,
            in_flight: JoinSet::new(),
            options,
            cancelled: false,
        }
    }

    fn dispatch_ready<A>(&mut self, adapter: &Arc<A>)
    where
        A: ProvisioningAdapter + ?Sized + 'static,
    {
        let limit = self.options.max_parallel.unwrap_or(usize::MAX).max(1);
        while !self.cancelled && self.in_flight.len() < limit {
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            self.dispatch(&id, adapter);
        }
    }

    fn dispatch<A>(&mut self, id: &str, adapter: &Arc<A>)
    where
        A: ProvisioningAdapter + ?Sized + 'static,
    {
        let Some(node) = self.graph.node(id) else {
            return;
        };
        if node.state() != NodeState::Pending {
            // skipped while queued
            return;
        }

        let config = self.resolver.materialize(node.descriptor());
        let kind = node.kind().to_string();
        let limit = node.descriptor().timeout.or(self.options.node_timeout);

        let Some(node) = self.graph.node_mut(id) else {
            return;
        };
        node.transition(NodeState::Creating);

        let config = match config {
            Ok(config) => config,
            Err(err) => {
                warn!(node = %id, error = %err, "Configuration could not be resolved");
                node.mark_failed(err, None);
                self.skip_dependents(id);
                return;
            }
        };

        info!(node = %id, kind = %kind, "Creating resource");
        let request = CreateRequest {
            id: id.to_string(),
            kind,
            config,
        };
        let adapter = Arc::clone(adapter);
        self.in_flight.spawn(async move {
            let started = Instant::now();
            let call = AssertUnwindSafe(adapter.create(&request)).catch_unwind();
            let outcome = match limit {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => flatten(result),
                    Err(_) => Err(NodeError::Timeout { after: limit }),
                },
                None => flatten(call.await),
            };
            Completion {
                id: request.id,
                outcome,
                elapsed: started.elapsed(),
            }
        });
    }

    fn settle(&mut self, completion: Completion) {
        let Completion {
            id,
            outcome,
            elapsed,
        } = completion;
        let Some(node) = self.graph.node_mut(&id) else {
            error!(node = %id, "Completion for unknown node");
            return;
        };

        match outcome {
            Ok(outputs) => {
                let outputs = Arc::new(outputs);
                if !node.mark_created(Arc::clone(&outputs), elapsed) {
                    return;
                }
                info!(
                    node = %id,
                    outputs = outputs.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Resource created"
                );
                for consumer in self.resolver.publish(&self.graph, &id, outputs) {
                    let Some(next) = self.graph.node_mut(&consumer) else {
                        continue;
                    };
                    if next.state() == NodeState::Blocked && next.transition(NodeState::Pending) {
                        debug!(node = %consumer, "Dependencies satisfied");
                        self.ready.push_back(consumer);
                    }
                }
            }
            Err(err) => {
                warn!(
                    node = %id,
                    error = %err,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Resource failed"
                );
                if node.mark_failed(err, Some(elapsed)) {
                    self.skip_dependents(&id);
                }
            }
        }
    }

    /// Skip every not-yet-started node downstream of `failed`
    fn skip_dependents(&mut self, failed: &str) {
        for id in self.graph.transitive_dependents(failed) {
            let Some(node) = self.graph.node_mut(&id) else {
                continue;
            };
            if matches!(node.state(), NodeState::Pending | NodeState::Blocked) {
                node.mark_skipped(NodeError::DependencyFailed {
                    dependency: failed.to_string(),
                });
                info!(node = %id, dependency = %failed, "Skipping resource");
            }
        }
    }

    fn cancel_pending(&mut self) {
        self.cancelled = true;
        self.ready.clear();
        let ids: Vec<String> = self.graph.topological_order().to_vec();
        let mut skipped = 0usize;
        for id in ids {
            if let Some(node) = self.graph.node_mut(&id)
                && matches!(node.state(), NodeState::Pending | NodeState::Blocked)
            {
                node.mark_skipped(NodeError::Cancelled);
                skipped += 1;
            }
        }
        warn!(
            skipped,
            in_flight = self.in_flight.len(),
            "Deployment cancelled"
        );
    }

    /// Every node is terminal once the loop drains; anything else is a
    /// scheduler bug and is recorded rather than left dangling.
    fn finish_stragglers(&mut self) {
        let ids: Vec<String> = self.graph.topological_order().to_vec();
        for id in ids {
            if let Some(node) = self.graph.node_mut(&id)
                && !node.state().is_terminal()
            {
                error!(node = %id, state = %node.state(), "Node left unfinished");
                let reason = NodeError::Internal {
                    message: format!("node left in state '{}'", node.state()),
                };
                if !node.mark_skipped(reason.clone()) {
                    node.mark_failed(reason, None);
                }
            }
        }
    }
}

fn flatten(
    result: std::thread::Result<Result<Outputs, ProviderError>>,
) -> Result<Outputs, NodeError> {
    match result {
        Ok(outcome) => outcome.map_err(NodeError::from),
        Err(_) => Err(NodeError::Provider(ProviderError::permanent(
            "adapter panicked",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceDescriptor;
    use crate::result::{ExportValue, RunOutcome};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records call order and returns `{id, name}` outputs
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<CreateRequest>>,
        fail: BTreeSet<String>,
        delay: Option<Duration>,
        panic_on: Option<String>,
    }

    impl Recorder {
        fn failing(ids: &[&str]) -> Self {
            Self {
                fail: ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn order(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ProvisioningAdapter for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn create(&self, request: &CreateRequest) -> Result<Outputs, ProviderError> {
            self.calls.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.panic_on.as_deref() == Some(request.id.as_str()) {
                panic!("boom");
            }
            if self.fail.contains(&request.id) {
                return Err(ProviderError::permanent(format!("{} rejected", request.id)));
            }
            Ok(Outputs::from([
                ("id".to_string(), json!(format!("/res/{}", request.id))),
                ("name".to_string(), json!(request.id)),
            ]))
        }
    }

    fn res(id: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(id, "test")
    }

    fn chain() -> Graph {
        Graph::build(vec![
            res("a"),
            res("b").with_output("fromA", "a", "id"),
            res("c").with_output("fromB", "b", "id"),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let adapter = Arc::new(Recorder::default());
        let result = execute(chain(), adapter.clone(), ExecuteOptions::new()).await;

        assert_eq!(result.outcome, RunOutcome::Succeeded);
        assert_eq!(adapter.order(), vec!["a", "b", "c"]);
        let calls = adapter.calls.lock().unwrap();
        assert_eq!(calls[2].config["fromB"], json!("/res/b"));
    }

    #[tokio::test]
    async fn test_empty_graph() {
        let graph = Graph::build(Vec::new()).unwrap();
        let result = execute(graph, Arc::new(Recorder::default()), ExecuteOptions::new()).await;
        assert_eq!(result.outcome, RunOutcome::Succeeded);
        assert!(result.nodes.is_empty());
    }

    #[tokio::test]
    async fn test_failure_skips_only_downstream() {
        let graph = Graph::build(vec![
            res("a"),
            res("b").with_parent("a"),
            res("c").with_parent("b"),
            res("x"),
            res("y").with_parent("x"),
        ])
        .unwrap();
        let adapter = Arc::new(Recorder::failing(&["b"]));
        let result = execute(graph, adapter.clone(), ExecuteOptions::new()).await;

        assert_eq!(result.outcome, RunOutcome::PartialFailure);
        assert_eq!(result.state_of("a"), Some(NodeState::Created));
        assert_eq!(result.state_of("b"), Some(NodeState::Failed));
        assert_eq!(result.state_of("c"), Some(NodeState::Skipped));
        assert_eq!(
            result.nodes["c"].error,
            Some(NodeError::DependencyFailed {
                dependency: "b".to_string()
            })
        );
        assert_eq!(result.state_of("x"), Some(NodeState::Created));
        assert_eq!(result.state_of("y"), Some(NodeState::Created));
        assert!(!adapter.order().contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_missing_output_fails_consumer_without_adapter_call() {
        let graph = Graph::build(vec![
            res("vault"),
            res("cluster").with_output("secret", "vault", "secretUri"),
            res("app").with_parent("cluster"),
        ])
        .unwrap();
        let adapter = Arc::new(Recorder::default());
        let result = execute(graph, adapter.clone(), ExecuteOptions::new()).await;

        assert_eq!(result.state_of("vault"), Some(NodeState::Created));
        assert_eq!(result.state_of("cluster"), Some(NodeState::Failed));
        assert!(matches!(
            result.nodes["cluster"].error,
            Some(NodeError::MissingOutput { ref output, .. }) if output == "secretUri"
        ));
        assert_eq!(result.state_of("app"), Some(NodeState::Skipped));
        assert_eq!(adapter.order(), vec!["vault"]);
    }

    #[tokio::test]
    async fn test_timeout_fails_node() {
        let graph = Graph::build(vec![res("slow"), res("after").with_parent("slow")]).unwrap();
        let adapter = Arc::new(Recorder {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let options = ExecuteOptions::new().with_node_timeout(Duration::from_millis(10));
        let result = execute(graph, adapter, options).await;

        assert_eq!(result.state_of("slow"), Some(NodeState::Failed));
        assert!(matches!(
            result.nodes["slow"].error,
            Some(NodeError::Timeout { .. })
        ));
        assert_eq!(result.state_of("after"), Some(NodeState::Skipped));
    }

    #[tokio::test]
    async fn test_descriptor_timeout_overrides_default() {
        let graph = Graph::build(vec![res("slow").with_timeout(Duration::from_secs(5))]).unwrap();
        let adapter = Arc::new(Recorder {
            delay: Some(Duration::from_millis(30)),
            ..Default::default()
        });
        let options = ExecuteOptions::new().with_node_timeout(Duration::from_millis(1));
        let result = execute(graph, adapter, options).await;
        assert_eq!(result.state_of("slow"), Some(NodeState::Created));
    }

    #[tokio::test]
    async fn test_adapter_panic_is_a_node_failure() {
        let graph = Graph::build(vec![res("a"), res("b")]).unwrap();
        let adapter = Arc::new(Recorder {
            panic_on: Some("a".to_string()),
            ..Default::default()
        });
        let result = execute(graph, adapter, ExecuteOptions::new()).await;

        assert_eq!(result.state_of("a"), Some(NodeState::Failed));
        assert_eq!(result.state_of("b"), Some(NodeState::Created));
    }

    #[tokio::test]
    async fn test_cancel_before_start_skips_everything() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let adapter = Arc::new(Recorder::default());
        let result = execute(
            chain(),
            adapter.clone(),
            ExecuteOptions::new().with_cancel(cancel),
        )
        .await;

        assert_eq!(result.outcome, RunOutcome::Cancelled);
        assert!(adapter.order().is_empty());
        for id in ["a", "b", "c"] {
            assert_eq!(result.state_of(id), Some(NodeState::Skipped));
            assert_eq!(result.nodes[id].error, Some(NodeError::Cancelled));
        }
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_finish() {
        let cancel = CancelHandle::new();
        let adapter = Arc::new(Recorder {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = execute(
            chain(),
            adapter.clone(),
            ExecuteOptions::new().with_cancel(cancel),
        )
        .await;

        assert_eq!(result.outcome, RunOutcome::Cancelled);
        assert_eq!(result.state_of("a"), Some(NodeState::Created));
        assert_eq!(result.state_of("b"), Some(NodeState::Skipped));
        assert_eq!(result.state_of("c"), Some(NodeState::Skipped));
        assert_eq!(adapter.order(), vec!["a"]);
    }

    /// Tracks how many `create` calls overlap
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ProvisioningAdapter for Gauge {
        fn name(&self) -> &str {
            "gauge"
        }

        async fn create(&self, request: &CreateRequest) -> Result<Outputs, ProviderError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Outputs::from([("id".to_string(), json!(request.id))]))
        }
    }

    async fn peak_in_flight(options: ExecuteOptions) -> usize {
        let graph = Graph::build((0..12).map(|i| res(&format!("n{i}")))).unwrap();
        let gauge = Arc::new(Gauge::default());
        let result = execute(graph, gauge.clone(), options).await;
        assert_eq!(result.summary().created, 12);
        gauge.peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_max_parallel_bounds_in_flight_calls() {
        let bounded = peak_in_flight(ExecuteOptions::new().with_max_parallel(3)).await;
        assert!(bounded <= 3, "peak {bounded} exceeded the limit");

        let unbounded = peak_in_flight(ExecuteOptions::new()).await;
        assert!(unbounded > 3, "independent nodes did not overlap: {unbounded}");
    }

    #[tokio::test]
    async fn test_exports_from_failed_node_are_unavailable() {
        let graph = Graph::build(vec![
            res("ok").with_export("okId", "id"),
            res("bad").with_export("badId", "id"),
            res("late").with_parent("bad").with_export("lateId", "id"),
        ])
        .unwrap();
        let result = execute(graph, Arc::new(Recorder::failing(&["bad"])), ExecuteOptions::new()).await;

        assert_eq!(
            result.exports["okId"].value(),
            Some(&Value::String("/res/ok".into()))
        );
        assert!(matches!(result.exports["badId"], ExportValue::Unavailable { .. }));
        assert!(matches!(result.exports["lateId"], ExportValue::Unavailable { .. }));
    }
}
