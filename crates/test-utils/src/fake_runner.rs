use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskdag::dag::{ExecutionState, Node, NodeId, TaskGraph};
use taskdag::engine::{AdaptationPlan, NodeOutcome, Verdict};
use taskdag::exec::{BoxFuture, NodeInput, NodeRunner, NodeValidator, PlanAdapter};

/// What a scripted node does when run.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(String),
    Fail(String),
    Outcome(NodeOutcome),
    Panic,
}

/// Input a node was run with.
#[derive(Debug, Clone)]
pub struct SeenInput {
    pub context: String,
    /// Hint handed over at admission.
    pub hint: Option<String>,
    /// Router hint read back after each scripted resource call.
    pub hints_during: Vec<Option<String>>,
}

#[derive(Default)]
struct RunnerState {
    scripts: Mutex<HashMap<NodeId, Script>>,
    executed: Mutex<Vec<NodeId>>,
    seen: Mutex<HashMap<NodeId, SeenInput>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A fake runner that:
/// - records which nodes were run, in dispatch order, and with what input
/// - reports the resource calls of scripted outcomes through the router
/// - tracks the highest number of nodes running at once
/// - succeeds with `"<id> done"` unless scripted otherwise.
///
/// Clones share state, so a clone kept by the test observes the runs made
/// through the scheduler.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    inner: Arc<RunnerState>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, id: &str, script: Script) -> Self {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), script);
        self
    }

    pub fn succeed(self, id: &str, output: &str) -> Self {
        self.script(id, Script::Succeed(output.to_string()))
    }

    pub fn fail(self, id: &str, output: &str) -> Self {
        self.script(id, Script::Fail(output.to_string()))
    }

    pub fn outcome(self, id: &str, outcome: NodeOutcome) -> Self {
        self.script(id, Script::Outcome(outcome))
    }

    pub fn panic(self, id: &str) -> Self {
        self.script(id, Script::Panic)
    }

    /// Make every run take `delay`, so concurrency becomes observable.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = delay;
        self
    }

    pub fn executed(&self) -> Vec<NodeId> {
        self.inner.executed.lock().unwrap().clone()
    }

    pub fn ran(&self, id: &str) -> bool {
        self.inner.executed.lock().unwrap().iter().any(|n| n == id)
    }

    pub fn input_of(&self, id: &str) -> Option<SeenInput> {
        self.inner.seen.lock().unwrap().get(id).cloned()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

impl NodeRunner for ScriptedRunner {
    fn run(&self, input: NodeInput) -> BoxFuture<'_, NodeOutcome> {
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            let id = input.node.id.clone();
            inner.executed.lock().unwrap().push(id.clone());
            inner.seen.lock().unwrap().insert(
                id.clone(),
                SeenInput {
                    context: input.context.clone(),
                    hint: input.hint.clone(),
                    hints_during: Vec::new(),
                },
            );

            let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = *inner.delay.lock().unwrap();
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            inner.in_flight.fetch_sub(1, Ordering::SeqCst);

            let script = inner.scripts.lock().unwrap().get(&id).cloned();

            // Replay scripted resource calls through the live router, the
            // way a real runner reports them between tool invocations.
            if let Some(Script::Outcome(outcome)) = &script {
                let mut hints = Vec::with_capacity(outcome.resource_calls.len());
                for call in outcome.resource_calls.iter() {
                    if call.succeeded {
                        input.router.record_success(&id, &call.resource);
                    } else {
                        input.router.record_failure(&id, &call.resource);
                    }
                    hints.push(input.router.hint(&id));
                }
                if let Some(seen) = inner.seen.lock().unwrap().get_mut(&id) {
                    seen.hints_during = hints;
                }
            }

            match script {
                None => NodeOutcome::success(format!("{id} done")),
                Some(Script::Succeed(output)) => NodeOutcome::success(output),
                Some(Script::Fail(output)) => NodeOutcome::failure(output),
                Some(Script::Outcome(outcome)) => outcome,
                Some(Script::Panic) => panic!("scripted panic in node {id}"),
            }
        })
    }
}

/// A validator that rejects a fixed set of nodes and records every call.
#[derive(Clone, Default)]
pub struct ScriptedValidator {
    rejected: Arc<HashSet<NodeId>>,
    validated: Arc<Mutex<Vec<NodeId>>>,
}

impl ScriptedValidator {
    pub fn rejecting(ids: &[&str]) -> Self {
        Self {
            rejected: Arc::new(ids.iter().map(|s| s.to_string()).collect()),
            validated: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn validated(&self) -> Vec<NodeId> {
        self.validated.lock().unwrap().clone()
    }
}

impl NodeValidator for ScriptedValidator {
    fn validate<'a>(&'a self, node: &'a Node, _outcome: &'a NodeOutcome) -> BoxFuture<'a, Verdict> {
        Box::pin(async move {
            self.validated.lock().unwrap().push(node.id.clone());
            if self.rejected.contains(&node.id) {
                Verdict::fail(format!("criteria not met for {}", node.id))
            } else {
                Verdict::pass()
            }
        })
    }
}

/// One scripted adapter reply.
#[derive(Debug, Clone)]
pub enum AdapterReply {
    Plan(AdaptationPlan),
    Error(String),
}

/// An adapter that replays queued replies, then proposes nothing.
#[derive(Clone, Default)]
pub struct ScriptedAdapter {
    replies: Arc<Mutex<VecDeque<AdapterReply>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, reply: AdapterReply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn then_plan(self, plan: AdaptationPlan) -> Self {
        self.then(AdapterReply::Plan(plan))
    }

    pub fn then_error(self, message: &str) -> Self {
        self.then(AdapterReply::Error(message.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlanAdapter for ScriptedAdapter {
    fn adapt<'a>(
        &'a self,
        _graph: &'a TaskGraph,
        _state: &'a ExecutionState,
    ) -> BoxFuture<'a, anyhow::Result<AdaptationPlan>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().unwrap().pop_front() {
                None => Ok(AdaptationPlan::no_change()),
                Some(AdapterReply::Plan(plan)) => Ok(plan),
                Some(AdapterReply::Error(message)) => Err(anyhow::anyhow!(message)),
            }
        })
    }
}
