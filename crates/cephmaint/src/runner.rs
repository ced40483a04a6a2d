//! Sequential execution of operation lists.

use tracing::{debug, info, warn};

use crate::operation::{OpResult, Operation};

/// Executes or previews an ordered operation list against one node.
///
/// The runner is phase-agnostic: callers split a plan into separate lists
/// (preflight, action) and decide per list whether a failure stops it.
#[derive(Debug, Clone, Default)]
pub struct OperationRunner {
    dry_run: bool,
}

impl OperationRunner {
    /// Runner that previews instead of executing when `dry_run` is set.
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Whether operations are only described.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs `ops` strictly in order.
    ///
    /// In dry-run mode every operation is described and none is executed.
    /// Otherwise a failing operation stops the list unless `force` is set,
    /// in which case the remaining operations still run and report. The
    /// returned list is never longer than `ops`.
    pub async fn run(&self, node: &str, ops: &[Box<dyn Operation>], force: bool) -> Vec<OpResult> {
        let mut results = Vec::with_capacity(ops.len());

        for op in ops {
            let action = op.describe(node);
            if self.dry_run {
                debug!(node, op = op.name(), "previewed");
                results.push(OpResult::ok(action));
                continue;
            }

            debug!(node, op = op.name(), "executing");
            match op.execute(node).await {
                Ok(()) => {
                    info!(node, op = op.name(), "{} (passed)", action);
                    results.push(OpResult::ok(action));
                }
                Err(e) => {
                    warn!(node, op = op.name(), error = %e, force, "{} (failed)", action);
                    results.push(OpResult::failed(action, &e));
                    if !force {
                        break;
                    }
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MaintenanceError, MaintenanceResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Step {
        label: &'static str,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Operation for Step {
        fn name(&self) -> &'static str {
            "step"
        }

        fn describe(&self, node: &str) -> String {
            format!("{} on {}", self.label, node)
        }

        async fn execute(&self, _node: &str) -> MaintenanceResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MaintenanceError::PostCondition(format!("{} broke", self.label)))
            } else {
                Ok(())
            }
        }
    }

    fn plan(fails: &[bool], calls: &Arc<AtomicUsize>) -> Vec<Box<dyn Operation>> {
        const LABELS: [&str; 4] = ["a", "b", "c", "d"];
        fails
            .iter()
            .enumerate()
            .map(|(i, &fail)| {
                Box::new(Step {
                    label: LABELS[i],
                    fail,
                    calls: calls.clone(),
                }) as Box<dyn Operation>
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_all_pass() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ops = plan(&[false, false, false], &calls);
        let results = OperationRunner::new(false).run("n1", &ops, false).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(results[1].action, "b on n1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ops = plan(&[false, true, false, false], &calls);
        let results = OperationRunner::new(false).run("n1", &ops, false).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[1].error, "b broke");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_runs_past_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ops = plan(&[true, false, true, false], &calls);
        let results = OperationRunner::new(false).run("n1", &ops, true).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].error, "a broke");
        assert!(results[1].is_ok());
        assert_eq!(results[2].error, "c broke");
        assert!(results[3].is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_dry_run_never_executes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let ops = plan(&[true, true, true], &calls);
        let results = OperationRunner::new(true).run("n1", &ops, false).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let results = OperationRunner::default().run("n1", &[], false).await;
        assert!(results.is_empty());
    }
}
