//! Property-Based Tests for the operation runner

use async_trait::async_trait;
use cephmaint::{MaintenanceError, MaintenanceResult, OpResult, Operation, OperationRunner};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A step that counts executions and optionally fails.
pub struct ScriptedStep {
    index: usize,
    fails: bool,
    executed: Arc<AtomicUsize>,
}

impl ScriptedStep {
    pub fn new(index: usize, fails: bool, executed: Arc<AtomicUsize>) -> Self {
        Self {
            index,
            fails,
            executed,
        }
    }
}

#[async_trait]
impl Operation for ScriptedStep {
    fn name(&self) -> &'static str {
        "scripted-step"
    }

    fn describe(&self, node: &str) -> String {
        format!("Step {} on '{}'.", self.index, node)
    }

    async fn execute(&self, _node: &str) -> MaintenanceResult<()> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(MaintenanceError::PostCondition(format!("step {} failed", self.index)));
        }
        Ok(())
    }
}

/// Generates a plan as a list of per-step failure flags.
pub fn arb_plan() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.2), 0..12)
}

fn build(plan: &[bool], executed: &Arc<AtomicUsize>) -> Vec<Box<dyn Operation>> {
    plan.iter()
        .enumerate()
        .map(|(i, fails)| Box::new(ScriptedStep::new(i, *fails, executed.clone())) as Box<dyn Operation>)
        .collect()
}

fn run(plan: &[bool], dry_run: bool, force: bool) -> (Vec<OpResult>, usize) {
    let executed = Arc::new(AtomicUsize::new(0));
    let ops = build(plan, &executed);
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let results = rt.block_on(OperationRunner::new(dry_run).run("node-0", &ops, force));
    (results, executed.load(Ordering::SeqCst))
}

proptest! {
    #[test]
    fn prop_results_never_exceed_plan(
        plan in arb_plan(),
        dry_run in any::<bool>(),
        force in any::<bool>(),
    ) {
        let (results, _) = run(&plan, dry_run, force);
        prop_assert!(results.len() <= plan.len());
    }

    #[test]
    fn prop_dry_run_executes_nothing(plan in arb_plan(), force in any::<bool>()) {
        let (results, executed) = run(&plan, true, force);
        prop_assert_eq!(executed, 0);
        prop_assert_eq!(results.len(), plan.len());
        prop_assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn prop_run_stops_at_first_failure(plan in arb_plan()) {
        let (results, executed) = run(&plan, false, false);
        let expected = match plan.iter().position(|fails| *fails) {
            Some(first) => first + 1,
            None => plan.len(),
        };
        prop_assert_eq!(results.len(), expected);
        prop_assert_eq!(executed, expected);
        for (i, result) in results.iter().enumerate() {
            prop_assert_eq!(result.is_ok(), !plan[i]);
            prop_assert_eq!(&result.action, &format!("Step {} on 'node-0'.", i));
        }
    }

    #[test]
    fn prop_force_reports_every_step(plan in arb_plan()) {
        let (results, executed) = run(&plan, false, true);
        prop_assert_eq!(results.len(), plan.len());
        prop_assert_eq!(executed, plan.len());
        for (result, fails) in results.iter().zip(&plan) {
            prop_assert_eq!(result.is_ok(), !*fails);
        }
    }
}
