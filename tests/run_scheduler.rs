mod common;
use crate::common::{FakeProcessor, graph, task};

use assetdag::build::{RunScheduler, TaskRunState};
use assetdag::dag::TaskGraph;
use assetdag::types::AssetClass;

/// a <- b <- c, and an independent d.
fn chain() -> TaskGraph {
    let p = FakeProcessor::new();
    graph(vec![
        task("a", AssetClass::Style, &["src/a/**"], "out/a.css", &[], p.arc()),
        task("b", AssetClass::Markup, &["src/b/**"], "out/b", &["a"], p.arc()),
        task("c", AssetClass::Markup, &["src/c/**"], "out/c", &["b"], p.arc()),
        task("d", AssetClass::Image, &["src/d/**"], "out/d", &[], p.arc()),
    ])
}

fn plan(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn plan_is_ordered_and_unknown_names_dropped() {
    let g = chain();
    let scheduler = RunScheduler::new(&g, &plan(&["c", "ghost", "a", "b"]), |_| true);
    assert_eq!(scheduler.planned(), &["a", "b", "c"]);
    assert_eq!(scheduler.state_of("ghost"), None);
}

#[test]
fn tasks_become_ready_once_dependencies_succeed() {
    let g = chain();
    let mut scheduler = RunScheduler::new(&g, &plan(&["a", "b", "c", "d"]), |_| false);

    let step = scheduler.start();
    assert_eq!(step.newly_ready, vec!["a", "d"]);
    assert!(step.newly_skipped.is_empty());
    assert_eq!(scheduler.running_count(), 2);

    let step = scheduler.complete("a", true);
    assert_eq!(step.newly_ready, vec!["b"]);
    assert!(!step.finished);

    scheduler.complete("d", true);
    let step = scheduler.complete("b", true);
    assert_eq!(step.newly_ready, vec!["c"]);

    let step = scheduler.complete("c", true);
    assert!(step.finished);
    assert_eq!(scheduler.tasks_in(TaskRunState::Succeeded), vec!["a", "b", "c", "d"]);
}

#[test]
fn failure_skips_transitive_dependents_only() {
    let g = chain();
    let mut scheduler = RunScheduler::new(&g, &plan(&["a", "b", "c", "d"]), |_| false);
    scheduler.start();

    let step = scheduler.complete("a", false);
    assert!(step.newly_ready.is_empty());
    let mut skipped = step.newly_skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["b", "c"]);
    assert_eq!(scheduler.state_of("a"), Some(TaskRunState::Failed));
    assert_eq!(scheduler.state_of("d"), Some(TaskRunState::Running));

    let step = scheduler.complete("d", true);
    assert!(step.finished);
}

#[test]
fn out_of_run_dependency_decides_by_previous_success() {
    let g = chain();

    let mut never_built = RunScheduler::new(&g, &plan(&["b", "c"]), |_| false);
    let step = never_built.start();
    assert!(step.newly_ready.is_empty());
    assert_eq!(step.newly_skipped, vec!["b", "c"]);
    assert!(step.finished);

    let mut built_before = RunScheduler::new(&g, &plan(&["b", "c"]), |name| name == "a");
    let step = built_before.start();
    assert_eq!(step.newly_ready, vec!["b"]);
    assert!(step.newly_skipped.is_empty());
}

#[test]
fn cancel_pending_leaves_running_tasks_alone() {
    let g = chain();
    let mut scheduler = RunScheduler::new(&g, &plan(&["a", "b", "c", "d"]), |_| false);
    scheduler.start();

    let cancelled = scheduler.cancel_pending();
    assert_eq!(cancelled, vec!["b", "c"]);
    assert_eq!(scheduler.running_count(), 2);

    let step = scheduler.complete("a", true);
    assert!(step.newly_ready.is_empty());
    let step = scheduler.complete("d", true);
    assert!(step.finished);
    assert_eq!(scheduler.tasks_in(TaskRunState::Cancelled), vec!["b", "c"]);
}

#[test]
fn task_cancelled_before_starting_cancels_its_dependents() {
    let g = chain();
    let mut scheduler = RunScheduler::new(&g, &plan(&["a", "b", "c"]), |_| false);
    scheduler.start();

    let step = scheduler.complete_cancelled("a");
    assert_eq!(step.newly_cancelled, vec!["b", "c"]);
    assert!(step.finished);
    assert!(TaskRunState::Cancelled.is_terminal());
    assert!(!TaskRunState::Running.is_terminal());
}

#[test]
fn completion_of_unknown_or_idle_task_is_ignored() {
    let g = chain();
    let mut scheduler = RunScheduler::new(&g, &plan(&["a", "b"]), |_| false);
    scheduler.start();

    let step = scheduler.complete("b", true);
    assert!(step.newly_ready.is_empty());
    assert_eq!(scheduler.state_of("b"), Some(TaskRunState::Pending));

    let step = scheduler.complete("ghost", true);
    assert!(!step.finished);
}
