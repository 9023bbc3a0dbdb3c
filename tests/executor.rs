mod common;

use common::{init_logging, Script, Scripted, Tracked};
use fitrunner::{
    AbortSignal, Completion, EventBridge, EventInbox, ExecutorConfig, FitError, FitEvent,
    FitExecutor, FitOptions, JobState, Message, Outcome,
};
use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn options() -> FitOptions {
    FitOptions::default().with_workers(1).with_seed(1)
}

fn completions(inbox: &EventInbox<Tracked>) -> Vec<Completion> {
    inbox
        .drain_complete()
        .into_iter()
        .map(|event| match event.message {
            Message::Complete(completion) => completion,
            other => panic!("non-terminal message on completion channel: {:?}", other),
        })
        .collect()
}

fn count(events: &[FitEvent<Tracked>], kind: &str) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

#[test]
fn five_step_fit_emits_one_final_convergence_and_one_completion() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[4.0, -2.0]));
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(5)))
        .with_options(options())
        .with_config(ExecutorConfig::default().with_convergence_update(0.0))
        .start()
        .unwrap();
    let result = handle.join().unwrap();
    assert_eq!(result.outcome, Outcome::Completed);

    let events = inbox.drain_progress();
    assert!(events.iter().all(|e| e.is_for(&problem)));
    // Cadence 0: nothing during the run, exactly one at finalize
    assert_eq!(count(&events, "convergence_update"), 1);
    match &events.last().unwrap().message {
        Message::ConvergenceUpdate { pop } => {
            assert_eq!(pop.len(), 5);
            assert!(pop.iter().all(|row| row.quantiles.is_none()));
        }
        other => panic!("last progress-channel event was {:?}", other),
    }
    // First iteration always reports progress
    assert!(count(&events, "progress") >= 1);
    assert_eq!(count(&events, "uncertainty_final"), 0);

    let done = completions(&inbox);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].steps, 5);
    assert_eq!(done[0].outcome, Outcome::Completed);
    assert_eq!(done[0].point, vec![0.8, -0.4]);
    assert!(done[0].info.contains("Scripted"));
    assert!(inbox.is_closed());
}

#[test]
fn fitter_error_still_finalizes_and_completes_once() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[1.0]));
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(5).with_script(Script::FailAt(3))))
        .with_options(options())
        .start()
        .unwrap();
    let result = handle.join().unwrap();

    match &result.outcome {
        Outcome::Failed { error } => assert!(error.contains("scripted failure at 3")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(result.steps, 2);

    let events = inbox.drain_progress();
    assert_eq!(count(&events, "convergence_update"), 1);
    let done = completions(&inbox);
    assert_eq!(done.len(), 1);
    assert!(done[0].outcome.is_failure());
    assert!(done[0].info.contains("FAILED"));
}

#[test]
fn fitter_panic_is_caught_at_the_thread_boundary() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[1.0]));
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(5).with_script(Script::PanicAt(2))))
        .with_options(options())
        .start()
        .unwrap();
    let result = handle.join().unwrap();

    match &result.outcome {
        Outcome::Failed { error } => assert!(error.contains("scripted panic at 2")),
        other => panic!("expected failure, got {:?}", other),
    }
    let done = completions(&inbox);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].steps, 1);
    assert_eq!(count(&inbox.drain_progress(), "convergence_update"), 1);
}

#[test]
fn abort_before_start_runs_no_evaluations() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[1.0, 1.0]));
    let abort = AbortSignal::new();
    abort.request_abort();
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "pso", bridge, abort)
        .with_options(options())
        .start()
        .unwrap();
    let result = handle.join().unwrap();

    assert_eq!(result.outcome, Outcome::Aborted);
    assert_eq!(result.steps, 0);
    assert_eq!(problem.evaluations.load(Ordering::SeqCst), 0);

    let done = completions(&inbox);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].outcome, Outcome::Aborted);
}

#[test]
fn no_batch_starts_after_abort_is_observed() {
    init_logging();
    let abort = AbortSignal::new();
    // The 10th evaluation raises the flag; the swarm has 4 particles
    let problem = Arc::new(Tracked::new(&[3.0, -3.0]).with_abort_at(10, abort.clone()));
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "pso", bridge, abort)
        .with_options(options().with_pop(4).with_steps(100).with_ftol(0.0))
        .start()
        .unwrap();
    let result = handle.join().unwrap();

    assert_eq!(result.outcome, Outcome::Aborted);
    assert_eq!(result.steps, 3);
    // The batch in flight finishes, nothing after it starts
    assert_eq!(problem.evaluations.load(Ordering::SeqCst), 12);
    assert_eq!(single_outcome(&inbox), Outcome::Aborted);
}

fn single_outcome(inbox: &EventInbox<Tracked>) -> Outcome {
    let done = completions(inbox);
    assert_eq!(done.len(), 1);
    done[0].outcome.clone()
}

#[test]
fn abort_through_handle_while_running() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[2.0]));
    let (go, gate) = mpsc::channel();
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(1000).gated(gate)))
        .with_options(options())
        .start()
        .unwrap();
    assert_eq!(handle.state(), JobState::Running);

    handle.abort();
    go.send(()).unwrap();
    let result = handle.join().unwrap();

    assert_eq!(result.outcome, Outcome::Aborted);
    assert_eq!(result.steps, 0);
    assert_eq!(problem.evaluations.load(Ordering::SeqCst), 0);
    assert_eq!(completions(&inbox).len(), 1);
}

#[test]
fn caller_and_job_do_not_see_each_others_writes() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[5.0]));
    let (go, gate) = mpsc::channel();
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(5).gated(gate)))
        .with_options(options())
        .start()
        .unwrap();

    // Caller mutates its instance after the snapshot was taken
    problem.poke(&[100.0]);
    go.send(()).unwrap();
    let result = handle.join().unwrap();

    // The job fitted from the snapshot and moved only its own copy
    assert_eq!(result.point, vec![1.0]);
    assert_eq!(problem.point(), vec![100.0]);

    let events = inbox.drain_progress();
    let first_progress = events
        .iter()
        .find_map(|e| match &e.message {
            Message::Progress { point, .. } => Some(point.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(first_progress, vec![5.0]);
    assert!(events.iter().all(|e| Arc::ptr_eq(&e.problem, &problem)));
}

#[test]
fn dropped_consumer_is_fatal_to_the_job() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[1.0]));
    let (bridge, inbox) = EventBridge::channel();
    drop(inbox);

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(5)))
        .with_options(options())
        .start()
        .unwrap();

    let err = handle.join().unwrap_err();
    assert!(matches!(err, FitError::BridgeClosed));
}

#[test]
fn terminate_flag_rides_on_the_completion() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[1.0]));
    let (bridge, inbox) = EventBridge::channel();

    FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(2)))
        .with_options(options())
        .with_config(ExecutorConfig::default().with_terminate_on_finish(true))
        .start()
        .unwrap();

    let event = inbox.recv_complete_timeout(WAIT).expect("completion");
    match event.message {
        Message::Complete(completion) => assert!(completion.terminate),
        other => panic!("unexpected {:?}", other),
    }
    for json in event_json(&inbox, &problem) {
        assert!(json.contains("\"job\":"), "{}", json);
    }
}

fn event_json(inbox: &EventInbox<Tracked>, problem: &Arc<Tracked>) -> Vec<String> {
    inbox
        .drain_progress()
        .iter()
        .filter(|e| e.is_for(problem))
        .map(|e| e.to_json().unwrap())
        .collect()
}

#[test]
fn sampler_reports_final_uncertainty() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[0.5, 0.5]));
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "dream", bridge, AbortSignal::new())
        .with_options(options().with_steps(20).with_burn(5).with_pop(4))
        .start()
        .unwrap();
    let result = handle.join().unwrap();
    assert_eq!(result.outcome, Outcome::Completed);

    let events = inbox.drain_progress();
    let finals: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.message {
            Message::UncertaintyFinal { uncertainty_state } => Some(uncertainty_state.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(finals[0].generation, 20);
    assert_eq!(finals[0].len(), 15 * 4);
    assert_eq!(completions(&inbox).len(), 1);
}
