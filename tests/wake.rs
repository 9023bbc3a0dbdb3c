mod common;

use common::{init_logging, Scripted, Tracked};
use fitrunner::{AbortSignal, EventBridge, FitExecutor, FitOptions, Message, Wake};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn options() -> FitOptions {
    FitOptions::default().with_workers(1)
}

#[tokio::test(flavor = "current_thread")]
async fn single_threaded_consumer_is_woken_by_each_publish() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[3.0]));
    let (bridge, inbox) = EventBridge::channel();

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(8)))
        .with_options(options())
        .start()
        .unwrap();

    // Only wakes can drive this task forward; nothing else polls it
    let consumed = tokio::time::timeout(Duration::from_secs(10), async {
        let mut kinds = Vec::new();
        while let Some(event) = inbox.next_progress().await {
            assert!(event.is_for(&problem));
            kinds.push(event.kind());
        }
        let complete = inbox.next_complete().await;
        (kinds, complete)
    })
    .await
    .expect("consumer was never woken");

    let (kinds, complete) = consumed;
    assert!(kinds.contains(&"progress"));
    assert_eq!(kinds.last(), Some(&"convergence_update"));
    match complete.map(|e| e.message) {
        Some(Message::Complete(c)) => assert_eq!(c.steps, 8),
        other => panic!("expected completion, got {:?}", other),
    }
    assert!(inbox.next_complete().await.is_none());
    handle.join().unwrap();
}

#[test]
fn parked_consumer_thread_is_unparked() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[3.0]));
    let (bridge, inbox) = EventBridge::channel();
    inbox.bind_waker(Arc::new(thread::current()));

    let handle = FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(3)))
        .with_options(options())
        .start()
        .unwrap();

    let mut progress = 0;
    let complete = loop {
        progress += inbox.drain_progress().len();
        if let Some(event) = inbox.try_next_complete() {
            break event;
        }
        // Timeout only bounds a lost wake; the unpark normally ends the wait
        thread::park_timeout(Duration::from_secs(1));
    };
    progress += inbox.drain_progress().len();

    assert_eq!(complete.kind(), "complete");
    assert!(progress >= 2);
    handle.join().unwrap();
}

struct CountingWake(AtomicUsize);

impl Wake for CountingWake {
    fn wake(&self) -> io::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn custom_wake_fires_after_every_event_and_on_close() {
    init_logging();
    let problem = Arc::new(Tracked::new(&[3.0]));
    let (bridge, inbox) = EventBridge::channel();
    let wakes = Arc::new(CountingWake(AtomicUsize::new(0)));
    inbox.bind_waker(wakes.clone());

    FitExecutor::new(Arc::clone(&problem), "auto", bridge, AbortSignal::new())
        .with_fitter(Box::new(Scripted::new(4)))
        .with_options(options())
        .start()
        .unwrap()
        .join()
        .unwrap();

    let events = inbox.drain_progress().len() + inbox.drain_complete().len();
    assert_eq!(wakes.0.load(Ordering::SeqCst), events + 1);
    assert!(inbox.is_closed());
}
