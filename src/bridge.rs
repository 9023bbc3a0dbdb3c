//! Cross-thread delivery of fit events to a consumer running elsewhere.
//!
//! A bridge is a pair of unbounded channels (progress, completion). Every
//! publish enqueues first and then wakes the consumer explicitly: the async
//! task waiting on the inbox, plus any extra [`Wake`] handles bound to it.
//! A consumer parked on its own scheduler therefore never misses an event
//! and never needs to poll.

use crate::core::{FitError, FitEvent, JobId, Message, Result};
use crate::optimization::MessageSink;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use futures::future::poll_fn;
use futures::task::AtomicWaker;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

/// Something that can rouse a sleeping consumer.
///
/// Implement this for a foreign event loop's wake primitive (an eventfd, a
/// self-pipe, a GUI post). Errors are fatal to the publishing job.
pub trait Wake: Send + Sync {
    fn wake(&self) -> io::Result<()>;
}

/// Unparks a consumer thread blocked in `std::thread::park`.
impl Wake for std::thread::Thread {
    fn wake(&self) -> io::Result<()> {
        self.unpark();
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Channel {
    Progress,
    Complete,
}

/// Wake state shared by both halves of a bridge.
#[derive(Default)]
struct Signal {
    progress: AtomicWaker,
    complete: AtomicWaker,
    wakers: RwLock<Vec<Arc<dyn Wake>>>,
    closed: AtomicBool,
}

impl Signal {
    fn notify(&self, channel: Channel) -> Result<()> {
        match channel {
            Channel::Progress => self.progress.wake(),
            Channel::Complete => self.complete.wake(),
        }
        let wakers = self.wakers.read().unwrap_or_else(PoisonError::into_inner);
        for waker in wakers.iter() {
            waker.wake().map_err(FitError::Wake)?;
        }
        Ok(())
    }

    fn bind(&self, waker: Arc<dyn Wake>) {
        self.wakers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(waker);
    }
}

/// Wakes the consumer once the last producer is gone so it can observe the
/// end of both streams.
struct CloseOnDrop(Arc<Signal>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        log::trace!("Last event producer dropped; waking consumer");
        self.0.closed.store(true, Ordering::Release);
        self.0.progress.wake();
        self.0.complete.wake();
        let wakers = self.0.wakers.read().unwrap_or_else(PoisonError::into_inner);
        for waker in wakers.iter() {
            if let Err(e) = waker.wake() {
                log::warn!("Failed to wake consumer on close: {}", e);
            }
        }
    }
}

/// Producer half. Cheap to clone; one clone per running job.
pub struct EventBridge<P> {
    // Field order matters: the senders must be gone before `_close` fires
    progress: Sender<FitEvent<P>>,
    complete: Sender<FitEvent<P>>,
    signal: Arc<Signal>,
    _close: Arc<CloseOnDrop>,
}

impl<P> EventBridge<P> {
    /// Create a connected bridge and inbox.
    pub fn channel() -> (Self, EventInbox<P>) {
        let (progress_tx, progress_rx) = channel::unbounded();
        let (complete_tx, complete_rx) = channel::unbounded();
        let signal = Arc::new(Signal::default());

        let bridge = Self {
            progress: progress_tx,
            complete: complete_tx,
            signal: Arc::clone(&signal),
            _close: Arc::new(CloseOnDrop(Arc::clone(&signal))),
        };
        let inbox = EventInbox {
            progress: progress_rx,
            complete: complete_rx,
            signal,
        };
        (bridge, inbox)
    }

    /// Enqueue on the progress channel, then wake the consumer.
    pub fn publish_progress(&self, event: FitEvent<P>) -> Result<()> {
        log::trace!("{} publishing {}", event.job, event.kind());
        self.progress
            .send(event)
            .map_err(|_| FitError::BridgeClosed)?;
        self.signal.notify(Channel::Progress)
    }

    /// Enqueue on the completion channel, then wake the consumer.
    pub fn publish_complete(&self, event: FitEvent<P>) -> Result<()> {
        log::trace!("{} publishing {}", event.job, event.kind());
        self.complete
            .send(event)
            .map_err(|_| FitError::BridgeClosed)?;
        self.signal.notify(Channel::Complete)
    }

    /// Route by kind: `complete` to the completion channel, everything else
    /// to the progress channel.
    pub fn publish(&self, event: FitEvent<P>) -> Result<()> {
        if event.message.is_terminal() {
            self.publish_complete(event)
        } else {
            self.publish_progress(event)
        }
    }
}

impl<P> Clone for EventBridge<P> {
    fn clone(&self) -> Self {
        Self {
            progress: self.progress.clone(),
            complete: self.complete.clone(),
            signal: Arc::clone(&self.signal),
            _close: Arc::clone(&self._close),
        }
    }
}

impl<P> std::fmt::Debug for EventBridge<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("queued_progress", &self.progress.len())
            .field("queued_complete", &self.complete.len())
            .finish()
    }
}

/// Consumer half.
pub struct EventInbox<P> {
    progress: Receiver<FitEvent<P>>,
    complete: Receiver<FitEvent<P>>,
    signal: Arc<Signal>,
}

impl<P> EventInbox<P> {
    /// Signal `waker` after every enqueue from now on, and once when the
    /// bridge closes.
    pub fn bind_waker(&self, waker: Arc<dyn Wake>) {
        self.signal.bind(waker);
    }

    pub fn try_next_progress(&self) -> Option<FitEvent<P>> {
        self.progress.try_recv().ok()
    }

    pub fn try_next_complete(&self) -> Option<FitEvent<P>> {
        self.complete.try_recv().ok()
    }

    /// Block the calling thread for at most `timeout`.
    pub fn recv_progress_timeout(&self, timeout: Duration) -> Option<FitEvent<P>> {
        recv_timeout(&self.progress, timeout)
    }

    pub fn recv_complete_timeout(&self, timeout: Duration) -> Option<FitEvent<P>> {
        recv_timeout(&self.complete, timeout)
    }

    /// Everything currently queued on the progress channel, in order.
    pub fn drain_progress(&self) -> Vec<FitEvent<P>> {
        self.progress.try_iter().collect()
    }

    pub fn drain_complete(&self) -> Vec<FitEvent<P>> {
        self.complete.try_iter().collect()
    }

    /// True once every producer is gone and both channels are empty.
    pub fn is_closed(&self) -> bool {
        self.signal.closed.load(Ordering::Acquire)
            && self.progress.is_empty()
            && self.complete.is_empty()
    }

    pub fn poll_progress(&self, cx: &mut Context<'_>) -> Poll<Option<FitEvent<P>>> {
        poll_channel(&self.progress, &self.signal.progress, cx)
    }

    pub fn poll_complete(&self, cx: &mut Context<'_>) -> Poll<Option<FitEvent<P>>> {
        poll_channel(&self.complete, &self.signal.complete, cx)
    }

    /// Next progress event; `None` once the bridge is closed and drained.
    pub async fn next_progress(&self) -> Option<FitEvent<P>> {
        poll_fn(|cx| self.poll_progress(cx)).await
    }

    /// Next completion event; `None` once the bridge is closed and drained.
    pub async fn next_complete(&self) -> Option<FitEvent<P>> {
        poll_fn(|cx| self.poll_complete(cx)).await
    }
}

impl<P> std::fmt::Debug for EventInbox<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInbox")
            .field("queued_progress", &self.progress.len())
            .field("queued_complete", &self.complete.len())
            .finish()
    }
}

fn recv_timeout<T>(receiver: &Receiver<T>, timeout: Duration) -> Option<T> {
    match receiver.recv_timeout(timeout) {
        Ok(event) => Some(event),
        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
}

fn poll_channel<T>(
    receiver: &Receiver<T>,
    waker: &AtomicWaker,
    cx: &mut Context<'_>,
) -> Poll<Option<T>> {
    match receiver.try_recv() {
        Ok(event) => return Poll::Ready(Some(event)),
        Err(TryRecvError::Disconnected) => return Poll::Ready(None),
        Err(TryRecvError::Empty) => {}
    }
    // Register before the second look so a publish in between is not lost
    waker.register(cx.waker());
    match receiver.try_recv() {
        Ok(event) => Poll::Ready(Some(event)),
        Err(TryRecvError::Disconnected) => Poll::Ready(None),
        Err(TryRecvError::Empty) => Poll::Pending,
    }
}

/// Stamps monitor messages with the job id and the caller's problem and
/// publishes them through a bridge.
pub struct Emitter<P> {
    job: JobId,
    problem: Arc<P>,
    bridge: EventBridge<P>,
    published: usize,
}

impl<P> Emitter<P> {
    pub fn new(job: JobId, problem: Arc<P>, bridge: EventBridge<P>) -> Self {
        Self {
            job,
            problem,
            bridge,
            published: 0,
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    /// Events successfully handed to the bridge so far.
    pub fn published(&self) -> usize {
        self.published
    }
}

impl<P: Send + Sync> MessageSink for Emitter<P> {
    fn emit(&mut self, message: Message) -> Result<()> {
        let event = FitEvent {
            job: self.job,
            problem: Arc::clone(&self.problem),
            message,
        };
        self.bridge.publish(event)?;
        self.published += 1;
        Ok(())
    }
}
