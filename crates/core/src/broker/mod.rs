//! Bounded-concurrency FIFO admission broker.
//!
//! Work is submitted as a closure producing a future. A single scheduler task
//! owns the pending queue and the set of admitted futures:
//!
//! ```text
//! enqueue() ──► mpsc ──► pending (FIFO) ──► running (≤ ceiling) ──► oneshot ──► TaskHandle
//! ```
//!
//! Admission happens in submission order, and a slot is handed to the next
//! pending task only after the previous holder has delivered its outcome.
//! Each [`TaskHandle`] is satisfied exactly once: with the operation's result,
//! with [`Error::TaskPanicked`] if it panicked, or with [`Error::BrokerClosed`]
//! if the scheduler went away before running it.

#[cfg(test)]
mod tests;

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use futures_util::FutureExt;
use futures_util::stream::{FuturesUnordered, StreamExt};
use pv_protocol::BrokerStats;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{Error, Result};

/// Admission ceiling used by [`AdmissionBroker::default`].
pub const DEFAULT_CEILING: usize = 3;

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Task = Box<dyn FnOnce() -> TaskFuture + Send>;

#[derive(Debug, Default)]
struct Counters {
	active: AtomicUsize,
	queued: AtomicUsize,
}

/// FIFO task runner that admits at most `ceiling` operations at a time.
///
/// Clones share the same scheduler. The scheduler keeps running until every
/// clone is dropped and all submitted work has finished.
#[derive(Debug, Clone)]
pub struct AdmissionBroker {
	tx: mpsc::UnboundedSender<Task>,
	counters: Arc<Counters>,
	ceiling: usize,
}

impl AdmissionBroker {
	/// Creates a broker, clamping `ceiling` to at least one slot.
	///
	/// Must be called from within a tokio runtime.
	pub fn new(ceiling: usize) -> Self {
		Self::spawn(ceiling.max(1))
	}

	/// Creates a broker, rejecting a zero ceiling.
	pub fn try_new(ceiling: usize) -> Result<Self> {
		if ceiling == 0 {
			return Err(Error::InvalidConfig("admission ceiling must be at least 1".to_string()));
		}
		Ok(Self::spawn(ceiling))
	}

	fn spawn(ceiling: usize) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let counters = Arc::new(Counters::default());
		tokio::spawn(run_scheduler(ceiling, rx, Arc::clone(&counters)));
		debug!(target = "pv.broker", ceiling, "admission broker started");
		Self { tx, counters, ceiling }
	}

	/// Queues `op` and returns a handle that resolves with its outcome.
	///
	/// Never waits: the task is appended to the queue before this returns.
	/// Start order across calls follows call order.
	pub fn enqueue<F, Fut, T>(&self, op: F) -> Result<TaskHandle<T>>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = Result<T>> + Send + 'static,
		T: Send + 'static,
	{
		let (done_tx, done_rx) = oneshot::channel();
		let task: Task = Box::new(move || {
			Box::pin(async move {
				let outcome = match AssertUnwindSafe(async move { op().await }).catch_unwind().await {
					Ok(result) => result,
					Err(panic) => Err(Error::TaskPanicked(panic_message(panic.as_ref()))),
				};
				// The submitter may have stopped waiting; the work still ran.
				let _ = done_tx.send(outcome);
			})
		});

		let queued = self.counters.queued.fetch_add(1, Ordering::SeqCst) + 1;
		if self.tx.send(task).is_err() {
			self.counters.queued.fetch_sub(1, Ordering::SeqCst);
			return Err(Error::BrokerClosed);
		}
		debug!(
			target = "pv.broker",
			active = self.counters.active.load(Ordering::SeqCst),
			queued,
			"task enqueued"
		);
		Ok(TaskHandle { rx: done_rx })
	}

	/// Queues `op` and waits for its outcome.
	pub async fn submit<F, Fut, T>(&self, op: F) -> Result<T>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = Result<T>> + Send + 'static,
		T: Send + 'static,
	{
		self.enqueue(op)?.await
	}

	pub fn stats(&self) -> BrokerStats {
		BrokerStats {
			active: self.counters.active.load(Ordering::SeqCst),
			queued: self.counters.queued.load(Ordering::SeqCst),
			ceiling: self.ceiling,
		}
	}

	pub fn ceiling(&self) -> usize {
		self.ceiling
	}
}

impl Default for AdmissionBroker {
	fn default() -> Self {
		Self::new(DEFAULT_CEILING)
	}
}

/// Completion handle for a queued task.
#[derive(Debug)]
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<T> {
	rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for TaskHandle<T> {
	type Output = Result<T>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.get_mut().rx)
			.poll(cx)
			.map(|received| received.unwrap_or_else(|_| Err(Error::BrokerClosed)))
	}
}

async fn run_scheduler(ceiling: usize, mut rx: mpsc::UnboundedReceiver<Task>, counters: Arc<Counters>) {
	let mut pending: VecDeque<Task> = VecDeque::new();
	let mut running: FuturesUnordered<TaskFuture> = FuturesUnordered::new();
	let mut accepting = true;

	loop {
		while running.len() < ceiling {
			let Some(task) = pending.pop_front() else {
				break;
			};
			running.push(task());
			counters.queued.fetch_sub(1, Ordering::SeqCst);
			counters.active.fetch_add(1, Ordering::SeqCst);
			debug!(
				target = "pv.broker",
				active = running.len(),
				queued = pending.len(),
				"task admitted"
			);
		}

		tokio::select! {
			received = rx.recv(), if accepting => match received {
				Some(task) => pending.push_back(task),
				None => accepting = false,
			},
			Some(()) = running.next(), if !running.is_empty() => {
				counters.active.fetch_sub(1, Ordering::SeqCst);
				debug!(
					target = "pv.broker",
					active = running.len(),
					queued = pending.len(),
					"task completed"
				);
			}
			else => break,
		}
	}

	debug!(target = "pv.broker", "admission broker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(msg) = panic.downcast_ref::<&str>() {
		(*msg).to_string()
	} else if let Some(msg) = panic.downcast_ref::<String>() {
		msg.clone()
	} else {
		"unknown panic payload".to_string()
	}
}
