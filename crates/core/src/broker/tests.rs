use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::*;

async fn wait_until(mut cond: impl FnMut() -> bool) {
	for _ in 0..500 {
		if cond() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(2)).await;
	}
	panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn active_count_never_exceeds_ceiling() {
	let broker = AdmissionBroker::new(3);
	let current = Arc::new(AtomicUsize::new(0));
	let peak = Arc::new(AtomicUsize::new(0));

	let mut handles = Vec::new();
	for _ in 0..12 {
		let current = Arc::clone(&current);
		let peak = Arc::clone(&peak);
		let observer = broker.clone();
		handles.push(
			broker
				.enqueue(move || async move {
					let now = current.fetch_add(1, Ordering::SeqCst) + 1;
					peak.fetch_max(now, Ordering::SeqCst);
					assert!(observer.stats().active <= 3);
					tokio::time::sleep(Duration::from_millis(10)).await;
					current.fetch_sub(1, Ordering::SeqCst);
					Ok(())
				})
				.unwrap(),
		);
	}

	for handle in handles {
		handle.await.unwrap();
	}

	assert_eq!(peak.load(Ordering::SeqCst), 3);
	assert_eq!(broker.stats().active, 0);
	assert_eq!(broker.stats().queued, 0);
}

#[tokio::test]
async fn tasks_start_in_submission_order() {
	let broker = AdmissionBroker::new(2);
	let started = Arc::new(Mutex::new(Vec::new()));

	let mut handles = Vec::new();
	for i in 0..7usize {
		let started = Arc::clone(&started);
		handles.push(
			broker
				.enqueue(move || async move {
					started.lock().push(i);
					// Later tasks finish first so completion order differs from start order.
					tokio::time::sleep(Duration::from_millis(((7 - i) * 3) as u64)).await;
					Ok(i)
				})
				.unwrap(),
		);
	}

	let mut results = Vec::new();
	for handle in handles {
		results.push(handle.await.unwrap());
	}

	assert_eq!(*started.lock(), (0..7).collect::<Vec<_>>());
	assert_eq!(results, (0..7).collect::<Vec<_>>());
}

#[tokio::test]
async fn single_slot_runs_fast_task_after_slow_one() {
	let broker = AdmissionBroker::new(1);
	let events = Arc::new(Mutex::new(Vec::new()));

	let slow_events = Arc::clone(&events);
	let slow = broker
		.enqueue(move || async move {
			slow_events.lock().push("A start");
			tokio::time::sleep(Duration::from_millis(40)).await;
			slow_events.lock().push("A end");
			Ok("A")
		})
		.unwrap();

	let fast_events = Arc::clone(&events);
	let fast = broker
		.enqueue(move || async move {
			fast_events.lock().push("B start");
			Ok("B")
		})
		.unwrap();

	assert_eq!(fast.await.unwrap(), "B");
	assert_eq!(slow.await.unwrap(), "A");
	assert_eq!(*events.lock(), vec!["A start", "A end", "B start"]);
}

#[tokio::test]
async fn failure_is_delivered_only_to_its_own_handle() {
	let broker = AdmissionBroker::new(1);

	let failing = broker
		.enqueue(|| async { Err::<(), _>(Error::acquisition("site unreachable")) })
		.unwrap();
	let healthy = broker.enqueue(|| async { Ok(7) }).unwrap();

	assert!(matches!(failing.await, Err(Error::Acquisition(msg)) if msg == "site unreachable"));
	assert_eq!(healthy.await.unwrap(), 7);
}

#[tokio::test]
async fn panicking_task_does_not_stop_the_scheduler() {
	let broker = AdmissionBroker::new(1);

	let panicking = broker
		.enqueue(|| async {
			if true {
				panic!("driver crashed");
			}
			Ok(())
		})
		.unwrap();
	let after = broker.enqueue(|| async { Ok("still running") }).unwrap();

	match panicking.await {
		Err(Error::TaskPanicked(msg)) => assert_eq!(msg, "driver crashed"),
		other => panic!("expected TaskPanicked, got {other:?}"),
	}
	assert_eq!(after.await.unwrap(), "still running");
	assert_eq!(broker.stats().active, 0);
}

#[tokio::test]
async fn stats_report_queued_and_active_counts() {
	let broker = AdmissionBroker::new(1);
	let (gate_tx, gate_rx) = oneshot::channel::<()>();

	let blocker = broker
		.enqueue(move || async move {
			let _ = gate_rx.await;
			Ok(())
		})
		.unwrap();
	let waiting: Vec<_> = (0..2).map(|_| broker.enqueue(|| async { Ok(()) }).unwrap()).collect();

	wait_until(|| broker.stats().active == 1).await;
	assert_eq!(
		broker.stats(),
		BrokerStats {
			active: 1,
			queued: 2,
			ceiling: 1
		}
	);

	gate_tx.send(()).unwrap();
	blocker.await.unwrap();
	for handle in waiting {
		handle.await.unwrap();
	}
	wait_until(|| broker.stats().active == 0).await;
	assert_eq!(broker.stats().queued, 0);
}

#[tokio::test]
async fn dropped_handle_does_not_cancel_the_task() {
	let broker = AdmissionBroker::new(1);
	let ran = Arc::new(AtomicUsize::new(0));

	let counter = Arc::clone(&ran);
	drop(
		broker
			.enqueue(move || async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok(())
			})
			.unwrap(),
	);

	broker.submit(|| async { Ok(()) }).await.unwrap();
	assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn zero_ceiling_is_rejected() {
	assert!(matches!(AdmissionBroker::try_new(0), Err(Error::InvalidConfig(_))));
	assert_eq!(AdmissionBroker::new(0).ceiling(), 1);
	assert_eq!(AdmissionBroker::default().stats().ceiling, DEFAULT_CEILING);
}
