use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;

use super::*;
use crate::task::task;

fn scheduler(concurrency: usize) -> TaskScheduler {
	TaskScheduler::new(
		SchedulerConfig::default()
			.with_concurrency(concurrency)
			.with_sweep_interval(None),
	)
}

/// Task that blocks until `gate` fires, then returns `payload`.
fn gated(gate: oneshot::Receiver<()>, payload: serde_json::Value) -> Task {
	task(move |_control| async move {
		let _ = gate.await;
		Ok(ResultProducer::json(payload))
	})
}

fn instant(payload: serde_json::Value) -> Task {
	task(move |_control| async move { Ok(ResultProducer::json(payload)) })
}

/// Yields until `id` reports `status`, panicking if it never does.
async fn wait_for_status(scheduler: &TaskScheduler, id: &TaskId, status: TaskStatus) {
	for _ in 0..200 {
		if scheduler.status(id).ok().map(|report| report.status) == Some(status) {
			return;
		}
		tokio::task::yield_now().await;
	}
	panic!(
		"task {id} never reached {status}, last seen {:?}",
		scheduler.status(id).ok().map(|report| report.status)
	);
}

fn assert_disjoint(listing: &TaskListing) {
	for id in &listing.queued_tasks {
		assert!(
			!listing.finished_tasks.contains(id),
			"task {id} present in both running and finished sets"
		);
	}
}

#[tokio::test]
async fn task_moves_from_waiting_to_finished() {
	let scheduler = scheduler(1);
	let (release_a, gate_a) = oneshot::channel();
	let a = scheduler.submit(gated(gate_a, json!("a")), None).unwrap();
	let b = scheduler.submit(instant(json!("b")), None).unwrap();

	wait_for_status(&scheduler, &a, TaskStatus::Running).await;
	assert_eq!(scheduler.status(&b).unwrap().status, TaskStatus::Waiting);
	assert_eq!(scheduler.status(&b).unwrap().message, "Task is waiting");
	assert!(matches!(scheduler.result(&a), Err(Error::NotFound(_))));

	let listing = scheduler.list();
	assert_eq!(listing.queued_tasks.len(), 2);
	assert!(listing.finished_tasks.is_empty());

	release_a.send(()).unwrap();
	wait_for_status(&scheduler, &b, TaskStatus::Finished).await;
	wait_for_status(&scheduler, &a, TaskStatus::Finished).await;

	assert_eq!(scheduler.result(&a).unwrap().outcome().unwrap(), json!("a"));
	assert_eq!(scheduler.result(&b).unwrap().outcome().unwrap(), json!("b"));
	// Results can be fetched repeatedly within the retention window.
	assert_eq!(scheduler.result(&a).unwrap().outcome().unwrap(), json!("a"));

	let listing = scheduler.list();
	assert!(listing.queued_tasks.is_empty());
	assert_eq!(listing.finished_tasks.len(), 2);
	assert_disjoint(&listing);
}

#[tokio::test]
async fn status_never_moves_backwards() {
	fn stage(status: TaskStatus) -> u8 {
		match status {
			TaskStatus::Queued | TaskStatus::Waiting => 0,
			TaskStatus::Running => 1,
			TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Cancelled => 2,
		}
	}

	let scheduler = scheduler(1);
	let (release_a, gate_a) = oneshot::channel();
	let (release_b, gate_b) = oneshot::channel();
	let a = scheduler.submit(gated(gate_a, json!(1)), None).unwrap();
	let b = scheduler.submit(gated(gate_b, json!(2)), None).unwrap();

	let mut seen = Vec::new();
	let mut release_a = Some(release_a);
	let mut release_b = Some(release_b);
	for step in 0..400 {
		let status = scheduler.status(&b).unwrap().status;
		seen.push(status);
		assert_disjoint(&scheduler.list());
		if status.is_terminal() {
			break;
		}
		if step == 20 {
			let _ = release_a.take().map(|tx| tx.send(()));
		}
		if step == 60 {
			let _ = release_b.take().map(|tx| tx.send(()));
		}
		tokio::task::yield_now().await;
	}

	assert!(seen.contains(&TaskStatus::Waiting));
	assert!(seen.contains(&TaskStatus::Running));
	assert_eq!(seen.last(), Some(&TaskStatus::Finished));
	assert!(seen.windows(2).all(|pair| stage(pair[0]) <= stage(pair[1])), "{seen:?}");
	assert_eq!(scheduler.status(&a).unwrap().status, TaskStatus::Finished);
}

#[tokio::test]
async fn concurrency_is_bounded() {
	let scheduler = scheduler(2);
	let mut releases = Vec::new();
	let mut ids = Vec::new();
	for n in 0..4 {
		let (release, gate) = oneshot::channel();
		releases.push(release);
		ids.push(scheduler.submit(gated(gate, json!(n)), None).unwrap());
	}

	let count = |status: TaskStatus| {
		ids.iter()
			.filter(|id| scheduler.status(id).unwrap().status == status)
			.count()
	};
	for _ in 0..50 {
		if count(TaskStatus::Running) == 2 {
			break;
		}
		tokio::task::yield_now().await;
	}
	for _ in 0..20 {
		tokio::task::yield_now().await;
	}
	assert_eq!(count(TaskStatus::Running), 2);
	assert_eq!(count(TaskStatus::Waiting), 2);

	for release in releases {
		let _ = release.send(());
	}
	for id in &ids {
		wait_for_status(&scheduler, id, TaskStatus::Finished).await;
	}
}

#[tokio::test]
async fn failures_are_stored_not_thrown() {
	let scheduler = scheduler(2);
	let failing = scheduler
		.submit(
			task(|_control| async move { Err(Error::operation_failed("order 0035928976 not found")) }),
			None,
		)
		.unwrap();
	let panicking = scheduler
		.submit(
			task(|_control| async move {
				if true {
					panic!("selector vanished");
				}
				Ok(ResultProducer::json(json!(null)))
			}),
			None,
		)
		.unwrap();

	wait_for_status(&scheduler, &failing, TaskStatus::Failed).await;
	wait_for_status(&scheduler, &panicking, TaskStatus::Failed).await;

	let err = scheduler.result(&failing).unwrap().outcome().unwrap_err();
	assert_eq!(err.to_string(), "order 0035928976 not found");
	let err = scheduler.result(&panicking).unwrap().outcome().unwrap_err();
	assert!(err.to_string().contains("selector vanished"), "{err}");

	// The scheduler keeps working afterwards.
	let ok = scheduler.submit(instant(json!("still alive")), None).unwrap();
	wait_for_status(&scheduler, &ok, TaskStatus::Finished).await;
}

#[tokio::test]
async fn cancellation_is_advisory() {
	let scheduler = scheduler(1);
	let (release_a, gate_a) = oneshot::channel();
	let a = scheduler.submit(gated(gate_a, json!("a")), None).unwrap();

	let body_ran = Arc::new(AtomicBool::new(false));
	let b = scheduler
		.submit(
			{
				let body_ran = Arc::clone(&body_ran);
				task(move |control| async move {
					body_ran.store(true, Ordering::SeqCst);
					let value = control.check_and_pass(json!("b"))?;
					Ok(ResultProducer::json(value))
				})
			},
			None,
		)
		.unwrap();

	wait_for_status(&scheduler, &a, TaskStatus::Running).await;
	assert_eq!(scheduler.status(&b).unwrap().status, TaskStatus::Waiting);
	assert_eq!(scheduler.cancel(&b), CancelOutcome::Cancelled);
	// Cancelling twice is still accepted while the task is known as running.
	assert_eq!(scheduler.cancel(&b), CancelOutcome::Cancelled);

	release_a.send(()).unwrap();
	wait_for_status(&scheduler, &b, TaskStatus::Failed).await;
	assert!(body_ran.load(Ordering::SeqCst), "cancelled task must still run");

	let err = scheduler.result(&b).unwrap().outcome().unwrap_err();
	assert!(err.is_cancelled());
	assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn cancel_finished_or_unknown_task() {
	let scheduler = scheduler(1);
	let id = scheduler.submit(instant(json!(1)), None).unwrap();
	wait_for_status(&scheduler, &id, TaskStatus::Finished).await;

	assert_eq!(scheduler.cancel(&id), CancelOutcome::Conflict);
	assert_eq!(scheduler.status(&id).unwrap().status, TaskStatus::Finished);
	assert_eq!(scheduler.cancel(&TaskId::from("nope")), CancelOutcome::NotFound);
	assert!(matches!(scheduler.status(&TaskId::from("nope")), Err(Error::NotFound(_))));
}

#[tokio::test]
async fn dependent_task_waits_for_dependency() {
	let scheduler = scheduler(2);
	let log = Arc::new(Mutex::new(Vec::new()));

	let (release_a, gate_a) = oneshot::channel::<()>();
	let a = scheduler
		.submit(
			{
				let log = Arc::clone(&log);
				task(move |_control| async move {
					let _ = gate_a.await;
					log.lock().push("a");
					Ok(ResultProducer::json(json!("a")))
				})
			},
			None,
		)
		.unwrap();

	let b = scheduler
		.submit(
			{
				let log = Arc::clone(&log);
				let scheduler = scheduler.clone();
				let a = a.clone();
				task(move |_control| async move {
					let seen = scheduler.status(&a).map(|report| report.status);
					log.lock().push("b");
					Ok(ResultProducer::json(json!(seen.ok())))
				})
			},
			Some(&a),
		)
		.unwrap();

	// B holds its slot while stalled on A.
	wait_for_status(&scheduler, &b, TaskStatus::Running).await;
	for _ in 0..20 {
		tokio::task::yield_now().await;
	}
	assert!(log.lock().is_empty());

	release_a.send(()).unwrap();
	wait_for_status(&scheduler, &b, TaskStatus::Finished).await;

	assert_eq!(*log.lock(), vec!["a", "b"]);
	assert_eq!(scheduler.result(&b).unwrap().outcome().unwrap(), json!("FINISHED"));
}

#[tokio::test]
async fn unknown_dependency_does_not_delay() {
	let scheduler = scheduler(1);
	let id = scheduler
		.submit(instant(json!("free")), Some(&TaskId::from("never-submitted")))
		.unwrap();
	wait_for_status(&scheduler, &id, TaskStatus::Finished).await;
}

#[tokio::test(start_paused = true)]
async fn results_expire_after_retention() {
	let scheduler = TaskScheduler::new(
		SchedulerConfig::default()
			.with_retention(Duration::from_secs(600))
			.with_sweep_interval(None),
	);
	let id = scheduler.submit(instant(json!("done")), None).unwrap();
	wait_for_status(&scheduler, &id, TaskStatus::Finished).await;

	tokio::time::advance(Duration::from_secs(599)).await;
	assert_eq!(scheduler.sweep(), 0);
	assert!(scheduler.result(&id).is_ok());

	tokio::time::advance(Duration::from_secs(2)).await;
	// A submission sweeps opportunistically.
	let other = scheduler.submit(instant(json!("next")), None).unwrap();
	assert!(matches!(scheduler.result(&id), Err(Error::NotFound(_))));
	assert!(matches!(scheduler.status(&id), Err(Error::NotFound(_))));
	wait_for_status(&scheduler, &other, TaskStatus::Finished).await;
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_evicts_idle_results() {
	let scheduler = TaskScheduler::new(
		SchedulerConfig::default()
			.with_retention(Duration::from_secs(60))
			.with_sweep_interval(Some(Duration::from_secs(30))),
	);
	let id = scheduler.submit(instant(json!(1)), None).unwrap();
	wait_for_status(&scheduler, &id, TaskStatus::Finished).await;

	tokio::time::sleep(Duration::from_secs(95)).await;
	assert!(scheduler.list().finished_tasks.is_empty());
	assert!(matches!(scheduler.result(&id), Err(Error::NotFound(_))));
	scheduler.shutdown();
}

#[tokio::test]
async fn colliding_ids_exhaust() {
	let scheduler = TaskScheduler::with_id_source(
		SchedulerConfig::default().with_sweep_interval(None),
		Arc::new(|| TaskId::from("fixed")),
	);
	let (_release, gate) = oneshot::channel();
	let first = scheduler.submit(gated(gate, json!(1)), None).unwrap();
	assert_eq!(first.as_str(), "fixed");

	let err = scheduler.submit(instant(json!(2)), None).unwrap_err();
	assert!(matches!(err, Error::IdentityExhausted { attempts: 10, .. }), "{err:?}");
	assert_eq!(scheduler.list().queued_tasks, vec!["fixed".to_string()]);
}

#[tokio::test]
async fn immediate_mode_bypasses_queue() {
	let scheduler = scheduler(1);
	let (_release, gate) = oneshot::channel();
	scheduler.submit(gated(gate, json!("blocker")), None).unwrap();

	let submission = scheduler
		.accept(
			instant(json!({"confirmed": true})),
			SubmitOptions {
				immediate: true,
				..Default::default()
			},
		)
		.await
		.unwrap();
	match submission {
		Submission::Completed(producer) => {
			assert_eq!(producer.outcome().unwrap(), json!({"confirmed": true}))
		}
		Submission::Queued(id) => panic!("Expected inline completion, got queued {id}"),
	}
	assert_eq!(scheduler.list().queued_tasks.len(), 1);

	let queued = scheduler.accept(instant(json!(1)), SubmitOptions::default()).await.unwrap();
	assert!(matches!(queued, Submission::Queued(_)));
}

#[tokio::test]
async fn immediate_failure_becomes_failure_producer() {
	let scheduler = scheduler(1);
	let producer = scheduler
		.execute_immediately(task(|control| async move {
			Err(control.create_cancel_error(Some("stopped")))
		}))
		.await;
	let err = producer.outcome().unwrap_err();
	assert!(err.is_cancelled());
	assert_eq!(err.to_string(), "stopped");
}

#[tokio::test]
async fn shutdown_rejects_work_and_flags_running_tasks() {
	let scheduler = scheduler(1);
	let (control_tx, control_rx) = oneshot::channel();
	let running = scheduler
		.submit(
			task(move |control| async move {
				let _ = control_tx.send(control);
				std::future::pending::<()>().await;
				Ok(ResultProducer::json(json!(null)))
			}),
			None,
		)
		.unwrap();
	let control = control_rx.await.unwrap();
	wait_for_status(&scheduler, &running, TaskStatus::Running).await;

	scheduler.shutdown();
	scheduler.shutdown();

	assert!(scheduler.is_shut_down());
	assert!(control.is_cancelled());
	assert_eq!(scheduler.list(), TaskListing::default());
	assert!(matches!(
		scheduler.submit(instant(json!(1)), None),
		Err(Error::ShutDown)
	));
	assert!(matches!(
		scheduler
			.accept(
				instant(json!(1)),
				SubmitOptions {
					immediate: true,
					..Default::default()
				}
			)
			.await,
		Err(Error::ShutDown)
	));
}

#[tokio::test]
async fn status_reports_progress() {
	let scheduler = scheduler(1);
	let (release, gate) = oneshot::channel::<()>();
	let id = scheduler
		.submit(
			task(move |control| async move {
				control.set_progress(300);
				control.set_progress_message("opening purchase order");
				let _ = gate.await;
				Ok(ResultProducer::json(json!(null)))
			}),
			None,
		)
		.unwrap();

	for _ in 0..50 {
		if scheduler.status(&id).unwrap().progress == 300 {
			break;
		}
		tokio::task::yield_now().await;
	}
	let report = scheduler.status(&id).unwrap();
	assert_eq!(report.status, TaskStatus::Running);
	assert_eq!(report.progress, 300);
	assert_eq!(report.progress_message.as_deref(), Some("opening purchase order"));

	let message = TaskStatusMessage::from(report);
	assert_eq!(message.task_id, id.to_string());
	assert_eq!(message.progress, Some(300));

	release.send(()).unwrap();
	wait_for_status(&scheduler, &id, TaskStatus::Finished).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_start_in_submission_order_across_threads() {
	let scheduler = scheduler(1);
	let (release, gate) = oneshot::channel();
	let blocker = scheduler.submit(gated(gate, json!("blocker")), None).unwrap();
	let started = Arc::new(Mutex::new(Vec::new()));

	let submitter = {
		let scheduler = scheduler.clone();
		let started = Arc::clone(&started);
		tokio::spawn(async move {
			let mut ids = Vec::new();
			for index in 0..5 {
				let started = Arc::clone(&started);
				let id = scheduler
					.submit(
						task(move |_control| async move {
							started.lock().push(index);
							Ok(ResultProducer::json(json!(index)))
						}),
						None,
					)
					.unwrap();
				ids.push(id);
			}
			ids
		})
	};
	let ids = submitter.await.unwrap();
	release.send(()).unwrap();

	for _ in 0..500 {
		if ids.iter().all(|id| scheduler.result(id).is_ok()) {
			break;
		}
		tokio::time::sleep(Duration::from_millis(1)).await;
	}
	assert!(scheduler.result(&blocker).is_ok());
	assert_eq!(*started.lock(), vec![0, 1, 2, 3, 4]);
	scheduler.shutdown();
}
