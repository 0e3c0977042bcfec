use std::time::{Duration, Instant};

use crossbeam_channel::SendTimeoutError;
use pass_load_core::prelude::DelegatedShutdownListener;

use crate::context::UserValuesConstraint;
use crate::definition::DroppedIterations;
use crate::policy::ArrivalRate;
use crate::scheduler::sleep_until;
use crate::worker::WorkerPool;

/// How long a due iteration waits for a worker to become idle before the pool is grown or the
/// iteration is dropped.
const HANDOFF_WAIT: Duration = Duration::from_millis(5);

/// Start iterations at `rate` from `started` until `active_until`, or until the scenario is
/// stopped.
///
/// Work is handed to idle workers over a zero capacity channel, so a send only succeeds if a
/// worker is waiting for it, or starts waiting within [HANDOFF_WAIT]. When no worker is idle the
/// pool grows up to `max_vus`. A full pool with a worker outside of an iteration gets until the
/// next iteration is due to take the work. Otherwise the iteration is dropped.
pub(crate) fn dispatch<RV: UserValuesConstraint, V: UserValuesConstraint>(
    pool: &mut WorkerPool<RV, V>,
    rate: &ArrivalRate,
    started: Instant,
    active_until: Option<Instant>,
    stop_listener: &DelegatedShutdownListener,
    dropped_iterations: DroppedIterations,
    scenario_name: &str,
) {
    let (work_sender, work_receiver) = crossbeam_channel::bounded::<u64>(0);

    for _ in 0..rate.pre_allocated_vus {
        if let Err(e) = pool.spawn_arrival_worker(work_receiver.clone(), None) {
            log::error!("Failed to pre-allocate worker for scenario [{scenario_name}]: {e:?}");
            break;
        }
    }

    for iteration in 0u64.. {
        let due = started + rate.due_at(iteration);
        if active_until.is_some_and(|end| due >= end) {
            break;
        }
        if !sleep_until(due, stop_listener) {
            break;
        }

        match work_sender.send_timeout(iteration, HANDOFF_WAIT) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(iteration)) if pool.len() < rate.max_vus => {
                if let Err(e) = pool.spawn_arrival_worker(work_receiver.clone(), Some(iteration)) {
                    log::error!("Failed to start worker for scenario [{scenario_name}]: {e:?}");
                    drop_iteration(pool, iteration, dropped_iterations, scenario_name);
                }
            }
            Err(SendTimeoutError::Timeout(iteration)) if pool.stats().in_flight() < pool.len() => {
                // A worker is starting up or between iterations, it may take the work until the
                // next iteration is due.
                let next_due = started + rate.due_at(iteration + 1);
                if let Err(e) = work_sender.send_deadline(iteration, next_due) {
                    drop_iteration(pool, e.into_inner(), dropped_iterations, scenario_name);
                }
            }
            Err(SendTimeoutError::Timeout(iteration)) => {
                drop_iteration(pool, iteration, dropped_iterations, scenario_name);
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                // Not possible while this function holds a receiver.
                break;
            }
        }
    }

    if let Some(end) = active_until {
        sleep_until(end, stop_listener);
    }
}

fn drop_iteration<RV: UserValuesConstraint, V: UserValuesConstraint>(
    pool: &WorkerPool<RV, V>,
    iteration: u64,
    dropped_iterations: DroppedIterations,
    scenario_name: &str,
) {
    let dropped = pool.stats().record_dropped();
    match dropped_iterations {
        DroppedIterations::Record if dropped == 1 => {
            log::warn!(
                "Scenario [{scenario_name}] is dropping iterations because all {} workers are busy, consider raising max_vus",
                pool.len()
            );
        }
        _ => {
            log::debug!("Dropped iteration {iteration} of scenario [{scenario_name}]");
        }
    }
}
