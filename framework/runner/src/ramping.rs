use std::time::{Duration, Instant};

use pass_load_core::prelude::DelegatedShutdownListener;

use crate::context::UserValuesConstraint;
use crate::policy::RampingVus;
use crate::scheduler::sleep_until;
use crate::worker::WorkerPool;

pub(crate) const CONTROLLER_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Adjustment {
    Hold,
    Start(usize),
    Retire(usize),
}

pub(crate) fn adjustment(active: usize, target: usize) -> Adjustment {
    match active.cmp(&target) {
        std::cmp::Ordering::Less => Adjustment::Start(target - active),
        std::cmp::Ordering::Greater => Adjustment::Retire(active - target),
        std::cmp::Ordering::Equal => Adjustment::Hold,
    }
}

/// Keep the number of looping workers at the ramp target until `active_until`, or until the
/// scenario is stopped.
pub(crate) fn control<RV: UserValuesConstraint, V: UserValuesConstraint>(
    pool: &mut WorkerPool<RV, V>,
    ramp: &RampingVus,
    started: Instant,
    active_until: Option<Instant>,
    stop_listener: &DelegatedShutdownListener,
    scenario_name: &str,
) {
    for tick in 1u32.. {
        let now = Instant::now();
        if active_until.is_some_and(|end| now >= end) {
            break;
        }

        pool.reap();
        let target = ramp.target_at(now - started);
        match adjustment(pool.len(), target) {
            Adjustment::Hold => {}
            Adjustment::Start(count) => {
                log::trace!("Scenario [{scenario_name}] starting {count} workers, target {target}");
                for _ in 0..count {
                    if let Err(e) = pool.spawn_looping_worker() {
                        log::error!("Failed to start worker for scenario [{scenario_name}]: {e:?}");
                        break;
                    }
                }
            }
            Adjustment::Retire(count) => {
                log::trace!("Scenario [{scenario_name}] retiring {count} workers, target {target}");
                pool.retire_newest(count);
            }
        }

        let next_tick = started + CONTROLLER_TICK * tick;
        let next_tick = active_until.map_or(next_tick, |end| next_tick.min(end));
        if !sleep_until(next_tick, stop_listener) {
            break;
        }
    }
}
