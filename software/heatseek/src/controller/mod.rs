//! Cooperative tick loop running the turret's tasks

mod context;

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::share::CancelToken;
use crate::task::{Task, TaskStatus};

pub use context::OpCtx;

/// Source of the tick time stamps handed to tasks
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Clock {
    /// Tick `n` happens at `n * tick_ms`, with no sleeping
    #[default]
    Simulated,

    /// Tick `n` is scheduled at `n * tick_ms` after the start of the run,
    /// sleeping until each deadline
    Wall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SlotState {
    Active,
    Finished,
    Faulted,
}

struct TaskSlot {
    task: Box<dyn Task>,
    state: SlotState,
}

/// How a run ended
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed
    pub ticks: u64,

    /// Time stamp of the last tick, ms
    pub last_ms: u64,

    /// Tasks that reported they were done
    pub finished: Vec<String>,

    /// Tasks that failed, with the reason
    pub faulted: Vec<(String, String)>,

    pub cancelled: bool,

    /// The tick limit stopped the run
    pub timed_out: bool,
}

/// Runs tasks round-robin once per tick, highest priority first.
///
/// A task fault is caught here: it is logged, the task is dropped from the
/// schedule and every other task keeps running. The run ends when all
/// foreground tasks are done, on cancellation, or at the tick limit.
pub struct Controller {
    ctx: OpCtx,
    clock: Clock,
    cancel: CancelToken,
    tasks: Vec<TaskSlot>,
}

impl Controller {
    /// Initialize a controller with no tasks
    pub fn new(ctx: OpCtx) -> Self {
        Self {
            ctx,
            clock: Clock::default(),
            cancel: CancelToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ctx(&self) -> &OpCtx {
        &self.ctx
    }

    /// Register a task. Tasks of equal priority run in insertion order.
    pub fn add_task(&mut self, task: Box<dyn Task>) {
        self.tasks.push(TaskSlot {
            task,
            state: SlotState::Active,
        });
        self.tasks
            .sort_by_key(|slot| std::cmp::Reverse(slot.task.priority()));
    }

    /// Token that stops the run at the start of the next tick
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Set up logging for this op under the op dir
    pub fn init_logging(&self) -> Result<(), crate::logging::LoggingError> {
        let (path, _) = crate::logging::init_logging(&self.ctx.op_dir, &self.ctx.op_name)?;
        info!("Logging to {path:?}");
        Ok(())
    }

    /// Run until done. Tasks stay registered so the controller can be rerun.
    pub fn run(&mut self) -> RunSummary {
        let tick_ms = self.ctx.tick_ms.max(1);
        let start = Instant::now();
        let mut summary = RunSummary::default();

        info!(
            "Running op `{}` with {} task(s) at {tick_ms} ms per tick",
            self.ctx.op_name,
            self.tasks.len()
        );
        for slot in self.tasks.iter_mut() {
            slot.state = SlotState::Active;
        }

        let mut tick: u64 = 0;
        loop {
            let now_ms = tick.saturating_mul(tick_ms);
            if self.clock == Clock::Wall {
                let deadline = Duration::from_millis(now_ms);
                let elapsed = start.elapsed();
                if deadline > elapsed {
                    std::thread::sleep(deadline - elapsed);
                } else if tick > 0 {
                    debug!("Tick {tick} late by {:?}", elapsed - deadline);
                }
            }

            if self.cancel.is_cancelled() {
                warn!("Run cancelled at tick {tick}");
                for slot in self.tasks.iter_mut() {
                    if slot.state == SlotState::Active {
                        slot.task.cancel(now_ms);
                    }
                }
                summary.cancelled = true;
                break;
            }

            if self.ctx.max_ticks.is_some_and(|max_ticks| tick >= max_ticks) {
                warn!("Tick limit reached at tick {tick}");
                for slot in self.tasks.iter_mut() {
                    if slot.state == SlotState::Active {
                        slot.task.cancel(now_ms);
                    }
                }
                summary.timed_out = true;
                break;
            }

            for slot in self.tasks.iter_mut() {
                if slot.state != SlotState::Active {
                    continue;
                }
                match slot.task.poll(now_ms) {
                    Ok(TaskStatus::Running) => {}
                    Ok(TaskStatus::Finished) => {
                        info!("Task `{}` finished", slot.task.name());
                        slot.state = SlotState::Finished;
                        summary.finished.push(slot.task.name().to_owned());
                    }
                    Err(e) => {
                        error!("Task `{}` faulted: {e}", slot.task.name());
                        slot.state = SlotState::Faulted;
                        summary
                            .faulted
                            .push((slot.task.name().to_owned(), e.to_string()));
                    }
                }
            }

            summary.ticks = tick + 1;
            summary.last_ms = now_ms;
            tick += 1;

            let foreground_active = self
                .tasks
                .iter()
                .any(|slot| slot.state == SlotState::Active && !slot.task.background());
            if !foreground_active {
                break;
            }
        }

        info!("Run ended after {} tick(s)", summary.ticks);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskError;
    use std::sync::{Arc, Mutex};

    /// Finishes after a fixed number of polls, logging each poll
    struct Countdown {
        name: String,
        priority: i32,
        left: u32,
        log: Arc<Mutex<Vec<(String, u64)>>>,
        cancelled: Arc<Mutex<bool>>,
    }

    impl Task for Countdown {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn poll(&mut self, now_ms: u64) -> Result<TaskStatus, TaskError> {
            self.log.lock().unwrap().push((self.name.clone(), now_ms));
            if self.left == 0 {
                return Ok(TaskStatus::Finished);
            }
            self.left -= 1;
            Ok(TaskStatus::Running)
        }

        fn cancel(&mut self, _now_ms: u64) {
            *self.cancelled.lock().unwrap() = true;
        }
    }

    struct Faulty;

    impl Task for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn poll(&mut self, _now_ms: u64) -> Result<TaskStatus, TaskError> {
            Err(crate::sequencer::SequenceFault::SlewTimeout(1).into())
        }
    }

    fn countdown(
        name: &str,
        priority: i32,
        left: u32,
        log: &Arc<Mutex<Vec<(String, u64)>>>,
    ) -> (Box<dyn Task>, Arc<Mutex<bool>>) {
        let cancelled = Arc::new(Mutex::new(false));
        let task = Countdown {
            name: name.to_owned(),
            priority,
            left,
            log: log.clone(),
            cancelled: cancelled.clone(),
        };
        (Box::new(task), cancelled)
    }

    #[test]
    fn runs_by_priority_until_done() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(OpCtx::new(10));
        controller.add_task(countdown("low", 0, 1, &log).0);
        controller.add_task(countdown("high", 5, 2, &log).0);

        let summary = controller.run();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.last_ms, 20);
        assert_eq!(summary.finished, vec!["low".to_owned(), "high".to_owned()]);

        let log = log.lock().unwrap();
        assert_eq!(log[0], ("high".to_owned(), 0));
        assert_eq!(log[1], ("low".to_owned(), 0));
        assert_eq!(log.last(), Some(&("high".to_owned(), 20)));
    }

    #[test]
    fn faults_are_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(OpCtx::new(10));
        controller.add_task(Box::new(Faulty));
        controller.add_task(countdown("worker", 0, 3, &log).0);

        let summary = controller.run();
        assert_eq!(summary.faulted.len(), 1);
        assert_eq!(summary.faulted[0].0, "faulty");
        assert_eq!(summary.finished, vec!["worker".to_owned()]);
        assert_eq!(summary.ticks, 4);
    }

    #[test]
    fn cancellation_reaches_active_tasks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(OpCtx::new(10));
        let (task, cancelled) = countdown("forever", 0, u32::MAX, &log);
        controller.add_task(task);

        controller.cancel_token().cancel();
        let summary = controller.run();
        assert!(summary.cancelled);
        assert_eq!(summary.ticks, 0);
        assert!(*cancelled.lock().unwrap());
    }

    #[test]
    fn tick_limit_stops_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(OpCtx::new(10).with_max_ticks(50));
        let (task, cancelled) = countdown("forever", 0, u32::MAX, &log);
        controller.add_task(task);

        let summary = controller.run();
        assert!(summary.timed_out);
        assert_eq!(summary.ticks, 50);
        assert!(*cancelled.lock().unwrap());
    }

    #[test]
    fn wall_clock_paces_ticks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = Controller::new(OpCtx::new(5)).with_clock(Clock::Wall);
        controller.add_task(countdown("paced", 0, 4, &log).0);

        let start = Instant::now();
        let summary = controller.run();
        assert_eq!(summary.ticks, 5);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
