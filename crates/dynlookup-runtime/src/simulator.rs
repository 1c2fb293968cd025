#![forbid(unsafe_code)]

//! Deterministic program simulator for testing.
//!
//! `ProgramSimulator` runs a [`Model`] on a virtual clock without threads.
//! Delayed messages fire only when the test advances time, and background
//! tasks can either complete immediately or wait in a queue until the test
//! completes them, in any order. That makes races between timers and
//! responses reproducible: a test can issue two fetches, complete the newer
//! one first, then deliver the older one.
//!
//! # Example
//!
//! ```ignore
//! use dynlookup_runtime::simulator::{ProgramSimulator, TaskMode};
//!
//! let mut sim = ProgramSimulator::new(model).with_task_mode(TaskMode::Deferred);
//! sim.init();
//! sim.send(Msg::InputChanged("ac".into()));
//! sim.advance(Duration::from_millis(350));
//! assert_eq!(sim.pending_task_names(), vec!["fetch"]);
//! sim.complete_next_task();
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use crate::program::{Cmd, Model};
use crate::subscription::SubId;

/// Record of a command that was executed during simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdRecord {
    /// Message sent to model (not stored, just noted).
    Msg,
    /// Batch of commands.
    Batch(usize),
    /// Delayed message scheduled.
    After(Duration),
    /// Background task issued, with its name.
    Task(Option<String>),
    /// Output emitted to the host.
    Emit,
    /// Log message emitted.
    Log(String),
}

/// How `Cmd::Task` is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskMode {
    /// Run the closure inline and dispatch its message at once.
    #[default]
    Immediate,
    /// Queue the task until the test completes it.
    Deferred,
}

/// A task waiting for the test to complete it.
pub struct PendingTask<M> {
    /// Name from the task spec.
    pub name: Option<String>,
    /// Virtual time at which the task was issued.
    pub issued_at: Duration,
    run: Box<dyn FnOnce() -> M + Send>,
}

impl<M> std::fmt::Debug for PendingTask<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTask")
            .field("name", &self.name)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Deterministic simulator for [`Model`] testing.
pub struct ProgramSimulator<M: Model> {
    model: M,
    now: Duration,
    timers: BTreeMap<(Duration, u64), M::Message>,
    timer_seq: u64,
    task_mode: TaskMode,
    tasks: Vec<PendingTask<M::Message>>,
    outputs: Vec<M::Output>,
    logs: Vec<String>,
    command_log: Vec<CmdRecord>,
    subscriptions: Vec<SubId>,
}

impl<M: Model> ProgramSimulator<M> {
    /// Create a new simulator with the given model.
    ///
    /// The model is not initialized until [`init`](Self::init) is called.
    pub fn new(model: M) -> Self {
        Self {
            model,
            now: Duration::ZERO,
            timers: BTreeMap::new(),
            timer_seq: 0,
            task_mode: TaskMode::Immediate,
            tasks: Vec::new(),
            outputs: Vec::new(),
            logs: Vec::new(),
            command_log: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Select how tasks are executed.
    #[must_use]
    pub fn with_task_mode(mut self, mode: TaskMode) -> Self {
        self.task_mode = mode;
        self
    }

    /// Call `Model::init()` and execute the returned commands.
    pub fn init(&mut self) {
        let cmd = self.model.init();
        self.execute_cmd(cmd);
        self.refresh_subscriptions();
    }

    /// Send a specific message to the model.
    pub fn send(&mut self, msg: M::Message) {
        let cmd = self.model.update(msg);
        self.execute_cmd(cmd);
        self.refresh_subscriptions();
    }

    /// Advance the virtual clock, firing every delayed message that falls
    /// due on the way in due-time order.
    pub fn advance(&mut self, by: Duration) {
        let target = self.now + by;
        while let Some(entry) = self.timers.first_entry() {
            let (due, _) = *entry.key();
            if due > target {
                break;
            }
            let msg = entry.remove();
            self.now = due;
            self.send(msg);
        }
        self.now = target;
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of delayed messages not yet delivered.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Virtual time at which the next delayed message fires.
    pub fn next_timer_due(&self) -> Option<Duration> {
        self.timers.keys().next().map(|(due, _)| *due)
    }

    /// Tasks waiting for completion (deferred mode).
    pub fn pending_tasks(&self) -> &[PendingTask<M::Message>] {
        &self.tasks
    }

    /// Names of waiting tasks, in issue order. Unnamed tasks show as `"task"`.
    pub fn pending_task_names(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .map(|t| t.name.as_deref().unwrap_or("task"))
            .collect()
    }

    /// Run the waiting task at `index` and dispatch its message.
    ///
    /// Returns `false` if there is no such task.
    pub fn complete_task(&mut self, index: usize) -> bool {
        if index >= self.tasks.len() {
            return false;
        }
        let task = self.tasks.remove(index);
        let msg = (task.run)();
        self.send(msg);
        true
    }

    /// Complete the oldest waiting task.
    pub fn complete_next_task(&mut self) -> bool {
        self.complete_task(0)
    }

    /// Complete the newest waiting task.
    pub fn complete_last_task(&mut self) -> bool {
        match self.tasks.len() {
            0 => false,
            n => self.complete_task(n - 1),
        }
    }

    /// Complete waiting tasks, oldest first, until none remain. Tasks
    /// issued while completing are completed too.
    pub fn complete_all_tasks(&mut self) -> usize {
        let mut completed = 0;
        while self.complete_next_task() {
            completed += 1;
        }
        completed
    }

    /// Drop a waiting task without delivering its message.
    pub fn abandon_task(&mut self, index: usize) -> bool {
        if index >= self.tasks.len() {
            return false;
        }
        self.tasks.remove(index);
        true
    }

    /// Outputs emitted so far.
    pub fn outputs(&self) -> &[M::Output] {
        &self.outputs
    }

    /// Drain outputs emitted so far.
    pub fn take_outputs(&mut self) -> Vec<M::Output> {
        std::mem::take(&mut self.outputs)
    }

    /// Get a reference to the model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Get a mutable reference to the model.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Get all log messages emitted via `Cmd::Log`.
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Get the command execution log.
    pub fn command_log(&self) -> &[CmdRecord] {
        &self.command_log
    }

    /// Ids the model currently declares as subscriptions.
    ///
    /// The simulator does not run subscriptions; tests deliver their
    /// messages with [`send`](Self::send).
    pub fn active_subscriptions(&self) -> &[SubId] {
        &self.subscriptions
    }

    fn refresh_subscriptions(&mut self) {
        let mut ids: Vec<SubId> = self.model.subscriptions().iter().map(|s| s.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        self.subscriptions = ids;
    }

    /// Execute a command without I/O.
    fn execute_cmd(&mut self, cmd: Cmd<M::Message, M::Output>) {
        match cmd {
            Cmd::None => {}
            Cmd::Msg(m) => {
                self.command_log.push(CmdRecord::Msg);
                let cmd = self.model.update(m);
                self.execute_cmd(cmd);
            }
            Cmd::Batch(cmds) => {
                self.command_log.push(CmdRecord::Batch(cmds.len()));
                for c in cmds {
                    self.execute_cmd(c);
                }
            }
            Cmd::After(delay, msg) => {
                self.command_log.push(CmdRecord::After(delay));
                self.timer_seq += 1;
                self.timers.insert((self.now + delay, self.timer_seq), msg);
            }
            Cmd::Task(spec, f) => {
                self.command_log.push(CmdRecord::Task(spec.name.clone()));
                match self.task_mode {
                    TaskMode::Immediate => {
                        let msg = f();
                        let cmd = self.model.update(msg);
                        self.execute_cmd(cmd);
                    }
                    TaskMode::Deferred => self.tasks.push(PendingTask {
                        name: spec.name,
                        issued_at: self.now,
                        run: f,
                    }),
                }
            }
            Cmd::Emit(output) => {
                self.command_log.push(CmdRecord::Emit);
                self.outputs.push(output);
            }
            Cmd::Log(text) => {
                self.command_log.push(CmdRecord::Log(text.clone()));
                self.logs.push(text);
            }
        }
    }
}
