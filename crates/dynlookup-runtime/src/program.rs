#![forbid(unsafe_code)]

//! Elm-style runtime for interactive controls.
//!
//! A control keeps its state in a [`Model`]. Every input reaches it as a
//! message through [`Model::update`], which mutates the state and returns a
//! [`Cmd`] describing side effects: delayed messages, background tasks,
//! outputs for the host. The transition itself performs no I/O, so the same
//! model runs unchanged under the threaded [`Program`] driver and under the
//! deterministic [`ProgramSimulator`](crate::simulator::ProgramSimulator).
//!
//! # Example
//!
//! ```ignore
//! use dynlookup_runtime::program::{Cmd, Model};
//!
//! struct Echo {
//!     seen: usize,
//! }
//!
//! impl Model for Echo {
//!     type Message = String;
//!     type Output = String;
//!
//!     fn update(&mut self, msg: String) -> Cmd<String, String> {
//!         self.seen += 1;
//!         Cmd::emit(msg)
//!     }
//! }
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, debug_span, error, trace};

use crate::subscription::{SubId, Subscription, SubscriptionManager};

/// Application state plus its transition function.
pub trait Model: Sized {
    /// Inputs delivered to [`update`](Model::update).
    type Message: Send + 'static;

    /// Notifications the model raises for its host.
    type Output: Send + 'static;

    /// Startup commands. Called once before any message.
    fn init(&mut self) -> Cmd<Self::Message, Self::Output> {
        Cmd::none()
    }

    /// Apply one message and describe the resulting side effects.
    fn update(&mut self, msg: Self::Message) -> Cmd<Self::Message, Self::Output>;

    /// Declare active subscriptions.
    ///
    /// Called after each `update()`. The runtime compares the returned set
    /// (by `SubId`) against currently running subscriptions and starts/stops
    /// as needed. Returning an empty vec stops all subscriptions.
    fn subscriptions(&self) -> Vec<Box<dyn Subscription<Self::Message>>> {
        vec![]
    }
}

/// Scheduling metadata for background tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSpec {
    /// Optional task name for logging and test inspection.
    pub name: Option<String>,
}

impl TaskSpec {
    /// Attach a task name for diagnostics.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Side effects returned from `init()` and `update()`.
#[derive(Default)]
pub enum Cmd<M, O> {
    /// No operation.
    #[default]
    None,
    /// Execute several commands in order.
    Batch(Vec<Cmd<M, O>>),
    /// Deliver a message to the model immediately.
    Msg(M),
    /// Deliver a message after a delay.
    ///
    /// Delayed messages cannot be withdrawn. Owners that need cancellation
    /// tag the message and ignore it on arrival (see
    /// [`DebounceScheduler`](crate::debounce::DebounceScheduler)).
    After(Duration, M),
    /// Run a blocking operation off the update path.
    ///
    /// The return value is sent back as a message to the model.
    Task(TaskSpec, Box<dyn FnOnce() -> M + Send>),
    /// Hand a notification to the host.
    Emit(O),
    /// Record a diagnostic line.
    Log(String),
}

impl<M: std::fmt::Debug, O: std::fmt::Debug> std::fmt::Debug for Cmd<M, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Batch(cmds) => f.debug_tuple("Batch").field(cmds).finish(),
            Self::Msg(m) => f.debug_tuple("Msg").field(m).finish(),
            Self::After(d, m) => f.debug_tuple("After").field(d).field(m).finish(),
            Self::Task(spec, _) => f.debug_struct("Task").field("spec", spec).finish(),
            Self::Emit(o) => f.debug_tuple("Emit").field(o).finish(),
            Self::Log(s) => f.debug_tuple("Log").field(s).finish(),
        }
    }
}

impl<M, O> Cmd<M, O> {
    /// Create a no-op command.
    #[inline]
    pub fn none() -> Self {
        Self::None
    }

    /// Create a message command.
    #[inline]
    pub fn msg(m: M) -> Self {
        Self::Msg(m)
    }

    /// Deliver `m` after `delay`.
    #[inline]
    pub fn after(delay: Duration, m: M) -> Self {
        Self::After(delay, m)
    }

    /// Create an output command.
    #[inline]
    pub fn emit(output: O) -> Self {
        Self::Emit(output)
    }

    /// Create a log command.
    #[inline]
    pub fn log(msg: impl Into<String>) -> Self {
        Self::Log(msg.into())
    }

    /// Create a batch of commands.
    ///
    /// `None` entries are dropped; an empty batch is `None` and a single
    /// command is returned unwrapped.
    pub fn batch(cmds: Vec<Self>) -> Self {
        let mut cmds: Vec<Self> = cmds.into_iter().filter(|c| !c.is_none()).collect();
        match cmds.len() {
            0 => Self::None,
            1 => cmds.pop().unwrap_or(Self::None),
            _ => Self::Batch(cmds),
        }
    }

    /// Create a background task command.
    pub fn task<F>(f: F) -> Self
    where
        F: FnOnce() -> M + Send + 'static,
    {
        Self::Task(TaskSpec::default(), Box::new(f))
    }

    /// Create a named background task command.
    pub fn task_named<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> M + Send + 'static,
    {
        Self::Task(TaskSpec::default().with_name(name), Box::new(f))
    }

    /// Whether this is the no-op command.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Return a stable name for tracing.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Batch(_) => "Batch",
            Self::Msg(_) => "Msg",
            Self::After(..) => "After",
            Self::Task(..) => "Task",
            Self::Emit(_) => "Emit",
            Self::Log(_) => "Log",
        }
    }

    /// Number of leaf commands, not counting `None`.
    pub fn count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Batch(cmds) => cmds.iter().map(Self::count).sum(),
            _ => 1,
        }
    }

    /// Outputs carried directly by this command tree, in order.
    pub fn outputs(&self) -> Vec<&O> {
        let mut out = Vec::new();
        self.collect_outputs(&mut out);
        out
    }

    fn collect_outputs<'a>(&'a self, out: &mut Vec<&'a O>) {
        match self {
            Self::Emit(o) => out.push(o),
            Self::Batch(cmds) => {
                for c in cmds {
                    c.collect_outputs(out);
                }
            }
            _ => {}
        }
    }
}

/// A delayed message waiting in the timer heap.
struct Timer<M> {
    due: Instant,
    seq: u64,
    msg: M,
}

impl<M> PartialEq for Timer<M> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<M> Eq for Timer<M> {}

impl<M> PartialOrd for Timer<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Timer<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Cloneable handle for feeding messages into a running [`Program`] from
/// other threads.
pub struct ProgramHandle<M> {
    sender: mpsc::Sender<M>,
}

impl<M> Clone for ProgramHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<M> ProgramHandle<M> {
    /// Queue a message. Returns `false` once the program is gone.
    pub fn send(&self, msg: M) -> bool {
        self.sender.send(msg).is_ok()
    }
}

/// Threaded driver for a [`Model`].
///
/// Tasks run on spawned threads, delayed messages use the wall clock, and
/// subscriptions are reconciled after every update. The host calls
/// [`pump`](Program::pump) from its own loop and drains outputs with
/// [`take_outputs`](Program::take_outputs).
pub struct Program<M: Model> {
    model: M,
    sender: mpsc::Sender<M::Message>,
    receiver: mpsc::Receiver<M::Message>,
    timers: BinaryHeap<Reverse<Timer<M::Message>>>,
    timer_seq: u64,
    task_handles: Vec<JoinHandle<()>>,
    subscriptions: SubscriptionManager<M::Message>,
    outputs: Vec<M::Output>,
    logs: Vec<String>,
}

impl<M: Model> Program<M> {
    /// Wrap a model. Call [`init`](Self::init) before pumping.
    pub fn new(model: M) -> Self {
        let (sender, receiver) = mpsc::channel();
        let subscriptions = SubscriptionManager::new(sender.clone());
        Self {
            model,
            sender,
            receiver,
            timers: BinaryHeap::new(),
            timer_seq: 0,
            task_handles: Vec::new(),
            subscriptions,
            outputs: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// A handle other threads can use to send messages.
    pub fn handle(&self) -> ProgramHandle<M::Message> {
        ProgramHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run `Model::init` and execute its commands.
    pub fn init(&mut self) {
        let cmd = self.model.init();
        self.execute_cmd(cmd);
        self.reconcile_subscriptions();
    }

    /// Dispatch a message synchronously.
    pub fn send(&mut self, msg: M::Message) {
        self.dispatch(msg);
    }

    /// Process everything that is ready, waiting up to `timeout` for the
    /// first message if nothing is.
    ///
    /// Returns the number of messages dispatched.
    pub fn pump(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let mut processed = self.fire_due_timers();
            while let Ok(msg) = self.receiver.try_recv() {
                self.dispatch(msg);
                processed += 1;
            }
            self.reap_finished_tasks();
            if processed > 0 {
                return processed;
            }

            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            let mut wait = deadline - now;
            if let Some(Reverse(next)) = self.timers.peek() {
                wait = wait.min(next.due.saturating_duration_since(now));
            }
            match self.receiver.recv_timeout(wait) {
                Ok(msg) => {
                    self.dispatch(msg);
                    return 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => return 0,
            }
        }
    }

    /// Pump until `done` holds for the model or `timeout` elapses.
    ///
    /// Returns whether the condition was reached.
    pub fn run_until(&mut self, timeout: Duration, mut done: impl FnMut(&M) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while !done(&self.model) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump(deadline - now);
        }
        true
    }

    /// Get a reference to the model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Drain outputs raised since the last call.
    pub fn take_outputs(&mut self) -> Vec<M::Output> {
        std::mem::take(&mut self.outputs)
    }

    /// Log lines emitted via `Cmd::Log`.
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Number of delayed messages not yet delivered.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Ids of the subscriptions currently running.
    pub fn active_subscriptions(&self) -> Vec<SubId> {
        self.subscriptions.active_ids()
    }

    /// Stop every subscription and return the model.
    pub fn shutdown(mut self) -> M {
        self.subscriptions.stop_all();
        for handle in self.task_handles.drain(..) {
            let _ = handle.join();
        }
        self.model
    }

    fn dispatch(&mut self, msg: M::Message) {
        let _span = debug_span!("lookup.update").entered();
        let cmd = self.model.update(msg);
        self.execute_cmd(cmd);
        self.reconcile_subscriptions();
    }

    fn reconcile_subscriptions(&mut self) {
        let subs = self.model.subscriptions();
        self.subscriptions.reconcile(subs);
    }

    fn fire_due_timers(&mut self) -> usize {
        let now = Instant::now();
        let mut fired = 0;
        while self
            .timers
            .peek()
            .is_some_and(|Reverse(next)| next.due <= now)
        {
            if let Some(Reverse(timer)) = self.timers.pop() {
                trace!(seq = timer.seq, "timer fired");
                self.dispatch(timer.msg);
                fired += 1;
            }
        }
        fired
    }

    fn execute_cmd(&mut self, cmd: Cmd<M::Message, M::Output>) {
        match cmd {
            Cmd::None => {}
            Cmd::Msg(m) => {
                let cmd = self.model.update(m);
                self.execute_cmd(cmd);
            }
            Cmd::Batch(cmds) => {
                for c in cmds {
                    self.execute_cmd(c);
                }
            }
            Cmd::After(delay, msg) => {
                self.timer_seq += 1;
                self.timers.push(Reverse(Timer {
                    due: Instant::now() + delay,
                    seq: self.timer_seq,
                    msg,
                }));
            }
            Cmd::Task(spec, f) => {
                let sender = self.sender.clone();
                let name = spec.name.unwrap_or_else(|| "task".to_owned());
                debug!(task = %name, "spawning task");
                let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
                    let msg = f();
                    let _ = sender.send(msg);
                });
                match spawned {
                    Ok(handle) => self.task_handles.push(handle),
                    Err(e) => error!(task = %name, error = %e, "failed to spawn task"),
                }
            }
            Cmd::Emit(output) => self.outputs.push(output),
            Cmd::Log(text) => {
                debug!(target: "dynlookup::log", "{text}");
                self.logs.push(text);
            }
        }
    }

    fn reap_finished_tasks(&mut self) {
        if self.task_handles.is_empty() {
            return;
        }

        let mut remaining = Vec::with_capacity(self.task_handles.len());
        for handle in self.task_handles.drain(..) {
            if handle.is_finished() {
                if let Err(payload) = handle.join() {
                    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                        (*s).to_owned()
                    } else if let Some(s) = payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic payload".to_owned()
                    };
                    error!("background task panicked: {msg}");
                }
            } else {
                remaining.push(handle);
            }
        }
        self.task_handles = remaining;
    }
}
