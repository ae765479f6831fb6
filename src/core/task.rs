//! Cooperative task adapter.
//!
//! Suspendable computations are ordinary Rust futures. They are polled with
//! a no-op waker: the only way for a task to get polled again is to register
//! a resumption with the scheduler while it is being polled. [`Sleep`]
//! registers a "resume this task" event at its deadline; [`JoinHandle`]
//! registers the current task as a waiter on another task's completion. A
//! task that returns `Pending` without registering anything is suspended on
//! something the virtual clock cannot represent and fails with
//! [`SchedulerError::UnsupportedSuspension`].

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::future::{select, Either, LocalBoxFuture};
use futures::task::noop_waker_ref;
use serde::{Deserialize, Serialize};

use crate::core::event::{Callback, EventHandle, EventStatus};
use crate::core::scheduler::{panic_message, Scheduler};
use crate::core::{AppResult, SchedulerError};

type TaskFuture = LocalBoxFuture<'static, AppResult<()>>;

/// Identifier of a spawned task, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Lifecycle of a task.
///
/// `Created → Running → {Suspended ⇄ Running} → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Spawned; its first step is queued.
    Created,
    /// Currently being polled.
    Running,
    /// Waiting for a registered resumption.
    Suspended,
    /// Finished with a value.
    Completed,
    /// Finished with an error, a panic, or an unsupported suspension.
    Failed,
}

impl TaskState {
    /// Whether the task can never run again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

struct Waiter {
    task: TaskId,
    origin: &'static Location<'static>,
}

struct TaskSlot {
    name: Option<String>,
    state: TaskState,
    future: Option<TaskFuture>,
    waiters: Vec<Waiter>,
    failure: Option<String>,
    // Pending join wake-up; at most one per task.
    wake: Option<EventHandle>,
}

/// All tasks known to a scheduler, terminal ones included so late joiners
/// can still observe the outcome.
#[derive(Default)]
pub(crate) struct TaskTable {
    slots: BTreeMap<TaskId, TaskSlot>,
    next_id: u64,
}

impl TaskTable {
    fn insert(&mut self, name: Option<String>, future: TaskFuture) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            id,
            TaskSlot {
                name,
                state: TaskState::Created,
                future: Some(future),
                waiters: Vec::new(),
                failure: None,
                wake: None,
            },
        );
        id
    }

    fn add_waiter(&mut self, target: TaskId, waiter: TaskId, origin: &'static Location<'static>) {
        if let Some(slot) = self.slots.get_mut(&target) {
            if !slot.waiters.iter().any(|w| w.task == waiter) {
                slot.waiters.push(Waiter {
                    task: waiter,
                    origin,
                });
            }
        }
    }

    /// Whether `id` needs a join wake-up queued: unfinished and none pending.
    fn needs_wake(&self, id: TaskId) -> bool {
        self.slots.get(&id).is_some_and(|slot| {
            !slot.state.is_terminal()
                && !slot
                    .wake
                    .as_ref()
                    .is_some_and(|wake| wake.status() == EventStatus::Pending)
        })
    }

    fn remove_waiter(&mut self, target: TaskId, waiter: TaskId) {
        if let Some(slot) = self.slots.get_mut(&target) {
            slot.waiters.retain(|w| w.task != waiter);
        }
    }

    fn unfinished(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| !slot.state.is_terminal())
            .count()
    }

    /// Fail every unfinished task and hand back their computations so the
    /// caller can drop them outside the table borrow.
    pub(crate) fn abandon_unfinished(&mut self) -> Vec<TaskFuture> {
        let mut futures = Vec::new();
        for slot in self.slots.values_mut() {
            if slot.state.is_terminal() {
                continue;
            }
            slot.state = TaskState::Failed;
            slot.failure = Some("abandoned at shutdown".to_string());
            slot.waiters.clear();
            if let Some(wake) = slot.wake.take() {
                wake.cancel();
            }
            futures.extend(slot.future.take());
        }
        futures
    }
}

impl Scheduler {
    /// Spawn `computation` as a task. Its first step runs as an event at the
    /// current instant.
    #[track_caller]
    pub fn spawn<F, T>(&self, computation: F) -> JoinHandle<T>
    where
        F: Future<Output = AppResult<T>> + 'static,
        T: 'static,
    {
        self.spawn_inner(None, computation, Location::caller())
    }

    /// Like [`Scheduler::spawn`], with a name used in logs.
    #[track_caller]
    pub fn spawn_named<F, T>(&self, name: impl Into<String>, computation: F) -> JoinHandle<T>
    where
        F: Future<Output = AppResult<T>> + 'static,
        T: 'static,
    {
        self.spawn_inner(Some(name.into()), computation, Location::caller())
    }

    pub(crate) fn spawn_inner<F, T>(
        &self,
        name: Option<String>,
        computation: F,
        origin: &'static Location<'static>,
    ) -> JoinHandle<T>
    where
        F: Future<Output = AppResult<T>> + 'static,
        T: 'static,
    {
        let output = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&output);
        let wrapped = async move {
            computation.await.map(|value| {
                *sink.borrow_mut() = Some(value);
            })
        };
        let id = self
            .shared
            .tasks
            .borrow_mut()
            .insert(name.clone(), Box::pin(wrapped));
        tracing::debug!(task = %id, name = name.as_deref().unwrap_or("-"), %origin, "spawned task");
        self.enqueue_now(self.resume_callback(id), origin);
        JoinHandle {
            id,
            sched: self.clone(),
            output,
            origin,
            waiting_as: None,
        }
    }

    /// Run `entry` as a task, drain the queue, and return its result.
    ///
    /// # Errors
    /// Fatal run errors, [`SchedulerError::TaskFailed`] if the entry task
    /// failed, or [`SchedulerError::TaskStalled`] if the queue drained while
    /// it was still suspended.
    #[track_caller]
    pub fn run_to_completion<F, T>(&self, entry: F) -> Result<T, SchedulerError>
    where
        F: Future<Output = AppResult<T>> + 'static,
        T: 'static,
    {
        let handle = self.spawn_inner(Some("entry".to_string()), entry, Location::caller());
        self.run()?;
        handle
            .try_output()?
            .ok_or_else(|| SchedulerError::TaskStalled(handle.id()))
    }

    /// Task currently being polled, if any.
    #[must_use]
    pub fn current_task(&self) -> Option<TaskId> {
        self.shared.current_task.get()
    }

    /// Lifecycle state of a task.
    #[must_use]
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.tasks.borrow().slots.get(&id).map(|slot| slot.state)
    }

    /// Name given at spawn time.
    #[must_use]
    pub fn task_name(&self, id: TaskId) -> Option<String> {
        self.shared
            .tasks
            .borrow()
            .slots
            .get(&id)
            .and_then(|slot| slot.name.clone())
    }

    /// Number of tasks that are neither completed nor failed.
    #[must_use]
    pub fn unfinished_tasks(&self) -> usize {
        self.shared.tasks.borrow().unfinished()
    }

    /// Suspend the current task for `delay` seconds of virtual time.
    #[track_caller]
    pub fn sleep(&self, delay: f64) -> Sleep {
        Sleep::new(self.clone(), Deadline::After(delay), Location::caller())
    }

    /// Suspend the current task until absolute virtual time `time`.
    #[track_caller]
    pub fn sleep_until(&self, time: f64) -> Sleep {
        Sleep::new(self.clone(), Deadline::At(time), Location::caller())
    }

    /// Let every other event queued for this instant run first.
    #[track_caller]
    pub fn yield_now(&self) -> Sleep {
        Sleep::new(self.clone(), Deadline::After(0.0), Location::caller())
    }

    /// Race `computation` against a deadline `delay` seconds away.
    ///
    /// # Errors
    /// [`SchedulerError::Timeout`] if the deadline fires first, or the
    /// deadline's own scheduling error.
    pub async fn timeout<F>(&self, delay: f64, computation: F) -> Result<F::Output, SchedulerError>
    where
        F: Future,
    {
        match select(Box::pin(computation), self.sleep(delay)).await {
            Either::Left((output, _deadline)) => Ok(output),
            Either::Right((Ok(()), _)) => Err(SchedulerError::Timeout(delay)),
            Either::Right((Err(err), _)) => Err(err),
        }
    }

    /// Poll a task once.
    ///
    /// This is what resumption events invoke. Returns the state the task is
    /// left in.
    ///
    /// # Errors
    /// [`SchedulerError::TaskAlreadyFinished`] for a terminal task,
    /// [`SchedulerError::UnsupportedSuspension`] if the task suspended
    /// without registering a resumption, [`SchedulerError::TaskFailed`] if
    /// its computation returned an error or panicked.
    pub fn resume(&self, id: TaskId) -> Result<TaskState, SchedulerError> {
        let mut future = {
            let mut tasks = self.shared.tasks.borrow_mut();
            let slot = tasks
                .slots
                .get_mut(&id)
                .ok_or(SchedulerError::TaskNotFound(id))?;
            match slot.state {
                TaskState::Completed | TaskState::Failed => {
                    return Err(SchedulerError::TaskAlreadyFinished(id))
                }
                TaskState::Running => return Err(SchedulerError::TaskBusy(id)),
                TaskState::Created | TaskState::Suspended => {}
            }
            let future = slot.future.take().ok_or(SchedulerError::TaskBusy(id))?;
            slot.state = TaskState::Running;
            // This poll observes every completion a queued wake-up would.
            if let Some(wake) = slot.wake.take() {
                wake.cancel();
            }
            future
        };

        let previous_task = self.shared.current_task.replace(Some(id));
        let previous_flag = self.shared.resumption_registered.replace(false);
        let mut cx = Context::from_waker(noop_waker_ref());
        let polled = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));
        let registered = self.shared.resumption_registered.replace(previous_flag);
        self.shared.current_task.set(previous_task);

        let outcome = match polled {
            Ok(Poll::Pending) if registered => {
                self.park(id, future);
                return Ok(TaskState::Suspended);
            }
            Ok(Poll::Pending) => {
                drop(future);
                self.finish_task(id, Err(SchedulerError::UnsupportedSuspension(id).into()));
                return Err(SchedulerError::UnsupportedSuspension(id));
            }
            Ok(Poll::Ready(result)) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "task panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        drop(future);

        match outcome {
            Ok(()) => {
                self.finish_task(id, Ok(()));
                Ok(TaskState::Completed)
            }
            Err(error) => {
                let reason = format!("{error:#}");
                self.finish_task(id, Err(error));
                Err(SchedulerError::TaskFailed { task: id, reason })
            }
        }
    }

    fn park(&self, id: TaskId, future: TaskFuture) {
        let mut tasks = self.shared.tasks.borrow_mut();
        match tasks.slots.get_mut(&id) {
            Some(slot) if slot.state == TaskState::Running => {
                slot.state = TaskState::Suspended;
                slot.future = Some(future);
                tracing::trace!(task = %id, "task suspended");
            }
            _ => {
                // Abandoned while it was being polled.
                drop(tasks);
                drop(future);
            }
        }
    }

    fn finish_task(&self, id: TaskId, outcome: AppResult<()>) {
        let waiters = {
            let mut tasks = self.shared.tasks.borrow_mut();
            let Some(slot) = tasks.slots.get_mut(&id) else {
                return;
            };
            match &outcome {
                Ok(()) => slot.state = TaskState::Completed,
                Err(error) => {
                    slot.state = TaskState::Failed;
                    slot.failure = Some(format!("{error:#}"));
                }
            }
            std::mem::take(&mut slot.waiters)
        };
        match &outcome {
            Ok(()) => tracing::debug!(task = %id, waiters = waiters.len(), "task completed"),
            Err(error) => tracing::warn!(task = %id, "task failed: {error:#}"),
        }
        // Completion is observed no earlier than the instant it happened.
        for waiter in waiters {
            if !self.shared.tasks.borrow().needs_wake(waiter.task) {
                tracing::trace!(task = %waiter.task, "wake-up not needed");
                continue;
            }
            let wake = self.enqueue_now(self.resume_callback(waiter.task), waiter.origin);
            if let Some(slot) = self.shared.tasks.borrow_mut().slots.get_mut(&waiter.task) {
                slot.wake = Some(wake);
            }
        }
    }

    fn resume_callback(&self, id: TaskId) -> Callback {
        let sched = self.downgrade();
        Box::new(move || -> AppResult<()> {
            let Some(sched) = sched.upgrade() else {
                return Ok(());
            };
            match sched.resume(id) {
                Ok(_) => Ok(()),
                Err(SchedulerError::TaskAlreadyFinished(_)) => {
                    tracing::trace!(task = %id, "stale resumption ignored");
                    Ok(())
                }
                Err(err) => Err(anyhow::Error::from(err)),
            }
        })
    }

    fn schedule_resume(
        &self,
        id: TaskId,
        time: f64,
        origin: &'static Location<'static>,
    ) -> Result<EventHandle, SchedulerError> {
        self.schedule_at_origin(time, self.resume_callback(id), origin)
    }

    fn note_resumption_registered(&self) {
        self.shared.resumption_registered.set(true);
    }

    fn task_failure(&self, id: TaskId) -> Option<String> {
        self.shared
            .tasks
            .borrow()
            .slots
            .get(&id)
            .and_then(|slot| slot.failure.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum Deadline {
    After(f64),
    At(f64),
}

/// Future that completes once virtual time reaches its deadline.
///
/// The deadline is fixed on first poll. Dropping a pending `Sleep` cancels
/// its resumption event.
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
    sched: Scheduler,
    deadline: Deadline,
    registration: Option<EventHandle>,
    origin: &'static Location<'static>,
    done: bool,
}

impl Sleep {
    const fn new(sched: Scheduler, deadline: Deadline, origin: &'static Location<'static>) -> Self {
        Self {
            sched,
            deadline,
            registration: None,
            origin,
            done: false,
        }
    }

    fn register(&mut self) -> Result<(), SchedulerError> {
        let task = self
            .sched
            .current_task()
            .ok_or(SchedulerError::NoCurrentTask)?;
        let handle = match self.deadline {
            Deadline::After(delay) => {
                if !delay.is_finite() {
                    return Err(SchedulerError::InvalidTime(delay));
                }
                if delay < 0.0 {
                    return Err(SchedulerError::NegativeDelay(delay));
                }
                let time = self.sched.now() + delay;
                self.sched.schedule_resume(task, time, self.origin)?
            }
            Deadline::At(time) => self.sched.schedule_resume(task, time, self.origin)?,
        };
        self.registration = Some(handle);
        self.sched.note_resumption_registered();
        Ok(())
    }
}

impl Future for Sleep {
    type Output = Result<(), SchedulerError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(Ok(()));
        }
        if let Some(handle) = &this.registration {
            if handle.status() == EventStatus::Fired {
                this.registration = None;
                this.done = true;
                return Poll::Ready(Ok(()));
            }
            this.sched.note_resumption_registered();
            return Poll::Pending;
        }
        match this.register() {
            Ok(()) => Poll::Pending,
            Err(err) => {
                this.done = true;
                Poll::Ready(Err(err))
            }
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(handle) = self.registration.take() {
            handle.cancel();
        }
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registration", &self.registration)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Handle to a spawned task; awaiting it suspends until the task finishes.
#[must_use = "dropping a JoinHandle does not cancel the task"]
pub struct JoinHandle<T> {
    id: TaskId,
    sched: Scheduler,
    output: Rc<RefCell<Option<T>>>,
    origin: &'static Location<'static>,
    waiting_as: Option<TaskId>,
}

impl<T> JoinHandle<T> {
    /// Id of the task.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Current lifecycle state of the task.
    #[must_use]
    pub fn state(&self) -> Option<TaskState> {
        self.sched.task_state(self.id)
    }

    /// Whether the task has completed or failed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_some_and(TaskState::is_terminal)
    }

    /// Take the task's result without awaiting.
    ///
    /// `Ok(None)` while the task is unfinished.
    ///
    /// # Errors
    /// [`SchedulerError::TaskFailed`] if the task failed,
    /// [`SchedulerError::TaskAlreadyFinished`] if the value was already taken.
    pub fn try_output(&self) -> Result<Option<T>, SchedulerError> {
        match self.state() {
            None => Err(SchedulerError::TaskNotFound(self.id)),
            Some(TaskState::Completed) => self
                .output
                .borrow_mut()
                .take()
                .map(Some)
                .ok_or(SchedulerError::TaskAlreadyFinished(self.id)),
            Some(TaskState::Failed) => Err(SchedulerError::TaskFailed {
                task: self.id,
                reason: self
                    .sched
                    .task_failure(self.id)
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }),
            Some(_) => Ok(None),
        }
    }

    fn stop_waiting(&mut self) {
        if let Some(waiter) = self.waiting_as.take() {
            if let Ok(mut tasks) = self.sched.shared.tasks.try_borrow_mut() {
                tasks.remove_waiter(self.id, waiter);
            }
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.try_output() {
            Ok(Some(value)) => {
                this.stop_waiting();
                return Poll::Ready(Ok(value));
            }
            Ok(None) => {}
            Err(err) => {
                this.stop_waiting();
                return Poll::Ready(Err(err));
            }
        }

        let Some(current) = this.sched.current_task() else {
            return Poll::Ready(Err(SchedulerError::NoCurrentTask));
        };
        if current == this.id {
            return Poll::Ready(Err(SchedulerError::SelfAwait(this.id)));
        }
        if this.waiting_as != Some(current) {
            this.stop_waiting();
        }
        this.sched
            .shared
            .tasks
            .borrow_mut()
            .add_waiter(this.id, current, this.origin);
        this.waiting_as = Some(current);
        this.sched.note_resumption_registered();
        Poll::Pending
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        self.stop_waiting();
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
