use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use futures_util::future::LocalBoxFuture;
use futures_util::task::{waker, ArcWake, AtomicWaker};
use tracing::error;

use crate::registry::ListenerId;

/// A detached listener task that failed after its first suspension point.
#[derive(Debug)]
pub struct TaskFailure {
    pub listener: ListenerId,
    pub event_type: String,
    pub error: anyhow::Error,
}

pub type TaskErrorHook = dyn Fn(&TaskFailure);

struct DetachedTask {
    listener: ListenerId,
    event_type: String,
    future: LocalBoxFuture<'static, anyhow::Result<()>>,
}

struct ForwardWaker(Arc<AtomicWaker>);

impl ArcWake for ForwardWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.wake();
    }
}

/// Parks async listener invocations that did not finish inside dispatch.
pub(crate) struct TaskQueue {
    tasks: RefCell<Vec<DetachedTask>>,
    waker: Arc<AtomicWaker>,
    task_waker: Waker,
    hook: RefCell<Rc<TaskErrorHook>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let shared = Arc::new(AtomicWaker::new());
        let task_waker = waker(Arc::new(ForwardWaker(Arc::clone(&shared))));
        let hook: Rc<TaskErrorHook> = Rc::new(log_failure);
        Self {
            tasks: RefCell::new(Vec::new()),
            waker: shared,
            task_waker,
            hook: RefCell::new(hook),
        }
    }

    pub fn set_hook(&self, hook: Rc<TaskErrorHook>) {
        *self.hook.borrow_mut() = hook;
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }

    pub fn has_pending(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    /// Polls `future` once. An error before the first suspension point is
    /// returned to the caller; otherwise the task is parked.
    pub fn spawn(
        &self,
        listener: ListenerId,
        event_type: &str,
        mut future: LocalBoxFuture<'static, anyhow::Result<()>>,
    ) -> anyhow::Result<()> {
        let mut cx = Context::from_waker(&self.task_waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => result,
            Poll::Pending => {
                self.tasks.borrow_mut().push(DetachedTask {
                    listener,
                    event_type: event_type.to_string(),
                    future,
                });
                self.waker.wake();
                Ok(())
            }
        }
    }

    /// Polls every parked task once. Returns whether any task finished.
    pub fn run_ready(&self) -> bool {
        let mut parked = std::mem::take(&mut *self.tasks.borrow_mut());
        if parked.is_empty() {
            return false;
        }

        let mut cx = Context::from_waker(&self.task_waker);
        let mut finished = false;
        let mut still_pending = Vec::with_capacity(parked.len());

        for mut task in parked.drain(..) {
            match task.future.as_mut().poll(&mut cx) {
                Poll::Pending => still_pending.push(task),
                Poll::Ready(result) => {
                    finished = true;
                    if let Err(error) = result {
                        let failure = TaskFailure {
                            listener: task.listener,
                            event_type: task.event_type,
                            error,
                        };
                        let hook = Rc::clone(&self.hook.borrow());
                        hook(&failure);
                    }
                }
            }
        }

        // Tasks spawned while polling were appended to the emptied queue.
        let mut tasks = self.tasks.borrow_mut();
        still_pending.append(&mut tasks);
        *tasks = still_pending;
        finished
    }
}

fn log_failure(failure: &TaskFailure) {
    error!(
        listener = %failure.listener,
        event = %failure.event_type,
        error = %failure.error,
        "detached listener task failed"
    );
}
