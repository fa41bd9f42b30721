//! Transfer operations: the handle a caller awaits and the state the session
//! keeps for each operation while it runs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::auth::{SessionChallengeHandler, TaskChallengeHandler};
use super::transport::Transport;
use crate::data::{AcceptedStatusCodes, Progress, SessionConfig, TransferState};
use crate::error::{Error, Result};

/// Identity of one transfer operation, unique within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    pub fn get(&self) -> u64 { self.0 }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "#{}", self.0) }
}

/// State shared between a running operation, its handle and the session.
pub(crate) struct OperationShared {
    pub id:       TaskId,
    pub token:    CancellationToken,
    state:        Mutex<TransferState>,
    progress:     Mutex<Progress>,
}

impl OperationShared {
    pub fn new(id: TaskId, token: CancellationToken) -> Self {
        Self {
            id,
            token,
            state: Mutex::new(TransferState::Idle),
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn state(&self) -> TransferState { *lock(&self.state) }

    pub fn set_state(&self, state: TransferState) { *lock(&self.state) = state; }

    pub fn progress(&self) -> Progress { *lock(&self.progress) }

    pub fn set_progress(&self, progress: Progress) { *lock(&self.progress) = progress; }
}

/// Everything an operation needs while it runs, captured when it is
/// submitted. Later changes to the session do not reach it.
pub(crate) struct TaskContext<T> {
    pub transport:       Arc<T>,
    pub accepted:        Arc<AcceptedStatusCodes>,
    pub session_handler: Option<SessionChallengeHandler>,
    pub task_handler:    Option<TaskChallengeHandler>,
    pub config:          Arc<SessionConfig>,
    pub op:              Arc<OperationShared>,
}

impl<T: Transport> TaskContext<T> {
    pub fn id(&self) -> TaskId { self.op.id }

    pub fn is_cancelled(&self) -> bool { self.op.token.is_cancelled() }

    /// Run `fut` unless the operation is cancelled first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.op.token.cancelled() => Err(Error::cancelled()),
            output = fut => Ok(output),
        }
    }
}

/// Handle to a running transfer.
///
/// Awaiting the handle yields the operation's single outcome. Dropping it
/// detaches the operation: it keeps running and still reports to the
/// session's background delegate.
pub struct Operation<T> {
    shared: Arc<OperationShared>,
    handle: JoinHandle<Result<T>>,
}

impl<T> Operation<T> {
    pub(crate) fn new(shared: Arc<OperationShared>, handle: JoinHandle<Result<T>>) -> Self { Self { shared, handle } }

    pub fn id(&self) -> TaskId { self.shared.id }

    pub fn state(&self) -> TransferState { self.shared.state() }

    /// Latest byte counters. Stays at zero for non-download operations.
    pub fn progress(&self) -> Progress { self.shared.progress() }

    /// Cancel this operation only. It resolves with [`Error::Cancelled`]
    /// unless it already finished.
    pub fn cancel(&self) { self.shared.token.cancel(); }

    pub fn is_finished(&self) -> bool { self.handle.is_finished() }
}

impl<T> Future for Operation<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // The runtime shut down under the task.
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::cancelled())),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.shared.id)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Operations that have been submitted and not yet finished.
#[derive(Default)]
pub(crate) struct Registry {
    operations: Mutex<HashMap<TaskId, Arc<OperationShared>>>,
    idle:       Notify,
}

impl Registry {
    pub fn insert(&self, op: Arc<OperationShared>) { lock(&self.operations).insert(op.id, op); }

    /// Returns `true` when this removal left the registry empty.
    pub fn remove(&self, id: TaskId) -> bool {
        let drained = {
            let mut operations = lock(&self.operations);
            operations.remove(&id).is_some() && operations.is_empty()
        };
        if drained {
            self.idle.notify_waiters();
        }
        drained
    }

    pub fn len(&self) -> usize { lock(&self.operations).len() }

    /// Wait until every registered operation has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.len() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> { lock.read().unwrap_or_else(PoisonError::into_inner) }

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> { lock.write().unwrap_or_else(PoisonError::into_inner) }

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shared(id: u64) -> Arc<OperationShared> { Arc::new(OperationShared::new(TaskId(id), CancellationToken::new())) }

    #[tokio::test]
    async fn test_operation_resolves_with_task_result() {
        let op = shared(1);
        let handle = tokio::spawn(async { Ok::<_, Error>(7) });
        let operation = Operation::new(op, handle);
        assert_eq!(operation.id(), TaskId(1));
        assert_eq!(operation.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_aborted_task_resolves_cancelled() {
        let op = shared(2);
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, Error>(())
        });
        handle.abort();
        let operation = Operation::new(op, handle);
        assert!(operation.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_registry_wait_idle() {
        let registry = Arc::new(Registry::default());
        registry.wait_idle().await;

        registry.insert(shared(1));
        registry.insert(shared(2));
        assert_eq!(registry.len(), 2);

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_idle().await })
        };
        assert!(!registry.remove(TaskId(1)));
        assert!(registry.remove(TaskId(2)));
        assert!(!registry.remove(TaskId(2)));

        tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
    }
}
