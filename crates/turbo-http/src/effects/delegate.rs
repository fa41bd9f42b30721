use std::any::Any;
use std::path::Path;

use super::operation::TaskId;
use super::session::HttpSession;
use super::transport::Transport;
use crate::error::Error;

/// Observer notified about operations of a session.
///
/// The session only keeps a weak reference, so registering a delegate does
/// not extend its lifetime. Callbacks run on the runtime worker that finished
/// the operation and must not block.
pub trait BackgroundDelegate<T: Transport>: Send + Sync {
    /// The session has no operations left in flight.
    fn on_background_events_finished(&self, session: &HttpSession<T>);

    /// An operation finished; called once per operation, before its handle
    /// resolves.
    ///
    /// On success `outcome` holds the value the handle resolves to: a
    /// [`Reply`] for requests, a [`Download`] for downloads. Downcast it to
    /// read the decoded data of operations whose handle was dropped.
    ///
    /// [`Reply`]: crate::data::Reply
    /// [`Download`]: crate::data::Download
    fn on_task_completed(&self, session: &HttpSession<T>, task: TaskId, outcome: Result<&dyn Any, &Error>);

    /// A download was moved to its final location.
    fn on_download_finished(&self, session: &HttpSession<T>, task: TaskId, location: &Path) {
        let _ = (session, task, location);
    }
}
