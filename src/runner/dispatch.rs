//! Main-context dispatch
//!
//! All caller-visible effects of a command run on one designated context:
//! worker tasks post boxed closures into an unbounded channel and the host
//! drives `MainLoop`, which runs them strictly one at a time.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RunnerError;

/// A unit of work for the main context
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Sending half: cheap to clone, handed to every worker
#[derive(Clone)]
pub struct MainContext {
    tx: mpsc::UnboundedSender<Task>,
}

/// Receiving half, owned by the host
pub struct MainLoop {
    rx: mpsc::UnboundedReceiver<Task>,
}

/// Create a connected context/loop pair
pub fn main_loop() -> (MainContext, MainLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainContext { tx }, MainLoop { rx })
}

impl MainContext {
    /// Queue a task for the main context
    pub fn post<F>(&self, task: F) -> Result<(), RunnerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|_| {
            warn!("Main loop is gone, dropping task");
            RunnerError::DispatchClosed
        })
    }

    /// Whether the receiving loop has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl MainLoop {
    /// Run tasks until every `MainContext` handle has been dropped
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
        }
        debug!("Main loop finished");
    }

    /// Run the next task, waiting for one to arrive
    ///
    /// Returns `false` once every sender is gone.
    pub async fn run_one(&mut self) -> bool {
        match self.rx.recv().await {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run every task that is already queued without waiting
    ///
    /// Returns the number of tasks executed.
    pub fn run_pending(&mut self) -> usize {
        let mut executed = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            executed += 1;
        }
        executed
    }
}
