// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for mailbox-driven loops
//!
//! Every background role in the engine (decode worker, capture dispatcher,
//! album decoder, virtual camera) is a dedicated thread draining an ordered
//! mailbox. This module provides that thread once: named spawn, an init latch
//! so nobody posts to a loop that is not ready, FIFO delivery, a `Quit`
//! message, and a bounded join.

use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::constants::timing;

/// Action returned by the message handler to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Keep draining the mailbox
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Message envelope carried by a mailbox
#[derive(Debug)]
pub enum Envelope<M> {
    /// Deliver a message to the handler
    Deliver(M),
    /// Terminate the loop; later messages are never handled
    Quit,
}

/// Sending side of a loop's mailbox
///
/// Cheap to clone; any number of producers may post.
pub struct Mailbox<M> {
    sender: mpsc::UnboundedSender<Envelope<M>>,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<M> Mailbox<M> {
    /// Post a message; returns `false` if the loop has already exited
    pub fn post(&self, message: M) -> bool {
        self.sender.send(Envelope::Deliver(message)).is_ok()
    }

    /// Ask the loop to exit after the messages already queued
    pub fn quit(&self) -> bool {
        self.sender.send(Envelope::Quit).is_ok()
    }

    /// Whether the loop has stopped receiving
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<M> std::fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Sends the exit acknowledgement when the loop thread ends, even by panic
struct ExitGuard(std_mpsc::Sender<()>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Controller for a mailbox loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut controller = MailboxLoop::start("printer", |line: String| {
///     println!("{}", line);
///     LoopAction::Continue
/// })?;
///
/// controller.post("hello".to_string());
/// controller.shutdown(Duration::from_millis(500));
/// ```
pub struct MailboxLoop<M> {
    mailbox: Mailbox<M>,
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Fires once the loop thread has finished
    exited: std_mpsc::Receiver<()>,
    quit_sent: bool,
    /// Name for logging
    name: String,
}

impl<M: Send + 'static> MailboxLoop<M> {
    /// Start a new mailbox loop in a separate thread
    ///
    /// Must not be called from inside an async runtime: the caller blocks
    /// until the loop's mailbox exists.
    pub fn start<F>(name: &str, mut handler: F) -> Result<Self, String>
    where
        F: FnMut(M) -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, || Ok(()), move |_: &mut (), message| handler(message))
    }

    /// Start a mailbox loop with initialization
    ///
    /// `init_fn` runs on the new thread and builds the loop's private state.
    /// The call returns once the mailbox is ready, or with the init error if
    /// `init_fn` failed (in which case the handler never runs).
    pub fn start_with_init<S, I, F>(name: &str, init_fn: I, mut handler: F) -> Result<Self, String>
    where
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S, M) -> LoopAction + Send + 'static,
    {
        let (ready_tx, ready_rx) =
            oneshot::channel::<Result<mpsc::UnboundedSender<Envelope<M>>, String>>();
        let (exit_tx, exit_rx) = std_mpsc::channel();
        let name_clone = name.to_string();

        info!(name = %name, "Starting mailbox loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _exit = ExitGuard(exit_tx);
                debug!(name = %name_clone, "Mailbox loop thread started, initializing...");

                let mut state = match init_fn() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(name = %name_clone, error = %e, "Initialization failed");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let (sender, mut receiver) = mpsc::unbounded_channel();
                if ready_tx.send(Ok(sender)).is_err() {
                    debug!(name = %name_clone, "Owner went away before loop was ready");
                    return;
                }

                while let Some(envelope) = receiver.blocking_recv() {
                    match envelope {
                        Envelope::Deliver(message) => {
                            if handler(&mut state, message) == LoopAction::Stop {
                                debug!(name = %name_clone, "Loop requested stop");
                                break;
                            }
                        }
                        Envelope::Quit => {
                            debug!(name = %name_clone, "Quit received");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Mailbox loop thread exiting");
            })
            .map_err(|e| format!("failed to spawn {}: {}", name, e))?;

        let sender = match ready_rx.blocking_recv() {
            Ok(Ok(sender)) => sender,
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(format!("{} exited during initialization", name));
            }
        };

        Ok(Self {
            mailbox: Mailbox { sender },
            thread_handle: Some(thread_handle),
            exited: exit_rx,
            quit_sent: false,
            name: name.to_string(),
        })
    }
}

impl<M> MailboxLoop<M> {
    /// Post a message to the loop
    pub fn post(&self, message: M) -> bool {
        self.mailbox.post(message)
    }

    /// A sending handle that can be moved to other threads
    pub fn mailbox(&self) -> Mailbox<M> {
        self.mailbox.clone()
    }

    /// Check if the loop thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Send `Quit` (at most once; non-blocking)
    pub fn request_quit(&mut self) {
        if !self.quit_sent {
            debug!(name = %self.name, "Requesting mailbox loop quit");
            self.quit_sent = true;
            self.mailbox.quit();
        }
    }

    /// Quit and wait up to `timeout` for the thread to finish
    ///
    /// Returns `false` if the loop did not finish in time; the thread is then
    /// detached and left to end on its own.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.request_quit();
        self.join_timeout(timeout)
    }

    /// Wait up to `timeout` for the thread to finish without sending quit
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.thread_handle.take() else {
            return true;
        };

        if handle.thread().id() == thread::current().id() {
            debug!(name = %self.name, "Loop shutting itself down, detaching");
            return true;
        }

        debug!(name = %self.name, "Waiting for mailbox loop thread to finish");
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if let Err(e) = handle.join() {
                    warn!(name = %self.name, "Mailbox loop thread panicked: {:?}", e);
                } else {
                    debug!(name = %self.name, "Mailbox loop thread finished");
                }
                true
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                error!(
                    name = %self.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Mailbox loop did not finish in time, detaching"
                );
                false
            }
        }
    }
}

impl<M> Drop for MailboxLoop<M> {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "MailboxLoop dropped, stopping loop");
            self.request_quit();
            self.join_timeout(timing::WORKER_JOIN_TIMEOUT);
        }
    }
}

impl<M> std::fmt::Debug for MailboxLoop<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxLoop")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
