//! The device thread.
//!
//! Every device runs on its own OS thread with a current-thread tokio
//! runtime. The worker owns the [`DeviceCore`] outright and multiplexes two
//! sources of work: commands from [`DeviceHandle`](super::DeviceHandle)s
//! and the polling timer. Commands take priority, so a release never waits
//! behind a backlog of ticks.
//!
//! ```text
//!  DeviceHandle ──Command──► mpsc (bounded) ──┐
//!                                             ├─► select! ─► DeviceCore ─► run_deferred ─► watch<DeviceSnapshot>
//!  PollingPolicy ──────────── tick ───────────┘
//! ```

use super::core::{DeviceCore, DeviceSnapshot};
use super::driver::DriverTask;
use super::expect::WaitPolicy;
use crate::Result;
use crate::status::StatusCollection;
use kiosk_core::CallingType;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, info, info_span};

/// Work sent to a device thread.
pub(crate) enum Command {
    Initialize(CallingType),
    Release {
        reply: oneshot::Sender<()>,
    },
    CheckExistence {
        reply: oneshot::Sender<bool>,
    },
    Find {
        reply: oneshot::Sender<bool>,
    },
    Poll {
        reply: oneshot::Sender<StatusCollection>,
    },
    SimplePoll {
        reply: oneshot::Sender<StatusCollection>,
    },
    StartPolling {
        not_wait_first: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    StopPolling {
        reply: oneshot::Sender<()>,
    },
    SetPollingInterval {
        interval: Duration,
        reply: oneshot::Sender<Result<()>>,
    },
    EnqueuePostPollTask {
        task: DriverTask,
        reply: oneshot::Sender<Result<()>>,
    },
    Execute(Box<dyn FnOnce(&mut DeviceCore) + Send>),
    AutoDetect {
        reply: oneshot::Sender<bool>,
    },
    WaitReady {
        policy: WaitPolicy,
        ready: bool,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<DeviceSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initialize(_) => "Initialize",
            Self::Release { .. } => "Release",
            Self::CheckExistence { .. } => "CheckExistence",
            Self::Find { .. } => "Find",
            Self::Poll { .. } => "Poll",
            Self::SimplePoll { .. } => "SimplePoll",
            Self::StartPolling { .. } => "StartPolling",
            Self::StopPolling { .. } => "StopPolling",
            Self::SetPollingInterval { .. } => "SetPollingInterval",
            Self::EnqueuePostPollTask { .. } => "EnqueuePostPollTask",
            Self::Execute(_) => "Execute",
            Self::AutoDetect { .. } => "AutoDetect",
            Self::WaitReady { .. } => "WaitReady",
            Self::Snapshot { .. } => "Snapshot",
            Self::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

/// A device core waiting for, or running on, its thread.
#[derive(Debug)]
pub(crate) struct Worker {
    core: DeviceCore,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<DeviceSnapshot>,
}

impl Worker {
    pub(crate) fn new(
        core: DeviceCore,
        commands: mpsc::Receiver<Command>,
        status: watch::Sender<DeviceSnapshot>,
    ) -> Self {
        Self {
            core,
            commands,
            status,
        }
    }

    /// Release the core without ever starting the thread.
    pub(crate) fn release_unstarted(mut self) {
        self.core.release();
        self.status.send_replace(self.core.snapshot());
    }

    /// Start the device thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        let name = self.core.name().to_string();
        let handle = std::thread::Builder::new()
            .name(format!("device-{name}"))
            .spawn(move || self.run_blocking())?;
        Ok(handle)
    }

    fn run_blocking(self) {
        let span = info_span!("device", name = %self.core.name(), id = %self.core.id());
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(parent: &span, "Cannot start the device runtime: {e}");
                return;
            }
        };

        runtime.block_on(self.run().instrument(span));
    }

    async fn run(mut self) {
        info!("Device thread started");
        let mut shutdown_reply = None;

        loop {
            let command = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => Some(command),
                    None => break,
                },
                () = self.core.polling_tick() => None,
            };

            match command {
                Some(Command::Shutdown { reply }) => {
                    shutdown_reply = Some(reply);
                    break;
                }
                Some(command) => self.handle(command),
                None => self.core.on_poll(),
            }

            self.core.run_deferred();
            self.publish();
        }

        self.core.release();
        self.publish();
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
        info!("Device thread stopped");
    }

    fn publish(&self) {
        self.status.send_replace(self.core.snapshot());
    }

    /// Answer a request once deferred work has run and the snapshot is
    /// published, so the caller never reads a stale status.
    fn reply<T>(&mut self, reply: oneshot::Sender<T>, value: T) {
        self.core.run_deferred();
        self.publish();
        // A dropped reply receiver means the caller stopped waiting.
        let _ = reply.send(value);
    }

    fn handle(&mut self, command: Command) {
        debug!("Command {command:?}");

        match command {
            Command::Initialize(calling_type) => self.core.initialize(calling_type),
            Command::Release { reply } => {
                self.core.release();
                self.reply(reply, ());
            }
            Command::CheckExistence { reply } => {
                let exists = self.core.check_existence();
                self.reply(reply, exists);
            }
            Command::Find { reply } => {
                let found = self.core.find();
                self.reply(reply, found);
            }
            Command::Poll { reply } => {
                self.core.on_poll();
                let collection = self.core.status_collection().clone();
                self.reply(reply, collection);
            }
            Command::SimplePoll { reply } => {
                self.core.simple_poll();
                let collection = self.core.status_collection().clone();
                self.reply(reply, collection);
            }
            Command::StartPolling {
                not_wait_first,
                reply,
            } => {
                let started = self.core.start_polling(not_wait_first);
                self.reply(reply, started);
            }
            Command::StopPolling { reply } => {
                self.core.stop_polling();
                self.reply(reply, ());
            }
            Command::SetPollingInterval { interval, reply } => {
                let result = self.core.set_polling_interval(interval);
                self.reply(reply, result);
            }
            Command::EnqueuePostPollTask { task, reply } => {
                let result = self.core.enqueue_post_poll_task(task);
                self.reply(reply, result);
            }
            Command::Execute(operation) => operation(&mut self.core),
            Command::AutoDetect { reply } => {
                let detected = self.core.auto_detect();
                self.reply(reply, detected);
            }
            Command::WaitReady {
                policy,
                ready,
                reply,
            } => {
                let result = self.core.wait_ready(policy, ready);
                self.reply(reply, result);
            }
            Command::Snapshot { reply } => {
                let snapshot = self.core.snapshot();
                self.reply(reply, snapshot);
            }
            Command::Shutdown { reply } => self.reply(reply, ()),
        }
    }
}
