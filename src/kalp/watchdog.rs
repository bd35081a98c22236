//! Process supervision.
//!
//! A `Watchdog` owns one `TaskSpec` and runs a supervising tokio task that
//! spawns the process, waits for it, and relaunches it every time it exits
//! for as long as `keep_alive` holds. `terminate()` may be called from any
//! task; the supervisor notices it between bounded waits and sends the live
//! child SIGTERM, escalating to a kill once the grace period runs out or
//! `kill()` is requested.

use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{JnsError, JnsResult};
use crate::kalp::events::WatchdogEvent;
use crate::kalp::task::{TaskSpec, WatchdogState};

/// How long a supervisor blocks on its child before re-checking for termination.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long a terminated child may take to exit before it is killed.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownStage {
    SigTerm,
    Kill,
}

#[derive(Debug, Clone, Copy)]
struct ShutdownState {
    stage: ShutdownStage,
    deadline: Instant,
}

/// State shared between a `Watchdog` and its supervising task.
#[derive(Debug)]
struct Control {
    keep_alive: AtomicBool,
    terminated: AtomicBool,
    forced: AtomicBool,
    state: Mutex<WatchdogState>,
}

impl Control {
    fn new(keep_alive: bool) -> Self {
        Self {
            keep_alive: AtomicBool::new(keep_alive),
            terminated: AtomicBool::new(false),
            forced: AtomicBool::new(false),
            state: Mutex::new(WatchdogState::Idle),
        }
    }

    fn terminate(&self) {
        self.keep_alive.store(false, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
    }

    fn kill(&self) {
        self.forced.store(true, Ordering::SeqCst);
        self.terminate();
    }

    fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn is_forced(&self) -> bool {
        self.forced.load(Ordering::SeqCst)
    }

    fn state(&self) -> WatchdogState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(WatchdogState::Stopped)
    }

    fn set_state(&self, next: WatchdogState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }
}

/// Supervises one long-running process.
pub struct Watchdog {
    id: usize,
    spec: TaskSpec,
    control: Arc<Control>,
    events: mpsc::Sender<WatchdogEvent>,
    grace: Duration,
    handle: Option<JoinHandle<JnsResult<()>>>,
    started: bool,
}

impl Watchdog {
    pub fn new(id: usize, spec: TaskSpec, events: mpsc::Sender<WatchdogEvent>) -> Self {
        let control = Arc::new(Control::new(spec.keep_alive));
        Self {
            id,
            spec,
            control,
            events,
            grace: TERMINATE_GRACE,
            handle: None,
            started: false,
        }
    }

    /// How long the child gets between SIGTERM and a kill.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn state(&self) -> WatchdogState {
        self.control.state()
    }

    /// Begins supervision on a new tokio task and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> JnsResult<()> {
        if self.started {
            return Err(JnsError::AlreadyStarted(self.spec.name.clone()));
        }
        self.started = true;
        let supervisor = Supervisor {
            id: self.id,
            spec: self.spec.clone(),
            control: Arc::clone(&self.control),
            events: self.events.clone(),
            grace: self.grace,
            child: None,
        };
        self.handle = Some(tokio::spawn(supervisor.run()));
        Ok(())
    }

    /// Stops any further restarts and asks the live process (if any) to exit.
    ///
    /// Does not wait; use [`Watchdog::join`] for that.
    pub fn terminate(&self) {
        debug!(task = %self.spec.name, "terminate requested");
        self.control.terminate();
    }

    /// Like `terminate`, but kills the live process without waiting out the
    /// grace period.
    pub fn kill(&self) {
        debug!(task = %self.spec.name, "kill requested");
        self.control.kill();
    }

    /// Waits until supervision has permanently ended.
    pub async fn join(&mut self) -> JnsResult<()> {
        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }

    fn stop_handle(&self) -> Arc<Control> {
        Arc::clone(&self.control)
    }
}

/// The supervising side of a watchdog; owns the process handle exclusively.
struct Supervisor {
    id: usize,
    spec: TaskSpec,
    control: Arc<Control>,
    events: mpsc::Sender<WatchdogEvent>,
    grace: Duration,
    child: Option<Child>,
}

impl Supervisor {
    async fn run(mut self) -> JnsResult<()> {
        let command = self.spec.display_command();
        if self.spec.dry_run {
            self.emit(WatchdogEvent::DryRun {
                id: self.id,
                command,
            })
            .await;
            self.control.set_state(WatchdogState::Stopped);
            return Ok(());
        }

        self.emit(WatchdogEvent::Starting {
            id: self.id,
            command: command.clone(),
        })
        .await;
        let result = self.supervise(&command).await;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.control.set_state(WatchdogState::Stopped);
        self.emit(WatchdogEvent::Stopped { id: self.id }).await;
        result
    }

    // Idle -> Running -> Idle ... until keep_alive is cleared.
    async fn supervise(&mut self, command: &str) -> JnsResult<()> {
        let mut first = true;
        loop {
            if self.control.is_terminated() {
                return Ok(());
            }
            if !first {
                self.emit(WatchdogEvent::Restarting {
                    id: self.id,
                    command: command.to_string(),
                })
                .await;
            }
            first = false;
            self.start_and_wait().await?;
            if !self.control.keep_alive() {
                return Ok(());
            }
        }
    }

    async fn start_and_wait(&mut self) -> JnsResult<Option<i32>> {
        let pid = self.spawn_child()?;
        self.emit(WatchdogEvent::Started { id: self.id, pid }).await;
        let status = self.wait_child().await?;
        let code = status.and_then(|status| status.code());
        self.emit(WatchdogEvent::Exited { id: self.id, code }).await;
        Ok(code)
    }

    fn is_child_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn spawn_child(&mut self) -> JnsResult<u32> {
        if self.is_child_alive() {
            return Err(JnsError::AlreadyRunning(self.spec.name.clone()));
        }

        let mut command = Command::new(&self.spec.cmd);
        command
            .args(&self.spec.args)
            .current_dir(&self.spec.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Own process group, so the whole tree (gulp, karma, browsers) can be signaled.
        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let child = command.spawn().map_err(|source| JnsError::Spawn {
            command: self.spec.display_command(),
            source,
        })?;
        let pid = child.id().unwrap_or(0);
        debug!(task = %self.spec.name, pid, "spawned");
        self.child = Some(child);
        self.control.set_state(WatchdogState::Running);
        Ok(pid)
    }

    async fn wait_child(&mut self) -> JnsResult<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let mut signaled = None;
        let mut shutdown: Option<ShutdownState> = None;
        let status = loop {
            if let Ok(status) = tokio::time::timeout(POLL_INTERVAL, child.wait()).await {
                break status;
            }
            let now = Instant::now();
            match shutdown {
                None if self.control.is_terminated() => {
                    signaled = Some(child.id().unwrap_or(0));
                    terminate_child(child);
                    shutdown = Some(ShutdownState {
                        stage: ShutdownStage::SigTerm,
                        deadline: now + self.grace,
                    });
                }
                Some(state)
                    if state.stage == ShutdownStage::SigTerm
                        && (now >= state.deadline || self.control.is_forced()) =>
                {
                    warn!(task = %self.spec.name, "process ignored SIGTERM, killing it");
                    kill_child(child);
                    shutdown = Some(ShutdownState {
                        stage: ShutdownStage::Kill,
                        deadline: now,
                    });
                }
                _ => {}
            }
        };
        self.child = None;
        self.control.set_state(WatchdogState::Idle);
        if let Some(pid) = signaled {
            self.emit(WatchdogEvent::Signaled { id: self.id, pid }).await;
        }
        Ok(Some(status?))
    }

    async fn emit(&self, event: WatchdogEvent) {
        let _ = self.events.send(event).await;
    }
}

#[cfg(unix)]
fn terminate_child(child: &mut Child) {
    match child.id() {
        Some(pid) => unsafe {
            let pid = pid as i32;
            let _ = libc::kill(-pid, libc::SIGTERM);
            let _ = libc::kill(pid, libc::SIGTERM);
        },
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate_child(child: &mut Child) {
    kill_child(child);
}

fn kill_child(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            let _ = libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
    if let Err(err) = child.start_kill() {
        warn!("failed to kill child: {}", err);
    }
}

/// Cloneable handle that can terminate every watchdog of a `WatchdogSet`.
#[derive(Clone)]
pub struct StopHandle {
    controls: Vec<Arc<Control>>,
}

impl StopHandle {
    pub fn terminate_all(&self) {
        for control in &self.controls {
            control.terminate();
        }
    }

    /// Second-stage shutdown: kill every live process right away.
    pub fn kill_all(&self) {
        for control in &self.controls {
            control.kill();
        }
    }
}

/// All watchdogs of one `kalp` run.
///
/// Filled at startup, then only iterated: started, terminated on shutdown,
/// and joined.
#[derive(Default)]
pub struct WatchdogSet {
    watchdogs: Vec<Watchdog>,
}

impl WatchdogSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, watchdog: Watchdog) {
        self.watchdogs.push(watchdog);
    }

    pub fn start_all(&mut self) -> JnsResult<()> {
        for watchdog in &mut self.watchdogs {
            watchdog.start()?;
        }
        Ok(())
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            controls: self.watchdogs.iter().map(Watchdog::stop_handle).collect(),
        }
    }

    pub fn terminate_all(&self) {
        for watchdog in &self.watchdogs {
            watchdog.terminate();
        }
    }

    /// Waits for every watchdog, in whatever order they finish. The first
    /// failure terminates the rest, so no process outlives a broken run;
    /// that failure is returned once all of them have ended.
    pub async fn join_all(&mut self) -> JnsResult<()> {
        let mut pending = JoinSet::new();
        for watchdog in &mut self.watchdogs {
            if let Some(handle) = watchdog.handle.take() {
                let name = watchdog.spec.name.clone();
                pending.spawn(async move { (name, handle.await) });
            }
        }
        let mut first_error = None;
        while let Some(joined) = pending.join_next().await {
            let (name, outcome) = joined?;
            if let Err(err) = outcome.map_err(JnsError::from).and_then(|result| result) {
                warn!(task = %name, "supervisor failed: {}", err);
                if first_error.is_none() {
                    self.terminate_all();
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
