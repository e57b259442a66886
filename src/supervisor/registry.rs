//! Process-wide registry of live children.
//!
//! Every supervisor registers its child here and gets back a private
//! `Registration`. The first registration installs one SIGINT/SIGTERM
//! listener and one process-exit hook; each of them walks the registry and
//! sends SIGTERM to every child still listed. The listener runs on its own
//! thread and runtime, so it outlives whichever runtime spawned the child.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, Once};

use tracing::{debug, info, warn};

/// Handle to one registry entry. Only the holder can remove it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Registration(u64);

#[derive(Debug)]
struct LiveChild {
    owner: String,
    pid: u32,
}

static LIVE_CHILDREN: LazyLock<Mutex<HashMap<u64, LiveChild>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

static INSTALL: Once = Once::new();

static LISTENER_ACTIVE: AtomicBool = AtomicBool::new(false);

fn children() -> MutexGuard<'static, HashMap<u64, LiveChild>> {
    LIVE_CHILDREN.lock().unwrap_or_else(|e| e.into_inner())
}

/// Track `pid` on behalf of `owner`, installing the shared handlers on first use.
pub fn register(owner: &str, pid: u32) -> Registration {
    INSTALL.call_once(install_handlers);
    let id = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
    children().insert(
        id,
        LiveChild {
            owner: owner.to_string(),
            pid,
        },
    );
    debug!(owner, pid, registration = id, "Registered child for exit cleanup");
    Registration(id)
}

pub fn unregister(registration: Registration) {
    if let Some(child) = children().remove(&registration.0) {
        debug!(owner = %child.owner, pid = child.pid, "Unregistered child");
    }
}

pub fn is_registered(registration: &Registration) -> bool {
    children().contains_key(&registration.0)
}

pub fn is_pid_registered(pid: u32) -> bool {
    children().values().any(|c| c.pid == pid)
}

pub fn live_count() -> usize {
    children().len()
}

/// Whether the SIGINT/SIGTERM listener is running.
pub fn signal_cleanup_installed() -> bool {
    LISTENER_ACTIVE.load(Ordering::Acquire)
}

/// Send SIGTERM to every registered child and clear the registry.
/// Returns how many signals were delivered.
pub fn terminate_all() -> usize {
    sweep(&mut children())
}

/// Exit-hook variant of `terminate_all`: skips the sweep instead of blocking
/// when the registry is locked.
fn terminate_all_on_exit() -> usize {
    match LIVE_CHILDREN.try_lock() {
        Ok(mut live) => sweep(&mut live),
        Err(_) => 0,
    }
}

fn sweep(live: &mut HashMap<u64, LiveChild>) -> usize {
    let mut delivered = 0;
    for (_, child) in live.drain() {
        match send_terminate(child.pid) {
            Ok(()) => delivered += 1,
            Err(e) => debug!(owner = %child.owner, pid = child.pid, error = %e, "Child already gone"),
        }
    }
    delivered
}

/// Deliver SIGTERM to the process group led by `pid`, or to `pid` alone when
/// it doesn't lead a group.
#[cfg(unix)]
pub fn send_terminate(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    if unsafe { libc::kill(-pid, libc::SIGTERM) } == 0 {
        return Ok(());
    }
    // SAFETY: as above.
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn send_terminate(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "terminate signal is only available on unix",
    ))
}

fn install_handlers() {
    install_exit_hook();

    // Listeners are registered before `register` returns, so a signal that
    // arrives right after the first spawn is already covered.
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<bool>();
    let spawned = std::thread::Builder::new()
        .name("launchpad-signals".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Failed to build signal runtime");
                    let _ = ready_tx.send(false);
                    return;
                }
            };
            runtime.block_on(async move {
                let Some(listener) = ShutdownListener::install() else {
                    let _ = ready_tx.send(false);
                    return;
                };
                LISTENER_ACTIVE.store(true, Ordering::Release);
                let _ = ready_tx.send(true);

                let code = listener.wait().await;
                let count = terminate_all();
                info!(children = count, exit_code = code, "Signal received, terminated children");
                std::process::exit(code);
            });
        });

    match spawned {
        Ok(_) => {
            if !ready_rx.recv().unwrap_or(false) {
                warn!("Signal cleanup not installed, exit hook only");
            }
        }
        Err(e) => warn!(error = %e, "Failed to spawn signal thread, exit hook only"),
    }
}

#[cfg(unix)]
struct ShutdownListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownListener {
    fn install() -> Option<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(interrupt), Ok(terminate)) => Some(Self {
                interrupt,
                terminate,
            }),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal listeners");
                None
            }
        }
    }

    /// Exit code for the signal that arrived: 130 for SIGINT, 143 for SIGTERM.
    async fn wait(mut self) -> i32 {
        tokio::select! {
            _ = self.interrupt.recv() => 130,
            _ = self.terminate.recv() => 143,
        }
    }
}

#[cfg(not(unix))]
struct ShutdownListener;

#[cfg(not(unix))]
impl ShutdownListener {
    fn install() -> Option<Self> {
        Some(Self)
    }

    async fn wait(self) -> i32 {
        match tokio::signal::ctrl_c().await {
            Ok(()) => 130,
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    }
}

extern "C" fn run_exit_cleanup() {
    terminate_all_on_exit();
}

fn install_exit_hook() {
    // SAFETY: registers a plain extern "C" fn with no captured state.
    let rc = unsafe { libc::atexit(run_exit_cleanup) };
    if rc != 0 {
        warn!("Failed to register process-exit cleanup");
    }
}
