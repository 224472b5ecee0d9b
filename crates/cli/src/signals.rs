//! Process signal handling (`spec.md` §6): `SIGTERM` triggers graceful
//! shutdown, `SIGUSR2` triggers a restart, `SIGINT` is treated the same as
//! `SIGTERM` for the long-running gateway process (the client-disconnect
//! meaning of `SIGINT` applies to the interactive CLI, which is a separate
//! binary invocation, not this listener).

use anyhow::{Context, Result};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Restart,
}

pub struct Signals {
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl Signals {
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

/// Spawn one task per signal kind, each forwarding onto a shared channel so
/// the caller can `select!`/loop over whichever fires first.
pub fn install() -> Result<Signals> {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, rx) = mpsc::unbounded_channel();

    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut usr2 = signal(SignalKind::user_defined2()).context("installing SIGUSR2 handler")?;

    let term_tx = tx.clone();
    tokio::spawn(async move {
        while term.recv().await.is_some() {
            let _ = term_tx.send(Signal::Terminate);
        }
    });
    let int_tx = tx.clone();
    tokio::spawn(async move {
        while int.recv().await.is_some() {
            let _ = int_tx.send(Signal::Terminate);
        }
    });
    tokio::spawn(async move {
        while usr2.recv().await.is_some() {
            let _ = tx.send(Signal::Restart);
        }
    });

    Ok(Signals { rx })
}

/// Re-exec the process in place: spawn a fresh copy with the same
/// executable path and arguments, then exit this one. A true `execve`
/// replace-in-place would need a direct libc binding this workspace does
/// not otherwise carry; spawn-then-exit gives the same observable restart
/// behavior (new PID, fresh state, same args) without adding one.
pub fn reexec() -> ! {
    let exe = std::env::current_exe().unwrap_or_else(|_| "vargos".into());
    let args: Vec<String> = std::env::args().skip(1).collect();
    let _ = std::process::Command::new(exe).args(args).spawn();
    std::process::exit(0);
}
