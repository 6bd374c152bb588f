//! Spawning and reaping scratchpad processes.
//!
//! Commands run through `sh -c`.  Each spawned child gets a watcher task
//! that waits for it and posts an `exited` notice onto the owning plugin's
//! queue, so the exit is handled serially like any other job.  The exit
//! code is also handed to whoever is waiting for the child's window.

use crate::manager::queue::Mailbox;
use log::{debug, warn};
use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tokio::process::Command;
use tokio::sync::oneshot;

/// Prefix of the notice posted when a spawned process exits.
pub const EXITED_NOTICE: &str = "exited";

#[derive(Debug, thiserror::Error)]
#[error("failed to start `{command}`: {source}")]
pub struct SpawnError {
    command: String,
    #[source]
    source: std::io::Error,
}

/// A started child process.
#[derive(Debug)]
pub struct Spawned {
    pub pid: u32,
    /// Resolves once the child exits, with its exit code (`None` when it
    /// was killed by a signal).
    pub exited: oneshot::Receiver<Option<i32>>,
}

/// Start `command` for scratchpad `name`.
pub fn spawn(name: &str, command: &str, mailbox: &Mailbox) -> Result<Spawned, SpawnError> {
    let failed = |source| SpawnError {
        command: command.to_string(),
        source,
    };
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .spawn()
        .map_err(failed)?;
    let pid = child
        .id()
        .ok_or_else(|| failed(std::io::Error::other("process exited before it was tracked")))?;
    debug!("[{}] started `{}` as pid {}", name, command, pid);

    let mailbox = mailbox.clone();
    let notice = exited_notice(name, pid);
    let (exit_tx, exited) = oneshot::channel();
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => {
                debug!("pid {} exited: {}", pid, status);
                status.code()
            }
            Err(e) => {
                warn!("waiting for pid {} failed: {}", pid, e);
                None
            }
        };
        let _ = exit_tx.send(code);
        mailbox.post(notice);
    });
    Ok(Spawned { pid, exited })
}

pub fn exited_notice(name: &str, pid: u32) -> String {
    format!("{} {} {}", EXITED_NOTICE, name, pid)
}

/// Parse a notice built by [`exited_notice`].
pub fn parse_exited_notice(notice: &str) -> Option<(&str, u32)> {
    let mut parts = notice.split(' ');
    if parts.next()? != EXITED_NOTICE {
        return None;
    }
    let name = parts.next()?;
    let pid = parts.next()?.parse().ok()?;
    Some((name, pid))
}

/// `root` and all its live descendants.
pub fn process_tree(root: u32) -> HashSet<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    let mut tree: HashSet<u32> = HashSet::from([root]);
    loop {
        let before = tree.len();
        for (pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                if tree.contains(&parent.as_u32()) {
                    tree.insert(pid.as_u32());
                }
            }
        }
        if tree.len() == before {
            return tree;
        }
    }
}

fn alive(system: &mut System, pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}

/// Send SIGTERM to `root` and its descendants, then SIGKILL whatever is
/// still alive after `grace`.
pub async fn terminate(root: u32, grace: Duration) {
    let tree = process_tree(root);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    for pid in &tree {
        if let Some(process) = system.process(Pid::from_u32(*pid)) {
            process.kill_with(Signal::Term);
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !tree.iter().any(|pid| alive(&mut system, *pid)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    for pid in &tree {
        if alive(&mut system, *pid) {
            warn!("pid {} ignored SIGTERM, killing it", pid);
            if let Some(process) = system.process(Pid::from_u32(*pid)) {
                process.kill_with(Signal::Kill);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::queue::Job;
    use tokio::sync::mpsc;

    #[test]
    fn notices_round_trip() {
        let notice = exited_notice("term", 4242);
        assert_eq!(notice, "exited term 4242");
        assert_eq!(parse_exited_notice(&notice), Some(("term", 4242)));
        assert_eq!(parse_exited_notice("something else"), None);
    }

    #[tokio::test]
    async fn exit_is_posted_to_the_mailbox() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pid = spawn("quick", "exit 0", &Mailbox::new(tx)).unwrap().pid;
        match rx.recv().await {
            Some(Job::Notice(notice)) => assert_eq!(notice, exited_notice("quick", pid)),
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[tokio::test]
    async fn terminate_stops_a_running_process() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let child = spawn("sleeper", "exec sleep 30", &Mailbox::new(tx)).unwrap();
        let pid = child.pid;
        assert!(process_tree(pid).contains(&pid));
        terminate(pid, Duration::from_secs(1)).await;
        let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(notice, Ok(Some(Job::Notice(_)))));
        assert_eq!(child.exited.await.unwrap(), None);
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let failing = spawn("broken", "exit 3", &Mailbox::new(tx.clone())).unwrap();
        assert_eq!(failing.exited.await.unwrap(), Some(3));
        let clean = spawn("done", "true", &Mailbox::new(tx)).unwrap();
        assert_eq!(clean.exited.await.unwrap(), Some(0));
    }
}
