//! # Process-tree termination.
//!
//! ```text
//! collect_tree(root)              snapshot before signalling (children reparent once the root dies)
//! terminate  deepest → root       children first
//! poll every 50ms until all dead  or `grace` elapses
//! kill       deepest → root       survivors only
//! poll until all dead             or `kill_wait` elapses
//! reap(root)                      exit code
//! ```

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::{Instant, sleep};

use super::{Pid, ProcessControl};

const POLL: Duration = Duration::from_millis(50);

/// Result of [`stop_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// Every member exited before the grace period ran out.
    pub graceful: bool,
    /// Some member survived even SIGKILL within `kill_wait`.
    pub survivors: bool,
    /// Exit code of the root if it could be reaped.
    pub exit_code: Option<i32>,
}

/// Breadth-first list of `root` and all its descendants, root first.
pub fn collect_tree(ctl: &dyn ProcessControl, root: Pid) -> Vec<Pid> {
    let mut seen = HashSet::from([root]);
    let mut out = vec![root];
    let mut queue = VecDeque::from([root]);

    while let Some(pid) = queue.pop_front() {
        for child in ctl.children(pid) {
            if seen.insert(child) {
                out.push(child);
                queue.push_back(child);
            }
        }
    }
    out
}

/// Terminates `root` and every descendant, escalating to SIGKILL after `grace`.
///
/// Signal failures other than "no such process" are logged and the sequence continues.
pub async fn stop_tree(
    ctl: &dyn ProcessControl,
    root: Pid,
    grace: Duration,
    kill_wait: Duration,
) -> StopOutcome {
    let tree = collect_tree(ctl, root);

    for &pid in tree.iter().rev() {
        if let Err(e) = ctl.terminate(pid) {
            tracing::warn!(pid, error = %e, "terminate failed");
        }
    }

    let mut exit_code = None;
    let graceful = wait_all_dead(ctl, &tree, grace, &mut exit_code).await;
    let mut survivors = false;

    if !graceful {
        for &pid in tree.iter().rev() {
            if ctl.is_alive(pid) {
                tracing::debug!(pid, "escalating to SIGKILL");
                if let Err(e) = ctl.kill(pid) {
                    tracing::warn!(pid, error = %e, "kill failed");
                }
            }
        }
        survivors = !wait_all_dead(ctl, &tree, kill_wait, &mut exit_code).await;
        if survivors {
            tracing::warn!(root, "process tree survived SIGKILL");
        }
    }

    StopOutcome {
        graceful,
        survivors,
        exit_code: exit_code.or_else(|| ctl.reap(root)),
    }
}

/// Polls until every pid is dead; `pids[0]` is the root and is reaped as soon as it exits.
async fn wait_all_dead(
    ctl: &dyn ProcessControl,
    pids: &[Pid],
    limit: Duration,
    root_code: &mut Option<i32>,
) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if root_code.is_none() {
            *root_code = ctl.reap(pids[0]);
        }
        if pids.iter().all(|&p| !ctl.is_alive(p)) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::error::OsError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Term(Pid),
        Kill(Pid),
    }

    /// Fake tree: pid → children; `stubborn` pids ignore SIGTERM.
    #[derive(Default)]
    struct FakeControl {
        tree: HashMap<Pid, Vec<Pid>>,
        alive: Mutex<HashSet<Pid>>,
        stubborn: HashSet<Pid>,
        calls: Mutex<Vec<Call>>,
        codes: Mutex<HashMap<Pid, i32>>,
    }

    impl FakeControl {
        fn new(tree: &[(Pid, Vec<Pid>)], stubborn: &[Pid]) -> Self {
            let mut alive = HashSet::new();
            let mut map = HashMap::new();
            for (p, kids) in tree {
                alive.insert(*p);
                alive.extend(kids.iter().copied());
                map.insert(*p, kids.clone());
            }
            Self {
                tree: map,
                alive: Mutex::new(alive),
                stubborn: stubborn.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessControl for FakeControl {
        fn children(&self, pid: Pid) -> Vec<Pid> {
            self.tree.get(&pid).cloned().unwrap_or_default()
        }

        fn is_alive(&self, pid: Pid) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }

        fn terminate(&self, pid: Pid) -> Result<(), OsError> {
            self.calls.lock().unwrap().push(Call::Term(pid));
            if !self.stubborn.contains(&pid) && self.alive.lock().unwrap().remove(&pid) {
                self.codes.lock().unwrap().insert(pid, 143);
            }
            Ok(())
        }

        fn kill(&self, pid: Pid) -> Result<(), OsError> {
            self.calls.lock().unwrap().push(Call::Kill(pid));
            if self.alive.lock().unwrap().remove(&pid) {
                self.codes.lock().unwrap().insert(pid, 137);
            }
            Ok(())
        }

        fn reap(&self, pid: Pid) -> Option<i32> {
            self.codes.lock().unwrap().get(&pid).copied()
        }
    }

    #[test]
    fn collect_is_breadth_first_and_deduplicated() {
        let ctl = FakeControl::new(&[(1, vec![2, 3]), (2, vec![4]), (3, vec![4])], &[]);
        assert_eq!(collect_tree(&ctl, 1), vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn children_are_terminated_before_root() {
        let ctl = FakeControl::new(&[(10, vec![11, 12]), (11, vec![13])], &[]);

        let out = stop_tree(&ctl, 10, Duration::from_secs(5), Duration::from_secs(1)).await;

        assert!(out.graceful);
        assert!(!out.survivors);
        assert_eq!(out.exit_code, Some(143));
        assert_eq!(
            ctl.calls(),
            vec![Call::Term(13), Call::Term(12), Call::Term(11), Call::Term(10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stubborn_members_are_killed_after_grace() {
        let ctl = FakeControl::new(&[(10, vec![11])], &[11]);

        let out = stop_tree(&ctl, 10, Duration::from_secs(2), Duration::from_secs(1)).await;

        assert!(!out.graceful);
        assert!(!out.survivors);
        assert_eq!(out.exit_code, Some(143));
        let calls = ctl.calls();
        assert_eq!(&calls[..2], &[Call::Term(11), Call::Term(10)]);
        assert_eq!(&calls[2..], &[Call::Kill(11)]);
        assert!(!ctl.is_alive(11));
    }
}
