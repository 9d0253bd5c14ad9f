use dfs_lib::{DfsError, DfsPath, DfsResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// One queued lock request. The notify is a one-shot signal: it fires once,
/// when the waiter reaches the head of the queue and may proceed.
struct Waiter {
    exclusive: bool,
    notify: Notify,
}

#[derive(Default)]
struct CellState {
    /// Pending waiters in arrival order. The head may already have been
    /// signalled; it removes itself when it takes the lock.
    queue: VecDeque<Arc<Waiter>>,
    /// Live holders of this cell.
    count: usize,
    /// Mode of the current holders. Meaningless while `count == 0`.
    exclusive: bool,
}

struct LockCell {
    state: Mutex<CellState>,
}

impl LockCell {
    fn new() -> Self {
        Self {
            state: Mutex::new(CellState::default()),
        }
    }
}

/// Fair hierarchical reader-writer locks, one cell per path.
///
/// Acquiring a path takes a shared lock on every strict ancestor plus the
/// requested mode on the path itself, walking from the root downward.
/// Every caller walks in the same order and never takes an ancestor while
/// holding a descendant, so hierarchical waiters cannot form a cycle.
/// Callers locking two sibling paths must order them by the path ordering.
///
/// Cells are created lazily on first use and never destroyed; the map is
/// bounded by the set of paths ever locked. Existence of the path in the
/// namespace is the caller's concern, not this manager's.
pub(crate) struct PathLockMgr {
    cells: Mutex<HashMap<DfsPath, Arc<LockCell>>>,
}

impl PathLockMgr {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Block until the caller holds `path` in the requested mode and every
    /// strict ancestor in shared mode.
    pub async fn acquire(&self, path: &DfsPath, exclusive: bool) {
        for prefix in path.prefixes() {
            let want_exclusive = exclusive && prefix == *path;
            let cell = self.cell(prefix);
            Self::acquire_cell(&cell, want_exclusive).await;
        }
    }

    /// Release the chain taken by `acquire`, walking from `path` back to the
    /// root. The mode is not verified against the holder: callers are
    /// trusted to release what they acquired.
    pub fn release(&self, path: &DfsPath, _exclusive: bool) -> DfsResult<()> {
        {
            let cells = self.cells.lock().unwrap();
            let cell = cells
                .get(path)
                .ok_or_else(|| DfsError::InvalidState(format!("no lock taken on {}", path)))?;
            let state = cell.state.lock().unwrap();
            if state.count == 0 {
                return Err(DfsError::InvalidState(format!("no lock held on {}", path)));
            }
        }

        let chain: Vec<DfsPath> = path.prefixes().collect();
        for prefix in chain.iter().rev() {
            let cell = {
                let cells = self.cells.lock().unwrap();
                cells.get(prefix).cloned()
            }
            .ok_or_else(|| DfsError::InvalidState(format!("no lock taken on {}", prefix)))?;

            let mut state = cell.state.lock().unwrap();
            state.count = state
                .count
                .checked_sub(1)
                .ok_or_else(|| DfsError::InvalidState(format!("no lock held on {}", prefix)))?;
            Self::signal_head(&state);
        }
        Ok(())
    }

    /// Current holder count for a path, zero when never locked.
    #[cfg(test)]
    pub fn held_count(&self, path: &DfsPath) -> usize {
        let cells = self.cells.lock().unwrap();
        cells
            .get(path)
            .map(|cell| cell.state.lock().unwrap().count)
            .unwrap_or(0)
    }

    fn cell(&self, path: DfsPath) -> Arc<LockCell> {
        let mut cells = self.cells.lock().unwrap();
        cells
            .entry(path)
            .or_insert_with(|| Arc::new(LockCell::new()))
            .clone()
    }

    async fn acquire_cell(cell: &LockCell, exclusive: bool) {
        let waiter = Arc::new(Waiter {
            exclusive,
            notify: Notify::new(),
        });
        {
            let mut state = cell.state.lock().unwrap();
            state.queue.push_back(waiter.clone());
        }
        loop {
            {
                let mut state = cell.state.lock().unwrap();
                if Self::runnable(&state, &waiter) {
                    state.count += 1;
                    state.exclusive = waiter.exclusive;
                    state.queue.pop_front();
                    // Consecutive shared waiters proceed as a batch: each
                    // grant immediately signals the next head if compatible.
                    Self::signal_head(&state);
                    return;
                }
            }
            // A wake that arrives while we are still incompatible is treated
            // as spurious: re-check and wait again.
            waiter.notify.notified().await;
        }
    }

    /// A waiter may proceed iff it is at the head of the queue and either the
    /// cell is free or both the holders and the waiter are shared.
    fn runnable(state: &CellState, waiter: &Arc<Waiter>) -> bool {
        match state.queue.front() {
            Some(head) if Arc::ptr_eq(head, waiter) => {
                state.count == 0 || (!state.exclusive && !waiter.exclusive)
            }
            _ => false,
        }
    }

    fn signal_head(state: &CellState) {
        if let Some(head) = state.queue.front() {
            if state.count == 0 || (!state.exclusive && !head.exclusive) {
                head.notify.notify_one();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    fn p(s: &str) -> DfsPath {
        DfsPath::new(s).unwrap()
    }

    const TICK: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_acquire_release_restores_counts() {
        let mgr = PathLockMgr::new();
        let path = p("/a/b/c");

        mgr.acquire(&path, true).await;
        assert_eq!(mgr.held_count(&DfsPath::root()), 1);
        assert_eq!(mgr.held_count(&p("/a")), 1);
        assert_eq!(mgr.held_count(&p("/a/b")), 1);
        assert_eq!(mgr.held_count(&path), 1);

        mgr.release(&path, true).unwrap();
        assert_eq!(mgr.held_count(&DfsPath::root()), 0);
        assert_eq!(mgr.held_count(&p("/a")), 0);
        assert_eq!(mgr.held_count(&p("/a/b")), 0);
        assert_eq!(mgr.held_count(&path), 0);
    }

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let mgr = PathLockMgr::new();
        let path = p("/a");
        mgr.acquire(&path, false).await;
        mgr.acquire(&path, false).await;
        assert_eq!(mgr.held_count(&path), 2);
        mgr.release(&path, false).unwrap();
        mgr.release(&path, false).unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_excludes_in_enqueue_order() {
        let mgr = Arc::new(PathLockMgr::new());
        let path = p("/a");
        mgr.acquire(&path, true).await;

        let order = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for i in 1..=2 {
            let mgr = mgr.clone();
            let path = path.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                mgr.acquire(&path, true).await;
                let granted = order.fetch_add(1, Ordering::SeqCst) + 1;
                mgr.release(&path, true).unwrap();
                (i, granted)
            }));
            // Let the i-th waiter enqueue before spawning the next.
            tokio::time::sleep(TICK).await;
        }

        // Neither waiter can proceed while the first holder is live.
        tokio::time::sleep(TICK).await;
        assert_eq!(order.load(Ordering::SeqCst), 0);

        mgr.release(&path, true).unwrap();
        for (expected, handle) in handles.into_iter().enumerate() {
            let (i, granted) = handle.await.unwrap();
            assert_eq!(i, expected + 1);
            assert_eq!(granted, expected + 1);
        }
    }

    #[tokio::test]
    async fn test_descendant_blocks_on_exclusive_ancestor() {
        let mgr = Arc::new(PathLockMgr::new());
        mgr.acquire(&p("/a"), true).await;

        let blocked = {
            let mgr = mgr.clone();
            tokio::spawn(async move {
                mgr.acquire(&p("/a/b"), false).await;
                mgr.release(&p("/a/b"), false).unwrap();
            })
        };

        tokio::time::sleep(TICK).await;
        assert!(!blocked.is_finished());

        mgr.release(&p("/a"), true).unwrap();
        timeout(Duration::from_secs(5), blocked)
            .await
            .expect("descendant lock should proceed after ancestor release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shared_batch_released_together() {
        let mgr = Arc::new(PathLockMgr::new());
        let path = p("/a");
        mgr.acquire(&path, true).await;

        let mut readers = Vec::new();
        for _ in 0..3 {
            let mgr = mgr.clone();
            let path = path.clone();
            readers.push(tokio::spawn(async move {
                mgr.acquire(&path, false).await;
            }));
        }
        tokio::time::sleep(TICK).await;
        assert_eq!(mgr.held_count(&path), 1);

        mgr.release(&path, true).unwrap();
        for reader in readers {
            timeout(Duration::from_secs(5), reader).await.unwrap().unwrap();
        }
        // All three shared holders are live at once.
        assert_eq!(mgr.held_count(&path), 3);
    }

    #[tokio::test]
    async fn test_reader_cannot_overtake_queued_writer() {
        let mgr = Arc::new(PathLockMgr::new());
        let path = p("/a");
        mgr.acquire(&path, false).await;

        let writer = {
            let mgr = mgr.clone();
            let path = path.clone();
            tokio::spawn(async move {
                mgr.acquire(&path, true).await;
            })
        };
        tokio::time::sleep(TICK).await;

        let late_reader = {
            let mgr = mgr.clone();
            let path = path.clone();
            tokio::spawn(async move {
                mgr.acquire(&path, false).await;
            })
        };
        tokio::time::sleep(TICK).await;

        // The late reader queues behind the writer even though a shared
        // holder is live.
        assert!(!writer.is_finished());
        assert!(!late_reader.is_finished());
        assert_eq!(mgr.held_count(&path), 1);

        mgr.release(&path, false).unwrap();
        timeout(Duration::from_secs(5), writer).await.unwrap().unwrap();
        mgr.release(&path, true).unwrap();
        timeout(Duration::from_secs(5), late_reader)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_without_hold_is_rejected() {
        let mgr = PathLockMgr::new();
        let err = mgr.release(&p("/a"), false).unwrap_err();
        assert!(matches!(err, DfsError::InvalidState(_)));

        mgr.acquire(&p("/a"), false).await;
        mgr.release(&p("/a"), false).unwrap();
        let err = mgr.release(&p("/a"), false).unwrap_err();
        assert!(matches!(err, DfsError::InvalidState(_)));
    }
}
