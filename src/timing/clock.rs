use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Delayed-callback capability the sequencer waits on between steps.
///
/// `cancel` removes a timer that has not come due yet. A callback the clock
/// has already taken off its queue may still run after `cancel` returns, so
/// callbacks must check for themselves whether their work is still wanted.
/// Cancelling a handle that already fired is a no-op.
pub trait Clock: Send + Sync {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
    fn cancel(&self, handle: TimerHandle);
}

struct TimerQueue {
    by_deadline: BTreeMap<(Instant, TimerHandle), TimerCallback>,
    deadlines: HashMap<TimerHandle, Instant>,
}

impl TimerQueue {
    fn pop_due(&mut self, now: Instant) -> Result<TimerCallback, Option<Duration>> {
        let Some((&(deadline, handle), _)) = self.by_deadline.first_key_value() else {
            return Err(None);
        };
        if deadline > now {
            return Err(Some(deadline - now));
        }
        self.deadlines.remove(&handle);
        match self.by_deadline.remove(&(deadline, handle)) {
            Some(callback) => Ok(callback),
            None => Err(Some(Duration::ZERO)),
        }
    }
}

/// Wall-clock timers served by one background thread.
pub struct ThreadClock {
    queue: Arc<Mutex<TimerQueue>>,
    wake_tx: Sender<()>,
    next_id: AtomicU64,
}

impl ThreadClock {
    /// Starts the timer thread. Fails only if the thread cannot be spawned.
    pub fn new() -> std::io::Result<Self> {
        let queue = Arc::new(Mutex::new(TimerQueue {
            by_deadline: BTreeMap::new(),
            deadlines: HashMap::new(),
        }));
        let (wake_tx, wake_rx) = channel::unbounded();

        let thread_queue = queue.clone();
        std::thread::Builder::new()
            .name("chordline-clock".into())
            .spawn(move || timer_thread(thread_queue, wake_rx))?;

        Ok(Self {
            queue,
            wake_tx,
            next_id: AtomicU64::new(1),
        })
    }
}

impl Clock for ThreadClock {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + delay;
        {
            let mut queue = self.queue.lock();
            queue.by_deadline.insert((deadline, handle), callback);
            queue.deadlines.insert(handle, deadline);
        }
        let _ = self.wake_tx.send(());
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut queue = self.queue.lock();
        if let Some(deadline) = queue.deadlines.remove(&handle) {
            queue.by_deadline.remove(&(deadline, handle));
        }
    }
}

fn timer_thread(queue: Arc<Mutex<TimerQueue>>, wake_rx: Receiver<()>) {
    loop {
        let next = queue.lock().pop_due(Instant::now());
        match next {
            Ok(callback) => callback(),
            Err(Some(wait)) => match wake_rx.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            },
            Err(None) => {
                if wake_rx.recv().is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("clock thread exiting");
}

struct ManualTimers {
    now: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, TimerHandle), TimerCallback>,
}

/// A clock whose time only moves when told to. Timers fire on the caller's
/// thread, in deadline order, from `fire_next`, `advance` or
/// `run_until_idle`.
pub struct ManualClock {
    timers: Mutex<ManualTimers>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            timers: Mutex::new(ManualTimers {
                now: Duration::ZERO,
                next_id: 1,
                queue: BTreeMap::new(),
            }),
        }
    }

    /// Virtual time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.timers.lock().now
    }

    pub fn pending(&self) -> usize {
        self.timers.lock().queue.len()
    }

    /// Fires the earliest timer, moving virtual time to its deadline.
    /// Returns false when nothing is scheduled.
    pub fn fire_next(&self) -> bool {
        self.fire_due(None)
    }

    /// Moves virtual time forward by `by`, firing every timer that comes due
    /// on the way, including timers scheduled by those callbacks.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;
        while self.fire_due(Some(target)) {
            fired += 1;
        }
        self.timers.lock().now = target;
        fired
    }

    /// Fires timers until none are left.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while self.fire_next() {
            fired += 1;
        }
        fired
    }

    fn fire_due(&self, limit: Option<Duration>) -> bool {
        let callback = {
            let mut timers = self.timers.lock();
            let due = match (timers.queue.first_key_value(), limit) {
                (None, _) => false,
                (Some(((deadline, _), _)), Some(limit)) => *deadline <= limit,
                (Some(_), None) => true,
            };
            if !due {
                return false;
            }
            match timers.queue.pop_first() {
                Some(((deadline, _), callback)) => {
                    timers.now = timers.now.max(deadline);
                    callback
                }
                None => return false,
            }
        };
        callback();
        true
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut timers = self.timers.lock();
        let handle = TimerHandle(timers.next_id);
        timers.next_id += 1;
        let deadline = timers.now + delay;
        timers.queue.insert((deadline, handle), callback);
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.timers.lock().queue.retain(|(_, h), _| *h != handle);
    }
}
