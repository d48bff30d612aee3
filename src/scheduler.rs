//! A priority queue of periodic tasks with precise sleep, frameskip policy
//! and a decoupled "freewheel" mode for export.

use std::time::{Duration, Instant};

/// A clock abstraction so freewheel (virtual, export) scheduling and
/// realtime (wallclock) scheduling share the same tick logic. Realtime uses
/// [`Instant::now`]; freewheel advances only when [`VirtualClock::advance`]
/// is called, which the scheduler does itself once per task run.
trait ClockSource {
    fn now(&self) -> f64;
    fn sleep_until(&mut self, deadline: f64, precise: bool);
}

struct WallClock {
    origin: Instant,
}

impl WallClock {
    fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl ClockSource for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep_until(&mut self, deadline: f64, precise: bool) {
        loop {
            let remaining = deadline - self.now();
            if remaining <= 0.0 {
                return;
            }
            if precise && remaining < 0.002 {
                // Hybrid sleep: coarse-sleep most of the wait, then busy
                // spin for the last ~2ms where `sleep` is unreliable.
                while self.now() < deadline {
                    std::hint::spin_loop();
                }
                return;
            }
            let sleep_for = if precise { remaining - 0.001 } else { remaining };
            if sleep_for > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(sleep_for));
            }
        }
    }
}

/// A task's identity within the scheduler. Stable across `next()` calls
/// until the task is disabled and compacted away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

/// What a due task receives when it runs.
pub struct TaskContext {
    pub dt: f64,
    pub now: f64,
}

pub struct Task {
    pub id: TaskId,
    pub name: String,
    callback: Box<dyn FnMut(TaskContext) + Send>,
    pub frequency: f64,
    pub freewheel: bool,
    pub frameskip: bool,
    pub precise: bool,
    pub once: bool,
    pub enabled: bool,
    pub next_call: f64,
    pub last_call: f64,
    pub started: bool,
}

impl Task {
    fn period(&self) -> f64 {
        if self.frequency > 0.0 {
            1.0 / self.frequency
        } else {
            0.0
        }
    }
}

/// FIFO-ordered task queue: `once`-tasks sort first, otherwise ascending by
/// `next_call`.
pub struct Scheduler {
    tasks: Vec<Task>,
    next_id: u64,
    wall: WallClock,
    virtual_time: f64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { tasks: Vec::new(), next_id: 1, wall: WallClock::new(), virtual_time: 0.0 }
    }

    pub fn add<F>(
        &mut self,
        name: impl Into<String>,
        frequency: f64,
        freewheel: bool,
        frameskip: bool,
        precise: bool,
        once: bool,
        callback: F,
    ) -> TaskId
    where
        F: FnMut(TaskContext) + Send + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let now = self.clock_now(freewheel);
        let period = if frequency > 0.0 { 1.0 / frequency } else { 0.0 };
        self.tasks.push(Task {
            id,
            name: name.into(),
            callback: Box::new(callback),
            frequency,
            freewheel,
            frameskip,
            precise,
            once,
            enabled: true,
            next_call: now + period,
            last_call: now,
            started: false,
        });
        self.sort();
        id
    }

    fn clock_now(&self, freewheel: bool) -> f64 {
        if freewheel {
            self.virtual_time
        } else {
            self.wall.now()
        }
    }

    fn sort(&mut self) {
        self.tasks.sort_by(|a, b| match (a.once, b.once) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => a.next_call.partial_cmp(&b.next_call).unwrap_or(std::cmp::Ordering::Equal),
        });
    }

    pub fn disable(&mut self, id: TaskId) {
        if let Some(t) = self.tasks.iter_mut().find(|t| t.id == id) {
            t.enabled = false;
        }
        self.compact();
    }

    fn compact(&mut self) {
        self.tasks.retain(|t| t.enabled);
    }

    /// Pop and run the earliest-due enabled task. If `block` is `false` and
    /// the earliest task is not yet due (and not freewheel), returns
    /// `false` without running anything. Returns `true` if a task ran.
    pub fn next(&mut self, block: bool) -> bool {
        let idx = match self.tasks.iter().position(|t| t.enabled) {
            Some(i) => i,
            None => return false,
        };

        let freewheel = self.tasks[idx].freewheel;
        let due = self.tasks[idx].next_call;
        let now = self.clock_now(freewheel);

        if !freewheel && !block && now < due {
            return false;
        }

        if !freewheel {
            self.wall.sleep_until(due, self.tasks[idx].precise);
        } else {
            self.virtual_time = due;
        }

        let now = self.clock_now(freewheel);
        let period = self.tasks[idx].period();
        let last_call = self.tasks[idx].last_call;
        let frameskip = self.tasks[idx].frameskip;

        let dt = if frameskip {
            now - last_call
        } else {
            period.max(1e-9)
        };

        self.tasks[idx].last_call = now;
        self.tasks[idx].started = true;
        (self.tasks[idx].callback)(TaskContext { dt, now });

        // Advance next_call by whole multiples of the period until it is
        // strictly in the future, avoiding float-accumulation drift.
        if period > 0.0 {
            let mut next_call = self.tasks[idx].next_call;
            while next_call <= now {
                next_call += period;
            }
            self.tasks[idx].next_call = next_call;
        } else {
            self.tasks[idx].next_call = now;
        }

        if self.tasks[idx].once {
            self.tasks[idx].enabled = false;
        }

        self.sort();
        self.compact();
        true
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn virtual_time(&self) -> f64 {
        self.virtual_time
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn freewheel_advances_virtual_clock_without_drift() {
        let mut s = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        s.add("render", 60.0, true, false, false, false, move |_ctx| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..600 {
            assert!(s.next(true));
        }

        assert_eq!(count.load(Ordering::SeqCst), 600);
        assert!((s.virtual_time() - 10.0).abs() < 1e-9, "virtual_time={}", s.virtual_time());
    }

    #[test]
    fn once_task_disables_and_compacts() {
        let mut s = Scheduler::new();
        s.add("oneshot", 0.0, true, false, false, true, |_| {});
        assert_eq!(s.len(), 1);
        assert!(s.next(true));
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn once_tasks_sort_before_periodic() {
        let mut s = Scheduler::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        s.add("periodic", 60.0, true, false, false, false, move |_| {
            o1.lock().unwrap().push("periodic");
        });
        let o2 = order.clone();
        s.add("oneshot", 0.0, true, false, false, true, move |_| {
            o2.lock().unwrap().push("oneshot");
        });

        s.next(true);
        assert_eq!(*order.lock().unwrap(), vec!["oneshot"]);
    }

    #[test]
    fn non_blocking_skip_when_not_due() {
        let mut s = Scheduler::new();
        s.add("slow", 1.0, false, false, false, false, |_| {});
        // Push the task's due time far into the future, then poll
        // non-blocking: it must not fire.
        s.tasks[0].next_call += 100.0;
        assert!(!s.next(false));
    }
}
