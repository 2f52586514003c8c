use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering},
        RwLock,
    },
    time::{Duration, Instant},
};

pub type TimerId = u64;

/// Identifier of a timer that is not scheduled. Real ids start at 1.
pub const INVALID_TIMER_ID: TimerId = 0;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
struct TimerKey {
    execute_at: Instant,
    timer_id: TimerId,
}

/// One-shot timer service. Scheduling returns an id usable with `cancel`;
/// `poll` drains everything due at `now` together with its id.
pub struct Timer<T> {
    tasks: RwLock<BTreeMap<TimerKey, T>>,
    id_to_tasks: RwLock<HashMap<TimerId, Instant>>,
    last_timer_id: AtomicU64,
}

impl<T> Timer<T> {
    pub fn new() -> Self {
        Timer {
            tasks: RwLock::new(BTreeMap::new()),
            id_to_tasks: RwLock::new(HashMap::new()),
            last_timer_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.read().map(|ts| ts.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timeout(&self, duration: Duration, value: T) -> TimerId {
        self.timeout_at(Instant::now() + duration, value)
    }

    pub fn timeout_at(&self, execute_at: Instant, value: T) -> TimerId {
        let timer_id = self.last_timer_id.fetch_add(1, Ordering::Relaxed);
        self.tasks
            .write()
            .as_mut()
            .map(|ts| {
                ts.insert(
                    TimerKey {
                        execute_at,
                        timer_id,
                    },
                    value,
                )
            })
            .ok();

        self.id_to_tasks
            .write()
            .as_mut()
            .map(|it| it.insert(timer_id, execute_at))
            .ok();
        timer_id
    }

    pub fn cancel(&self, timer_id: TimerId) -> Option<T> {
        let position = self
            .id_to_tasks
            .write()
            .as_mut()
            .map(|it| it.remove(&timer_id))
            .ok()
            .flatten();

        if let Some(execute_at) = position {
            self.tasks
                .write()
                .as_mut()
                .map(|ts| {
                    ts.remove(&TimerKey {
                        execute_at,
                        timer_id,
                    })
                })
                .ok()
                .flatten()
        } else {
            None
        }
    }

    pub fn poll(&self, now: Instant) -> Vec<(TimerId, T)> {
        let mut result = Vec::new();
        let keys_to_remove = {
            let mut tasks = match self.tasks.write() {
                Ok(tasks) => tasks,
                Err(_) => return result,
            };

            let keys_to_remove = tasks
                .range(
                    ..=TimerKey {
                        execute_at: now,
                        timer_id: TimerId::MAX,
                    },
                )
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();

            if keys_to_remove.is_empty() {
                return result;
            }
            result.reserve(keys_to_remove.len());
            for key in keys_to_remove.iter() {
                tasks
                    .remove(key)
                    .map(|value| result.push((key.timer_id, value)));
            }
            keys_to_remove
        };
        {
            self.id_to_tasks
                .write()
                .as_mut()
                .map(|it| {
                    for key in keys_to_remove {
                        it.remove(&key.timer_id);
                    }
                })
                .ok();
        }
        result
    }
}

#[test]
fn test_timer() {
    let timer = Timer::new();
    let now = Instant::now();
    let timer_id = timer.timeout_at(now, "task1");
    assert_ne!(timer_id, INVALID_TIMER_ID);
    assert_eq!(timer.cancel(timer_id), Some("task1"));
    assert_eq!(timer.cancel(timer_id), None);

    let task2_id = timer.timeout_at(now, "task2");
    let must_has_task_2 = timer.poll(now + Duration::from_secs(1));
    assert_eq!(must_has_task_2, vec![(task2_id, "task2")]);

    timer.timeout_at(now + Duration::from_millis(1001), "task3");
    let non_tasks = timer.poll(now + Duration::from_secs(1));
    assert_eq!(non_tasks.len(), 0);
    assert_eq!(timer.len(), 1);
}
