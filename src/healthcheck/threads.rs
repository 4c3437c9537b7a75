use crate::healthcheck::info_thread::{InfoThread, ThreadStatus};

use chrono::Utc;
use parking_lot::RwLock;

use std::collections::hash_map::HashMap;
use std::vec::Vec;


/// Registry of worker self-monitoring records. Each record is written only
/// by its owning worker; the lock is held just long enough to update or
/// clone the map, never for the duration of request processing.
#[derive(Default)]
pub struct ThreadRegistry {
    records: RwLock<HashMap<usize, InfoThread>>,
}

impl ThreadRegistry {
    pub fn new() -> ThreadRegistry {
        ThreadRegistry {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Called once by each worker before it starts accepting jobs.
    pub fn register(&self, pid: usize) {
        let mut records = self.records.write();
        records.entry(pid).or_insert_with(|| InfoThread::new(pid));
    }

    /// Job start: status and start time change together under the lock so
    /// readers never observe a torn (status, start-time) pair.
    pub fn mark_serving(&self, pid: usize) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(&pid) {
            record.status = ThreadStatus::Serving;
            record.job_start = Utc::now();
        } else {
            debug!("ThreadRegistry::mark_serving - worker {} not registered", pid);
        }
    }

    /// Job end: duration is computed from the job start stamped by
    /// `mark_serving`.
    pub fn mark_idle(&self, pid: usize) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(&pid) {
            record.last_duration_ms = (Utc::now() - record.job_start).num_milliseconds();
            record.status = ThreadStatus::Idle;
            record.served_count += 1;
        } else {
            debug!("ThreadRegistry::mark_idle - worker {} not registered", pid);
        }
    }

    pub fn mark_error(&self, pid: usize) {
        let mut records = self.records.write();
        if let Some(record) = records.get_mut(&pid) {
            record.status = ThreadStatus::Error;
        }
    }

    /// A consistent copy of all records, without blocking worker progress
    /// beyond the clone itself.
    pub fn snapshot(&self) -> Vec<InfoThread> {
        let records = self.records.read();
        let mut snapshot: Vec<InfoThread> = records.values().cloned().collect();
        snapshot.sort_by_key(|record| record.pid);
        return snapshot;
    }

    pub fn count_with_status(&self, status: ThreadStatus) -> usize {
        let records = self.records.read();
        records
            .values()
            .filter(|record| record.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;
    use std::sync::Arc;

    #[test]
    fn test_serving_and_idle_always_sum_to_pool_size() -> Result<(), Box<dyn Error>> {
        let registry = ThreadRegistry::new();
        let pool_size = 8;
        for pid in 0..pool_size {
            registry.register(pid);
        }
        for pid in 0..5 {
            registry.mark_serving(pid);
        }
        let serving = registry.count_with_status(ThreadStatus::Serving);
        let idle = registry.count_with_status(ThreadStatus::Idle);
        assert_eq!(5, serving, "Wrong serving count");
        assert_eq!(3, idle, "Wrong idle count");
        assert_eq!(pool_size, serving + idle, "Counts do not sum to the pool size");
        Ok(())
    }

    #[test]
    fn test_idle_transition_computes_duration_and_count() -> Result<(), Box<dyn Error>> {
        let registry = ThreadRegistry::new();
        registry.register(7);
        registry.mark_serving(7);
        registry.mark_idle(7);
        let snapshot = registry.snapshot();
        assert_eq!(1, snapshot.len(), "Wrong record count");
        assert_eq!(ThreadStatus::Idle, snapshot[0].status, "Worker not back to idle");
        assert_eq!(1, snapshot[0].served_count, "Served count not incremented");
        assert!(snapshot[0].last_duration_ms >= 0, "Negative duration");
        Ok(())
    }

    #[test]
    fn test_registering_twice_keeps_one_record() -> Result<(), Box<dyn Error>> {
        let registry = ThreadRegistry::new();
        registry.register(3);
        registry.mark_serving(3);
        registry.register(3);
        assert_eq!(1, registry.len(), "Duplicate registration created a record");
        assert_eq!(
            1,
            registry.count_with_status(ThreadStatus::Serving),
            "Re-registration reset the record"
        );
        Ok(())
    }

    #[test]
    fn test_concurrent_updates_and_snapshots() -> Result<(), Box<dyn Error>> {
        let registry = Arc::new(ThreadRegistry::new());
        let pool_size = 4;
        for pid in 0..pool_size {
            registry.register(pid);
        }
        let mut handles = Vec::new();
        for pid in 0..pool_size {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    registry.mark_serving(pid);
                    registry.mark_idle(pid);
                }
            }));
        }
        for _ in 0..50 {
            let snapshot = registry.snapshot();
            assert_eq!(pool_size, snapshot.len(), "Snapshot lost records mid-flight");
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let serving = registry.count_with_status(ThreadStatus::Serving);
        let idle = registry.count_with_status(ThreadStatus::Idle);
        assert_eq!(pool_size, serving + idle, "Counts do not sum to the pool size");
        assert_eq!(pool_size, idle, "All workers must be idle after the run");
        Ok(())
    }
}
