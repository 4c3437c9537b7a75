use chrono::{DateTime, Utc};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreadStatus {
    Idle,
    Serving,
    Error,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Idle => "idle",
            ThreadStatus::Serving => "serving",
            ThreadStatus::Error => "error",
        }
    }
}

/// Self-reported state of one worker. Written only by the owning worker at
/// job start and job end, read by the health service.
#[derive(Clone, Debug, PartialEq)]
pub struct InfoThread {
    pub pid: usize,
    pub status: ThreadStatus,
    pub job_start: DateTime<Utc>,
    pub last_duration_ms: i64,
    pub served_count: u64,
}

impl InfoThread {
    pub fn new(pid: usize) -> InfoThread {
        InfoThread {
            pid,
            status: ThreadStatus::Idle,
            job_start: Utc::now(),
            last_duration_ms: 0,
            served_count: 0,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error;

    #[test]
    fn test_new_record_starts_idle() -> Result<(), Box<dyn Error>> {
        let record = InfoThread::new(42);
        assert_eq!(42, record.pid, "Wrong pid");
        assert_eq!(ThreadStatus::Idle, record.status, "Fresh workers must report idle");
        assert_eq!(0, record.served_count, "Fresh workers have served nothing");
        Ok(())
    }

    #[test]
    fn test_status_labels() -> Result<(), Box<dyn Error>> {
        assert_eq!("idle", ThreadStatus::Idle.as_str(), "Wrong label");
        assert_eq!("serving", ThreadStatus::Serving.as_str(), "Wrong label");
        assert_eq!("error", ThreadStatus::Error.as_str(), "Wrong label");
        Ok(())
    }
}
