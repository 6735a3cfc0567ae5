//! One-at-a-time execution of blocking driver work.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::DriverError;

/// Runs blocking jobs on tokio's blocking pool, strictly one after another.
///
/// The lane stays locked until a job returns, including a job whose caller stopped waiting when a step deadline
/// dropped its future. The next call waits for that job instead of overlapping it.
#[derive(Debug, Clone, Default)]
pub struct BlockingLane {
    busy: Arc<Mutex<()>>,
}

impl BlockingLane {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<T, F>(&self, job: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DriverError> + Send + 'static,
    {
        let permit = Arc::clone(&self.busy).lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|error| DriverError::Other(format!("driver task failed: {error}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn dropped_callers_keep_the_lane_until_their_job_ends() {
        let lane = BlockingLane::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let job = |active: Arc<AtomicUsize>, peak: Arc<AtomicUsize>| {
            move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), DriverError>(())
            }
        };

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            lane.run(job(Arc::clone(&active), Arc::clone(&peak))),
        )
        .await;
        assert!(abandoned.is_err());

        lane.run(job(Arc::clone(&active), Arc::clone(&peak))).await.unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn job_errors_pass_through() {
        let lane = BlockingLane::new();
        let error = lane
            .run(|| Err::<(), _>(DriverError::Script("boom".into())))
            .await
            .unwrap_err();
        assert_eq!(error, DriverError::Script("boom".into()));
    }
}
