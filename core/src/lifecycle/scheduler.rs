use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::runner::AnalysisRunner;
use super::AnalysisJob;

/// 把分析任务交给后台执行，调用方不等待结果
pub trait JobScheduler: Send + Sync {
    fn schedule(&self, job: AnalysisJob);
}

/// 生产环境调度器：有界队列 + 固定数量的 worker
pub struct WorkerPool {
    sender: mpsc::Sender<AnalysisJob>,
}

impl WorkerPool {
    /// 需要在 tokio 运行时内调用
    pub fn start(runner: Arc<AnalysisRunner>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<AnalysisJob>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_id in 0..workers.max(1) {
            let receiver = receiver.clone();
            let runner = runner.clone();
            tokio::spawn(async move {
                loop {
                    let job = { receiver.lock().await.recv().await };
                    let Some(job) = job else {
                        break;
                    };

                    let review_id = job.review_id;
                    let task_runner = runner.clone();
                    let task_job = job.clone();
                    // 每个任务单独 spawn，panic 不会带走 worker
                    match tokio::spawn(async move { task_runner.run(task_job).await }).await {
                        Ok(outcome) => {
                            tracing::debug!(worker_id, %review_id, ?outcome, "analysis job finished")
                        }
                        Err(e) if e.is_panic() => {
                            tracing::error!(worker_id, %review_id, "analysis job panicked");
                            runner.abort(&job).await;
                        }
                        Err(e) => {
                            tracing::warn!(worker_id, %review_id, "analysis job cancelled: {}", e)
                        }
                    }
                }
                tracing::debug!(worker_id, "analysis worker stopped");
            });
        }

        tracing::info!(
            "Analysis worker pool started ({} workers, queue capacity {})",
            workers.max(1),
            capacity.max(1)
        );
        Self { sender }
    }
}

impl JobScheduler for WorkerPool {
    fn schedule(&self, job: AnalysisJob) {
        match self.sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                // 队列已满时不阻塞请求路径
                tracing::warn!(review_id = %job.review_id, "analysis queue full, deferring enqueue");
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    let review_id = job.review_id;
                    if sender.send(job).await.is_err() {
                        tracing::error!(%review_id, "analysis queue closed, job dropped");
                    }
                });
            }
            Err(TrySendError::Closed(job)) => {
                tracing::error!(review_id = %job.review_id, "analysis queue closed, job dropped");
            }
        }
    }
}

/// 测试用调度器：只记录任务，由测试显式执行
#[derive(Default)]
pub struct ManualScheduler {
    jobs: Mutex<Vec<AnalysisJob>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<AnalysisJob> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<AnalysisJob> {
        std::mem::take(&mut *self.lock())
    }

    /// 依次执行所有已记录的任务，返回执行数量
    pub async fn run_pending(&self, runner: &AnalysisRunner) -> usize {
        let mut executed = 0;
        loop {
            let jobs = self.take();
            if jobs.is_empty() {
                return executed;
            }
            for job in jobs {
                runner.run(job).await;
                executed += 1;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AnalysisJob>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobScheduler for ManualScheduler {
    fn schedule(&self, job: AnalysisJob) {
        self.lock().push(job);
    }
}
