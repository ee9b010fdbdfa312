//! Queue consumer: receives message bodies and spawns one job per message.

use tokio::sync::mpsc;

use crate::service::FulfilmentService;
use crate::types::FulfilmentRequest;

impl FulfilmentService {
    /// Start the queue consumer task
    ///
    /// This method spawns a background task that continuously:
    /// 1. Waits for the next message body on `messages`
    /// 2. Parses it into a [`FulfilmentRequest`] (malformed messages are logged and dropped)
    /// 3. Acquires a permit from the job limiter (respects max_concurrent_jobs)
    /// 4. Spawns the fulfilment job holding that permit
    ///
    /// The consumer stops when the channel closes or [`shutdown`](Self::shutdown)
    /// is called. Messages may be redelivered; a job for an existing batch
    /// converges on the same bundle tree.
    pub fn start_queue_consumer(
        &self,
        mut messages: mpsc::Receiver<String>,
    ) -> tokio::task::JoinHandle<()> {
        let service = self.clone();

        tokio::spawn(async move {
            loop {
                let body = tokio::select! {
                    _ = service.shutdown_token.cancelled() => break,
                    body = messages.recv() => match body {
                        Some(body) => body,
                        None => break,
                    },
                };

                let request = match FulfilmentRequest::from_message(&body) {
                    Ok(request) => request,
                    Err(e) => {
                        tracing::error!(error = %e, "Dropping malformed queue message");
                        continue;
                    }
                };

                // Blocks while max_concurrent_jobs jobs are running
                let permit = tokio::select! {
                    biased;
                    _ = service.shutdown_token.cancelled() => {
                        tracing::info!(
                            batch_id = %request.batch_id,
                            "Shutting down, leaving message for redelivery"
                        );
                        break;
                    }
                    permit = service.job_limit.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                batch_id = %request.batch_id,
                                "Job limiter closed, stopping queue consumer"
                            );
                            break;
                        }
                    },
                };

                let job_service = service.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    super::run_job(&job_service, request).await;
                });
            }

            tracing::info!("Queue consumer stopped");
        })
    }
}
