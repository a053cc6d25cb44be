//! Action Executor / Retry Coordinator
//!
//! Realizes an approved action against the protocol bridge with a bounded,
//! explicit retry loop. Retry exhaustion is an ordinary typed result, never
//! an unwind path: every execution ends in exactly one terminal
//! [`ExecutionResult`] (success, failed, or abandoned on shutdown).
//!
//! Only transient acknowledgments (`Busy`, `Paused`) and round-trip timeouts
//! are retried. `Invalid` and `Locked` stop immediately and escalate; a lost
//! link fails the execution and leaves reconnection to the transport layer.
//!
//! Total blocking time is bounded by construction:
//! `max_attempts x (submit_timeout + retry_delay + jitter)`, so a wedged
//! equipment link cannot stall the machine's pipeline indefinitely.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::{AckCode, BridgeError, EquipmentCommand, ProtocolBridge};
use crate::config::ExecutorConfig;
use crate::types::{ExecutionError, ExecutionResult};

/// Retry policy, frozen at construction from the executor config
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Upper bound on random jitter added to each delay; zero disables
    pub retry_jitter: Duration,
    pub submit_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            retry_jitter: Duration::from_millis(config.retry_jitter_ms),
            submit_timeout: Duration::from_millis(config.submit_timeout_ms),
        }
    }
}

/// Per-machine command executor
///
/// Owned by the machine's pipeline worker, which serializes calls: two
/// commands are never in flight for the same machine at once.
pub struct ActionExecutor {
    bridge: Arc<dyn ProtocolBridge>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl ActionExecutor {
    pub fn new(
        bridge: Arc<dyn ProtocolBridge>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bridge,
            policy,
            cancel,
        }
    }

    /// Drive one command to a terminal result.
    pub async fn execute(&self, command: &EquipmentCommand) -> ExecutionResult {
        let mut attempts = 0u32;
        let mut last_error = ExecutionError::TransportTimeout;

        while attempts < self.policy.max_attempts {
            attempts += 1;

            let attempt = tokio::select! {
                () = self.cancel.cancelled() => {
                    warn!(
                        machine = %command.machine_id,
                        command = %command.command_name,
                        "Shutdown during execution, marking abandoned"
                    );
                    return ExecutionResult::abandoned(attempts - 1);
                }
                result = tokio::time::timeout(
                    self.policy.submit_timeout,
                    self.bridge.submit(command),
                ) => result,
            };

            let error = match attempt {
                Ok(Ok(ack)) => match ack.code {
                    AckCode::Accepted => {
                        info!(
                            machine = %command.machine_id,
                            command = %command.command_name,
                            attempts,
                            "Command accepted"
                        );
                        return ExecutionResult::success(attempts);
                    }
                    AckCode::Busy => ExecutionError::CommandBusy,
                    AckCode::Paused => ExecutionError::CommandPaused,
                    AckCode::Invalid => ExecutionError::CommandInvalid,
                    AckCode::Locked => ExecutionError::CommandLocked,
                },
                Ok(Err(BridgeError::Timeout)) | Err(_) => ExecutionError::TransportTimeout,
                Ok(Err(BridgeError::ConnectionLost | BridgeError::Channel(_))) => {
                    ExecutionError::ConnectionLost
                }
            };

            if !error.is_retryable() {
                warn!(
                    machine = %command.machine_id,
                    command = %command.command_name,
                    error = %error,
                    attempts,
                    "Non-retryable failure, escalating"
                );
                return ExecutionResult::failed(attempts, error);
            }

            last_error = error;

            if attempts < self.policy.max_attempts {
                let delay = self.policy.retry_delay + self.jitter();
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        warn!(
                            machine = %command.machine_id,
                            command = %command.command_name,
                            "Shutdown during retry backoff, marking abandoned"
                        );
                        return ExecutionResult::abandoned(attempts);
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(
            machine = %command.machine_id,
            command = %command.command_name,
            attempts,
            error = %last_error,
            "Retry budget exhausted"
        );
        ExecutionResult::failed(attempts, last_error)
    }

    fn jitter(&self) -> Duration {
        let bound = self.policy.retry_jitter.as_millis() as u64;
        if bound == 0 {
            Duration::ZERO
        } else {
            use rand::Rng;
            Duration::from_millis(rand::thread_rng().gen_range(0..bound))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::AckResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Bridge that replays a scripted sequence of responses.
    struct ScriptedBridge {
        script: Mutex<Vec<Result<AckResult, BridgeError>>>,
        calls: AtomicU32,
    }

    impl ScriptedBridge {
        fn new(script: Vec<Result<AckResult, BridgeError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProtocolBridge for ScriptedBridge {
        async fn submit(&self, _command: &EquipmentCommand) -> Result<AckResult, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().expect("script lock");
            if script.is_empty() {
                Ok(AckResult::accepted())
            } else {
                script.remove(0)
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1_000),
            retry_jitter: Duration::ZERO,
            submit_timeout: Duration::from_millis(5_000),
        }
    }

    fn command() -> EquipmentCommand {
        use crate::types::{Action, AgentMetadata, AgentType, Protocol};
        let meta = AgentMetadata::new(AgentType::Precision, "CNC-001", Protocol::MotionControl);
        crate::bridge::render_command(&Action::EmergencyStop, &meta, "test")
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_busy_exhausts_three_attempts() {
        let bridge = Arc::new(ScriptedBridge::new(vec![
            Ok(AckResult::from_code(1)),
            Ok(AckResult::from_code(1)),
            Ok(AckResult::from_code(1)),
        ]));
        let executor = ActionExecutor::new(bridge.clone(), policy(), CancellationToken::new());

        let started = tokio::time::Instant::now();
        let result = executor.execute(&command()).await;
        let elapsed = started.elapsed();

        assert!(result.attempted);
        assert!(!result.succeeded);
        assert_eq!(result.retries_used, 3);
        assert_eq!(result.final_error, Some(ExecutionError::CommandBusy));
        assert_eq!(bridge.calls(), 3);
        // Two inter-attempt delays of the configured 1000 ms
        assert!(
            elapsed >= Duration::from_millis(2_000) && elapsed < Duration::from_millis(2_100),
            "elapsed was {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_stops_immediately() {
        let bridge = Arc::new(ScriptedBridge::new(vec![Ok(AckResult::from_code(2))]));
        let executor = ActionExecutor::new(bridge.clone(), policy(), CancellationToken::new());

        let result = executor.execute(&command()).await;

        assert!(!result.succeeded);
        assert_eq!(result.retries_used, 1);
        assert_eq!(result.final_error, Some(ExecutionError::CommandInvalid));
        assert_eq!(bridge.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_escalates_without_retry() {
        let bridge = Arc::new(ScriptedBridge::new(vec![Ok(AckResult::from_code(4))]));
        let executor = ActionExecutor::new(bridge, policy(), CancellationToken::new());

        let result = executor.execute(&command()).await;
        assert_eq!(result.final_error, Some(ExecutionError::CommandLocked));
        assert_eq!(result.retries_used, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_then_accepted_succeeds() {
        let bridge = Arc::new(ScriptedBridge::new(vec![
            Ok(AckResult::from_code(1)),
            Ok(AckResult::accepted()),
        ]));
        let executor = ActionExecutor::new(bridge.clone(), policy(), CancellationToken::new());

        let result = executor.execute(&command()).await;
        assert!(result.succeeded);
        assert_eq!(result.retries_used, 2);
        assert_eq!(bridge.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_fails_without_retry() {
        let bridge = Arc::new(ScriptedBridge::new(vec![Err(BridgeError::ConnectionLost)]));
        let executor = ActionExecutor::new(bridge.clone(), policy(), CancellationToken::new());

        let result = executor.execute(&command()).await;
        assert_eq!(result.final_error, Some(ExecutionError::ConnectionLost));
        assert_eq!(bridge.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let bridge = Arc::new(ScriptedBridge::new(vec![
            Err(BridgeError::Timeout),
            Ok(AckResult::accepted()),
        ]));
        let executor = ActionExecutor::new(bridge, policy(), CancellationToken::new());

        let result = executor.execute(&command()).await;
        assert!(result.succeeded);
        assert_eq!(result.retries_used, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_records_abandoned() {
        let bridge = Arc::new(ScriptedBridge::new(vec![
            Ok(AckResult::from_code(1)),
            Ok(AckResult::from_code(1)),
            Ok(AckResult::from_code(1)),
        ]));
        let cancel = CancellationToken::new();
        let executor = ActionExecutor::new(bridge, policy(), cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let result = executor.execute(&command()).await;
        assert!(!result.succeeded);
        assert_eq!(result.final_error, Some(ExecutionError::Abandoned));
        // First attempt completed; shutdown hit during the backoff window
        assert_eq!(result.retries_used, 1);
    }
}
