use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Result, SubflowError};

/// Grace window before a suspend/shutdown is actually issued
pub const DEFAULT_GRACE: Duration = Duration::from_secs(60);

/// What to do once the whole batch is finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionPolicy {
    #[default]
    DoNothing,
    Exit,
    Suspend,
    Shutdown,
}

/// Platform seam for process and power control
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostControl: Send + Sync {
    fn exit_process(&self);
    async fn suspend(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;
}

/// Issues the real platform commands
pub struct SystemHostControl;

impl SystemHostControl {
    async fn run_command(program: &str, args: &[&str]) -> Result<()> {
        info!("Issuing host command: {} {}", program, args.join(" "));
        let status = Command::new(program).args(args).status().await?;
        if !status.success() {
            return Err(SubflowError::Worker(format!(
                "host command {program} exited with {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl HostControl for SystemHostControl {
    fn exit_process(&self) {
        info!("Exiting process on batch completion");
        std::process::exit(0);
    }

    async fn suspend(&self) -> Result<()> {
        if cfg!(target_os = "windows") {
            Self::run_command("rundll32.exe", &["powrprof.dll,SetSuspendState", "0,1,0"]).await
        } else {
            Self::run_command("systemctl", &["suspend"]).await
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if cfg!(target_os = "windows") {
            Self::run_command("shutdown", &["/s", "/t", "1"]).await
        } else {
            Self::run_command("shutdown", &["now"]).await
        }
    }
}

/// Runs the configured side effect once the scheduler reports the batch
/// finished. Suspend and shutdown wait out a cancelable grace window first;
/// canceling leaves the host running.
pub struct CompletionDispatcher {
    policy: CompletionPolicy,
    host: Arc<dyn HostControl>,
    grace: Duration,
    cancel: CancellationToken,
}

impl CompletionDispatcher {
    pub fn new(policy: CompletionPolicy, host: Arc<dyn HostControl>) -> Self {
        Self {
            policy,
            host,
            grace: DEFAULT_GRACE,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Token that aborts a pending suspend/shutdown countdown
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Evaluate the policy. Called exactly once per finished batch,
    /// including batches that finished with zero work done.
    pub async fn dispatch(&self) -> Result<()> {
        match self.policy {
            CompletionPolicy::DoNothing => Ok(()),
            CompletionPolicy::Exit => {
                self.host.exit_process();
                Ok(())
            }
            CompletionPolicy::Suspend => {
                if self.wait_grace("suspend").await {
                    self.host.suspend().await
                } else {
                    Ok(())
                }
            }
            CompletionPolicy::Shutdown => {
                if self.wait_grace("shutdown").await {
                    self.host.shutdown().await
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn wait_grace(&self, action: &str) -> bool {
        info!(
            "All jobs are done, {} in {} seconds unless canceled",
            action,
            self.grace.as_secs()
        );
        tokio::select! {
            _ = tokio::time::sleep(self.grace) => true,
            _ = self.cancel.cancelled() => {
                warn!("Host {} canceled, leaving the machine running", action);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_do_nothing_touches_nothing() {
        let host = MockHostControl::new();
        let dispatcher = CompletionDispatcher::new(CompletionPolicy::DoNothing, Arc::new(host));
        assert_ok!(dispatcher.dispatch().await);
    }

    #[tokio::test]
    async fn test_exit_policy_terminates_the_process() {
        let mut host = MockHostControl::new();
        host.expect_exit_process().times(1).return_const(());
        let dispatcher = CompletionDispatcher::new(CompletionPolicy::Exit, Arc::new(host));
        assert_ok!(dispatcher.dispatch().await);
    }

    #[tokio::test]
    async fn test_suspend_fires_after_grace_window() {
        let mut host = MockHostControl::new();
        host.expect_suspend().times(1).returning(|| Ok(()));
        let dispatcher = CompletionDispatcher::new(CompletionPolicy::Suspend, Arc::new(host))
            .with_grace(Duration::from_millis(10));
        assert_ok!(dispatcher.dispatch().await);
    }

    #[tokio::test]
    async fn test_canceled_shutdown_leaves_host_running() {
        let mut host = MockHostControl::new();
        host.expect_shutdown().never();
        let dispatcher = CompletionDispatcher::new(CompletionPolicy::Shutdown, Arc::new(host))
            .with_grace(Duration::from_secs(60));

        let handle = dispatcher.cancel_handle();
        let dispatch = tokio::spawn(async move { dispatcher.dispatch().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();
        assert_ok!(dispatch.await.unwrap());
    }
}
