use crate::config::{FinisherPolicy, HandlerConfig};
use crate::models::{CoreError, ExecutionMode, TaskHandle};
use crate::orchestration::{Hook, Operation, OrchestrationResult, TaskQueue};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum RunPhase {
    #[default]
    Idle,
    Initializing,
    Processing,
    Finishing,
    Done,
}

/// Owns one task queue plus the optional hooks wrapped around every run.
#[derive(Default)]
pub struct Handler {
    queue: TaskQueue,
    initializer: Option<Hook>,
    finisher: Option<Hook>,
    config: HandlerConfig,
    phase: RunPhase,
    last_outcome: Option<OrchestrationResult<()>>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(initializer: Option<Hook>, finisher: Option<Hook>) -> Self {
        Self {
            initializer,
            finisher,
            ..Self::default()
        }
    }

    pub fn with_config(config: HandlerConfig) -> Self {
        let mut handler = Self::default();
        handler.set_config(config);
        handler
    }

    pub fn initializer(mut self, hook: Hook) -> Self {
        self.initializer = Some(hook);
        self
    }

    pub fn finisher(mut self, hook: Hook) -> Self {
        self.finisher = Some(hook);
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: HandlerConfig) {
        self.queue.set_detached_failures(config.detached_failures);
        self.config = config;
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Outcome of the most recent `run`, `None` before the first one.
    pub fn last_outcome(&self) -> Option<&OrchestrationResult<()>> {
        self.last_outcome.as_ref()
    }

    pub fn add(
        &mut self,
        operation: Operation,
        mode: ExecutionMode,
        position: Option<i64>,
    ) -> TaskHandle {
        self.queue.add(operation, mode, position)
    }

    /// Appends `operation` using the configured default mode.
    pub fn enqueue(&mut self, operation: Operation) -> TaskHandle {
        self.queue.add(operation, self.config.default_mode, None)
    }

    pub fn remove(&mut self, handle: &TaskHandle) -> OrchestrationResult<bool> {
        self.queue.remove(handle)
    }

    /// Runs initializer, queue and finisher in that order and resolves `true`.
    ///
    /// Hook and waited-task errors are returned as-is. With
    /// `FinisherPolicy::Always` the finisher still runs after such an error;
    /// its own failure is then only logged.
    pub async fn run(&mut self) -> OrchestrationResult<bool> {
        let outcome = self.run_sequence().await;
        self.enter(RunPhase::Done);

        if let Err(error) = &outcome {
            tracing::debug!(kind = ?error.kind, message = %error.message, "run failed");
        }
        self.last_outcome = Some(outcome.clone());
        outcome.map(|()| true)
    }

    async fn run_sequence(&mut self) -> OrchestrationResult<()> {
        self.enter(RunPhase::Initializing);
        if let Some(initializer) = self.initializer.clone()
            && let Err(error) = initializer.invoke().await
        {
            return Err(self.finish_after_failure(error).await);
        }

        self.enter(RunPhase::Processing);
        if let Err(error) = self.queue.process().await {
            return Err(self.finish_after_failure(error).await);
        }

        self.enter(RunPhase::Finishing);
        if let Some(finisher) = self.finisher.clone() {
            finisher.invoke().await?;
        }

        Ok(())
    }

    async fn finish_after_failure(&mut self, error: CoreError) -> CoreError {
        if self.config.finisher_policy == FinisherPolicy::Always
            && let Some(finisher) = self.finisher.clone()
        {
            self.enter(RunPhase::Finishing);
            if let Err(cleanup_error) = finisher.invoke().await {
                tracing::warn!(
                    kind = ?cleanup_error.kind,
                    message = %cleanup_error.message,
                    "finisher failed while cleaning up a failed run"
                );
            }
        }
        error
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!(queue = self.queue.id().0, from = ?self.phase, to = ?phase, "run phase");
        self.phase = phase;
    }
}
