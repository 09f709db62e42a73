//! Change-token retry executor
//!
//! Runs a token-taking mutation under the scope lock, fetching a fresh token
//! for every attempt and retrying stale-token and busy rejections within a
//! bounded attempt budget.

use crate::classify::ConflictClassifier;
use crate::error::{ApiError, CloudError, ConflictKind, RetryError};
use crate::scope::ScopeSerializer;
use crate::token::{ChangeToken, Scope, TokenSource};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry policy for change-token mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, each with its own token
    pub max_attempts: u32,
    /// First busy backoff (milliseconds)
    pub initial_delay_ms: u64,
    /// Upper bound for a single backoff (milliseconds)
    pub max_delay_ms: u64,
    /// Exponential multiplier
    pub multiplier: f64,
    /// Draw each backoff uniformly from `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_delay_ms: 250,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Un-jittered delay before the retry following the `n`-th busy rejection
    pub fn delay_for_attempt(&self, n: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(n as i32);
        if delay.is_finite() {
            (delay as u64).min(self.max_delay_ms)
        } else {
            self.max_delay_ms
        }
    }

    fn backoff(&self, n: u32) -> Duration {
        let delay = self.delay_for_attempt(n);
        let millis = if self.jitter && delay > 1 {
            rand::thread_rng().gen_range(delay / 2..=delay)
        } else {
            delay
        };
        Duration::from_millis(millis)
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        if self.max_attempts == 0 {
            return Err(CloudError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(CloudError::InvalidConfig(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(CloudError::InvalidConfig(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Successful result of [`RetryExecutor::execute`].
///
/// `NotFound` is not a failure of the retry mechanism: the referenced
/// object is gone and the caller reconciles its own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    NotFound(ApiError),
}

impl<T> Outcome<T> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound(_))
    }
}

/// One execution of the caller's operation with its own token
#[derive(Debug)]
struct MutationAttempt {
    number: u32,
    last: Option<(ConflictKind, ApiError)>,
}

/// Where an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    FetchToken,
    Mutate,
}

/// Orchestrates token fetch, scope serialization and classification
#[derive(Clone)]
pub struct RetryExecutor {
    tokens: Arc<dyn TokenSource>,
    classifier: Arc<dyn ConflictClassifier>,
    serializer: ScopeSerializer,
    config: RetryConfig,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("serializer", &self.serializer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new(
        tokens: impl TokenSource + 'static,
        classifier: impl ConflictClassifier + 'static,
    ) -> Self {
        Self {
            tokens: Arc::new(tokens),
            classifier: Arc::new(classifier),
            serializer: ScopeSerializer::new(),
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Share scope locks with other executors in the same process
    pub fn with_serializer(mut self, serializer: ScopeSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn classifier(&self) -> &dyn ConflictClassifier {
        self.classifier.as_ref()
    }

    pub fn serializer(&self) -> &ScopeSerializer {
        &self.serializer
    }

    /// Execute `op` with a fresh change token for `scope`, retrying
    /// stale-token and busy rejections.
    pub async fn execute<F, Fut, T>(&self, scope: &Scope, op: F) -> Result<Outcome<T>, RetryError>
    where
        F: FnMut(ChangeToken) -> Fut + Send,
        Fut: Future<Output = Result<T, ApiError>> + Send,
        T: Send,
    {
        self.execute_cancellable(scope, &CancellationToken::new(), op)
            .await
    }

    /// Like [`execute`](Self::execute), but aborts the scope wait, the
    /// in-flight attempt and any backoff sleep once `cancel` fires.
    pub async fn execute_cancellable<F, Fut, T>(
        &self,
        scope: &Scope,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Outcome<T>, RetryError>
    where
        F: FnMut(ChangeToken) -> Fut + Send,
        Fut: Future<Output = Result<T, ApiError>> + Send,
        T: Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last: Option<(ConflictKind, ApiError)> = None;
        let mut busy_count = 0u32;

        for number in 1..=max_attempts {
            let attempt = MutationAttempt {
                number,
                last: last.take(),
            };
            tracing::debug!(
                scope = %scope,
                attempt = attempt.number,
                previous = ?attempt.last.as_ref().map(|(kind, _)| *kind),
                "starting mutation attempt"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { scope: scope.clone(), attempts: number - 1 });
                }
                result = self.attempt(scope, &mut op) => result,
            };

            let (phase, error) = match result {
                Ok(value) => {
                    tracing::debug!(scope = %scope, attempt = number, "mutation accepted");
                    return Ok(Outcome::Applied(value));
                }
                Err(failure) => failure,
            };

            let kind = self.classifier.classify(&error);
            match (kind, phase) {
                (ConflictKind::Stale, _) => {
                    tracing::debug!(scope = %scope, attempt = number, error = %error, "stale change token, refetching");
                }
                (ConflictKind::Busy, _) => {
                    tracing::debug!(scope = %scope, attempt = number, error = %error, "service busy, backing off");
                    if number < max_attempts {
                        let delay = self.config.backoff(busy_count);
                        busy_count += 1;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                return Err(RetryError::Cancelled { scope: scope.clone(), attempts: number });
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                (ConflictKind::NotFound, Phase::Mutate) => {
                    tracing::debug!(scope = %scope, attempt = number, error = %error, "referenced object not found");
                    return Ok(Outcome::NotFound(error));
                }
                (ConflictKind::NotFound, Phase::FetchToken) | (ConflictKind::Fatal, _) => {
                    return Err(RetryError::Fatal {
                        scope: scope.clone(),
                        source: error,
                    });
                }
            }
            last = Some((kind, error));
        }

        let (kind, error) = last.unwrap_or_else(|| {
            (
                ConflictKind::Busy,
                ApiError::new("RetryBudget", "no attempt was made"),
            )
        });
        tracing::warn!(
            scope = %scope,
            attempts = max_attempts,
            last = %error,
            "change-token retry budget exhausted"
        );
        Err(RetryError::Exhausted {
            scope: scope.clone(),
            attempts: max_attempts,
            kind,
            last: error,
        })
    }

    /// Hold the scope across one fetch-then-mutate pair
    async fn attempt<F, Fut, T>(&self, scope: &Scope, op: &mut F) -> Result<T, (Phase, ApiError)>
    where
        F: FnMut(ChangeToken) -> Fut + Send,
        Fut: Future<Output = Result<T, ApiError>> + Send,
        T: Send,
    {
        let _guard = self.serializer.acquire(scope).await;
        let token = self
            .tokens
            .fetch(scope)
            .await
            .map_err(|e| (Phase::FetchToken, e))?;
        tracing::trace!(scope = %scope, token = %token, "fetched change token");
        op(token).await.map_err(|e| (Phase::Mutate, e))
    }
}
