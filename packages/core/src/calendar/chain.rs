//! Ordered degradation chain.
//!
//! A lookup is a list of named strategies tried in order. Each step reports
//! a [`StepOutcome`]: a hit ends the chain, a miss moves on silently, a
//! failure is recorded and the chain moves on. The caller gets a
//! [`Resolution`] saying which strategy answered and what failed before it.
//!
//! When nothing hits, the first recorded failure is returned: it comes from
//! the most upstream step and says the most about what went wrong.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::calendar::error::CalendarError;
use crate::metrics::CoreMetrics;

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Any cached value, regardless of age.
    Cache,
    /// A cached value younger than the freshness threshold.
    FreshCache,
    Network,
    /// A cached value older than the freshness threshold.
    StaleCache,
    LocalApproximation,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Cache => "cache",
            Strategy::FreshCache => "fresh_cache",
            Strategy::Network => "network",
            Strategy::StaleCache => "stale_cache",
            Strategy::LocalApproximation => "local_approximation",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum StepOutcome<T> {
    Hit(T),
    Miss,
    Failed(CalendarError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: Strategy,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    pub value: T,
    pub strategy: Strategy,
    pub failures: Vec<StrategyFailure>,
}

impl<T> Resolution<T> {
    /// `true` when the value was not produced by the first choice of a
    /// healthy system (cache or network).
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.strategy,
            Strategy::StaleCache | Strategy::LocalApproximation
        )
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        Resolution {
            value: f(self.value),
            strategy: self.strategy,
            failures: self.failures,
        }
    }
}

type Step<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, StepOutcome<T>> + Send + 'a>;

pub struct DegradationChain<'a, T> {
    operation: &'static str,
    steps: Vec<(Strategy, Step<'a, T>)>,
    metrics: Option<Arc<CoreMetrics>>,
}

impl<'a, T: Send + 'a> DegradationChain<'a, T> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<CoreMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Append a step. Steps run lazily, in the order they were added.
    pub fn step<F, Fut>(mut self, strategy: Strategy, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = StepOutcome<T>> + Send + 'a,
    {
        let step: Step<'a, T> = Box::new(move || run().boxed());
        self.steps.push((strategy, step));
        self
    }

    pub async fn resolve(self) -> Result<Resolution<T>, CalendarError> {
        let mut failures = Vec::new();
        let mut first_error = None;

        for (strategy, run) in self.steps {
            match run().await {
                StepOutcome::Hit(value) => {
                    tracing::debug!("{} resolved via {}", self.operation, strategy);
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .resolutions_total
                            .with_label_values(&[self.operation, strategy.as_str()])
                            .inc();
                    }
                    return Ok(Resolution {
                        value,
                        strategy,
                        failures,
                    });
                }
                StepOutcome::Miss => {
                    tracing::debug!("{}: {} missed", self.operation, strategy);
                }
                StepOutcome::Failed(err) => {
                    tracing::debug!("{}: {} failed: {}", self.operation, strategy, err);
                    failures.push(StrategyFailure {
                        strategy,
                        reason: err.to_string(),
                    });
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .resolution_failures_total
                .with_label_values(&[self.operation])
                .inc();
        }

        Err(first_error.unwrap_or(CalendarError::Unavailable))
    }
}
