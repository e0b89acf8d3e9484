use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::warn;

use crate::config::BreakerSection;

use super::{ChatRequest, LanguageModel, LlmError};

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub window_size: usize,
    pub failure_threshold: f64,
    pub open_for: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_threshold: 0.5,
            open_for: Duration::from_secs(30),
        }
    }
}

impl From<&BreakerSection> for CircuitBreakerConfig {
    fn from(section: &BreakerSection) -> Self {
        Self {
            window_size: section.window_size.max(1),
            failure_threshold: section.failure_threshold,
            open_for: Duration::from_secs(section.open_for_seconds),
        }
    }
}

struct CircuitBreaker {
    config: CircuitBreakerConfig,
    outcomes: VecDeque<bool>,
    state: CircuitState,
    open_until: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

enum CircuitDecision {
    Proceed,
    ShortCircuit,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            outcomes: VecDeque::with_capacity(config.window_size),
            state: CircuitState::Closed,
            open_until: None,
        }
    }

    fn before_call(&mut self, now: Instant) -> CircuitDecision {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => CircuitDecision::Proceed,
            CircuitState::Open => match self.open_until {
                Some(until) if now < until => CircuitDecision::ShortCircuit,
                _ => {
                    self.state = CircuitState::HalfOpen;
                    CircuitDecision::Proceed
                }
            },
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        match self.state {
            CircuitState::HalfOpen => {
                if success {
                    self.state = CircuitState::Closed;
                    self.outcomes.clear();
                } else {
                    self.trip(now);
                }
            }
            CircuitState::Closed => {
                self.push_outcome(success);
                if self.should_trip() {
                    self.trip(now);
                }
            }
            // A call admitted before the breaker opened finished late.
            CircuitState::Open => {}
        }
    }

    fn push_outcome(&mut self, success: bool) {
        if self.outcomes.len() == self.config.window_size {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
    }

    fn should_trip(&self) -> bool {
        if self.outcomes.len() < self.config.window_size {
            return false;
        }
        let failures = self.outcomes.iter().filter(|outcome| !**outcome).count();
        let rate = failures as f64 / self.outcomes.len() as f64;
        rate > self.config.failure_threshold
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + self.config.open_for);
        self.outcomes.clear();
    }
}

/// Wraps a model with a per-call deadline and a circuit breaker.
///
/// Faults are never swallowed: a timeout or an open circuit surfaces as an
/// [`LlmError`] exactly like a transport failure would.
pub struct GuardedModel {
    inner: Arc<dyn LanguageModel>,
    deadline: Duration,
    breaker: Mutex<CircuitBreaker>,
}

impl GuardedModel {
    pub fn new(
        inner: Arc<dyn LanguageModel>,
        deadline: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Self {
        Self {
            inner,
            deadline,
            breaker: Mutex::new(CircuitBreaker::new(breaker)),
        }
    }

    fn admit(&self) -> Result<Instant, LlmError> {
        let now = Instant::now();
        let mut breaker = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        match breaker.before_call(now) {
            CircuitDecision::Proceed => Ok(now),
            CircuitDecision::ShortCircuit => Err(LlmError::CircuitOpen),
        }
    }

    fn record(&self, started: Instant, success: bool) {
        let mut breaker = self.breaker.lock().unwrap_or_else(|e| e.into_inner());
        breaker.record(started, success);
    }
}

#[async_trait]
impl LanguageModel for GuardedModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let started = self.admit()?;
        let label = request.label();
        match timeout(self.deadline, self.inner.complete(request)).await {
            Ok(Ok(text)) => {
                self.record(started, true);
                Ok(text)
            }
            Ok(Err(err)) => {
                warn!(target: "llm", request = label, "échec de l'appel au modèle: {err}");
                self.record(started, false);
                Err(err)
            }
            Err(_) => {
                warn!(target: "llm", request = label, "délai dépassé après {:?}", self.deadline);
                self.record(started, false);
                Err(LlmError::Timeout(self.deadline))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::llm::ChatMessage;

    struct StaticModel {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for StaticModel {
        async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(LlmError::EmptyResponse),
            }
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("trop tard".into())
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::text(vec![ChatMessage::user("bonjour")])
    }

    #[tokio::test]
    async fn passes_successful_replies_through() {
        let inner = Arc::new(StaticModel {
            reply: Ok("salut".into()),
            calls: AtomicUsize::new(0),
        });
        let guarded = GuardedModel::new(
            inner.clone(),
            Duration::from_secs(5),
            CircuitBreakerConfig::default(),
        );
        assert_eq!(guarded.complete(request()).await.unwrap(), "salut");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let guarded = GuardedModel::new(
            Arc::new(SlowModel),
            Duration::from_millis(50),
            CircuitBreakerConfig::default(),
        );
        let err = guarded.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(deadline) if deadline == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn circuit_breaker_short_circuits() {
        let inner = Arc::new(StaticModel {
            reply: Err(()),
            calls: AtomicUsize::new(0),
        });
        let guarded = GuardedModel::new(
            inner.clone(),
            Duration::from_secs(5),
            CircuitBreakerConfig {
                window_size: 4,
                failure_threshold: 0.5,
                open_for: Duration::from_secs(300),
            },
        );

        for _ in 0..4 {
            let err = guarded.complete(request()).await.unwrap_err();
            assert!(matches!(err, LlmError::EmptyResponse));
        }

        let err = guarded.complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::CircuitOpen));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let mut breaker = CircuitBreaker::new(CircuitBreakerConfig {
            window_size: 2,
            failure_threshold: 0.4,
            open_for: Duration::from_millis(0),
        });
        let now = Instant::now();
        breaker.record(now, false);
        breaker.record(now, false);
        assert_eq!(breaker.state, CircuitState::Open);

        assert!(matches!(breaker.before_call(Instant::now()), CircuitDecision::Proceed));
        assert_eq!(breaker.state, CircuitState::HalfOpen);
        breaker.record(Instant::now(), true);
        assert_eq!(breaker.state, CircuitState::Closed);
    }
}
