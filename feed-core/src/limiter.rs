//! Token bucket.
//!
//! Пополнение считается лениво при каждом обращении по прошедшему времени,
//! фонового таймера нет.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::error::ConfigError;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill_ms: u64,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    /// токенов в миллисекунду
    refill_rate: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    pub fn new(cfg: &RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let capacity = cfg.capacity();
        let now = clock.now_ms();

        Ok(Self {
            capacity,
            refill_rate: cfg.requests_per_second / 1000.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill_ms: now,
            }),
            clock,
        })
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(), // продолжаем, несмотря на poison
        }
    }

    fn refill(&self, st: &mut BucketState) {
        let now = self.clock.now_ms();
        let elapsed = now.saturating_sub(st.last_refill_ms);
        st.tokens = (st.tokens + elapsed as f64 * self.refill_rate).min(self.capacity);
        st.last_refill_ms = now;
    }

    /// Неблокирующая попытка взять один токен
    pub fn try_acquire(&self) -> bool {
        let mut st = self.lock();
        self.refill(&mut st);
        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Сколько миллисекунд ждать, пока появится хотя бы один токен
    pub fn wait_time_ms(&self) -> u64 {
        let mut st = self.lock();
        self.refill(&mut st);
        self.wait_for(&st)
    }

    fn wait_for(&self, st: &BucketState) -> u64 {
        if st.tokens >= 1.0 {
            return 0;
        }
        ((1.0 - st.tokens) / self.refill_rate).ceil() as u64
    }

    /// Блокирует поток до появления токена и забирает его.
    ///
    /// После сна токен списывается безусловно: при конкуренции баланс может
    /// ненадолго уйти в минус, следующие ожидающие просто подождут дольше.
    pub fn acquire(&self) {
        let wait = self.wait_time_ms();
        if wait > 0 {
            debug!("rate limit: waiting {wait}ms for a token");
            self.clock.sleep(Duration::from_millis(wait));
        }

        let mut st = self.lock();
        self.refill(&mut st);
        st.tokens -= 1.0;
    }

    /// Текущий баланс (для отладки)
    pub fn available_tokens(&self) -> f64 {
        let mut st = self.lock();
        self.refill(&mut st);
        st.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn bucket(rps: f64, burst: Option<f64>) -> (Arc<ManualClock>, TokenBucket) {
        let clock = Arc::new(ManualClock::new());
        let cfg = RateLimitConfig {
            requests_per_second: rps,
            max_burst: burst,
        };
        let b = TokenBucket::new(&cfg, clock.clone()).unwrap();
        (clock, b)
    }

    #[test]
    fn burst_then_refill_one_token() {
        let (clock, b) = bucket(5.0, None);

        for i in 0..5 {
            assert!(b.try_acquire(), "acquire #{i} should succeed");
        }
        assert!(!b.try_acquire(), "sixth must be throttled");

        clock.advance_ms(200);
        assert!(b.try_acquire());
        assert!(!b.try_acquire());
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let (clock, b) = bucket(10.0, Some(3.0));
        assert_eq!(b.available_tokens(), 3.0);

        clock.advance_ms(60_000);
        assert_eq!(b.available_tokens(), 3.0);

        for _ in 0..3 {
            assert!(b.try_acquire());
        }
        assert!(b.available_tokens() >= 0.0);
        assert!(!b.try_acquire());
        assert!(b.available_tokens() >= 0.0);
    }

    #[test]
    fn random_walk_keeps_invariant() {
        let (clock, b) = bucket(7.0, Some(4.0));
        // детерминированная "случайная" последовательность
        let steps = [0u64, 3, 17, 140, 1, 0, 999, 42, 250, 13, 7, 600, 0, 0, 88];
        for (i, &dt) in steps.iter().cycle().take(200).enumerate() {
            clock.advance_ms(dt);
            let ok = b.try_acquire();
            let tokens = b.available_tokens();
            assert!(tokens <= 4.0, "step {i}: {tokens} > capacity");
            if ok {
                assert!(tokens >= 0.0, "step {i}: negative after acquire");
            }
        }
    }

    #[test]
    fn wait_time_reports_time_to_next_token() {
        let (clock, b) = bucket(5.0, None);
        assert_eq!(b.wait_time_ms(), 0);

        for _ in 0..5 {
            b.try_acquire();
        }
        assert_eq!(b.wait_time_ms(), 200);

        clock.advance_ms(50);
        assert_eq!(b.wait_time_ms(), 150);
    }

    #[test]
    fn acquire_sleeps_until_token_is_available() {
        let (clock, b) = bucket(2.0, Some(1.0));

        b.acquire();
        assert_eq!(clock.now_ms(), 0);

        // ManualClock::sleep сдвигает время на wait_time
        b.acquire();
        assert_eq!(clock.now_ms(), 500);
        assert!(b.available_tokens() < 1.0);
    }
}
