//! # 防伪 state 登记表
//!
//! 登录重定向时签发一次性 state，回调时消费。底层是只按 TTL 淘汰的
//! moka 并发缓存，占用由新鲜度窗口和签发速率决定，后台任务定期清扫。
//! 容量只是告警阈值：已签发的 state 在过期或被消费前不会被挤出。

use moka::future::Cache;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::random::{STATE_TOKEN_LENGTH, TokenGenerator};
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 默认新鲜度窗口
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);
/// 默认挂起 state 告警阈值
pub const DEFAULT_STATE_CAPACITY: u64 = 100_000;

/// 已签发未消费的 state
#[derive(Debug, Clone, Copy)]
pub struct PendingState {
    /// 签发时间
    pub issued_at: Instant,
}

/// 一次性 state 登记表
#[derive(Clone)]
pub struct StateRegistry {
    pending: Cache<String, PendingState>,
    max_age: Duration,
    warn_threshold: u64,
    over_threshold: Arc<AtomicBool>,
    generator: Arc<dyn TokenGenerator>,
}

impl StateRegistry {
    /// 创建登记表，挂起数超过 `warn_threshold` 时记录告警
    pub fn new(max_age: Duration, warn_threshold: u64, generator: Arc<dyn TokenGenerator>) -> Self {
        let pending = Cache::builder().time_to_live(max_age).build();
        Self {
            pending,
            max_age,
            warn_threshold,
            over_threshold: Arc::new(AtomicBool::new(false)),
            generator,
        }
    }

    /// 签发新的 state 并记录签发时间
    pub async fn issue(&self) -> String {
        let token = self.generator.generate(STATE_TOKEN_LENGTH);
        self.pending
            .insert(
                token.clone(),
                PendingState {
                    issued_at: Instant::now(),
                },
            )
            .await;

        let pending = self.pending.entry_count();
        if pending > self.warn_threshold && !self.over_threshold.swap(true, Ordering::Relaxed) {
            lwarn!(
                "system",
                LogStage::Authentication,
                LogComponent::StateRegistry,
                "issue_state",
                "挂起的 state 超过告警阈值，可能有人在刷登录入口",
                pending = pending,
                threshold = self.warn_threshold
            );
        }
        token
    }

    /// 消费 state
    ///
    /// 仅当 state 存在且仍在新鲜度窗口内时返回 `true`。条目在检查前即被移除，
    /// 所以同一个 state 至多成功一次，并发调用时也是如此。
    pub async fn consume(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        match self.pending.remove(token).await {
            Some(pending) => pending.issued_at.elapsed() <= self.max_age,
            None => false,
        }
    }

    /// 执行挂起的淘汰任务，清掉过期条目
    pub async fn sweep(&self) {
        self.pending.run_pending_tasks().await;
        if self.pending.entry_count() <= self.warn_threshold {
            self.over_threshold.store(false, Ordering::Relaxed);
        }
    }

    /// 当前挂起的 state 数（近似值，`sweep` 之后准确）
    #[must_use]
    pub fn pending_count(&self) -> u64 {
        self.pending.entry_count()
    }

    /// 新鲜度窗口
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    /// 启动后台清扫任务
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.sweep().await;
                ldebug!(
                    "system",
                    LogStage::BackgroundTask,
                    LogComponent::StateRegistry,
                    "state_sweep",
                    "state 清扫完成",
                    pending = registry.pending_count()
                );
            }
        })
    }
}

impl fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateRegistry")
            .field("pending", &self.pending.entry_count())
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sso::random::{SecureTokenGenerator, SequenceTokenGenerator};

    fn registry(max_age: Duration) -> StateRegistry {
        StateRegistry::new(max_age, 1_000, Arc::new(SecureTokenGenerator))
    }

    #[tokio::test]
    async fn test_consume_exactly_once() {
        let registry = registry(DEFAULT_STATE_TTL);
        let token = registry.issue().await;

        assert_eq!(token.len(), STATE_TOKEN_LENGTH);
        assert!(registry.consume(&token).await);
        assert!(!registry.consume(&token).await);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_tokens_rejected() {
        let registry = registry(DEFAULT_STATE_TTL);
        registry.issue().await;

        assert!(!registry.consume("").await);
        assert!(!registry.consume("never-issued").await);
    }

    #[tokio::test]
    async fn test_stale_token_rejected() {
        let registry = registry(Duration::from_millis(50));
        let token = registry.issue().await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!registry.consume(&token).await);
    }

    #[tokio::test]
    async fn test_sweep_evicts_expired_entries() {
        let registry = registry(Duration::from_millis(50));
        for _ in 0..10 {
            registry.issue().await;
        }
        registry.sweep().await;
        assert_eq!(registry.pending_count(), 10);

        tokio::time::sleep(Duration::from_millis(120)).await;
        registry.sweep().await;
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_generator() {
        let registry = StateRegistry::new(
            DEFAULT_STATE_TTL,
            10,
            Arc::new(SequenceTokenGenerator::new(["abc123"])),
        );
        assert_eq!(registry.issue().await, "abc123");
        assert!(registry.consume("abc123").await);
    }

    #[tokio::test]
    async fn test_fresh_states_survive_flood_past_threshold() {
        let registry = StateRegistry::new(DEFAULT_STATE_TTL, 10, Arc::new(SecureTokenGenerator));
        for _ in 0..200 {
            registry.issue().await;
        }
        registry.sweep().await;
        assert_eq!(registry.pending_count(), 200);

        for _ in 0..20 {
            let token = registry.issue().await;
            registry.sweep().await;
            assert!(registry.consume(&token).await);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consume_single_winner() {
        let registry = registry(DEFAULT_STATE_TTL);
        let token = registry.issue().await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let token = token.clone();
                tokio::spawn(async move { registry.consume(&token).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_logins_do_not_interfere() {
        let registry = registry(DEFAULT_STATE_TTL);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let token = registry.issue().await;
                    registry.consume(&token).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
    }
}
