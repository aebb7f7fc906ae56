//! # 随机令牌生成
//!
//! state 与会话键都由这里生成。生成器作为显式依赖注入，测试可以提供确定序列。

use rand::{Rng, distributions::Alphanumeric};
use std::collections::VecDeque;
use std::sync::Mutex;

/// state 令牌长度（约 190 bit 熵）
pub const STATE_TOKEN_LENGTH: usize = 32;
/// 会话键长度（约 285 bit 熵）
pub const SESSION_KEY_LENGTH: usize = 48;

/// 不可猜测令牌的来源
pub trait TokenGenerator: Send + Sync {
    /// 生成长度为 `length` 的令牌
    fn generate(&self, length: usize) -> String;
}

/// 基于线程本地 CSPRNG 的字母数字令牌
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureTokenGenerator;

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self, length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect()
    }
}

/// 按顺序吐出预设值的生成器，预设耗尽后回落到安全生成器
///
/// 用于测试中固定 state 和会话键。
#[derive(Debug, Default)]
pub struct SequenceTokenGenerator {
    queue: Mutex<VecDeque<String>>,
}

impl SequenceTokenGenerator {
    /// 用给定序列创建生成器
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: Mutex::new(values.into_iter().map(Into::into).collect()),
        }
    }

    /// 追加预设值
    pub fn push(&self, value: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(value.into());
        }
    }
}

impl TokenGenerator for SequenceTokenGenerator {
    fn generate(&self, length: usize) -> String {
        let next = self.queue.lock().ok().and_then(|mut queue| queue.pop_front());
        next.unwrap_or_else(|| SecureTokenGenerator.generate(length))
    }
}
