//! # 单点登录核心
//!
//! 与提供方无关的 OAuth2 授权码流程：防伪 state 管理、授权码交换、
//! 不透明会话 cookie 签发，以及按 cookie 查找、刷新持久化凭据。

pub mod controller;
pub mod cookie;
pub mod credential;
pub mod random;
pub mod state;
pub mod token_exchange;

pub use controller::{
    AuthFlowController, CallbackParams, FlowOptions, Found, OptionalCredentials, SessionEnricher,
};
pub use cookie::{DEFAULT_SESSION_TTL_DAYS, SessionCookieBinder};
pub use credential::{AuthenticatedClient, Credentials, REFRESH_LEEWAY, SessionRecord, TokenRecord};
pub use random::{SESSION_KEY_LENGTH, STATE_TOKEN_LENGTH, SecureTokenGenerator, SequenceTokenGenerator, TokenGenerator};
pub use state::{DEFAULT_STATE_CAPACITY, DEFAULT_STATE_TTL, PendingState, StateRegistry};
pub use token_exchange::{DEFAULT_EXCHANGE_TIMEOUT, TokenExchangeClient, parse_token_body};
