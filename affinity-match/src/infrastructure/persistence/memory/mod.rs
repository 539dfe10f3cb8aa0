//! 进程内后端实现
//!
//! 用于测试和演示程序，模拟托管文档库的认证、访问规则、实时监听和故障。

mod backend;
mod query;
mod rules;
mod session;

pub use backend::{BackendOp, InMemoryBackend, SERVER_TIMESTAMP_SENTINEL, StoredDocument, server_timestamp};
pub use query::{CollectionQuery, Direction, FieldFilter};
pub use session::BackendSession;
