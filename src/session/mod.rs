//! 会话层：探索运行的记录模型与按 id 存取的 JSON 存储

pub mod record;
pub mod store;

pub use record::{ActionRecord, Session, SessionStatus};
pub use store::SessionStore;
