//! 工具模块：检测结果归并、消息模板渲染
pub mod finding_resolver;
pub mod message_renderer;

pub use self::finding_resolver::FindingResolver;
pub use self::message_renderer::{MessageContext, MessageRenderer};
