//! 报告模块：合规报告模型、报告组装、部署闸门
pub mod model;
pub mod builder;
pub mod gate;

pub use self::model::{ComplianceReport, Finding, LineRange, ReportSummary, Verdict};
pub use self::builder::ReportBuilder;
pub use self::gate::{Decision, GateDecision};
