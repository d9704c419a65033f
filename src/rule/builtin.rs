//! 内置检测器
//! ZK / 预言机 / KYC 三类依赖始终上报（至少 INFO），作为普通规则注入每个规则集，
//! 与宪章规则共用同一条匹配流水线

use std::collections::HashMap;
use serde_json::json;

use super::model::{Severity, CATEGORY_KYC_FLAG, CATEGORY_ORACLE_DEPENDENCY, CATEGORY_ZK_USAGE};
use crate::compiler::{RuleCompiler, RuleDefinition};
use crate::error::{TfResult, TrustFlowError};

/// 内置规则ID前缀，宪章规则不得使用
pub const BUILTIN_ID_PREFIX: &str = "builtin.";

/// 内置检测器定义
struct BuiltinDetector {
    category: &'static str,
    pattern: &'static str,
    message: &'static str,
}

const BUILTIN_DETECTORS: [BuiltinDetector; 3] = [
    BuiltinDetector {
        category: CATEGORY_ZK_USAGE,
        pattern: r"(?i:zk-?snarks?|zk-?starks?|plonk|groth16|verifyProof|verifier|publicInputs|bellman|sapling|snarkjs|\bproofs?\b)",
        message: "Zero-knowledge proof usage detected (`{match}`); the contract relies on off-chain proof generation and an on-chain verifier.",
    },
    BuiltinDetector {
        category: CATEGORY_ORACLE_DEPENDENCY,
        pattern: r"(?i:chainlink|price_?feed|Aggregator(?:V2V3|V3)?Interface|latestRoundData|VRFConsumerBase(?:V2)?|VRFCoordinator|i_coordinator|getRandomNumber|DataFeed|oracle)",
        message: "External oracle dependency detected (`{match}`); off-chain data such as prices or randomness is trusted on-chain.",
    },
    BuiltinDetector {
        category: CATEGORY_KYC_FLAG,
        pattern: r"KYC|AML|(?i:\bkyc|\baml\b|white-?list|black-?list|allow-?list|deny-?list|identity|isVerified|restrictAccess)",
        message: "KYC/AML or identity-gating construct detected (`{match}`); access may be restricted to specific user groups.",
    },
];

/// 内置规则ID
pub fn builtin_rule_id(category: &str) -> String {
    format!("{}{}", BUILTIN_ID_PREFIX, category)
}

/// 内置分类列表
pub fn builtin_categories() -> impl Iterator<Item = &'static str> {
    BUILTIN_DETECTORS.iter().map(|d| d.category)
}

/// 生成内置规则，可通过宪章的 builtin_severity 提升等级
pub fn builtin_rules(overrides: &HashMap<String, String>) -> TfResult<Vec<RuleDefinition>> {
    for category in overrides.keys() {
        if !builtin_categories().any(|c| c == category) {
            return Err(TrustFlowError::RuleValidationError(format!(
                "builtin_severity 包含未知的内置分类：{}",
                category
            )));
        }
    }

    let mut rules = Vec::with_capacity(BUILTIN_DETECTORS.len());
    for detector in &BUILTIN_DETECTORS {
        let id = builtin_rule_id(detector.category);
        let severity = match overrides.get(detector.category) {
            Some(raw) => RuleCompiler::parse_severity(raw, "builtin_severity")?,
            None => Severity::Info,
        };
        // 扫描原文：import 路径和注释中的依赖线索同样上报
        let matcher = RuleCompiler::compile_matcher(
            &id,
            &json!({"type": "regex", "pattern": detector.pattern, "scope": "all"}),
        )?;

        rules.push(RuleDefinition {
            id,
            category: detector.category.to_string(),
            severity,
            matcher,
            message: detector.message.to_string(),
            builtin: true,
        });
    }

    Ok(rules)
}
