//! 源码归一化模块：原文 -> 语法树 + 代码视图 + 行索引 + 函数块
pub mod syntax;
pub mod source;
pub mod functions;

pub use self::source::NormalizedSource;
pub use self::functions::{FunctionBlock, FunctionKind, Statement, StatementRole, Visibility};

use tracing::debug;

/// 源码归一化器
pub struct SourceNormalizer;

impl SourceNormalizer {
    /// 归一化合约源码
    /// 纯函数，永不失败：语法不完整时标记降级，匹配器按行继续工作
    pub fn normalize(raw: &str) -> NormalizedSource {
        let tree = syntax::parse(raw);
        let code = syntax::code_view(raw, tree.as_ref());

        let functions = tree
            .as_ref()
            .map(|t| {
                functions::function_nodes(t.root())
                    .into_iter()
                    .map(|node| functions::function_block(node, raw))
                    .collect()
            })
            .unwrap_or_default();

        let degraded = tree.as_ref().map(|t| t.root().has_error()).unwrap_or(true);
        if degraded {
            debug!("源码结构不完整，降级为逐行扫描（{} 字节）", raw.len());
        }

        NormalizedSource {
            raw: raw.to_string(),
            code,
            line_starts: source::line_starts(raw),
            tree,
            functions,
            degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = "contract A {\n  // note\n  function f() public { x = \"s\"; }\n}\n";
        assert_eq!(SourceNormalizer::normalize(raw), SourceNormalizer::normalize(raw));
    }

    #[test]
    fn test_line_mapping_survives_stripping() {
        let raw = "/* header\n   comment */\ncontract A {\n  function kill() public { selfdestruct(owner); }\n}";
        let src = SourceNormalizer::normalize(raw);
        let offset = src.code().find("selfdestruct").unwrap();
        assert_eq!(src.line_of(offset), 4);
        assert_eq!(src.line_text(4).map(str::trim), Some("function kill() public { selfdestruct(owner); }"));
        assert_eq!(src.functions()[0].start_line, 4);
    }

    #[test]
    fn test_empty_source() {
        let src = SourceNormalizer::normalize("");
        assert!(src.is_empty());
        assert!(src.syntax_root().is_some());
        assert!(src.functions().is_empty());
        assert!(!src.is_degraded());
        assert_eq!(src.line_count(), 0);
    }

    #[test]
    fn test_garbage_never_panics() {
        let inputs = ["}}}{{{", "function", "function (", "\"", "/*", "modifier x(", "receive() {", "\u{0}\u{ffff}é"];
        for input in inputs {
            let src = SourceNormalizer::normalize(input);
            assert_eq!(src.code().len(), input.len());
        }
        for input in ["}}}{{{", "function (", "modifier x("] {
            assert!(SourceNormalizer::normalize(input).is_degraded(), "{:?} should degrade", input);
        }
    }
}
