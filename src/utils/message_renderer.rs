//! 消息模板渲染工具
//! 将规则消息模板中的占位符替换为命中上下文
//! 支持 {rule} / {category} / {severity} / {line} / {match} / {function}

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// 命中上下文
#[derive(Debug, Clone, Default)]
pub struct MessageContext<'a> {
    pub rule_id: &'a str,
    pub category: &'a str,
    pub severity: &'a str,
    pub line: usize,
    pub matched: &'a str,
    pub function: Option<&'a str>,
}

/// 消息中引用的命中文本上限（字符数）
const MAX_MATCH_CHARS: usize = 80;

/// 消息模板渲染工具
pub struct MessageRenderer;

impl MessageRenderer {
    /// 渲染消息模板
    ///
    /// # 参数
    /// - `template`: 规则的消息模板
    /// - `ctx`: 命中上下文
    ///
    /// # 返回值
    /// 替换后的消息；未知占位符原样保留
    pub fn render(template: &str, ctx: &MessageContext) -> String {
        static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\{(rule|category|severity|line|match|function)\}").unwrap()
        });

        let matched = Self::condense(ctx.matched);
        // 单遍替换，插入的值不会再被当作占位符展开
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match &caps[1] {
                "rule" => ctx.rule_id.to_string(),
                "category" => ctx.category.to_string(),
                "severity" => ctx.severity.to_string(),
                "line" => ctx.line.to_string(),
                "match" => matched.clone(),
                _ => ctx.function.unwrap_or("<contract>").to_string(),
            })
            .trim()
            .to_string()
    }

    /// 命中文本压缩为单行并截断
    pub fn condense(text: &str) -> String {
        let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if single_line.chars().count() <= MAX_MATCH_CHARS {
            return single_line;
        }
        let truncated: String = single_line.chars().take(MAX_MATCH_CHARS).collect();
        format!("{}…", truncated)
    }
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_all_placeholders() {
        let ctx = MessageContext {
            rule_id: "no-selfdestruct",
            category: "access-control",
            severity: "CRITICAL",
            line: 12,
            matched: "selfdestruct",
            function: Some("kill"),
        };
        let message = MessageRenderer::render(
            "[{severity}] {rule}/{category}: `{match}` in {function} at line {line} {unknown}",
            &ctx,
        );
        assert_eq!(
            message,
            "[CRITICAL] no-selfdestruct/access-control: `selfdestruct` in kill at line 12 {unknown}"
        );
    }

    #[test]
    fn test_render_without_function() {
        let ctx = MessageContext {
            rule_id: "r",
            line: 1,
            matched: "x",
            ..Default::default()
        };
        assert_eq!(MessageRenderer::render("{match} in {function}", &ctx), "x in <contract>");
    }

    #[test]
    fn test_inserted_values_are_not_expanded_again() {
        let ctx = MessageContext {
            rule_id: "{severity}",
            category: "c",
            severity: "WARNING",
            line: 3,
            matched: "\"{function}\"",
            function: Some("f"),
        };
        assert_eq!(
            MessageRenderer::render("found {match} by {rule} in {function}", &ctx),
            "found \"{function}\" by {severity} in f"
        );
    }

    #[test]
    fn test_condense_multiline_and_long_text() {
        assert_eq!(MessageRenderer::condense("a\n   b\tc"), "a b c");
        let long = "x".repeat(200);
        let condensed = MessageRenderer::condense(&long);
        assert_eq!(condensed.chars().count(), MAX_MATCH_CHARS + 1);
        assert!(condensed.ends_with('…'));
    }
}
