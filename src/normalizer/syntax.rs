//! Solidity 语法树解析与代码视图生成
//! 语法树由 tree-sitter-solidity 生成，遇到不完整的源码时做错误恢复而不是失败；
//! 代码视图把注释和字符串内容替换为空格，换行保留，字节长度与原文一致

use std::fmt;

use tracing::warn;
use tree_sitter::{Node, Parser, Tree};

// 整段替换为空格的节点
const COMMENT_KINDS: [&str; 1] = ["comment"];
// 保留引号、只替换内容的节点
const STRING_KINDS: [&str; 4] = ["string", "string_literal", "hex_string_literal", "unicode_string_literal"];

/// 解析结果（语法树只读共享）
#[derive(Clone)]
pub struct SyntaxTree(Tree);

impl SyntaxTree {
    pub fn root(&self) -> Node<'_> {
        self.0.root_node()
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = self.root();
        f.debug_struct("SyntaxTree")
            .field("root", &root.kind())
            .field("has_error", &root.has_error())
            .finish()
    }
}

/// 解析源码；语法库加载失败时返回 None，调用方退化为逐行扫描
pub(crate) fn parse(raw: &str) -> Option<SyntaxTree> {
    let mut parser = Parser::new();
    let language = tree_sitter_solidity::LANGUAGE.into();
    if let Err(e) = parser.set_language(&language) {
        warn!("Solidity 语法加载失败，退化为逐行扫描：{}", e);
        return None;
    }
    parser.parse(raw, None).map(SyntaxTree)
}

/// 生成代码视图
pub(crate) fn code_view(raw: &str, tree: Option<&SyntaxTree>) -> String {
    let mut blank = vec![false; raw.len()];

    if let Some(tree) = tree {
        let root = tree.root();
        mark_trivia(root, raw, &mut blank);
        if root.has_error() {
            mark_unterminated_comments(raw, &mut blank);
        }
    }

    let mut code = String::with_capacity(raw.len());
    for (offset, c) in raw.char_indices() {
        if blank[offset] && c != '\n' {
            code.extend(std::iter::repeat_n(' ', c.len_utf8()));
        } else {
            code.push(c);
        }
    }
    code
}

/// 标记注释和字符串内容
fn mark_trivia(root: Node, raw: &str, blank: &mut [bool]) {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let range = node.byte_range();
        if COMMENT_KINDS.contains(&node.kind()) {
            fill(blank, range.start, range.end);
            continue;
        }
        if STRING_KINDS.contains(&node.kind()) {
            // hex"..." / unicode"..." 从第一个引号之后开始
            let text = raw.get(range.clone()).unwrap_or("");
            if let Some(quote) = text.find(['"', '\'']) {
                let start = range.start + quote + 1;
                let end = range.end.saturating_sub(1).max(start);
                fill(blank, start, end);
            }
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
}

/// 错误恢复不会产生 comment 节点的未闭合块注释，只替换到行尾
fn mark_unterminated_comments(raw: &str, blank: &mut [bool]) {
    for (pos, _) in raw.match_indices("/*") {
        if blank[pos] || raw[pos + 2..].contains("*/") {
            continue;
        }
        let end = raw[pos..].find('\n').map(|n| pos + n).unwrap_or(raw.len());
        fill(blank, pos, end);
    }
}

fn fill(blank: &mut [bool], start: usize, end: usize) {
    let end = end.min(blank.len());
    if start < end {
        blank[start..end].iter_mut().for_each(|b| *b = true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(raw: &str) -> String {
        code_view(raw, parse(raw).as_ref())
    }

    #[test]
    fn test_comments_and_strings_are_blanked() {
        let raw = "contract A {\n  // owner only\n  string s = \"selfdestruct\"; /* x\n y */ uint z;\n}\n";
        let code = view(raw);
        assert_eq!(code.len(), raw.len());
        assert_eq!(code.matches('\n').count(), raw.matches('\n').count());
        assert!(!code.contains("owner only"));
        assert!(!code.contains("selfdestruct"));
        assert!(code.contains("string s = \""));
        assert!(code.contains("uint z;"));
    }

    #[test]
    fn test_multibyte_comment_keeps_offsets() {
        let raw = "contract A { // 所有者 é\n  function f() public {}\n}";
        let code = view(raw);
        assert_eq!(code.len(), raw.len());
        assert_eq!(code.find("function"), raw.find("function"));
    }

    #[test]
    fn test_unterminated_comment_blanks_to_line_end() {
        let raw = "contract A {\n  function f() public {\n    x = 1; /* open\n    selfdestruct(y);\n";
        let tree = parse(raw);
        assert!(tree.as_ref().map(|t| t.root().has_error()).unwrap_or(true));
        let code = code_view(raw, tree.as_ref());
        assert!(!code.contains("open"));
        assert!(code.contains("selfdestruct(y);"));
    }

    #[test]
    fn test_parse_tolerates_garbage() {
        for input in ["", "}}}{{{", "function (", "\"", "/*", "\u{0}\u{ffff}é"] {
            let tree = parse(input);
            assert!(tree.is_some());
            assert_eq!(view(input).len(), input.len());
        }
    }
}
