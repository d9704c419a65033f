//! 归一化源码视图
//! 原文、代码视图、行索引、语法树和函数块；单次分析独享，分析结束即丢弃

use std::ops::Range;

use tree_sitter::Node;

use super::functions::{self, FunctionBlock};
use super::syntax::SyntaxTree;

/// 归一化后的合约源码
#[derive(Debug, Clone)]
pub struct NormalizedSource {
    pub(crate) raw: String,
    pub(crate) code: String,
    pub(crate) line_starts: Vec<usize>,
    pub(crate) tree: Option<SyntaxTree>,
    pub(crate) functions: Vec<FunctionBlock>,
    pub(crate) degraded: bool,
}

// 语法树由原文唯一确定，不参与比较
impl PartialEq for NormalizedSource {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
            && self.code == other.code
            && self.line_starts == other.line_starts
            && self.functions == other.functions
            && self.degraded == other.degraded
    }
}

impl Eq for NormalizedSource {}

impl NormalizedSource {
    /// 原始文本
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// 代码视图（注释和字符串内容为空格，偏移与原文一致）
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn functions(&self) -> &[FunctionBlock] {
        &self.functions
    }

    /// 语法树根节点；语法库不可用时为 None
    pub fn syntax_root(&self) -> Option<Node<'_>> {
        self.tree.as_ref().map(SyntaxTree::root)
    }

    /// 与 functions() 一一对应的函数类节点
    pub(crate) fn function_nodes(&self) -> Vec<Node<'_>> {
        self.syntax_root().map(functions::function_nodes).unwrap_or_default()
    }

    /// 源码不完整时为 true，匹配退化为逐行扫描
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }

    pub fn line_count(&self) -> usize {
        if self.raw.is_empty() {
            0
        } else {
            self.line_starts.len()
        }
    }

    /// 字节偏移对应的行号（从 1 开始）
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset).max(1)
    }

    /// 字节区间对应的行范围
    pub fn line_range(&self, span: &Range<usize>) -> (usize, usize) {
        let start = self.line_of(span.start);
        let end = if span.end > span.start {
            self.line_of(span.end - 1)
        } else {
            start
        };
        (start, end)
    }

    /// 原文中某一行的文本（不含换行符）
    pub fn line_text(&self, line: usize) -> Option<&str> {
        if line == 0 || line > self.line_count() {
            return None;
        }
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.raw.len());
        Some(self.raw[start..end].trim_end_matches('\r'))
    }

    /// 语法节点在原文中的文本
    pub fn node_text(&self, node: &Node) -> &str {
        self.raw.get(node.byte_range()).unwrap_or("")
    }

    /// 语法节点的行范围
    pub fn node_lines(&self, node: &Node) -> (usize, usize) {
        self.line_range(&node.byte_range())
    }

    /// 按匹配范围选择扫描文本
    pub fn text_for_scope(&self, include_comments: bool) -> &str {
        if include_comments {
            &self.raw
        } else {
            &self.code
        }
    }
}

/// 计算每行起始偏移
pub(crate) fn line_starts(raw: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(raw.match_indices('\n').map(|(pos, _)| pos + 1))
        .collect()
}
