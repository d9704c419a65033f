//! 函数块与语句提取
//! 在语法树上识别 function / constructor / fallback / receive / modifier，
//! 读取可见性、可变性、修饰器和参数名，并把函数体展开为按源码顺序排列的语句

use std::ops::Range;

use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Constructor,
    Fallback,
    Receive,
    Modifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
    Unspecified,
}

impl Visibility {
    /// 外部可调用（未声明可见性的旧版函数默认 public）
    pub fn is_callable_externally(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::External | Visibility::Unspecified)
    }

    fn from_keyword(text: &str) -> Self {
        match text.trim() {
            "public" => Visibility::Public,
            "external" => Visibility::External,
            "internal" => Visibility::Internal,
            "private" => Visibility::Private,
            _ => Visibility::Unspecified,
        }
    }
}

/// 函数块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBlock {
    pub kind: FunctionKind,
    pub name: String,
    pub visibility: Visibility,
    // view / pure / payable
    pub mutability: Option<String>,
    pub modifiers: Vec<String>,
    pub params: Vec<String>,
    // 函数体字节区间（含大括号），仅声明时为 None
    pub body: Option<Range<usize>>,
    pub start_line: usize,
    pub end_line: usize,
}

impl FunctionBlock {
    pub fn is_read_only(&self) -> bool {
        matches!(self.mutability.as_deref(), Some("view") | Some("pure") | Some("constant"))
    }

    /// 显示名（匿名的旧式 fallback 用种类名）
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        match self.kind {
            FunctionKind::Constructor => "constructor",
            FunctionKind::Fallback | FunctionKind::Function => "fallback",
            FunctionKind::Receive => "receive",
            FunctionKind::Modifier => "modifier",
        }
    }
}

/// 语句在控制流中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementRole {
    /// 普通语句
    Plain,
    /// if / while / for 的条件或步进表达式
    Condition,
}

/// 函数体内的一条语句
#[derive(Debug, Clone, Copy)]
pub struct Statement<'t> {
    pub node: Node<'t>,
    pub role: StatementRole,
}

const FUNCTION_KINDS: [&str; 4] = [
    "function_definition",
    "constructor_definition",
    "fallback_receive_definition",
    "modifier_definition",
];
const CONTROL_KINDS: [&str; 4] = ["if_statement", "for_statement", "while_statement", "do_while_statement"];
const MUTABILITY_KEYWORDS: [&str; 4] = ["view", "pure", "payable", "constant"];

/// 按源码顺序收集函数类节点（含错误恢复节点内的）
pub(crate) fn function_nodes(root: Node<'_>) -> Vec<Node<'_>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if FUNCTION_KINDS.contains(&node.kind()) {
            found.push(node);
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

/// 从函数类节点读取函数块
pub(crate) fn function_block(node: Node, raw: &str) -> FunctionBlock {
    let text = |n: Node| raw.get(n.byte_range()).unwrap_or("").to_string();

    let kind = match node.kind() {
        "constructor_definition" => FunctionKind::Constructor,
        "modifier_definition" => FunctionKind::Modifier,
        "fallback_receive_definition" => {
            let mut cursor = node.walk();
            let is_receive = node.children(&mut cursor).any(|c| c.kind() == "receive");
            if is_receive {
                FunctionKind::Receive
            } else {
                FunctionKind::Fallback
            }
        }
        _ => FunctionKind::Function,
    };
    let name = node.child_by_field_name("name").map(text).unwrap_or_default();

    let mut visibility = Visibility::Unspecified;
    let mut mutability = None;
    let mut modifiers = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "visibility" => visibility = Visibility::from_keyword(&text(child)),
            "state_mutability" => mutability = Some(text(child).trim().to_string()),
            keyword if MUTABILITY_KEYWORDS.contains(&keyword) => mutability = Some(keyword.to_string()),
            "modifier_invocation" => {
                let mut inner = child.walk();
                let first_ident = child.named_children(&mut inner).find(|c| c.kind() == "identifier");
                if let Some(ident) = first_ident {
                    modifiers.push(text(ident));
                }
            }
            _ => {}
        }
    }

    FunctionBlock {
        kind,
        name,
        visibility,
        mutability,
        modifiers,
        params: parameter_names(node, raw),
        body: function_body(node).map(|b| b.byte_range()),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
    }
}

/// 函数体节点
pub(crate) fn function_body(node: Node<'_>) -> Option<Node<'_>> {
    if let Some(body) = node.child_by_field_name("body") {
        return Some(body);
    }
    let mut cursor = node.walk();
    let body = node.named_children(&mut cursor).find(|c| c.kind() == "function_body");
    body
}

/// 参数名（只有类型没有名字的参数忽略；返回值列表不算参数）
fn parameter_names(node: Node, raw: &str) -> Vec<String> {
    let mut params = direct_parameters(node);
    if params.is_empty() {
        if let Some(list) = node.child_by_field_name("parameters") {
            params = direct_parameters(list);
        }
    }
    params
        .into_iter()
        .filter_map(|p| p.child_by_field_name("name"))
        .filter_map(|n| raw.get(n.byte_range()))
        .map(str::to_string)
        .collect()
}

fn direct_parameters(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let params = node.named_children(&mut cursor).filter(|c| c.kind() == "parameter").collect();
    params
}

/// 将函数体展开为语句序列
/// 代码块、unchecked 块和控制语句的分支被拍平，控制语句的条件单独成为一条 Condition
pub fn statements(body: Node<'_>) -> Vec<Statement<'_>> {
    let mut out = Vec::new();
    collect_block(body, &mut out);
    out
}

fn collect_block<'t>(block: Node<'t>, out: &mut Vec<Statement<'t>>) {
    let mut cursor = block.walk();
    let children: Vec<_> = block.named_children(&mut cursor).collect();
    for child in children {
        collect_statement(child, out);
    }
}

fn collect_statement<'t>(node: Node<'t>, out: &mut Vec<Statement<'t>>) {
    let node = unwrap_statement(node);
    match node.kind() {
        "comment" => {}
        "block_statement" | "unchecked_block" => collect_block(node, out),
        kind if CONTROL_KINDS.contains(&kind) => {
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            for child in children {
                let child = unwrap_statement(child);
                if child.kind() == "comment" {
                    continue;
                }
                if is_statement_kind(child.kind()) {
                    collect_statement(child, out);
                } else {
                    out.push(Statement {
                        node: child,
                        role: StatementRole::Condition,
                    });
                }
            }
        }
        "try_statement" => {
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            for child in children {
                match child.kind() {
                    "block_statement" => collect_block(child, out),
                    "catch_clause" => {
                        let mut inner = child.walk();
                        let blocks: Vec<_> = child
                            .named_children(&mut inner)
                            .filter(|c| c.kind() == "block_statement")
                            .collect();
                        for block in blocks {
                            collect_block(block, out);
                        }
                    }
                    "comment" | "return_type_definition" => {}
                    _ => out.push(Statement {
                        node: child,
                        role: StatementRole::Plain,
                    }),
                }
            }
        }
        _ => out.push(Statement {
            node,
            role: StatementRole::Plain,
        }),
    }
}

/// 去掉 statement 包装节点
fn unwrap_statement(node: Node<'_>) -> Node<'_> {
    if node.kind() == "statement" {
        if let Some(inner) = node.named_child(0) {
            return inner;
        }
    }
    node
}

fn is_statement_kind(kind: &str) -> bool {
    kind.ends_with("_statement") || kind == "unchecked_block"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::SourceNormalizer;

    const CONTRACT: &str = r#"
contract Vault {
    address public owner;
    mapping(address => uint256) balances;

    constructor() { owner = msg.sender; }

    modifier onlyOwner() {
        require(msg.sender == owner, "not owner");
        _;
    }

    function withdraw(uint256 amount, address payable to) external onlyOwner nonReentrant returns (bool ok) {
        (bool sent, ) = to.call{value: amount}("");
        if (!sent) {
            revert();
        } else {
            balances[to] -= amount;
        }
        return sent;
    }

    function peek() public view returns (uint256) { return 1; }

    function hook() external;

    receive() external payable {}
}
"#;

    #[test]
    fn test_extract_functions() {
        let src = SourceNormalizer::normalize(CONTRACT);
        let kinds: Vec<_> = src.functions().iter().map(|f| (f.kind, f.display_name().to_string())).collect();
        assert_eq!(
            kinds,
            vec![
                (FunctionKind::Constructor, "constructor".to_string()),
                (FunctionKind::Modifier, "onlyOwner".to_string()),
                (FunctionKind::Function, "withdraw".to_string()),
                (FunctionKind::Function, "peek".to_string()),
                (FunctionKind::Function, "hook".to_string()),
                (FunctionKind::Receive, "receive".to_string()),
            ]
        );

        let withdraw = &src.functions()[2];
        assert_eq!(withdraw.visibility, Visibility::External);
        assert_eq!(withdraw.modifiers, vec!["onlyOwner".to_string(), "nonReentrant".to_string()]);
        assert_eq!(withdraw.params, vec!["amount".to_string(), "to".to_string()]);
        assert_eq!(withdraw.start_line, 13);
        assert_eq!(withdraw.end_line, 21);

        assert!(src.functions()[3].is_read_only());
        assert!(src.functions()[4].body.is_none());
        assert_eq!(src.functions()[5].mutability.as_deref(), Some("payable"));
        assert!(!src.is_degraded());
    }

    #[test]
    fn test_statements_flatten_branches() {
        let src = SourceNormalizer::normalize(CONTRACT);
        let root = src.syntax_root().unwrap();
        let withdraw = function_nodes(root)[2];
        let body = function_body(withdraw).unwrap();
        let steps: Vec<_> = statements(body)
            .iter()
            .map(|s| (s.role, src.node_lines(&s.node).0))
            .collect();
        assert_eq!(
            steps,
            vec![
                (StatementRole::Plain, 14),
                (StatementRole::Condition, 15),
                (StatementRole::Plain, 16),
                (StatementRole::Plain, 18),
                (StatementRole::Plain, 20),
            ]
        );
    }

    #[test]
    fn test_unclosed_body_degrades() {
        let src = SourceNormalizer::normalize("contract A {\n  function f() public {\n    owner = msg.sender;\n");
        assert!(src.is_degraded());
        assert!(src.functions().iter().all(|f| f.start_line == 2));
    }
}
