//! 文件名 glob 规则
//!
//! 每条 glob 是一个 shell 风格的文件名模式，带权重与大小写敏感标志。
//! 匹配时把模式翻译成锚定的正则表达式；编译结果按实例记忆，
//! 仓库构建完成后即只读，匹配热路径上没有任何写操作。

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

pub const MIN_WEIGHT: u32 = 0;
pub const MAX_WEIGHT: u32 = 100;
pub const DEFAULT_WEIGHT: u32 = 50;
pub const DEFAULT_CASE_SENSITIVE: bool = false;

/// 某个 MIME 类型的一条文件名模式。
#[derive(Debug, Clone)]
pub struct MimeGlob {
    pattern: String,
    weight: u32,
    case_sensitive: bool,
    regex: OnceLock<Option<Regex>>,
}

impl MimeGlob {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            weight: DEFAULT_WEIGHT,
            case_sensitive: DEFAULT_CASE_SENSITIVE,
            regex: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_weight(
        mut self,
        weight: u32,
    ) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_case_sensitive(
        mut self,
        case_sensitive: bool,
    ) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub const fn weight(&self) -> u32 {
        self.weight
    }

    #[must_use]
    pub const fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// 判断文件名是否匹配本条模式。
    ///
    /// 模式或文件名为空时恒为 false；编译失败的模式永不匹配。
    #[must_use]
    pub fn matches(
        &self,
        filename: &str,
    ) -> bool {
        if filename.is_empty() || self.pattern.is_empty() {
            return false;
        }
        self.compiled()
            .as_ref()
            .is_some_and(|re| re.is_match(filename))
    }

    /// 提前编译正则，供仓库构建阶段调用；之后匹配路径为纯读。
    pub(crate) fn compile_eagerly(&self) {
        let _ = self.compiled();
    }

    fn compiled(&self) -> &Option<Regex> {
        self.regex.get_or_init(|| {
            let regex = format!("^{}$", glob_to_regex(&self.pattern));
            RegexBuilder::new(&regex)
                .case_insensitive(!self.case_sensitive)
                .build()
                .ok()
        })
    }
}

impl PartialEq for MimeGlob {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.weight == other.weight
            && self.case_sensitive == other.case_sensitive
            && self.pattern == other.pattern
    }
}

impl Eq for MimeGlob {}

/// shell glob 到正则的标准翻译：`*` → `.*`，`?` → `.`，`[...]` 原样保留
/// （起始 `!` 翻译为 `^`），其余正则元字符转义。
fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                // 找到闭合的 ']' 才按字符类处理，否则按字面量转义
                let close = chars[i + 1..].iter().position(|&c| c == ']');
                if let Some(rel) = close {
                    let end = i + 1 + rel;
                    out.push('[');
                    let mut j = i + 1;
                    if j < end && chars[j] == '!' {
                        out.push('^');
                        j += 1;
                    }
                    while j < end {
                        if chars[j] == '\\' {
                            out.push('\\');
                        }
                        out.push(chars[j]);
                        j += 1;
                    }
                    out.push(']');
                    i = end;
                } else {
                    out.push_str("\\[");
                }
            }
            c @ ('.' | '+' | '(' | ')' | '{' | '}' | '^' | '$' | '|' | '\\' | ']') => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}
