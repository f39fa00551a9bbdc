//! 内容魔数规则
//!
//! 一条 magic 规则由若干顶层匹配节点组成，任一节点命中即视为命中。
//! 每个节点带类型、偏移区间、字面值与可选掩码，并可嵌套子节点：
//! 节点自身命中后，若存在子节点则还要求任一子节点命中。
//! 数值类型的字面值一律按大端字节序存储，匹配时按类型语义决定比较方向。

use crate::error::{MimeError, Result};

pub const MIN_PRIORITY: u32 = 0;
pub const MAX_PRIORITY: u32 = 100;
pub const DEFAULT_PRIORITY: u32 = 50;

/// match 节点的取值类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicKind {
    String,
    Host16,
    Host32,
    Big16,
    Big32,
    Little16,
    Little32,
    Byte,
}

impl MagicKind {
    /// 类型表的规范顺序，同时充当二进制缓存里的类型索引。
    pub const ALL: [Self; 8] = [
        Self::String,
        Self::Host16,
        Self::Host32,
        Self::Big16,
        Self::Big32,
        Self::Little16,
        Self::Little32,
        Self::Byte,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Host16 => "host16",
            Self::Host32 => "host32",
            Self::Big16 => "big16",
            Self::Big32 => "big32",
            Self::Little16 => "little16",
            Self::Little32 => "little32",
            Self::Byte => "byte",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL
            .into_iter()
            .position(|kind| kind == self)
            .unwrap_or(0)
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 数值类型的固定宽度；string 无固定宽度。
    #[must_use]
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::String => None,
            Self::Byte => Some(1),
            Self::Host16 | Self::Big16 | Self::Little16 => Some(2),
            Self::Host32 | Self::Big32 | Self::Little32 => Some(4),
        }
    }

    /// 比较时是否要把存储的大端字节反序。
    ///
    /// host 类型按运行时本机字节序解释：小端主机上与 little 等价。
    #[must_use]
    pub const fn reverse_order(self) -> bool {
        match self {
            Self::Little16 | Self::Little32 => true,
            Self::Host16 | Self::Host32 => cfg!(target_endian = "little"),
            Self::String | Self::Big16 | Self::Big32 | Self::Byte => false,
        }
    }
}

/// magic 规则树中的一个匹配节点。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeMagicMatcher {
    kind: MagicKind,
    offset_begin: usize,
    offset_end: usize,
    value: Vec<u8>,
    mask: Option<Vec<u8>>,
    sub_matchers: Vec<MimeMagicMatcher>,
}

impl MimeMagicMatcher {
    /// 构造一个匹配节点。
    ///
    /// # Errors
    ///
    /// 当 `offset_begin > offset_end`、value 为空或数值类型的 value 宽度
    /// 与类型不符时返回 [`MimeError::MalformedDatabase`]。
    pub fn new(
        kind: MagicKind,
        offset_begin: usize,
        offset_end: usize,
        value: Vec<u8>,
    ) -> Result<Self> {
        if offset_begin > offset_end {
            return Err(MimeError::malformed(format!(
                "inverted match offset range {offset_begin}:{offset_end}"
            )));
        }
        if value.is_empty() {
            return Err(MimeError::malformed("empty match value"));
        }
        if let Some(width) = kind.width() {
            if value.len() != width {
                return Err(MimeError::malformed(format!(
                    "{} match value must be {width} bytes, got {}",
                    kind.name(),
                    value.len()
                )));
            }
        }
        Ok(Self {
            kind,
            offset_begin,
            offset_end,
            value,
            mask: None,
            sub_matchers: Vec::new(),
        })
    }

    /// 设置掩码：`(byte AND mask[i]) == value[i]` 视为相等。
    ///
    /// # Errors
    ///
    /// 当掩码长度与 value 不一致时返回 [`MimeError::MalformedDatabase`]。
    pub fn with_mask(
        mut self,
        mask: Vec<u8>,
    ) -> Result<Self> {
        if mask.len() != self.value.len() {
            return Err(MimeError::malformed(format!(
                "mask length {} does not match value length {}",
                mask.len(),
                self.value.len()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    #[must_use]
    pub fn with_sub_matchers(
        mut self,
        sub_matchers: Vec<MimeMagicMatcher>,
    ) -> Self {
        self.sub_matchers = sub_matchers;
        self
    }

    pub(crate) fn push_sub_matcher(
        &mut self,
        sub: MimeMagicMatcher,
    ) {
        self.sub_matchers.push(sub);
    }

    #[must_use]
    pub const fn kind(&self) -> MagicKind {
        self.kind
    }

    #[must_use]
    pub const fn offset_begin(&self) -> usize {
        self.offset_begin
    }

    #[must_use]
    pub const fn offset_end(&self) -> usize {
        self.offset_end
    }

    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[must_use]
    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    #[must_use]
    pub fn sub_matchers(&self) -> &[MimeMagicMatcher] {
        &self.sub_matchers
    }

    /// 本节点（含子树）完整判定所需的最大前缀字节数。
    #[must_use]
    pub fn max_test_bytes(&self) -> usize {
        let own = self.offset_end + self.value.len();
        self.sub_matchers
            .iter()
            .map(MimeMagicMatcher::max_test_bytes)
            .fold(own, usize::max)
    }

    /// 对 `buffer` 的前 `n` 个有效字节判定本节点是否命中。
    ///
    /// 节点自身在 `[offset_begin, offset_end]` 的每个偏移上搜索；
    /// 命中后若有子节点，还需任一子节点命中。
    ///
    /// # Panics
    ///
    /// `n > buffer.len()` 违反前置条件。
    #[must_use]
    pub fn matches(
        &self,
        buffer: &[u8],
        n: usize,
    ) -> bool {
        assert!(n <= buffer.len(), "n exceeds the buffer length");
        if !self.matches_value(buffer, n) {
            return false;
        }
        if self.sub_matchers.is_empty() {
            return true;
        }
        self.sub_matchers.iter().any(|sub| sub.matches(buffer, n))
    }

    fn matches_value(
        &self,
        buffer: &[u8],
        n: usize,
    ) -> bool {
        let len = self.value.len();
        if n < len {
            return false;
        }
        let scan_end = (n - len).min(self.offset_end);
        if self.offset_begin > scan_end {
            return false;
        }
        let reverse = self.kind.reverse_order();
        (self.offset_begin..=scan_end).any(|offset| self.matches_at(buffer, offset, reverse))
    }

    fn matches_at(
        &self,
        buffer: &[u8],
        offset: usize,
        reverse: bool,
    ) -> bool {
        let len = self.value.len();
        for i in 0..len {
            let vi = if reverse { len - 1 - i } else { i };
            let mask = self.mask.as_ref().map_or(0xFF, |m| m[vi]);
            if buffer[offset + i] & mask != self.value[vi] {
                return false;
            }
        }
        true
    }
}

/// 一组带优先级的顶层匹配节点。
///
/// 优先级只参与检测阶段的裁决，不影响 `matches` 本身。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeMagic {
    priority: u32,
    matchers: Vec<MimeMagicMatcher>,
}

impl MimeMagic {
    #[must_use]
    pub fn new(matchers: Vec<MimeMagicMatcher>) -> Self {
        debug_assert!(!matchers.is_empty());
        Self {
            priority: DEFAULT_PRIORITY,
            matchers,
        }
    }

    #[must_use]
    pub fn with_priority(
        mut self,
        priority: u32,
    ) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn priority(&self) -> u32 {
        self.priority
    }

    #[must_use]
    pub fn matchers(&self) -> &[MimeMagicMatcher] {
        &self.matchers
    }

    /// 本条规则完整判定所需的最大前缀字节数，用于决定读缓冲大小。
    #[must_use]
    pub fn max_test_bytes(&self) -> usize {
        self.matchers
            .iter()
            .map(MimeMagicMatcher::max_test_bytes)
            .max()
            .unwrap_or(0)
    }

    /// 任一顶层节点命中即命中。
    #[must_use]
    pub fn matches(
        &self,
        buffer: &[u8],
        n: usize,
    ) -> bool {
        self.matchers.iter().any(|m| m.matches(buffer, n))
    }
}
