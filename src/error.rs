//! 错误模型
//!
//! 库内所有数据格式与检测路径的失败都归入 [`MimeError`] 的固定几类：
//! 数据库格式错误、缓存格式错误、未知 MIME 类型、不支持的 MIME 类型、I/O 失败。
//! `detect*` 系列接口用空列表/`None` 表示“未识别”，从不以错误表达。

use std::fmt;

#[derive(Debug)]
pub enum MimeError {
    /// XML 数据库格式非法（缺少必需属性、数值溢出、非法 offset、未知 match 类型、
    /// string 类型的 mask/value 长度不匹配等）。
    MalformedDatabase { reason: String },
    /// 二进制缓存非法（签名不匹配、数据截断、非法类型索引、offset 倒置等）。
    InvalidCache { reason: String },
    /// 按名称/别名查找不到 MIME 类型。
    UnknownMimeType { name: String },
    /// 调用方声明不支持的 MIME 类型。
    UnsupportedMimeType { name: String },
    /// 底层 I/O 失败。
    Io(std::io::Error),
}

impl MimeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedDatabase {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_cache(reason: impl Into<String>) -> Self {
        Self::InvalidCache {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn unknown_mime_type(name: impl Into<String>) -> Self {
        Self::UnknownMimeType { name: name.into() }
    }

    #[must_use]
    pub fn unsupported_mime_type(name: impl Into<String>) -> Self {
        Self::UnsupportedMimeType { name: name.into() }
    }
}

impl fmt::Display for MimeError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::MalformedDatabase { reason } => {
                write!(f, "MIME 数据库格式非法: {reason}")
            }
            Self::InvalidCache { reason } => {
                write!(f, "MIME 仓库缓存非法: {reason}")
            }
            Self::UnknownMimeType { name } => {
                write!(f, "未知的 MIME 类型: {name}")
            }
            Self::UnsupportedMimeType { name } => {
                write!(f, "不支持的 MIME 类型: {name}")
            }
            Self::Io(e) => write!(f, "I/O 失败: {e}"),
        }
    }
}

impl std::error::Error for MimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MimeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, MimeError>;
