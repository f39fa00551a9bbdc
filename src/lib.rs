#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

//! 基于 freedesktop 共享 MIME 数据库的 MIME 类型识别库。
//!
//! 给定文件名和/或文件起始字节，返回一个或多个候选媒体类型名。
//! 核心是只读的 [`MimeRepository`]（类型记录加文件名索引）、
//! 按字节模式匹配的 magic 规则，以及组合两路证据的检测策略。

pub mod command;
pub mod config;
pub mod detector;
pub mod error;
pub mod glob;
pub mod literal;
pub mod magic;
pub mod mime_type;
pub mod prelude;
pub mod repository;

mod cache; // 缓存编解码经由 repository 暴露
mod xml; // XML 编解码经由 repository 暴露

use std::path::Path;

// 重新导出所有公共类型
pub use config::MimeConfig;
pub use detector::{
    FileCommandMimeDetector, MimeDetector, RepositoryMimeDetector, FILE_COMMAND_TEMPLATE,
};
pub use error::MimeError;
pub use glob::MimeGlob;
pub use magic::{MagicKind, MimeMagic, MimeMagicMatcher};
pub use mime_type::MimeType;
pub use repository::MimeRepository;

/// 简单 API：用进程级共享仓库检测一个文件，返回首个候选的规范名。
///
/// # Errors
///
/// 当共享仓库初始化失败或读取文件失败时返回错误。
pub fn detect_file(path: &Path) -> anyhow::Result<Option<String>> {
    log::info!("开始检测文件的 MIME 类型: {}", path.display());
    let repository = MimeRepository::shared()?;
    let result = repository.detect_first_name(path)?;
    log::info!("检测完成: {result:?}");
    Ok(result)
}

/// 简单 API：用进程级共享仓库检测内容字节（可附带文件名）。
///
/// # Errors
///
/// 当共享仓库初始化失败时返回错误。
pub fn detect_bytes(
    content: &[u8],
    filename: Option<&str>,
) -> anyhow::Result<Option<String>> {
    let repository = MimeRepository::shared()?;
    let detector = RepositoryMimeDetector::with_repository(repository);
    detector.detect_bytes(content, filename, false)
}
