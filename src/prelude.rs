//! Prelude 模块 - 一次性导入所有常用类型
//!
//! ```rust
//! use mime_detector::prelude::*;
//! ```

// 仓库与类型记录
pub use crate::mime_type::MimeType;
pub use crate::repository::MimeRepository;

// 规则
pub use crate::glob::MimeGlob;
pub use crate::magic::{MagicKind, MimeMagic, MimeMagicMatcher};

// 检测器
pub use crate::detector::{
    FileCommandMimeDetector, MimeDetector, RepositoryMimeDetector, FILE_COMMAND_TEMPLATE,
};

// 配置
pub use crate::config::MimeConfig;

// 外部命令执行
pub use crate::command::{resolve_program, CommandOutput, CommandRunner};

// 错误处理
pub use crate::error::MimeError;
pub use anyhow::{Context, Result};
