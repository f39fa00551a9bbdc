//! MIME 检测器门面
//!
//! [`MimeDetector`] 把“按文件名猜测”“按内容猜测”两类能力聚合成统一的
//! `detect*` 入口，合并规则只在这里实现一次：文件名候选唯一且不要求
//! 复核 magic 时直接采信；否则优先返回同时被两路命中的候选，
//! 再退回内容候选，最后退回文件名候选。
//!
//! 两个实现：[`RepositoryMimeDetector`] 完全基于预构建仓库；
//! [`FileCommandMimeDetector`] 的内容检测委托给平台的 `file` 命令，
//! 文件名检测仍走仓库。

use anyhow::Result;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::command::{resolve_program, CommandRunner};
use crate::mime_type::MimeType;
use crate::repository::{basename, read_prefix, MimeRepository};

/// 外部命令模板，`${file}` 会被替换为目标文件路径。
pub const FILE_COMMAND_TEMPLATE: &str = "file --mime-type --brief ${file}";

/// MIME 检测能力的统一接口。
///
/// 实现方只需提供三个猜测原语，`detect*` 的组合与合并逻辑由
/// 默认方法完成。`guess_from_filename` 的参数必须是不含路径
/// 分隔符的纯文件名。
pub trait MimeDetector {
    /// 按文件名猜测所有可能的规范名（可能为空）。
    fn guess_from_filename(
        &self,
        filename: &str,
    ) -> Vec<String>;

    /// 按内容字节猜测所有可能的规范名。
    ///
    /// # Errors
    ///
    /// 当内容读取等 I/O 操作失败时返回错误。
    fn guess_from_content_bytes(
        &self,
        content: &[u8],
    ) -> Result<Vec<String>>;

    /// 按文件内容猜测所有可能的规范名。
    ///
    /// # Errors
    ///
    /// 当打开或读取文件失败时返回错误。
    fn guess_from_content_path(
        &self,
        path: &Path,
    ) -> Result<Vec<String>>;

    /// 仅按文件名检测，返回第一个候选。
    fn detect_by_filename(
        &self,
        path: &str,
    ) -> Option<String> {
        let filename = basename(path);
        if filename.is_empty() {
            log::error!("路径没有文件名部分，无法按文件名检测: {path}");
            return None;
        }
        let candidates = self.guess_from_filename(filename);
        log::debug!("按文件名检测到的候选: {candidates:?}");
        candidates.into_iter().next()
    }

    /// 仅按内容字节检测，返回第一个候选。
    ///
    /// # Errors
    ///
    /// 当内容读取失败时返回错误。
    fn detect_by_content_bytes(
        &self,
        content: &[u8],
    ) -> Result<Option<String>> {
        let candidates = self.guess_from_content_bytes(content)?;
        log::debug!("按内容检测到的候选: {candidates:?}");
        Ok(candidates.into_iter().next())
    }

    /// 仅按文件内容检测，返回第一个候选。
    ///
    /// # Errors
    ///
    /// 当打开或读取文件失败时返回错误。
    fn detect_by_content_path(
        &self,
        path: &Path,
    ) -> Result<Option<String>> {
        let candidates = self.guess_from_content_path(path)?;
        log::debug!("按内容检测到的候选: {candidates:?}");
        Ok(candidates.into_iter().next())
    }

    /// 综合文件名与内容检测一个文件。
    ///
    /// # Errors
    ///
    /// 当读取文件失败时返回错误。
    fn detect_path(
        &self,
        path: &Path,
        always_check_magic: bool,
    ) -> Result<Option<String>> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let from_extension = if filename.is_empty() {
            Vec::new()
        } else {
            self.guess_from_filename(&filename)
        };
        if from_extension.len() == 1 && !always_check_magic {
            log::debug!("文件名候选唯一，直接采信: {from_extension:?}");
            return Ok(from_extension.into_iter().next());
        }
        let from_content = self.guess_from_content_path(path)?;
        Ok(merge_candidates(&from_extension, &from_content))
    }

    /// 综合内容字节与可选文件名检测。
    ///
    /// 调用方显式提供的文件名总是优先于任何从路径推断的名字。
    ///
    /// # Errors
    ///
    /// 当内容读取失败时返回错误。
    fn detect_bytes(
        &self,
        content: &[u8],
        filename: Option<&str>,
        always_check_magic: bool,
    ) -> Result<Option<String>> {
        let from_extension = match filename {
            Some(name) if !basename(name).is_empty() => self.guess_from_filename(basename(name)),
            _ => Vec::new(),
        };
        if from_extension.len() == 1 && !always_check_magic {
            log::debug!("文件名候选唯一，直接采信: {from_extension:?}");
            return Ok(from_extension.into_iter().next());
        }
        let from_content = self.guess_from_content_bytes(content)?;
        Ok(merge_candidates(&from_extension, &from_content))
    }
}

/// 合并规则：两路皆空为 None；一路为空取另一路之首；
/// 否则取第一个同时出现在两路的候选，没有则取内容候选之首。
fn merge_candidates(
    from_extension: &[String],
    from_content: &[String],
) -> Option<String> {
    if from_extension.is_empty() {
        if from_content.is_empty() {
            log::debug!("文件名与内容两路均未检测到 MIME 类型");
            return None;
        }
        log::debug!("按内容检测到的候选: {from_content:?}");
        return from_content.first().cloned();
    }
    if from_content.is_empty() {
        log::debug!("按文件名检测到的候选: {from_extension:?}");
        return from_extension.first().cloned();
    }
    log::debug!("文件名候选: {from_extension:?}; 内容候选: {from_content:?}");
    from_extension
        .iter()
        .find(|candidate| from_content.contains(candidate))
        .cloned()
        .or_else(|| from_content.first().cloned())
}

fn type_names(types: &[&MimeType]) -> Vec<String> {
    types.iter().map(|mime| mime.name().to_string()).collect()
}

/// 基于预构建仓库的检测器。
#[derive(Debug, Clone)]
pub struct RepositoryMimeDetector {
    repository: Arc<MimeRepository>,
    always_check_magic: bool,
}

impl RepositoryMimeDetector {
    /// 使用进程级共享仓库构造。
    ///
    /// # Errors
    ///
    /// 当共享仓库初始化失败时返回错误。
    pub fn new() -> Result<Self> {
        let repository = MimeRepository::shared()?;
        Ok(Self {
            repository,
            always_check_magic: false,
        })
    }

    /// 使用显式仓库构造。
    #[must_use]
    pub const fn with_repository(repository: Arc<MimeRepository>) -> Self {
        Self {
            repository,
            always_check_magic: false,
        }
    }

    /// 设置组合检测时是否总是复核 magic。
    #[must_use]
    pub const fn with_always_check_magic(
        mut self,
        always_check_magic: bool,
    ) -> Self {
        self.always_check_magic = always_check_magic;
        self
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<MimeRepository> {
        &self.repository
    }

    /// 重建共享仓库并切换到新实例。
    ///
    /// # Errors
    ///
    /// 当重建失败时返回错误，当前实例保持不变。
    pub fn rebuild_repository(&mut self) -> Result<()> {
        self.repository = MimeRepository::rebuild_shared()?;
        Ok(())
    }

    /// 走仓库的六步组合检测（含单候选提前返回与 magic 复核）。
    #[must_use]
    pub fn detect_with_repository(
        &self,
        filename: &str,
        content: &[u8],
    ) -> Vec<String> {
        let candidates =
            self.repository
                .detect(filename, content, content.len(), self.always_check_magic);
        type_names(&candidates)
    }

    /// 从可定位的流读取检测所需前缀并综合检测，流位置读后复原。
    ///
    /// # Errors
    ///
    /// 当读流或恢复流位置失败时返回错误。
    pub fn detect_reader<R: Read + Seek>(
        &self,
        reader: &mut R,
        filename: Option<&str>,
        always_check_magic: bool,
    ) -> Result<Option<String>> {
        let position = reader.stream_position()?;
        let mut buffer = vec![0u8; self.repository.max_test_bytes()];
        let n = read_prefix(reader, &mut buffer)?;
        reader.seek(SeekFrom::Start(position))?;
        self.detect_bytes(&buffer[..n], filename, always_check_magic)
    }
}

impl MimeDetector for RepositoryMimeDetector {
    fn guess_from_filename(
        &self,
        filename: &str,
    ) -> Vec<String> {
        let candidates = self.repository.detect_by_filename(filename);
        log::debug!("仓库按文件名检测到: {}", candidates.len());
        type_names(&candidates)
    }

    fn guess_from_content_bytes(
        &self,
        content: &[u8],
    ) -> Result<Vec<String>> {
        let candidates = self.repository.detect_by_content(content, content.len());
        log::debug!("仓库按内容检测到: {}", candidates.len());
        Ok(type_names(&candidates))
    }

    fn guess_from_content_path(
        &self,
        path: &Path,
    ) -> Result<Vec<String>> {
        let mut file = fs::File::open(path)?;
        let mut buffer = vec![0u8; self.repository.max_test_bytes()];
        let n = read_prefix(&mut file, &mut buffer)?;
        self.guess_from_content_bytes(&buffer[..n])
    }
}

/// 内容检测委托给平台 `file` 命令的检测器。
///
/// 非零退出、超时、空输出或 I/O 失败都视为“无候选”；
/// 文件名检测仍使用仓库。
#[derive(Debug, Clone)]
pub struct FileCommandMimeDetector {
    repository: Arc<MimeRepository>,
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
}

impl FileCommandMimeDetector {
    /// 使用进程级共享仓库构造。
    ///
    /// # Errors
    ///
    /// 当共享仓库初始化失败时返回错误。
    pub fn new() -> Result<Self> {
        let repository = MimeRepository::shared()?;
        Ok(Self::with_repository(repository))
    }

    /// 使用显式仓库构造。
    #[must_use]
    pub const fn with_repository(repository: Arc<MimeRepository>) -> Self {
        Self {
            repository,
            timeout: None,
            working_dir: None,
        }
    }

    /// 设置子进程执行的超时时间。
    pub fn set_execution_timeout(
        &mut self,
        timeout: Duration,
    ) {
        self.timeout = Some(timeout);
    }

    /// 设置子进程的工作目录。
    pub fn set_working_dir(
        &mut self,
        dir: impl Into<PathBuf>,
    ) {
        self.working_dir = Some(dir.into());
    }

    /// `file` 命令是否可用。
    #[must_use]
    pub fn is_available() -> bool {
        command_program(FILE_COMMAND_TEMPLATE)
            .map(resolve_program)
            .is_some_and(|resolved| resolved.is_ok())
    }

    fn run_file_command(
        &self,
        path: &Path,
    ) -> Vec<String> {
        let Some(program) = command_program(FILE_COMMAND_TEMPLATE) else {
            return Vec::new();
        };
        let mut runner = CommandRunner::new(program);
        for arg in command_args(FILE_COMMAND_TEMPLATE, path) {
            runner.arg(arg);
        }
        if let Some(timeout) = self.timeout {
            runner.timeout(Some(timeout));
        }
        if let Some(dir) = &self.working_dir {
            runner.working_dir(dir);
        }
        let output = match runner.run() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("执行 file 命令失败: {e}");
                return Vec::new();
            }
        };
        if !output.is_success() {
            log::warn!(
                "file 命令异常退出 (timed_out={}): {}",
                output.timed_out,
                output.stderr_lossy().trim()
            );
            return Vec::new();
        }
        let result = output.stdout_lossy().trim().to_string();
        if result.is_empty() {
            Vec::new()
        } else {
            vec![result]
        }
    }
}

impl MimeDetector for FileCommandMimeDetector {
    fn guess_from_filename(
        &self,
        filename: &str,
    ) -> Vec<String> {
        type_names(&self.repository.detect_by_filename(filename))
    }

    fn guess_from_content_bytes(
        &self,
        content: &[u8],
    ) -> Result<Vec<String>> {
        // file 命令只认本地文件，把内容落到临时文件再检测
        let uniq = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let tmp = std::env::temp_dir().join(format!(
            "mime_detector_{}_{uniq}.tmp",
            std::process::id()
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content)?;
        }
        let result = self.run_file_command(&tmp);
        drop(fs::remove_file(&tmp));
        Ok(result)
    }

    fn guess_from_content_path(
        &self,
        path: &Path,
    ) -> Result<Vec<String>> {
        Ok(self.run_file_command(path))
    }
}

/// 模板的第一个词是程序名。
fn command_program(template: &str) -> Option<&str> {
    template.split_whitespace().next()
}

/// 模板的剩余词做 `${file}` 替换后作为参数。
fn command_args(
    template: &str,
    path: &Path,
) -> Vec<String> {
    template
        .split_whitespace()
        .skip(1)
        .map(|word| word.replace("${file}", &path.to_string_lossy()))
        .collect()
}
