//! 配置
//!
//! TOML 格式的库配置：是否忽略缓存强制重建、重建后是否保存缓存、
//! 检测时是否总是复核 magic、缓存文件与 XML 数据库的路径，
//! 以及供调用方使用的缺省二进制/文本 MIME 名。
//! `serialization` 路径支持 `${user.home}` 占位符。

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const USER_HOME_PLACEHOLDER: &str = "${user.home}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MimeConfig {
    /// 忽略已有缓存，强制从 XML 数据库重建。
    #[serde(default)]
    pub rebuild: bool,
    /// 重建后把仓库序列化到缓存文件。
    #[serde(default = "default_save")]
    pub save: bool,
    /// 检测器默认是否总是复核 magic。
    #[serde(default)]
    pub check_magic: bool,
    /// 二进制缓存文件路径，支持 `${user.home}` 占位符。
    #[serde(default = "default_serialization")]
    pub serialization: String,
    /// XML 数据库文件路径。
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// 缺省二进制 MIME 名（匹配算法本身不使用）。
    #[serde(default = "default_binary")]
    pub default_binary: String,
    /// 缺省文本 MIME 名（匹配算法本身不使用）。
    #[serde(default = "default_text")]
    pub default_text: String,
}

const fn default_save() -> bool {
    true
}

fn default_serialization() -> String {
    format!("{USER_HOME_PLACEHOLDER}/.mime-detector/repository.bin")
}

fn default_binary() -> String {
    "application/octet-stream".to_string()
}

fn default_text() -> String {
    "text/plain".to_string()
}

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            rebuild: false,
            save: default_save(),
            check_magic: false,
            serialization: default_serialization(),
            database: None,
            default_binary: default_binary(),
            default_text: default_text(),
        }
    }
}

impl MimeConfig {
    /// 从 TOML 配置文件加载配置。
    ///
    /// # Errors
    ///
    /// 当读取文件失败或 TOML 解析失败时返回错误。
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        path.and_then(|p| Self::load(p).ok())
            .or_else(|| Self::load(&Self::default_config_path()).ok())
            .unwrap_or_default()
    }

    /// 将配置保存为 TOML 文件。
    ///
    /// # Errors
    ///
    /// 当创建父目录、序列化或写入文件失败时返回错误。
    pub fn save(
        &self,
        path: &Path,
    ) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        config_base_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mime-detector")
            .join("config.toml")
    }

    /// 展开 `${user.home}` 后的缓存文件路径。
    #[must_use]
    pub fn serialization_path(&self) -> PathBuf {
        let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
        PathBuf::from(substitute_home(
            &self.serialization,
            &home.to_string_lossy(),
        ))
    }

    /// 基础配置校验。
    ///
    /// # Errors
    ///
    /// 当配置字段不满足基本约束时返回错误。
    pub fn validate(&self) -> Result<()> {
        if self.serialization.is_empty() {
            anyhow::bail!("serialization 不能为空");
        }
        if self.default_binary.is_empty() {
            anyhow::bail!("default_binary 不能为空");
        }
        if self.default_text.is_empty() {
            anyhow::bail!("default_text 不能为空");
        }
        if let Some(database) = &self.database {
            if database.as_os_str().is_empty() {
                anyhow::bail!("database 不能为空路径");
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn substitute_home(
    text: &str,
    home: &str,
) -> String {
    text.replace(USER_HOME_PLACEHOLDER, home)
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        if let Some(dir) = std::env::var_os("USERPROFILE").map(PathBuf::from) {
            return Some(dir);
        }
    }

    std::env::var_os("HOME").map(PathBuf::from)
}

fn config_base_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from) {
        return Some(dir);
    }

    #[cfg(windows)]
    {
        if let Some(dir) = std::env::var_os("APPDATA").map(PathBuf::from) {
            return Some(dir);
        }
    }

    home_dir().map(|home| home.join(".config"))
}
