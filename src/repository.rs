//! MIME 类型仓库
//!
//! 仓库持有全部 MIME 类型记录与四个派生索引：名称/别名索引、
//! 字面量文件名索引、普通扩展名索引、剩余 glob 的顺序列表。
//! 构建完成后整体只读；进程级共享实例的重建以整仓库原子换入的方式进行，
//! 热路径上的读取不做任何逐操作加锁。

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use anyhow::Context;

use crate::cache;
use crate::config::MimeConfig;
use crate::error::{MimeError, Result};
use crate::glob::MimeGlob;
use crate::magic::MimeMagic;
use crate::mime_type::MimeType;
use crate::xml;

/// glob 元字符集合；模式按此分类进入三类索引。
const GLOB_METACHARACTERS: [char; 8] = ['*', '?', '{', '}', '!', '[', ']', '^'];

/// `(MimeType 下标, 该类型内 glob 下标)`，索引以此引用 glob 而不复制。
type GlobRef = (usize, usize);

/// 全部 MIME 类型及其索引的只读集合。
#[derive(Debug)]
pub struct MimeRepository {
    mime_list: Vec<MimeType>,
    name_index: HashMap<String, usize>,
    literal_globs: HashMap<String, Vec<GlobRef>>,
    extension_globs: HashMap<String, Vec<GlobRef>>,
    other_globs: Vec<GlobRef>,
    max_test_bytes: usize,
}

static SHARED: OnceLock<RwLock<Arc<MimeRepository>>> = OnceLock::new();
static SHARED_INIT: Mutex<()> = Mutex::new(());

impl MimeRepository {
    /// 从已解析的类型列表构建仓库。
    ///
    /// 名称或别名冲突记一条警告日志，后加载者覆盖先加载者。
    ///
    /// # Errors
    ///
    /// 当某个类型的名称为空时返回 [`MimeError::MalformedDatabase`]。
    pub fn from_types(types: Vec<MimeType>) -> Result<Self> {
        Self::build(types, false)
    }

    /// [`Self::from_types`] 的严格变体：名称或别名冲突直接报错。
    ///
    /// # Errors
    ///
    /// 当名称为空或发生名称/别名冲突时返回 [`MimeError::MalformedDatabase`]。
    pub fn from_types_strict(types: Vec<MimeType>) -> Result<Self> {
        Self::build(types, true)
    }

    fn build(
        types: Vec<MimeType>,
        strict: bool,
    ) -> Result<Self> {
        let mut repo = Self {
            mime_list: types,
            name_index: HashMap::new(),
            literal_globs: HashMap::new(),
            extension_globs: HashMap::new(),
            other_globs: Vec::new(),
            max_test_bytes: 0,
        };
        for index in 0..repo.mime_list.len() {
            repo.index_mime_type(index, strict)?;
        }
        for mime in &repo.mime_list {
            for glob in mime.globs() {
                glob.compile_eagerly();
            }
        }
        Ok(repo)
    }

    fn index_mime_type(
        &mut self,
        index: usize,
        strict: bool,
    ) -> Result<()> {
        let mime = &self.mime_list[index];
        let name = mime.name().to_lowercase();
        if name.is_empty() {
            return Err(MimeError::malformed("MIME type with an empty name"));
        }
        log::trace!("登记 MIME 类型: {name}");
        let mut keys = vec![name];
        for alias in mime.aliases() {
            log::trace!("登记 MIME 别名: {alias}");
            keys.push(alias.to_lowercase());
        }
        for key in keys {
            if self.name_index.contains_key(&key) {
                if strict {
                    return Err(MimeError::malformed(format!(
                        "duplicate MIME type name or alias: {key}"
                    )));
                }
                log::warn!("MIME 名称/别名 {key} 已存在，后加载者覆盖先加载者");
            }
            self.name_index.insert(key, index);
        }

        for (glob_index, glob) in mime.globs().iter().enumerate() {
            let pattern = glob.pattern();
            if is_extension_pattern(pattern) {
                let ext = pattern[2..].to_string();
                log::trace!("登记扩展名模式: {ext}");
                self.extension_globs
                    .entry(ext)
                    .or_default()
                    .push((index, glob_index));
            } else if is_literal_pattern(pattern) {
                log::trace!("登记字面量模式: {pattern}");
                self.literal_globs
                    .entry(pattern.to_string())
                    .or_default()
                    .push((index, glob_index));
            } else {
                log::trace!("登记普通 glob 模式: {pattern}");
                self.other_globs.push((index, glob_index));
            }
        }

        for magic in mime.magics() {
            let bytes = magic.max_test_bytes();
            if self.max_test_bytes < bytes {
                self.max_test_bytes = bytes;
            }
        }
        Ok(())
    }

    /// 按名称或别名查找（大小写不敏感）。
    #[must_use]
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<&MimeType> {
        self.name_index
            .get(&name.to_lowercase())
            .map(|&index| &self.mime_list[index])
    }

    /// [`Self::lookup`] 的必得变体。
    ///
    /// # Errors
    ///
    /// 查找不到时返回 [`MimeError::UnknownMimeType`]。
    pub fn require(
        &self,
        name: &str,
    ) -> Result<&MimeType> {
        self.lookup(name)
            .ok_or_else(|| MimeError::unknown_mime_type(name))
    }

    /// 数据库加载顺序下的全部类型。
    #[must_use]
    pub fn all(&self) -> &[MimeType] {
        &self.mime_list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mime_list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mime_list.is_empty()
    }

    /// 用 magic 完整判定所需读取的最大前缀字节数。
    #[must_use]
    pub const fn max_test_bytes(&self) -> usize {
        self.max_test_bytes
    }

    /// 按文件名检测所有可能的 MIME 类型。
    ///
    /// 取路径的基本名并转为小写，依次经过字面量索引、
    /// 每个 `.` 位置产生的候选扩展名、以及剩余 glob 列表，
    /// 用权重（同权重比模式长度）裁决出最佳候选集。
    #[must_use]
    pub fn detect_by_filename(
        &self,
        path: &str,
    ) -> Vec<&MimeType> {
        let filename = basename(path).to_lowercase();
        let mut result = GlobCandidates::new();

        if let Some(pairs) = self.literal_globs.get(&filename) {
            for &(ti, gi) in pairs {
                result.compare_add(&self.mime_list[ti].globs()[gi], ti);
            }
        }

        // 多重扩展名的文件每个 '.' 都要试探一次，
        // "data.tar.gz" 会同时命中 "tar.gz" 与 "gz"，由长度决胜。
        for (i, byte) in filename.bytes().enumerate() {
            if byte == b'.' {
                if let Some(pairs) = self.extension_globs.get(&filename[i + 1..]) {
                    for &(ti, gi) in pairs {
                        result.compare_add(&self.mime_list[ti].globs()[gi], ti);
                    }
                }
            }
        }

        for &(ti, gi) in &self.other_globs {
            let glob = &self.mime_list[ti].globs()[gi];
            if glob.matches(&filename) {
                result.compare_add(glob, ti);
            }
        }

        result
            .list
            .into_iter()
            .map(|ti| &self.mime_list[ti])
            .collect()
    }

    /// 按内容前缀检测所有可能的 MIME 类型。
    ///
    /// 按加载顺序扫描全部类型；仅测试优先级不低于当前最优的 magic，
    /// 更高优先级清空候选集，同优先级追加（同一类型不重复）。
    #[must_use]
    pub fn detect_by_content(
        &self,
        buffer: &[u8],
        n: usize,
    ) -> Vec<&MimeType> {
        let mut result = MagicCandidates::new();
        for (ti, mime) in self.mime_list.iter().enumerate() {
            for magic in mime.magics() {
                if i64::from(magic.priority()) >= result.best_priority
                    && magic.matches(buffer, n)
                {
                    result.compare_add(magic, ti);
                }
            }
        }
        result
            .list
            .into_iter()
            .map(|ti| &self.mime_list[ti])
            .collect()
    }

    /// 综合文件名与内容的检测。
    ///
    /// 1. 按文件名取候选集；为空则退化为纯内容检测。
    /// 2. 候选唯一且不要求复核 magic 时直接返回。
    /// 3. 否则对每个候选做 magic 复核（含父类型回退），按优先级裁决。
    /// 4. 复核有结果则返回之；否则唯一的文件名候选仍是最佳信号，
    ///    多候选全部落空时返回空。
    #[must_use]
    pub fn detect(
        &self,
        filename: &str,
        buffer: &[u8],
        n: usize,
        always_check_magic: bool,
    ) -> Vec<&MimeType> {
        let from_name = self.detect_by_filename(filename);
        if from_name.is_empty() {
            return self.detect_by_content(buffer, n);
        }
        if from_name.len() == 1 && !always_check_magic {
            return from_name;
        }
        let confirmed = self.check_by_magic(buffer, n, &from_name);
        if !confirmed.is_empty() {
            return confirmed;
        }
        if from_name.len() == 1 {
            from_name
        } else {
            Vec::new()
        }
    }

    /// 对文件名候选逐个询问其最佳命中 magic（含父类型回退），
    /// 更高优先级清空候选集，同优先级追加。
    fn check_by_magic<'a>(
        &'a self,
        buffer: &[u8],
        n: usize,
        candidates: &[&'a MimeType],
    ) -> Vec<&'a MimeType> {
        let mut result = Vec::new();
        let mut best_priority: i64 = -1;
        for &mime in candidates {
            if let Some(magic) = mime.best_magic(buffer, n, best_priority, self) {
                let priority = i64::from(magic.priority());
                if priority > best_priority {
                    result.clear();
                    result.push(mime);
                    best_priority = priority;
                } else {
                    result.push(mime);
                }
            }
        }
        result
    }

    /// 读取文件前缀并综合检测。
    ///
    /// # Errors
    ///
    /// 打开或读取文件失败时返回 [`MimeError::Io`]。
    pub fn detect_file(
        &self,
        path: &Path,
        always_check_magic: bool,
    ) -> Result<Vec<&MimeType>> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut file = fs::File::open(path)?;
        let mut buffer = vec![0u8; self.max_test_bytes];
        let n = read_prefix(&mut file, &mut buffer)?;
        Ok(self.detect(&filename, &buffer, n, always_check_magic))
    }

    /// 检测文件并返回第一个候选的规范名。
    ///
    /// # Errors
    ///
    /// 打开或读取文件失败时返回 [`MimeError::Io`]。
    pub fn detect_first_name(
        &self,
        path: &Path,
    ) -> Result<Option<String>> {
        let candidates = self.detect_file(path, false)?;
        Ok(candidates.first().map(|mime| mime.name().to_string()))
    }

    /// 从 mime-info XML 文本构建仓库。
    ///
    /// # Errors
    ///
    /// XML 非法或不满足数据库约束时返回 [`MimeError::MalformedDatabase`]。
    pub fn from_xml_str(text: &str) -> Result<Self> {
        let types = xml::parse_database(text)?;
        Self::from_types(types)
    }

    /// 从 mime-info XML 文件构建仓库。
    ///
    /// # Errors
    ///
    /// 读文件失败返回 [`MimeError::Io`]，内容非法返回
    /// [`MimeError::MalformedDatabase`]。
    pub fn from_xml_file(path: &Path) -> Result<Self> {
        log::info!("正在从 XML 数据库重建 MIME 仓库: {}", path.display());
        let text = fs::read_to_string(path)?;
        let repo = Self::from_xml_str(&text)?;
        repo.log_statistics();
        Ok(repo)
    }

    /// 序列化回 mime-info XML 文本。
    #[must_use]
    pub fn to_xml_string(&self) -> String {
        xml::serialize_database(&self.mime_list)
    }

    /// 从二进制缓存文件加载仓库。
    ///
    /// # Errors
    ///
    /// 读文件失败返回 [`MimeError::Io`]；签名不匹配或数据损坏返回
    /// [`MimeError::InvalidCache`]。
    pub fn load_cache(path: &Path) -> Result<Self> {
        log::info!("正在加载序列化的 MIME 仓库: {}", path.display());
        let types = cache::load(path)?;
        let repo = Self::from_types(types)?;
        repo.log_statistics();
        Ok(repo)
    }

    /// 把仓库写入二进制缓存文件（临时文件 + 原子替换）。
    ///
    /// # Errors
    ///
    /// 写文件失败时返回 [`MimeError::Io`]。
    pub fn store_cache(
        &self,
        path: &Path,
    ) -> Result<()> {
        log::info!("正在序列化 MIME 仓库到: {}", path.display());
        cache::store(path, &self.mime_list)
    }

    fn log_statistics(&self) {
        log::info!("共 {} 个 MIME 类型条目。", self.mime_list.len());
        let literal: usize = self.literal_globs.values().map(Vec::len).sum();
        let extension: usize = self.extension_globs.values().map(Vec::len).sum();
        log::info!("共 {literal} 个字面量 glob。");
        log::info!("共 {extension} 个扩展名 glob。");
        log::info!("共 {} 个其它 glob。", self.other_globs.len());
    }

    /// 按配置装配仓库：优先读二进制缓存，失败则从 XML 数据库重建。
    ///
    /// 重建成功且配置要求保存时写回缓存，写失败只记日志不上抛。
    ///
    /// # Errors
    ///
    /// 未配置数据库路径、或重建失败时返回错误。
    pub fn bootstrap(config: &MimeConfig) -> anyhow::Result<Self> {
        if !config.rebuild {
            let serialization = config.serialization_path();
            match Self::load_cache(&serialization) {
                Ok(repo) => return Ok(repo),
                Err(e) => {
                    log::warn!("加载序列化的 MIME 仓库失败，改为重建: {e}");
                }
            }
        }
        let database = config
            .database
            .as_ref()
            .context("配置中缺少 MIME 数据库路径 (database)")?;
        let repo = Self::from_xml_file(database)?;
        if config.save {
            let serialization = config.serialization_path();
            if let Err(e) = repo.store_cache(&serialization) {
                log::warn!("保存 MIME 仓库缓存失败: {e}");
            }
        }
        Ok(repo)
    }

    /// 进程级共享仓库；首次调用按默认配置构建，此后只读。
    ///
    /// # Errors
    ///
    /// 首次构建失败时返回错误（不会缓存失败结果，下次调用重试）。
    pub fn shared() -> anyhow::Result<Arc<Self>> {
        if let Some(lock) = SHARED.get() {
            return read_shared(lock);
        }
        // 双检锁：并发的首次调用只产生一次构建
        let _guard = SHARED_INIT
            .lock()
            .map_err(|e| anyhow::anyhow!("共享仓库初始化锁中毒: {e}"))?;
        if let Some(lock) = SHARED.get() {
            return read_shared(lock);
        }
        let config = MimeConfig::load_or_default(None);
        let built = Arc::new(Self::bootstrap(&config)?);
        let lock = SHARED.get_or_init(|| RwLock::new(Arc::clone(&built)));
        read_shared(lock)
    }

    /// 重建共享仓库：先完整构建新实例，再整体原子换入。
    ///
    /// # Errors
    ///
    /// 构建失败时返回错误，原实例保持不变。
    pub fn rebuild_shared() -> anyhow::Result<Arc<Self>> {
        let config = MimeConfig::load_or_default(None);
        let database = config
            .database
            .as_ref()
            .context("配置中缺少 MIME 数据库路径 (database)")?;
        let rebuilt = Arc::new(Self::from_xml_file(database)?);
        if config.save {
            if let Err(e) = rebuilt.store_cache(&config.serialization_path()) {
                log::warn!("保存 MIME 仓库缓存失败: {e}");
            }
        }
        match SHARED.get() {
            Some(lock) => {
                let mut guard = lock
                    .write()
                    .map_err(|e| anyhow::anyhow!("共享仓库写锁中毒: {e}"))?;
                *guard = Arc::clone(&rebuilt);
            }
            None => {
                let _ = SHARED.set(RwLock::new(Arc::clone(&rebuilt)));
            }
        }
        Ok(rebuilt)
    }
}

fn read_shared(lock: &RwLock<Arc<MimeRepository>>) -> anyhow::Result<Arc<MimeRepository>> {
    let guard = lock
        .read()
        .map_err(|e| anyhow::anyhow!("共享仓库读锁中毒: {e}"))?;
    Ok(Arc::clone(&guard))
}

/// 取路径最后一个分隔符后的基本名，兼容两种分隔符。
#[must_use]
pub(crate) fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// 读满缓冲或读到 EOF，返回有效字节数。
pub(crate) fn read_prefix<R: Read>(
    reader: &mut R,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn is_literal_pattern(pattern: &str) -> bool {
    !pattern.chars().any(|c| GLOB_METACHARACTERS.contains(&c))
}

fn is_extension_pattern(pattern: &str) -> bool {
    pattern.len() > 2 && pattern.starts_with("*.") && is_literal_pattern(&pattern[2..])
}

/// 文件名候选的裁决状态：权重高者胜，同权重模式长者胜，
/// 全同则追加（同一类型不重复）。
struct GlobCandidates {
    best_weight: i64,
    best_length: usize,
    list: Vec<usize>,
}

impl GlobCandidates {
    const fn new() -> Self {
        Self {
            best_weight: -1,
            best_length: 0,
            list: Vec::new(),
        }
    }

    fn compare_add(
        &mut self,
        glob: &MimeGlob,
        type_index: usize,
    ) {
        let weight = i64::from(glob.weight());
        let length = glob.pattern().len();
        if self.list.is_empty() {
            self.list.push(type_index);
            self.best_weight = weight;
            self.best_length = length;
        } else if weight > self.best_weight {
            self.list.clear();
            self.list.push(type_index);
            self.best_weight = weight;
            self.best_length = length;
        } else if weight == self.best_weight {
            if length > self.best_length {
                self.list.clear();
                self.list.push(type_index);
                self.best_length = length;
            } else if length == self.best_length && !self.list.contains(&type_index) {
                self.list.push(type_index);
            }
        }
    }
}

/// 内容候选的裁决状态：优先级高者胜，同优先级追加（不重复）。
struct MagicCandidates {
    best_priority: i64,
    list: Vec<usize>,
}

impl MagicCandidates {
    const fn new() -> Self {
        Self {
            best_priority: -1,
            list: Vec::new(),
        }
    }

    fn compare_add(
        &mut self,
        magic: &MimeMagic,
        type_index: usize,
    ) {
        let priority = i64::from(magic.priority());
        if self.list.is_empty() {
            self.list.push(type_index);
            self.best_priority = priority;
        } else if priority > self.best_priority {
            self.list.clear();
            self.list.push(type_index);
            self.best_priority = priority;
        } else if priority == self.best_priority && !self.list.contains(&type_index) {
            self.list.push(type_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magic::{MagicKind, MimeMagicMatcher};

    fn magic_of(
        value: &[u8],
        priority: u32,
    ) -> MimeMagic {
        let matcher =
            MimeMagicMatcher::new(MagicKind::String, 0, 0, value.to_vec()).unwrap();
        MimeMagic::new(vec![matcher]).with_priority(priority)
    }

    /// 覆盖常见格式组合的小型测试数据库。
    fn sample_repository() -> MimeRepository {
        let types = vec![
            MimeType::new("image/png")
                .with_description("", "PNG image")
                .with_glob(MimeGlob::new("*.png"))
                .with_magic(magic_of(b"\x89PNG\r\n\x1a\n", 50)),
            MimeType::new("image/gif")
                .with_description("", "GIF image")
                .with_glob(MimeGlob::new("*.gif"))
                .with_magic(magic_of(b"GIF8", 50)),
            MimeType::new("application/gzip")
                .with_description("", "Gzip archive")
                .with_alias("application/x-gzip")
                .with_glob(MimeGlob::new("*.gz"))
                .with_magic(magic_of(b"\x1f\x8b", 50)),
            MimeType::new("image/x-gzeps")
                .with_description("", "EPS image (gzip-compressed)")
                .with_glob(MimeGlob::new("*.eps.gz")),
            MimeType::new("application/x-compressed-tar")
                .with_description("", "Tar archive (gzip-compressed)")
                .with_glob(MimeGlob::new("*.tar.gz")),
            MimeType::new("application/zip")
                .with_description("", "Zip archive")
                .with_glob(MimeGlob::new("*.zip"))
                .with_magic(magic_of(b"PK\x03\x04", 50)),
            MimeType::new(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            )
            .with_description("", "Word 2007 document")
            .with_glob(MimeGlob::new("*.docx"))
            .with_super_type("application/zip"),
            MimeType::new("application/msword")
                .with_description("", "Word document")
                .with_glob(MimeGlob::new("*.doc"))
                .with_magic(magic_of(b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1", 50)),
            MimeType::new("application/msword-template")
                .with_description("", "Word template")
                .with_glob(MimeGlob::new("*.dot"))
                .with_super_type("application/msword"),
            MimeType::new("text/vnd.graphviz")
                .with_description("", "Graphviz DOT graph")
                .with_glob(MimeGlob::new("*.dot")),
        ];
        MimeRepository::from_types(types).unwrap()
    }

    fn names(candidates: &[&MimeType]) -> Vec<String> {
        candidates.iter().map(|m| m.name().to_string()).collect()
    }

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
    const GZIP: &[u8] = b"\x1f\x8b\x08\x00\x00\x00\x00\x00";
    const ZIP: &[u8] = b"PK\x03\x04\x14\x00\x06\x00\x00\x00";
    const OLE2: &[u8] = b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1\x00\x00";

    #[test]
    fn test_lookup_is_case_insensitive_and_follows_aliases() {
        let repo = sample_repository();
        assert_eq!(repo.lookup("IMAGE/PNG").unwrap().name(), "image/png");
        assert_eq!(
            repo.lookup("application/x-gzip").unwrap().name(),
            "application/gzip"
        );
        assert!(repo.lookup("application/nonexistent").is_none());
        assert!(matches!(
            repo.require("application/nonexistent"),
            Err(MimeError::UnknownMimeType { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_overrides_and_strict_mode_rejects() {
        let types = vec![
            MimeType::new("x/dup").with_description("", "old"),
            MimeType::new("x/dup").with_description("", "new"),
        ];
        let repo = MimeRepository::from_types(types.clone()).unwrap();
        assert_eq!(repo.lookup("x/dup").unwrap().description("en"), Some("new"));
        assert!(matches!(
            MimeRepository::from_types_strict(types),
            Err(MimeError::MalformedDatabase { .. })
        ));
    }

    #[test]
    fn test_index_agreement() {
        // 每条 glob 恰好进入三类索引之一，按元字符规则分类
        let repo = sample_repository();
        let mut indexed = 0usize;
        for (ti, mime) in repo.mime_list.iter().enumerate() {
            for (gi, glob) in mime.globs().iter().enumerate() {
                let pattern = glob.pattern();
                let in_literal = repo
                    .literal_globs
                    .get(pattern)
                    .is_some_and(|v| v.contains(&(ti, gi)));
                let in_extension = pattern.starts_with("*.")
                    && repo
                        .extension_globs
                        .get(&pattern[2..])
                        .is_some_and(|v| v.contains(&(ti, gi)));
                let in_other = repo.other_globs.contains(&(ti, gi));
                assert_eq!(
                    usize::from(in_literal) + usize::from(in_extension) + usize::from(in_other),
                    1,
                    "glob {pattern} must live in exactly one index"
                );
                indexed += 1;
            }
        }
        assert!(indexed > 0);
    }

    #[test]
    fn test_pattern_classification() {
        assert!(is_extension_pattern("*.tar.gz"));
        assert!(!is_extension_pattern("*.c[ab]"));
        assert!(!is_extension_pattern("*."));
        assert!(is_literal_pattern("makefile"));
        assert!(!is_literal_pattern("makefile.*"));
        assert!(!is_literal_pattern("x^y"));
    }

    #[test]
    fn test_detect_by_filename_simple_extension() {
        let repo = sample_repository();
        assert_eq!(names(&repo.detect_by_filename("test.png")), ["image/png"]);
        assert_eq!(
            names(&repo.detect_by_filename("/some/dir/test.png")),
            ["image/png"]
        );
        assert!(repo.detect_by_filename("unknown.bin").is_empty());
    }

    #[test]
    fn test_detect_by_filename_is_case_insensitive() {
        let repo = sample_repository();
        assert_eq!(names(&repo.detect_by_filename("IMAGE.GIF")), ["image/gif"]);
    }

    #[test]
    fn test_longest_extension_pattern_wins() {
        let repo = sample_repository();
        assert_eq!(
            names(&repo.detect_by_filename("test.tar.gz")),
            ["application/x-compressed-tar"]
        );
        assert_eq!(
            names(&repo.detect_by_filename("test.eps.gz")),
            ["image/x-gzeps"]
        );
        // 没有更长模式可用时，短后缀照常命中
        assert_eq!(
            names(&repo.detect_by_filename("test.backup.gz")),
            ["application/gzip"]
        );
    }

    #[test]
    fn test_weight_dominates_pattern_length() {
        let types = vec![
            MimeType::new("x/long")
                .with_description("", "long")
                .with_glob(MimeGlob::new("*.backup.gz")),
            MimeType::new("x/short")
                .with_description("", "short")
                .with_glob(MimeGlob::new("*.gz").with_weight(60)),
        ];
        let repo = MimeRepository::from_types(types).unwrap();
        assert_eq!(names(&repo.detect_by_filename("a.backup.gz")), ["x/short"]);
    }

    #[test]
    fn test_equal_weight_and_length_keeps_both() {
        let repo = sample_repository();
        assert_eq!(
            names(&repo.detect_by_filename("test.dot")),
            ["application/msword-template", "text/vnd.graphviz"]
        );
    }

    #[test]
    fn test_literal_pattern_beats_nothing_but_matches_exact_name() {
        let types = vec![
            MimeType::new("text/x-makefile")
                .with_description("", "Makefile")
                .with_glob(MimeGlob::new("makefile")),
        ];
        let repo = MimeRepository::from_types(types).unwrap();
        assert_eq!(
            names(&repo.detect_by_filename("/src/makefile")),
            ["text/x-makefile"]
        );
        assert_eq!(names(&repo.detect_by_filename("MAKEFILE")), ["text/x-makefile"]);
        assert!(repo.detect_by_filename("makefile.am").is_empty());
    }

    #[test]
    fn test_other_glob_list_is_scanned() {
        let types = vec![
            MimeType::new("text/x-readme")
                .with_description("", "readme")
                .with_glob(MimeGlob::new("readme*")),
        ];
        let repo = MimeRepository::from_types(types).unwrap();
        assert_eq!(names(&repo.detect_by_filename("README.txt")), ["text/x-readme"]);
    }

    #[test]
    fn test_detect_by_content_scenarios() {
        let repo = sample_repository();
        assert_eq!(names(&repo.detect_by_content(PNG, PNG.len())), ["image/png"]);
        assert_eq!(
            names(&repo.detect_by_content(GZIP, GZIP.len())),
            ["application/gzip"]
        );
        assert_eq!(
            names(&repo.detect_by_content(ZIP, ZIP.len())),
            ["application/zip"]
        );
        assert_eq!(
            names(&repo.detect_by_content(OLE2, OLE2.len())),
            ["application/msword"]
        );
        assert!(repo.detect_by_content(b"\x00\x00", 2).is_empty());
    }

    #[test]
    fn test_detect_by_content_priority_arbitration() {
        let types = vec![
            MimeType::new("x/low")
                .with_description("", "low")
                .with_magic(magic_of(b"AB", 40)),
            MimeType::new("x/high")
                .with_description("", "high")
                .with_magic(magic_of(b"AB", 80)),
            MimeType::new("x/also-high")
                .with_description("", "also high")
                .with_magic(magic_of(b"AB", 80)),
        ];
        let repo = MimeRepository::from_types(types).unwrap();
        let winners = repo.detect_by_content(b"ABCD", 4);
        assert_eq!(names(&winners), ["x/high", "x/also-high"]);
        // 优先级单调性：胜者优先级都为 80，落选者都低于 80
        for winner in &winners {
            assert!(winner.magics().iter().any(|m| m.priority() == 80));
        }
    }

    #[test]
    fn test_detect_single_filename_candidate_early_out() {
        let repo = sample_repository();
        // docx: 文件名唯一候选，不复核 magic 时直接返回，
        // 即使内容只是普通的 zip 头
        assert_eq!(
            names(&repo.detect("test.docx", ZIP, ZIP.len(), false)),
            ["application/vnd.openxmlformats-officedocument.wordprocessingml.document"]
        );
        assert_eq!(
            names(&repo.detect("test.png", PNG, PNG.len(), false)),
            ["image/png"]
        );
        assert_eq!(
            names(&repo.detect("test.tar.gz", GZIP, GZIP.len(), false)),
            ["application/x-compressed-tar"]
        );
        assert_eq!(
            names(&repo.detect("test.eps.gz", GZIP, GZIP.len(), false)),
            ["image/x-gzeps"]
        );
    }

    #[test]
    fn test_detect_with_always_check_magic_confirms_through_super_type() {
        let repo = sample_repository();
        // docx 是 zip 的子类：复核时父类型 magic 命中
        assert_eq!(
            names(&repo.detect("test.docx", ZIP, ZIP.len(), true)),
            ["application/vnd.openxmlformats-officedocument.wordprocessingml.document"]
        );
    }

    #[test]
    fn test_detect_multiple_candidates_resolved_by_magic() {
        let repo = sample_repository();
        // test.dot 的两个候选里只有 Word 模板经父类型 magic 得到确认
        assert_eq!(
            names(&repo.detect("test.dot", OLE2, OLE2.len(), false)),
            ["application/msword-template"]
        );
    }

    #[test]
    fn test_detect_falls_back_to_content_without_filename_hit() {
        let repo = sample_repository();
        assert_eq!(
            names(&repo.detect("unknown.bin", PNG, PNG.len(), false)),
            ["image/png"]
        );
    }

    #[test]
    fn test_detect_single_candidate_without_magic_support_survives() {
        let repo = sample_repository();
        // eps.gz 无自有 magic、无父类型；复核落空但唯一候选仍保留
        assert_eq!(
            names(&repo.detect("test.eps.gz", ZIP, ZIP.len(), true)),
            ["image/x-gzeps"]
        );
        // 多候选全部落空则为空
        assert!(repo.detect("test.dot", PNG, PNG.len(), false).is_empty());
    }

    #[test]
    fn test_max_test_bytes_is_global_maximum() {
        let repo = sample_repository();
        assert_eq!(repo.max_test_bytes(), 8); // PNG / OLE2 魔数都是 8 字节
        let empty = MimeRepository::from_types(Vec::new()).unwrap();
        assert_eq!(empty.max_test_bytes(), 0);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/a/b/c.txt"), "c.txt");
        assert_eq!(basename("c:\\dir\\c.txt"), "c.txt");
        assert_eq!(basename("plain.txt"), "plain.txt");
        assert_eq!(basename(""), "");
    }

    #[test]
    fn test_read_prefix_handles_short_input() {
        let mut cursor = std::io::Cursor::new(b"abc".to_vec());
        let mut buffer = vec![0u8; 8];
        let n = read_prefix(&mut cursor, &mut buffer).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buffer[..n], b"abc");
    }

    #[test]
    fn test_detect_through_xml_loaded_repository() {
        let xml = r#"<mime-info>
  <mime-type type="image/png">
    <comment>PNG image</comment>
    <glob pattern="*.png"/>
    <magic><match type="string" offset="0" value="\x89PNG\r\n\x1a\n"/></magic>
  </mime-type>
  <mime-type type="application/gzip">
    <comment>Gzip archive</comment>
    <glob pattern="*.gz"/>
    <magic><match type="string" offset="0" value="\x1f\x8b"/></magic>
  </mime-type>
  <mime-type type="application/x-compressed-tar">
    <comment>Tar archive (gzip-compressed)</comment>
    <glob pattern="*.tar.gz"/>
  </mime-type>
</mime-info>"#;
        let repo = MimeRepository::from_xml_str(xml).unwrap();
        assert_eq!(repo.len(), 3);
        assert_eq!(repo.max_test_bytes(), 8);
        assert_eq!(
            names(&repo.detect("test.tar.gz", GZIP, GZIP.len(), false)),
            ["application/x-compressed-tar"]
        );
        assert_eq!(
            names(&repo.detect("unknown.bin", PNG, PNG.len(), false)),
            ["image/png"]
        );
        // 序列化回 XML 后再构建，行为一致
        let rebuilt = MimeRepository::from_xml_str(&repo.to_xml_string()).unwrap();
        assert_eq!(
            names(&rebuilt.detect_by_filename("test.tar.gz")),
            ["application/x-compressed-tar"]
        );
    }

    #[test]
    fn test_bootstrap_rebuilds_then_reuses_the_cache() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let uniq = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "mime_detector_bootstrap_test_{}_{}",
            std::process::id(),
            uniq
        ));
        fs::create_dir_all(&dir).unwrap();
        let database = dir.join("database.xml");
        fs::write(
            &database,
            r#"<mime-info>
  <mime-type type="image/png">
    <comment>PNG image</comment>
    <glob pattern="*.png"/>
  </mime-type>
</mime-info>"#,
        )
        .unwrap();
        let serialization = dir.join("repository.bin");

        let config = MimeConfig {
            database: Some(database),
            serialization: serialization.to_string_lossy().into_owned(),
            ..MimeConfig::default()
        };

        // 首次：缓存缺失，从 XML 重建并写回缓存
        let repo = MimeRepository::bootstrap(&config).unwrap();
        assert_eq!(repo.len(), 1);
        assert!(serialization.exists());

        // 再次：直接命中缓存
        let cached = MimeRepository::bootstrap(&config).unwrap();
        assert_eq!(cached.lookup("image/png").unwrap().name(), "image/png");

        // 缓存损坏时回退重建
        fs::write(&serialization, b"garbage").unwrap();
        let recovered = MimeRepository::bootstrap(&config).unwrap();
        assert_eq!(recovered.len(), 1);

        drop(fs::remove_dir_all(&dir));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        assert!(matches!(
            MimeRepository::from_types(vec![MimeType::new("")]),
            Err(MimeError::MalformedDatabase { .. })
        ));
    }
}
