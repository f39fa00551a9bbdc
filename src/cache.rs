//! 仓库的二进制缓存
//!
//! 把构建好的类型列表序列化成带版本签名的缓存文件，跨进程启动复用，
//! 避免每次都解析 XML 数据库。所有整数为小端；签名是 8 字节序列号
//! 加 4 字节语义版本，任一不匹配即判定缓存失效并触发重建。
//! 写入走临时文件 + fsync + 原子替换。

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{MimeError, Result};
use crate::glob::{self, MimeGlob};
use crate::magic::{self, MagicKind, MimeMagic, MimeMagicMatcher};
use crate::mime_type::MimeType;

/// 缓存序列号，格式不兼容地变化时更换。
const CACHE_SERIAL: u64 = u64::from_le_bytes(*b"MIMEREPO");
/// 语义版本 (major, minor, milli, micro)。
const CACHE_VERSION: [u8; 4] = [0, 1, 0, 0];

/// 从缓存文件加载类型列表。
///
/// # Errors
///
/// 读文件失败返回 [`MimeError::Io`]；签名不匹配或数据损坏返回
/// [`MimeError::InvalidCache`]。
pub(crate) fn load(path: &Path) -> Result<Vec<MimeType>> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

/// 把类型列表原子地写入缓存文件。
///
/// # Errors
///
/// 创建目录、写入或替换文件失败时返回 [`MimeError::Io`]。
pub(crate) fn store(
    path: &Path,
    types: &[MimeType],
) -> Result<()> {
    atomic_write(path, &encode(types))
}

pub(crate) fn encode(types: &[MimeType]) -> Vec<u8> {
    let mut w = CacheWriter { buf: Vec::new() };
    w.buf.extend_from_slice(&CACHE_SERIAL.to_le_bytes());
    w.buf.extend_from_slice(&CACHE_VERSION);
    w.write_u32(types.len() as u32);
    for mime in types {
        w.write_mime_type(mime);
    }
    w.buf
}

/// # Errors
///
/// 签名/版本不匹配、数据截断或字段取值非法时返回
/// [`MimeError::InvalidCache`]。
pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<MimeType>> {
    let mut r = CacheReader { data: bytes, pos: 0 };
    let serial = u64::from_le_bytes(r.read_array::<8>()?);
    if serial != CACHE_SERIAL {
        return Err(MimeError::invalid_cache(format!(
            "serial mismatch: {serial:#018x}"
        )));
    }
    let version = r.read_array::<4>()?;
    if version != CACHE_VERSION {
        return Err(MimeError::invalid_cache(format!(
            "version mismatch: {version:?}, expected {CACHE_VERSION:?}"
        )));
    }
    let count = r.read_u32()? as usize;
    let mut types = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        types.push(r.read_mime_type()?);
    }
    if r.pos != r.data.len() {
        return Err(MimeError::invalid_cache("trailing bytes after the body"));
    }
    Ok(types)
}

struct CacheWriter {
    buf: Vec<u8>,
}

impl CacheWriter {
    fn write_u32(
        &mut self,
        value: u32,
    ) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn write_i32(
        &mut self,
        value: i32,
    ) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn write_bool(
        &mut self,
        value: bool,
    ) {
        self.buf.push(u8::from(value));
    }

    fn write_string(
        &mut self,
        value: &str,
    ) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    fn write_opt_string(
        &mut self,
        value: Option<&str>,
    ) {
        match value {
            Some(text) => {
                self.buf.push(1);
                self.write_string(text);
            }
            None => self.buf.push(0),
        }
    }

    fn write_opt_bytes(
        &mut self,
        value: Option<&[u8]>,
    ) {
        match value {
            Some(bytes) => {
                self.buf.push(1);
                self.write_u32(bytes.len() as u32);
                self.buf.extend_from_slice(bytes);
            }
            None => self.buf.push(0),
        }
    }

    fn write_mime_type(
        &mut self,
        mime: &MimeType,
    ) {
        self.write_string(mime.name());
        self.write_u32(mime.descriptions().len() as u32);
        for (lang, text) in mime.descriptions() {
            self.write_string(lang);
            self.write_string(text);
        }
        self.write_opt_string(mime.namespace_uri());
        self.write_opt_string(mime.local_name());
        self.write_opt_string(mime.acronym());
        self.write_opt_string(mime.expanded_acronym());
        self.write_opt_string(mime.generic_icon());
        self.write_u32(mime.aliases().len() as u32);
        for alias in mime.aliases() {
            self.write_string(alias);
        }
        self.write_u32(mime.globs().len() as u32);
        for glob in mime.globs() {
            self.write_glob(glob);
        }
        self.write_u32(mime.magics().len() as u32);
        for magic_rule in mime.magics() {
            self.write_magic(magic_rule);
        }
        self.write_u32(mime.super_types().len() as u32);
        for parent in mime.super_types() {
            self.write_string(parent);
        }
    }

    fn write_glob(
        &mut self,
        glob: &MimeGlob,
    ) {
        self.write_i32(glob.weight() as i32);
        self.write_bool(glob.is_case_sensitive());
        self.write_string(glob.pattern());
    }

    fn write_magic(
        &mut self,
        magic_rule: &MimeMagic,
    ) {
        self.write_i32(magic_rule.priority() as i32);
        self.write_u32(magic_rule.matchers().len() as u32);
        for matcher in magic_rule.matchers() {
            self.write_matcher(matcher);
        }
    }

    fn write_matcher(
        &mut self,
        matcher: &MimeMagicMatcher,
    ) {
        self.write_i32(matcher.kind().index() as i32);
        self.write_i32(matcher.offset_begin() as i32);
        self.write_i32(matcher.offset_end() as i32);
        self.write_opt_bytes(Some(matcher.value()));
        self.write_opt_bytes(matcher.mask());
        self.write_u32(matcher.sub_matchers().len() as u32);
        for sub in matcher.sub_matchers() {
            self.write_matcher(sub);
        }
    }
}

struct CacheReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl CacheReader<'_> {
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_slice(
        &mut self,
        len: usize,
    ) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| MimeError::invalid_cache("premature end of the cache data"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MimeError::invalid_cache(format!(
                "invalid boolean byte: {other}"
            ))),
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let slice = self.read_slice(len)?;
        String::from_utf8(slice.to_vec())
            .map_err(|e| MimeError::invalid_cache(format!("invalid UTF-8 string: {e}")))
    }

    fn read_opt_string(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_string()?))
        } else {
            Ok(None)
        }
    }

    fn read_opt_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        if self.read_bool()? {
            let len = self.read_u32()? as usize;
            Ok(Some(self.read_slice(len)?.to_vec()))
        } else {
            Ok(None)
        }
    }

    fn read_mime_type(&mut self) -> Result<MimeType> {
        let name = self.read_string()?;
        if name.is_empty() {
            return Err(MimeError::invalid_cache("empty MIME type name"));
        }
        let mut mime = MimeType::new(name);
        let descriptions = self.read_u32()?;
        for _ in 0..descriptions {
            let lang = self.read_string()?;
            let text = self.read_string()?;
            mime = mime.with_description(lang, text);
        }
        let namespace_uri = self.read_opt_string()?;
        let local_name = self.read_opt_string()?;
        mime = mime.with_root_xml(namespace_uri, local_name);
        if let Some(acronym) = self.read_opt_string()? {
            mime = mime.with_acronym(acronym);
        }
        if let Some(expanded) = self.read_opt_string()? {
            mime = mime.with_expanded_acronym(expanded);
        }
        if let Some(icon) = self.read_opt_string()? {
            mime = mime.with_generic_icon(icon);
        }
        for _ in 0..self.read_u32()? {
            mime = mime.with_alias(self.read_string()?);
        }
        for _ in 0..self.read_u32()? {
            mime = mime.with_glob(self.read_glob()?);
        }
        for _ in 0..self.read_u32()? {
            mime = mime.with_magic(self.read_magic()?);
        }
        for _ in 0..self.read_u32()? {
            mime = mime.with_super_type(self.read_string()?);
        }
        Ok(mime)
    }

    fn read_glob(&mut self) -> Result<MimeGlob> {
        let weight = self.read_i32()?;
        if weight < 0 || weight as u32 > glob::MAX_WEIGHT {
            return Err(MimeError::invalid_cache(format!(
                "glob weight out of range: {weight}"
            )));
        }
        let case_sensitive = self.read_bool()?;
        let pattern = self.read_string()?;
        if pattern.is_empty() {
            return Err(MimeError::invalid_cache("empty glob pattern"));
        }
        Ok(MimeGlob::new(pattern)
            .with_weight(weight as u32)
            .with_case_sensitive(case_sensitive))
    }

    fn read_magic(&mut self) -> Result<MimeMagic> {
        let priority = self.read_i32()?;
        if priority < 0 || priority as u32 > magic::MAX_PRIORITY {
            return Err(MimeError::invalid_cache(format!(
                "magic priority out of range: {priority}"
            )));
        }
        let count = self.read_u32()?;
        if count == 0 {
            return Err(MimeError::invalid_cache("magic without matchers"));
        }
        let mut matchers = Vec::new();
        for _ in 0..count {
            matchers.push(self.read_matcher()?);
        }
        Ok(MimeMagic::new(matchers).with_priority(priority as u32))
    }

    fn read_matcher(&mut self) -> Result<MimeMagicMatcher> {
        let kind_index = self.read_i32()?;
        let kind = usize::try_from(kind_index)
            .ok()
            .and_then(MagicKind::from_index)
            .ok_or_else(|| {
                MimeError::invalid_cache(format!("invalid match type index: {kind_index}"))
            })?;
        let offset_begin = self.read_i32()?;
        let offset_end = self.read_i32()?;
        if offset_begin < 0 || offset_end < 0 || offset_begin > offset_end {
            return Err(MimeError::invalid_cache(format!(
                "invalid match offsets {offset_begin}:{offset_end}"
            )));
        }
        let value = self
            .read_opt_bytes()?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MimeError::invalid_cache("missing match value"))?;
        let mask = self.read_opt_bytes()?;

        let mut matcher =
            MimeMagicMatcher::new(kind, offset_begin as usize, offset_end as usize, value)
                .map_err(|e| MimeError::invalid_cache(e.to_string()))?;
        if let Some(mask) = mask {
            matcher = matcher
                .with_mask(mask)
                .map_err(|e| MimeError::invalid_cache(e.to_string()))?;
        }
        for _ in 0..self.read_u32()? {
            let sub = self.read_matcher()?;
            matcher.push_sub_matcher(sub);
        }
        Ok(matcher)
    }
}

fn atomic_write(
    path: &Path,
    bytes: &[u8],
) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let tmp = parent.join(format!(".tmp_mime_repository_{}", std::process::id()));

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if path.exists() {
        fs::remove_file(path)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
