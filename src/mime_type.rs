//! MIME 类型记录
//!
//! 一条记录包含规范名、别名、按语言的描述、可选的 XML 根元素提示、
//! 文件名 glob 与内容 magic 规则，以及父类型名列表。
//! 父类型边以名称存储，经由仓库在匹配时惰性解析；
//! 内容匹配在自身无规则命中时会递归回退到父类型的 magic。

use std::collections::BTreeMap;

use crate::glob::MimeGlob;
use crate::magic::MimeMagic;
use crate::repository::MimeRepository;

/// 一个 MIME 类型。相等性只看规范名。
#[derive(Debug, Clone)]
pub struct MimeType {
    name: String,
    descriptions: BTreeMap<String, String>,
    namespace_uri: Option<String>,
    local_name: Option<String>,
    acronym: Option<String>,
    expanded_acronym: Option<String>,
    generic_icon: Option<String>,
    aliases: Vec<String>,
    globs: Vec<MimeGlob>,
    magics: Vec<MimeMagic>,
    super_types: Vec<String>,
}

impl MimeType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptions: BTreeMap::new(),
            namespace_uri: None,
            local_name: None,
            acronym: None,
            expanded_acronym: None,
            generic_icon: None,
            aliases: Vec::new(),
            globs: Vec::new(),
            magics: Vec::new(),
            super_types: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(
        mut self,
        lang: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.descriptions.insert(lang.into(), text.into());
        self
    }

    #[must_use]
    pub fn with_root_xml(
        mut self,
        namespace_uri: Option<String>,
        local_name: Option<String>,
    ) -> Self {
        self.namespace_uri = namespace_uri;
        self.local_name = local_name;
        self
    }

    #[must_use]
    pub fn with_acronym(
        mut self,
        acronym: impl Into<String>,
    ) -> Self {
        self.acronym = Some(acronym.into());
        self
    }

    #[must_use]
    pub fn with_expanded_acronym(
        mut self,
        expanded: impl Into<String>,
    ) -> Self {
        self.expanded_acronym = Some(expanded.into());
        self
    }

    #[must_use]
    pub fn with_generic_icon(
        mut self,
        icon: impl Into<String>,
    ) -> Self {
        self.generic_icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn with_alias(
        mut self,
        alias: impl Into<String>,
    ) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn with_glob(
        mut self,
        glob: MimeGlob,
    ) -> Self {
        self.globs.push(glob);
        self
    }

    #[must_use]
    pub fn with_magic(
        mut self,
        magic: MimeMagic,
    ) -> Self {
        self.magics.push(magic);
        self
    }

    #[must_use]
    pub fn with_super_type(
        mut self,
        parent: impl Into<String>,
    ) -> Self {
        self.super_types.push(parent.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn descriptions(&self) -> &BTreeMap<String, String> {
        &self.descriptions
    }

    #[must_use]
    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace_uri.as_deref()
    }

    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    #[must_use]
    pub fn acronym(&self) -> Option<&str> {
        self.acronym.as_deref()
    }

    #[must_use]
    pub fn expanded_acronym(&self) -> Option<&str> {
        self.expanded_acronym.as_deref()
    }

    #[must_use]
    pub fn generic_icon(&self) -> Option<&str> {
        self.generic_icon.as_deref()
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn globs(&self) -> &[MimeGlob] {
        &self.globs
    }

    #[must_use]
    pub fn magics(&self) -> &[MimeMagic] {
        &self.magics
    }

    #[must_use]
    pub fn super_types(&self) -> &[String] {
        &self.super_types
    }

    /// 按区域设置查找描述。
    ///
    /// 回退链：完整区域（如 `zh_CN`）、语言部分（`zh`）、无语言的默认项、
    /// `en`、`en_US`、`en_GB`，最后取任意第一项。
    #[must_use]
    pub fn description(
        &self,
        locale: &str,
    ) -> Option<&str> {
        if self.descriptions.is_empty() {
            return None;
        }
        if let Some(text) = self.descriptions.get(locale) {
            return Some(text);
        }
        let language = locale
            .split(['_', '-'])
            .next()
            .unwrap_or(locale);
        for key in [language, "", "en", "en_US", "en_GB"] {
            if let Some(text) = self.descriptions.get(key) {
                return Some(text);
            }
        }
        self.descriptions.values().next().map(String::as_str)
    }

    /// 任一 glob 匹配文件名即命中。
    #[must_use]
    pub fn matches_filename(
        &self,
        filename: &str,
    ) -> bool {
        self.globs.iter().any(|glob| glob.matches(filename))
    }

    /// 任一自有 magic 命中，或（自身无命中时）任一父类型递归命中。
    ///
    /// 父类型递归携带访问集合，数据库中的成环不会导致无限递归。
    #[must_use]
    pub fn matches_content(
        &self,
        buffer: &[u8],
        n: usize,
        repository: &MimeRepository,
    ) -> bool {
        let mut visited = Vec::new();
        self.matches_content_guarded(buffer, n, repository, &mut visited)
    }

    fn matches_content_guarded<'a>(
        &'a self,
        buffer: &[u8],
        n: usize,
        repository: &'a MimeRepository,
        visited: &mut Vec<&'a str>,
    ) -> bool {
        if visited.contains(&self.name.as_str()) {
            return false;
        }
        visited.push(&self.name);
        if self.magics.iter().any(|magic| magic.matches(buffer, n)) {
            return true;
        }
        self.super_types.iter().any(|parent_name| {
            repository
                .lookup(parent_name)
                .is_some_and(|parent| parent.matches_content_guarded(buffer, n, repository, visited))
        })
    }

    /// 返回优先级不低于 `min_priority` 的最高优先级命中 magic。
    ///
    /// 自有规则优先；自身无命中时递归父类型取其中最优。
    /// 同优先级取先遇到的一条。供检测器的 magic 复核阶段使用。
    #[must_use]
    pub fn best_magic<'a>(
        &'a self,
        buffer: &[u8],
        n: usize,
        min_priority: i64,
        repository: &'a MimeRepository,
    ) -> Option<&'a MimeMagic> {
        let mut visited = Vec::new();
        self.best_magic_guarded(buffer, n, min_priority, repository, &mut visited)
    }

    fn best_magic_guarded<'a>(
        &'a self,
        buffer: &[u8],
        n: usize,
        min_priority: i64,
        repository: &'a MimeRepository,
        visited: &mut Vec<&'a str>,
    ) -> Option<&'a MimeMagic> {
        if visited.contains(&self.name.as_str()) {
            return None;
        }
        visited.push(&self.name);

        let mut best: Option<&MimeMagic> = None;
        let mut best_priority = min_priority;
        for magic in &self.magics {
            let priority = i64::from(magic.priority());
            let qualifies = if best.is_none() {
                priority >= best_priority
            } else {
                priority > best_priority
            };
            if qualifies && magic.matches(buffer, n) {
                best = Some(magic);
                best_priority = priority;
            }
        }
        if best.is_some() {
            return best;
        }

        for parent_name in &self.super_types {
            let Some(parent) = repository.lookup(parent_name) else {
                continue;
            };
            if let Some(magic) =
                parent.best_magic_guarded(buffer, n, best_priority, repository, visited)
            {
                let priority = i64::from(magic.priority());
                let qualifies = if best.is_none() {
                    priority >= best_priority
                } else {
                    priority > best_priority
                };
                if qualifies {
                    best = Some(magic);
                    best_priority = priority;
                }
            }
        }
        best
    }
}

impl PartialEq for MimeType {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.name == other.name
    }
}

impl Eq for MimeType {}

impl std::hash::Hash for MimeType {
    fn hash<H: std::hash::Hasher>(
        &self,
        state: &mut H,
    ) {
        self.name.hash(state);
    }
}
