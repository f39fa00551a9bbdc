//! mime-info XML 数据库编解码
//!
//! 解析 freedesktop 共享 MIME 数据库格式（根元素 `<mime-info>`，
//! 子元素 `<mime-type>` 携带注释、别名、父类型、glob 与嵌套的 magic
//! 匹配树），并支持把仓库序列化回同一格式。未知子元素（如
//! `<treemagic>`）整棵跳过。序列化与解析保证往返一致。

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{MimeError, Result};
use crate::glob::{self, MimeGlob};
use crate::literal;
use crate::magic::{self, MagicKind, MimeMagic, MimeMagicMatcher};
use crate::mime_type::MimeType;

const MIME_INFO: &[u8] = b"mime-info";
const MIME_TYPE: &[u8] = b"mime-type";
const COMMENT: &[u8] = b"comment";
const ACRONYM: &[u8] = b"acronym";
const EXPANDED_ACRONYM: &[u8] = b"expanded-acronym";
const GENERIC_ICON: &[u8] = b"generic-icon";
const ROOT_XML: &[u8] = b"root-XML";
const ALIAS: &[u8] = b"alias";
const SUB_CLASS_OF: &[u8] = b"sub-class-of";
const GLOB: &[u8] = b"glob";
const MAGIC: &[u8] = b"magic";
const MATCH: &[u8] = b"match";

/// 解析 mime-info XML 文本为类型列表（保持文档顺序）。
///
/// # Errors
///
/// XML 语法错误、根元素不是 `<mime-info>`、必需属性缺失、
/// 数值溢出或取值非法时返回 [`MimeError::MalformedDatabase`]。
pub(crate) fn parse_database(text: &str) -> Result<Vec<MimeType>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut parser = Parser { reader };
    parser.parse_database()
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl Parser<'_> {
    fn parse_database(&mut self) -> Result<Vec<MimeType>> {
        // 根元素必须是 <mime-info>
        loop {
            match self.next_event()? {
                Event::Start(e) if e.name().as_ref() == MIME_INFO => break,
                Event::Empty(e) if e.name().as_ref() == MIME_INFO => return Ok(Vec::new()),
                Event::Decl(_) | Event::Comment(_) | Event::Text(_) | Event::DocType(_) => {}
                Event::Eof => {
                    return Err(MimeError::malformed("empty document, expected <mime-info>"));
                }
                _ => {
                    return Err(MimeError::malformed("the root element must be <mime-info>"));
                }
            }
        }

        let mut types = Vec::new();
        loop {
            match self.next_event()? {
                Event::Start(e) if e.name().as_ref() == MIME_TYPE => {
                    let start = e.to_owned();
                    types.push(self.parse_mime_type(&start)?);
                }
                Event::Empty(e) if e.name().as_ref() == MIME_TYPE => {
                    return Err(MimeError::malformed(
                        "<mime-type> requires at least one <comment>",
                    ));
                }
                Event::Start(e) => {
                    log::warn!(
                        "跳过 <mime-info> 下的未知元素: {}",
                        String::from_utf8_lossy(e.name().as_ref())
                    );
                    self.skip_subtree()?;
                }
                Event::Empty(_) | Event::Comment(_) | Event::Text(_) => {}
                Event::End(e) if e.name().as_ref() == MIME_INFO => break,
                Event::Eof => {
                    return Err(MimeError::malformed("premature end of the XML document"));
                }
                _ => {}
            }
        }
        Ok(types)
    }

    fn parse_mime_type(
        &mut self,
        start: &BytesStart<'_>,
    ) -> Result<MimeType> {
        let name = required_attr(start, b"type", "mime-type")?;
        log::trace!("解析 MIME 类型: {name}");
        let mut mime = MimeType::new(name);
        let mut saw_root_xml = false;

        loop {
            match self.next_event()? {
                Event::Start(e) => {
                    let elem = e.to_owned();
                    match elem.name().as_ref() {
                        COMMENT => {
                            let lang = attr_value(&elem, b"xml:lang")?.unwrap_or_default();
                            let text = self.read_text(COMMENT)?;
                            mime = mime.with_description(lang, text);
                        }
                        ACRONYM => {
                            let text = self.read_text(ACRONYM)?;
                            mime = mime.with_acronym(text);
                        }
                        EXPANDED_ACRONYM => {
                            let text = self.read_text(EXPANDED_ACRONYM)?;
                            mime = mime.with_expanded_acronym(text);
                        }
                        MAGIC => {
                            mime = mime.with_magic(self.parse_magic(&elem)?);
                        }
                        GLOB => {
                            mime = mime.with_glob(parse_glob(&elem)?);
                            self.skip_subtree()?;
                        }
                        GENERIC_ICON => {
                            if let Some(icon) = attr_value(&elem, b"name")? {
                                mime = mime.with_generic_icon(icon);
                            }
                            self.skip_subtree()?;
                        }
                        ROOT_XML => {
                            if !saw_root_xml {
                                saw_root_xml = true;
                                let ns = attr_value(&elem, b"namespaceURI")?;
                                let local = attr_value(&elem, b"localName")?;
                                mime = mime.with_root_xml(ns, local);
                            }
                            self.skip_subtree()?;
                        }
                        ALIAS => {
                            mime = mime.with_alias(required_attr(&elem, b"type", "alias")?);
                            self.skip_subtree()?;
                        }
                        SUB_CLASS_OF => {
                            mime =
                                mime.with_super_type(required_attr(&elem, b"type", "sub-class-of")?);
                            self.skip_subtree()?;
                        }
                        other => {
                            log::trace!(
                                "跳过 <mime-type> 下的未知元素: {}",
                                String::from_utf8_lossy(other)
                            );
                            self.skip_subtree()?;
                        }
                    }
                }
                Event::Empty(e) => match e.name().as_ref() {
                    COMMENT => {
                        let lang = attr_value(&e, b"xml:lang")?.unwrap_or_default();
                        mime = mime.with_description(lang, String::new());
                    }
                    GENERIC_ICON => {
                        if let Some(icon) = attr_value(&e, b"name")? {
                            mime = mime.with_generic_icon(icon);
                        }
                    }
                    ROOT_XML => {
                        // <root-XML> 可重复，仅首个生效
                        if !saw_root_xml {
                            saw_root_xml = true;
                            let ns = attr_value(&e, b"namespaceURI")?;
                            let local = attr_value(&e, b"localName")?;
                            mime = mime.with_root_xml(ns, local);
                        }
                    }
                    ALIAS => {
                        mime = mime.with_alias(required_attr(&e, b"type", "alias")?);
                    }
                    SUB_CLASS_OF => {
                        mime = mime.with_super_type(required_attr(&e, b"type", "sub-class-of")?);
                    }
                    GLOB => {
                        mime = mime.with_glob(parse_glob(&e)?);
                    }
                    other => {
                        log::trace!(
                            "跳过 <mime-type> 下的未知元素: {}",
                            String::from_utf8_lossy(other)
                        );
                    }
                },
                Event::End(e) if e.name().as_ref() == MIME_TYPE => break,
                Event::Eof => {
                    return Err(MimeError::malformed("premature end inside <mime-type>"));
                }
                _ => {}
            }
        }

        if mime.descriptions().is_empty() {
            return Err(MimeError::malformed(format!(
                "<mime-type type=\"{}\"> requires at least one <comment>",
                mime.name()
            )));
        }
        Ok(mime)
    }

    fn parse_magic(
        &mut self,
        start: &BytesStart<'_>,
    ) -> Result<MimeMagic> {
        let priority = match attr_value(start, b"priority")? {
            Some(text) => parse_bounded(&text, magic::MAX_PRIORITY, "magic priority")?,
            None => magic::DEFAULT_PRIORITY,
        };
        let mut matchers = Vec::new();
        loop {
            match self.next_event()? {
                Event::Start(e) if e.name().as_ref() == MATCH => {
                    let elem = e.to_owned();
                    matchers.push(self.parse_matcher(&elem, false)?);
                }
                Event::Empty(e) if e.name().as_ref() == MATCH => {
                    matchers.push(self.parse_matcher(&e, true)?);
                }
                Event::Start(_) => self.skip_subtree()?,
                Event::End(e) if e.name().as_ref() == MAGIC => break,
                Event::Eof => {
                    return Err(MimeError::malformed("premature end inside <magic>"));
                }
                _ => {}
            }
        }
        if matchers.is_empty() {
            return Err(MimeError::malformed(
                "<magic> requires at least one <match>",
            ));
        }
        Ok(MimeMagic::new(matchers).with_priority(priority))
    }

    fn parse_matcher(
        &mut self,
        start: &BytesStart<'_>,
        is_empty: bool,
    ) -> Result<MimeMagicMatcher> {
        let kind_name = required_attr(start, b"type", "match")?;
        let kind = MagicKind::from_name(&kind_name).ok_or_else(|| {
            MimeError::malformed(format!("unknown match type: {kind_name:?}"))
        })?;
        let offset_text = required_attr(start, b"offset", "match")?;
        let (offset_begin, offset_end) = parse_offset(&offset_text)?;
        let value_text = required_attr(start, b"value", "match")?;
        let value = match kind.width() {
            None => literal::decode_c_literal(&value_text)?,
            Some(width) => literal::parse_number(&value_text, width)?,
        };
        let mut matcher = MimeMagicMatcher::new(kind, offset_begin, offset_end, value)?;

        if let Some(mask_text) = attr_value(start, b"mask")? {
            let mask = match kind.width() {
                None => literal::parse_hex_mask(&mask_text, matcher.value().len())?,
                Some(width) => literal::parse_number(&mask_text, width)?,
            };
            matcher = matcher.with_mask(mask)?;
        }

        if !is_empty {
            loop {
                match self.next_event()? {
                    Event::Start(e) if e.name().as_ref() == MATCH => {
                        let elem = e.to_owned();
                        let sub = self.parse_matcher(&elem, false)?;
                        matcher.push_sub_matcher(sub);
                    }
                    Event::Empty(e) if e.name().as_ref() == MATCH => {
                        let sub = self.parse_matcher(&e, true)?;
                        matcher.push_sub_matcher(sub);
                    }
                    Event::Start(_) => self.skip_subtree()?,
                    Event::End(e) if e.name().as_ref() == MATCH => break,
                    Event::Eof => {
                        return Err(MimeError::malformed("premature end inside <match>"));
                    }
                    _ => {}
                }
            }
        }
        Ok(matcher)
    }

    /// 读取当前元素的文本内容直到对应的结束标签。
    fn read_text(
        &mut self,
        tag: &[u8],
    ) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(t) => {
                    let piece = t
                        .unescape()
                        .map_err(|e| MimeError::malformed(format!("invalid XML text: {e}")))?;
                    text.push_str(&piece);
                }
                Event::CData(t) => {
                    text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
                Event::Start(_) => self.skip_subtree()?,
                Event::End(e) if e.name().as_ref() == tag => break,
                Event::Eof => {
                    return Err(MimeError::malformed("premature end of the XML document"));
                }
                _ => {}
            }
        }
        Ok(text)
    }

    /// 跳过当前已打开元素的整棵子树。
    fn skip_subtree(&mut self) -> Result<()> {
        let mut depth = 1usize;
        loop {
            match self.next_event()? {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => {
                    return Err(MimeError::malformed("premature end of the XML document"));
                }
                _ => {}
            }
        }
    }

    fn next_event(&mut self) -> Result<Event<'static>> {
        self.reader
            .read_event()
            .map(Event::into_owned)
            .map_err(|e| MimeError::malformed(format!("XML syntax error: {e}")))
    }
}

fn parse_glob(elem: &BytesStart<'_>) -> Result<MimeGlob> {
    let pattern = required_attr(elem, b"pattern", "glob")?;
    if pattern.is_empty() {
        return Err(MimeError::malformed("empty glob pattern"));
    }
    let mut result = MimeGlob::new(pattern);
    if let Some(text) = attr_value(elem, b"weight")? {
        result = result.with_weight(parse_bounded(&text, glob::MAX_WEIGHT, "glob weight")?);
    }
    if let Some(text) = attr_value(elem, b"case-sensitive")? {
        result = result.with_case_sensitive(parse_bool(&text)?);
    }
    Ok(result)
}

fn attr_value(
    start: &BytesStart<'_>,
    name: &[u8],
) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr
            .map_err(|e| MimeError::malformed(format!("invalid XML attribute: {e}")))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|e| MimeError::malformed(format!("invalid XML attribute: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attr(
    start: &BytesStart<'_>,
    name: &[u8],
    element: &str,
) -> Result<String> {
    attr_value(start, name)?.ok_or_else(|| {
        MimeError::malformed(format!(
            "<{element}> is missing the required attribute '{}'",
            String::from_utf8_lossy(name)
        ))
    })
}

fn parse_bounded(
    text: &str,
    max: u32,
    what: &str,
) -> Result<u32> {
    let value: u32 = text
        .parse()
        .map_err(|e| MimeError::malformed(format!("invalid {what} {text:?}: {e}")))?;
    if value > max {
        return Err(MimeError::malformed(format!(
            "{what} {value} is out of range [0, {max}]"
        )));
    }
    Ok(value)
}

fn parse_bool(text: &str) -> Result<bool> {
    match text {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(MimeError::malformed(format!(
            "invalid boolean attribute: {other:?}"
        ))),
    }
}

/// 偏移文法：裸 `N` 等价于 `N:N`，`N:M` 为闭区间。
fn parse_offset(text: &str) -> Result<(usize, usize)> {
    let (begin_text, end_text) = match text.split_once(':') {
        Some((b, e)) => (b, e),
        None => (text, text),
    };
    let begin: usize = begin_text
        .parse()
        .map_err(|_| MimeError::malformed(format!("invalid match offset: {text:?}")))?;
    let end: usize = end_text
        .parse()
        .map_err(|_| MimeError::malformed(format!("invalid match offset: {text:?}")))?;
    Ok((begin, end))
}

/// 把类型列表序列化为 mime-info XML 文本。
#[must_use]
pub(crate) fn serialize_database(types: &[MimeType]) -> String {
    // 写入内存缓冲不会产生 I/O 错误
    let bytes = write_database(types).unwrap_or_default();
    String::from_utf8(bytes).unwrap_or_default()
}

fn write_database(types: &[MimeType]) -> std::io::Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("mime-info")))?;
    for mime in types {
        write_mime_type(&mut writer, mime)?;
    }
    writer.write_event(Event::End(BytesEnd::new("mime-info")))?;
    Ok(writer.into_inner())
}

fn write_mime_type(
    writer: &mut Writer<Vec<u8>>,
    mime: &MimeType,
) -> std::io::Result<()> {
    let mut start = BytesStart::new("mime-type");
    start.push_attribute(("type", mime.name()));
    writer.write_event(Event::Start(start))?;

    for (lang, text) in mime.descriptions() {
        let mut comment = BytesStart::new("comment");
        if !lang.is_empty() {
            comment.push_attribute(("xml:lang", lang.as_str()));
        }
        writer.write_event(Event::Start(comment))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new("comment")))?;
    }
    if let Some(acronym) = mime.acronym() {
        write_text_element(writer, "acronym", acronym)?;
    }
    if let Some(expanded) = mime.expanded_acronym() {
        write_text_element(writer, "expanded-acronym", expanded)?;
    }
    if let Some(icon) = mime.generic_icon() {
        let mut elem = BytesStart::new("generic-icon");
        elem.push_attribute(("name", icon));
        writer.write_event(Event::Empty(elem))?;
    }
    if mime.namespace_uri().is_some() || mime.local_name().is_some() {
        let mut elem = BytesStart::new("root-XML");
        if let Some(ns) = mime.namespace_uri() {
            elem.push_attribute(("namespaceURI", ns));
        }
        if let Some(local) = mime.local_name() {
            elem.push_attribute(("localName", local));
        }
        writer.write_event(Event::Empty(elem))?;
    }
    for parent in mime.super_types() {
        let mut elem = BytesStart::new("sub-class-of");
        elem.push_attribute(("type", parent.as_str()));
        writer.write_event(Event::Empty(elem))?;
    }
    for glob in mime.globs() {
        let mut elem = BytesStart::new("glob");
        elem.push_attribute(("pattern", glob.pattern()));
        if glob.weight() != glob::DEFAULT_WEIGHT {
            elem.push_attribute(("weight", glob.weight().to_string().as_str()));
        }
        if glob.is_case_sensitive() != glob::DEFAULT_CASE_SENSITIVE {
            elem.push_attribute(("case-sensitive", "true"));
        }
        writer.write_event(Event::Empty(elem))?;
    }
    for magic_rule in mime.magics() {
        let mut elem = BytesStart::new("magic");
        if magic_rule.priority() != magic::DEFAULT_PRIORITY {
            elem.push_attribute(("priority", magic_rule.priority().to_string().as_str()));
        }
        writer.write_event(Event::Start(elem))?;
        for matcher in magic_rule.matchers() {
            write_matcher(writer, matcher)?;
        }
        writer.write_event(Event::End(BytesEnd::new("magic")))?;
    }
    for alias in mime.aliases() {
        let mut elem = BytesStart::new("alias");
        elem.push_attribute(("type", alias.as_str()));
        writer.write_event(Event::Empty(elem))?;
    }

    writer.write_event(Event::End(BytesEnd::new("mime-type")))
}

fn write_matcher(
    writer: &mut Writer<Vec<u8>>,
    matcher: &MimeMagicMatcher,
) -> std::io::Result<()> {
    let mut elem = BytesStart::new("match");
    elem.push_attribute(("type", matcher.kind().name()));
    let offset = if matcher.offset_begin() == matcher.offset_end() {
        matcher.offset_begin().to_string()
    } else {
        format!("{}:{}", matcher.offset_begin(), matcher.offset_end())
    };
    elem.push_attribute(("offset", offset.as_str()));
    let value = match matcher.kind().width() {
        None => literal::encode_c_literal(matcher.value()),
        Some(_) => literal::format_number(matcher.value()),
    };
    elem.push_attribute(("value", value.as_str()));
    if let Some(mask) = matcher.mask() {
        // string 类型的 mask 规定为 0x 十六进制，数值类型同样以 0x 输出
        elem.push_attribute(("mask", literal::format_number(mask).as_str()));
    }
    if matcher.sub_matchers().is_empty() {
        writer.write_event(Event::Empty(elem))
    } else {
        writer.write_event(Event::Start(elem))?;
        for sub in matcher.sub_matchers() {
            write_matcher(writer, sub)?;
        }
        writer.write_event(Event::End(BytesEnd::new("match")))
    }
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    tag: &'static str,
    text: &str,
) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mime-info>
  <mime-type type="image/png">
    <comment>PNG image</comment>
    <comment xml:lang="zh">PNG 图像</comment>
    <acronym>PNG</acronym>
    <expanded-acronym>Portable Network Graphics</expanded-acronym>
    <generic-icon name="image-x-generic"/>
    <glob pattern="*.png"/>
    <magic priority="50">
      <match type="string" offset="0" value="\x89PNG\r\n\x1a\n"/>
    </magic>
  </mime-type>
  <mime-type type="application/gzip">
    <comment>Gzip archive</comment>
    <alias type="application/x-gzip"/>
    <glob pattern="*.gz"/>
    <magic priority="45">
      <match type="big16" offset="0" value="0x1F8B"/>
    </magic>
  </mime-type>
  <mime-type type="application/x-ole-storage">
    <comment>OLE2 compound document storage</comment>
    <magic priority="50">
      <match type="big32" offset="0" value="0xD0CF11E0" mask="0xFFFFFFFF"/>
    </magic>
  </mime-type>
  <mime-type type="application/vnd.ms-word">
    <comment>Word document</comment>
    <sub-class-of type="application/x-ole-storage"/>
    <glob pattern="*.doc"/>
  </mime-type>
  <mime-type type="image/svg+xml">
    <comment>SVG image</comment>
    <root-XML namespaceURI="http://www.w3.org/2000/svg" localName="svg"/>
    <root-XML namespaceURI="ignored" localName="ignored"/>
    <glob pattern="*.svg" weight="80" case-sensitive="true"/>
    <treemagic>
      <treematch path="ignored"/>
    </treemagic>
  </mime-type>
  <mime-type type="audio/x-wav">
    <comment>WAV audio</comment>
    <glob pattern="*.wav"/>
    <magic priority="50">
      <match type="string" offset="0" value="RIFF">
        <match type="string" offset="8" value="WAVE"/>
      </match>
    </magic>
  </mime-type>
</mime-info>
"#;

    #[test]
    fn test_parse_sample_database() {
        let types = parse_database(SAMPLE).unwrap();
        assert_eq!(types.len(), 6);

        let png = &types[0];
        assert_eq!(png.name(), "image/png");
        assert_eq!(png.description("en"), Some("PNG image"));
        assert_eq!(png.description("zh_CN"), Some("PNG 图像"));
        assert_eq!(png.acronym(), Some("PNG"));
        assert_eq!(png.expanded_acronym(), Some("Portable Network Graphics"));
        assert_eq!(png.generic_icon(), Some("image-x-generic"));
        assert_eq!(png.globs().len(), 1);
        assert_eq!(png.magics().len(), 1);
        assert_eq!(
            png.magics()[0].matchers()[0].value(),
            b"\x89PNG\r\n\x1a\n"
        );

        let gzip = &types[1];
        assert_eq!(gzip.aliases(), ["application/x-gzip"]);
        assert_eq!(gzip.magics()[0].priority(), 45);
        assert_eq!(gzip.magics()[0].matchers()[0].value(), &[0x1F, 0x8B]);

        let ole = &types[2];
        assert_eq!(
            ole.magics()[0].matchers()[0].mask(),
            Some(&[0xFF, 0xFF, 0xFF, 0xFF][..])
        );

        let word = &types[3];
        assert_eq!(word.super_types(), ["application/x-ole-storage"]);

        let svg = &types[4];
        assert_eq!(
            svg.namespace_uri(),
            Some("http://www.w3.org/2000/svg")
        );
        assert_eq!(svg.local_name(), Some("svg"));
        assert_eq!(svg.globs()[0].weight(), 80);
        assert!(svg.globs()[0].is_case_sensitive());

        let wav = &types[5];
        let riff = &wav.magics()[0].matchers()[0];
        assert_eq!(riff.sub_matchers().len(), 1);
        assert_eq!(riff.sub_matchers()[0].value(), b"WAVE");
        assert_eq!(riff.sub_matchers()[0].offset_begin(), 8);
    }

    #[test]
    fn test_parse_offset_range() {
        let xml = r#"<mime-info>
  <mime-type type="video/mp4">
    <comment>MP4 video</comment>
    <magic><match type="string" offset="4:12" value="ftyp"/></magic>
  </mime-type>
</mime-info>"#;
        let types = parse_database(xml).unwrap();
        let matcher = &types[0].magics()[0].matchers()[0];
        assert_eq!(matcher.offset_begin(), 4);
        assert_eq!(matcher.offset_end(), 12);
    }

    #[test]
    fn test_parse_numeric_grammars() {
        let xml = r#"<mime-info>
  <mime-type type="x/num">
    <comment>numbers</comment>
    <magic>
      <match type="byte" offset="0" value="064"/>
      <match type="little32" offset="0" value="1234567890"/>
      <match type="host16" offset="0" value="0xCAFE" mask="0xFF00"/>
    </magic>
  </mime-type>
</mime-info>"#;
        let types = parse_database(xml).unwrap();
        let matchers = types[0].magics()[0].matchers();
        assert_eq!(matchers[0].value(), &[0o64]);
        assert_eq!(matchers[1].value(), 1_234_567_890u32.to_be_bytes());
        assert_eq!(matchers[2].value(), &[0xCA, 0xFE]);
        assert_eq!(matchers[2].mask(), Some(&[0xFF, 0x00][..]));
    }

    #[test]
    fn test_parse_string_mask() {
        let xml = r#"<mime-info>
  <mime-type type="x/mask">
    <comment>mask</comment>
    <magic><match type="string" offset="0" value="ABCD" mask="0xFFFFFF00"/></magic>
  </mime-type>
</mime-info>"#;
        let types = parse_database(xml).unwrap();
        let matcher = &types[0].magics()[0].matchers()[0];
        assert_eq!(matcher.mask(), Some(&[0xFF, 0xFF, 0xFF, 0x00][..]));
    }

    #[test]
    fn test_malformed_inputs() {
        let missing_type = "<mime-info><mime-type><comment>x</comment></mime-type></mime-info>";
        assert!(parse_database(missing_type).is_err());

        let missing_comment = r#"<mime-info><mime-type type="x/y"/></mime-info>"#;
        assert!(parse_database(missing_comment).is_err());

        let unknown_match_type = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <magic><match type="quad64" offset="0" value="1"/></magic>
            </mime-type></mime-info>"#;
        assert!(parse_database(unknown_match_type).is_err());

        let inverted_offset = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <magic><match type="string" offset="9:3" value="A"/></magic>
            </mime-type></mime-info>"#;
        assert!(parse_database(inverted_offset).is_err());

        let negative_offset = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <magic><match type="string" offset="-1" value="A"/></magic>
            </mime-type></mime-info>"#;
        assert!(parse_database(negative_offset).is_err());

        let overflow = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <magic><match type="big16" offset="0" value="0x10000"/></magic>
            </mime-type></mime-info>"#;
        assert!(parse_database(overflow).is_err());

        let odd_mask = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <magic><match type="string" offset="0" value="AB" mask="0xFFF"/></magic>
            </mime-type></mime-info>"#;
        assert!(parse_database(odd_mask).is_err());

        let empty_magic = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <magic priority="60"></magic></mime-type></mime-info>"#;
        assert!(parse_database(empty_magic).is_err());

        let not_mime_info = "<mime-types/>";
        assert!(parse_database(not_mime_info).is_err());

        let truncated = r#"<mime-info><mime-type type="x/y"><comment>y</comment>"#;
        assert!(parse_database(truncated).is_err());
    }

    #[test]
    fn test_glob_weight_out_of_range() {
        let xml = r#"<mime-info><mime-type type="x/y"><comment>y</comment>
            <glob pattern="*.y" weight="101"/></mime-type></mime-info>"#;
        assert!(parse_database(xml).is_err());
    }

    #[test]
    fn test_round_trip_is_stable() {
        let first = parse_database(SAMPLE).unwrap();
        let serialized = serialize_database(&first);
        let second = parse_database(&serialized).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.descriptions(), b.descriptions());
            assert_eq!(a.acronym(), b.acronym());
            assert_eq!(a.expanded_acronym(), b.expanded_acronym());
            assert_eq!(a.generic_icon(), b.generic_icon());
            assert_eq!(a.namespace_uri(), b.namespace_uri());
            assert_eq!(a.local_name(), b.local_name());
            assert_eq!(a.aliases(), b.aliases());
            assert_eq!(a.super_types(), b.super_types());
            assert_eq!(a.globs(), b.globs());
            assert_eq!(a.magics(), b.magics());
        }
        // 二次序列化逐字节稳定
        assert_eq!(serialize_database(&second), serialized);
    }
}
