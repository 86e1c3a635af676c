use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

/// One lexical XML event. Attribute values are kept as raw, still-escaped bytes so that
/// character references survive a parse/write cycle untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

impl XmlEvent {
    pub fn start(name: &str, attrs: Vec<(String, String)>) -> Self {
        Self::Start {
            name: name.to_string(),
            attrs,
        }
    }

    pub fn end(name: &str) -> Self {
        Self::End {
            name: name.to_string(),
        }
    }

    pub fn empty(name: &str) -> Self {
        Self::Empty {
            name: name.to_string(),
            attrs: Vec::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }

    /// Element name for `Start`, `Empty` and `End` events.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Start { name, .. } | Self::Empty { name, .. } | Self::End { name } => {
                Some(name.as_str())
            }
            _ => None,
        }
    }

    pub fn attrs(&self) -> &[(String, String)] {
        match self {
            Self::Start { attrs, .. } | Self::Empty { attrs, .. } => attrs,
            _ => &[],
        }
    }
}

/// A parsed XML part of the package, e.g. `word/document.xml`.
#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

impl XmlPart {
    pub fn parse(name: &str, xml_bytes: &[u8]) -> anyhow::Result<Self> {
        let mut reader = Reader::from_reader(xml_bytes);
        reader.config_mut().trim_text(false);

        let mut events: Vec<XmlEvent> = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let ev = reader
                .read_event_into(&mut buf)
                .with_context(|| format!("read xml event in {name}"))?;
            match ev {
                Event::Eof => break,
                Event::Decl(d) => {
                    let version = lossy(d.version().context("decl version")?);
                    let encoding = d.encoding().and_then(|r| r.ok()).map(lossy);
                    let standalone = d.standalone().and_then(|r| r.ok()).map(lossy);
                    events.push(XmlEvent::Decl {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::Start(s) => events.push(XmlEvent::Start {
                    name: lossy(s.name().as_ref()),
                    attrs: raw_attrs(&s)?,
                }),
                Event::End(e) => events.push(XmlEvent::End {
                    name: lossy(e.name().as_ref()),
                }),
                Event::Empty(s) => events.push(XmlEvent::Empty {
                    name: lossy(s.name().as_ref()),
                    attrs: raw_attrs(&s)?,
                }),
                Event::Text(t) => {
                    let text = t.unescape().context("unescape text")?.into_owned();
                    events.push(XmlEvent::Text { text });
                }
                Event::CData(t) => events.push(XmlEvent::CData {
                    text: lossy(t.into_inner()),
                }),
                Event::Comment(t) => events.push(XmlEvent::Comment {
                    text: lossy(t.into_inner()),
                }),
                Event::PI(t) => {
                    let target = lossy(t.target());
                    let content = lossy(t.content());
                    events.push(XmlEvent::PI {
                        content: format!("{target}{content}"),
                    });
                }
                Event::DocType(t) => events.push(XmlEvent::DocType {
                    text: lossy(t.into_inner()),
                }),
            }
        }

        Ok(Self {
            name: name.to_string(),
            events,
        })
    }
}

fn raw_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        // Unescaping here would turn `&#13;&#10;` into literal newlines, which XML
        // attribute normalization later folds into spaces.
        attrs.push((lossy(a.key.as_ref()), lossy(a.value.as_ref())));
    }
    Ok(attrs)
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn write_tag(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.push(b'<');
    out.extend_from_slice(name.as_bytes());
    for (k, v) in attrs {
        out.push(b' ');
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.push(b'"');
    }
    if empty {
        out.extend_from_slice(b"/>");
    } else {
        out.push(b'>');
    }
}

pub fn write_events(out: &mut Vec<u8>, events: &[XmlEvent]) -> anyhow::Result<()> {
    for ev in events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let d = BytesDecl::new(version, encoding.as_deref(), standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer.write_event(Event::Decl(d)).context("write decl")?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => write_tag(out, name, attrs, false),
            XmlEvent::Empty { name, attrs } => write_tag(out, name, attrs, true),
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.push(b'>');
            }
            XmlEvent::Text { text } => escape_text_into(out, text),
            XmlEvent::CData { text } => {
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.push(b'>');
            }
        }
    }
    Ok(())
}
