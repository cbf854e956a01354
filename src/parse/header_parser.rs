use std::sync::LazyLock;

use regex::Regex;

use crate::model::config::Markup;

static DEFAULT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<open>=+)\s*(?P<inner>.*?)\s*(?P<close>=+)\s*$").expect("header pattern")
});

static MARKDOWN_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<open>#+)\s+(?P<inner>.*?)\s*$").expect("markdown header pattern")
});

/// A region header: `Name | filter [| defaults] [#SOURCE] [$SORT]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionFields {
    pub level: usize,
    pub name: String,
    pub filter: String,
    pub defaults: Option<String>,
    pub source: Option<String>,
    pub sort: Option<String>,
}

/// A preset header: `Name || filter [|| defaults]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetFields {
    pub level: usize,
    pub name: String,
    pub filter: String,
    pub defaults: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderLine {
    Region(RegionFields),
    Preset(PresetFields),
    Plain { level: usize },
}

impl HeaderLine {
    pub fn level(&self) -> usize {
        match self {
            HeaderLine::Region(r) => r.level,
            HeaderLine::Preset(p) => p.level,
            HeaderLine::Plain { level } => *level,
        }
    }
}

/// Parse a header line in the given markup. `None` when the line is not a header.
pub fn parse_header(line: &str, markup: Markup) -> Option<HeaderLine> {
    let (level, inner) = match markup {
        Markup::Default => {
            let caps = DEFAULT_HEADER.captures(line)?;
            let level = caps["open"].len();
            if caps["close"].len() != level {
                return None;
            }
            (level, caps.name("inner")?.as_str())
        }
        Markup::Markdown => {
            let caps = MARKDOWN_HEADER.captures(line)?;
            (caps["open"].len(), caps.name("inner")?.as_str())
        }
    };

    if inner.contains("||") {
        let mut parts = inner.splitn(3, "||").map(str::trim);
        let name = parts.next().unwrap_or_default().to_string();
        let filter = parts.next().unwrap_or_default().to_string();
        let defaults = parts.next().filter(|d| !d.is_empty()).map(str::to_string);
        return Some(HeaderLine::Preset(PresetFields {
            level,
            name,
            filter,
            defaults,
        }));
    }

    if inner.contains('|') {
        let (body, source, sort) = strip_indicators(inner);
        let mut parts = body.splitn(3, '|').map(str::trim);
        let name = parts.next().unwrap_or_default().to_string();
        let filter = parts.next().unwrap_or_default().to_string();
        let defaults = parts.next().filter(|d| !d.is_empty()).map(str::to_string);
        return Some(HeaderLine::Region(RegionFields {
            level,
            name,
            filter,
            defaults,
            source,
            sort,
        }));
    }

    Some(HeaderLine::Plain { level })
}

/// Peel trailing `#SOURCE` and `$SORT` words off a region header body
fn strip_indicators(inner: &str) -> (&str, Option<String>, Option<String>) {
    let mut body = inner.trim_end();
    let mut source = None;
    let mut sort = None;
    loop {
        let Some((head, last)) = body.rsplit_once(char::is_whitespace) else {
            break;
        };
        if source.is_none()
            && let Some(key) = indicator(last, '#')
        {
            source = Some(key);
        } else if sort.is_none()
            && let Some(key) = indicator(last, '$')
        {
            sort = Some(key);
        } else {
            break;
        }
        body = head.trim_end();
    }
    (body, source, sort)
}

fn indicator(word: &str, sigil: char) -> Option<String> {
    let key = word.strip_prefix(sigil)?;
    let mut chars = key.chars();
    let first = chars.next()?;
    (first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .then(|| key.to_string())
}
