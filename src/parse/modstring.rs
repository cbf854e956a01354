use crate::model::defaults::Defaults;
use crate::model::record::Priority;
use crate::parse::line_parser::parse_due;

/// Tags computed by the store; they can be filtered on but never set
pub const VIRTUAL_TAGS: &[&str] = &[
    "BLOCKED", "UNBLOCKED", "BLOCKING", "DUE", "DUETODAY", "TODAY", "OVERDUE", "WEEK", "MONTH",
    "QUARTER", "YEAR", "ACTIVE", "SCHEDULED", "PARENT", "CHILD", "UNTIL", "WAITING", "ANNOTATED",
    "READY", "YESTERDAY", "TOMORROW", "TAGGED", "PENDING", "COMPLETED", "DELETED", "UDA", "ORPHAN",
    "PRIORITY", "PROJECT", "LATEST",
];

/// Separator between a new task's description and its modifications
pub const MODSTRING_SEPARATOR: &str = " -- ";

pub fn is_virtual_tag(tag: &str) -> bool {
    VIRTUAL_TAGS.contains(&tag)
}

/// Split a modification or filter string into tokens.
///
/// Spaces separate tokens. Single or double quotes group, and a backslash
/// takes the next character literally.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in text.trim().chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' | '\'' if quote == Some(c) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(c),
            ' ' if quote.is_none() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Field values named by a token list.
///
/// `key:value` sets a field (an empty value clears it), `+tag` adds a tag
/// unless it is virtual, `-tag` and anything unrecognized are ignored.
/// Returns the defaults plus any due values that failed to parse.
pub fn to_defaults(tokens: &[String]) -> (Defaults, Vec<String>) {
    let mut defaults = Defaults::default();
    let mut malformed = Vec::new();

    for token in tokens {
        if let Some((key, value)) = token.split_once(':') {
            if key.is_empty() || !key.chars().all(char::is_alphabetic) {
                continue;
            }
            let value = (!value.is_empty()).then(|| value.to_string());
            match key {
                "project" | "proj" | "pro" => defaults.project = Some(value),
                "priority" | "prio" | "pri" => {
                    defaults.priority = Some(value.as_deref().and_then(Priority::from_code));
                }
                "due" => match value {
                    None => defaults.due = Some(None),
                    Some(text) => match parse_due(&text.replace('T', " ")) {
                        Some(due) => defaults.due = Some(Some(due)),
                        None => malformed.push(text),
                    },
                },
                other => tracing::debug!(key = other, "ignoring unsupported default"),
            }
        } else if let Some(tag) = token.strip_prefix('+')
            && !tag.is_empty()
            && !is_virtual_tag(tag)
        {
            defaults.tags.insert(tag.to_string());
        }
    }

    (defaults, malformed)
}

/// Split `description -- modstring` into its two halves
pub fn split_modstring(description: &str) -> Option<(&str, &str)> {
    description
        .split_once(MODSTRING_SEPARATOR)
        .map(|(text, mods)| (text.trim(), mods.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tokenize_quotes_and_escapes() {
        assert_eq!(
            tokenize(r#"project:Home "description:buy milk" +a\ b 'x "y"'"#),
            toks(&["project:Home", "description:buy milk", "+a b", "x \"y\""])
        );
        assert_eq!(tokenize("  "), Vec::<String>::new());
    }

    #[test]
    fn test_to_defaults() {
        let (defaults, malformed) = to_defaults(&toks(&[
            "project:Home",
            "+work",
            "+PENDING",
            "-later",
            "priority:H",
            "due.before:today",
            "(",
        ]));
        assert_eq!(defaults.project, Some(Some("Home".to_string())));
        assert_eq!(defaults.priority, Some(Some(Priority::High)));
        assert_eq!(defaults.tags.iter().collect::<Vec<_>>(), vec!["work"]);
        assert_eq!(defaults.due, None);
        assert!(malformed.is_empty());
    }

    #[test]
    fn test_empty_value_clears() {
        let (defaults, _) = to_defaults(&toks(&["project:"]));
        assert_eq!(defaults.project, Some(None));
    }

    #[test]
    fn test_malformed_due_reported() {
        let (defaults, malformed) = to_defaults(&toks(&["due:someday", "due:2015-08-08"]));
        assert_eq!(malformed, toks(&["someday"]));
        assert!(matches!(defaults.due, Some(Some(_))));
    }

    #[test]
    fn test_split_modstring() {
        assert_eq!(
            split_modstring("fix sink -- project:home +diy"),
            Some(("fix sink", "project:home +diy"))
        );
        assert_eq!(split_modstring("no mods here"), None);
    }
}
