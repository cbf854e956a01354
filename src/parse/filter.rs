use crate::error::{ReconcileError, Result};
use crate::parse::modstring::tokenize;

/// Virtual tags every region filter starts with
pub const DEFAULT_REGION_VIRTUAL_TAGS: [&str; 2] = ["-DELETED", "-PARENT"];

/// Meta token that hides records already shown elsewhere in the document
pub const HIDE_VISIBLE: &str = "-VISIBLE";

/// A region filter after syntax processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFilter {
    pub tokens: Vec<String>,
    pub visible: bool,
}

/// Turn a region's filter string into store filter tokens.
///
/// The user tokens are wrapped in parentheses after the default virtual
/// tags. `@name` expands to the context definition returned by `context`,
/// `!+TAG` / `!-TAG` force a virtual tag, `!?TAG` removes both forms. When a
/// virtual tag and its complement both appear, the one coming from the
/// defaults is dropped.
pub fn process_filter(
    filter: &str,
    context: impl Fn(&str) -> Option<String>,
) -> Result<ProcessedFilter> {
    let mut tokens: Vec<String> = DEFAULT_REGION_VIRTUAL_TAGS
        .iter()
        .map(|t| t.to_string())
        .collect();
    tokens.push("(".into());
    tokens.extend(tokenize(filter));
    tokens.push(")".into());

    // Context expansion
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token.strip_prefix('@') {
            Some(name) => {
                let definition = context(name)
                    .ok_or_else(|| ReconcileError::UndefinedContext(name.to_string()))?;
                expanded.extend(tokenize(&definition));
            }
            None => expanded.push(token),
        }
    }
    let mut tokens = expanded;

    // Forced virtual tags
    let forced: Vec<String> = tokens
        .iter()
        .filter(|t| is_forced_virtual_tag(t))
        .cloned()
        .collect();
    let mut to_add = Vec::new();
    for token in &forced {
        let tag = &token[2..];
        for doomed in [token.clone(), format!("+{}", tag), format!("-{}", tag)] {
            remove_first(&mut tokens, &doomed);
        }
        match &token[..2] {
            "!+" => to_add.push(format!("+{}", tag)),
            "!-" => to_add.push(format!("-{}", tag)),
            _ => {}
        }
    }
    to_add.dedup();
    to_add.extend(tokens);
    let mut tokens = to_add;

    // A tag and its complement: the default one loses
    let virtual_tags: Vec<String> = tokens
        .iter()
        .filter(|t| is_virtual_tag_token(t))
        .cloned()
        .collect();
    let mut doomed = Vec::new();
    for token in &virtual_tags {
        let complement = complement_tag(token);
        if virtual_tags.contains(&complement) {
            if DEFAULT_REGION_VIRTUAL_TAGS.contains(&token.as_str()) {
                doomed.push(token.clone());
            }
            if DEFAULT_REGION_VIRTUAL_TAGS.contains(&complement.as_str()) {
                doomed.push(complement);
            }
        }
    }
    for token in doomed {
        remove_first(&mut tokens, &token);
    }

    let visible = !tokens.iter().any(|t| t == HIDE_VISIBLE);
    tokens.retain(|t| t != HIDE_VISIBLE);

    remove_empty_parens(&mut tokens);

    Ok(ProcessedFilter { tokens, visible })
}

fn is_forced_virtual_tag(token: &str) -> bool {
    (token.starts_with("!+") || token.starts_with("!-") || token.starts_with("!?"))
        && token.len() > 2
        && is_upper(&token[2..])
}

fn is_virtual_tag_token(token: &str) -> bool {
    (token.starts_with('+') || token.starts_with('-')) && token.len() > 1 && is_upper(&token[1..])
}

fn is_upper(s: &str) -> bool {
    s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase)
}

fn complement_tag(token: &str) -> String {
    let sign = if token.starts_with('-') { '+' } else { '-' };
    format!("{}{}", sign, &token[1..])
}

fn remove_first(tokens: &mut Vec<String>, token: &str) {
    if let Some(idx) = tokens.iter().position(|t| t == token) {
        tokens.remove(idx);
    }
}

fn remove_empty_parens(tokens: &mut Vec<String>) {
    while let Some(idx) = tokens
        .windows(2)
        .position(|pair| pair[0] == "(" && pair[1] == ")")
    {
        tokens.drain(idx..idx + 2);
    }
}
