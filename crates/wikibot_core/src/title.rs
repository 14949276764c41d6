use std::fmt;

use serde::{Deserialize, Serialize};

pub const CATEGORY_NAMESPACE: &str = "Category";
pub const USER_NAMESPACE: &str = "User";
pub const USER_TALK_NAMESPACE: &str = "User talk";

/// Namespace-qualified, normalized category title (`Category:Foo bar`).
///
/// Categories are looked up by this key everywhere; the graph never embeds
/// one category inside another, so cycles in the remote data are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryTitle(String);

impl CategoryTitle {
    /// Build a category title from user input. A leading `Category:` prefix
    /// (any case, any of `aliases`) is accepted and replaced by the canonical one.
    pub fn new(raw: &str) -> Self {
        Self::with_aliases(raw, &[])
    }

    pub fn with_aliases(raw: &str, aliases: &[String]) -> Self {
        let normalized = normalize_title(raw);
        let name = strip_category_prefix(&normalized, aliases).unwrap_or(&normalized);
        Self(format!(
            "{CATEGORY_NAMESPACE}:{}",
            capitalize_first(name.trim())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Title without the namespace prefix.
    pub fn name(&self) -> &str {
        self.0
            .split_once(':')
            .map(|(_, name)| name)
            .unwrap_or(&self.0)
    }

    /// `[[:Category:Foo|Foo]]`, a link to the category page rather than a tag.
    pub fn link(&self) -> String {
        format!("[[:{}|{}]]", self.0, self.name())
    }

    pub fn is_empty_name(&self) -> bool {
        self.name().is_empty()
    }
}

impl fmt::Display for CategoryTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace underscores, collapse whitespace, trim.
pub fn normalize_title(value: &str) -> String {
    let replaced = value.replace('_', " ");
    let mut output = String::with_capacity(replaced.len());
    let mut previous_was_space = false;
    for ch in replaced.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }
    output.trim().to_string()
}

pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn user_talk_title(username: &str) -> String {
    format!("{USER_TALK_NAMESPACE}:{}", normalize_title(username))
}

/// Talk page for an arbitrary page title. Talk pages map to themselves.
pub fn talk_page_title(title: &str) -> String {
    let title = normalize_title(title);
    if let Some((prefix, rest)) = title.split_once(':') {
        let prefix_lower = prefix.to_ascii_lowercase();
        if prefix_lower == "talk" || prefix_lower.ends_with(" talk") {
            return title;
        }
        if KNOWN_SUBJECT_NAMESPACES
            .iter()
            .any(|namespace| namespace.eq_ignore_ascii_case(prefix))
        {
            return format!("{} talk:{rest}", capitalize_first(prefix));
        }
    }
    format!("Talk:{title}")
}

pub fn is_talk_title(title: &str) -> bool {
    match title.split_once(':') {
        Some((prefix, _)) => {
            let prefix = prefix.to_ascii_lowercase();
            prefix == "talk" || prefix.ends_with(" talk")
        }
        None => false,
    }
}

const KNOWN_SUBJECT_NAMESPACES: &[&str] = &[
    "User",
    "Project",
    "Wikipedia",
    "File",
    "Image",
    "MediaWiki",
    "Template",
    "Help",
    "Category",
    "Portal",
];

fn strip_category_prefix<'a>(title: &'a str, aliases: &[String]) -> Option<&'a str> {
    let (prefix, rest) = title.split_once(':')?;
    let prefix = prefix.trim();
    let known = prefix.eq_ignore_ascii_case(CATEGORY_NAMESPACE)
        || aliases.iter().any(|alias| alias.eq_ignore_ascii_case(prefix));
    known.then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_title_normalizes_prefix_and_case() {
        assert_eq!(CategoryTitle::new("animals").as_str(), "Category:Animals");
        assert_eq!(
            CategoryTitle::new("category:Big_cats").as_str(),
            "Category:Big cats"
        );
        assert_eq!(
            CategoryTitle::new("  Category :  Birds   of  prey ").as_str(),
            "Category:Birds of prey"
        );
    }

    #[test]
    fn category_title_accepts_localized_alias() {
        let aliases = vec!["Kategorie".to_string()];
        assert_eq!(
            CategoryTitle::with_aliases("Kategorie:Tiere", &aliases).as_str(),
            "Category:Tiere"
        );
    }

    #[test]
    fn category_link_uses_leading_colon() {
        assert_eq!(
            CategoryTitle::new("Mammals").link(),
            "[[:Category:Mammals|Mammals]]"
        );
    }

    #[test]
    fn talk_page_mapping() {
        assert_eq!(talk_page_title("Cat"), "Talk:Cat");
        assert_eq!(talk_page_title("user:Alice"), "User talk:Alice");
        assert_eq!(talk_page_title("Talk:Cat"), "Talk:Cat");
        assert_eq!(user_talk_title("Some_user"), "User talk:Some user");
        assert!(is_talk_title("User talk:Bob"));
        assert!(!is_talk_title("Dog"));
    }
}
