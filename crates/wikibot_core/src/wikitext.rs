use std::ops::Range;

use anyhow::{Context, Result};
use regex::Regex;

use crate::family::{Family, Site};
use crate::title::{CategoryTitle, normalize_title};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    pub category: CategoryTitle,
    pub sort_key: Option<String>,
}

impl CategoryLink {
    pub fn new(category: CategoryTitle) -> Self {
        Self {
            category,
            sort_key: None,
        }
    }

    pub fn with_sort_key(category: CategoryTitle, sort_key: Option<String>) -> Self {
        Self { category, sort_key }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterwikiLink {
    pub lang: String,
    pub title: String,
}

#[derive(Debug)]
struct TagMatch {
    span: Range<usize>,
    link: CategoryLink,
}

/// Compiled category and interwiki link patterns for one site.
#[derive(Debug, Clone)]
pub struct WikitextRules {
    category: Regex,
    interwiki: Regex,
    family: Family,
    category_namespace: String,
    aliases: Vec<String>,
}

impl WikitextRules {
    pub fn new(site: &Site) -> Result<Self> {
        let mut namespaces = vec![regex::escape(crate::title::CATEGORY_NAMESPACE)];
        namespaces.extend(site.category_aliases.iter().map(|alias| regex::escape(alias)));
        let pattern = format!(
            r"\[\[[ \t]*(?i:{})[ \t]*:[ \t]*([^\[\]|\n]+?)[ \t]*(?:\|([^\[\]\n]*))?\]\]",
            namespaces.join("|")
        );
        let category = Regex::new(&pattern).context("failed to compile category link pattern")?;
        let interwiki = Regex::new(r"\[\[([a-z][a-z-]{1,11})[ \t]*:[ \t]*([^\[\]|\n]+?)[ \t]*\]\]")
            .context("failed to compile interwiki link pattern")?;
        Ok(Self {
            category,
            interwiki,
            family: site.family,
            category_namespace: site.category_namespace().to_string(),
            aliases: site.category_aliases.clone(),
        })
    }

    pub fn category_links(&self, text: &str) -> Vec<CategoryLink> {
        self.category_matches(text)
            .into_iter()
            .map(|item| item.link)
            .collect()
    }

    /// Point every tag for `from` at `to`, or drop it when `to` is `None`.
    /// Sort keys are kept and all other text is left as is.
    /// Returns `None` when the text carries no tag for `from`.
    pub fn change_category(
        &self,
        text: &str,
        from: &CategoryTitle,
        to: Option<&CategoryTitle>,
    ) -> Option<String> {
        let matches = self.category_matches(text);
        if !matches.iter().any(|item| &item.link.category == from) {
            return None;
        }
        // Never leave two tags for the destination behind.
        let to = to.filter(|target| {
            *target == from || !matches.iter().any(|item| &item.link.category == *target)
        });

        let mut output = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for item in matches.iter().filter(|item| &item.link.category == from) {
            if item.span.start < cursor {
                continue;
            }
            match to {
                Some(target) => {
                    output.push_str(&text[cursor..item.span.start]);
                    let link = CategoryLink::with_sort_key(target.clone(), item.link.sort_key.clone());
                    output.push_str(&self.render_category(&link));
                    cursor = item.span.end;
                }
                None => {
                    let span = widen_to_line(text, &item.span);
                    output.push_str(&text[cursor..span.start.max(cursor)]);
                    cursor = span.end;
                }
            }
        }
        output.push_str(&text[cursor..]);
        Some(output)
    }

    pub fn remove_category_links(&self, text: &str) -> String {
        let spans = self
            .category_matches(text)
            .into_iter()
            .map(|item| item.span)
            .collect::<Vec<_>>();
        remove_spans(text, &spans)
    }

    /// Strip every category tag and append `links` at the end, above interwiki links.
    pub fn replace_category_links(&self, text: &str, links: &[CategoryLink]) -> String {
        let interwiki = self.language_links(text);
        let stripped = self.remove_language_links(&self.remove_category_links(text));
        let mut output = stripped.trim_end().to_string();
        if !links.is_empty() {
            if !output.is_empty() {
                output.push_str("\n\n");
            }
            let rendered = links
                .iter()
                .map(|link| self.render_category(link))
                .collect::<Vec<_>>();
            output.push_str(&rendered.join("\n"));
        }
        self.append_language_links(&output, &interwiki)
    }

    pub fn render_category(&self, link: &CategoryLink) -> String {
        match &link.sort_key {
            Some(key) => format!(
                "[[{}:{}|{}]]",
                self.category_namespace,
                link.category.name(),
                key
            ),
            None => format!("[[{}:{}]]", self.category_namespace, link.category.name()),
        }
    }

    pub fn language_links(&self, text: &str) -> Vec<InterwikiLink> {
        self.interwiki_matches(text)
            .into_iter()
            .map(|(_, link)| link)
            .collect()
    }

    pub fn remove_language_links(&self, text: &str) -> String {
        let spans = self
            .interwiki_matches(text)
            .into_iter()
            .map(|(span, _)| span)
            .collect::<Vec<_>>();
        remove_spans(text, &spans)
    }

    pub fn append_language_links(&self, text: &str, links: &[InterwikiLink]) -> String {
        if links.is_empty() {
            return text.to_string();
        }
        let mut output = text.trim_end().to_string();
        if !output.is_empty() {
            output.push_str("\n\n");
        }
        let rendered = links
            .iter()
            .map(|link| format!("[[{}:{}]]", link.lang, link.title))
            .collect::<Vec<_>>();
        output.push_str(&rendered.join("\n"));
        output
    }

    fn category_matches(&self, text: &str) -> Vec<TagMatch> {
        self.category
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let name = normalize_title(captures.get(1)?.as_str());
                if name.is_empty() {
                    return None;
                }
                let sort_key = captures
                    .get(2)
                    .map(|key| key.as_str().to_string())
                    .filter(|key| !key.is_empty());
                Some(TagMatch {
                    span: whole.range(),
                    link: CategoryLink::with_sort_key(
                        CategoryTitle::with_aliases(&name, &self.aliases),
                        sort_key,
                    ),
                })
            })
            .collect()
    }

    fn interwiki_matches(&self, text: &str) -> Vec<(Range<usize>, InterwikiLink)> {
        self.interwiki
            .captures_iter(text)
            .filter_map(|captures| {
                let whole = captures.get(0)?;
                let lang = captures.get(1)?.as_str();
                if !self.family.is_known_language(lang) {
                    return None;
                }
                Some((
                    whole.range(),
                    InterwikiLink {
                        lang: lang.to_string(),
                        title: captures.get(2)?.as_str().to_string(),
                    },
                ))
            })
            .collect()
    }
}

/// `#REDIRECT [[Target]]` detection; returns the target when the page is a redirect.
pub fn parse_redirect(content: &str) -> (bool, Option<String>) {
    let trimmed = content.trim();
    if !trimmed.to_ascii_uppercase().starts_with("#REDIRECT") {
        return (false, None);
    }
    if let Some(start) = trimmed.find("[[")
        && let Some(end) = trimmed[start + 2..].find("]]")
    {
        let target = trimmed[start + 2..start + 2 + end].trim().to_string();
        if !target.is_empty() {
            return (true, Some(target));
        }
    }
    (true, None)
}

/// Sort key ordering people by last name: `Alexandre Dumas (senior)` becomes
/// `Dumas, Alexandre`. Single-word titles get no key.
pub fn sort_key_by_last_name(page_title: &str) -> Option<String> {
    let mut name = page_title.trim();
    if name.ends_with(')')
        && let Some(open) = name.find(" (")
        && open > 0
    {
        name = &name[..open];
    }
    let words = name.split(' ').filter(|word| !word.is_empty()).collect::<Vec<_>>();
    let (last, rest) = words.split_last()?;
    if rest.is_empty() {
        return None;
    }
    Some(format!("{last}, {}", rest.join(" ")))
}

fn widen_to_line(text: &str, span: &Range<usize>) -> Range<usize> {
    let starts_line = span.start == 0 || text[..span.start].ends_with('\n');
    let rest = &text[span.end..];
    if starts_line && rest.starts_with('\n') {
        return span.start..span.end + 1;
    }
    if starts_line && rest.starts_with("\r\n") {
        return span.start..span.end + 2;
    }
    if rest.is_empty() && span.start > 0 && text[..span.start].ends_with('\n') {
        return span.start - 1..span.end;
    }
    span.clone()
}

fn remove_spans(text: &str, spans: &[Range<usize>]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for span in spans {
        if span.start < cursor {
            continue;
        }
        let widened = widen_to_line(text, span);
        output.push_str(&text[cursor..widened.start.max(cursor)]);
        cursor = widened.end;
    }
    output.push_str(&text[cursor..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> WikitextRules {
        WikitextRules::new(&Site::default()).expect("rules")
    }

    #[test]
    fn category_links_parse_titles_and_sort_keys() {
        let text = "Body [[:Category:Linked]]\n[[Category:Big_cats|Lion]]\n[[category: birds ]]";
        let links = rules().category_links(text);
        assert_eq!(
            links,
            vec![
                CategoryLink::with_sort_key(CategoryTitle::new("Big cats"), Some("Lion".to_string())),
                CategoryLink::new(CategoryTitle::new("Birds")),
            ]
        );
    }

    #[test]
    fn localized_namespace_is_recognized() {
        let site = Site::new(Family::Wikipedia, "de")
            .with_category_aliases(vec!["Kategorie".to_string()]);
        let rules = WikitextRules::new(&site).expect("rules");
        let links = rules.category_links("[[Kategorie:Tiere]] [[Category:Fauna]]");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].category.as_str(), "Category:Tiere");
        assert_eq!(
            rules.render_category(&links[1]),
            "[[Kategorie:Fauna]]"
        );
    }

    #[test]
    fn removing_one_tag_preserves_the_others() {
        let text = "Cats purr.\n[[Category:X]]\n[[Category:Y]]\n[[Category:Z|z]]";
        let updated = rules()
            .change_category(text, &CategoryTitle::new("X"), None)
            .expect("tag present");
        assert_eq!(updated, "Cats purr.\n[[Category:Y]]\n[[Category:Z|z]]");
        let remaining = rules()
            .category_links(&updated)
            .into_iter()
            .map(|link| link.category.name().to_string())
            .collect::<Vec<_>>();
        assert_eq!(remaining, vec!["Y", "Z"]);
    }

    #[test]
    fn removing_the_last_tag_drops_its_line() {
        let text = "Cats purr.\n[[Category:Y]]\n[[Category:X]]";
        let updated = rules()
            .change_category(text, &CategoryTitle::new("X"), None)
            .expect("tag present");
        assert_eq!(updated, "Cats purr.\n[[Category:Y]]");
    }

    #[test]
    fn changing_a_tag_keeps_sort_key_and_position() {
        let text = "Intro [[Category:Animals|Cat]] outro\n[[Category:Pets]]";
        let updated = rules()
            .change_category(
                text,
                &CategoryTitle::new("Animals"),
                Some(&CategoryTitle::new("Mammals")),
            )
            .expect("tag present");
        assert_eq!(updated, "Intro [[Category:Mammals|Cat]] outro\n[[Category:Pets]]");
    }

    #[test]
    fn changing_into_an_existing_tag_does_not_duplicate() {
        let text = "[[Category:Animals]]\n[[Category:Mammals]]";
        let updated = rules()
            .change_category(
                text,
                &CategoryTitle::new("Animals"),
                Some(&CategoryTitle::new("Mammals")),
            )
            .expect("tag present");
        assert_eq!(updated, "[[Category:Mammals]]");
    }

    #[test]
    fn change_reports_absent_tag() {
        assert!(
            rules()
                .change_category("[[Category:Y]]", &CategoryTitle::new("X"), None)
                .is_none()
        );
    }

    #[test]
    fn replace_category_links_puts_tags_above_interwiki() {
        let text = "Body\n[[Category:Old]]\n[[de:Körper]]\n[[fr:Corps]]";
        let updated = rules().replace_category_links(
            text,
            &[
                CategoryLink::new(CategoryTitle::new("Old")),
                CategoryLink::new(CategoryTitle::new("New")),
            ],
        );
        assert_eq!(
            updated,
            "Body\n\n[[Category:Old]]\n[[Category:New]]\n\n[[de:Körper]]\n[[fr:Corps]]"
        );
    }

    #[test]
    fn interwiki_detection_ignores_unknown_prefixes() {
        let links = rules().language_links("[[de:Hund]] [[wikt:dog]] [[:fr:Chien]]");
        assert_eq!(
            links,
            vec![InterwikiLink {
                lang: "de".to_string(),
                title: "Hund".to_string()
            }]
        );
    }

    #[test]
    fn redirect_detection() {
        assert_eq!(
            parse_redirect("#redirect [[Target page]]"),
            (true, Some("Target page".to_string()))
        );
        assert_eq!(parse_redirect("Plain text"), (false, None));
    }

    #[test]
    fn sort_key_moves_last_name_first() {
        assert_eq!(
            sort_key_by_last_name("Alexandre Dumas (senior)").as_deref(),
            Some("Dumas, Alexandre")
        );
        assert_eq!(
            sort_key_by_last_name("John von Neumann").as_deref(),
            Some("Neumann, John von")
        );
        assert_eq!(sort_key_by_last_name("Plato"), None);
    }
}
