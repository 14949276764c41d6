use anyhow::{Result, bail};
use regex::Regex;
use similar::TextDiff;

use crate::api::{EditBase, WikiWriteApi, is_edit_conflict, is_page_exists};
use crate::i18n::{self, message};
use crate::prompt::Prompt;
use crate::title::{is_talk_title, talk_page_title};
use crate::wikitext::{WikitextRules, parse_redirect};

#[derive(Debug, Clone, Default)]
pub struct AddTextOptions {
    /// Text to add; a literal `\n` becomes a newline.
    pub text: String,
    pub summary: Option<String>,
    /// Skip pages whose current text matches.
    pub except: Option<Regex>,
    /// Put the text at the top instead of above the categories.
    pub up: bool,
    pub always: bool,
    /// Start missing pages from an empty text instead of skipping them.
    pub create: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddTextOutcome {
    Saved,
    Declined,
    Unchanged,
    Missing,
    Redirect,
    Excepted,
    Conflict,
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddTextReport {
    pub outcomes: Vec<(String, AddTextOutcome)>,
}

impl AddTextReport {
    pub fn saved(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == AddTextOutcome::Saved)
            .count()
    }
}

/// Map page titles onto their talk pages, dropping duplicates.
pub fn talk_pages(titles: &[String]) -> Vec<String> {
    let mut mapped = Vec::with_capacity(titles.len());
    for title in titles {
        let talk = if is_talk_title(title) {
            title.clone()
        } else {
            talk_page_title(title)
        };
        if !mapped.contains(&talk) {
            mapped.push(talk);
        }
    }
    mapped
}

/// New page text with `addition` placed at the top, or at the bottom above
/// category and interwiki links.
pub fn compose(rules: &WikitextRules, old_text: &str, addition: &str, up: bool) -> String {
    let addition = addition.replace("\\n", "\n");
    if up {
        return format!("{addition}\n{old_text}");
    }
    let categories = rules.category_links(old_text);
    let without_categories = rules.remove_category_links(old_text);
    let interwiki = rules.language_links(&without_categories);
    let mut body = rules.remove_language_links(&without_categories);
    body.push('\n');
    body.push_str(&addition);
    let with_categories = rules.replace_category_links(&body, &categories);
    rules.append_language_links(&with_categories, &interwiki)
}

pub fn add_text<A: WikiWriteApi, P: Prompt>(
    api: &mut A,
    rules: &WikitextRules,
    prompt: &mut P,
    lang: &str,
    pages: &[String],
    options: &AddTextOptions,
) -> Result<AddTextReport> {
    if options.text.trim().is_empty() {
        bail!("no text to add given");
    }
    let summary = match &options.summary {
        Some(summary) => summary.clone(),
        None => {
            let excerpt = options.text.chars().take(200).collect::<String>();
            message(i18n::ADD_TEXT_SUMMARY, lang, &[&excerpt])
        }
    };

    let mut always = options.always;
    let mut report = AddTextReport::default();
    for page in pages {
        let outcome = add_to_page(api, rules, prompt, page, options, &summary, &mut always)?;
        tracing::info!(page = %page, ?outcome, "add-text");
        report.outcomes.push((page.clone(), outcome));
    }
    Ok(report)
}

fn add_to_page<A: WikiWriteApi, P: Prompt>(
    api: &mut A,
    rules: &WikitextRules,
    prompt: &mut P,
    page: &str,
    options: &AddTextOptions,
    summary: &str,
    always: &mut bool,
) -> Result<AddTextOutcome> {
    prompt.say(&format!("Loading {page}..."));
    let remote = match api.page_text(page) {
        Ok(Some(remote)) => {
            if parse_redirect(&remote.content).0 {
                prompt.say(&format!("{page} is a redirect, skip!"));
                return Ok(AddTextOutcome::Redirect);
            }
            Some(remote)
        }
        Ok(None) if options.create => {
            prompt.say(&format!("{page} doesn't exist, creating it!"));
            None
        }
        Ok(None) => {
            prompt.say(&format!("{page} doesn't exist, skip!"));
            return Ok(AddTextOutcome::Missing);
        }
        Err(error) => {
            tracing::warn!(page, "failed to load page: {error:#}");
            return Ok(AddTextOutcome::Failed {
                error: format!("{error:#}"),
            });
        }
    };
    let old_text = remote
        .as_ref()
        .map(|remote| remote.content.clone())
        .unwrap_or_default();

    if let Some(except) = &options.except
        && except.is_match(&old_text)
    {
        prompt.say("Exception! regex (or word) used with --except is in the page. Skip!");
        return Ok(AddTextOutcome::Excepted);
    }

    let new_text = compose(rules, &old_text, &options.text, options.up);
    if new_text == old_text {
        return Ok(AddTextOutcome::Unchanged);
    }
    prompt.say(&format!(">>> {page} <<<"));
    let diff = TextDiff::from_lines(old_text.as_str(), new_text.as_str());
    prompt.say(
        &diff
            .unified_diff()
            .context_radius(3)
            .header(page, page)
            .to_string(),
    );

    if !*always {
        match prompt
            .choose("Do you want to accept these changes? ([y]es, [N]o, [a]ll)", &["y", "n", "a"], "n")?
            .as_str()
        {
            "a" => *always = true,
            "y" => {}
            _ => return Ok(AddTextOutcome::Declined),
        }
    }

    match api.edit_page(page, &new_text, summary, false, EditBase::from_read(remote.as_ref())) {
        Ok(()) => Ok(AddTextOutcome::Saved),
        Err(error) if is_edit_conflict(&error) || is_page_exists(&error) => {
            prompt.say("Edit conflict! skip!");
            Ok(AddTextOutcome::Conflict)
        }
        Err(error) => {
            tracing::warn!(page, "failed to save page: {error:#}");
            prompt.say(&format!("Error putting page: {error:#}"));
            Ok(AddTextOutcome::Failed {
                error: format!("{error:#}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Site;
    use crate::mock::MockWiki;
    use crate::prompt::ScriptedPrompt;

    fn rules() -> WikitextRules {
        WikitextRules::new(&Site::default()).expect("rules")
    }

    fn options(text: &str) -> AddTextOptions {
        AddTextOptions {
            text: text.to_string(),
            ..AddTextOptions::default()
        }
    }

    #[test]
    fn bottom_mode_keeps_categories_and_interwiki_last() {
        let old = "Body text.\n[[Category:Things]]\n[[de:Ding]]";
        let composed = compose(&rules(), old, "{{Stub}}\\nmore", false);
        assert_eq!(
            composed,
            "Body text.\n{{Stub}}\nmore\n\n[[Category:Things]]\n\n[[de:Ding]]"
        );
    }

    #[test]
    fn top_mode_prepends() {
        assert_eq!(compose(&rules(), "Body", "{{Notice}}", true), "{{Notice}}\nBody");
    }

    #[test]
    fn asks_before_saving_and_all_stops_asking() {
        let mut api = MockWiki::new()
            .with_page("One", "First.")
            .with_page("Two", "Second.")
            .with_page("Three", "Third.");
        let mut prompt = ScriptedPrompt::new(&["n", "a"]);
        let pages = ["One", "Two", "Three"].map(String::from).to_vec();

        let report = add_text(
            &mut api,
            &rules(),
            &mut prompt,
            "en",
            &pages,
            &options("{{Stub}}"),
        )
        .expect("add text");

        assert_eq!(report.outcomes[0].1, AddTextOutcome::Declined);
        assert_eq!(report.saved(), 2);
        assert_eq!(api.text("Two"), Some("Second.\n{{Stub}}"));
        assert_eq!(api.edits[0].1, "Bot: Adding {{Stub}}");
        assert!(prompt.transcript().contains("+{{Stub}}"));
    }

    #[test]
    fn skips_missing_redirect_and_excepted_pages() {
        let mut api = MockWiki::new()
            .with_page("Redirect", "#REDIRECT [[Target]]")
            .with_page("Tagged", "Has {{Stub}} already.");
        let mut prompt = ScriptedPrompt::new(&[]);
        let pages = ["Ghost", "Redirect", "Tagged"].map(String::from).to_vec();
        let mut opts = options("{{Stub}}");
        opts.always = true;
        opts.except = Some(Regex::new(r"\{\{[Ss]tub").expect("regex"));

        let report = add_text(&mut api, &rules(), &mut prompt, "en", &pages, &opts)
            .expect("add text");

        let outcomes = report
            .outcomes
            .iter()
            .map(|(_, outcome)| outcome.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            outcomes,
            vec![
                AddTextOutcome::Missing,
                AddTextOutcome::Redirect,
                AddTextOutcome::Excepted
            ]
        );
        assert!(api.edits.is_empty());
    }

    #[test]
    fn talk_mode_creates_missing_pages_and_survives_conflicts() {
        let mut api = MockWiki::new().with_page("Talk:Busy", "Ongoing.");
        api.racing_edits
            .insert("Talk:Busy".to_string(), "Ongoing, with a reply.".to_string());
        let mut prompt = ScriptedPrompt::new(&[]);
        let pages = talk_pages(&["Quiet".to_string(), "Busy".to_string(), "Talk:Busy".to_string()]);
        assert_eq!(pages, vec!["Talk:Quiet".to_string(), "Talk:Busy".to_string()]);
        let mut opts = options("Hello");
        opts.always = true;
        opts.create = true;
        opts.summary = Some("greeting".to_string());

        let report = add_text(&mut api, &rules(), &mut prompt, "en", &pages, &opts)
            .expect("add text");

        assert_eq!(report.outcomes[0].1, AddTextOutcome::Saved);
        assert_eq!(report.outcomes[1].1, AddTextOutcome::Conflict);
        assert_eq!(api.text("Talk:Quiet"), Some("\nHello"));
        assert_eq!(api.text("Talk:Busy"), Some("Ongoing, with a reply."));
        assert_eq!(api.edits[0].1, "greeting");
    }

    #[test]
    fn page_created_after_the_read_is_not_overwritten() {
        let mut api = MockWiki::new();
        api.racing_edits
            .insert("Talk:Fresh".to_string(), "Someone was faster.".to_string());
        let mut prompt = ScriptedPrompt::new(&[]);
        let mut opts = options("Hello");
        opts.always = true;
        opts.create = true;

        let report = add_text(
            &mut api,
            &rules(),
            &mut prompt,
            "en",
            &["Talk:Fresh".to_string()],
            &opts,
        )
        .expect("add text");

        assert_eq!(report.outcomes[0].1, AddTextOutcome::Conflict);
        assert_eq!(api.text("Talk:Fresh"), Some("Someone was faster."));
    }

    #[test]
    fn empty_text_is_rejected() {
        let mut api = MockWiki::new();
        let mut prompt = ScriptedPrompt::new(&[]);
        assert!(add_text(&mut api, &rules(), &mut prompt, "en", &[], &options("  ")).is_err());
    }
}
