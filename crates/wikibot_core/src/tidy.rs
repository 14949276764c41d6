//! Interactive reclassification of a category's articles.
//!
//! Each article walks the category graph one prompt at a time. Navigation
//! pushes a [`Frame`]; only the accept and remove answers edit the page, and
//! both end the walk for that article.

use anyhow::Result;

use crate::api::WikiWriteApi;
use crate::config::CategorySettings;
use crate::graph::{CategoryGraph, TagRewrite};
use crate::i18n::{self, message};
use crate::prompt::Prompt;
use crate::title::CategoryTitle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TidyOutcome {
    Moved { to: CategoryTitle },
    Removed,
    /// Accepted at the starting category, or the tag was already gone.
    Unchanged,
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TidyReport {
    pub outcomes: Vec<(String, TidyOutcome)>,
}

impl TidyReport {
    pub fn edits(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, TidyOutcome::Moved { .. } | TidyOutcome::Removed))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectWindow {
    pub initial_chars: usize,
    pub step_chars: usize,
}

impl From<&CategorySettings> for InspectWindow {
    fn from(settings: &CategorySettings) -> Self {
        Self {
            initial_chars: settings.inspect_initial_chars,
            step_chars: settings.inspect_step_chars,
        }
    }
}

impl Default for InspectWindow {
    fn default() -> Self {
        Self::from(&CategorySettings::default())
    }
}

/// One node of an article's walk: where it is and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    current: CategoryTitle,
    predecessor: Option<CategoryTitle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Choice {
    Accept,
    Down(usize),
    Up(usize),
    Jump,
    Remove,
    Skip,
    Inspect,
    Unknown,
}

fn parse_choice(raw: &str) -> Choice {
    match raw.trim() {
        "" => Choice::Accept,
        "n" => Choice::Skip,
        "j" => Choice::Jump,
        "r" => Choice::Remove,
        "?" => Choice::Inspect,
        other => {
            if let Some(index) = other.strip_prefix('u') {
                return index.parse().map(Choice::Up).unwrap_or(Choice::Unknown);
            }
            other.parse().map(Choice::Down).unwrap_or(Choice::Unknown)
        }
    }
}

/// Run the walk for every direct article of `category`.
pub fn tidy_category<A: WikiWriteApi, P: Prompt>(
    graph: &mut CategoryGraph<A>,
    prompt: &mut P,
    category: &CategoryTitle,
    window: InspectWindow,
) -> Result<TidyReport> {
    let summary = message(
        i18n::CATEGORY_CHANGE_SUMMARY,
        &graph.site().lang.clone(),
        &[category.as_str()],
    );
    let articles = graph.articles(category)?;
    let mut report = TidyReport::default();
    if articles.is_empty() {
        prompt.say(&format!("There are no articles in category {category}"));
        return Ok(report);
    }
    for article in &articles {
        prompt.say("");
        prompt.say(&"=".repeat(67));
        let outcome = match tidy_article(graph, prompt, article, category, &summary, window)? {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(article = %article, "tidy failed: {error:#}");
                prompt.say(&format!("Could not treat {article}: {error:#}"));
                TidyOutcome::Failed {
                    error: format!("{error:#}"),
                }
            }
        };
        report.outcomes.push((article.clone(), outcome));
    }
    Ok(report)
}

/// Walk one article. The outer error is the console going away and ends the
/// run; the inner one is a wiki failure for this article only.
fn tidy_article<A: WikiWriteApi, P: Prompt>(
    graph: &mut CategoryGraph<A>,
    prompt: &mut P,
    article: &str,
    original: &CategoryTitle,
    summary: &str,
    window: InspectWindow,
) -> Result<Result<TidyOutcome>> {
    let mut stack = vec![Frame {
        current: original.clone(),
        predecessor: None,
    }];

    while let Some(frame) = stack.last().cloned() {
        tracing::debug!(article, depth = stack.len(), category = %frame.current, "tidy step");
        let (subcategories, parents) = match neighbours(graph, &frame) {
            Ok(lists) => lists,
            Err(error) => return Ok(Err(error)),
        };
        show_menu(prompt, article, &frame.current, &subcategories, &parents);

        let mut inspect_chars = window.initial_chars;
        let next = loop {
            prompt.say("");
            match parse_choice(&prompt.ask("Choice:")?) {
                Choice::Skip => return Ok(Ok(TidyOutcome::Skipped)),
                Choice::Accept => {
                    prompt.say(&format!("Saving category as {}", frame.current));
                    if &frame.current == original {
                        prompt.say("No changes necessary.");
                        return Ok(Ok(TidyOutcome::Unchanged));
                    }
                    return Ok(Ok(apply(graph, prompt, article, original, Some(&frame.current), summary)));
                }
                Choice::Remove => {
                    return Ok(Ok(apply(graph, prompt, article, original, None, summary)));
                }
                Choice::Jump => {
                    let raw = prompt.ask("Please enter the category the article should be moved to:")?;
                    let target = graph.category(&raw);
                    if target.is_empty_name() {
                        continue;
                    }
                    break target;
                }
                Choice::Up(index) => match parents.get(index) {
                    Some(parent) => break parent.clone(),
                    None => continue,
                },
                Choice::Down(index) => match subcategories.get(index) {
                    Some(child) => break child.clone(),
                    None => continue,
                },
                Choice::Inspect => {
                    if let Err(error) = inspect(graph, prompt, article, inspect_chars) {
                        return Ok(Err(error));
                    }
                    inspect_chars += window.step_chars;
                }
                Choice::Unknown => {}
            }
        };
        stack.push(Frame {
            current: next,
            predecessor: Some(frame.current),
        });
    }
    Ok(Ok(TidyOutcome::Unchanged))
}

/// Subcategories of the frame's category and its parents, minus the one the
/// walk came from.
fn neighbours<A: WikiWriteApi>(
    graph: &mut CategoryGraph<A>,
    frame: &Frame,
) -> Result<(Vec<CategoryTitle>, Vec<CategoryTitle>)> {
    let subcategories = graph.subcategories(&frame.current)?;
    let parents = graph
        .parents(&frame.current)?
        .into_iter()
        .filter(|parent| Some(parent) != frame.predecessor.as_ref())
        .collect();
    Ok((subcategories, parents))
}

fn show_menu<P: Prompt>(
    prompt: &mut P,
    article: &str,
    current: &CategoryTitle,
    subcategories: &[CategoryTitle],
    parents: &[CategoryTitle],
) {
    prompt.say("");
    prompt.say(&format!("Treating page {article}, currently in category {current}"));
    prompt.say("");
    if subcategories.is_empty() {
        prompt.say("This category has no subcategories.");
        prompt.say("");
    }
    if parents.is_empty() {
        prompt.say("This category has no supercategories.");
        prompt.say("");
    }
    for (index, parent) in parents.iter().enumerate() {
        prompt.say(&format!("u{index} - Move up to {parent}"));
    }
    for (index, child) in subcategories.iter().enumerate() {
        prompt.say(&format!("{index:>2} - Move down to {child}"));
    }
    prompt.say(" j - Jump to another category");
    prompt.say(" n - Skip this article");
    prompt.say(" r - Remove this category tag");
    prompt.say(" ? - Read the page");
    prompt.say(&format!("Enter - Save category as {current}"));
}

fn inspect<A: WikiWriteApi, P: Prompt>(
    graph: &mut CategoryGraph<A>,
    prompt: &mut P,
    article: &str,
    chars: usize,
) -> Result<()> {
    prompt.say("");
    let Some(page) = graph.api_mut().page_text(article)? else {
        prompt.say(&format!("{article} does not exist."));
        return Ok(());
    };
    let shown = page.content.chars().take(chars).collect::<String>();
    prompt.say(&shown);
    if page.content.chars().count() > chars {
        prompt.say("");
        prompt.say("Original categories: ");
        for link in graph.rules().category_links(&page.content) {
            prompt.say(&format!("* {}", link.category));
        }
    }
    Ok(())
}

fn apply<A: WikiWriteApi, P: Prompt>(
    graph: &mut CategoryGraph<A>,
    prompt: &mut P,
    article: &str,
    original: &CategoryTitle,
    to: Option<&CategoryTitle>,
    summary: &str,
) -> TidyOutcome {
    match graph.rewrite_category(article, original, to, summary) {
        Ok(TagRewrite::Changed) => match to {
            Some(target) => TidyOutcome::Moved { to: target.clone() },
            None => TidyOutcome::Removed,
        },
        Ok(TagRewrite::NotTagged) => {
            prompt.say(&format!("{article} is no longer in {original}."));
            TidyOutcome::Unchanged
        }
        Ok(TagRewrite::PageMissing) => {
            prompt.say(&format!("{article} does not exist."));
            TidyOutcome::Unchanged
        }
        Err(error) => {
            tracing::warn!(article, "tidy edit failed: {error:#}");
            prompt.say(&format!("Could not save {article}: {error:#}"));
            TidyOutcome::Failed {
                error: format!("{error:#}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CategoryCache;
    use crate::family::Site;
    use crate::mock::MockWiki;
    use crate::prompt::ScriptedPrompt;
    use std::path::Path;

    fn animals() -> CategoryGraph<MockWiki> {
        let api = MockWiki::new()
            .with_page("Category:Mammals", "[[Category:Animals]]")
            .with_page("Category:Birds", "[[Category:Animals]]")
            .with_page("Cat", "Meow meow meow.\n[[Category:Animals]]\n[[Category:Pets]]");
        CategoryGraph::new(
            api,
            CategoryCache::empty(Path::new("unused.gz")),
            Site::default(),
        )
        .expect("graph")
    }

    #[test]
    fn descend_then_accept_moves_the_tag() {
        let mut graph = animals();
        let mut prompt = ScriptedPrompt::new(&["0", ""]);

        let report = tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        )
        .expect("tidy");

        assert_eq!(
            report.outcomes,
            vec![(
                "Cat".to_string(),
                TidyOutcome::Moved {
                    to: CategoryTitle::new("Mammals")
                }
            )]
        );
        assert_eq!(
            graph.api().text("Cat"),
            Some("Meow meow meow.\n[[Category:Mammals]]\n[[Category:Pets]]")
        );
        assert_eq!(graph.api().edits.len(), 1);
        assert_eq!(graph.api().edits[0].1, "Robot: Changing Category:Animals");
    }

    #[test]
    fn navigation_never_edits_until_a_terminal_answer() {
        let mut graph = animals();
        // Down to Mammals, jump to Birds, up to Animals, read, then remove.
        let mut prompt = ScriptedPrompt::new(&["bogus", "9", "0", "j", "Birds", "u0", "?", "r"]);

        let report = tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        )
        .expect("tidy");

        assert_eq!(report.outcomes[0].1, TidyOutcome::Removed);
        assert_eq!(graph.api().edits.len(), 1);
        assert_eq!(
            graph.api().text("Cat"),
            Some("Meow meow meow.\n[[Category:Pets]]")
        );
        assert_eq!(prompt.remaining(), 0);
    }

    #[test]
    fn parent_list_leaves_out_the_category_we_came_from() {
        let mut graph = animals();
        let mut prompt = ScriptedPrompt::new(&["1", "n"]);

        tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        )
        .expect("tidy");

        let transcript = prompt.transcript();
        assert!(transcript.contains(" 1 - Move down to Category:Birds"));
        assert!(transcript.contains("Treating page Cat, currently in category Category:Birds"));
        assert!(!transcript.contains("u0 - Move up to Category:Animals"));
        assert!(graph.api().edits.is_empty());
    }

    #[test]
    fn accepting_the_starting_category_changes_nothing() {
        let mut graph = animals();
        let mut prompt = ScriptedPrompt::new(&[""]);

        let report = tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        )
        .expect("tidy");

        assert_eq!(report.outcomes[0].1, TidyOutcome::Unchanged);
        assert_eq!(report.edits(), 0);
        assert!(prompt.transcript().contains("No changes necessary."));
    }

    #[test]
    fn inspect_shows_a_growing_prefix() {
        let mut graph = animals();
        let mut prompt = ScriptedPrompt::new(&["?", "?", "n"]);
        let window = InspectWindow {
            initial_chars: 5,
            step_chars: 3,
        };

        tidy_category(&mut graph, &mut prompt, &CategoryTitle::new("Animals"), window)
            .expect("tidy");

        assert!(prompt.output.iter().any(|line| line == "Meow "));
        assert!(prompt.output.iter().any(|line| line == "Meow meo"));
        assert!(prompt.transcript().contains("Original categories: "));
        assert!(prompt.transcript().contains("* Category:Pets"));
    }

    #[test]
    fn failed_save_is_reported_and_next_article_continues() {
        let mut graph = animals();
        graph.api_mut().put("Dog", "Woof.\n[[Category:Animals]]");
        graph.api_mut().conflicting_titles.insert("Cat".to_string());
        let mut prompt = ScriptedPrompt::new(&["0", "", "r"]);

        let report = tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        )
        .expect("tidy");

        assert!(matches!(report.outcomes[0].1, TidyOutcome::Failed { .. }));
        assert_eq!(report.outcomes[1], ("Dog".to_string(), TidyOutcome::Removed));
        assert_eq!(graph.api().text("Dog"), Some("Woof."));
    }

    #[test]
    fn read_failure_only_fails_that_article() {
        let mut graph = animals();
        graph.api_mut().put("Dog", "Woof.\n[[Category:Animals]]");
        graph.api_mut().unreadable_titles.insert("Cat".to_string());
        let mut prompt = ScriptedPrompt::new(&["?", "0", ""]);

        let report = tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        )
        .expect("tidy");

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].0, "Cat");
        assert!(matches!(
            &report.outcomes[0].1,
            TidyOutcome::Failed { error } if error.contains("HTTP 500")
        ));
        assert_eq!(
            report.outcomes[1],
            (
                "Dog".to_string(),
                TidyOutcome::Moved {
                    to: CategoryTitle::new("Mammals")
                }
            )
        );
        assert_eq!(graph.api().text("Dog"), Some("Woof.\n[[Category:Mammals]]"));
        assert_eq!(prompt.remaining(), 0);
    }

    #[test]
    fn closed_console_still_ends_the_run() {
        let mut graph = animals();
        let mut prompt = ScriptedPrompt::new(&[]);

        let result = tidy_category(
            &mut graph,
            &mut prompt,
            &CategoryTitle::new("Animals"),
            InspectWindow::default(),
        );

        assert!(result.is_err());
        assert!(graph.api().edits.is_empty());
    }

    #[test]
    fn choices_parse_like_the_menu_says() {
        assert_eq!(parse_choice(""), Choice::Accept);
        assert_eq!(parse_choice("u2"), Choice::Up(2));
        assert_eq!(parse_choice("12"), Choice::Down(12));
        assert_eq!(parse_choice("ux"), Choice::Unknown);
        assert_eq!(parse_choice("q"), Choice::Unknown);
    }
}
