//! Unattended category edits: move, remove and mass-add.
//!
//! Move and remove only touch direct members of the source category. A failed
//! member edit is recorded in the report and the batch carries on.

use anyhow::Result;

use crate::api::{EditBase, WikiWriteApi};
use crate::graph::{CategoryGraph, CopyOutcome, TagRewrite};
use crate::i18n::{self, message};
use crate::prompt::Prompt;
use crate::title::{CategoryTitle, capitalize_first, normalize_title};
use crate::wikitext::{CategoryLink, parse_redirect, sort_key_by_last_name};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub changed: Vec<String>,
    /// Members that were missing or no longer carried the tag.
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
    pub copy: Option<CopyOutcome>,
    pub deleted: bool,
}

impl BulkReport {
    /// Keep a failed follow-up check in the report so the member edits
    /// already applied are still returned.
    fn checked(&mut self, subject: &CategoryTitle, result: Result<bool>) -> Option<bool> {
        match result {
            Ok(answer) => Some(answer),
            Err(error) => {
                tracing::warn!(category = %subject, "{error:#}");
                self.errors.push(format!("{subject}: {error:#}"));
                None
            }
        }
    }

    fn record<A: WikiWriteApi>(
        &mut self,
        graph: &mut CategoryGraph<A>,
        page: &str,
        from: &CategoryTitle,
        to: Option<&CategoryTitle>,
        summary: &str,
    ) {
        match graph.rewrite_category(page, from, to, summary) {
            Ok(TagRewrite::Changed) => self.changed.push(page.to_string()),
            Ok(TagRewrite::NotTagged | TagRewrite::PageMissing) => self.skipped.push(page.to_string()),
            Err(error) => {
                tracing::warn!(page, "category edit failed: {error:#}");
                self.errors.push(format!("{page}: {error:#}"));
            }
        }
    }
}

fn rewrite_members<A: WikiWriteApi>(
    graph: &mut CategoryGraph<A>,
    report: &mut BulkReport,
    from: &CategoryTitle,
    to: Option<&CategoryTitle>,
    summary: &str,
) -> Result<()> {
    let articles = graph.articles(from)?;
    if articles.is_empty() {
        tracing::info!(category = %from, "there are no articles in category");
    }
    for article in &articles {
        report.record(graph, article, from, to, summary);
    }

    let subcategories = graph.subcategories(from)?;
    if subcategories.is_empty() {
        tracing::info!(category = %from, "there are no subcategories in category");
    }
    for subcategory in &subcategories {
        report.record(graph, subcategory.as_str(), from, to, summary);
    }
    Ok(())
}

/// Retag every direct member of `from` with `to`, then carry the category
/// page over and delete the old one once it is empty.
pub fn move_category<A: WikiWriteApi>(
    graph: &mut CategoryGraph<A>,
    from: &CategoryTitle,
    to: &CategoryTitle,
) -> Result<BulkReport> {
    let lang = graph.site().lang.clone();
    let summary = message(i18n::CATEGORY_CHANGE_SUMMARY, &lang, &[from.as_str()]);
    let mut report = BulkReport::default();
    rewrite_members(graph, &mut report, from, Some(to), &summary)?;

    let exists = graph.category_exists(from);
    if report.checked(from, exists) != Some(true) {
        return Ok(report);
    }
    let copy_summary = message(i18n::CATEGORY_COPY_SUMMARY, &lang, &[from.as_str()]);
    match graph.copy_category_page(from, to, &copy_summary) {
        Ok(CopyOutcome::Copied) => {
            report.copy = Some(CopyOutcome::Copied);
            let empty = graph.is_empty(from);
            match report.checked(from, empty) {
                None => {}
                Some(true) => {
                    let reason = message(i18n::DELETION_REASON_MOVE, &lang, &[to.as_str()]);
                    match graph.delete_category(from, &reason) {
                        Ok(()) => report.deleted = true,
                        Err(error) => {
                            tracing::warn!(category = %from, "delete failed: {error:#}");
                            report.errors.push(format!("{from}: {error:#}"));
                        }
                    }
                }
                Some(false) => {
                    tracing::warn!(category = %from, "category still has members, not deleting it");
                }
            }
        }
        Ok(outcome) => {
            if outcome == CopyOutcome::TargetExists {
                tracing::warn!("couldn't copy contents of {from} because {to} already exists");
            }
            report.copy = Some(outcome);
        }
        Err(error) => {
            tracing::warn!(category = %from, "copy failed: {error:#}");
            report.errors.push(format!("{to}: {error:#}"));
        }
    }
    Ok(report)
}

/// Drop the tag for `category` from every direct member, then delete the
/// category page if nothing is left in it.
pub fn remove_category<A: WikiWriteApi>(
    graph: &mut CategoryGraph<A>,
    category: &CategoryTitle,
) -> Result<BulkReport> {
    let lang = graph.site().lang.clone();
    let summary = message(i18n::CATEGORY_REMOVE_SUMMARY, &lang, &[category.as_str()]);
    let mut report = BulkReport::default();
    rewrite_members(graph, &mut report, category, None, &summary)?;

    let exists = graph.category_exists(category);
    if report.checked(category, exists) != Some(true) {
        return Ok(report);
    }
    let empty = graph.is_empty(category);
    if report.checked(category, empty) == Some(true) {
        let reason = message(i18n::DELETION_REASON_REMOVE, &lang, &[]);
        match graph.delete_category(category, &reason) {
            Ok(()) => report.deleted = true,
            Err(error) => {
                tracing::warn!(%category, "delete failed: {error:#}");
                report.errors.push(format!("{category}: {error:#}"));
            }
        }
    }
    Ok(report)
}

/// Where the mass-add bot takes its pages from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSource {
    /// Every page linked from a list page.
    LinksOn(String),
    /// Every page linking to a given page.
    LinksTo(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: Vec<String>,
    pub already_present: Vec<String>,
    pub declined: Vec<String>,
    /// Missing pages and redirects.
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

pub fn collect_pages<A: WikiWriteApi>(
    graph: &mut CategoryGraph<A>,
    source: &PageSource,
) -> Result<Vec<String>> {
    match source {
        PageSource::LinksOn(list_page) => {
            let api = graph.api_mut();
            match api.page_text(list_page)? {
                None => {
                    tracing::warn!(page = %list_page, "list page could not be loaded");
                    Ok(Vec::new())
                }
                Some(page) => {
                    let (is_redirect, target) = parse_redirect(&page.content);
                    if is_redirect {
                        tracing::warn!(
                            page = %list_page,
                            target = target.as_deref().unwrap_or(""),
                            "list page is a redirect"
                        );
                        return Ok(Vec::new());
                    }
                    api.linked_pages(list_page)
                }
            }
        }
        PageSource::LinksTo(referred) => graph.api_mut().backlinks(referred),
    }
}

/// Ask page by page whether to add `category_name`; `a` (confirmed) answers yes for the rest.
pub fn add_category<A: WikiWriteApi, P: Prompt>(
    graph: &mut CategoryGraph<A>,
    prompt: &mut P,
    pages: &[String],
    category_name: &str,
    sort_by_last_name: bool,
) -> Result<AddReport> {
    let name = capitalize_first(&normalize_title(category_name));
    let category = graph.category(&name);
    let lang = graph.site().lang.clone();
    let summary = message(i18n::CATEGORY_ADD_SUMMARY, &lang, &[category.as_str()]);
    let mut report = AddReport::default();
    prompt.say(&format!("  ==> {} pages to process", pages.len()));

    let mut add_all = false;
    for page in pages {
        if !add_all {
            match ask_add(prompt, page)? {
                AddAnswer::Yes => {}
                AddAnswer::No => {
                    report.declined.push(page.clone());
                    continue;
                }
                AddAnswer::All => add_all = true,
            }
        }

        let remote = match graph.api_mut().page_text(page) {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                prompt.say(&format!("{page} doesn't exist yet. Ignoring."));
                report.skipped.push(page.clone());
                continue;
            }
            Err(error) => {
                tracing::warn!(page = %page, "failed to load page: {error:#}");
                report.errors.push(format!("{page}: {error:#}"));
                continue;
            }
        };
        if let (true, target) = parse_redirect(&remote.content) {
            prompt.say(&format!(
                "WARNING: {page} is redirect to {}. Ignoring.",
                target.unwrap_or_default()
            ));
            report.skipped.push(page.clone());
            continue;
        }

        let mut links = graph.rules().category_links(&remote.content);
        prompt.say("Current categories:");
        for link in &links {
            prompt.say(&format!("* {}", link.category));
        }
        if links.iter().any(|link| link.category == category) {
            prompt.say(&format!("{page} is already in {category}."));
            report.already_present.push(page.clone());
            continue;
        }

        let sort_key = sort_by_last_name.then(|| sort_key_by_last_name(page)).flatten();
        prompt.say(&format!("Adding {}", category.link()));
        links.push(CategoryLink::with_sort_key(category.clone(), sort_key));
        let updated = graph.rules().replace_category_links(&remote.content, &links);
        let base = EditBase::Revision(&remote.timestamp);
        match graph.api_mut().edit_page(page, &updated, &summary, false, base) {
            Ok(()) => report.added.push(page.clone()),
            Err(error) => {
                tracing::warn!(page = %page, "failed to save page: {error:#}");
                report.errors.push(format!("{page}: {error:#}"));
            }
        }
    }
    Ok(report)
}

enum AddAnswer {
    Yes,
    No,
    All,
}

fn ask_add<P: Prompt>(prompt: &mut P, page: &str) -> Result<AddAnswer> {
    loop {
        match prompt.ask(&format!("[[{page}]] [y/n/a(ll)]:"))?.trim() {
            "y" => return Ok(AddAnswer::Yes),
            "n" => return Ok(AddAnswer::No),
            "a" => {
                let confirmed = loop {
                    match prompt
                        .ask("This should be used if and only if you are sure that your links are correct! Are you sure? [y/n]:")?
                        .trim()
                    {
                        "y" => break true,
                        "n" => break false,
                        _ => {}
                    }
                };
                if confirmed {
                    return Ok(AddAnswer::All);
                }
            }
            _ => {}
        }
    }
}
