use anyhow::{Context, Result};

use crate::api::{EditBase, WikiReadApi, WikiWriteApi, is_page_exists};
use crate::cache::{CategoryCache, CategoryContents};
use crate::family::Site;
use crate::title::CategoryTitle;
use crate::wikitext::WikitextRules;

/// Result of rewriting one page's category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagRewrite {
    Changed,
    /// The page carries no tag for the source category.
    NotTagged,
    PageMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    SourceMissing,
    /// The destination page already exists; nothing was written.
    TargetExists,
}

/// Category graph backed by the remote wiki and the snapshot cache.
///
/// Membership and parent reads go through the cache. Existence and emptiness
/// checks always ask the wiki, since bulk edits change them mid-run.
pub struct CategoryGraph<A> {
    api: A,
    cache: CategoryCache,
    site: Site,
    rules: WikitextRules,
}

impl<A> CategoryGraph<A> {
    pub fn new(api: A, cache: CategoryCache, site: Site) -> Result<Self> {
        let rules = WikitextRules::new(&site)?;
        Ok(Self {
            api,
            cache,
            site,
            rules,
        })
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn rules(&self) -> &WikitextRules {
        &self.rules
    }

    pub fn cache(&self) -> &CategoryCache {
        &self.cache
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// Category from user input, honouring the site's localized namespace names.
    pub fn category(&self, raw: &str) -> CategoryTitle {
        CategoryTitle::with_aliases(raw, &self.site.category_aliases)
    }
}

impl<A: WikiReadApi> CategoryGraph<A> {
    pub fn contents(&mut self, category: &CategoryTitle) -> Result<&CategoryContents> {
        self.cache.children(&mut self.api, category)
    }

    pub fn subcategories(&mut self, category: &CategoryTitle) -> Result<Vec<CategoryTitle>> {
        Ok(self.contents(category)?.subcategories.clone())
    }

    pub fn articles(&mut self, category: &CategoryTitle) -> Result<Vec<String>> {
        Ok(self.contents(category)?.articles.clone())
    }

    pub fn parents(&mut self, category: &CategoryTitle) -> Result<Vec<CategoryTitle>> {
        Ok(self.cache.parents(&mut self.api, category)?.to_vec())
    }

    pub fn category_exists(&mut self, category: &CategoryTitle) -> Result<bool> {
        self.api
            .page_exists(category.as_str())
            .with_context(|| format!("failed to check whether {category} exists"))
    }

    /// Whether `category` currently has no members at all.
    pub fn is_empty(&mut self, category: &CategoryTitle) -> Result<bool> {
        let articles = self
            .api
            .fetch_articles(category)
            .with_context(|| format!("failed to list articles of {category}"))?;
        if !articles.is_empty() {
            return Ok(false);
        }
        let subcategories = self
            .api
            .fetch_subcategories(category)
            .with_context(|| format!("failed to list subcategories of {category}"))?;
        Ok(subcategories.is_empty())
    }
}

impl<A: WikiWriteApi> CategoryGraph<A> {
    /// Point `page`'s tag for `from` at `to`, or drop the tag when `to` is `None`.
    pub fn rewrite_category(
        &mut self,
        page: &str,
        from: &CategoryTitle,
        to: Option<&CategoryTitle>,
        summary: &str,
    ) -> Result<TagRewrite> {
        let Some(remote) = self
            .api
            .page_text(page)
            .with_context(|| format!("failed to load {page}"))?
        else {
            tracing::info!(page, "page does not exist, skipping");
            return Ok(TagRewrite::PageMissing);
        };
        let Some(updated) = self.rules.change_category(&remote.content, from, to) else {
            tracing::info!(page, category = %from, "page is not in category, skipping");
            return Ok(TagRewrite::NotTagged);
        };
        self.api
            .edit_page(page, &updated, summary, false, EditBase::Revision(&remote.timestamp))
            .with_context(|| format!("failed to save {page}"))?;
        match to {
            Some(target) => tracing::info!(page, from = %from, to = %target, "moved category tag"),
            None => tracing::info!(page, category = %from, "removed category tag"),
        }
        Ok(TagRewrite::Changed)
    }

    /// Copy the description of `from` to the page `to`, refusing to overwrite.
    pub fn copy_category_page(
        &mut self,
        from: &CategoryTitle,
        to: &CategoryTitle,
        summary: &str,
    ) -> Result<CopyOutcome> {
        let Some(source) = self
            .api
            .page_text(from.as_str())
            .with_context(|| format!("failed to load {from}"))?
        else {
            return Ok(CopyOutcome::SourceMissing);
        };
        if self.category_exists(to)? {
            return Ok(CopyOutcome::TargetExists);
        }
        match self
            .api
            .edit_page(to.as_str(), &source.content, summary, false, EditBase::CreateOnly)
        {
            Ok(()) => {}
            Err(error) if is_page_exists(&error) => {
                tracing::info!(category = %to, "created by someone else while copying");
                return Ok(CopyOutcome::TargetExists);
            }
            Err(error) => return Err(error.context(format!("failed to create {to}"))),
        }
        tracing::info!(from = %from, to = %to, "copied category description");
        Ok(CopyOutcome::Copied)
    }

    pub fn delete_category(&mut self, category: &CategoryTitle, reason: &str) -> Result<()> {
        self.api
            .delete_page(category.as_str(), reason)
            .with_context(|| format!("failed to delete {category}"))?;
        tracing::info!(%category, reason, "deleted category page");
        Ok(())
    }
}
