//! In-memory wiki used by the unit tests.
//!
//! Category membership is derived from the stored page texts, so edits made
//! through [`WikiWriteApi`] show up in later fetches.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};

use crate::api::{
    EditBase, NewUserEvent, NewUserLogQuery, RemotePage, UserInfo, WikiReadApi, WikiWriteApi,
};
use crate::family::Site;
use crate::title::{CATEGORY_NAMESPACE, CategoryTitle};
use crate::wikitext::WikitextRules;

#[derive(Debug, Default)]
pub(crate) struct MockWiki {
    /// Pages in creation order; category listings follow this order.
    pub pages: Vec<(String, String)>,
    /// Revision counter per page, bumped on every save.
    pub revisions: BTreeMap<String, u32>,
    /// Text another editor saves right after the next read of the page.
    pub racing_edits: BTreeMap<String, String>,
    pub links: BTreeMap<String, Vec<String>>,
    pub new_users: Vec<NewUserEvent>,
    pub users: BTreeMap<String, UserInfo>,
    /// `(title, summary, minor)` per saved edit.
    pub edits: Vec<(String, String, bool)>,
    pub deleted: Vec<(String, String)>,
    pub logins: Vec<String>,
    pub conflicting_titles: BTreeSet<String>,
    pub failing_titles: BTreeSet<String>,
    /// Pages whose reads fail with a server error.
    pub unreadable_titles: BTreeSet<String>,
    pub children_fetches: BTreeMap<CategoryTitle, usize>,
    pub parent_fetches: BTreeMap<String, usize>,
    pub log_queries: Vec<NewUserLogQuery>,
    pub requests: usize,
}

impl MockWiki {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(mut self, title: &str, text: &str) -> Self {
        self.put(title, text);
        self
    }

    pub(crate) fn put(&mut self, title: &str, text: &str) {
        *self.revisions.entry(title.to_string()).or_default() += 1;
        match self.pages.iter_mut().find(|(existing, _)| existing == title) {
            Some((_, content)) => *content = text.to_string(),
            None => self.pages.push((title.to_string(), text.to_string())),
        }
    }

    pub(crate) fn with_links(mut self, title: &str, targets: &[&str]) -> Self {
        self.links.insert(
            title.to_string(),
            targets.iter().map(|target| target.to_string()).collect(),
        );
        self
    }

    pub(crate) fn with_user(mut self, name: &str, edit_count: u64, blocked: bool) -> Self {
        self.users.insert(
            name.to_string(),
            UserInfo {
                name: name.to_string(),
                edit_count,
                blocked,
            },
        );
        self
    }

    pub(crate) fn text(&self, title: &str) -> Option<&str> {
        self.pages
            .iter()
            .find(|(existing, _)| existing == title)
            .map(|(_, content)| content.as_str())
    }

    pub(crate) fn edited_titles(&self) -> Vec<&str> {
        self.edits.iter().map(|(title, _, _)| title.as_str()).collect()
    }

    fn timestamp(&self, title: &str) -> String {
        let revision = self.revisions.get(title).copied().unwrap_or_default();
        format!("2026-01-01T00:00:{revision:02}Z")
    }

    fn race(&mut self, title: &str) {
        if let Some(text) = self.racing_edits.remove(title) {
            self.put(title, &text);
        }
    }

    fn rules() -> WikitextRules {
        match WikitextRules::new(&Site::default()) {
            Ok(rules) => rules,
            Err(error) => panic!("default wikitext rules must compile: {error}"),
        }
    }

    fn members(&self, category: &CategoryTitle) -> Vec<String> {
        let rules = Self::rules();
        self.pages
            .iter()
            .filter(|(_, text)| {
                rules
                    .category_links(text)
                    .iter()
                    .any(|link| &link.category == category)
            })
            .map(|(title, _)| title.clone())
            .collect()
    }
}

fn is_category_title(title: &str) -> bool {
    title
        .split_once(':')
        .is_some_and(|(prefix, _)| prefix == CATEGORY_NAMESPACE)
}

impl WikiReadApi for MockWiki {
    fn fetch_subcategories(&mut self, category: &CategoryTitle) -> Result<Vec<CategoryTitle>> {
        self.requests += 1;
        *self.children_fetches.entry(category.clone()).or_default() += 1;
        Ok(self
            .members(category)
            .iter()
            .filter(|title| is_category_title(title))
            .map(|title| CategoryTitle::new(title))
            .collect())
    }

    fn fetch_articles(&mut self, category: &CategoryTitle) -> Result<Vec<String>> {
        self.requests += 1;
        Ok(self
            .members(category)
            .into_iter()
            .filter(|title| !is_category_title(title))
            .collect())
    }

    fn fetch_parents(&mut self, title: &str) -> Result<Vec<CategoryTitle>> {
        self.requests += 1;
        *self.parent_fetches.entry(title.to_string()).or_default() += 1;
        Ok(self
            .text(title)
            .map(|text| {
                Self::rules()
                    .category_links(text)
                    .into_iter()
                    .map(|link| link.category)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn page_text(&mut self, title: &str) -> Result<Option<RemotePage>> {
        self.requests += 1;
        if self.unreadable_titles.contains(title) {
            bail!("MediaWiki API request failed with HTTP 500");
        }
        let page = self.text(title).map(|content| RemotePage {
            title: title.to_string(),
            page_id: 1,
            revision_id: i64::from(self.revisions.get(title).copied().unwrap_or_default()),
            timestamp: self.timestamp(title),
            content: content.to_string(),
        });
        self.race(title);
        Ok(page)
    }

    fn page_exists(&mut self, title: &str) -> Result<bool> {
        self.requests += 1;
        if self.unreadable_titles.contains(title) {
            bail!("MediaWiki API request failed with HTTP 500");
        }
        let exists = self.text(title).is_some();
        self.race(title);
        Ok(exists)
    }

    fn linked_pages(&mut self, title: &str) -> Result<Vec<String>> {
        self.requests += 1;
        Ok(self.links.get(title).cloned().unwrap_or_default())
    }

    fn backlinks(&mut self, title: &str) -> Result<Vec<String>> {
        self.requests += 1;
        Ok(self
            .links
            .iter()
            .filter(|(_, targets)| targets.iter().any(|target| target == title))
            .map(|(source, _)| source.clone())
            .collect())
    }

    fn new_user_log(&mut self, query: &NewUserLogQuery) -> Result<Vec<NewUserEvent>> {
        self.requests += 1;
        self.log_queries.push(query.clone());
        Ok(self.new_users.iter().take(query.limit).cloned().collect())
    }

    fn user_info(&mut self, username: &str) -> Result<Option<UserInfo>> {
        self.requests += 1;
        Ok(self.users.get(username).cloned())
    }

    fn request_count(&self) -> usize {
        self.requests
    }
}

impl WikiWriteApi for MockWiki {
    fn login(&mut self, username: &str, _password: &str) -> Result<()> {
        self.requests += 1;
        self.logins.push(username.to_string());
        Ok(())
    }

    fn edit_page(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        minor: bool,
        base: EditBase<'_>,
    ) -> Result<()> {
        self.requests += 1;
        if self.conflicting_titles.contains(title) {
            bail!("MediaWiki API error [editconflict]: Edit conflict.");
        }
        match base {
            EditBase::Overwrite => {}
            EditBase::Revision(timestamp) => {
                if self.text(title).is_none() {
                    bail!("MediaWiki API error [missingtitle]: The page you specified doesn't exist.");
                }
                if timestamp != self.timestamp(title) {
                    bail!("MediaWiki API error [editconflict]: Edit conflict.");
                }
            }
            EditBase::CreateOnly => {
                if self.text(title).is_some() {
                    bail!("MediaWiki API error [articleexists]: The article you tried to create has been created already.");
                }
            }
        }
        if self.failing_titles.contains(title) {
            bail!("MediaWiki API error [protectedpage]: This page has been protected.");
        }
        self.put(title, content);
        self.edits
            .push((title.to_string(), summary.to_string(), minor));
        Ok(())
    }

    fn delete_page(&mut self, title: &str, reason: &str) -> Result<()> {
        self.requests += 1;
        self.pages.retain(|(existing, _)| existing != title);
        self.deleted.push((title.to_string(), reason.to_string()));
        Ok(())
    }
}
