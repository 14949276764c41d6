use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DEFAULT_USER_AGENT, WikiConfig};
use crate::title::CategoryTitle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePage {
    pub title: String,
    pub page_id: i64,
    pub revision_id: i64,
    pub timestamp: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUserEvent {
    pub user: String,
    /// `create`, `create2`, `autocreate`, `byemail`.
    pub action: String,
    pub timestamp: String,
    pub user_hidden: bool,
}

impl NewUserEvent {
    pub fn is_auto_created(&self) -> bool {
        self.action == "autocreate"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub edit_count: u64,
    pub blocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUserLogQuery {
    pub limit: usize,
    /// MediaWiki timestamp; only accounts created at or before it are listed.
    pub start: Option<String>,
}

/// Read side of the remote wiki.
pub trait WikiReadApi {
    fn fetch_subcategories(&mut self, category: &CategoryTitle) -> Result<Vec<CategoryTitle>>;
    fn fetch_articles(&mut self, category: &CategoryTitle) -> Result<Vec<String>>;
    /// Categories the page (or category page) `title` is tagged with.
    fn fetch_parents(&mut self, title: &str) -> Result<Vec<CategoryTitle>>;
    fn page_text(&mut self, title: &str) -> Result<Option<RemotePage>>;
    fn page_exists(&mut self, title: &str) -> Result<bool>;
    fn linked_pages(&mut self, title: &str) -> Result<Vec<String>>;
    fn backlinks(&mut self, title: &str) -> Result<Vec<String>>;
    fn new_user_log(&mut self, query: &NewUserLogQuery) -> Result<Vec<NewUserEvent>>;
    fn user_info(&mut self, username: &str) -> Result<Option<UserInfo>>;
    fn request_count(&self) -> usize;
}

/// What the wiki must still look like for a save to go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditBase<'a> {
    /// Save whatever the page holds now.
    Overwrite,
    /// The save is rejected with `editconflict` when the page changed after
    /// the revision with this timestamp.
    Revision(&'a str),
    /// The save is rejected with `articleexists` when the page exists.
    CreateOnly,
}

impl<'a> EditBase<'a> {
    /// Base for rewriting a page that was just read, or creating it when the
    /// read found nothing.
    pub fn from_read(page: Option<&'a RemotePage>) -> Self {
        match page {
            Some(page) => Self::Revision(&page.timestamp),
            None => Self::CreateOnly,
        }
    }
}

pub trait WikiWriteApi: WikiReadApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn edit_page(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        minor: bool,
        base: EditBase<'_>,
    ) -> Result<()>;
    fn delete_page(&mut self, title: &str, reason: &str) -> Result<()>;
}

fn has_api_code(error: &anyhow::Error, code: &str) -> bool {
    let tag = format!("[{code}]");
    error.chain().any(|cause| cause.to_string().contains(&tag))
}

/// Whether a failed write was rejected because someone else saved first.
pub fn is_edit_conflict(error: &anyhow::Error) -> bool {
    has_api_code(error, "editconflict")
}

/// Whether a create-only write found the page already there.
pub fn is_page_exists(error: &anyhow::Error) -> bool {
    has_api_code(error, "articleexists")
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub category_aliases: Vec<String>,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &WikiConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            category_aliases: config.wiki.category_aliases.clone(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

impl Default for MediaWikiClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            category_aliases: Vec::new(),
            timeout_ms: 30_000,
            rate_limit_read_ms: 300,
            rate_limit_write_ms: 1_000,
            max_retries: 2,
            max_write_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("no MediaWiki API URL configured (set WIKI_API_URL or [wiki].api_url)");
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    fn request(&mut self, method: Method, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let builder = match method {
                Method::Get => self.client.get(base_url.clone()).query(&pairs),
                Method::Post => self.client.post(base_url.clone()).form(&pairs),
            };
            let response = builder
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            tracing::debug!(%status, attempt, "retrying MediaWiki request");
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }
                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    return check_api_error(payload);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        tracing::debug!(%error, attempt, "retrying MediaWiki request");
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn query(&mut self, params: &[(&str, String)]) -> Result<QueryResponse> {
        let response = self.request(Method::Get, params, false)?;
        serde_json::from_value(response).context("failed to decode MediaWiki query response")
    }

    /// Run a list/prop query, following `continue` until `collect` has seen every batch.
    fn query_all<F>(&mut self, params: Vec<(&'static str, String)>, continue_key: &'static str, mut collect: F) -> Result<()>
    where
        F: FnMut(QueryPayload) -> bool,
    {
        let mut continue_token: Option<String> = None;
        loop {
            let mut batch = params.clone();
            if let Some(token) = &continue_token {
                batch.push((continue_key, token.clone()));
            }
            let parsed = self.query(&batch)?;
            let keep_going = collect(parsed.query);
            continue_token = parsed
                .continuation
                .and_then(|cont| cont.get(continue_key).and_then(Value::as_str).map(ToString::to_string));
            if continue_token.is_none() || !keep_going {
                return Ok(());
            }
        }
    }

    fn category_members(&mut self, category: &CategoryTitle, member_type: &str) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let params = vec![
            ("action", "query".to_string()),
            ("list", "categorymembers".to_string()),
            ("cmtitle", category.as_str().to_string()),
            ("cmtype", member_type.to_string()),
            ("cmlimit", "500".to_string()),
        ];
        self.query_all(params, "cmcontinue", |query| {
            titles.extend(query.categorymembers.into_iter().map(|item| item.title));
            true
        })?;
        Ok(titles)
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let token = self
            .query(&[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
            ])?
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiReadApi for MediaWikiClient {
    fn fetch_subcategories(&mut self, category: &CategoryTitle) -> Result<Vec<CategoryTitle>> {
        let aliases = self.config.category_aliases.clone();
        Ok(self
            .category_members(category, "subcat")?
            .iter()
            .map(|title| CategoryTitle::with_aliases(title, &aliases))
            .collect())
    }

    fn fetch_articles(&mut self, category: &CategoryTitle) -> Result<Vec<String>> {
        self.category_members(category, "page|file")
    }

    fn fetch_parents(&mut self, title: &str) -> Result<Vec<CategoryTitle>> {
        let aliases = self.config.category_aliases.clone();
        let mut parents = Vec::new();
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "categories".to_string()),
            ("titles", title.to_string()),
            ("cllimit", "max".to_string()),
        ];
        self.query_all(params, "clcontinue", |query| {
            for page in query.pages {
                parents.extend(
                    page.categories
                        .iter()
                        .map(|item| CategoryTitle::with_aliases(&item.title, &aliases)),
                );
            }
            true
        })?;
        Ok(parents)
    }

    fn page_text(&mut self, title: &str) -> Result<Option<RemotePage>> {
        let parsed = self.query(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content|timestamp|ids".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        for page in parsed.query.pages {
            if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
                return Ok(None);
            }
            let (Some(page_id), Some(revision)) = (page.pageid, page.revisions.into_iter().next()) else {
                continue;
            };
            let Some(slot) = revision.slots.and_then(|slots| slots.main) else {
                continue;
            };
            return Ok(Some(RemotePage {
                title: page.title,
                page_id,
                revision_id: revision.revid,
                timestamp: revision.timestamp,
                content: slot.content,
            }));
        }
        Ok(None)
    }

    fn page_exists(&mut self, title: &str) -> Result<bool> {
        let parsed = self.query(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "info".to_string()),
        ])?;
        Ok(parsed
            .query
            .pages
            .iter()
            .any(|page| !page.missing.unwrap_or(false) && !page.invalid.unwrap_or(false)))
    }

    fn linked_pages(&mut self, title: &str) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let params = vec![
            ("action", "query".to_string()),
            ("prop", "links".to_string()),
            ("titles", title.to_string()),
            ("pllimit", "max".to_string()),
        ];
        self.query_all(params, "plcontinue", |query| {
            for page in query.pages {
                titles.extend(page.links.into_iter().map(|item| item.title));
            }
            true
        })?;
        Ok(titles)
    }

    fn backlinks(&mut self, title: &str) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let params = vec![
            ("action", "query".to_string()),
            ("list", "backlinks".to_string()),
            ("bltitle", title.to_string()),
            ("bllimit", "500".to_string()),
        ];
        self.query_all(params, "blcontinue", |query| {
            titles.extend(query.backlinks.into_iter().map(|item| item.title));
            true
        })?;
        Ok(titles)
    }

    fn new_user_log(&mut self, query: &NewUserLogQuery) -> Result<Vec<NewUserEvent>> {
        let limit = query.limit.max(1);
        let mut events = Vec::new();
        let mut params = vec![
            ("action", "query".to_string()),
            ("list", "logevents".to_string()),
            ("letype", "newusers".to_string()),
            ("leprop", "user|type|timestamp".to_string()),
            ("lelimit", limit.min(500).to_string()),
        ];
        if let Some(start) = &query.start {
            params.push(("lestart", start.clone()));
        }
        self.query_all(params, "lecontinue", |payload| {
            for item in payload.logevents {
                if events.len() >= limit {
                    break;
                }
                events.push(NewUserEvent {
                    user: item.user.unwrap_or_default(),
                    action: item.action,
                    timestamp: item.timestamp,
                    user_hidden: item.userhidden.unwrap_or(false),
                });
            }
            events.len() < limit
        })?;
        Ok(events)
    }

    fn user_info(&mut self, username: &str) -> Result<Option<UserInfo>> {
        let parsed = self.query(&[
            ("action", "query".to_string()),
            ("list", "users".to_string()),
            ("ususers", username.to_string()),
            ("usprop", "editcount|blockinfo".to_string()),
        ])?;
        Ok(parsed
            .query
            .users
            .into_iter()
            .find(|user| !user.missing.unwrap_or(false) && !user.invalid.unwrap_or(false))
            .map(|user| UserInfo {
                name: user.name,
                edit_count: user.editcount.unwrap_or(0),
                blocked: user.blockid.is_some(),
            }))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl WikiWriteApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let login_token = self
            .query(&[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
                ("type", "login".to_string()),
            ])?
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let response = self.request(
            Method::Post,
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let payload: LoginResponse =
            serde_json::from_value(response).context("failed to decode login response")?;
        match payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                tracing::info!(user = username, "logged in");
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    fn edit_page(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        minor: bool,
        base: EditBase<'_>,
    ) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let mut params = edit_base_params(base);
        params.extend([
            ("action", "edit".to_string()),
            ("title", title.to_string()),
            ("text", content.to_string()),
            ("summary", summary.to_string()),
            ("bot", "1".to_string()),
            ("token", token),
        ]);
        if minor {
            params.push(("minor", "1".to_string()));
        }
        let response = self.request(Method::Post, &params, true)?;
        let payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let result = payload.edit.and_then(|edit| edit.result);
        if result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {title}: {}",
                result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        Ok(())
    }

    fn delete_page(&mut self, title: &str, reason: &str) -> Result<()> {
        let token = self.ensure_csrf_token()?;
        let response = self.request(
            Method::Post,
            &[
                ("action", "delete".to_string()),
                ("title", title.to_string()),
                ("reason", reason.to_string()),
                ("token", token),
            ],
            true,
        );
        match response {
            Ok(_) => Ok(()),
            Err(error) if error.to_string().contains("missingtitle") => Ok(()),
            Err(error) => Err(error),
        }
    }
}

fn edit_base_params(base: EditBase<'_>) -> Vec<(&'static str, String)> {
    match base {
        EditBase::Overwrite => Vec::new(),
        EditBase::Revision(timestamp) => vec![
            ("basetimestamp", timestamp.to_string()),
            ("nocreate", "1".to_string()),
        ],
        EditBase::CreateOnly => vec![("createonly", "1".to_string())],
    }
}

fn check_api_error(payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(payload)
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    categorymembers: Vec<TitleItem>,
    #[serde(default)]
    backlinks: Vec<TitleItem>,
    #[serde(default)]
    pages: Vec<PageItem>,
    #[serde(default)]
    logevents: Vec<LogEventItem>,
    #[serde(default)]
    users: Vec<UserItem>,
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
struct TitleItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageItem {
    pageid: Option<i64>,
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionItem>,
    #[serde(default)]
    categories: Vec<TitleItem>,
    #[serde(default)]
    links: Vec<TitleItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionItem {
    revid: i64,
    timestamp: String,
    slots: Option<RevisionSlots>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlots {
    main: Option<MainSlot>,
}

#[derive(Debug, Deserialize)]
struct MainSlot {
    content: String,
}

#[derive(Debug, Deserialize)]
struct LogEventItem {
    user: Option<String>,
    #[serde(default)]
    action: String,
    #[serde(default)]
    timestamp: String,
    userhidden: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UserItem {
    #[serde(default)]
    name: String,
    editcount: Option<u64>,
    blockid: Option<i64>,
    missing: Option<bool>,
    invalid: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
