//! Greets newly registered users on their talk pages.
//!
//! One pass reads the new-user log, filters the accounts and saves the
//! localized welcome text. Suspicious usernames are queued for the report
//! page and welcomed users are queued for the daily welcome log; both queues
//! are flushed once they reach `log_batch_size` and again at the end of the
//! pass.

use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;

use crate::api::{
    EditBase, NewUserLogQuery, UserInfo, WikiWriteApi, is_edit_conflict, is_page_exists,
};
use crate::config::WelcomeSettings;
use crate::i18n::{self, message, translate};
use crate::prompt::Prompt;
use crate::title::{USER_NAMESPACE, user_talk_title};

const SIGNATURE_SUFFIX: &str = " ~~~~~";
const DEFAULT_REPORT_TEXT: &str =
    "This is a report page for the Bad-username, please translate me. --~~~";
const DEFAULT_WHITELIST: &[&str] = &["emiliano"];

const BUILTIN_BLACKLIST: &[&str] = &[
    " ano", " anus", "anal ", "babies", "baldracca", "balle", "bastardo", "bestiali",
    "bestiale", "bastarda", "b.i.t.c.h.", "bitch", "boobie", "bordello", "breast", "cacata",
    "cacca", "cagata", "cane", "cazz", "cazzo", "cazzata", "chiavare", "chiavata", "chick",
    "christ ", "cristo", "clitoride", "coione", "cojones", "coglione", "coglioni", "cornuto",
    "culo", "deficiente", "dio", "die ", "died ", "ejackulate", "enculer", "fanculo",
    "fellatio", "fica ", "ficken", "figa", "sfiga", "fottere", "fottuto", "fuck", "f.u.c.k.",
    "gay", "hentai.com", "horne", "horney", "virgin", "hotties", "idiot", "@alice.it",
    "incest", "jesus", "gesu", "gesù", "kazzo", "kill", "leccaculo", "lesbian", "lesbica",
    "lesbo", "masturbazione", "masturbare", "merda", "merdata", "mignotta", "minchia",
    "minkia", "mona", "nudo", "nuda", "nudi", "oral", "sex", "porc", "pompino", "porno",
    "puttana", "puzza", "sborone", "scopata", "scopare", "scroto", "scrotum", "sega",
    "sesso", "shit", "shiz", "s.h.i.t.", "sadomaso", "sodomist", "stronzata", "stronzo",
    "testicol", "troia", "vaffanculo", "vagina", "vibrator", "vacca", "zoccola",
    // Impersonation and spam patterns.
    "@", ".com", ".sex", ".org", ".uk", ".en", ".it", "admin", "administrator",
    "amministratore", "amministratrice", "burocrate", "checkuser", "developer", "http://",
    "jimbo", "mediawiki", "on wheels", "on wheel", "sysop", "troll", "vandal",
    "vandal fighter", "wales jimmy", "wheels", "wales", "www.",
];

/// What happened to one account from the new-user log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WelcomeOutcome {
    Welcomed,
    Blocked,
    /// Queued for the report page.
    BadName,
    TooFewEdits { edits: u64 },
    AlreadyWelcomed,
    AutoCreated,
    Failed { error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WelcomeReport {
    pub outcomes: Vec<(String, WelcomeOutcome)>,
    /// Usernames written to the report page during the pass.
    pub reported: Vec<String>,
    /// Users written to the welcome log during the pass.
    pub logged: usize,
}

impl WelcomeReport {
    pub fn welcomed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == WelcomeOutcome::Welcomed)
            .count()
    }
}

pub struct WelcomeBot {
    settings: WelcomeSettings,
    lang: String,
    confirm_reports: bool,
    report_queue: Vec<String>,
    welcomed: Vec<UserInfo>,
    blacklist: Option<Vec<String>>,
    whitelist: Option<Vec<String>>,
    signatures: Option<Vec<String>>,
    rng: StdRng,
}

impl WelcomeBot {
    pub fn new(mut settings: WelcomeSettings, lang: &str) -> Result<Self> {
        if let Some(offset) = &settings.offset
            && (offset.len() != 14 || !offset.chars().all(|ch| ch.is_ascii_digit()))
        {
            bail!("offset must be a yyyymmddhhmmss timestamp, got {offset:?}");
        }
        if settings.offset.is_some() && settings.time_offset_minutes > 0 {
            tracing::warn!("both offset and time offset were given, ignoring offset");
            settings.offset = None;
        }
        Ok(Self {
            confirm_reports: settings.confirm_reports,
            settings,
            lang: lang.to_string(),
            report_queue: Vec::new(),
            welcomed: Vec::new(),
            blacklist: None,
            whitelist: None,
            signatures: None,
            rng: StdRng::from_entropy(),
        })
    }

    /// Fix the signature picker, for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run passes until one fails, or once when not recursive.
    pub fn run<A: WikiWriteApi, P: Prompt>(
        &mut self,
        api: &mut A,
        prompt: &mut P,
        mut on_pass: impl FnMut(&WelcomeReport),
    ) -> Result<()> {
        loop {
            let report = self.run_pass(api, prompt, Utc::now())?;
            on_pass(&report);
            if !self.settings.recursive {
                return Ok(());
            }
            tracing::info!(
                seconds = self.settings.sleep_seconds,
                at = %Utc::now().format("%d %b %Y %H:%M:%S (UTC)"),
                "sleeping before rerun"
            );
            thread::sleep(Duration::from_secs(self.settings.sleep_seconds));
        }
    }

    pub fn run_pass<A: WikiWriteApi, P: Prompt>(
        &mut self,
        api: &mut A,
        prompt: &mut P,
        now: DateTime<Utc>,
    ) -> Result<WelcomeReport> {
        let mut report = WelcomeReport::default();
        let query = self.log_query(now);
        let events = api
            .new_user_log(&query)
            .context("failed to read the new-user log")?;
        if events.is_empty() {
            prompt.say("There is nobody to be welcomed...");
        }

        for event in events {
            if event.user_hidden || event.user.is_empty() {
                continue;
            }
            if event.is_auto_created() && !self.settings.welcome_auto_created {
                prompt.say(&format!("{} has been created automatically.", event.user));
                report.outcomes.push((event.user, WelcomeOutcome::AutoCreated));
                continue;
            }
            let outcome = match self.welcome_user(api, prompt, &event.user, &mut report) {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(user = %event.user, "welcome failed: {error:#}");
                    WelcomeOutcome::Failed {
                        error: format!("{error:#}"),
                    }
                }
            };
            tracing::info!(user = %event.user, ?outcome, "welcome");
            report.outcomes.push((event.user, outcome));
            if self.welcomed.len() >= self.settings.log_batch_size {
                self.try_flush_log(api, now, &mut report);
            }
        }

        if !self.welcomed.is_empty() {
            self.try_flush_log(api, now, &mut report);
        }
        if !self.report_queue.is_empty() {
            prompt.say("Putting bad name to report page....");
            if let Err(error) = self.flush_reports(api, &mut report) {
                tracing::warn!("report page update failed, keeping the queue: {error:#}");
            }
        }
        let welcomed = report.welcomed();
        prompt.say(&match welcomed {
            0 => "No users have been welcomed.".to_string(),
            1 => "One user has been welcomed.".to_string(),
            count => format!("{count} users have been welcomed."),
        });
        Ok(report)
    }

    fn log_query(&self, now: DateTime<Utc>) -> NewUserLogQuery {
        let start = if self.settings.time_offset_minutes > 0 {
            let minutes = i64::try_from(self.settings.time_offset_minutes).unwrap_or(i64::MAX);
            let bound = now
                .checked_sub_signed(chrono::Duration::minutes(minutes))
                .unwrap_or(now);
            Some(bound.format("%Y%m%d%H%M%S").to_string())
        } else {
            self.settings.offset.clone()
        };
        NewUserLogQuery {
            limit: self.settings.query_limit,
            start,
        }
    }

    fn welcome_user<A: WikiWriteApi, P: Prompt>(
        &mut self,
        api: &mut A,
        prompt: &mut P,
        username: &str,
        report: &mut WelcomeReport,
    ) -> Result<WelcomeOutcome> {
        let Some(user) = api.user_info(username)? else {
            bail!("user {username} does not exist");
        };
        if user.blocked {
            prompt.say(&format!("{username} has been blocked!"));
            return Ok(WelcomeOutcome::Blocked);
        }
        if self.settings.filter_bad_names && self.is_bad_name(api, username)? {
            self.queue_report(api, prompt, username, report)?;
            return Ok(WelcomeOutcome::BadName);
        }
        if user.edit_count < self.settings.edit_threshold {
            if user.edit_count == 0 {
                prompt.say(&format!("{username} has no contributions."));
            } else {
                prompt.say(&format!(
                    "{username} has only {} contributions.",
                    user.edit_count
                ));
            }
            return Ok(WelcomeOutcome::TooFewEdits {
                edits: user.edit_count,
            });
        }

        let talk = user_talk_title(username);
        if api.page_exists(&talk)? {
            prompt.say(&format!("{username} has been already welcomed."));
            return Ok(WelcomeOutcome::AlreadyWelcomed);
        }
        let signature = self.signature(api)?;
        let text = message(i18n::WELCOME_TEXT, &self.lang, &[&signature]);
        let summary = message(i18n::WELCOME_SUMMARY, &self.lang, &[]);
        match api.edit_page(&talk, &text, &summary, false, EditBase::CreateOnly) {
            Ok(()) => {}
            Err(error) if is_page_exists(&error) => {
                prompt.say(&format!("{username} has been already welcomed."));
                return Ok(WelcomeOutcome::AlreadyWelcomed);
            }
            Err(error) if is_edit_conflict(&error) => {
                prompt.say("An edit conflict has occured, skipping this user.");
                return Ok(WelcomeOutcome::Failed {
                    error: "edit conflict".to_string(),
                });
            }
            Err(error) => return Err(error),
        }
        self.welcomed.push(user);
        Ok(WelcomeOutcome::Welcomed)
    }

    /// Signature to put in the welcome text.
    fn signature<A: WikiWriteApi>(&mut self, api: &mut A) -> Result<String> {
        if !self.settings.random_signature {
            return Ok(self.settings.default_signature.clone());
        }
        if self.signatures.is_none() {
            let loaded = self.load_signatures(api)?;
            self.signatures = Some(loaded);
        }
        match self
            .signatures
            .as_deref()
            .and_then(|signatures| signatures.choose(&mut self.rng))
        {
            Some(signature) => Ok(format!("{signature}{SIGNATURE_SUFFIX}")),
            None => Ok(self.settings.default_signature.clone()),
        }
    }

    fn load_signatures<A: WikiWriteApi>(&self, api: &mut A) -> Result<Vec<String>> {
        let text = match &self.settings.signature_file {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read signature file {}", path.display()))?,
            None => {
                let page = translate(i18n::WELCOME_SIGNATURE_PAGE, &self.lang).unwrap_or_default();
                match api.page_text(page)? {
                    Some(remote) => remote.content,
                    None => {
                        tracing::warn!(page, "signature list page does not exist, random signature disabled");
                        String::new()
                    }
                }
            }
        };
        Ok(signature_lines(&text))
    }

    fn is_bad_name<A: WikiWriteApi>(&mut self, api: &mut A, username: &str) -> Result<bool> {
        if self.blacklist.is_none() {
            let mut words = BUILTIN_BLACKLIST
                .iter()
                .map(|word| word.to_string())
                .collect::<Vec<_>>();
            words.extend(self.load_word_page(api, i18n::WELCOME_BAD_WORD_PAGE, "bad word")?);
            self.blacklist = Some(words);
        }
        if self.whitelist.is_none() {
            let mut words = self.load_word_page(api, i18n::WELCOME_WHITELIST_PAGE, "whitelist")?;
            words.extend(DEFAULT_WHITELIST.iter().map(|word| word.to_string()));
            self.whitelist = Some(words);
        }
        Ok(matches_blacklist(
            username,
            self.blacklist.as_deref().unwrap_or_default(),
            self.whitelist.as_deref().unwrap_or_default(),
        ))
    }

    fn load_word_page<A: WikiWriteApi>(
        &self,
        api: &mut A,
        table: i18n::MessageTable,
        kind: &str,
    ) -> Result<Vec<String>> {
        let Some(page) = translate(table, &self.lang) else {
            return Ok(Vec::new());
        };
        match api.page_text(page)? {
            Some(remote) => {
                let words = load_words(&remote.content);
                if words.is_empty() {
                    tracing::warn!(page, "no words found on the {kind} page");
                }
                Ok(words)
            }
            None => {
                tracing::warn!(page, "the {kind} page does not exist");
                Ok(Vec::new())
            }
        }
    }

    fn queue_report<A: WikiWriteApi, P: Prompt>(
        &mut self,
        api: &mut A,
        prompt: &mut P,
        username: &str,
        report: &mut WelcomeReport,
    ) -> Result<()> {
        if self.confirm_reports {
            let answer = prompt.choose(
                &format!("{username} may have an unwanted username, do you want to report this user?"),
                &["y", "n", "a"],
                "n",
            )?;
            match answer.as_str() {
                "a" => self.confirm_reports = false,
                "y" => {}
                _ => return Ok(()),
            }
        }
        prompt.say(&format!(
            "{username} is possibly an unwanted username. It will be reported."
        ));
        self.report_queue.push(username.to_string());
        if self.report_queue.len() >= self.settings.log_batch_size
            && let Err(error) = self.flush_reports(api, report)
        {
            tracing::warn!("report page update failed, keeping the queue: {error:#}");
        }
        Ok(())
    }

    /// Append the queued names to the report page. The queue is only cleared
    /// once the page is saved.
    fn flush_reports<A: WikiWriteApi>(&mut self, api: &mut A, report: &mut WelcomeReport) -> Result<()> {
        let Some(page) = translate(i18n::WELCOME_REPORT_PAGE, &self.lang) else {
            self.report_queue.clear();
            return Ok(());
        };
        let remote = api.page_text(page)?;
        let existing = remote
            .as_ref()
            .map(|remote| remote.content.clone())
            .unwrap_or_else(|| DEFAULT_REPORT_TEXT.to_string());

        let mut addition = String::new();
        let mut added = Vec::new();
        for username in &self.report_queue {
            if existing.contains(username.as_str()) || added.contains(username) {
                tracing::info!(user = %username, "already on the report page");
                continue;
            }
            addition.push_str(&message(i18n::WELCOME_REPORT_TEXT, &self.lang, &[username.as_str()]));
            added.push(username.clone());
        }
        if addition.is_empty() {
            self.report_queue.clear();
            return Ok(());
        }
        let summary = message(i18n::WELCOME_REPORT_SUMMARY, &self.lang, &[]);
        let base = EditBase::from_read(remote.as_ref());
        api.edit_page(page, &format!("{existing}{addition}"), &summary, true, base)
            .with_context(|| format!("failed to update {page}"))?;
        tracing::info!(page, count = added.len(), "reported usernames");
        self.report_queue.clear();
        report.reported.extend(added);
        Ok(())
    }

    fn log_enabled(&self) -> bool {
        self.settings.make_log
            && !i18n::WELCOME_LOGBOOK_DISABLED.contains(&self.lang.as_str())
            && translate(i18n::WELCOME_LOGBOOK, &self.lang).is_some()
    }

    fn try_flush_log<A: WikiWriteApi>(
        &mut self,
        api: &mut A,
        now: DateTime<Utc>,
        report: &mut WelcomeReport,
    ) {
        if let Err(error) = self.flush_log(api, now, report) {
            tracing::warn!("welcome log update failed, keeping the queue: {error:#}");
        }
    }

    /// Append the queued users to today's log page. On an edit conflict the
    /// queue is kept for the next flush.
    fn flush_log<A: WikiWriteApi>(
        &mut self,
        api: &mut A,
        now: DateTime<Utc>,
        report: &mut WelcomeReport,
    ) -> Result<()> {
        if !self.log_enabled() {
            self.welcomed.clear();
            return Ok(());
        }
        let logbook = translate(i18n::WELCOME_LOGBOOK, &self.lang).unwrap_or_default();
        let date = if self.lang == "it" {
            now.format("%d/%m/%Y")
        } else {
            now.format("%Y/%m/%d")
        };
        let target = format!("{logbook}/{date}");

        let remote = api.page_text(&target)?;
        let mut text = match &remote {
            Some(remote) => remote.content.clone(),
            None => {
                tracing::info!(page = %target, "creating welcome log page");
                format!("{}\n!{USER_NAMESPACE}\n!Contribs", i18n::WELCOME_LOG_HEADER)
            }
        };
        for user in &self.welcomed {
            text.push_str(&format!(
                "\n{{{{WLE|user={}|contribs={}}}}}",
                user.name, user.edit_count
            ));
        }
        let summary = message(i18n::WELCOME_LOG_SUMMARY, &self.lang, &[]);
        match api.edit_page(&target, &text, &summary, false, EditBase::from_read(remote.as_ref())) {
            Ok(()) => {
                report.logged += self.welcomed.len();
                self.welcomed.clear();
                Ok(())
            }
            Err(error) if is_edit_conflict(&error) || is_page_exists(&error) => {
                tracing::warn!(page = %target, "edit conflict on the welcome log, retrying later");
                Ok(())
            }
            Err(error) => Err(error.context(format!("failed to update {target}"))),
        }
    }
}

/// Whether `username` contains a blacklisted word once whitelisted words are
/// taken out of it.
pub fn matches_blacklist(username: &str, blacklist: &[String], whitelist: &[String]) -> bool {
    let mut name = username.to_lowercase();
    for word in whitelist {
        let word = word.to_lowercase();
        if !word.is_empty() {
            name = name.replace(&word, "");
        }
    }
    blacklist
        .iter()
        .map(|word| word.to_lowercase())
        .any(|word| !word.is_empty() && name.contains(&word))
}

/// Quoted words from a word-list page, e.g. `('foo', "bar")`.
pub fn load_words(raw: &str) -> Vec<String> {
    compile(r#"(?:"|')(.*?)(?:"|')(?:, |\))"#)
        .map(|pattern| {
            pattern
                .captures_iter(raw)
                .filter_map(|captures| captures.get(1))
                .map(|word| word.as_str().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Bulleted lines (`* sig`) of a signature list.
pub fn signature_lines(raw: &str) -> Vec<String> {
    compile(r"(?m)^\* ?(.*?)\s*$")
        .map(|pattern| {
            pattern
                .captures_iter(raw)
                .filter_map(|captures| captures.get(1))
                .map(|line| line.as_str().to_string())
                .filter(|line| !line.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(error) => {
            tracing::error!(pattern, "invalid regex: {error}");
            None
        }
    }
}
