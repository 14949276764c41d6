use anyhow::{Context, Result};

use crate::api::WikiWriteApi;
use crate::family::Site;
use crate::prompt::Prompt;
use crate::title::user_talk_title;

pub const MISSING_TALK_PAGE: &str = "Talk page does not exist.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TalkPage {
    Read { content: String },
    Missing,
}

/// Print the talk page of every account, logging in first when credentials
/// are available. Without configured accounts the bot account is read.
pub fn read_talk_pages<A: WikiWriteApi, P: Prompt>(
    api: &mut A,
    prompt: &mut P,
    site: &Site,
    accounts: &[String],
    credentials: Option<(&str, &str)>,
) -> Result<Vec<(String, TalkPage)>> {
    if let Some((username, password)) = credentials {
        api.login(username, password)
            .with_context(|| format!("failed to log in as {username}"))?;
    }

    let mut names = accounts
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect::<Vec<_>>();
    if names.is_empty()
        && let Some((username, _)) = credentials
    {
        names.push(bot_account(username));
    }
    if names.is_empty() {
        tracing::warn!("no accounts configured and no bot credentials set");
    }

    let mut pages = Vec::with_capacity(names.len());
    for name in names {
        prompt.say(&format!(
            "Reading talk page from {}:{}:{name}",
            site.lang,
            site.family.as_str()
        ));
        let title = user_talk_title(&name);
        let page = match api
            .page_text(&title)
            .with_context(|| format!("failed to load {title}"))?
        {
            Some(remote) => {
                prompt.say(&format!("{}\n", remote.content));
                TalkPage::Read {
                    content: remote.content,
                }
            }
            None => {
                prompt.say(MISSING_TALK_PAGE);
                TalkPage::Missing
            }
        };
        pages.push((name, page));
    }
    Ok(pages)
}

/// Account name for a bot-password login (`Owner@BotName` belongs to `Owner`).
fn bot_account(username: &str) -> String {
    username
        .split_once('@')
        .map(|(owner, _)| owner)
        .unwrap_or(username)
        .to_string()
}
