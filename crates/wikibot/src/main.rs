use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use wikibot_core::add_text::{AddTextOptions, AddTextOutcome, add_text, talk_pages};
use wikibot_core::api::{MediaWikiClient, MediaWikiClientConfig, WikiReadApi, WikiWriteApi};
use wikibot_core::bulk::{
    AddReport, BulkReport, PageSource, add_category, collect_pages, move_category,
    remove_category,
};
use wikibot_core::cache::{CategoryCache, LoadOutcome};
use wikibot_core::config::{WikiConfig, bot_credentials, load_config};
use wikibot_core::family::Family;
use wikibot_core::graph::CategoryGraph;
use wikibot_core::prompt::{ConsolePrompt, Prompt};
use wikibot_core::readtalk::{TalkPage, read_talk_pages};
use wikibot_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use wikibot_core::tidy::{InspectWindow, TidyReport, tidy_category};
use wikibot_core::title::CategoryTitle;
use wikibot_core::tree::{append_tree, render_tree};
use wikibot_core::welcome::{WelcomeBot, WelcomeReport};
use wikibot_core::wikitext::WikitextRules;

#[derive(Debug, Parser)]
#[command(
    name = "wikibot",
    version,
    about = "MediaWiki maintenance bots: category tools, add-text, welcome and talk-page reader"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "CODE", help = "Wiki language code")]
    lang: Option<String>,
    #[arg(long, global = true, value_name = "NAME", value_parser = parse_family)]
    family: Option<Family>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    lang: Option<String>,
    family: Option<Family>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            lang: cli.lang.clone(),
            family: cli.family,
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Add, remove, move, tidy or draw categories")]
    Category(CategoryArgs),
    #[command(name = "add-text", about = "Add a text to a set of pages")]
    AddText(AddTextArgs),
    #[command(about = "Welcome newly registered users")]
    Welcome(WelcomeArgs),
    #[command(name = "read-talk", about = "Print the talk pages of the bot accounts")]
    ReadTalk,
}

#[derive(Debug, Args)]
struct CategoryArgs {
    #[arg(long, global = true, help = "Discard the category snapshot before running")]
    rebuild: bool,
    #[command(subcommand)]
    command: CategoryCommand,
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    Add(CategoryAddArgs),
    Remove {
        category: Option<String>,
    },
    Move {
        from: Option<String>,
        to: Option<String>,
    },
    Tidy {
        category: Option<String>,
    },
    Tree(CategoryTreeArgs),
}

#[derive(Debug, Args)]
struct CategoryAddArgs {
    category: Option<String>,
    #[arg(long, help = "Sort by last name")]
    person: bool,
    #[arg(long, value_name = "PAGE", help = "Take the pages linked from this list page")]
    list: Option<String>,
    #[arg(long, value_name = "PAGE", help = "Take the pages linking to this page")]
    links_to: Option<String>,
}

#[derive(Debug, Args)]
struct CategoryTreeArgs {
    category: Option<String>,
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,
    #[arg(long, value_name = "PATH", help = "Append the tree to this file instead of printing it")]
    file: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AddTextArgs {
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    summary: Option<String>,
    #[arg(long, value_name = "REGEX", help = "Skip pages whose text matches")]
    except: Option<String>,
    #[arg(long, help = "Add the text at the top of the page")]
    up: bool,
    #[arg(long, help = "Save without asking")]
    always: bool,
    #[arg(long = "page", value_name = "TITLE")]
    pages: Vec<String>,
    #[arg(long = "cat", value_name = "CATEGORY", help = "Work on the articles of a category")]
    category: Option<String>,
    #[arg(long, value_name = "PAGE", help = "Work on the pages linked from a page")]
    links: Option<String>,
    #[arg(long, help = "Work on the talk pages, creating missing ones")]
    talk: bool,
}

#[derive(Debug, Args)]
struct WelcomeArgs {
    #[arg(long, value_name = "N", help = "Edits needed before a user is welcomed")]
    edits: Option<u64>,
    #[arg(long, value_name = "MINUTES", help = "Skip users newer than this many minutes")]
    time_offset: Option<u64>,
    #[arg(long, value_name = "YYYYMMDDHHMMSS", help = "Skip users newer than this timestamp")]
    offset: Option<String>,
    #[arg(long, value_name = "SECONDS", help = "Pause between passes")]
    sleep: Option<u64>,
    #[arg(long = "break", help = "Run a single pass")]
    single_pass: bool,
    #[arg(long, help = "Do not write the welcome log")]
    no_log: bool,
    #[arg(long, help = "Ask before reporting a username")]
    ask: bool,
    #[arg(long, help = "Check usernames against the bad-word lists")]
    filter: bool,
    #[arg(long, help = "Use a random signature from the signature list")]
    random: bool,
    #[arg(long, value_name = "PATH", help = "Read signatures from this file")]
    signature_file: Option<PathBuf>,
    #[arg(long, help = "Also welcome auto-created accounts")]
    sul: bool,
    #[arg(long, value_name = "N", help = "How many new users to load per pass")]
    limit: Option<usize>,
    #[arg(long, value_name = "N", help = "Welcomes or reports gathered before a log update")]
    number_log: Option<usize>,
}

fn parse_family(value: &str) -> std::result::Result<Family, String> {
    Family::parse(value).map_err(|error| error.to_string())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Category(args)) => run_category(&runtime, args),
        Some(Commands::AddText(args)) => run_add_text(&runtime, args),
        Some(Commands::Welcome(args)) => run_welcome(&runtime, args),
        Some(Commands::ReadTalk) => run_read_talk(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

struct Session {
    paths: ResolvedPaths,
    config: WikiConfig,
}

fn open_session(runtime: &RuntimeOptions) -> Result<Session> {
    let paths = resolve_runtime_paths(runtime)?;
    let mut config = load_config(&paths.config_path)?;
    config.override_site(runtime.family, runtime.lang.as_deref());
    if runtime.diagnostics {
        println!("[diagnostics]\n{}", paths.diagnostics());
        println!("family={}", config.family().as_str());
        println!("lang={}", config.lang());
        println!("api_url={}", config.api_url());
    }
    Ok(Session { paths, config })
}

fn connect(config: &WikiConfig, login: bool) -> Result<MediaWikiClient> {
    let mut client = MediaWikiClient::new(MediaWikiClientConfig::from_config(config))?;
    if login {
        let Some((username, password)) = bot_credentials() else {
            bail!("WIKI_BOT_USER and WIKI_BOT_PASS must be set for actions that edit the wiki");
        };
        client.login(&username, &password)?;
    }
    Ok(client)
}

/// Use `given` when present, otherwise ask for it.
fn required(given: Option<String>, prompt: &mut impl Prompt, question: &str) -> Result<String> {
    let value = match given {
        Some(value) if !value.trim().is_empty() => value,
        _ => prompt.ask(question)?,
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        bail!("a non-empty title is required");
    }
    Ok(value)
}

fn run_category(runtime: &RuntimeOptions, args: CategoryArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let writes = !matches!(args.command, CategoryCommand::Tree(_));
    let client = connect(&session.config, writes)?;

    let (cache_path, cache_source) = session
        .paths
        .cache_path(&session.config.category.cache_file);
    let (mut cache, outcome) = CategoryCache::load(&cache_path);
    let cache_path_display = normalize_for_display(&cache_path);
    match &outcome {
        LoadOutcome::Loaded { categories } => tracing::info!(
            path = %cache_path_display,
            source = cache_source.as_str(),
            categories,
            "loaded category cache"
        ),
        LoadOutcome::Missing => tracing::info!(
            path = %cache_path_display,
            source = cache_source.as_str(),
            "category cache is empty"
        ),
        LoadOutcome::Discarded { reason } => tracing::warn!(
            path = %cache_path_display,
            source = cache_source.as_str(),
            "discarded category cache: {reason}"
        ),
    }
    if args.rebuild {
        cache.rebuild();
    }

    let mut graph = CategoryGraph::new(client, cache, session.config.site())?;
    let mut prompt = ConsolePrompt;
    let result = run_category_action(&mut graph, &mut prompt, &session.config, args.command);

    let persisted = graph.cache().persist();
    tracing::info!(
        requests = graph.api().request_count(),
        categories = graph.cache().len(),
        "category run finished"
    );
    match (result, persisted) {
        (Err(error), Err(persist_error)) => {
            tracing::error!("failed to save category snapshot: {persist_error:#}");
            Err(error)
        }
        (result, persisted) => result.and(persisted),
    }
}

fn run_category_action(
    graph: &mut CategoryGraph<MediaWikiClient>,
    prompt: &mut ConsolePrompt,
    config: &WikiConfig,
    command: CategoryCommand,
) -> Result<()> {
    match command {
        CategoryCommand::Add(args) => {
            let source = match (args.list, args.links_to) {
                (Some(list), _) if !list.trim().is_empty() => PageSource::LinksOn(list),
                (_, Some(referred)) if !referred.trim().is_empty() => PageSource::LinksTo(referred),
                _ => {
                    let list = prompt.ask("Wiki page with list of pages to change:")?;
                    if list.trim().is_empty() {
                        PageSource::LinksTo(required(
                            None,
                            prompt,
                            "Wiki page that is being linked to:",
                        )?)
                    } else {
                        PageSource::LinksOn(list.trim().to_string())
                    }
                }
            };
            let name = required(
                args.category,
                prompt,
                "Category to add (do not give namespace):",
            )?;
            let pages = collect_pages(graph, &source)?;
            let report = add_category(graph, prompt, &pages, &name, args.person)?;
            print_add_report(&report);
        }
        CategoryCommand::Remove { category } => {
            let name = required(
                category,
                prompt,
                "Please enter the name of the category that should be removed:",
            )?;
            let category = graph.category(&name);
            let report = remove_category(graph, &category)?;
            print_bulk_report("category remove", &category, None, &report);
        }
        CategoryCommand::Move { from, to } => {
            let from = required(from, prompt, "Please enter the old name of the category:")?;
            let to = required(to, prompt, "Please enter the new name of the category:")?;
            let from = graph.category(&from);
            let to = graph.category(&to);
            let report = move_category(graph, &from, &to)?;
            print_bulk_report("category move", &from, Some(&to), &report);
        }
        CategoryCommand::Tidy { category } => {
            let name = required(category, prompt, "Which category do you want to tidy up?")?;
            let category = graph.category(&name);
            let report = tidy_category(
                graph,
                prompt,
                &category,
                InspectWindow::from(&config.category),
            )?;
            print_tidy_report(&category, &report);
        }
        CategoryCommand::Tree(args) => {
            let name = required(
                args.category,
                prompt,
                "For which category do you want to create a tree view?",
            )?;
            let root = graph.category(&name);
            let max_depth = args.max_depth.unwrap_or(config.category.tree_max_depth);
            let tree = render_tree(graph, &root, max_depth)?;
            match args.file {
                Some(path) => {
                    append_tree(&path, &tree)?;
                    println!("tree_file: {}", normalize_for_display(&path));
                }
                None => print!("{tree}"),
            }
        }
    }
    Ok(())
}

fn print_bulk_report(
    action: &str,
    from: &CategoryTitle,
    to: Option<&CategoryTitle>,
    report: &BulkReport,
) {
    println!("{action}");
    println!("category: {from}");
    if let Some(to) = to {
        println!("target: {to}");
    }
    println!("changed: {}", report.changed.len());
    println!("skipped: {}", report.skipped.len());
    if let Some(copy) = report.copy {
        println!("copy: {copy:?}");
    }
    println!("deleted: {}", format_flag(report.deleted));
    print_errors(&report.errors);
}

fn print_add_report(report: &AddReport) {
    println!("category add");
    println!("added: {}", report.added.len());
    println!("already_present: {}", report.already_present.len());
    println!("declined: {}", report.declined.len());
    println!("skipped: {}", report.skipped.len());
    print_errors(&report.errors);
}

fn print_tidy_report(category: &CategoryTitle, report: &TidyReport) {
    println!("category tidy");
    println!("category: {category}");
    println!("articles: {}", report.outcomes.len());
    println!("edits: {}", report.edits());
    for (page, outcome) in &report.outcomes {
        println!("outcome.{page}: {outcome:?}");
    }
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("errors:");
    for error in errors {
        println!("  - {error}");
    }
}

fn run_add_text(runtime: &RuntimeOptions, args: AddTextArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let mut prompt = ConsolePrompt;
    let text = required(args.text, &mut prompt, "What text do you want to add?")?;
    let except = args
        .except
        .as_deref()
        .map(|pattern| Regex::new(pattern).with_context(|| format!("invalid --except regex {pattern:?}")))
        .transpose()?;

    let mut client = connect(&session.config, true)?;
    let site = session.config.site();
    let rules = WikitextRules::new(&site)?;

    let mut pages = args.pages;
    if let Some(name) = &args.category {
        let category = CategoryTitle::with_aliases(name, &site.category_aliases);
        pages.extend(client.fetch_articles(&category)?);
    }
    if let Some(list) = &args.links {
        pages.extend(client.linked_pages(list)?);
    }
    if pages.is_empty() {
        bail!("no pages to work on (use --page, --cat or --links)");
    }
    if args.talk {
        pages = talk_pages(&pages);
    }

    let options = AddTextOptions {
        text,
        summary: args.summary,
        except,
        up: args.up,
        always: args.always,
        create: args.talk,
    };
    let report = add_text(&mut client, &rules, &mut prompt, &site.lang, &pages, &options)?;

    println!("add-text");
    println!("pages: {}", report.outcomes.len());
    println!("saved: {}", report.saved());
    for (page, outcome) in &report.outcomes {
        if *outcome != AddTextOutcome::Saved {
            println!("outcome.{page}: {outcome:?}");
        }
    }
    println!("requests: {}", client.request_count());
    Ok(())
}

fn run_welcome(runtime: &RuntimeOptions, args: WelcomeArgs) -> Result<()> {
    let session = open_session(runtime)?;
    let mut settings = session.config.welcome.clone();
    if let Some(edits) = args.edits {
        settings.edit_threshold = edits;
    }
    if let Some(minutes) = args.time_offset {
        settings.time_offset_minutes = minutes;
    }
    if let Some(offset) = args.offset {
        settings.offset = Some(offset);
    }
    if let Some(seconds) = args.sleep {
        settings.sleep_seconds = seconds;
    }
    if let Some(limit) = args.limit {
        settings.query_limit = limit;
    }
    if let Some(batch) = args.number_log {
        settings.log_batch_size = batch;
    }
    if let Some(path) = args.signature_file {
        settings.signature_file = Some(path);
        settings.random_signature = true;
    }
    settings.recursive &= !args.single_pass;
    settings.make_log &= !args.no_log;
    settings.confirm_reports |= args.ask;
    settings.filter_bad_names |= args.filter;
    settings.random_signature |= args.random;
    settings.welcome_auto_created |= args.sul;

    let mut client = connect(&session.config, true)?;
    let mut prompt = ConsolePrompt;
    let mut bot = WelcomeBot::new(settings, &session.config.lang())?;
    bot.run(&mut client, &mut prompt, print_welcome_report)
}

fn print_welcome_report(report: &WelcomeReport) {
    println!("welcome pass");
    println!("users: {}", report.outcomes.len());
    println!("welcomed: {}", report.welcomed());
    println!("logged: {}", report.logged);
    println!("reported: {}", report.reported.len());
    for (user, outcome) in &report.outcomes {
        println!("outcome.{user}: {outcome:?}");
    }
}

fn run_read_talk(runtime: &RuntimeOptions) -> Result<()> {
    let session = open_session(runtime)?;
    let mut client = connect(&session.config, false)?;
    let mut prompt = ConsolePrompt;
    let credentials = bot_credentials();
    let pages = read_talk_pages(
        &mut client,
        &mut prompt,
        &session.config.site(),
        &session.config.accounts.usernames,
        credentials
            .as_ref()
            .map(|(username, password)| (username.as_str(), password.as_str())),
    )?;
    let missing = pages
        .iter()
        .filter(|(_, page)| *page == TalkPage::Missing)
        .count();
    println!("accounts: {}", pages.len());
    println!("missing: {missing}");
    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
