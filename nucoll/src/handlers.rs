use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use nucoll_client::client::LOOKUP_BATCH_SIZE;
use nucoll_client::image::download_image;
use nucoll_client::model::digits_only;
use nucoll_client::transport::DEFAULT_API_URL;
use nucoll_client::{
    ApiClient, ClientError, PostSource, RateLimitedTransport, Relation, Tweet, UserObject,
};
use nucoll_core::adjacency::AdjacencyStore;
use nucoll_core::collection::{DAT_EXT, QUERY_EXT, collection_path, read_records, write_records};
use nucoll_core::config::{CredentialStore, DEFAULT_CONFIG_PATH};
use nucoll_core::graph::{GraphAssembler, write_gml_file};
use nucoll_core::query::read_query_handles;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: PathBuf,
    pub api_url: Url,
    pub quiet: bool,
}

impl GlobalArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let config = matches
            .get_one::<String>("config")
            .map(String::as_str)
            .unwrap_or(DEFAULT_CONFIG_PATH);
        let api_url = match matches.get_one::<Url>("api-url") {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_API_URL)?,
        };
        Ok(Self {
            config: PathBuf::from(shellexpand::tilde(config).as_ref()),
            api_url,
            quiet: matches.get_flag("quiet"),
        })
    }
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_string())
}

/// Build an authenticated client, asking for consumer credentials and storing
/// the resulting bearer token when none is saved yet.
pub async fn connect(globals: &GlobalArgs) -> Result<ApiClient> {
    let quiet = globals.quiet;
    let mut transport = RateLimitedTransport::new(globals.api_url.clone())?.with_wait_callback(
        Arc::new(move |wait: Duration| {
            if !quiet {
                eprintln!(
                    "{} rate limited, resuming in {}s",
                    "⏳".yellow(),
                    wait.as_secs()
                );
            }
        }),
    );

    let store = CredentialStore::new(&globals.config);
    match store.load()? {
        Some(token) => transport = transport.with_access_token(token.access_token),
        None => {
            println!(
                "{} No credentials found in {}",
                "ℹ".blue(),
                store.path().display().to_string().bright_white()
            );
            let key = print_prompt("Consumer key:")?;
            let secret = print_prompt("Consumer secret:")?;
            if key.is_empty() || secret.is_empty() {
                bail!("consumer key and secret are required");
            }
            let token = transport
                .authenticate(&key, &secret)
                .await
                .context("failed to obtain bearer token")?;
            store.save(&token)?;
        }
    }
    Ok(ApiClient::new(transport))
}

// ============================================================================
// init
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub handle: String,
    pub followers: bool,
    pub query: bool,
    pub first_mention_only: bool,
    pub list: Option<String>,
    pub retweeter_posts: Option<usize>,
    pub images: bool,
}

impl InitOptions {
    fn relation(&self) -> String {
        if self.retweeter_posts.is_some() {
            "retweeter".to_string()
        } else if self.followers {
            Relation::Followers.to_string()
        } else {
            Relation::Friends.to_string()
        }
    }
}

/// Collect and hydrate the nodes around `opts.handle` into `<handle>.dat`.
pub async fn run_init(client: &ApiClient, root: &Path, opts: &InitOptions) -> Result<PathBuf> {
    let path = collection_path(root, &opts.handle, DAT_EXT);

    if let Some(ref slug) = opts.list {
        let members = client
            .members(slug, &opts.handle)
            .await
            .with_context(|| format!("failed to retrieve members of {}", slug))?;
        write_records(&path, &members, false)?;
        if opts.images {
            save_images(client, root, &members).await;
        }
        info!("{} created", path.display());
        return Ok(path);
    }

    let tokens: Vec<String> = if opts.query {
        let query_file = collection_path(root, &opts.handle, QUERY_EXT);
        read_query_handles(&query_file, opts.first_mention_only)?
    } else if let Some(max_posts) = opts.retweeter_posts {
        client
            .retweeters_of(&opts.handle, max_posts)
            .await?
            .iter()
            .map(u64::to_string)
            .collect()
    } else {
        let relation = if opts.followers {
            Relation::Followers
        } else {
            Relation::Friends
        };
        client
            .ids(relation, &opts.handle)
            .await?
            .iter()
            .map(u64::to_string)
            .collect()
    };

    let relation = opts.relation();
    for (page, batch) in tokens.chunks(LOOKUP_BATCH_SIZE).enumerate() {
        let mut users = client.lookup(batch).await?;
        for user in &mut users {
            user.relation = relation.clone();
            user.subject = opts.handle.clone();
        }
        write_records(&path, &users, page > 0)?;
        if opts.images {
            save_images(client, root, &users).await;
        }
        info!("processed {} starting from {}", batch.len(), batch[0]);
    }

    if tokens.is_empty() {
        write_records::<UserObject>(&path, &[], false)?;
    }
    info!("{} created", path.display());
    Ok(path)
}

async fn save_images(client: &ApiClient, root: &Path, users: &[UserObject]) {
    for user in users.iter().filter(|u| !u.profile_image_url.is_empty()) {
        if let Err(e) =
            download_image(client.transport().http(), root, user.id, &user.profile_image_url).await
        {
            warn!("skipping avatar of {}: {}", user.screen_name, e);
        }
    }
}

pub async fn handle_init(globals: &GlobalArgs, args: &ArgMatches) -> Result<()> {
    let opts = InitOptions {
        handle: required(args, "HANDLE")?,
        followers: args.get_flag("followers"),
        query: args.get_flag("query"),
        first_mention_only: args.get_flag("first-mention"),
        list: args.get_one::<String>("list").cloned(),
        retweeter_posts: args.get_one::<usize>("retweeters").copied(),
        images: args.get_flag("images"),
    };
    let client = connect(globals).await?;
    let path = run_init(&client, Path::new("."), &opts).await?;
    println!("{} {} created", "✓".green().bold(), path.display());
    Ok(())
}

// ============================================================================
// fetch
// ============================================================================

pub const DEFAULT_MAX_FRIENDS: u64 = 5000;

/// `--count`, or [`DEFAULT_MAX_FRIENDS`] when not given.
pub fn max_friends(args: &ArgMatches) -> u64 {
    args.get_one::<u64>("count")
        .copied()
        .unwrap_or(DEFAULT_MAX_FRIENDS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    Fetch,
    AlreadyFetched,
    TooManyFriends,
    Protected,
}

pub fn fetch_decision(
    user: &UserObject,
    store: &AdjacencyStore,
    force: bool,
    max_friends: u64,
) -> FetchDecision {
    if !force && store.exists(user.id) {
        FetchDecision::AlreadyFetched
    } else if user.protected {
        FetchDecision::Protected
    } else if user.friends_count > max_friends {
        FetchDecision::TooManyFriends
    } else {
        FetchDecision::Fetch
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub fetched: usize,
    pub already_fetched: usize,
    pub too_many_friends: usize,
    pub protected: usize,
}

/// Store the friend list of every node in `<handle>.dat` under `fdat/`.
pub async fn run_fetch(
    client: &ApiClient,
    root: &Path,
    handle: &str,
    force: bool,
    max_friends: u64,
    progress: Option<&ProgressBar>,
) -> Result<FetchSummary> {
    let path = collection_path(root, handle, DAT_EXT);
    let users: Vec<UserObject> =
        read_records(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let store = AdjacencyStore::new(root);
    let mut summary = FetchSummary::default();

    if let Some(bar) = progress {
        bar.set_length(users.len() as u64);
    }

    for user in &users {
        if let Some(bar) = progress {
            bar.set_message(user.screen_name.clone());
        }
        match fetch_decision(user, &store, force, max_friends) {
            FetchDecision::AlreadyFetched => summary.already_fetched += 1,
            FetchDecision::TooManyFriends => {
                info!("skipping {} ({} friends)", user.screen_name, user.friends_count);
                summary.too_many_friends += 1;
            }
            FetchDecision::Protected => {
                info!("skipping {} (protected)", user.screen_name);
                summary.protected += 1;
            }
            FetchDecision::Fetch => match client.ids(Relation::Friends, &user.id.to_string()).await {
                Ok(friends) => {
                    store.write(user.id, &friends)?;
                    info!("processed {}", user.screen_name);
                    summary.fetched += 1;
                }
                // protected since it was collected
                Err(ClientError::Unauthorized(status)) => {
                    info!("skipping {} ({})", user.screen_name, status);
                    summary.protected += 1;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to fetch friends of {}", user.screen_name));
                }
            },
        }
        if let Some(bar) = progress {
            bar.inc(1);
        }
    }
    Ok(summary)
}

pub async fn handle_fetch(globals: &GlobalArgs, args: &ArgMatches) -> Result<()> {
    let handle = required(args, "HANDLE")?;
    let force = args.get_flag("force");
    let max_friends = max_friends(args);

    let client = connect(globals).await?;
    let bar = if globals.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let summary = run_fetch(&client, Path::new("."), &handle, force, max_friends, Some(&bar)).await;
    bar.finish_and_clear();
    let summary = summary?;

    println!(
        "{} fetched {}, already present {}, skipped {} over {} friends and {} protected",
        "✓".green().bold(),
        summary.fetched,
        summary.already_fetched,
        summary.too_many_friends,
        max_friends,
        summary.protected
    );
    Ok(())
}

// ============================================================================
// edgelist
// ============================================================================

/// Assemble `<h1>_<h2>.gml` from the collected nodes of `handles`. Ego mode
/// needs `client` to hydrate each handle's own account.
pub async fn run_edgelist(
    client: Option<&ApiClient>,
    root: &Path,
    handles: &[String],
    ego: bool,
    include_missing: bool,
) -> Result<PathBuf> {
    let mut users: Vec<UserObject> = Vec::new();
    for handle in handles {
        let path = collection_path(root, handle, DAT_EXT);
        let mut collected = read_records(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        users.append(&mut collected);
    }

    let store = AdjacencyStore::new(root);
    let mut assembler = GraphAssembler::new(&store).include_missing(include_missing);
    if ego {
        let Some(client) = client else {
            bail!("ego mode needs an API client");
        };
        for handle in handles {
            let me = client
                .show(handle)
                .await
                .with_context(|| format!("failed to retrieve details of {}", handle))?;
            assembler = assembler.with_ego(me);
        }
    }

    let graph = assembler.assemble(&users)?;
    let path = write_gml_file(root, handles, &graph)?;
    info!("{} created", path.display());
    Ok(path)
}

pub async fn handle_edgelist(globals: &GlobalArgs, args: &ArgMatches) -> Result<()> {
    let handles = required_many(args, "HANDLE")?;
    let ego = args.get_flag("ego");
    let include_missing = args.get_flag("missing");

    let client = if ego { Some(connect(globals).await?) } else { None };
    let path = run_edgelist(client.as_ref(), Path::new("."), &handles, ego, include_missing).await?;
    println!("{} {} created", "✓".green().bold(), path.display());
    Ok(())
}

// ============================================================================
// tweets
// ============================================================================

pub fn post_source(arg: &str, query: bool, list: Option<&str>, post_id: Option<u64>) -> PostSource {
    if query {
        PostSource::Search(arg.to_string())
    } else if let Some(slug) = list {
        PostSource::List {
            slug: slug.to_string(),
            owner: arg.to_string(),
        }
    } else if let Some(post_id) = post_id {
        PostSource::Replies {
            handle: arg.to_string(),
            post_id,
        }
    } else {
        PostSource::Timeline(arg.to_string())
    }
}

/// Collect posts from `source` into `<name>.qry`, one page at a time.
pub async fn run_tweets(
    client: &ApiClient,
    root: &Path,
    name: &str,
    source: &PostSource,
) -> Result<(PathBuf, usize)> {
    let path = collection_path(root, name, QUERY_EXT);
    let mut pages = 0usize;
    let total = client
        .posts(source, |page: Vec<Tweet>| -> Result<()> {
            write_records(&path, &page, pages > 0)?;
            pages += 1;
            Ok(())
        })
        .await?;

    if pages == 0 {
        write_records::<Tweet>(&path, &[], false)?;
    }
    info!("{} created", path.display());
    Ok((path, total))
}

pub async fn handle_tweets(globals: &GlobalArgs, args: &ArgMatches) -> Result<()> {
    let arg = required(args, "ARG")?;
    let source = post_source(
        &arg,
        args.get_flag("query"),
        args.get_one::<String>("list").map(String::as_str),
        args.get_one::<u64>("post").copied(),
    );

    let client = connect(globals).await?;
    let (path, total) = run_tweets(&client, Path::new("."), &arg, &source).await?;
    println!(
        "{} {} created ({} tweets)",
        "✓".green().bold(),
        path.display(),
        total
    );
    Ok(())
}

// ============================================================================
// resolve
// ============================================================================

/// `token, <other form>, N friends, N followers, N memberships, N tweets`
pub fn format_resolution(token: &str, user: &UserObject) -> String {
    let other = if digits_only(token) {
        user.screen_name.clone()
    } else {
        user.id.to_string()
    };
    format!(
        "{}, {}, {} friends, {} followers, {} memberships, {} tweets",
        token,
        other,
        user.friends_count,
        user.followers_count,
        user.listed_count,
        user.statuses_count
    )
}

pub async fn run_resolve(client: &ApiClient, tokens: &[String]) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(tokens.len());
    for token in tokens {
        let user = client
            .show(token)
            .await
            .with_context(|| format!("failed to retrieve details of {}", token))?;
        lines.push(format_resolution(token, &user));
    }
    Ok(lines)
}

pub async fn handle_resolve(globals: &GlobalArgs, args: &ArgMatches) -> Result<()> {
    let tokens = required_many(args, "HANDLE")?;
    let client = connect(globals).await?;
    for line in run_resolve(&client, &tokens).await? {
        println!("{}", line);
    }
    Ok(())
}

fn required(args: &ArgMatches, name: &str) -> Result<String> {
    args.get_one::<String>(name)
        .cloned()
        .with_context(|| format!("missing <{}>", name))
}

fn required_many(args: &ArgMatches, name: &str) -> Result<Vec<String>> {
    let values: Vec<String> = args
        .get_many::<String>(name)
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if values.is_empty() {
        bail!("missing <{}>", name);
    }
    Ok(values)
}
