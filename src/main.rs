use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use waffly::posts::attachments::load_local_image;
use waffly::posts::{ComposeSession, HttpImageTransport, HttpPostApi, PostDraft, SubmitReport};
use waffly::Config;

#[derive(Parser)]
#[command(author, version, about = "Create and edit Waffly board posts with image attachments", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    /// Create or edit posts
    Post(PostCommands),

    #[command(subcommand)]
    /// Inspect configuration
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum PostCommands {
    /// Create a post, attaching local images
    Create {
        #[arg(long)]
        board: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        contents: String,
        #[arg(long)]
        question: bool,
        #[arg(long)]
        anonymous: bool,
        /// Image file to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,
        /// Image description as FILENAME=TEXT (repeatable)
        #[arg(long = "describe")]
        descriptions: Vec<String>,
    },
    /// Edit an existing post, adding or removing images
    Edit {
        #[arg(long)]
        board: i64,
        #[arg(long)]
        post: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        contents: String,
        /// Image file to add (repeatable)
        #[arg(long = "add-image")]
        add_images: Vec<String>,
        /// Filename of an attached image to remove (repeatable)
        #[arg(long = "remove-image")]
        remove_images: Vec<String>,
        /// Image description as FILENAME=TEXT (repeatable)
        #[arg(long = "describe")]
        descriptions: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the JSON schema of the config file
    Schema,
    /// Print the default config file location
    Path,
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_description(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .with_context(|| format!("Expected FILENAME=TEXT, got {raw:?}"))
}

async fn open_session(config: &Config, board: i64, post: Option<i64>) -> Result<ComposeSession> {
    let api = HttpPostApi::with_timeout(
        &config.api.base_url,
        config.timeout(),
        &config.api.user_agent,
    )?;
    info!("using API at {}", api.base_url());
    let transport = HttpImageTransport::with_timeout(config.timeout())?;
    let session = ComposeSession::open(
        Arc::new(api),
        Arc::new(transport),
        config.session_limits(),
        board,
        post,
    )
    .await?;
    Ok(session)
}

async fn attach(session: &mut ComposeSession, paths: &[String]) -> Result<()> {
    for path in paths {
        let image = load_local_image(path).await?;
        session.add_image(image.filename, image.bytes)?;
    }
    Ok(())
}

fn describe_all(session: &mut ComposeSession, descriptions: &[String]) -> Result<()> {
    for raw in descriptions {
        let (filename, text) = parse_description(raw)?;
        let Some(local_id) = session
            .working()
            .records()
            .iter()
            .find(|r| r.filename == filename)
            .map(|r| r.local_id)
        else {
            bail!("No attached image named {filename}");
        };
        session.edit_description(local_id, filename, text);
    }
    Ok(())
}

fn report(report: &SubmitReport) -> Result<()> {
    println!("post {} on board {}", report.post.post_id, report.post.board_id);
    for outcome in &report.uploads {
        match &outcome.result {
            Ok(()) => println!("  uploaded {}", outcome.filename),
            Err(e) => println!("  FAILED   {}: {}", outcome.filename, e),
        }
    }
    let failed = report.failed_uploads().count();
    if failed > 0 {
        bail!("{failed} image upload(s) failed");
    }
    Ok(())
}

async fn run_post(config: &Config, command: PostCommands) -> Result<()> {
    match command {
        PostCommands::Create {
            board,
            title,
            contents,
            question,
            anonymous,
            images,
            descriptions,
        } => {
            let mut session = open_session(config, board, None).await?;
            attach(&mut session, &images).await?;
            describe_all(&mut session, &descriptions)?;
            info!("submitting post with {} image(s)", session.working().len());
            let result = session
                .submit(PostDraft {
                    title,
                    contents,
                    is_question: question,
                    is_anonymous: anonymous,
                })
                .await?;
            report(&result)
        }
        PostCommands::Edit {
            board,
            post,
            title,
            contents,
            add_images,
            remove_images,
            descriptions,
        } => {
            let mut session = open_session(config, board, Some(post)).await?;
            for filename in &remove_images {
                let ids: Vec<i64> = session
                    .working()
                    .records()
                    .iter()
                    .filter(|r| &r.filename == filename)
                    .map(|r| r.local_id)
                    .collect();
                if ids.is_empty() {
                    warn!("post has no image named {}", filename);
                }
                for id in ids {
                    session.delete_image(id, filename);
                }
            }
            attach(&mut session, &add_images).await?;
            describe_all(&mut session, &descriptions)?;
            let result = session
                .submit(PostDraft {
                    title,
                    contents,
                    ..Default::default()
                })
                .await?;
            report(&result)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Post(command) => run_post(&config, command).await?,
        Commands::Config(ConfigCommands::Show) => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Config(ConfigCommands::Schema) => {
            println!("{}", Config::json_schema()?);
        }
        Commands::Config(ConfigCommands::Path) => match Config::default_path() {
            Some(path) => println!("{}", path.display()),
            None => bail!("No home directory; pass --config explicitly"),
        },
    }

    Ok(())
}
