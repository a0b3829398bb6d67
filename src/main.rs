//! CLI entry point for `mergemail`.

use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use mergemail::config;
use mergemail::database::Database;
use mergemail::deliver::{PromptCredentials, SendmailClient};
use mergemail::error::Result as MergeResult;
use mergemail::message::{self, CompiledMessage};
use mergemail::output::{self, OutputFormat};
use mergemail::sample;
use mergemail::template::{Renderer, Template};

#[derive(Parser)]
#[command(name = "mergemail", version, about = "A simple, command line mail merge tool.")]
struct Cli {
    /// Create sample template, database, and config
    #[arg(long)]
    sample: bool,

    /// Don't send email, just print (default)
    #[arg(long, overrides_with = "no_dry_run")]
    dry_run: bool,

    /// Send messages for real
    #[arg(long)]
    no_dry_run: bool,

    /// Limit the number of messages
    #[arg(long, default_value_t = 1, value_name = "N")]
    limit: u64,

    /// Do not limit the number of messages
    #[arg(long)]
    no_limit: bool,

    /// Start on message number N (one-based)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..), value_name = "N")]
    resume: u64,

    /// Template email file
    #[arg(long, default_value = "mergemail_template.txt", value_name = "PATH")]
    template: PathBuf,

    /// Database CSV file
    #[arg(long, default_value = "mergemail_database.csv", value_name = "PATH")]
    database: PathBuf,

    /// SMTP server configuration file
    #[arg(long, default_value = "mergemail_server.toml", value_name = "PATH")]
    config: PathBuf,

    /// File of template helper definitions (macros)
    #[arg(long, value_name = "PATH")]
    template_helpers: Option<PathBuf>,

    /// Console output format
    #[arg(long, value_enum, default_value = "colorized")]
    output_format: OutputFormat,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL", hide = true)]
    completion: Option<clap_complete::Shell>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completion {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "mergemail", &mut std::io::stdout());
        return Ok(());
    }

    setup_logging(cli.verbose);

    if cli.sample {
        sample::create_sample_files(&cli.template, &cli.database, &cli.config)?;
        println!("Created {}", cli.template.display());
        println!("Created {}", cli.database.display());
        println!("Created {}", cli.config.display());
        println!("Edit these files, then run mergemail again.");
        return Ok(());
    }

    check_input_files(&cli)?;
    run(&cli)
}

/// Set up tracing with stderr output.
fn setup_logging(verbose: u8) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

/// Check that input files exist, with hints for first-time users.
fn check_input_files(cli: &Cli) -> anyhow::Result<()> {
    if !cli.template.exists() {
        anyhow::bail!(
            "can't find template \"{}\".\n\n\
             Create a sample (--sample) or specify a file (--template).",
            cli.template.display()
        );
    }
    if !cli.database.exists() {
        anyhow::bail!(
            "can't find database \"{}\".\n\n\
             Create a sample (--sample) or specify a file (--database).",
            cli.database.display()
        );
    }
    if !cli.config.exists() {
        anyhow::bail!(
            "can't find config \"{}\".\n\n\
             Create a sample (--sample) or specify a file (--config).",
            cli.config.display()
        );
    }
    Ok(())
}

/// The render → compile → send loop.
fn run(cli: &Cli) -> anyhow::Result<()> {
    let dry_run = cli.dry_run || !cli.no_dry_run;
    let format = cli.output_format;

    // Config is loaded and validated even on a dry run, so a broken
    // config is caught before anyone drops --dry-run.
    let server_config = config::load_config(&cli.config)?;
    let template = Template::from_path(&cli.template)?;
    let renderer = match &cli.template_helpers {
        Some(path) => Renderer::with_helpers(path)?,
        None => Renderer::new(),
    };
    let database = Database::open(&cli.database)?;

    let mut client = if dry_run {
        None
    } else {
        Some(SendmailClient::new(
            server_config,
            Box::new(PromptCredentials),
        ))
    };

    // --resume is one-based; start/stop are zero-based row indexes.
    let start = (cli.resume - 1) as usize;
    let stop = if cli.no_limit {
        usize::MAX
    } else {
        start.saturating_add(cli.limit as usize)
    };

    for (index, row) in database.enumerate() {
        if index < start {
            continue;
        }
        if index >= stop {
            break;
        }
        let message_num = index + 1;

        match merge_one(&renderer, &template, row, index, client.as_mut()) {
            Ok(compiled) => {
                output::print_banner(&format!(">>> message {message_num}"), format);
                output::print_message(&compiled.to_wire(), format);
                let status = if dry_run { "not sent (dry run)" } else { "sent" };
                output::print_banner(&format!(">>> message {message_num} {status}"), format);
            }
            Err(error) => {
                let hint = if message_num > 1 {
                    format!("\nHint: \"--resume {message_num}\"")
                } else {
                    String::new()
                };
                anyhow::bail!("Error on message {message_num}\n{error}{hint}");
            }
        }
    }

    if !cli.no_limit {
        println!(
            ">>> Limit was {} message{}.  To remove the limit, use the --no-limit option.",
            cli.limit,
            if cli.limit == 1 { "" } else { "s" }
        );
    }
    if dry_run {
        println!(">>> This was a dry run.  To send messages, use the --no-dry-run option.");
    }

    Ok(())
}

/// Render, compile, and (unless dry-run) send one record's message.
fn merge_one(
    renderer: &Renderer,
    template: &Template,
    row: MergeResult<mergemail::database::Record>,
    ordinal: usize,
    client: Option<&mut SendmailClient>,
) -> MergeResult<CompiledMessage> {
    let record = row?;
    let rendered = renderer.render(template.text(), &record)?;
    let compiled = message::compile(&rendered, template.dir(), ordinal)?;
    if let Some(client) = client {
        client.send(&compiled)?;
    }
    Ok(compiled)
}
