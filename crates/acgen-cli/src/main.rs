mod cmd;
mod output;

use acgen_core::types::PublishMode;
use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "acgen",
    about = "Generate Gherkin acceptance criteria and test scenarios for Jira stories",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (missing file means defaults plus environment)
    #[arg(long, global = true, env = "ACGEN_CONFIG", default_value = acgen_core::config::CONFIG_FILE)]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides server.port; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run the full pipeline for one issue: fetch, criteria, tests, publish
    Run {
        /// Jira issue key, e.g. PROJ-123
        issue: String,

        /// Provider to use instead of llm.provider
        #[arg(long, short = 'p')]
        provider: Option<String>,

        /// Extra context passed to the model
        #[arg(long)]
        context: Option<String>,

        /// Where to publish the test scenarios
        #[arg(long)]
        publish_mode: Option<PublishMode>,

        /// Where to publish the acceptance criteria (description, comment, custom_field)
        #[arg(long)]
        ac_publish_mode: Option<PublishMode>,

        /// Stop after test generation
        #[arg(long)]
        no_publish: bool,

        /// Stop after acceptance criteria
        #[arg(long)]
        no_tests: bool,
    },

    /// Show one Jira story
    Fetch {
        /// Jira issue key
        issue: String,
    },

    /// Search Jira stories with JQL
    Search {
        /// JQL query
        jql: String,

        #[arg(long, default_value = "50")]
        max_results: usize,
    },

    /// Generate acceptance criteria for an issue or free text, without publishing
    Criteria {
        /// Jira issue key
        #[arg(long, conflicts_with = "text")]
        issue: Option<String>,

        /// Story text to use instead of a Jira issue
        #[arg(long, required_unless_present = "issue")]
        text: Option<String>,

        /// Title for --text stories
        #[arg(long, requires = "text")]
        title: Option<String>,

        #[arg(long, short = 'p')]
        provider: Option<String>,

        #[arg(long)]
        context: Option<String>,

        #[arg(long)]
        max_scenarios: Option<usize>,
    },

    /// List providers and whether they are configured
    Providers {
        /// Also ask each configured provider whether it is reachable
        #[arg(long)]
        probe: bool,
    },

    /// Create, inspect, and validate the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let path = cli.config.as_path();
    let json = cli.json;

    let result = match cli.command {
        Commands::Serve { host, port } => cmd::serve::run(path, host, port),
        Commands::Run {
            issue,
            provider,
            context,
            publish_mode,
            ac_publish_mode,
            no_publish,
            no_tests,
        } => cmd::run::run(
            path,
            cmd::run::RunArgs {
                issue,
                provider,
                context,
                publish_mode,
                ac_publish_mode,
                no_publish,
                no_tests,
            },
            json,
        ),
        Commands::Fetch { issue } => cmd::jira::fetch(path, &issue, json),
        Commands::Search { jql, max_results } => cmd::jira::search(path, &jql, max_results, json),
        Commands::Criteria {
            issue,
            text,
            title,
            provider,
            context,
            max_scenarios,
        } => cmd::criteria::run(
            path,
            acgen_core::pipeline::CriteriaRequest {
                issue_id: issue,
                story_text: text,
                story_title: title,
                context,
                llm_provider: provider,
                max_scenarios,
            },
            json,
        ),
        Commands::Providers { probe } => cmd::providers::run(path, probe, json),
        Commands::Config { subcommand } => cmd::config::run(path, subcommand, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
