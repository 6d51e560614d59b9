use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;

use passverify::config::{Config, MailConfig, RunConfig, SheetConfig};
use passverify::pipeline;

/// passverify: A tool required to insert data into a remote Google Sheet.
#[derive(Parser)]
#[command(name = "passverify", version)]
struct Cli {
    /// IMAP server address (host or host:port)
    #[arg(env = "PASSVERIFY_IMAP_SERVER")]
    imap_server: String,

    /// Email address
    #[arg(env = "PASSVERIFY_EMAIL")]
    email: String,

    /// App code
    #[arg(env = "PASSVERIFY_APPCODE", hide_env_values = true)]
    appcode: String,

    /// Inbox folder
    #[arg(env = "PASSVERIFY_INBOX")]
    inbox: String,

    /// File with Google API credentials
    #[arg(env = "PASSVERIFY_API_FILE")]
    api_file: PathBuf,

    /// Google sheet name
    #[arg(env = "PASSVERIFY_SHEET_NAME")]
    sheet_name: String,

    /// Page number. Start counting with 0, so first is 0.
    #[arg(env = "PASSVERIFY_PAGE_NUMBER")]
    page_number: usize,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            mail: MailConfig::new(
                &self.imap_server,
                self.email,
                SecretString::from(self.appcode),
                self.inbox,
            ),
            sheet: SheetConfig {
                credentials_file: self.api_file,
                spreadsheet: self.sheet_name,
                worksheet_index: self.page_number,
            },
            run: RunConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = cli.into_config();
    let report = pipeline::run(&config)
        .await
        .context("pass synchronization failed")?;

    if let Some(report) = report {
        tracing::info!(
            inserted = report.ids.len(),
            output = %config.run.output_dir.display(),
            "Done"
        );
    }
    Ok(())
}
