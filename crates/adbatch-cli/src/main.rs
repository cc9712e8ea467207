use std::path::PathBuf;
use std::sync::Arc;

use adbatch_pipeline::{
    AssetStager, BatchOrchestrator, BatchRequest, ObjectStoreBlobStore, OrchestratorConfig,
    StagedBatch,
};
use adbatch_platform::{AdStatus, AdsPlatform, GraphClient, GraphClientConfig};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "adbatch")]
#[command(about = "Bulk video ad creation from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List ad accounts visible to the access token
    Accounts,
    /// List active campaigns under an ad account
    Campaigns {
        /// Ad account id, with or without the `act_` prefix
        account_id: String,
    },
    /// Upload videos and create one ad per video and ad set
    Create {
        #[arg(long)]
        account: String,
        /// Ad set id; repeat the flag or separate ids with commas
        #[arg(long = "target", required = true, value_delimiter = ',')]
        targets: Vec<String>,
        #[arg(long, default_value = "")]
        prefix: String,
        /// Ad name used when exactly one video and one ad set are given
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum, default_value_t = StatusArg::Paused)]
        status: StatusArg,
        /// Image uploaded once and attached to every creative
        #[arg(long)]
        thumbnail: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusArg {
    Paused,
    Active,
}

impl From<StatusArg> for AdStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Paused => AdStatus::Paused,
            StatusArg::Active => AdStatus::Active,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = adbatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let platform: Arc<dyn AdsPlatform> =
        Arc::new(GraphClient::new(&GraphClientConfig::from_app_config(&config))?);

    match cli.command {
        Commands::Accounts => {
            let accounts = platform.list_ad_accounts().await?;
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
        Commands::Campaigns { account_id } => {
            let campaigns = platform.list_campaigns(&account_id).await?;
            println!("{}", serde_json::to_string_pretty(&campaigns)?);
        }
        Commands::Create {
            account,
            targets,
            prefix,
            name,
            status,
            thumbnail,
            files,
        } => {
            let stager = AssetStager::new(&config.upload_dir, config.max_upload_bytes).await?;
            let mut batch = StagedBatch::new();
            for file in &files {
                batch.push_video(stager.stage_file(file).await?);
            }
            if let Some(path) = &thumbnail {
                batch.set_thumbnail(stager.stage_file(path).await?);
            }

            let mut orchestrator =
                BatchOrchestrator::new(platform, OrchestratorConfig::from_app_config(&config));
            if let Some(bucket) = &config.blob_bucket {
                orchestrator = orchestrator
                    .with_blob_store(Arc::new(ObjectStoreBlobStore::s3_from_env(bucket)?));
            }

            let request = BatchRequest {
                account_id: account,
                targets,
                name_prefix: prefix,
                ad_name: name,
                status: status.into(),
                blob_bucket: config.blob_bucket.clone(),
            };
            let report = orchestrator.run(batch, &request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.is_complete() {
                anyhow::bail!("{} unit(s) failed", report.failures.len());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
