//! One-shot CLI for the query pipeline
//!
//! Run with: cargo run -- ask "list all names" --csv data.csv

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use queryforge::config::ServiceConfig;
use queryforge::llm::LlmClient;
use queryforge::pipeline::Pipeline;
use queryforge::source::{CsvConfig, DataSourceDescriptor, MySqlConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "queryforge")]
#[command(about = "Ask natural-language questions against MySQL or CSV data")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate and execute a query for a question
    Ask {
        /// The question in natural language
        question: String,

        #[command(flatten)]
        source: SourceArgs,

        /// OpenAI API key (or set OPENAI_API_KEY env var)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Print the introspected schema of a data source
    Schema {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(clap::Args)]
struct SourceArgs {
    /// CSV file to query (loaded into an in-memory table named 'data')
    #[arg(long)]
    csv: Option<PathBuf>,

    /// MySQL host (default: DATABASE_HOST env var)
    #[arg(long)]
    host: Option<String>,

    /// MySQL port
    #[arg(long)]
    port: Option<u16>,

    /// MySQL user
    #[arg(long)]
    user: Option<String>,

    /// MySQL password
    #[arg(long)]
    password: Option<String>,

    /// MySQL database name
    #[arg(long)]
    database: Option<String>,
}

impl SourceArgs {
    fn descriptor(&self, config: &ServiceConfig) -> Result<DataSourceDescriptor> {
        if let Some(path) = &self.csv {
            let content = std::fs::read_to_string(path)
                .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
            return Ok(DataSourceDescriptor::Csv(CsvConfig {
                csv_content: Some(content),
                csv_path: None,
            }));
        }

        let legacy = &config.legacy_database;
        Ok(DataSourceDescriptor::MySql(MySqlConfig {
            host: self.host.clone().unwrap_or_else(|| legacy.host.clone()),
            port: self.port.unwrap_or(legacy.port),
            user: self.user.clone().unwrap_or_else(|| legacy.user.clone()),
            password: self
                .password
                .clone()
                .unwrap_or_else(|| legacy.password.clone()),
            database: self
                .database
                .clone()
                .unwrap_or_else(|| legacy.database.clone()),
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ServiceConfig::from_env();
    let pipeline = Pipeline::new(&config);

    match args.command {
        Commands::Ask {
            question,
            source,
            api_key,
        } => {
            let api_key = api_key
                .or_else(|| Some(config.api_key.clone()).filter(|k| !k.is_empty()))
                .ok_or_else(|| anyhow!("no API key: pass --api-key or set OPENAI_API_KEY"))?;
            let llm = LlmClient::new(api_key, config.model.clone(), config.api_base_url.clone());

            let descriptor = source.descriptor(&config)?;
            let response = pipeline
                .run_query(&llm, &descriptor, &question, &[])
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Schema { source } => {
            let descriptor = source.descriptor(&config)?;
            let response = pipeline.fetch_schema(&descriptor).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
