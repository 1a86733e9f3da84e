use anyhow::{anyhow, Context, Result};
use augur_schema_rag::schema_rag::{provider_from_config, EmbeddingIndex, SchemaRetriever};
use augur_schema_rag::{augur, db, JoinGraph, ProviderKind, RagConfig, SchemaCatalog};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "augur-schema-rag")]
#[command(about = "Relevant-schema retrieval for natural-language questions over the Augur database")]
struct Args {
    /// Schema catalog JSON (or set AUGUR_RAG_CATALOG)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Persisted embedding index (or set AUGUR_RAG_INDEX)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Join hints JSON; built-in Augur join paths when omitted
    #[arg(long, global = true)]
    join_graph: Option<PathBuf>,

    /// Embedding provider: ollama or openai
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Embedding model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Embedding service base URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed the catalog and persist the index
    Build {
        /// Texts per embedding request
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Print the schema context for a question
    Ask {
        #[arg(required = true)]
        query: Vec<String>,

        #[arg(long)]
        table_k: Option<usize>,

        #[arg(long)]
        column_k: Option<usize>,

        /// Print the structured retrieval result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a catalog from a live database's information_schema
    Extract {
        /// PostgreSQL URL (or set DATABASE_URI / DATABASE_URL)
        #[arg(long)]
        database_url: Option<String>,

        #[arg(long, default_value = augur::SCHEMA_NAME)]
        schema: String,

        /// Only extract these tables (repeatable); the core Augur tables when omitted
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Extract every table in the schema
        #[arg(long, conflicts_with = "tables")]
        all: bool,

        /// Output file; defaults to the catalog path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the catalog as plain text
    Describe {
        /// Only describe these tables (repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = RagConfig::from_env().context("reading configuration")?;
    apply_args(&mut config, &args)?;

    match args.command {
        Command::Build { batch_size } => {
            if let Some(batch_size) = batch_size {
                config.embedding.batch_size = batch_size;
            }
            config.validate().context("validating configuration")?;
            build(&config).await
        }
        Command::Ask {
            query,
            table_k,
            column_k,
            json,
        } => {
            if let Some(k) = table_k {
                config.retrieval.table_k = k;
            }
            if let Some(k) = column_k {
                config.retrieval.column_k = k;
            }
            config.validate().context("validating configuration")?;
            ask(&config, &query.join(" "), json).await
        }
        Command::Extract {
            database_url,
            schema,
            tables,
            all,
            output,
        } => {
            let database_url = database_url
                .or_else(|| std::env::var("DATABASE_URI").ok())
                .or_else(|| std::env::var("DATABASE_URL").ok())
                .ok_or_else(|| anyhow!("no database URL: pass --database-url or set DATABASE_URI"))?;
            let output = output.unwrap_or_else(|| config.catalog_path.clone());
            let tables = augur::extraction_tables(&tables, all);
            extract(&database_url, &schema, &tables, &output).await
        }
        Command::Describe { tables } => {
            let catalog = SchemaCatalog::load(&config.catalog_path).context("loading catalog")?;
            println!("{}", catalog.describe(&tables));
            Ok(())
        }
    }
}

fn apply_args(config: &mut RagConfig, args: &Args) -> Result<()> {
    if let Some(path) = &args.catalog {
        config.catalog_path = path.clone();
    }
    if let Some(path) = &args.index {
        config.index_path = path.clone();
    }
    if let Some(path) = &args.join_graph {
        config.join_graph_path = Some(path.clone());
    }
    if let Some(provider) = &args.provider {
        config
            .embedding
            .set_provider(provider.parse::<ProviderKind>().context("parsing --provider")?);
    }
    if let Some(model) = &args.model {
        config.embedding.model_name = model.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.embedding.endpoint = endpoint.clone();
    }
    Ok(())
}

async fn build(config: &RagConfig) -> Result<()> {
    let catalog = SchemaCatalog::load(&config.catalog_path).context("loading catalog")?;
    let join_graph = match &config.join_graph_path {
        Some(path) => JoinGraph::load(path).context("loading join graph")?,
        None => augur::default_join_graph(),
    };
    let provider =
        provider_from_config(&config.embedding).context("configuring embedding provider")?;

    let index = EmbeddingIndex::build(
        &catalog,
        &join_graph,
        provider.as_ref(),
        config.embedding.batch_size,
    )
    .await
    .context("building index: embedding catalog texts")?;

    index.save(&config.index_path).context("saving index")?;
    info!(
        "Index ready: {} tables, {} columns, dimension {}",
        index.table_vectors.len(),
        index.column_vectors.len(),
        index.dimension
    );
    Ok(())
}

async fn ask(config: &RagConfig, query: &str, json: bool) -> Result<()> {
    let provider =
        provider_from_config(&config.embedding).context("configuring embedding provider")?;
    let retriever = SchemaRetriever::open(config, provider).context("opening index")?;

    info!("Retrieving schema context for: {}", query);
    let result = retriever
        .retrieve(query)
        .await
        .context("retrieving schema context")?;
    let context = result.render(&config.retrieval.schema_prefix);

    if json {
        let payload = serde_json::json!({
            "query": query,
            "context": context,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", context);
    }
    Ok(())
}

async fn extract(database_url: &str, schema: &str, tables: &[String], output: &Path) -> Result<()> {
    let pool = db::init_pool(database_url)
        .await
        .context("connecting to database")?;
    let catalog = db::extract_catalog(&pool, schema, tables)
        .await
        .context("reading information_schema")?;
    let catalog = augur::describe_tables(&catalog);

    catalog.save(output).context("writing catalog")?;
    info!(
        "Saved catalog with {} tables to {}",
        catalog.len(),
        output.display()
    );
    Ok(())
}
