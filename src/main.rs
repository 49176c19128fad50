use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{self, EnvFilter};

use listing_search::config::Config;
use listing_search::listing::Source;
use listing_search::search::{
    CountMode, InMemorySource, ListRequest, ListingFilters, PageRequest, SmartQuery, SortKey,
    SourceAdapter, SourceListMerger, SuggestionService,
};
use listing_search::text::build_aliases;

#[derive(Debug, Parser)]
#[command(name = "listing-search", version, about = "Search vehicle listings across sources")]
struct Cli {
    /// Directory holding one `<source>.json` array of listings per source
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List one merged page of listings
    Search {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = SortKey::Newest)]
        sort: SortKey,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// `exact` for a total count, `none` for a has-next flag
        #[arg(long, default_value = "exact")]
        count_mode: CountMode,
    },
    /// Autocomplete labels for partial text
    Suggest {
        text: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long = "source", value_name = "SOURCE")]
        sources: Vec<Source>,
    },
    /// Model years available under the given filters
    Years {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Show the aliases and search terms derived from text
    Aliases { text: String },
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Free text; wrap in double quotes for an exact phrase
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    exact: bool,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    min_mileage: Option<u64>,
    #[arg(long)]
    max_mileage: Option<u64>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    model: Option<String>,
    /// Earliest post date, YYYY-MM-DD
    #[arg(long, value_name = "DATE")]
    from: Option<String>,
    /// Latest post date, YYYY-MM-DD
    #[arg(long, value_name = "DATE")]
    to: Option<String>,
    #[arg(long)]
    year: Option<i32>,
    #[arg(long = "source", value_name = "SOURCE")]
    sources: Vec<Source>,
}

impl FilterArgs {
    fn to_filters(&self) -> Result<ListingFilters> {
        Ok(ListingFilters {
            text: self.text.clone(),
            exact: self.exact,
            city: self.city.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            min_mileage: self.min_mileage,
            max_mileage: self.max_mileage,
            category: self.category.clone(),
            brand: self.brand.clone(),
            model: self.model.clone(),
            posted_from: self.from.as_deref().map(|d| day_bound(d, false)).transpose()?,
            posted_to: self.to.as_deref().map(|d| day_bound(d, true)).transpose()?,
            model_year: self.year,
        })
    }
}

/// Epoch milliseconds at the start (or last millisecond) of a UTC day.
fn day_bound(date: &str, end_of_day: bool) -> Result<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
    let time = if end_of_day {
        day.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        day.and_hms_opt(0, 0, 0)
    };
    let time = time.with_context(|| format!("Invalid time of day for {}", date))?;
    Ok(time.and_utc().timestamp_millis())
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("listing-search"))
        .context("Could not determine data directory")
}

async fn load_adapters(data_dir: &Path, config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for source in Source::ALL {
        let path = data_dir.join(format!("{}.json", source));
        if !path.exists() {
            tracing::debug!("No listings file for {} at {}", source, path.display());
            continue;
        }
        let adapter = InMemorySource::from_json_file(source, &path)
            .await?
            .with_min_model_year(config.merge.min_model_year);
        adapters.push(Arc::new(adapter));
    }

    if adapters.is_empty() {
        anyhow::bail!("No listing files found in {}", data_dir.display());
    }
    Ok(adapters)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Command::Aliases { text } = &cli.command {
        let query = SmartQuery::build(text, false, &config.search);
        return print_json(&json!({
            "aliases": build_aliases(text),
            "terms": query.as_ref().map(|q| {
                q.groups
                    .iter()
                    .map(|g| json!({ "token": g.token, "aliases": g.aliases }))
                    .collect::<Vec<_>>()
            }),
            "indexQuery": query.as_ref().map(|q| q.index_query.clone()),
            "exact": query.as_ref().is_some_and(|q| q.exact),
        }));
    }

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    tracing::info!("Loading listings from {}", data_dir.display());
    let adapters = load_adapters(&data_dir, &config).await?;

    match cli.command {
        Command::Search {
            filters,
            sort,
            page,
            limit,
            count_mode,
        } => {
            let merger = SourceListMerger::new(adapters, &config)?;
            let request = ListRequest {
                filters: filters.to_filters()?,
                page: PageRequest {
                    page,
                    limit,
                    sort,
                    count_mode,
                },
                sources: filters.sources.clone(),
            };
            print_json(&merger.list(&request).await?)
        }
        Command::Suggest {
            text,
            limit,
            sources,
        } => {
            let service = SuggestionService::new(adapters, &config)?;
            print_json(&service.suggest(&text, &sources, limit).await?)
        }
        Command::Years { filters } => {
            let merger = SourceListMerger::new(adapters, &config)?;
            let years = merger
                .model_year_facet(&filters.to_filters()?, &filters.sources)
                .await?;
            print_json(&years)
        }
        Command::Aliases { .. } => Ok(()),
    }
}
