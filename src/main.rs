use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use photo_catalog::config;
use photo_catalog::db::{self, PhotoQuery};
use photo_catalog::form::PhotoForm;
use photo_catalog::model::{Camera, FilmSimulation, SortBy};
use photo_catalog::{Asset, Catalog};

#[derive(Debug, Parser)]
#[command(author, version, about = "Admin tool for the photo catalog")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the photos table if it does not exist
    Init,
    /// List photos
    List(ListArgs),
    /// Show one photo
    Show { id: String },
    /// Photos around a photo in the default ordering
    Near {
        id: String,
        #[arg(long, default_value_t = 3)]
        limit: u32,
    },
    /// Upload an image and insert it
    Add(AddArgs),
    /// Distinct tags with counts
    Tags {
        #[arg(long)]
        hidden: bool,
    },
    /// Distinct cameras with counts
    Cameras {
        #[arg(long)]
        hidden: bool,
    },
    /// Distinct film simulations with counts
    Films {
        #[arg(long)]
        hidden: bool,
    },
    /// Catalog counts and capture date range
    Stats,
    /// Toggle favorite on a photo
    Favorite { id: String },
    /// Delete a photo and its stored asset
    Delete { id: String },
    /// Rename a tag on every photo
    RenameTag { tag: String, updated: String },
    /// Remove a tag from every photo
    DeleteTag { tag: String },
}

#[derive(Debug, ClapArgs)]
struct ListArgs {
    #[arg(long)]
    tag: Option<String>,
    #[arg(long, requires = "model")]
    make: Option<String>,
    #[arg(long, requires = "make")]
    model: Option<String>,
    /// Film simulation, e.g. classic-chrome
    #[arg(long)]
    film: Option<String>,
    /// createdAt | takenAt | priority
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// Include hidden photos
    #[arg(long)]
    hidden: bool,
}

#[derive(Debug, ClapArgs)]
struct AddArgs {
    /// Image file to upload
    file: PathBuf,
    #[arg(long)]
    title: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,
    /// Capture instant, RFC 3339
    #[arg(long, requires = "taken_at_naive")]
    taken_at: Option<String>,
    /// Local capture time, `YYYY-MM-DD HH:MM:SS`
    #[arg(long, requires = "taken_at")]
    taken_at_naive: Option<String>,
    #[arg(long)]
    aspect_ratio: Option<String>,
    #[arg(long)]
    blur_data: Option<String>,
    #[arg(long)]
    favorite: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn list_query(catalog: &Catalog, args: ListArgs) -> Result<PhotoQuery> {
    let mut query = catalog.query().offset(args.offset);
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(sort) = args.sort {
        let sort = SortBy::parse(&sort).ok_or_else(|| anyhow!("unknown sort '{}'", sort))?;
        query = query.sort_by(sort);
    }
    if let Some(tag) = args.tag {
        query = query.tag(tag);
    }
    if let (Some(make), Some(model)) = (args.make, args.model) {
        query = query.camera(Camera::new(make, model));
    }
    if let Some(film) = args.film {
        let simulation =
            FilmSimulation::parse(&film).ok_or_else(|| anyhow!("unknown film simulation '{}'", film))?;
        query = query.simulation(simulation);
    }
    if args.hidden {
        query = query.include_hidden();
    }
    Ok(query)
}

async fn add_photo(catalog: &Catalog, args: AddArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let extension = args
        .file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| anyhow!("{} has no extension", args.file.display()))?;
    let form = PhotoForm {
        extension: Some(extension),
        title: args.title,
        tags: args.tags,
        taken_at: args.taken_at,
        taken_at_naive: args.taken_at_naive,
        aspect_ratio: args.aspect_ratio,
        blur_data: args.blur_data,
        favorite: Some(args.favorite.to_string()),
        ..PhotoForm::default()
    };
    let record = catalog.create_photo(form, Some(Asset { bytes })).await?;
    print_json(&record)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let catalog = Catalog::connect(&cfg).await?;

    match args.command {
        Command::Init => {
            catalog.db().ensure_schema().await?;
            info!(url = %cfg.database_url(), "schema ready");
        }
        Command::List(list) => {
            let query = list_query(&catalog, list)?;
            print_json(&catalog.photos(&query).await?)?;
        }
        Command::Show { id } => {
            let photo = catalog
                .photo(&id)
                .await?
                .ok_or_else(|| anyhow!("photo {} not found", id))?;
            print_json(&photo)?;
        }
        Command::Near { id, limit } => print_json(&catalog.photos_near_id(&id, limit).await?)?,
        Command::Add(add) => add_photo(&catalog, add).await?,
        Command::Tags { hidden } => {
            let tags = if hidden {
                catalog.unique_tags_including_hidden().await?
            } else {
                catalog.unique_tags().await?
            };
            print_json(&tags)?;
        }
        Command::Cameras { hidden } => {
            let cameras = if hidden {
                catalog.unique_cameras_including_hidden().await?
            } else {
                catalog.unique_cameras().await?
            };
            print_json(&cameras)?;
        }
        Command::Films { hidden } => {
            let films = if hidden {
                catalog.unique_film_simulations_including_hidden().await?
            } else {
                catalog.unique_film_simulations().await?
            };
            print_json(&films)?;
        }
        Command::Stats => {
            let (count, count_all, range) = futures::join!(
                catalog.photos_count_or_default(),
                catalog.photos_count_including_hidden_or_default(),
                catalog.photos_date_range_or_default(),
            );
            print_json(&serde_json::json!({
                "count": count,
                "countIncludingHidden": count_all,
                "dateRange": range,
            }))?;
        }
        Command::Favorite { id } => {
            let favorite = catalog.toggle_favorite(&id).await?;
            info!(%id, favorite, "favorite toggled");
        }
        Command::Delete { id } => {
            let photo = db::get_photo(catalog.db(), &id)
                .await?
                .ok_or_else(|| anyhow!("photo {} not found", id))?;
            catalog.delete_photo(&photo.id, &photo.url).await?;
        }
        Command::RenameTag { tag, updated } => {
            let renamed = catalog.rename_tag_globally(&tag, &updated).await?;
            info!(renamed, "rename-tag done");
        }
        Command::DeleteTag { tag } => {
            let updated = catalog.delete_tag_globally(&tag).await?;
            info!(updated, "delete-tag done");
        }
    }

    Ok(())
}
