// OpenShelf - Personal Library Catalogue for Mobile
// Copyright (C) 2026 OpenShelf contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use clap::{Parser, Subcommand};

use openshelf_core::booklist::{builder, BooklistBuilder, Filters};
use openshelf_core::storage::models::{NewAuthor, NewBook};
use openshelf_core::storage::{queries, Database};
use openshelf_core::style;

#[derive(Parser)]
#[command(name = "openshelf-cli")]
#[command(about = "OpenShelf CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Database path (defaults to the per-OS data directory)
    #[arg(short, long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all booklist styles
    Styles,
    /// Add a book
    Add {
        /// Book title
        title: String,
        /// Author, e.g. "Le Guin, Ursula" or "Ursula Le Guin"
        #[arg(short, long)]
        author: Option<String>,
    },
    /// Build and print the booklist tree for a style
    Tree {
        /// Style UUID (defaults to "Authors, then Series")
        #[arg(short, long)]
        style: Option<String>,
        /// Free-text search filter
        #[arg(long)]
        search: Option<String>,
    },
    /// Count books in the catalogue
    Count,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let db = match &cli.database {
        Some(path) => Database::new(path).await?,
        None => Database::new(Database::get_default_path()).await?,
    };
    builder::purge_stale(db.pool()).await?;

    match cli.command {
        Commands::Styles => {
            for style in style::list_styles(db.pool()).await? {
                let groups: Vec<&str> = style.groups.iter().map(|g| g.label()).collect();
                println!("{}  {}  [{}]", style.uuid, style.name, groups.join(" > "));
            }
        }
        Commands::Add { title, author } => {
            let book_id = queries::insert_book(db.pool(), &NewBook::new(title.clone())).await?;
            if let Some(author) = author {
                let author_id =
                    queries::upsert_author(db.pool(), &NewAuthor::parse(&author)).await?;
                queries::add_book_author(db.pool(), book_id, author_id, 1).await?;
            }
            println!("Added '{}' as book {}", title, book_id);
        }
        Commands::Tree { style, search } => {
            let styles = style::list_styles(db.pool()).await?;
            let style = match style {
                Some(uuid) => {
                    let uuid = uuid::Uuid::parse_str(&uuid)?;
                    style::load_style(db.pool(), &uuid).await?
                }
                None => styles
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("No styles available"))?,
            };

            let filters = Filters {
                search,
                ..Default::default()
            };
            let mut list = BooklistBuilder::build(db.pool().clone(), &style, &filters).await?;
            let cursor = list.cursor();
            let count = cursor.visible_count().await?;
            for pos in 0..count {
                if let Some(row) = cursor.row_at(pos).await? {
                    let indent = "  ".repeat((row.level - 1).max(0) as usize);
                    if row.is_book() {
                        println!("{}- {}", indent, row.label);
                    } else {
                        println!("{}{}", indent, row.display_label());
                    }
                }
            }
            println!("({} rows, {} levels)", count, list.summary().level_count);
            list.close().await?;
        }
        Commands::Count => {
            println!("{} books", queries::count_books(db.pool()).await?);
        }
    }

    Ok(())
}
