//! Fetch TMDB data for a movie and print what the detail view would receive.
//! Usage:
//!   cargo run --bin tmdb_props -- <tmdb_id>
//!   cargo run --bin tmdb_props -- search <title> [page]
//!   cargo run --bin tmdb_props -- trending [day|week]
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use movie_explorer::models::MovieSummary;
use movie_explorer::tmdb::{self, TimeWindow, TmdbApi, TmdbClient};
use serde_json::json;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    let args: Vec<String> = env::args().skip(1).collect();
    let client = TmdbClient::from_env()?;

    let output = match args.first().map(String::as_str) {
        Some("search") => {
            let query = args.get(1).context("search needs a title")?;
            let page = args
                .get(2)
                .map(|p| p.parse::<u32>())
                .transpose()
                .context("page must be a number")?
                .unwrap_or(1);
            let results = tmdb::search_movies(&client, query, page).await?;
            json!({
                "page": results.page,
                "total_pages": results.total_pages,
                "summaries": results.results.iter().map(MovieSummary::from).collect::<Vec<_>>(),
            })
        }
        Some("trending") => {
            let window = match args.get(1).map(String::as_str) {
                Some("week") => TimeWindow::Week,
                _ => TimeWindow::Day,
            };
            let results = client.trending(window).await?;
            json!({
                "window": window,
                "summaries": results.results.iter().map(MovieSummary::from).collect::<Vec<_>>(),
            })
        }
        Some(raw) => {
            let id: i64 = raw.parse().context("movie id must be a number")?;
            let overview = tmdb::movie_overview(&client, id).await?;
            serde_json::to_value(overview)?
        }
        None => anyhow::bail!("usage: tmdb_props <tmdb_id> | search <title> [page] | trending [day|week]"),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
