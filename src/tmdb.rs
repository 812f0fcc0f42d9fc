use crate::models::{CatalogMovie, Genre};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::debug;

const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/";
/// TMDB refuses to page past this.
const MAX_SEARCH_PAGES: u32 = 500;
const MAX_RECOMMENDATIONS: usize = 6;
const MAX_CAST: usize = 10;

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    Day,
    Week,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
        }
    }
}

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn trending(&self, window: TimeWindow) -> Result<Page<CatalogMovie>>;
    async fn search(&self, query: &str, page: u32) -> Result<Page<CatalogMovie>>;
    async fn movie_details(&self, id: i64) -> Result<MovieDetails>;
    async fn movie_credits(&self, id: i64) -> Result<Credits>;
    async fn movie_videos(&self, id: i64) -> Result<Vec<Video>>;
    async fn movie_recommendations(&self, id: i64, page: u32) -> Result<Page<CatalogMovie>>;
    async fn genres(&self) -> Result<Vec<Genre>>;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Page<T> {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            page: 1,
            results: Vec::new(),
            total_pages: 0,
            total_results: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MovieDetails {
    #[serde(flatten)]
    pub movie: CatalogMovie,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub budget: Option<u64>,
    #[serde(default)]
    pub revenue: Option<u64>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

impl Credits {
    pub fn directors(&self) -> Vec<String> {
        self.crew
            .iter()
            .filter(|c| c.job.as_deref() == Some("Director"))
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CrewMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub job: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Video {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
    #[serde(default)]
    pub name: String,
}

impl Video {
    pub fn is_youtube_trailer(&self) -> bool {
        self.video_type == "Trailer" && self.site == "YouTube"
    }

    pub fn watch_url(&self) -> Option<String> {
        (self.site == "YouTube").then(|| format!("https://www.youtube.com/watch?v={}", self.key))
    }
}

/// Everything the detail view needs for one movie.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieOverview {
    pub details: MovieDetails,
    pub year: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub cast: Vec<CastMember>,
    pub directors: Vec<String>,
    pub trailers: Vec<Video>,
    pub recommendations: Vec<CatalogMovie>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Poster,
    Backdrop,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageScale {
    Small,
    Medium,
    Large,
    Original,
}

pub fn size_token(kind: ImageKind, scale: ImageScale) -> &'static str {
    match (kind, scale) {
        (_, ImageScale::Original) => "original",
        (ImageKind::Poster, ImageScale::Small) => "w185",
        (ImageKind::Poster, ImageScale::Medium) => "w342",
        (ImageKind::Poster, ImageScale::Large) => "w500",
        (ImageKind::Backdrop, ImageScale::Small) => "w300",
        (ImageKind::Backdrop, ImageScale::Medium) => "w780",
        (ImageKind::Backdrop, ImageScale::Large) => "w1280",
        (ImageKind::Profile, ImageScale::Small) => "w45",
        (ImageKind::Profile, ImageScale::Medium) => "w185",
        (ImageKind::Profile, ImageScale::Large) => "h632",
    }
}

/// Full image URL for a catalog path fragment, `None` when there is no path.
pub fn image_url(path: Option<&str>, size: &str) -> Option<String> {
    let path = path.filter(|p| !p.is_empty())?;
    Some(format!("{IMAGE_BASE}{size}{path}"))
}

pub fn genre_name(genres: &[Genre], id: i64) -> &str {
    genres
        .iter()
        .find(|g| g.id == id)
        .map(|g| g.name.as_str())
        .unwrap_or("Unknown")
}

/// Searches titles. A blank query yields an empty page without hitting the API.
pub async fn search_movies(api: &dyn TmdbApi, query: &str, page: u32) -> Result<Page<CatalogMovie>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(Page::empty());
    }
    let mut results = api.search(query, page.max(1)).await?;
    results.total_pages = results.total_pages.min(MAX_SEARCH_PAGES);
    Ok(results)
}

/// Fetches details, credits, videos and recommendations concurrently.
pub async fn movie_overview(api: &dyn TmdbApi, id: i64) -> Result<MovieOverview> {
    let (details, credits, videos, recommendations) = tokio::try_join!(
        api.movie_details(id),
        api.movie_credits(id),
        api.movie_videos(id),
        api.movie_recommendations(id, 1),
    )?;

    let poster_url = image_url(
        details.movie.poster_path.as_deref(),
        size_token(ImageKind::Poster, ImageScale::Large),
    );
    let backdrop_url = image_url(
        details.movie.backdrop_path.as_deref(),
        size_token(ImageKind::Backdrop, ImageScale::Large),
    );
    let year = details
        .movie
        .release_date
        .as_deref()
        .and_then(crate::models::extract_year);
    let directors = credits.directors();
    let cast = credits.cast.into_iter().take(MAX_CAST).collect();
    let trailers = videos
        .into_iter()
        .filter(Video::is_youtube_trailer)
        .collect();
    let recommendations = recommendations
        .results
        .into_iter()
        .take(MAX_RECOMMENDATIONS)
        .collect();

    Ok(MovieOverview {
        details,
        year,
        poster_url,
        backdrop_url,
        cast,
        directors,
        trailers,
        recommendations,
    })
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let api_key = env::var("TMDB_API_KEY").context("TMDB_API_KEY not set")?;
        Ok(Self::new(api_key))
    }

    fn url(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{TMDB_BASE}{endpoint}?api_key={}", self.api_key);
        for (k, v) in params {
            url.push('&');
            url.push_str(k);
            url.push('=');
            url.push_str(&urlencoding::encode(v));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, endpoint: &str, url: &str) -> Result<T> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            debug!("TMDB {} returned {}: {}", endpoint, status, text);
            return Err(anyhow!("TMDB API error: {}", status.as_u16()));
        }
        let parsed: T = serde_json::from_str(&text)
            .with_context(|| format!("JSON parse failed for {}", endpoint))?;
        Ok(parsed)
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn trending(&self, window: TimeWindow) -> Result<Page<CatalogMovie>> {
        let endpoint = format!("/trending/movie/{}", window.as_str());
        let url = self.url(&endpoint, &[]);
        self.get_json(&endpoint, &url).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<Page<CatalogMovie>> {
        let endpoint = "/search/movie";
        let url = self.url(
            endpoint,
            &[("query", query.to_string()), ("page", page.to_string())],
        );
        self.get_json(endpoint, &url).await
    }

    async fn movie_details(&self, id: i64) -> Result<MovieDetails> {
        let endpoint = format!("/movie/{id}");
        let url = self.url(&endpoint, &[]);
        self.get_json(&endpoint, &url).await
    }

    async fn movie_credits(&self, id: i64) -> Result<Credits> {
        let endpoint = format!("/movie/{id}/credits");
        let url = self.url(&endpoint, &[]);
        self.get_json(&endpoint, &url).await
    }

    async fn movie_videos(&self, id: i64) -> Result<Vec<Video>> {
        #[derive(Deserialize)]
        struct Videos {
            #[serde(default)]
            results: Vec<Video>,
        }

        let endpoint = format!("/movie/{id}/videos");
        let url = self.url(&endpoint, &[]);
        let data: Videos = self.get_json(&endpoint, &url).await?;
        Ok(data.results)
    }

    async fn movie_recommendations(&self, id: i64, page: u32) -> Result<Page<CatalogMovie>> {
        let endpoint = format!("/movie/{id}/recommendations");
        let url = self.url(&endpoint, &[("page", page.to_string())]);
        self.get_json(&endpoint, &url).await
    }

    async fn genres(&self) -> Result<Vec<Genre>> {
        #[derive(Deserialize)]
        struct GenreList {
            #[serde(default)]
            genres: Vec<Genre>,
        }

        let endpoint = "/genre/movie/list";
        let url = self.url(endpoint, &[]);
        let data: GenreList = self.get_json(endpoint, &url).await?;
        Ok(data.genres)
    }
}
