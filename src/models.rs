use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog identifier as handed to us by a caller.
///
/// TMDB returns numeric ids, but ids also arrive as text (URL path segments,
/// values written by older clients). The original representation is kept so
/// persisted data round-trips unchanged; comparisons always go through
/// [`MovieId::normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MovieId {
    Number(serde_json::Number),
    Text(String),
}

impl MovieId {
    /// Canonical integer form, or `None` when the value is not an integral number.
    pub fn normalize(&self) -> Option<i64> {
        match self {
            MovieId::Number(n) => normalize_number(n),
            MovieId::Text(s) => normalize_text(s),
        }
    }

    /// True when both ids normalize to the same integer.
    pub fn matches(&self, other: &MovieId) -> bool {
        match (self.normalize(), other.normalize()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

fn normalize_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(v) = n.as_i64() {
        return Some(v);
    }
    let f = n.as_f64()?;
    float_to_id(f)
}

fn normalize_text(s: &str) -> Option<i64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    trimmed.parse::<f64>().ok().and_then(float_to_id)
}

fn float_to_id(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl From<i64> for MovieId {
    fn from(id: i64) -> Self {
        MovieId::Number(id.into())
    }
}

impl From<i32> for MovieId {
    fn from(id: i32) -> Self {
        MovieId::Number(id.into())
    }
}

impl From<&str> for MovieId {
    fn from(id: &str) -> Self {
        MovieId::Text(id.to_string())
    }
}

impl From<String> for MovieId {
    fn from(id: String) -> Self {
        MovieId::Text(id)
    }
}

impl FromStr for MovieId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(MovieId::from(s))
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovieId::Number(n) => write!(f, "{n}"),
            MovieId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// A movie as it appears in catalog listings (trending, search, recommendations).
///
/// Unknown fields in the payload are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMovie {
    pub id: MovieId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<u64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genre_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
    #[serde(default)]
    pub adult: Option<bool>,
}

/// The slice of catalog data kept for a favorite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieSummary {
    pub id: MovieId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl MovieSummary {
    pub fn year(&self) -> Option<String> {
        self.release_date.as_deref().and_then(extract_year)
    }
}

impl From<&CatalogMovie> for MovieSummary {
    fn from(movie: &CatalogMovie) -> Self {
        Self {
            id: movie.id.clone(),
            title: movie.title.clone(),
            poster_path: movie.poster_path.clone(),
            backdrop_path: movie.backdrop_path.clone(),
            vote_average: movie.vote_average,
            release_date: movie.release_date.clone(),
            overview: movie.overview.clone().unwrap_or_default(),
            genre_ids: movie.genre_ids.clone().unwrap_or_default(),
            genres: movie.genres.clone().unwrap_or_default(),
        }
    }
}

pub fn extract_year(date: &str) -> Option<String> {
    date.split('-')
        .next()
        .map(str::trim)
        .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
        .map(|y| y.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_text_ids_are_equivalent() {
        let numeric = MovieId::from(42);
        let text = MovieId::from("42");
        assert!(numeric.matches(&text));
        assert!(MovieId::from(" 42 ").matches(&numeric));
        assert_eq!(text.normalize(), Some(42));
    }

    #[test]
    fn integral_floats_normalize() {
        let id: MovieId = serde_json::from_value(json!(42.0)).unwrap();
        assert_eq!(id.normalize(), Some(42));
        let id: MovieId = serde_json::from_value(json!(42.5)).unwrap();
        assert_eq!(id.normalize(), None);
    }

    #[test]
    fn ids_past_i64_range_do_not_collide() {
        let max: MovieId = serde_json::from_value(json!(i64::MAX)).unwrap();
        let past: MovieId = serde_json::from_value(json!(9223372036854775808u64)).unwrap();
        assert_eq!(max.normalize(), Some(i64::MAX));
        assert_eq!(past.normalize(), None);
        assert!(!max.matches(&past));
        assert_eq!(MovieId::from("9223372036854775808").normalize(), None);
    }

    #[test]
    fn garbage_ids_never_match() {
        let bad = MovieId::from("abc");
        assert_eq!(bad.normalize(), None);
        assert!(!bad.matches(&MovieId::from("abc")));
        assert!(!MovieId::from("").matches(&MovieId::from(0)));
    }

    #[test]
    fn id_keeps_representation_when_serialized() {
        assert_eq!(serde_json::to_value(MovieId::from("7")).unwrap(), json!("7"));
        assert_eq!(serde_json::to_value(MovieId::from(7)).unwrap(), json!(7));
    }

    #[test]
    fn summary_projection_drops_extras_and_fills_defaults() {
        let movie: CatalogMovie = serde_json::from_value(json!({
            "id": 550,
            "title": "Fight Club",
            "poster_path": "/p.jpg",
            "popularity": 61.4,
            "adult": false,
            "media_type": "movie",
            "release_date": "1999-10-15"
        }))
        .unwrap();
        let summary = MovieSummary::from(&movie);
        assert_eq!(summary.title, "Fight Club");
        assert_eq!(summary.overview, "");
        assert!(summary.genre_ids.is_empty());
        assert!(summary.genres.is_empty());
        assert_eq!(summary.year().as_deref(), Some("1999"));

        let encoded = serde_json::to_value(&summary).unwrap();
        assert!(encoded.get("popularity").is_none());
        assert!(encoded.get("adult").is_none());
    }

    #[test]
    fn year_requires_four_digits() {
        assert_eq!(extract_year("2024-01-01").as_deref(), Some("2024"));
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("soon"), None);
    }
}
