use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::MapConfig;
use crate::error::ApiError;

const PLACE_SEARCH_BASE: &str = "https://apis.map.qq.com";
const PLACE_SEARCH_PATH: &str = "/ws/place/v1/search";
const REQUEST_TIMEOUT_MS: u64 = 3500;
const PAGE_SIZE: &str = "10";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub lat: f64,
    pub lon: f64,
    pub label: String,
}

#[async_trait]
pub trait GeoClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Place>, ApiError>;
}

/// Tencent place-search client. Requests are signed when a secret key is
/// configured: `sig = md5(path + "?" + sorted_raw_query + secret)`,
/// appended as the last query parameter.
pub struct TencentMapClient {
    http: reqwest::Client,
    key: Option<String>,
    secret_key: Option<String>,
}

impl TencentMapClient {
    pub fn new(config: &MapConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()?;
        Ok(Self {
            http,
            key: config.key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }
}

fn build_signed_url(
    base: &str,
    path: &str,
    params: &[(&str, &str)],
    secret_key: Option<&str>,
) -> Result<Url, ApiError> {
    let mut entries: Vec<(&str, &str)> = params.to_vec();
    entries.sort_by_key(|(k, _)| *k);

    let mut url = Url::parse(base)
        .map_err(|e| ApiError::Infra(anyhow::anyhow!("bad map base url: {e}")))?;
    url.set_path(path);
    for (k, v) in &entries {
        url.query_pairs_mut().append_pair(k, v);
    }

    if let Some(sk) = secret_key {
        let raw_query = entries
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Md5::new();
        hasher.update(format!("{path}?{raw_query}{sk}").as_bytes());
        let sig = hex::encode(hasher.finalize());
        url.query_pairs_mut().append_pair("sig", &sig);
    }

    Ok(url)
}

fn is_valid_coord(lon: f64, lat: f64) -> bool {
    lon.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat)
}

#[derive(Deserialize)]
struct PlaceSearchResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    data: Vec<PlaceRow>,
}

#[derive(Deserialize)]
struct PlaceRow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    address: String,
    location: Option<Coordinates>,
}

#[derive(Deserialize)]
struct Coordinates {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl GeoClient for TencentMapClient {
    async fn search(&self, query: &str) -> Result<Vec<Place>, ApiError> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| ApiError::Upstream("geocoding is not configured".into()))?;

        let params = [
            ("key", key.as_str()),
            ("keyword", query),
            ("page_size", PAGE_SIZE),
        ];
        let url = build_signed_url(
            PLACE_SEARCH_BASE,
            PLACE_SEARCH_PATH,
            &params,
            self.secret_key.as_deref(),
        )?;

        let response: PlaceSearchResponse = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if response.status != 0 {
            return Err(ApiError::Upstream(format!(
                "place search failed with status {}",
                response.status
            )));
        }

        let places = response
            .data
            .into_iter()
            .filter_map(|row| {
                let loc = row.location?;
                if !is_valid_coord(loc.lng, loc.lat) {
                    return None;
                }
                let label = if row.title.is_empty() { row.address } else { row.title };
                Some(Place {
                    lat: loc.lat,
                    lon: loc.lng,
                    label,
                })
            })
            .collect();
        Ok(places)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_url_sorts_params_and_appends_sig() {
        let url = build_signed_url(
            PLACE_SEARCH_BASE,
            PLACE_SEARCH_PATH,
            &[("keyword", "beijing"), ("key", "abc"), ("page_size", "10")],
            Some("secret"),
        )
        .unwrap();

        let query = url.query().unwrap();
        assert!(query.starts_with("key=abc&keyword=beijing&page_size=10&sig="));

        let mut hasher = Md5::new();
        hasher.update(b"/ws/place/v1/search?key=abc&keyword=beijing&page_size=10secret");
        let expected = hex::encode(hasher.finalize());
        assert!(query.ends_with(&expected));
    }

    #[test]
    fn unsigned_url_has_no_sig() {
        let url = build_signed_url(
            PLACE_SEARCH_BASE,
            PLACE_SEARCH_PATH,
            &[("key", "abc"), ("keyword", "x")],
            None,
        )
        .unwrap();
        assert!(!url.query().unwrap().contains("sig="));
    }

    #[test]
    fn coordinate_bounds() {
        assert!(is_valid_coord(116.4, 39.9));
        assert!(!is_valid_coord(190.0, 39.9));
        assert!(!is_valid_coord(116.4, 91.0));
        assert!(!is_valid_coord(f64::NAN, 0.0));
    }
}
