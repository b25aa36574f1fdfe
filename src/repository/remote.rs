//! Repositories served over HTTP.
//!
//! | Call                    | Request                                                   |
//! |-------------------------|-----------------------------------------------------------|
//! | `get_epoch`             | `HEAD /epoch` (epoch in `ETag`)                           |
//! | `fetch_translator_data` | `GET /translator-info` (record stream)                    |
//! | `translate_options`     | `GET /translate-options?options=..`                       |
//! | `get_formula`           | `GET /formula?translated_options=..` (record stream)      |
//! | `get_package_detail`    | `GET /packages/{name}?translated_options=..` (404 = none) |
//! | `get_build_context`     | `GET /packages/{name}/build-context?..`                   |
//! | `compute_product_info`  | `GET /packages/{name}/product-info?..`                    |
//!
//! Every response carries the repository epoch as its `ETag`. Decoded
//! responses are kept in a [`VersionedCache`] keyed by URL; the next request
//! for the same URL sends `If-None-Match` and a `304 Not Modified` answer is
//! served from that cache.

use super::wire::decode_records;
use super::{EpochStream, RepositoryDriver};
use crate::cache::VersionedCache;
use crate::constants::HTTP_TIMEOUT;
use crate::core::PpError;
use crate::models::{
    BuildContextDetail, Clause, DependencyProductInfos, PackageDetail, ProductInfo, TranslatorInfo,
};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Client for one remote repository.
pub struct RemoteRepository {
    client: reqwest::Client,
    base: Url,
    http_cache: VersionedCache,
}

impl RemoteRepository {
    /// A client for the repository served at `url`.
    pub fn new(url: &str, http_cache: VersionedCache) -> Result<Self> {
        let base = Url::parse(url).map_err(|e| PpError::ConfigError {
            message: format!("invalid repository URL '{url}': {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(PpError::ConfigError {
                message: format!("repository URL '{url}' cannot be a base URL"),
            }
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base,
            http_cache,
        })
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| PpError::ConfigError {
                message: format!("repository URL '{}' cannot be a base URL", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// GETs `url`, answering from the HTTP cache on `304`. `None` on `404`.
    async fn get_cached<T, F>(&self, url: Url, decode: F) -> Result<Option<(String, T)>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let key = url.as_str().to_string();
        let cached = self.http_cache.peek::<T>(&key).await?;

        let mut request = self.client.get(url.clone());
        if let Some((epoch, _)) = &cached {
            request = request.header(IF_NONE_MATCH, format!("\"{epoch}\""));
        }

        let response =
            request.send().await.with_context(|| format!("Failed to request {url}"))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                tracing::trace!(target: "repository", "304 for {}", url);
                cached.map(Some).ok_or_else(|| {
                    PpError::Protocol {
                        message: format!("{url} answered 304 to an unconditional request"),
                    }
                    .into()
                })
            }
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let epoch = etag(&response, &url)?;
                let body = response
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read response of {url}"))?;
                let value = decode(&body)?;
                self.http_cache.put(&key, &epoch, &value).await?;
                Ok(Some((epoch, value)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PpError::BackendCommandFailure {
                    operation: format!("GET {url}"),
                    message: format!("{status}: {body}"),
                }
                .into())
            }
        }
    }

    async fn get_required<T, F>(&self, url: Url, decode: F) -> Result<(String, T)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&[u8]) -> Result<T>,
    {
        self.get_cached(url.clone(), decode).await?.ok_or_else(|| {
            PpError::BackendCommandFailure {
                operation: format!("GET {url}"),
                message: "404 Not Found".to_string(),
            }
            .into()
        })
    }
}

fn etag(response: &reqwest::Response, url: &Url) -> Result<String> {
    let value = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PpError::Protocol {
            message: format!("{url} answered without an ETag"),
        })?;
    Ok(normalize_etag(value))
}

fn normalize_etag(value: &str) -> String {
    value.trim().trim_start_matches("W/").trim_matches('"').to_string()
}

fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        PpError::Protocol {
            message: format!("invalid JSON response: {e}"),
        }
        .into()
    })
}

fn json_param(value: &impl Serialize) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

impl RepositoryDriver for RemoteRepository {
    fn get_epoch(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = self.endpoint(&["epoch"], &[])?;
            let response = self
                .client
                .head(url.clone())
                .send()
                .await
                .with_context(|| format!("Failed to request {url}"))?;
            if !response.status().is_success() {
                return Err(PpError::BackendCommandFailure {
                    operation: format!("HEAD {url}"),
                    message: response.status().to_string(),
                }
                .into());
            }
            etag(&response, &url)
        })
    }

    fn fetch_translator_data(&self) -> BoxFuture<'_, Result<EpochStream<'_, TranslatorInfo>>> {
        Box::pin(async move {
            let url = self.endpoint(&["translator-info"], &[])?;
            let (epoch, items) = self.get_required(url, decode_records::<TranslatorInfo>).await?;
            Ok(EpochStream::from_vec(epoch, items))
        })
    }

    fn translate_options(
        &self,
        options: serde_json::Value,
    ) -> BoxFuture<'_, Result<(String, serde_json::Value)>> {
        Box::pin(async move {
            let url = self.endpoint(&["translate-options"], &[("options", json_param(&options)?)])?;
            self.get_required(url, decode_json::<serde_json::Value>).await
        })
    }

    fn get_formula<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<EpochStream<'a, Clause>>> {
        Box::pin(async move {
            let url = self.endpoint(
                &["formula"],
                &[("translated_options", json_param(translated_options)?)],
            )?;
            let (epoch, items) = self.get_required(url, decode_records::<Clause>).await?;
            Ok(EpochStream::from_vec(epoch, items))
        })
    }

    fn get_package_detail<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
    ) -> BoxFuture<'a, Result<Option<PackageDetail>>> {
        Box::pin(async move {
            let url = self.endpoint(
                &["packages", package],
                &[("translated_options", json_param(translated_options)?)],
            )?;
            let detail = self.get_cached(url, decode_json::<PackageDetail>).await?;
            Ok(detail.map(|(_, detail)| detail))
        })
    }

    fn get_build_context<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<BuildContextDetail>> {
        Box::pin(async move {
            let url = self.endpoint(
                &["packages", package, "build-context"],
                &[
                    ("translated_options", json_param(translated_options)?),
                    ("runtime_product_infos", json_param(runtime_product_infos)?),
                ],
            )?;
            let (_, context) = self.get_required(url, decode_json::<BuildContextDetail>).await?;
            Ok(context)
        })
    }

    fn compute_product_info<'a>(
        &'a self,
        translated_options: &'a serde_json::Value,
        package: &'a str,
        runtime_product_infos: &'a DependencyProductInfos,
    ) -> BoxFuture<'a, Result<ProductInfo>> {
        Box::pin(async move {
            let url = self.endpoint(
                &["packages", package, "product-info"],
                &[
                    ("translated_options", json_param(translated_options)?),
                    ("runtime_product_infos", json_param(runtime_product_infos)?),
                ],
            )?;
            let (_, info) = self.get_required(url, decode_json::<ProductInfo>).await?;
            Ok(info)
        })
    }

    fn update(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tracing::info!(
                target: "repository",
                "Skipping update of remote repository {}; it is updated by its server",
                self.base
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::wire::encode_records;
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote(server: &MockServer, temp: &TempDir) -> RemoteRepository {
        RemoteRepository::new(&server.uri(), VersionedCache::new(temp.path())).unwrap()
    }

    #[tokio::test]
    async fn test_epoch_comes_from_etag() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/epoch"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "W/\"e1\""))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        assert_eq!(remote(&server, &temp).get_epoch().await.unwrap(), "e1");
    }

    #[tokio::test]
    async fn test_not_modified_is_served_from_cache() {
        let server = MockServer::start().await;
        let records = vec![TranslatorInfo {
            symbol: "pp-p1".to_string(),
            attributes: [("version".to_string(), "1.0.0".to_string())].into(),
        }];

        // Registered first so it wins once the conditional header is present.
        Mock::given(method("GET"))
            .and(path("/translator-info"))
            .and(header("If-None-Match", "\"e1\""))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/translator-info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"e1\"")
                    .set_body_bytes(encode_records(&records).unwrap()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let repository = remote(&server, &temp);
        for _ in 0..2 {
            let stream = repository.fetch_translator_data().await.unwrap();
            assert_eq!(stream.epoch, "e1");
            let items: Vec<TranslatorInfo> = stream.items.try_collect().await.unwrap();
            assert_eq!(items, records);
        }
    }

    #[tokio::test]
    async fn test_missing_package_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/packages/p1"))
            .and(query_param("translated_options", "null"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"e1\"").set_body_json(
                json!({
                    "interfaces": ["p1"],
                    "dependencies": [],
                    "product": {"kind": "archive", "location": "https://example.com/p1.zip", "installer": "zip"}
                }),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/packages/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let repository = remote(&server, &temp);
        let options = serde_json::Value::Null;

        let detail = repository.get_package_detail(&options, "p1").await.unwrap().unwrap();
        assert!(detail.interfaces.contains("p1"));
        assert!(repository.get_package_detail(&options, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate-options"))
            .respond_with(ResponseTemplate::new(500).set_body_string("driver crashed"))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let error = remote(&server, &temp)
            .translate_options(json!({"arch": "x86_64"}))
            .await
            .unwrap_err();
        let Some(PpError::BackendCommandFailure {
            message, ..
        }) = error.downcast_ref::<PpError>()
        else {
            panic!("expected backend failure, got {error:#}");
        };
        assert!(message.contains("driver crashed"));
    }

    #[test]
    fn test_endpoint_encodes_segments_and_query() {
        let temp = TempDir::new().unwrap();
        let repository =
            RemoteRepository::new("http://localhost:8080/repo/", VersionedCache::new(temp.path()))
                .unwrap();
        let url = repository
            .endpoint(&["packages", "a b", "product-info"], &[("translated_options", "{}".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/repo/packages/a%20b/product-info?translated_options=%7B%7D"
        );
    }
}
