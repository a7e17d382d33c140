use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;

use crate::config::StorageConfig;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

/// Durable URL for a stored object, served from the configured public base
/// (or path-style bucket access when none is set). Keys are generated
/// internally from UUIDs and MIME extensions, so no escaping is needed.
pub fn public_object_url(config: &StorageConfig, key: &str) -> String {
    let base = config
        .public_base_url
        .clone()
        .unwrap_or_else(|| format!("{}/{}", config.endpoint.trim_end_matches('/'), config.bucket));
    format!("{}/{}", base.trim_end_matches('/'), key)
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "static",
            ))
            .endpoint_url(config.endpoint.as_str())
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(config.endpoint.as_str())
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(seconds),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(public: Option<&str>) -> StorageConfig {
        StorageConfig {
            endpoint: "http://localhost:9000/".into(),
            bucket: "resumio-avatars".into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            region: "us-east-1".into(),
            public_base_url: public.map(Into::into),
        }
    }

    #[test]
    fn public_url_prefers_configured_base() {
        let url = public_object_url(&config(Some("https://cdn.example.com/")), "avatars/a/b.png");
        assert_eq!(url, "https://cdn.example.com/avatars/a/b.png");
    }

    #[test]
    fn public_url_falls_back_to_path_style() {
        let url = public_object_url(&config(None), "avatars/a/b.png");
        assert_eq!(url, "http://localhost:9000/resumio-avatars/avatars/a/b.png");
    }
}
