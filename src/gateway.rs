//! Storage-gateway access for Swarm and IPFS (§6.2). Both metadata and
//! source fetchers funnel their network reads through here.

use async_trait::async_trait;

use crate::error::FetchError;

/// An in-process IPFS provider, for embedders that run a local node instead
/// of going over HTTP to a gateway's `cat` endpoint.
#[async_trait]
pub trait IpfsProvider: Send + Sync {
    async fn cat(&self, cid: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches Swarm and IPFS content over plain HTTP, falling back to an
/// in-process [`IpfsProvider`] for IPFS reads when one is configured.
pub struct Gateway {
    http: reqwest::Client,
    swarm_gateway: String,
    ipfs_cat_request: String,
    ipfs_provider: Option<Box<dyn IpfsProvider>>,
}

impl Gateway {
    pub fn new(http: reqwest::Client, swarm_gateway: String, ipfs_cat_request: String) -> Self {
        Self {
            http,
            swarm_gateway,
            ipfs_cat_request,
            ipfs_provider: None,
        }
    }

    pub fn with_ipfs_provider(mut self, provider: Box<dyn IpfsProvider>) -> Self {
        self.ipfs_provider = Some(provider);
        self
    }

    /// `GET <swarm-gateway>/bzz-raw:/<hash>`, used when fetching a metadata
    /// document pointed to directly by a decoded bytecode footer.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_swarm_hash(&self, hash: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}bzz-raw:/{hash}", self.swarm_gateway);
        self.get(&url).await
    }

    /// `GET <swarm-gateway><url>`, where `url` is a `bzz-raw:/...` reference
    /// taken verbatim from a source descriptor's `urls` list.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_swarm_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let full = format!("{}{url}", self.swarm_gateway);
        self.get(&full).await
    }

    /// Fetches by CID, preferring the in-process provider when configured.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_ipfs(&self, cid: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(provider) = &self.ipfs_provider {
            return provider.cat(cid).await;
        }
        let url = format!("{}{cid}", self.ipfs_cat_request);
        self.get(&url).await
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// A source descriptor URL as it appears in a metadata manifest, routed to
/// the provider it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrl {
    SwarmRaw(String),
    IpfsDweb(String),
    Unrecognized(String),
}

impl SourceUrl {
    pub fn parse(url: &str) -> Self {
        if url.starts_with("bzz-raw") {
            SourceUrl::SwarmRaw(url.to_string())
        } else if let Some(cid) = url.strip_prefix("dweb:/ipfs/") {
            SourceUrl::IpfsDweb(cid.to_string())
        } else {
            SourceUrl::Unrecognized(url.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    struct FixedProvider(Vec<u8>);

    #[async_trait]
    impl IpfsProvider for FixedProvider {
        async fn cat(&self, _cid: &str) -> Result<Vec<u8>, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn parses_swarm_raw_url() {
        assert_eq!(
            SourceUrl::parse("bzz-raw:/2222"),
            SourceUrl::SwarmRaw("bzz-raw:/2222".into())
        );
    }

    #[test]
    fn parses_ipfs_dweb_url() {
        assert_eq!(
            SourceUrl::parse("dweb:/ipfs/QmSrc"),
            SourceUrl::IpfsDweb("QmSrc".into())
        );
    }

    #[tokio::test]
    async fn fetches_swarm_hash() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bzz-raw:/1111");
            then.status(200).body("metadata bytes");
        });

        let gateway = Gateway::new(reqwest::Client::new(), server.url("/"), String::new());
        let bytes = gateway.fetch_swarm_hash("1111").await.unwrap();
        assert_eq!(bytes, b"metadata bytes");
    }

    #[tokio::test]
    async fn non_2xx_is_a_status_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bzz-raw:/missing");
            then.status(404);
        });

        let gateway = Gateway::new(reqwest::Client::new(), server.url("/"), String::new());
        let err = gateway.fetch_swarm_hash("missing").await.unwrap_err();
        assert!(matches!(err, FetchError::Status(status) if status == 404));
    }

    #[tokio::test]
    async fn in_process_provider_is_preferred_over_http() {
        let gateway = Gateway::new(reqwest::Client::new(), String::new(), String::new())
            .with_ipfs_provider(Box::new(FixedProvider(b"from provider".to_vec())));
        assert_eq!(gateway.fetch_ipfs("Qm").await.unwrap(), b"from provider");
    }
}
