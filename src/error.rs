use thiserror::Error;

/// Errors surfaced by the blockchain RPC adapter.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error calling {method}: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("rpc error calling {method}: {message}")]
    Remote { method: &'static str, message: String },
    #[error("malformed response for {method}: {source}")]
    Malformed {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from decoding a deployed contract's CBOR metadata footer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FooterError {
    #[error("no CBOR footer found in bytecode")]
    NoFooter,
    #[error("footer did not decode to a CBOR map")]
    NotAMap,
    #[error("footer map carried neither a bzzr1 nor an ipfs key")]
    NoRecognizedKey,
}

/// Errors from fetching a metadata document or source file from a storage gateway.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("no ipfs provider configured and no cat endpoint reachable")]
    NoIpfsProvider,
    #[error("fetched content did not match the expected digest")]
    DigestMismatch,
}

/// Errors writing into the content-addressed repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors constructing or reloading the monitor's configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
