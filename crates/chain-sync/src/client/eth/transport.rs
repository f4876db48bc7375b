use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;

#[async_trait::async_trait]
pub trait JsonRpcTransport: Send + Sync {
    /// Sends one request and returns its `result`, which may be `null`.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}

#[async_trait::async_trait]
impl<T: JsonRpcTransport + ?Sized> JsonRpcTransport for Arc<T> {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        (**self).call(method, params).await
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use serde_json::{Value, json};

    use super::JsonRpcTransport;
    use crate::error::{Error, Result};

    #[derive(Debug)]
    pub struct HttpTransport {
        client: reqwest::Client,
        url: String,
        next_id: AtomicU64,
    }

    impl HttpTransport {
        pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| Error::Rpc(format!("build http client: {e}")))?;
            Ok(Self {
                client,
                url: url.into(),
                next_id: AtomicU64::new(1),
            })
        }
    }

    #[async_trait::async_trait]
    impl JsonRpcTransport for HttpTransport {
        async fn call(&self, method: &str, params: Value) -> Result<Value> {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let body = json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            });
            let response = self
                .client
                .post(&self.url)
                .json(&body)
                .send()
                .await
                .map_err(|e| Error::Rpc(format!("{method}: {e}")))?
                .error_for_status()
                .map_err(|e| Error::Rpc(format!("{method}: {e}")))?;
            let mut envelope: Value = response
                .json()
                .await
                .map_err(|e| Error::Rpc(format!("{method}: invalid response body: {e}")))?;
            if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
                return Err(Error::Rpc(format!("{method}: {err}")));
            }
            Ok(envelope
                .get_mut("result")
                .map(Value::take)
                .unwrap_or(Value::Null))
        }
    }
}
