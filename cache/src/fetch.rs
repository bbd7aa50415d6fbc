use crate::error::{FetchError, Result};
use crate::key::RequestDescriptor;

use std::future::Future;

use futures_util::future::BoxFuture;

/// Performs the request behind a cache miss.
///
/// The returned future must own everything it needs: the cache runs it on a
/// separate task so that it survives callers that stop waiting. Failed
/// status checks must surface as [`FetchError::Status`] so retry policy can
/// classify them.
pub trait Fetch<V>: Send + Sync {
  fn fetch(&self, request: &RequestDescriptor) -> BoxFuture<'static, Result<V>>;
}

impl<V, F, Fut> Fetch<V> for F
where
  F: Fn(&RequestDescriptor) -> Fut + Send + Sync,
  Fut: Future<Output = Result<V>> + Send + 'static,
{
  fn fetch(&self, request: &RequestDescriptor) -> BoxFuture<'static, Result<V>> {
    Box::pin(self(request))
  }
}

#[cfg(feature = "http")]
pub use self::http::HttpFetcher;

#[cfg(feature = "http")]
mod http {
  use super::*;
  use crate::key::Method;

  use serde::de::DeserializeOwned;

  /// A [`Fetch`] implementation over `reqwest` that decodes JSON bodies.
  #[derive(Debug, Clone)]
  pub struct HttpFetcher {
    client: reqwest::Client,
  }

  impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
      Self { client }
    }

    /// A client that identifies itself with `user_agent`. Reddit rejects
    /// anonymous default agents with 429s.
    pub fn with_user_agent(user_agent: &str) -> Result<Self> {
      let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(|e| FetchError::Network(e.to_string()))?;
      Ok(Self::new(client))
    }
  }

  impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
      match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
      }
    }
  }

  fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
      FetchError::Decode(err.to_string())
    } else {
      FetchError::Network(err.to_string())
    }
  }

  impl<V> Fetch<V> for HttpFetcher
  where
    V: DeserializeOwned + Send + 'static,
  {
    fn fetch(&self, request: &RequestDescriptor) -> BoxFuture<'static, Result<V>> {
      let mut builder = self
        .client
        .request(request.method.into(), request.url.as_str());
      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      Box::pin(async move {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
          let body = response.text().await.unwrap_or_default();
          return Err(FetchError::from_status(status.as_u16(), body));
        }
        response.json::<V>().await.map_err(transport_error)
      })
    }
  }
}
