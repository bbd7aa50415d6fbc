//! Deterministic cache keys for HTTP requests.
//!
//! A key is `METHOD:url:body`, where the body is written as canonical JSON
//! (object members sorted by name, no insignificant whitespace). Two requests
//! that differ only in the order of their body's object members share a key.
//! Bodies that are not JSON cannot be described and are out of scope.

use std::fmt::{self, Write};

use serde_json::Value;

/// The HTTP methods a cached request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Method {
  Get,
  Post,
  Put,
  Patch,
  Delete,
  Head,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Head => "HEAD",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifies a cacheable request: what to call and with which payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestDescriptor {
  pub method: Method,
  pub url: String,
  #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
  pub body: Option<Value>,
}

impl RequestDescriptor {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      body: None,
    }
  }

  /// A body-less `GET`, the common case for feed and comment listings.
  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn post(url: impl Into<String>, body: Value) -> Self {
    Self::new(Method::Post, url).with_body(body)
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  /// Derives the cache key for this request.
  pub fn cache_key(&self) -> String {
    let mut key = String::with_capacity(self.url.len() + 16);
    key.push_str(self.method.as_str());
    key.push(':');
    key.push_str(&self.url);
    key.push(':');
    if let Some(body) = &self.body {
      write_canonical(body, &mut key);
    }
    key
  }
}

fn write_canonical(value: &Value, out: &mut String) {
  match value {
    Value::Object(map) => {
      let mut members: Vec<_> = map.iter().collect();
      members.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
      out.push('{');
      for (i, (name, member)) in members.into_iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        // Writing to a String cannot fail.
        let _ = write!(out, "{}", Value::String(name.clone()));
        out.push(':');
        write_canonical(member, out);
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out);
      }
      out.push(']');
    }
    leaf => {
      let _ = write!(out, "{}", leaf);
    }
  }
}
