//! Page resources addressed by their SHA-256 digest
//!
//! A resource's identity for upload purposes is its content digest, not its
//! URL: two URLs serving identical bytes upload once.

use bytes::Bytes;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Content type used for serialized DOM snapshots
pub const DOM_CONTENT_TYPE: &str = "x-applitools-html/cdt";

/// Compute the SHA-256 hex digest of data
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Resource kinds that the renderer must process before use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceKind {
    Css,
    Svg,
}

impl ResourceKind {
    /// Classify a content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("text/css") {
            Some(ResourceKind::Css)
        } else if content_type.contains("image/svg") {
            Some(ResourceKind::Svg)
        } else {
            None
        }
    }
}

struct ResourceInner {
    url: String,
    content_type: String,
    content: Option<Bytes>,
    hash: OnceCell<String>,
}

/// An immutable page resource (image, font, script, stylesheet or DOM)
///
/// Cloning is cheap and clones share the memoized digest.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Resource {
    /// Create a resource with inline content
    pub fn new(url: impl Into<String>, content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                url: url.into(),
                content_type: content_type.into(),
                content: Some(content.into()),
                hash: OnceCell::new(),
            }),
        }
    }

    /// Create a resource that only points at remote content
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                url: url.into(),
                content_type: String::new(),
                content: None,
                hash: OnceCell::new(),
            }),
        }
    }

    /// Serialize a DOM snapshot value into a resource
    pub fn from_dom(url: impl Into<String>, dom: &serde_json::Value) -> crate::Result<Self> {
        let content = serde_json::to_vec(dom)?;
        Ok(Self::new(url, DOM_CONTENT_TYPE, content))
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn content_type(&self) -> &str {
        &self.inner.content_type
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.inner.content.as_ref()
    }

    /// Whether there are bytes to upload
    pub fn has_content(&self) -> bool {
        self.inner.content.is_some()
    }

    /// SHA-256 digest of the content, computed once
    ///
    /// Remote pointers have no digest.
    pub fn hash(&self) -> Option<&str> {
        let content = self.inner.content.as_ref()?;
        Some(self.inner.hash.get_or_init(|| sha256_hex(content)).as_str())
    }

    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::from_content_type(&self.inner.content_type)
    }

    pub fn requires_processing(&self) -> bool {
        self.kind().is_some()
    }

    /// Wire descriptor referencing this resource by digest
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            url: self.inner.url.clone(),
            content_type: self.inner.content_type.clone(),
            hash: self.hash().map(str::to_string),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("url", &self.inner.url)
            .field("content_type", &self.inner.content_type)
            .field("len", &self.inner.content.as_ref().map(|c| c.len()))
            .finish()
    }
}

/// A resource as referenced by a render request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub url: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Metadata cached per URL once a resource has been handed to the uploader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub content_type: String,
    pub hash: Option<String>,
    pub requires_processing: bool,
}

impl CacheEntry {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            url: resource.url().to_string(),
            content_type: resource.content_type().to_string(),
            hash: resource.hash().map(str::to_string),
            requires_processing: resource.requires_processing(),
        }
    }
}
