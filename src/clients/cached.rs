//! Read-through cache over metadata lookups. Only product and location
//! profiles are cached; stock levels do not pass through here.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::ClientError;
use crate::cache::KeyValueStore;
use crate::domain::{Location, Product};
use crate::ports::{LocationDirectory, ProductCatalog};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub struct CachedDirectory<C> {
    inner: C,
    store: Arc<dyn KeyValueStore>,
    kind: &'static str,
    ttl: Duration,
}

impl<C> CachedDirectory<C> {
    /// `kind` prefixes every key, e.g. `merchant` gives `merchant:{id}`.
    pub fn new(inner: C, store: Arc<dyn KeyValueStore>, kind: &'static str, ttl: Duration) -> Self {
        Self {
            inner,
            store,
            kind,
            ttl,
        }
    }

    fn key(&self, id: impl std::fmt::Display) -> String {
        format!("{}:{}", self.kind, id)
    }

    async fn read_through<T, F, Fut>(&self, key: String, fetch: F) -> Result<T, ClientError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        match self.store.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    tracing::debug!(key = %key, "metadata cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "metadata cache read failed"),
        }

        let value = fetch().await?;

        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.store.set_ex(&key, &bytes, self.ttl).await {
                    tracing::warn!(key = %key, error = %e, "metadata cache write failed");
                }
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to encode cache entry"),
        }

        Ok(value)
    }
}

#[async_trait]
impl<C> ProductCatalog for CachedDirectory<C>
where
    C: ProductCatalog,
{
    async fn get_product(&self, id: i64) -> Result<Product, ClientError> {
        self.read_through(self.key(id), || self.inner.get_product(id)).await
    }

    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Product, ClientError> {
        self.read_through(self.key(format!("barcode:{}", barcode)), || {
            self.inner.get_product_by_barcode(barcode)
        })
        .await
    }
}

#[async_trait]
impl<C> LocationDirectory for CachedDirectory<C>
where
    C: LocationDirectory,
{
    async fn get_location(&self, id: i64) -> Result<Location, ClientError> {
        self.read_through(self.key(id), || self.inner.get_location(id)).await
    }
}
