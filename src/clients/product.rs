use async_trait::async_trait;

use super::{ClientError, InternalClient};
use crate::domain::Product;
use crate::ports::ProductCatalog;

#[derive(Clone)]
pub struct ProductClient {
    inner: InternalClient,
}

impl ProductClient {
    pub fn new(inner: InternalClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ProductCatalog for ProductClient {
    async fn get_product(&self, id: i64) -> Result<Product, ClientError> {
        self.inner
            .get_data(&format!("/api/v1/products/{}", id), &format!("product {}", id))
            .await
    }

    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Product, ClientError> {
        self.inner
            .get_data(
                &format!("/api/v1/products/barcode/{}", barcode),
                &format!("product with barcode {}", barcode),
            )
            .await
    }
}
