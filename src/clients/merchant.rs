use async_trait::async_trait;

use super::{ClientError, InternalClient};
use crate::domain::{Location, StockLevel};
use crate::ports::{LocationDirectory, StockReader};

/// Merchant service: merchant profiles and merchant stock.
#[derive(Clone)]
pub struct MerchantClient {
    inner: InternalClient,
}

impl MerchantClient {
    pub fn new(inner: InternalClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LocationDirectory for MerchantClient {
    async fn get_location(&self, id: i64) -> Result<Location, ClientError> {
        self.inner
            .get_data(&format!("/api/v1/merchants/{}", id), &format!("merchant {}", id))
            .await
    }
}

#[async_trait]
impl StockReader for MerchantClient {
    async fn stock_level(&self, merchant_id: i64, product_id: i64) -> Result<StockLevel, ClientError> {
        self.inner
            .get_data(
                &format!("/api/v1/merchants/{}/products/{}/stock", merchant_id, product_id),
                &format!("product {} at merchant {}", product_id, merchant_id),
            )
            .await
    }
}
