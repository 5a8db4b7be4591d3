use async_trait::async_trait;

use super::{ClientError, InternalClient};
use crate::domain::{Location, StockLevel};
use crate::ports::{LocationDirectory, StockReader};

#[derive(Clone)]
pub struct WarehouseClient {
    inner: InternalClient,
}

impl WarehouseClient {
    pub fn new(inner: InternalClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LocationDirectory for WarehouseClient {
    async fn get_location(&self, id: i64) -> Result<Location, ClientError> {
        self.inner
            .get_data(&format!("/api/v1/warehouses/{}", id), &format!("warehouse {}", id))
            .await
    }
}

#[async_trait]
impl StockReader for WarehouseClient {
    async fn stock_level(&self, warehouse_id: i64, product_id: i64) -> Result<StockLevel, ClientError> {
        self.inner
            .get_data(
                &format!("/api/v1/warehouses/{}/products/{}/stock", warehouse_id, product_id),
                &format!("product {} at warehouse {}", product_id, warehouse_id),
            )
            .await
    }
}
