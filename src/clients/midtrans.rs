//! Midtrans Snap client used to open a payment session for a new order.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ClientError, REQUEST_TIMEOUT};
use crate::config::MidtransConfig;
use crate::ports::{PaymentGateway, PaymentRequest, PaymentSession};

pub const SANDBOX_URL: &str = "https://app.sandbox.midtrans.com";
pub const PRODUCTION_URL: &str = "https://app.midtrans.com";
const SNAP_PATH: &str = "/snap/v1/transactions";

#[derive(Clone)]
pub struct MidtransClient {
    client: Client,
    base_url: String,
    server_key: String,
}

#[derive(Debug, Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    item_details: Vec<ItemDetail>,
    customer_details: CustomerDetails<'a>,
    enabled_payments: [&'static str; 1],
}

#[derive(Debug, Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct ItemDetail {
    id: String,
    price: i64,
    quantity: i64,
    name: String,
}

#[derive(Debug, Serialize)]
struct CustomerDetails<'a> {
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    #[serde(default)]
    redirect_url: Option<String>,
}

impl MidtransClient {
    pub fn new(config: &MidtransConfig) -> Self {
        let base_url = match (&config.base_url, config.is_production) {
            (Some(url), _) => url.clone(),
            (None, true) => PRODUCTION_URL.to_string(),
            (None, false) => SANDBOX_URL.to_string(),
        };
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            server_key: config.server_key.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Snap rejects a request whose item prices do not add up to the gross
/// amount, so the tax goes in as its own line.
fn item_details(request: &PaymentRequest) -> Vec<ItemDetail> {
    let mut items: Vec<ItemDetail> = request
        .items
        .iter()
        .map(|item| ItemDetail {
            id: item.product_id.to_string(),
            price: item.price,
            quantity: item.quantity,
            name: format!("Product {}", item.product_id),
        })
        .collect();

    let items_total: i64 = request.items.iter().map(|i| i.sub_total()).sum();
    let tax = request.gross_amount - items_total;
    if tax > 0 {
        items.push(ItemDetail {
            id: "TAX".to_string(),
            price: tax,
            quantity: 1,
            name: "Tax".to_string(),
        });
    }
    items
}

#[async_trait]
impl PaymentGateway for MidtransClient {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentSession, ClientError> {
        let body = SnapRequest {
            transaction_details: TransactionDetails {
                order_id: &request.order_code,
                gross_amount: request.gross_amount,
            },
            item_details: item_details(request),
            customer_details: CustomerDetails {
                first_name: &request.customer.name,
                email: &request.customer.email,
                phone: &request.customer.phone,
            },
            enabled_payments: ["qris"],
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, SNAP_PATH))
            .basic_auth(&self.server_key, Some(""))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let snap = response
            .json::<SnapResponse>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        tracing::debug!(order_code = %request.order_code, "snap session created");
        Ok(PaymentSession {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }
}
