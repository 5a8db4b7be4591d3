//! Order creation: check live merchant stock, persist the order together with
//! its stock-reduction event, then open a payment with the provider.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::transaction::{
    generate_order_code, required_quantities, DEFAULT_CURRENCY, DEFAULT_PAYMENT_METHOD,
};
use crate::domain::{CustomerDetails, LineItem, NewTransaction, StockReducedEvent, Totals};
use crate::error::AppError;
use crate::ports::{PaymentGateway, PaymentRequest, StockReader, TransactionRepository};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransactionInput {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    pub merchant_id: i64,
    #[serde(default)]
    pub notes: String,
    pub products: Vec<LineItem>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateTransactionOutput {
    pub transaction_id: i64,
    pub order_code: String,
    pub payment_token: String,
    pub redirect_url: Option<String>,
    pub sub_total: i64,
    pub tax_total: i64,
    pub grand_total: i64,
}

pub struct CreateTransaction {
    stock: Arc<dyn StockReader>,
    transactions: Arc<dyn TransactionRepository>,
    payments: Arc<dyn PaymentGateway>,
}

impl CreateTransaction {
    pub fn new(
        stock: Arc<dyn StockReader>,
        transactions: Arc<dyn TransactionRepository>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            stock,
            transactions,
            payments,
        }
    }

    pub async fn execute(&self, input: CreateTransactionInput) -> Result<CreateTransactionOutput, AppError> {
        validate(&input)?;
        let totals = Totals::compute(&input.products)
            .ok_or_else(|| AppError::BadRequest("order amount is too large".to_string()))?;

        self.check_stock(input.merchant_id, &input.products).await?;

        let order_code = generate_order_code(input.merchant_id, Utc::now());
        let customer = CustomerDetails {
            name: input.name.trim().to_string(),
            phone: input.phone.trim().to_string(),
            email: input.email.trim().to_string(),
            address: input.address,
        };

        let new_transaction = NewTransaction {
            customer: customer.clone(),
            merchant_id: input.merchant_id,
            order_code: order_code.clone(),
            items: input.products.clone(),
            totals,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            notes: input.notes,
        };
        let event = StockReducedEvent::for_order(input.merchant_id, &order_code, &input.products);

        let transaction = self.transactions.create(&new_transaction, &event).await?;
        tracing::info!(
            transaction_id = transaction.id,
            order_code = %order_code,
            merchant_id = input.merchant_id,
            grand_total = totals.grand_total,
            event_id = %event.event_id,
            "transaction created"
        );

        let session = self
            .payments
            .create_payment(&PaymentRequest {
                order_code: order_code.clone(),
                gross_amount: totals.grand_total,
                items: input.products,
                customer,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    transaction_id = transaction.id,
                    order_code = %order_code,
                    error = %e,
                    "payment initiation failed, order left pending"
                );
                AppError::UpstreamUnavailable(format!("payment provider: {}", e))
            })?;

        self.transactions
            .set_payment_token(transaction.id, &session.token)
            .await?;

        Ok(CreateTransactionOutput {
            transaction_id: transaction.id,
            order_code,
            payment_token: session.token,
            redirect_url: session.redirect_url,
            sub_total: totals.sub_total,
            tax_total: totals.tax_total,
            grand_total: totals.grand_total,
        })
    }

    /// Every product must be stocked by the merchant in the summed quantity.
    /// Lookups run one after another and the first failure aborts the order.
    async fn check_stock(&self, merchant_id: i64, items: &[LineItem]) -> Result<(), AppError> {
        let required_by_product = required_quantities(items)
            .ok_or_else(|| AppError::BadRequest("order quantity is too large".to_string()))?;

        for (product_id, required) in required_by_product {
            let level = self.stock.stock_level(merchant_id, product_id).await?;

            if level.stock < required {
                tracing::info!(
                    merchant_id,
                    product_id,
                    required,
                    available = level.stock,
                    "order rejected, insufficient stock"
                );
                return Err(AppError::InsufficientStock {
                    product_id,
                    required,
                    available: level.stock,
                });
            }
        }
        Ok(())
    }
}

fn validate(input: &CreateTransactionInput) -> Result<(), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    if input.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone is required".to_string()));
    }
    if input.merchant_id <= 0 {
        return Err(AppError::BadRequest("merchant_id must be positive".to_string()));
    }
    if input.products.is_empty() {
        return Err(AppError::BadRequest("at least one product is required".to_string()));
    }
    for item in &input.products {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "quantity for product {} must be positive",
                item.product_id
            )));
        }
        if item.price <= 0 {
            return Err(AppError::BadRequest(format!(
                "price for product {} must be positive",
                item.product_id
            )));
        }
    }
    Ok(())
}
