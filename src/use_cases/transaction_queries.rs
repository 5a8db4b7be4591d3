use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Transaction;
use crate::error::AppError;
use crate::ports::{LocationDirectory, ProductCatalog, TransactionRepository};

pub const MAX_PAGE_SIZE: i64 = 100;

pub struct TransactionQueries {
    transactions: Arc<dyn TransactionRepository>,
    products: Arc<dyn ProductCatalog>,
    merchants: Arc<dyn LocationDirectory>,
}

impl TransactionQueries {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        products: Arc<dyn ProductCatalog>,
        merchants: Arc<dyn LocationDirectory>,
    ) -> Self {
        Self {
            transactions,
            products,
            merchants,
        }
    }

    pub async fn get(&self, id: i64) -> Result<Transaction, AppError> {
        let mut transaction = self.transactions.get_by_id(id).await?;
        self.enrich(std::slice::from_mut(&mut transaction)).await;
        Ok(transaction)
    }

    pub async fn list(
        &self,
        merchant_id: Option<i64>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Transaction>, AppError> {
        let limit = limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        let mut transactions = self.transactions.list(merchant_id, limit, offset).await?;
        self.enrich(&mut transactions).await;
        Ok(transactions)
    }

    /// Fills in merchant and product names, resolving each id once per call.
    /// A failed lookup leaves that name empty instead of failing the request.
    async fn enrich(&self, transactions: &mut [Transaction]) {
        let mut merchant_names: HashMap<i64, Option<String>> = HashMap::new();
        let mut product_names: HashMap<i64, Option<String>> = HashMap::new();

        for transaction in transactions.iter_mut() {
            let merchant_id = transaction.merchant_id;
            if !merchant_names.contains_key(&merchant_id) {
                let name = match self.merchants.get_location(merchant_id).await {
                    Ok(merchant) => Some(merchant.name),
                    Err(e) => {
                        tracing::warn!(
                            transaction_id = transaction.id,
                            merchant_id,
                            error = %e,
                            "could not resolve merchant name"
                        );
                        None
                    }
                };
                merchant_names.insert(merchant_id, name);
            }
            transaction.merchant_name = merchant_names.get(&merchant_id).cloned().flatten();

            for line in &mut transaction.products {
                if !product_names.contains_key(&line.product_id) {
                    let name = match self.products.get_product(line.product_id).await {
                        Ok(product) => Some(product.name),
                        Err(e) => {
                            tracing::warn!(
                                transaction_id = transaction.id,
                                product_id = line.product_id,
                                error = %e,
                                "could not resolve product name"
                            );
                            None
                        }
                    };
                    product_names.insert(line.product_id, name);
                }
                line.product_name = product_names.get(&line.product_id).cloned().flatten();
            }
        }
    }
}
