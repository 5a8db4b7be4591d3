use backon::{BackoffBuilder, ExponentialBuilder};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions, BasicRejectOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::AmqpBus;
use crate::domain::events::{
    MERCHANT_STOCK_BINDING, MERCHANT_STOCK_QUEUE, WAREHOUSE_STOCK_BINDING, WAREHOUSE_STOCK_QUEUE,
};
use crate::use_cases::reduce_stock::ReduceStock;

/// What to tell the broker about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
    Reject,
}

pub struct StockConsumer {
    bus: AmqpBus,
    queue: &'static str,
    pattern: &'static str,
    handler: Arc<ReduceStock>,
    /// Handle each delivery on its own task instead of one at a time.
    fork: bool,
}

impl StockConsumer {
    pub fn merchant(bus: AmqpBus, handler: Arc<ReduceStock>) -> Self {
        Self {
            bus,
            queue: MERCHANT_STOCK_QUEUE,
            pattern: MERCHANT_STOCK_BINDING,
            handler,
            fork: true,
        }
    }

    pub fn warehouse(bus: AmqpBus, handler: Arc<ReduceStock>) -> Self {
        Self {
            bus,
            queue: WAREHOUSE_STOCK_QUEUE,
            pattern: WAREHOUSE_STOCK_BINDING,
            handler,
            fork: false,
        }
    }

    /// Consumes until the process exits, reconnecting with jittered backoff.
    pub async fn run(self) {
        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();
        let mut backoff = backoff_builder.build();

        loop {
            match self
                .bus
                .subscribe(self.queue, self.pattern, self.handler.consumer())
                .await
            {
                Ok(mut consumer) => {
                    info!(queue = %self.queue, pattern = %self.pattern, "stock consumer started");
                    backoff = backoff_builder.build();

                    while let Some(delivery) = consumer.next().await {
                        match delivery {
                            Ok(delivery) => self.dispatch(delivery).await,
                            Err(e) => {
                                error!(queue = %self.queue, error = %e, "delivery error, reconnecting");
                                break;
                            }
                        }
                    }
                    warn!(queue = %self.queue, "consumer stream ended, reconnecting");
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "failed to start consumer");
                }
            }

            let delay = backoff.next().unwrap_or(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
        }
    }

    async fn dispatch(&self, delivery: Delivery) {
        let handler = Arc::clone(&self.handler);
        if self.fork {
            tokio::spawn(async move { process(handler, delivery).await });
        } else {
            process(handler, delivery).await;
        }
    }
}

async fn process(handler: Arc<ReduceStock>, delivery: Delivery) {
    let routing_key = delivery.routing_key.as_str().to_string();
    let disposition = handler.handle(&routing_key, &delivery.data).await;

    let result = match disposition {
        Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
        Disposition::Requeue => {
            delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await
        }
        Disposition::Reject => delivery.reject(BasicRejectOptions { requeue: false }).await,
    };

    if let Err(e) = result {
        error!(routing_key = %routing_key, disposition = ?disposition, error = %e, "failed to settle delivery");
    }
}
