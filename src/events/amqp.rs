use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ExchangeKind,
};
use tracing::{debug, info};

use super::BusError;
use crate::domain::events::BUSINESS_EVENTS_EXCHANGE;
use crate::ports::EventPublisher;

const PREFETCH: u16 = 16;

/// Pooled connection to the broker with the business exchange declared.
#[derive(Clone)]
pub struct AmqpBus {
    pool: Pool,
    exchange: String,
}

impl AmqpBus {
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let manager = Manager::new(url.to_string(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BusError::Connection(format!("Failed to create pool: {}", e)))?;

        let bus = Self {
            pool,
            exchange: BUSINESS_EVENTS_EXCHANGE.to_string(),
        };

        let channel = bus.channel().await?;
        channel
            .exchange_declare(
                &bus.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Connection(format!("Failed to declare exchange: {}", e)))?;

        info!(exchange = %bus.exchange, "Connected to AMQP");
        Ok(bus)
    }

    async fn channel(&self) -> Result<Channel, BusError> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BusError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BusError::Connection(format!("Failed to create channel: {}", e)))
    }

    /// Declares a durable queue, binds it to `pattern` and starts a
    /// manual-ack consumer on it.
    pub async fn subscribe(
        &self,
        queue: &str,
        pattern: &str,
        consumer_tag: &str,
    ) -> Result<lapin::Consumer, BusError> {
        let channel = self.channel().await?;

        channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to set prefetch: {}", e)))?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to declare queue: {}", e)))?;

        channel
            .queue_bind(
                queue,
                &self.exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to bind queue: {}", e)))?;

        info!(queue = %queue, pattern = %pattern, "Bound queue to exchange");

        channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))
    }

    pub async fn ping(&self) -> Result<(), BusError> {
        self.channel().await.map(|_| ())
    }
}

#[async_trait]
impl EventPublisher for AmqpBus {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BusError> {
        let channel = self.channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Publish(format!("Failed to enable confirms: {}", e)))?;

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        let confirmation = channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;

        if let Err(e) = channel.close(200, "published").await {
            debug!(error = %e, "Failed to close publish channel");
        }

        if confirmation.is_nack() {
            return Err(BusError::Publish("Broker rejected message".to_string()));
        }

        debug!(exchange = %self.exchange, routing_key = %routing_key, "Published event");
        Ok(())
    }
}
