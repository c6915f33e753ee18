use std::sync::Arc;

use reelpipe_core::delivery::{DeliveryConfig, DeliveryLoop, DeliveryReport, TelegramClient};

use crate::{AppContext, Result};

pub(crate) async fn execute(context: &AppContext) -> Result<DeliveryReport> {
    let config = context.config();
    let (token, chat_id) = context.credentials().telegram()?;
    let client = TelegramClient::new(&config.delivery, &token, &chat_id)?;
    let runner = DeliveryLoop::new(DeliveryConfig::from(config), Arc::new(client));
    Ok(runner.run().await?)
}
