//! Typed shortcuts over [`Gateway::call`] for the operations the bot uses.

use tracing::debug;

use super::{ApiResult, Gateway, InputFile, Params};

impl Gateway {
    pub async fn get_me(&self) -> ApiResult {
        self.call("getMe", Params::new()).await
    }

    /// Fetch updates with an id of at least `offset`
    pub async fn get_updates(&self, offset: i64) -> ApiResult {
        debug!("Polling update id '{}'", offset);
        self.call("getUpdates", Params::new().text("offset", offset))
            .await
    }

    pub async fn send_message(&self, chat_id: i64, text: impl Into<String>) -> ApiResult {
        let params = Params::new()
            .text("chat_id", chat_id)
            .text("text", text.into());
        self.call("sendMessage", params).await
    }

    /// Register the webhook URL together with its self-signed certificate
    pub async fn set_webhook(&self, url: &str, certificate: InputFile) -> ApiResult {
        let params = Params::new()
            .text("url", url)
            .file("certificate", certificate);
        self.call("setWebhook", params).await
    }

    pub async fn delete_webhook(&self) -> ApiResult {
        self.call("deleteWebhook", Params::new()).await
    }

    pub async fn get_webhook_info(&self) -> ApiResult {
        self.call("getWebhookInfo", Params::new()).await
    }
}
