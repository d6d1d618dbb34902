use std::time::Duration;

use async_trait::async_trait;
use marvin_core::config::SlackConfig;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::outbound::OutgoingMessage;

const RTM_CONNECT: &str = "rtm.connect";
const CONVERSATIONS_INFO: &str = "conversations.info";
const USERS_INFO: &str = "users.info";
const CHAT_POST_MESSAGE: &str = "chat.postMessage";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("slack `{method}` request failed: {reason}")]
    Http { method: &'static str, reason: String },
    #[error("slack `{method}` returned error `{error}`")]
    Api { method: &'static str, error: String },
    #[error("slack `{method}` response could not be decoded: {reason}")]
    Decode { method: &'static str, reason: String },
}

/// Result of `rtm.connect`. The URL is single-use and must be opened promptly.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ConnectionHandshake {
    pub url: String,
    pub team: TeamIdentity,
    #[serde(rename = "self")]
    pub bot: BotIdentity,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TeamIdentity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversationInfo {
    pub is_direct_message: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub display_name: String,
}

/// Slack Web API operations the bot depends on. The credential is owned by
/// the implementation.
#[async_trait]
pub trait SlackGateway: Send + Sync {
    async fn connect(&self) -> Result<ConnectionHandshake, GatewayError>;
    async fn conversation_info(&self, channel_id: &str) -> Result<ConversationInfo, GatewayError>;
    async fn user_info(&self, user_id: &str) -> Result<UserInfo, GatewayError>;
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), GatewayError>;
}

pub struct SlackWebClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl SlackWebClient {
    pub fn new(config: &SlackConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| GatewayError::Http {
                method: "client.build",
                reason: error.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.token.clone(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn get_api<T>(
        &self,
        method: &'static str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
    {
        let body = send_json(method, self.get_request(method, query)).await?;
        parse_api_response(method, body)
    }

    /// The token travels in the `Authorization` header, never in the query string.
    fn get_request(&self, method: &str, query: &[(&str, &str)]) -> RequestBuilder {
        self.client
            .get(self.endpoint(method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
    }
}

#[async_trait]
impl SlackGateway for SlackWebClient {
    async fn connect(&self) -> Result<ConnectionHandshake, GatewayError> {
        self.get_api(RTM_CONNECT, &[]).await
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<ConversationInfo, GatewayError> {
        let response: ConversationsInfoResponse =
            self.get_api(CONVERSATIONS_INFO, &[("channel", channel_id)]).await?;
        Ok(ConversationInfo { is_direct_message: response.channel.is_im })
    }

    async fn user_info(&self, user_id: &str) -> Result<UserInfo, GatewayError> {
        let response: UsersInfoResponse = self.get_api(USERS_INFO, &[("user", user_id)]).await?;
        Ok(UserInfo { display_name: response.user.name })
    }

    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), GatewayError> {
        let request = self
            .client
            .post(self.endpoint(CHAT_POST_MESSAGE))
            .bearer_auth(self.token.expose_secret())
            .json(message);
        let body = send_json(CHAT_POST_MESSAGE, request).await?;
        let _: Value = parse_api_response(CHAT_POST_MESSAGE, body)?;
        Ok(())
    }
}

async fn send_json(
    method: &'static str,
    request: RequestBuilder,
) -> Result<Value, GatewayError> {
    let response = request
        .send()
        .await
        .map_err(|error| GatewayError::Http { method, reason: error.to_string() })?;

    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::Http { method, reason: format!("unexpected status {status}") });
    }

    debug!(
        event_name = "egress.slack.api_response",
        method,
        status = %status,
        "slack api responded"
    );

    response
        .json::<Value>()
        .await
        .map_err(|error| GatewayError::Decode { method, reason: error.to_string() })
}

/// Unwraps the `{ "ok": bool, "error": "..." }` envelope every Web API method uses.
fn parse_api_response<T>(method: &'static str, body: Value) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
{
    if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_owned();
        return Err(GatewayError::Api { method, error });
    }

    serde_json::from_value(body)
        .map_err(|error| GatewayError::Decode { method, reason: error.to_string() })
}

#[derive(Debug, Deserialize)]
struct ConversationsInfoResponse {
    channel: ChannelPayload,
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    #[serde(default)]
    is_im: bool,
}

#[derive(Debug, Deserialize)]
struct UsersInfoResponse {
    user: UserPayload,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    name: String,
}
