//! Action catalog a workflow node's `action` kind may invoke
//! ("`webhook`; `ticket.jira` / `ticket.linear`; `notify.slack` /
//! `notify.teams`; `runbook`: DEFERRED in scope; unknown `actionType` ⇒
//! action fails with `UnknownAction`").
//!
//! Every action receives its node config already interpolated by the
//! executor, so handlers never see a `{{ }}` placeholder.

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;

/// Response bodies from `webhook`/ticketing/chat calls are capped before
/// being stored in `node_results`, since an upstream can return an
/// arbitrarily large body and this value is persisted verbatim.
const RESPONSE_TRUNCATE_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action type '{0}'")]
    UnknownAction(String),
    #[error("runbook actions are deferred")]
    RunbookDeferred,
    #[error("action config invalid: {0}")]
    InvalidConfig(String),
    #[error("action request failed: {0}")]
    RequestFailed(String),
}

fn truncate(body: &str) -> String {
    if body.len() <= RESPONSE_TRUNCATE_BYTES {
        body.to_string()
    } else {
        format!("{}...<truncated>", &body[..RESPONSE_TRUNCATE_BYTES])
    }
}

fn config_str<'a>(config: &'a Value, field: &str) -> Result<&'a str, ActionError> {
    config.get(field).and_then(Value::as_str).ok_or_else(|| ActionError::InvalidConfig(format!("missing '{field}'")))
}

fn apply_auth(mut builder: reqwest::RequestBuilder, config: &Value, body: &str) -> Result<reqwest::RequestBuilder, ActionError> {
    let auth = config.get("auth").cloned().unwrap_or(json!({"type": "none"}));
    let auth_type = auth.get("type").and_then(Value::as_str).unwrap_or("none");
    match auth_type {
        "none" => {}
        "bearer" => {
            let token = auth.get("token").and_then(Value::as_str).ok_or_else(|| ActionError::InvalidConfig("bearer auth missing 'token'".into()))?;
            builder = builder.bearer_auth(token);
        }
        "basic" => {
            let username = auth.get("username").and_then(Value::as_str).ok_or_else(|| ActionError::InvalidConfig("basic auth missing 'username'".into()))?;
            let password = auth.get("password").and_then(Value::as_str);
            builder = builder.basic_auth(username, password);
        }
        "hmac" => {
            let secret = auth.get("secret").and_then(Value::as_str).ok_or_else(|| ActionError::InvalidConfig("hmac auth missing 'secret'".into()))?;
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|e| ActionError::InvalidConfig(e.to_string()))?;
            mac.update(body.as_bytes());
            let signature = hex::encode(mac.finalize().into_bytes());
            builder = builder.header("X-Beacon-Signature", signature);
        }
        other => return Err(ActionError::InvalidConfig(format!("unsupported auth type '{other}'"))),
    }
    Ok(builder)
}

async fn webhook(http: &reqwest::Client, config: &Value) -> Result<Value, ActionError> {
    let url = config_str(config, "url")?;
    let method = config.get("method").and_then(Value::as_str).unwrap_or("POST").to_uppercase();
    let body = config.get("body").cloned().unwrap_or(Value::Null);
    let body_text = serde_json::to_string(&body).unwrap_or_default();

    let mut builder = http.request(method.parse().map_err(|_| ActionError::InvalidConfig(format!("invalid method '{method}'")))?, url);
    if let Some(headers) = config.get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            if let Some(value) = value.as_str() {
                builder = builder.header(name, value);
            }
        }
    }
    builder = apply_auth(builder, config, &body_text)?;
    if !body.is_null() {
        builder = builder.json(&body);
    }

    let response = builder.send().await.map_err(|e| ActionError::RequestFailed(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    Ok(json!({"statusCode": status, "body": truncate(&text)}))
}

async fn ticket(http: &reqwest::Client, provider: &str, config: &Value) -> Result<Value, ActionError> {
    let api_base = config_str(config, "apiBase")?;
    let summary = config_str(config, "summary")?;
    let description = config.get("description").and_then(Value::as_str).unwrap_or_default();

    let body = json!({"summary": summary, "description": description});
    let mut builder = http.post(format!("{api_base}/issues"));
    if let Some(token) = config.get("authToken").and_then(Value::as_str) {
        builder = builder.bearer_auth(token);
    }
    let response = builder.json(&body).send().await.map_err(|e| ActionError::RequestFailed(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    Ok(json!({"provider": provider, "statusCode": status, "body": truncate(&text)}))
}

async fn notify_chat(http: &reqwest::Client, surface: &str, config: &Value) -> Result<Value, ActionError> {
    let webhook_url = config_str(config, "webhookUrl")?;
    let message = config_str(config, "message")?;
    let response = http
        .post(webhook_url)
        .json(&json!({"text": message}))
        .send()
        .await
        .map_err(|e| ActionError::RequestFailed(e.to_string()))?;
    let status = response.status().as_u16();
    Ok(json!({"surface": surface, "statusCode": status}))
}

/// Dispatches `config["actionType"]` to its handler. `config` must
/// already be fully interpolated.
pub async fn invoke(http: &reqwest::Client, config: &Value) -> Result<Value, ActionError> {
    let action_type = config_str(config, "actionType")?;
    match action_type {
        "webhook" => webhook(http, config).await,
        "ticket.jira" => ticket(http, "jira", config).await,
        "ticket.linear" => ticket(http, "linear", config).await,
        "notify.slack" => notify_chat(http, "slack", config).await,
        "notify.teams" => notify_chat(http, "teams", config).await,
        "runbook" => Err(ActionError::RunbookDeferred),
        other => Err(ActionError::UnknownAction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_action_type_fails_with_unknown_action() {
        let http = reqwest::Client::new();
        let config = json!({"actionType": "send.carrier-pigeon"});
        let err = invoke(&http, &config).await.unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn runbook_action_is_deferred() {
        let http = reqwest::Client::new();
        let config = json!({"actionType": "runbook"});
        let err = invoke(&http, &config).await.unwrap_err();
        assert!(matches!(err, ActionError::RunbookDeferred));
    }

    #[tokio::test]
    async fn webhook_missing_url_is_invalid_config() {
        let http = reqwest::Client::new();
        let config = json!({"actionType": "webhook"});
        let err = invoke(&http, &config).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidConfig(_)));
    }

    #[test]
    fn long_response_body_is_truncated() {
        let long = "x".repeat(RESPONSE_TRUNCATE_BYTES + 100);
        let truncated = truncate(&long);
        assert!(truncated.len() < long.len());
        assert!(truncated.ends_with("<truncated>"));
    }
}
