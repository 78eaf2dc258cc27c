//! Slack incoming-webhook delivery

use super::Notice;
use crate::error::{RunnerError, RunnerResult};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct Payload<'a> {
    attachments: [Attachment<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    username: &'a str,
    as_user: bool,
    title: &'a str,
    color: &'static str,
    text: &'a str,
    mrkdwn_in: [&'static str; 1],
}

/// Posts notices to a Slack webhook
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    webhook: Option<String>,
    username: String,
    debug: bool,
}

impl SlackNotifier {
    /// Create a notifier; `debug` suppresses all delivery
    pub fn new(webhook: Option<String>, username: impl Into<String>, debug: bool) -> Self {
        Self {
            webhook,
            username: username.into(),
            debug,
        }
    }

    /// JSON body for `notice`
    pub fn payload(&self, notice: &Notice) -> RunnerResult<String> {
        let payload = Payload {
            attachments: [Attachment {
                username: &self.username,
                as_user: true,
                title: &notice.title,
                color: notice.color.as_str(),
                text: &notice.description,
                mrkdwn_in: ["text"],
            }],
        };
        Ok(serde_json::to_string(&payload)?)
    }

    /// Deliver `notice`; returns whether a request was made
    pub async fn send(&self, notice: &Notice) -> RunnerResult<bool> {
        if self.debug {
            debug!("Skipping Slack notification - debug is enabled!");
            return Ok(false);
        }
        let Some(webhook) = self.webhook.clone() else {
            warn!("Skipping Slack notification - webhook is missing!");
            return Ok(false);
        };

        let body = self.payload(notice)?;
        tokio::task::spawn_blocking(move || post(&webhook, &body))
            .await
            .map_err(|e| RunnerError::Notification(e.to_string()))??;
        info!("Sent Slack notification: {}", notice.title);
        Ok(true)
    }
}

fn post(webhook: &str, body: &str) -> RunnerResult<()> {
    let mut response = ureq::post(webhook)
        .config()
        .http_status_as_error(false)
        .build()
        .header("Content-Type", "application/json")
        .send(body)
        .map_err(|e| RunnerError::Notification(e.to_string()))?;

    let status = response.status().as_u16();
    if status != 200 {
        let body = response.body_mut().read_to_string().unwrap_or_default();
        return Err(RunnerError::NotificationFailed { status, body });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Color;

    fn notice() -> Notice {
        Notice {
            title: "SUCCESS: Recipe Foo packaged new version 1.0".into(),
            description: "*Build Path(s):*\n /tmp/Foo.pkg\n".into(),
            color: Color::Good,
        }
    }

    #[test]
    fn payload_shape() {
        let notifier = SlackNotifier::new(None, "Autopkg", false);
        let body: serde_json::Value =
            serde_json::from_str(&notifier.payload(&notice()).unwrap()).unwrap();

        let attachment = &body["attachments"][0];
        assert_eq!(attachment["username"], "Autopkg");
        assert_eq!(attachment["as_user"], true);
        assert_eq!(attachment["color"], "good");
        assert_eq!(attachment["title"], "SUCCESS: Recipe Foo packaged new version 1.0");
        assert_eq!(attachment["mrkdwn_in"][0], "text");
    }

    #[tokio::test]
    async fn debug_mode_never_sends() {
        let notifier = SlackNotifier::new(Some("http://127.0.0.1:9/hook".into()), "Autopkg", true);
        assert!(!notifier.send(&notice()).await.unwrap());
    }

    #[tokio::test]
    async fn missing_webhook_never_sends() {
        let notifier = SlackNotifier::new(None, "Autopkg", false);
        assert!(!notifier.send(&notice()).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_webhook_is_an_error() {
        let notifier = SlackNotifier::new(Some("http://127.0.0.1:9/hook".into()), "Autopkg", false);
        assert!(notifier.send(&notice()).await.is_err());
    }
}
