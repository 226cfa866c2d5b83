//! Hub request construction.
//!
//! Renders subscribe, unsubscribe and publish requests as
//! `application/x-www-form-urlencoded` bodies. Keys are emitted in byte
//! order; repeated keys (`hub.verify`, `hub.url`) keep the order they were
//! given in. Keys and values are percent-encoded the RFC 3986 way: only
//! `A-Z a-z 0-9 - _ . ~` stay literal.

use hub_client::HubRequest;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;
use url::Url;

use crate::config::{CallbackStyle, SubscriberConfig};
use crate::error::ValidationError;
use crate::types::{HubMode, SubscriptionId, VerifyMode};

/// Characters escaped in form keys and values.
const FORM_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Everything needed to render one hub request.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionIntent<'a> {
    pub mode: HubMode,
    pub topic_url: &'a str,
    pub hub_url: &'a str,
    /// Callback base URL; the subscription id is appended while building
    pub callback_url: &'a str,
    pub lease_seconds: u64,
    pub verify_token: &'a str,
}

/// Builds canonical hub requests. Pure: no I/O, no clock.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    verify_modes: Vec<VerifyMode>,
    callback_style: CallbackStyle,
    parameters: BTreeMap<String, String>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::from_config(&SubscriberConfig::default())
    }
}

impl RequestBuilder {
    pub fn from_config(config: &SubscriberConfig) -> Self {
        Self {
            verify_modes: config.verify_modes.clone(),
            callback_style: config.callback_style,
            parameters: config.parameters.clone(),
        }
    }

    /// Render the request for `intent`.
    ///
    /// Subscribe and unsubscribe produce `hub.callback`, `hub.mode`,
    /// `hub.topic`, one `hub.verify` per configured mode, `hub.verify_token`
    /// and, for subscribe only, `hub.lease_seconds`. Publish produces
    /// `hub.mode=publish&hub.url=<topic>`.
    ///
    /// # Errors
    ///
    /// `ValidationError` for non-absolute or non-http(s) URLs, a zero
    /// lease on subscribe, an empty verify token, or no verify modes.
    pub fn build(&self, intent: &SubscriptionIntent<'_>) -> Result<HubRequest, ValidationError> {
        if intent.mode == HubMode::Publish {
            return self.build_publish(intent.hub_url, &[intent.topic_url]);
        }

        validate_url("hub", intent.hub_url)?;
        validate_url("topic", intent.topic_url)?;
        validate_url("callback", intent.callback_url)?;

        if intent.verify_token.is_empty() {
            return Err(ValidationError::EmptyVerifyToken);
        }
        if self.verify_modes.is_empty() {
            return Err(ValidationError::NoVerifyModes);
        }
        if intent.mode == HubMode::Subscribe && intent.lease_seconds == 0 {
            return Err(ValidationError::InvalidLeaseSeconds);
        }

        let id = SubscriptionId::derive(intent.hub_url, intent.topic_url, intent.callback_url);

        let mut params: BTreeMap<String, Vec<String>> = self
            .parameters
            .iter()
            .filter(|(key, _)| !key.starts_with("hub."))
            .map(|(key, value)| (key.clone(), vec![value.clone()]))
            .collect();

        params.insert(
            "hub.callback".to_string(),
            vec![self.callback_with_id(intent.callback_url, &id)],
        );
        params.insert("hub.mode".to_string(), vec![intent.mode.as_str().to_string()]);
        params.insert("hub.topic".to_string(), vec![intent.topic_url.to_string()]);
        params.insert(
            "hub.verify".to_string(),
            self.verify_modes.iter().map(|m| m.as_str().to_string()).collect(),
        );
        params.insert("hub.verify_token".to_string(), vec![intent.verify_token.to_string()]);

        if intent.mode == HubMode::Subscribe {
            params.insert(
                "hub.lease_seconds".to_string(),
                vec![intent.lease_seconds.to_string()],
            );
        }

        Ok(HubRequest::new(intent.hub_url, encode_form(&params)))
    }

    /// Render a publish notification for one hub and several topics.
    pub fn build_publish<S: AsRef<str>>(
        &self,
        hub_url: &str,
        topic_urls: &[S],
    ) -> Result<HubRequest, ValidationError> {
        validate_url("hub", hub_url)?;
        if topic_urls.is_empty() {
            return Err(ValidationError::NoTopics);
        }

        let mut topics = Vec::with_capacity(topic_urls.len());
        for topic in topic_urls {
            validate_url("topic", topic.as_ref())?;
            topics.push(topic.as_ref().to_string());
        }

        let mut params = BTreeMap::new();
        params.insert("hub.mode".to_string(), vec![HubMode::Publish.as_str().to_string()]);
        params.insert("hub.url".to_string(), topics);

        Ok(HubRequest::new(hub_url, encode_form(&params)))
    }

    /// Callback URL as sent to the hub, carrying the subscription id.
    pub fn callback_with_id(&self, callback_url: &str, id: &SubscriptionId) -> String {
        match self.callback_style {
            CallbackStyle::QueryParameter => {
                let separator = if callback_url.contains('?') { '&' } else { '?' };
                format!(
                    "{callback_url}{separator}{}={id}",
                    callback_server::SUBSCRIPTION_PARAM
                )
            }
            CallbackStyle::PathSegment => format!("{}/{id}", callback_url.trim_end_matches('/')),
        }
    }
}

/// Check that `value` is an absolute http(s) URL with a host.
pub fn validate_url(field: &'static str, value: &str) -> Result<Url, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingUrl(field));
    }

    let invalid = |reason: String| ValidationError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url)
}

/// Encode a sorted multi-map as a form body.
fn encode_form(params: &BTreeMap<String, Vec<String>>) -> String {
    params
        .iter()
        .flat_map(|(key, values)| {
            values.iter().map(move |value| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, FORM_ENCODE_SET),
                    utf8_percent_encode(value, FORM_ENCODE_SET)
                )
            })
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "http://www.example.com/topic";
    const CALLBACK: &str = "http://www.example.com/callback";
    const HUB: &str = "http://hub.example.com/";

    fn intent(mode: HubMode) -> SubscriptionIntent<'static> {
        SubscriptionIntent {
            mode,
            topic_url: TOPIC,
            hub_url: HUB,
            callback_url: CALLBACK,
            lease_seconds: 2_592_000,
            verify_token: "abc",
        }
    }

    #[test]
    fn test_subscribe_body() {
        let request = RequestBuilder::default().build(&intent(HubMode::Subscribe)).unwrap();
        let id = SubscriptionId::derive(HUB, TOPIC, CALLBACK);

        assert_eq!(request.url, HUB);
        assert_eq!(
            request.body,
            format!(
                "hub.callback=http%3A%2F%2Fwww.example.com%2Fcallback%3Fxhub.subscription%3D{id}\
                 &hub.lease_seconds=2592000&hub.mode=subscribe\
                 &hub.topic=http%3A%2F%2Fwww.example.com%2Ftopic\
                 &hub.verify=sync&hub.verify=async&hub.verify_token=abc"
            )
        );
    }

    #[test]
    fn test_unsubscribe_body() {
        let request = RequestBuilder::default().build(&intent(HubMode::Unsubscribe)).unwrap();
        let id = SubscriptionId::derive(HUB, TOPIC, CALLBACK);

        assert_eq!(
            request.body,
            format!(
                "hub.callback=http%3A%2F%2Fwww.example.com%2Fcallback%3Fxhub.subscription%3D{id}\
                 &hub.mode=unsubscribe&hub.topic=http%3A%2F%2Fwww.example.com%2Ftopic\
                 &hub.verify=sync&hub.verify=async&hub.verify_token=abc"
            )
        );
        assert!(!request.body.contains("hub.lease_seconds"));
    }

    #[test]
    fn test_unsubscribe_ignores_zero_lease() {
        let request = RequestBuilder::default().build(&SubscriptionIntent {
            lease_seconds: 0,
            ..intent(HubMode::Unsubscribe)
        });
        assert!(request.is_ok());
    }

    #[test]
    fn test_verify_mode_order_follows_config() {
        let config = SubscriberConfig::new().with_verify_modes(vec![VerifyMode::Async, VerifyMode::Sync]);
        let request = RequestBuilder::from_config(&config)
            .build(&intent(HubMode::Subscribe))
            .unwrap();
        assert!(request.body.contains("hub.verify=async&hub.verify=sync&hub.verify_token=abc"));
    }

    #[test]
    fn test_validation_errors() {
        let builder = RequestBuilder::default();

        let err = builder
            .build(&SubscriptionIntent { topic_url: "/relative", ..intent(HubMode::Subscribe) })
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl { field: "topic", .. }));

        let err = builder
            .build(&SubscriptionIntent { hub_url: "ftp://hub.example.com/", ..intent(HubMode::Subscribe) })
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl { field: "hub", .. }));

        let err = builder
            .build(&SubscriptionIntent { callback_url: "", ..intent(HubMode::Subscribe) })
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingUrl("callback"));

        let err = builder
            .build(&SubscriptionIntent { lease_seconds: 0, ..intent(HubMode::Subscribe) })
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidLeaseSeconds);

        let err = builder
            .build(&SubscriptionIntent { verify_token: "", ..intent(HubMode::Unsubscribe) })
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyVerifyToken);

        let no_modes = RequestBuilder::from_config(&SubscriberConfig::new().with_verify_modes(vec![]));
        assert_eq!(
            no_modes.build(&intent(HubMode::Subscribe)).unwrap_err(),
            ValidationError::NoVerifyModes
        );
    }

    #[test]
    fn test_callback_with_existing_query() {
        let builder = RequestBuilder::default();
        let id = SubscriptionId::new("abc123");
        assert_eq!(
            builder.callback_with_id("http://example.com/cb?feed=1", &id),
            "http://example.com/cb?feed=1&xhub.subscription=abc123"
        );
    }

    #[test]
    fn test_path_style_callback() {
        let config = SubscriberConfig::new().with_callback_style(CallbackStyle::PathSegment);
        let builder = RequestBuilder::from_config(&config);
        let id = SubscriptionId::new("abc123");

        assert_eq!(builder.callback_with_id("http://example.com/cb/", &id), "http://example.com/cb/abc123");

        let request = builder.build(&intent(HubMode::Subscribe)).unwrap();
        let expected_id = SubscriptionId::derive(HUB, TOPIC, CALLBACK);
        assert!(request
            .body
            .starts_with(&format!("hub.callback=http%3A%2F%2Fwww.example.com%2Fcallback%2F{expected_id}&")));
    }

    #[test]
    fn test_custom_parameters_sorted_and_never_override_protocol() {
        let mut config = SubscriberConfig::new().with_parameter("zeta", "last").with_parameter("alpha", "a b&c");
        // Inserted directly to bypass validate(); the builder must still skip it
        config.parameters.insert("hub.mode".to_string(), "publish".to_string());

        let request = RequestBuilder::from_config(&config)
            .build(&intent(HubMode::Subscribe))
            .unwrap();

        assert!(request.body.starts_with("alpha=a%20b%26c&hub.callback="));
        assert!(request.body.ends_with("&hub.verify_token=abc&zeta=last"));
        assert!(request.body.contains("hub.mode=subscribe"));
        assert!(!request.body.contains("hub.mode=publish"));
    }

    #[test]
    fn test_publish_body() {
        let builder = RequestBuilder::default();

        let request = builder.build(&intent(HubMode::Publish)).unwrap();
        assert_eq!(request.body, "hub.mode=publish&hub.url=http%3A%2F%2Fwww.example.com%2Ftopic");

        let request = builder
            .build_publish(HUB, &["http://a.example.com/feed", "http://b.example.com/feed"])
            .unwrap();
        assert_eq!(
            request.body,
            "hub.mode=publish&hub.url=http%3A%2F%2Fa.example.com%2Ffeed&hub.url=http%3A%2F%2Fb.example.com%2Ffeed"
        );

        let none: [&str; 0] = [];
        assert_eq!(builder.build_publish(HUB, &none).unwrap_err(), ValidationError::NoTopics);
    }

    #[test]
    fn test_unreserved_characters_stay_literal() {
        let encoded = utf8_percent_encode("a-b_c.d~e f/g", FORM_ENCODE_SET).to_string();
        assert_eq!(encoded, "a-b_c.d~e%20f%2Fg");
    }
}
