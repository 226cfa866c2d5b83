//! Property tests for subscription ids and hub request bodies.

use proptest::prelude::*;
use pubsub_subscriber::{HubMode, RequestBuilder, SubscriptionId, SubscriptionIntent};

fn http_url() -> impl Strategy<Value = String> {
    ("[a-z]{1,12}", "[a-z]{2,6}", "[a-zA-Z0-9_~.-]{0,16}")
        .prop_map(|(host, tld, path)| format!("http://{host}.{tld}/{path}"))
}

fn token() -> impl Strategy<Value = String> {
    "[ -~]{1,32}"
}

fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

proptest! {
    #[test]
    fn id_is_pure_lowercase_sha1_hex(hub in http_url(), topic in http_url(), callback in http_url()) {
        let first = SubscriptionId::derive(&hub, &topic, &callback);
        let second = SubscriptionId::derive(&hub, &topic, &callback);

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.as_str().len(), 40);
        prop_assert!(first.as_str().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn subscribe_body_is_well_formed(
        hub in http_url(),
        topic in http_url(),
        callback in http_url(),
        verify_token in token(),
        lease_seconds in 1u64..=u64::from(u32::MAX),
    ) {
        let request = RequestBuilder::default()
            .build(&SubscriptionIntent {
                mode: HubMode::Subscribe,
                topic_url: &topic,
                hub_url: &hub,
                callback_url: &callback,
                lease_seconds,
                verify_token: &verify_token,
            })
            .unwrap();

        prop_assert_eq!(count(&request.body, "hub.verify=sync"), 1);
        prop_assert_eq!(count(&request.body, "hub.verify=async"), 1);
        prop_assert!(request.body.contains("hub.verify=sync&hub.verify=async"));
        let expected_lease = format!("hub.lease_seconds={lease_seconds}&");
        prop_assert!(request.body.contains(&expected_lease));

        // Only unreserved characters, '%' escapes and the form separators
        prop_assert!(request
            .body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.~%=&".contains(c)));

        let keys: Vec<&str> = request
            .body
            .split('&')
            .filter_map(|pair| pair.split_once('=').map(|(key, _)| key))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(keys, sorted);
    }

    #[test]
    fn unsubscribe_body_never_has_lease(
        hub in http_url(),
        topic in http_url(),
        callback in http_url(),
        verify_token in token(),
        lease_seconds in any::<u64>(),
    ) {
        let request = RequestBuilder::default()
            .build(&SubscriptionIntent {
                mode: HubMode::Unsubscribe,
                topic_url: &topic,
                hub_url: &hub,
                callback_url: &callback,
                lease_seconds,
                verify_token: &verify_token,
            })
            .unwrap();

        prop_assert!(!request.body.contains("hub.lease_seconds"));
        prop_assert!(request.body.contains("hub.mode=unsubscribe"));
    }
}
