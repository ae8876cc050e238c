//! Resource descriptor construction.
//!
//! The resource identifies this process (service name, namespace,
//! environment) on every exported span, metric, and log record.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

use crate::config::DEFAULT_SERVICE_NAME;

/// Parse a comma-delimited `key=value` attribute string.
///
/// Keys and values are trimmed. Pairs without `=` or with an empty key are
/// skipped without raising an error.
pub fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Build the resource descriptor attached to all emitted telemetry.
///
/// `service_name` always wins over a `service.name` pair in `raw_attributes`;
/// an empty name falls back to [`DEFAULT_SERVICE_NAME`].
pub fn build_resource(service_name: &str, raw_attributes: &str) -> Resource {
    let service_name = if service_name.is_empty() {
        DEFAULT_SERVICE_NAME
    } else {
        service_name
    };

    let mut attributes: Vec<KeyValue> = parse_attributes(raw_attributes)
        .into_iter()
        .filter(|(key, _)| key != opentelemetry_semantic_conventions::resource::SERVICE_NAME)
        .map(|(key, value)| KeyValue::new(key, value))
        .collect();
    attributes.push(KeyValue::new(
        opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        service_name.to_string(),
    ));

    Resource::new(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    #[test]
    fn parses_well_formed_pairs_with_trimming() {
        let attrs = parse_attributes("env= staging , team =greeting,region=eu-1");
        assert_eq!(
            attrs,
            vec![
                ("env".to_string(), "staging".to_string()),
                ("team".to_string(), "greeting".to_string()),
                ("region".to_string(), "eu-1".to_string()),
            ]
        );
    }

    #[test]
    fn skips_malformed_pairs_silently() {
        let attrs = parse_attributes("no-equals,=novalue-key,ok=1,,trailing");
        assert_eq!(attrs, vec![("ok".to_string(), "1".to_string())]);
    }

    #[test]
    fn empty_input_yields_default_service_name() {
        let resource = build_resource("", "");
        let name = resource.get(Key::from_static_str(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        ));
        assert_eq!(
            name.map(|v| v.to_string()),
            Some(DEFAULT_SERVICE_NAME.to_string())
        );
    }

    #[test]
    fn explicit_service_name_wins_over_attribute_string() {
        let resource = build_resource("greeter-worker", "service.name=smuggled,env=dev");
        let name = resource.get(Key::from_static_str(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
        ));
        assert_eq!(name.map(|v| v.to_string()), Some("greeter-worker".to_string()));
        let env = resource.get(Key::from_static_str("env"));
        assert_eq!(env.map(|v| v.to_string()), Some("dev".to_string()));
    }
}
