//! Property tests for the config resolution precedence walk: a value set at
//! the mode level must always win over endpoint/provider/default values, and
//! absence at every level must resolve to the documented default.

use batchbox::config::{ConfigResolver, ConfigSnapshot};
use batchbox::types::{FileFormat, OperationMode};
use proptest::prelude::*;

fn file_format_name(format: FileFormat) -> &'static str {
    match format {
        FileFormat::SameName => "same_name",
        FileFormat::Indexed => "indexed",
        FileFormat::Array => "array",
        FileFormat::Numbered => "numbered",
    }
}

fn yaml_with_layers(
    mode_format: Option<FileFormat>,
    endpoint_format: Option<FileFormat>,
    provider_format: Option<FileFormat>,
    mode_field: Option<&str>,
    endpoint_field: Option<&str>,
    provider_field: Option<&str>,
) -> ConfigSnapshot {
    let mut provider = String::from("    base_url: https://api.test\n    api_key: sk-1\n");
    if let Some(f) = provider_format {
        provider.push_str(&format!("    file_format: {}\n", file_format_name(f)));
    }
    if let Some(f) = provider_field {
        provider.push_str(&format!("    file_field: {f}\n"));
    }

    let mut endpoint = String::new();
    if let Some(f) = endpoint_format {
        endpoint.push_str(&format!("        file_format: {}\n", file_format_name(f)));
    }
    if let Some(f) = endpoint_field {
        endpoint.push_str(&format!("        file_field: {f}\n"));
    }

    let mut mode = String::from("            endpoint: /v1/generate\n");
    if let Some(f) = mode_format {
        mode.push_str(&format!("            file_format: {}\n", file_format_name(f)));
    }
    if let Some(f) = mode_field {
        mode.push_str(&format!("            file_field: {f}\n"));
    }

    let yaml = format!(
        "providers:\n  p:\n{provider}models:\n  m:\n    api_endpoints:\n      - provider: p\n{endpoint}        modes:\n          text_to_asset:\n{mode}"
    );
    ConfigSnapshot::from_yaml(&yaml, None).expect("generated YAML parses")
}

fn format_strategy() -> impl Strategy<Value = Option<FileFormat>> {
    proptest::option::of(prop_oneof![
        Just(FileFormat::SameName),
        Just(FileFormat::Indexed),
        Just(FileFormat::Array),
        Just(FileFormat::Numbered),
    ])
}

fn field_strategy() -> impl Strategy<Value = Option<&'static str>> {
    proptest::option::of(prop_oneof![Just("image"), Just("file"), Just("source")])
}

proptest! {
    #[test]
    fn finest_configured_layer_always_wins(
        mode_format in format_strategy(),
        endpoint_format in format_strategy(),
        provider_format in format_strategy(),
        mode_field in field_strategy(),
        endpoint_field in field_strategy(),
        provider_field in field_strategy(),
    ) {
        let snapshot = yaml_with_layers(
            mode_format, endpoint_format, provider_format,
            mode_field, endpoint_field, provider_field,
        );
        let endpoints = snapshot.endpoints_for("m").unwrap();
        let resolved =
            ConfigResolver::resolve(&snapshot, "m", OperationMode::TextToAsset, endpoints[0])
                .unwrap();

        let expected_format = mode_format
            .or(endpoint_format)
            .or(provider_format)
            .unwrap_or(FileFormat::SameName);
        prop_assert_eq!(resolved.file_format, expected_format);

        let expected_field = mode_field
            .or(endpoint_field)
            .or(provider_field)
            .unwrap_or("image");
        prop_assert_eq!(resolved.file_field.as_str(), expected_field);
    }
}
