use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use taxforms::config::SecurityConfig;
use taxforms::intake::{AesGcmSinCodec, CodecError, SinCodec};
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// SIN codec from the configured key, or a throwaway one when no key is set.
///
/// Configuration already refuses to load without a key in production.
pub(crate) fn build_codec(security: &SecurityConfig) -> Result<Arc<dyn SinCodec>, CodecError> {
    match security.field_encryption_key.as_deref() {
        Some(key) => Ok(Arc::new(AesGcmSinCodec::from_base64_key(key)?)),
        None => {
            warn!("FIELD_ENCRYPTION_KEY not set; sealed SIN values will not survive a restart");
            Ok(Arc::new(AesGcmSinCodec::ephemeral()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxforms::intake::sin::generate_key_base64;
    use taxforms::intake::SinNumber;

    #[test]
    fn configured_key_is_reused_across_codecs() {
        let security = SecurityConfig {
            field_encryption_key: Some(generate_key_base64()),
        };
        let first = build_codec(&security).expect("codec");
        let second = build_codec(&security).expect("codec");

        let sealed = first.seal(&SinNumber::new("123456789")).expect("seals");
        assert_eq!(
            second.open(&sealed).expect("opens").as_str(),
            "123456789"
        );
    }

    #[test]
    fn missing_key_falls_back_to_ephemeral_codec() {
        let codec = build_codec(&SecurityConfig {
            field_encryption_key: None,
        })
        .expect("codec");
        let sealed = codec.seal(&SinNumber::new("046454286")).expect("seals");
        assert!(codec.open(&sealed).is_ok());
    }

    #[test]
    fn malformed_key_is_an_error() {
        let result = build_codec(&SecurityConfig {
            field_encryption_key: Some("short".to_string()),
        });
        assert!(result.is_err());
    }
}
