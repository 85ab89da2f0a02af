//! Pluggable backends: content resolution and trusted-computing primitives.
//!
//! The engine never implements the primitives itself. A backend implements
//! [`TrustedPrimitives`] (and a host supplies a [`ContentResolver`]); every
//! method has a default that fails with [`PrimitiveError::NotImplemented`],
//! so a deployment with nothing bound can never hand out forged data.

mod simulated;
mod sources;

pub use simulated::SimulatedEnclave;
pub use sources::{DirectorySources, StaticSources};

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PrimitiveError;

/// Size of the caller-supplied data bound into a report.
pub const REPORT_DATA_SIZE: usize = 64;

/// Identity of the isolated context a primitive is invoked for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextHandle {
    pub id: u64,
    pub name: String,
}

impl ContextHandle {
    /// Allocate a handle with a process-unique id.
    pub fn new(name: impl Into<String>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
        }
    }
}

/// Exactly 64 bytes of caller data bound into a report.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ReportData(pub [u8; REPORT_DATA_SIZE]);

impl ReportData {
    pub fn as_bytes(&self) -> &[u8; REPORT_DATA_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for ReportData {
    type Error = PrimitiveError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let data: [u8; REPORT_DATA_SIZE] = bytes.try_into().map_err(|_| {
            PrimitiveError::MalformedInput(format!(
                "report data must be exactly {} bytes, got {}",
                REPORT_DATA_SIZE,
                bytes.len()
            ))
        })?;

        Ok(Self(data))
    }
}

impl std::fmt::Debug for ReportData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportData({} bytes)", REPORT_DATA_SIZE)
    }
}

macro_rules! opaque_bytes {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(pub Bytes);

        impl $name {
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(Bytes::from(bytes))
            }
        }

        impl From<&[u8]> for $name {
            fn from(bytes: &[u8]) -> Self {
                Self(Bytes::copy_from_slice(bytes))
            }
        }
    };
}

opaque_bytes!(
    /// Implementation-defined monotonic counter identifier.
    CounterId
);
opaque_bytes!(
    /// Locally verifiable attestation binding report data to the enclave identity.
    Report
);
opaque_bytes!(
    /// Report transformed for verification by a remote party.
    Quote
);
opaque_bytes!(
    /// Signed statement from a remote verifier about a quote.
    AttestationStatement
);

/// A freshly created monotonic counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonotonicCounter {
    pub id: CounterId,
    pub value: u64,
}

/// Trusted time as reported by the backend's time source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedTime {
    pub current_time: Bytes,
    pub time_source_nonce: Bytes,
}

/// Resolves a content key to source text.
///
/// Must be deterministic for a given key within a process lifetime.
pub trait ContentResolver: Send + Sync {
    fn resolve_content_key(&self, key: &str) -> Result<String, PrimitiveError> {
        let _ = key;
        Err(PrimitiveError::NotImplemented("resolveContentKey"))
    }
}

impl<F> ContentResolver for F
where
    F: Fn(&str) -> Result<String, PrimitiveError> + Send + Sync,
{
    fn resolve_content_key(&self, key: &str) -> Result<String, PrimitiveError> {
        self(key)
    }
}

/// Trusted-computing primitives backed by real or simulated hardware.
pub trait TrustedPrimitives: Send + Sync {
    fn create_monotonic_counter(
        &self,
        context: &ContextHandle,
    ) -> Result<MonotonicCounter, PrimitiveError> {
        let _ = context;
        Err(PrimitiveError::NotImplemented("createMonotonicCounter"))
    }

    fn destroy_monotonic_counter(
        &self,
        context: &ContextHandle,
        id: &CounterId,
    ) -> Result<(), PrimitiveError> {
        let _ = (context, id);
        Err(PrimitiveError::NotImplemented("destroyMonotonicCounter"))
    }

    fn read_monotonic_counter(
        &self,
        context: &ContextHandle,
        id: &CounterId,
    ) -> Result<u64, PrimitiveError> {
        let _ = (context, id);
        Err(PrimitiveError::NotImplemented("readMonotonicCounter"))
    }

    /// Returns the new value, strictly greater than the previous one.
    fn increment_monotonic_counter(
        &self,
        context: &ContextHandle,
        id: &CounterId,
    ) -> Result<u64, PrimitiveError> {
        let _ = (context, id);
        Err(PrimitiveError::NotImplemented("incrementMonotonicCounter"))
    }

    fn get_trusted_time(&self, context: &ContextHandle) -> Result<TrustedTime, PrimitiveError> {
        let _ = context;
        Err(PrimitiveError::NotImplemented("getTrustedTime"))
    }

    fn get_report(
        &self,
        context: &ContextHandle,
        report_data: &ReportData,
    ) -> Result<Report, PrimitiveError> {
        let _ = (context, report_data);
        Err(PrimitiveError::NotImplemented("getReport"))
    }

    fn get_report_data(&self, report: &Report) -> Result<ReportData, PrimitiveError> {
        let _ = report;
        Err(PrimitiveError::NotImplemented("getReportData"))
    }

    fn get_quote(&self, report: &Report) -> Result<Quote, PrimitiveError> {
        let _ = report;
        Err(PrimitiveError::NotImplemented("getQuote"))
    }

    fn get_quote_data(&self, quote: &Quote) -> Result<ReportData, PrimitiveError> {
        let _ = quote;
        Err(PrimitiveError::NotImplemented("getQuoteData"))
    }

    fn get_remote_attestation(&self, quote: &Quote) -> Result<AttestationStatement, PrimitiveError> {
        let _ = quote;
        Err(PrimitiveError::NotImplemented("getRemoteAttestation"))
    }

    /// Backends may fail here; the engine entry point
    /// [`crate::attestation::validate_remote_attestation`] turns any failure into `false`.
    fn validate_remote_attestation(
        &self,
        quote: &Quote,
        attestation: &AttestationStatement,
    ) -> Result<bool, PrimitiveError> {
        let _ = (quote, attestation);
        Err(PrimitiveError::NotImplemented("validateRemoteAttestation"))
    }

    /// Called once when the context's worker terminates. Backends holding
    /// per-context state drop it here.
    fn release_context(&self, context: &ContextHandle) {
        let _ = context;
    }
}

/// Backend with nothing bound. Every operation fails with `NotImplemented`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl ContentResolver for Unconfigured {}

impl TrustedPrimitives for Unconfigured {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_data_length_is_checked() {
        assert!(ReportData::try_from(&[0u8; 64][..]).is_ok());

        let short = ReportData::try_from(&[0u8; 63][..]).unwrap_err();
        assert!(matches!(short, PrimitiveError::MalformedInput(_)));

        let long = ReportData::try_from(&[0u8; 65][..]).unwrap_err();
        assert!(matches!(long, PrimitiveError::MalformedInput(_)));
    }

    #[test]
    fn test_unconfigured_fails_loudly() {
        let ctx = ContextHandle::new("main");
        let id = CounterId::from(vec![1, 2, 3]);

        let err = Unconfigured.create_monotonic_counter(&ctx).unwrap_err();
        assert_eq!(err, PrimitiveError::NotImplemented("createMonotonicCounter"));
        assert!(Unconfigured.read_monotonic_counter(&ctx, &id).unwrap_err().is_not_implemented());
        assert!(Unconfigured.get_trusted_time(&ctx).unwrap_err().is_not_implemented());
        assert!(Unconfigured.resolve_content_key("main").unwrap_err().is_not_implemented());
    }

    #[test]
    fn test_context_handles_are_unique() {
        let a = ContextHandle::new("same");
        let b = ContextHandle::new("same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |key: &str| -> Result<String, PrimitiveError> {
            match key {
                "main" => Ok("1 + 1".to_string()),
                other => Err(PrimitiveError::UnknownContentKey(other.to_string())),
            }
        };

        assert_eq!(resolver.resolve_content_key("main").unwrap(), "1 + 1");
        assert!(resolver.resolve_content_key("nope").is_err());
    }
}
