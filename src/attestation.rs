//! Host-side report, quote and remote attestation operations.
//!
//! These run outside any worker: a host extracts data from reports it was
//! handed, converts local reports into quotes and talks to the remote
//! verifier through the bound [`TrustedPrimitives`] backend.

use crate::error::PrimitiveError;
use crate::provider::{AttestationStatement, Quote, Report, ReportData, TrustedPrimitives};

/// Extract the 64 bytes of report data bound into `report`.
pub fn get_report_data(
    primitives: &dyn TrustedPrimitives,
    report: &Report,
) -> Result<ReportData, PrimitiveError> {
    primitives.get_report_data(report)
}

/// Convert a report produced on this machine into a remotely verifiable quote.
pub fn get_quote(primitives: &dyn TrustedPrimitives, report: &Report) -> Result<Quote, PrimitiveError> {
    primitives.get_quote(report)
}

/// Extract the 64 bytes of report data bound into `quote`.
pub fn get_quote_data(
    primitives: &dyn TrustedPrimitives,
    quote: &Quote,
) -> Result<ReportData, PrimitiveError> {
    primitives.get_quote_data(quote)
}

/// Ask the remote verifier to attest `quote`, which may come from any machine.
pub fn get_remote_attestation(
    primitives: &dyn TrustedPrimitives,
    quote: &Quote,
) -> Result<AttestationStatement, PrimitiveError> {
    primitives.get_remote_attestation(quote)
}

/// Check a signed attestation statement against `quote`.
///
/// Never fails: a mismatch, a malformed statement and an unconfigured
/// backend all yield `false`.
pub fn validate_remote_attestation(
    primitives: &dyn TrustedPrimitives,
    quote: &Quote,
    attestation: &AttestationStatement,
) -> bool {
    match primitives.validate_remote_attestation(quote, attestation) {
        Ok(valid) => valid,
        Err(e) if e.is_not_implemented() => {
            log::warn!("remote attestation validation requested without a backend: {}", e);
            false
        }
        Err(e) => {
            log::debug!("remote attestation rejected: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ContextHandle, SimulatedEnclave, Unconfigured};

    #[test]
    fn test_report_data_round_trip() {
        let enclave = SimulatedEnclave::new(b"attestation-test").unwrap();
        let ctx = ContextHandle::new("main");

        let mut bytes = [0u8; 64];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let data = ReportData(bytes);

        let report = enclave.get_report(&ctx, &data).unwrap();
        assert_eq!(get_report_data(&enclave, &report).unwrap(), data);

        let quote = get_quote(&enclave, &report).unwrap();
        assert_eq!(get_quote_data(&enclave, &quote).unwrap(), data);
    }

    #[test]
    fn test_validation_never_fails() {
        let enclave = SimulatedEnclave::new(b"attestation-test").unwrap();
        let ctx = ContextHandle::new("main");
        let quote = enclave
            .get_quote(&enclave.get_report(&ctx, &ReportData([7; 64])).unwrap())
            .unwrap();
        let statement = get_remote_attestation(&enclave, &quote).unwrap();

        assert!(validate_remote_attestation(&enclave, &quote, &statement));

        let garbage = AttestationStatement::from(vec![0u8; 3]);
        assert!(!validate_remote_attestation(&enclave, &quote, &garbage));
        assert!(!validate_remote_attestation(&Unconfigured, &quote, &statement));
    }

    #[test]
    fn test_unconfigured_backend_reports_not_implemented() {
        let report = Report::from(vec![0u8; 132]);

        assert_eq!(
            get_quote(&Unconfigured, &report),
            Err(PrimitiveError::NotImplemented("getQuote"))
        );
    }
}
