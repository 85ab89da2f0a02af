//! Software-simulated enclave backend.
//!
//! Not a security boundary: keys live in process memory. It implements the
//! full [`TrustedPrimitives`] contract so hosts can develop and test against
//! the engine without enclave hardware.
//!
//! Layouts (all fixed size):
//! - report: `"SWR1" || measurement(32) || report_data(64) || hmac(32)`
//! - quote: `"SWQ1" || measurement(32) || report_data(64) || hmac(32)`
//! - attestation: `"SWA1" || sha256(quote)(32) || hmac(32)`

use bytes::{BufMut, Bytes, BytesMut};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, hmac};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    AttestationStatement, ContextHandle, CounterId, MonotonicCounter, Quote, REPORT_DATA_SIZE,
    Report, ReportData, TrustedPrimitives, TrustedTime,
};
use crate::error::PrimitiveError;

const REPORT_MAGIC: &[u8; 4] = b"SWR1";
const QUOTE_MAGIC: &[u8; 4] = b"SWQ1";
const ATTESTATION_MAGIC: &[u8; 4] = b"SWA1";

const MEASUREMENT_SIZE: usize = 32;
const MAC_SIZE: usize = 32;
const SIGNED_SIZE: usize = 4 + MEASUREMENT_SIZE + REPORT_DATA_SIZE;
const REPORT_SIZE: usize = SIGNED_SIZE + MAC_SIZE;
const ATTESTATION_SIZE: usize = 4 + 32 + MAC_SIZE;

const DEFAULT_COUNTER_LIMIT: usize = 256;

pub struct SimulatedEnclave {
    measurement: [u8; MEASUREMENT_SIZE],
    report_key: hmac::Key,
    quote_key: hmac::Key,
    attestation_key: hmac::Key,
    time_source_nonce: Bytes,
    counter_limit: usize,
    counters: Mutex<HashMap<u64, HashMap<CounterId, u64>>>,
}

impl SimulatedEnclave {
    /// Create an enclave whose measurement is the SHA-256 of `identity`.
    pub fn new(identity: &[u8]) -> Result<Self, PrimitiveError> {
        let rng = SystemRandom::new();
        let key = |purpose: &str| {
            hmac::Key::generate(hmac::HMAC_SHA256, &rng)
                .map_err(|_| PrimitiveError::Unavailable(format!("cannot generate {} key", purpose)))
        };
        let report_key = key("report")?;
        let quote_key = key("quote")?;
        let attestation_key = key("attestation")?;

        let mut measurement = [0u8; MEASUREMENT_SIZE];
        measurement.copy_from_slice(digest::digest(&digest::SHA256, identity).as_ref());

        let mut nonce = [0u8; 32];
        rng.fill(&mut nonce)
            .map_err(|_| PrimitiveError::Unavailable("random source failed".to_string()))?;

        Ok(Self {
            measurement,
            report_key,
            quote_key,
            attestation_key,
            time_source_nonce: Bytes::copy_from_slice(&nonce),
            counter_limit: DEFAULT_COUNTER_LIMIT,
            counters: Mutex::new(HashMap::new()),
        })
    }

    /// Maximum number of live counters per context.
    pub fn with_counter_limit(mut self, limit: usize) -> Self {
        self.counter_limit = limit;
        self
    }

    pub fn measurement(&self) -> &[u8; MEASUREMENT_SIZE] {
        &self.measurement
    }

    fn sign(
        &self,
        key: &hmac::Key,
        magic: &[u8; 4],
        measurement: &[u8],
        report_data: &[u8],
    ) -> Bytes {
        let mut buf = BytesMut::with_capacity(REPORT_SIZE);
        buf.put_slice(magic);
        buf.put_slice(measurement);
        buf.put_slice(report_data);

        let tag = hmac::sign(key, &buf);
        buf.put_slice(tag.as_ref());
        buf.freeze()
    }

    /// Split a report or quote into (measurement, report_data, signed prefix, tag).
    fn parse<'a>(
        bytes: &'a [u8],
        magic: &[u8; 4],
        what: &str,
    ) -> Result<(&'a [u8], &'a [u8], &'a [u8], &'a [u8]), PrimitiveError> {
        if bytes.len() != REPORT_SIZE || &bytes[..4] != magic {
            return Err(PrimitiveError::MalformedInput(format!(
                "{} must be {} bytes starting with {:?}",
                what,
                REPORT_SIZE,
                String::from_utf8_lossy(magic)
            )));
        }

        let (signed, tag) = bytes.split_at(SIGNED_SIZE);
        let measurement = &signed[4..4 + MEASUREMENT_SIZE];
        let report_data = &signed[4 + MEASUREMENT_SIZE..];
        Ok((measurement, report_data, signed, tag))
    }

    fn with_counter<T>(
        &self,
        context: &ContextHandle,
        id: &CounterId,
        f: impl FnOnce(&mut u64) -> Result<T, PrimitiveError>,
    ) -> Result<T, PrimitiveError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| PrimitiveError::Unavailable("counter store poisoned".to_string()))?;

        let value = counters
            .get_mut(&context.id)
            .and_then(|owned| owned.get_mut(id))
            .ok_or(PrimitiveError::UnknownCounter)?;

        f(value)
    }
}

impl TrustedPrimitives for SimulatedEnclave {
    fn create_monotonic_counter(
        &self,
        context: &ContextHandle,
    ) -> Result<MonotonicCounter, PrimitiveError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| PrimitiveError::Unavailable("counter store poisoned".to_string()))?;

        let owned = counters.entry(context.id).or_default();
        if owned.len() >= self.counter_limit {
            return Err(PrimitiveError::Exhausted(format!(
                "context '{}' already holds {} counters",
                context.name, self.counter_limit
            )));
        }

        let id = CounterId::from(&uuid::Uuid::new_v4().as_bytes()[..]);
        owned.insert(id.clone(), 0);

        log::debug!("created monotonic counter for context '{}'", context.name);
        Ok(MonotonicCounter { id, value: 0 })
    }

    fn destroy_monotonic_counter(
        &self,
        context: &ContextHandle,
        id: &CounterId,
    ) -> Result<(), PrimitiveError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| PrimitiveError::Unavailable("counter store poisoned".to_string()))?;

        counters
            .get_mut(&context.id)
            .and_then(|owned| owned.remove(id))
            .map(|_| ())
            .ok_or(PrimitiveError::UnknownCounter)
    }

    fn read_monotonic_counter(
        &self,
        context: &ContextHandle,
        id: &CounterId,
    ) -> Result<u64, PrimitiveError> {
        self.with_counter(context, id, |value| Ok(*value))
    }

    fn increment_monotonic_counter(
        &self,
        context: &ContextHandle,
        id: &CounterId,
    ) -> Result<u64, PrimitiveError> {
        self.with_counter(context, id, |value| {
            *value = value
                .checked_add(1)
                .ok_or_else(|| PrimitiveError::Exhausted("counter overflow".to_string()))?;
            Ok(*value)
        })
    }

    fn release_context(&self, context: &ContextHandle) {
        match self.counters.lock() {
            Ok(mut counters) => {
                if let Some(owned) = counters.remove(&context.id) {
                    log::debug!(
                        "released {} monotonic counters of context '{}'",
                        owned.len(),
                        context.name
                    );
                }
            }
            Err(_) => log::error!("counter store poisoned, context '{}' not released", context.name),
        }
    }

    fn get_trusted_time(&self, _context: &ContextHandle) -> Result<TrustedTime, PrimitiveError> {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| PrimitiveError::Unavailable(format!("clock before epoch: {}", e)))?
            .as_secs();

        Ok(TrustedTime {
            current_time: Bytes::copy_from_slice(&seconds.to_be_bytes()),
            time_source_nonce: self.time_source_nonce.clone(),
        })
    }

    fn get_report(
        &self,
        _context: &ContextHandle,
        report_data: &ReportData,
    ) -> Result<Report, PrimitiveError> {
        Ok(Report(self.sign(
            &self.report_key,
            REPORT_MAGIC,
            &self.measurement,
            report_data.as_bytes(),
        )))
    }

    fn get_report_data(&self, report: &Report) -> Result<ReportData, PrimitiveError> {
        let (_, report_data, _, _) = Self::parse(report.as_bytes(), REPORT_MAGIC, "report")?;
        ReportData::try_from(report_data)
    }

    fn get_quote(&self, report: &Report) -> Result<Quote, PrimitiveError> {
        let (measurement, report_data, signed, tag) =
            Self::parse(report.as_bytes(), REPORT_MAGIC, "report")?;

        hmac::verify(&self.report_key, signed, tag).map_err(|_| {
            PrimitiveError::Rejected("report was not produced on this machine".to_string())
        })?;

        Ok(Quote(self.sign(
            &self.quote_key,
            QUOTE_MAGIC,
            measurement,
            report_data,
        )))
    }

    fn get_quote_data(&self, quote: &Quote) -> Result<ReportData, PrimitiveError> {
        let (_, report_data, _, _) = Self::parse(quote.as_bytes(), QUOTE_MAGIC, "quote")?;
        ReportData::try_from(report_data)
    }

    fn get_remote_attestation(&self, quote: &Quote) -> Result<AttestationStatement, PrimitiveError> {
        let (_, _, signed, tag) = Self::parse(quote.as_bytes(), QUOTE_MAGIC, "quote")?;

        hmac::verify(&self.quote_key, signed, tag)
            .map_err(|_| PrimitiveError::Rejected("quote signature does not verify".to_string()))?;

        let mut buf = BytesMut::with_capacity(ATTESTATION_SIZE);
        buf.put_slice(ATTESTATION_MAGIC);
        buf.put_slice(digest::digest(&digest::SHA256, quote.as_bytes()).as_ref());
        let tag = hmac::sign(&self.attestation_key, &buf);
        buf.put_slice(tag.as_ref());

        Ok(AttestationStatement(buf.freeze()))
    }

    fn validate_remote_attestation(
        &self,
        quote: &Quote,
        attestation: &AttestationStatement,
    ) -> Result<bool, PrimitiveError> {
        let statement = attestation.as_bytes();
        if statement.len() != ATTESTATION_SIZE || &statement[..4] != ATTESTATION_MAGIC {
            return Err(PrimitiveError::MalformedInput(
                "attestation statement has the wrong layout".to_string(),
            ));
        }

        let (signed, tag) = statement.split_at(ATTESTATION_SIZE - MAC_SIZE);
        if hmac::verify(&self.attestation_key, signed, tag).is_err() {
            return Ok(false);
        }

        let quote_digest = digest::digest(&digest::SHA256, quote.as_bytes());
        Ok(&signed[4..] == quote_digest.as_ref())
    }
}

impl std::fmt::Debug for SimulatedEnclave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedEnclave")
            .field("counter_limit", &self.counter_limit)
            .finish_non_exhaustive()
    }
}
