//! Script import bookkeeping.
//!
//! Every worker keeps an [`ImportLedger`] of the content keys it has already
//! evaluated and the ones currently being evaluated. A key is in at most one
//! of those sets. A key that is being imported is treated as satisfied, which
//! breaks import cycles (including a script importing itself).

use std::cell::RefCell;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The script was resolved and evaluated by this call.
    Imported,
    /// The key was already imported; nothing ran.
    AlreadyImported,
    /// The key is currently being imported further up the stack; nothing ran.
    InFlight,
}

#[derive(Debug, Default)]
pub struct ImportLedger {
    imported: HashSet<String>,
    importing: HashSet<String>,
}

impl ImportLedger {
    /// Create a ledger seeded with the worker's own content key.
    pub fn new(own_key: &str) -> Self {
        let mut imported = HashSet::new();
        imported.insert(own_key.to_string());

        Self {
            imported,
            importing: HashSet::new(),
        }
    }

    pub fn is_imported(&self, key: &str) -> bool {
        self.imported.contains(key)
    }

    pub fn is_importing(&self, key: &str) -> bool {
        self.importing.contains(key)
    }

    /// Claim `key` for import. Returns `None` if the caller should load it.
    fn begin(&mut self, key: &str) -> Option<ImportOutcome> {
        if self.imported.contains(key) {
            return Some(ImportOutcome::AlreadyImported);
        }

        if self.importing.contains(key) {
            return Some(ImportOutcome::InFlight);
        }

        self.importing.insert(key.to_string());
        None
    }

    fn finish(&mut self, key: &str, success: bool) {
        self.importing.remove(key);

        if success {
            self.imported.insert(key.to_string());
        }
    }
}

/// Import one content key into a worker.
///
/// `resolve` turns the key into source text and `evaluate` runs it in the
/// target context. The ledger is not borrowed while either runs, so the
/// evaluated script may itself import more keys. On failure the key is
/// released so a later call can retry it.
pub fn import_script<E>(
    ledger: &RefCell<ImportLedger>,
    key: &str,
    resolve: impl FnOnce(&str) -> Result<String, E>,
    evaluate: impl FnOnce(&str, &str) -> Result<(), E>,
) -> Result<ImportOutcome, E> {
    if let Some(outcome) = ledger.borrow_mut().begin(key) {
        log::trace!("import of '{}' skipped: {:?}", key, outcome);
        return Ok(outcome);
    }

    let result = resolve(key).and_then(|source| evaluate(key, &source));
    ledger.borrow_mut().finish(key, result.is_ok());

    result.map(|()| ImportOutcome::Imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn ok_resolve(key: &str) -> Result<String, String> {
        Ok(format!("// {}", key))
    }

    #[test]
    fn test_own_key_is_preimported() {
        let ledger = RefCell::new(ImportLedger::new("main"));
        let evaluated = Cell::new(0);

        let outcome = import_script(&ledger, "main", ok_resolve, |_, _| {
            evaluated.set(evaluated.get() + 1);
            Ok(())
        });

        assert_eq!(outcome, Ok(ImportOutcome::AlreadyImported));
        assert_eq!(evaluated.get(), 0);
    }

    #[test]
    fn test_second_import_is_noop() {
        let ledger = RefCell::new(ImportLedger::new("main"));
        let evaluated = Cell::new(0);
        let eval = |_: &str, _: &str| -> Result<(), String> {
            evaluated.set(evaluated.get() + 1);
            Ok(())
        };

        assert_eq!(
            import_script(&ledger, "lib", ok_resolve, eval),
            Ok(ImportOutcome::Imported)
        );
        assert_eq!(
            import_script(&ledger, "lib", ok_resolve, eval),
            Ok(ImportOutcome::AlreadyImported)
        );
        assert_eq!(evaluated.get(), 1);
        assert!(ledger.borrow().is_imported("lib"));
        assert!(!ledger.borrow().is_importing("lib"));
    }

    #[test]
    fn test_reentrant_import_is_in_flight() {
        let ledger = RefCell::new(ImportLedger::new("main"));

        let outcome = import_script(&ledger, "a", ok_resolve, |_, _| {
            // "a" imports "a" again while it is still loading
            let inner = import_script(&ledger, "a", ok_resolve, |_, _| {
                panic!("cyclic import must not evaluate");
            });
            assert_eq!(inner, Ok(ImportOutcome::InFlight));
            Ok::<(), String>(())
        });

        assert_eq!(outcome, Ok(ImportOutcome::Imported));
        assert!(ledger.borrow().is_imported("a"));
    }

    #[test]
    fn test_failed_evaluation_allows_retry() {
        let ledger = RefCell::new(ImportLedger::new("main"));

        let failed = import_script(&ledger, "flaky", ok_resolve, |_, _| {
            Err("boom".to_string())
        });
        assert_eq!(failed, Err("boom".to_string()));
        assert!(!ledger.borrow().is_imported("flaky"));
        assert!(!ledger.borrow().is_importing("flaky"));

        let retried = import_script(&ledger, "flaky", ok_resolve, |_, _| Ok(()));
        assert_eq!(retried, Ok(ImportOutcome::Imported));
    }

    #[test]
    fn test_failed_resolution_skips_evaluation() {
        let ledger = RefCell::new(ImportLedger::new("main"));

        let result = import_script(
            &ledger,
            "missing",
            |key| Err(format!("no such key {}", key)),
            |_, _| panic!("must not evaluate"),
        );

        assert_eq!(result, Err("no such key missing".to_string()));
        assert!(!ledger.borrow().is_importing("missing"));
    }
}
