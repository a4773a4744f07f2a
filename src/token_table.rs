//! Per modem token tables.
//!
//! A [`TokenTable`] is supplied by the modem adapter when the engine is
//! constructed and is never modified afterwards.

use crate::asynch::urc_handler::UrcContext;
use crate::error::{AtError, Error};

/// Parser for a single URC. Receives the text after the `:` of prefixed
/// URCs, or the whole trimmed line otherwise.
pub type UrcParseFn = fn(&UrcContext<'_, '_>, &str) -> Result<(), AtError>;

#[derive(Clone, Copy)]
pub struct UrcHandlerEntry {
    /// URC token: the text between `+` and `:` for prefixed URCs, or the
    /// whole line otherwise.
    pub token: &'static str,
    pub parser: Option<UrcParseFn>,
}

impl UrcHandlerEntry {
    pub const fn new(token: &'static str, parser: UrcParseFn) -> Self {
        Self {
            token,
            parser: Some(parser),
        }
    }
}

#[derive(Clone, Copy)]
pub struct TokenTable {
    /// Sorted in strictly ascending order of `token`.
    pub urc_handlers: &'static [UrcHandlerEntry],
    pub error_tokens: &'static [&'static str],
    pub success_tokens: &'static [&'static str],
    /// Checked before `success_tokens` for every response.
    pub extra_success_tokens: &'static [&'static str],
    /// Lines that are URCs in their entirety, e.g. `RDY`.
    pub urc_tokens_without_prefix: &'static [&'static str],
}

impl TokenTable {
    /// Check the invariants the engine relies on.
    ///
    /// Rejects empty tables of success or error tokens, empty tokens, an
    /// unsorted or duplicated URC handler table, and any success token that
    /// is a prefix of an error token or the other way round, as such a line
    /// could not be classified.
    pub fn validate(&self) -> Result<(), Error> {
        if self.success_tokens.is_empty() || self.error_tokens.is_empty() {
            error!("Token table lacks success or error tokens");
            return Err(Error::BadParameter);
        }

        let all_tokens = self
            .error_tokens
            .iter()
            .chain(self.success_tokens)
            .chain(self.extra_success_tokens)
            .chain(self.urc_tokens_without_prefix)
            .chain(self.urc_handlers.iter().map(|e| &e.token));
        for token in all_tokens {
            if token.is_empty() {
                error!("Token table contains an empty token");
                return Err(Error::BadParameter);
            }
        }

        for pair in self.urc_handlers.windows(2) {
            if pair[0].token >= pair[1].token {
                error!("URC handler table not sorted at {}", pair[1].token);
                return Err(Error::BadParameter);
            }
        }

        self.check_success_tokens(self.success_tokens)?;
        self.check_success_tokens(self.extra_success_tokens)
    }

    /// Check success tokens valid for a single request against the error
    /// tokens of the table.
    pub fn check_success_tokens(&self, tokens: &[&str]) -> Result<(), Error> {
        for success in tokens {
            if success.is_empty() {
                error!("Empty success token");
                return Err(Error::BadParameter);
            }
            for err in self.error_tokens {
                if success.starts_with(err) || err.starts_with(success) {
                    error!("Success token {} overlaps error token {}", success, err);
                    return Err(Error::BadParameter);
                }
            }
        }
        Ok(())
    }

    /// Binary search for the handler of `token`.
    pub fn find_urc_handler(&self, token: &str) -> Option<&UrcHandlerEntry> {
        self.urc_handlers
            .binary_search_by(|entry| entry.token.cmp(token))
            .ok()
            .map(|i| &self.urc_handlers[i])
    }

    pub fn is_urc_without_prefix(&self, line: &str) -> bool {
        self.urc_tokens_without_prefix.iter().any(|t| *t == line)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn noop(_: &UrcContext<'_, '_>, _: &str) -> Result<(), AtError> {
        Ok(())
    }

    const HANDLERS: &[UrcHandlerEntry] = &[
        UrcHandlerEntry::new("CEREG", noop),
        UrcHandlerEntry::new("CGREG", noop),
        UrcHandlerEntry::new("CREG", noop),
        UrcHandlerEntry::new("RDY", noop),
    ];

    const TABLE: TokenTable = TokenTable {
        urc_handlers: HANDLERS,
        error_tokens: &["ERROR", "+CME ERROR"],
        success_tokens: &["OK"],
        extra_success_tokens: &[],
        urc_tokens_without_prefix: &["RDY"],
    };

    #[test]
    fn valid_table() {
        assert_eq!(TABLE.validate(), Ok(()));
    }

    #[test]
    fn rejects_overlapping_success_and_error() {
        let table = TokenTable {
            success_tokens: &["OK", "ERROR: none"],
            ..TABLE
        };
        assert_eq!(table.validate(), Err(Error::BadParameter));

        let table = TokenTable {
            extra_success_tokens: &["+CME"],
            ..TABLE
        };
        assert_eq!(table.validate(), Err(Error::BadParameter));
    }

    #[test]
    fn request_success_tokens() {
        assert_eq!(TABLE.check_success_tokens(&[">", "SEND OK"]), Ok(()));
        assert_eq!(TABLE.check_success_tokens(&["ERRORS"]), Err(Error::BadParameter));
        assert_eq!(TABLE.check_success_tokens(&["+CME"]), Err(Error::BadParameter));
        assert_eq!(TABLE.check_success_tokens(&[""]), Err(Error::BadParameter));
    }

    #[test]
    fn rejects_unsorted_handlers() {
        const UNSORTED: &[UrcHandlerEntry] = &[
            UrcHandlerEntry::new("CREG", noop),
            UrcHandlerEntry::new("CEREG", noop),
        ];
        let table = TokenTable {
            urc_handlers: UNSORTED,
            ..TABLE
        };
        assert_eq!(table.validate(), Err(Error::BadParameter));

        const DUPLICATE: &[UrcHandlerEntry] = &[
            UrcHandlerEntry::new("CREG", noop),
            UrcHandlerEntry::new("CREG", noop),
        ];
        let table = TokenTable {
            urc_handlers: DUPLICATE,
            ..TABLE
        };
        assert_eq!(table.validate(), Err(Error::BadParameter));
    }

    #[test]
    fn rejects_empty_tokens() {
        let table = TokenTable {
            success_tokens: &[],
            ..TABLE
        };
        assert_eq!(table.validate(), Err(Error::BadParameter));

        let table = TokenTable {
            urc_tokens_without_prefix: &[""],
            ..TABLE
        };
        assert_eq!(table.validate(), Err(Error::BadParameter));
    }

    #[test]
    fn handler_lookup() {
        assert_eq!(TABLE.find_urc_handler("CGREG").map(|e| e.token), Some("CGREG"));
        assert!(TABLE.find_urc_handler("CSQ").is_none());
        assert!(TABLE.is_urc_without_prefix("RDY"));
        assert!(!TABLE.is_urc_without_prefix("RDY2"));
    }
}
