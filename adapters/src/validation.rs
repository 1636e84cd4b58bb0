//! Pre-flight validation of request parameters

use crate::config::{CharacterPolicy, ValidationConfig};
use crate::error::Violation;
use crate::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Minimum symbol length
pub const MIN_SYMBOL_LEN: usize = 1;

/// Maximum symbol length
pub const MAX_SYMBOL_LEN: usize = 10;

lazy_static::lazy_static! {
    static ref DISALLOWED: Regex = Regex::new(r"[^A-Z0-9]").unwrap();
}

/// Shape of a recognized parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Symbol,
    SymbolList,
}

/// Validator for known symbol parameters
///
/// Unknown parameters pass through untouched. Recognized ones are uppercased,
/// checked against the `[A-Z0-9]` allow-list and the 1..=10 length bound, and
/// written back in normalized form.
#[derive(Debug, Clone)]
pub struct InputValidator {
    policy: CharacterPolicy,
    symbol_params: Vec<String>,
    symbol_list_params: Vec<String>,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl InputValidator {
    /// Create from config
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            policy: config.character_policy,
            symbol_params: config.symbol_params.clone(),
            symbol_list_params: config.symbol_list_params.clone(),
        }
    }

    /// Validate and normalize `params` in place
    ///
    /// Either every recognized parameter is rewritten or, on error, none is.
    pub fn validate(&self, params: &mut BTreeMap<String, String>) -> Result<()> {
        let mut normalized = Vec::new();

        for (name, value) in params.iter() {
            let Some(kind) = self.kind_of(name) else {
                continue;
            };
            let value = self
                .normalize(value, kind)
                .map_err(|violation| Error::Validation {
                    param: name.clone(),
                    violation,
                })?;
            normalized.push((name.clone(), value));
        }

        for (name, value) in normalized {
            params.insert(name, value);
        }
        Ok(())
    }

    fn kind_of(&self, name: &str) -> Option<ParamKind> {
        if self.symbol_params.iter().any(|p| p == name) {
            Some(ParamKind::Symbol)
        } else if self.symbol_list_params.iter().any(|p| p == name) {
            Some(ParamKind::SymbolList)
        } else {
            None
        }
    }

    fn normalize(&self, value: &str, kind: ParamKind) -> std::result::Result<String, Violation> {
        match kind {
            ParamKind::Symbol => {
                if value.contains(',') {
                    return Err(Violation::UnexpectedList);
                }
                self.normalize_token(0, value)
            }
            ParamKind::SymbolList => {
                let tokens = value
                    .split(',')
                    .enumerate()
                    .map(|(index, token)| self.normalize_token(index, token))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tokens.join(","))
            }
        }
    }

    fn normalize_token(&self, index: usize, raw: &str) -> std::result::Result<String, Violation> {
        // ASCII-only case mapping; Unicode mapping would turn `ß` into `SS`
        let upper = raw.trim().to_ascii_uppercase();

        let token = match self.policy {
            CharacterPolicy::Reject => {
                if let Some(bad) = DISALLOWED.find(&upper) {
                    let ch = bad.as_str().chars().next().unwrap_or_default();
                    return Err(Violation::DisallowedCharacter { index, ch });
                }
                upper
            }
            CharacterPolicy::Strip => DISALLOWED.replace_all(&upper, "").into_owned(),
        };

        let len = token.chars().count();
        if len < MIN_SYMBOL_LEN {
            return Err(Violation::Empty {
                index,
                min: MIN_SYMBOL_LEN,
            });
        }
        if len > MAX_SYMBOL_LEN {
            return Err(Violation::TooLong {
                index,
                len,
                max: MAX_SYMBOL_LEN,
            });
        }
        Ok(token)
    }
}
