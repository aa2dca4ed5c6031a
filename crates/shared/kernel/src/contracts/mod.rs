//! Cross-feature contracts ("fassets").
//!
//! Features import capabilities with [`FassetImport`] and export them with
//! `define`, `define_use` or `contribute` ([`FassetExport`]). The
//! [`ContractRegistry`] collects both sides from every active feature and
//! resolves them once into an immutable [`Fassets`](weave_domain::fassets::Fassets) map.

mod registry;
mod validator;

pub use registry::ContractRegistry;
pub use validator::Validator;

use weave_domain::fassets::FassetValue;
use weave_domain::pattern;

/// A capability a feature consumes.
#[derive(Debug, Clone)]
pub struct FassetImport {
    key: String,
    required: bool,
    validator: Option<Validator>,
}

impl FassetImport {
    /// An import that must resolve before startup. `key` may be a wildcard pattern.
    pub fn required(key: impl Into<String>) -> Self {
        Self { key: key.into(), required: true, validator: None }
    }

    pub fn optional(key: impl Into<String>) -> Self {
        Self { key: key.into(), required: false, validator: None }
    }

    /// Checks every resolved value against `validator`.
    #[must_use]
    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        pattern::is_wildcard(&self.key)
    }

    #[must_use]
    pub const fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Returns `true` if this import would pick up an export under `key`.
    #[must_use]
    pub fn covers(&self, key: &str) -> bool {
        pattern::matches(&self.key, key)
    }
}

/// How a key is exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Single value, unique across active features.
    Define,
    /// Single value that must be consumed by another feature's import.
    DefineUse,
    /// One entry of an accumulating key, ordered by `order` then feature name.
    Contribute { order: i32 },
}

/// A capability a feature provides.
#[derive(Debug, Clone)]
pub struct FassetExport {
    pub key: String,
    pub kind: ExportKind,
    pub value: FassetValue,
}

impl FassetExport {
    pub fn define(key: impl Into<String>, value: FassetValue) -> Self {
        Self { key: key.into(), kind: ExportKind::Define, value }
    }

    pub fn define_use(key: impl Into<String>, value: FassetValue) -> Self {
        Self { key: key.into(), kind: ExportKind::DefineUse, value }
    }

    pub fn contribute(key: impl Into<String>, order: i32, value: FassetValue) -> Self {
        Self { key: key.into(), kind: ExportKind::Contribute { order }, value }
    }
}
