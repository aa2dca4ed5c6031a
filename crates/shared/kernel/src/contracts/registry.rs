use super::{ExportKind, FassetExport, FassetImport};
use crate::error::ComposeError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};
use weave_domain::fassets::{FassetValue, Fassets};
use weave_domain::pattern;

#[derive(Debug)]
struct SingleExport {
    owner: String,
    value: FassetValue,
    define_use: bool,
}

#[derive(Debug)]
struct Contributed {
    owner: String,
    order: i32,
    value: FassetValue,
}

/// Two-phase contract registry: register every feature, then resolve once.
///
/// Imports are checked in feature-name order, so the first reported error and
/// the resolved map do not depend on registration order.
#[derive(Debug, Default)]
pub struct ContractRegistry {
    singles: BTreeMap<String, SingleExport>,
    accumulating: BTreeMap<String, Vec<Contributed>>,
    imports: BTreeMap<String, Vec<FassetImport>>,
    features: BTreeSet<String>,
}

impl ContractRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature's exports to the pending table.
    ///
    /// # Errors
    /// * [`ComposeError::InvalidFeature`] for a malformed key, or a key the
    ///   feature itself already exports as a single value.
    /// * [`ComposeError::DuplicateExport`] if another feature already exports
    ///   a single-value key, or a key is used both as single-value and
    ///   accumulating. The two owners are named in sorted order.
    pub fn register_exports(
        &mut self,
        feature: &str,
        exports: &[FassetExport],
    ) -> Result<(), ComposeError> {
        self.features.insert(feature.to_owned());

        for export in exports {
            if let Some(problem) = pattern::check_key(&export.key, false) {
                return Err(ComposeError::InvalidFeature {
                    feature: feature.to_owned().into(),
                    message: problem.into(),
                    context: Some("export".into()),
                });
            }
            if let Some(owner) = self.owner_of(export) {
                if owner == feature {
                    return Err(ComposeError::InvalidFeature {
                        feature: feature.to_owned().into(),
                        message: format!("exports '{}' more than once", export.key).into(),
                        context: Some("export".into()),
                    });
                }
                return Err(duplicate_export(&export.key, owner, feature));
            }

            trace!(feature, key = %export.key, kind = ?export.kind, "Registering export");
            match export.kind {
                ExportKind::Define | ExportKind::DefineUse => {
                    self.singles.insert(
                        export.key.clone(),
                        SingleExport {
                            owner: feature.to_owned(),
                            value: export.value.clone(),
                            define_use: export.kind == ExportKind::DefineUse,
                        },
                    );
                },
                ExportKind::Contribute { order } => {
                    self.accumulating.entry(export.key.clone()).or_default().push(Contributed {
                        owner: feature.to_owned(),
                        order,
                        value: export.value.clone(),
                    });
                },
            }
        }
        Ok(())
    }

    /// Feature already holding `export.key` in a way that clashes with `export`.
    fn owner_of(&self, export: &FassetExport) -> Option<&str> {
        self.singles.get(&export.key).map(|single| single.owner.as_str()).or_else(|| {
            self.accumulating
                .get(&export.key)
                .filter(|_| !matches!(export.kind, ExportKind::Contribute { .. }))
                .and_then(|items| items.first())
                .map(|item| item.owner.as_str())
        })
    }

    /// Records a feature's imports for [`ContractRegistry::resolve`].
    ///
    /// # Errors
    /// Returns [`ComposeError::InvalidFeature`] for a malformed key or pattern.
    pub fn register_imports(
        &mut self,
        feature: &str,
        imports: &[FassetImport],
    ) -> Result<(), ComposeError> {
        self.features.insert(feature.to_owned());

        for import in imports {
            if let Some(problem) = pattern::check_key(import.key(), true) {
                return Err(ComposeError::InvalidFeature {
                    feature: feature.to_owned().into(),
                    message: problem.into(),
                    context: Some("import".into()),
                });
            }
        }
        self.imports.entry(feature.to_owned()).or_default().extend(imports.iter().cloned());
        Ok(())
    }

    /// Resolves every recorded import against the export table.
    ///
    /// # Errors
    /// * [`ComposeError::UnresolvedRequiredContract`] when a required import
    ///   (or required wildcard) matches nothing.
    /// * [`ComposeError::ContractValidation`] when a resolved value fails the
    ///   import's validator, or a `define_use` export is not imported by any
    ///   other feature.
    pub fn resolve(&self) -> Result<Fassets, ComposeError> {
        let mut builder = Fassets::builder();
        for (key, single) in &self.singles {
            builder.single(key.clone(), single.owner.clone(), single.value.clone());
        }
        for (key, items) in &self.accumulating {
            for item in items {
                builder.contribute(key.clone(), item.owner.clone(), item.order, item.value.clone());
            }
        }
        for feature in &self.features {
            builder.feature(feature.clone());
        }
        let fassets = builder.build();

        for (feature, imports) in &self.imports {
            for import in imports {
                self.check_import(&fassets, feature, import)?;
            }
        }
        self.check_define_use()?;

        debug!(keys = fassets.len(), features = self.features.len(), "Contracts resolved");
        Ok(fassets)
    }

    fn check_import(
        &self,
        fassets: &Fassets,
        feature: &str,
        import: &FassetImport,
    ) -> Result<(), ComposeError> {
        let matched: Vec<&str> = if import.is_wildcard() {
            fassets.keys().filter(|key| import.covers(key)).collect()
        } else {
            fassets.keys().filter(|key| *key == import.key()).collect()
        };

        if matched.is_empty() {
            if import.is_required() {
                return Err(ComposeError::UnresolvedRequiredContract {
                    feature: feature.to_owned().into(),
                    key: import.key().to_owned().into(),
                    context: None,
                });
            }
            trace!(feature, key = import.key(), "Optional import left unresolved");
            return Ok(());
        }

        let Some(validator) = import.validator() else { return Ok(()) };
        for key in matched {
            for value in fassets.get_all(key) {
                if let Some(message) = validator.check(&value) {
                    return Err(ComposeError::ContractValidation {
                        feature: feature.to_owned().into(),
                        key: key.to_owned().into(),
                        message: message.into(),
                        context: Some(validator.name().to_owned().into()),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_define_use(&self) -> Result<(), ComposeError> {
        for (key, single) in self.singles.iter().filter(|(_, single)| single.define_use) {
            let used = self.imports.iter().any(|(feature, imports)| {
                feature != &single.owner && imports.iter().any(|import| import.covers(key))
            });
            if !used {
                return Err(ComposeError::ContractValidation {
                    feature: single.owner.clone().into(),
                    key: key.clone().into(),
                    message: "define_use export is not imported by any other feature".into(),
                    context: None,
                });
            }
        }
        Ok(())
    }
}

fn duplicate_export(key: &str, a: &str, b: &str) -> ComposeError {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    ComposeError::DuplicateExport {
        key: key.to_owned().into(),
        first: first.to_owned().into(),
        second: second.to_owned().into(),
        context: None,
    }
}
