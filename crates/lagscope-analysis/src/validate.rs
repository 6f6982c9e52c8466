//! Artifact validation across all registered format handlers.

use std::path::Path;

use tracing::{debug, warn};

use lagscope_core::model::{ArtifactDescriptor, ValidationResult};

use crate::formats::{FormatHandler, FormatRegistry};

/// Runs descriptors through the format registry in fixed handler order and
/// reports the first acceptance, or every handler's refusal.
pub struct ArtifactValidator {
    registry: FormatRegistry,
}

impl ArtifactValidator {
    pub fn new() -> Self {
        Self {
            registry: FormatRegistry::new(),
        }
    }

    pub fn with_registry(registry: FormatRegistry) -> Self {
        Self { registry }
    }

    pub fn validate_many(&self, descriptors: &[ArtifactDescriptor]) -> Vec<ValidationResult> {
        descriptors
            .iter()
            .map(|descriptor| self.validate_single(descriptor))
            .collect()
    }

    pub fn validate_single(&self, descriptor: &ArtifactDescriptor) -> ValidationResult {
        if descriptor.path.is_empty() {
            return ValidationResult::failure(
                &descriptor.path,
                vec!["path is required".to_string()],
            );
        }

        if !Path::new(&descriptor.path).is_file() {
            return ValidationResult::failure(
                &descriptor.path,
                vec!["artifact file not found".to_string()],
            );
        }

        let mut errors = Vec::new();
        for handler in self.registry.handlers() {
            let result = handler.validate(descriptor);
            if result.ok {
                debug!(
                    path = %descriptor.path,
                    format = handler.format_type(),
                    version = result.detected_version.as_deref().unwrap_or(""),
                    "artifact accepted"
                );
                return result;
            }

            if !result.errors.is_empty() {
                errors.push(format!(
                    "{}: {}",
                    handler.format_type(),
                    result.errors.join("; ")
                ));
            }
        }

        if errors.is_empty() {
            errors.push("unsupported artifact format".to_string());
        }

        warn!(path = %descriptor.path, "no handler accepted artifact");
        ValidationResult::failure(&descriptor.path, errors)
    }

    /// Finds the parser for an accepted validation result.
    pub fn resolve_parser(&self, validation: &ValidationResult) -> Option<&dyn FormatHandler> {
        let detected = validation.detected_type.as_deref()?;
        self.registry.resolve(detected)
    }
}

impl Default for ArtifactValidator {
    fn default() -> Self {
        Self::new()
    }
}
