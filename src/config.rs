//! Purpose: Runtime settings for a worker process.
//! Exports: `WorkerConfig`.
//! Role: Built from CLI flags in `main`; validated before the request loop starts.
//! Invariants: A validated config has a positive repr limit and a bare unit extension.
use crate::core::error::{Error, ErrorKind};
use crate::dispatch::TypePolicy;
use crate::runtime::classify::DEFAULT_REPR_LIMIT;
use crate::runtime::loader::DEFAULT_UNIT_EXTENSION;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    pub strict_types: bool,
    pub file_units: bool,
    pub unit_extension: String,
    pub repr_limit: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            strict_types: false,
            file_units: true,
            unit_extension: DEFAULT_UNIT_EXTENSION.to_string(),
            repr_limit: DEFAULT_REPR_LIMIT,
        }
    }
}

impl WorkerConfig {
    pub fn type_policy(&self) -> TypePolicy {
        if self.strict_types {
            TypePolicy::Strict
        } else {
            TypePolicy::Permissive
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.repr_limit == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--repr-limit must be greater than zero"));
        }
        if self.unit_extension.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("--unit-extension must not be empty"));
        }
        if self.unit_extension.starts_with('.') {
            return Err(Error::new(ErrorKind::Usage).with_message(format!(
                "--unit-extension must not start with '.' (got '{}')",
                self.unit_extension
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::WorkerConfig;
    use crate::core::error::ErrorKind;
    use crate::dispatch::TypePolicy;

    #[test]
    fn defaults_are_valid_and_permissive() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.type_policy(), TypePolicy::Permissive);
        assert_eq!(config.unit_extension, "json");
        assert_eq!(config.repr_limit, 200);
    }

    #[test]
    fn rejects_unusable_settings() {
        let zero = WorkerConfig {
            repr_limit: 0,
            ..WorkerConfig::default()
        };
        assert_eq!(zero.validate().unwrap_err().kind(), ErrorKind::Usage);

        let dotted = WorkerConfig {
            unit_extension: ".json".to_string(),
            ..WorkerConfig::default()
        };
        assert!(dotted.validate().unwrap_err().message().contains("'.json'"));

        let empty = WorkerConfig {
            unit_extension: String::new(),
            ..WorkerConfig::default()
        };
        assert_eq!(empty.validate().unwrap_err().kind(), ErrorKind::Usage);
    }
}
