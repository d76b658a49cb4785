//! Processor registry: builds processors by name from JSON arguments.

use crate::error::{ProcessingError, Result};
use crate::processor::Processor;
use crate::processors::{DownsampleXy, Fill, Identity, MeanFilter, SplitChannels, Threshold};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Keyword arguments passed to a processor factory
pub type ProcessorArgs = serde_json::Map<String, Value>;

/// Factory function for creating processor instances.
pub type ProcessorFactory = Arc<dyn Fn(&ProcessorArgs) -> Result<Box<dyn Processor>> + Send + Sync>;

/// Namespace the built-in processors are registered under
pub const DEFAULT_NAMESPACE: &str = "voltile.processors";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Which processor to run and how to construct it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Name of the processor
    pub name: String,

    /// Arguments handed to the processor's constructor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ProcessorArgs>,

    /// Namespace in which `name` is looked up
    #[serde(default = "default_namespace")]
    pub module_search_path: String,
}

impl ProcessorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            module_search_path: default_namespace(),
        }
    }

    pub fn with_args(mut self, args: ProcessorArgs) -> Self {
        self.args = Some(args);
        self
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.module_search_path = namespace.into();
        self
    }
}

/// Deserialize a processor's argument struct, reporting failures against `name`
pub fn parse_args<T: DeserializeOwned>(name: &str, args: &ProcessorArgs) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| {
        ProcessingError::InvalidArguments {
            name: name.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Registry of processor factories keyed by namespace and name.
pub struct ProcessorRegistry {
    factories: BTreeMap<(String, String), ProcessorFactory>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in processors.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_deserialized::<Identity>(DEFAULT_NAMESPACE, "Identity");
        registry.register_deserialized::<MeanFilter>(DEFAULT_NAMESPACE, "MeanFilter");
        registry.register_deserialized::<Threshold>(DEFAULT_NAMESPACE, "Threshold");
        registry.register_deserialized::<DownsampleXy>(DEFAULT_NAMESPACE, "DownsampleXy");
        registry.register_deserialized::<SplitChannels>(DEFAULT_NAMESPACE, "SplitChannels");
        registry.register_deserialized::<Fill>(DEFAULT_NAMESPACE, "Fill");
        registry
    }

    /// Register a processor factory, replacing any previous entry.
    pub fn register<F>(&mut self, namespace: &str, name: &str, factory: F)
    where
        F: Fn(&ProcessorArgs) -> Result<Box<dyn Processor>> + Send + Sync + 'static,
    {
        self.factories
            .insert((namespace.to_string(), name.to_string()), Arc::new(factory));
    }

    /// Register a processor whose arguments map directly onto its fields.
    pub fn register_deserialized<P>(&mut self, namespace: &str, name: &str)
    where
        P: Processor + DeserializeOwned + 'static,
    {
        let owned = name.to_string();
        self.register(namespace, name, move |args| {
            let processor: P = parse_args(&owned, args)?;
            Ok(Box::new(processor))
        });
    }

    /// Remove a processor. Returns true if it was registered.
    pub fn unregister(&mut self, namespace: &str, name: &str) -> bool {
        self.factories
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.factories
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Names registered under `namespace`, sorted
    pub fn names(&self, namespace: &str) -> Vec<&str> {
        self.factories
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate `name` from `namespace` with `args`, rejecting invalid
    /// arguments before the processor is handed out.
    pub fn create(
        &self,
        namespace: &str,
        name: &str,
        args: &ProcessorArgs,
    ) -> Result<Box<dyn Processor>> {
        let factory = self
            .factories
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ProcessingError::UnknownProcessor {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;
        let processor = factory(args)?;
        processor.validate()?;
        Ok(processor)
    }

    /// Instantiate the processor a [`ProcessorConfig`] describes.
    pub fn get_processor(&self, config: &ProcessorConfig) -> Result<Box<dyn Processor>> {
        let empty = ProcessorArgs::new();
        let args = config.args.as_ref().unwrap_or(&empty);
        self.create(&config.module_search_path, &config.name, args)
    }
}
