use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::BarcodeDecoder;
use super::backends::MarkerDecoder;

/// Named decoder backends.
pub struct DecoderRegistry {
    decoders: HashMap<String, Arc<dyn BarcodeDecoder>>,
    default_name: Option<String>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with the built-in backends.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MarkerDecoder::new());
        registry
    }

    /// Register a decoder. The first registered decoder becomes the default.
    pub fn register<D: BarcodeDecoder + 'static>(&mut self, decoder: D) {
        let name = decoder.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.decoders.insert(name, Arc::new(decoder));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.decoders.contains_key(name) {
            return Err(anyhow!("decoder '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BarcodeDecoder>> {
        self.decoders.get(name).cloned()
    }

    pub fn default_decoder(&self) -> Option<Arc<dyn BarcodeDecoder>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Look up `name`, failing with the list of known decoders.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn BarcodeDecoder>> {
        self.get(name).ok_or_else(|| {
            let mut known = self.list();
            known.sort();
            anyhow!(
                "decoder '{}' not registered (known: {})",
                name,
                known.join(", ")
            )
        })
    }

    pub fn list(&self) -> Vec<String> {
        self.decoders.keys().cloned().collect()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
