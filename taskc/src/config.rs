//! Runtime selection and the runtime interface versions that lowering is
//! configured with.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

/// The parallel runtime that lowered code calls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Runtime {
    /// The explicit task object ABI (`__kmpc_*` entry points).
    Kmp,
    /// The work-descriptor ABI (`nanos_*` entry points).
    Nanos,
}

impl Display for Runtime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Runtime::Kmp => write!(f, "kmp"),
            Runtime::Nanos => write!(f, "nanos"),
        }
    }
}

/// The dependency API version from which dependencies are described with
/// per-dimension regions instead of a flat offset and size.
pub const DEPS_API_DIMENSIONS: u32 = 1001;

/// Versions of the runtime interface components that lowering targets.
///
/// The default reports `deps_api = 1001`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeInterface {
    versions: BTreeMap<String, u32>,
}

impl Default for RuntimeInterface {
    fn default() -> Self {
        let mut versions = BTreeMap::new();
        versions.insert("deps_api".to_string(), DEPS_API_DIMENSIONS);
        Self { versions }
    }
}

impl RuntimeInterface {
    pub fn set(&mut self, component: &str, version: u32) {
        self.versions.insert(component.to_string(), version);
    }
    pub fn version(&self, component: &str) -> Option<u32> {
        self.versions.get(component).copied()
    }
    /// Whether `component` is known and has at least `version`.
    pub fn interface_is_at_least(&self, component: &str, version: u32) -> bool {
        match self.version(component) {
            Some(known) => known >= version,
            None => false,
        }
    }
}

/// Parse a `COMPONENT=VERSION` assignment such as `deps_api=1000`.
pub fn parse_interface(text: &str) -> Result<(String, u32)> {
    let (component, version) = match text.split_once('=') {
        Some(parts) => parts,
        None => anyhow::bail!("Expected COMPONENT=VERSION, but got `{text}`"),
    };
    let component = component.trim();
    if component.is_empty() {
        anyhow::bail!("Missing component in `{text}`");
    }
    let version = version
        .trim()
        .parse::<u32>()
        .map_err(|e| anyhow::anyhow!("Invalid version in `{text}`: {e}"))?;
    Ok((component.to_string(), version))
}

/// Options that the lowering passes read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LowerOptions {
    pub interface: RuntimeInterface,
}

impl LowerOptions {
    pub fn with_interface(mut self, component: &str, version: u32) -> Self {
        self.interface.set(component, version);
        self
    }
}
