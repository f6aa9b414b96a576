//! Module (extension data-type) values and the module-parser contract.
//!
//! Redis modules serialize custom value types into the snapshot as a
//! sequence of typed parts. The snapshot walk decodes the structural
//! framing (name, version, parts) and hands the parts to the parser
//! registered for the `(name, version)` pair; a record whose pair has no
//! registered parser is a decode error naming the module identity.

use crate::config::Configuration;
use crate::error::Result;

/// Registry key for module parsers.
pub type ModuleKey = (String, u32);

/// A decoded module value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub version: u32,
    /// Serialized parts in stream order: integers rendered as decimal
    /// bytes, strings raw.
    pub parts: Vec<Vec<u8>>,
}

/// Pure decode function for one module record.
pub trait ModuleParser: Send + Sync {
    fn parse(
        &self,
        name: &str,
        version: u32,
        parts: &[Vec<u8>],
        config: &Configuration,
    ) -> Result<Module>;
}

/// Parser that keeps the structural parts as-is.
pub struct DefaultModuleParser;

impl ModuleParser for DefaultModuleParser {
    fn parse(
        &self,
        name: &str,
        version: u32,
        parts: &[Vec<u8>],
        _config: &Configuration,
    ) -> Result<Module> {
        Ok(Module {
            name: name.to_string(),
            version,
            parts: parts.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parser_keeps_parts() {
        let parts = vec![b"1".to_vec(), b"payload".to_vec()];
        let module = DefaultModuleParser
            .parse("mytype-az", 2, &parts, &Configuration::default())
            .unwrap();
        assert_eq!(module.name, "mytype-az");
        assert_eq!(module.version, 2);
        assert_eq!(module.parts, parts);
    }
}
