//! Tabular and geospatial operations for ect.
//!
//! Call [`register_all`] once at startup to make them available:
//!
//! ```
//! let mut registry = ect_core::Registry::new();
//! ect_ops::register_all(&mut registry).unwrap();
//! assert!(registry.contains("data_frame_query"));
//! ```

mod data_frame;
mod io;
mod query;

pub use query::{CmpOp, GeoTest, Operand, Query};

use ect_core::{Registry, Result};

/// Register every operation of this crate.
pub fn register_all(registry: &mut Registry) -> Result<()> {
    io::register(registry)?;
    data_frame::register(registry)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_is_idempotent() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();
        let count = registry.len();
        register_all(&mut registry).unwrap();
        assert_eq!(registry.len(), count);
    }

    #[test]
    fn test_leaf_ops_are_tagged() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();
        let filters: Vec<&str> = registry.tagged("filter").map(|s| s.name.as_str()).collect();
        assert_eq!(
            filters,
            vec!["to_geo_data_frame", "data_frame_min", "data_frame_max", "data_frame_query"]
        );
        assert!(registry.signatures().all(|s| s.version == "1.0"));
    }
}
