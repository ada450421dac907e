//! Static role-size to core-count table used for quota checks before
//! issuing a VM create or resize. Unknown sizes are a validation failure,
//! never a zero-core default.

use crate::error::{Error, ErrorKind};

const SIZE_CORE_MAP: &[(&str, u32)] = &[
    ("a0", 1),
    ("basic_a0", 1),
    ("a1", 1),
    ("basic_a1", 1),
    ("a2", 2),
    ("basic_a2", 2),
    ("a3", 4),
    ("basic_a3", 4),
    ("a4", 8),
    ("basic_a4", 8),
    ("extrasmall", 1),
    ("small", 1),
    ("medium", 2),
    ("large", 4),
    ("extralarge", 8),
    ("a5", 2),
    ("a6", 4),
    ("a7", 8),
    ("a8", 8),
    ("a9", 16),
    ("standard_d1", 1),
    ("standard_d2", 2),
    ("standard_d3", 4),
    ("standard_d4", 8),
    ("standard_d11", 2),
    ("standard_d12", 4),
    ("standard_d13", 8),
    ("standard_d14", 16),
    ("standard_ds1", 1),
    ("standard_ds2", 2),
    ("standard_ds3", 4),
    ("standard_ds4", 8),
    ("standard_ds11", 2),
    ("standard_ds12", 4),
    ("standard_ds13", 8),
    ("standard_ds14", 16),
    ("standard_g1", 2),
    ("standard_g2", 4),
    ("standard_g3", 8),
    ("standard_g4", 16),
    ("standard_g5", 32),
];

/// Look up the core count for a role size name (case- and
/// whitespace-insensitive, e.g. `"Extra Small"` and `"extrasmall"` match).
///
/// Returns [`ErrorKind::InvalidTemplate`] for a size the table doesn't know,
/// per the design note that unknown sizes are a validation failure rather
/// than a zero-core default.
pub fn cores_for_size(size: &str) -> Result<u32, Error> {
    let key: String = size
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect();
    SIZE_CORE_MAP
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, cores)| *cores)
        .ok_or_else(|| {
            Error::custom(
                ErrorKind::InvalidTemplate,
                format!("unknown role size '{size}'"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sizes_resolve() {
        assert_eq!(cores_for_size("Small").unwrap(), 1);
        assert_eq!(cores_for_size("Extra Small").unwrap(), 1);
        assert_eq!(cores_for_size("standard_d14").unwrap(), 16);
        assert_eq!(cores_for_size("STANDARD_G5").unwrap(), 32);
    }

    #[test]
    fn unknown_size_is_invalid_template() {
        let err = cores_for_size("Standard_Z99").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTemplate);
    }
}
