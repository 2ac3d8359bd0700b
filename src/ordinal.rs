//! Flat ordinal to rack address translation.
//!
//! A datacenter's members are numbered `0..N` across all racks. Racks consume
//! that range in declaration order, each taking as many ordinals as it has
//! members, so the flat ordinal space is never materialized.

use crate::crd::RackSpec;
use crate::error::{CtlError, Result};

/// Position of a member inside its rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RackSlot<'a> {
    /// Index of the rack in declaration order
    pub rack_index: usize,
    /// The rack itself
    pub rack: &'a RackSpec,
    /// Ordinal within the rack
    pub ordinal: u32,
}

/// Resolve a flat ordinal against an ordered rack list.
pub fn resolve(flat_ordinal: i32, racks: &[RackSpec]) -> Result<RackSlot<'_>> {
    let out_of_range = || CtlError::InvalidOrdinal {
        ordinal: flat_ordinal,
        capacity: total_capacity(racks),
    };

    if flat_ordinal < 0 {
        return Err(out_of_range());
    }

    let mut remainder = flat_ordinal as u32;
    for (rack_index, rack) in racks.iter().enumerate() {
        if remainder < rack.capacity() {
            return Ok(RackSlot {
                rack_index,
                rack,
                ordinal: remainder,
            });
        }
        remainder -= rack.capacity();
    }

    Err(out_of_range())
}

/// Inverse of [`resolve`]: the flat ordinal of `ordinal` within the named rack.
///
/// Returns `None` when the rack is unknown, the ordinal exceeds its capacity,
/// or the flat ordinal does not fit in a `u32`.
pub fn flatten(rack: &str, ordinal: u32, racks: &[RackSpec]) -> Option<u32> {
    let mut offset = 0u64;
    for spec in racks {
        if spec.name == rack {
            if ordinal >= spec.capacity() {
                return None;
            }
            return u32::try_from(offset + u64::from(ordinal)).ok();
        }
        offset += u64::from(spec.capacity());
    }
    None
}

/// Sum of all rack capacities.
pub fn total_capacity(racks: &[RackSpec]) -> i64 {
    racks.iter().map(|r| r.capacity() as i64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn racks(spec: &[(&str, i32)]) -> Vec<RackSpec> {
        spec.iter().map(|(n, m)| RackSpec::new(*n, *m)).collect()
    }

    #[test]
    fn test_resolve_second_rack() {
        let racks = racks(&[("rack1", 3), ("rack2", 2)]);
        let slot = resolve(4, &racks).unwrap();
        assert_eq!(slot.rack.name, "rack2");
        assert_eq!(slot.rack_index, 1);
        assert_eq!(slot.ordinal, 1);
    }

    #[test]
    fn test_resolve_first_and_boundary() {
        let racks = racks(&[("rack1", 3), ("rack2", 2)]);
        assert_eq!(resolve(0, &racks).unwrap().rack.name, "rack1");
        let slot = resolve(3, &racks).unwrap();
        assert_eq!((slot.rack.name.as_str(), slot.ordinal), ("rack2", 0));
    }

    #[test]
    fn test_resolve_out_of_range() {
        let racks = racks(&[("rack1", 3)]);
        match resolve(3, &racks) {
            Err(CtlError::InvalidOrdinal { ordinal, capacity }) => {
                assert_eq!(ordinal, 3);
                assert_eq!(capacity, 3);
            }
            other => panic!("expected InvalidOrdinal, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_negative() {
        let racks = racks(&[("rack1", 3)]);
        assert!(matches!(
            resolve(-1, &racks),
            Err(CtlError::InvalidOrdinal { ordinal: -1, .. })
        ));
    }

    #[test]
    fn test_resolve_no_racks() {
        assert!(resolve(0, &[]).is_err());
    }

    #[test]
    fn test_resolve_skips_empty_racks() {
        let racks = racks(&[("a", 0), ("b", -1), ("c", 2)]);
        let slot = resolve(1, &racks).unwrap();
        assert_eq!((slot.rack.name.as_str(), slot.ordinal), ("c", 1));
    }

    #[test]
    fn test_resolve_preceding_capacity_sums_to_flat_ordinal() {
        let layouts = [
            racks(&[("a", 1)]),
            racks(&[("a", 3), ("b", 2)]),
            racks(&[("a", 0), ("b", 5), ("c", 1), ("d", 4)]),
            racks(&[("a", 2), ("b", 2), ("c", 2)]),
        ];

        for layout in &layouts {
            let total = total_capacity(layout) as i32;
            for flat in 0..total {
                let slot = resolve(flat, layout).unwrap();
                let preceding: u32 = layout[..slot.rack_index].iter().map(RackSpec::capacity).sum();
                assert_eq!(preceding + slot.ordinal, flat as u32);
                assert_eq!(flatten(&slot.rack.name, slot.ordinal, layout), Some(flat as u32));
            }
            assert!(resolve(total, layout).is_err());
            assert!(resolve(total + 7, layout).is_err());
            assert!(resolve(-3, layout).is_err());
        }
    }

    #[test]
    fn test_flatten_unknown() {
        let racks = racks(&[("rack1", 3), ("rack2", 2)]);
        assert_eq!(flatten("rack2", 1, &racks), Some(4));
        assert_eq!(flatten("rack2", 2, &racks), None);
        assert_eq!(flatten("rack9", 0, &racks), None);
    }

    #[test]
    fn test_flatten_huge_capacities() {
        let racks = racks(&[("a", i32::MAX), ("b", i32::MAX), ("c", i32::MAX)]);
        assert_eq!(flatten("b", 0, &racks), Some(i32::MAX as u32));
        assert_eq!(flatten("c", 5, &racks), None);
        assert_eq!(flatten("d", 0, &racks), None);
    }
}
