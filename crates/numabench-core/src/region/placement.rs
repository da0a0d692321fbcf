//! Round-robin placement of worker regions on NVRAM devices.

/// Device and byte offset of one worker's NVRAM region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvramSlot {
    /// Index into the domain's device list
    pub device_index: usize,
    /// Byte offset into the device
    pub offset: u64,
}

/// Places worker `worker_index` on one of `device_count` devices.
///
/// Workers rotate over the devices; every full rotation moves one region
/// further into each device, so regions sharing a device never overlap.
/// Returns `None` when there are no devices or the offset overflows `u64`.
#[must_use]
pub fn nvram_slot(worker_index: usize, device_count: usize, region_size: usize) -> Option<NvramSlot> {
    if device_count == 0 {
        return None;
    }
    let round = u64::try_from(worker_index / device_count).ok()?;
    let offset = round.checked_mul(u64::try_from(region_size).ok()?)?;
    Some(NvramSlot {
        device_index: worker_index % device_count,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_round_robin() {
        let slots: Vec<NvramSlot> = (0..5).map(|i| nvram_slot(i, 2, 4096).unwrap()).collect();

        assert_eq!(
            slots.iter().map(|s| s.device_index).collect::<Vec<_>>(),
            vec![0, 1, 0, 1, 0]
        );
        assert_eq!(
            slots.iter().map(|s| s.offset).collect::<Vec<_>>(),
            vec![0, 0, 4096, 4096, 8192]
        );
    }

    #[test]
    fn test_single_device() {
        for i in 0..4 {
            let slot = nvram_slot(i, 1, 1 << 30).unwrap();
            assert_eq!(slot.device_index, 0);
            assert_eq!(slot.offset, (i as u64) << 30);
        }
    }

    #[test]
    fn test_no_devices() {
        assert_eq!(nvram_slot(0, 0, 4096), None);
    }

    #[test]
    fn test_offset_overflow() {
        assert_eq!(nvram_slot(usize::MAX, 1, 1 << 40), None);
        assert_eq!(nvram_slot(1 << 24, 1, 1 << 40), None);

        let slot = nvram_slot((1 << 24) - 1, 1, 1 << 40).unwrap();
        assert_eq!(slot.offset, ((1u64 << 24) - 1) << 40);
    }

    #[test]
    fn test_no_overlap_on_shared_device() {
        let region_size = 2 << 30;
        let mut per_device: HashMap<usize, Vec<u64>> = HashMap::new();
        for i in 0..24 {
            let slot = nvram_slot(i, 3, region_size).unwrap();
            per_device.entry(slot.device_index).or_default().push(slot.offset);
        }

        for offsets in per_device.values_mut() {
            offsets.sort_unstable();
            for pair in offsets.windows(2) {
                assert!(pair[1] >= pair[0] + region_size as u64);
            }
        }
    }
}
