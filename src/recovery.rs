//! Redundancy grouping — XOR recovery blocks interleaved with data blocks.
//!
//! `spec.md` §4.5: the `datasize`-byte stream is partitioned into consecutive
//! `NDATA`-byte payloads; every `ngroup` of them is followed by a synthetic
//! recovery payload (the XOR of the group) sharing the group's first `addr`.
//! Losing any single payload in a group — data or recovery — is recoverable
//! by XORing the survivors; losing two or more leaves the group incomplete
//! for this page.

use crate::block::PAYLOAD_LEN;

pub const NGROUP_MIN: u32 = 2;
pub const NGROUP_MAX: u32 = 10;

/// One data payload's position within the padded stream, paired with its
/// content, as handed to the page layout stage.
#[derive(Debug, Clone, Copy)]
pub struct DataPayload {
    pub addr: u32,
    pub bytes: [u8; PAYLOAD_LEN],
}

/// A unit of the interleaved, group-recovery-augmented block stream, in the
/// scan order the page renderer consumes.
#[derive(Debug, Clone, Copy)]
pub enum GroupedBlock {
    Data(DataPayload),
    Recovery { addr: u32, bytes: [u8; PAYLOAD_LEN] },
}

impl GroupedBlock {
    pub fn addr(&self) -> u32 {
        match self {
            GroupedBlock::Data(d) => d.addr,
            GroupedBlock::Recovery { addr, .. } => *addr,
        }
    }

    pub fn bytes(&self) -> &[u8; PAYLOAD_LEN] {
        match self {
            GroupedBlock::Data(d) => &d.bytes,
            GroupedBlock::Recovery { bytes, .. } => bytes,
        }
    }
}

fn xor_payloads<'a>(payloads: impl Iterator<Item = &'a [u8; PAYLOAD_LEN]>) -> [u8; PAYLOAD_LEN] {
    let mut acc = [0u8; PAYLOAD_LEN];
    for p in payloads {
        for (a, b) in acc.iter_mut().zip(p.iter()) {
            *a ^= b;
        }
    }
    acc
}

/// Split a padded stream into `NDATA`-byte payloads at consecutive offsets.
pub fn split_payloads(data: &[u8]) -> Vec<DataPayload> {
    data.chunks(PAYLOAD_LEN)
        .enumerate()
        .map(|(i, chunk)| {
            let mut bytes = [0u8; PAYLOAD_LEN];
            bytes[..chunk.len()].copy_from_slice(chunk);
            DataPayload {
                addr: (i * PAYLOAD_LEN) as u32,
                bytes,
            }
        })
        .collect()
}

/// Interleave data payloads with one XOR recovery payload per run of
/// `ngroup` (the final, possibly-partial, run also gets its own recovery).
pub fn interleave(payloads: &[DataPayload], ngroup: u32) -> Vec<GroupedBlock> {
    assert!((NGROUP_MIN..=NGROUP_MAX).contains(&ngroup), "ngroup out of range");
    let ngroup = ngroup as usize;
    let mut out = Vec::with_capacity(payloads.len() + payloads.len() / ngroup + 1);

    for group in payloads.chunks(ngroup) {
        for p in group {
            out.push(GroupedBlock::Data(*p));
        }
        let recovery_addr = group[0].addr;
        let recovery_bytes = xor_payloads(group.iter().map(|p| &p.bytes));
        out.push(GroupedBlock::Recovery {
            addr: recovery_addr,
            bytes: recovery_bytes,
        });
    }
    out
}

/// Total number of on-page blocks (data + recovery) for `ndata` data
/// payloads grouped by `ngroup` (`spec.md` §8 "Group arithmetic").
pub fn total_blocks(ndata: u32, ngroup: u32) -> u32 {
    let groups = ndata.div_ceil(ngroup);
    ndata + groups
}

/// State of one redundancy group as the reassembler accumulates blocks for
/// it: up to `ngroup` data slots plus one recovery slot.
#[derive(Debug, Clone)]
pub struct GroupState {
    pub data: Vec<Option<[u8; PAYLOAD_LEN]>>,
    pub recovery: Option<[u8; PAYLOAD_LEN]>,
}

impl GroupState {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![None; size],
            recovery: None,
        }
    }

    fn missing_count(&self) -> usize {
        self.data.iter().filter(|d| d.is_none()).count()
    }

    /// If exactly one data payload is missing and the recovery payload
    /// survived, reconstruct it by XOR and return its index. Otherwise
    /// leaves the group untouched and returns `None`.
    pub fn try_reconstruct(&mut self) -> Option<usize> {
        if self.missing_count() != 1 {
            return None;
        }
        let recovery = self.recovery?;
        let missing_idx = self.data.iter().position(|d| d.is_none())?;
        let reconstructed = xor_payloads(
            std::iter::once(&recovery).chain(self.data.iter().filter_map(|d| d.as_ref())),
        );
        self.data[missing_idx] = Some(reconstructed);
        Some(missing_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_erasure_reconstructs_exactly() {
        let payloads: Vec<DataPayload> = (0..5u32)
            .map(|i| DataPayload {
                addr: i * PAYLOAD_LEN as u32,
                bytes: [i as u8; PAYLOAD_LEN],
            })
            .collect();
        let grouped = interleave(&payloads, 5);
        assert_eq!(grouped.len(), 6); // 5 data + 1 recovery

        let recovery = match grouped.last().unwrap() {
            GroupedBlock::Recovery { bytes, .. } => *bytes,
            _ => panic!("expected recovery block last"),
        };

        let mut group = GroupState::new(5);
        group.recovery = Some(recovery);
        for (i, p) in payloads.iter().enumerate() {
            if i == 2 {
                continue; // erase payload 2
            }
            group.data[i] = Some(p.bytes);
        }
        let idx = group.try_reconstruct().unwrap();
        assert_eq!(idx, 2);
        assert_eq!(group.data[2].unwrap(), payloads[2].bytes);
    }

    #[test]
    fn two_missing_is_not_reconstructed() {
        let mut group = GroupState::new(4);
        group.recovery = Some([0xAA; PAYLOAD_LEN]);
        group.data[0] = Some([1; PAYLOAD_LEN]);
        group.data[1] = Some([2; PAYLOAD_LEN]);
        assert!(group.try_reconstruct().is_none());
    }

    #[test]
    fn missing_recovery_blocks_reconstruction() {
        let mut group = GroupState::new(3);
        group.data[0] = Some([1; PAYLOAD_LEN]);
        group.data[1] = Some([2; PAYLOAD_LEN]);
        assert!(group.try_reconstruct().is_none());
    }

    #[test]
    fn total_blocks_matches_group_arithmetic() {
        assert_eq!(total_blocks(10, 5), 12); // 2 groups of 5 -> +2 recovery
        assert_eq!(total_blocks(11, 5), 13); // 3 groups (5,5,1) -> +3 recovery
        assert_eq!(total_blocks(0, 5), 0);
    }

    #[test]
    fn partial_final_group_still_gets_recovery() {
        let payloads: Vec<DataPayload> = (0..7u32)
            .map(|i| DataPayload {
                addr: i * PAYLOAD_LEN as u32,
                bytes: [i as u8; PAYLOAD_LEN],
            })
            .collect();
        let grouped = interleave(&payloads, 5);
        // group 1: 5 data + 1 recovery; group 2: 2 data + 1 recovery
        assert_eq!(grouped.len(), 9);
    }

    #[test]
    fn split_payloads_zero_pads_final_chunk() {
        let data = b"HELLO\n".to_vec();
        let payloads = split_payloads(&data);
        assert_eq!(payloads.len(), 1);
        assert_eq!(&payloads[0].bytes[..6], b"HELLO\n");
        assert!(payloads[0].bytes[6..].iter().all(|&b| b == 0));
    }
}
