//! Out-of-order segment reorder buffer and SACK block synthesis.
//!
//! Distinct from `storage::Assembler`: that type only tracks which byte
//! ranges of an already-placed linear buffer are filled. `RxBuffer` owns the
//! actual segment payloads so they can be copied into the socket's receive
//! buffer once the hole in front of them closes, and so SACK blocks can be
//! reported to the peer before that happens.

use std::fmt;

use crate::wire::TcpSeqNumber;

/// One out-of-order segment held pending delivery.
#[derive(Clone)]
struct Segment {
    seq: TcpSeqNumber,
    data: Vec<u8>,
}

impl Segment {
    fn end(&self) -> TcpSeqNumber {
        self.seq + self.data.len()
    }
}

/// Maximum number of SACK blocks a single ACK can carry (RFC 2018 §3, bounded
/// by the TCP option space: 4 blocks with timestamps disabled).
pub const MAX_SACK_BLOCKS: usize = 4;

/// Reassembles segments that arrive ahead of `rcv_nxt`.
///
/// Invariant: segments are always kept pairwise sequence-disjoint and sorted
/// by starting sequence number. Overlapping or wholly-covered data is
/// trimmed or dropped on insert, never double-counted.
#[derive(Default)]
pub struct RxBuffer {
    segments: Vec<Segment>,
}

impl RxBuffer {
    pub fn new() -> Self {
        RxBuffer {
            segments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn reset(&mut self) {
        self.segments.clear();
    }

    /// Total number of bytes currently held (all out-of-order, none at
    /// `rcv_nxt` yet, or they would have been removed).
    pub fn held_bytes(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }

    /// Inserts `data` starting at `seq`, trimming away whatever is already
    /// covered by `rcv_nxt` or by an existing held segment. Returns the
    /// number of newly admitted bytes (0 if the segment was entirely
    /// duplicate).
    pub fn insert(&mut self, seq: TcpSeqNumber, data: &[u8], rcv_nxt: TcpSeqNumber) -> usize {
        if data.is_empty() {
            return 0;
        }

        // Drop whatever is already below rcv_nxt; it has either been
        // delivered already or belongs to the in-order path, not here.
        let (mut seq, mut data) = (seq, data);
        if seq < rcv_nxt {
            let skip = rcv_nxt - seq;
            if skip >= data.len() {
                return 0;
            }
            seq = rcv_nxt;
            data = &data[skip..];
        }

        let mut new_end = seq + data.len();
        let mut new_start = seq;
        let mut admitted = data.len();
        let mut payload = data.to_vec();

        // Merge against every existing segment that overlaps or touches the
        // new range, trimming duplicate bytes out of the accounting and
        // widening the inserted span to cover the union.
        let mut i = 0;
        while i < self.segments.len() {
            let s = &self.segments[i];
            let touches = s.seq <= new_end && new_start <= s.end();
            if !touches {
                i += 1;
                continue;
            }

            let overlap_start = if new_start > s.seq { new_start } else { s.seq };
            let overlap_end = if new_end < s.end() { new_end } else { s.end() };
            if overlap_end > overlap_start {
                admitted = admitted.saturating_sub(overlap_end - overlap_start);
            }

            let merged_start = if new_start < s.seq { new_start } else { s.seq };
            let merged_end = if new_end > s.end() { new_end } else { s.end() };

            let mut merged = Vec::with_capacity((merged_end - merged_start) as usize);
            // existing segment's bytes that fall before the new range
            if s.seq < new_start {
                merged.extend_from_slice(&s.data[..new_start - s.seq]);
            }
            merged.extend_from_slice(&payload);
            // existing segment's bytes that fall after the new range
            if s.end() > new_end {
                let skip = new_end - s.seq;
                merged.extend_from_slice(&s.data[skip..]);
            }

            payload = merged;
            new_start = merged_start;
            new_end = merged_end;
            self.segments.remove(i);
        }

        let insert_at = self
            .segments
            .iter()
            .position(|s| s.seq > new_start)
            .unwrap_or(self.segments.len());
        self.segments.insert(
            insert_at,
            Segment {
                seq: new_start,
                data: payload,
            },
        );
        admitted
    }

    /// If the lowest-sequence held segment starts exactly at `rcv_nxt`,
    /// removes and returns it so the caller can append it to the contiguous
    /// receive buffer and advance `rcv_nxt`.
    pub fn remove_front(&mut self, rcv_nxt: TcpSeqNumber) -> Option<Vec<u8>> {
        if let Some(first) = self.segments.first() {
            if first.seq == rcv_nxt {
                return Some(self.segments.remove(0).data);
            }
        }
        None
    }

    /// Builds up to `MAX_SACK_BLOCKS` (left, right) SACK blocks from the
    /// currently held segments, most-recently-touched block first per RFC
    /// 2018 §4 ("the first SACK block ... should reflect the data most
    /// recently received").
    pub fn sack_blocks(&self, most_recent_seq: Option<TcpSeqNumber>) -> Vec<(TcpSeqNumber, TcpSeqNumber)> {
        let mut blocks: Vec<(TcpSeqNumber, TcpSeqNumber)> =
            self.segments.iter().map(|s| (s.seq, s.end())).collect();

        if let Some(recent) = most_recent_seq {
            if let Some(pos) = blocks.iter().position(|(l, r)| *l <= recent && recent < *r) {
                let b = blocks.remove(pos);
                blocks.insert(0, b);
            }
        }

        blocks.truncate(MAX_SACK_BLOCKS);
        blocks
    }
}

impl fmt::Debug for RxBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RxBuffer")
            .field("segments", &self.segments.len())
            .field("held_bytes", &self.held_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: i32) -> TcpSeqNumber {
        TcpSeqNumber(n)
    }

    #[test]
    fn disjoint_insert_then_remove_front() {
        let mut rxb = RxBuffer::new();
        assert_eq!(rxb.insert(seq(100), &[1, 2, 3], seq(100)), 3);
        assert_eq!(rxb.remove_front(seq(100)), Some(vec![1, 2, 3]));
        assert!(rxb.is_empty());
    }

    #[test]
    fn out_of_order_then_contiguous_join() {
        let mut rxb = RxBuffer::new();
        assert_eq!(rxb.insert(seq(105), &[6, 7, 8], seq(100)), 3);
        assert!(rxb.remove_front(seq(100)).is_none());
        assert_eq!(rxb.insert(seq(100), &[1, 2, 3, 4, 5], seq(100)), 5);
        assert_eq!(
            rxb.remove_front(seq(100)),
            Some(vec![1, 2, 3, 4, 5, 6, 7, 8])
        );
    }

    #[test]
    fn overlapping_insert_admits_only_new_bytes() {
        let mut rxb = RxBuffer::new();
        assert_eq!(rxb.insert(seq(100), &[1, 2, 3, 4], seq(100)), 4);
        // [102,106) overlaps [100,104) by 2 bytes, admits 2 new.
        assert_eq!(rxb.insert(seq(102), &[3, 4, 5, 6], seq(100)), 2);
        assert_eq!(
            rxb.remove_front(seq(100)),
            Some(vec![1, 2, 3, 4, 5, 6])
        );
    }

    #[test]
    fn below_rcv_nxt_is_trimmed() {
        let mut rxb = RxBuffer::new();
        // seq 95..100 is entirely below rcv_nxt=100: nothing admitted.
        assert_eq!(rxb.insert(seq(95), &[1, 2, 3, 4, 5], seq(100)), 0);
        // seq 95..103 straddles rcv_nxt: only [100,103) counts.
        assert_eq!(rxb.insert(seq(95), &[0, 0, 0, 0, 0, 7, 8, 9], seq(100)), 3);
    }

    #[test]
    fn sack_blocks_promote_most_recent() {
        let mut rxb = RxBuffer::new();
        rxb.insert(seq(200), &[1, 2], seq(100));
        rxb.insert(seq(300), &[1, 2], seq(100));
        let blocks = rxb.sack_blocks(Some(seq(300)));
        assert_eq!(blocks[0], (seq(300), seq(302)));
        assert_eq!(blocks[1], (seq(200), seq(202)));
    }
}
