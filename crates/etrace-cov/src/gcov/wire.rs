//! Binary GCNO/GCDA wire constants and fixed-layout records, mirroring
//! `cov-gcov.h`.

pub const GCOV_DATA_MAGIC: u32 = 0x6763_6461; // "gcda"
pub const GCOV_NOTE_MAGIC: u32 = 0x6763_6e6f; // "gcno"

pub const GCOV_COUNTERS_SUMMABLE: usize = 1;

pub const GCOV_TAG_FUNCTION: u32 = 0x0100_0000;
pub const GCOV_TAG_BLOCKS: u32 = 0x0141_0000;
pub const GCOV_TAG_ARCS: u32 = 0x0143_0000;
pub const GCOV_TAG_LINES: u32 = 0x0145_0000;
pub const GCOV_TAG_COUNTER_BASE: u32 = 0x01a1_0000;
pub const GCOV_TAG_OBJECT_SUMMARY: u32 = 0xa100_0000;
pub const GCOV_TAG_PROGRAM_SUMMARY: u32 = 0xa300_0000;
pub const GCOV_TAG_EOF: u32 = 0;

pub const GCOV_ARC_ON_TREE: u32 = 1 << 0;

/// 4.7 format version gate: adds a per-function `cfg_csum` word.
pub const GCOV_VERSION_CFG_CSUM: u32 = 0x3430_372a;
/// Version gate for the function record's extra trailing word.
pub const GCOV_VERSION_FUNC_EXTRA_WORD: u32 = 0x3430_3665;

#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    pub stamp: u32,
}

impl FileHeader {
    pub const SIZE: usize = 12;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.magic.to_ne_bytes());
        out[4..8].copy_from_slice(&self.version.to_ne_bytes());
        out[8..12].copy_from_slice(&self.stamp.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            magic: u32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            version: u32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
            stamp: u32::from_ne_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub tag: u32,
    pub length: u32,
}

impl RecordHeader {
    pub const SIZE: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.tag.to_ne_bytes());
        out[4..8].copy_from_slice(&self.length.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            tag: u32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            length: u32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
        })
    }
}

/// One (summable) counter bucket within a [`Summary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CountSummary {
    pub num: u32,
    pub runs: u32,
    pub sum: u64,
    pub max: u64,
    pub sum_max: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Summary {
    pub checksum: u32,
    pub count_summary: [CountSummary; GCOV_COUNTERS_SUMMABLE],
}

impl Summary {
    /// A single-run, single-object summary: every trace is treated as one
    /// program run, matching the constant summary `gcov_test` always emits
    /// (the original doesn't support merging multiple runs).
    pub fn single_run() -> Self {
        Self {
            checksum: 0,
            count_summary: [CountSummary {
                num: 1,
                runs: 1,
                sum: 1,
                max: 1,
                sum_max: 1,
            }; GCOV_COUNTERS_SUMMABLE],
        }
    }

    /// `gcov_count_summary` is packed: `u32,u32,u32,u32,u32,u32,u32` (sum,
    /// max, sum_max each split into two 32-bit halves) plus the leading
    /// checksum word.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + GCOV_COUNTERS_SUMMABLE * 28);
        out.extend_from_slice(&self.checksum.to_ne_bytes());
        for c in self.count_summary {
            out.extend_from_slice(&c.num.to_ne_bytes());
            out.extend_from_slice(&c.runs.to_ne_bytes());
            out.extend_from_slice(&(c.sum as u32).to_ne_bytes());
            out.extend_from_slice(&((c.sum >> 32) as u32).to_ne_bytes());
            out.extend_from_slice(&(c.max as u32).to_ne_bytes());
            out.extend_from_slice(&((c.max >> 32) as u32).to_ne_bytes());
            out.extend_from_slice(&(c.sum_max as u32).to_ne_bytes());
            out.extend_from_slice(&((c.sum_max >> 32) as u32).to_ne_bytes());
        }
        out
    }

    pub fn from_words(words: &[u32]) -> Self {
        let mut pos = 0;
        let checksum = words[pos];
        pos += 1;
        let mut count_summary = [CountSummary::default(); GCOV_COUNTERS_SUMMABLE];
        for c in &mut count_summary {
            c.num = words[pos];
            pos += 1;
            c.runs = words[pos];
            pos += 1;
            c.sum = u64::from(words[pos]);
            pos += 1;
            c.sum += u64::from(words[pos]) << 32;
            pos += 1;
            c.max = u64::from(words[pos]);
            pos += 1;
            c.max += u64::from(words[pos]) << 32;
            pos += 1;
            c.sum_max = u64::from(words[pos]);
            pos += 1;
            c.sum_max += u64::from(words[pos]) << 32;
            pos += 1;
        }
        Self {
            checksum,
            count_summary,
        }
    }
}
