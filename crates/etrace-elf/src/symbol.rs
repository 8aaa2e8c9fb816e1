use std::rc::Rc;

/// One source location attributed to a single instruction word.
///
/// `addr2line -i` can report more than one location per address when the
/// word was inlined from another function; those show up as additional
/// entries appended after the primary (non-inlined) location.
#[derive(Debug, Clone)]
pub struct SrcLoc {
    pub filename: Rc<str>,
    pub linenr: u32,
    pub inlined: bool,
}

/// A function-sized symbol pulled from `nm` output, plus everything the
/// coverage pipeline has since attached to it: a linemap, and per-word
/// time/hit counters.
#[derive(Debug, Clone)]
pub struct Sym {
    pub addr: u64,
    pub size: u64,
    pub name: String,
    pub hits: u64,
    pub total_time: u64,
    pub src_filename: Option<Rc<str>>,
    /// `cov[i]` is the accumulated time attributed to instruction word `i`.
    pub cov: Option<Vec<u64>>,
    /// `cov_ent[i]` is the number of times word `i` was entered.
    pub cov_ent: Option<Vec<u64>>,
    /// `linemap[i]` holds the source location(s) for word `i`, once built.
    pub linemap: Option<Vec<Vec<SrcLoc>>>,
    pub maxline: u32,
}

impl Sym {
    pub fn new(addr: u64, size: u64, name: String) -> Self {
        Self {
            addr,
            size,
            name,
            hits: 0,
            total_time: 0,
            src_filename: None,
            cov: None,
            cov_ent: None,
            linemap: None,
            maxline: 0,
        }
    }

    /// The synthetic entry used when an address can't be attributed to any
    /// real symbol (`namelen == 0` in the original; here, an empty name).
    pub fn unknown() -> Self {
        Self {
            addr: 0,
            size: u64::MAX,
            name: String::new(),
            hits: 0,
            total_time: 0,
            src_filename: None,
            cov: None,
            cov_ent: None,
            linemap: None,
            maxline: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name.is_empty()
    }

    fn nr_words(&self) -> usize {
        (self.size / 4 + 1) as usize
    }

    fn cov_mut(&mut self) -> &mut Vec<u64> {
        let n = self.nr_words();
        self.cov.get_or_insert_with(|| vec![0u64; n])
    }

    fn cov_ent_mut(&mut self) -> &mut Vec<u64> {
        let n = self.nr_words();
        self.cov_ent.get_or_insert_with(|| vec![0u64; n])
    }

    pub fn linemap_mut(&mut self) -> &mut Vec<Vec<SrcLoc>> {
        let n = self.nr_words();
        self.linemap.get_or_insert_with(|| vec![Vec::new(); n])
    }

    /// Spreads `time` evenly (in nanosecond-or-whatever caller units) across
    /// the instruction words covered by `[start, end)`, and bumps each
    /// word's entry counter by one.
    ///
    /// Mirrors `sym_update_cov` in the original tool word for word,
    /// including the granularity-error repass: integer division of `time`
    /// by `words` can leave a remainder, so leftover time is spread one
    /// unit per word across as many words as it takes until the counters
    /// add up to exactly `time`.
    pub fn update_cov(&mut self, start: u64, end: u64, time: u64) {
        let start_offset = start
            .checked_sub(self.addr)
            .expect("start must be >= sym.addr");
        let len = end.checked_sub(start).expect("end must be >= start");
        assert!(
            start_offset + len <= self.size,
            "coverage range escapes symbol bounds"
        );

        self.total_time += time;

        if self.is_unknown() {
            return;
        }

        let words = (len / 4) as usize;
        if words == 0 {
            return;
        }

        let pos = (start_offset / 4) as usize;

        {
            let ent = self.cov_ent_mut();
            for i in 0..words {
                ent[pos + i] += 1;
            }
        }

        let mut time_per_word = time / words as u64;
        if time_per_word == 0 && time != 0 {
            time_per_word = 1;
        }

        let mut accounted = 0u64;
        loop {
            let cov = self.cov_mut();
            let mut i = 0;
            loop {
                cov[pos + i] += time_per_word;
                accounted += time_per_word;
                if accounted >= time {
                    break;
                }
                i += 1;
                if i >= words {
                    break;
                }
            }
            if accounted < time {
                time_per_word = 1;
                continue;
            }
            break;
        }

        debug_assert_eq!(accounted, time);
    }
}
