//! The sweep line that aggregates per-scan candidates into isotope pattern
//! tracks spanning consecutive scans.
use crate::averagine::IW_HALF_NEUTRON_MASS;
use crate::boxes::{BoxElement, BoxPool, IsotopeBox};
use crate::feature::{FeatureMaterializer, IsotopeFeature};
use crate::spectrum::SpectrumSource;

/// The scan range a [`SweepLine`] is responsible for when a run is split into
/// contiguous chunks processed independently.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChunkBounds {
    /// The first scan index of the chunk
    pub front: usize,
    /// The last scan index of the chunk
    pub end: usize,
}

impl ChunkBounds {
    pub fn new(front: usize, end: usize) -> Self {
        Self { front, end }
    }

    /// Split `n_scans` scans into at most `n_chunks` contiguous chunks of near-equal size
    pub fn split(n_scans: usize, n_chunks: usize) -> Vec<ChunkBounds> {
        if n_scans == 0 {
            return Vec::new();
        }
        let n_chunks = n_chunks.clamp(1, n_scans);
        let base = n_scans / n_chunks;
        let extra = n_scans % n_chunks;
        let mut chunks = Vec::with_capacity(n_chunks);
        let mut front = 0;
        for i in 0..n_chunks {
            let size = base + usize::from(i < extra);
            chunks.push(ChunkBounds::new(front, front + size - 1));
            front += size;
        }
        chunks
    }
}

/**
Accumulates candidate observations scan by scan into [`IsotopeBox`] tracks.

Observations are merged into the *open* box nearest in m/z. Once a box has gone
more than `rt_interleave + 1` scans without a new observation, or the last scan
of the run has been seen, it is closed, and kept if it gathered at least
`rt_votes_cutoff` observations.

When a run is processed in chunks, boxes that may continue across a chunk boundary
are set aside instead: at the chunk's end scan every open box moves to the *end*
pool, and boxes closing within `rt_interleave + 1` scans of the chunk's front move
to the *front* pool. [`SweepLine::stitch`] reconciles these between adjacent chunks.

Scans must be fed in increasing scan index order.
*/
#[derive(Debug, Clone)]
pub struct SweepLine {
    pub open_boxes: BoxPool,
    pub closed_boxes: BoxPool,
    pub front_boxes: BoxPool,
    pub end_boxes: BoxPool,
    pub max_charge: i32,
    pub rt_interleave: usize,
    pub rt_votes_cutoff: usize,
    /// The index of the last scan of the whole run
    pub last_scan: usize,
    pub bounds: Option<ChunkBounds>,
}

impl SweepLine {
    pub fn new(max_charge: i32, rt_interleave: usize, rt_votes_cutoff: usize, n_scans: usize) -> Self {
        Self {
            open_boxes: BoxPool::new(),
            closed_boxes: BoxPool::new(),
            front_boxes: BoxPool::new(),
            end_boxes: BoxPool::new(),
            max_charge,
            rt_interleave,
            rt_votes_cutoff,
            last_scan: n_scans.saturating_sub(1),
            bounds: None,
        }
    }

    /// Restrict this sweep line to one chunk of the run
    pub fn with_bounds(mut self, bounds: ChunkBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    fn front_bound(&self) -> usize {
        self.bounds.map(|b| b.front).unwrap_or_default()
    }

    fn end_bound(&self) -> usize {
        self.bounds.map(|b| b.end).unwrap_or(self.last_scan)
    }

    /// The largest m/z difference at which an observation joins an open box
    #[inline]
    pub fn merge_distance(&self) -> f64 {
        IW_HALF_NEUTRON_MASS / self.max_charge as f64
    }

    /// Add an observation to the open box nearest in m/z, or open a new one
    pub fn push(&mut self, element: BoxElement) {
        let distance = self.merge_distance();
        self.open_boxes.insert_or_merge(element, distance);
    }

    /// Process all observations from the scan at `scan_index`.
    ///
    /// Boxes whose gap to this scan already exceeds the interleave tolerance are
    /// closed before the new observations are merged, so a track that has lapsed is
    /// never extended.
    pub fn advance<I: IntoIterator<Item = BoxElement>>(&mut self, scan_index: usize, elements: I) {
        self.close_boxes(scan_index, false);
        for element in elements {
            self.push(element);
        }
        self.update_box_states(scan_index);
    }

    /// Close the open boxes that can no longer grow after the scan at `scan_index`.
    pub fn update_box_states(&mut self, scan_index: usize) {
        if scan_index == self.end_bound() && scan_index != self.last_scan {
            log::debug!(
                "Deferring {} open boxes at the end of chunk at scan {scan_index}",
                self.open_boxes.len()
            );
            let open = std::mem::take(&mut self.open_boxes);
            self.end_boxes.extend(open);
            return;
        }
        self.close_boxes(scan_index, scan_index == self.last_scan);
    }

    fn close_boxes(&mut self, scan_index: usize, force: bool) {
        let tolerance = self.rt_interleave + 1;
        let closing = self.open_boxes.extract_if(|_, b| {
            let last = b.last_rt_index().unwrap_or_default();
            force || scan_index.saturating_sub(last) > tolerance
        });
        if closing.is_empty() {
            return;
        }

        let front = self.front_bound();
        for (key, b) in closing {
            let first = b.first_rt_index().unwrap_or_default();
            if front > 0 && first.saturating_sub(front) <= tolerance {
                self.front_boxes.insert(key, b);
            } else if b.len() >= self.rt_votes_cutoff {
                log::trace!("Closing box at {key:0.4} with {} observations", b.len());
                self.closed_boxes.insert(key, b);
            }
        }
    }

    /// Fold the results of the chunk immediately following this one into this one.
    ///
    /// Every closed box of `later` is kept. Each of `later`'s front boxes is joined
    /// with the closest of this chunk's end boxes that lies within half an isotope
    /// spacing divided by the highest charge seen in either box, and whose last
    /// observation precedes the front box's first by no more than the interleave
    /// tolerance. Joined boxes are closed. Boxes still open at the end of `later` that
    /// began at its front are joined the same way but remain end boxes. Front and end
    /// boxes left unmatched are kept if they meet the vote cutoff on their own.
    pub fn stitch(mut self, later: SweepLine) -> SweepLine {
        let tolerance = self.rt_interleave + 1;
        let later_front = later.front_bound();
        self.closed_boxes.extend(later.closed_boxes);

        let mut end_boxes: Vec<Option<(f64, IsotopeBox)>> =
            std::mem::take(&mut self.end_boxes).into_iter().map(Some).collect();

        let mut n_matched = 0;
        for (front_key, front_box) in later.front_boxes {
            match take_continued_box(&mut end_boxes, front_key, &front_box, tolerance) {
                Some((end_key, end_box)) => {
                    let (key, joined) = join_boxes(end_key, end_box, front_key, front_box);
                    self.closed_boxes.insert(key, joined);
                    n_matched += 1;
                }
                None => {
                    if front_box.len() >= self.rt_votes_cutoff {
                        self.closed_boxes.insert(front_key, front_box);
                    }
                }
            }
        }

        let mut next_end_boxes = BoxPool::new();
        for (key, open_box) in later.end_boxes {
            let first = open_box.first_rt_index().unwrap_or_default();
            let continued = if first.saturating_sub(later_front) <= tolerance {
                take_continued_box(&mut end_boxes, key, &open_box, tolerance)
            } else {
                None
            };
            match continued {
                Some((end_key, end_box)) => {
                    let (key, joined) = join_boxes(end_key, end_box, key, open_box);
                    next_end_boxes.insert(key, joined);
                    n_matched += 1;
                }
                None => next_end_boxes.insert(key, open_box),
            }
        }

        for (key, b) in end_boxes.into_iter().flatten() {
            if b.len() >= self.rt_votes_cutoff {
                self.closed_boxes.insert(key, b);
            }
        }
        log::debug!("Joined {n_matched} boxes across a chunk boundary");

        self.end_boxes = next_end_boxes;
        self.open_boxes.extend(later.open_boxes);
        if let (Some(a), Some(b)) = (self.bounds, later.bounds) {
            self.bounds = Some(ChunkBounds::new(a.front, b.end));
        }
        self
    }

    /// Close every box still pending and turn the closed boxes into features.
    ///
    /// Open, front and end boxes that meet the vote cutoff are closed first, so a
    /// sweep that never saw the last scan of its run still reports its tracks.
    pub fn finalize<S: SpectrumSource + ?Sized>(
        mut self,
        materializer: &FeatureMaterializer,
        source: &S,
    ) -> Vec<IsotopeFeature> {
        let pending = [
            std::mem::take(&mut self.open_boxes),
            std::mem::take(&mut self.front_boxes),
            std::mem::take(&mut self.end_boxes),
        ];
        for (key, b) in pending.into_iter().flatten() {
            if b.len() >= self.rt_votes_cutoff {
                self.closed_boxes.insert(key, b);
            }
        }
        materializer.materialize(&self.closed_boxes, source)
    }
}

/// Remove and return the end box that `continuation`, keyed at `key`, continues, if any
fn take_continued_box(
    end_boxes: &mut [Option<(f64, IsotopeBox)>],
    key: f64,
    continuation: &IsotopeBox,
    tolerance: usize,
) -> Option<(f64, IsotopeBox)> {
    let first = continuation.first_rt_index().unwrap_or_default();
    let c = continuation.max_c().unwrap_or_default();
    let mut best: Option<(usize, f64)> = None;
    for (j, slot) in end_boxes.iter().enumerate() {
        let Some((end_key, end_box)) = slot else {
            continue;
        };
        let max_c = end_box.max_c().unwrap_or_default().max(c);
        let distance = (end_key - key).abs();
        if distance >= IW_HALF_NEUTRON_MASS / (max_c + 1) as f64 {
            continue;
        }
        let end_last = end_box.last_rt_index().unwrap_or_default();
        if first.saturating_sub(end_last) > tolerance {
            continue;
        }
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((j, distance));
        }
    }
    best.and_then(|(j, _)| end_boxes[j].take())
}

/// Merge two boxes, keying the result by the observation-weighted mean of their keys
fn join_boxes(key_a: f64, mut box_a: IsotopeBox, key_b: f64, box_b: IsotopeBox) -> (f64, IsotopeBox) {
    let (n_a, n_b) = (box_a.len() as f64, box_b.len() as f64);
    let key = (key_a * n_a + key_b * n_b) / (n_a + n_b);
    box_a.merge(box_b);
    (key, box_a)
}
