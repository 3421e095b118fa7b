//! Isotope pattern tracks ("boxes") and the m/z-keyed pools that hold them
//! while they accumulate observations across scans.
use std::slice;

/// A single scored observation of an isotope pattern in one scan
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxElement {
    /// The monoisotopic m/z
    pub mz: f64,
    /// The charge state minus one
    pub c: usize,
    /// The pattern score, zero for helper points
    pub score: f64,
    /// The transformed intensity at the monoisotopic position
    pub intensity: f64,
    /// The raw intensity at the monoisotopic position
    pub ref_intensity: f64,
    pub rt: f64,
    /// The index of the scan the observation was made in
    pub rt_index: usize,
    /// The first and last peak index of the pattern's extent in its scan
    pub mz_begin: usize,
    pub mz_end: usize,
}

impl BoxElement {
    #[inline]
    pub fn charge(&self) -> i32 {
        self.c as i32 + 1
    }

    /// Whether this element was scored as a pattern, rather than being a helper point
    #[inline]
    pub fn is_scored(&self) -> bool {
        self.score > 0.0
    }
}

/// A track of observations of one putative isotope pattern across scans, ordered by scan index.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsotopeBox {
    elements: Vec<BoxElement>,
}

impl IsotopeBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_element(element: BoxElement) -> Self {
        Self {
            elements: vec![element],
        }
    }

    /// Add an observation, after any others from the same scan
    pub fn push(&mut self, element: BoxElement) {
        let i = self
            .elements
            .partition_point(|e| e.rt_index <= element.rt_index);
        self.elements.insert(i, element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, BoxElement> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[BoxElement] {
        &self.elements
    }

    /// The scan index of the earliest observation
    pub fn first_rt_index(&self) -> Option<usize> {
        self.elements.first().map(|e| e.rt_index)
    }

    /// The scan index of the latest observation
    pub fn last_rt_index(&self) -> Option<usize> {
        self.elements.last().map(|e| e.rt_index)
    }

    /// The largest zero-based charge observed in this track
    pub fn max_c(&self) -> Option<usize> {
        self.elements.iter().map(|e| e.c).max()
    }

    /// Absorb all of `other`'s observations
    pub fn merge(&mut self, other: IsotopeBox) {
        for e in other.elements {
            self.push(e);
        }
    }
}

impl<'a> IntoIterator for &'a IsotopeBox {
    type Item = &'a BoxElement;

    type IntoIter = slice::Iter<'a, BoxElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<BoxElement> for IsotopeBox {
    fn from_iter<T: IntoIterator<Item = BoxElement>>(iter: T) -> Self {
        let mut this = Self::new();
        for e in iter {
            this.push(e);
        }
        this
    }
}

/**
An ordered collection of [`IsotopeBox`] keyed by the running mean m/z of their
elements. Several boxes may share a key.

New observations are placed with [`BoxPool::insert_or_merge`], which either grows
the nearest box or starts a new one, and re-keys a grown box so that the pool stays
sorted.
*/
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxPool {
    entries: Vec<(f64, IsotopeBox)>,
}

impl BoxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &IsotopeBox)> + '_ {
        self.entries.iter().map(|(k, b)| (*k, b))
    }

    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn get(&self, index: usize) -> Option<(f64, &IsotopeBox)> {
        self.entries.get(index).map(|(k, b)| (*k, b))
    }

    /// Insert `value` under `key`, after any boxes with an equal key
    pub fn insert(&mut self, key: f64, value: IsotopeBox) {
        let i = self.entries.partition_point(|(k, _)| *k <= key);
        self.entries.insert(i, (key, value));
    }

    pub fn remove(&mut self, index: usize) -> (f64, IsotopeBox) {
        self.entries.remove(index)
    }

    /// Move every box of `other` into this pool
    pub fn extend(&mut self, other: BoxPool) {
        for (k, b) in other.entries {
            self.insert(k, b);
        }
    }

    /// Remove and return all boxes for which `predicate` holds, preserving order
    pub fn extract_if<F: FnMut(f64, &IsotopeBox) -> bool>(&mut self, mut predicate: F) -> Vec<(f64, IsotopeBox)> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for (k, b) in self.entries.drain(..) {
            if predicate(k, &b) {
                taken.push((k, b));
            } else {
                kept.push((k, b));
            }
        }
        self.entries = kept;
        taken
    }

    /// Find the position of the box `element` would be merged into, if any.
    ///
    /// The candidates are the box with the greatest key not above `mz` and the box
    /// with the smallest key above it. A candidate matches when its key is strictly
    /// within `max_distance` of `mz`. When both match, the strictly closer one wins,
    /// and an exact tie goes to the lower neighbor.
    pub fn find_nearest(&self, mz: f64, max_distance: f64) -> Option<usize> {
        let upper = self.entries.partition_point(|(k, _)| *k <= mz);
        let lower = upper.checked_sub(1);

        let mut best: Option<(usize, f64)> = None;
        if let Some(i) = lower {
            let d = (self.entries[i].0 - mz).abs();
            if d < max_distance {
                best = Some((i, d));
            }
        }
        if let Some((k, _)) = self.entries.get(upper) {
            let d = (k - mz).abs();
            if d < max_distance && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((upper, d));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Add `element` to the nearest box within `max_distance` of its m/z, or start
    /// a new box for it.
    ///
    /// A grown box is re-keyed to the running mean m/z of its elements and moved to
    /// keep the pool ordered.
    pub fn insert_or_merge(&mut self, element: BoxElement, max_distance: f64) {
        match self.find_nearest(element.mz, max_distance) {
            Some(i) => {
                let (key, mut found) = self.entries.remove(i);
                found.push(element);
                let n = found.len() as f64;
                let new_key = (key * (n - 1.0) + element.mz) / n;
                self.insert(new_key, found);
            }
            None => self.insert(element.mz, IsotopeBox::from_element(element)),
        }
    }
}

impl IntoIterator for BoxPool {
    type Item = (f64, IsotopeBox);

    type IntoIter = std::vec::IntoIter<(f64, IsotopeBox)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn element(mz: f64, c: usize, rt_index: usize) -> BoxElement {
        BoxElement {
            mz,
            c,
            score: 1.0,
            intensity: 100.0,
            ref_intensity: 100.0,
            rt: rt_index as f64,
            rt_index,
            ..Default::default()
        }
    }

    #[test]
    fn test_box_ordering() {
        let mut b = IsotopeBox::new();
        b.push(element(500.0, 0, 3));
        b.push(element(500.1, 0, 1));
        b.push(element(500.2, 1, 3));
        assert_eq!(b.first_rt_index(), Some(1));
        assert_eq!(b.last_rt_index(), Some(3));
        let mzs: Vec<_> = b.iter().map(|e| e.mz).collect();
        assert_eq!(mzs, vec![500.1, 500.0, 500.2]);
        assert_eq!(b.max_c(), Some(1));
    }

    #[test]
    fn test_merge_by_proximity() {
        let max_distance = 0.501175 / 3.0;
        let mut pool = BoxPool::new();
        pool.insert_or_merge(element(500.0, 2, 0), max_distance);
        pool.insert_or_merge(element(500.1, 2, 0), max_distance);
        assert_eq!(pool.len(), 1);
        let (key, b) = pool.get(0).unwrap();
        assert!((key - 500.05).abs() < 1e-9);
        assert_eq!(b.len(), 2);

        pool.insert_or_merge(element(500.3, 2, 1), max_distance);
        assert_eq!(pool.len(), 2);
        let keys: Vec<_> = pool.keys().collect();
        assert!((keys[0] - 500.05).abs() < 1e-9);
        assert_eq!(keys[1], 500.3);
    }

    #[test]
    fn test_tie_prefers_lower() {
        let mut pool = BoxPool::new();
        pool.insert(100.0, IsotopeBox::from_element(element(100.0, 0, 0)));
        pool.insert(100.5, IsotopeBox::from_element(element(100.5, 0, 0)));
        assert_eq!(pool.find_nearest(100.25, 0.3), Some(0));
        assert_eq!(pool.find_nearest(100.3, 0.3), Some(1));
        assert_eq!(pool.find_nearest(100.25, 0.2), None);
        pool.insert_or_merge(element(100.25, 0, 1), 0.3);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(0).unwrap().1.len(), 2);
        assert!((pool.get(0).unwrap().0 - 100.125).abs() < 1e-9);
    }

    #[test]
    fn test_extract_if() {
        let mut pool = BoxPool::new();
        for (i, mz) in [100.0, 200.0, 300.0].into_iter().enumerate() {
            pool.insert(mz, IsotopeBox::from_element(element(mz, 0, i)));
        }
        let taken = pool.extract_if(|k, _| k > 150.0);
        assert_eq!(taken.len(), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.keys().collect::<Vec<_>>(), vec![100.0]);
    }
}
