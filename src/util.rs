//! Module implement common utility functions over sorted sequences.
//!
//! The index planner works in terms of sorted position lists. Helpers
//! here provide the binary searches over the timestamp list and the
//! set algebra over position lists.

// first offset whose element is >= key.
pub fn lower_bound<T: Ord>(xs: &[T], key: &T) -> usize {
    let (mut lo, mut hi) = (0, xs.len());
    while lo < hi {
        let mid = (lo + hi) / 2;
        if xs[mid] < *key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

// first offset whose element is > key.
pub fn upper_bound<T: Ord>(xs: &[T], key: &T) -> usize {
    let (mut lo, mut hi) = (0, xs.len());
    while lo < hi {
        let mid = (lo + hi) / 2;
        if xs[mid] <= *key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Locate the leftmost offset whose element is exactly `key`.
pub fn find_eq<T: Ord>(xs: &[T], key: &T) -> Option<usize> {
    let i = lower_bound(xs, key);
    if i != xs.len() && xs[i] == *key {
        Some(i)
    } else {
        None
    }
}

/// Locate the rightmost offset whose element is less than `key`.
pub fn find_lt<T: Ord>(xs: &[T], key: &T) -> Option<usize> {
    match lower_bound(xs, key) {
        0 => None,
        i => Some(i - 1),
    }
}

/// Locate the rightmost offset whose element is less than or equal to `key`.
pub fn find_le<T: Ord>(xs: &[T], key: &T) -> Option<usize> {
    match upper_bound(xs, key) {
        0 => None,
        i => Some(i - 1),
    }
}

/// Locate the leftmost offset whose element is greater than `key`.
pub fn find_gt<T: Ord>(xs: &[T], key: &T) -> Option<usize> {
    match upper_bound(xs, key) {
        i if i == xs.len() => None,
        i => Some(i),
    }
}

/// Locate the leftmost offset whose element is greater than or equal to `key`.
pub fn find_ge<T: Ord>(xs: &[T], key: &T) -> Option<usize> {
    match lower_bound(xs, key) {
        i if i == xs.len() => None,
        i => Some(i),
    }
}

/// Intersect two sorted position lists.
pub fn intersect(xs: &[usize], ys: &[usize]) -> Vec<usize> {
    let (mut i, mut j) = (0, 0);
    let mut acc = Vec::with_capacity(xs.len().min(ys.len()));
    while i < xs.len() && j < ys.len() {
        if xs[i] < ys[j] {
            i += 1;
        } else if ys[j] < xs[i] {
            j += 1;
        } else {
            acc.push(xs[i]);
            i += 1;
            j += 1;
        }
    }
    acc
}

/// Union two sorted position lists.
pub fn union(xs: &[usize], ys: &[usize]) -> Vec<usize> {
    let (mut i, mut j) = (0, 0);
    let mut acc = Vec::with_capacity(xs.len() + ys.len());
    while i < xs.len() && j < ys.len() {
        if xs[i] < ys[j] {
            acc.push(xs[i]);
            i += 1;
        } else if ys[j] < xs[i] {
            acc.push(ys[j]);
            j += 1;
        } else {
            acc.push(xs[i]);
            i += 1;
            j += 1;
        }
    }
    acc.extend_from_slice(&xs[i..]);
    acc.extend_from_slice(&ys[j..]);
    acc
}

/// Positions in `0..n` that are not in the sorted list `xs`.
pub fn complement(xs: &[usize], n: usize) -> Vec<usize> {
    let mut acc = Vec::with_capacity(n.saturating_sub(xs.len()));
    let mut i = 0;
    for pos in 0..n {
        if i < xs.len() && xs[i] == pos {
            i += 1;
        } else {
            acc.push(pos);
        }
    }
    acc
}

/// Insert `pos` into the sorted position list, keeping it sorted.
pub fn insert_pos(xs: &mut Vec<usize>, pos: usize) {
    let i = lower_bound(xs, &pos);
    xs.insert(i, pos);
}

#[cfg(test)]
#[path = "util_test.rs"]
mod util_test;
