//! Array-backed binary heap with positional removal.
//!
//! The ordering is supplied per call as `comp(a, b)`, true when `b` belongs
//! closer to the top than `a` (the `std::less` convention: a max-heap under
//! `a < b`). Every time an element lands in a new slot `on_move(elem, slot)`
//! is called so an owner can keep an external index current.

/// Binary heap whose order lives outside the container.
#[derive(Debug, Clone, Default)]
pub struct Heap<T> {
    seq: Vec<T>,
}

fn parent(i: usize) -> usize {
    (i - 1) >> 1
}

fn left(i: usize) -> usize {
    (i << 1) + 1
}

impl<T> Heap<T> {
    pub fn new() -> Self {
        Self { seq: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn top(&self) -> Option<&T> {
        self.seq.first()
    }

    pub fn get(&self, pos: usize) -> Option<&T> {
        self.seq.get(pos)
    }

    /// Slots in heap order (not sorted).
    pub fn as_slice(&self) -> &[T] {
        &self.seq
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.seq.iter()
    }

    pub fn position<P: FnMut(&T) -> bool>(&self, pred: P) -> Option<usize> {
        self.seq.iter().position(pred)
    }

    pub fn clear(&mut self) {
        self.seq.clear();
    }

    /// Insert `x` and return the slot it settled in.
    pub fn push<C, M>(&mut self, x: T, mut comp: C, mut on_move: M) -> usize
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        self.seq.push(x);
        let last = self.seq.len() - 1;
        on_move(&self.seq[last], last);
        self.sift_up(last, &mut comp, &mut on_move)
    }

    /// Remove the element at `pos`, refilling the hole from the back.
    pub fn remove<C, M>(&mut self, pos: usize, mut comp: C, mut on_move: M) -> Option<T>
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        if pos >= self.seq.len() {
            return None;
        }
        let removed = self.seq.swap_remove(pos);
        if pos < self.seq.len() {
            on_move(&self.seq[pos], pos);
            self.restore(pos, &mut comp, &mut on_move);
        }
        Some(removed)
    }

    pub fn pop<C, M>(&mut self, comp: C, on_move: M) -> Option<T>
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        self.remove(0, comp, on_move)
    }

    /// Overwrite the element at `pos` and move it to its new slot.
    pub fn replace<C, M>(&mut self, pos: usize, x: T, mut comp: C, mut on_move: M) -> Option<usize>
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        if pos >= self.seq.len() {
            return None;
        }
        self.seq[pos] = x;
        on_move(&self.seq[pos], pos);
        Some(self.restore(pos, &mut comp, &mut on_move))
    }

    /// Re-establish the heap after the element at `pos` changed priority.
    pub fn update<C, M>(&mut self, pos: usize, mut comp: C, mut on_move: M) -> Option<usize>
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        if pos >= self.seq.len() {
            return None;
        }
        Some(self.restore(pos, &mut comp, &mut on_move))
    }

    /// Rebuild from scratch, e.g. after the ordering itself changed.
    pub fn heapify<C, M>(&mut self, mut comp: C, mut on_move: M)
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        let n = self.seq.len();
        for i in (0..n / 2).rev() {
            self.sift_down(i, &mut comp, &mut on_move);
        }
        for (i, x) in self.seq.iter().enumerate() {
            on_move(x, i);
        }
    }

    /// Whether no parent ranks below its child.
    pub fn is_heap<C>(&self, mut comp: C) -> bool
    where
        C: FnMut(&T, &T) -> bool,
    {
        (1..self.seq.len()).all(|child| !comp(&self.seq[parent(child)], &self.seq[child]))
    }

    fn restore<C, M>(&mut self, pos: usize, comp: &mut C, on_move: &mut M) -> usize
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        let up = self.sift_up(pos, comp, on_move);
        if up != pos {
            return up;
        }
        self.sift_down(pos, comp, on_move)
    }

    fn sift_up<C, M>(&mut self, mut pos: usize, comp: &mut C, on_move: &mut M) -> usize
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        while pos > 0 {
            let p = parent(pos);
            if !comp(&self.seq[p], &self.seq[pos]) {
                break;
            }
            self.swap(p, pos, on_move);
            pos = p;
        }
        pos
    }

    fn sift_down<C, M>(&mut self, mut hole: usize, comp: &mut C, on_move: &mut M) -> usize
    where
        C: FnMut(&T, &T) -> bool,
        M: FnMut(&T, usize),
    {
        let n = self.seq.len();
        loop {
            let l = left(hole);
            if l >= n {
                return hole;
            }
            let r = l + 1;
            let mut top = hole;
            if comp(&self.seq[top], &self.seq[l]) {
                top = l;
            }
            if r < n && comp(&self.seq[top], &self.seq[r]) {
                top = r;
            }
            if top == hole {
                return hole;
            }
            self.swap(top, hole, on_move);
            hole = top;
        }
    }

    fn swap<M: FnMut(&T, usize)>(&mut self, a: usize, b: usize, on_move: &mut M) {
        self.seq.swap(a, b);
        on_move(&self.seq[a], a);
        on_move(&self.seq[b], b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn less(a: &u32, b: &u32) -> bool {
        a < b
    }

    fn noop(_: &u32, _: usize) {}

    #[test]
    fn max_heap_under_less() {
        let mut h = Heap::new();
        for x in [5, 1, 9, 3, 7, 2] {
            h.push(x, less, noop);
            assert!(h.is_heap(less));
        }
        let mut out = Vec::new();
        while let Some(x) = h.pop(less, noop) {
            out.push(x);
            assert!(h.is_heap(less));
        }
        assert_eq!(out, vec![9, 7, 5, 3, 2, 1]);
    }

    #[test]
    fn min_heap_under_greater() {
        let mut h = Heap::new();
        for x in [5u32, 1, 9, 3] {
            h.push(x, |a: &u32, b: &u32| a > b, noop);
        }
        assert_eq!(h.top(), Some(&1));
    }

    #[test]
    fn positional_remove_keeps_index_current() {
        let mut index: HashMap<u32, usize> = HashMap::new();
        let mut h = Heap::new();
        for x in [10u32, 40, 20, 80, 30, 60, 50, 70] {
            h.push(x, less, |e: &u32, p| {
                index.insert(*e, p);
            });
        }
        for (p, x) in h.iter().enumerate() {
            assert_eq!(index[x], p);
        }
        let pos = index[&40];
        let removed = h
            .remove(pos, less, |e: &u32, p| {
                index.insert(*e, p);
            })
            .unwrap();
        assert_eq!(removed, 40);
        index.remove(&40);
        assert!(h.is_heap(less));
        for (p, x) in h.iter().enumerate() {
            assert_eq!(index[x], p);
        }
    }

    #[test]
    fn remove_from_leaf_can_sift_up() {
        // the tail element may belong above the hole's parent
        let mut h = Heap::new();
        for x in [100u32, 50, 90, 10, 20, 80, 85] {
            h.push(x, less, noop);
        }
        let pos = h.position(|x| *x == 10).unwrap();
        h.remove(pos, less, noop);
        assert!(h.is_heap(less));
    }

    #[test]
    fn replace_and_heapify() {
        let mut h = Heap::new();
        for x in [1u32, 2, 3, 4, 5] {
            h.push(x, less, noop);
        }
        let pos = h.position(|x| *x == 1).unwrap();
        h.replace(pos, 10, less, noop);
        assert_eq!(h.top(), Some(&10));
        h.heapify(|a: &u32, b: &u32| a > b, noop);
        assert_eq!(h.top(), Some(&2));
        assert!(h.is_heap(|a: &u32, b: &u32| a > b));
        assert!(h.remove(99, less, noop).is_none());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn heap_property_survives_mixed_ops(
                values in proptest::collection::vec(0u32..1000, 1..64),
                removals in proptest::collection::vec(0usize..64, 0..32),
            ) {
                let mut h = Heap::new();
                for v in &values {
                    h.push(*v, less, noop);
                }
                for r in removals {
                    if h.is_empty() {
                        break;
                    }
                    let pos = r % h.len();
                    h.remove(pos, less, noop);
                    prop_assert!(h.is_heap(less));
                }
                if let Some(top) = h.top() {
                    prop_assert!(h.iter().all(|x| x <= top));
                }
            }
        }
    }
}
