use std::collections::BTreeMap;

/// A memoized lookup result for one document line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot<T> {
    Present(T),
    /// The line was looked at and holds nothing of this kind
    Absent,
}

impl<T> Slot<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Slot::Present(value) => Some(value),
            Slot::Absent => None,
        }
    }
}

/// A shift would land a key on an occupied position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftCollision {
    pub position: usize,
}

/// Line-number keyed map whose keys move with the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMap<T> {
    slots: BTreeMap<usize, Slot<T>>,
}

impl<T> Default for PositionMap<T> {
    fn default() -> Self {
        PositionMap {
            slots: BTreeMap::new(),
        }
    }
}

impl<T> PositionMap<T> {
    pub fn get(&self, pos: usize) -> Option<&Slot<T>> {
        self.slots.get(&pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut T> {
        match self.slots.get_mut(&pos) {
            Some(Slot::Present(value)) => Some(value),
            _ => None,
        }
    }

    pub fn present(&self, pos: usize) -> Option<&T> {
        self.slots.get(&pos).and_then(Slot::present)
    }

    pub fn set(&mut self, pos: usize, slot: Slot<T>) {
        self.slots.insert(pos, slot);
    }

    pub fn remove(&mut self, pos: usize) -> Option<Slot<T>> {
        self.slots.remove(&pos)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Present values in position order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .filter_map(|(pos, slot)| slot.present().map(|v| (*pos, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots.iter_mut().filter_map(|(pos, slot)| match slot {
            Slot::Present(value) => Some((*pos, value)),
            Slot::Absent => None,
        })
    }

    /// Check that shifting every key `>= from` by `delta` is possible
    pub fn check_shift(&self, from: usize, delta: isize) -> Result<(), ShiftCollision> {
        if delta >= 0 {
            return Ok(());
        }
        let step = delta.unsigned_abs();
        if from < step {
            if self.slots.range(from..).next().is_some() {
                return Err(ShiftCollision { position: from });
            }
            return Ok(());
        }
        // Keys moving down must not land on keys that stay
        match self.slots.range(from - step..from).next() {
            Some((pos, _)) => Err(ShiftCollision { position: *pos }),
            None => Ok(()),
        }
    }

    /// Move every key `>= from` by `delta`. Call `check_shift` first.
    pub fn shift(&mut self, from: usize, delta: isize) {
        let moved = self.slots.split_off(&from);
        for (pos, slot) in moved {
            let target = pos.saturating_add_signed(delta);
            self.slots.insert(target, slot);
        }
    }

    /// Exchange whatever sits at the two positions, slots and gaps alike
    pub fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let first = self.slots.remove(&a);
        let second = self.slots.remove(&b);
        if let Some(slot) = first {
            self.slots.insert(b, slot);
        }
        if let Some(slot) = second {
            self.slots.insert(a, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PositionMap<&'static str> {
        let mut map = PositionMap::default();
        map.set(1, Slot::Present("a"));
        map.set(2, Slot::Absent);
        map.set(4, Slot::Present("b"));
        map
    }

    #[test]
    fn test_shift_up_moves_tail() {
        let mut map = sample();
        map.check_shift(2, 1).unwrap();
        map.shift(2, 1);
        assert_eq!(map.present(1), Some(&"a"));
        assert_eq!(map.get(3), Some(&Slot::Absent));
        assert_eq!(map.present(5), Some(&"b"));
        assert_eq!(map.get(2), None);
    }

    #[test]
    fn test_shift_down_detects_collision() {
        let map = sample();
        assert_eq!(map.check_shift(2, -1), Err(ShiftCollision { position: 1 }));
        assert!(map.check_shift(3, -1).is_ok());
    }

    #[test]
    fn test_shift_down_after_removal() {
        let mut map = sample();
        map.remove(2);
        map.check_shift(3, -1).unwrap();
        map.shift(3, -1);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(1, &"a"), (3, &"b")]);
    }

    #[test]
    fn test_swap_moves_gaps_too() {
        let mut map = sample();
        map.swap(1, 3);
        assert_eq!(map.get(1), None);
        assert_eq!(map.present(3), Some(&"a"));
        map.swap(2, 4);
        assert_eq!(map.present(2), Some(&"b"));
        assert_eq!(map.get(4), Some(&Slot::Absent));
    }
}
