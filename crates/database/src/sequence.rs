//! Ordered object sequences with a cursor.
//!
//! Every view (and every index bucket) keeps its members in a `Sequence`:
//! the ordered ids, a membership set, a cursor and a stack of saved cursors.
//! Inserting or removing an id shifts the cursor and every saved cursor so
//! they keep pointing at the same object.

use hashbrown::HashSet;
use livedb_core::ObjectId;

/// Position of a view's cursor.
///
/// The two sentinels are the "null" positions: `get_next` from
/// `BeforeStart` yields the first object, `get_prev` from `AfterEnd` yields
/// the last one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    BeforeStart,
    At(usize),
    AfterEnd,
}

impl Cursor {
    fn after_insert(self, pos: usize) -> Self {
        match self {
            Cursor::At(c) if pos <= c => Cursor::At(c + 1),
            other => other,
        }
    }

    // Removing the current object moves the cursor onto its predecessor.
    fn after_remove(self, pos: usize) -> Self {
        match self {
            Cursor::At(c) if pos < c => Cursor::At(c - 1),
            Cursor::At(0) if pos == 0 => Cursor::BeforeStart,
            Cursor::At(c) if pos == c => Cursor::At(c - 1),
            other => other,
        }
    }

    // Cursor pointing just past `pos`, so that stepping back lands on `pos`.
    fn just_after(pos: usize, len: usize) -> Self {
        if pos + 1 < len {
            Cursor::At(pos + 1)
        } else {
            Cursor::AfterEnd
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Sequence {
    ids: Vec<ObjectId>,
    members: HashSet<ObjectId>,
    cursor: Cursor,
    saved: Vec<Cursor>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            ids: Vec::new(),
            members: HashSet::new(),
            cursor: Cursor::BeforeStart,
            saved: Vec::new(),
        }
    }

    pub fn from_ids(ids: Vec<ObjectId>) -> Self {
        let members = ids.iter().copied().collect();
        Self {
            ids,
            members,
            cursor: Cursor::BeforeStart,
            saved: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.members.contains(&id)
    }

    pub fn position(&self, id: ObjectId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.ids.iter().position(|&x| x == id)
    }

    pub fn get(&self, index: usize) -> Option<ObjectId> {
        self.ids.get(index).copied()
    }

    pub fn first(&self) -> Option<ObjectId> {
        self.ids.first().copied()
    }

    /// Inserts `id` at `pos` (clamped to the length) and returns the position used.
    pub fn insert(&mut self, pos: usize, id: ObjectId) -> usize {
        let pos = pos.min(self.ids.len());
        self.ids.insert(pos, id);
        self.members.insert(id);
        self.cursor = self.cursor.after_insert(pos);
        for saved in &mut self.saved {
            *saved = saved.after_insert(pos);
        }
        pos
    }

    /// Removes `id`, returning the position it had.
    pub fn remove(&mut self, id: ObjectId) -> Option<usize> {
        let pos = self.position(id)?;
        self.ids.remove(pos);
        self.members.remove(&id);
        self.cursor = self.cursor.after_remove(pos);
        for saved in &mut self.saved {
            *saved = saved.after_remove(pos);
        }
        Some(pos)
    }

    /// Replaces the whole content. Cursors stay on the same object when it
    /// survives, otherwise they fall back to the nearest surviving
    /// predecessor.
    pub fn replace(&mut self, ids: Vec<ObjectId>) {
        let members: HashSet<ObjectId> = ids.iter().copied().collect();
        let remap = |cursor: Cursor, old: &[ObjectId]| -> Cursor {
            let Cursor::At(c) = cursor else {
                return cursor;
            };
            old[..=c.min(old.len().saturating_sub(1))]
                .iter()
                .rev()
                .find(|id| members.contains(*id))
                .and_then(|id| ids.iter().position(|x| x == id))
                .map_or(Cursor::BeforeStart, Cursor::At)
        };
        if !self.ids.is_empty() {
            self.cursor = remap(self.cursor, &self.ids);
            let saved: Vec<Cursor> = self.saved.iter().map(|s| remap(*s, &self.ids)).collect();
            self.saved = saved;
        }
        self.ids = ids;
        self.members = members;
    }

    #[inline]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn set_cursor(&mut self, cursor: Cursor) {
        self.cursor = cursor;
    }

    pub fn current(&self) -> Option<ObjectId> {
        match self.cursor {
            Cursor::At(c) => self.ids.get(c).copied(),
            _ => None,
        }
    }

    pub fn advance(&mut self) -> Option<ObjectId> {
        self.cursor = match self.cursor {
            Cursor::BeforeStart if !self.ids.is_empty() => Cursor::At(0),
            Cursor::At(c) if c + 1 < self.ids.len() => Cursor::At(c + 1),
            Cursor::BeforeStart | Cursor::At(_) | Cursor::AfterEnd => Cursor::AfterEnd,
        };
        self.current()
    }

    pub fn retreat(&mut self) -> Option<ObjectId> {
        self.cursor = match self.cursor {
            Cursor::AfterEnd if !self.ids.is_empty() => Cursor::At(self.ids.len() - 1),
            Cursor::At(c) if c > 0 => Cursor::At(c - 1),
            Cursor::BeforeStart | Cursor::At(_) | Cursor::AfterEnd => Cursor::BeforeStart,
        };
        self.current()
    }

    pub fn reset(&mut self) {
        self.cursor = Cursor::BeforeStart;
    }

    pub fn move_to(&mut self, id: ObjectId) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.cursor = Cursor::At(pos);
                true
            }
            None => false,
        }
    }

    pub fn save_cursor(&mut self) {
        self.saved.push(self.cursor);
    }

    pub fn restore_cursor(&mut self) -> bool {
        match self.saved.pop() {
            Some(cursor) => {
                self.cursor = cursor;
                true
            }
            None => false,
        }
    }

    /// Saves the cursor and moves it just after `id`.
    pub fn place_after(&mut self, id: ObjectId) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.save_cursor();
        self.cursor = Cursor::just_after(pos, self.ids.len());
        true
    }
}
