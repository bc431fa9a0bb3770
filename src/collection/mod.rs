use crate::error::Result;
use crate::model::melody::Melody;

mod in_memory;

pub use in_memory::{InMemoryMelodyCollection, LoadWarning};

/// A set of melodies keyed by their unique id.
pub trait MelodyCollection {
    fn name(&self) -> &str;

    /// Adds `melody`; fails with `InvalidArgument` if its id is already taken.
    fn add(&mut self, melody: Melody) -> Result<()>;

    /// Looks up a melody; fails with `NotFound` if absent.
    fn get(&self, melody_id: &str) -> Result<&Melody>;

    fn size(&self) -> usize;

    fn contains(&self, melody_id: &str) -> bool;

    /// Removes and returns a melody; fails with `NotFound` if absent.
    fn remove(&mut self, melody_id: &str) -> Result<Melody>;

    fn clear(&mut self);

    /// Every melody, in an order that is stable for an unchanged collection.
    fn iter(&self) -> impl Iterator<Item = &Melody>;

    fn ids(&self) -> Vec<&str> {
        self.iter().map(Melody::id).collect()
    }
}
