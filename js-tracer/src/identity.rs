//! Identity Registry (spec §4.3): canonicalizes runtime-ephemeral frame
//! handles into stable small integers that survive frame-slot recycling, and
//! stamps heap objects with a hidden identity tag on first encounter.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::value::ObjectData;

/// Raw frame identifier as handed out by the interpreter: the call-stack
/// depth at which a frame was pushed (§"Identity Registry" in SPEC_FULL.md).
/// Depths naturally recycle once a shallower frame returns and a new one is
/// pushed at the same depth, mirroring real debugger frame-index reuse.
pub type RawFrameId = usize;

#[derive(Default)]
pub struct IdentityRegistry {
    call_count: BTreeMap<RawFrameId, u64>,
    canonical: BTreeMap<String, u64>,
    next_frame_id: u64,
    next_object_id: u64,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        IdentityRegistry::default()
    }

    fn canonical_key(&self, raw: RawFrameId) -> String {
        match self.call_count.get(&raw) {
            Some(n) if *n >= 1 => format!("{raw}_{n}"),
            _ => raw.to_string(),
        }
    }

    /// Canonicalize a raw frame id to a stable small integer (spec §4.3).
    pub fn canonicalize_frame(&mut self, raw: RawFrameId) -> u64 {
        let key = self.canonical_key(raw);
        if let Some(id) = self.canonical.get(&key) {
            return *id;
        }
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.canonical.insert(key, id);
        id
    }

    /// Frame-return accounting (spec §4.5 step 11): bump *after* the current
    /// entry has already canonicalized the returning frame, so the
    /// just-returned activation keeps its ID on the `return` entry itself.
    pub fn record_frame_return(&mut self, raw: RawFrameId) {
        *self.call_count.entry(raw).or_insert(0) += 1;
    }

    /// Object canonicalization (spec §4.3): attach a hidden, non-enumerable
    /// tag to the object's identity slot on first sight, reused on every
    /// later hit. The slot lives on `ObjectData` itself (behind the same
    /// `RefCell` every other mutation goes through), so this never touches
    /// property enumeration or pretty-printing.
    pub fn object_id(&mut self, data: &Rc<std::cell::RefCell<ObjectData>>) -> u64 {
        let mut borrowed = data.borrow_mut();
        if let Some(id) = borrowed.identity {
            return id;
        }
        let id = self.next_object_id;
        self.next_object_id += 1;
        borrowed.identity = Some(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactivation_of_same_raw_id_gets_a_new_canonical_id() {
        let mut registry = IdentityRegistry::new();
        let first = registry.canonicalize_frame(1);
        registry.record_frame_return(1);
        let second = registry.canonicalize_frame(1);
        assert_ne!(first, second);
    }

    #[test]
    fn same_activation_keeps_its_id_across_multiple_breaks() {
        let mut registry = IdentityRegistry::new();
        let a = registry.canonicalize_frame(2);
        let b = registry.canonicalize_frame(2);
        assert_eq!(a, b);
    }

    #[test]
    fn object_ids_are_stable_across_encodings() {
        use crate::value::Value;
        let mut registry = IdentityRegistry::new();
        let obj = Value::object(ObjectData::new_plain());
        let Value::Object(cell) = &obj else { panic!() };
        let first = registry.object_id(cell);
        let second = registry.object_id(cell);
        assert_eq!(first, second);
    }
}
