//! Common Information Entries and their owning arena.
//!
//! A CIE carries the per-function-group metadata shared by every FDE that references
//! it: alignment factors, pointer encodings, the personality routine, and the shared
//! initial instruction program. Many FDEs reference one CIE; entries are immutable
//! after construction except for [`CommonInformationEntry::rebase`], which is applied
//! uniformly when the whole image's base address changes.
//!
//! Ownership follows an index-stable arena model: [`CieList`] owns the entries and
//! hands out copyable [`CieHandle`] values that stay valid for the list's lifetime.

/// Shared unwind metadata for a group of functions.
///
/// Built by the container-format reader when it parses an `.eh_frame` or compact
/// unwind section; consumed by [`crate::dwarf::interpret`] and
/// [`crate::compact::synthesize`].
#[derive(Debug, Clone)]
pub struct CommonInformationEntry {
    version: u8,
    augmentation: String,
    code_alignment_factor: u64,
    data_alignment_factor: i64,
    return_address_register: u8,
    fde_encoding: u8,
    lsda_encoding: u8,
    personality_encoding: u8,
    personality_routine: u64,
    initial_instructions: Vec<u8>,
}

impl CommonInformationEntry {
    /// Create a new entry from parsed CIE fields.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: u8,
        augmentation: String,
        code_alignment_factor: u64,
        data_alignment_factor: i64,
        return_address_register: u8,
        fde_encoding: u8,
        lsda_encoding: u8,
        personality_encoding: u8,
        personality_routine: u64,
        initial_instructions: Vec<u8>,
    ) -> Self {
        CommonInformationEntry {
            version,
            augmentation,
            code_alignment_factor,
            data_alignment_factor,
            return_address_register,
            fde_encoding,
            lsda_encoding,
            personality_encoding,
            personality_routine,
            initial_instructions,
        }
    }

    /// CIE format version.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Augmentation string (e.g. `"zR"`).
    #[must_use]
    pub fn augmentation(&self) -> &str {
        &self.augmentation
    }

    /// Factor applied to `advance_loc` code deltas.
    #[must_use]
    pub fn code_alignment_factor(&self) -> u64 {
        self.code_alignment_factor
    }

    /// Factor applied to register save offsets (typically negative).
    #[must_use]
    pub fn data_alignment_factor(&self) -> i64 {
        self.data_alignment_factor
    }

    /// DWARF register number holding the return address.
    #[must_use]
    pub fn return_address_register(&self) -> u8 {
        self.return_address_register
    }

    /// Pointer encoding for FDE address fields.
    #[must_use]
    pub fn fde_encoding(&self) -> u8 {
        self.fde_encoding
    }

    /// Pointer encoding for LSDA references.
    #[must_use]
    pub fn lsda_encoding(&self) -> u8 {
        self.lsda_encoding
    }

    /// Pointer encoding for the personality routine reference.
    #[must_use]
    pub fn personality_encoding(&self) -> u8 {
        self.personality_encoding
    }

    /// Virtual address of the personality routine, zero if none.
    #[must_use]
    pub fn personality_routine(&self) -> u64 {
        self.personality_routine
    }

    /// The instruction program shared by every FDE referencing this CIE.
    #[must_use]
    pub fn initial_instructions(&self) -> &[u8] {
        &self.initial_instructions
    }

    /// Shift the personality routine address after the image is rebased.
    pub fn rebase(&mut self, delta_base: u64) {
        if self.personality_routine != 0 {
            self.personality_routine = self.personality_routine.wrapping_add(delta_base);
        }
    }
}

/// Typed handle into a [`CieList`].
///
/// Handles are plain indices and stay valid for the lifetime of the list that
/// produced them; entries are never removed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CieHandle(usize);

/// Index-stable arena of [`CommonInformationEntry`] values.
///
/// One list exists per parsed unwind section. FDE records hold [`CieHandle`]s
/// instead of references, which keeps the container's object graph free of
/// self-referential borrows.
///
/// # Examples
///
/// ```rust
/// use unwindscope::{CieList, CommonInformationEntry};
///
/// let mut cies = CieList::new();
/// let handle = cies.add(CommonInformationEntry::new(
///     1, "zR".to_string(), 1, -8, 16, 0x1B, 0xFF, 0xFF, 0, vec![],
/// ));
/// assert_eq!(cies.get(handle).unwrap().return_address_register(), 16);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CieList {
    entries: Vec<CommonInformationEntry>,
}

impl CieList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        CieList::default()
    }

    /// Add an entry, returning its handle.
    pub fn add(&mut self, entry: CommonInformationEntry) -> CieHandle {
        let handle = CieHandle(self.entries.len());
        self.entries.push(entry);
        handle
    }

    /// Look up an entry by handle.
    #[must_use]
    pub fn get(&self, handle: CieHandle) -> Option<&CommonInformationEntry> {
        self.entries.get(handle.0)
    }

    /// Look up an entry by handle, mutably.
    #[must_use]
    pub fn get_mut(&mut self, handle: CieHandle) -> Option<&mut CommonInformationEntry> {
        self.entries.get_mut(handle.0)
    }

    /// Number of entries in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the list holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = &CommonInformationEntry> {
        self.entries.iter()
    }

    /// Rebase every entry after the image's base address changed.
    pub fn rebase(&mut self, delta_base: u64) {
        for entry in &mut self.entries {
            entry.rebase(delta_base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cie(personality: u64) -> CommonInformationEntry {
        CommonInformationEntry::new(
            1,
            "zPLR".to_string(),
            1,
            -8,
            16,
            0x1B,
            0x1B,
            0x9B,
            personality,
            vec![0x0C, 0x07, 0x08],
        )
    }

    #[test]
    fn test_handles_are_stable() {
        let mut list = CieList::new();
        let first = list.add(sample_cie(0));
        let second = list.add(sample_cie(0x1000));

        assert_ne!(first, second);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(second).unwrap().personality_routine(), 0x1000);
        assert_eq!(list.get(first).unwrap().personality_routine(), 0);
    }

    #[test]
    fn test_rebase_skips_null_personality() {
        let mut list = CieList::new();
        let without = list.add(sample_cie(0));
        let with = list.add(sample_cie(0x4000));

        list.rebase(0x1_0000);

        assert_eq!(list.get(without).unwrap().personality_routine(), 0);
        assert_eq!(list.get(with).unwrap().personality_routine(), 0x1_4000);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut list = CieList::new();
        let handle = list.add(sample_cie(0x4000));

        let copy = list.clone();
        list.rebase(0x1000);

        assert_eq!(copy.get(handle).unwrap().personality_routine(), 0x4000);
        assert_eq!(list.get(handle).unwrap().personality_routine(), 0x5000);
    }
}
