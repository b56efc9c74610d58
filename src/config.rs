/// Default UTF-8 length below which strings are deduplicated by content.
pub const DEFAULT_STRING_DEDUP_THRESHOLD: usize = 32;

/// Session configuration shared by [`PickleState`](crate::PickleState) and
/// [`UnpickleState`](crate::UnpickleState).
///
/// `string_dedup_threshold` and `well_known_strings` are part of the wire agreement: both ends of a
/// stream must use equal values or back-references will point at the wrong entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Strings whose UTF-8 length is strictly below this are registered in the immutable table.
    /// `0` disables string deduplication.
    pub string_dedup_threshold: usize,
    /// Whether the pickler emits identity back-references for values it has already written.
    pub deduplicate: bool,
    /// Strings pre-registered in the immutable table after the null slot, in order.
    pub well_known_strings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            string_dedup_threshold: DEFAULT_STRING_DEDUP_THRESHOLD,
            deduplicate: true,
            well_known_strings: Vec::new(),
        }
    }
}

impl Config {
    pub fn with_string_dedup_threshold(mut self, threshold: usize) -> Self {
        self.string_dedup_threshold = threshold;
        self
    }

    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn with_well_known_strings<I, S>(mut self, strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.well_known_strings = strings.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a string of `len` UTF-8 bytes goes through the immutable table.
    #[inline]
    pub fn dedups_string(&self, len: usize) -> bool {
        len > 0 && len < self.string_dedup_threshold
    }
}
